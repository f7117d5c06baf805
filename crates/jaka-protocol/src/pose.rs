//! 位姿类型定义
//!
//! 笛卡尔位姿、位姿增量和关节位置，都是 6 自由度的值类型（`Copy`）。

use nalgebra::Vector3;

/// 自由度数量
pub const DOF: usize = 6;

/// 笛卡尔位姿 `(x, y, z, rx, ry, rz)`
///
/// 单位沿用设备原生单位（毫米 / 弧度）。纯值类型，不带任何身份信息。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Pose([f64; DOF]);

impl Pose {
    /// 零位姿
    pub const ZERO: Pose = Pose([0.0; DOF]);

    pub const fn new(values: [f64; DOF]) -> Self {
        Self(values)
    }

    pub fn as_array(&self) -> &[f64; DOF] {
        &self.0
    }

    /// 平移分量（前 3 个）
    pub fn translation(&self) -> Vector3<f64> {
        Vector3::new(self.0[0], self.0[1], self.0[2])
    }

    /// 旋转分量（后 3 个）
    pub fn rotation(&self) -> Vector3<f64> {
        Vector3::new(self.0[3], self.0[4], self.0[5])
    }
}

impl From<[f64; DOF]> for Pose {
    fn from(values: [f64; DOF]) -> Self {
        Self(values)
    }
}

/// 旋转分量的符号约定
///
/// 主臂与从臂的旋转方向相反时，需要对增量的 rx/ry/rz 取反。
/// 该约定是针对现场设备调出来的，保留为可配置的默认值。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum RotationConvention {
    /// 旋转分量取反（默认）
    #[default]
    InvertRotation,
    /// 与主臂方向一致
    Preserve,
}

/// 位姿增量（`current - previous`）
///
/// 只能由同一个采样器的两次相邻采样计算得到。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoseDelta([f64; DOF]);

impl PoseDelta {
    /// 零增量
    pub const ZERO: PoseDelta = PoseDelta([0.0; DOF]);

    pub const fn new(values: [f64; DOF]) -> Self {
        Self(values)
    }

    /// 计算两次相邻采样之间的增量
    ///
    /// 索引 0-2 为 `current - previous`，索引 3-5 按 `convention` 处理符号。
    ///
    /// # Example
    ///
    /// ```
    /// use jaka_protocol::{Pose, PoseDelta, RotationConvention};
    ///
    /// let prev = Pose::new([0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
    /// let cur = Pose::new([1.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
    /// let delta = PoseDelta::between(&prev, &cur, RotationConvention::InvertRotation);
    /// assert_eq!(delta.as_array(), &[1.0, 0.0, 0.0, 0.0, 0.0, -1.0]);
    /// ```
    pub fn between(previous: &Pose, current: &Pose, convention: RotationConvention) -> Self {
        let mut diff = [0.0; DOF];
        for (i, d) in diff.iter_mut().enumerate() {
            *d = current.0[i] - previous.0[i];
        }
        if convention == RotationConvention::InvertRotation {
            for d in &mut diff[3..] {
                *d = -*d;
            }
        }
        Self(diff)
    }

    pub fn as_array(&self) -> &[f64; DOF] {
        &self.0
    }

    pub fn translation(&self) -> Vector3<f64> {
        Vector3::new(self.0[0], self.0[1], self.0[2])
    }

    /// 平移分量的欧氏范数，用于判断人工干预
    pub fn translation_norm(&self) -> f64 {
        self.translation().norm()
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|v| *v == 0.0)
    }
}

/// 关节位置（6 个关节）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JointPose([f64; DOF]);

impl JointPose {
    pub const ZERO: JointPose = JointPose([0.0; DOF]);

    pub const fn new(values: [f64; DOF]) -> Self {
        Self(values)
    }

    pub fn as_array(&self) -> &[f64; DOF] {
        &self.0
    }
}

impl From<[f64; DOF]> for JointPose {
    fn from(values: [f64; DOF]) -> Self {
        Self(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_delta_inverts_rotation() {
        let prev = Pose::new([1.0, 2.0, 3.0, 0.1, 0.2, 0.3]);
        let cur = Pose::new([1.5, 1.0, 3.0, 0.2, 0.2, 0.1]);
        let delta = PoseDelta::between(&prev, &cur, RotationConvention::InvertRotation);
        let d = delta.as_array();
        assert!((d[0] - 0.5).abs() < 1e-12);
        assert!((d[1] + 1.0).abs() < 1e-12);
        assert_eq!(d[2], 0.0);
        assert!((d[3] + 0.1).abs() < 1e-12);
        assert_eq!(d[4], 0.0);
        assert!((d[5] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_delta_preserve_convention() {
        let prev = Pose::ZERO;
        let cur = Pose::new([0.0, 0.0, 0.0, 1.0, 2.0, 3.0]);
        let delta = PoseDelta::between(&prev, &cur, RotationConvention::Preserve);
        assert_eq!(delta.as_array(), &[0.0, 0.0, 0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_same_pose_gives_zero_delta() {
        let p = Pose::new([10.0, -3.0, 7.5, 0.4, -0.2, 3.1]);
        let delta = PoseDelta::between(&p, &p, RotationConvention::default());
        assert!(delta.is_zero());
        assert_eq!(delta.translation_norm(), 0.0);
    }

    #[test]
    fn test_translation_norm_ignores_rotation() {
        let delta = PoseDelta::new([3.0, 4.0, 0.0, 100.0, 100.0, 100.0]);
        assert!((delta.translation_norm() - 5.0).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn prop_delta_sign_convention(
            p0 in prop::array::uniform6(-1000.0f64..1000.0),
            p1 in prop::array::uniform6(-1000.0f64..1000.0),
        ) {
            let delta = PoseDelta::between(
                &Pose::new(p0),
                &Pose::new(p1),
                RotationConvention::InvertRotation,
            );
            let d = delta.as_array();
            for i in 0..3 {
                prop_assert_eq!(d[i], p1[i] - p0[i]);
            }
            for i in 3..6 {
                prop_assert_eq!(d[i], -(p1[i] - p0[i]));
            }
        }
    }
}
