//! 命令定义和实现

pub mod coil;
pub mod config;
pub mod jog;
pub mod teleop;

pub use coil::CoilCommand;
pub use config::ConfigCommand;
pub use jog::JogCommand;
pub use teleop::TeleopCommand;
