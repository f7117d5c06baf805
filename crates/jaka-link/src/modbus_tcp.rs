//! Modbus-TCP 线圈执行器
//!
//! 通过 Modbus-TCP 读写单个线圈，驱动真空吸盘。
//! 连接失败返回 [`LinkError::Connect`]，由上层决定是否终止会话。

use crate::{DiscreteActuator, LinkError};
use jaka_protocol::modbus::{
    FunctionCode, MBAP_HEADER_LEN, MODBUS_TCP_PORT, MbapHeader, ModbusRequest, ModbusResponse,
};
use jaka_protocol::{ActuatorState, CoilAddress, ProtocolError};
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Modbus-TCP 连接配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModbusTcpConfig {
    /// 设备地址
    pub host: String,
    /// 端口（默认 502）
    pub port: u16,
    /// 从站地址（unit id）
    pub unit_id: u8,
    /// 连接及读写超时
    pub timeout: Duration,
}

impl Default for ModbusTcpConfig {
    fn default() -> Self {
        Self {
            host: "192.168.1.8".to_string(),
            port: MODBUS_TCP_PORT,
            unit_id: 1,
            timeout: Duration::from_secs(1),
        }
    }
}

impl ModbusTcpConfig {
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Modbus-TCP 线圈执行器
///
/// 超时、IO 错误或帧头异常之后，流上可能残留迟到的应答，帧边界不再可信。
/// 此时丢弃该连接，下一次读写自动重连，故障只影响当前这一次调用。
pub struct ModbusTcpActuator {
    config: ModbusTcpConfig,
    stream: Option<TcpStream>,
    /// `connect` 之后、`disconnect` 之前为 true
    session_open: bool,
    next_transaction_id: u16,
}

impl ModbusTcpActuator {
    pub fn new(config: ModbusTcpConfig) -> Self {
        Self {
            config,
            stream: None,
            session_open: false,
            next_transaction_id: 1,
        }
    }

    pub fn config(&self) -> &ModbusTcpConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.session_open
    }

    fn open_stream(&self) -> Result<TcpStream, LinkError> {
        let endpoint = self.config.endpoint();
        let addr = endpoint
            .to_socket_addrs()
            .map_err(|e| LinkError::connect(&endpoint, e))?
            .next()
            .ok_or_else(|| LinkError::connect(&endpoint, "address did not resolve"))?;

        let stream = TcpStream::connect_timeout(&addr, self.config.timeout)
            .map_err(|e| LinkError::connect(&endpoint, e))?;
        stream
            .set_read_timeout(Some(self.config.timeout))
            .and_then(|_| stream.set_write_timeout(Some(self.config.timeout)))
            .and_then(|_| stream.set_nodelay(true))
            .map_err(|e| LinkError::connect(&endpoint, e))?;
        Ok(stream)
    }

    fn close_stream(&mut self) {
        if let Some(stream) = self.stream.take() {
            match stream.shutdown(Shutdown::Both) {
                Ok(()) => {},
                Err(e) if e.kind() == ErrorKind::NotConnected => {},
                Err(e) => warn!("Modbus-TCP shutdown error: {}", e),
            }
        }
    }

    fn transact(&mut self, request: ModbusRequest) -> Result<ModbusResponse, LinkError> {
        if !self.session_open {
            return Err(LinkError::NotConnected);
        }
        if self.stream.is_none() {
            self.stream = Some(self.open_stream()?);
            info!("Reconnected to Modbus-TCP device at {}", self.config.endpoint());
        }

        let transaction_id = self.next_transaction_id;
        self.next_transaction_id = self.next_transaction_id.wrapping_add(1);

        let pdu = match self.exchange(&request, transaction_id) {
            Ok(pdu) => pdu,
            Err(e) => {
                warn!("Dropping Modbus-TCP connection after error: {}", e);
                self.close_stream();
                return Err(e);
            },
        };
        // 完整帧已读出，异常应答不影响后续帧
        Ok(ModbusResponse::decode(&pdu, request.function_code())?)
    }

    /// 发送请求并读出一个完整应答帧的 PDU
    fn exchange(
        &mut self,
        request: &ModbusRequest,
        transaction_id: u16,
    ) -> Result<Vec<u8>, LinkError> {
        let unit_id = self.config.unit_id;
        let stream = self.stream.as_mut().ok_or(LinkError::NotConnected)?;

        let adu = request.encode(transaction_id, unit_id);
        stream.write_all(&adu).map_err(map_io_error)?;

        let mut header_buf = [0u8; MBAP_HEADER_LEN];
        stream.read_exact(&mut header_buf).map_err(map_io_error)?;
        let header = MbapHeader::decode(&header_buf)?;

        let mut pdu = vec![0u8; header.pdu_len()];
        stream.read_exact(&mut pdu).map_err(map_io_error)?;
        if header.transaction_id != transaction_id {
            return Err(ProtocolError::TransactionMismatch {
                expected: transaction_id,
                actual: header.transaction_id,
            }
            .into());
        }
        Ok(pdu)
    }
}

/// 读写超时统一映射为 `LinkError::Timeout`
fn map_io_error(e: std::io::Error) -> LinkError {
    match e.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock => LinkError::Timeout,
        _ => LinkError::Io(e),
    }
}

impl DiscreteActuator for ModbusTcpActuator {
    fn connect(&mut self) -> Result<(), LinkError> {
        let stream = self.open_stream()?;
        self.close_stream();
        self.stream = Some(stream);
        self.session_open = true;
        info!("Connected to Modbus-TCP device at {}", self.config.endpoint());
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), LinkError> {
        if self.session_open {
            self.session_open = false;
            self.close_stream();
            info!(
                "Disconnected from Modbus-TCP device at {}",
                self.config.endpoint()
            );
        }
        Ok(())
    }

    fn read_state(&mut self, address: CoilAddress) -> Result<ActuatorState, LinkError> {
        let response = self.transact(ModbusRequest::ReadCoils {
            address,
            quantity: 1,
        })?;
        let state = response.coil(0).ok_or(ProtocolError::InvalidLength {
            expected: 1,
            actual: 0,
        })?;
        debug!("Read {} status: {}", address, state);
        Ok(state)
    }

    fn write_state(&mut self, address: CoilAddress, state: ActuatorState) -> Result<(), LinkError> {
        let response = self.transact(ModbusRequest::WriteSingleCoil { address, state })?;
        match response {
            ModbusResponse::WriteSingleCoil {
                address: echoed_address,
                state: echoed_state,
            } if echoed_address == address && echoed_state == state => {
                info!("Write to {} status {} successfully", address, state);
                Ok(())
            },
            other => Err(LinkError::Write(format!(
                "unexpected echo for {}: {:?}",
                address, other
            ))),
        }
    }
}

impl Drop for ModbusTcpActuator {
    fn drop(&mut self) {
        let _ = self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jaka_protocol::modbus::{COIL_ON, MbapHeader};
    use parking_lot::Mutex;
    use std::net::TcpListener;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    /// 单连接的最小 Modbus-TCP 从站：维护 16 个线圈
    ///
    /// `exception_on_write` 为 Some 时，对写请求返回该异常码。
    fn spawn_fake_server(exception_on_write: Option<u8>) -> (u16, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut coils = [false; 16];
            loop {
                let mut header_buf = [0u8; MBAP_HEADER_LEN];
                if stream.read_exact(&mut header_buf).is_err() {
                    break;
                }
                let header = MbapHeader::decode(&header_buf).unwrap();
                let mut pdu = vec![0u8; header.pdu_len()];
                stream.read_exact(&mut pdu).unwrap();
                let address = u16::from_be_bytes([pdu[1], pdu[2]]) as usize;

                let reply_pdu: Vec<u8> = match pdu[0] {
                    0x01 => vec![0x01, 0x01, coils[address] as u8],
                    0x05 => match exception_on_write {
                        Some(code) => vec![0x85, code],
                        None => {
                            coils[address] = u16::from_be_bytes([pdu[3], pdu[4]]) == COIL_ON;
                            pdu.clone()
                        },
                    },
                    other => vec![other | 0x80, 0x01],
                };

                let mut reply = Vec::new();
                reply.extend_from_slice(&header.transaction_id.to_be_bytes());
                reply.extend_from_slice(&0u16.to_be_bytes());
                reply.extend_from_slice(&((reply_pdu.len() + 1) as u16).to_be_bytes());
                reply.push(header.unit_id);
                reply.extend_from_slice(&reply_pdu);
                stream.write_all(&reply).unwrap();
            }
        });
        (port, handle)
    }

    /// 每个连接各用一个线程服务的线圈从站；第一个应答延迟 `first_reply_delay` 才发出
    fn spawn_slow_first_reply_server(
        connections: usize,
        first_reply_delay: Duration,
    ) -> (u16, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let coils = Arc::new(Mutex::new([false; 16]));
            let delayed = Arc::new(AtomicBool::new(false));
            let workers: Vec<_> = listener
                .incoming()
                .take(connections)
                .map(|stream| {
                    let mut stream = stream.unwrap();
                    let coils = coils.clone();
                    let delayed = delayed.clone();
                    thread::spawn(move || {
                        loop {
                            let mut header_buf = [0u8; MBAP_HEADER_LEN];
                            if stream.read_exact(&mut header_buf).is_err() {
                                break;
                            }
                            let header = MbapHeader::decode(&header_buf).unwrap();
                            let mut pdu = vec![0u8; header.pdu_len()];
                            if stream.read_exact(&mut pdu).is_err() {
                                break;
                            }
                            let address = u16::from_be_bytes([pdu[1], pdu[2]]) as usize;
                            let reply_pdu = {
                                let mut coils = coils.lock();
                                match pdu[0] {
                                    0x01 => vec![0x01, 0x01, coils[address] as u8],
                                    _ => {
                                        coils[address] =
                                            u16::from_be_bytes([pdu[3], pdu[4]]) == COIL_ON;
                                        pdu.clone()
                                    },
                                }
                            };
                            if !delayed.swap(true, Ordering::SeqCst) {
                                thread::sleep(first_reply_delay);
                            }

                            let mut reply = Vec::new();
                            reply.extend_from_slice(&header.transaction_id.to_be_bytes());
                            reply.extend_from_slice(&0u16.to_be_bytes());
                            reply.extend_from_slice(&((reply_pdu.len() + 1) as u16).to_be_bytes());
                            reply.push(header.unit_id);
                            reply.extend_from_slice(&reply_pdu);
                            // 客户端可能已经关闭了这个连接
                            if stream.write_all(&reply).is_err() {
                                break;
                            }
                        }
                    })
                })
                .collect();
            for worker in workers {
                worker.join().unwrap();
            }
        });
        (port, handle)
    }

    fn local_config(port: u16) -> ModbusTcpConfig {
        ModbusTcpConfig {
            host: "127.0.0.1".to_string(),
            port,
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = ModbusTcpConfig::default();
        assert_eq!(config.endpoint(), "192.168.1.8:502");
        assert_eq!(config.unit_id, 1);
    }

    #[test]
    fn test_write_then_read_coil() {
        let (port, server) = spawn_fake_server(None);
        let mut actuator = ModbusTcpActuator::new(local_config(port));
        actuator.connect().unwrap();

        let coil = CoilAddress(8);
        assert_eq!(actuator.read_state(coil).unwrap(), ActuatorState::Off);
        actuator.write_state(coil, ActuatorState::On).unwrap();
        assert_eq!(actuator.read_state(coil).unwrap(), ActuatorState::On);
        actuator.write_state(coil, ActuatorState::Off).unwrap();
        assert_eq!(actuator.read_state(coil).unwrap(), ActuatorState::Off);

        actuator.disconnect().unwrap();
        assert!(!actuator.is_connected());
        server.join().unwrap();
    }

    #[test]
    fn test_exception_response_is_protocol_error() {
        let (port, server) = spawn_fake_server(Some(0x04));
        let mut actuator = ModbusTcpActuator::new(local_config(port));
        actuator.connect().unwrap();

        let err = actuator
            .write_state(CoilAddress(8), ActuatorState::On)
            .unwrap_err();
        assert!(err.is_protocol(), "unexpected error: {:?}", err);

        actuator.disconnect().unwrap();
        server.join().unwrap();
    }

    #[test]
    fn test_late_reply_does_not_desync_later_transactions() {
        let (port, server) = spawn_slow_first_reply_server(2, Duration::from_millis(300));
        let mut actuator = ModbusTcpActuator::new(ModbusTcpConfig {
            timeout: Duration::from_millis(100),
            ..local_config(port)
        });
        actuator.connect().unwrap();

        let coil = CoilAddress(8);
        let err = actuator.read_state(coil).unwrap_err();
        assert!(matches!(err, LinkError::Timeout), "unexpected error: {:?}", err);
        assert!(actuator.is_connected());

        // 之后每次调用都拿到自己的应答
        for _ in 0..3 {
            assert_eq!(actuator.read_state(coil).unwrap(), ActuatorState::Off);
        }
        actuator.write_state(coil, ActuatorState::On).unwrap();
        assert_eq!(actuator.read_state(coil).unwrap(), ActuatorState::On);

        actuator.disconnect().unwrap();
        assert!(!actuator.is_connected());
        assert!(matches!(
            actuator.read_state(coil),
            Err(LinkError::NotConnected)
        ));
        server.join().unwrap();
    }

    #[test]
    fn test_io_before_connect_fails() {
        let mut actuator = ModbusTcpActuator::new(ModbusTcpConfig::default());
        let err = actuator.read_state(CoilAddress(8)).unwrap_err();
        assert!(matches!(err, LinkError::NotConnected));
    }

    #[test]
    fn test_connect_refused_is_connectivity_error() {
        // 绑定后立即释放，得到一个大概率无人监听的端口
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut actuator = ModbusTcpActuator::new(local_config(port));
        let err = actuator.connect().unwrap_err();
        assert!(err.is_connectivity(), "unexpected error: {:?}", err);
    }
}
