// lib.rs

pub mod config;
pub mod core;
pub mod crc;
pub mod device;
pub mod logging;
pub mod modbus_rtu;
pub mod mt53r;
pub mod registers;
pub mod transport;

pub use config::{Baudrate, Parity, SerialConfig, StopBits, TransportConfig};
pub use crate::core::{ExceptionCode, FrameError, Pdu, RegisterBlock};
pub use device::Device;
pub use modbus_rtu::{Frame, decode_response, encode_request};
pub use registers::{
    Access, DataType, RegisterDescriptor, RegisterMap, Value, WordOrder, decode_bytes,
    decode_value, encode_bytes, encode_value,
};
pub use transport::{RtuTransport, SerialLink, Transport};

pub type Result<T> = std::result::Result<T, ModbusError>;

#[derive(Debug, thiserror::Error)]
pub enum ModbusError {
    #[error("Timed out waiting for response ({received} bytes received)")]
    Timeout { received: usize },

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Access denied: field {field} is {access}")]
    AccessDenied { field: String, access: Access },

    #[error("Value out of range for field {field}: {reason}")]
    Range { field: String, reason: String },

    #[error("Cannot decode field {field}: {reason}")]
    Decoding { field: String, reason: String },

    #[error("Unknown device model with hardware id {0}")]
    UnknownModel(u16),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl ModbusError {
    /// Transient link errors the transport re-sends the request for.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ModbusError::Timeout { .. }
                | ModbusError::Frame(
                    FrameError::Checksum { .. }
                        | FrameError::Malformed(_)
                        | FrameError::UnexpectedReply { .. }
                )
        )
    }

    pub fn exception_code(&self) -> Option<ExceptionCode> {
        match self {
            ModbusError::Frame(FrameError::Exception { code, .. }) => Some(*code),
            _ => None,
        }
    }
}
