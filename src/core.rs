use std::fmt;

use thiserror::Error;

pub const READ_HOLDING_REGISTERS: u8 = 0x03;
pub const WRITE_SINGLE_REGISTER: u8 = 0x06;
pub const WRITE_MULTIPLE_REGISTERS: u8 = 0x10;

/// Set on the function code of an exception reply.
pub const EXCEPTION_FLAG: u8 = 0x80;

/// RS485 ADU (256) - slave address (1) - CRC (2).
pub const MAX_PDU_SIZE: usize = 253;

/// 1 + 1 + 2N <= 253
pub const MAX_READ_REGISTERS: u16 = 125;

/// 1 + 2 + 2 + 1 + 2N <= 253
pub const MAX_WRITE_REGISTERS: u16 = 123;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Payload too large: {len} bytes, max {max}")]
    Encoding { len: usize, max: usize },

    #[error("CRC mismatch: expected {expected:#06x}, received {received:#06x}")]
    Checksum { expected: u16, received: u16 },

    #[error("Malformed frame: {0}")]
    Malformed(String),

    #[error(
        "Unexpected reply: expected unit {expected_unit} function {expected_function:#04x}, \
         got unit {unit} function {function:#04x}"
    )]
    UnexpectedReply {
        expected_unit: u8,
        expected_function: u8,
        unit: u8,
        function: u8,
    },

    #[error("Modbus exception: function code {function_code:#04x}, {code}")]
    Exception {
        function_code: u8,
        code: ExceptionCode,
    },

    #[error("Start address is empty")]
    AddressIsEmpty,

    #[error("Invalid register count {0}: expected 1..={1}")]
    InvalidLength(u16, u16),

    #[error("Invalid range: {0} + {1} > 65536")]
    RangeToMatch(u16, u16),

    #[error("Data length mismatch: expected {expected}, got {actual}")]
    DataLengthMismatch { expected: usize, actual: usize },
}

/// Standard Modbus exception codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionCode {
    IllegalFunction,
    IllegalDataAddress,
    IllegalDataValue,
    SlaveDeviceFailure,
    /// The request was accepted but needs time; the caller must poll for completion.
    Acknowledge,
    SlaveDeviceBusy,
    MemoryParityError,
    GatewayPathUnavailable,
    GatewayTargetFailedToRespond,
    Other(u8),
}

impl ExceptionCode {
    pub fn code(self) -> u8 {
        match self {
            ExceptionCode::IllegalFunction => 0x01,
            ExceptionCode::IllegalDataAddress => 0x02,
            ExceptionCode::IllegalDataValue => 0x03,
            ExceptionCode::SlaveDeviceFailure => 0x04,
            ExceptionCode::Acknowledge => 0x05,
            ExceptionCode::SlaveDeviceBusy => 0x06,
            ExceptionCode::MemoryParityError => 0x08,
            ExceptionCode::GatewayPathUnavailable => 0x0A,
            ExceptionCode::GatewayTargetFailedToRespond => 0x0B,
            ExceptionCode::Other(code) => code,
        }
    }
}

impl From<u8> for ExceptionCode {
    fn from(code: u8) -> Self {
        match code {
            0x01 => ExceptionCode::IllegalFunction,
            0x02 => ExceptionCode::IllegalDataAddress,
            0x03 => ExceptionCode::IllegalDataValue,
            0x04 => ExceptionCode::SlaveDeviceFailure,
            0x05 => ExceptionCode::Acknowledge,
            0x06 => ExceptionCode::SlaveDeviceBusy,
            0x08 => ExceptionCode::MemoryParityError,
            0x0A => ExceptionCode::GatewayPathUnavailable,
            0x0B => ExceptionCode::GatewayTargetFailedToRespond,
            other => ExceptionCode::Other(other),
        }
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ExceptionCode::IllegalFunction => "illegal function",
            ExceptionCode::IllegalDataAddress => "illegal data address",
            ExceptionCode::IllegalDataValue => "illegal data value",
            ExceptionCode::SlaveDeviceFailure => "slave device failure",
            ExceptionCode::Acknowledge => "acknowledge",
            ExceptionCode::SlaveDeviceBusy => "slave device busy",
            ExceptionCode::MemoryParityError => "memory parity error",
            ExceptionCode::GatewayPathUnavailable => "gateway path unavailable",
            ExceptionCode::GatewayTargetFailedToRespond => "gateway target failed to respond",
            ExceptionCode::Other(_) => "unknown exception",
        };
        write!(f, "{} ({:#04x})", text, self.code())
    }
}

/// Function code plus request data, without address or CRC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdu {
    pub function_code: u8,
    pub data: Vec<u8>,
}

/// A contiguous run of holding registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterBlock {
    start_addr: u16,
    length: u16,
}

pub struct RegisterBlockBuilder {
    start_addr: Option<u16>,
    length: Option<u16>,
}

impl RegisterBlockBuilder {
    pub fn address(mut self, addr: u16) -> Self {
        self.start_addr = Some(addr);
        self
    }

    pub fn length(mut self, length: u16) -> Self {
        self.length = Some(length);
        self
    }

    pub fn build(self) -> Result<RegisterBlock, FrameError> {
        let start_addr = self.start_addr.ok_or(FrameError::AddressIsEmpty)?;
        let length = self.length.unwrap_or(1);
        if length == 0 || length > MAX_READ_REGISTERS {
            return Err(FrameError::InvalidLength(length, MAX_READ_REGISTERS));
        }
        if start_addr as u32 + length as u32 > 0x1_0000 {
            return Err(FrameError::RangeToMatch(start_addr, length));
        }
        Ok(RegisterBlock { start_addr, length })
    }
}

impl RegisterBlock {
    pub fn builder() -> RegisterBlockBuilder {
        RegisterBlockBuilder {
            start_addr: None,
            length: None,
        }
    }

    pub fn address(&self) -> u16 {
        self.start_addr
    }

    pub fn length(&self) -> u16 {
        self.length
    }

    pub fn read_request(&self) -> Pdu {
        let mut data = Vec::with_capacity(4);
        data.extend_from_slice(&self.start_addr.to_be_bytes());
        data.extend_from_slice(&self.length.to_be_bytes());
        Pdu {
            function_code: READ_HOLDING_REGISTERS,
            data,
        }
    }

    /// Single-register blocks use 0x06, anything longer 0x10.
    pub fn write_request(&self, values: &[u16]) -> Result<Pdu, FrameError> {
        if values.len() != self.length as usize {
            return Err(FrameError::DataLengthMismatch {
                expected: self.length as usize,
                actual: values.len(),
            });
        }

        if self.length == 1 {
            let mut data = Vec::with_capacity(4);
            data.extend_from_slice(&self.start_addr.to_be_bytes());
            data.extend_from_slice(&values[0].to_be_bytes());
            return Ok(Pdu {
                function_code: WRITE_SINGLE_REGISTER,
                data,
            });
        }

        if self.length > MAX_WRITE_REGISTERS {
            return Err(FrameError::InvalidLength(self.length, MAX_WRITE_REGISTERS));
        }

        let mut data = Vec::with_capacity(5 + values.len() * 2);
        data.extend_from_slice(&self.start_addr.to_be_bytes());
        data.extend_from_slice(&self.length.to_be_bytes());
        data.push((values.len() * 2) as u8);
        for value in values {
            data.extend_from_slice(&value.to_be_bytes());
        }
        Ok(Pdu {
            function_code: WRITE_MULTIPLE_REGISTERS,
            data,
        })
    }

    /// Parses the data of a 0x03 reply: byte count followed by the registers.
    pub fn parse_read_reply(&self, data: &[u8]) -> Result<Vec<u16>, FrameError> {
        let Some((&byte_count, registers)) = data.split_first() else {
            return Err(FrameError::Malformed("empty read reply".to_string()));
        };

        let expected_bytes = self.length as usize * 2;
        if byte_count as usize != expected_bytes || registers.len() != expected_bytes {
            return Err(FrameError::Malformed(format!(
                "read reply carries {} bytes (byte count {}), expected {}",
                registers.len(),
                byte_count,
                expected_bytes
            )));
        }

        Ok(registers
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect())
    }

    /// Checks the echo a device sends back for 0x06 and 0x10.
    pub fn check_write_reply(&self, request: &Pdu, data: &[u8]) -> Result<(), FrameError> {
        let expected = match request.function_code {
            WRITE_SINGLE_REGISTER => &request.data[..],
            _ => &request.data[..4.min(request.data.len())],
        };
        if data != expected {
            return Err(FrameError::Malformed(format!(
                "write echo mismatch: sent {}, received {}",
                hex::encode(expected),
                hex::encode(data)
            )));
        }
        Ok(())
    }
}
