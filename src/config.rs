//! Serial port settings plus the timing and retry policy of the RTU transport.
//!
//! Every knob has a documented default so a bare `TransportConfig::default()`
//! talks to a factory-configured device on `/dev/ttyACM0`.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ModbusError, Result};

/// Serial port settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Serial port path (e.g. "/dev/ttyUSB0", "COM1")
    #[serde(default = "default_port")]
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Data bits (5, 6, 7, 8)
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_parity")]
    pub parity: Parity,
    #[serde(default)]
    pub stop_bits: StopBits,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            parity: default_parity(),
            stop_bits: StopBits::default(),
        }
    }
}

impl SerialConfig {
    /// Bits on the wire per character: start + data + parity + stop.
    pub fn bits_per_char(&self) -> u32 {
        let parity = match self.parity {
            Parity::None => 0,
            Parity::Even | Parity::Odd => 1,
        };
        let stop = match self.stop_bits {
            StopBits::One => 1,
            // rounded up; the silence it feeds is a lower bound
            StopBits::OnePointFive | StopBits::Two => 2,
        };
        1 + self.data_bits as u32 + parity + stop
    }

    pub fn char_time(&self) -> Duration {
        Duration::from_micros(self.bits_per_char() as u64 * 1_000_000 / self.baud_rate.max(1) as u64)
    }

    /// 3.5 character times, fixed at 1.75 ms above 19200 baud.
    pub fn frame_gap(&self) -> Duration {
        if self.baud_rate > 19_200 {
            Duration::from_micros(1_750)
        } else {
            self.char_time() * 7 / 2
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.port.is_empty() {
            return Err(ModbusError::Config("Port path cannot be empty".to_string()));
        }
        if self.baud_rate == 0 {
            return Err(ModbusError::Config(
                "Baud rate must be greater than zero".to_string(),
            ));
        }
        if !(5..=8).contains(&self.data_bits) {
            return Err(ModbusError::Config(format!(
                "Data bits must be 5, 6, 7 or 8, got {}",
                self.data_bits
            )));
        }
        Ok(())
    }
}

/// Transport configuration passed to `RtuTransport` at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default)]
    pub serial: SerialConfig,
    /// Response deadline per attempt
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Re-sends after a timeout, CRC error or malformed reply
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Inter-frame silence override; derived from the baud rate when absent
    #[serde(default)]
    pub frame_gap_us: Option<u64>,
    /// Floor on the spacing between two requests. Devices behind USB
    /// adapters drop commands that arrive faster than this.
    #[serde(default = "default_min_request_interval_ms")]
    pub min_request_interval_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            timeout_ms: default_timeout_ms(),
            retries: default_retries(),
            frame_gap_us: None,
            min_request_interval_ms: default_min_request_interval_ms(),
        }
    }
}

impl TransportConfig {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text)
            .map_err(|e| ModbusError::Config(format!("Invalid transport config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&text)
    }

    pub fn validate(&self) -> Result<()> {
        self.serial.validate()?;
        if self.timeout_ms == 0 {
            return Err(ModbusError::Config(
                "Timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn frame_gap(&self) -> Duration {
        self.frame_gap_us
            .map(Duration::from_micros)
            .unwrap_or_else(|| self.serial.frame_gap())
    }

    /// Silence enforced before each transmission.
    pub fn request_spacing(&self) -> Duration {
        self.frame_gap()
            .max(Duration::from_millis(self.min_request_interval_ms))
    }
}

fn default_port() -> String {
    "/dev/ttyACM0".to_string()
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

fn default_parity() -> Parity {
    Parity::Even
}

fn default_timeout_ms() -> u64 {
    1000
}

fn default_retries() -> u32 {
    3
}

fn default_min_request_interval_ms() -> u64 {
    10
}

/// Baud rates a Matis device can be configured for, with their register codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Baudrate {
    B2400,
    B4800,
    B9600,
}

impl Baudrate {
    pub fn bps(self) -> u32 {
        match self {
            Baudrate::B2400 => 2400,
            Baudrate::B4800 => 4800,
            Baudrate::B9600 => 9600,
        }
    }

    pub fn register_code(self) -> u16 {
        match self {
            Baudrate::B2400 => 1,
            Baudrate::B4800 => 2,
            Baudrate::B9600 => 3,
        }
    }

    pub fn from_register_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(Baudrate::B2400),
            2 => Some(Baudrate::B4800),
            3 => Some(Baudrate::B9600),
            _ => None,
        }
    }
}

impl FromStr for Baudrate {
    type Err = ModbusError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "2400" => Ok(Baudrate::B2400),
            "4800" => Ok(Baudrate::B4800),
            "9600" => Ok(Baudrate::B9600),
            other => Err(ModbusError::InvalidArgument(format!(
                "Unknown baudrate value {}",
                other
            ))),
        }
    }
}

impl fmt::Display for Baudrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bps())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Even,
    Odd,
}

impl Parity {
    pub fn register_code(self) -> u16 {
        match self {
            Parity::None => 1,
            Parity::Even => 2,
            Parity::Odd => 3,
        }
    }

    pub fn from_register_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(Parity::None),
            2 => Some(Parity::Even),
            3 => Some(Parity::Odd),
            _ => None,
        }
    }
}

impl FromStr for Parity {
    type Err = ModbusError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "n" | "none" => Ok(Parity::None),
            "e" | "even" => Ok(Parity::Even),
            "o" | "odd" => Ok(Parity::Odd),
            _ => Err(ModbusError::InvalidArgument(format!(
                "Unknown parity value {}",
                s
            ))),
        }
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Parity::None => "N",
            Parity::Even => "E",
            Parity::Odd => "O",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StopBits {
    #[default]
    #[serde(rename = "1")]
    One,
    /// Reported by devices; host serial ports cannot open with it.
    #[serde(rename = "1.5")]
    OnePointFive,
    #[serde(rename = "2")]
    Two,
}

impl StopBits {
    pub fn register_code(self) -> u16 {
        match self {
            StopBits::One => 1,
            StopBits::OnePointFive => 2,
            StopBits::Two => 3,
        }
    }

    pub fn from_register_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(StopBits::One),
            2 => Some(StopBits::OnePointFive),
            3 => Some(StopBits::Two),
            _ => None,
        }
    }
}

impl FromStr for StopBits {
    type Err = ModbusError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "1" => Ok(StopBits::One),
            "1.5" => Ok(StopBits::OnePointFive),
            "2" => Ok(StopBits::Two),
            other => Err(ModbusError::InvalidArgument(format!(
                "Unknown stop_bits value {}",
                other
            ))),
        }
    }
}

impl fmt::Display for StopBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopBits::One => "1",
            StopBits::OnePointFive => "1.5",
            StopBits::Two => "2",
        };
        f.write_str(s)
    }
}
