//! Matis MT53RA-sx auto-recloser.
//!
//! The register catalog is an exhaustive `match` over [`Field`], so every
//! field the model exposes is known to the map the moment it is built.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serialport::SerialPort;
use tracing::info;

use crate::config::{Baudrate, Parity, StopBits, TransportConfig};
use crate::device::Device;
use crate::registers::{Access, DataType, RegisterDescriptor, RegisterMap, Value, WordOrder};
use crate::transport::{RtuTransport, Transport};
use crate::{ModbusError, Result};

pub const HARDWARE_ID: u16 = 523;

/// Written to `system_status_control` to soft-reset the device.
pub const RESET_CODE: u16 = 2020;

pub const RECLOSE_ATTEMPTS: u8 = 10;

const WAIT_TIME_BASE: u16 = 0x32;
const STABLE_TIME_BASE: u16 = 0x3C;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    ModbusAddress,
    SerialBaudrate,
    SerialParity,
    SerialStopBits,
    SystemStatusControl,
    SystemUpgradeControl,
    SystemClock,
    HardwareId,
    FirmwareVersion,
    RecloseEnable,
    RecloseTimer,
    DisplayStatus,
    AuxOutputStatus,
    PadlockStatus,
    HandleLocation,
    RecloseStatus,
    Control,
    RemoteControlEnable,
    RecloseTotalAttempts,
    ClosingDelayCompensation,
    OpeningDelayCompensation,
    ClosingResetCompensation,
    OpeningResetCompensation,
    ClosingActionTime,
    OpeningActionTime,
    ClosingResetTime,
    OpeningResetTime,
    OpeningLockTime,
    UnlockResetTime,
    MotorRunningTime,
    CommandClosingTimes,
    CommandOpeningTimes,
    CommandLockTimes,
    ManualPadlockTimes,
    ManualClosingTimes,
    RecloseExhaustedTimer,
    RecloseCurrentAttempt,
    /// Seconds before reclose attempt 1..=10
    RecloseWaitTime(u8),
    /// Seconds the line must stay up after attempt 1..=10
    RecloseStableTime(u8),
}

const FIXED_FIELDS: [Field; 37] = [
    Field::ModbusAddress,
    Field::SerialBaudrate,
    Field::SerialParity,
    Field::SerialStopBits,
    Field::SystemStatusControl,
    Field::SystemUpgradeControl,
    Field::SystemClock,
    Field::HardwareId,
    Field::FirmwareVersion,
    Field::RecloseEnable,
    Field::RecloseTimer,
    Field::DisplayStatus,
    Field::AuxOutputStatus,
    Field::PadlockStatus,
    Field::HandleLocation,
    Field::RecloseStatus,
    Field::Control,
    Field::RemoteControlEnable,
    Field::RecloseTotalAttempts,
    Field::ClosingDelayCompensation,
    Field::OpeningDelayCompensation,
    Field::ClosingResetCompensation,
    Field::OpeningResetCompensation,
    Field::ClosingActionTime,
    Field::OpeningActionTime,
    Field::ClosingResetTime,
    Field::OpeningResetTime,
    Field::OpeningLockTime,
    Field::UnlockResetTime,
    Field::MotorRunningTime,
    Field::CommandClosingTimes,
    Field::CommandOpeningTimes,
    Field::CommandLockTimes,
    Field::ManualPadlockTimes,
    Field::ManualClosingTimes,
    Field::RecloseExhaustedTimer,
    Field::RecloseCurrentAttempt,
];

impl Field {
    /// Every field, in register address order.
    pub fn all() -> impl Iterator<Item = Field> {
        FIXED_FIELDS
            .into_iter()
            .chain((1..=RECLOSE_ATTEMPTS).map(Field::RecloseWaitTime))
            .chain((1..=RECLOSE_ATTEMPTS).map(Field::RecloseStableTime))
    }

    pub fn reclose_wait_time(attempt: u8) -> Result<Field> {
        check_attempt(attempt)?;
        Ok(Field::RecloseWaitTime(attempt))
    }

    pub fn reclose_stable_time(attempt: u8) -> Result<Field> {
        check_attempt(attempt)?;
        Ok(Field::RecloseStableTime(attempt))
    }

    pub fn name(self) -> Cow<'static, str> {
        let name = match self {
            Field::ModbusAddress => "modbus_address",
            Field::SerialBaudrate => "serial_baudrate",
            Field::SerialParity => "serial_parity",
            Field::SerialStopBits => "serial_stop_bits",
            Field::SystemStatusControl => "system_status_control",
            Field::SystemUpgradeControl => "system_upgrade_control",
            Field::SystemClock => "system_clock",
            Field::HardwareId => "hardware_id",
            Field::FirmwareVersion => "firmware_version",
            Field::RecloseEnable => "ar_enable",
            Field::RecloseTimer => "ar_timer",
            Field::DisplayStatus => "display_status",
            Field::AuxOutputStatus => "aux_output_status",
            Field::PadlockStatus => "padlock_status",
            Field::HandleLocation => "handle_location",
            Field::RecloseStatus => "ar_status",
            Field::Control => "control",
            Field::RemoteControlEnable => "remote_control_enable",
            Field::RecloseTotalAttempts => "ar_total_attempts",
            Field::ClosingDelayCompensation => "closing_delay_compensation",
            Field::OpeningDelayCompensation => "opening_delay_compensation",
            Field::ClosingResetCompensation => "closing_reset_compensation",
            Field::OpeningResetCompensation => "opening_reset_compensation",
            Field::ClosingActionTime => "closing_action_time",
            Field::OpeningActionTime => "opening_action_time",
            Field::ClosingResetTime => "closing_reset_time",
            Field::OpeningResetTime => "opening_reset_time",
            Field::OpeningLockTime => "opening_lock_time",
            Field::UnlockResetTime => "unlock_reset_time",
            Field::MotorRunningTime => "motor_running_time",
            Field::CommandClosingTimes => "command_closing_times",
            Field::CommandOpeningTimes => "command_opening_times",
            Field::CommandLockTimes => "command_lock_times",
            Field::ManualPadlockTimes => "manual_padlock_times",
            Field::ManualClosingTimes => "manual_closing_times",
            Field::RecloseExhaustedTimer => "ar_exhausted_timer",
            Field::RecloseCurrentAttempt => "ar_current_attempt",
            Field::RecloseWaitTime(n) => return Cow::Owned(format!("ar_wait_time_{}", n)),
            Field::RecloseStableTime(n) => return Cow::Owned(format!("ar_stable_time_{}", n)),
        };
        Cow::Borrowed(name)
    }

    pub fn descriptor(self) -> RegisterDescriptor {
        use Access::{Read, ReadWrite};

        let (address, data_type, access) = match self {
            Field::ModbusAddress => (0x00, DataType::U16, ReadWrite),
            Field::SerialBaudrate => (0x01, DataType::U16, ReadWrite),
            Field::SerialParity => (0x02, DataType::U16, ReadWrite),
            Field::SerialStopBits => (0x03, DataType::U16, ReadWrite),
            Field::SystemStatusControl => (0x04, DataType::U16, ReadWrite),
            Field::SystemUpgradeControl => (0x05, DataType::U16, ReadWrite),
            Field::SystemClock => (0x06, DataType::U32, Read),
            Field::HardwareId => (0x08, DataType::U16, Read),
            Field::FirmwareVersion => (0x09, DataType::U16, Read),
            Field::RecloseEnable => (0x0A, DataType::Bool, ReadWrite),
            Field::RecloseTimer => (0x0B, DataType::U16, Read),
            Field::DisplayStatus => (0x0C, DataType::U16, Read),
            Field::AuxOutputStatus => (0x0D, DataType::Bool, Read),
            Field::PadlockStatus => (0x0E, DataType::Bool, Read),
            Field::HandleLocation => (0x0F, DataType::U16, Read),
            Field::RecloseStatus => (0x10, DataType::U16, Read),
            Field::Control => (0x11, DataType::U16, ReadWrite),
            Field::RemoteControlEnable => (0x12, DataType::Bool, ReadWrite),
            Field::RecloseTotalAttempts => (0x13, DataType::U16, ReadWrite),
            Field::ClosingDelayCompensation => (0x14, DataType::U16, ReadWrite),
            Field::OpeningDelayCompensation => (0x15, DataType::U16, ReadWrite),
            Field::ClosingResetCompensation => (0x16, DataType::U16, ReadWrite),
            Field::OpeningResetCompensation => (0x17, DataType::U16, ReadWrite),
            Field::ClosingActionTime => (0x18, DataType::U16, Read),
            Field::OpeningActionTime => (0x19, DataType::U16, Read),
            Field::ClosingResetTime => (0x1A, DataType::U16, Read),
            Field::OpeningResetTime => (0x1B, DataType::U16, Read),
            Field::OpeningLockTime => (0x1C, DataType::U16, Read),
            Field::UnlockResetTime => (0x1D, DataType::U16, Read),
            Field::MotorRunningTime => (0x1F, DataType::U16, Read),
            Field::CommandClosingTimes => (0x2B, DataType::U16, Read),
            Field::CommandOpeningTimes => (0x2C, DataType::U16, Read),
            Field::CommandLockTimes => (0x2D, DataType::U16, Read),
            Field::ManualPadlockTimes => (0x2E, DataType::U16, Read),
            Field::ManualClosingTimes => (0x2F, DataType::U16, Read),
            Field::RecloseExhaustedTimer => (0x30, DataType::U16, Read),
            Field::RecloseCurrentAttempt => (0x31, DataType::U16, Read),
            Field::RecloseWaitTime(n) => (WAIT_TIME_BASE + n as u16 - 1, DataType::U16, ReadWrite),
            Field::RecloseStableTime(n) => {
                (STABLE_TIME_BASE + n as u16 - 1, DataType::U16, ReadWrite)
            }
        };

        let descriptor = RegisterDescriptor::new(self.name(), address, data_type, access);
        match self {
            Field::ModbusAddress => descriptor.with_range(0, u8::MAX as i64),
            // uptime: hours in the first register, seconds in the second
            Field::SystemClock => descriptor.with_word_order(WordOrder::Little),
            Field::RecloseTotalAttempts => descriptor.with_range(1, RECLOSE_ATTEMPTS as i64),
            Field::RecloseWaitTime(_) | Field::RecloseStableTime(_) => descriptor.with_range(5, 3599),
            _ => descriptor,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

fn check_attempt(attempt: u8) -> Result<()> {
    if !(1..=RECLOSE_ATTEMPTS).contains(&attempt) {
        return Err(ModbusError::InvalidArgument(format!(
            "Reclose attempt {} out of range [1, {}]",
            attempt, RECLOSE_ATTEMPTS
        )));
    }
    Ok(())
}

/// The MT53RA-sx register map.
pub fn register_map() -> Result<RegisterMap> {
    RegisterMap::new(Field::all().map(Field::descriptor).collect())
}

/// Remote control command written to the `control` register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Open = 1,
    Close = 2,
    Lock = 3,
    Unlock = 4,
}

/// Front LED status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayStatus {
    RedOn,
    GreenOn,
    RedFlash,
    GreenFlash,
    RedGreenFlash,
}

impl DisplayStatus {
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(DisplayStatus::RedOn),
            2 => Some(DisplayStatus::GreenOn),
            4 => Some(DisplayStatus::RedFlash),
            5 => Some(DisplayStatus::GreenFlash),
            15 => Some(DisplayStatus::RedGreenFlash),
            _ => None,
        }
    }
}

impl fmt::Display for DisplayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DisplayStatus::RedOn => "Red on",
            DisplayStatus::GreenOn => "Green on",
            DisplayStatus::RedFlash => "Red flash",
            DisplayStatus::GreenFlash => "Green flash",
            DisplayStatus::RedGreenFlash => "Red/Green flash",
        };
        f.write_str(s)
    }
}

/// Hall-effect sensor flags of the handle position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleLocation(pub u16);

impl HandleLocation {
    pub const OPEN: u16 = 0x0001;
    pub const RESET: u16 = 0x0002;
    pub const CLOSED: u16 = 0x0004;
    pub const MOTOR_FAULT: u16 = 0x0008;

    pub fn contains(self, flag: u16) -> bool {
        self.0 & flag == flag
    }
}

/// Auto-reclose state flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecloseStatus(pub u16);

impl RecloseStatus {
    pub const COMMAND_OPENING: u16 = 0x0002;
    pub const COMMAND_CLOSING: u16 = 0x0004;
    pub const COMMAND_LOCK: u16 = 0x0008;
    pub const COMMAND_UNLOCK: u16 = 0x0010;
    pub const AUTOMATIC_OPENING: u16 = 0x0020;
    pub const AUTOMATIC_CLOSING: u16 = 0x0040;
    pub const MANUAL_CLOSING: u16 = 0x0400;
    pub const FAULT_OPENING: u16 = 0x0800;
    pub const PADLOCKED: u16 = 0x8000;

    pub fn is_initial(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, flag: u16) -> bool {
        self.0 & flag == flag
    }
}

/// Serial settings stored in the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialSettings {
    pub baudrate: Baudrate,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

impl fmt::Display for SerialSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.baudrate, self.parity, self.stop_bits)
    }
}

/// Device models, told apart by the hardware id register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Model {
    Mt53r,
}

impl Model {
    pub fn from_hardware_id(id: u16) -> Result<Self> {
        match id {
            HARDWARE_ID => Ok(Model::Mt53r),
            other => Err(ModbusError::UnknownModel(other)),
        }
    }

    pub fn hardware_id(self) -> u16 {
        match self {
            Model::Mt53r => HARDWARE_ID,
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Model::Mt53r => f.write_str("MT53RA-sx"),
        }
    }
}

pub struct Mt53r<T> {
    device: Device<T>,
}

impl Mt53r<RtuTransport<Box<dyn SerialPort>>> {
    /// Opens the serial port and identifies the recloser at `address`.
    pub fn open(config: &TransportConfig, address: u8) -> Result<Self> {
        let transport = RtuTransport::open(config)?;
        let timeout = transport.timeout();
        let device = Device::new(transport, register_map()?, address).with_timeout(timeout);
        let recloser = Self::from_device(device)?;
        recloser.identify()?;
        Ok(recloser)
    }
}

impl<T: Transport> Mt53r<T> {
    pub fn new(transport: T, address: u8) -> Result<Self> {
        Self::from_device(Device::new(transport, register_map()?, address))
    }

    /// Like [`Mt53r::new`], but reads the hardware id first and refuses
    /// anything that is not an MT53RA-sx.
    pub fn connect(transport: T, address: u8) -> Result<Self> {
        let recloser = Self::new(transport, address)?;
        recloser.identify()?;
        Ok(recloser)
    }

    fn identify(&self) -> Result<Model> {
        let id = self.hardware_id()?;
        let model = Model::from_hardware_id(id)?;
        info!(%model, address = self.device.unit_id(), "Identified device");
        Ok(model)
    }

    /// Wraps an existing session; its map must define every [`Field`].
    pub fn from_device(device: Device<T>) -> Result<Self> {
        device.register_map().require(Field::all().map(Field::name))?;
        Ok(Self { device })
    }

    pub fn device(&self) -> &Device<T> {
        &self.device
    }

    pub fn get(&self, field: Field) -> Result<Value> {
        self.device.read(&field.name())
    }

    pub fn set(&self, field: Field, value: impl Into<Value>) -> Result<()> {
        self.device.write(&field.name(), value)
    }

    fn get_u16(&self, field: Field) -> Result<u16> {
        to_u16(field, self.get(field)?)
    }

    pub fn device_address(&self) -> Result<u8> {
        let value = self.get_u16(Field::ModbusAddress)?;
        u8::try_from(value).map_err(|_| decoding(Field::ModbusAddress, value))
    }

    /// Changes the device's bus address and follows it.
    pub fn set_device_address(&mut self, address: u8) -> Result<()> {
        self.set(Field::ModbusAddress, address)?;
        info!(from = self.device.unit_id(), to = address, "Device address changed");
        self.device.set_unit_id(address);
        Ok(())
    }

    /// Reads baud rate, parity and stop bits in one transaction.
    pub fn serial_config(&self) -> Result<SerialSettings> {
        let fields = [Field::SerialBaudrate, Field::SerialParity, Field::SerialStopBits];
        let names = fields.map(Field::name);
        let values = self.device.read_many(&names)?;

        let codes = fields
            .iter()
            .zip(values)
            .map(|(&field, value)| to_u16(field, value))
            .collect::<Result<Vec<_>>>()?;

        Ok(SerialSettings {
            baudrate: Baudrate::from_register_code(codes[0])
                .ok_or_else(|| decoding(Field::SerialBaudrate, codes[0]))?,
            parity: Parity::from_register_code(codes[1])
                .ok_or_else(|| decoding(Field::SerialParity, codes[1]))?,
            stop_bits: StopBits::from_register_code(codes[2])
                .ok_or_else(|| decoding(Field::SerialStopBits, codes[2]))?,
        })
    }

    /// Writes baud rate, parity and stop bits, in that order.
    pub fn set_serial_config(&self, settings: &SerialSettings) -> Result<()> {
        self.set(Field::SerialBaudrate, settings.baudrate.register_code())?;
        self.set(Field::SerialParity, settings.parity.register_code())?;
        self.set(Field::SerialStopBits, settings.stop_bits.register_code())
    }

    pub fn uptime(&self) -> Result<Duration> {
        let raw = self
            .get(Field::SystemClock)?
            .as_i64()
            .ok_or_else(|| decoding(Field::SystemClock, "non-integral"))?;
        let hours = (raw & 0xFFFF) as u64;
        let seconds = ((raw >> 16) & 0xFFFF) as u64;
        Ok(Duration::from_secs(hours * 3600 + seconds))
    }

    pub fn hardware_id(&self) -> Result<u16> {
        self.get_u16(Field::HardwareId)
    }

    pub fn firmware_version(&self) -> Result<u16> {
        self.get_u16(Field::FirmwareVersion)
    }

    pub fn display_status(&self) -> Result<DisplayStatus> {
        let code = self.get_u16(Field::DisplayStatus)?;
        DisplayStatus::from_code(code).ok_or_else(|| decoding(Field::DisplayStatus, code))
    }

    pub fn handle_location(&self) -> Result<HandleLocation> {
        Ok(HandleLocation(self.get_u16(Field::HandleLocation)?))
    }

    pub fn reclose_status(&self) -> Result<RecloseStatus> {
        Ok(RecloseStatus(self.get_u16(Field::RecloseStatus)?))
    }

    fn control(&self, command: ControlCommand) -> Result<()> {
        info!(?command, unit_id = self.device.unit_id(), "Sending control command");
        self.set(Field::Control, command as u16)
    }

    pub fn open_breaker(&self) -> Result<()> {
        self.control(ControlCommand::Open)
    }

    pub fn close_breaker(&self) -> Result<()> {
        self.control(ControlCommand::Close)
    }

    pub fn lock_breaker(&self) -> Result<()> {
        self.control(ControlCommand::Lock)
    }

    pub fn unlock_breaker(&self) -> Result<()> {
        self.control(ControlCommand::Unlock)
    }

    /// Soft reset.
    pub fn reset(&self) -> Result<()> {
        info!(unit_id = self.device.unit_id(), "Resetting device");
        self.set(Field::SystemStatusControl, RESET_CODE)
    }

    pub fn set_reclose_enabled(&self, enabled: bool) -> Result<()> {
        self.set(Field::RecloseEnable, enabled)
    }

    pub fn set_reclose_attempts(&self, attempts: u16) -> Result<()> {
        self.set(Field::RecloseTotalAttempts, attempts)
    }

    pub fn set_reclose_wait_time(&self, attempt: u8, seconds: u16) -> Result<()> {
        self.set(Field::reclose_wait_time(attempt)?, seconds)
    }

    pub fn set_reclose_stable_time(&self, attempt: u8, seconds: u16) -> Result<()> {
        self.set(Field::reclose_stable_time(attempt)?, seconds)
    }

    /// Every field in a single transaction.
    pub fn fetch(&self) -> Result<Vec<(Field, Value)>> {
        let fields: Vec<Field> = Field::all().collect();
        let names: Vec<_> = fields.iter().map(|field| field.name()).collect();
        let values = self.device.read_many(&names)?;
        Ok(fields.into_iter().zip(values).collect())
    }
}

fn to_u16(field: Field, value: Value) -> Result<u16> {
    value
        .as_i64()
        .and_then(|raw| u16::try_from(raw).ok())
        .ok_or_else(|| decoding(field, value))
}

fn decoding(field: Field, value: impl fmt::Display) -> ModbusError {
    ModbusError::Decoding {
        field: field.name().into_owned(),
        reason: format!("unexpected value {}", value),
    }
}

/// Operations offered to an interactive shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    DeviceAddress,
    SetDeviceAddress(u8),
    SerialConfig,
    SetSerialConfig(SerialSettings),
    Status,
    Uptime,
    Reset,
    SetRecloseAttempts(u16),
    SetRecloseWaitTime { attempt: u8, seconds: u16 },
    SetRecloseStableTime { attempt: u8, seconds: u16 },
    Open,
    Close,
    Lock,
    Unlock,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutput {
    Done,
    Address(u8),
    SerialConfig(SerialSettings),
    Status(Vec<(Field, Value)>),
    Uptime(Duration),
}

impl Command {
    pub const NAMES: [&'static str; 14] = [
        "device_address",
        "set_device_address",
        "serial_config",
        "set_serial_config",
        "status",
        "uptime",
        "reset",
        "set_auto_reclose_attempts",
        "set_auto_reclose_wait_time",
        "set_auto_reclose_stable_time",
        "open",
        "close",
        "lock",
        "unlock",
    ];

    pub fn execute<T: Transport>(&self, device: &mut Mt53r<T>) -> Result<CommandOutput> {
        match *self {
            Command::DeviceAddress => Ok(CommandOutput::Address(device.device_address()?)),
            Command::SetDeviceAddress(address) => {
                device.set_device_address(address)?;
                Ok(CommandOutput::Done)
            }
            Command::SerialConfig => Ok(CommandOutput::SerialConfig(device.serial_config()?)),
            Command::SetSerialConfig(settings) => {
                device.set_serial_config(&settings)?;
                Ok(CommandOutput::Done)
            }
            Command::Status => Ok(CommandOutput::Status(device.fetch()?)),
            Command::Uptime => Ok(CommandOutput::Uptime(device.uptime()?)),
            Command::Reset => device.reset().map(|_| CommandOutput::Done),
            Command::SetRecloseAttempts(attempts) => device
                .set_reclose_attempts(attempts)
                .map(|_| CommandOutput::Done),
            Command::SetRecloseWaitTime { attempt, seconds } => device
                .set_reclose_wait_time(attempt, seconds)
                .map(|_| CommandOutput::Done),
            Command::SetRecloseStableTime { attempt, seconds } => device
                .set_reclose_stable_time(attempt, seconds)
                .map(|_| CommandOutput::Done),
            Command::Open => device.open_breaker().map(|_| CommandOutput::Done),
            Command::Close => device.close_breaker().map(|_| CommandOutput::Done),
            Command::Lock => device.lock_breaker().map(|_| CommandOutput::Done),
            Command::Unlock => device.unlock_breaker().map(|_| CommandOutput::Done),
        }
    }
}

impl FromStr for Command {
    type Err = ModbusError;

    /// Parses a shell line such as `set_auto_reclose_wait_time 3 60`.
    fn from_str(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let name = words
            .next()
            .ok_or_else(|| ModbusError::InvalidArgument("Empty command".to_string()))?;
        let args: Vec<&str> = words.collect();

        let arity = match name {
            "set_device_address" | "set_auto_reclose_attempts" => 1,
            "set_auto_reclose_wait_time" | "set_auto_reclose_stable_time" => 2,
            "set_serial_config" => 3,
            _ => 0,
        };
        if args.len() != arity {
            return Err(ModbusError::InvalidArgument(format!(
                "{} takes {} arguments, got {}",
                name,
                arity,
                args.len()
            )));
        }

        let command = match name {
            "device_address" => Command::DeviceAddress,
            "set_device_address" => Command::SetDeviceAddress(parse_arg(name, args[0])?),
            "serial_config" => Command::SerialConfig,
            "set_serial_config" => Command::SetSerialConfig(SerialSettings {
                baudrate: args[0].parse()?,
                parity: args[1].parse()?,
                stop_bits: args[2].parse()?,
            }),
            "status" => Command::Status,
            "uptime" => Command::Uptime,
            "reset" => Command::Reset,
            "set_auto_reclose_attempts" => Command::SetRecloseAttempts(parse_arg(name, args[0])?),
            "set_auto_reclose_wait_time" => Command::SetRecloseWaitTime {
                attempt: parse_arg(name, args[0])?,
                seconds: parse_arg(name, args[1])?,
            },
            "set_auto_reclose_stable_time" => Command::SetRecloseStableTime {
                attempt: parse_arg(name, args[0])?,
                seconds: parse_arg(name, args[1])?,
            },
            "open" => Command::Open,
            "close" => Command::Close,
            "lock" => Command::Lock,
            "unlock" => Command::Unlock,
            other => {
                return Err(ModbusError::InvalidArgument(format!(
                    "Unknown command {}",
                    other
                )));
            }
        };
        Ok(command)
    }
}

fn parse_arg<V>(command: &str, arg: &str) -> Result<V>
where
    V: FromStr,
    V::Err: fmt::Display,
{
    arg.parse().map_err(|e| {
        ModbusError::InvalidArgument(format!("{}: invalid argument {:?}: {}", command, arg, e))
    })
}
