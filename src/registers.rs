//! Declarative register tables and typed value conversion.
//!
//! A [`RegisterMap`] is validated once when it is built; lookups afterwards
//! can only fail for names outside the table.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::MAX_READ_REGISTERS;
use crate::{ModbusError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    U16,
    I16,
    U32,
    I32,
    F32,
    /// One register, zero is false.
    Bool,
}

impl DataType {
    pub fn register_count(self) -> u16 {
        match self {
            DataType::U16 | DataType::I16 | DataType::Bool => 1,
            DataType::U32 | DataType::I32 | DataType::F32 => 2,
        }
    }

    fn bounds(self) -> (i64, i64) {
        match self {
            DataType::U16 => (0, u16::MAX as i64),
            DataType::I16 => (i16::MIN as i64, i16::MAX as i64),
            DataType::U32 => (0, u32::MAX as i64),
            DataType::I32 => (i32::MIN as i64, i32::MAX as i64),
            DataType::Bool => (0, 1),
            DataType::F32 => (i64::MIN, i64::MAX),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataType::U16 => "u16",
            DataType::I16 => "i16",
            DataType::U32 => "u32",
            DataType::I32 => "i32",
            DataType::F32 => "f32",
            DataType::Bool => "bool",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

impl Access {
    pub fn is_readable(self) -> bool {
        matches!(self, Access::Read | Access::ReadWrite)
    }

    pub fn is_writable(self) -> bool {
        matches!(self, Access::Write | Access::ReadWrite)
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Access::Read => "read-only",
            Access::Write => "write-only",
            Access::ReadWrite => "read-write",
        };
        f.write_str(s)
    }
}

/// Order of the 16-bit words of a 32-bit value. Bytes inside each
/// register are always big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WordOrder {
    /// High word first
    #[default]
    Big,
    /// Low word first
    Little,
}

/// A decoded register value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl Value {
    pub fn as_f64(self) -> f64 {
        match self {
            Value::Bool(b) => b as u8 as f64,
            Value::Int(i) => i as f64,
            Value::Float(f) => f,
        }
    }

    /// Integral values only; a float with a fractional part yields `None`.
    pub fn as_i64(self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(b as i64),
            Value::Int(i) => Some(i),
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(f as i64),
            Value::Float(_) => None,
        }
    }

    pub fn as_bool(self) -> bool {
        match self {
            Value::Bool(b) => b,
            Value::Int(i) => i != 0,
            Value::Float(f) => f != 0.0,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<u8> for Value {
    fn from(value: u8) -> Self {
        Value::Int(value as i64)
    }
}

impl From<u16> for Value {
    fn from(value: u16) -> Self {
        Value::Int(value as i64)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Float(value as f64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

/// Where a field lives and how its registers map to a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterDescriptor {
    pub name: String,
    pub address: u16,
    /// Number of registers; 0 in a catalog means "width of the data type".
    #[serde(default)]
    pub count: u16,
    #[serde(rename = "type")]
    pub data_type: DataType,
    /// Actual value = raw value * scale
    #[serde(default = "scale_one")]
    pub scale: f64,
    pub access: Access,
    #[serde(default)]
    pub word_order: WordOrder,
    /// Lowest raw value accepted on write
    #[serde(default)]
    pub min: Option<i64>,
    /// Highest raw value accepted on write
    #[serde(default)]
    pub max: Option<i64>,
}

fn scale_one() -> f64 {
    1.0
}

impl RegisterDescriptor {
    pub fn new(name: impl Into<String>, address: u16, data_type: DataType, access: Access) -> Self {
        Self {
            name: name.into(),
            address,
            count: data_type.register_count(),
            data_type,
            scale: 1.0,
            access,
            word_order: WordOrder::Big,
            min: None,
            max: None,
        }
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_word_order(mut self, word_order: WordOrder) -> Self {
        self.word_order = word_order;
        self
    }

    pub fn with_range(mut self, min: i64, max: i64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    /// Inverse scaling, range check and packing into registers.
    pub fn encode(&self, value: Value) -> Result<Vec<u16>> {
        if self.data_type == DataType::F32 {
            let scaled = remove_scale(value.as_f64(), self.scale);
            let narrowed = scaled as f32;
            if !scaled.is_finite() || !narrowed.is_finite() {
                return Err(self.range_error(format!("{} does not fit f32", value)));
            }
            return Ok(self.pack(narrowed.to_bits()));
        }

        let raw = match value {
            Value::Int(i) if self.scale == 1.0 => i,
            Value::Bool(b) if self.scale == 1.0 => b as i64,
            other => {
                let scaled = remove_scale(other.as_f64(), self.scale).round();
                let (lo, hi) = self.data_type.bounds();
                if !scaled.is_finite() || scaled < lo as f64 || scaled > hi as f64 {
                    return Err(self.range_error(format!(
                        "{} does not fit {}",
                        other, self.data_type
                    )));
                }
                scaled as i64
            }
        };

        let (lo, hi) = self.data_type.bounds();
        if raw < lo || raw > hi {
            return Err(self.range_error(format!("{} does not fit {}", raw, self.data_type)));
        }
        if self.min.is_some_and(|min| raw < min) || self.max.is_some_and(|max| raw > max) {
            return Err(self.range_error(format!(
                "{} is outside [{}..{}]",
                raw,
                self.min.unwrap_or(lo),
                self.max.unwrap_or(hi)
            )));
        }

        Ok(match self.data_type {
            DataType::U16 | DataType::I16 | DataType::Bool => vec![raw as u16],
            DataType::U32 | DataType::I32 | DataType::F32 => self.pack(raw as u32),
        })
    }

    /// Unpacking and scaling of the registers read for this field.
    pub fn decode(&self, registers: &[u16]) -> Result<Value> {
        if registers.len() != self.count as usize {
            return Err(ModbusError::Decoding {
                field: self.name.clone(),
                reason: format!(
                    "expected {} registers, got {}",
                    self.count,
                    registers.len()
                ),
            });
        }

        let raw = match self.data_type {
            DataType::Bool => return Ok(Value::Bool(registers[0] != 0)),
            DataType::F32 => {
                let value = f32::from_bits(self.unpack(registers)) as f64;
                return Ok(Value::Float(apply_scale(value, self.scale)));
            }
            DataType::U16 => registers[0] as i64,
            DataType::I16 => registers[0] as i16 as i64,
            DataType::U32 => self.unpack(registers) as i64,
            DataType::I32 => self.unpack(registers) as i32 as i64,
        };

        if self.scale == 1.0 {
            Ok(Value::Int(raw))
        } else {
            Ok(Value::Float(apply_scale(raw as f64, self.scale)))
        }
    }

    fn pack(&self, bits: u32) -> Vec<u16> {
        let (high, low) = ((bits >> 16) as u16, bits as u16);
        match self.word_order {
            WordOrder::Big => vec![high, low],
            WordOrder::Little => vec![low, high],
        }
    }

    fn unpack(&self, registers: &[u16]) -> u32 {
        let (high, low) = match self.word_order {
            WordOrder::Big => (registers[0], registers[1]),
            WordOrder::Little => (registers[1], registers[0]),
        };
        (high as u32) << 16 | low as u32
    }

    fn range_error(&self, reason: String) -> ModbusError {
        ModbusError::Range {
            field: self.name.clone(),
            reason,
        }
    }
}

// Decimal scales (0.1, 0.01, ...) divide by their integral inverse so that
// 1234 * 0.1 comes out as the nearest f64 to 123.4.
fn decimal_inverse(scale: f64) -> Option<f64> {
    let inverse = 1.0 / scale;
    let rounded = inverse.round();
    (inverse.abs() > 1.0 && (inverse - rounded).abs() < 1e-9).then_some(rounded)
}

fn apply_scale(raw: f64, scale: f64) -> f64 {
    match decimal_inverse(scale) {
        Some(inverse) => raw / inverse,
        None => raw * scale,
    }
}

fn remove_scale(value: f64, scale: f64) -> f64 {
    match decimal_inverse(scale) {
        Some(inverse) => value * inverse,
        None => value / scale,
    }
}

pub fn encode_value(descriptor: &RegisterDescriptor, value: impl Into<Value>) -> Result<Vec<u16>> {
    descriptor.encode(value.into())
}

pub fn decode_value(descriptor: &RegisterDescriptor, registers: &[u16]) -> Result<Value> {
    descriptor.decode(registers)
}

/// Encodes `value` into register bytes as they travel on the wire.
pub fn encode_bytes(descriptor: &RegisterDescriptor, value: impl Into<Value>) -> Result<Vec<u8>> {
    Ok(encode_value(descriptor, value)?
        .into_iter()
        .flat_map(u16::to_be_bytes)
        .collect())
}

/// Decodes register bytes as they travel on the wire.
pub fn decode_bytes(descriptor: &RegisterDescriptor, raw: &[u8]) -> Result<Value> {
    if raw.len() != descriptor.count as usize * 2 {
        return Err(ModbusError::Decoding {
            field: descriptor.name.clone(),
            reason: format!(
                "expected {} bytes, got {}",
                descriptor.count as usize * 2,
                raw.len()
            ),
        });
    }
    let registers: Vec<u16> = raw
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    decode_value(descriptor, &registers)
}

#[derive(Deserialize)]
struct Catalog {
    registers: Vec<RegisterDescriptor>,
}

/// Name-indexed, validated set of register descriptors for one device model.
#[derive(Debug, Clone)]
pub struct RegisterMap {
    descriptors: Vec<RegisterDescriptor>,
    index: HashMap<String, usize>,
}

impl RegisterMap {
    pub fn new(descriptors: Vec<RegisterDescriptor>) -> Result<Self> {
        let mut index = HashMap::with_capacity(descriptors.len());
        let mut validated = Vec::with_capacity(descriptors.len());

        for mut descriptor in descriptors {
            if descriptor.count == 0 {
                descriptor.count = descriptor.data_type.register_count();
            }
            validate(&descriptor)?;
            if index
                .insert(descriptor.name.clone(), validated.len())
                .is_some()
            {
                return Err(ModbusError::Config(format!(
                    "Duplicate field name {}",
                    descriptor.name
                )));
            }
            validated.push(descriptor);
        }

        Ok(Self {
            descriptors: validated,
            index,
        })
    }

    /// Loads a catalog of the form `registers: [{name, address, type, ...}]`.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let catalog: Catalog = serde_yaml::from_str(text)
            .map_err(|e| ModbusError::Config(format!("Invalid register catalog: {}", e)))?;
        Self::new(catalog.registers)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&text)
    }

    pub fn lookup(&self, name: &str) -> Result<&RegisterDescriptor> {
        self.index
            .get(name)
            .map(|&i| &self.descriptors[i])
            .ok_or_else(|| ModbusError::UnknownField(name.to_string()))
    }

    /// Fails on the first name the map does not define.
    pub fn require<S: AsRef<str>>(&self, names: impl IntoIterator<Item = S>) -> Result<()> {
        for name in names {
            self.lookup(name.as_ref())?;
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisterDescriptor> {
        self.descriptors.iter()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

fn validate(descriptor: &RegisterDescriptor) -> Result<()> {
    let fail = |reason: String| {
        Err(ModbusError::Config(format!(
            "Field {:?}: {}",
            descriptor.name, reason
        )))
    };

    if descriptor.name.is_empty() {
        return fail("name cannot be empty".to_string());
    }
    let width = descriptor.data_type.register_count();
    if descriptor.count != width {
        return fail(format!(
            "{} needs {} registers, descriptor says {}",
            descriptor.data_type, width, descriptor.count
        ));
    }
    if descriptor.count > MAX_READ_REGISTERS
        || descriptor.address as u32 + descriptor.count as u32 > 0x1_0000
    {
        return fail(format!(
            "registers {:#06x}+{} exceed the address space",
            descriptor.address, descriptor.count
        ));
    }
    if !descriptor.scale.is_finite() || descriptor.scale == 0.0 {
        return fail(format!("invalid scale {}", descriptor.scale));
    }
    if let (Some(min), Some(max)) = (descriptor.min, descriptor.max) {
        if min > max {
            return fail(format!("min {} greater than max {}", min, max));
        }
    }
    Ok(())
}
