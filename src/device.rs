use std::time::Duration;

use tracing::{debug, info, warn};

use crate::core::{ExceptionCode, MAX_READ_REGISTERS, RegisterBlock};
use crate::registers::{RegisterDescriptor, RegisterMap, Value};
use crate::transport::Transport;
use crate::{ModbusError, Result};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Typed access to one device: a transport, a register map and the unit
/// address the device answers to. Nothing is cached; every call is a
/// fresh round trip.
pub struct Device<T> {
    transport: T,
    map: RegisterMap,
    unit_id: u8,
    timeout: Duration,
}

impl<T: Transport> Device<T> {
    pub fn new(transport: T, map: RegisterMap, unit_id: u8) -> Self {
        Self {
            transport,
            map,
            unit_id,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn unit_id(&self) -> u8 {
        self.unit_id
    }

    pub fn set_unit_id(&mut self, unit_id: u8) {
        self.unit_id = unit_id;
    }

    pub fn register_map(&self) -> &RegisterMap {
        &self.map
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Reads one field (one 0x03 transaction).
    pub fn read(&self, field: &str) -> Result<Value> {
        let descriptor = self.readable(field)?;
        let block = block_for(descriptor.address, descriptor.count)?;
        let registers = self.read_registers(&block)?;
        descriptor.decode(&registers)
    }

    /// Writes one field (one 0x06 or 0x10 transaction).
    ///
    /// An `Acknowledge` exception means the device took the request and is
    /// still processing it; it counts as success.
    pub fn write(&self, field: &str, value: impl Into<Value>) -> Result<()> {
        let descriptor = self.map.lookup(field)?;
        if !descriptor.access.is_writable() {
            warn!(field, access = %descriptor.access, "Attempt to write not writable register");
            return Err(ModbusError::AccessDenied {
                field: field.to_string(),
                access: descriptor.access,
            });
        }

        let value = value.into();
        let registers = descriptor.encode(value)?;
        let block = block_for(descriptor.address, descriptor.count)?;
        let request = block.write_request(&registers)?;
        debug!(field, %value, address = descriptor.address, "Writing field");

        match self.transport.request(
            self.unit_id,
            request.function_code,
            &request.data,
            self.timeout,
        ) {
            Ok(reply) => Ok(block.check_write_reply(&request, &reply)?),
            Err(err) if err.exception_code() == Some(ExceptionCode::Acknowledge) => {
                info!(field, unit_id = self.unit_id, "Device acknowledged write, still processing");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Reads several fields in one transaction covering all of them.
    ///
    /// Fields must be in increasing, non-overlapping address order.
    pub fn read_many<S: AsRef<str>>(&self, fields: &[S]) -> Result<Vec<Value>> {
        let descriptors = fields
            .iter()
            .map(|field| self.readable(field.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        let (Some(first), Some(last)) = (descriptors.first(), descriptors.last()) else {
            return Err(ModbusError::InvalidArgument(
                "Expected at least one field".to_string(),
            ));
        };

        for pair in descriptors.windows(2) {
            let (prev, curr) = (pair[0], pair[1]);
            if prev.address as u32 + prev.count as u32 > curr.address as u32 {
                return Err(ModbusError::InvalidArgument(format!(
                    "Fields must be in increasing address order, but {} ({:#06x}+{}) overlaps {} ({:#06x})",
                    prev.name, prev.address, prev.count, curr.name, curr.address
                )));
            }
        }

        let span = last.address as u32 + last.count as u32 - first.address as u32;
        if span > MAX_READ_REGISTERS as u32 {
            return Err(ModbusError::InvalidArgument(format!(
                "Fields span {} registers, a single read allows {}",
                span, MAX_READ_REGISTERS
            )));
        }

        debug!(start = first.address, span, fields = descriptors.len(), "Reading fields in one transaction");
        let block = block_for(first.address, span as u16)?;
        let registers = self.read_registers(&block)?;

        descriptors
            .iter()
            .map(|descriptor| {
                let offset = (descriptor.address - first.address) as usize;
                descriptor.decode(&registers[offset..offset + descriptor.count as usize])
            })
            .collect()
    }

    fn readable(&self, field: &str) -> Result<&RegisterDescriptor> {
        let descriptor = self.map.lookup(field)?;
        if !descriptor.access.is_readable() {
            warn!(field, access = %descriptor.access, "Attempt to read not readable register");
            return Err(ModbusError::AccessDenied {
                field: field.to_string(),
                access: descriptor.access,
            });
        }
        Ok(descriptor)
    }

    /// A valid frame whose byte count does not fit `block` is a device fault
    /// and comes back as `Malformed` without a retry.
    fn read_registers(&self, block: &RegisterBlock) -> Result<Vec<u16>> {
        let request = block.read_request();
        let reply = self.transport.request(
            self.unit_id,
            request.function_code,
            &request.data,
            self.timeout,
        )?;
        Ok(block.parse_read_reply(&reply)?)
    }
}

fn block_for(address: u16, length: u16) -> Result<RegisterBlock> {
    Ok(RegisterBlock::builder()
        .address(address)
        .length(length)
        .build()?)
}
