use crc::{CRC_16_MODBUS, Crc};

const MODBUS: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// CRC-16/MODBUS: init 0xFFFF, reflected polynomial 0xA001, no final XOR.
pub fn compute(data: &[u8]) -> u16 {
    MODBUS.checksum(data)
}

/// Checks the trailing two bytes (low byte first) against the CRC of the rest.
pub fn verify(frame: &[u8]) -> bool {
    let Some(split) = frame.len().checked_sub(2) else {
        return false;
    };
    let (body, tail) = frame.split_at(split);
    compute(body) == u16::from_le_bytes([tail[0], tail[1]])
}

/// Appends the CRC of `frame`, low byte first.
pub fn append(frame: &mut Vec<u8>) {
    let crc = compute(frame);
    frame.extend_from_slice(&crc.to_le_bytes());
}
