use crate::core::{
    EXCEPTION_FLAG, FrameError, MAX_PDU_SIZE, READ_HOLDING_REGISTERS, WRITE_MULTIPLE_REGISTERS,
    WRITE_SINGLE_REGISTER,
};
use crate::crc;

/// unit id + function code + CRC
pub const MIN_FRAME_LEN: usize = 4;

pub const MAX_FRAME_LEN: usize = 256;

/// Largest payload that fits next to the function code in one PDU.
pub const MAX_PAYLOAD_LEN: usize = MAX_PDU_SIZE - 1;

const EXCEPTION_FRAME_LEN: usize = 5;
const WRITE_ECHO_FRAME_LEN: usize = 8;

/// A decoded RTU frame with a verified CRC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub unit_id: u8,
    pub function_code: u8,
    pub payload: Vec<u8>,
    pub crc: u16,
}

/// How long a reply should be, judged from the bytes received so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLength {
    NeedMore,
    Known(usize),
    /// Unrecognised function code; only line silence can end the frame.
    Unknown,
}

/// Builds `unit_id || function_code || payload || crc`.
pub fn encode_request(
    unit_id: u8,
    function_code: u8,
    payload: &[u8],
) -> Result<Vec<u8>, FrameError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(FrameError::Encoding {
            len: payload.len(),
            max: MAX_PAYLOAD_LEN,
        });
    }

    let mut frame = Vec::with_capacity(2 + payload.len() + 2);
    frame.push(unit_id);
    frame.push(function_code);
    frame.extend_from_slice(payload);
    crc::append(&mut frame);
    Ok(frame)
}

pub fn decode_response(frame: &[u8]) -> Result<Frame, FrameError> {
    if frame.len() < MIN_FRAME_LEN {
        return Err(FrameError::Malformed(format!(
            "frame too short: {} bytes",
            frame.len()
        )));
    }

    let body_len = frame.len() - 2;
    let received = u16::from_le_bytes([frame[body_len], frame[body_len + 1]]);
    let calculated = crc::compute(&frame[..body_len]);
    if received != calculated {
        return Err(FrameError::Checksum {
            expected: calculated,
            received,
        });
    }

    let unit_id = frame[0];
    let function_code = frame[1];

    if function_code & EXCEPTION_FLAG != 0 {
        if frame.len() != EXCEPTION_FRAME_LEN {
            return Err(FrameError::Malformed(format!(
                "exception reply of {} bytes",
                frame.len()
            )));
        }
        return Err(FrameError::Exception {
            function_code: function_code & !EXCEPTION_FLAG,
            code: frame[2].into(),
        });
    }

    match expected_frame_len(frame) {
        FrameLength::Known(len) if len != frame.len() => {
            return Err(FrameError::Malformed(format!(
                "function {:#04x} reply should be {} bytes, got {}",
                function_code,
                len,
                frame.len()
            )));
        }
        FrameLength::NeedMore => {
            return Err(FrameError::Malformed("truncated frame".to_string()));
        }
        _ => {}
    }

    Ok(Frame {
        unit_id,
        function_code,
        payload: frame[2..body_len].to_vec(),
        crc: received,
    })
}

/// Expected total length of a reply frame, from its function code.
pub fn expected_frame_len(partial: &[u8]) -> FrameLength {
    let Some(&function_code) = partial.get(1) else {
        return FrameLength::NeedMore;
    };

    if function_code & EXCEPTION_FLAG != 0 {
        return FrameLength::Known(EXCEPTION_FRAME_LEN);
    }

    match function_code {
        READ_HOLDING_REGISTERS => match partial.get(2) {
            Some(&byte_count) => FrameLength::Known(3 + byte_count as usize + 2),
            None => FrameLength::NeedMore,
        },
        WRITE_SINGLE_REGISTER | WRITE_MULTIPLE_REGISTERS => {
            FrameLength::Known(WRITE_ECHO_FRAME_LEN)
        }
        _ => FrameLength::Unknown,
    }
}
