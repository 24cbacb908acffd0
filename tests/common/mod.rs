#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::thread;
use std::time::Duration;

use matis_modbus::core::{READ_HOLDING_REGISTERS, WRITE_MULTIPLE_REGISTERS, WRITE_SINGLE_REGISTER};
use matis_modbus::{ExceptionCode, FrameError, SerialLink, Transport, crc};
use parking_lot::Mutex;

pub fn reply_frame(unit_id: u8, function_code: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![unit_id, function_code];
    frame.extend_from_slice(payload);
    crc::append(&mut frame);
    frame
}

/// Serial line that answers each write with the next scripted reply.
/// `None` in the script means the device stays silent.
#[derive(Default)]
pub struct ScriptedLink {
    pub script: VecDeque<Option<Vec<u8>>>,
    pub pending: VecDeque<u8>,
    pub writes: Vec<Vec<u8>>,
    pub clears: usize,
    /// Most bytes handed out per read; 0 means no limit.
    pub chunk: usize,
}

impl ScriptedLink {
    pub fn new(script: impl IntoIterator<Item = Option<Vec<u8>>>) -> Self {
        Self {
            script: script.into_iter().collect(),
            ..Default::default()
        }
    }
}

impl SerialLink for ScriptedLink {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.writes.push(data.to_vec());
        if let Some(Some(reply)) = self.script.pop_front() {
            self.pending.extend(reply);
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        if self.pending.is_empty() {
            thread::sleep(timeout);
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        }
        let limit = if self.chunk == 0 { buf.len() } else { self.chunk.min(buf.len()) };
        let n = limit.min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.clears += 1;
        self.pending.clear();
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub unit_id: u8,
    pub function_code: u8,
    pub data: Vec<u8>,
}

/// In-memory holding register bank behind the `Transport` seam.
pub struct FakeDevice {
    registers: Mutex<Vec<u16>>,
    requests: Mutex<Vec<Request>>,
    exception: Mutex<Option<ExceptionCode>>,
    reply: Mutex<Option<Vec<u8>>>,
}

impl FakeDevice {
    pub fn new() -> Self {
        Self {
            registers: Mutex::new(vec![0; 0x1_0000]),
            requests: Mutex::new(Vec::new()),
            exception: Mutex::new(None),
            reply: Mutex::new(None),
        }
    }

    pub fn set(&self, address: u16, value: u16) {
        self.registers.lock()[address as usize] = value;
    }

    pub fn get(&self, address: u16) -> u16 {
        self.registers.lock()[address as usize]
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().clone()
    }

    /// Every following request is answered with `code`.
    pub fn fail_with(&self, code: ExceptionCode) {
        *self.exception.lock() = Some(code);
    }

    /// Every following request gets `payload` back verbatim.
    pub fn reply_with(&self, payload: &[u8]) {
        *self.reply.lock() = Some(payload.to_vec());
    }
}

impl Transport for FakeDevice {
    fn request(
        &self,
        unit_id: u8,
        function_code: u8,
        payload: &[u8],
        _timeout: Duration,
    ) -> matis_modbus::Result<Vec<u8>> {
        self.requests.lock().push(Request {
            unit_id,
            function_code,
            data: payload.to_vec(),
        });

        if let Some(code) = *self.exception.lock() {
            return Err(FrameError::Exception {
                function_code,
                code,
            }
            .into());
        }
        if let Some(reply) = self.reply.lock().clone() {
            return Ok(reply);
        }

        let word = |i: usize| u16::from_be_bytes([payload[i], payload[i + 1]]);
        let mut registers = self.registers.lock();
        match function_code {
            READ_HOLDING_REGISTERS => {
                let (start, len) = (word(0) as usize, word(2) as usize);
                let mut reply = vec![(len * 2) as u8];
                for value in &registers[start..start + len] {
                    reply.extend_from_slice(&value.to_be_bytes());
                }
                Ok(reply)
            }
            WRITE_SINGLE_REGISTER => {
                registers[word(0) as usize] = word(2);
                Ok(payload.to_vec())
            }
            WRITE_MULTIPLE_REGISTERS => {
                let start = word(0) as usize;
                for (i, pair) in payload[5..].chunks_exact(2).enumerate() {
                    registers[start + i] = u16::from_be_bytes([pair[0], pair[1]]);
                }
                Ok(payload[..4].to_vec())
            }
            other => Err(FrameError::Exception {
                function_code: other,
                code: ExceptionCode::IllegalFunction,
            }
            .into()),
        }
    }
}
