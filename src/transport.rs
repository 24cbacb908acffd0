//! Request/response exchange over a half-duplex serial line.
//!
//! RTU frames carry no transaction id, so [`RtuTransport`] keeps exactly one
//! request outstanding per link: the whole send/receive cycle runs under a
//! mutex, stale input is discarded after the inter-frame silence and right
//! before every transmission, and a reply is only ever matched against the
//! request that was just written.

use std::io::{self, Read, Write};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serialport::{ClearBuffer, SerialPort};
use tracing::{debug, error, info, warn};

use crate::config::{Parity, SerialConfig, StopBits, TransportConfig};
use crate::core::{EXCEPTION_FLAG, FrameError};
use crate::modbus_rtu::{FrameLength, MAX_FRAME_LEN, decode_response, encode_request, expected_frame_len};
use crate::{ModbusError, Result};

/// Unit id 0 addresses every device on the bus; nobody answers it.
pub const BROADCAST_UNIT_ID: u8 = 0;

/// Byte-level access to a serial line.
pub trait SerialLink: Send {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Reads whatever is available, waiting at most `timeout` for the first
    /// byte. A timeout is reported as `Ok(0)` or `ErrorKind::TimedOut`.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;

    /// Drops any bytes already received but not yet read.
    fn clear_input(&mut self) -> io::Result<()>;
}

impl SerialLink for Box<dyn SerialPort> {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        Write::write_all(&mut **self, data)?;
        Write::flush(&mut **self)
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        SerialPort::set_timeout(&mut **self, timeout).map_err(io::Error::from)?;
        Read::read(&mut **self, buf)
    }

    fn clear_input(&mut self) -> io::Result<()> {
        SerialPort::clear(&**self, ClearBuffer::Input).map_err(io::Error::from)
    }
}

/// One Modbus exchange: returns the reply payload without address,
/// function code or CRC.
pub trait Transport {
    fn request(
        &self,
        unit_id: u8,
        function_code: u8,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn request(
        &self,
        unit_id: u8,
        function_code: u8,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        (**self).request(unit_id, function_code, payload, timeout)
    }
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn request(
        &self,
        unit_id: u8,
        function_code: u8,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        (**self).request(unit_id, function_code, payload, timeout)
    }
}

struct LinkState<L> {
    link: L,
    last_activity: Option<Instant>,
}

impl<L: SerialLink> LinkState<L> {
    fn wait_for_silence(&self, spacing: Duration) {
        if let Some(last) = self.last_activity {
            let elapsed = last.elapsed();
            if elapsed < spacing {
                thread::sleep(spacing - elapsed);
            }
        }
    }

    fn read_frame(&mut self, deadline: Instant, frame_gap: Duration) -> Result<Vec<u8>> {
        let mut frame = Vec::with_capacity(MAX_FRAME_LEN);
        let mut chunk = [0u8; MAX_FRAME_LEN];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ModbusError::Timeout {
                    received: frame.len(),
                });
            }

            let wait = if frame.is_empty() {
                remaining
            } else {
                remaining.min(frame_gap)
            };

            match self.link.read(&mut chunk, wait) {
                Ok(0) => {}
                Ok(n) => {
                    frame.extend_from_slice(&chunk[..n]);
                    match expected_frame_len(&frame) {
                        FrameLength::Known(len) if frame.len() >= len => {
                            if frame.len() > len {
                                debug!(dropped = frame.len() - len, "Dropping bytes past end of frame");
                                frame.truncate(len);
                            }
                            return Ok(frame);
                        }
                        _ if frame.len() >= MAX_FRAME_LEN => {
                            return Err(FrameError::Malformed(format!(
                                "no frame boundary within {} bytes",
                                MAX_FRAME_LEN
                            ))
                            .into());
                        }
                        _ => {}
                    }
                    continue;
                }
                Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {}
                Err(e) => return Err(ModbusError::Io(e)),
            }

            // The line went quiet. Only frames of unknown shape end here.
            if !frame.is_empty() && expected_frame_len(&frame) == FrameLength::Unknown {
                return Ok(frame);
            }
        }
    }
}

/// Modbus RTU client transport over one exclusively owned serial link.
pub struct RtuTransport<L> {
    state: Mutex<LinkState<L>>,
    retries: u32,
    spacing: Duration,
    frame_gap: Duration,
    timeout: Duration,
}

impl RtuTransport<Box<dyn SerialPort>> {
    /// Opens the configured serial port.
    pub fn open(config: &TransportConfig) -> Result<Self> {
        config.validate()?;
        let serial = &config.serial;
        let port = serialport::new(&serial.port, serial.baud_rate)
            .data_bits(data_bits(serial)?)
            .parity(parity(serial.parity))
            .stop_bits(stop_bits(serial.stop_bits)?)
            .timeout(config.timeout())
            .open()?;

        info!(
            port = %serial.port,
            baud_rate = serial.baud_rate,
            parity = %serial.parity,
            stop_bits = %serial.stop_bits,
            "Opened serial port"
        );
        Ok(Self::new(port, config))
    }
}

impl<L: SerialLink> RtuTransport<L> {
    pub fn new(link: L, config: &TransportConfig) -> Self {
        Self {
            state: Mutex::new(LinkState {
                link,
                last_activity: None,
            }),
            retries: config.retries,
            spacing: config.request_spacing(),
            frame_gap: config.frame_gap(),
            timeout: config.timeout(),
        }
    }

    /// Default response deadline from the configuration.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn into_inner(self) -> L {
        self.state.into_inner().link
    }

    fn transact(
        &self,
        state: &mut LinkState<L>,
        request: &[u8],
        unit_id: u8,
        function_code: u8,
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        state.wait_for_silence(self.spacing);
        // after the wait: a late reply may land while we sleep
        state.link.clear_input()?;

        debug!(unit_id, frame = %hex::encode(request), "TX");
        state.link.write_all(request)?;
        state.last_activity = Some(Instant::now());

        if unit_id == BROADCAST_UNIT_ID {
            return Ok(Vec::new());
        }

        let received = state.read_frame(Instant::now() + timeout, self.frame_gap);
        state.last_activity = Some(Instant::now());
        let raw = received?;
        debug!(unit_id, frame = %hex::encode(&raw), "RX");

        let decoded = decode_response(&raw);
        if matches!(decoded, Ok(_) | Err(FrameError::Exception { .. })) {
            let (unit, function) = (raw[0], raw[1] & !EXCEPTION_FLAG);
            if unit != unit_id || function != function_code {
                return Err(FrameError::UnexpectedReply {
                    expected_unit: unit_id,
                    expected_function: function_code,
                    unit,
                    function,
                }
                .into());
            }
        }
        Ok(decoded?.payload)
    }
}

impl<L: SerialLink> Transport for RtuTransport<L> {
    fn request(
        &self,
        unit_id: u8,
        function_code: u8,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        let request = encode_request(unit_id, function_code, payload)?;
        let mut state = self.state.lock();

        let mut attempt = 0;
        loop {
            match self.transact(&mut state, &request, unit_id, function_code, timeout) {
                Ok(reply) => return Ok(reply),
                Err(err) if err.is_retryable() && attempt < self.retries => {
                    attempt += 1;
                    warn!(
                        unit_id,
                        function_code,
                        attempt,
                        retries = self.retries,
                        error = %err,
                        "Retrying Modbus request"
                    );
                }
                Err(err) => {
                    if err.is_retryable() {
                        error!(
                            unit_id,
                            function_code,
                            attempts = attempt + 1,
                            error = %err,
                            "Modbus request failed"
                        );
                    }
                    return Err(err);
                }
            }
        }
    }
}

fn data_bits(config: &SerialConfig) -> Result<serialport::DataBits> {
    match config.data_bits {
        5 => Ok(serialport::DataBits::Five),
        6 => Ok(serialport::DataBits::Six),
        7 => Ok(serialport::DataBits::Seven),
        8 => Ok(serialport::DataBits::Eight),
        other => Err(ModbusError::Config(format!(
            "Data bits must be 5, 6, 7 or 8, got {}",
            other
        ))),
    }
}

fn parity(parity: Parity) -> serialport::Parity {
    match parity {
        Parity::None => serialport::Parity::None,
        Parity::Even => serialport::Parity::Even,
        Parity::Odd => serialport::Parity::Odd,
    }
}

fn stop_bits(stop_bits: StopBits) -> Result<serialport::StopBits> {
    match stop_bits {
        StopBits::One => Ok(serialport::StopBits::One),
        StopBits::Two => Ok(serialport::StopBits::Two),
        StopBits::OnePointFive => Err(ModbusError::Config(
            "1.5 stop bits are not supported by the host serial port".to_string(),
        )),
    }
}
