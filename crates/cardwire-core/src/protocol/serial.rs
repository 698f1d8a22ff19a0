//! Serial transport
//!
//! Newline-framed requests are pushed to the card in paced segments so the
//! card's fixed-size interrupt buffer is never overrun; replies are read until
//! they end in a newline.

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use super::transport::{is_idle, SerialIo, Transport};
use super::{CardError, Tunables, DEFAULT_BAUD_RATE};

/// Read timeout used by [`open_port`]; a timed out read is "nothing yet"
const PORT_READ_TIMEOUT_MS: u64 = 100;

const READ_BUF_LEN: usize = 2048;

/// The card over an asynchronous serial link
pub struct SerialTransport<S> {
    io: S,
    tunables: Tunables,
}

impl<S: SerialIo> SerialTransport<S> {
    /// Drive the card through `io`
    pub fn new(io: S, tunables: Tunables) -> Self {
        Self { io, tunables }
    }

    fn write_all(&mut self, mut data: &[u8]) -> Result<(), CardError> {
        while !data.is_empty() {
            match self.io.write(data) {
                Ok(0) => {
                    return Err(CardError::io(
                        "error transmitting to module",
                        "write accepted no bytes",
                    ))
                }
                Ok(n) => data = &data[n..],
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(CardError::io("error transmitting to module", e)),
            }
        }
        Ok(())
    }
}

/// True once a read shows the card echoing nothing but line terminators
fn only_line_terminators(data: &[u8]) -> bool {
    let mut newline_seen = false;
    for &b in data.iter().filter(|&&b| b != b'\r') {
        if b != b'\n' {
            return false;
        }
        newline_seen = true;
    }
    newline_seen
}

impl<S: SerialIo> Transport for SerialTransport<S> {
    fn name(&self) -> &'static str {
        "serial"
    }

    /// Probe with bare newlines until the card answers with nothing else, so
    /// that the tail of a reply from an aborted session cannot be mistaken
    /// for the next reply.
    ///
    /// End of stream aborts at once; a card that never settles fails after
    /// `serial_reset_probes` probes.
    fn reset(&mut self) -> Result<(), CardError> {
        let mut buf = vec![0u8; READ_BUF_LEN];
        let max_probes = self.tunables.serial_reset_probes.max(1);
        for probes in 1..=max_probes {
            self.write_all(b"\n")?;
            std::thread::sleep(self.tunables.serial_settle());

            let n = match self.io.read(&mut buf) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Err(CardError::io("error reading from module", e));
                }
                Err(e) if is_idle(&e) => 0,
                Err(e) => return Err(CardError::io("error reading from module", e)),
            };
            tracing::trace!(probes, bytes = n, "serial reset probe");

            if only_line_terminators(&buf[..n]) {
                tracing::debug!(probes, "serial link synchronized");
                return Ok(());
            }
        }
        Err(CardError::io(
            "error reading from module",
            format!("no idle response after {max_probes} probes"),
        ))
    }

    fn transact(&mut self, request: &[u8], no_response: bool) -> Result<Vec<u8>, CardError> {
        let segment_len = self.tunables.segment_max_len.max(1);
        for (i, segment) in request.chunks(segment_len).enumerate() {
            if i > 0 {
                std::thread::sleep(self.tunables.segment_delay());
            }
            tracing::trace!(index = i, len = segment.len(), "serial segment");
            self.write_all(segment)?;
        }

        if no_response {
            return Ok(Vec::new());
        }

        let mut reply = Vec::new();
        let mut buf = vec![0u8; READ_BUF_LEN];
        let wait_began = Instant::now();
        loop {
            match self.io.read(&mut buf) {
                Ok(n) => {
                    reply.extend_from_slice(&buf[..n]);
                    if reply.ends_with(b"\n") {
                        return Ok(reply);
                    }
                }
                Err(e) if is_idle(&e) => {}
                Err(e) => {
                    // Flaky hardware gets a grace period before the error counts
                    if wait_began.elapsed() > self.tunables.read_error_tolerance() {
                        return Err(CardError::io("error reading from module", e));
                    }
                    tracing::debug!(error = %e, "tolerating serial read error");
                    std::thread::sleep(self.tunables.read_error_backoff());
                }
            }
        }
    }
}

impl SerialIo for Box<dyn SerialPort> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        Write::write(self.as_mut(), data)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(self.as_mut(), buf)
    }
}

/// Open a serial port configured 8N1 without flow control.
///
/// Reads time out after a short interval, which the transport treats as
/// "nothing ready yet".
pub fn open_port(name: &str, baud_rate: Option<u32>) -> Result<Box<dyn SerialPort>, CardError> {
    let baud = baud_rate.unwrap_or(DEFAULT_BAUD_RATE);
    serialport::new(name, baud)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(Duration::from_millis(PORT_READ_TIMEOUT_MS))
        .open()
        .map_err(|e| CardError::io(&format!("error opening {name}"), e))
}
