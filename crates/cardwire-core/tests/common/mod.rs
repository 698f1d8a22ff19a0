//! Simulated cards shared by the integration tests

#![allow(dead_code)]

use cardwire_core::protocol::{CardConfig, I2cBus, SerialIo, Tunables};
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

/// Card state observed and scripted by tests
#[derive(Default)]
pub struct CardState {
    /// Every byte the host transmitted, in order
    pub written: Vec<u8>,
    /// Complete non-empty request lines, without terminator
    pub requests: Vec<Vec<u8>>,
    /// Bare newlines received (serial resynchronization probes)
    pub probes: usize,
    /// Replies released one per request line
    pub replies: VecDeque<Vec<u8>>,
    /// Bytes waiting to be read by the host
    pub output: VecDeque<u8>,
    /// Host write calls to fail before accepting data
    pub fail_writes: usize,
    /// Host read calls, including idle ones
    pub reads: usize,
    line: Vec<u8>,
}

impl CardState {
    fn receive(&mut self, data: &[u8], answer_probes: bool) {
        self.written.extend_from_slice(data);
        for &b in data {
            if b != b'\n' {
                self.line.push(b);
                continue;
            }
            let mut line = std::mem::take(&mut self.line);
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if line.is_empty() {
                self.probes += 1;
                if answer_probes {
                    self.output.extend(b"\r\n");
                }
            } else {
                self.requests.push(line);
                if let Some(reply) = self.replies.pop_front() {
                    self.output.extend(reply);
                }
            }
        }
    }
}

/// Handle to a simulated card; clones share state
#[derive(Clone, Default)]
pub struct Card(Arc<Mutex<CardState>>);

impl Card {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, CardState> {
        self.0.lock().unwrap()
    }

    /// Queue a reply for the next request line
    pub fn reply(&self, reply: &str) -> &Self {
        self.state().replies.push_back(reply.as_bytes().to_vec());
        self
    }

    /// Make bytes readable immediately, as if left over from earlier traffic
    pub fn emit(&self, data: &str) -> &Self {
        self.state().output.extend(data.as_bytes());
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.state()
            .requests
            .iter()
            .map(|r| String::from_utf8_lossy(r).into_owned())
            .collect()
    }

    pub fn written(&self) -> Vec<u8> {
        self.state().written.clone()
    }

    pub fn serial(&self) -> SerialCard {
        SerialCard(self.clone())
    }

    pub fn i2c(&self) -> I2cCard {
        I2cCard(self.clone())
    }
}

/// The card as seen over a serial port
pub struct SerialCard(Card);

impl SerialIo for SerialCard {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut state = self.0.state();
        if state.fail_writes > 0 {
            state.fail_writes -= 1;
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        state.receive(data, true);
        Ok(data.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.0.state();
        state.reads += 1;
        if state.output.is_empty() {
            return Err(io::Error::from(io::ErrorKind::TimedOut));
        }
        let n = buf.len().min(state.output.len());
        for (slot, b) in buf.iter_mut().zip(state.output.drain(..n)) {
            *slot = b;
        }
        Ok(n)
    }
}

/// The card as seen over I2C
pub struct I2cCard(Card);

impl I2cBus for I2cCard {
    fn transceive(
        &mut self,
        _address: u16,
        write: &[u8],
        read: Option<&mut [u8]>,
    ) -> io::Result<()> {
        let mut state = self.0.state();
        let Some(buf) = read else {
            if state.fail_writes > 0 {
                state.fail_writes -= 1;
                return Err(io::Error::other("nack"));
            }
            state.receive(&write[1..], false);
            return Ok(());
        };

        state.reads += 1;
        let requested = write[1] as usize;
        let good = requested.min(state.output.len());
        let payload: Vec<u8> = state.output.drain(..good).collect();
        buf[0] = state.output.len().min(253) as u8;
        buf[1] = good as u8;
        buf[2..2 + good].copy_from_slice(&payload);
        Ok(())
    }
}

/// Configuration without pacing delays
pub fn fast_config() -> CardConfig {
    CardConfig {
        tunables: Tunables {
            segment_delay_ms: 0,
            serial_settle_ms: 0,
            i2c_min_interval_ms: 0,
            i2c_retry_backoff_ms: 0,
            i2c_initial_timeout_ms: 50,
            read_error_backoff_ms: 0,
            restart_quiescence_ms: 0,
            ..Tunables::default()
        },
        ..CardConfig::default()
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("cardwire_core=debug")
        .try_init();
}
