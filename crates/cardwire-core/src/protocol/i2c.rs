//! I2C transport
//!
//! Every transfer is a chunk. A write chunk is `[len] ++ payload`. A read
//! chunk is requested with `[0x00, n]` and answered with `n + 2` bytes:
//!
//! - byte 0: bytes still queued on the card after this read (at most 253)
//! - byte 1: good bytes delivered by this read (at most `n`)
//! - bytes `2 .. 2 + good`: payload

use embedded_hal::i2c::{Error as _, I2c};
use std::io;
use std::time::Instant;

use super::transport::{I2cBus, Transport};
use super::{CardError, Tunables, CARD_I2C_MAX, DEFAULT_I2C_ADDRESS};

/// Result of one read chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRead {
    /// Bytes delivered by this read
    pub payload: Vec<u8>,
    /// Bytes still queued on the card
    pub available: usize,
}

/// Validate a read chunk answer to a request for `requested` bytes
pub fn decode_chunk(readbuf: &[u8], requested: usize) -> Result<ChunkRead, CardError> {
    let &[available, good, ..] = readbuf else {
        return Err(CardError::io(
            "i2c read",
            format!("not enough data ({} < 2)", readbuf.len()),
        ));
    };
    let (available, good) = (available as usize, good as usize);

    if available > CARD_I2C_MAX {
        return Err(CardError::io(
            "i2c read",
            format!("available too large ({available} > {CARD_I2C_MAX})"),
        ));
    }
    if good > requested {
        return Err(CardError::io(
            "i2c read",
            format!("{good} bytes returned while expecting {requested}"),
        ));
    }
    if readbuf.len() < 2 + good {
        return Err(CardError::io(
            "i2c read",
            format!("insufficient data ({} < {})", readbuf.len(), 2 + good),
        ));
    }

    Ok(ChunkRead {
        payload: readbuf[2..2 + good].to_vec(),
        available,
    })
}

/// The card on an I2C bus
pub struct I2cTransport<B> {
    bus: B,
    address: u16,
    tunables: Tunables,
}

impl<B: I2cBus> I2cTransport<B> {
    /// Bind to the card at `address`; `None` or 0 selects [`DEFAULT_I2C_ADDRESS`]
    pub fn new(bus: B, address: Option<u16>, tunables: Tunables) -> Self {
        let address = address
            .filter(|&a| a != 0)
            .unwrap_or(DEFAULT_I2C_ADDRESS);
        Self {
            bus,
            address,
            tunables,
        }
    }

    /// The 7-bit bus address in use
    pub fn address(&self) -> u16 {
        self.address
    }

    fn chunk_max(&self) -> usize {
        self.tunables.i2c_chunk_max.clamp(1, CARD_I2C_MAX)
    }

    /// Send one length-prefixed chunk without read-back; callers keep
    /// `payload` within `chunk_max()`
    fn write_chunk(&mut self, payload: &[u8]) -> Result<(), CardError> {
        std::thread::sleep(self.tunables.i2c_min_interval());
        let mut frame = Vec::with_capacity(payload.len() + 1);
        frame.push(payload.len() as u8);
        frame.extend_from_slice(payload);
        self.bus
            .transceive(self.address, &frame, None)
            .map_err(|e| CardError::io("i2c write", e))
    }

    /// Ask for up to `len` bytes, retrying bus errors
    fn read_chunk(&mut self, len: usize) -> Result<ChunkRead, CardError> {
        std::thread::sleep(self.tunables.i2c_min_interval());
        let request = [0u8, len as u8];
        let mut readbuf = vec![0u8; len + 2];
        let mut attempt = 0;
        loop {
            match self
                .bus
                .transceive(self.address, &request, Some(readbuf.as_mut_slice()))
            {
                Ok(()) => break,
                Err(e) if attempt >= self.tunables.i2c_read_retries => {
                    return Err(CardError::io("i2c read", e));
                }
                Err(e) => {
                    attempt += 1;
                    tracing::trace!(attempt, error = %e, "retrying i2c read");
                    std::thread::sleep(self.tunables.i2c_retry_backoff());
                }
            }
        }
        decode_chunk(&readbuf, len)
    }
}

impl<B: I2cBus> Transport for I2cTransport<B> {
    fn name(&self) -> &'static str {
        "i2c"
    }

    /// Read and discard until the card reports an empty output queue
    fn reset(&mut self) -> Result<(), CardError> {
        let mut chunk_len = 0;
        let mut drained = 0usize;
        loop {
            let chunk = self.read_chunk(chunk_len)?;
            drained += chunk.payload.len();
            if chunk.available == 0 {
                tracing::debug!(drained, address = self.address, "i2c link synchronized");
                return Ok(());
            }
            chunk_len = chunk.available.min(self.chunk_max());
        }
    }

    fn transact(&mut self, request: &[u8], no_response: bool) -> Result<Vec<u8>, CardError> {
        let chunk_max = self.chunk_max();
        let segment_delay = self.tunables.segment_delay();
        let mut sent_in_segment = 0;
        for chunk in request.chunks(chunk_max) {
            self.write_chunk(chunk)?;
            sent_in_segment += chunk.len();
            if sent_in_segment > self.tunables.segment_max_len {
                sent_in_segment = 0;
                std::thread::sleep(segment_delay);
            }
            std::thread::sleep(segment_delay);
        }

        if no_response {
            return Ok(Vec::new());
        }

        let initial_timeout = self.tunables.i2c_initial_timeout();
        let mut expires = Instant::now() + initial_timeout;
        let mut reply = Vec::new();
        let mut received_newline = false;
        let mut chunk_len = 0;
        loop {
            let chunk = self.read_chunk(chunk_len)?;
            if let Some(&last) = chunk.payload.last() {
                expires = Instant::now() + self.tunables.i2c_active_timeout();
                if last == b'\n' {
                    received_newline = true;
                }
                reply.extend_from_slice(&chunk.payload);
            }

            // Keep pulling while the card has more queued
            chunk_len = chunk.available.min(chunk_max);
            if chunk_len > 0 {
                continue;
            }

            if received_newline {
                tracing::trace!(len = reply.len(), "i2c reply complete");
                return Ok(reply);
            }

            if reply.is_empty() && Instant::now() > expires {
                return Err(CardError::Timeout {
                    received: reply.len(),
                    secs: initial_timeout.as_secs(),
                });
            }
        }
    }
}

/// Adapts an `embedded-hal` 1.0 I2C bus with 7-bit addressing
pub struct HalI2c<T>(pub T);

impl<T> I2cBus for HalI2c<T>
where
    T: I2c + Send,
{
    fn transceive(
        &mut self,
        address: u16,
        write: &[u8],
        read: Option<&mut [u8]>,
    ) -> io::Result<()> {
        let address = u8::try_from(address)
            .ok()
            .filter(|a| *a <= 0x7f)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{address:#x} is not a 7-bit address"),
                )
            })?;
        let result = match read {
            Some(buf) => self.0.write_read(address, write, buf),
            None => self.0.write(address, write),
        };
        result.map_err(|e| io::Error::other(format!("i2c bus: {:?}", e.kind())))
    }
}
