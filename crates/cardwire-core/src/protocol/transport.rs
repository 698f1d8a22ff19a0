//! Transport abstraction
//!
//! A [`Transport`] knows how to resynchronize with the card and how to move one
//! newline-terminated request and its reply over a physical link. The physical
//! primitives underneath are supplied by the application through [`SerialIo`]
//! or [`I2cBus`].

use std::io;

use super::CardError;

/// A physical link to the card
pub trait Transport: Send {
    /// Short interface name, e.g. `"serial"` or `"i2c"`
    fn name(&self) -> &'static str;

    /// Drain stale output until the card is known to be idle
    fn reset(&mut self) -> Result<(), CardError>;

    /// Send a newline-terminated request and, unless `no_response`, collect
    /// the reply up to and including its terminating newline.
    ///
    /// An empty request transmits nothing and only reads.
    fn transact(&mut self, request: &[u8], no_response: bool) -> Result<Vec<u8>, CardError>;

    /// Release the link. The built-in transports have nothing to release.
    fn close(&mut self) {}
}

/// Byte-serial read/write primitives
pub trait SerialIo: Send {
    /// Write some bytes, returning how many were accepted
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Read whatever is available.
    ///
    /// `Ok(0)` and the error kinds `UnexpectedEof`, `TimedOut` and
    /// `WouldBlock` mean "nothing ready yet" while waiting for a reply;
    /// anything else is a hard error. Resynchronization treats
    /// `UnexpectedEof` as a hard error too.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// I2C transceive primitive
pub trait I2cBus: Send {
    /// Write `write` to the device at `address`, then, if `read` is given,
    /// fill it from the device.
    fn transceive(&mut self, address: u16, write: &[u8], read: Option<&mut [u8]>)
        -> io::Result<()>;
}

/// Whether a read error only means no data was ready
pub(crate) fn is_idle(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::UnexpectedEof | io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}

/// Serial primitives backed by a pair of closures
pub struct UartFns<R, W> {
    read: R,
    write: W,
}

/// Wrap read and write closures as [`SerialIo`]
pub fn uart_fns<R, W>(read: R, write: W) -> UartFns<R, W>
where
    R: FnMut(&mut [u8]) -> io::Result<usize> + Send,
    W: FnMut(&[u8]) -> io::Result<usize> + Send,
{
    UartFns { read, write }
}

impl<R, W> SerialIo for UartFns<R, W>
where
    R: FnMut(&mut [u8]) -> io::Result<usize> + Send,
    W: FnMut(&[u8]) -> io::Result<usize> + Send,
{
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        (self.write)(data)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (self.read)(buf)
    }
}

/// I2C primitive backed by a closure
pub struct I2cFn<F>(F);

/// Wrap a transceive closure as [`I2cBus`]
pub fn i2c_fn<F>(f: F) -> I2cFn<F>
where
    F: FnMut(u16, &[u8], Option<&mut [u8]>) -> io::Result<()> + Send,
{
    I2cFn(f)
}

impl<F> I2cBus for I2cFn<F>
where
    F: FnMut(u16, &[u8], Option<&mut [u8]>) -> io::Result<()> + Send,
{
    fn transceive(
        &mut self,
        address: u16,
        write: &[u8],
        read: Option<&mut [u8]>,
    ) -> io::Result<()> {
        (self.0)(address, write, read)
    }
}
