//! Byte links carrying relay frames
//!
//! A [`RelayLink`] is any async byte stream that can also drop whatever it
//! has buffered. Real boards sit behind a [`SerialStream`]; tests use the
//! simulated chains from `blf-sim`.

use std::future::Future;
use std::io;

use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio_serial::{
    ClearBuffer, DataBits, FlowControl, Parity, SerialPort, SerialPortBuilderExt, SerialStream,
    StopBits,
};
use tracing::debug;

/// Fixed line speed of the relay boards
pub const BAUD_RATE: u32 = 19_200;

/// Async byte link to a chain of relay boards
pub trait RelayLink: AsyncRead + AsyncWrite + Unpin + Send {
    /// Drop any pending input and output before a new command
    fn discard_buffers(&mut self) -> io::Result<()>;
}

impl RelayLink for SerialStream {
    fn discard_buffers(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::All).map_err(io::Error::from)
    }
}

/// In-memory links have nothing buffered outside the stream itself
impl RelayLink for DuplexStream {
    fn discard_buffers(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Opens links by port name
pub trait PortOpener: Send + Sync + 'static {
    type Link: RelayLink + 'static;

    fn open(&self, port: &str) -> impl Future<Output = io::Result<Self::Link>> + Send;
}

/// Opens physical serial ports with [`open_serial`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialOpener;

impl PortOpener for SerialOpener {
    type Link = SerialStream;

    async fn open(&self, port: &str) -> io::Result<SerialStream> {
        open_serial(port)
    }
}

/// Open a serial port with the relay board line settings (19200 8-N-1, no handshake)
pub fn open_serial(port_name: &str) -> io::Result<SerialStream> {
    debug!("Opening {} at {} baud", port_name, BAUD_RATE);

    tokio_serial::new(port_name, BAUD_RATE)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .open_native_async()
        .map_err(io::Error::from)
}
