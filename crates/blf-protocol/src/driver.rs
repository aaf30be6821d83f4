//! Command driver for a chain of relay boards
//!
//! Every command is one exchange: discard buffered bytes, write the 4-byte
//! command frame, then read exactly one 4-byte reply and validate it
//! (checksum, echoed address, complemented opcode).

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::error::{FrameError, RelayError};
use crate::frame::{Frame, Opcode, FRAME_LEN};
use crate::link::RelayLink;

/// Read and write limits for one exchange
///
/// `None` blocks until the operation completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timeouts {
    /// Limit for receiving a complete reply frame
    pub read: Option<Duration>,
    /// Limit for writing a command frame
    pub write: Option<Duration>,
}

impl Timeouts {
    /// Same limit for reads and writes
    pub fn both(limit: Duration) -> Self {
        Self {
            read: Some(limit),
            write: Some(limit),
        }
    }
}

/// Relay board driver bound to one open link
pub struct RelayDriver<T> {
    port: String,
    io: T,
    timeouts: Timeouts,
}

impl<T> RelayDriver<T>
where
    T: RelayLink,
{
    /// Wrap an open link
    ///
    /// `port` names the link in errors and log output.
    pub fn new(port: impl Into<String>, io: T, timeouts: Timeouts) -> Self {
        Self {
            port: port.into(),
            io,
            timeouts,
        }
    }

    /// Port name used in diagnostics
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Release the underlying link
    pub fn into_inner(self) -> T {
        self.io
    }

    /// Run the daisy-chain discovery handshake
    ///
    /// Starting at address 1, each board that answers with the raw `Setup`
    /// opcode has taken the address and the next one is tried. A complement
    /// reply ends the chain, as does silence once at least one board has
    /// answered. Returns the number of boards found.
    pub async fn setup(&mut self) -> Result<u8, RelayError> {
        let mut address: u8 = 1;

        loop {
            let reply = match self.exchange(Opcode::Setup, address, 0).await {
                Ok(reply) => reply,
                Err(RelayError::Timeout { .. }) if address > 1 => {
                    debug!(
                        "No reply from address {} on {}, chain ends there",
                        address, self.port
                    );
                    break;
                }
                Err(e) => return Err(e),
            };

            if reply.opcode != Opcode::Setup.code() {
                break;
            }
            match address.checked_add(1) {
                Some(next) => address = next,
                None => return Ok(u8::MAX),
            }
        }

        let count = address - 1;
        debug!("Discovered {} board(s) on {}", count, self.port);
        Ok(count)
    }

    /// Read the relay state byte of one board
    pub async fn get_port(&mut self, address: u8) -> Result<u8, RelayError> {
        let reply = self.exchange(Opcode::GetPort, address, 0).await?;
        Ok(reply.data)
    }

    /// Write the relay state byte of one board, returning the byte it echoed
    pub async fn set_port(&mut self, address: u8, data: u8) -> Result<u8, RelayError> {
        let reply = self.exchange(Opcode::SetPort, address, data).await?;
        Ok(reply.data)
    }

    /// Send a command frame and validate the reply
    async fn exchange(&mut self, opcode: Opcode, address: u8, data: u8) -> Result<Frame, RelayError> {
        self.send(Frame::command(opcode, address, data), opcode)
            .await?;
        self.receive(opcode, address).await
    }

    async fn send(&mut self, frame: Frame, opcode: Opcode) -> Result<(), RelayError> {
        let port = &self.port;
        let io = &mut self.io;

        io.discard_buffers()
            .map_err(|e| io_error(port, opcode, frame.address, e))?;

        let bytes = frame.encode();
        trace!("{} >> {:02X?}", port, bytes);

        let write = async {
            io.write_all(&bytes).await?;
            io.flush().await
        };
        bounded(self.timeouts.write, write)
            .await
            .map_err(|e| io_error(port, opcode, frame.address, e))
    }

    async fn receive(&mut self, opcode: Opcode, address: u8) -> Result<Frame, RelayError> {
        let port = &self.port;
        let io = &mut self.io;

        let mut bytes = [0u8; FRAME_LEN];
        bounded(self.timeouts.read, io.read_exact(&mut bytes))
            .await
            .map_err(|e| io_error(port, opcode, address, e))?;
        trace!("{} << {:02X?}", port, bytes);

        let reply = Frame::decode(&bytes).map_err(|e| match e {
            FrameError::ChecksumMismatch { expected, actual } => RelayError::Corrupt {
                port: port.clone(),
                opcode,
                address,
                expected,
                actual,
            },
            FrameError::UnknownOpcode(actual) => RelayError::OpcodeMismatch {
                port: port.clone(),
                opcode,
                address,
                expected: opcode.reply_code(),
                actual,
            },
        })?;

        if reply.address != address {
            return Err(RelayError::BoardMismatch {
                port: port.clone(),
                opcode,
                expected: address,
                actual: reply.address,
            });
        }

        let accepted = reply.is_reply_to(opcode)
            || (opcode == Opcode::Setup && reply.opcode == Opcode::Setup.code());
        if !accepted {
            return Err(RelayError::OpcodeMismatch {
                port: port.clone(),
                opcode,
                address,
                expected: opcode.reply_code(),
                actual: reply.opcode,
            });
        }

        Ok(reply)
    }
}

/// Apply an optional time limit, reporting expiry as `TimedOut`
async fn bounded<F, R>(limit: Option<Duration>, operation: F) -> io::Result<R>
where
    F: Future<Output = io::Result<R>>,
{
    match limit {
        Some(limit) => timeout(limit, operation)
            .await
            .unwrap_or_else(|_| Err(io::ErrorKind::TimedOut.into())),
        None => operation.await,
    }
}

fn io_error(port: &str, opcode: Opcode, address: u8, source: io::Error) -> RelayError {
    if source.kind() == io::ErrorKind::TimedOut {
        RelayError::Timeout {
            port: port.to_string(),
            opcode,
            address,
        }
    } else {
        RelayError::Io {
            port: port.to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, DuplexStream};

    const TEST_TIMEOUT: Duration = Duration::from_millis(50);

    /// Answer each received frame with the next scripted reply; `None` stays silent
    fn scripted(replies: Vec<Option<[u8; FRAME_LEN]>>) -> DuplexStream {
        let (host, mut board) = duplex(64);
        tokio::spawn(async move {
            for reply in replies {
                let mut frame = [0u8; FRAME_LEN];
                if board.read_exact(&mut frame).await.is_err() {
                    return;
                }
                if let Some(reply) = reply {
                    let _ = board.write_all(&reply).await;
                }
            }
            // Keep the link open so late reads time out instead of hitting EOF
            let mut sink = [0u8; FRAME_LEN];
            while board.read_exact(&mut sink).await.is_ok() {}
        });
        host
    }

    fn driver(replies: Vec<Option<[u8; FRAME_LEN]>>) -> RelayDriver<DuplexStream> {
        RelayDriver::new("TEST", scripted(replies), Timeouts::both(TEST_TIMEOUT))
    }

    #[tokio::test]
    async fn test_set_port_returns_echo() {
        let mut driver = driver(vec![Some(Frame::reply(Opcode::SetPort, 1, 0x05).encode())]);
        assert_eq!(driver.set_port(1, 0x05).await.unwrap(), 0x05);
    }

    #[tokio::test]
    async fn test_get_port_reads_state() {
        let mut driver = driver(vec![Some(Frame::reply(Opcode::GetPort, 2, 0x81).encode())]);
        assert_eq!(driver.get_port(2).await.unwrap(), 0x81);
    }

    #[tokio::test]
    async fn test_setup_counts_chain() {
        let mut driver = driver(vec![
            Some(Frame::command(Opcode::Setup, 1, 0).encode()),
            Some(Frame::command(Opcode::Setup, 2, 0).encode()),
            Some(Frame::command(Opcode::Setup, 3, 0).encode()),
            Some(Frame::reply(Opcode::Setup, 4, 0).encode()),
        ]);
        assert_eq!(driver.setup().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_setup_silence_after_first_board_ends_chain() {
        let mut driver = driver(vec![Some(Frame::command(Opcode::Setup, 1, 0).encode()), None]);
        assert_eq!(driver.setup().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_setup_silence_at_first_address_is_timeout() {
        let mut driver = driver(vec![None]);
        let err = driver.setup().await.unwrap_err();
        assert!(err.is_timeout());
        assert!(!err.is_transport());
    }

    #[tokio::test]
    async fn test_corrupt_checksum_is_rejected() {
        let mut bytes = Frame::reply(Opcode::SetPort, 1, 0x01).encode();
        bytes[3] ^= 0xFF;
        let mut driver = driver(vec![Some(bytes)]);
        let err = driver.set_port(1, 0x01).await.unwrap_err();
        assert!(matches!(err, RelayError::Corrupt { address: 1, .. }));
    }

    #[tokio::test]
    async fn test_wrong_board_is_rejected() {
        let mut driver = driver(vec![Some(Frame::reply(Opcode::SetPort, 2, 0x01).encode())]);
        let err = driver.set_port(1, 0x01).await.unwrap_err();
        assert!(matches!(
            err,
            RelayError::BoardMismatch {
                expected: 1,
                actual: 2,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_uncomplemented_opcode_is_rejected() {
        let mut driver = driver(vec![Some(Frame::command(Opcode::SetPort, 1, 0x01).encode())]);
        let err = driver.set_port(1, 0x01).await.unwrap_err();
        assert!(matches!(err, RelayError::OpcodeMismatch { actual: 0x03, .. }));
    }

    #[tokio::test]
    async fn test_closed_link_is_transport_error() {
        let (host, board) = duplex(64);
        drop(board);
        let mut driver = RelayDriver::new("TEST", host, Timeouts::both(TEST_TIMEOUT));
        let err = driver.get_port(1).await.unwrap_err();
        assert!(err.is_transport());
    }
}
