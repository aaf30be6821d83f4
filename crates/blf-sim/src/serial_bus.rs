//! Simulated serial ports with board chains attached
//!
//! [`VirtualSerialBus`] stands in for the host's serial ports. Opening a port
//! spawns a task that answers frames from the port's [`VirtualBoardChain`]
//! over an in-memory duplex link. Unplugging a port closes every link to it.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use blf_protocol::{PortOpener, FRAME_LEN};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::board_chain::VirtualBoardChain;

const LINK_BUFFER: usize = 256;

struct Port {
    chain: Arc<Mutex<VirtualBoardChain>>,
    present: bool,
    opens: usize,
    /// Bumped on unplug; links from an older generation shut down
    generation: watch::Sender<u64>,
}

/// Collection of simulated serial ports
#[derive(Clone, Default)]
pub struct VirtualSerialBus {
    ports: Arc<Mutex<HashMap<String, Port>>>,
}

impl VirtualSerialBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a chain of `boards` boards to `port`, returning the shared chain
    pub fn attach(&self, port: &str, boards: u8) -> Arc<Mutex<VirtualBoardChain>> {
        let chain = Arc::new(Mutex::new(VirtualBoardChain::new(port, boards)));
        let (generation, _) = watch::channel(0);
        self.lock().insert(
            key(port),
            Port {
                chain: Arc::clone(&chain),
                present: true,
                opens: 0,
                generation,
            },
        );
        chain
    }

    /// Chain attached to `port`
    pub fn chain(&self, port: &str) -> Option<Arc<Mutex<VirtualBoardChain>>> {
        self.lock().get(&key(port)).map(|p| Arc::clone(&p.chain))
    }

    /// Make `port` disappear, closing open links
    pub fn unplug(&self, port: &str) {
        if let Some(entry) = self.lock().get_mut(&key(port)) {
            info!("Unplugging virtual port {}", port);
            entry.present = false;
            entry.generation.send_modify(|g| *g += 1);
        }
    }

    /// Make a previously unplugged port available again
    pub fn plug(&self, port: &str) {
        if let Some(entry) = self.lock().get_mut(&key(port)) {
            info!("Plugging virtual port {}", port);
            entry.present = true;
        }
    }

    /// Names of ports currently present
    pub fn available(&self) -> Vec<String> {
        let ports = self.lock();
        let mut names: Vec<String> = ports
            .iter()
            .filter(|(_, p)| p.present)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// How many times `port` has been opened successfully
    pub fn open_count(&self, port: &str) -> usize {
        self.lock().get(&key(port)).map_or(0, |p| p.opens)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Port>> {
        self.ports.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PortOpener for VirtualSerialBus {
    type Link = DuplexStream;

    async fn open(&self, port: &str) -> io::Result<DuplexStream> {
        let (chain, generation) = {
            let mut ports = self.lock();
            let entry = ports
                .get_mut(&key(port))
                .filter(|p| p.present)
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no such port: {port}")))?;
            entry.opens += 1;
            (Arc::clone(&entry.chain), entry.generation.subscribe())
        };

        let (host, device) = duplex(LINK_BUFFER);
        tokio::spawn(run_board_chain_task(device, chain, generation));
        debug!("Opened virtual port {}", port);
        Ok(host)
    }
}

/// Answer frames on `stream` until the host disconnects or the port is unplugged
pub async fn run_board_chain_task(
    mut stream: DuplexStream,
    chain: Arc<Mutex<VirtualBoardChain>>,
    mut generation: watch::Receiver<u64>,
) {
    let mut frame = [0u8; FRAME_LEN];

    loop {
        tokio::select! {
            biased;

            _ = generation.changed() => break,
            result = stream.read_exact(&mut frame) => {
                if result.is_err() {
                    break;
                }
                let reply = chain
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .process_frame(&frame);
                if let Some(reply) = reply {
                    if stream.write_all(&reply).await.is_err() {
                        break;
                    }
                }
            }
        }
    }
    debug!("Virtual board chain link closed");
}

fn key(port: &str) -> String {
    port.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use blf_protocol::{RelayDriver, RelayError, Timeouts};
    use std::time::Duration;

    fn timeouts() -> Timeouts {
        Timeouts::both(Duration::from_millis(100))
    }

    #[tokio::test]
    async fn test_driver_against_chain() {
        let bus = VirtualSerialBus::new();
        let chain = bus.attach("COM3", 2);

        let link = bus.open("com3").await.unwrap();
        let mut driver = RelayDriver::new("COM3", link, timeouts());
        assert_eq!(driver.setup().await.unwrap(), 2);
        assert_eq!(driver.set_port(2, 0x81).await.unwrap(), 0x81);
        assert_eq!(driver.get_port(2).await.unwrap(), 0x81);
        assert_eq!(chain.lock().unwrap().state(2), Some(0x81));
    }

    #[tokio::test]
    async fn test_missing_port_not_found() {
        let bus = VirtualSerialBus::new();
        let err = bus.open("COM9").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_unplug_closes_link() {
        let bus = VirtualSerialBus::new();
        bus.attach("COM3", 1);
        let link = bus.open("COM3").await.unwrap();
        let mut driver = RelayDriver::new("COM3", link, timeouts());
        driver.set_port(1, 1).await.unwrap();

        bus.unplug("COM3");
        let err = driver.set_port(1, 2).await.unwrap_err();
        assert!(matches!(err, RelayError::Io { .. }));
        assert!(bus.open("COM3").await.is_err());
        assert!(bus.available().is_empty());

        bus.plug("COM3");
        assert!(bus.open("COM3").await.is_ok());
        assert_eq!(bus.open_count("COM3"), 2);
    }
}
