//! Serial port arrival watch
//!
//! Polls the system's serial ports and wakes the worker of a configured port
//! as soon as it appears, so a board plugged in during a retry wait is picked
//! up without waiting out the interval.

use std::collections::HashSet;
use std::time::Duration;

use blf_logic::board::port_key;
use blf_sync::WorkerWaker;
use serialport::available_ports;
use tracing::{debug, info, warn};

/// How often the port list is enumerated
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Port keys present in `current` but not in `previous`
pub fn arrivals(previous: &HashSet<String>, current: &HashSet<String>) -> Vec<String> {
    let mut arrived: Vec<String> = current.difference(previous).cloned().collect();
    arrived.sort();
    arrived
}

fn present_ports() -> Option<HashSet<String>> {
    match available_ports() {
        Ok(ports) => Some(ports.iter().map(|p| port_key(&p.port_name)).collect()),
        Err(e) => {
            warn!("Serial port enumeration failed: {}", e);
            None
        }
    }
}

/// Wake the matching worker whenever a configured port appears
pub async fn watch_ports(wakers: Vec<(String, WorkerWaker)>, interval: Duration) {
    let wakers: Vec<(String, String, WorkerWaker)> = wakers
        .into_iter()
        .map(|(port, waker)| (port_key(&port), port, waker))
        .collect();
    let mut known = present_ports().unwrap_or_default();
    debug!("Watching {} serial port(s) for arrival", wakers.len());

    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let Some(current) = present_ports() else {
            continue;
        };

        for key in arrivals(&known, &current) {
            if let Some((_, port, waker)) = wakers.iter().find(|(k, _, _)| *k == key) {
                info!("Serial port {} appeared", port);
                waker.wake();
            }
        }
        known = current;
    }
}
