//! Worker lifecycle
//!
//! [`Service`] owns one port worker per configured serial port and one
//! manager worker per endpoint. `start_all` starts ports first, then
//! managers; `stop_all` stops them in reverse order.

use std::sync::Arc;

use blf_logic::board::port_key;
use blf_logic::Model;
use blf_manager::ManagerConnector;
use blf_protocol::PortOpener;
use tracing::info;

use crate::control::Controller;
use crate::manager_worker::{ManagerSettings, ManagerWorker};
use crate::port_worker::{PortSettings, PortWorker};
use crate::worker::{Phase, Worker, WorkerWaker};

struct ManagerEntry<C> {
    name: String,
    connector: Arc<C>,
    settings: ManagerSettings,
}

/// All workers of one relay bridge
pub struct Service<O, C> {
    model: Arc<Model>,
    opener: Arc<O>,
    port_settings: PortSettings,
    managers: Vec<ManagerEntry<C>>,
    port_workers: Vec<(String, Worker)>,
    manager_workers: Vec<Worker>,
}

impl<O: PortOpener, C: ManagerConnector> Service<O, C> {
    pub fn new(model: Arc<Model>, opener: O, port_settings: PortSettings) -> Self {
        Self {
            model,
            opener: Arc::new(opener),
            port_settings,
            managers: Vec::new(),
            port_workers: Vec::new(),
            manager_workers: Vec::new(),
        }
    }

    /// Register a manager endpoint; takes effect at the next `start_all`
    pub fn add_manager(&mut self, name: impl Into<String>, connector: C, settings: ManagerSettings) {
        self.managers.push(ManagerEntry {
            name: name.into(),
            connector: Arc::new(connector),
            settings,
        });
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    pub fn controller(&self) -> Controller {
        Controller::new(Arc::clone(&self.model))
    }

    pub fn is_running(&self) -> bool {
        !self.port_workers.is_empty() || !self.manager_workers.is_empty()
    }

    /// Start port workers, then manager workers
    pub fn start_all(&mut self) {
        if self.is_running() {
            return;
        }

        for port in self.model.boards().ports() {
            let worker = PortWorker::new(
                port.clone(),
                Arc::clone(&self.model),
                Arc::clone(&self.opener),
                self.port_settings,
            )
            .spawn();
            self.port_workers.push((port, worker));
        }

        for entry in &self.managers {
            let worker = ManagerWorker::new(
                entry.name.clone(),
                Arc::clone(&entry.connector),
                Arc::clone(&self.model),
                entry.settings.clone(),
            )
            .spawn();
            self.manager_workers.push(worker);
        }

        info!(
            "Started {} port worker(s) and {} manager worker(s)",
            self.port_workers.len(),
            self.manager_workers.len()
        );
    }

    /// Wake the worker of `port` (compared case-insensitively)
    pub fn wake_port(&self, port: &str) -> bool {
        let key = port_key(port);
        match self.port_workers.iter().find(|(name, _)| port_key(name) == key) {
            Some((_, worker)) => {
                worker.wake();
                true
            }
            None => false,
        }
    }

    /// Wake handles of every port worker, keyed by port name
    pub fn port_wakers(&self) -> Vec<(String, WorkerWaker)> {
        self.port_workers
            .iter()
            .map(|(port, worker)| (port.clone(), worker.waker()))
            .collect()
    }

    /// Name and phase of every running worker
    pub fn phases(&self) -> Vec<(String, Phase)> {
        self.port_workers
            .iter()
            .map(|(_, worker)| worker)
            .chain(self.manager_workers.iter())
            .map(|worker| (worker.name().to_string(), worker.phase()))
            .collect()
    }
}

impl<O, C> Service<O, C> {
    /// Stop manager workers, then port workers
    pub fn stop_all(&mut self) {
        for worker in self.manager_workers.drain(..).rev() {
            worker.stop();
        }
        for (_, worker) in self.port_workers.drain(..).rev() {
            worker.stop();
        }
        info!("Stopped all workers");
    }
}

impl<O, C> Drop for Service<O, C> {
    fn drop(&mut self) {
        if !self.port_workers.is_empty() || !self.manager_workers.is_empty() {
            self.stop_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blf_logic::{BoardSpec, FunctionSpec, ModelSpec, SwitchSpec};
    use blf_protocol::Timeouts;
    use blf_sim::{VirtualPbx, VirtualSerialBus};
    use std::time::Duration;

    fn model() -> Arc<Model> {
        let spec = ModelSpec {
            switches: vec![SwitchSpec::new("West")],
            functions: vec![],
            boards: vec![
                BoardSpec::new("COM3", 1, vec![Some(FunctionSpec::switch("West"))]),
                BoardSpec::new("com3", 2, vec![]),
                BoardSpec::new("COM4", 1, vec![]),
            ],
        };
        Arc::new(Model::build(&spec).unwrap())
    }

    fn settings() -> PortSettings {
        PortSettings {
            timeouts: Timeouts::both(Duration::from_millis(50)),
            retry_interval: None,
        }
    }

    #[tokio::test]
    async fn test_one_port_worker_per_port() {
        let mut service: Service<VirtualSerialBus, VirtualPbx> =
            Service::new(model(), VirtualSerialBus::new(), settings());
        service.start_all();

        let names: Vec<String> = service.phases().into_iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["port COM3", "port COM4"]);
        assert!(service.wake_port("com4"));
        assert!(!service.wake_port("COM5"));

        service.stop_all();
        assert!(!service.is_running());
        assert!(service.phases().is_empty());
    }

    #[tokio::test]
    async fn test_managers_started_after_ports() {
        let mut service = Service::new(model(), VirtualSerialBus::new(), settings());
        let pbx = VirtualPbx::new("relay", "pw");
        service.add_manager(
            "pbx",
            pbx.clone(),
            ManagerSettings {
                username: "relay".into(),
                password: "pw".into(),
                device_format: "Custom:{0}".into(),
                retry_interval: None,
                event_wait: Duration::from_secs(1),
            },
        );
        service.start_all();

        let names: Vec<String> = service.phases().into_iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["port COM3", "port COM4", "manager pbx"]);
        assert_eq!(service.controller().get("west"), Ok(false));
    }
}
