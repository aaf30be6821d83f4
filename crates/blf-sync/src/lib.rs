//! Relay Bridge Synchronization
//!
//! This crate runs the workers that keep three views of every switch in
//! agreement: the in-memory [`Model`](blf_logic::Model), the relay boards on
//! the serial ports, and the device states of each PBX.
//!
//! # Workers
//!
//! - **Port worker**: one per serial port; discovers the board chain and
//!   pushes board state bytes as they change
//! - **Manager worker**: one per manager endpoint; mirrors switches into
//!   device-state variables and applies relay events coming back
//!
//! Each worker is a task running a restart loop. Faults never leave the
//! worker: they are logged and turned into a reconnect, with a retry wait
//! that an explicit wake (e.g. a serial port appearing) cuts short.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use blf_logic::{Model, ModelSpec};
//! use blf_manager::ManagerEndpoint;
//! use blf_protocol::SerialOpener;
//! use blf_sync::{ManagerSettings, PortSettings, Service};
//!
//! # async fn run(spec: ModelSpec) {
//! let model = Arc::new(Model::build(&spec).unwrap());
//! let mut service = Service::new(model, SerialOpener, PortSettings::default());
//!
//! let endpoint = ManagerEndpoint::new("pbx.local", "relay", "secret");
//! let settings = ManagerSettings::from(&endpoint);
//! service.add_manager("pbx.local", endpoint, settings);
//!
//! service.start_all();
//! service.controller().set("West", true).unwrap();
//! # }
//! ```

pub mod control;
pub mod manager_worker;
pub mod pending;
pub mod port_worker;
pub mod service;
pub mod worker;

pub use control::{ControlFault, Controller};
pub use manager_worker::{ManagerSettings, ManagerWorker, EVENT_WAIT};
pub use pending::Pending;
pub use port_worker::{PortSettings, PortWorker, DISCOVERY_ATTEMPTS, SET_PORT_ATTEMPTS};
pub use service::Service;
pub use worker::{wait_or_wake, Phase, WaitOutcome, Worker, WorkerContext, WorkerWaker};
