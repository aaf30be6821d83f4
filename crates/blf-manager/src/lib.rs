//! PBX Manager Interface Client
//!
//! This crate speaks the HTTP flavour of the PBX manager interface:
//!
//! - **Actions** are sent as `GET <base>rawman?action=<Name>&key=value...`,
//!   with the session carried by the cookie set on `Login`
//! - **Result sets** are CRLF-separated `Key: Value` lines
//! - **Responses** are result sets carrying a `Response` status
//! - **Enumerations** are a response, a run of events and a closing
//!   `<Action>Complete` event, separated by blank lines
//!
//! # Architecture
//!
//! [`ManagerTransport`] is the seam between protocol and network:
//! [`HttpTransport`] sends actions with `reqwest` and bounds the number of
//! simultaneous requests, so a long-poll never starves short actions.
//! [`ManagerSession`] layers the typed operations (login, variables,
//! events) over any transport.
//!
//! # Example
//!
//! ```rust,no_run
//! use blf_manager::{HttpTransport, ManagerEndpoint, ManagerSession};
//!
//! # async fn run() -> Result<(), blf_manager::ManagerError> {
//! let endpoint = ManagerEndpoint::new("pbx.local", "relay", "secret");
//! let transport = HttpTransport::new(&endpoint.base_uri()?, endpoint.max_requests)?;
//! let session = ManagerSession::new(transport);
//!
//! session.login(&endpoint.username, &endpoint.password).await?;
//! session.set_var("DEVICE_STATE(Custom:West)", "INUSE").await?;
//! # Ok(())
//! # }
//! ```

pub mod action;
pub mod device;
pub mod endpoint;
pub mod error;
pub mod message;
pub mod session;
pub mod transport;

pub use action::Action;
pub use device::{
    device_state, device_variable, parse_device_state, RelayAction, OFF_STATE, ON_STATE,
    RELAY_USER_EVENT,
};
pub use endpoint::ManagerEndpoint;
pub use error::ManagerError;
pub use message::{Enumeration, Response, ResultSet};
pub use session::ManagerSession;
pub use transport::{HttpTransport, ManagerConnector, ManagerTransport};
