//! Virtual PBX manager interface
//!
//! [`VirtualPbx`] keeps global variables and a queue of user events the way
//! the manager interface exposes them. Each [`PbxClient`] is one HTTP
//! session: it must log in before anything but `Login` is accepted, and a
//! simulated restart drops every session.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use blf_manager::{
    Action, Enumeration, ManagerConnector, ManagerError, ManagerTransport, Response, ResultSet,
    RELAY_USER_EVENT,
};
use tokio::sync::Notify;
use tracing::{debug, info};

const MAX_WAIT: Duration = Duration::from_secs(30);

#[derive(Default)]
struct PbxState {
    username: String,
    secret: String,
    sessions: HashSet<u64>,
    variables: HashMap<String, String>,
    events: VecDeque<ResultSet>,
    log: Vec<Action>,
    outage: bool,
    failing: HashMap<String, usize>,
}

struct Inner {
    state: Mutex<PbxState>,
    wake: Notify,
    next_session: AtomicU64,
}

/// Simulated manager interface shared by any number of sessions
#[derive(Clone)]
pub struct VirtualPbx {
    inner: Arc<Inner>,
}

impl VirtualPbx {
    /// Create a PBX accepting `username`/`secret`
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        let state = PbxState {
            username: username.into(),
            secret: secret.into(),
            ..PbxState::default()
        };
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                wake: Notify::new(),
                next_session: AtomicU64::new(1),
            }),
        }
    }

    /// Open a new, not yet logged in session
    pub fn client(&self) -> PbxClient {
        PbxClient {
            pbx: self.clone(),
            session: self.inner.next_session.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn variable(&self, name: &str) -> Option<String> {
        self.lock().variables.get(name).cloned()
    }

    /// Set a variable as the dial plan would
    pub fn set_variable(&self, name: impl Into<String>, value: impl Into<String>) {
        self.lock().variables.insert(name.into(), value.into());
    }

    /// Queue an event for the next `WaitEvent`
    pub fn push_event(&self, event: ResultSet) {
        self.lock().events.push_back(event);
        self.inner.wake.notify_waiters();
    }

    /// Queue a relay user event for `switch`
    pub fn push_relay_event(&self, switch: &str, action: &str) {
        self.push_event(
            ResultSet::new()
                .with("Event", "UserEvent")
                .with("UserEvent", RELAY_USER_EVENT)
                .with("Switch", switch)
                .with("Action", action),
        );
    }

    /// Fail every request at the transport level while `down` is set
    pub fn set_outage(&self, down: bool) {
        info!("Virtual PBX outage: {}", down);
        self.lock().outage = down;
        self.inner.wake.notify_waiters();
    }

    /// Answer the next `count` actions named `action` with an error response
    pub fn fail_next(&self, action: &str, count: usize) {
        self.lock().failing.insert(action.to_lowercase(), count);
    }

    /// Forget every session, as a PBX restart would
    pub fn restart(&self) {
        info!("Virtual PBX restarting");
        self.lock().sessions.clear();
        self.inner.wake.notify_waiters();
    }

    /// Number of sessions currently logged in
    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }

    /// Every action received, in order
    pub fn log(&self) -> Vec<Action> {
        self.lock().log.clone()
    }

    /// Actions named `name` received so far
    pub fn actions(&self, name: &str) -> Vec<Action> {
        self.lock()
            .log
            .iter()
            .filter(|a| a.name().eq_ignore_ascii_case(name))
            .cloned()
            .collect()
    }

    pub fn clear_log(&self) {
        self.lock().log.clear();
    }

    fn lock(&self) -> MutexGuard<'_, PbxState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Handle everything except the `WaitEvent` long-poll
    fn handle(&self, session: u64, action: &Action) -> Result<String, ManagerError> {
        let mut state = self.lock();
        state.log.push(action.clone());

        if state.outage {
            return Err(ManagerError::Transport("virtual PBX unreachable".to_string()));
        }

        let name = action.name().to_lowercase();
        if let Some(remaining) = state.failing.get_mut(&name).filter(|n| **n > 0) {
            *remaining -= 1;
            return Ok(error("Injected failure"));
        }

        if name == "login" {
            let accepted = action.get("Username") == Some(state.username.as_str())
                && action.get("Secret") == Some(state.secret.as_str());
            if !accepted {
                return Ok(error("Authentication failed"));
            }
            state.sessions.insert(session);
            debug!("Virtual PBX session {} logged in", session);
            return Ok(success(Some("Authentication accepted")).fields().to_wire());
        }

        if !state.sessions.contains(&session) {
            return Ok(error("Permission denied"));
        }

        let reply = match name.as_str() {
            "logoff" => {
                state.sessions.remove(&session);
                Response::new("Goodbye", Some("Thanks for all the fish."))
            }
            "ping" => Response::new("Pong", None),
            "getvar" => {
                let variable = action.get("Variable").unwrap_or_default();
                let value = state.variables.get(variable).cloned().unwrap_or_default();
                let fields = ResultSet::new()
                    .with("Response", "Success")
                    .with("Variable", variable)
                    .with("Value", value);
                return Ok(fields.to_wire());
            }
            "setvar" => match (action.get("Variable"), action.get("Value")) {
                (Some(variable), Some(value)) => {
                    state.variables.insert(variable.to_string(), value.to_string());
                    success(Some("Variable Set"))
                }
                _ => Response::new("Error", Some("No variable specified")),
            },
            _ => Response::new("Error", Some("Invalid/unknown command")),
        };
        Ok(reply.fields().to_wire())
    }

    async fn wait_event(&self, session: u64, action: &Action) -> Result<String, ManagerError> {
        let limit = action
            .get("Timeout")
            .and_then(|t| t.parse::<u64>().ok())
            .map_or(MAX_WAIT, Duration::from_secs)
            .min(MAX_WAIT);
        let deadline = tokio::time::Instant::now() + limit;

        {
            let mut state = self.lock();
            state.log.push(action.clone());
        }

        loop {
            let notified = self.inner.wake.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.outage {
                    return Err(ManagerError::Transport("virtual PBX unreachable".to_string()));
                }
                if !state.sessions.contains(&session) {
                    return Ok(error("Permission denied"));
                }
                if !state.events.is_empty() {
                    let events = state.events.drain(..).collect();
                    return Ok(complete(events));
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(complete(Vec::new()));
            }
        }
    }
}

/// One manager session against a [`VirtualPbx`]
pub struct PbxClient {
    pbx: VirtualPbx,
    session: u64,
}

impl ManagerTransport for PbxClient {
    async fn send(&self, action: &Action) -> Result<String, ManagerError> {
        if action.name().eq_ignore_ascii_case("WaitEvent") {
            self.pbx.wait_event(self.session, action).await
        } else {
            self.pbx.handle(self.session, action)
        }
    }
}

impl ManagerConnector for VirtualPbx {
    type Transport = PbxClient;

    fn connect(&self) -> Result<PbxClient, ManagerError> {
        Ok(self.client())
    }
}

fn success(message: Option<&str>) -> Response {
    Response::new("Success", message)
}

fn error(message: &str) -> String {
    Response::new("Error", Some(message)).fields().to_wire()
}

fn complete(events: Vec<ResultSet>) -> String {
    Enumeration {
        response: success(Some("Waiting for Event completed.")),
        events,
        complete: ResultSet::new().with("Event", "WaitEventComplete"),
    }
    .to_wire()
}
