//! Manager worker
//!
//! One worker per manager endpoint keeps the PBX device states and the
//! switches in agreement:
//!
//! 1. **Log on** with a fresh session, waiting the retry interval on failure
//! 2. **Sync**: adopt the PBX value of every switch that has not been
//!    assigned locally, push every other switch
//! 3. **Run** two streams over the same session: `SetVar` for each switch
//!    that changed, and a standing `WaitEvent` long-poll feeding relay events
//!    back into the model
//!
//! Any error after logon drops the session and logs on again straight away.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use blf_logic::{Model, SwitchId};
use blf_manager::{
    device_state, device_variable, parse_device_state, ManagerConnector, ManagerEndpoint,
    ManagerError, ManagerSession, RelayAction, ResultSet, RELAY_USER_EVENT,
};
use tracing::{debug, error, info, trace, warn};

use crate::pending::Pending;
use crate::worker::{Phase, Worker, WorkerContext};

/// Long-poll duration of each `WaitEvent`
pub const EVENT_WAIT: Duration = Duration::from_secs(30);

type Session<C> = ManagerSession<<C as ManagerConnector>::Transport>;

/// Per-endpoint settings of a manager worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerSettings {
    pub username: String,
    pub password: String,
    /// Device name format, `{0}` is replaced by the switch name
    pub device_format: String,
    /// Wait after a failed logon; `None` waits until woken
    pub retry_interval: Option<Duration>,
    /// Long-poll duration of each `WaitEvent`
    pub event_wait: Duration,
}

impl From<&ManagerEndpoint> for ManagerSettings {
    fn from(endpoint: &ManagerEndpoint) -> Self {
        Self {
            username: endpoint.username.clone(),
            password: endpoint.password.clone(),
            device_format: endpoint.device_format.clone(),
            retry_interval: endpoint.retry_interval(),
            event_wait: EVENT_WAIT,
        }
    }
}

/// Worker owning the connection to one manager endpoint
pub struct ManagerWorker<C> {
    name: String,
    connector: Arc<C>,
    model: Arc<Model>,
    settings: ManagerSettings,
}

impl<C: ManagerConnector> ManagerWorker<C> {
    pub fn new(name: impl Into<String>, connector: Arc<C>, model: Arc<Model>, settings: ManagerSettings) -> Self {
        Self {
            name: name.into(),
            connector,
            model,
            settings,
        }
    }

    /// Spawn the worker loop
    pub fn spawn(self) -> Worker {
        Worker::spawn(format!("manager {}", self.name), move |ctx| self.run(ctx))
    }

    /// Log on, sync and run, forever
    pub async fn run(self, ctx: WorkerContext) {
        loop {
            ctx.set_phase(Phase::Opening);
            let session = match self.logon().await {
                Ok(session) => session,
                Err(e) => {
                    error!("Logon to {} failed: {}", self.name, e);
                    ctx.retry_wait(self.settings.retry_interval).await;
                    continue;
                }
            };
            info!("Logged on to {}", self.name);

            let e = self.serve(&session, &ctx).await;
            if e.is_transport() {
                error!("Connection to {} lost: {}", self.name, e);
            } else {
                warn!("Reconnecting to {}: {}", self.name, e);
                if let Err(e) = session.logoff().await {
                    debug!("Logoff from {} failed: {}", self.name, e);
                }
            }
        }
    }

    async fn logon(&self) -> Result<Session<C>, ManagerError> {
        let session = ManagerSession::new(self.connector.connect()?);
        session
            .login(&self.settings.username, &self.settings.password)
            .await?;
        Ok(session)
    }

    /// Run a logged-on session until it fails
    async fn serve(&self, session: &Session<C>, ctx: &WorkerContext) -> ManagerError {
        ctx.set_phase(Phase::Syncing);

        let pending: Arc<Pending<SwitchId>> = Arc::new(Pending::new());
        let queue = Arc::clone(&pending);
        let _subscription = self
            .model
            .switches()
            .subscribe(move |id| queue.insert(id));

        if let Err(e) = self.initial_sync(session).await {
            return e;
        }
        info!(
            "Synchronized {} switch(es) with {}",
            self.model.switches().len(),
            self.name
        );

        ctx.set_phase(Phase::Running);
        let result = tokio::try_join!(self.outbound(session, &pending), self.inbound(session));
        match result {
            Ok((never, _)) => match never {},
            Err(e) => e,
        }
    }

    /// Push every switch that changes, one `SetVar` at a time
    async fn outbound(&self, session: &Session<C>, pending: &Pending<SwitchId>) -> Result<Infallible, ManagerError> {
        loop {
            for id in pending.next_batch().await {
                self.push(session, id).await?;
            }
        }
    }

    /// Keep a `WaitEvent` outstanding and apply the relay events it returns
    async fn inbound(&self, session: &Session<C>) -> Result<Infallible, ManagerError> {
        loop {
            let events = session.wait_event(self.settings.event_wait).await?;
            for event in &events {
                self.handle_event(event);
            }
        }
    }

    async fn initial_sync(&self, session: &Session<C>) -> Result<(), ManagerError> {
        for switch in self.model.switches().iter() {
            let variable = device_variable(&self.settings.device_format, switch.name());

            if !switch.is_dirty() {
                let value = session.get_var(&variable).await?;
                if let Some(on) = value.as_deref().and_then(parse_device_state) {
                    debug!("{} adopts {} from {}", switch.name(), device_state(on), self.name);
                    self.model.set_switch(switch.id(), on);
                    continue;
                }
            }

            session
                .set_var(&variable, device_state(switch.is_on()))
                .await?;
        }
        Ok(())
    }

    async fn push(&self, session: &Session<C>, id: SwitchId) -> Result<(), ManagerError> {
        let switch = self.model.switches().get(id);
        let variable = device_variable(&self.settings.device_format, switch.name());
        let value = device_state(switch.is_on());
        session.set_var(&variable, value).await?;
        debug!("{} = {} on {}", variable, value, self.name);
        Ok(())
    }

    fn handle_event(&self, event: &ResultSet) {
        let is_relay_event = event
            .event()
            .is_some_and(|name| name.eq_ignore_ascii_case("UserEvent"))
            && event
                .get("UserEvent")
                .is_some_and(|name| name.eq_ignore_ascii_case(RELAY_USER_EVENT));
        if !is_relay_event {
            trace!("Ignoring {:?} from {}", event.event(), self.name);
            return;
        }

        let Some(name) = event.get("Switch") else {
            warn!("Relay event from {} names no switch", self.name);
            return;
        };
        let Some(id) = self.model.switches().find(name) else {
            warn!("Relay event from {} for unknown switch {}", self.name, name);
            return;
        };
        let action = match event.get("Action").map(str::parse::<RelayAction>) {
            Some(Ok(action)) => action,
            Some(Err(e)) => {
                warn!("Relay event from {} for {}: {}", self.name, name, e);
                return;
            }
            None => {
                warn!("Relay event from {} for {} has no action", self.name, name);
                return;
            }
        };

        let on = match action {
            RelayAction::Toggle => self.model.toggle_switch(id),
            RelayAction::TurnOn | RelayAction::TurnOff => {
                let on = action.apply(false);
                self.model.set_switch(id, on);
                on
            }
        };
        info!(
            "{} turned {} by {}",
            self.model.switches().get(id).name(),
            if on { "on" } else { "off" },
            self.name
        );
    }
}
