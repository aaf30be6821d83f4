//! Typed manager operations over a transport

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::action::Action;
use crate::error::ManagerError;
use crate::message::{Enumeration, Response, ResultSet};
use crate::transport::ManagerTransport;

const SUCCESS: &str = "Success";

/// One logged-in (or about to be) manager session
///
/// Cloning shares the transport, so a clone can run a long-poll while the
/// original sends other actions.
pub struct ManagerSession<T> {
    transport: Arc<T>,
}

impl<T> Clone for ManagerSession<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
        }
    }
}

impl<T: ManagerTransport> ManagerSession<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport: Arc::new(transport),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send `action` and require the response status `expected`
    pub async fn execute(&self, action: &Action, expected: &str) -> Result<Response, ManagerError> {
        let body = self.transport.send(action).await?;
        Response::parse(action.name(), &body)?.expect(action.name(), expected)
    }

    /// Send an enumerating action and parse the full reply
    pub async fn enumerate(&self, action: &Action) -> Result<Enumeration, ManagerError> {
        let body = self.transport.send(action).await?;
        Enumeration::parse(action.name(), &body)
    }

    pub async fn login(&self, username: &str, secret: &str) -> Result<(), ManagerError> {
        let action = Action::new("Login")
            .param("Username", username)
            .param("Secret", secret);
        let response = self.execute(&action, SUCCESS).await?;
        debug!(
            "Logged in as {}: {}",
            username,
            response.message().unwrap_or("no message")
        );
        Ok(())
    }

    pub async fn logoff(&self) -> Result<(), ManagerError> {
        self.execute(&Action::new("Logoff"), "Goodbye").await?;
        Ok(())
    }

    pub async fn ping(&self) -> Result<(), ManagerError> {
        self.execute(&Action::new("Ping"), "Pong").await?;
        Ok(())
    }

    /// Read a global variable; an unset variable yields `None`
    pub async fn get_var(&self, variable: &str) -> Result<Option<String>, ManagerError> {
        let action = Action::new("GetVar").param("Variable", variable);
        let response = self.execute(&action, SUCCESS).await?;
        Ok(response
            .fields()
            .get("Value")
            .filter(|value| !value.is_empty())
            .map(str::to_string))
    }

    pub async fn set_var(&self, variable: &str, value: &str) -> Result<(), ManagerError> {
        let action = Action::new("SetVar")
            .param("Variable", variable)
            .param("Value", value);
        self.execute(&action, SUCCESS).await?;
        Ok(())
    }

    /// Long-poll for events, returning those delivered before `timeout`
    pub async fn wait_event(&self, timeout: Duration) -> Result<Vec<ResultSet>, ManagerError> {
        let action = Action::new("WaitEvent").param("Timeout", timeout.as_secs().max(1).to_string());
        Ok(self.enumerate(&action).await?.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replies from a fixed script and records every action
    #[derive(Default)]
    struct Scripted {
        replies: Mutex<VecDeque<Result<String, ManagerError>>>,
        sent: Mutex<Vec<Action>>,
    }

    impl Scripted {
        fn with(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|r| Ok(r.to_string())).collect()),
                sent: Mutex::default(),
            }
        }
    }

    impl ManagerTransport for Scripted {
        async fn send(&self, action: &Action) -> Result<String, ManagerError> {
            self.sent.lock().unwrap().push(action.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ManagerError::Transport("script exhausted".into())))
        }
    }

    #[tokio::test]
    async fn test_login_sends_credentials() {
        let session = ManagerSession::new(Scripted::with(&[
            "Response: Success\r\nMessage: Authentication accepted\r\n\r\n",
        ]));
        session.login("relay", "pw").await.unwrap();

        let sent = session.transport().sent.lock().unwrap();
        assert_eq!(sent[0].name(), "Login");
        assert_eq!(sent[0].get("username"), Some("relay"));
        assert_eq!(sent[0].get("secret"), Some("pw"));
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let session = ManagerSession::new(Scripted::with(&[
            "Response: Error\r\nMessage: Authentication failed\r\n\r\n",
        ]));
        let err = session.login("relay", "bad").await.unwrap_err();
        assert!(matches!(err, ManagerError::Status { .. }));
        assert!(!err.is_transport());
    }

    #[tokio::test]
    async fn test_get_var_value_and_unset() {
        let session = ManagerSession::new(Scripted::with(&[
            "Response: Success\r\nVariable: DEVICE_STATE(Custom:West)\r\nValue: INUSE\r\n\r\n",
            "Response: Success\r\nVariable: DEVICE_STATE(Custom:East)\r\nValue: \r\n\r\n",
        ]));
        assert_eq!(
            session.get_var("DEVICE_STATE(Custom:West)").await.unwrap().as_deref(),
            Some("INUSE")
        );
        assert_eq!(session.get_var("DEVICE_STATE(Custom:East)").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_logoff_expects_goodbye() {
        let session = ManagerSession::new(Scripted::with(&[
            "Response: Goodbye\r\nMessage: Thanks for all the fish.\r\n\r\n",
            "Response: Success\r\n\r\n",
        ]));
        session.logoff().await.unwrap();
        assert!(session.logoff().await.is_err());
    }

    #[tokio::test]
    async fn test_ping_expects_pong() {
        let session = ManagerSession::new(Scripted::with(&[
            "Response: Pong\r\n\r\n",
            "Response: Success\r\nPing: Pong\r\n\r\n",
        ]));
        session.ping().await.unwrap();

        match session.ping().await.unwrap_err() {
            ManagerError::Status { expected, status, .. } => {
                assert_eq!(expected, "Pong");
                assert_eq!(status, "Success");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(session.transport().sent.lock().unwrap()[0].name(), "Ping");
    }

    #[tokio::test]
    async fn test_wait_event_returns_events() {
        let session = ManagerSession::new(Scripted::with(&[
            "Response: Success\r\n\r\n\
             Event: UserEvent\r\nUserEvent: Relay\r\nSwitch: West\r\nAction: Toggle\r\n\r\n\
             Event: WaitEventComplete\r\n\r\n",
        ]));
        let events = session.wait_event(Duration::from_secs(30)).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].get("Action"), Some("Toggle"));

        let sent = session.transport().sent.lock().unwrap();
        assert_eq!(sent[0].get("Timeout"), Some("30"));
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        let session = ManagerSession::new(Scripted::with(&[]));
        let err = session.set_var("X", "1").await.unwrap_err();
        assert!(err.is_transport());
    }
}
