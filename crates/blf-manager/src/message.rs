//! Result sets, responses and event enumerations
//!
//! # Wire Format
//! ```text
//! Response: Success\r\n
//! Message: Waiting for Event completed.\r\n
//! \r\n
//! Event: UserEvent\r\n
//! UserEvent: Relay\r\n
//! Switch: West\r\n
//! Action: Toggle\r\n
//! \r\n
//! Event: WaitEventComplete\r\n
//! \r\n
//! ```
//!
//! Lines are split on the first colon; a line without one is a value with
//! no key. A blank line (`\r\n\r\n`) ends a result set, so it must not occur
//! inside one.

use crate::error::ManagerError;

const LINE_END: &str = "\r\n";
const SET_END: &str = "\r\n\r\n";

/// Key of the status line in a response
pub const RESPONSE_KEY: &str = "Response";
/// Key of the event name in an event
pub const EVENT_KEY: &str = "Event";
/// Key of the human-readable detail in a response
pub const MESSAGE_KEY: &str = "Message";

/// Ordered key/value lines of one manager message
///
/// Keys compare case-insensitively and may repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    entries: Vec<(Option<String>, String)>,
}

impl ResultSet {
    /// Create an empty result set
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`push`](Self::push)
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(Some(key.into()), value);
        self
    }

    /// Append a line
    pub fn push(&mut self, key: Option<String>, value: impl Into<String>) {
        self.entries.push((key, value.into()));
    }

    /// Parse one result set
    pub fn parse(text: &str) -> Result<Self, ManagerError> {
        let body = text.trim_end_matches(LINE_END);
        if body.contains(SET_END) {
            return Err(ManagerError::Malformed(
                "blank line inside a result set".to_string(),
            ));
        }

        let mut set = Self::new();
        for line in body.split(LINE_END).filter(|line| !line.is_empty()) {
            match line.split_once(':') {
                Some((key, value)) => set.push(Some(key.trim().to_string()), value.trim()),
                None => set.push(None, line.trim()),
            }
        }
        Ok(set)
    }

    /// First value for `key`, ignoring case
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_deref().is_some_and(|k| k.eq_ignore_ascii_case(key)))
            .map(|(_, v)| v.as_str())
    }

    /// Every value for `key`, ignoring case, in order
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(k, _)| k.as_deref().is_some_and(|k| k.eq_ignore_ascii_case(key)))
            .map(|(_, v)| v.as_str())
    }

    /// Values of lines without a key
    pub fn unkeyed(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|(k, _)| k.is_none())
            .map(|(_, v)| v.as_str())
    }

    /// Lines in order
    pub fn entries(&self) -> &[(Option<String>, String)] {
        &self.entries
    }

    /// Whether the set has no lines
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Event name, if this is an event
    pub fn event(&self) -> Option<&str> {
        self.get(EVENT_KEY)
    }

    /// Encode as wire text, including the terminating blank line
    pub fn to_wire(&self) -> String {
        let mut text = String::new();
        for (key, value) in &self.entries {
            if let Some(key) = key {
                text.push_str(key);
                text.push_str(": ");
            }
            text.push_str(value);
            text.push_str(LINE_END);
        }
        text.push_str(LINE_END);
        text
    }
}

/// A result set with a `Response` status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: String,
    fields: ResultSet,
}

impl Response {
    /// Interpret a result set as a response to `action`
    pub fn from_result_set(action: &str, fields: ResultSet) -> Result<Self, ManagerError> {
        let status = fields
            .get(RESPONSE_KEY)
            .ok_or_else(|| ManagerError::MissingResponse {
                action: action.to_string(),
            })?
            .to_string();
        Ok(Self { status, fields })
    }

    /// Parse the body of an action reply
    pub fn parse(action: &str, text: &str) -> Result<Self, ManagerError> {
        Self::from_result_set(action, ResultSet::parse(text)?)
    }

    /// Build a response with a status and optional message
    pub fn new(status: impl Into<String>, message: Option<&str>) -> Self {
        let status = status.into();
        let mut fields = ResultSet::new().with(RESPONSE_KEY, status.clone());
        if let Some(message) = message {
            fields.push(Some(MESSAGE_KEY.to_string()), message);
        }
        Self { status, fields }
    }

    /// Status value, e.g. `Success` or `Error`
    pub fn status(&self) -> &str {
        &self.status
    }

    /// `Message` value, if any
    pub fn message(&self) -> Option<&str> {
        self.fields.get(MESSAGE_KEY)
    }

    /// All lines of the response
    pub fn fields(&self) -> &ResultSet {
        &self.fields
    }

    /// Fail unless the status equals `expected` (ignoring case)
    pub fn expect(self, action: &str, expected: &str) -> Result<Self, ManagerError> {
        if self.status.eq_ignore_ascii_case(expected) {
            Ok(self)
        } else {
            Err(ManagerError::Status {
                action: action.to_string(),
                expected: expected.to_string(),
                status: self.status.clone(),
                message: self.message().map(str::to_string),
            })
        }
    }
}

/// A response, a run of events, and the closing `<Action>Complete` event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enumeration {
    /// Initiating response
    pub response: Response,
    /// Events between response and completion
    pub events: Vec<ResultSet>,
    /// Closing `<Action>Complete` event
    pub complete: ResultSet,
}

impl Enumeration {
    /// Parse the reply to an enumerating action
    pub fn parse(action: &str, text: &str) -> Result<Self, ManagerError> {
        let mut sets = text
            .split(SET_END)
            .map(|chunk| chunk.trim_start_matches(LINE_END))
            .filter(|chunk| !chunk.is_empty())
            .map(ResultSet::parse)
            .collect::<Result<Vec<_>, _>>()?;

        if sets.is_empty() {
            return Err(ManagerError::MissingResponse {
                action: action.to_string(),
            });
        }
        let response = Response::from_result_set(action, sets.remove(0))?.expect(action, "Success")?;

        let expected = format!("{action}Complete");
        let complete = match sets.pop() {
            Some(set) if set.event().is_some_and(|event| event.eq_ignore_ascii_case(&expected)) => set,
            _ => {
                return Err(ManagerError::MissingComplete {
                    action: action.to_string(),
                    expected,
                })
            }
        };

        if sets.iter().any(|set| set.event().is_none()) {
            return Err(ManagerError::MissingEvent {
                action: action.to_string(),
            });
        }

        Ok(Self {
            response,
            events: sets,
            complete,
        })
    }

    /// Encode as wire text
    pub fn to_wire(&self) -> String {
        let mut text = self.response.fields().to_wire();
        for event in &self.events {
            text.push_str(&event.to_wire());
        }
        text.push_str(&self.complete.to_wire());
        text
    }
}
