//! Request and response shapes of the native-messaging protocol.
//!
//! Requests arrive as loose JSON objects:
//!
//! ```json
//! {"command": "find", "url": "https://bank.example/login",
//!  "socket": "/tmp/gpg-XXXX/S.gpg-agent", "pid": 4242, "expires": 1700003600}
//! ```
//!
//! They are validated once, here, into a closed [`Command`] set. Anything
//! that does not fit becomes [`Command::Ignored`] and is answered with `{}`.

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::session::SessionHandle;
use crate::store::CredentialRecord;

/// A validated request.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub command: Command,
    /// Present only when the caller sent a complete handle.
    pub session: Option<SessionHandle>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Setup,
    Teardown,
    Running,
    Find { url: String },
    /// Unknown, missing or malformed command; answered with `{}`.
    Ignored { reason: String },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Setup => "setup",
            Command::Teardown => "teardown",
            Command::Running => "running",
            Command::Find { .. } => "find",
            Command::Ignored { .. } => "ignored",
        }
    }
}

/// Wire shape before validation. Every field is optional and untyped so
/// that a wrong type degrades to "absent" instead of failing the request.
#[derive(Debug, Default, Deserialize)]
struct RawRequest {
    #[serde(default)]
    command: Value,
    #[serde(default)]
    socket: Value,
    #[serde(default)]
    pid: Value,
    #[serde(default)]
    expires: Value,
    #[serde(default)]
    url: Value,
}

impl Request {
    /// Validate a decoded request payload.
    pub fn from_json(payload: Value) -> Self {
        if !payload.is_object() {
            return Self::ignored("request is not a JSON object");
        }
        let raw: RawRequest = match serde_json::from_value(payload) {
            Ok(raw) => raw,
            Err(e) => return Self::ignored(format!("unreadable request: {}", e)),
        };

        let session = SessionHandle::from_parts(
            raw.socket.as_str(),
            raw.pid.as_i64(),
            raw.expires.as_f64(),
        );

        let command = match raw.command.as_str() {
            Some("setup") => Command::Setup,
            Some("teardown") => Command::Teardown,
            Some("running") => Command::Running,
            Some("find") => match raw.url.as_str() {
                Some(url) => Command::Find {
                    url: url.to_string(),
                },
                None => Command::Ignored {
                    reason: "find without url".to_string(),
                },
            },
            Some(other) => Command::Ignored {
                reason: format!("unknown command {:?}", other),
            },
            None => Command::Ignored {
                reason: "missing command".to_string(),
            },
        };

        Self { command, session }
    }

    /// The request used when no frame could be read.
    pub fn ignored(reason: impl Into<String>) -> Self {
        Self {
            command: Command::Ignored {
                reason: reason.into(),
            },
            session: None,
        }
    }
}

/// A response, one variant per result shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// `{socket, pid, expires}` after `setup`.
    Session(SessionHandle),
    /// `{running: bool}`.
    Running(bool),
    /// The matched record as a flat object.
    Found(CredentialRecord),
    /// `{}`.
    Empty,
}

impl Response {
    pub fn into_json(self) -> Value {
        match self {
            Response::Session(handle) => serde_json::to_value(handle).unwrap_or_else(|_| json!({})),
            Response::Running(running) => json!({ "running": running }),
            Response::Found(record) => serde_json::to_value(record).unwrap_or_else(|_| json!({})),
            Response::Empty => Value::Object(Map::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn parses_each_command() {
        assert_eq!(Request::from_json(json!({"command": "setup"})).command, Command::Setup);
        assert_eq!(Request::from_json(json!({"command": "teardown"})).command, Command::Teardown);
        assert_eq!(Request::from_json(json!({"command": "running"})).command, Command::Running);
        assert_eq!(
            Request::from_json(json!({"command": "find", "url": "https://a.example/"})).command,
            Command::Find {
                url: "https://a.example/".to_string()
            }
        );
    }

    #[test]
    fn malformed_requests_are_ignored() {
        for payload in [
            json!({}),
            json!({"command": "explode"}),
            json!({"command": 7}),
            json!({"command": "find"}),
            json!({"command": "find", "url": 12}),
            json!([1, 2, 3]),
            json!("setup"),
            Value::Null,
        ] {
            let request = Request::from_json(payload.clone());
            assert!(
                matches!(request.command, Command::Ignored { .. }),
                "{payload} should be ignored"
            );
        }
    }

    #[test]
    fn session_fields_build_a_handle() {
        let request = Request::from_json(json!({
            "command": "running",
            "socket": "/tmp/gpg-x/S.gpg-agent",
            "pid": 4242,
            "expires": 1_700_003_600,
        }));
        let handle = request.session.expect("session");
        assert_eq!(handle.pid, 4242);
        assert_eq!(handle.expires, Utc.timestamp_opt(1_700_003_600, 0).unwrap());
    }

    #[test]
    fn partial_session_is_treated_as_absent() {
        let request = Request::from_json(json!({"command": "running", "socket": "/tmp/s", "pid": 1}));
        assert!(request.session.is_none());

        let request = Request::from_json(json!({
            "command": "running", "socket": "/tmp/s", "pid": "1", "expires": 5
        }));
        assert!(request.session.is_none());
    }

    #[test]
    fn response_shapes() {
        assert_eq!(Response::Empty.into_json(), json!({}));
        assert_eq!(Response::Running(false).into_json(), json!({"running": false}));

        let handle = SessionHandle::new("/tmp/s", 9, Utc.timestamp_opt(10, 0).unwrap());
        assert_eq!(
            Response::Session(handle).into_json(),
            json!({"socket": "/tmp/s", "pid": 9, "expires": 10})
        );
    }
}
