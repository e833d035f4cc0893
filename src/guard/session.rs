//! Session identity carried in the session cookie.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Staff,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => f.write_str("admin"),
            Role::Staff => f.write_str("staff"),
        }
    }
}

/// Identity derived once at login and carried unchanged until logout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub role: Role,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub staff_id: Option<String>,
}

impl Session {
    pub fn new(role: Role, name: impl Into<String>, staff_id: Option<String>) -> Self {
        Self {
            role,
            name: name.into(),
            staff_id,
        }
    }

    /// Parses a cookie value. Both URL-encoded and raw JSON are accepted;
    /// anything else yields `None`.
    pub fn from_cookie_value(raw: &str) -> Option<Self> {
        let decoded = urlencoding::decode(raw).ok()?;
        match serde_json::from_str::<Session>(&decoded) {
            Ok(session) => Some(session),
            Err(err) => {
                debug!(error = %err, "Ignoring malformed session cookie");
                None
            }
        }
    }

    /// Encodes the session for storage in a cookie.
    pub fn to_cookie_value(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        urlencoding::encode(&json).into_owned()
    }
}

// Staff ids arrive as strings or numbers depending on the writer.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
