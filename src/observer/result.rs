//! Structured outcome of a single role observation

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const EVENT_KEY: &str = "event";
pub const ORIGINAL_ROLE_KEY: &str = "originalRole";
pub const ROLE_KEY: &str = "role";
pub const MESSAGE_KEY: &str = "message";

/// Value of the `event` key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpsEvent {
    Success,
    Failed,
}

impl OpsEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Failed => "Failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Success" => Some(Self::Success),
            "Failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// String-to-string map describing one observation
///
/// Serializes as a flat JSON object with keys in sorted order, which is the
/// exact payload the watcher parses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpsResult(BTreeMap<String, String>);

impl OpsResult {
    /// Successful resolution: `originalRole` is the role held before this observation
    pub fn success(original_role: impl Into<String>, role: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(EVENT_KEY.to_string(), OpsEvent::Success.as_str().to_string());
        fields.insert(ORIGINAL_ROLE_KEY.to_string(), original_role.into());
        fields.insert(ROLE_KEY.to_string(), role.into());
        Self(fields)
    }

    /// Failed resolution carrying the literal error text
    pub fn failed(message: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(EVENT_KEY.to_string(), OpsEvent::Failed.as_str().to_string());
        fields.insert(MESSAGE_KEY.to_string(), message.into());
        Self(fields)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Parsed `event`, `None` if missing or unrecognized
    pub fn event(&self) -> Option<OpsEvent> {
        self.get(EVENT_KEY).and_then(OpsEvent::parse)
    }

    pub fn has_event(&self) -> bool {
        self.0.contains_key(EVENT_KEY)
    }

    pub fn role(&self) -> Option<&str> {
        self.get(ROLE_KEY)
    }

    pub fn original_role(&self) -> Option<&str> {
        self.get(ORIGINAL_ROLE_KEY)
    }

    pub fn message(&self) -> Option<&str> {
        self.get(MESSAGE_KEY)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl From<BTreeMap<String, String>> for OpsResult {
    fn from(fields: BTreeMap<String, String>) -> Self {
        Self(fields)
    }
}
