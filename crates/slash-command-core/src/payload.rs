//! Form decoding and the normalized command payload.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormError {
    #[error("form field '{0}' is not valid utf-8")]
    InvalidUtf8(String),
    #[error("form field '{0}' has a malformed percent escape")]
    InvalidEscape(String),
}

/// Multi-valued `application/x-www-form-urlencoded` fields, in wire order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormFields {
    pairs: Vec<(String, String)>,
}

impl FormFields {
    pub fn parse(body: &[u8]) -> Result<Self, FormError> {
        let mut pairs = Vec::new();
        for segment in body.split(|&b| b == b'&') {
            if segment.is_empty() {
                continue;
            }
            let (raw_key, raw_value) = match segment.iter().position(|&b| b == b'=') {
                Some(idx) => (&segment[..idx], &segment[idx + 1..]),
                None => (segment, &b""[..]),
            };
            let key = decode_component(raw_key, &String::from_utf8_lossy(raw_key))?;
            let value = decode_component(raw_value, &key)?;
            pairs.push((key, value));
        }
        Ok(Self { pairs })
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            pairs: pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    /// Last value submitted for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .rev()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.pairs.iter().any(|(name, _)| name == key)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

fn decode_component(raw: &[u8], field: &str) -> Result<String, FormError> {
    if !escapes_well_formed(raw) {
        return Err(FormError::InvalidEscape(field.to_string()));
    }
    let spaced: Vec<u8> = raw
        .iter()
        .map(|&b| if b == b'+' { b' ' } else { b })
        .collect();
    String::from_utf8(urlencoding::decode_binary(&spaced).into_owned())
        .map_err(|_| FormError::InvalidUtf8(field.to_string()))
}

/// Every `%` must be followed by two hex digits.
fn escapes_well_formed(raw: &[u8]) -> bool {
    let mut idx = 0;
    while idx < raw.len() {
        if raw[idx] != b'%' {
            idx += 1;
            continue;
        }
        match raw.get(idx + 1..idx + 3) {
            Some(digits) if digits.iter().all(u8::is_ascii_hexdigit) => idx += 3,
            _ => return false,
        }
    }
    true
}

/// A slash-command invocation as published downstream.
///
/// `token` is the platform's legacy verification token and is never
/// serialized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InboundPayload {
    pub channel_id: String,
    pub channel_name: String,
    pub command: String,
    pub response_url: String,
    pub team_domain: String,
    pub team_id: String,
    pub text: String,
    #[serde(skip)]
    pub token: String,
    pub trigger_id: String,
    pub user_id: String,
    pub user_name: String,
    pub parsed_command: String,
    #[serde(rename = "_trace", skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

/// Builds a payload from form fields. Repeated keys resolve to their last
/// value; missing keys become empty strings.
pub fn normalize(fields: &FormFields) -> InboundPayload {
    let field = |key: &str| fields.get(key).unwrap_or_default().to_string();
    let command = field("command");
    InboundPayload {
        channel_id: field("channel_id"),
        channel_name: field("channel_name"),
        parsed_command: strip_separators(&command),
        command,
        response_url: field("response_url"),
        team_domain: field("team_domain"),
        team_id: field("team_id"),
        text: field("text"),
        token: field("token"),
        trigger_id: field("trigger_id"),
        user_id: field("user_id"),
        user_name: field("user_name"),
        trace: None,
    }
}

/// Removes every `/` from a command string.
pub fn strip_separators(command: &str) -> String {
    command.replace('/', "")
}

impl InboundPayload {
    pub fn routing_key(&self) -> RoutingKey {
        RoutingKey::new(&self.team_domain, &self.parsed_command)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// True when the last whitespace-separated word of `text` is `trace`.
    pub fn requests_trace(&self) -> bool {
        self.text
            .split_whitespace()
            .last()
            .is_some_and(|word| word.eq_ignore_ascii_case("trace"))
    }
}

/// Publish destination for a (team, command) pair: `<team_domain>-<parsed_command>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoutingKey(String);

impl RoutingKey {
    pub fn new(team_domain: &str, parsed_command: &str) -> Self {
        Self(format!("{team_domain}-{parsed_command}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RoutingKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
