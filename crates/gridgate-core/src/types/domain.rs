use hickory_proto::rr::Name;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{GatewayError, Result};

const MAX_LABEL_LEN: usize = 63;

/// A validated, lowercase, multi-label domain name without trailing dot.
///
/// Store keys use the dot-terminated form returned by [`DomainName::fqdn`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DomainName(String);

impl DomainName {
    /// Parse and canonicalize a domain name.
    ///
    /// Rejects empty names, single-label names, leading or trailing dots,
    /// empty labels and characters outside `[a-z0-9-_]`.
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = |reason: &str| {
            GatewayError::validation(format!("incorrect format for domain '{input}': {reason}"))
        };

        if input.is_empty() {
            return Err(invalid("empty name"));
        }
        if input.starts_with('.') || input.ends_with('.') {
            return Err(invalid("leading or trailing dot"));
        }
        if input.split('.').any(str::is_empty) {
            return Err(invalid("empty label"));
        }
        if !input.contains('.') {
            return Err(invalid("at least two labels required"));
        }
        if let Some(c) = input
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_' || *c == '.'))
        {
            return Err(invalid(&format!("illegal character {c:?}")));
        }

        if input.split('.').any(|label| label.len() > MAX_LABEL_LEN) {
            return Err(invalid("label longer than 63 bytes"));
        }
        Name::from_ascii(input).map_err(|e| invalid(&e.to_string()))?;

        Ok(Self(input.to_ascii_lowercase()))
    }

    /// The name without trailing dot
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The dot-terminated fully-qualified form
    #[must_use]
    pub fn fqdn(&self) -> String {
        format!("{}.", self.0)
    }

    /// Number of labels in the name
    #[must_use]
    pub fn label_count(&self) -> usize {
        self.0.split('.').count()
    }

    /// Split into `(label, zone)` on the first dot.
    ///
    /// A name with fewer than three labels has no addressable label: the label
    /// is empty and the whole name is the zone.
    #[must_use]
    pub fn split_label(&self) -> (String, Self) {
        if self.label_count() < 3 {
            return (String::new(), self.clone());
        }
        match self.0.split_once('.') {
            Some((label, zone)) => (label.to_string(), Self(zone.to_string())),
            None => (String::new(), self.clone()),
        }
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for DomainName {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DomainName {
    type Error = GatewayError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<DomainName> for String {
    fn from(name: DomainName) -> Self {
        name.0
    }
}
