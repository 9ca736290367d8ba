//! The declarative endpoint record.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Load-balancing policy of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Balance {
    /// Round robin.
    Rr,
    /// Smooth weighted round robin.
    Wrr,
    /// Weighted least connections.
    Wlc,
    /// Least connections.
    Lc,
    /// Shortest expected delay.
    Sed,
    /// Never queue.
    Nq,
    /// Hash ring keyed by client.
    ConsistentHash,
}

impl Balance {
    pub const ALL: [Balance; 7] = [
        Balance::Rr,
        Balance::Wrr,
        Balance::Wlc,
        Balance::Lc,
        Balance::Sed,
        Balance::Nq,
        Balance::ConsistentHash,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Balance::Rr => "rr",
            Balance::Wrr => "wrr",
            Balance::Wlc => "wlc",
            Balance::Lc => "lc",
            Balance::Sed => "sed",
            Balance::Nq => "nq",
            Balance::ConsistentHash => "consistent_hash",
        }
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Balance {
    type Err = Error;

    /// Case-insensitive; `-` and `_` are interchangeable in `consistent_hash`.
    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "rr" => Ok(Balance::Rr),
            "wrr" => Ok(Balance::Wrr),
            "wlc" => Ok(Balance::Wlc),
            "lc" => Ok(Balance::Lc),
            "sed" => Ok(Balance::Sed),
            "nq" => Ok(Balance::Nq),
            "consistent_hash" | "consistenthash" | "ch" => Ok(Balance::ConsistentHash),
            _ => Err(Error::validation(
                "balance.parse",
                format!("unsupported balance type {s:?}"),
            )),
        }
    }
}

/// One backend address of an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointAddr {
    pub addr: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

impl EndpointAddr {
    pub fn new(addr: impl Into<String>, weight: u32) -> Self {
        Self {
            addr: addr.into(),
            weight,
        }
    }
}

/// A named, routable backend definition as persisted in the store.
///
/// `balance` is kept as written so that a record carrying a policy this
/// build does not know can still be decoded; it is resolved to a
/// [`Balance`] when the load balancer is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub key: String,
    pub name: String,
    pub service_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub balance: String,
    pub endpoints: Vec<EndpointAddr>,
    #[serde(with = "base64_bytes")]
    pub descriptor_set: Vec<u8>,
}

/// Fields that may never be changed by a patch.
pub const IMMUTABLE_FIELDS: [&str; 4] = ["key", "created_at", "updated_at", "version"];

impl Endpoint {
    /// Resolve the stored balance policy.
    pub fn balance(&self) -> Result<Balance> {
        self.balance.parse()
    }

    /// Check record invariants.
    pub fn validate(&self) -> Result<()> {
        const OP: &str = "endpoint.validate";
        validate_key(&self.key).map_err(|e| e.within(OP))?;
        if self.name.trim().is_empty() {
            return Err(Error::validation(OP, "name must not be empty"));
        }
        self.balance().map_err(|e| e.within(OP))?;
        if self.endpoints.is_empty() {
            return Err(Error::validation(OP, "endpoints must not be empty"));
        }
        if let Some(bad) = self.endpoints.iter().find(|e| e.addr.trim().is_empty()) {
            return Err(Error::validation(
                OP,
                format!("endpoint address must not be empty (weight {})", bad.weight),
            ));
        }
        if let Some(bad) = self
            .tags
            .iter()
            .find(|t| t.is_empty() || t.contains('/'))
        {
            return Err(Error::validation(OP, format!("invalid tag {bad:?}")));
        }
        if self.descriptor_set.is_empty() {
            return Err(Error::validation(OP, "descriptor_set must not be empty"));
        }
        Ok(())
    }

    /// Advance `version` and `updated_at` after a mutation.
    pub fn touch(&mut self) {
        let now = Utc::now();
        self.version = next_version(&self.version, now);
        self.updated_at = now;
    }
}

/// A key is a non-empty path segment.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || key.contains('/') || key.trim() != key {
        return Err(Error::validation(
            "endpoint.validate_key",
            format!("malformed key {key:?}"),
        ));
    }
    Ok(())
}

/// Millisecond timestamp, forced strictly above the previous version.
pub fn next_version(previous: &str, now: DateTime<Utc>) -> String {
    let now_ms = now.timestamp_millis();
    match previous.parse::<i64>() {
        Ok(prev) if prev >= now_ms => (prev + 1).to_string(),
        _ => now_ms.to_string(),
    }
}

/// Creation request: everything the caller chooses. Identity, version and
/// timestamps are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEndpoint {
    pub name: String,
    pub service_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub balance: String,
    pub endpoints: Vec<EndpointAddr>,
    #[serde(with = "base64_bytes")]
    pub descriptor_set: Vec<u8>,
}

impl NewEndpoint {
    pub fn into_endpoint(self, key: String, now: DateTime<Utc>) -> Endpoint {
        Endpoint {
            key,
            name: self.name,
            service_name: self.service_name,
            description: self.description,
            tags: self.tags,
            version: next_version("", now),
            created_at: now,
            updated_at: now,
            balance: self.balance,
            endpoints: self.endpoints,
            descriptor_set: self.descriptor_set,
        }
    }
}

/// Standard base64 for byte fields in JSON.
pub mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
