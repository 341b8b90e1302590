use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Everything needed to talk to one PowerDNS server: where it lives, how to
/// authenticate, and how much patience to have with it. Constructed once
/// from [`crate::config::Config`] and lives for the process.
#[derive(Debug, Clone)]
pub struct ConnectionDescriptor {
    pub base_url: String,
    pub api_key: String,
    pub server_id: String,
    pub insecure: bool,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl ConnectionDescriptor {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        ConnectionDescriptor {
            base_url: base_url.into(),
            api_key: api_key.into(),
            server_id: "localhost".to_string(),
            insecure: false,
            timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

/// Bounded exponential backoff with jitter.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub retries: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            retries: 3,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            jitter: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `k` (1-indexed, k >= 2): min(max, base * 2^(k-1)).
    /// Jitter is added separately by the caller so it stays testable without RNG.
    pub fn backoff_before(&self, attempt: u32) -> Duration {
        debug_assert!(attempt >= 2);
        let exp = attempt - 1;
        let scaled = self
            .base_backoff
            .checked_mul(1u32.checked_shl(exp - 1).unwrap_or(u32::MAX))
            .unwrap_or(self.max_backoff);
        std::cmp::min(scaled, self.max_backoff)
    }
}

/// A fully qualified zone name. Construction normalizes a caller-supplied
/// name by appending a trailing dot if missing; equality/ordering/hashing
/// compare the lower-cased ASCII form, while `Display`/`as_str` preserve
/// the form the caller or server actually used.
#[derive(Debug, Clone)]
pub struct ZoneName(String);

impl ZoneName {
    pub fn new(name: impl AsRef<str>) -> Self {
        let mut name = name.as_ref().to_string();
        if !name.ends_with('.') {
            name.push('.');
        }
        ZoneName(name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn cmp_key(&self) -> String {
        self.0.to_ascii_lowercase()
    }
}

impl std::fmt::Display for ZoneName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq for ZoneName {
    fn eq(&self, other: &Self) -> bool {
        self.cmp_key() == other.cmp_key()
    }
}
impl Eq for ZoneName {}

impl std::hash::Hash for ZoneName {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.cmp_key().hash(state)
    }
}

impl PartialOrd for ZoneName {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for ZoneName {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.cmp_key().cmp(&other.cmp_key())
    }
}

impl From<&str> for ZoneName {
    fn from(s: &str) -> Self {
        ZoneName::new(s)
    }
}
impl From<String> for ZoneName {
    fn from(s: String) -> Self {
        ZoneName::new(s)
    }
}

/// Zone kind as reported/accepted by the PowerDNS API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum ZoneKind {
    Native,
    Master,
    Slave,
}

/// A single record within an RRSet.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde_with::skip_serializing_none]
pub struct Record {
    pub content: String,
    #[serde(default)]
    pub disabled: bool,
}

impl Record {
    pub fn new(content: impl Into<String>, disabled: bool) -> Self {
        Record {
            content: content.into(),
            disabled,
        }
    }
}

/// A comment attached to an RRSet. `modified_at` is treated as read-only
/// and ignored in equality per the Open Question in the spec: some
/// PowerDNS versions stamp it server-side and it is not a meaningful axis
/// of drift between source and target.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde_with::skip_serializing_none]
pub struct Comment {
    pub content: String,
    #[serde(default)]
    pub account: String,
    pub modified_at: Option<u32>,
}

impl PartialEq for Comment {
    fn eq(&self, other: &Self) -> bool {
        self.content == other.content && self.account == other.account
    }
}

/// A set of records sharing an owner name and a record type.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde_with::skip_serializing_none]
pub struct RRSet {
    pub name: String,
    #[serde(rename = "type")]
    pub rrset_type: String,
    pub ttl: u32,
    #[serde(default)]
    pub records: Vec<Record>,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

impl RRSet {
    /// The key that makes an RRSet unique within a zone.
    pub fn key(&self) -> (String, String) {
        (self.name.to_ascii_lowercase(), self.rrset_type.clone())
    }
}

/// A full zone document as returned by (or submitted to) the PowerDNS API.
/// Read-only fields are kept as `Option` so the raw server document still
/// deserializes; the sanitizer is what drops them.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde_with::skip_serializing_none]
pub struct Zone {
    pub id: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub type_field: Option<String>,
    pub url: Option<String>,
    pub kind: Option<ZoneKind>,
    #[serde(default)]
    pub rrsets: Vec<RRSet>,
    pub serial: Option<u32>,
    pub notified_serial: Option<u32>,
    pub edited_serial: Option<u32>,
    pub masters: Option<Vec<String>>,
    pub dnssec: Option<bool>,
    pub nsec3param: Option<String>,
    pub nsec3narrow: Option<bool>,
    pub presigned: Option<bool>,
    pub soa_edit: Option<String>,
    pub soa_edit_api: Option<String>,
    pub api_rectify: Option<bool>,
    pub zone: Option<String>,
    pub account: Option<String>,
    pub nameservers: Option<Vec<String>>,
    pub master_tsig_key_ids: Option<Vec<String>>,
    pub slave_tsig_key_ids: Option<Vec<String>>,
    pub last_check: Option<u32>,
}

/// Minimal payload for zone creation: PowerDNS accepts (and requires) only
/// a subset of `Zone`'s fields on `POST /zones`.
#[derive(Debug, Clone, Serialize)]
pub struct NewZone {
    pub name: String,
    pub kind: ZoneKind,
    pub rrsets: Vec<RRSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nameservers: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub masters: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
}

/// Payload for `PATCH /zones/{zone}`.
#[derive(Debug, Clone, Serialize)]
pub struct PatchZone {
    pub rrsets: Vec<Change>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeType {
    Replace,
    Delete,
}

/// One RRSet-level mutation to apply to the target. `Delete` carries only
/// the identifying `(name, type)`; `Replace` carries the full desired
/// state.
#[derive(Debug, Clone, Serialize)]
#[serde_with::skip_serializing_none]
pub struct Change {
    pub name: String,
    #[serde(rename = "type")]
    pub rrset_type: String,
    pub changetype: ChangeType,
    pub ttl: Option<u32>,
    pub records: Option<Vec<Record>>,
    pub comments: Option<Vec<Comment>>,
}

impl Change {
    pub fn replace(rrset: &RRSet) -> Self {
        Change {
            name: rrset.name.clone(),
            rrset_type: rrset.rrset_type.clone(),
            changetype: ChangeType::Replace,
            ttl: Some(rrset.ttl),
            records: Some(rrset.records.clone()),
            comments: Some(rrset.comments.clone()),
        }
    }

    pub fn delete(name: &str, rrset_type: &str) -> Self {
        Change {
            name: name.to_string(),
            rrset_type: rrset_type.to_string(),
            changetype: ChangeType::Delete,
            ttl: None,
            records: None,
            comments: None,
        }
    }
}

/// The action the migrator decided to take for one zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigratorAction {
    CreateZone,
    PatchZone,
    RecreateZone,
    Noop,
}

impl std::fmt::Display for MigratorAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MigratorAction::CreateZone => "CREATE_ZONE",
            MigratorAction::PatchZone => "PATCH_ZONE",
            MigratorAction::RecreateZone => "RECREATE_ZONE",
            MigratorAction::Noop => "NOOP",
        };
        f.write_str(s)
    }
}

/// The outcome of migrating a single zone.
#[derive(Debug, Clone)]
pub struct MigrationResult {
    pub source_zone: String,
    pub target_zone: String,
    pub changes: Vec<Change>,
    pub action: MigratorAction,
}
