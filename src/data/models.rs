//! Data models
//!
//! Rust structs representing database entities.
//! All models use ULID for IDs and chrono for timestamps.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// ID Types
// =============================================================================

/// Entity ID wrapper (ULID format, 26 characters)
///
/// IDs sort lexicographically in creation order, and the creation
/// time can be recovered from the ID itself.
///
/// Example: "01ARZ3NDEKTSV4RRFFQ69G5FAV"
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new ULID
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    /// Generate a ULID whose timestamp component is `at`
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(ulid::Ulid::from_datetime(at.into()).to_string())
    }

    /// Create from existing string
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    /// Timestamp encoded in the ID (millisecond precision)
    ///
    /// Returns `None` if the wrapped string is not a valid ULID.
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        let ulid = ulid::Ulid::from_string(&self.0).ok()?;
        let millis = i64::try_from(ulid.timestamp_ms()).ok()?;
        Utc.timestamp_millis_opt(millis).single()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Account
// =============================================================================

/// A federation actor known to this instance
///
/// Created on first contact and never deleted. `uri` is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    pub id: String,
    /// ActivityPub actor URI (globally unique)
    pub uri: String,
    /// preferredUsername, empty when the actor does not advertise one
    pub username: String,
    /// Host part of `uri`
    pub domain: String,
    pub display_name: Option<String>,
    /// RSA public key (PEM, SubjectPublicKeyInfo)
    pub public_key_pem: String,
    pub inbox: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Display name, falling back to the username
    pub fn name(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.username)
    }
}

// =============================================================================
// Activity
// =============================================================================

/// A received federation activity
///
/// The payload is stored verbatim; `activity_type` and `object_type`
/// are derived once at ingestion time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Activity {
    pub id: String,
    /// Account.id of the acting actor
    pub account_id: String,
    /// Full JSON document as received
    pub activity: String,
    /// Top-level `type`, empty if absent
    pub activity_type: String,
    /// `object.type` when `object` is a document, else empty
    pub object_type: String,
    pub created_at: DateTime<Utc>,
}

impl Activity {
    /// Build a new activity row for `account_id` from a parsed document.
    pub fn new(
        account_id: &str,
        document: &serde_json::Map<String, serde_json::Value>,
        activity_type: String,
        object_type: String,
    ) -> Result<Self, serde_json::Error> {
        let now = Utc::now();
        Ok(Self {
            id: EntityId::from_datetime(now).0,
            account_id: account_id.to_string(),
            activity: serde_json::to_string(document)?,
            activity_type,
            object_type,
            created_at: now,
        })
    }

    /// Decode the stored payload
    pub fn payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&self.activity)
    }
}
