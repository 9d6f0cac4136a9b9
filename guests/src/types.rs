//! Domain types for guest check-in.

use crate::error::GuestError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of leading id characters accepted as an abbreviated scan code.
///
/// Tied to UUID-shaped identifiers: the first group of a v4 UUID. A different
/// identifier scheme needs this length re-derived.
pub const SHORT_CODE_LEN: usize = 8;

/// Opaque guest identifier, assigned at registration.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GuestId(String);

impl GuestId {
    /// Wrap an identifier string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The abbreviated form printed on badges: the first
    /// [`SHORT_CODE_LEN`] characters.
    #[must_use]
    pub fn short_code(&self) -> &str {
        match self.0.char_indices().nth(SHORT_CODE_LEN) {
            Some((end, _)) => &self.0[..end],
            None => &self.0,
        }
    }

    /// Whether `code` is exactly this guest's short code.
    ///
    /// Shorter prefixes never count, so a partial code cannot check anyone in.
    #[must_use]
    pub fn has_short_code(&self, code: &str) -> bool {
        code.chars().count() == SHORT_CODE_LEN && self.short_code() == code
    }
}

impl fmt::Display for GuestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for GuestId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for GuestId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A registered attendee.
///
/// `scanned` is true exactly when `scanned_at` is set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestRecord {
    /// Unique identifier
    pub id: GuestId,
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Contact email, unique per event
    pub email: String,
    /// Whether the guest has been checked in
    pub scanned: bool,
    /// When the guest registered
    pub registered_at: DateTime<Utc>,
    /// When the guest was checked in
    pub scanned_at: Option<DateTime<Utc>>,
}

impl GuestRecord {
    /// Build an unscanned record from validated registration input.
    #[must_use]
    pub fn register(id: GuestId, guest: NewGuest, registered_at: DateTime<Utc>) -> Self {
        Self {
            id,
            first_name: guest.first_name,
            last_name: guest.last_name,
            email: guest.email,
            scanned: false,
            registered_at,
            scanned_at: None,
        }
    }

    /// "First Last", as shown on the scan result.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Mark the record checked in at `at`.
    pub fn check_in(&mut self, at: DateTime<Utc>) {
        self.scanned = true;
        self.scanned_at = Some(at);
    }
}

/// Registration input, trimmed and validated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGuest {
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Contact email
    pub email: String,
}

impl NewGuest {
    /// Validate raw registration input.
    ///
    /// # Errors
    ///
    /// Returns [`GuestError::Validation`] when a name is blank or the email
    /// is not of the form `local@domain`.
    pub fn parse(first_name: &str, last_name: &str, email: &str) -> Result<Self, GuestError> {
        let first_name = first_name.trim();
        let last_name = last_name.trim();
        let email = email.trim();

        if first_name.is_empty() {
            return Err(GuestError::Validation("first name is required".to_string()));
        }
        if last_name.is_empty() {
            return Err(GuestError::Validation("last name is required".to_string()));
        }

        let mut parts = email.split('@');
        let well_formed = matches!(
            (parts.next(), parts.next(), parts.next()),
            (Some(local), Some(domain), None) if !local.is_empty() && !domain.is_empty()
        );
        if !well_formed {
            return Err(GuestError::Validation(format!("invalid email address: {email}")));
        }

        Ok(Self {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: email.to_string(),
        })
    }
}

/// Scan outcome severity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    /// Guest checked in
    Success,
    /// Known guest, nothing changed
    Warning,
    /// Unknown code or failed write
    Error,
}

impl ScanStatus {
    /// Lowercase tag, as used in logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one scan attempt. Never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    /// Whether the guest was checked in by this scan
    pub success: bool,
    /// Severity tag
    pub status: ScanStatus,
    /// Short human-readable outcome
    pub message: String,
    /// Present when a guest was identified
    pub full_name: Option<String>,
    /// Set when the check-in was applied without a backend and is not durable remotely
    #[serde(default)]
    pub local_only: bool,
}

impl ScanResult {
    /// The guest has just been checked in.
    #[must_use]
    pub fn confirmed(full_name: String, local_only: bool) -> Self {
        Self {
            success: true,
            status: ScanStatus::Success,
            message: "entry confirmed".to_string(),
            full_name: Some(full_name),
            local_only,
        }
    }

    /// The guest had been checked in before.
    #[must_use]
    pub fn already_scanned(full_name: String) -> Self {
        Self::warning(full_name, GuestError::AlreadyCheckedIn.to_string())
    }

    /// A write for this guest is still in flight on this station.
    #[must_use]
    pub fn in_progress(full_name: String) -> Self {
        Self::warning(full_name, "check-in already in progress".to_string())
    }

    /// The code matched nobody.
    #[must_use]
    pub fn not_found() -> Self {
        Self::error(GuestError::NotFound.to_string())
    }

    /// The outcome is unknown; the operator should scan again.
    #[must_use]
    pub fn retry() -> Self {
        Self::error("validation error, retry".to_string())
    }

    fn warning(full_name: String, message: String) -> Self {
        Self {
            success: false,
            status: ScanStatus::Warning,
            message,
            full_name: Some(full_name),
            local_only: false,
        }
    }

    fn error(message: String) -> Self {
        Self {
            success: false,
            status: ScanStatus::Error,
            message,
            full_name: None,
            local_only: false,
        }
    }
}

/// A mutation observed on the remote collection.
///
/// Serialized as `{"type": "insert", "record": {...}}`. Deletes carry the
/// removed record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "record", rename_all = "lowercase")]
pub enum GuestChange {
    /// A guest was registered
    Insert(GuestRecord),
    /// A guest was modified
    Update(GuestRecord),
    /// A guest was removed
    Delete(GuestRecord),
}

impl GuestChange {
    /// The record the change carries.
    #[must_use]
    pub const fn record(&self) -> &GuestRecord {
        match self {
            Self::Insert(record) | Self::Update(record) | Self::Delete(record) => record,
        }
    }

    /// Lowercase change kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Insert(_) => "insert",
            Self::Update(_) => "update",
            Self::Delete(_) => "delete",
        }
    }
}

/// Where a loaded collection came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotSource {
    /// Fresh from the backend
    Remote,
    /// The local snapshot
    Cache,
}
