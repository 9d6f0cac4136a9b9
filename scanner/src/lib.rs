//! # Checkin Scanner
//!
//! Line-oriented front end for one check-in station.
//!
//! Each input line is either a command or a code read by a barcode scanner.
//! Scanners send the code followed by a newline, so any line that is not a
//! known command is treated as a scan.

use checkin_guests::{GuestRecord, ScanResult, ScanStatus};
use thiserror::Error;

pub mod config;

pub use config::ScannerConfig;

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Check in the guest behind a code
    Scan(String),
    /// Register a walk-in guest
    Register {
        /// Given name
        first_name: String,
        /// Family name
        last_name: String,
        /// Contact email
        email: String,
    },
    /// Print the guest list
    List,
    /// Reload the guest list from the backend
    Refresh,
    /// Print connectivity and unsynced work
    Status,
    /// Dismiss the last scan result
    Clear,
    /// Print the command summary
    Help,
    /// Stop the station
    Quit,
}

/// Input the station could not interpret.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// `scan` without a code
    #[error("usage: scan <code>")]
    ScanUsage,

    /// `register` with the wrong number of fields
    #[error("usage: register <first> <last> <email>")]
    RegisterUsage,
}

/// Command summary printed by `help`.
pub const HELP: &str = "\
commands:
  <code>                          check in (same as scan <code>)
  scan <code>                     check in by full id or short code
  register <first> <last> <email> register a walk-in guest
  list                            show the guest list
  refresh                         reload the guest list
  status                          show connectivity and unsynced work
  clear                           dismiss the last scan result
  quit                            stop the station";

impl Command {
    /// Parse one input line. Blank lines yield `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`] when a keyword is followed by the wrong
    /// arguments.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Ok(None);
        };
        let rest: Vec<&str> = words.collect();

        let command = match (head.to_ascii_lowercase().as_str(), rest.as_slice()) {
            ("scan", [code]) => Self::Scan((*code).to_string()),
            ("scan", _) => return Err(CommandError::ScanUsage),
            ("register", [first, last, email]) => Self::Register {
                first_name: (*first).to_string(),
                last_name: (*last).to_string(),
                email: (*email).to_string(),
            },
            ("register", _) => return Err(CommandError::RegisterUsage),
            ("list", []) => Self::List,
            ("refresh", []) => Self::Refresh,
            ("status", []) => Self::Status,
            ("clear", []) => Self::Clear,
            ("help" | "?", []) => Self::Help,
            ("quit" | "exit", []) => Self::Quit,
            _ => Self::Scan(line.trim().to_string()),
        };

        Ok(Some(command))
    }
}

/// One-line rendering of a scan outcome.
#[must_use]
pub fn render_scan(result: &ScanResult) -> String {
    let tag = match result.status {
        ScanStatus::Success => "OK  ",
        ScanStatus::Warning => "WARN",
        ScanStatus::Error => "ERR ",
    };
    let mut line = format!("[{tag}] {}", result.message);
    if let Some(name) = &result.full_name {
        line.push_str(": ");
        line.push_str(name);
    }
    if result.local_only {
        line.push_str(" (local only)");
    }
    line
}

/// One row of the guest list.
#[must_use]
pub fn render_guest(guest: &GuestRecord) -> String {
    let status = guest
        .scanned_at
        .filter(|_| guest.scanned)
        .map_or_else(|| "-".to_string(), |at| at.format("%H:%M:%S").to_string());
    format!(
        "{:<8}  {:<28}  {:<32}  {}",
        guest.id.short_code(),
        guest.full_name(),
        guest.email,
        status
    )
}
