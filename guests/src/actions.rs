//! Actions for the guest reducer.
//!
//! Commands arrive from callers and the change listener. Events are produced
//! by effects and fed back. The `*Completed` events are terminal: they are
//! emitted after state has been updated, so a caller waiting on one observes
//! the new state.

use crate::error::{BackendError, GuestError};
use crate::types::{GuestChange, GuestRecord, ScanResult, SnapshotSource};

/// Correlates a scan with its terminal [`GuestAction::ScanCompleted`].
pub type ScanId = u64;

/// Correlates a registration with its terminal [`GuestAction::RegistrationCompleted`].
pub type RequestId = u64;

/// All inputs to [`GuestReducer`](crate::reducer::GuestReducer).
#[derive(Clone, Debug)]
pub enum GuestAction {
    // Commands
    /// Replace the collection from the backend, or from the snapshot
    FetchGuests {
        /// Correlation id
        request_id: RequestId,
    },

    /// Register a new guest
    RegisterGuest {
        /// Correlation id
        request_id: RequestId,
        /// Raw given name
        first_name: String,
        /// Raw family name
        last_name: String,
        /// Raw email
        email: String,
    },

    /// A code was scanned
    CheckIn {
        /// Correlation id
        scan_id: ScanId,
        /// Raw scanned code
        code: String,
    },

    /// A change arrived from the remote feed
    ApplyRemoteChange {
        /// The change to fold
        change: GuestChange,
    },

    /// Forget the last scan outcome
    ClearScanResult,

    // Events
    /// A collection was loaded
    GuestsLoaded {
        /// Correlation id
        request_id: RequestId,
        /// Loaded guests
        guests: Vec<GuestRecord>,
        /// Where they came from
        source: SnapshotSource,
        /// Why the backend was not used, if it failed
        error: Option<GuestError>,
    },

    /// The collection replacement finished
    FetchCompleted {
        /// Correlation id
        request_id: RequestId,
        /// Where the collection came from
        source: SnapshotSource,
        /// Why the station is degraded, if it is
        degraded_reason: Option<String>,
    },

    /// A guest record was created
    GuestRegistered {
        /// Correlation id
        request_id: RequestId,
        /// The stored record
        guest: GuestRecord,
        /// Created without a backend
        local_only: bool,
    },

    /// Registration was refused
    RegistrationFailed {
        /// Correlation id
        request_id: RequestId,
        /// Why
        error: GuestError,
    },

    /// Registration finished
    RegistrationCompleted {
        /// Correlation id
        request_id: RequestId,
        /// The stored record or the failure
        outcome: Result<GuestRecord, GuestError>,
    },

    /// The backend answered a lookup for a code unknown locally
    RemoteLookupCompleted {
        /// Correlation id
        scan_id: ScanId,
        /// Normalized code
        code: String,
        /// Lookup result
        outcome: Result<Option<GuestRecord>, BackendError>,
    },

    /// The conditional check-in write succeeded
    CheckInConfirmed {
        /// Correlation id
        scan_id: ScanId,
        /// The stored record
        guest: GuestRecord,
    },

    /// The conditional check-in write failed
    CheckInRejected {
        /// Correlation id
        scan_id: ScanId,
        /// Targeted guest, as it was when the write started
        guest: GuestRecord,
        /// Why
        error: BackendError,
    },

    /// A scan finished
    ScanCompleted {
        /// Correlation id
        scan_id: ScanId,
        /// Outcome shown to the operator
        result: ScanResult,
    },
}

impl GuestAction {
    /// The scan this action terminates, if any.
    #[must_use]
    pub const fn completed_scan(&self) -> Option<ScanId> {
        match self {
            Self::ScanCompleted { scan_id, .. } => Some(*scan_id),
            _ => None,
        }
    }

    /// The fetch this action terminates, if any.
    #[must_use]
    pub const fn completed_fetch(&self) -> Option<RequestId> {
        match self {
            Self::FetchCompleted { request_id, .. } => Some(*request_id),
            _ => None,
        }
    }

    /// The registration this action terminates, if any.
    #[must_use]
    pub const fn completed_registration(&self) -> Option<RequestId> {
        match self {
            Self::RegistrationCompleted { request_id, .. } => Some(*request_id),
            _ => None,
        }
    }
}
