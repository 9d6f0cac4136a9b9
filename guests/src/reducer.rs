//! The check-in state machine.
//!
//! Per guest a scan moves through `NotFound`, `Unscanned` and `Scanned`. The
//! local record is only marked scanned once the backend confirms the
//! conditional write, so a failed write never leaves a false success behind.
//! Stations without a backend apply the transition locally and flag it.

use crate::actions::{GuestAction, RequestId, ScanId};
use crate::error::{BackendError, GuestError};
use crate::ports::{GuestBackend, SnapshotCache};
use crate::resolve::{is_lookup_candidate, normalize_code, resolve_local};
use crate::state::GuestState;
use crate::types::{GuestId, GuestRecord, NewGuest, ScanResult, SnapshotSource};
use checkin_core::{
    async_effect,
    effect::Effect,
    environment::{Clock, IdGenerator},
    reducer::Reducer,
    smallvec, SmallVec,
};
use std::fmt;
use std::sync::Arc;

type Effects = SmallVec<[Effect<GuestAction>; 4]>;

/// Dependencies of the guest reducer.
#[derive(Clone)]
pub struct GuestEnvironment {
    /// Time source for check-in and local registration timestamps
    pub clock: Arc<dyn Clock>,
    /// Identifier source for registrations made without a backend
    pub ids: Arc<dyn IdGenerator>,
    /// Remote authority; `None` makes the station local-only
    pub backend: Option<Arc<dyn GuestBackend>>,
    /// Durable snapshot
    pub cache: Arc<dyn SnapshotCache>,
}

impl GuestEnvironment {
    /// Environment for a local-only station.
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        cache: Arc<dyn SnapshotCache>,
    ) -> Self {
        Self {
            clock,
            ids,
            backend: None,
            cache,
        }
    }

    /// Attach a remote backend.
    #[must_use]
    pub fn with_backend(mut self, backend: Arc<dyn GuestBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Whether writes stay on this station.
    #[must_use]
    pub const fn is_local_only(&self) -> bool {
        self.backend.is_none()
    }
}

impl fmt::Debug for GuestEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuestEnvironment")
            .field("local_only", &self.is_local_only())
            .finish_non_exhaustive()
    }
}

/// Reducer for one station's guest collection.
#[derive(Clone, Copy, Debug, Default)]
pub struct GuestReducer;

impl GuestReducer {
    /// Create the reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Reducer for GuestReducer {
    type State = GuestState;
    type Action = GuestAction;
    type Environment = GuestEnvironment;

    fn reduce(
        &self,
        state: &mut GuestState,
        action: GuestAction,
        env: &GuestEnvironment,
    ) -> Effects {
        match action {
            // ========== Commands ==========
            GuestAction::FetchGuests { request_id } => smallvec![fetch_guests(request_id, env)],

            GuestAction::RegisterGuest {
                request_id,
                first_name,
                last_name,
                email,
            } => {
                let guest = match NewGuest::parse(&first_name, &last_name, &email) {
                    Ok(guest) => guest,
                    Err(error) => {
                        return smallvec![Effect::send(GuestAction::RegistrationFailed {
                            request_id,
                            error,
                        })];
                    },
                };

                if let Some(backend) = &env.backend {
                    let backend = Arc::clone(backend);
                    return smallvec![async_effect! {
                        Some(match backend.insert(guest).await {
                            Ok(guest) => GuestAction::GuestRegistered {
                                request_id,
                                guest,
                                local_only: false,
                            },
                            Err(error) => GuestAction::RegistrationFailed {
                                request_id,
                                error: error.into(),
                            },
                        })
                    }];
                }

                if state.guests.iter().any(|existing| existing.email == guest.email) {
                    let reason = format!("email already registered: {}", guest.email);
                    let error = GuestError::Validation(reason);
                    return smallvec![Effect::send(GuestAction::RegistrationFailed {
                        request_id,
                        error,
                    })];
                }

                let id = GuestId::new(env.ids.next_id());
                let record = GuestRecord::register(id, guest, env.clock.now());
                smallvec![Effect::send(GuestAction::GuestRegistered {
                    request_id,
                    guest: record,
                    local_only: true,
                })]
            },

            GuestAction::CheckIn { scan_id, code } => {
                let code = normalize_code(&code);

                if let Some(guest) = resolve_local(&state.guests, code) {
                    let guest = guest.clone();
                    return begin_check_in(state, scan_id, guest, env);
                }

                match &env.backend {
                    Some(backend) if is_lookup_candidate(code) => {
                        tracing::debug!(
                            scan_id,
                            code = %code,
                            "Code unknown locally, asking backend"
                        );
                        let backend = Arc::clone(backend);
                        let code = code.to_string();
                        smallvec![async_effect! {
                            let outcome = backend.find_by_id_or_prefix(code.clone()).await;
                            Some(GuestAction::RemoteLookupCompleted { scan_id, code, outcome })
                        }]
                    },
                    _ => finish_scan(state, scan_id, ScanResult::not_found(), None),
                }
            },

            GuestAction::ApplyRemoteChange { change } => {
                if !state.apply_change(&change) {
                    tracing::trace!(
                        kind = change.kind(),
                        guest_id = %change.record().id,
                        "Remote change already reflected"
                    );
                    return SmallVec::new();
                }

                tracing::debug!(
                    kind = change.kind(),
                    guest_id = %change.record().id,
                    "Folded remote change"
                );
                smallvec![save_snapshot(env, state.snapshot())]
            },

            GuestAction::ClearScanResult => {
                state.last_scan = None;
                SmallVec::new()
            },

            // ========== Events ==========
            GuestAction::GuestsLoaded {
                request_id,
                guests,
                source,
                error,
            } => {
                let save = match source {
                    SnapshotSource::Remote => {
                        let mut guests = guests;
                        guests.sort_by(|a, b| b.registered_at.cmp(&a.registered_at));
                        tracing::info!(count = guests.len(), "Loaded guests from backend");
                        state.guests = guests;
                        state.online = true;
                        state.last_error = None;
                        Some(save_snapshot(env, state.snapshot()))
                    },
                    SnapshotSource::Cache => {
                        if state.guests.is_empty() {
                            tracing::info!(count = guests.len(), "Loaded guests from snapshot");
                            state.guests = guests;
                        } else {
                            tracing::debug!("Keeping in-memory collection over snapshot");
                        }
                        if let Some(error) = &error {
                            state.online = false;
                            state.last_error = Some(error.to_string());
                        }
                        None
                    },
                };

                let done = Effect::send(GuestAction::FetchCompleted {
                    request_id,
                    source,
                    degraded_reason: error.map(|error| error.to_string()),
                });
                match save {
                    Some(save) => smallvec![Effect::Sequential(vec![save, done])],
                    None => smallvec![done],
                }
            },

            GuestAction::GuestRegistered {
                request_id,
                guest,
                local_only,
            } => {
                tracing::info!(guest_id = %guest.id, local_only, "Guest registered");
                state.upsert_front(guest.clone());
                if local_only {
                    state.unsynced_registrations.push(guest.id.clone());
                } else {
                    state.online = true;
                    state.last_error = None;
                }

                smallvec![Effect::Sequential(vec![
                    save_snapshot(env, state.snapshot()),
                    Effect::send(GuestAction::RegistrationCompleted {
                        request_id,
                        outcome: Ok(guest),
                    }),
                ])]
            },

            GuestAction::RegistrationFailed { request_id, error } => {
                tracing::warn!(request_id, error = %error, "Registration failed");
                if matches!(error, GuestError::BackendUnavailable(_)) {
                    state.online = false;
                }
                state.last_error = Some(error.to_string());
                smallvec![Effect::send(GuestAction::RegistrationCompleted {
                    request_id,
                    outcome: Err(error),
                })]
            },

            GuestAction::RemoteLookupCompleted { scan_id, code, outcome } => match outcome {
                Ok(Some(found)) => {
                    tracing::debug!(
                        scan_id,
                        code = %code,
                        guest_id = %found.id,
                        "Backend resolved code"
                    );
                    state.append_if_absent(found.clone());
                    let guest = state.find(&found.id).cloned().unwrap_or(found);
                    begin_check_in(state, scan_id, guest, env)
                },
                Ok(None) => finish_scan(state, scan_id, ScanResult::not_found(), None),
                Err(error) => {
                    record_backend_failure(state, &error);
                    finish_scan(state, scan_id, ScanResult::retry(), None)
                },
            },

            GuestAction::CheckInConfirmed { scan_id, guest } => {
                state.pending_check_ins.remove(&guest.id);
                state.online = true;
                state.last_error = None;
                tracing::info!(scan_id, guest_id = %guest.id, "Check-in confirmed by backend");

                let full_name = guest.full_name();
                match state.find_mut(&guest.id) {
                    Some(existing) => *existing = guest,
                    None => state.guests.push(guest),
                }

                let save = save_snapshot(env, state.snapshot());
                finish_scan(state, scan_id, ScanResult::confirmed(full_name, false), Some(save))
            },

            GuestAction::CheckInRejected { scan_id, guest, error } => {
                let guest_id = guest.id.clone();
                state.pending_check_ins.remove(&guest_id);

                match error {
                    BackendError::ConflictLost { scanned_at } => {
                        tracing::warn!(
                            scan_id,
                            guest_id = %guest_id,
                            %scanned_at,
                            "Another station checked this guest in first"
                        );
                        state.online = true;
                        let full_name = guest.full_name();
                        // A concurrent remote delete may have dropped the record; the
                        // backend still holds it.
                        state.append_if_absent(guest);
                        if let Some(record) = state.find_mut(&guest_id) {
                            record.check_in(scanned_at);
                        }
                        let save = save_snapshot(env, state.snapshot());
                        let result = ScanResult::already_scanned(full_name);
                        finish_scan(state, scan_id, result, Some(save))
                    },
                    BackendError::NotFound => {
                        tracing::warn!(
                            scan_id,
                            guest_id = %guest_id,
                            "Guest no longer exists remotely"
                        );
                        state.remove(&guest_id);
                        let save = save_snapshot(env, state.snapshot());
                        finish_scan(state, scan_id, ScanResult::not_found(), Some(save))
                    },
                    error @ (BackendError::Unavailable(_) | BackendError::Validation(_)) => {
                        record_backend_failure(state, &error);
                        finish_scan(state, scan_id, ScanResult::retry(), None)
                    },
                }
            },

            GuestAction::ScanCompleted { scan_id, result } => {
                metrics::counter!("checkin.scans", "status" => result.status.as_str()).increment(1);
                tracing::info!(
                    scan_id,
                    status = %result.status,
                    message = %result.message,
                    "Scan completed"
                );
                SmallVec::new()
            },

            GuestAction::FetchCompleted { .. } | GuestAction::RegistrationCompleted { .. } => {
                SmallVec::new()
            },
        }
    }
}

/// Decide the outcome for a resolved guest.
fn begin_check_in(
    state: &mut GuestState,
    scan_id: ScanId,
    guest: GuestRecord,
    env: &GuestEnvironment,
) -> Effects {
    if guest.scanned {
        tracing::debug!(scan_id, guest_id = %guest.id, "Guest already scanned");
        return finish_scan(state, scan_id, ScanResult::already_scanned(guest.full_name()), None);
    }

    if state.is_pending(&guest.id) {
        tracing::debug!(scan_id, guest_id = %guest.id, "Check-in already in flight");
        return finish_scan(state, scan_id, ScanResult::in_progress(guest.full_name()), None);
    }

    let now = env.clock.now();

    let Some(backend) = &env.backend else {
        tracing::warn!(
            scan_id,
            guest_id = %guest.id,
            "Checked in without a backend, not durable remotely"
        );
        if let Some(record) = state.find_mut(&guest.id) {
            record.check_in(now);
        }
        state.unsynced_check_ins.push(guest.id.clone());
        let save = save_snapshot(env, state.snapshot());
        let result = ScanResult::confirmed(guest.full_name(), true);
        return finish_scan(state, scan_id, result, Some(save));
    };

    state.pending_check_ins.insert(guest.id.clone());
    let backend = Arc::clone(backend);

    smallvec![async_effect! {
        Some(match backend.mark_checked_in(guest.id.clone(), now).await {
            Ok(stored) => GuestAction::CheckInConfirmed { scan_id, guest: stored },
            Err(error) => GuestAction::CheckInRejected { scan_id, guest, error },
        })
    }]
}

/// Record the outcome and emit the terminal action, after the snapshot
/// write when there is one.
fn finish_scan(
    state: &mut GuestState,
    scan_id: ScanId,
    result: ScanResult,
    save: Option<Effect<GuestAction>>,
) -> Effects {
    state.last_scan = Some(result.clone());
    let done = Effect::send(GuestAction::ScanCompleted { scan_id, result });

    match save {
        Some(save) => smallvec![Effect::Sequential(vec![save, done])],
        None => smallvec![done],
    }
}

fn record_backend_failure(state: &mut GuestState, error: &BackendError) {
    tracing::warn!(error = %error, "Backend call failed");
    if matches!(error, BackendError::Unavailable(_)) {
        state.online = false;
    }
    state.last_error = Some(error.to_string());
}

fn fetch_guests(request_id: RequestId, env: &GuestEnvironment) -> Effect<GuestAction> {
    let backend = env.backend.clone();
    let cache = Arc::clone(&env.cache);

    async_effect! {
        let Some(backend) = backend else {
            return Some(GuestAction::GuestsLoaded {
                request_id,
                guests: load_snapshot(cache.as_ref()).await,
                source: SnapshotSource::Cache,
                error: None,
            });
        };

        Some(match backend.fetch_all().await {
            Ok(guests) => GuestAction::GuestsLoaded {
                request_id,
                guests,
                source: SnapshotSource::Remote,
                error: None,
            },
            Err(error) => {
                tracing::warn!(error = %error, "Backend fetch failed, falling back to snapshot");
                GuestAction::GuestsLoaded {
                    request_id,
                    guests: load_snapshot(cache.as_ref()).await,
                    source: SnapshotSource::Cache,
                    error: Some(error.into()),
                }
            },
        })
    }
}

/// Read the snapshot; an unreadable one counts as empty.
async fn load_snapshot(cache: &dyn SnapshotCache) -> Vec<GuestRecord> {
    match cache.load().await {
        Ok(guests) => guests,
        Err(error) => {
            tracing::error!(error = %error, "Guest snapshot unreadable, using an empty collection");
            Vec::new()
        },
    }
}

fn save_snapshot(env: &GuestEnvironment, guests: Vec<GuestRecord>) -> Effect<GuestAction> {
    let cache = Arc::clone(&env.cache);
    async_effect! {
        if let Err(error) = cache.save(guests).await {
            tracing::error!(error = %error, "Failed to write guest snapshot");
        }
        None
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)] // Test code
mod tests {
    use super::*;
    use crate::mocks::{InMemoryGuestBackend, InMemorySnapshotCache};
    use crate::types::{GuestChange, ScanStatus};
    use checkin_testing::{assertions, run_effects, test_clock, ReducerTest, SequentialIdGenerator};

    fn ana_lee() -> GuestRecord {
        GuestRecord::register(
            GuestId::new("a1b2c3d4-0000-4000-8000-000000000001"),
            NewGuest {
                first_name: "Ana".into(),
                last_name: "Lee".into(),
                email: "ana@x.com".into(),
            },
            test_clock().now(),
        )
    }

    fn local_env(cache: &InMemorySnapshotCache) -> GuestEnvironment {
        GuestEnvironment::new(
            Arc::new(test_clock()),
            Arc::new(SequentialIdGenerator::new()),
            Arc::new(cache.clone()),
        )
    }

    fn remote_env(backend: &InMemoryGuestBackend) -> GuestEnvironment {
        local_env(&InMemorySnapshotCache::new()).with_backend(Arc::new(backend.clone()))
    }

    /// Reduce `action`, then keep feeding produced actions back until quiet.
    async fn settle(
        state: &mut GuestState,
        action: GuestAction,
        env: &GuestEnvironment,
    ) -> Vec<GuestAction> {
        let reducer = GuestReducer::new();
        let mut seen = Vec::new();
        let mut queue = vec![action];

        while let Some(action) = queue.pop() {
            let effects = reducer.reduce(state, action.clone(), env);
            seen.push(action);
            let mut produced = run_effects(effects.into_vec()).await;
            produced.reverse();
            queue.extend(produced);
        }
        seen
    }

    fn scan(code: &str) -> GuestAction {
        GuestAction::CheckIn {
            scan_id: 1,
            code: code.into(),
        }
    }

    fn scan_result(actions: &[GuestAction]) -> ScanResult {
        actions
            .iter()
            .find_map(|action| match action {
                GuestAction::ScanCompleted { result, .. } => Some(result.clone()),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn check_in_with_backend_marks_pending_without_mutating() {
        let backend = InMemoryGuestBackend::with_guests(vec![ana_lee()]);

        ReducerTest::new(GuestReducer::new())
            .with_env(remote_env(&backend))
            .given_state(GuestState::with_guests(vec![ana_lee()]))
            .when_action(GuestAction::CheckIn {
                scan_id: 1,
                code: "a1b2c3d4".into(),
            })
            .then_state(|state| {
                assert!(state.is_pending(&ana_lee().id));
                assert!(!state.guests[0].scanned);
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_has_future_effect(effects);
            })
            .then_feedback(|actions| {
                assert!(matches!(actions, [GuestAction::CheckInConfirmed { scan_id: 1, .. }]));
            })
            .run();
    }

    #[test]
    fn second_scan_while_pending_warns() {
        let backend = InMemoryGuestBackend::new();
        let mut state = GuestState::with_guests(vec![ana_lee()]);
        state.pending_check_ins.insert(ana_lee().id);

        ReducerTest::new(GuestReducer::new())
            .with_env(remote_env(&backend))
            .given_state(state)
            .when_action(GuestAction::CheckIn {
                scan_id: 2,
                code: ana_lee().id.to_string(),
            })
            .then_state(|state| {
                let result = state.last_scan.as_ref().unwrap();
                assert_eq!(result.status, ScanStatus::Warning);
                assert_eq!(result.message, "check-in already in progress");
            })
            .run();
    }

    #[test]
    fn blank_code_is_not_found_without_backend_call() {
        let backend = InMemoryGuestBackend::new();

        ReducerTest::new(GuestReducer::new())
            .with_env(remote_env(&backend))
            .given_state(GuestState::with_guests(vec![ana_lee()]))
            .when_action(GuestAction::CheckIn {
                scan_id: 3,
                code: "   ".into(),
            })
            .then_state(|state| {
                assert_eq!(state.last_scan, Some(ScanResult::not_found()));
            })
            .run();

        assert_eq!(backend.lookups(), 0);
    }

    #[test]
    fn clear_scan_result_forgets_outcome() {
        let mut state = GuestState::default();
        state.last_scan = Some(ScanResult::not_found());

        ReducerTest::new(GuestReducer::new())
            .with_env(local_env(&InMemorySnapshotCache::new()))
            .given_state(state)
            .when_action(GuestAction::ClearScanResult)
            .then_state(|state| assert!(state.last_scan.is_none()))
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[tokio::test]
    async fn confirmed_check_in_updates_record_and_snapshot() {
        let backend = InMemoryGuestBackend::with_guests(vec![ana_lee()]);
        let cache = InMemorySnapshotCache::new();
        let env = local_env(&cache).with_backend(Arc::new(backend.clone()));
        let mut state = GuestState::with_guests(vec![ana_lee()]);

        let actions = settle(&mut state, scan("a1b2c3d4"), &env).await;

        assert_eq!(scan_result(&actions), ScanResult::confirmed("Ana Lee".into(), false));
        assert!(state.guests[0].scanned);
        assert_eq!(state.guests[0].scanned_at, Some(test_clock().now()));
        assert!(state.pending_check_ins.is_empty());
        assert!(cache.stored().unwrap()[0].scanned);
    }

    #[tokio::test]
    async fn lost_race_downgrades_to_warning() {
        let mut winner = ana_lee();
        winner.check_in(test_clock().now() - chrono::Duration::minutes(5));
        let backend = InMemoryGuestBackend::with_guests(vec![winner.clone()]);
        let env = remote_env(&backend);
        let mut state = GuestState::with_guests(vec![ana_lee()]);

        let actions = settle(&mut state, scan("a1b2c3d4"), &env).await;

        assert_eq!(scan_result(&actions), ScanResult::already_scanned("Ana Lee".into()));
        assert_eq!(state.guests[0].scanned_at, winner.scanned_at);
    }

    #[test]
    fn lost_race_after_local_removal_still_warns() {
        let winner_at = test_clock().now() - chrono::Duration::minutes(5);

        ReducerTest::new(GuestReducer::new())
            .with_env(remote_env(&InMemoryGuestBackend::new()))
            .given_state(GuestState::default())
            .when_action(GuestAction::CheckInRejected {
                scan_id: 4,
                guest: ana_lee(),
                error: BackendError::ConflictLost { scanned_at: winner_at },
            })
            .then_state(move |state| {
                assert_eq!(state.last_scan, Some(ScanResult::already_scanned("Ana Lee".into())));
                assert_eq!(state.guests.len(), 1);
                assert_eq!(state.guests[0].scanned_at, Some(winner_at));
            })
            .run();
    }

    #[tokio::test]
    async fn failed_write_leaves_guest_unscanned() {
        let backend = InMemoryGuestBackend::with_guests(vec![ana_lee()]);
        backend.set_available(false);
        let env = remote_env(&backend);
        let mut state = GuestState::with_guests(vec![ana_lee()]);

        let actions = settle(&mut state, scan("a1b2c3d4"), &env).await;

        assert_eq!(scan_result(&actions), ScanResult::retry());
        assert!(!state.guests[0].scanned);
        assert!(!state.online);
        assert!(state.last_error.is_some());
        assert!(state.pending_check_ins.is_empty());
    }

    #[tokio::test]
    async fn remotely_deleted_guest_is_dropped_locally() {
        let backend = InMemoryGuestBackend::new();
        let env = remote_env(&backend);
        let mut state = GuestState::with_guests(vec![ana_lee()]);

        let actions = settle(&mut state, scan("a1b2c3d4"), &env).await;

        assert_eq!(scan_result(&actions), ScanResult::not_found());
        assert!(state.guests.is_empty());
    }

    #[tokio::test]
    async fn remote_lookup_adds_guest_then_checks_in() {
        let backend = InMemoryGuestBackend::with_guests(vec![ana_lee()]);
        let env = remote_env(&backend);
        let mut state = GuestState::default();

        let actions = settle(&mut state, scan("a1b2c3d4"), &env).await;

        assert_eq!(scan_result(&actions).status, ScanStatus::Success);
        assert_eq!(state.guests.len(), 1);
        assert!(state.guests[0].scanned);
        assert_eq!(backend.lookups(), 1);
    }

    #[tokio::test]
    async fn local_only_check_in_is_flagged() {
        let cache = InMemorySnapshotCache::new();
        let env = local_env(&cache);
        let mut state = GuestState::with_guests(vec![ana_lee()]);

        let actions = settle(&mut state, scan("a1b2c3d4"), &env).await;

        let result = scan_result(&actions);
        assert!(result.success);
        assert!(result.local_only);
        assert_eq!(state.unsynced_check_ins, vec![ana_lee().id]);
        assert!(cache.stored().unwrap()[0].scanned);
    }

    #[tokio::test]
    async fn local_only_registration_uses_id_generator() {
        let env = local_env(&InMemorySnapshotCache::new());
        let mut state = GuestState::default();

        let actions = settle(
            &mut state,
            GuestAction::RegisterGuest {
                request_id: 7,
                first_name: "Ana".into(),
                last_name: "Lee".into(),
                email: "ana@x.com".into(),
            },
            &env,
        )
        .await;

        let outcome = actions.iter().find_map(|action| match action {
            GuestAction::RegistrationCompleted { request_id: 7, outcome } => Some(outcome.clone()),
            _ => None,
        });
        let guest = outcome.unwrap().unwrap();
        assert_eq!(guest.id.as_str(), "00000001-0000-4000-8000-000000000001");
        assert!(!guest.scanned);
        assert_eq!(state.unsynced_registrations, vec![guest.id]);
    }

    #[tokio::test]
    async fn invalid_registration_never_reaches_backend() {
        let backend = InMemoryGuestBackend::new();
        let env = remote_env(&backend);
        let mut state = GuestState::default();

        let actions = settle(
            &mut state,
            GuestAction::RegisterGuest {
                request_id: 1,
                first_name: "Ana".into(),
                last_name: "Lee".into(),
                email: "not-an-email".into(),
            },
            &env,
        )
        .await;

        assert!(actions.iter().any(|action| matches!(
            action,
            GuestAction::RegistrationCompleted { outcome: Err(GuestError::Validation(_)), .. }
        )));
        assert!(backend.guests().is_empty());
        assert!(state.guests.is_empty());
    }

    #[tokio::test]
    async fn failed_fetch_falls_back_to_snapshot() {
        let backend = InMemoryGuestBackend::new();
        backend.set_available(false);
        let cache = InMemorySnapshotCache::with_guests(&[ana_lee()]);
        let env = local_env(&cache).with_backend(Arc::new(backend));
        let mut state = GuestState::default();

        let actions = settle(&mut state, GuestAction::FetchGuests { request_id: 1 }, &env).await;

        assert!(actions.iter().any(|action| matches!(
            action,
            GuestAction::FetchCompleted {
                request_id: 1,
                source: SnapshotSource::Cache,
                degraded_reason: Some(_),
            }
        )));
        assert_eq!(state.guests, vec![ana_lee()]);
        assert!(!state.online);
    }

    #[tokio::test]
    async fn fetch_completion_carries_its_request_id() {
        let backend = InMemoryGuestBackend::with_guests(vec![ana_lee()]);
        let env = remote_env(&backend);
        let mut state = GuestState::default();

        let actions = settle(&mut state, GuestAction::FetchGuests { request_id: 9 }, &env).await;

        let completed: Vec<_> = actions.iter().filter_map(GuestAction::completed_fetch).collect();
        assert_eq!(completed, vec![9]);
    }

    #[tokio::test]
    async fn corrupt_snapshot_loads_as_empty() {
        let cache = InMemorySnapshotCache::new();
        cache.corrupt();
        let env = local_env(&cache);
        let mut state = GuestState::default();

        settle(&mut state, GuestAction::FetchGuests { request_id: 1 }, &env).await;

        assert!(state.guests.is_empty());
    }

    #[tokio::test]
    async fn remote_fetch_orders_newest_first() {
        let older = ana_lee();
        let mut newer = ana_lee();
        newer.id = GuestId::new("b0000000-0000-4000-8000-000000000002");
        newer.registered_at = older.registered_at + chrono::Duration::hours(1);
        let backend = InMemoryGuestBackend::with_guests(vec![older.clone(), newer.clone()]);
        let env = remote_env(&backend);
        let mut state = GuestState::default();

        settle(&mut state, GuestAction::FetchGuests { request_id: 1 }, &env).await;

        assert_eq!(state.guests, vec![newer, older]);
        assert!(state.online);
    }

    #[tokio::test]
    async fn unchanged_fold_skips_snapshot_write() {
        let cache = InMemorySnapshotCache::new();
        let env = local_env(&cache);
        let mut state = GuestState::with_guests(vec![ana_lee()]);

        let insert = GuestAction::ApplyRemoteChange {
            change: GuestChange::Insert(ana_lee()),
        };
        settle(&mut state, insert, &env).await;
        assert_eq!(cache.saves(), 0);

        let delete = GuestAction::ApplyRemoteChange {
            change: GuestChange::Delete(ana_lee()),
        };
        settle(&mut state, delete, &env).await;
        assert_eq!(cache.saves(), 1);
        assert!(state.guests.is_empty());
    }
}
