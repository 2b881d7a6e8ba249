//! Conflict-retry controller for saving edited items.
//!
//! A save is a bounded loop around the store's optimistic-concurrency check:
//! validate once, submit, and on a version conflict refetch the
//! authoritative record, re-apply the user's edits on top of it, and try
//! again, up to a fixed ceiling. Only version conflicts are retried;
//! not-found, transport, and server-side rejections surface immediately.
//!
//! The loop's control flow lives in a pure transition function
//! ([`step`]) over explicit [`SaveState`]s, so the retry behavior is
//! testable without any network. The async driver ([`save_item`]) feeds it
//! events and performs the I/O between transitions. Retries are strictly
//! sequential: each attempt completes before the next begins.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::config::ApiConfig;
use crate::models::{ColorChange, Item, ItemDraft};
use crate::reconcile::{self, EditSet, ValidationErrors};

/// How a single write attempt can fail, as reported by the record store.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("version conflict: record changed since last read")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("rejected by store: {0}")]
    Rejected(String),
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Access to the authoritative record store, from the client's side.
///
/// Implemented over HTTP by [`crate::api::ApiClient`] and by scripted
/// in-memory stubs in tests.
#[async_trait]
pub trait RecordGateway: Send + Sync {
    async fn fetch(&self, id: &str) -> Result<Item, GatewayError>;

    /// Submits a full replacement. The candidate's `version` field is the
    /// token the store is expected to still hold.
    async fn replace(&self, candidate: &Item) -> Result<Item, GatewayError>;
}

/// Where one logical save currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveState {
    Idle,
    Submitting { attempt: u32 },
    Conflicted { attempt: u32 },
    Succeeded,
    Failed,
}

/// What just happened to the in-flight save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveEvent {
    Submit,
    WriteAccepted,
    WriteConflicted,
    WriteRejected,
}

/// Pure transition function for the save state machine.
///
/// `Succeeded` and `Failed` are terminal and absorb every event. A conflict
/// on the final permitted attempt goes straight to `Failed`; otherwise it
/// parks in `Conflicted` until the driver resubmits.
pub fn step(state: SaveState, event: SaveEvent, max_attempts: u32) -> SaveState {
    match (state, event) {
        (SaveState::Idle, SaveEvent::Submit) => SaveState::Submitting { attempt: 1 },
        (SaveState::Submitting { .. }, SaveEvent::WriteAccepted) => SaveState::Succeeded,
        (SaveState::Submitting { attempt }, SaveEvent::WriteConflicted) => {
            if attempt < max_attempts {
                SaveState::Conflicted { attempt }
            } else {
                SaveState::Failed
            }
        }
        (SaveState::Submitting { .. }, SaveEvent::WriteRejected) => SaveState::Failed,
        (SaveState::Conflicted { attempt }, SaveEvent::Submit) => SaveState::Submitting {
            attempt: attempt + 1,
        },
        // Terminal states and out-of-order events change nothing.
        (state, _) => state,
    }
}

/// Retry bounds for one logical save.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(api: &ApiConfig) -> Self {
        Self {
            max_attempts: api.max_attempts,
            retry_delay: Duration::from_millis(api.retry_delay_ms),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_millis(500),
        }
    }
}

/// A completed save: the authoritative record and the stock movements
/// between the record observed at the start and the final saved state.
#[derive(Debug, Clone)]
pub struct SaveOutcome {
    pub item: Item,
    pub changes: Vec<ColorChange>,
    pub attempts: u32,
}

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),
    #[error("version conflict not resolved after {attempts} attempts")]
    ConflictExhausted { attempts: u32 },
    #[error("record not found")]
    NotFound,
    #[error("rejected by store: {0}")]
    Rejected(String),
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Saves a user's edits to an existing record, retrying version conflicts.
///
/// `base` is the record the user loaded before editing; the draft is
/// validated first, and a validation failure fails the save without any
/// network traffic. On success the outcome carries the diff between `base`
/// and the saved record, ready for history logging.
pub async fn save_item(
    gateway: &dyn RecordGateway,
    base: &Item,
    draft: &ItemDraft,
    policy: &RetryPolicy,
) -> Result<SaveOutcome, SaveError> {
    let edited = reconcile::validate_draft(draft).map_err(SaveError::Validation)?;
    let edits = EditSet::between(base, &edited);

    let mut candidate = edits.apply(base);
    let mut state = step(SaveState::Idle, SaveEvent::Submit, policy.max_attempts);
    let mut attempts = 0;

    while let SaveState::Submitting { attempt } = state {
        attempts = attempt;

        match gateway.replace(&candidate).await {
            Ok(saved) => {
                let changes = reconcile::diff_colors(&base.color_variants, &saved.color_variants);
                return Ok(SaveOutcome {
                    item: saved,
                    changes,
                    attempts,
                });
            }
            Err(GatewayError::Conflict) => {
                state = step(state, SaveEvent::WriteConflicted, policy.max_attempts);
                if let SaveState::Conflicted { .. } = state {
                    let latest = match gateway.fetch(&base.id).await {
                        Ok(latest) => latest,
                        Err(GatewayError::NotFound) => return Err(SaveError::NotFound),
                        Err(GatewayError::Rejected(m)) => return Err(SaveError::Rejected(m)),
                        Err(e) => return Err(SaveError::Transport(e.to_string())),
                    };
                    candidate = edits.apply(&latest);
                    if !policy.retry_delay.is_zero() {
                        tokio::time::sleep(policy.retry_delay).await;
                    }
                    state = step(state, SaveEvent::Submit, policy.max_attempts);
                }
            }
            Err(GatewayError::NotFound) => return Err(SaveError::NotFound),
            Err(GatewayError::Rejected(m)) => return Err(SaveError::Rejected(m)),
            Err(GatewayError::Transport(m)) => return Err(SaveError::Transport(m)),
        }
    }

    Err(SaveError::ConflictExhausted { attempts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColorVariant, VersionToken};
    use crate::reconcile::test_item;
    use std::sync::Mutex;

    fn variant(name: &str, stock: i64, min_stock: i64) -> ColorVariant {
        ColorVariant {
            color_name: name.to_string(),
            stock,
            min_stock,
            color_image_ref: None,
        }
    }

    fn quick_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            retry_delay: Duration::ZERO,
        }
    }

    fn draft_with_price(base: &Item, price: &str) -> ItemDraft {
        let mut draft = ItemDraft::from_item(base);
        draft.price = price.to_string();
        draft
    }

    /// In-memory store that reports a version conflict a scripted number of
    /// times; each conflict also advances the record's version, simulating
    /// the concurrent writer that caused it.
    struct ScriptedGateway {
        state: Mutex<ScriptedState>,
    }

    struct ScriptedState {
        record: Item,
        conflicts_left: u32,
        replace_calls: u32,
        fetch_calls: u32,
    }

    impl ScriptedGateway {
        fn new(record: Item, conflicts: u32) -> Self {
            Self {
                state: Mutex::new(ScriptedState {
                    record,
                    conflicts_left: conflicts,
                    replace_calls: 0,
                    fetch_calls: 0,
                }),
            }
        }

        fn replace_calls(&self) -> u32 {
            self.state.lock().unwrap().replace_calls
        }

        fn fetch_calls(&self) -> u32 {
            self.state.lock().unwrap().fetch_calls
        }
    }

    #[async_trait]
    impl RecordGateway for ScriptedGateway {
        async fn fetch(&self, _id: &str) -> Result<Item, GatewayError> {
            let mut s = self.state.lock().unwrap();
            s.fetch_calls += 1;
            Ok(s.record.clone())
        }

        async fn replace(&self, candidate: &Item) -> Result<Item, GatewayError> {
            let mut s = self.state.lock().unwrap();
            s.replace_calls += 1;
            if s.conflicts_left > 0 {
                s.conflicts_left -= 1;
                s.record.version = VersionToken(s.record.version.0 + 1);
                return Err(GatewayError::Conflict);
            }
            if candidate.version != s.record.version {
                return Err(GatewayError::Conflict);
            }
            s.record = candidate.clone();
            s.record.version = VersionToken(candidate.version.0 + 1);
            Ok(s.record.clone())
        }
    }

    /// Gateway whose every call fails with the configured error.
    struct FailingGateway {
        make_error: fn() -> GatewayError,
        replace_calls: Mutex<u32>,
    }

    impl FailingGateway {
        fn new(make_error: fn() -> GatewayError) -> Self {
            Self {
                make_error,
                replace_calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl RecordGateway for FailingGateway {
        async fn fetch(&self, _id: &str) -> Result<Item, GatewayError> {
            Err((self.make_error)())
        }

        async fn replace(&self, _candidate: &Item) -> Result<Item, GatewayError> {
            *self.replace_calls.lock().unwrap() += 1;
            Err((self.make_error)())
        }
    }

    #[test]
    fn test_step_happy_path() {
        let s = step(SaveState::Idle, SaveEvent::Submit, 3);
        assert_eq!(s, SaveState::Submitting { attempt: 1 });
        let s = step(s, SaveEvent::WriteAccepted, 3);
        assert_eq!(s, SaveState::Succeeded);
    }

    #[test]
    fn test_step_conflict_loops_until_ceiling() {
        let mut s = step(SaveState::Idle, SaveEvent::Submit, 3);
        s = step(s, SaveEvent::WriteConflicted, 3);
        assert_eq!(s, SaveState::Conflicted { attempt: 1 });
        s = step(s, SaveEvent::Submit, 3);
        assert_eq!(s, SaveState::Submitting { attempt: 2 });
        s = step(s, SaveEvent::WriteConflicted, 3);
        s = step(s, SaveEvent::Submit, 3);
        assert_eq!(s, SaveState::Submitting { attempt: 3 });
        // Conflict on the final attempt is terminal.
        s = step(s, SaveEvent::WriteConflicted, 3);
        assert_eq!(s, SaveState::Failed);
    }

    #[test]
    fn test_step_rejection_is_terminal() {
        let s = step(SaveState::Submitting { attempt: 1 }, SaveEvent::WriteRejected, 3);
        assert_eq!(s, SaveState::Failed);
    }

    #[test]
    fn test_step_terminal_states_absorb_events() {
        for event in [
            SaveEvent::Submit,
            SaveEvent::WriteAccepted,
            SaveEvent::WriteConflicted,
            SaveEvent::WriteRejected,
        ] {
            assert_eq!(step(SaveState::Succeeded, event, 3), SaveState::Succeeded);
            assert_eq!(step(SaveState::Failed, event, 3), SaveState::Failed);
        }
    }

    #[tokio::test]
    async fn test_save_succeeds_after_two_conflicts_with_three_attempts() {
        let base = test_item("SR-100", vec![variant("Red", 5, 2)]);
        let gateway = ScriptedGateway::new(base.clone(), 2);
        let draft = draft_with_price(&base, "2999");

        let outcome = save_item(&gateway, &base, &draft, &quick_policy(3))
            .await
            .unwrap();
        assert_eq!(outcome.attempts, 3);
        assert_eq!(gateway.replace_calls(), 3);
        assert_eq!(gateway.fetch_calls(), 2);
        assert!((outcome.item.price - 2999.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_save_exhausts_with_two_attempts() {
        let base = test_item("SR-100", vec![variant("Red", 5, 2)]);
        let gateway = ScriptedGateway::new(base.clone(), 2);
        let draft = draft_with_price(&base, "2999");

        let err = save_item(&gateway, &base, &draft, &quick_policy(2))
            .await
            .unwrap_err();
        assert!(matches!(err, SaveError::ConflictExhausted { attempts: 2 }));
        assert_eq!(gateway.replace_calls(), 2);
    }

    #[tokio::test]
    async fn test_save_never_exceeds_attempt_ceiling() {
        let base = test_item("SR-100", vec![variant("Red", 5, 2)]);
        let gateway = ScriptedGateway::new(base.clone(), u32::MAX);
        let draft = draft_with_price(&base, "2999");

        let err = save_item(&gateway, &base, &draft, &quick_policy(4))
            .await
            .unwrap_err();
        assert!(matches!(err, SaveError::ConflictExhausted { attempts: 4 }));
        assert_eq!(gateway.replace_calls(), 4);
    }

    #[tokio::test]
    async fn test_validation_failure_makes_no_network_call() {
        let base = test_item("SR-100", vec![variant("Red", 5, 2)]);
        let gateway = ScriptedGateway::new(base.clone(), 0);
        let mut draft = ItemDraft::from_item(&base);
        draft.catalog_number = String::new();
        draft.price = "-5".to_string();

        let err = save_item(&gateway, &base, &draft, &quick_policy(3))
            .await
            .unwrap_err();
        match err {
            SaveError::Validation(errors) => {
                assert!(errors.fields.contains_key("catalogNumber"));
                assert!(errors.fields.contains_key("price"));
            }
            other => panic!("expected validation failure, got {:?}", other),
        }
        assert_eq!(gateway.replace_calls(), 0);
        assert_eq!(gateway.fetch_calls(), 0);
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let base = test_item("SR-100", vec![variant("Red", 5, 2)]);
        let gateway = FailingGateway::new(|| GatewayError::NotFound);
        let draft = draft_with_price(&base, "2999");

        let err = save_item(&gateway, &base, &draft, &quick_policy(3))
            .await
            .unwrap_err();
        assert!(matches!(err, SaveError::NotFound));
        assert_eq!(*gateway.replace_calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_is_not_retried() {
        let base = test_item("SR-100", vec![variant("Red", 5, 2)]);
        let gateway = FailingGateway::new(|| GatewayError::Transport("connection refused".into()));
        let draft = draft_with_price(&base, "2999");

        let err = save_item(&gateway, &base, &draft, &quick_policy(3))
            .await
            .unwrap_err();
        assert!(matches!(err, SaveError::Transport(_)));
        assert_eq!(*gateway.replace_calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_identical_draft_saves_with_empty_diff() {
        let base = test_item("SR-100", vec![variant("Red", 5, 2)]);
        let gateway = ScriptedGateway::new(base.clone(), 0);
        let draft = ItemDraft::from_item(&base);

        let outcome = save_item(&gateway, &base, &draft, &quick_policy(3))
            .await
            .unwrap();
        assert!(outcome.changes.is_empty());
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn test_retry_merges_concurrent_writer_fields() {
        let base = test_item("SR-100", vec![variant("Red", 5, 2)]);
        // The concurrent writer renamed the item before our first attempt.
        let mut server_copy = base.clone();
        server_copy.display_name = "Kanchipuram Silk (2024)".to_string();
        let gateway = ScriptedGateway::new(server_copy, 1);

        // The user only touched the price.
        let draft = draft_with_price(&base, "2999");

        let outcome = save_item(&gateway, &base, &draft, &quick_policy(3))
            .await
            .unwrap();
        assert_eq!(outcome.item.display_name, "Kanchipuram Silk (2024)");
        assert!((outcome.item.price - 2999.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_diff_reflects_base_to_saved_movement() {
        let base = test_item("SR-100", vec![variant("Red", 5, 2)]);
        let gateway = ScriptedGateway::new(base.clone(), 0);
        let mut draft = ItemDraft::from_item(&base);
        draft.color_variants[0].stock = "1".to_string();

        let outcome = save_item(&gateway, &base, &draft, &quick_policy(3))
            .await
            .unwrap();
        assert_eq!(outcome.changes.len(), 1);
        assert_eq!(outcome.changes[0].old_stock, 5);
        assert_eq!(outcome.changes[0].new_stock, 1);
    }
}
