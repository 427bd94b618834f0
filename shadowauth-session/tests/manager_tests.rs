mod common;

use chrono::{Duration, Utc};
use common::{gate, gate_with, script, test_registry, token_from_url};
use pretty_assertions::assert_eq;
use shadowauth_keys::{KeyStore, MemoryKeyStore, KEY_PREFIX};
use shadowauth_session::{
    CasOutcome, GateError, MemorySessionStore, Session, SessionConfig, SessionManager,
    SessionStore, StoreError, TokenError,
};
use shadowauth_types::SessionToken;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// ── start ─────────────────────────────────────────────────────────

#[test]
fn start_unknown_script_fails_not_found() {
    let g = gate();
    assert!(matches!(
        g.manager.start(&script("missing")),
        Err(GateError::NotFound)
    ));
}

#[test]
fn start_zero_checkpoint_script_fails_not_found() {
    let g = gate();
    assert!(matches!(
        g.manager.start(&script("draft")),
        Err(GateError::NotFound)
    ));
}

#[test]
fn start_returns_step_metadata_without_secrets() {
    let g = gate();
    let started = g.manager.start(&script("gated")).unwrap();

    assert_eq!(started.current_step, 0);
    assert_eq!(started.total_steps, 2);
    assert_eq!(started.checkpoints.len(), 2);
    assert_eq!(started.checkpoints[0].order, 1);
    assert_eq!(started.checkpoints[0].provider, "direct");
    assert!(started.checkpoints[0].anti_bypass);
    assert!(!started.checkpoints[1].anti_bypass);

    // The wire shape carries no url templates.
    let json = serde_json::to_string(&started).unwrap();
    assert!(!json.contains("url_template"));
    assert!(!json.contains("ads.example"));
}

#[test]
fn start_issues_fresh_tokens() {
    let g = gate();
    let a = g.manager.start(&script("gated")).unwrap();
    let b = g.manager.start(&script("gated")).unwrap();
    assert_ne!(a.session_token, b.session_token);
    assert_eq!(g.sessions.len(), 2);
}

// ── checkpoint_url ────────────────────────────────────────────────

#[test]
fn checkpoint_url_unknown_session_fails_expired() {
    let g = gate();
    assert!(matches!(
        g.manager.checkpoint_url(&SessionToken::new(), 1),
        Err(GateError::SessionExpired)
    ));
}

#[test]
fn checkpoint_url_rejects_any_step_but_the_next() {
    let g = gate();
    let started = g.manager.start(&script("gated")).unwrap();
    let token = started.session_token;

    assert!(matches!(
        g.manager.checkpoint_url(&token, 2),
        Err(GateError::InvalidStep { expected: 1, requested: 2 })
    ));
    assert!(matches!(
        g.manager.checkpoint_url(&token, 0),
        Err(GateError::InvalidStep { expected: 1, requested: 0 })
    ));
}

#[test]
fn checkpoint_url_carries_a_fresh_token_for_flagged_step() {
    let g = gate();
    let started = g.manager.start(&script("gated")).unwrap();
    let url = g.manager.checkpoint_url(&started.session_token, 1).unwrap();

    assert!(url.starts_with("https://ads.example/one?"));
    assert_eq!(token_from_url(&url).len(), 32);
}

#[test]
fn checkpoint_url_omits_token_for_unflagged_step() {
    let g = gate();
    let started = g.manager.start(&script("trio")).unwrap();
    let url = g.manager.checkpoint_url(&started.session_token, 1).unwrap();
    assert!(!url.contains("token="));
    assert!(url.contains("sid="));
}

#[test]
fn rerequesting_url_invalidates_the_previous_token() {
    let g = gate();
    let started = g.manager.start(&script("gated")).unwrap();
    let token = started.session_token;

    let first = token_from_url(&g.manager.checkpoint_url(&token, 1).unwrap());
    let second = token_from_url(&g.manager.checkpoint_url(&token, 1).unwrap());
    assert_ne!(first, second);

    // The stale link no longer completes the step; the fresh one does.
    assert!(matches!(
        g.manager.complete_step(&token, 1, Some(&first)),
        Err(GateError::VerificationFailed(TokenError::Mismatch))
    ));
    let snap = g.manager.complete_step(&token, 1, Some(&second)).unwrap();
    assert_eq!(snap.current_step, 1);
}

// ── complete_step ─────────────────────────────────────────────────

#[test]
fn complete_unknown_session_fails_expired() {
    let g = gate();
    assert!(matches!(
        g.manager.complete_step(&SessionToken::new(), 1, None),
        Err(GateError::SessionExpired)
    ));
}

#[test]
fn complete_ahead_of_sequence_fails_out_of_order() {
    let g = gate();
    let started = g.manager.start(&script("trio")).unwrap();
    assert!(matches!(
        g.manager.complete_step(&started.session_token, 2, None),
        Err(GateError::OutOfOrder { expected: 1, requested: 2 })
    ));
}

#[test]
fn complete_without_issued_url_fails_verification() {
    // Even an unflagged step demands the weak proof that its redirect URL
    // was issued, so a bare complete_step loop cannot claim the sequence.
    let g = gate();
    let started = g.manager.start(&script("trio")).unwrap();
    assert!(matches!(
        g.manager.complete_step(&started.session_token, 1, None),
        Err(GateError::VerificationFailed(TokenError::NotIssued))
    ));
}

#[test]
fn complete_flagged_step_without_token_fails_verification() {
    let g = gate();
    let started = g.manager.start(&script("gated")).unwrap();
    let token = started.session_token;
    g.manager.checkpoint_url(&token, 1).unwrap();

    assert!(matches!(
        g.manager.complete_step(&token, 1, None),
        Err(GateError::VerificationFailed(TokenError::Mismatch))
    ));
    // The failure is recoverable: the real token still verifies.
    let url = g.manager.checkpoint_url(&token, 1).unwrap();
    let value = token_from_url(&url);
    assert_eq!(
        g.manager.complete_step(&token, 1, Some(&value)).unwrap().current_step,
        1
    );
}

#[test]
fn full_gated_walkthrough_mints_one_daily_key() {
    let g = gate();
    let started = g.manager.start(&script("gated")).unwrap();
    let token = started.session_token;
    assert_eq!(started.current_step, 0);
    assert_eq!(started.total_steps, 2);

    let url = g.manager.checkpoint_url(&token, 1).unwrap();
    let value = token_from_url(&url);

    let snap = g.manager.complete_step(&token, 1, Some(&value)).unwrap();
    assert_eq!(snap.current_step, 1);
    assert!(!snap.completed);
    assert!(snap.generated_key.is_none());

    g.manager.checkpoint_url(&token, 2).unwrap();
    let before = Utc::now();
    let snap = g.manager.complete_step(&token, 2, None).unwrap();
    assert_eq!(snap.current_step, 2);
    assert!(snap.completed);

    let key = snap.generated_key.unwrap();
    assert!(key.starts_with(KEY_PREFIX));
    let expires_at = snap.key_expires_at.unwrap();
    assert!(expires_at >= before + Duration::hours(24));
    assert!(expires_at <= Utc::now() + Duration::hours(24));

    // The key landed in the shared store shape.
    let stored = g.keys.get(&key).unwrap().unwrap();
    assert_eq!(stored.script_id, script("gated"));
    assert!(stored.hwid.is_none());
    assert!(!stored.banned);
    assert_eq!(g.keys.len().unwrap(), 1);
}

#[test]
fn three_step_script_completes_only_after_three_in_order_steps() {
    let g = gate();
    let started = g.manager.start(&script("trio")).unwrap();
    let token = started.session_token;

    for step in 1..=3u32 {
        let status = g.manager.status(&token).unwrap();
        assert!(!status.completed);
        assert!(status.generated_key.is_none());

        g.manager.checkpoint_url(&token, step).unwrap();
        let snap = g.manager.complete_step(&token, step, None).unwrap();
        assert_eq!(snap.current_step, step);
        assert_eq!(snap.completed, step == 3);
        assert_eq!(snap.generated_key.is_some(), step == 3);
    }
    assert_eq!(g.keys.len().unwrap(), 1);
}

#[test]
fn duplicate_completion_is_idempotent() {
    let g = gate();
    let started = g.manager.start(&script("gated")).unwrap();
    let token = started.session_token;

    let url = g.manager.checkpoint_url(&token, 1).unwrap();
    let value = token_from_url(&url);
    let first = g.manager.complete_step(&token, 1, Some(&value)).unwrap();

    // Retried callback: same token value, already consumed — still success.
    let second = g.manager.complete_step(&token, 1, Some(&value)).unwrap();
    assert_eq!(first, second);

    // And without any proof at all.
    let third = g.manager.complete_step(&token, 1, None).unwrap();
    assert_eq!(first, third);
}

#[test]
fn retried_final_completion_returns_the_same_key() {
    let g = gate();
    let started = g.manager.start(&script("gated")).unwrap();
    let token = started.session_token;

    let url = g.manager.checkpoint_url(&token, 1).unwrap();
    let value = token_from_url(&url);
    g.manager.complete_step(&token, 1, Some(&value)).unwrap();
    g.manager.checkpoint_url(&token, 2).unwrap();

    let first = g.manager.complete_step(&token, 2, None).unwrap();
    let second = g.manager.complete_step(&token, 2, None).unwrap();
    assert_eq!(first.generated_key, second.generated_key);
    assert_eq!(first.key_expires_at, second.key_expires_at);
    assert_eq!(g.keys.len().unwrap(), 1);
}

#[test]
fn completion_releases_the_session_tokens() {
    let g = gate();
    let started = g.manager.start(&script("gated")).unwrap();
    let token = started.session_token;

    let url = g.manager.checkpoint_url(&token, 1).unwrap();
    let value = token_from_url(&url);
    g.manager.complete_step(&token, 1, Some(&value)).unwrap();
    assert!(!g.manager.tokens().is_empty());

    g.manager.checkpoint_url(&token, 2).unwrap();
    let snap = g.manager.complete_step(&token, 2, None).unwrap();
    assert!(snap.completed);

    // The consumed step-1 token is released with the session; the row
    // itself stays pollable.
    assert!(g.manager.tokens().is_empty());
    assert!(g.manager.status(&token).is_ok());
}

// ── status ────────────────────────────────────────────────────────

#[test]
fn status_unknown_session_fails_not_found() {
    let g = gate();
    assert!(matches!(
        g.manager.status(&SessionToken::new()),
        Err(GateError::NotFound)
    ));
}

#[test]
fn status_tracks_progress_without_side_effects() {
    let g = gate();
    let started = g.manager.start(&script("trio")).unwrap();
    let token = started.session_token;

    assert_eq!(g.manager.status(&token).unwrap().current_step, 0);
    // Polling in a loop changes nothing.
    for _ in 0..10 {
        assert_eq!(g.manager.status(&token).unwrap().current_step, 0);
    }

    g.manager.checkpoint_url(&token, 1).unwrap();
    g.manager.complete_step(&token, 1, None).unwrap();
    assert_eq!(g.manager.status(&token).unwrap().current_step, 1);
}

// ── reset ─────────────────────────────────────────────────────────

#[test]
fn reset_invalidates_the_session_terminally() {
    let g = gate();
    let started = g.manager.start(&script("gated")).unwrap();
    let token = started.session_token;
    g.manager.checkpoint_url(&token, 1).unwrap();

    g.manager.reset(&token).unwrap();

    assert!(matches!(
        g.manager.checkpoint_url(&token, 1),
        Err(GateError::SessionExpired)
    ));
    assert!(matches!(
        g.manager.complete_step(&token, 1, None),
        Err(GateError::SessionExpired)
    ));
    assert!(matches!(g.manager.status(&token), Err(GateError::NotFound)));
    assert!(matches!(g.manager.reset(&token), Err(GateError::NotFound)));
    assert!(g.manager.tokens().is_empty());
}

#[test]
fn reset_unknown_session_fails_not_found() {
    let g = gate();
    assert!(matches!(
        g.manager.reset(&SessionToken::new()),
        Err(GateError::NotFound)
    ));
}

#[test]
fn fresh_start_after_reset_begins_at_zero() {
    let g = gate();
    let old = g.manager.start(&script("gated")).unwrap();
    g.manager.reset(&old.session_token).unwrap();

    let fresh = g.manager.start(&script("gated")).unwrap();
    assert_ne!(fresh.session_token, old.session_token);
    assert_eq!(fresh.current_step, 0);
    assert_eq!(g.manager.status(&fresh.session_token).unwrap().current_step, 0);
}

// ── Expiry ────────────────────────────────────────────────────────

#[test]
fn session_past_inactivity_ttl_is_gone() {
    let g = gate_with(SessionConfig {
        session_ttl: chrono::Duration::zero(),
        ..SessionConfig::default()
    });
    let started = g.manager.start(&script("trio")).unwrap();
    let token = started.session_token;

    std::thread::sleep(std::time::Duration::from_millis(5));

    assert!(matches!(
        g.manager.checkpoint_url(&token, 1),
        Err(GateError::SessionExpired)
    ));
    assert!(matches!(
        g.manager.complete_step(&token, 1, None),
        Err(GateError::SessionExpired)
    ));
    assert!(matches!(g.manager.status(&token), Err(GateError::NotFound)));
}

#[test]
fn mutations_refresh_the_inactivity_ttl() {
    let g = gate_with(SessionConfig {
        session_ttl: chrono::Duration::milliseconds(200),
        ..SessionConfig::default()
    });
    let started = g.manager.start(&script("trio")).unwrap();
    let token = started.session_token;

    // Keep the session alive across several TTL windows via mutations.
    for _ in 0..3 {
        std::thread::sleep(std::time::Duration::from_millis(100));
        g.manager.checkpoint_url(&token, 1).unwrap();
    }
    assert!(g.manager.status(&token).is_ok());
}

// ── Concurrency ───────────────────────────────────────────────────

#[test]
fn racing_final_completions_mint_exactly_one_key() {
    let g = gate();
    let started = g.manager.start(&script("trio")).unwrap();
    let token = started.session_token;

    for step in 1..=2u32 {
        g.manager.checkpoint_url(&token, step).unwrap();
        g.manager.complete_step(&token, step, None).unwrap();
    }
    g.manager.checkpoint_url(&token, 3).unwrap();

    let snapshots: Vec<_> = std::thread::scope(|scope| {
        (0..8)
            .map(|_| scope.spawn(|| g.manager.complete_step(&token, 3, None).unwrap()))
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect()
    });

    let key = snapshots[0].generated_key.clone().unwrap();
    for snap in &snapshots {
        assert_eq!(snap.current_step, 3);
        assert!(snap.completed);
        assert_eq!(snap.generated_key.as_ref(), Some(&key));
    }
    assert_eq!(g.keys.len().unwrap(), 1);
}

#[test]
fn racing_mid_sequence_completions_advance_exactly_once() {
    let g = gate();
    let started = g.manager.start(&script("gated")).unwrap();
    let token = started.session_token;
    let url = g.manager.checkpoint_url(&token, 1).unwrap();
    let value = token_from_url(&url);

    let results: Vec<_> = std::thread::scope(|scope| {
        (0..8)
            .map(|_| scope.spawn(|| g.manager.complete_step(&token, 1, Some(&value))))
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect()
    });

    // Exactly one call consumed the token and advanced; the rest observed
    // the already-advanced row as idempotent duplicates.
    for result in results {
        let snap = result.unwrap();
        assert_eq!(snap.current_step, 1);
        assert!(!snap.completed);
    }
    assert_eq!(g.manager.status(&token).unwrap().current_step, 1);
}

// ── Shared-store conflicts ────────────────────────────────────────

/// Store whose final-step commit loses to a rival instance: the rival's
/// row lands in the backend and the caller sees the conflict.
struct ContestedStore {
    inner: MemorySessionStore,
    rival_key: String,
    contested: AtomicBool,
}

impl SessionStore for ContestedStore {
    fn load(&self, token: &SessionToken) -> Result<Option<Arc<Session>>, StoreError> {
        self.inner.load(token)
    }

    fn insert(&self, session: Session) -> Result<(), StoreError> {
        self.inner.insert(session)
    }

    fn compare_and_swap(
        &self,
        token: &SessionToken,
        expected_step: u32,
        updated: Session,
    ) -> Result<CasOutcome, StoreError> {
        if updated.completed && self.contested.swap(false, Ordering::SeqCst) {
            let mut rival = updated.clone();
            rival.generated_key = Some(self.rival_key.clone());
            self.inner.compare_and_swap(token, expected_step, rival.clone())?;
            return Ok(CasOutcome::Conflict(Arc::new(rival)));
        }
        self.inner.compare_and_swap(token, expected_step, updated)
    }

    fn remove(&self, token: &SessionToken) -> Result<Option<Arc<Session>>, StoreError> {
        self.inner.remove(token)
    }
}

#[test]
fn losing_the_final_commit_returns_the_rival_row() {
    let rival_key = "shadowauth_000000000000000rival0";
    let store = Arc::new(ContestedStore {
        inner: MemorySessionStore::new(),
        rival_key: rival_key.to_string(),
        contested: AtomicBool::new(true),
    });
    let keys = Arc::new(MemoryKeyStore::new());
    let manager = SessionManager::new(
        Arc::new(test_registry()),
        store,
        keys.clone(),
        SessionConfig::default(),
    );

    let started = manager.start(&script("trio")).unwrap();
    let token = started.session_token;
    for step in 1..=2u32 {
        manager.checkpoint_url(&token, step).unwrap();
        manager.complete_step(&token, step, None).unwrap();
    }
    manager.checkpoint_url(&token, 3).unwrap();

    // The rival row is the idempotent answer, rival key included.
    let snap = manager.complete_step(&token, 3, None).unwrap();
    assert!(snap.completed);
    assert_eq!(snap.generated_key.as_deref(), Some(rival_key));

    // The locally minted key stays in the key store but is never surfaced.
    assert_eq!(keys.len().unwrap(), 1);
    let stored = keys.get(rival_key).unwrap();
    assert!(stored.is_none());
}
