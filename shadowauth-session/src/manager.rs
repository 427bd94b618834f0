//! The checkpoint session manager — the state machine.

use crate::error::{GateError, GateResult};
use crate::session::{Session, SessionSnapshot, StepProof};
use crate::store::{CasOutcome, SessionStore};
use crate::token::{AntiBypassTokens, TokenError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use shadowauth_keys::{KeyDuration, KeyIssuer, KeyStore};
use shadowauth_registry::{CheckpointSpec, ProviderAdapters, RedirectContext, Registry};
use shadowauth_types::{ScriptId, SessionToken};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Configuration for the session manager.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Inactivity TTL after which a session expires.
    pub session_ttl: Duration,
    /// TTL of minted anti-bypass tokens.
    pub token_ttl: Duration,
    /// Duration class of checkpoint-earned keys.
    pub key_duration: KeyDuration,
    /// Gateway URL embedded in provider redirects as the callback target.
    pub callback_base: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::hours(24),
            token_ttl: Duration::minutes(10),
            key_duration: KeyDuration::Daily,
            callback_base: "http://localhost:8420/api/v1/gateway".to_string(),
        }
    }
}

/// Checkpoint metadata returned by `start` — no URL templates, no secrets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointInfo {
    pub order: u32,
    pub provider: String,
    pub anti_bypass: bool,
}

impl From<&CheckpointSpec> for CheckpointInfo {
    fn from(spec: &CheckpointSpec) -> Self {
        Self {
            order: spec.order,
            provider: spec.provider.clone(),
            anti_bypass: spec.anti_bypass,
        }
    }
}

/// Response of `start`: the fresh session token plus step metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartedSession {
    pub session_token: SessionToken,
    pub current_step: u32,
    pub total_steps: u32,
    pub checkpoints: Vec<CheckpointInfo>,
}

/// The checkpoint-gated key-issuance state machine.
///
/// Mutating operations (`checkpoint_url`, `complete_step`, `reset`) are
/// serialized per session by an advance lock, with the store's
/// compare-and-swap as the commit primitive. `status` never takes the lock;
/// it reads the latest committed row. Session and token expiry are enforced
/// lazily on read — there is no background sweep.
pub struct SessionManager {
    registry: Arc<Registry>,
    store: Arc<dyn SessionStore>,
    tokens: AntiBypassTokens,
    issuer: KeyIssuer,
    adapters: ProviderAdapters,
    config: SessionConfig,
    advance_locks: Mutex<HashMap<SessionToken, Arc<Mutex<()>>>>,
}

impl SessionManager {
    /// Creates a manager with the default provider adapters.
    pub fn new(
        registry: Arc<Registry>,
        store: Arc<dyn SessionStore>,
        key_store: Arc<dyn KeyStore>,
        config: SessionConfig,
    ) -> Self {
        Self {
            registry,
            store,
            tokens: AntiBypassTokens::with_ttl(config.token_ttl),
            issuer: KeyIssuer::new(key_store),
            adapters: ProviderAdapters::with_defaults(),
            config,
            advance_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the checkpoint registry.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Returns the anti-bypass token service.
    pub fn tokens(&self) -> &AntiBypassTokens {
        &self.tokens
    }

    /// Starts a checkpoint session for a script.
    ///
    /// # Errors
    ///
    /// Fails `NotFound` if the script is unknown or has zero configured
    /// checkpoints.
    pub fn start(&self, script_id: &ScriptId) -> GateResult<StartedSession> {
        let entry = self.registry.script(script_id).ok_or(GateError::NotFound)?;
        let total_steps = entry.total_steps();
        if total_steps == 0 {
            return Err(GateError::NotFound);
        }

        let now = Utc::now();
        let session = Session::new(script_id.clone(), total_steps, now);
        let token = session.token;
        self.store.insert(session)?;

        info!("Session {} started for script '{}' ({} steps)", token, script_id, total_steps);
        Ok(StartedSession {
            session_token: token,
            current_step: 0,
            total_steps,
            checkpoints: entry.checkpoints.iter().map(CheckpointInfo::from).collect(),
        })
    }

    /// Composes the provider redirect URL for the session's next step,
    /// minting a fresh anti-bypass token when the step is flagged.
    ///
    /// Idempotent by design: re-requesting before completion replaces the
    /// token and returns a fresh URL, which is how lost callbacks recover.
    ///
    /// # Errors
    ///
    /// Fails `SessionExpired` if the session is gone or past its TTL, and
    /// `InvalidStep` whenever `step != current_step + 1`.
    pub fn checkpoint_url(&self, token: &SessionToken, step: u32) -> GateResult<String> {
        let lock = self.advance_lock(token);
        let _guard = lock.lock().unwrap();

        let now = Utc::now();
        let Some(session) = self.load_live(token, now)? else {
            self.drop_advance_lock(token);
            return Err(GateError::SessionExpired);
        };

        if step != session.current_step + 1 {
            return Err(GateError::InvalidStep {
                expected: session.current_step + 1,
                requested: step,
            });
        }

        let spec = self.checkpoint_spec(&session.script_id, step)?;
        let minted = spec
            .anti_bypass
            .then(|| self.tokens.mint(token, step, now).value);

        let mut updated = (*session).clone();
        updated.proofs.insert(
            step,
            StepProof {
                issued_token: minted.clone(),
                issued_at: now,
                completed_at: None,
            },
        );
        updated.last_activity_at = now;

        match self
            .store
            .compare_and_swap(token, session.current_step, updated)?
        {
            CasOutcome::Committed => {}
            CasOutcome::Conflict(_) => {
                return Err(GateError::Internal("concurrent session update".to_string()));
            }
            CasOutcome::Missing => return Err(GateError::SessionExpired),
        }

        let ctx = RedirectContext {
            session_token: *token,
            step,
            callback_url: self.callback_url(token, step, minted.as_deref()),
            anti_bypass_token: minted,
        };
        let url = self.adapters.resolve(&spec.provider).redirect_url(spec, &ctx);
        debug!("Issued checkpoint {} URL for session {} via '{}'", step, token, spec.provider);
        Ok(url)
    }

    /// Records completion of a step, advancing the session by exactly 1.
    ///
    /// A retried call for an already-applied step (`step <= current_step`)
    /// is an idempotent duplicate and returns the current snapshot without
    /// error, keeping client retry logic trivial. On reaching the final
    /// step the key issuer is invoked exactly once, guarded by the session's
    /// `generated_key` and the advance lock.
    ///
    /// # Errors
    ///
    /// Fails `SessionExpired` if the session is gone or past its TTL,
    /// `OutOfOrder` when skipping ahead, and `VerificationFailed` when the
    /// step's proof is missing or its anti-bypass token does not consume.
    pub fn complete_step(
        &self,
        token: &SessionToken,
        step: u32,
        proof: Option<&str>,
    ) -> GateResult<SessionSnapshot> {
        let lock = self.advance_lock(token);
        let _guard = lock.lock().unwrap();

        let now = Utc::now();
        let Some(session) = self.load_live(token, now)? else {
            self.drop_advance_lock(token);
            return Err(GateError::SessionExpired);
        };

        if step <= session.current_step {
            debug!("Duplicate completion of step {} for session {}", step, token);
            if session.completed {
                self.drop_advance_lock(token);
            }
            return Ok(session.snapshot());
        }
        if step != session.current_step + 1 {
            return Err(GateError::OutOfOrder {
                expected: session.current_step + 1,
                requested: step,
            });
        }

        let spec = self.checkpoint_spec(&session.script_id, step)?;

        // Every step requires at least the weak proof that its redirect URL
        // was issued; flagged steps additionally consume the single-use token.
        if !session.proofs.contains_key(&step) {
            warn!("Session {} claimed step {} without an issued checkpoint URL", token, step);
            return Err(GateError::VerificationFailed(TokenError::NotIssued));
        }
        if spec.anti_bypass {
            if let Err(e) = self
                .tokens
                .consume(proof.unwrap_or_default(), token, step, now)
            {
                warn!("Session {} failed verification of step {}: {}", token, step, e);
                return Err(GateError::VerificationFailed(e));
            }
        }

        let mut updated = (*session).clone();
        updated.current_step = step;
        if let Some(p) = updated.proofs.get_mut(&step) {
            p.completed_at = Some(now);
        }
        updated.last_activity_at = now;

        // The key row lands in the key store before the session commit, so
        // this block must only be reachable under the advance lock: a CAS
        // loss here would strand the minted key. A store shared across
        // processes needs a transactional commit to close that window.
        if step == updated.total_steps && updated.generated_key.is_none() {
            let key = self
                .issuer
                .issue(&updated.script_id, self.config.key_duration, now)
                .map_err(|e| GateError::Internal(e.to_string()))?;
            info!("Key {} minted for session {} (script '{}')", key.value, token, updated.script_id);
            updated.generated_key = Some(key.value);
            updated.key_expires_at = key.expires_at;
            updated.completed = true;
        }

        match self
            .store
            .compare_and_swap(token, session.current_step, updated.clone())?
        {
            CasOutcome::Committed => {
                info!("Session {} advanced to step {}/{}", token, step, updated.total_steps);
                if updated.completed {
                    self.tokens.revoke_session(token);
                    self.drop_advance_lock(token);
                }
                Ok(updated.snapshot())
            }
            // A store shared across instances can lose the race to a retried
            // signal; the already-advanced row is the idempotent answer.
            CasOutcome::Conflict(live) if live.current_step >= step => {
                if updated.generated_key.is_some() && updated.generated_key != live.generated_key {
                    warn!(
                        "Session {} lost the final-step commit race; minted key will never be redeemed",
                        token
                    );
                }
                Ok(live.snapshot())
            }
            CasOutcome::Conflict(_) => {
                Err(GateError::Internal("concurrent session update".to_string()))
            }
            CasOutcome::Missing => Err(GateError::SessionExpired),
        }
    }

    /// Returns the session's read-only snapshot. Side-effect free and safe
    /// for high-frequency polling; never takes the advance lock and does not
    /// refresh the inactivity TTL.
    ///
    /// # Errors
    ///
    /// Fails `NotFound` if the session is gone or past its TTL.
    pub fn status(&self, token: &SessionToken) -> GateResult<SessionSnapshot> {
        let session = self
            .load_live(token, Utc::now())?
            .ok_or(GateError::NotFound)?;
        Ok(session.snapshot())
    }

    /// Invalidates a session and revokes all its outstanding tokens.
    /// Every further call with the old token fails terminally; a fresh
    /// `start` is required to obtain a usable session.
    ///
    /// # Errors
    ///
    /// Fails `NotFound` if the token is unknown.
    pub fn reset(&self, token: &SessionToken) -> GateResult<()> {
        let lock = self.advance_lock(token);
        let guard = lock.lock().unwrap();

        let removed = self.store.remove(token)?;
        self.tokens.revoke_session(token);
        drop(guard);
        self.drop_advance_lock(token);

        if removed.is_none() {
            return Err(GateError::NotFound);
        }
        info!("Session {} reset", token);
        Ok(())
    }

    // ── Internals ────────────────────────────────────────────────

    /// Loads the session if it exists and is within its inactivity TTL.
    fn load_live(
        &self,
        token: &SessionToken,
        now: DateTime<Utc>,
    ) -> GateResult<Option<Arc<Session>>> {
        let Some(session) = self.store.load(token)? else {
            return Ok(None);
        };
        if session.is_expired(now, self.config.session_ttl) {
            debug!("Session {} past inactivity TTL", token);
            return Ok(None);
        }
        Ok(Some(session))
    }

    /// Looks up a checkpoint spec that a live session must have.
    fn checkpoint_spec(&self, script_id: &ScriptId, step: u32) -> GateResult<&CheckpointSpec> {
        self.registry.checkpoint(script_id, step).ok_or_else(|| {
            GateError::Internal(format!(
                "script '{script_id}' has no checkpoint {step} in the registry"
            ))
        })
    }

    /// Composes the gateway callback URL a provider sends the user back to.
    fn callback_url(&self, token: &SessionToken, step: u32, minted: Option<&str>) -> String {
        let mut url = format!(
            "{}?session_token={}&step={}",
            self.config.callback_base, token, step
        );
        if let Some(value) = minted {
            url.push_str("&token=");
            url.push_str(value);
        }
        url
    }

    /// Returns the per-session advance lock, creating it on first use.
    fn advance_lock(&self, token: &SessionToken) -> Arc<Mutex<()>> {
        self.advance_locks
            .lock()
            .unwrap()
            .entry(*token)
            .or_default()
            .clone()
    }

    /// Forgets a session's advance lock once the session can no longer
    /// advance. Waiters holding a clone of the lock still finish; they
    /// observe the dead session and take the same path.
    fn drop_advance_lock(&self, token: &SessionToken) {
        self.advance_locks.lock().unwrap().remove(token);
    }
}
