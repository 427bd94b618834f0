//! Shared test helpers for session tests.

#![allow(dead_code)]

use shadowauth_keys::MemoryKeyStore;
use shadowauth_registry::{CheckpointSpec, Registry, ScriptEntry};
use shadowauth_session::{MemorySessionStore, SessionConfig, SessionManager};
use shadowauth_types::ScriptId;
use std::sync::Arc;

/// A manager wired to in-memory stores the test can inspect.
pub struct TestGate {
    pub manager: SessionManager,
    pub sessions: Arc<MemorySessionStore>,
    pub keys: Arc<MemoryKeyStore>,
}

/// Registry with three scripts:
/// - `"gated"`: 2 steps, the first anti-bypass flagged
/// - `"trio"`: 3 steps, none flagged
/// - `"draft"`: zero checkpoints
pub fn test_registry() -> Registry {
    let mut registry = Registry::new();
    registry
        .insert(ScriptEntry {
            script_id: ScriptId::parse("gated").unwrap(),
            name: "Gated Script".to_string(),
            checkpoints: vec![
                CheckpointSpec {
                    order: 1,
                    provider: "direct".to_string(),
                    url_template: "https://ads.example/one".to_string(),
                    anti_bypass: true,
                },
                CheckpointSpec {
                    order: 2,
                    provider: "direct".to_string(),
                    url_template: "https://ads.example/two".to_string(),
                    anti_bypass: false,
                },
            ],
        })
        .unwrap();
    registry
        .insert(ScriptEntry {
            script_id: ScriptId::parse("trio").unwrap(),
            name: "Three Steps".to_string(),
            checkpoints: (1..=3)
                .map(|order| CheckpointSpec {
                    order,
                    provider: "direct".to_string(),
                    url_template: format!("https://ads.example/trio/{order}"),
                    anti_bypass: false,
                })
                .collect(),
        })
        .unwrap();
    registry
        .insert(ScriptEntry {
            script_id: ScriptId::parse("draft").unwrap(),
            name: "Unconfigured".to_string(),
            checkpoints: vec![],
        })
        .unwrap();
    registry
}

pub fn gate() -> TestGate {
    gate_with(SessionConfig::default())
}

pub fn gate_with(config: SessionConfig) -> TestGate {
    let sessions = Arc::new(MemorySessionStore::new());
    let keys = Arc::new(MemoryKeyStore::new());
    let manager = SessionManager::new(
        Arc::new(test_registry()),
        sessions.clone(),
        keys.clone(),
        config,
    );
    TestGate {
        manager,
        sessions,
        keys,
    }
}

pub fn script(id: &str) -> ScriptId {
    ScriptId::parse(id).unwrap()
}

/// Pulls the anti-bypass token value out of a placeholder-adapter URL.
pub fn token_from_url(url: &str) -> String {
    url.split(['?', '&'])
        .find_map(|pair| pair.strip_prefix("token="))
        .expect("redirect URL should carry a token parameter")
        .to_string()
}
