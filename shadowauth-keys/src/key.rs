//! The issued-key row and its status evaluation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use shadowauth_types::ScriptId;

/// How long an issued key stays valid.
///
/// Checkpoint-earned keys default to `Daily`; the longer variants exist
/// because the same store shape carries subscription keys issued by the
/// external billing subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyDuration {
    /// 24 hours.
    Daily,
    /// 7 days.
    Weekly,
    /// 30 days.
    Monthly,
    /// Never expires.
    Lifetime,
}

impl KeyDuration {
    /// Returns the validity window, or `None` for lifetime keys.
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        match self {
            Self::Daily => Some(Duration::hours(24)),
            Self::Weekly => Some(Duration::days(7)),
            Self::Monthly => Some(Duration::days(30)),
            Self::Lifetime => None,
        }
    }
}

/// The current status of an issued key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    /// Key is valid.
    Active,
    /// Key is past its expiry timestamp.
    Expired,
    /// Key has been banned. Wins over expiry.
    Banned,
}

/// One row in the shared key store.
///
/// `hwid` and `banned` are written by the downstream validation subsystem
/// after issuance; this crate only carries the fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedKey {
    /// Globally unique key value handed to the user.
    pub value: String,
    /// Script the key grants access to.
    pub script_id: ScriptId,
    /// Validity class the key was minted with.
    pub duration: KeyDuration,
    pub issued_at: DateTime<Utc>,
    /// `None` means a lifetime key.
    pub expires_at: Option<DateTime<Utc>>,
    /// Hardware ID bound on first validation use; `None` until then.
    pub hwid: Option<String>,
    #[serde(default)]
    pub banned: bool,
}

impl IssuedKey {
    /// Evaluates the key's status at a given instant.
    #[must_use]
    pub fn status(&self, now: DateTime<Utc>) -> KeyStatus {
        if self.banned {
            return KeyStatus::Banned;
        }
        match self.expires_at {
            Some(expires_at) if now >= expires_at => KeyStatus::Expired,
            _ => KeyStatus::Active,
        }
    }
}
