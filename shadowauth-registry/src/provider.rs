//! Provider redirect-URL composition.
//!
//! Different ad-link providers take the callback destination in different
//! parameter shapes, so URL composition sits behind a small strategy trait
//! keyed by `CheckpointSpec.provider` instead of branching inside the
//! session manager.

use crate::registry::CheckpointSpec;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use shadowauth_types::SessionToken;
use std::collections::HashMap;
use std::sync::Arc;

/// Everything an adapter needs to compose a provider redirect URL.
#[derive(Debug, Clone)]
pub struct RedirectContext {
    pub session_token: SessionToken,
    /// 1-based step the redirect covers.
    pub step: u32,
    /// Single-use token minted for anti-bypass steps; `None` otherwise.
    pub anti_bypass_token: Option<String>,
    /// Fully composed gateway URL the provider should send the user back to.
    pub callback_url: String,
}

/// Strategy for composing one provider's redirect URL.
pub trait ProviderAdapter: Send + Sync {
    fn redirect_url(&self, spec: &CheckpointSpec, ctx: &RedirectContext) -> String;
}

/// Default adapter: substitutes `{session}`, `{step}`, `{token}` and
/// `{callback}` placeholders in the URL template. Values not consumed by a
/// placeholder are appended as URL-encoded query parameters (`sid`, `step`,
/// `token`).
#[derive(Debug, Default)]
pub struct PlaceholderAdapter;

impl ProviderAdapter for PlaceholderAdapter {
    fn redirect_url(&self, spec: &CheckpointSpec, ctx: &RedirectContext) -> String {
        let mut url = spec.url_template.clone();
        let mut extras: Vec<(&str, String)> = Vec::new();

        let session = ctx.session_token.to_string();
        if url.contains("{session}") {
            url = url.replace("{session}", &session);
        } else {
            extras.push(("sid", session));
        }

        let step = ctx.step.to_string();
        if url.contains("{step}") {
            url = url.replace("{step}", &step);
        } else {
            extras.push(("step", step));
        }

        match &ctx.anti_bypass_token {
            Some(token) => {
                if url.contains("{token}") {
                    url = url.replace("{token}", token);
                } else {
                    extras.push(("token", token.clone()));
                }
            }
            // Template may still carry the placeholder for a non-flagged step.
            None => url = url.replace("{token}", ""),
        }

        if url.contains("{callback}") {
            url = url.replace("{callback}", &urlencoding::encode(&ctx.callback_url));
        }

        for (name, value) in extras {
            let sep = if url.contains('?') { '&' } else { '?' };
            url.push(sep);
            url.push_str(name);
            url.push('=');
            url.push_str(&urlencoding::encode(&value));
        }

        url
    }
}

/// Adapter for providers that take a base64url-encoded destination in a
/// single query parameter (the linkvertise/lootlabs shape).
#[derive(Debug)]
pub struct EncodedRedirectAdapter {
    /// Name of the query parameter carrying the encoded destination.
    pub param: String,
}

impl EncodedRedirectAdapter {
    #[must_use]
    pub fn new(param: impl Into<String>) -> Self {
        Self {
            param: param.into(),
        }
    }
}

impl ProviderAdapter for EncodedRedirectAdapter {
    fn redirect_url(&self, spec: &CheckpointSpec, ctx: &RedirectContext) -> String {
        let encoded = URL_SAFE_NO_PAD.encode(ctx.callback_url.as_bytes());
        let sep = if spec.url_template.contains('?') {
            '&'
        } else {
            '?'
        };
        format!("{}{}{}={}", spec.url_template, sep, self.param, encoded)
    }
}

/// Adapter registry keyed by provider name (case-insensitive), with a
/// fallback for providers that have no dedicated adapter.
pub struct ProviderAdapters {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
    fallback: Arc<dyn ProviderAdapter>,
}

impl ProviderAdapters {
    /// Creates a registry with only the placeholder fallback.
    #[must_use]
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
            fallback: Arc::new(PlaceholderAdapter),
        }
    }

    /// Creates a registry with the known encoded-redirect providers wired up.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut adapters = Self::new();
        adapters.register("linkvertise", Arc::new(EncodedRedirectAdapter::new("r")));
        adapters.register("lootlabs", Arc::new(EncodedRedirectAdapter::new("data")));
        adapters
    }

    /// Registers (or replaces) an adapter for a provider name.
    pub fn register(&mut self, provider: impl Into<String>, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters
            .insert(provider.into().to_lowercase(), adapter);
    }

    /// Resolves the adapter for a provider name, falling back to the
    /// placeholder adapter.
    #[must_use]
    pub fn resolve(&self, provider: &str) -> &dyn ProviderAdapter {
        self.adapters
            .get(&provider.to_lowercase())
            .map_or(self.fallback.as_ref(), |a| a.as_ref())
    }
}

impl Default for ProviderAdapters {
    fn default() -> Self {
        Self::with_defaults()
    }
}
