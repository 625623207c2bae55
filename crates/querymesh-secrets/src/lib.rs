//! Secret resolution for `${scheme:key}` references (spec §4.2).
//!
//! Datasource connection configuration may contain strings of the form
//! `${scheme:key}` (e.g. `${env:PG_PASSWORD}`, `${aws-sm:prod/db/password}`).
//! A [`SecretResolver`] resolves these through an ordered chain of
//! [`SecretProvider`]s, keyed by `scheme`. Resolved values are wrapped in
//! [`Secret`], an opaque type whose `Debug`/`Display` never leak plaintext —
//! mirroring the original Python implementation's `pydantic.SecretStr`
//! wrapping in `datasources/registry.py`'s `resolved_connection`.

use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use thiserror::Error;

/// Errors produced while resolving a secret reference.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SecretError {
    /// The input did not match the `${scheme:key}` grammar.
    #[error("not a secret reference: {0}")]
    NotAReference(String),
    /// No provider is registered for `scheme`.
    #[error("no secret provider registered for scheme '{0}'")]
    UnknownScheme(String),
    /// The provider for `scheme` failed to resolve `key`.
    #[error("provider '{scheme}' failed to resolve key '{key}': {message}")]
    ProviderFailed {
        /// The scheme that failed.
        scheme: String,
        /// The key that failed to resolve.
        key: String,
        /// A safe (non-plaintext) failure message.
        message: String,
    },
}

/// An opaque, resolved secret value.
///
/// `Debug` and `Display` are intentionally redacting: printing or logging a
/// `Secret` can never reveal its plaintext (spec §4.2: "never included in
/// audit logs or error messages").
#[derive(Clone)]
pub struct Secret(Arc<str>);

impl Secret {
    /// Wraps a plaintext value.
    pub fn new(value: impl Into<Arc<str>>) -> Self {
        Self(value.into())
    }

    /// Exposes the plaintext value. Callers MUST NOT pass the result to a
    /// logger, error message, or audit record.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "***")
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

/// A single backend capable of resolving keys under one or more schemes,
/// e.g. `env`, `aws-sm`, `vault`.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    /// The scheme this provider answers for (the part before `:` in
    /// `${scheme:key}`).
    fn scheme(&self) -> &str;

    /// Resolves `key` to a plaintext value.
    async fn resolve(&self, key: &str) -> Result<String, String>;
}

/// Resolves `${ENVVAR}` (bare, scheme-less) and `${env:KEY}` from the
/// process environment. This is the only provider permitted to bootstrap
/// other providers' own configuration (spec §4.2: "provider configurations
/// are themselves permitted to reference other resolvable secrets
/// (bootstrapped through `env` only)").
#[derive(Default)]
pub struct EnvSecretProvider;

#[async_trait]
impl SecretProvider for EnvSecretProvider {
    fn scheme(&self) -> &str {
        "env"
    }

    async fn resolve(&self, key: &str) -> Result<String, String> {
        std::env::var(key).map_err(|_| format!("environment variable '{key}' not set"))
    }
}

/// A fixed-map provider, useful for tests and for the `querymesh-testing`
/// harness.
#[derive(Default)]
pub struct StaticSecretProvider {
    scheme: String,
    values: HashMap<String, String>,
}

impl StaticSecretProvider {
    /// Builds a provider for `scheme` backed by an in-memory map.
    pub fn new(scheme: impl Into<String>, values: HashMap<String, String>) -> Self {
        Self {
            scheme: scheme.into(),
            values,
        }
    }
}

#[async_trait]
impl SecretProvider for StaticSecretProvider {
    fn scheme(&self) -> &str {
        &self.scheme
    }

    async fn resolve(&self, key: &str) -> Result<String, String> {
        self.values
            .get(key)
            .cloned()
            .ok_or_else(|| format!("key '{key}' not present"))
    }
}

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\$\{([a-zA-Z0-9_-]+):(.+)\}$").expect("valid regex"))
}

/// Returns `true` if `value` matches the `${scheme:key}` grammar.
pub fn is_secret_reference(value: &str) -> bool {
    reference_pattern().is_match(value)
}

/// Resolves `${scheme:key}` references through a chain of [`SecretProvider`]s.
pub struct SecretResolver {
    providers: HashMap<String, Arc<dyn SecretProvider>>,
}

impl Default for SecretResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretResolver {
    /// Builds an empty resolver; register providers with [`Self::register`].
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Builds a resolver with the `env` provider pre-registered — the
    /// minimum viable chain per spec §4.2's bootstrap rule.
    pub fn with_env_bootstrap() -> Self {
        let mut resolver = Self::new();
        resolver.register(Arc::new(EnvSecretProvider));
        resolver
    }

    /// Registers (or replaces) the provider for its scheme.
    pub fn register(&mut self, provider: Arc<dyn SecretProvider>) {
        self.providers.insert(provider.scheme().to_string(), provider);
    }

    /// Resolves a single `${scheme:key}` string to an opaque [`Secret`].
    pub async fn resolve(&self, reference: &str) -> Result<Secret, SecretError> {
        let captures = reference_pattern()
            .captures(reference)
            .ok_or_else(|| SecretError::NotAReference(reference.to_string()))?;
        let scheme = &captures[1];
        let key = &captures[2];

        let provider = self
            .providers
            .get(scheme)
            .ok_or_else(|| SecretError::UnknownScheme(scheme.to_string()))?;

        provider
            .resolve(key)
            .await
            .map(Secret::new)
            .map_err(|message| SecretError::ProviderFailed {
                scheme: scheme.to_string(),
                key: key.to_string(),
                message,
            })
    }

    /// Resolves every `${...}` value in a flat connection-config map,
    /// leaving non-reference values untouched. Mirrors
    /// `datasources/registry.py`'s `resolved_connection`.
    pub async fn resolve_map(
        &self,
        config: &HashMap<String, String>,
    ) -> Result<HashMap<String, Secret>, SecretError> {
        let mut out = HashMap::with_capacity(config.len());
        for (k, v) in config {
            let secret = if is_secret_reference(v) {
                self.resolve(v).await?
            } else {
                Secret::new(v.clone())
            };
            out.insert(k.clone(), secret);
        }
        Ok(out)
    }
}
