//! Model and credential configuration.
//!
//! [`WatsonxConfig`] holds everything a caller may pass explicitly. Missing
//! credentials are looked up once, when the model is constructed, through an
//! [`EnvSource`]: [`ProcessEnv`] in production, a `HashMap` in tests.
//!
//! ```rust
//! use std::collections::HashMap;
//! use watsonx_chat::config::WatsonxConfig;
//!
//! let env: HashMap<String, String> =
//!     [("WATSONX_APIKEY".to_string(), "key".to_string())].into_iter().collect();
//!
//! let credentials = WatsonxConfig::new("ibm/granite-13b-chat-v2")
//!     .with_url("https://us-south.ml.cloud.ibm.com")
//!     .with_project_id("my-project")
//!     .resolve(&env)
//!     .unwrap();
//! assert_eq!(credentials.apikey.unwrap().expose(), "key");
//! ```

use crate::error::{Result, WatsonxError};
use crate::params::GenerationParams;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Environment variable for the service url.
pub const WATSONX_URL: &str = "WATSONX_URL";
/// Environment variable for the api key.
pub const WATSONX_APIKEY: &str = "WATSONX_APIKEY";
/// Environment variable for a CPD bearer token.
pub const WATSONX_TOKEN: &str = "WATSONX_TOKEN";
/// Environment variable for a CPD password.
pub const WATSONX_PASSWORD: &str = "WATSONX_PASSWORD";
/// Environment variable for a CPD username.
pub const WATSONX_USERNAME: &str = "WATSONX_USERNAME";
/// Environment variable for a CPD instance id.
pub const WATSONX_INSTANCE_ID: &str = "WATSONX_INSTANCE_ID";

/// Marker identifying IBM Cloud urls, which authenticate with an api key.
const CLOUD_HOST_MARKER: &str = "cloud.ibm.com";

/// Map of constructor field names to the environment variables they fall
/// back to.
pub fn secret_env_vars() -> BTreeMap<&'static str, &'static str> {
    BTreeMap::from([
        ("url", WATSONX_URL),
        ("apikey", WATSONX_APIKEY),
        ("token", WATSONX_TOKEN),
        ("password", WATSONX_PASSWORD),
        ("username", WATSONX_USERNAME),
        ("instance_id", WATSONX_INSTANCE_ID),
    ])
}

/// A credential value that never shows up in `Debug` or `Display` output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The wrapped value. Avoid logging it.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// TLS verification setting handed to the inference client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsVerify {
    /// Leave the decision to the client.
    #[default]
    Unset,
    /// Verify against the default trust store.
    Enabled,
    /// Skip verification.
    Disabled,
    /// Path to a CA bundle file or a directory of trusted certificates.
    CaPath(String),
}

/// Source of environment variables.
pub trait EnvSource {
    fn var(&self, key: &str) -> Option<String>;
}

/// Reads the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Explicit value first, then the environment.
fn explicit_or_env(
    explicit: &Option<Secret>,
    env: &dyn EnvSource,
    key: &str,
) -> Option<Secret> {
    explicit
        .clone()
        .or_else(|| env.var(key).filter(|v| !v.is_empty()).map(Secret::from))
}

fn require(value: Option<Secret>, field: &str, key: &str) -> Result<Secret> {
    value.ok_or_else(|| {
        WatsonxError::Configuration(format!(
            "Did not find '{}', please add an environment variable `{}` which contains it, \
             or pass '{}' as a named parameter.",
            field, key, field
        ))
    })
}

/// Configuration of a watsonx chat model.
#[derive(Debug, Clone, Default)]
pub struct WatsonxConfig {
    /// Foundation model id, e.g. `meta-llama/llama-3-1-70b-instruct`.
    pub model_id: String,
    /// Deployed model id, used instead of `model_id` for deployments.
    pub deployment_id: String,
    pub project_id: String,
    pub space_id: String,
    pub url: Option<Secret>,
    pub apikey: Option<Secret>,
    pub token: Option<Secret>,
    pub password: Option<Secret>,
    pub username: Option<Secret>,
    pub instance_id: Option<Secret>,
    pub version: Option<Secret>,
    pub verify: TlsVerify,
    /// Generate by aggregating the streaming endpoint.
    pub streaming: bool,
    /// Default generation parameters, overridden per call.
    pub params: GenerationParams,
}

impl WatsonxConfig {
    /// Create a configuration for a foundation model.
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            ..Self::default()
        }
    }

    /// Create a configuration for a deployed model.
    pub fn for_deployment(deployment_id: impl Into<String>) -> Self {
        Self {
            deployment_id: deployment_id.into(),
            ..Self::default()
        }
    }

    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = project_id.into();
        self
    }

    pub fn with_space_id(mut self, space_id: impl Into<String>) -> Self {
        self.space_id = space_id.into();
        self
    }

    pub fn with_url(mut self, url: impl Into<Secret>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_apikey(mut self, apikey: impl Into<Secret>) -> Self {
        self.apikey = Some(apikey.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<Secret>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<Secret>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_username(mut self, username: impl Into<Secret>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_instance_id(mut self, instance_id: impl Into<Secret>) -> Self {
        self.instance_id = Some(instance_id.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<Secret>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_verify(mut self, verify: TlsVerify) -> Self {
        self.verify = verify;
        self
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    /// Resolve credentials, falling back to the environment.
    ///
    /// IBM Cloud urls need an api key. Other (CPD) urls need a token, a
    /// password with username, or an api key with username, checked in that
    /// order, plus an instance id.
    ///
    /// # Errors
    ///
    /// [`WatsonxError::Configuration`] naming the first missing field.
    pub fn resolve(&self, env: &dyn EnvSource) -> Result<Credentials> {
        let url = require(explicit_or_env(&self.url, env, WATSONX_URL), "url", WATSONX_URL)?;

        let mut credentials = Credentials {
            url,
            apikey: self.apikey.clone(),
            token: self.token.clone(),
            password: self.password.clone(),
            username: self.username.clone(),
            instance_id: self.instance_id.clone(),
            version: self.version.clone(),
            verify: self.verify.clone(),
        };

        if credentials.is_cloud() {
            credentials.apikey = Some(require(
                explicit_or_env(&self.apikey, env, WATSONX_APIKEY),
                "apikey",
                WATSONX_APIKEY,
            )?);
            return Ok(credentials);
        }

        let token = explicit_or_env(&self.token, env, WATSONX_TOKEN);
        let password = explicit_or_env(&self.password, env, WATSONX_PASSWORD);
        let apikey = explicit_or_env(&self.apikey, env, WATSONX_APIKEY);

        if token.is_some() {
            credentials.token = token;
        } else if password.is_some() {
            credentials.password = password;
            credentials.username = Some(require(
                explicit_or_env(&self.username, env, WATSONX_USERNAME),
                "username",
                WATSONX_USERNAME,
            )?);
        } else if apikey.is_some() {
            credentials.apikey = apikey;
            credentials.username = Some(require(
                explicit_or_env(&self.username, env, WATSONX_USERNAME),
                "username",
                WATSONX_USERNAME,
            )?);
        } else {
            return Err(WatsonxError::Configuration(format!(
                "Did not find 'token', 'password' or 'apikey', please add an environment \
                 variable `{}`, `{}` or `{}` which contains it, or pass 'token', 'password' \
                 or 'apikey' as a named parameter.",
                WATSONX_TOKEN, WATSONX_PASSWORD, WATSONX_APIKEY
            )));
        }

        credentials.instance_id = Some(require(
            explicit_or_env(&self.instance_id, env, WATSONX_INSTANCE_ID),
            "instance_id",
            WATSONX_INSTANCE_ID,
        )?);

        Ok(credentials)
    }
}

/// Credentials after resolution, ready to build an inference client.
#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub url: Secret,
    pub apikey: Option<Secret>,
    pub token: Option<Secret>,
    pub password: Option<Secret>,
    pub username: Option<Secret>,
    pub instance_id: Option<Secret>,
    pub version: Option<Secret>,
    pub verify: TlsVerify,
}

impl Credentials {
    /// Whether the url points at IBM Cloud rather than a CPD cluster.
    pub fn is_cloud(&self) -> bool {
        self.url.expose().contains(CLOUD_HOST_MARKER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_secret_is_redacted() {
        let secret = Secret::new("super-secret");
        assert_eq!(format!("{:?}", secret), "[REDACTED]");
        assert_eq!(secret.to_string(), "[REDACTED]");
        assert_eq!(secret.expose(), "super-secret");

        let config = WatsonxConfig::new("m").with_apikey("super-secret");
        assert!(!format!("{:?}", config).contains("super-secret"));
    }

    #[test]
    fn test_url_required() {
        let err = WatsonxConfig::new("m").resolve(&env(&[])).unwrap_err();
        assert!(matches!(err, WatsonxError::Configuration(ref m) if m.contains("url")));
    }

    #[test]
    fn test_cloud_requires_apikey() {
        let config = WatsonxConfig::new("m").with_url("https://us-south.ml.cloud.ibm.com");
        let err = config.resolve(&env(&[])).unwrap_err();
        assert!(matches!(err, WatsonxError::Configuration(ref m) if m.contains("apikey")));

        let credentials = config.resolve(&env(&[(WATSONX_APIKEY, "k")])).unwrap();
        assert!(credentials.is_cloud());
        assert_eq!(credentials.apikey.unwrap().expose(), "k");
        assert!(credentials.instance_id.is_none());
    }

    #[test]
    fn test_explicit_wins_over_env() {
        let config = WatsonxConfig::new("m")
            .with_url("https://us-south.ml.cloud.ibm.com")
            .with_apikey("explicit");
        let credentials = config.resolve(&env(&[(WATSONX_APIKEY, "from-env")])).unwrap();
        assert_eq!(credentials.apikey.unwrap().expose(), "explicit");
    }

    #[test]
    fn test_cpd_token() {
        let credentials = WatsonxConfig::new("m")
            .resolve(&env(&[
                (WATSONX_URL, "https://cpd.example.com"),
                (WATSONX_TOKEN, "t"),
                (WATSONX_INSTANCE_ID, "openshift"),
            ]))
            .unwrap();
        assert!(!credentials.is_cloud());
        assert_eq!(credentials.token.unwrap().expose(), "t");
        assert_eq!(credentials.instance_id.unwrap().expose(), "openshift");
    }

    #[test]
    fn test_cpd_password_needs_username() {
        let config = WatsonxConfig::new("m")
            .with_url("https://cpd.example.com")
            .with_password("p")
            .with_instance_id("openshift");
        let err = config.resolve(&env(&[])).unwrap_err();
        assert!(matches!(err, WatsonxError::Configuration(ref m) if m.contains("username")));

        let credentials = config.resolve(&env(&[(WATSONX_USERNAME, "admin")])).unwrap();
        assert_eq!(credentials.username.unwrap().expose(), "admin");
    }

    #[test]
    fn test_cpd_without_any_secret() {
        let err = WatsonxConfig::new("m")
            .with_url("https://cpd.example.com")
            .resolve(&env(&[]))
            .unwrap_err();
        assert!(err.to_string().contains("'token', 'password' or 'apikey'"));
    }

    #[test]
    fn test_cpd_requires_instance_id() {
        let err = WatsonxConfig::new("m")
            .with_url("https://cpd.example.com")
            .with_apikey("k")
            .with_username("admin")
            .resolve(&env(&[]))
            .unwrap_err();
        assert!(matches!(err, WatsonxError::Configuration(ref m) if m.contains("instance_id")));
    }

    #[test]
    fn test_secret_env_vars() {
        let vars = secret_env_vars();
        assert_eq!(vars.len(), 6);
        assert_eq!(vars["instance_id"], WATSONX_INSTANCE_ID);
    }
}
