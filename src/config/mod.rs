//! Configuration system (layered: defaults < config file < env < flags).

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{KubeAgentError, Result};

pub const DEFAULT_MODEL: &str = "gpt-4";
pub const DEFAULT_MAX_STEPS: usize = 15;
pub const DEFAULT_MODEL_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 8 * 1024;
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-10-21";

const CONFIG_FILE_NAME: &str = "config.toml";

/// Credentials for the chat-completion backend.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    OpenAi {
        api_key: String,
        base_url: Option<String>,
    },
    Azure {
        api_key: String,
        endpoint: String,
        api_version: String,
    },
}

impl Credentials {
    pub fn provider_name(&self) -> &'static str {
        match self {
            Self::OpenAi { .. } => "openai",
            Self::Azure { .. } => "azure",
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAi { base_url, .. } => f
                .debug_struct("OpenAi")
                .field("api_key", &"..")
                .field("base_url", base_url)
                .finish(),
            Self::Azure {
                endpoint,
                api_version,
                ..
            } => f
                .debug_struct("Azure")
                .field("api_key", &"..")
                .field("endpoint", endpoint)
                .field("api_version", api_version)
                .finish(),
        }
    }
}

/// Fully resolved configuration, built once at process start.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub credentials: Credentials,
    pub model: String,
    pub max_steps: usize,
    pub model_max_attempts: u32,
    pub max_output_bytes: usize,
    pub tool_timeout: Duration,
    pub scan_timeout: Duration,
    pub request_timeout: Duration,
}

/// On-disk configuration. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub model: Option<String>,
    pub max_steps: Option<usize>,
    pub model_max_attempts: Option<u32>,
    pub max_output_bytes: Option<usize>,
    pub tool_timeout_secs: Option<u64>,
    pub scan_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub base_url: Option<String>,
    pub azure_api_version: Option<String>,
}

impl FileConfig {
    /// `$XDG_CONFIG_HOME/kube-agent/config.toml` (or the platform equivalent).
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "kube-agent")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| KubeAgentError::Configuration(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            KubeAgentError::Configuration(format!("{}: {e}", path.display()))
        })?;
        Self::parse(&text)
    }

    /// Load an explicit path, or the default path when it exists.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.is_file() => {
                tracing::debug!(path = %path.display(), "loading config file");
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }
}

impl AgentConfig {
    /// Build from the process environment and an optional config file.
    pub fn from_env(config_path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let file = FileConfig::discover(config_path)?;
        Self::resolve(file, |key| std::env::var(key).ok())
    }

    /// Merge a file config with an environment lookup.
    ///
    /// Azure is selected when `OPENAI_API_TYPE=azure` or a non-empty
    /// `AZURE_OPENAI_API_KEY` is present.
    pub fn resolve<F>(file: FileConfig, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let azure_key = non_empty("AZURE_OPENAI_API_KEY");
        let wants_azure = env("OPENAI_API_TYPE")
            .map(|t| t.eq_ignore_ascii_case("azure"))
            .unwrap_or(false)
            || azure_key.is_some();

        let credentials = if wants_azure {
            let api_key = azure_key.ok_or_else(|| {
                KubeAgentError::Configuration("Missing AZURE_OPENAI_API_KEY".into())
            })?;
            let endpoint = non_empty("AZURE_OPENAI_ENDPOINT").ok_or_else(|| {
                KubeAgentError::Configuration("Missing AZURE_OPENAI_ENDPOINT".into())
            })?;
            let api_version = non_empty("AZURE_OPENAI_API_VERSION")
                .or(file.azure_api_version.clone())
                .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string());
            Credentials::Azure {
                api_key,
                endpoint,
                api_version,
            }
        } else {
            let api_key = non_empty("OPENAI_API_KEY").ok_or_else(|| {
                KubeAgentError::Configuration(
                    "Missing OPENAI_API_KEY (or AZURE_OPENAI_API_KEY and AZURE_OPENAI_ENDPOINT)"
                        .into(),
                )
            })?;
            Credentials::OpenAi {
                api_key,
                base_url: non_empty("OPENAI_API_BASE").or(file.base_url.clone()),
            }
        };

        let config = Self {
            credentials,
            model: file.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_steps: file.max_steps.unwrap_or(DEFAULT_MAX_STEPS),
            model_max_attempts: file
                .model_max_attempts
                .unwrap_or(DEFAULT_MODEL_MAX_ATTEMPTS),
            max_output_bytes: file.max_output_bytes.unwrap_or(DEFAULT_MAX_OUTPUT_BYTES),
            tool_timeout: file
                .tool_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_TOOL_TIMEOUT),
            scan_timeout: file
                .scan_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_SCAN_TIMEOUT),
            request_timeout: file
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
        };
        config.validate()?;
        Ok(config)
    }

    /// Config for tests and embedders that already hold credentials.
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            model: DEFAULT_MODEL.to_string(),
            max_steps: DEFAULT_MAX_STEPS,
            model_max_attempts: DEFAULT_MODEL_MAX_ATTEMPTS,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.max_steps == 0 {
            return Err(KubeAgentError::Configuration(
                "max_steps must be at least 1".into(),
            ));
        }
        if self.model_max_attempts == 0 {
            return Err(KubeAgentError::Configuration(
                "model_max_attempts must be at least 1".into(),
            ));
        }
        if self.max_output_bytes == 0 {
            return Err(KubeAgentError::Configuration(
                "max_output_bytes must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn openai_key_selects_openai_backend() {
        let config =
            AgentConfig::resolve(FileConfig::default(), env(&[("OPENAI_API_KEY", "sk-test")]))
                .unwrap();

        assert_eq!(
            config.credentials,
            Credentials::OpenAi {
                api_key: "sk-test".into(),
                base_url: None,
            }
        );
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.max_steps, DEFAULT_MAX_STEPS);
    }

    #[test]
    fn azure_key_takes_precedence_over_openai_key() {
        let config = AgentConfig::resolve(
            FileConfig::default(),
            env(&[
                ("OPENAI_API_KEY", "sk-test"),
                ("AZURE_OPENAI_API_KEY", "az-key"),
                ("AZURE_OPENAI_ENDPOINT", "https://res.openai.azure.com"),
            ]),
        )
        .unwrap();

        assert_eq!(
            config.credentials,
            Credentials::Azure {
                api_key: "az-key".into(),
                endpoint: "https://res.openai.azure.com".into(),
                api_version: DEFAULT_AZURE_API_VERSION.into(),
            }
        );
    }

    #[test]
    fn empty_azure_key_falls_back_to_openai() {
        let config = AgentConfig::resolve(
            FileConfig::default(),
            env(&[("OPENAI_API_KEY", "sk-test"), ("AZURE_OPENAI_API_KEY", "")]),
        )
        .unwrap();

        assert_eq!(config.credentials.provider_name(), "openai");
    }

    #[test]
    fn azure_type_without_endpoint_is_configuration_error() {
        let err = AgentConfig::resolve(
            FileConfig::default(),
            env(&[("OPENAI_API_TYPE", "azure"), ("AZURE_OPENAI_API_KEY", "k")]),
        )
        .unwrap_err();

        assert!(matches!(err, KubeAgentError::Configuration(ref m) if m.contains("ENDPOINT")));
    }

    #[test]
    fn missing_credentials_is_configuration_error() {
        let err = AgentConfig::resolve(FileConfig::default(), env(&[])).unwrap_err();
        assert!(matches!(err, KubeAgentError::Configuration(_)));
    }

    #[test]
    fn file_values_override_defaults_and_env_overrides_file_base_url() {
        let file = FileConfig::parse(
            r#"
model = "gpt-4o"
max_steps = 4
tool_timeout_secs = 5
max_output_bytes = 1024
base_url = "https://file.example/v1"
"#,
        )
        .unwrap();

        let config = AgentConfig::resolve(
            file,
            env(&[
                ("OPENAI_API_KEY", "sk"),
                ("OPENAI_API_BASE", "https://env.example/v1"),
            ]),
        )
        .unwrap();

        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.max_steps, 4);
        assert_eq!(config.tool_timeout, Duration::from_secs(5));
        assert_eq!(config.max_output_bytes, 1024);
        assert_eq!(
            config.credentials,
            Credentials::OpenAi {
                api_key: "sk".into(),
                base_url: Some("https://env.example/v1".into()),
            }
        );
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        assert!(FileConfig::parse("max_stepz = 3").is_err());
    }

    #[test]
    fn zero_max_steps_is_rejected() {
        let file = FileConfig {
            max_steps: Some(0),
            ..Default::default()
        };
        let err = AgentConfig::resolve(file, env(&[("OPENAI_API_KEY", "sk")])).unwrap_err();
        assert!(matches!(err, KubeAgentError::Configuration(_)));
    }

    #[test]
    fn load_reads_toml_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "model = \"gpt-4o-mini\"\n").unwrap();

        let file = FileConfig::discover(Some(&path)).unwrap();

        assert_eq!(file.model.as_deref(), Some("gpt-4o-mini"));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(FileConfig::discover(Some(&missing)).is_err());
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let creds = Credentials::OpenAi {
            api_key: "sk-secret".into(),
            base_url: None,
        };
        assert!(!format!("{creds:?}").contains("sk-secret"));
    }
}
