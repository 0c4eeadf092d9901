use std::env;
use std::path::Path;

use sidekick_openai_model::{OpenAIConfig, OpenAIConfigBuilder};

const API_KEY_VAR: &str = "OPENAI_API_KEY";
const BASE_URL_VAR: &str = "OPENAI_BASE_URL";
const MODEL_VAR: &str = "OPENAI_MODEL";
const EVALUATOR_MODEL_VAR: &str = "SIDEKICK_EVALUATOR_MODEL";
const PUSHOVER_TOKEN_VAR: &str = "PUSHOVER_TOKEN";
const PUSHOVER_USER_VAR: &str = "PUSHOVER_USER";

/// Errors from loading a [`Config`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is unset or empty.
    #[error("environment variable `{0}` is not set")]
    MissingVar(&'static str),
    /// The `.env` file could not be read.
    #[error("failed to load env file: {0}")]
    EnvFile(#[from] dotenv::Error),
}

/// Settings of a sidekick read from the environment.
#[derive(Clone, Default)]
pub struct Config {
    /// API key of the OpenAI-compatible endpoint.
    pub api_key: String,
    /// Base URL of the endpoint. The provider default when `None`.
    pub base_url: Option<String>,
    /// Model of the worker.
    pub model: Option<String>,
    /// Model of the evaluator. Falls back to [`model`](Self::model).
    pub evaluator_model: Option<String>,
    /// Pushover application token.
    pub pushover_token: Option<String>,
    /// Pushover user key.
    pub pushover_user: Option<String>,
}

impl Config {
    /// Loads the configuration from the process environment.
    ///
    /// Variables from `env_file`, or from `.env` in the working directory
    /// when it exists, are added first. Variables already set win.
    pub fn from_env(env_file: Option<&Path>) -> Result<Self, ConfigError> {
        match env_file {
            Some(path) => {
                dotenv::from_path(path)?;
            }
            None => {
                if let Ok(path) = dotenv::dotenv() {
                    debug!("loaded {}", path.display());
                }
            }
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from a variable lookup. Empty values count
    /// as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var =
            |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        Ok(Self {
            api_key: var(API_KEY_VAR)
                .ok_or(ConfigError::MissingVar(API_KEY_VAR))?,
            base_url: var(BASE_URL_VAR),
            model: var(MODEL_VAR),
            evaluator_model: var(EVALUATOR_MODEL_VAR),
            pushover_token: var(PUSHOVER_TOKEN_VAR),
            pushover_user: var(PUSHOVER_USER_VAR),
        })
    }

    /// Returns the provider configuration of the worker.
    pub fn worker_config(&self) -> OpenAIConfig {
        self.openai_config(self.model.as_deref())
    }

    /// Returns the provider configuration of the evaluator.
    pub fn evaluator_config(&self) -> OpenAIConfig {
        self.openai_config(
            self.evaluator_model.as_deref().or(self.model.as_deref()),
        )
    }

    fn openai_config(&self, model: Option<&str>) -> OpenAIConfig {
        let mut builder = OpenAIConfigBuilder::with_api_key(&self.api_key);
        if let Some(base_url) = &self.base_url {
            builder = builder.with_base_url(base_url);
        }
        if let Some(model) = model {
            builder = builder.with_model(model);
        }
        builder.build()
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"<deducted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("evaluator_model", &self.evaluator_model)
            .field(
                "pushover_token",
                &self.pushover_token.as_ref().map(|_| "<deducted>"),
            )
            .field("pushover_user", &self.pushover_user)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(
        vars: &[(&str, &str)],
    ) -> impl Fn(&str) -> Option<String> + use<> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_missing_api_key() {
        let err = Config::from_lookup(lookup(&[(MODEL_VAR, "gpt-4o")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(API_KEY_VAR)));

        let err = Config::from_lookup(lookup(&[(API_KEY_VAR, "  ")]))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "environment variable `OPENAI_API_KEY` is not set"
        );
    }

    #[test]
    fn test_evaluator_model_fallback() {
        let config = Config::from_lookup(lookup(&[
            (API_KEY_VAR, "sk-test"),
            (BASE_URL_VAR, "http://localhost:8080/v1"),
            (MODEL_VAR, "gpt-4o"),
            (PUSHOVER_USER_VAR, ""),
        ]))
        .unwrap();
        assert_eq!(config.pushover_user, None);
        assert_eq!(config.worker_config().model(), "gpt-4o");
        assert_eq!(config.evaluator_config().model(), "gpt-4o");
        assert_eq!(
            config.evaluator_config().base_url(),
            "http://localhost:8080/v1"
        );

        let config = Config::from_lookup(lookup(&[
            (API_KEY_VAR, "sk-test"),
            (MODEL_VAR, "gpt-4o"),
            (EVALUATOR_MODEL_VAR, "gpt-4o-mini"),
        ]))
        .unwrap();
        assert_eq!(config.worker_config().model(), "gpt-4o");
        assert_eq!(config.evaluator_config().model(), "gpt-4o-mini");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = Config::from_lookup(lookup(&[
            (API_KEY_VAR, "sk-secret"),
            (PUSHOVER_TOKEN_VAR, "po-secret"),
        ]))
        .unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(!debug.contains("po-secret"));
    }
}
