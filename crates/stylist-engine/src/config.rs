use std::env;
use std::time::Duration;

use stylist_contracts::errors::StylistError;
use stylist_contracts::models::{ModelSelection, ModelSelector};

pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_REQUEST_TIMEOUT_S: f64 = 90.0;
const MIN_REQUEST_TIMEOUT_S: f64 = 15.0;
const MAX_REQUEST_TIMEOUT_S: f64 = 300.0;

const API_KEY_ENV: &[&str] = &["GEMINI_API_KEY", "GOOGLE_API_KEY"];
const API_BASE_ENV: &str = "GEMINI_API_BASE";
const MODEL_ENV: &str = "STYLIST_MODEL";
const TIMEOUT_ENV: &str = "STYLIST_REQUEST_TIMEOUT";

/// Values supplied on the command line; each one beats its env counterpart.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub request_timeout_s: Option<f64>,
    /// Replace an unsupported model with the default instead of failing.
    pub fallback_on_unknown_model: bool,
}

#[derive(Debug, Clone)]
pub struct StylistConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: ModelSelection,
    pub request_timeout: Duration,
}

impl StylistConfig {
    pub fn from_env(overrides: ConfigOverrides) -> Result<Self, StylistError> {
        Self::from_lookup(overrides, |key| env::var(key).ok())
    }

    pub fn from_lookup(
        overrides: ConfigOverrides,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, StylistError> {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let api_key = non_empty_owned(overrides.api_key)
            .or_else(|| API_KEY_ENV.iter().find_map(|key| non_empty(*key)));
        let api_base = non_empty(API_BASE_ENV)
            .map(|value| value.trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_GEMINI_API_BASE.to_string());
        let requested_model = non_empty_owned(overrides.model).or_else(|| non_empty(MODEL_ENV));
        let selector = ModelSelector::default();
        let model = if overrides.fallback_on_unknown_model {
            selector.select_or_default(requested_model.as_deref())?
        } else {
            selector.select(requested_model.as_deref())?
        };
        let timeout_s = overrides
            .request_timeout_s
            .or_else(|| non_empty(TIMEOUT_ENV).and_then(|value| value.parse::<f64>().ok()));

        Ok(Self {
            api_key,
            api_base,
            model,
            request_timeout: clamp_timeout(timeout_s),
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = non_empty_owned(Some(api_key.into()));
        self
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn require_api_key(&self) -> Result<&str, StylistError> {
        self.api_key
            .as_deref()
            .ok_or(StylistError::MissingCredential)
    }
}

fn non_empty_owned(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn clamp_timeout(seconds: Option<f64>) -> Duration {
    let seconds = seconds
        .filter(|value| value.is_finite())
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_S)
        .clamp(MIN_REQUEST_TIMEOUT_S, MAX_REQUEST_TIMEOUT_S);
    Duration::from_secs_f64(seconds)
}
