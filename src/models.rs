//! 模型白名单与采样参数校验（纯函数，无 I/O）。
//!
//! Model allow-list and sampling parameter validation.
//!
//! Matching is exact: no prefix matching, no case folding. Out-of-range numbers are
//! rejected rather than clamped so the caller's intent is never silently changed.

use crate::types::{DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};
use crate::{Error, ErrorContext, Result};
use std::time::Duration;

pub const MIN_TEMPERATURE: f64 = 0.0;
pub const MAX_TEMPERATURE: f64 = 2.0;

/// An allow-listed model and its per-model defaults.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelProfile {
    pub id: &'static str,
    pub description: &'static str,
    pub default_temperature: f64,
    pub default_max_tokens: u32,
    /// Replaces the pool-wide request timeout for calls to this model.
    pub request_timeout: Option<Duration>,
}

/// The only models the relay will forward upstream.
pub const SUPPORTED_MODELS: &[ModelProfile] = &[
    ModelProfile {
        id: "gpt-4o",
        description: "OpenAI GPT-4o, general purpose multimodal model",
        default_temperature: DEFAULT_TEMPERATURE,
        default_max_tokens: DEFAULT_MAX_TOKENS,
        request_timeout: Some(Duration::from_secs(45)),
    },
    ModelProfile {
        id: "anthropic.claude-3-7-sonnet-20250219-v1:0",
        description: "Anthropic Claude 3.7 Sonnet served through the proxy",
        default_temperature: DEFAULT_TEMPERATURE,
        default_max_tokens: DEFAULT_MAX_TOKENS,
        request_timeout: Some(Duration::from_secs(60)),
    },
];

/// Sampling parameters after defaults were applied and ranges checked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub temperature: f64,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct ModelValidator {
    allowed: &'static [ModelProfile],
}

impl Default for ModelValidator {
    fn default() -> Self {
        Self::new(SUPPORTED_MODELS)
    }
}

impl ModelValidator {
    pub fn new(allowed: &'static [ModelProfile]) -> Self {
        Self { allowed }
    }

    pub fn models(&self) -> &'static [ModelProfile] {
        self.allowed
    }

    pub fn allowed_ids(&self) -> Vec<&'static str> {
        self.allowed.iter().map(|m| m.id).collect()
    }

    /// Resolve `candidate` to its allow-listed profile.
    pub fn validate_model(&self, candidate: &str) -> Result<&'static ModelProfile> {
        self.allowed
            .iter()
            .find(|m| m.id == candidate)
            .ok_or_else(|| {
                Error::validation_with_context(
                    format!(
                        "Model '{}' is not supported. Supported models: {}",
                        candidate,
                        self.allowed_ids().join(", ")
                    ),
                    ErrorContext::new()
                        .with_field_path("model")
                        .with_source("model_validator"),
                )
            })
    }

    /// Apply per-model defaults and check ranges.
    ///
    /// `max_tokens` is taken as a signed value so that negative input gets a range
    /// error instead of a type error.
    pub fn validate_sampling(
        &self,
        profile: Option<&ModelProfile>,
        temperature: Option<f64>,
        max_tokens: Option<i64>,
    ) -> Result<SamplingParams> {
        let temperature = temperature
            .unwrap_or_else(|| profile.map_or(DEFAULT_TEMPERATURE, |p| p.default_temperature));
        if !(MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&temperature) {
            return Err(Error::validation_with_context(
                format!(
                    "temperature must be between {:.1} and {:.1}, got {}",
                    MIN_TEMPERATURE, MAX_TEMPERATURE, temperature
                ),
                ErrorContext::new()
                    .with_field_path("temperature")
                    .with_source("model_validator"),
            ));
        }

        let max_tokens = match max_tokens {
            None => profile.map_or(DEFAULT_MAX_TOKENS, |p| p.default_max_tokens),
            Some(n) if n <= 0 => {
                return Err(Error::validation_with_context(
                    format!("max_tokens must be a positive integer, got {}", n),
                    ErrorContext::new()
                        .with_field_path("max_tokens")
                        .with_source("model_validator"),
                ))
            }
            Some(n) => u32::try_from(n).map_err(|_| {
                Error::validation_with_context(
                    format!("max_tokens must not exceed {}, got {}", u32::MAX, n),
                    ErrorContext::new()
                        .with_field_path("max_tokens")
                        .with_source("model_validator"),
                )
            })?,
        };

        Ok(SamplingParams {
            temperature,
            max_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_every_allow_listed_model_unchanged() {
        let v = ModelValidator::default();
        for profile in SUPPORTED_MODELS {
            assert_eq!(v.validate_model(profile.id).unwrap().id, profile.id);
        }
    }

    #[test]
    fn exact_match_only() {
        let v = ModelValidator::default();
        for candidate in ["GPT-4o", "gpt-4", "gpt-4o ", "anthropic.claude", "llama-70b", ""] {
            let err = v.validate_model(candidate).unwrap_err();
            let text = err.to_string();
            assert!(text.contains("gpt-4o"), "{}", text);
            assert!(
                text.contains("anthropic.claude-3-7-sonnet-20250219-v1:0"),
                "{}",
                text
            );
        }
    }

    #[test]
    fn defaults_apply_when_omitted() {
        let v = ModelValidator::default();
        let params = v
            .validate_sampling(Some(&SUPPORTED_MODELS[0]), None, None)
            .unwrap();
        assert_eq!(params.temperature, 0.7);
        assert_eq!(params.max_tokens, 1000);
    }

    #[test]
    fn profiles_carry_their_own_timeouts() {
        let v = ModelValidator::default();
        assert_eq!(
            v.validate_model("gpt-4o").unwrap().request_timeout,
            Some(Duration::from_secs(45))
        );
        assert_eq!(
            v.validate_model("anthropic.claude-3-7-sonnet-20250219-v1:0")
                .unwrap()
                .request_timeout,
            Some(Duration::from_secs(60))
        );
    }

    #[test]
    fn temperature_bounds_are_inclusive() {
        let v = ModelValidator::default();
        assert!(v.validate_sampling(None, Some(0.0), None).is_ok());
        assert!(v.validate_sampling(None, Some(2.0), None).is_ok());
        for bad in [-0.01, 2.01, 10.0] {
            let err = v.validate_sampling(None, Some(bad), None).unwrap_err();
            assert_eq!(
                err.context().unwrap().field_path.as_deref(),
                Some("temperature")
            );
        }
    }

    #[test]
    fn non_positive_max_tokens_rejected() {
        let v = ModelValidator::default();
        for bad in [0, -1, -1000] {
            let err = v.validate_sampling(None, None, Some(bad)).unwrap_err();
            assert_eq!(
                err.context().unwrap().field_path.as_deref(),
                Some("max_tokens")
            );
        }
        assert_eq!(
            v.validate_sampling(None, None, Some(1)).unwrap().max_tokens,
            1
        );
    }
}
