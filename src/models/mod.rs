//! Model identifiers of the form `provider:model_id`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::AgentryError;

/// Providers with a built-in client.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ProviderKind {
    #[strum(to_string = "google", serialize = "gemini")]
    Google,
    #[strum(to_string = "anthropic", serialize = "claude")]
    Anthropic,
}

impl ProviderKind {
    /// Canonical key used for config lookups.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Anthropic => "anthropic",
        }
    }
}

/// A concrete model on a concrete provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LanguageModel {
    pub provider: ProviderKind,
    pub model_id: String,
}

impl LanguageModel {
    pub fn new(provider: ProviderKind, model_id: impl Into<String>) -> Self {
        Self {
            provider,
            model_id: model_id.into(),
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.as_str()
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }
}

impl fmt::Display for LanguageModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.model_id)
    }
}

impl FromStr for LanguageModel {
    type Err = AgentryError;

    /// Parse `provider:model_id`. A bare id without a provider prefix is
    /// treated as a Google model.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (provider, model_id) = match s.split_once(':') {
            Some((provider, model_id)) => {
                let provider = ProviderKind::from_str(provider.trim()).map_err(|_| {
                    AgentryError::Configuration(format!("unknown model provider '{provider}'"))
                })?;
                (provider, model_id.trim())
            }
            None => (ProviderKind::Google, s),
        };
        if model_id.is_empty() {
            return Err(AgentryError::Configuration(format!(
                "model '{s}' has an empty model id"
            )));
        }
        Ok(Self::new(provider, model_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_provider_prefixed_model() {
        let model: LanguageModel = "google:gemini-2.5-flash".parse().unwrap();
        assert_eq!(model.provider, ProviderKind::Google);
        assert_eq!(model.model_id(), "gemini-2.5-flash");
        assert_eq!(model.to_string(), "google:gemini-2.5-flash");
    }

    #[test]
    fn accepts_provider_aliases() {
        let model: LanguageModel = "claude:claude-sonnet-4-5".parse().unwrap();
        assert_eq!(model.provider, ProviderKind::Anthropic);

        let model: LanguageModel = "Gemini:gemini-2.5-pro".parse().unwrap();
        assert_eq!(model.provider, ProviderKind::Google);
    }

    #[test]
    fn bare_model_id_defaults_to_google() {
        let model: LanguageModel = "gemini-2.5-flash".parse().unwrap();
        assert_eq!(model.provider, ProviderKind::Google);
    }

    #[test]
    fn rejects_unknown_provider_and_empty_id() {
        assert!("openai:gpt-4o".parse::<LanguageModel>().is_err());
        assert!("google:".parse::<LanguageModel>().is_err());
    }
}
