use std::fmt;
use std::str::FromStr;

use crate::error::AilError;

/// A provider's API style.
///
/// Kept free of any other crate types so downstream code can match on styles
/// without pulling in the rest of the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Style {
    /// OpenAI Chat Completions (`/v1/chat/completions`).
    ChatCompletions,
    /// OpenAI Responses (`/v1/responses`).
    Responses,
    /// Anthropic Messages (`/v1/messages`).
    Anthropic,
    /// Google GenAI (`:generateContent` / `:streamGenerateContent`).
    GoogleGenAi,
}

impl Style {
    /// The wire identifier used in registry lookups and configuration.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Style::ChatCompletions => "openai-chat-completions",
            Style::Responses => "openai-responses",
            Style::Anthropic => "anthropic-messages",
            Style::GoogleGenAi => "google-genai",
        }
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Style {
    type Err = AilError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openai-chat-completions" => Ok(Style::ChatCompletions),
            "openai-responses" => Ok(Style::Responses),
            "anthropic-messages" => Ok(Style::Anthropic),
            "google-genai" => Ok(Style::GoogleGenAi),
            other => Err(AilError::UnknownStyle(other.to_string())),
        }
    }
}
