//! Token usage extraction from AI provider responses
//!
//! Each extractor reads a raw response body (as `serde_json::Value`) and
//! pulls out the model name and token counts. Missing fields default to an
//! empty model name and zero tokens; extraction never fails.

use serde_json::Value;

/// Model and token counts for one AI call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageData {
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Supported providers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Anthropic,
    Google,
}

impl Provider {
    /// Vendor name the collector expects when none is given
    pub fn default_vendor(self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Google => "gemini",
        }
    }

    pub fn extract(self, response: &Value) -> UsageData {
        match self {
            Provider::OpenAi => extract_openai(response),
            Provider::Anthropic => extract_anthropic(response),
            Provider::Google => extract_google(response),
        }
    }
}

/// OpenAI chat/completions: `model`, `usage.prompt_tokens`,
/// `usage.completion_tokens`
pub fn extract_openai(response: &Value) -> UsageData {
    UsageData {
        model: string_at(response, &["/model"]),
        input_tokens: count_at(response, &["/usage/prompt_tokens"]),
        output_tokens: count_at(response, &["/usage/completion_tokens"]),
    }
}

/// Anthropic messages: `model`, `usage.input_tokens`, `usage.output_tokens`
pub fn extract_anthropic(response: &Value) -> UsageData {
    UsageData {
        model: string_at(response, &["/model"]),
        input_tokens: count_at(response, &["/usage/input_tokens"]),
        output_tokens: count_at(response, &["/usage/output_tokens"]),
    }
}

/// Google Gemini: `modelVersion`, `usageMetadata.promptTokenCount`,
/// `usageMetadata.candidatesTokenCount`
///
/// The Python and REST SDKs emit the same fields in snake_case; those are
/// read when the camelCase keys are absent.
pub fn extract_google(response: &Value) -> UsageData {
    UsageData {
        model: string_at(response, &["/modelVersion", "/model_version"]),
        input_tokens: count_at(
            response,
            &[
                "/usageMetadata/promptTokenCount",
                "/usage_metadata/prompt_token_count",
            ],
        ),
        output_tokens: count_at(
            response,
            &[
                "/usageMetadata/candidatesTokenCount",
                "/usage_metadata/candidates_token_count",
            ],
        ),
    }
}

/// First string found at any of `pointers`
fn string_at(response: &Value, pointers: &[&str]) -> String {
    pointers
        .iter()
        .find_map(|p| response.pointer(p).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string()
}

fn count_at(response: &Value, pointers: &[&str]) -> u64 {
    pointers
        .iter()
        .find_map(|p| response.pointer(p).and_then(Value::as_u64))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_openai() {
        let response = json!({
            "id": "chatcmpl-123",
            "model": "gpt-4o-2024-08-06",
            "usage": { "prompt_tokens": 512, "completion_tokens": 128, "total_tokens": 640 }
        });

        assert_eq!(
            extract_openai(&response),
            UsageData {
                model: "gpt-4o-2024-08-06".into(),
                input_tokens: 512,
                output_tokens: 128,
            }
        );
    }

    #[test]
    fn test_extract_anthropic() {
        let response = json!({
            "type": "message",
            "model": "claude-sonnet-4-20250514",
            "usage": { "input_tokens": 1200, "output_tokens": 300 }
        });

        let usage = Provider::Anthropic.extract(&response);
        assert_eq!(usage.model, "claude-sonnet-4-20250514");
        assert_eq!(usage.input_tokens, 1200);
        assert_eq!(usage.output_tokens, 300);
    }

    #[test]
    fn test_extract_google() {
        let response = json!({
            "modelVersion": "gemini-2.0-flash",
            "usageMetadata": { "promptTokenCount": 40, "candidatesTokenCount": 12 }
        });

        let usage = extract_google(&response);
        assert_eq!(usage.model, "gemini-2.0-flash");
        assert_eq!(usage.input_tokens, 40);
        assert_eq!(usage.output_tokens, 12);
    }

    #[test]
    fn test_extract_google_snake_case() {
        let response = json!({
            "model_version": "gemini-1.5-pro",
            "usage_metadata": { "prompt_token_count": 75, "candidates_token_count": 20 }
        });

        let usage = extract_google(&response);
        assert_eq!(usage.model, "gemini-1.5-pro");
        assert_eq!(usage.input_tokens, 75);
        assert_eq!(usage.output_tokens, 20);
    }

    #[test]
    fn test_missing_fields_default() {
        let empty = json!({});
        for provider in [Provider::OpenAi, Provider::Anthropic, Provider::Google] {
            assert_eq!(provider.extract(&empty), UsageData::default());
        }

        // Streaming chunks carry no usage block
        let partial = json!({ "model": "gpt-4o-mini", "usage": null });
        assert_eq!(extract_openai(&partial).model, "gpt-4o-mini");
        assert_eq!(extract_openai(&partial).input_tokens, 0);
    }

    #[test]
    fn test_default_vendor_names() {
        assert_eq!(Provider::OpenAi.default_vendor(), "openai");
        assert_eq!(Provider::Anthropic.default_vendor(), "anthropic");
        assert_eq!(Provider::Google.default_vendor(), "gemini");
    }
}
