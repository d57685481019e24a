//! Classification: ask a vision model which company issued a certificate.
//!
//! The [`Classifier`] trait is the seam between the pipeline and the hosted
//! model. [`VisionClassifier`] is the production implementation on top of
//! `edgequake-llm`; tests substitute a stub that answers from a table.
//!
//! A classifier returns the model's raw text. Turning that text into a
//! company name is [`parse_company_name`]'s job, so every implementation
//! gets the same empty-answer and "Unknown_Company" handling.
//!
//! ## Retries
//!
//! None by default: one certificate, one request. `max_retries` opts in to
//! exponential backoff (`retry_backoff_ms * 2^attempt`, saturating).

use crate::config::{
    FilingConfig, DEFAULT_ANTHROPIC_MODEL, DEFAULT_GEMINI_MODEL, DEFAULT_OLLAMA_MODEL,
    DEFAULT_OPENAI_MODEL,
};
use crate::error::{CertFilerError, FileError};
use crate::prompts::{DEFAULT_CLASSIFY_PROMPT, UNKNOWN_COMPANY};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Reads a rendered certificate and answers with the issuer's name.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Return the model's raw answer for one page image.
    ///
    /// `file_name` is for logging only.
    async fn classify(&self, image: ImageData, file_name: &str) -> Result<String, FileError>;
}

/// Production classifier backed by an `edgequake-llm` provider.
pub struct VisionClassifier {
    provider: Arc<dyn LLMProvider>,
    prompt: String,
    temperature: f32,
    max_tokens: usize,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl VisionClassifier {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &FilingConfig) -> Self {
        Self {
            provider,
            prompt: config
                .prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_CLASSIFY_PROMPT.to_string()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
        }
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Classifier for VisionClassifier {
    async fn classify(&self, image: ImageData, file_name: &str) -> Result<String, FileError> {
        // One user turn: the instruction followed by the page image.
        let messages = vec![ChatMessage::user_with_images(
            self.prompt.as_str(),
            vec![image],
        )];
        let options = self.options();

        let mut last_err: Option<String> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = backoff_ms(self.retry_backoff_ms, attempt);
                warn!(
                    "{}: retry {}/{} after {}ms",
                    file_name, attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.provider.chat(&messages, Some(&options)).await {
                Ok(response) => {
                    debug!(
                        "{}: {} input tokens, {} output tokens",
                        file_name, response.prompt_tokens, response.completion_tokens
                    );
                    return Ok(response.content);
                }
                Err(e) => {
                    let err_msg = format!("{}", e);
                    warn!("{}: attempt {} failed: {}", file_name, attempt + 1, err_msg);
                    last_err = Some(err_msg);
                }
            }
        }

        Err(FileError::classification(format!(
            "API call failed: {}",
            last_err.unwrap_or_else(|| "unknown error".to_string())
        )))
    }
}

/// Delay before retry `attempt` (1-based). Saturates instead of overflowing.
fn backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    base_ms.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

// ── Response parsing ─────────────────────────────────────────────────────

static RE_ANSWER_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:company(?:\s+name)?|issuer|organi[sz]ation)\s*:\s*").unwrap()
});

/// Extract the company name from the model's free-text answer.
///
/// Takes the first non-empty line, drops a "Company:"-style label, then
/// surrounding quotes, backticks, emphasis markers and a trailing full stop.
/// An empty answer or the prompt's "Unknown_Company" sentinel is a
/// classification failure.
pub fn parse_company_name(raw: &str) -> Result<String, FileError> {
    let line = raw
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");

    let line = RE_ANSWER_LABEL.replace(line, "");
    let name = line
        .trim()
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '*' | '“' | '”'))
        .trim()
        .trim_end_matches('.')
        .trim();

    if name.is_empty() {
        return Err(FileError::classification("model returned an empty response"));
    }
    if name.eq_ignore_ascii_case(UNKNOWN_COMPANY) || name.eq_ignore_ascii_case("unknown") {
        return Err(FileError::classification(
            "model could not identify the issuing company",
        ));
    }
    Ok(name.to_string())
}

// ── Provider resolution ──────────────────────────────────────────────────

/// Resolve the classifier, from most-specific to least-specific.
///
/// 1. **Pre-built classifier** (`config.classifier`): used as-is (tests,
///    custom backends).
/// 2. **Pre-built provider** (`config.provider`): wrapped in a
///    [`VisionClassifier`].
/// 3. **Named provider + model** (`config.provider_name`): built through
///    [`ProviderFactory::create_llm_provider`], which reads that provider's
///    API key from the environment.
/// 4. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 5. **`GEMINI_API_KEY`**: Gemini with [`DEFAULT_GEMINI_MODEL`].
/// 6. **`OPENAI_API_KEY`**: OpenAI with [`DEFAULT_OPENAI_MODEL`].
/// 7. **Full auto-detection** (`ProviderFactory::from_env`).
pub fn resolve_classifier(config: &FilingConfig) -> Result<Arc<dyn Classifier>, CertFilerError> {
    if let Some(ref classifier) = config.classifier {
        return Ok(Arc::clone(classifier));
    }
    let provider = resolve_provider(config)?;
    Ok(Arc::new(VisionClassifier::new(provider, config)))
}

fn resolve_provider(config: &FilingConfig) -> Result<Arc<dyn LLMProvider>, CertFilerError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = match config.model.as_deref().or_else(|| default_model_for(name)) {
            Some(model) => model,
            None => {
                return Err(CertFilerError::ProviderNotConfigured {
                    provider: name.clone(),
                    hint: format!("no default vision model for '{name}'; pass --model"),
                })
            }
        };
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    for (var, provider) in [("GEMINI_API_KEY", "gemini"), ("OPENAI_API_KEY", "openai")] {
        if std::env::var(var).is_ok_and(|k| !k.is_empty()) {
            let model = config
                .model
                .as_deref()
                .or_else(|| default_model_for(provider))
                .unwrap_or(DEFAULT_GEMINI_MODEL);
            return create_vision_provider(provider, model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| CertFilerError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY (or OPENAI_API_KEY, ANTHROPIC_API_KEY) in the \
                environment or a .env file.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, CertFilerError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        CertFilerError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Vision-capable default for a named provider. Azure deployments and
/// unlisted providers have no sensible default and need an explicit model.
fn default_model_for(provider: &str) -> Option<&'static str> {
    match provider.to_ascii_lowercase().as_str() {
        "gemini" | "google" => Some(DEFAULT_GEMINI_MODEL),
        "openai" => Some(DEFAULT_OPENAI_MODEL),
        "anthropic" | "claude" => Some(DEFAULT_ANTHROPIC_MODEL),
        "ollama" => Some(DEFAULT_OLLAMA_MODEL),
        _ => None,
    }
}
