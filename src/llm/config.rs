/*
 * src/llm/config.rs
 *
 * Per-provider configuration: model identifier, retry/backoff/timeout
 * tuning, and an optional rate limit the gateway paces calls against.
 */

use crate::global::{
	LLM_BASE_BACKOFF_MS, LLM_CALL_TIMEOUT_MS, MAX_LLM_RETRIES, OPENAI_MODEL_FAST,
	OPENAI_MODEL_MAIN,
};

#[derive(Debug, Clone)]
pub struct ProviderConfig {
	pub model: String,
	pub max_retries: u32,
	pub base_backoff_ms: u64,
	pub timeout_ms: u64,
	/// Declared provider rate limit; calls are spaced to honor it.
	pub requests_per_minute: Option<u32>,
}

impl ProviderConfig {
	pub fn for_model(model: impl Into<String>) -> Self {
		Self {
			model: model.into(),
			max_retries: MAX_LLM_RETRIES,
			base_backoff_ms: LLM_BASE_BACKOFF_MS,
			timeout_ms: LLM_CALL_TIMEOUT_MS,
			requests_per_minute: None,
		}
	}

	pub fn with_rate_limit(mut self, requests_per_minute: u32) -> Self {
		self.requests_per_minute = Some(requests_per_minute);
		self
	}

	/// Small, fast model for classification-style tasks.
	pub fn fast_from_env() -> Self {
		let model =
			std::env::var(OPENAI_MODEL_FAST).unwrap_or_else(|_| "gpt-4o-mini".to_string());
		Self::for_model(model)
	}

	/// Main model for generation-quality tasks.
	pub fn main_from_env() -> Self {
		let model = std::env::var(OPENAI_MODEL_MAIN).unwrap_or_else(|_| "gpt-4o".to_string());
		Self::for_model(model)
	}
}
