/*
 * src/llm/gateway.rs
 *
 * Routes prompts to the provider configured for a task kind, retries
 * transient failures with exponential backoff and jitter, and validates
 * responses against a serde schema. Schema mismatches fail fast.
 */

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use langchain_rust::language_models::LLMError;
use langchain_rust::language_models::llm::LLM;
use langchain_rust::llm::openai::OpenAI;
use rand::Rng;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::LlmError;
use crate::global::{DEPLOY_LLM, LLM_MAX_BACKOFF_MS};
use crate::llm::config::ProviderConfig;
use crate::llm::mock::MockLLM;
use crate::llm::LlmTaskKind;

struct Provider {
	llm: Arc<dyn LLM + Send + Sync>,
	cfg: ProviderConfig,
	// pacing state for the declared rate limit
	last_call: Mutex<Option<Instant>>,
}

pub struct LlmGateway {
	providers: HashMap<LlmTaskKind, Arc<Provider>>,
}

pub struct LlmGatewayBuilder {
	providers: HashMap<LlmTaskKind, Arc<Provider>>,
}

impl LlmGatewayBuilder {
	pub fn provider(
		mut self,
		task: LlmTaskKind,
		llm: Arc<dyn LLM + Send + Sync>,
		cfg: ProviderConfig,
	) -> Self {
		self.providers.insert(
			task,
			Arc::new(Provider {
				llm,
				cfg,
				last_call: Mutex::new(None),
			}),
		);
		self
	}

	/// Registers the same provider for every task kind not yet configured.
	pub fn fallback(mut self, llm: Arc<dyn LLM + Send + Sync>, cfg: ProviderConfig) -> Self {
		let provider = Arc::new(Provider {
			llm,
			cfg,
			last_call: Mutex::new(None),
		});
		for task in LlmTaskKind::ALL {
			self.providers.entry(task).or_insert_with(|| Arc::clone(&provider));
		}
		self
	}

	pub fn build(self) -> LlmGateway {
		LlmGateway {
			providers: self.providers,
		}
	}
}

impl LlmGateway {
	pub fn builder() -> LlmGatewayBuilder {
		LlmGatewayBuilder {
			providers: HashMap::new(),
		}
	}

	/// Providers from environment configuration.
	///
	/// When `DEPLOY_LLM != "1"` every provider is the in-crate mock, so the
	/// whole pipeline runs without keys or network (dev, CI).
	pub fn from_env() -> Self {
		dotenvy::dotenv().ok();
		let use_mock = std::env::var(DEPLOY_LLM).unwrap_or_default() != "1";

		let fast_cfg = ProviderConfig::fast_from_env();
		let main_cfg = ProviderConfig::main_from_env();

		let (fast, main): (Arc<dyn LLM + Send + Sync>, Arc<dyn LLM + Send + Sync>) = if use_mock {
			info!(target: "llm_gateway", "DEPLOY_LLM != 1; using mock providers");
			(Arc::new(MockLLM::new()), Arc::new(MockLLM::new()))
		} else {
			(
				Arc::new(OpenAI::default().with_model(fast_cfg.model.clone())),
				Arc::new(OpenAI::default().with_model(main_cfg.model.clone())),
			)
		};

		Self::builder()
			.provider(LlmTaskKind::IntentClassification, Arc::clone(&fast), fast_cfg)
			.fallback(main, main_cfg)
			.build()
	}

	fn provider(&self, task: LlmTaskKind) -> Result<&Arc<Provider>, LlmError> {
		self.providers
			.get(&task)
			.ok_or_else(|| LlmError::Transient(format!("no provider for task {}", task.as_str())))
	}

	/// Raw prompt round-trip with retry. `deadline` overrides the provider's
	/// configured per-call timeout when tighter.
	pub async fn invoke_raw(
		&self,
		task: LlmTaskKind,
		prompt: &str,
		deadline: Option<Duration>,
	) -> Result<String, LlmError> {
		let provider = self.provider(task)?;
		let timeout = match deadline {
			Some(d) => d.min(Duration::from_millis(provider.cfg.timeout_ms)),
			None => Duration::from_millis(provider.cfg.timeout_ms),
		};

		let mut attempt = 0u32;
		loop {
			self.pace(provider).await;

			debug!(
				target: "llm_gateway",
				task = task.as_str(),
				model = %provider.cfg.model,
				attempt,
				prompt_len = prompt.len(),
				"Invoking provider"
			);

			let result = tokio::time::timeout(timeout, provider.llm.invoke(prompt)).await;
			let err = match result {
				Ok(Ok(response)) => {
					debug!(
						target: "llm_gateway",
						task = task.as_str(),
						response_len = response.len(),
						"Provider responded"
					);
					return Ok(response);
				}
				Ok(Err(e)) => classify(e),
				Err(_) => LlmError::Timeout,
			};

			if !err.is_retryable() || attempt >= provider.cfg.max_retries {
				warn!(
					target: "llm_gateway",
					task = task.as_str(),
					attempt,
					error = %err,
					"Provider call failed"
				);
				return Err(err);
			}

			let backoff = backoff_with_jitter(provider.cfg.base_backoff_ms, attempt);
			warn!(
				target: "llm_gateway",
				task = task.as_str(),
				attempt,
				backoff_ms = backoff.as_millis() as u64,
				error = %err,
				"Retrying after transient failure"
			);
			tokio::time::sleep(backoff).await;
			attempt += 1;
		}
	}

	/// Prompt round-trip parsed against `T`. A response that does not parse
	/// is a `SchemaMismatch` and is not retried.
	pub async fn invoke_json<T: DeserializeOwned>(
		&self,
		task: LlmTaskKind,
		prompt: &str,
		deadline: Option<Duration>,
	) -> Result<T, LlmError> {
		let response = self.invoke_raw(task, prompt, deadline).await?;
		let cleaned = strip_fences(&response);
		serde_json::from_str(cleaned).map_err(|e| {
			LlmError::SchemaMismatch(format!(
				"failed to parse LLM response as JSON: {e}. Response was: {}",
				truncate(cleaned, 400)
			))
		})
	}

	async fn pace(&self, provider: &Provider) {
		let Some(rpm) = provider.cfg.requests_per_minute else {
			return;
		};
		let min_gap = Duration::from_millis(60_000 / rpm.max(1) as u64);
		let mut last = provider.last_call.lock().await;
		if let Some(prev) = *last {
			let elapsed = prev.elapsed();
			if elapsed < min_gap {
				tokio::time::sleep(min_gap - elapsed).await;
			}
		}
		*last = Some(Instant::now());
	}
}

/// Removes a wrapping markdown code fence, which models add despite
/// instructions to return bare JSON.
pub fn strip_fences(response: &str) -> &str {
	response
		.trim()
		.trim_start_matches("```json")
		.trim_start_matches("```")
		.trim_end_matches("```")
		.trim()
}

fn classify(e: LLMError) -> LlmError {
	let text = e.to_string();
	let lowered = text.to_lowercase();
	if lowered.contains("429") || lowered.contains("rate limit") || lowered.contains("rate_limit")
	{
		LlmError::RateLimited
	} else {
		LlmError::Transient(text)
	}
}

fn backoff_with_jitter(base_ms: u64, attempt: u32) -> Duration {
	let exp = base_ms.saturating_mul(1 << attempt.min(10));
	let capped = exp.min(LLM_MAX_BACKOFF_MS);
	let jitter = rand::thread_rng().gen_range(0..=capped / 2);
	Duration::from_millis(capped + jitter)
}

fn truncate(s: &str, max: usize) -> &str {
	match s.char_indices().nth(max) {
		Some((i, _)) => &s[..i],
		None => s,
	}
}
