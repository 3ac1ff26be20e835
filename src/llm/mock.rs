/*
 * src/llm/mock.rs
 *
 * Mock LLM implementation that returns scripted responses without making
 * API calls. Used by tests and by `DEPLOY_LLM != "1"` runs.
 */

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::{self, Stream};
use langchain_rust::language_models::llm::LLM;
use langchain_rust::language_models::{GenerateResult, LLMError};
use langchain_rust::schemas::{Message, StreamData};
use serde_json::Value;

/// Pops scripted responses in order; once the script is exhausted (or if
/// none was provided) every call returns the fallback string.
pub struct MockLLM {
	responses: Mutex<VecDeque<String>>,
	fallback: String,
}

impl MockLLM {
	pub fn new() -> Self {
		Self::with_fallback("This is a mock response for testing.")
	}

	pub fn with_fallback(fallback: impl Into<String>) -> Self {
		Self {
			responses: Mutex::new(VecDeque::new()),
			fallback: fallback.into(),
		}
	}

	pub fn scripted<I, S>(responses: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let queue = responses.into_iter().map(Into::into).collect();
		Self {
			responses: Mutex::new(queue),
			fallback: "This is a mock response for testing.".to_string(),
		}
	}

	/// Queues one more scripted response.
	pub fn push(&self, response: impl Into<String>) {
		self.responses
			.lock()
			.expect("mock responses lock")
			.push_back(response.into());
	}

	fn next_response(&self) -> String {
		self.responses
			.lock()
			.expect("mock responses lock")
			.pop_front()
			.unwrap_or_else(|| self.fallback.clone())
	}
}

impl Default for MockLLM {
	fn default() -> Self {
		Self::new()
	}
}

impl Clone for MockLLM {
	fn clone(&self) -> Self {
		Self {
			responses: Mutex::new(self.responses.lock().expect("mock responses lock").clone()),
			fallback: self.fallback.clone(),
		}
	}
}

#[async_trait]
impl LLM for MockLLM {
	async fn generate(&self, _messages: &[Message]) -> Result<GenerateResult, LLMError> {
		Ok(GenerateResult {
			generation: self.next_response(),
			tokens: None,
		})
	}

	async fn stream(
		&self,
		_messages: &[Message],
	) -> Result<Pin<Box<dyn Stream<Item = Result<StreamData, LLMError>> + Send>>, LLMError> {
		let response = self.next_response();
		let data = StreamData::new(Value::String(response.clone()), None, &response);
		let stream = stream::once(async move { Ok(data) });
		Ok(Box::pin(stream))
	}
}
