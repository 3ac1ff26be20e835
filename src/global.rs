pub const LOG_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/logs");
pub const CRASH_LOG: &str = "crash.log";
pub const LATEST_LOG: &str = "latest.log";

// Environment variable names
pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const DEPLOY_LLM: &str = "DEPLOY_LLM";
pub const GOOGLE_MAPS_API_KEY: &str = "GOOGLE_MAPS_API_KEY";
pub const OPENAI_MODEL_FAST: &str = "OPENAI_MODEL_FAST";
pub const OPENAI_MODEL_MAIN: &str = "OPENAI_MODEL_MAIN";

// Rough chars-per-token heuristic used by the summarizer budget
pub const CHARS_PER_TOKEN: usize = 4;
pub const SUMMARY_TOKEN_BUDGET: usize = 1500;

// Bounded retries for optimistic-concurrency conflicts
pub const MAX_VERSION_RETRIES: u32 = 3;

// LLM gateway retry/backoff tuning
pub const MAX_LLM_RETRIES: u32 = 3;
pub const LLM_BASE_BACKOFF_MS: u64 = 500;
pub const LLM_MAX_BACKOFF_MS: u64 = 8_000;
pub const LLM_CALL_TIMEOUT_MS: u64 = 60_000;

// Orchestration deadlines; per-call, per-agent, and per-run timeouts nest
pub const AGENT_TIMEOUT_MS: u64 = 120_000;
pub const ORCHESTRATION_TIMEOUT_MS: u64 = 300_000;

// Per-subscriber event backlog before a slow subscriber is dropped
pub const EVENT_BACKLOG: usize = 64;
