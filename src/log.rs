/*
 * src/log.rs
 *
 * Tracing setup for the mutation core. Every subsystem logs under its own
 * named target (see [SUBSYSTEM_TARGETS]); the default filter enables each
 * of them at debug while the rest of the dependency tree stays at warn, so
 * one subsystem can be dialed up or down without drowning in the others.
 * `RUST_LOG` overrides the whole filter when set. Panics are captured to
 * `logs/crash.log` with a full backtrace.
 */

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Once, OnceLock};

use tracing_appender::non_blocking::NonBlocking;
use tracing_subscriber::{
	EnvFilter, Layer, fmt::time::SystemTime, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::global::{CRASH_LOG, LATEST_LOG, LOG_DIR};

/// The tracing targets this crate emits under, one per subsystem.
pub const SUBSYSTEM_TARGETS: [&str; 8] = [
	"change_engine",
	"orchestrator_pipeline",
	"event_bus",
	"llm_gateway",
	"migration",
	"summarizer",
	"store",
	"places",
];

static INIT_LOG: Once = Once::new();
static LOG_WRITER: OnceLock<NonBlocking> = OnceLock::new();

/// `RUST_LOG` wins when set; otherwise each subsystem target gets debug and
/// everything else is capped at warn.
fn subsystem_filter() -> EnvFilter {
	if std::env::var(EnvFilter::DEFAULT_ENV).is_ok() {
		return EnvFilter::from_default_env();
	}
	let directives: Vec<String> = SUBSYSTEM_TARGETS
		.iter()
		.map(|target| format!("{target}=debug"))
		.collect();
	EnvFilter::new(format!("warn,{}", directives.join(",")))
}

/// Creates the tracing registry with a single file layer writing to
/// `logs/latest.log`, filtered by [subsystem_filter]. Load `.env` with
/// [dotenvy] first if `RUST_LOG` comes from there.
pub fn init_logger() {
	INIT_LOG.call_once(|| {
		_ = fs::create_dir_all(LOG_DIR);
		_ = fs::remove_file(Path::new(LOG_DIR).join(LATEST_LOG));
		let (writer, guard) = tracing_appender::non_blocking(
			tracing_appender::rolling::never(LOG_DIR, LATEST_LOG),
		);
		let file_layer = tracing_subscriber::fmt::layer()
			.with_timer(SystemTime)
			.with_ansi(false)
			.with_target(true)
			.with_file(true)
			.with_line_number(true)
			.compact()
			.with_writer(writer.clone())
			.with_filter(subsystem_filter());
		tracing_subscriber::registry().with(file_layer).init();

		_ = LOG_WRITER.set(writer);

		// The guard must outlive every log call; the OS reclaims it on exit.
		Box::leak(Box::new(guard));
	})
}

/// Routes panics to `logs/crash.log` with a forced backtrace, and echoes
/// them through tracing so the crash shows up in `latest.log` too.
pub fn init_panic_handler() {
	std::panic::set_hook(Box::new(|panic_info| {
		tracing::error!(target: "crash", "{panic_info}");
		eprintln!("{panic_info}");

		const WRITE_ERR: &str = "Could not write to crash log";
		fs::create_dir_all(LOG_DIR).expect("Could not create log dir");
		let file = File::create(Path::new(LOG_DIR).join(CRASH_LOG))
			.expect("Could not create crash log file");
		let backtrace = std::backtrace::Backtrace::force_capture();
		let mut writer = BufWriter::new(file);

		writeln!(writer, "Time: {}", chrono::Local::now()).expect(WRITE_ERR);
		writeln!(writer, "{panic_info}").expect(WRITE_ERR);
		writeln!(writer, "stack backtrace:\n{backtrace}").expect(WRITE_ERR);
		writer.flush().expect(WRITE_ERR);
	}));
}

/// Handle to the non-blocking writer, for explicit flushes in tests.
pub fn log_writer() -> NonBlocking {
	LOG_WRITER.get().expect("Logger not initialized").clone()
}
