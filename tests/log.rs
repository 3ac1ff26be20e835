#[cfg(test)]
mod tests {
	use {
		serial_test::serial,
		std::{fs, io::Write, path::Path, time::Duration},
		tracing::{error, trace},
		wayfarer::{global::*, log},
	};

	/// Verifies that `logs/latest.log` is created and written to from log events.
	#[test]
	#[serial]
	fn test_logger() {
		unsafe {
			// Safety
			//
			// Not reading/writing this environment variable from multiple threads.
			std::env::set_var("RUST_LOG", "warn,wayfarer=debug");
		}
		let latest_log_path = Path::new(LOG_DIR).join(LATEST_LOG);
		_ = fs::remove_file(latest_log_path.as_path());
		log::init_logger();
		trace!("Test trace");
		error!("Test error");
		log::log_writer().flush().unwrap();
		// Wait for the non-blocking writer to catch up.
		std::thread::sleep(Duration::from_millis(10));
		let logs = fs::read_to_string(latest_log_path).unwrap();
		assert!(logs.contains("Test error"));
	}

	/// Verifies that `logs/crash.log` is created and written to on a panic.
	#[test]
	#[serial]
	fn test_panic_handler() {
		let crash_log_path = Path::new(LOG_DIR).join(CRASH_LOG);
		_ = fs::remove_file(crash_log_path.as_path());
		log::init_panic_handler();
		std::panic::catch_unwind(|| {
			panic!("Test panic");
		})
		.unwrap_err();
		assert!(fs::read_to_string(crash_log_path).unwrap().contains("Test panic"));
	}
}
