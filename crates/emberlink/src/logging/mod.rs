// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! Logging outputs and `log` facade bridge.
//!
//! Library code logs through the `log` crate macros with a `[SUBSYS]` tag
//! (`[HOST]`, `[TLS]`, `[SNTP]`, ...). This module supplies the backend:
//! an [`Output`] abstraction (console, file) plus a global logger that
//! installs itself as the `log` facade implementation.
//!
//! ```no_run
//! emberlink::logging::init(emberlink::logging::LogLevel::Debug);
//! log::info!("[APP] boot complete");
//! ```

mod output;

pub use output::{ConsoleOutput, FileOutput, LogLevel, Output};

use std::sync::{Arc, OnceLock};

static LOGGER: OnceLock<Bridge> = OnceLock::new();

struct Bridge {
    output: Arc<dyn Output>,
    level: LogLevel,
}

impl log::Log for Bridge {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        LogLevel::from_facade(metadata.level()) >= self.level
    }

    fn log(&self, record: &log::Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let level = LogLevel::from_facade(record.level());
        // Output failures are non-fatal; logging must never take the
        // process down.
        let _ = self.output.write(level, &format!("{}", record.args()));
    }

    fn flush(&self) {
        let _ = self.output.flush();
    }
}

/// Install a console logger at `level` as the global `log` backend.
///
/// Subsequent calls are ignored (first install wins).
pub fn init(level: LogLevel) {
    init_with(Arc::new(ConsoleOutput::new()), level);
}

/// Install an explicit output as the global `log` backend.
pub fn init_with(output: Arc<dyn Output>, level: LogLevel) {
    let bridge = LOGGER.get_or_init(|| Bridge { output, level });
    // set_logger fails if another backend got there first; that backend
    // keeps receiving the records.
    let _ = log::set_logger(bridge);
    log::set_max_level(level.to_facade().to_level_filter());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Mutex;

    struct CaptureOutput {
        lines: Mutex<Vec<(LogLevel, String)>>,
    }

    impl Output for CaptureOutput {
        fn write(&self, level: LogLevel, message: &str) -> io::Result<()> {
            self.lines.lock().unwrap().push((level, message.to_string()));
            Ok(())
        }

        fn flush(&self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn bridge_filters_below_level() {
        let output = Arc::new(CaptureOutput {
            lines: Mutex::new(Vec::new()),
        });
        let bridge = Bridge {
            output: output.clone(),
            level: LogLevel::Info,
        };
        use log::Log;
        bridge.log(
            &log::Record::builder()
                .args(format_args!("[TEST] dropped"))
                .level(log::Level::Debug)
                .build(),
        );
        bridge.log(
            &log::Record::builder()
                .args(format_args!("[TEST] kept"))
                .level(log::Level::Warn)
                .build(),
        );
        let lines = output.lines.lock().unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].0, LogLevel::Warning);
        assert!(lines[0].1.contains("kept"));
    }
}
