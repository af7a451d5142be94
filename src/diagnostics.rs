// In: src/diagnostics.rs

//! Process-wide logger setup. Pipeline code only uses the `log` macros; this is
//! the one place that decides where those records go.

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::Once;

use log::LevelFilter;

/// The diagnostics file used when the caller names none.
pub const DEFAULT_LOG_FILE: &str = "log.txt";

static INIT_LOGGER: Once = Once::new();

/// Installs the logger once per process. Later calls are no-ops, even with a
/// different target.
///
/// With `log_file` set, records are appended to that file; otherwise they go to
/// stderr. Opening the file is the only thing that can fail.
pub fn init(log_file: Option<&Path>, level: LevelFilter) -> io::Result<()> {
    let file = match log_file {
        Some(path) => Some(OpenOptions::new().append(true).create(true).open(path)?),
        None => None,
    };

    INIT_LOGGER.call_once(move || {
        let mut builder = env_logger::Builder::new();

        builder.is_test(false);
        builder.filter_level(level);

        // Level and message only
        builder.format(|buf, record| {
            use std::io::Write;
            writeln!(buf, "[{}] {}", record.level(), record.args())?;
            buf.flush()?;
            Ok(())
        });

        if let Some(file) = file {
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }

        let _ = builder.try_init();
    });
    Ok(())
}
