use std::path::{Path, PathBuf};

pub const LOG_FILE_BASENAME: &str = "todo-sync";
pub const LOG_FILE_SUFFIX: &str = "log";
pub const LOG_ROTATE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
pub const LOG_ROTATE_KEEP_FILES: usize = 10;
pub const LOG_ENV: &str = "TODO_SYNC_LOG";

/// Log files sit in a `logs/` folder next to the task data.
pub fn log_directory(data_dir: &Path) -> PathBuf {
    data_dir.join("logs")
}

/// Picks the filter spec: `TODO_SYNC_LOG`, then `RUST_LOG`, then the build default.
pub fn log_spec() -> String {
    let default_spec = if cfg!(debug_assertions) {
        "warn,todo_sync_lib=debug"
    } else {
        "warn,todo_sync_lib=info"
    };
    [LOG_ENV, "RUST_LOG"]
        .iter()
        .find_map(|name| {
            std::env::var(name)
                .ok()
                .filter(|value| !value.trim().is_empty())
        })
        .unwrap_or_else(|| default_spec.to_string())
}

#[cfg(all(feature = "app", not(test)))]
pub fn init_logging(data_dir: &Path) -> Result<(), flexi_logger::FlexiLoggerError> {
    use flexi_logger::{
        detailed_format, Cleanup, Criterion, Duplicate, FileSpec, Logger, Naming, WriteMode,
    };

    let directory = log_directory(data_dir);
    std::fs::create_dir_all(&directory)?;

    Logger::try_with_str(log_spec())?
        .log_to_file(
            FileSpec::default()
                .directory(&directory)
                .basename(LOG_FILE_BASENAME)
                .suffix(LOG_FILE_SUFFIX),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .format_for_files(detailed_format)
        .rotate(
            Criterion::Size(LOG_ROTATE_SIZE_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(LOG_ROTATE_KEEP_FILES),
        )
        // stdout belongs to command output in release builds.
        .duplicate_to_stderr(if cfg!(debug_assertions) {
            Duplicate::Info
        } else {
            Duplicate::None
        })
        .start()?;

    install_panic_hook();

    log::info!(
        "logger initialized dir={} rotate_size_bytes={} keep_files={}",
        directory.display(),
        LOG_ROTATE_SIZE_BYTES,
        LOG_ROTATE_KEEP_FILES
    );
    Ok(())
}

/// Text of a panic payload, for the two payload types `panic!` produces.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<non-string panic payload>"
    }
}

/// Logs panics (with a backtrace) before the default hook prints them, so a
/// crash in a background task still reaches the log file.
#[cfg(all(feature = "app", not(test)))]
fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info: &std::panic::PanicHookInfo<'_>| {
        let location = info
            .location()
            .map_or_else(|| "<unknown>".to_string(), ToString::to_string);
        log::error!(
            "panic: {} at {location}\nbacktrace:\n{}",
            panic_message(info.payload()),
            std::backtrace::Backtrace::force_capture()
        );
        default_hook(info);
    }));
}
