#[cfg(debug_assertions)]
use simplelog::{ColorChoice, TermLogger, TerminalMode};
use simplelog::{
    CombinedLogger, Config, ConfigBuilder, LevelFilter, SharedLogger, ThreadLogMode, WriteLogger,
};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use updater_platform::AppPaths;

use crate::settings::UpdaterSettings;

/// Only records from our own crates are logged.
const LOG_TARGET: &str = "updater";

/// Append-only log file that reopens itself if it is deleted mid-run.
struct ReopeningLogFile {
    path: PathBuf,
    file: File,
}

impl ReopeningLogFile {
    fn open(path: PathBuf) -> io::Result<Self> {
        let file = append_to(&path)?;
        Ok(Self { path, file })
    }

    fn reopen_if_missing(&mut self) -> io::Result<()> {
        if !self.path.exists() {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            self.file = append_to(&self.path)?;
        }
        Ok(())
    }
}

impl Write for ReopeningLogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.reopen_if_missing()?;
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn append_to(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Drop the older half of the log, cut at a line boundary, once it has grown
/// past `max_log_size`.
fn trim_to_newest_half(log_path: &Path, max_log_size: u64) -> bool {
    let Ok(metadata) = std::fs::metadata(log_path) else {
        return false;
    };
    if metadata.len() <= max_log_size {
        return false;
    }
    let Ok(contents) = std::fs::read(log_path) else {
        return false;
    };

    let half = contents.len() / 2;
    let keep_from = contents[half..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(half, |pos| half + pos + 1);
    std::fs::write(log_path, &contents[keep_from..]).is_ok()
}

fn log_config() -> Config {
    ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_thread_level(LevelFilter::Debug)
        .set_thread_mode(ThreadLogMode::Both)
        .add_filter_allow_str(LOG_TARGET)
        .build()
}

/// Install the global logger and return the log file in use, if any.
///
/// Logging is best effort: the installer runs the same whether or not a log
/// file could be opened.
pub fn init_logging(settings: &UpdaterSettings) -> Option<PathBuf> {
    let log_path = AppPaths::new().ok().and_then(|paths| {
        paths.ensure_dirs().ok()?;
        Some(paths.log_file())
    });

    let config = log_config();
    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();

    #[cfg(debug_assertions)]
    loggers.push(TermLogger::new(
        LevelFilter::Debug,
        config.clone(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    ));

    let log_path = log_path.filter(|path| {
        trim_to_newest_half(path, settings.max_log_size_bytes);
        match ReopeningLogFile::open(path.clone()) {
            Ok(writer) => {
                loggers.push(WriteLogger::new(LevelFilter::Debug, config.clone(), writer));
                true
            }
            Err(error) => {
                eprintln!("Cannot open log file {}: {error}", path.display());
                false
            }
        }
    });

    if !loggers.is_empty() {
        let _ = CombinedLogger::init(loggers);
    }
    set_logging_enabled(settings.debug_logging);

    if let Some(path) = &log_path {
        log::debug!("Installer log file: {}", path.display());
    }
    log_path
}

pub fn set_logging_enabled(enabled: bool) {
    if enabled {
        log::set_max_level(LevelFilter::Debug);
    } else {
        log::set_max_level(LevelFilter::Info);
    }
}
