// src/logger/mod.rs

//! Leveled log sinks
//!
//! A [`Logger`] receives already-formatted messages with a [`Level`]. Its
//! level may be unset, in which case nothing is filtered; asking for the
//! level of an unset logger is an error rather than a silent default.
//!
//! Sinks:
//! - `StringLogger`: in-memory buffer (tests, embedding)
//! - `FileLogger`: append-only file
//! - `ConsoleLogger`: stderr
//!
//! Every sink writes lines as `<RFC3339 time> [<pid>] <LEVEL> <message>`.
//! [`layer::LoggerLayer`] feeds `tracing` events into any of them.

pub mod layer;

pub use layer::LoggerLayer;

use crate::error::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};

/// Log severity, most severe first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Level {
    Critical,
    Error,
    Warning,
    Notice,
    Info,
    Debug,
    Trace,
}

impl Level {
    pub const ALL: [Level; 7] = [
        Level::Critical,
        Level::Error,
        Level::Warning,
        Level::Notice,
        Level::Info,
        Level::Debug,
        Level::Trace,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::Error => "ERROR",
            Self::Warning => "WARNING",
            Self::Notice => "NOTICE",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
            Self::Trace => "TRACE",
        }
    }

    fn to_u8(self) -> u8 {
        self as u8 + 1
    }

    fn from_u8(value: u8) -> Option<Self> {
        value
            .checked_sub(1)
            .and_then(|idx| Self::ALL.get(idx as usize).copied())
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "CRITICAL" => Ok(Self::Critical),
            "ERROR" => Ok(Self::Error),
            "WARNING" | "WARN" => Ok(Self::Warning),
            "NOTICE" => Ok(Self::Notice),
            "INFO" => Ok(Self::Info),
            "DEBUG" => Ok(Self::Debug),
            "TRACE" => Ok(Self::Trace),
            _ => Err(Error::ParseError(format!("Unknown log level: {}", s))),
        }
    }
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::ERROR => Self::Error,
            tracing::Level::WARN => Self::Warning,
            tracing::Level::INFO => Self::Info,
            tracing::Level::DEBUG => Self::Debug,
            tracing::Level::TRACE => Self::Trace,
        }
    }
}

/// Filtering threshold of a logger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelSetting {
    /// No filtering
    Unset,
    /// Drop messages less severe than this
    Set(Level),
}

impl LevelSetting {
    /// Would a message at `level` be written?
    pub fn allows(&self, level: Level) -> bool {
        match self {
            Self::Unset => true,
            Self::Set(threshold) => level <= *threshold,
        }
    }
}

/// Lock-free storage for a [`LevelSetting`]
#[derive(Debug, Default)]
pub struct LevelCell(AtomicU8);

impl LevelCell {
    pub fn new(setting: LevelSetting) -> Self {
        let cell = Self::default();
        cell.set(setting);
        cell
    }

    pub fn get(&self) -> LevelSetting {
        match Level::from_u8(self.0.load(Ordering::Acquire)) {
            Some(level) => LevelSetting::Set(level),
            None => LevelSetting::Unset,
        }
    }

    pub fn set(&self, setting: LevelSetting) {
        let raw = match setting {
            LevelSetting::Unset => 0,
            LevelSetting::Set(level) => level.to_u8(),
        };
        self.0.store(raw, Ordering::Release);
    }
}

/// Format one log line (without trailing newline)
pub fn format_line(time: DateTime<Utc>, pid: u32, level: Level, message: &str) -> String {
    format!(
        "{} [{}] {} {}",
        time.to_rfc3339_opts(SecondsFormat::Secs, true),
        pid,
        level,
        message
    )
}

/// A leveled sink
pub trait Logger: Send + Sync {
    fn level_setting(&self) -> LevelSetting;

    fn set_level(&self, setting: LevelSetting);

    /// Write one message unconditionally
    fn write(&self, time: DateTime<Utc>, pid: u32, level: Level, message: &str);

    /// The configured level; fails with [`Error::LevelNotSet`] when unset
    fn level(&self) -> Result<Level> {
        match self.level_setting() {
            LevelSetting::Set(level) => Ok(level),
            LevelSetting::Unset => Err(Error::LevelNotSet),
        }
    }

    /// Filter by level, then write stamped with the current time and pid
    fn log_line(&self, level: Level, message: &str) {
        if self.level_setting().allows(level) {
            self.write(Utc::now(), std::process::id(), level, message);
        }
    }

    fn error(&self, message: &str) {
        self.log_line(Level::Error, message);
    }

    fn warning(&self, message: &str) {
        self.log_line(Level::Warning, message);
    }

    fn info(&self, message: &str) {
        self.log_line(Level::Info, message);
    }

    fn debug(&self, message: &str) {
        self.log_line(Level::Debug, message);
    }
}

/// Collects lines in memory
#[derive(Debug, Default)]
pub struct StringLogger {
    level: LevelCell,
    buffer: Mutex<String>,
}

impl StringLogger {
    pub fn new(setting: LevelSetting) -> Self {
        Self {
            level: LevelCell::new(setting),
            buffer: Mutex::new(String::new()),
        }
    }

    /// Everything written so far
    pub fn contents(&self) -> String {
        match self.buffer.lock() {
            Ok(buffer) => buffer.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Logger for StringLogger {
    fn level_setting(&self) -> LevelSetting {
        self.level.get()
    }

    fn set_level(&self, setting: LevelSetting) {
        self.level.set(setting);
    }

    fn write(&self, time: DateTime<Utc>, pid: u32, level: Level, message: &str) {
        let line = format_line(time, pid, level, message);
        let mut buffer = match self.buffer.lock() {
            Ok(buffer) => buffer,
            Err(poisoned) => poisoned.into_inner(),
        };
        buffer.push_str(&line);
        buffer.push('\n');
    }
}

/// Appends lines to a file
#[derive(Debug)]
pub struct FileLogger {
    level: LevelCell,
    path: PathBuf,
    file: Mutex<File>,
}

impl FileLogger {
    /// Open (or create) `path` in append mode
    pub fn open<P: AsRef<Path>>(path: P, setting: LevelSetting) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            level: LevelCell::new(setting),
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Logger for FileLogger {
    fn level_setting(&self) -> LevelSetting {
        self.level.get()
    }

    fn set_level(&self, setting: LevelSetting) {
        self.level.set(setting);
    }

    fn write(&self, time: DateTime<Utc>, pid: u32, level: Level, message: &str) {
        let line = format_line(time, pid, level, message);
        let mut file = match self.file.lock() {
            Ok(file) => file,
            Err(poisoned) => poisoned.into_inner(),
        };
        // A log sink has nowhere to report its own write errors
        let _ = writeln!(file, "{}", line);
    }
}

/// Writes lines to stderr
#[derive(Debug, Default)]
pub struct ConsoleLogger {
    level: LevelCell,
}

impl ConsoleLogger {
    pub fn new(setting: LevelSetting) -> Self {
        Self {
            level: LevelCell::new(setting),
        }
    }
}

impl Logger for ConsoleLogger {
    fn level_setting(&self) -> LevelSetting {
        self.level.get()
    }

    fn set_level(&self, setting: LevelSetting) {
        self.level.set(setting);
    }

    fn write(&self, time: DateTime<Utc>, pid: u32, level: Level, message: &str) {
        eprintln!("{}", format_line(time, pid, level, message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_unset_level_is_an_error() {
        let logger = StringLogger::new(LevelSetting::Unset);
        assert!(matches!(logger.level(), Err(Error::LevelNotSet)));

        // Unset means nothing is filtered
        logger.log_line(Level::Trace, "deep detail");
        assert!(logger.contents().contains("TRACE deep detail"));

        logger.set_level(LevelSetting::Set(Level::Notice));
        assert_eq!(logger.level().unwrap(), Level::Notice);
    }

    #[test]
    fn test_filtering() {
        let logger = StringLogger::new(LevelSetting::Set(Level::Warning));
        logger.log_line(Level::Error, "kept");
        logger.log_line(Level::Warning, "kept too");
        logger.log_line(Level::Info, "dropped");

        let contents = logger.contents();
        assert_eq!(contents.lines().count(), 2);
        assert!(!contents.contains("dropped"));
    }

    #[test]
    fn test_line_format() {
        let time = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(
            format_line(time, 42, Level::Info, "hello"),
            "2024-03-01T12:30:00Z [42] INFO hello"
        );
    }

    #[test]
    fn test_file_logger_appends() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("logs/goalpost.log");

        let logger = FileLogger::open(&path, LevelSetting::Unset).unwrap();
        logger.info("first");
        drop(logger);
        let logger = FileLogger::open(&path, LevelSetting::Unset).unwrap();
        logger.info("second");

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.lines().nth(1).unwrap().ends_with("INFO second"));
    }

    #[test]
    fn test_level_parse() {
        assert_eq!("warn".parse::<Level>().unwrap(), Level::Warning);
        assert_eq!("NOTICE".parse::<Level>().unwrap(), Level::Notice);
        assert!("loud".parse::<Level>().is_err());
    }
}
