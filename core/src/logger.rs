use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};

use chrono::Local;

/// Minimum level printed to stderr. Everything is kept in the ring buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }

    fn from_env() -> LogLevel {
        match std::env::var("NEOSCENE_LOG_LEVEL")
            .unwrap_or_default()
            .to_uppercase()
            .as_str()
        {
            "DEBUG" => LogLevel::Debug,
            "WARN" => LogLevel::Warn,
            "ERROR" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

pub struct LogEntry {
    pub timestamp: String,
    pub level: LogLevel,
    pub module: String,
    pub message: String,
}

impl LogEntry {
    fn format(&self) -> String {
        format!(
            "[{}] [{}] [{}] {}",
            self.timestamp,
            self.level.as_str(),
            self.module,
            self.message
        )
    }
}

pub struct Logger {
    ring_buffer: VecDeque<LogEntry>,
    max_entries: usize,
    stderr_level: LogLevel,
    file_path: Option<PathBuf>,
}

static LOGGER: OnceLock<Arc<Mutex<Logger>>> = OnceLock::new();

fn get_logger() -> &'static Arc<Mutex<Logger>> {
    LOGGER.get_or_init(|| Arc::new(Mutex::new(Logger::new(1000))))
}

impl Logger {
    pub fn new(max_entries: usize) -> Self {
        Self {
            ring_buffer: VecDeque::with_capacity(max_entries),
            max_entries,
            stderr_level: LogLevel::from_env(),
            file_path: None,
        }
    }

    pub fn set_file_path(&mut self, path: PathBuf) {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        self.file_path = Some(path);
    }

    pub fn log(&mut self, level: LogLevel, module: &str, message: &str) {
        let entry = LogEntry {
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
            level,
            module: module.to_string(),
            message: message.to_string(),
        };

        if level >= self.stderr_level {
            eprintln!("{}", entry.format());
        }

        if let Some(path) = &self.file_path {
            if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
                let _ = writeln!(file, "{}", entry.format());
            }
        }

        if self.ring_buffer.len() >= self.max_entries {
            self.ring_buffer.pop_front();
        }
        self.ring_buffer.push_back(entry);
    }

    pub fn get_recent(&self, n: usize) -> Vec<String> {
        self.ring_buffer
            .iter()
            .rev()
            .take(n)
            .map(|e| e.format())
            .collect::<Vec<_>>()
    }
}

/// Point the global logger at a log file (in addition to stderr + ring buffer).
pub fn init(data_dir: PathBuf) {
    let logger = get_logger();
    let mut logger = logger.lock().unwrap();
    logger.set_file_path(data_dir.join("neoscene.log"));
}

pub fn log(level: LogLevel, module: &str, message: impl Into<String>) {
    let logger = get_logger();
    let mut logger = logger.lock().unwrap();
    logger.log(level, module, &message.into());
}

pub fn get_recent_logs(n: usize) -> Vec<String> {
    let logger = get_logger();
    let logger = logger.lock().unwrap();
    logger.get_recent(n)
}

#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        $crate::logger::log($crate::logger::LogLevel::Debug, module_path!(), format!($($arg)*));
    };
}

#[macro_export]
macro_rules! info_log {
    ($($arg:tt)*) => {
        $crate::logger::log($crate::logger::LogLevel::Info, module_path!(), format!($($arg)*));
    };
}

#[macro_export]
macro_rules! warn_log {
    ($($arg:tt)*) => {
        $crate::logger::log($crate::logger::LogLevel::Warn, module_path!(), format!($($arg)*));
    };
}

#[macro_export]
macro_rules! error_log {
    ($($arg:tt)*) => {
        $crate::logger::log($crate::logger::LogLevel::Error, module_path!(), format!($($arg)*));
    };
}
