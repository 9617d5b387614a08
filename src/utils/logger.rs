// src/utils/logger.rs

use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;

#[cfg(target_arch = "wasm32")]
use worker::console_log;

/// Log levels supported by the logger
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }

    pub fn from_string(s: &str) -> LogLevel {
        match s.to_lowercase().as_str() {
            "error" => LogLevel::Error,
            "warn" | "warning" => LogLevel::Warn,
            "info" => LogLevel::Info,
            "debug" => LogLevel::Debug,
            _ => LogLevel::Info, // default
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn as_log_level(&self) -> log::Level {
        match self {
            LogLevel::Error => log::Level::Error,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
        }
    }
}

/// Structured JSON logger. Workers console on wasm, the `log` facade elsewhere.
#[derive(Debug, Clone)]
pub struct Logger {
    level: LogLevel,
    context: HashMap<String, Value>,
}

impl Logger {
    pub fn new(level: LogLevel) -> Self {
        Self {
            level,
            context: HashMap::new(),
        }
    }

    pub fn from_env() -> Self {
        let level_str = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        Self::new(LogLevel::from_string(&level_str))
    }

    pub fn child(&self, context: HashMap<String, Value>) -> Self {
        let mut new_context = self.context.clone();
        new_context.extend(context);

        Self {
            level: self.level.clone(),
            context: new_context,
        }
    }

    /// Child logger tagged with a `component` field.
    pub fn component(&self, name: &str) -> Self {
        let mut context = HashMap::new();
        context.insert("component".to_string(), Value::String(name.to_string()));
        self.child(context)
    }

    fn should_log(&self, level: &LogLevel) -> bool {
        level <= &self.level
    }

    fn format_message(&self, level: &LogLevel, message: &str, meta: Option<&Value>) -> String {
        let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f UTC");

        let mut log_obj = serde_json::json!({
            "timestamp": timestamp.to_string(),
            "level": level.as_str(),
            "message": message,
        });

        if !self.context.is_empty() {
            log_obj["context"] = Value::Object(
                self.context
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            );
        }

        if let Some(meta) = meta {
            log_obj["meta"] = meta.clone();
        }

        serde_json::to_string(&log_obj)
            .unwrap_or_else(|_| format!("[{}] {}: {}", timestamp, level.as_str(), message))
    }

    fn emit(&self, level: LogLevel, message: &str, meta: Option<&Value>) {
        if !self.should_log(&level) {
            return;
        }
        let formatted = self.format_message(&level, message, meta);

        #[cfg(target_arch = "wasm32")]
        console_log!("{}", formatted);

        #[cfg(not(target_arch = "wasm32"))]
        log::log!(target: "grant_sync", level.as_log_level(), "{}", formatted);
    }

    pub fn error(&self, message: &str) {
        self.error_with_meta(message, None);
    }

    pub fn error_with_meta(&self, message: &str, meta: Option<&Value>) {
        self.emit(LogLevel::Error, message, meta);
    }

    pub fn warn(&self, message: &str) {
        self.warn_with_meta(message, None);
    }

    pub fn warn_with_meta(&self, message: &str, meta: Option<&Value>) {
        self.emit(LogLevel::Warn, message, meta);
    }

    pub fn info(&self, message: &str) {
        self.info_with_meta(message, None);
    }

    pub fn info_with_meta(&self, message: &str, meta: Option<&Value>) {
        self.emit(LogLevel::Info, message, meta);
    }

    pub fn debug(&self, message: &str) {
        self.debug_with_meta(message, None);
    }

    pub fn debug_with_meta(&self, message: &str, meta: Option<&Value>) {
        self.emit(LogLevel::Debug, message, meta);
    }
}

/// Global logger instance - thread-safe singleton
static GLOBAL_LOGGER: OnceLock<Logger> = OnceLock::new();

/// Initialize the global logger. Ignored once a logger is in place.
pub fn init_logger(level: LogLevel) {
    GLOBAL_LOGGER.set(Logger::new(level)).ok();
}

/// Get a reference to the global logger
pub fn logger() -> &'static Logger {
    GLOBAL_LOGGER.get_or_init(Logger::from_env)
}

pub fn set_panic_hook() {
    // Better panic messages in the Workers console
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();
}

/// Convenience macros for logging
#[macro_export]
macro_rules! log_error {
    ($msg:expr) => {
        $crate::utils::logger::logger().error($msg)
    };
    ($msg:expr, $meta:expr) => {
        $crate::utils::logger::logger().error_with_meta($msg, Some(&$meta))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($msg:expr) => {
        $crate::utils::logger::logger().warn($msg)
    };
    ($msg:expr, $meta:expr) => {
        $crate::utils::logger::logger().warn_with_meta($msg, Some(&$meta))
    };
}

#[macro_export]
macro_rules! log_info {
    ($msg:expr) => {
        $crate::utils::logger::logger().info($msg)
    };
    ($msg:expr, $meta:expr) => {
        $crate::utils::logger::logger().info_with_meta($msg, Some(&$meta))
    };
}

#[macro_export]
macro_rules! log_debug {
    ($msg:expr) => {
        $crate::utils::logger::logger().debug($msg)
    };
    ($msg:expr, $meta:expr) => {
        $crate::utils::logger::logger().debug_with_meta($msg, Some(&$meta))
    };
}
