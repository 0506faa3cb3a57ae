use crate::utils::redact::redact_object;
use serde_json::Value;

/// Longest string kept inside logged metadata before truncation.
const MAX_META_STRING: usize = 2_048;

/// Verbosity in increasing order, so `Ord` answers "is this level enabled"
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    fn from_env() -> Self {
        std::env::var("LOG_LEVEL")
            .ok()
            .and_then(|raw| Self::parse(&raw))
            .unwrap_or(LogLevel::Info)
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "error" => Some(LogLevel::Error),
            "warn" | "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            _ => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }
}

/// Structured stderr logger with dotted child contexts. Every metadata
/// value goes through the redaction pass, so call sites may log request
/// shapes without worrying about credentials leaking.
#[derive(Debug, Clone)]
pub struct Logger {
    context: String,
    level: LogLevel,
}

impl Logger {
    pub fn new(context: &str) -> Self {
        Self {
            context: context.to_string(),
            level: LogLevel::from_env(),
        }
    }

    pub fn child(&self, suffix: &str) -> Self {
        let context = if suffix.is_empty() {
            self.context.clone()
        } else {
            format!("{}.{}", self.context, suffix)
        };
        Self {
            context,
            level: self.level,
        }
    }

    pub fn is_debug(&self) -> bool {
        self.level >= LogLevel::Debug
    }

    fn emit(&self, level: LogLevel, message: &str, meta: Option<&Value>) {
        if level > self.level {
            return;
        }
        let mut line = format!(
            "[{}] {} [{}] {}",
            chrono::Utc::now().to_rfc3339(),
            level.label(),
            self.context,
            message
        );
        if let Some(meta) = meta.filter(|m| !m.is_null()) {
            line.push(' ');
            line.push_str(&redact_object(meta, MAX_META_STRING, None).to_string());
        }
        eprintln!("{}", line);
    }

    pub fn error(&self, message: &str, meta: Option<&Value>) {
        self.emit(LogLevel::Error, message, meta);
    }

    pub fn warn(&self, message: &str, meta: Option<&Value>) {
        self.emit(LogLevel::Warn, message, meta);
    }

    pub fn info(&self, message: &str, meta: Option<&Value>) {
        self.emit(LogLevel::Info, message, meta);
    }

    pub fn debug(&self, message: &str, meta: Option<&Value>) {
        self.emit(LogLevel::Debug, message, meta);
    }
}
