//! 审计日志输出端
//!
//! 核心只依赖 `AuditSink` trait：按级别输出一个结构化对象和可选消息。
//! 默认实现写入 `tracing`；`MemorySink` 用于测试和嵌入式场景收集记录。

use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::audit::severity::Severity;

/// tracing 事件的 target
pub const AUDIT_TARGET: &str = "ironaudit::audit";

pub trait AuditSink: Send + Sync {
    fn log(&self, level: Severity, payload: &Value, message: Option<&str>);

    fn trace(&self, payload: &Value, message: Option<&str>) {
        self.log(Severity::Trace, payload, message);
    }

    fn debug(&self, payload: &Value, message: Option<&str>) {
        self.log(Severity::Debug, payload, message);
    }

    fn info(&self, payload: &Value, message: Option<&str>) {
        self.log(Severity::Info, payload, message);
    }

    fn warn(&self, payload: &Value, message: Option<&str>) {
        self.log(Severity::Warn, payload, message);
    }

    fn error(&self, payload: &Value, message: Option<&str>) {
        self.log(Severity::Error, payload, message);
    }
}

/// 写入 tracing，记录以 JSON 字符串放在 `audit` 字段
#[derive(Debug, Clone, Default)]
pub struct TracingSink;

macro_rules! audit_event {
    ($level:expr, $payload:expr, $message:expr) => {
        tracing::event!(target: AUDIT_TARGET, $level, audit = %$payload, "{}", $message)
    };
}

impl AuditSink for TracingSink {
    fn log(&self, level: Severity, payload: &Value, message: Option<&str>) {
        let message = message.unwrap_or("audit");
        match level {
            Severity::Trace => audit_event!(tracing::Level::TRACE, payload, message),
            Severity::Debug => audit_event!(tracing::Level::DEBUG, payload, message),
            Severity::Info => audit_event!(tracing::Level::INFO, payload, message),
            Severity::Warn => audit_event!(tracing::Level::WARN, payload, message),
            Severity::Error => audit_event!(tracing::Level::ERROR, payload, message),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoggedEntry {
    pub level: Severity,
    pub payload: Value,
    pub message: Option<String>,
}

/// 内存收集器，克隆后共享同一缓冲
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    entries: Arc<Mutex<Vec<LoggedEntry>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LoggedEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn entries_at(&self, level: Severity) -> Vec<LoggedEntry> {
        self.entries()
            .into_iter()
            .filter(|entry| entry.level == level)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

impl AuditSink for MemorySink {
    fn log(&self, level: Severity, payload: &Value, message: Option<&str>) {
        let entry = LoggedEntry {
            level,
            payload: payload.clone(),
            message: message.map(str::to_string),
        };
        match self.entries.lock() {
            Ok(mut entries) => entries.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }
}
