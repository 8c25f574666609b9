//! 日志级别解析：状态码 → 级别名

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Severity {
    pub const DEFAULT: Severity = Severity::Info;

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "trace",
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trace" => Ok(Severity::Trace),
            "debug" => Ok(Severity::Debug),
            "info" => Ok(Severity::Info),
            "warn" => Ok(Severity::Warn),
            "error" => Ok(Severity::Error),
            other => Err(format!("unsupported log level: {}", other)),
        }
    }
}

/// 状态码（精确值或 "Nxx" 分组）到级别名的映射
pub type LevelsMap = BTreeMap<String, String>;

pub fn default_levels() -> LevelsMap {
    [("2xx", "info"), ("3xx", "info"), ("4xx", "info"), ("5xx", "error")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// 精确状态码优先，其次 "Nxx" 分组，否则为 info；非法级别名同样回落到 info
pub fn resolve_severity(status_code: Option<u16>, levels: &LevelsMap) -> Severity {
    let Some(status) = status_code else {
        return Severity::DEFAULT;
    };

    let status = status.to_string();
    let configured = match levels.get(&status) {
        Some(level) => Some(level),
        None => {
            let group = format!("{}xx", &status[..1]);
            levels.get(&group)
        }
    };

    configured
        .and_then(|level| level.parse().ok())
        .unwrap_or(Severity::DEFAULT)
}
