//! 配置管理模块
//! 审计策略支持从环境变量、TOML 配置文件和 JSON 值加载；钩子函数只能在代码中设置

use std::{fmt, path::Path, sync::Arc};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    audit::{
        severity::{default_levels, LevelsMap},
        transaction::{RequestInfo, ResponseInfo},
    },
    error::{AuditError, AuditResult},
    infrastructure::sink::{AuditSink, TracingSink},
};

/// 单个请求体/响应体为审计保留的最大字节数，与 axum `DefaultBodyLimit` 的默认值一致
pub const DEFAULT_MAX_CAPTURE_BYTES: usize = 2 * 1024 * 1024;

/// 请求侧审计策略
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestPolicy {
    pub audit: bool,
    pub mask_body: Vec<String>,
    pub mask_query: Vec<String>,
    pub mask_headers: Vec<String>,
    pub exclude_body: Vec<String>,
    pub exclude_headers: Vec<String>,
    pub max_body_length: Option<usize>,
    /// 超过此字节数的内容不保留，记录为 "N/A"；内容本身照常传递
    pub max_capture_bytes: usize,
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self {
            audit: true,
            mask_body: Vec::new(),
            mask_query: Vec::new(),
            mask_headers: Vec::new(),
            exclude_body: Vec::new(),
            exclude_headers: Vec::new(),
            max_body_length: None,
            max_capture_bytes: DEFAULT_MAX_CAPTURE_BYTES,
        }
    }
}

/// 响应侧审计策略
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponsePolicy {
    pub audit: bool,
    pub mask_body: Vec<String>,
    pub mask_headers: Vec<String>,
    pub exclude_body: Vec<String>,
    pub exclude_headers: Vec<String>,
    pub max_body_length: Option<usize>,
    /// 超过此字节数的内容不保留，记录为 "N/A"；内容本身照常传递
    pub max_capture_bytes: usize,
}

impl Default for ResponsePolicy {
    fn default() -> Self {
        Self {
            audit: true,
            mask_body: Vec::new(),
            mask_headers: Vec::new(),
            exclude_body: Vec::new(),
            exclude_headers: Vec::new(),
            max_body_length: None,
            max_capture_bytes: DEFAULT_MAX_CAPTURE_BYTES,
        }
    }
}

/// 审计策略中可序列化的部分
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSettings {
    pub request: RequestPolicy,
    pub response: ResponsePolicy,
    pub double_audit: bool,
    pub exclude_urls: Vec<String>,
    pub levels: LevelsMap,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            request: RequestPolicy::default(),
            response: ResponsePolicy::default(),
            double_audit: false,
            exclude_urls: Vec::new(),
            levels: default_levels(),
        }
    }
}

impl AuditSettings {
    /// 从未定型的配置值构建
    ///
    /// 缺省字段取默认值（含 levels 的逐项合并）；默认值为数组的字段若给了非数组值，
    /// 直接返回 `AuditError::InvalidField`。
    pub fn from_value(mut value: Value) -> AuditResult<Self> {
        let defaults = serde_json::to_value(Self::default()).map_err(AuditError::ConfigJson)?;
        validate_array_fields(&value, &defaults, "")?;
        normalize_body_length_fields(&mut value);

        let merged = merge_defaults(defaults, value);
        let settings: Self = serde_json::from_value(merged).map_err(AuditError::ConfigJson)?;
        Ok(settings.normalized())
    }

    pub fn from_json_str(content: &str) -> AuditResult<Self> {
        let value: Value = serde_json::from_str(content).map_err(AuditError::ConfigJson)?;
        Self::from_value(value)
    }

    pub fn from_toml_str(content: &str) -> AuditResult<Self> {
        let value: Value = toml::from_str(content)?;
        Self::from_value(value)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> AuditResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// 从环境变量加载
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        if let Some(urls) = env_list("AUDIT_EXCLUDE_URLS") {
            settings.exclude_urls = urls;
        }
        settings.double_audit = std::env::var("AUDIT_DOUBLE_AUDIT")
            .ok()
            .map(|v| v == "1")
            .unwrap_or(false);
        settings.request.max_body_length = std::env::var("AUDIT_REQUEST_MAX_BODY_LENGTH")
            .ok()
            .and_then(|s| s.parse().ok());
        settings.response.max_body_length = std::env::var("AUDIT_RESPONSE_MAX_BODY_LENGTH")
            .ok()
            .and_then(|s| s.parse().ok());
        if let Some(limit) = std::env::var("AUDIT_MAX_CAPTURE_BYTES")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
        {
            settings.request.max_capture_bytes = limit;
            settings.response.max_capture_bytes = limit;
        }
        if let Some(fields) = env_list("AUDIT_REQUEST_MASK_BODY") {
            settings.request.mask_body = fields;
        }
        if let Some(fields) = env_list("AUDIT_RESPONSE_MASK_BODY") {
            settings.response.mask_body = fields;
        }

        settings.normalized()
    }

    /// 环境变量与配置文件合并加载（配置文件存在时优先）
    pub fn from_env_and_file<P: AsRef<Path>>(path: Option<P>) -> AuditResult<Self> {
        match path {
            Some(path) if path.as_ref().exists() => Self::from_file(path),
            _ => Ok(Self::from_env()),
        }
    }

    /// 非正数长度视为未设置；请求头名统一小写
    pub fn normalized(mut self) -> Self {
        self.request.max_body_length = self.request.max_body_length.filter(|len| *len > 0);
        self.response.max_body_length = self.response.max_body_length.filter(|len| *len > 0);
        lowercase_all(&mut self.request.mask_headers);
        lowercase_all(&mut self.request.exclude_headers);
        lowercase_all(&mut self.response.mask_headers);
        lowercase_all(&mut self.response.exclude_headers);
        self
    }
}

fn env_list(key: &str) -> Option<Vec<String>> {
    std::env::var(key).ok().map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect()
    })
}

fn lowercase_all(items: &mut [String]) {
    for item in items.iter_mut() {
        *item = item.to_ascii_lowercase();
    }
}

fn validate_array_fields(options: &Value, defaults: &Value, prefix: &str) -> AuditResult<()> {
    let Value::Object(default_map) = defaults else {
        return Ok(());
    };

    for (key, default_value) in default_map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        let Some(option_value) = options.get(key) else {
            continue;
        };

        match default_value {
            Value::Array(_) if !option_value.is_array() => {
                return Err(AuditError::invalid_field(path));
            }
            Value::Object(_) => validate_array_fields(option_value, default_value, &path)?,
            _ => {}
        }
    }
    Ok(())
}

fn normalize_body_length_fields(value: &mut Value) {
    for side in ["request", "response"] {
        if let Some(Value::Object(policy)) = value.get_mut(side) {
            if let Some(raw) = policy.get("max_body_length") {
                let normalized = positive_length(raw).map(Value::from).unwrap_or(Value::Null);
                policy.insert("max_body_length".to_string(), normalized);
            }
        }
    }
}

fn positive_length(raw: &Value) -> Option<u64> {
    let number = match raw {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if number.is_finite() && number >= 1.0 {
        Some(number as u64)
    } else {
        None
    }
}

/// 深度合并：用户值覆盖默认值，嵌套对象逐项合并
fn merge_defaults(defaults: Value, overrides: Value) -> Value {
    match (defaults, overrides) {
        (Value::Object(mut base), Value::Object(over)) => {
            for (key, value) in over {
                let merged = match base.remove(&key) {
                    Some(existing) => merge_defaults(existing, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            Value::Object(base)
        }
        (base, Value::Null) => base,
        (_, over) => over,
    }
}

pub type SetupFunc = Arc<dyn Fn(&mut RequestInfo, &mut ResponseInfo) + Send + Sync>;
pub type ShouldSkipAuditFunc = Arc<dyn Fn(&RequestInfo, &ResponseInfo) -> bool + Send + Sync>;
pub type CustomMaskBodyFunc = Arc<dyn Fn(&RequestInfo) -> Value + Send + Sync>;

/// 完整审计策略：可序列化配置 + 钩子 + 输出端
///
/// 构建后只读，以 `Arc<AuditOptions>` 作为中间件状态在并发请求间共享。
#[derive(Clone)]
pub struct AuditOptions {
    pub settings: AuditSettings,
    /// 请求体自定义脱敏，返回值直接序列化，跳过 mask/omit
    pub custom_mask_body_func: Option<CustomMaskBodyFunc>,
    pub setup_func: Option<SetupFunc>,
    pub should_skip_audit_func: ShouldSkipAuditFunc,
    pub sink: Arc<dyn AuditSink>,
}

impl AuditOptions {
    pub fn new(settings: AuditSettings) -> Self {
        Self {
            settings: settings.normalized(),
            custom_mask_body_func: None,
            setup_func: None,
            should_skip_audit_func: Arc::new(|_, _| false),
            sink: Arc::new(TracingSink),
        }
    }

    pub fn from_value(value: Value) -> AuditResult<Self> {
        Ok(Self::new(AuditSettings::from_value(value)?))
    }

    pub fn with_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_setup_func<F>(mut self, func: F) -> Self
    where
        F: Fn(&mut RequestInfo, &mut ResponseInfo) + Send + Sync + 'static,
    {
        self.setup_func = Some(Arc::new(func));
        self
    }

    pub fn with_should_skip_audit_func<F>(mut self, func: F) -> Self
    where
        F: Fn(&RequestInfo, &ResponseInfo) -> bool + Send + Sync + 'static,
    {
        self.should_skip_audit_func = Arc::new(func);
        self
    }

    pub fn with_custom_mask_body_func<F>(mut self, func: F) -> Self
    where
        F: Fn(&RequestInfo) -> Value + Send + Sync + 'static,
    {
        self.custom_mask_body_func = Some(Arc::new(func));
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self::new(AuditSettings::default())
    }
}

impl fmt::Debug for AuditOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditOptions")
            .field("settings", &self.settings)
            .field("custom_mask_body_func", &self.custom_mask_body_func.is_some())
            .field("setup_func", &self.setup_func.is_some())
            .finish_non_exhaustive()
    }
}

/// 服务器配置（示例服务使用）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8088".into()),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "text"
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".into()),
        }
    }
}

/// 应用配置结构体
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub audit: AuditSettings,
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            audit: AuditSettings::from_env(),
        }
    }

    /// 从配置文件加载配置，`[audit]` 段按审计策略规则校验
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let mut root: Value =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;

        let take = |root: &mut Value, key: &str| {
            root.as_object_mut()
                .and_then(|map| map.remove(key))
                .unwrap_or(Value::Null)
        };
        let server = take(&mut root, "server");
        let logging = take(&mut root, "logging");
        let audit = take(&mut root, "audit");

        Ok(Self {
            server: deserialize_or_default(server).context("Invalid [server] section")?,
            logging: deserialize_or_default(logging).context("Invalid [logging] section")?,
            audit: AuditSettings::from_value(audit)?,
        })
    }

    /// 从环境变量和配置文件合并加载（配置文件优先级更高）
    pub fn from_env_and_file<P: AsRef<Path>>(path: Option<P>) -> anyhow::Result<Self> {
        match path {
            Some(path) if path.as_ref().exists() => Self::from_file(path),
            _ => Ok(Self::from_env()),
        }
    }

    /// 验证配置有效性
    pub fn validate(&self) -> anyhow::Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("LOG_LEVEL must be one of: {:?}", valid_levels);
        }

        if self.logging.format != "json" && self.logging.format != "text" {
            anyhow::bail!("LOG_FORMAT must be 'json' or 'text'");
        }

        for (status, level) in &self.audit.levels {
            if !valid_levels.contains(&level.as_str()) {
                tracing::warn!(status = %status, level = %level, "Unsupported audit level, info will be used");
            }
        }

        Ok(())
    }
}

fn deserialize_or_default<T>(value: Value) -> anyhow::Result<T>
where
    T: Default + serde::de::DeserializeOwned,
{
    if value.is_null() {
        return Ok(T::default());
    }
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serde_json::json;
    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn test_defaults() {
        let settings = AuditSettings::default();
        assert!(settings.request.audit);
        assert!(settings.response.audit);
        assert!(!settings.double_audit);
        assert_eq!(settings.levels.get("5xx").map(String::as_str), Some("error"));
        assert_eq!(settings.levels.get("4xx").map(String::as_str), Some("info"));
    }

    #[test]
    fn test_from_value_rejects_non_array() {
        let err = AuditSettings::from_value(json!({ "request": { "mask_body": "password" } }))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid value specified for field: request.mask_body, expected array"
        );

        let err = AuditSettings::from_value(json!({ "exclude_urls": "/health" })).unwrap_err();
        assert!(matches!(err, AuditError::InvalidField { ref field } if field == "exclude_urls"));

        let err = AuditSettings::from_value(json!({ "response": { "exclude_headers": null } }))
            .unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_from_value_merges_levels() {
        let settings =
            AuditSettings::from_value(json!({ "levels": { "4xx": "warn", "404": "debug" } })).unwrap();
        assert_eq!(settings.levels.get("4xx").map(String::as_str), Some("warn"));
        assert_eq!(settings.levels.get("404").map(String::as_str), Some("debug"));
        assert_eq!(settings.levels.get("5xx").map(String::as_str), Some("error"));
        assert!(settings.request.audit);
    }

    #[test]
    fn test_from_json_str() {
        let settings = AuditSettings::from_json_str(
            r#"{ "response": { "exclude_body": ["*"], "max_capture_bytes": 4096 } }"#,
        )
        .unwrap();
        assert_eq!(settings.response.exclude_body, vec!["*"]);
        assert_eq!(settings.response.max_capture_bytes, 4096);
        assert_eq!(settings.request.max_capture_bytes, DEFAULT_MAX_CAPTURE_BYTES);

        let err = AuditSettings::from_json_str(r#"{ "request": { "exclude_headers": "cookie" } }"#)
            .unwrap_err();
        assert!(matches!(err, AuditError::InvalidField { ref field } if field == "request.exclude_headers"));

        let err = AuditSettings::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, AuditError::ConfigJson(_)));
    }

    #[test]
    fn test_max_body_length_normalization() {
        let cases = [
            (json!(10), Some(10)),
            (json!("25"), Some(25)),
            (json!(0), None),
            (json!(-4), None),
            (json!("abc"), None),
            (json!(true), None),
        ];
        for (raw, expected) in cases {
            let settings =
                AuditSettings::from_value(json!({ "request": { "max_body_length": raw.clone() } }))
                    .unwrap();
            assert_eq!(settings.request.max_body_length, expected, "input {}", raw);
        }

        let mut typed = AuditSettings::default();
        typed.response.max_body_length = Some(0);
        assert_eq!(typed.normalized().response.max_body_length, None);
    }

    #[test]
    fn test_header_names_lowercased() {
        let settings = AuditSettings::from_value(json!({
            "request": { "mask_headers": ["Authorization"] },
            "response": { "exclude_headers": ["Set-Cookie"] }
        }))
        .unwrap();
        assert_eq!(settings.request.mask_headers, vec!["authorization"]);
        assert_eq!(settings.response.exclude_headers, vec!["set-cookie"]);
    }

    #[test]
    fn test_settings_from_toml_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
double_audit = true
exclude_urls = ["/health"]

[request]
mask_body = ["password"]
max_body_length = 512

[levels]
"4xx" = "warn"
"#
        )
        .unwrap();

        let settings = AuditSettings::from_file(file.path()).unwrap();
        assert!(settings.double_audit);
        assert_eq!(settings.exclude_urls, vec!["/health"]);
        assert_eq!(settings.request.mask_body, vec!["password"]);
        assert_eq!(settings.request.max_body_length, Some(512));
        assert_eq!(settings.levels.get("4xx").map(String::as_str), Some("warn"));
    }

    #[test]
    fn test_settings_from_toml_rejects_scalar() {
        let err = AuditSettings::from_toml_str("[request]\nmask_query = \"q1\"\n").unwrap_err();
        assert!(matches!(err, AuditError::InvalidField { ref field } if field == "request.mask_query"));
    }

    #[test]
    fn test_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
bind_addr = "127.0.0.1:9090"

[logging]
level = "debug"
format = "json"

[audit]
exclude_urls = ["/metrics"]
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.server.bind_addr, "127.0.0.1:9090");
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.audit.exclude_urls, vec!["/metrics"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_rejects_bad_format() {
        let config = Config {
            logging: LoggingConfig {
                level: "info".into(),
                format: "xml".into(),
            },
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_options_hooks_and_debug() {
        let options = AuditOptions::default()
            .with_setup_func(|req, _| {
                req.additional_audit = Some(Default::default());
            })
            .with_should_skip_audit_func(|_, res| res.status_code == Some(204));

        let skip = ResponseInfo {
            status_code: Some(204),
            ..Default::default()
        };
        assert!((options.should_skip_audit_func)(&RequestInfo::default(), &skip));
        assert!(options.setup_func.is_some());
        assert!(format!("{:?}", options).contains("setup_func: true"));
    }
}
