//! 审计错误类型
//!
//! 配置错误在启动阶段直接返回；请求体解析错误只在审计管线内部出现，
//! 通过 sink 记录告警后降级为 "N/A"，不会影响实际请求处理。

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditError {
    /// 期望为数组的配置字段收到了非数组值
    #[error("Invalid value specified for field: {field}, expected array")]
    InvalidField { field: String },

    #[error("Failed to read config file: {0}")]
    ConfigRead(#[from] std::io::Error),

    #[error("Failed to parse config file as TOML: {0}")]
    ConfigToml(#[from] toml::de::Error),

    #[error("Failed to parse audit settings: {0}")]
    ConfigJson(#[source] serde_json::Error),

    /// 请求体/响应体声明为 JSON 但无法解析
    #[error("body is not valid JSON: {0}")]
    InvalidJsonBody(#[source] serde_json::Error),

    /// 请求体既不是可解析的字符串也不是对象/数组
    #[error("body of type {0} cannot be redacted")]
    UnsupportedBody(&'static str),
}

impl AuditError {
    pub fn invalid_field(field: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
        }
    }

    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidField { .. } | Self::ConfigRead(_) | Self::ConfigToml(_) | Self::ConfigJson(_)
        )
    }
}

pub type AuditResult<T> = Result<T, AuditError>;
