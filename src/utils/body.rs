//! 请求体/响应体与请求头规范化
//!
//! 原始内容（字符串、结构化值或缺失）统一转成可脱敏的 JSON 或原样透传，
//! 最终渲染成审计记录里的字符串。

use axum::http::HeaderMap;
use serde_json::{json, Map, Value};

use crate::{
    error::AuditError,
    infrastructure::sink::AuditSink,
    utils::redact::{mask, omit},
};

/// 缺失值占位
pub const NA: &str = "N/A";
/// 排除全部字段的通配符
pub const ALL_FIELDS: &str = "*";
/// 截断标记
pub const TRUNCATION_MARKER: &str = "...";

/// 一组脱敏规则（掩码字段 + 排除字段）
#[derive(Debug, Clone, Copy)]
pub struct FieldPolicy<'a> {
    pub mask: &'a [String],
    pub exclude: &'a [String],
}

impl<'a> FieldPolicy<'a> {
    pub fn new(mask: &'a [String], exclude: &'a [String]) -> Self {
        Self { mask, exclude }
    }

    pub fn excludes_all(&self) -> bool {
        self.exclude.iter().any(|field| field == ALL_FIELDS)
    }

    /// 是否真的需要脱敏（决定是否值得解析）
    pub fn has_redaction(&self) -> bool {
        !self.mask.is_empty() || !self.exclude.is_empty()
    }
}

/// 规范化并脱敏，返回 `None` 表示缺失
///
/// 通配符排除优先于任何字段级规则。无法解析的内容通过 sink 告警后视为缺失。
pub fn normalize(raw: Option<&Value>, policy: FieldPolicy<'_>, sink: &dyn AuditSink) -> Option<Value> {
    if policy.excludes_all() {
        return None;
    }

    let raw = raw.filter(|value| is_truthy(value))?;

    match parse_redactable(raw) {
        Ok(parsed) => {
            let masked = mask(&parsed, policy.mask);
            Some(omit(&masked, policy.exclude))
        }
        Err(err) => {
            sink.warn(
                &json!({ "error": err.to_string() }),
                Some("Failed to parse body for audit, body will not be logged"),
            );
            None
        }
    }
}

fn parse_redactable(raw: &Value) -> Result<Value, AuditError> {
    match raw {
        Value::String(text) => {
            let parsed: Value = serde_json::from_str(text).map_err(AuditError::InvalidJsonBody)?;
            match parsed {
                Value::Object(_) | Value::Array(_) => Ok(parsed),
                other => Err(AuditError::UnsupportedBody(kind_of(&other))),
            }
        }
        Value::Object(_) | Value::Array(_) => Ok(raw.clone()),
        other => Err(AuditError::UnsupportedBody(kind_of(other))),
    }
}

/// JS 风格的真值判断：null、""、false、0 视为空
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map(|n| n != 0.0).unwrap_or(true),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// lodash `isEmpty` 语义：只有非空字符串、非空数组、非空对象才算有内容
fn has_content(value: &Value) -> bool {
    match value {
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        _ => false,
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// 渲染为字符串，超过 `max_length` 个字符时截断并追加 `...`
pub fn render_body(value: Option<&Value>, max_length: Option<usize>) -> String {
    let Some(value) = value.filter(|value| has_content(value)) else {
        return NA.to_string();
    };

    let rendered = match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };

    match max_length {
        Some(max) if max > 0 && rendered.chars().count() > max => {
            let mut truncated: String = rendered.chars().take(max).collect();
            truncated.push_str(TRUNCATION_MARKER);
            truncated
        }
        _ => rendered,
    }
}

/// 完整的请求体/响应体处理：内容类型为 JSON 时才解析脱敏，否则原样输出
pub fn render_audited_body(
    raw: Option<&Value>,
    content_type: Option<&str>,
    policy: FieldPolicy<'_>,
    max_length: Option<usize>,
    sink: &dyn AuditSink,
) -> String {
    if policy.excludes_all() {
        return NA.to_string();
    }

    if !is_json_content_type(content_type) || !policy.has_redaction() {
        return render_body(raw, max_length);
    }

    let normalized = normalize(raw, policy, sink);
    render_body(normalized.as_ref(), max_length)
}

pub fn is_json_content_type(content_type: Option<&str>) -> bool {
    content_type
        .map(|ct| ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
        .map(|mime| mime.contains("json"))
        .unwrap_or(false)
}

/// 查询参数掩码；未配置字段时原样返回
pub fn mask_query(query: &Value, fields: &[String]) -> Value {
    if fields.is_empty() {
        return query.clone();
    }
    mask(query, fields)
}

/// 请求头转 JSON 对象：单值为字符串，重复头为数组
pub fn headers_to_value(headers: &HeaderMap) -> Value {
    let mut map = Map::new();
    for name in headers.keys() {
        let values: Vec<Value> = headers
            .get_all(name)
            .iter()
            .map(|value| Value::String(String::from_utf8_lossy(value.as_bytes()).into_owned()))
            .collect();
        let entry = match values.len() {
            1 => values.into_iter().next().unwrap_or(Value::Null),
            _ => Value::Array(values),
        };
        map.insert(name.as_str().to_string(), entry);
    }
    Value::Object(map)
}

/// 请求头规范化，缺失时为 "N/A"
pub fn normalize_headers(
    headers: Option<&HeaderMap>,
    policy: FieldPolicy<'_>,
    sink: &dyn AuditSink,
) -> Value {
    let raw = headers.map(headers_to_value);
    normalize(raw.as_ref(), policy, sink).unwrap_or_else(|| Value::String(NA.to_string()))
}
