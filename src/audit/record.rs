//! 审计记录结构与构建
//!
//! 每个字段在来源缺失时独立回落为 "N/A"；所有脱敏都作用在副本上。

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{
    audit::transaction::{RequestInfo, ResponseInfo},
    config::AuditOptions,
    utils::{
        body::{mask_query, normalize_headers, render_audited_body, render_body, FieldPolicy, NA},
        time_utils::{elapsed_ms, format_timestamp},
        url::{get_route, get_url},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Start,
    End,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestAudit {
    pub method: String,
    pub url: String,
    pub url_route: String,
    pub url_params: Value,
    pub query: Value,
    pub headers: Value,
    pub timestamp: String,
    pub timestamp_ms: Value,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseAudit {
    pub status_code: Value,
    pub headers: Value,
    pub timestamp: String,
    pub timestamp_ms: Value,
    pub elapsed: i64,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    pub request: Option<RequestAudit>,
    pub response: Option<ResponseAudit>,
    pub millis_timestamp: i64,
    pub utc_timestamp: String,
    pub stage: Stage,
    pub additional: Map<String, Value>,
}

impl AuditRecord {
    /// 以当前时间作为发出时间
    pub fn new(stage: Stage, request: Option<RequestAudit>, response: Option<ResponseAudit>) -> Self {
        let now = Utc::now();
        Self {
            request,
            response,
            millis_timestamp: now.timestamp_millis(),
            utc_timestamp: format_timestamp(&now),
            stage,
            additional: Map::new(),
        }
    }

    pub fn with_additional(mut self, additional: Map<String, Value>) -> Self {
        self.additional = additional;
        self
    }

    /// 结束阶段总是带 `response` 键（未审计时为 null）；附加字段最后写入，冲突时覆盖
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("request".to_string(), to_value_or_null(self.request.as_ref()));
        if self.stage == Stage::End {
            map.insert("response".to_string(), to_value_or_null(self.response.as_ref()));
        }
        map.insert("millis-timestamp".to_string(), Value::from(self.millis_timestamp));
        map.insert("utc-timestamp".to_string(), Value::String(self.utc_timestamp.clone()));
        map.insert(
            "stage".to_string(),
            serde_json::to_value(self.stage).unwrap_or(Value::Null),
        );
        for (key, value) in &self.additional {
            map.insert(key.clone(), value.clone());
        }
        Value::Object(map)
    }
}

fn to_value_or_null<T: Serialize>(piece: Option<&T>) -> Value {
    piece
        .and_then(|piece| serde_json::to_value(piece).ok())
        .unwrap_or(Value::Null)
}

fn na() -> Value {
    Value::String(NA.to_string())
}

fn timestamp_fields(ts: Option<&DateTime<Utc>>) -> (String, Value) {
    match ts {
        Some(ts) => (format_timestamp(ts), Value::from(ts.timestamp_millis())),
        None => (NA.to_string(), na()),
    }
}

pub fn build_request_audit(req: &RequestInfo, options: &AuditOptions) -> RequestAudit {
    let policy = &options.settings.request;
    let sink = options.sink.as_ref();
    let (timestamp, timestamp_ms) = timestamp_fields(req.timestamp.as_ref());

    let body = match &options.custom_mask_body_func {
        Some(custom) => render_body(Some(&custom(req)), None),
        None => render_audited_body(
            req.body.as_ref(),
            req.content_type(),
            FieldPolicy::new(&policy.mask_body, &policy.exclude_body),
            policy.max_body_length,
            sink,
        ),
    };

    RequestAudit {
        method: req.method.clone().unwrap_or_else(|| NA.to_string()),
        url: get_url(Some(req)),
        url_route: get_route(Some(req)),
        url_params: req.url_params.clone().unwrap_or_else(na),
        query: req
            .query
            .as_ref()
            .map(|query| mask_query(query, &policy.mask_query))
            .unwrap_or_else(na),
        headers: normalize_headers(
            req.headers.as_ref(),
            FieldPolicy::new(&policy.mask_headers, &policy.exclude_headers),
            sink,
        ),
        timestamp,
        timestamp_ms,
        body,
    }
}

pub fn build_response_audit(
    req: &RequestInfo,
    res: &ResponseInfo,
    options: &AuditOptions,
) -> ResponseAudit {
    let policy = &options.settings.response;
    let sink = options.sink.as_ref();
    let (timestamp, timestamp_ms) = timestamp_fields(res.timestamp.as_ref());
    let body_policy = FieldPolicy::new(&policy.mask_body, &policy.exclude_body);

    // 需要脱敏且已有结构化形式时直接使用，避免重复解析
    let raw_body = match (&res.body_json, &res.body_str) {
        (Some(json), _) if body_policy.has_redaction() => Some(json.clone()),
        (_, Some(text)) => Some(Value::String(text.clone())),
        (Some(json), None) => Some(json.clone()),
        (None, None) => None,
    };

    ResponseAudit {
        status_code: res.status_code.map(Value::from).unwrap_or_else(na),
        headers: normalize_headers(
            res.headers.as_ref(),
            FieldPolicy::new(&policy.mask_headers, &policy.exclude_headers),
            sink,
        ),
        timestamp,
        timestamp_ms,
        elapsed: elapsed_ms(req.timestamp.as_ref(), res.timestamp.as_ref()),
        body: render_audited_body(
            raw_body.as_ref(),
            res.content_type(),
            body_policy,
            policy.max_body_length,
            sink,
        ),
    }
}
