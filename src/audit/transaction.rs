//! 单次请求/响应的快照
//!
//! 中间件在边界处把 axum 的 `Parts` 解析成 `RequestInfo`，之后审计管线只依赖快照，
//! 不再直接访问框架对象。

use axum::{
    extract::{MatchedPath, NestedPath, Query, RawPathParams},
    http::{header::CONTENT_TYPE, request::Parts, HeaderMap, Uri},
};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// 调用方附加的审计字段
///
/// 前置中间件可以放进请求扩展，handler 可以放进响应扩展；
/// 非空时浅合并到审计记录顶层。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdditionalAudit(pub Map<String, Value>);

impl AdditionalAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// JSON 输出路径写出的原始结构，放在响应扩展中由中间件取走
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedJson(pub Value);

#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    pub method: Option<String>,
    /// 原始 path + query
    pub url: Option<String>,
    /// 挂载路径（嵌套路由前缀），未嵌套时为空串
    pub base_path: Option<String>,
    /// 匹配到的路由模板（不含挂载前缀）
    pub route_path: Option<String>,
    pub url_params: Option<Value>,
    pub query: Option<Value>,
    pub headers: Option<HeaderMap>,
    /// 字符串表示原始请求体，对象/数组表示已解析的结构化请求体
    pub body: Option<Value>,
    pub timestamp: Option<DateTime<Utc>>,
    pub additional_audit: Option<Map<String, Value>>,
}

impl RequestInfo {
    /// 从 axum 请求头部解析快照（不含请求体）
    pub fn from_parts(parts: &Parts, params: Option<&RawPathParams>) -> Self {
        let matched = parts.extensions.get::<MatchedPath>().map(MatchedPath::as_str);
        let nested = parts.extensions.get::<NestedPath>().map(NestedPath::as_str);
        let (base_path, route_path) = split_route(nested, matched);

        Self {
            method: Some(parts.method.as_str().to_string()),
            url: parts.uri.path_and_query().map(|pq| pq.as_str().to_string()),
            base_path,
            route_path,
            url_params: params.map(params_to_value),
            query: Some(query_to_value(&parts.uri)),
            headers: Some(parts.headers.clone()),
            body: None,
            timestamp: None,
            additional_audit: parts
                .extensions
                .get::<AdditionalAudit>()
                .filter(|extra| !extra.is_empty())
                .map(|extra| extra.0.clone()),
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        content_type_of(self.headers.as_ref())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResponseInfo {
    pub status_code: Option<u16>,
    pub headers: Option<HeaderMap>,
    pub timestamp: Option<DateTime<Utc>>,
    /// 按写出顺序拼接的完整响应体
    pub body_str: Option<String>,
    /// 通过 JSON 输出路径写出时保留的原始结构
    pub body_json: Option<Value>,
    pub additional_audit: Option<Map<String, Value>>,
}

impl ResponseInfo {
    pub fn content_type(&self) -> Option<&str> {
        content_type_of(self.headers.as_ref())
    }
}

/// 合并请求侧与响应侧的附加字段，响应侧优先
pub fn merged_additional_audit(req: &RequestInfo, res: Option<&ResponseInfo>) -> Map<String, Value> {
    let mut merged = req.additional_audit.clone().unwrap_or_default();
    if let Some(extra) = res.and_then(|res| res.additional_audit.as_ref()) {
        for (key, value) in extra {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

fn content_type_of(headers: Option<&HeaderMap>) -> Option<&str> {
    headers?.get(CONTENT_TYPE)?.to_str().ok()
}

fn split_route(nested: Option<&str>, matched: Option<&str>) -> (Option<String>, Option<String>) {
    let Some(matched) = matched else {
        return (nested.map(str::to_string), None);
    };

    match nested {
        Some(prefix) if prefix != "/" && matched.starts_with(prefix) => {
            let rest = &matched[prefix.len()..];
            let rest = if rest.is_empty() { "/" } else { rest };
            (Some(prefix.to_string()), Some(rest.to_string()))
        }
        _ => (Some(String::new()), Some(matched.to_string())),
    }
}

fn params_to_value(params: &RawPathParams) -> Value {
    Value::Object(
        params
            .iter()
            .map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
            .collect(),
    )
}

/// 重复的查询参数合并为数组
fn query_to_value(uri: &Uri) -> Value {
    let pairs = Query::<Vec<(String, String)>>::try_from_uri(uri)
        .map(|Query(pairs)| pairs)
        .unwrap_or_default();

    let mut map = Map::new();
    for (key, value) in pairs {
        match map.get_mut(&key) {
            Some(Value::Array(values)) => values.push(Value::String(value)),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, Value::String(value)]);
            }
            None => {
                map.insert(key, Value::String(value));
            }
        }
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use axum::http::Request;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_query_repeated_keys_become_array() {
        let uri: Uri = "/x?q=1&tag=a&tag=b".parse().unwrap();
        assert_eq!(query_to_value(&uri), json!({ "q": "1", "tag": ["a", "b"] }));
    }

    #[test]
    fn test_query_absent_is_empty_object() {
        let uri: Uri = "/x".parse().unwrap();
        assert_eq!(query_to_value(&uri), json!({}));
    }

    #[test]
    fn test_split_route_strips_nest_prefix() {
        assert_eq!(
            split_route(Some("/users"), Some("/users/:id")),
            (Some("/users".to_string()), Some("/:id".to_string()))
        );
        assert_eq!(
            split_route(None, Some("/health")),
            (Some(String::new()), Some("/health".to_string()))
        );
        assert_eq!(split_route(None, None), (None, None));
    }

    #[test]
    fn test_from_parts_without_routing_extensions() {
        let (parts, _) = Request::builder()
            .method("POST")
            .uri("/x?q=1")
            .header("content-type", "application/json")
            .body(())
            .unwrap()
            .into_parts();

        let info = RequestInfo::from_parts(&parts, None);
        assert_eq!(info.method.as_deref(), Some("POST"));
        assert_eq!(info.url.as_deref(), Some("/x?q=1"));
        assert_eq!(info.route_path, None);
        assert_eq!(info.url_params, None);
        assert_eq!(info.query, Some(json!({ "q": "1" })));
        assert_eq!(info.content_type(), Some("application/json"));
    }

    #[test]
    fn test_from_parts_picks_up_additional_audit_extension() {
        let (mut parts, _) = Request::builder().uri("/x").body(()).unwrap().into_parts();
        parts
            .extensions
            .insert(AdditionalAudit::new().with("tenant", "t-1"));

        let info = RequestInfo::from_parts(&parts, None);
        assert_eq!(info.additional_audit, Some(json!({ "tenant": "t-1" }).as_object().unwrap().clone()));
    }

    #[test]
    fn test_merged_additional_response_wins() {
        let req = RequestInfo {
            additional_audit: Some(json!({ "a": 1, "b": 1 }).as_object().unwrap().clone()),
            ..Default::default()
        };
        let res = ResponseInfo {
            additional_audit: Some(json!({ "b": 2 }).as_object().unwrap().clone()),
            ..Default::default()
        };

        let merged = merged_additional_audit(&req, Some(&res));
        assert_eq!(Value::Object(merged), json!({ "a": 1, "b": 2 }));
    }
}
