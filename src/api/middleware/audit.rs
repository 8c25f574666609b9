//! 审计中间件
//!
//! 通过 `Router::layer` 挂载（见 `api::with_audit`），这样路由匹配已经完成，
//! 可以拿到 `MatchedPath` 和路径参数。中间件只观察，不改动请求和响应内容。

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, RawPathParams, Request, State},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use super::{
    capture_body::{CaptureBody, PendingAudit},
    request_body::buffer_request_body,
};
use crate::{
    audit::{
        helper::audit_request,
        transaction::{AdditionalAudit, CapturedJson, RequestInfo, ResponseInfo},
    },
    config::AuditOptions,
    utils::{body::FieldPolicy, url::should_audit},
};

/// 审计中间件入口，`next.run` 恰好调用一次
pub async fn audit_middleware(
    State(options): State<Arc<AuditOptions>>,
    req: Request,
    next: Next,
) -> Response {
    let started_at = Utc::now();
    let (mut parts, body) = req.into_parts();

    let params = RawPathParams::from_request_parts(&mut parts, &()).await.ok();
    let mut request = RequestInfo::from_parts(&parts, params.as_ref());
    request.timestamp = Some(started_at);

    // 被排除的请求不做任何捕获
    if !should_audit(&options.settings.exclude_urls, Some(&request)) {
        return next.run(Request::from_parts(parts, body)).await;
    }

    let body = if wants_request_body(&options) {
        let limit = options.settings.request.max_capture_bytes;
        let (captured, body) = buffer_request_body(body, limit).await;
        request.body = captured;
        body
    } else {
        body
    };

    let mut response_info = ResponseInfo::default();
    if options.settings.double_audit {
        audit_request(&mut request, &mut response_info, &options);
    }

    let response = next.run(Request::from_parts(parts, body)).await;
    let (res_parts, res_body) = response.into_parts();

    response_info.status_code = Some(res_parts.status.as_u16());
    response_info.headers = Some(res_parts.headers.clone());
    response_info.body_json = res_parts
        .extensions
        .get::<CapturedJson>()
        .map(|CapturedJson(value)| value.clone());
    if let Some(extra) = res_parts
        .extensions
        .get::<AdditionalAudit>()
        .filter(|extra| !extra.is_empty())
    {
        response_info
            .additional_audit
            .get_or_insert_with(Default::default)
            .extend(extra.0.clone());
    }

    let capture_limit =
        wants_response_body(&options).then_some(options.settings.response.max_capture_bytes);
    let pending = PendingAudit {
        request,
        response: response_info,
        options,
    };
    Response::from_parts(res_parts, CaptureBody::wrap(res_body, pending, capture_limit))
}

/// 请求侧关闭审计或请求体被通配符排除时不需要缓冲请求体
fn wants_request_body(options: &AuditOptions) -> bool {
    let policy = &options.settings.request;
    if !policy.audit {
        return false;
    }
    options.custom_mask_body_func.is_some()
        || !FieldPolicy::new(&policy.mask_body, &policy.exclude_body).excludes_all()
}

/// 响应侧关闭审计或响应体被通配符排除时，响应字节不会出现在记录里，无需保留
fn wants_response_body(options: &AuditOptions) -> bool {
    let policy = &options.settings.response;
    policy.audit && !FieldPolicy::new(&policy.mask_body, &policy.exclude_body).excludes_all()
}
