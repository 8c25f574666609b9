//! 审计记录发出
//!
//! `audit_request` 在请求开始时（double_audit）调用，`audit_response` 在响应体结束后调用。
//! 两者都先检查排除规则，被排除时不做任何工作也不写日志。

use serde_json::Value;

use crate::{
    audit::{
        record::{build_request_audit, build_response_audit, AuditRecord, Stage},
        severity::{resolve_severity, Severity},
        transaction::{merged_additional_audit, RequestInfo, ResponseInfo},
    },
    config::AuditOptions,
    utils::url::should_audit,
};

/// 发出开始阶段的记录，返回发出的内容
pub fn audit_request(
    req: &mut RequestInfo,
    res: &mut ResponseInfo,
    options: &AuditOptions,
) -> Option<Value> {
    if !should_audit(&options.settings.exclude_urls, Some(req)) {
        return None;
    }

    if let Some(setup) = &options.setup_func {
        setup(req, res);
    }

    let request = options
        .settings
        .request
        .audit
        .then(|| build_request_audit(req, options));

    let record = AuditRecord::new(Stage::Start, request, None)
        .with_additional(merged_additional_audit(req, None));
    let payload = record.to_value();

    options.sink.log(Severity::Info, &payload, Some("audit request"));
    Some(payload)
}

/// 发出结束阶段的记录，级别由状态码决定
pub fn audit_response(
    req: &mut RequestInfo,
    res: &mut ResponseInfo,
    options: &AuditOptions,
) -> Option<Value> {
    if !should_audit(&options.settings.exclude_urls, Some(req)) {
        return None;
    }

    if (options.should_skip_audit_func)(req, res) {
        tracing::trace!(url = ?req.url, "Audit skipped by should_skip_audit_func");
        return None;
    }

    if let Some(setup) = &options.setup_func {
        setup(req, res);
    }

    let request = options
        .settings
        .request
        .audit
        .then(|| build_request_audit(req, options));
    let response = options
        .settings
        .response
        .audit
        .then(|| build_response_audit(req, res, options));

    let record = AuditRecord::new(Stage::End, request, response)
        .with_additional(merged_additional_audit(req, Some(res)));
    let payload = record.to_value();

    let level = resolve_severity(res.status_code, &options.settings.levels);
    options.sink.log(level, &payload, Some("audit response"));
    Some(payload)
}
