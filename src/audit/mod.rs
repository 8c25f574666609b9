//! 审计记录管线
//!
//! 快照（transaction）→ 记录构建（record）→ 级别解析（severity）→ 发出（helper）

pub mod helper;
pub mod record;
pub mod severity;
pub mod transaction;

pub use helper::{audit_request, audit_response};
pub use record::{build_request_audit, build_response_audit, AuditRecord, RequestAudit, ResponseAudit, Stage};
pub use severity::{default_levels, resolve_severity, LevelsMap, Severity};
pub use transaction::{AdditionalAudit, CapturedJson, RequestInfo, ResponseInfo};
