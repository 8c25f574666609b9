//! IronAudit - HTTP 请求/响应审计日志中间件
//!
//! 只观察不干预：捕获请求与响应的元数据和内容，按策略脱敏后通过 `AuditSink` 输出

pub mod api;
pub mod audit;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod utils;

// 重新导出常用类型
pub use api::{with_audit, AuditJson};
pub use config::{AuditOptions, AuditSettings};
pub use error::{AuditError, AuditResult};

pub mod prelude {
    pub use crate::{
        api::{middleware::audit_middleware, with_audit, AuditJson},
        audit::{AdditionalAudit, RequestInfo, ResponseInfo, Severity},
        config::{AuditOptions, AuditSettings},
        error::AuditError,
        infrastructure::sink::{AuditSink, MemorySink, TracingSink},
    };
}
