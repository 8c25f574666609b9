//! JSON 响应输出
//!
//! `AuditJson` 与 `axum::Json` 输出完全相同的响应，同时把序列化前的结构放进响应扩展，
//! 审计需要脱敏时可以直接使用，不必再解析一次响应体。

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::audit::transaction::CapturedJson;

#[derive(Debug, Clone, Copy, Default)]
pub struct AuditJson<T>(pub T);

impl<T: Serialize> IntoResponse for AuditJson<T> {
    fn into_response(self) -> Response {
        match serde_json::to_value(&self.0) {
            Ok(value) => {
                let captured = CapturedJson(value.clone());
                let mut response = Json(value).into_response();
                response.extensions_mut().insert(captured);
                response
            }
            // 交给 axum::Json 生成同样的错误响应
            Err(_) => Json(self.0).into_response(),
        }
    }
}

impl<T> From<T> for AuditJson<T> {
    fn from(inner: T) -> Self {
        Self(inner)
    }
}
