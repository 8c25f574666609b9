//! 示例服务的处理函数

use axum::{
    body::Body,
    extract::Path,
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::stream;
use serde::Serialize;
use serde_json::Value;

use crate::{api::response::AuditJson, audit::transaction::AdditionalAudit};

pub async fn healthz() -> &'static str {
    "ok"
}

/// 原样返回请求体
pub async fn echo(Json(body): Json<Value>) -> AuditJson<Value> {
    AuditJson(body)
}

#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: String,
    pub name: String,
    pub token: String,
}

pub async fn get_user(Path(id): Path<String>) -> Response {
    let mut response = AuditJson(UserView {
        name: format!("user-{}", id),
        token: "demo-session-token".into(),
        id: id.clone(),
    })
    .into_response();
    response
        .extensions_mut()
        .insert(AdditionalAudit::new().with("user_id", id));
    response
}

/// 分块输出的响应体
pub async fn stream_chunks() -> Response {
    let chunks: Vec<Result<&'static str, std::io::Error>> =
        vec![Ok("{\"items\":["), Ok("1,2,3"), Ok("]}")];
    (
        [(CONTENT_TYPE, "application/json")],
        Body::from_stream(stream::iter(chunks)),
    )
        .into_response()
}

pub async fn fail() -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, "internal error")
}
