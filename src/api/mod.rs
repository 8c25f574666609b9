use std::sync::Arc;

use axum::{
    extract::Request,
    middleware::{from_fn, from_fn_with_state, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::{
    api::middleware::audit_middleware, audit::transaction::AdditionalAudit, config::AuditOptions,
};

pub mod handlers;
pub mod middleware;
pub mod response;

pub use response::AuditJson;

/// 给路由挂上审计中间件
///
/// 使用 `Router::layer`，中间件在路由匹配之后执行，能拿到路由模板和路径参数。
/// 之后再 `.layer` 的中间件在审计之外执行，可以往请求扩展里放 `AdditionalAudit`。
pub fn with_audit<S>(router: Router<S>, options: Arc<AuditOptions>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(from_fn_with_state(options, audit_middleware))
}

/// 示例服务路由
pub fn routes(options: Arc<AuditOptions>) -> Router {
    let app = Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/api/v1/echo", post(handlers::echo))
        .route("/api/v1/users/:id", get(handlers::get_user))
        .route("/api/v1/stream", get(handlers::stream_chunks))
        .route("/api/v1/fail", get(handlers::fail));

    with_audit(app, options).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(from_fn(tag_tenant)),
    )
}

/// 把 `X-Tenant-Id` 请求头记入审计附加字段
async fn tag_tenant(mut req: Request, next: Next) -> Response {
    let tenant = req
        .headers()
        .get("x-tenant-id")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    if let Some(tenant) = tenant {
        req.extensions_mut()
            .insert(AdditionalAudit::new().with("tenant", tenant));
    }

    next.run(req).await
}
