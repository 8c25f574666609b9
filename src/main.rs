//! IronAudit 示例服务
//! 挂载审计中间件的 axum 服务，审计记录通过 tracing 输出

use anyhow::Result;
use ironaudit::{api, config::Config, infrastructure::logging, AuditOptions};

#[tokio::main]
async fn main() -> Result<()> {
    // ✅ 1. 加载环境变量
    dotenvy::dotenv().ok();

    // ✅ 2. 加载配置（存在 CONFIG_PATH 时配置文件优先）
    let config_path = std::env::var("CONFIG_PATH").ok();
    let config = Config::from_env_and_file(config_path.as_deref())?;

    // ✅ 3. 初始化日志
    if let Err(e) = logging::init_logging(&config.logging) {
        eprintln!("Failed to initialize logging: {}", e);
    }
    config.validate()?;

    tracing::info!(
        exclude_urls = ?config.audit.exclude_urls,
        double_audit = config.audit.double_audit,
        "Starting IronAudit demo server"
    );

    // ✅ 4. 构建路由，审计策略以 Arc 作为中间件状态共享
    let options = AuditOptions::new(config.audit.clone())
        .with_should_skip_audit_func(|_, res| res.status_code == Some(304))
        .shared();
    let app = api::routes(options);

    // ✅ 5. 启动服务器
    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr).await?;
    tracing::info!("Server listening on http://{}", config.server.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
