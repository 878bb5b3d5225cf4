//! CC-Forwarder 启动入口

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use cc_forwarder::app::AppContext;
use cc_forwarder::config;
use cc_forwarder::logging::{init_logging, LoggingConfig};
use cc_forwarder::management::serve_management;
use cc_forwarder::proxy::serve_proxy;
use cc_forwarder::utils::appdir;
use cc_forwarder::Result;

fn config_path() -> PathBuf {
    std::env::var_os("CC_FORWARDER_CONFIG").map_or_else(
        || appdir::config_dir().join("config.toml"),
        PathBuf::from,
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    appdir::ensure_app_dirs()?;

    let config_file = config_path();
    let config = config::load_config(&config_file)?;

    let log_file: Box<dyn std::io::Write + Send> = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(appdir::log_dir().join("cc-forwarder.log"))
    {
        Ok(file) => Box::new(file),
        Err(err) => {
            eprintln!("日志文件打开失败，降级到丢弃输出: {err}");
            Box::new(std::io::sink())
        }
    };
    let broadcast = init_logging(&LoggingConfig::from_env(), log_file, None);

    tracing::info!(
        "CC-Forwarder 启动, 配置: {}, 端点数: {}",
        config_file.display(),
        config.endpoints.len()
    );

    let cancel = CancellationToken::new();
    let context = AppContext::build(
        config,
        config_file.display().to_string(),
        Some(Arc::clone(&broadcast)),
        None,
        cancel.clone(),
    )
    .await?;

    // 启动前先完成一轮健康检查，让初始活跃组就绪
    context.endpoint_manager.check_all_endpoints().await;

    let proxy_port = serve_proxy(
        &context.config.server,
        Arc::clone(&context.dispatcher),
        cancel.clone(),
    )
    .await?;
    let _ = context.proxy_port.set(proxy_port);

    let web_port =
        serve_management(&context.config.web, Arc::clone(&context), cancel.clone()).await?;
    let _ = context.web_port.set(web_port);

    tracing::info!("✅ 就绪: 转发端口 {proxy_port}, 管理端口 {web_port}");

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| cc_forwarder::ProxyError::internal_with_source("等待退出信号失败", e))?;

    tracing::info!("收到退出信号, 开始优雅关闭");
    cancel.cancel();
    context.hot_pool.close();

    Ok(())
}
