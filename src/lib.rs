//! ComponentRouter - 组件间路由框架
//!
//! 模块之间通过路由名互相调用：打开页面、执行命名行为，
//! 路由表可以分布在多个进程中，拦截器在路由所在的进程执行。
//!
//! # 架构分层
//!
//! - **核心基础层**: 倒计数屏障、生命周期作用域
//! - **类型层**: 路由描述、可传输值、跨进程信封
//! - **路由层**: 请求对象、回调、拦截器、行为处理器、注册表
//! - **服务层**: 跨进程路由服务、通道传输、导航入口
//!
//! # 特性
//!
//! - **跨进程透明**: 路由查找、拦截和行为执行可以落在其他进程
//! - **并行拦截**: 匹配的拦截器并行执行，带超时的屏障等待
//! - **生命周期绑定**: 请求回调随作用域销毁自动清理

pub mod config;
pub mod core;
pub mod error;
pub mod route;
pub mod services;
pub mod types;

// 重新导出核心类型
pub use config::{ConfigManager, RouterConfig};
pub use core::*;
pub use error::*;
pub use route::*;
pub use services::*;
pub use types::*;

/// 框架信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const FRAMEWORK_NAME: &str = "ComponentRouter";

/// 快速启动函数，日志系统已安装时不会失败
pub async fn initialize() -> Result<()> {
    let _ = tracing_subscriber::fmt::try_init();
    log_banner();
    Ok(())
}

/// 按配置的日志级别启动
pub async fn initialize_with_config(config: &RouterConfig) -> Result<()> {
    let level: tracing::Level = config.logging.level.into();
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(config.logging.verbose)
        .try_init();
    log_banner();
    tracing::info!("Application: {}", config.app_context());
    Ok(())
}

fn log_banner() {
    tracing::info!("🚀 Initializing {} v{}", FRAMEWORK_NAME, VERSION);
    tracing::info!("🧭 Features: Cross-process routing, Parallel interceptors, Lifecycle-bound callbacks");
}
