//! 路由框架配置管理
//!
//! 支持 YAML 配置文件驱动的路由进程

use crate::route::AppContext;
use crate::{Result, RouteError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 拦截器等待的默认超时，毫秒
pub const DEFAULT_INTERCEPTOR_TIMEOUT_MS: u64 = 3000;

/// 路由框架配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// 本进程所属应用的 ID
    pub application_id: String,
    /// 进程名，未设置时与应用 ID 相同
    pub process_name: Option<String>,
    /// 等待拦截器结果的超时，毫秒
    pub interceptor_timeout_ms: u64,
    /// 路由服务执行请求的线程数
    pub host_threads: usize,
    /// 日志配置
    pub logging: LoggingConfig,
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: LogLevel,
    /// 是否启用详细日志
    pub verbose: bool,
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            verbose: false,
        }
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            application_id: "com.example.app".to_string(),
            process_name: None,
            interceptor_timeout_ms: DEFAULT_INTERCEPTOR_TIMEOUT_MS,
            host_threads: num_cpus::get(),
            logging: LoggingConfig::default(),
        }
    }
}

impl RouterConfig {
    pub fn interceptor_timeout(&self) -> Duration {
        Duration::from_millis(self.interceptor_timeout_ms)
    }

    /// 由配置得到的应用上下文
    pub fn app_context(&self) -> AppContext {
        let context = AppContext::new(&self.application_id);
        match &self.process_name {
            Some(process_name) => context.with_process_name(process_name),
            None => context,
        }
    }
}

/// 配置管理器
#[derive(Debug)]
pub struct ConfigManager {
    config: RouterConfig,
}

impl ConfigManager {
    /// 从文件加载配置
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| RouteError::config(&format!("Failed to read config file: {}", e)))?;

        let config: RouterConfig = serde_yaml::from_str(&content)
            .map_err(|e| RouteError::config(&format!("Failed to parse config file: {}", e)))?;

        Ok(Self { config })
    }

    /// 创建默认配置
    pub fn new_default() -> Self {
        Self {
            config: RouterConfig::default(),
        }
    }

    /// 保存配置到文件
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(&self.config)?;
        tokio::fs::write(path, content)
            .await
            .map_err(|e| RouteError::config(&format!("Failed to write config file: {}", e)))?;
        Ok(())
    }

    pub fn get_config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn get_config_mut(&mut self) -> &mut RouterConfig {
        &mut self.config
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<()> {
        if self.config.application_id.trim().is_empty() {
            return Err(RouteError::config("Application id cannot be empty"));
        }

        if self.config.host_threads == 0 {
            return Err(RouteError::config("Host threads must be positive"));
        }

        if matches!(&self.config.process_name, Some(name) if name.trim().is_empty()) {
            return Err(RouteError::config("Process name cannot be blank"));
        }

        tracing::info!("Configuration validation passed");
        Ok(())
    }
}

/// 生成默认配置文件
pub async fn generate_default_config_file<P: AsRef<Path>>(path: P) -> Result<()> {
    let config_manager = ConfigManager::new_default();
    config_manager.save_to_file(path).await?;
    Ok(())
}
