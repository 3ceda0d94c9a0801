//! 路由框架错误处理系统
//!
//! 统一的错误类型。跨进程边界上的失败不会以错误形式返回给调用方，
//! 只在本地记录日志，这里的错误主要服务于配置、传输和行为处理器内部。

use thiserror::Error;

/// 框架统一错误类型
#[derive(Error, Debug)]
pub enum RouteError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Action processor not found: {class_name}")]
    ActionNotFound { class_name: String },

    #[error("Action processor {class_name} failed: {message}")]
    ActionFailed { class_name: String, message: String },

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Already initialized: {message}")]
    AlreadyInitialized { message: String },
}

impl RouteError {
    /// 创建配置相关错误
    pub fn config(message: &str) -> Self {
        Self::Config {
            message: message.to_string(),
        }
    }

    /// 创建行为处理器缺失错误
    pub fn action_not_found(class_name: &str) -> Self {
        Self::ActionNotFound {
            class_name: class_name.to_string(),
        }
    }

    /// 创建行为处理器执行失败错误
    pub fn action_failed(class_name: &str, message: impl std::fmt::Display) -> Self {
        Self::ActionFailed {
            class_name: class_name.to_string(),
            message: message.to_string(),
        }
    }

    /// 创建传输相关错误
    pub fn transport(message: impl std::fmt::Display) -> Self {
        Self::Transport {
            message: message.to_string(),
        }
    }

    pub fn already_initialized(message: &str) -> Self {
        Self::AlreadyInitialized {
            message: message.to_string(),
        }
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, RouteError>;
