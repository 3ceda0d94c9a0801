//! 拦截器运行时的应用上下文

use std::fmt;

/// 应用上下文，随每次拦截器调用传入
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppContext {
    /// 本进程所属应用的 ID
    pub application_id: String,
    /// 进程名
    pub process_name: String,
}

impl AppContext {
    pub fn new(application_id: &str) -> Self {
        Self {
            application_id: application_id.to_string(),
            process_name: application_id.to_string(),
        }
    }

    pub fn with_process_name(mut self, process_name: &str) -> Self {
        self.process_name = process_name.to_string();
        self
    }
}

impl fmt::Display for AppContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.application_id, self.process_name)
    }
}
