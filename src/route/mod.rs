//! 路由层模块
//!
//! 请求对象、回调契约、拦截器、行为处理器和进程级注册表

pub mod action;
pub mod caches;
pub mod callback;
pub mod context;
pub mod interceptor;
pub mod postman;

// 重新导出路由组件
pub use action::*;
pub use caches::*;
pub use callback::*;
pub use context::*;
pub use interceptor::*;
pub use postman::*;
