//! 核心基础层模块
//!
//! 提供框架的基础设施：倒计数屏障和生命周期作用域

pub mod barrier;
pub mod lifecycle;

// 重新导出核心组件
pub use barrier::*;
pub use lifecycle::*;
