//! 框架服务层模块
//!
//! 跨进程路由服务、通道传输和导航入口

pub mod channel;
pub mod route_service;
pub mod router;
pub mod wire;

// 重新导出核心服务
pub use channel::*;
pub use route_service::*;
pub use router::*;
pub use wire::{WireReply, WireRequest};
