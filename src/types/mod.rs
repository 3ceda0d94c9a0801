//! 核心数据类型模块
//!
//! 路由描述、可传输值和跨进程信封

pub mod consts;
pub mod remote;
pub mod route;
pub mod value;

// 重新导出所有公共类型
pub use consts::*;
pub use remote::*;
pub use route::*;
pub use value::*;
