//! 框架常量
//!
//! 生成的路由表命名规则，以及跨进程信封中使用的标签

/// 路由表生成的根命名空间
pub const PACKAGE_NAME_ROUTE: &str = "component_router::generated::routes";

/// 文件名分隔符
pub const SEPARATOR: &str = "$$";

/// 路由表生成的名称前缀
pub const PREFIX_ROUTE: &str = "Route$$Path$$";

/// 信封标签：所有已注册的应用 ID
pub const REMOTE_ALL_APPLICATION_ID: &str = "REMOTE_ALL_APPLICATION_ID";

/// 信封标签：行为执行结果
pub const REMOTE_ACTION_RESULT: &str = "REMOTE_ACTION_RESULT";

/// 信封标签：拦截原因
pub const REMOTE_INTERRUPT_REASON: &str = "REMOTE_INTERRUPT_REASON";

/// 生成的路由表完整名称，例如 `component_router::generated::routes::Route$$Path$$user`
pub fn route_table_name(group: &str) -> String {
    format!("{}::{}{}", PACKAGE_NAME_ROUTE, PREFIX_ROUTE, group)
}
