//! 行为处理器
//!
//! 行为处理器按类名注册构造器，首次使用时构造并缓存为单例。

use super::callback::RouteResult;
use crate::types::{RemoteValue, Transferable};
use std::any::Any;
use std::sync::Arc;

/// 行为执行结果
pub enum ActionResult {
    /// 可跨进程的结果
    Transferable(RemoteValue),
    /// 只能在本进程内使用的结果，跨进程时视为缺失
    Local(RouteResult),
}

impl ActionResult {
    pub fn transferable<T: Transferable>(value: T) -> Self {
        Self::Transferable(value.into_remote())
    }

    pub fn local<T: Any + Send + Sync>(value: T) -> Self {
        Self::Local(Arc::new(value))
    }

    /// 跨进程形式，本地结果返回 `None`
    pub fn into_remote(self) -> Option<RemoteValue> {
        match self {
            Self::Transferable(value) => Some(value),
            Self::Local(_) => None,
        }
    }

    /// 投递给结果回调的形式
    pub fn into_route_result(self) -> Option<RouteResult> {
        match self {
            Self::Transferable(value) => value.into_any(),
            Self::Local(value) => Some(value),
        }
    }
}

impl std::fmt::Debug for ActionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transferable(value) => f.debug_tuple("Transferable").field(value).finish(),
            Self::Local(_) => f.write_str("Local(..)"),
        }
    }
}

/// 行为处理器
pub trait ActionProcessor: Send + Sync {
    /// 执行名为 `action_name` 的行为
    fn do_action(&self, action_name: &str) -> anyhow::Result<Option<ActionResult>>;
}

/// 行为处理器构造器（无参构造）
pub type ActionFactory = Arc<dyn Fn() -> anyhow::Result<Arc<dyn ActionProcessor>> + Send + Sync>;
