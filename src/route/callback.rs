//! 路由回调契约
//!
//! 调用方实现这些特征来接收异步的继续、拦截和结果通知。
//! 除远程回调外都为闭包提供了实现。

use super::postman::Postman;
use crate::types::{InterruptReason, RemoteParam};
use std::any::Any;
use std::sync::Arc;

/// 类型擦除后的路由结果
pub type RouteResult = Arc<dyn Any + Send + Sync>;

/// 拦截器执行结果的回调，每个拦截器应调用其中之一
pub trait InterceptorCallback: Send + Sync {
    /// 放行
    fn on_continue(&self, postman: &Postman);

    /// 拦截
    fn on_interrupt(&self, postman: &Postman, reason: InterruptReason);
}

/// 拦截器执行 `on_continue` 后回调
pub trait ContinueCallback: Send + Sync {
    fn on_continue(&self, postman: &Postman);
}

impl<F> ContinueCallback for F
where
    F: Fn(&Postman) + Send + Sync,
{
    fn on_continue(&self, postman: &Postman) {
        self(postman)
    }
}

/// 拦截器执行 `on_interrupt` 后回调
pub trait InterruptCallback: Send + Sync {
    fn on_interrupt(&self, postman: &Postman, reason: &InterruptReason);
}

impl<F> InterruptCallback for F
where
    F: Fn(&Postman, &InterruptReason) + Send + Sync,
{
    fn on_interrupt(&self, postman: &Postman, reason: &InterruptReason) {
        self(postman, reason)
    }
}

/// 路由成功的结果回调，`T` 为接受的结果类型
pub trait RouteResultCallback<T>: Send + Sync {
    fn on_result(&self, result: Option<Arc<T>>);
}

impl<T, F> RouteResultCallback<T> for F
where
    F: Fn(Option<Arc<T>>) + Send + Sync,
{
    fn on_result(&self, result: Option<Arc<T>>) {
        self(result)
    }
}

/// 跨进程的拦截器回调，拦截原因以信封形式传回
pub trait RemoteInterceptorCallback: Send + Sync {
    fn on_continue(&self);

    fn on_interrupt(&self, reason: RemoteParam);
}

/// 结果回调的类型过滤适配器
pub(crate) type ErasedResultCallback = Arc<dyn Fn(Option<&RouteResult>) + Send + Sync>;

pub(crate) fn erase_result_callback<T, C>(callback: C) -> ErasedResultCallback
where
    T: Any + Send + Sync,
    C: RouteResultCallback<T> + 'static,
{
    Arc::new(move |result: Option<&RouteResult>| match result {
        None => callback.on_result(None),
        Some(value) => {
            // 类型不匹配时静默丢弃
            if let Ok(typed) = Arc::clone(value).downcast::<T>() {
                callback.on_result(Some(typed));
            }
        }
    })
}
