//! 跨进程路由服务
//!
//! [`RouteService`] 是暴露给其他进程的能力集合：路由表访问、行为分发和拦截器执行。
//! 本进程内的实现是 [`RemoteRouteService`]，跨进程的传输适配见 `channel` 模块。
//!
//! 边界上的失败一律不以错误返回：查找不到、构造失败、执行失败和不可传输的结果
//! 都表现为 `None`，只在本地记录日志。

use crate::route::interceptor::fan_out;
use crate::route::{
    ActionResult, AppContext, Caches, InterceptorCallback, Postman, RemoteInterceptorCallback,
};
use crate::types::{
    InterruptReason, RemoteParam, RemoteRouteBean, RemoteValue, RouteBean, Transferable,
    REMOTE_ACTION_RESULT, REMOTE_ALL_APPLICATION_ID, REMOTE_INTERRUPT_REASON,
};
use crate::{Result, RouteError};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 路由服务能力集合
pub trait RouteService: Send + Sync {
    /// 登记一个应用 ID，重复登记无影响
    fn register_application_id(&self, application_id: &str);

    /// 所有已登记的应用 ID，放在 `REMOTE_ALL_APPLICATION_ID` 标签下
    fn all_application_ids(&self) -> RemoteParam;

    /// 整组替换路由表，`param` 为 path -> 路由描述
    fn register_route_group(&self, group: &str, param: RemoteParam);

    /// 查找路由，任一键为空或未找到时返回 `None`
    fn find_route_bean(&self, group: &str, path: &str) -> Option<RemoteRouteBean>;

    /// 执行行为，任何失败都返回 `None`
    fn do_action(&self, class_name: &str, action_name: &str) -> Option<RemoteParam>;

    /// 执行匹配的拦截器，阻塞直到全部报告或超过 `timeout_millis`
    fn handle_interceptor(
        &self,
        timeout_millis: u64,
        remote: RemoteRouteBean,
        callback: Arc<dyn RemoteInterceptorCallback>,
    );

    /// 同 `handle_interceptor`，但在请求没有完整送达或结束信号丢失时返回错误，
    /// 此时拦截结果未知。本进程内的实现不会失败。
    fn try_handle_interceptor(
        &self,
        timeout_millis: u64,
        remote: RemoteRouteBean,
        callback: Arc<dyn RemoteInterceptorCallback>,
    ) -> Result<()> {
        self.handle_interceptor(timeout_millis, remote, callback);
        Ok(())
    }
}

/// 取得行为处理器并执行，处理器内部的 panic 视为执行失败
pub(crate) fn invoke_action(
    caches: &Caches,
    class_name: &str,
    action_name: &str,
) -> Result<Option<ActionResult>> {
    let processor = caches.action_processor(class_name)?;
    catch_unwind(AssertUnwindSafe(|| processor.do_action(action_name)))
        .map_err(|_| RouteError::action_failed(class_name, "action processor panicked"))?
        .map_err(|e| RouteError::action_failed(class_name, e))
}

/// 把拦截结果转发给远程回调
struct RemoteForward {
    callback: Arc<dyn RemoteInterceptorCallback>,
}

impl InterceptorCallback for RemoteForward {
    fn on_continue(&self, _postman: &Postman) {
        self.callback.on_continue();
    }

    fn on_interrupt(&self, _postman: &Postman, reason: InterruptReason) {
        self.callback
            .on_interrupt(RemoteParam::single(REMOTE_INTERRUPT_REASON, reason.into_remote()));
    }
}

/// 本进程的路由服务实现
pub struct RemoteRouteService {
    caches: Arc<Caches>,
    context: AppContext,
}

impl RemoteRouteService {
    pub fn new(caches: Arc<Caches>, context: AppContext) -> Self {
        Self { caches, context }
    }

    pub fn caches(&self) -> &Arc<Caches> {
        &self.caches
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    fn try_do_action(&self, class_name: &str, action_name: &str) -> Result<Option<RemoteValue>> {
        let Some(result) = invoke_action(&self.caches, class_name, action_name)? else {
            return Ok(None);
        };
        match result.into_remote() {
            Some(RemoteValue::Null) => Ok(None),
            Some(value) => Ok(Some(value)),
            None => {
                debug!("{}#{} returned a non-transferable result", class_name, action_name);
                Ok(None)
            }
        }
    }
}

impl RouteService for RemoteRouteService {
    fn register_application_id(&self, application_id: &str) {
        if self.caches.register_application_id(application_id) {
            info!("Registered application id {}", application_id);
        }
    }

    fn all_application_ids(&self) -> RemoteParam {
        RemoteParam::single(
            REMOTE_ALL_APPLICATION_ID,
            RemoteValue::StringSet(self.caches.application_ids()),
        )
    }

    fn register_route_group(&self, group: &str, param: RemoteParam) {
        let mut routes = HashMap::with_capacity(param.len());
        for (path, value) in param.params {
            match RouteBean::from_remote(&value) {
                Some(route) => {
                    routes.insert(path, route);
                }
                None => warn!("Skip non-route value at {}/{}", group, path),
            }
        }
        let count = routes.len();
        self.caches.register_route_group(group, routes);
        info!("registerRouteGroup: {} groups, {} with {} routes", self.caches.groups().len(), group, count);
    }

    fn find_route_bean(&self, group: &str, path: &str) -> Option<RemoteRouteBean> {
        self.caches
            .find_route(group, path)
            .map(|route| RemoteRouteBean::from_route(&route))
    }

    fn do_action(&self, class_name: &str, action_name: &str) -> Option<RemoteParam> {
        if class_name.is_empty() || action_name.is_empty() {
            return None;
        }
        match self.try_do_action(class_name, action_name) {
            Ok(value) => value.map(|value| RemoteParam::single(REMOTE_ACTION_RESULT, value)),
            Err(e) => {
                warn!("Action processor {} not available in this process --> {}", class_name, e);
                None
            }
        }
    }

    fn handle_interceptor(
        &self,
        timeout_millis: u64,
        remote: RemoteRouteBean,
        callback: Arc<dyn RemoteInterceptorCallback>,
    ) {
        let postman = Arc::new(remote.into_postman());
        let matched = self.caches.matching_interceptors(&postman);
        let outcome = fan_out(
            &self.context,
            matched,
            postman.clone(),
            Duration::from_millis(timeout_millis),
            Arc::new(RemoteForward { callback }),
        );
        debug!(
            "handleInterceptor {}: matched={} continued={} interrupted={} pending={}",
            postman.key(),
            outcome.matched,
            outcome.continued,
            outcome.interrupted.len(),
            outcome.pending
        );
    }
}
