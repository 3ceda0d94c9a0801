//! 路由导航入口
//!
//! 一次导航依次经过：查找路由、合并路由信息、执行拦截器、执行行为或交给宿主打开、
//! 投递结果，最后清理请求对象。路由先在本进程注册表查找，再依次询问远程路由服务，
//! 由远程服务找到的路由也在该服务所在进程执行拦截器和行为。

use super::route_service::{invoke_action, RemoteRouteService, RouteService};
use crate::config::RouterConfig;
use crate::route::{
    ActionResult, AppContext, Caches, ChainOutcome, InterceptorChain, Postman,
    RemoteInterceptorCallback, RouteResult,
};
use crate::types::{
    InterruptReason, RemoteParam, RemoteRouteBean, RemoteValue, RouteBean, Transferable,
    REMOTE_ACTION_RESULT, REMOTE_INTERRUPT_REASON,
};
use crate::{Result, RouteError};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 导航结果
#[derive(Debug, Clone, PartialEq)]
pub enum NavigationOutcome {
    /// 已执行并投递结果
    Completed,
    /// 本进程和所有远程服务都没有这个路由
    NotFound,
    /// 被拦截器拦截
    Interrupted(InterruptReason),
    /// 等待拦截器超时，仍有 `pending` 个未报告
    TimedOut { pending: usize },
    /// 执行失败
    Failed(String),
}

/// 宿主的页面打开能力，处理没有行为名的导航
#[cfg_attr(test, mockall::automock)]
pub trait RouteLauncher: Send + Sync {
    fn launch(&self, context: &AppContext, postman: &Postman) -> anyhow::Result<Option<RouteResult>>;
}

/// 把远程拦截结果转给请求自己的回调，并记下第一个拦截原因
struct RemoteBridge {
    postman: Arc<Postman>,
    interrupted: Mutex<Option<InterruptReason>>,
}

impl RemoteInterceptorCallback for RemoteBridge {
    fn on_continue(&self) {
        self.postman.notify_continue();
    }

    fn on_interrupt(&self, reason: RemoteParam) {
        let reason = reason
            .get_as::<InterruptReason>(REMOTE_INTERRUPT_REASON)
            .unwrap_or_else(|| InterruptReason::new(-1, "remote interceptor interrupted"));
        self.interrupted.lock().get_or_insert_with(|| reason.clone());
        self.postman.notify_interrupt(&reason);
    }
}

/// 路由器
pub struct Router {
    caches: Arc<Caches>,
    context: AppContext,
    chain: InterceptorChain,
    remotes: RwLock<Vec<Arc<dyn RouteService>>>,
    launcher: RwLock<Option<Arc<dyn RouteLauncher>>>,
    interceptor_timeout: Duration,
}

impl Router {
    pub fn new(caches: Arc<Caches>, context: AppContext) -> Self {
        Self::with_timeout(caches, context, RouterConfig::default().interceptor_timeout())
    }

    pub fn with_timeout(caches: Arc<Caches>, context: AppContext, interceptor_timeout: Duration) -> Self {
        Self {
            chain: InterceptorChain::new(caches.clone(), context.clone()),
            caches,
            context,
            remotes: RwLock::new(Vec::new()),
            launcher: RwLock::new(None),
            interceptor_timeout,
        }
    }

    pub fn from_config(config: &RouterConfig, caches: Arc<Caches>) -> Self {
        Self::with_timeout(caches, config.app_context(), config.interceptor_timeout())
    }

    pub fn caches(&self) -> &Arc<Caches> {
        &self.caches
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    pub fn interceptor_timeout(&self) -> Duration {
        self.interceptor_timeout
    }

    pub fn set_launcher(&self, launcher: Arc<dyn RouteLauncher>) {
        *self.launcher.write() = Some(launcher);
    }

    /// 添加一个远程路由服务，查找顺序与添加顺序一致
    pub fn add_remote_service(&self, service: Arc<dyn RouteService>) {
        self.remotes.write().push(service);
        info!("Added remote route service, {} in total", self.remotes.read().len());
    }

    /// 本进程对外暴露的路由服务
    pub fn local_service(&self) -> RemoteRouteService {
        RemoteRouteService::new(self.caches.clone(), self.context.clone())
    }

    /// 向远程服务登记本进程的应用 ID 和所有路由组
    pub fn publish_to(&self, service: &dyn RouteService) {
        service.register_application_id(&self.context.application_id);
        for group in self.caches.groups() {
            let Some(table) = self.caches.route_group(&group) else {
                continue;
            };
            let param: RemoteParam = table
                .iter()
                .map(|(path, route)| (path.clone(), route.clone().into_remote()))
                .collect();
            service.register_route_group(&group, param);
        }
        debug!("Published {} to remote route service", self.context);
    }

    /// 查找路由，返回路由描述和找到它的远程服务
    fn lookup(&self, group: &str, path: &str) -> Option<(RouteBean, Option<Arc<dyn RouteService>>)> {
        if let Some(route) = self.caches.find_route(group, path) {
            return Some((route, None));
        }
        let remotes = self.remotes.read().clone();
        remotes.into_iter().find_map(|service| {
            service
                .find_route_bean(group, path)
                .map(|remote| (remote.route_bean, Some(service)))
        })
    }

    fn run_interceptors(
        &self,
        postman: &Arc<Postman>,
        remote: Option<&Arc<dyn RouteService>>,
    ) -> Option<NavigationOutcome> {
        let local: ChainOutcome = self.chain.execute(postman, self.interceptor_timeout);
        if let Some(reason) = local.interrupted.first() {
            return Some(NavigationOutcome::Interrupted(reason.clone()));
        }
        if local.timed_out() {
            return Some(NavigationOutcome::TimedOut { pending: local.pending });
        }

        let service = remote?;
        let bridge = Arc::new(RemoteBridge {
            postman: postman.clone(),
            interrupted: Mutex::new(None),
        });
        let timeout_millis = u64::try_from(self.interceptor_timeout.as_millis()).unwrap_or(u64::MAX);
        let delivered =
            service.try_handle_interceptor(timeout_millis, RemoteRouteBean::from_postman(postman), bridge.clone());
        let interrupted = bridge.interrupted.lock().take();
        if let Some(reason) = interrupted {
            return Some(NavigationOutcome::Interrupted(reason));
        }
        // 拦截结果未知时不执行路由
        delivered.err().map(|e| {
            warn!("Remote interceptors for {} did not complete: {}", postman.key(), e);
            NavigationOutcome::Failed(e.to_string())
        })
    }

    fn execute_action(
        &self,
        postman: &Postman,
        remote: Option<&Arc<dyn RouteService>>,
    ) -> Result<Option<RouteResult>> {
        let class_name = postman.class_name();
        let action_name = postman.action_name();
        match invoke_action(&self.caches, class_name, action_name) {
            Ok(result) => Ok(result.and_then(ActionResult::into_route_result)),
            Err(RouteError::ActionNotFound { .. }) if remote.is_some() => {
                let value = remote
                    .and_then(|service| service.do_action(class_name, action_name))
                    .and_then(|mut param| param.params.remove(REMOTE_ACTION_RESULT));
                Ok(value.and_then(RemoteValue::into_any))
            }
            Err(e) => Err(e),
        }
    }

    fn execute(&self, postman: &Postman, remote: Option<&Arc<dyn RouteService>>) -> NavigationOutcome {
        let result = if postman.has_action() {
            self.execute_action(postman, remote).map_err(|e| e.to_string())
        } else {
            let launcher = self.launcher.read().clone();
            match launcher {
                Some(launcher) => launcher.launch(&self.context, postman).map_err(|e| e.to_string()),
                None => Err("no route launcher installed".to_string()),
            }
        };

        match result {
            Ok(result) => {
                postman.deliver_result(result);
                NavigationOutcome::Completed
            }
            Err(message) => {
                warn!("Navigation to {} failed: {}", postman.key(), message);
                NavigationOutcome::Failed(message)
            }
        }
    }

    /// 执行一次导航，阻塞直到结果确定，结束后清理请求对象
    pub fn navigation(&self, postman: Postman) -> NavigationOutcome {
        let mut postman = postman;
        let Some((route, remote)) = self.lookup(postman.group(), postman.path()) else {
            let reason = InterruptReason::route_not_found(postman.group(), postman.path());
            warn!("Route not found: {}", postman.key());
            postman.notify_interrupt(&reason);
            postman.destroy();
            return NavigationOutcome::NotFound;
        };

        postman.from_route(&route);
        let postman = Arc::new(postman);
        let outcome = match self.run_interceptors(&postman, remote.as_ref()) {
            Some(stopped) => stopped,
            None => self.execute(&postman, remote.as_ref()),
        };

        debug!("Navigation {} finished with {:?}", postman.key(), outcome);
        postman.destroy();
        outcome
    }

    /// 在阻塞线程池上执行导航
    pub async fn navigation_async(self: Arc<Self>, postman: Postman) -> NavigationOutcome {
        match tokio::task::spawn_blocking(move || self.navigation(postman)).await {
            Ok(outcome) => outcome,
            Err(e) => NavigationOutcome::Failed(format!("navigation task failed: {}", e)),
        }
    }
}
