//! 路由注册表
//!
//! 进程级的路由表、行为处理器单例、拦截器和应用 ID。
//! 只追加不删除，唯一的覆盖操作是整组替换路由表。

use super::action::{ActionFactory, ActionProcessor};
use super::interceptor::Interceptor;
use super::postman::Postman;
use crate::types::{route_table_name, RouteBean};
use crate::{Result, RouteError};
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

static GLOBAL_CACHES: OnceCell<Arc<Caches>> = OnceCell::new();

/// 一个路由组的路由表，path -> 路由描述
pub type RouteGroup = HashMap<String, RouteBean>;

/// 路由注册表
#[derive(Default)]
pub struct Caches {
    /// group -> 路由表，整表替换保证读者看到完整的旧表或新表
    route_cache: DashMap<String, Arc<RouteGroup>>,
    /// 类名 -> 行为处理器单例
    action_cache: DashMap<String, Arc<dyn ActionProcessor>>,
    /// 类名 -> 构造器
    action_factories: DashMap<String, ActionFactory>,
    /// 按注册顺序排列的拦截器
    interceptors: RwLock<Vec<Arc<dyn Interceptor>>>,
    /// 已注册的应用 ID
    application_ids: RwLock<BTreeSet<String>>,
}

impl Caches {
    pub fn new() -> Self {
        Self::default()
    }

    /// 安装进程级实例，只能安装一次
    pub fn install_global(caches: Arc<Caches>) -> Result<()> {
        GLOBAL_CACHES
            .set(caches)
            .map_err(|_| RouteError::already_initialized("global route caches"))
    }

    pub fn global() -> Option<Arc<Caches>> {
        GLOBAL_CACHES.get().cloned()
    }

    // === 路由表 ===

    /// 整组替换路由表
    pub fn register_route_group(&self, group: &str, routes: RouteGroup) {
        debug!("Install {} with {} routes", route_table_name(group), routes.len());
        self.route_cache.insert(group.to_string(), Arc::new(routes));
    }

    /// 以路由描述列表整组替换，path 取自描述本身
    pub fn register_routes<I>(&self, group: &str, routes: I)
    where
        I: IntoIterator<Item = RouteBean>,
    {
        let routes = routes
            .into_iter()
            .map(|route| (route.path.clone(), route))
            .collect();
        self.register_route_group(group, routes);
    }

    /// 查找路由，任一键为空时返回 `None`
    pub fn find_route(&self, group: &str, path: &str) -> Option<RouteBean> {
        if group.is_empty() || path.is_empty() {
            return None;
        }
        let table = self.route_cache.get(group).map(|entry| entry.value().clone())?;
        table.get(path).cloned()
    }

    pub fn route_group(&self, group: &str) -> Option<Arc<RouteGroup>> {
        self.route_cache.get(group).map(|entry| entry.value().clone())
    }

    pub fn groups(&self) -> Vec<String> {
        let mut groups: Vec<String> = self.route_cache.iter().map(|entry| entry.key().clone()).collect();
        groups.sort();
        groups
    }

    // === 行为处理器 ===

    pub fn register_action_factory(&self, class_name: &str, factory: ActionFactory) {
        self.action_factories.insert(class_name.to_string(), factory);
    }

    /// 以构造函数注册行为处理器
    pub fn register_action<P, F>(&self, class_name: &str, constructor: F)
    where
        P: ActionProcessor + 'static,
        F: Fn() -> anyhow::Result<P> + Send + Sync + 'static,
    {
        let factory: ActionFactory = Arc::new(move || -> anyhow::Result<Arc<dyn ActionProcessor>> {
            Ok(Arc::new(constructor()?))
        });
        self.register_action_factory(class_name, factory);
    }

    pub fn cached_action(&self, class_name: &str) -> Option<Arc<dyn ActionProcessor>> {
        self.action_cache.get(class_name).map(|entry| entry.value().clone())
    }

    /// 取得行为处理器单例，没有缓存时构造并缓存。
    ///
    /// 并发构造时后写入者覆盖缓存槽位。
    pub fn action_processor(&self, class_name: &str) -> Result<Arc<dyn ActionProcessor>> {
        if let Some(processor) = self.cached_action(class_name) {
            return Ok(processor);
        }
        let factory = self
            .action_factories
            .get(class_name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RouteError::action_not_found(class_name))?;
        let processor = factory().map_err(|e| RouteError::action_failed(class_name, e))?;
        self.action_cache.insert(class_name.to_string(), processor.clone());
        debug!("Cached action processor {}", class_name);
        Ok(processor)
    }

    // === 拦截器 ===

    /// 注册拦截器，同一实例重复注册被忽略
    pub fn add_interceptor(&self, interceptor: Arc<dyn Interceptor>) -> bool {
        let mut interceptors = self.interceptors.write();
        let exists = interceptors
            .iter()
            .any(|it| std::ptr::addr_eq(Arc::as_ptr(it), Arc::as_ptr(&interceptor)));
        if exists {
            return false;
        }
        info!("Registered interceptor {}", interceptor.name());
        interceptors.push(interceptor);
        true
    }

    pub fn interceptors(&self) -> Vec<Arc<dyn Interceptor>> {
        self.interceptors.read().clone()
    }

    /// 按注册顺序筛选匹配请求的拦截器
    pub fn matching_interceptors(&self, postman: &Postman) -> Vec<Arc<dyn Interceptor>> {
        self.interceptors()
            .into_iter()
            .filter(|interceptor| interceptor.matches(postman))
            .collect()
    }

    // === 应用 ID ===

    /// 登记应用 ID，返回是否为新值
    pub fn register_application_id(&self, application_id: &str) -> bool {
        self.application_ids.write().insert(application_id.to_string())
    }

    pub fn application_ids(&self) -> BTreeSet<String> {
        self.application_ids.read().clone()
    }
}
