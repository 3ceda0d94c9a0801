//! 用于构建路由过程的请求对象
//!
//! [`Postman`] 在导航开始前由调用方通过 `with*` 系列方法构建，导航开始后框架只读。
//! 回调状态在导航结束或绑定的生命周期销毁时被清理，且只清理一次。

use super::callback::{
    erase_result_callback, ContinueCallback, ErasedResultCallback, InterruptCallback,
    RouteResult, RouteResultCallback,
};
use crate::core::{Lifecycle, LifecycleObserver, LifecycleSubscription};
use crate::services::{NavigationOutcome, Router};
use crate::types::{BinderHandle, Bundle, InterruptReason, RemoteValue, RouteBean, RouteKey, RouteType};
use parking_lot::Mutex;
use serde::Serialize;
use std::any::Any;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Default)]
struct CallbackSlots {
    result_callbacks: Option<Vec<ErasedResultCallback>>,
    continue_callback: Option<Arc<dyn ContinueCallback>>,
    interrupt_callback: Option<Arc<dyn InterruptCallback>>,
    subscription: Option<LifecycleSubscription>,
    destroyed: bool,
}

/// 回调状态，被生命周期以弱引用观察
#[derive(Default)]
struct PostmanSlots {
    inner: Mutex<CallbackSlots>,
}

impl PostmanSlots {
    /// 清理全部回调，返回是否为第一次清理
    fn teardown(&self) -> bool {
        let subscription = {
            let mut slots = self.inner.lock();
            if slots.destroyed {
                return false;
            }
            slots.destroyed = true;
            slots.result_callbacks = None;
            slots.continue_callback = None;
            slots.interrupt_callback = None;
            slots.subscription.take()
        };
        if let Some(subscription) = subscription {
            subscription.cancel();
        }
        true
    }
}

impl LifecycleObserver for PostmanSlots {
    fn on_destroy(&self, lifecycle: &Lifecycle) {
        if self.teardown() {
            debug!("Postman torn down by lifecycle '{}'", lifecycle.name());
        }
    }
}

/// 路由请求对象
pub struct Postman {
    group: String,
    path: String,
    types: BTreeSet<RouteType>,
    type_element: Option<String>,
    module_id: String,
    class_name: String,
    /// 路由所携带的数据
    payload: Bundle,
    /// 页面请求码，-1 表示不使用
    request_code: i32,
    /// 要执行的行为名称，空表示没有行为
    action_name: String,
    slots: Arc<PostmanSlots>,
}

impl Postman {
    pub fn new(group: &str, path: &str) -> Self {
        Self {
            group: group.to_string(),
            path: path.to_string(),
            types: BTreeSet::new(),
            type_element: None,
            module_id: String::new(),
            class_name: String::new(),
            payload: Bundle::new(),
            request_code: -1,
            action_name: String::new(),
            slots: Arc::new(PostmanSlots::default()),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn key(&self) -> RouteKey {
        RouteKey::new(&self.group, &self.path)
    }

    pub fn types(&self) -> &BTreeSet<RouteType> {
        &self.types
    }

    pub fn type_element(&self) -> Option<&str> {
        self.type_element.as_deref()
    }

    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn payload(&self) -> &Bundle {
        &self.payload
    }

    pub fn request_code(&self) -> i32 {
        self.request_code
    }

    pub fn action_name(&self) -> &str {
        &self.action_name
    }

    pub fn has_action(&self) -> bool {
        !self.action_name.is_empty()
    }

    /// 当前的路由描述部分
    pub fn route_bean(&self) -> RouteBean {
        RouteBean {
            group: self.group.clone(),
            path: self.path.clone(),
            types: self.types.clone(),
            type_element: self.type_element.clone(),
            module_id: self.module_id.clone(),
            class_name: self.class_name.clone(),
        }
    }

    // === 生命周期 ===

    /// 绑定生命周期，生命周期销毁时中断路由过程并释放回调。
    ///
    /// 已绑定时先解绑旧的观察。
    pub fn bind_lifecycle(self, lifecycle: &Lifecycle) -> Self {
        self.unbind_lifecycle();
        let observer: Arc<dyn LifecycleObserver> = self.slots.clone();
        let subscription = lifecycle.add_observer(&observer);
        let stale = {
            let mut slots = self.slots.inner.lock();
            if slots.destroyed {
                Some(subscription)
            } else {
                slots.subscription = Some(subscription);
                None
            }
        };
        if let Some(subscription) = stale {
            subscription.cancel();
        }
        self
    }

    /// 解绑生命周期，路由结束后会自动解绑
    pub fn unbind_lifecycle(&self) {
        let subscription = self.slots.inner.lock().subscription.take();
        if let Some(subscription) = subscription {
            subscription.cancel();
        }
    }

    pub fn is_lifecycle_bound(&self) -> bool {
        self.slots.inner.lock().subscription.is_some()
    }

    // === 回调 ===

    /// 添加结果回调，可以为不同的结果类型添加多个。
    ///
    /// - 导航被拦截时不会回调
    /// - 只回调结果类型与 `T` 匹配的那些
    pub fn add_on_result_callback<T, C>(self, callback: C) -> Self
    where
        T: Any + Send + Sync,
        C: RouteResultCallback<T> + 'static,
    {
        {
            let mut slots = self.slots.inner.lock();
            if !slots.destroyed {
                slots
                    .result_callbacks
                    .get_or_insert_with(Vec::new)
                    .push(erase_result_callback(callback));
            }
        }
        self
    }

    /// 拦截器放行后回调，只保留最后一次设置
    pub fn do_on_continue<C: ContinueCallback + 'static>(self, callback: C) -> Self {
        {
            let mut slots = self.slots.inner.lock();
            if !slots.destroyed {
                slots.continue_callback = Some(Arc::new(callback));
            }
        }
        self
    }

    /// 拦截器拦截后回调，只保留最后一次设置
    pub fn do_on_interrupt<C: InterruptCallback + 'static>(self, callback: C) -> Self {
        {
            let mut slots = self.slots.inner.lock();
            if !slots.destroyed {
                slots.interrupt_callback = Some(Arc::new(callback));
            }
        }
        self
    }

    // === 参数 ===

    /// 设置要执行的行为，空名称被忽略
    pub fn with_route_action(mut self, action_name: &str) -> Self {
        if !action_name.is_empty() {
            self.action_name = action_name.to_string();
        }
        self
    }

    pub fn with_request_code(mut self, request_code: i32) -> Self {
        self.request_code = request_code;
        self
    }

    pub fn with_int(self, key: &str, value: i32) -> Self {
        self.with_value(key, RemoteValue::Int(value))
    }

    pub fn with_long(self, key: &str, value: i64) -> Self {
        self.with_value(key, RemoteValue::Long(value))
    }

    pub fn with_double(self, key: &str, value: f64) -> Self {
        self.with_value(key, RemoteValue::Double(value))
    }

    pub fn with_boolean(self, key: &str, value: bool) -> Self {
        self.with_value(key, RemoteValue::Bool(value))
    }

    pub fn with_string(self, key: &str, value: impl Into<String>) -> Self {
        self.with_value(key, RemoteValue::String(value.into()))
    }

    pub fn with_bytes(self, key: &str, value: Vec<u8>) -> Self {
        self.with_value(key, RemoteValue::Bytes(value))
    }

    /// 按值序列化写入，序列化失败时忽略并记录
    pub fn with_serializable<T: Serialize>(self, key: &str, value: &T) -> Self {
        match RemoteValue::serialize(value) {
            Ok(value) => self.with_value(key, value),
            Err(e) => {
                warn!("Skip non-serializable value for key '{}': {}", key, e);
                self
            }
        }
    }

    /// 按引用传递的句柄，只在持有者进程存活期间有效
    pub fn with_binder(self, key: &str, value: BinderHandle) -> Self {
        self.with_value(key, RemoteValue::Binder(value))
    }

    pub fn with_value(mut self, key: &str, value: RemoteValue) -> Self {
        self.payload.put(key, value);
        self
    }

    pub fn with_all(mut self, bundle: Option<&Bundle>) -> Self {
        if let Some(bundle) = bundle {
            self.payload.put_all(bundle);
        }
        self
    }

    /// 路由调用链的最后一步，开始导航
    pub fn navigation(self, router: &Router) -> NavigationOutcome {
        router.navigation(self)
    }

    // === 框架内部 ===

    /// 复制另一个请求的数据：负载合并，标量全部覆盖
    pub(crate) fn from_postman(&mut self, other: &Postman) {
        self.payload.put_all(&other.payload);
        self.action_name = other.action_name.clone();
        self.request_code = other.request_code;
        self.from_route(&other.route_bean());
    }

    /// 把路由描述覆盖到请求上
    pub(crate) fn from_route(&mut self, route: &RouteBean) {
        self.group = route.group.clone();
        self.path = route.path.clone();
        self.types = route.types.clone();
        self.type_element = route.type_element.clone();
        self.module_id = route.module_id.clone();
        self.class_name = route.class_name.clone();
    }

    /// 投递路由结果给类型匹配的回调，已清理时静默丢弃。返回是否投递。
    pub fn deliver_result(&self, result: Option<RouteResult>) -> bool {
        let callbacks = {
            let slots = self.slots.inner.lock();
            if slots.destroyed {
                return false;
            }
            slots.result_callbacks.clone().unwrap_or_default()
        };
        for callback in callbacks {
            callback(result.as_ref());
        }
        true
    }

    /// 通知继续回调，返回是否有回调被调用
    pub fn notify_continue(&self) -> bool {
        let callback = {
            let slots = self.slots.inner.lock();
            if slots.destroyed {
                return false;
            }
            slots.continue_callback.clone()
        };
        match callback {
            Some(callback) => {
                callback.on_continue(self);
                true
            }
            None => false,
        }
    }

    /// 通知拦截回调，返回是否有回调被调用
    pub fn notify_interrupt(&self, reason: &InterruptReason) -> bool {
        let callback = {
            let slots = self.slots.inner.lock();
            if slots.destroyed {
                return false;
            }
            slots.interrupt_callback.clone()
        };
        match callback {
            Some(callback) => {
                callback.on_interrupt(self, reason);
                true
            }
            None => false,
        }
    }

    /// 清理回调并解绑生命周期，返回是否为第一次清理
    pub fn destroy(&self) -> bool {
        self.slots.teardown()
    }

    pub fn is_destroyed(&self) -> bool {
        self.slots.inner.lock().destroyed
    }
}

impl Drop for Postman {
    fn drop(&mut self) {
        self.unbind_lifecycle();
    }
}

impl std::fmt::Debug for Postman {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Postman")
            .field("group", &self.group)
            .field("path", &self.path)
            .field("class_name", &self.class_name)
            .field("action_name", &self.action_name)
            .field("request_code", &self.request_code)
            .field("payload", &self.payload)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
