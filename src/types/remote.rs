//! 跨进程传输的信封类型

use super::route::RouteBean;
use super::value::{Bundle, RemoteValue, Transferable};
use crate::route::Postman;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 跨进程参数信封，标签到可传输值的映射
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteParam {
    pub params: BTreeMap<String, RemoteValue>,
}

impl RemoteParam {
    pub fn new() -> Self {
        Self::default()
    }

    /// 只包含一个标签的信封
    pub fn single(label: &str, value: RemoteValue) -> Self {
        let mut param = Self::new();
        param.insert(label, value);
        param
    }

    pub fn insert(&mut self, label: &str, value: RemoteValue) {
        self.params.insert(label.to_string(), value);
    }

    pub fn get(&self, label: &str) -> Option<&RemoteValue> {
        self.params.get(label)
    }

    pub fn get_as<T: Transferable>(&self, label: &str) -> Option<T> {
        self.get(label).and_then(T::from_remote)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

impl FromIterator<(String, RemoteValue)> for RemoteParam {
    fn from_iter<I: IntoIterator<Item = (String, RemoteValue)>>(iter: I) -> Self {
        Self {
            params: iter.into_iter().collect(),
        }
    }
}

/// 请求对象中需要跨进程的部分（回调不跨进程）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestState {
    pub payload: Bundle,
    pub request_code: i32,
    pub action_name: String,
}

/// 包装单个 [`RouteBean`] 或 [`Postman`] 快照用于传输
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRouteBean {
    pub route_bean: RouteBean,
    /// 来自 `Postman` 时携带请求数据
    pub request: Option<RequestState>,
}

impl RemoteRouteBean {
    pub fn from_route(route_bean: &RouteBean) -> Self {
        Self {
            route_bean: route_bean.clone(),
            request: None,
        }
    }

    pub fn from_postman(postman: &Postman) -> Self {
        Self {
            route_bean: postman.route_bean(),
            request: Some(RequestState {
                payload: postman.payload().clone(),
                request_code: postman.request_code(),
                action_name: postman.action_name().to_string(),
            }),
        }
    }

    /// 在接收端还原出一个新的 `Postman`，不带任何回调
    pub fn into_postman(self) -> Postman {
        let mut carrier = Postman::new(&self.route_bean.group, &self.route_bean.path);
        carrier.from_route(&self.route_bean);
        let Some(request) = self.request else {
            return carrier;
        };
        let carrier = carrier
            .with_all(Some(&request.payload))
            .with_route_action(&request.action_name)
            .with_request_code(request.request_code);
        // 快照经由 carrier 整体复制，接收端的请求对象不继承任何回调
        let mut postman = Postman::new(&self.route_bean.group, &self.route_bean.path);
        postman.from_postman(&carrier);
        postman
    }
}

/// 路由被拦截的原因
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterruptReason {
    pub code: i32,
    pub message: String,
    pub payload: RemoteValue,
}

impl InterruptReason {
    /// 没有找到路由
    pub const ROUTE_NOT_FOUND: i32 = -404;

    pub fn new(code: i32, message: &str) -> Self {
        Self {
            code,
            message: message.to_string(),
            payload: RemoteValue::Null,
        }
    }

    pub fn with_payload<T: Transferable>(mut self, payload: T) -> Self {
        self.payload = payload.into_remote();
        self
    }

    pub fn payload_as<T: Transferable>(&self) -> Option<T> {
        T::from_remote(&self.payload)
    }

    pub fn route_not_found(group: &str, path: &str) -> Self {
        Self::new(
            Self::ROUTE_NOT_FOUND,
            &format!("route not found: /{}/{}", group, path),
        )
    }
}

impl Transferable for InterruptReason {
    fn into_remote(self) -> RemoteValue {
        // 序列化一个普通结构体不会失败
        RemoteValue::serialize(&self).unwrap_or(RemoteValue::Null)
    }

    fn from_remote(value: &RemoteValue) -> Option<Self> {
        value.deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RouteType;

    #[test]
    fn test_postman_snapshot_restores_request() {
        let route = RouteBean::new("user", "profile")
            .with_type(RouteType::Activity)
            .with_class_name("com.app.ProfileActivity");
        let mut postman = Postman::new("user", "profile")
            .with_int("uid", 9)
            .with_double("ratio", f64::NAN)
            .with_route_action("refresh")
            .with_request_code(3);
        postman.from_route(&route);

        let json = serde_json::to_string(&RemoteRouteBean::from_postman(&postman)).unwrap();
        let remote: RemoteRouteBean = serde_json::from_str(&json).unwrap();
        let restored = remote.into_postman();

        assert_eq!(restored.route_bean(), route);
        assert_eq!(restored.payload().get_as::<i32>("uid"), Some(9));
        assert!(restored.payload().get_as::<f64>("ratio").is_some_and(f64::is_nan));
        assert_eq!(restored.action_name(), "refresh");
        assert_eq!(restored.request_code(), 3);
    }

    #[test]
    fn test_interrupt_reason_payload() {
        let reason = InterruptReason::new(401, "login required").with_payload("/user/login".to_string());
        let value = reason.clone().into_remote();

        let back = InterruptReason::from_remote(&value).unwrap();
        assert_eq!(back, reason);
        assert_eq!(back.payload_as::<String>().as_deref(), Some("/user/login"));
    }
}
