//! 路由描述
//!
//! [`RouteBean`] 是一个可导航目标的不可变描述，由生成的路由表在进程启动时注册

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// 路由目标的类型标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RouteType {
    /// 页面
    Activity,
    /// 页面片段
    Fragment,
    /// 行为处理器
    ActionProcessor,
    /// 拦截器
    Interceptor,
    /// 服务提供者
    Provider,
}

/// 路由身份，`(group, path)`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RouteKey {
    pub group: String,
    pub path: String,
}

impl RouteKey {
    pub fn new(group: &str, path: &str) -> Self {
        Self {
            group: group.to_string(),
            path: path.to_string(),
        }
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.group, self.path)
    }
}

/// 路由描述
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteBean {
    /// 路由组
    pub group: String,
    /// 组内路径
    pub path: String,
    /// 目标类型标签
    pub types: BTreeSet<RouteType>,
    /// 目标的类型描述（全限定名）
    pub type_element: Option<String>,
    /// 声明该路由的模块
    pub module_id: String,
    /// 目标类名，行为处理器通过它构造
    pub class_name: String,
}

impl RouteBean {
    pub fn new(group: &str, path: &str) -> Self {
        Self {
            group: group.to_string(),
            path: path.to_string(),
            ..Default::default()
        }
    }

    pub fn with_type(mut self, route_type: RouteType) -> Self {
        self.types.insert(route_type);
        self
    }

    pub fn with_type_element(mut self, type_element: &str) -> Self {
        self.type_element = Some(type_element.to_string());
        self
    }

    pub fn with_module_id(mut self, module_id: &str) -> Self {
        self.module_id = module_id.to_string();
        self
    }

    pub fn with_class_name(mut self, class_name: &str) -> Self {
        self.class_name = class_name.to_string();
        self
    }

    pub fn key(&self) -> RouteKey {
        RouteKey::new(&self.group, &self.path)
    }

    /// 是否声明为某种类型
    pub fn is(&self, route_type: RouteType) -> bool {
        self.types.contains(&route_type)
    }
}

impl fmt::Display for RouteBean {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.key(), self.class_name)
    }
}
