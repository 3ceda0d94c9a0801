//! 可传输的值与路由负载
//!
//! 跨进程边界的所有值都必须能表达为 [`RemoteValue`]。
//! 不能表达的值（例如只存在于本进程的对象）在边界上被视为缺失。

use super::remote::{RemoteParam, RemoteRouteBean};
use super::route::RouteBean;
use crate::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// 按引用传递的句柄（由宿主平台解释）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BinderHandle(pub u64);

/// 可跨进程传输的值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RemoteValue {
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(#[serde(with = "lossless_f64")] f64),
    String(String),
    Bytes(Vec<u8>),
    StringSet(BTreeSet<String>),
    Binder(BinderHandle),
    /// 路由描述或请求快照
    Route(Box<RemoteRouteBean>),
    Params(RemoteParam),
    /// 按值序列化的对象，`type_name` 用于接收端校验类型
    Serialized {
        type_name: String,
        data: serde_json::Value,
    },
}

/// JSON 没有 NaN 和无穷大，这三个值以字符串表示
mod lossless_f64 {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    const NAN: &str = "NaN";
    const INFINITY: &str = "inf";
    const NEG_INFINITY: &str = "-inf";

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else if value.is_nan() {
            serializer.serialize_str(NAN)
        } else if value.is_sign_positive() {
            serializer.serialize_str(INFINITY)
        } else {
            serializer.serialize_str(NEG_INFINITY)
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(value) => Ok(value),
            Repr::Text(text) => match text.as_str() {
                NAN => Ok(f64::NAN),
                INFINITY => Ok(f64::INFINITY),
                NEG_INFINITY => Ok(f64::NEG_INFINITY),
                other => Err(D::Error::custom(format!("invalid double {:?}", other))),
            },
        }
    }
}

impl RemoteValue {
    /// 按值序列化任意 serde 类型
    pub fn serialize<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Self::Serialized {
            type_name: std::any::type_name::<T>().to_string(),
            data: serde_json::to_value(value)?,
        })
    }

    /// 还原按值序列化的对象，类型不一致时返回 `None`
    pub fn deserialize<T: DeserializeOwned>(&self) -> Option<T> {
        match self {
            Self::Serialized { type_name, data } if type_name == std::any::type_name::<T>() => {
                serde_json::from_value(data.clone()).ok()
            }
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// 转为类型擦除的本地值，用于结果回调的运行时类型过滤。
    ///
    /// 基础类型还原为对应的 Rust 类型；序列化对象保持为 `RemoteValue`，
    /// 由动态类型的接收方自行解释。`Null` 对应 `None`。
    pub fn into_any(self) -> Option<Arc<dyn Any + Send + Sync>> {
        let value: Arc<dyn Any + Send + Sync> = match self {
            Self::Null => return None,
            Self::Bool(v) => Arc::new(v),
            Self::Int(v) => Arc::new(v),
            Self::Long(v) => Arc::new(v),
            Self::Double(v) => Arc::new(v),
            Self::String(v) => Arc::new(v),
            Self::Bytes(v) => Arc::new(v),
            Self::StringSet(v) => Arc::new(v),
            Self::Binder(v) => Arc::new(v),
            Self::Route(v) => Arc::new(*v),
            Self::Params(v) => Arc::new(v),
            serialized @ Self::Serialized { .. } => Arc::new(serialized),
        };
        Some(value)
    }
}

/// 能与 [`RemoteValue`] 互相转换的类型
pub trait Transferable: Sized + Send + Sync + 'static {
    fn into_remote(self) -> RemoteValue;

    fn from_remote(value: &RemoteValue) -> Option<Self>;
}

macro_rules! transferable {
    ($ty:ty, $variant:ident) => {
        impl Transferable for $ty {
            fn into_remote(self) -> RemoteValue {
                RemoteValue::$variant(self)
            }

            fn from_remote(value: &RemoteValue) -> Option<Self> {
                match value {
                    RemoteValue::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }
        }
    };
}

transferable!(bool, Bool);
transferable!(i32, Int);
transferable!(i64, Long);
transferable!(f64, Double);
transferable!(String, String);
transferable!(Vec<u8>, Bytes);
transferable!(BTreeSet<String>, StringSet);
transferable!(BinderHandle, Binder);
transferable!(RemoteParam, Params);

impl Transferable for RemoteRouteBean {
    fn into_remote(self) -> RemoteValue {
        RemoteValue::Route(Box::new(self))
    }

    fn from_remote(value: &RemoteValue) -> Option<Self> {
        match value {
            RemoteValue::Route(v) => Some(v.as_ref().clone()),
            _ => None,
        }
    }
}

impl Transferable for RouteBean {
    fn into_remote(self) -> RemoteValue {
        RemoteRouteBean::from_route(&self).into_remote()
    }

    fn from_remote(value: &RemoteValue) -> Option<Self> {
        RemoteRouteBean::from_remote(value).map(|remote| remote.route_bean)
    }
}

impl Transferable for RemoteValue {
    fn into_remote(self) -> RemoteValue {
        self
    }

    fn from_remote(value: &RemoteValue) -> Option<Self> {
        Some(value.clone())
    }
}

/// 路由所携带的数据
///
/// 键为空字符串时写入被忽略。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    entries: BTreeMap<String, RemoteValue>,
}

impl Bundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入一个值，替换同名键的旧值
    pub fn put(&mut self, key: &str, value: RemoteValue) {
        if key.is_empty() {
            return;
        }
        self.entries.insert(key.to_string(), value);
    }

    /// 合并另一个负载的全部键值
    pub fn put_all(&mut self, other: &Bundle) {
        for (key, value) in &other.entries {
            self.entries.insert(key.clone(), value.clone());
        }
    }

    pub fn get(&self, key: &str) -> Option<&RemoteValue> {
        self.entries.get(key)
    }

    pub fn get_as<T: Transferable>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(T::from_remote)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RemoteValue)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
