//! 跨进程传输的帧格式
//!
//! 每次调用是一个 [`WireRequest`] 帧，回应是一个或多个 [`WireReply`] 帧。
//! `handle_interceptor` 先流式返回 `Continue`/`Interrupt`，最后以 `Done` 结束等待，
//! `Done` 之后仍可能有晚到的结果帧。

use crate::types::{RemoteParam, RemoteRouteBean};
use crate::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// 请求帧
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WireRequest {
    RegisterApplicationId { application_id: String },
    AllApplicationIds,
    RegisterRouteGroup { group: String, param: RemoteParam },
    FindRouteBean { group: String, path: String },
    DoAction { class_name: String, action_name: String },
    HandleInterceptor { timeout_millis: u64, remote: RemoteRouteBean },
}

impl WireRequest {
    /// 用于日志的操作名
    pub fn op(&self) -> &'static str {
        match self {
            Self::RegisterApplicationId { .. } => "registerApplicationId",
            Self::AllApplicationIds => "getAllApplicationId",
            Self::RegisterRouteGroup { .. } => "registerRouteGroup",
            Self::FindRouteBean { .. } => "findRouteBean",
            Self::DoAction { .. } => "doAction",
            Self::HandleInterceptor { .. } => "handleInterceptor",
        }
    }
}

/// 回应帧
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum WireReply {
    Ack,
    Param { param: Option<RemoteParam> },
    Route { route: Option<RemoteRouteBean> },
    Continue,
    Interrupt { reason: RemoteParam },
    Done,
}

pub fn encode<T: Serialize>(frame: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(frame)?)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}
