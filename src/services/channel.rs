//! 基于通道的跨进程路由服务
//!
//! [`RouteServiceHost`] 在服务方进程里接收请求帧，交给专用线程池执行；
//! [`ChannelRouteService`] 在调用方进程里把 [`RouteService`] 调用编码成请求帧。
//! 帧都是 JSON 字节，通道断开等价于对端进程退出。

use super::route_service::RouteService;
use super::wire::{decode, encode, WireReply, WireRequest};
use crate::route::RemoteInterceptorCallback;
use crate::types::{RemoteParam, RemoteRouteBean};
use crate::{Result, RouteError};
use crossbeam::channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 一次调用的请求帧和它的回应通道
struct Envelope {
    call_id: Uuid,
    frame: Vec<u8>,
    reply: Sender<Vec<u8>>,
}

fn send_reply(call_id: Uuid, reply: &Sender<Vec<u8>>, frame: &WireReply) {
    let bytes = match encode(frame) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Failed to encode reply for call {}: {}", call_id, e);
            return;
        }
    };
    if reply.send(bytes).is_err() {
        debug!("Caller of {} is gone, reply dropped", call_id);
    }
}

/// 把拦截结果写回调用方，晚到的结果也照常写回
struct ReplyCallback {
    call_id: Uuid,
    reply: Sender<Vec<u8>>,
}

impl RemoteInterceptorCallback for ReplyCallback {
    fn on_continue(&self) {
        send_reply(self.call_id, &self.reply, &WireReply::Continue);
    }

    fn on_interrupt(&self, reason: RemoteParam) {
        send_reply(self.call_id, &self.reply, &WireReply::Interrupt { reason });
    }
}

fn serve(service: &dyn RouteService, envelope: Envelope) {
    let Envelope { call_id, frame, reply } = envelope;
    let request: WireRequest = match decode(&frame) {
        Ok(request) => request,
        Err(e) => {
            warn!("Malformed request frame {}: {}", call_id, e);
            return;
        }
    };
    debug!("Serving {} ({})", request.op(), call_id);

    let frame = match request {
        WireRequest::RegisterApplicationId { application_id } => {
            service.register_application_id(&application_id);
            WireReply::Ack
        }
        WireRequest::AllApplicationIds => WireReply::Param {
            param: Some(service.all_application_ids()),
        },
        WireRequest::RegisterRouteGroup { group, param } => {
            service.register_route_group(&group, param);
            WireReply::Ack
        }
        WireRequest::FindRouteBean { group, path } => WireReply::Route {
            route: service.find_route_bean(&group, &path),
        },
        WireRequest::DoAction { class_name, action_name } => WireReply::Param {
            param: service.do_action(&class_name, &action_name),
        },
        WireRequest::HandleInterceptor { timeout_millis, remote } => {
            let callback = Arc::new(ReplyCallback {
                call_id,
                reply: reply.clone(),
            });
            service.handle_interceptor(timeout_millis, remote, callback);
            WireReply::Done
        }
    };
    send_reply(call_id, &reply, &frame);
}

/// 服务方：在专用线程池上执行收到的请求
pub struct RouteServiceHost {
    sender: Sender<Envelope>,
    stopped: Arc<AtomicBool>,
}

impl RouteServiceHost {
    /// 启动服务循环，`threads` 为执行请求的线程数
    pub fn spawn(service: Arc<dyn RouteService>, threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|index| format!("route-service-{}", index))
            .build()
            .map_err(RouteError::transport)?;
        let (sender, receiver) = unbounded::<Envelope>();
        let stopped = Arc::new(AtomicBool::new(false));

        let stop_flag = stopped.clone();
        thread::Builder::new()
            .name("route-service-host".to_string())
            .spawn(move || {
                for envelope in receiver.iter() {
                    if stop_flag.load(Ordering::Acquire) {
                        break;
                    }
                    let service = service.clone();
                    pool.spawn(move || serve(service.as_ref(), envelope));
                }
                info!("Route service host stopped");
            })?;

        info!("Route service host started with {} threads", threads.max(1));
        Ok(Self { sender, stopped })
    }

    /// 停止接收请求，等价于服务方进程退出。
    ///
    /// 之后的请求得不到回应，已在执行的请求照常完成。
    pub fn shutdown(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    /// 为调用方建立一个连接
    pub fn connect(&self) -> ChannelRouteService {
        ChannelRouteService {
            sender: self.sender.clone(),
        }
    }
}

/// 调用方：通过通道访问另一个进程的路由服务。
///
/// 传输失败时按边界约定处理：查询返回 `None`，注册类调用静默失败，只记录日志。
#[derive(Clone)]
pub struct ChannelRouteService {
    sender: Sender<Envelope>,
}

impl ChannelRouteService {
    fn call(&self, request: &WireRequest) -> Result<(Uuid, Receiver<Vec<u8>>)> {
        let call_id = Uuid::new_v4();
        let frame = encode(request)?;
        let (reply, replies) = unbounded();
        self.sender
            .send(Envelope { call_id, frame, reply })
            .map_err(|_| RouteError::transport("route service host is gone"))?;
        Ok((call_id, replies))
    }

    /// 发送请求并等待唯一的回应帧
    fn request(&self, request: &WireRequest) -> Result<WireReply> {
        let (call_id, replies) = self.call(request)?;
        let bytes = replies
            .recv()
            .map_err(|_| RouteError::transport(format!("no reply for {} ({})", request.op(), call_id)))?;
        decode(&bytes)
    }

    fn request_logged(&self, request: &WireRequest) -> Option<WireReply> {
        match self.request(request) {
            Ok(reply) => Some(reply),
            Err(e) => {
                warn!("Remote {} failed: {}", request.op(), e);
                None
            }
        }
    }
}

/// 把一个回应帧交给拦截回调，返回是否为结束帧。无法识别的帧可能是丢失的拦截结果，视为错误。
fn dispatch_event(bytes: &[u8], callback: &dyn RemoteInterceptorCallback) -> Result<bool> {
    match decode::<WireReply>(bytes)? {
        WireReply::Continue => callback.on_continue(),
        WireReply::Interrupt { reason } => callback.on_interrupt(reason),
        WireReply::Done => return Ok(true),
        other => return Err(RouteError::transport(format!("unexpected interceptor reply {:?}", other))),
    }
    Ok(false)
}

impl RouteService for ChannelRouteService {
    fn register_application_id(&self, application_id: &str) {
        self.request_logged(&WireRequest::RegisterApplicationId {
            application_id: application_id.to_string(),
        });
    }

    fn all_application_ids(&self) -> RemoteParam {
        match self.request_logged(&WireRequest::AllApplicationIds) {
            Some(WireReply::Param { param: Some(param) }) => param,
            _ => RemoteParam::new(),
        }
    }

    fn register_route_group(&self, group: &str, param: RemoteParam) {
        self.request_logged(&WireRequest::RegisterRouteGroup {
            group: group.to_string(),
            param,
        });
    }

    fn find_route_bean(&self, group: &str, path: &str) -> Option<RemoteRouteBean> {
        match self.request_logged(&WireRequest::FindRouteBean {
            group: group.to_string(),
            path: path.to_string(),
        })? {
            WireReply::Route { route } => route,
            other => {
                warn!("Unexpected reply to findRouteBean: {:?}", other);
                None
            }
        }
    }

    fn do_action(&self, class_name: &str, action_name: &str) -> Option<RemoteParam> {
        match self.request_logged(&WireRequest::DoAction {
            class_name: class_name.to_string(),
            action_name: action_name.to_string(),
        })? {
            WireReply::Param { param } => param,
            other => {
                warn!("Unexpected reply to doAction: {:?}", other);
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
        if let Err(e) = self.try_handle_interceptor(timeout_millis, remote, callback) {
            warn!("Remote handleInterceptor failed: {}", e);
        }
    }

    fn try_handle_interceptor(
        &self,
        timeout_millis: u64,
        remote: RemoteRouteBean,
        callback: Arc<dyn RemoteInterceptorCallback>,
    ) -> Result<()> {
        let request = WireRequest::HandleInterceptor { timeout_millis, remote };
        let (call_id, replies) = self.call(&request)?;

        loop {
            let bytes = replies.recv().map_err(|_| {
                RouteError::transport(format!("handleInterceptor {} disconnected before completion", call_id))
            })?;
            if dispatch_event(&bytes, callback.as_ref())? {
                break;
            }
        }

        // 超时后仍在执行的远程拦截器会继续写回结果
        let spawned = thread::Builder::new()
            .name(format!("route-late-{}", call_id))
            .spawn(move || {
                for bytes in replies.iter() {
                    if let Err(e) = dispatch_event(&bytes, callback.as_ref()) {
                        warn!("Dropped late interceptor reply for {}: {}", call_id, e);
                    }
                }
            });
        if let Err(e) = spawned {
            warn!("Cannot follow late interceptor outcomes for {}: {}", call_id, e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::{AppContext, Caches, Interceptor, InterceptorCallback, Postman};
    use crate::services::route_service::RemoteRouteService;
    use crate::types::{
        InterruptReason, RemoteValue, RouteBean, Transferable, REMOTE_ALL_APPLICATION_ID,
    };
    use parking_lot::Mutex;
    use std::time::{Duration, Instant};

    fn host_with_threads(threads: usize) -> (Arc<Caches>, RouteServiceHost) {
        let caches = Arc::new(Caches::new());
        let service = Arc::new(RemoteRouteService::new(caches.clone(), AppContext::new("com.app.host")));
        (caches, RouteServiceHost::spawn(service, threads).unwrap())
    }

    fn host() -> (Arc<Caches>, RouteServiceHost) {
        host_with_threads(2)
    }

    /// 在调用线程上立即拦截
    struct DenyNow;

    impl Interceptor for DenyNow {
        fn matches(&self, _: &Postman) -> bool {
            true
        }

        fn on_intercept(&self, _: &AppContext, postman: Arc<Postman>, callback: Arc<dyn InterceptorCallback>) {
            callback.on_interrupt(&postman, InterruptReason::new(401, "login required"));
        }
    }

    /// 同步阻塞一段时间后放行
    struct SlowPass(Duration);

    impl Interceptor for SlowPass {
        fn matches(&self, _: &Postman) -> bool {
            true
        }

        fn on_intercept(&self, _: &AppContext, postman: Arc<Postman>, callback: Arc<dyn InterceptorCallback>) {
            thread::sleep(self.0);
            callback.on_continue(&postman);
        }
    }

    fn wallet() -> RemoteRouteBean {
        RemoteRouteBean::from_route(&RouteBean::new("pay", "wallet"))
    }

    #[derive(Default)]
    struct Events(Mutex<Vec<String>>);

    impl RemoteInterceptorCallback for Events {
        fn on_continue(&self) {
            self.0.lock().push("continue".to_string());
        }

        fn on_interrupt(&self, _reason: RemoteParam) {
            self.0.lock().push("interrupt".to_string());
        }
    }

    #[test]
    fn test_registry_calls_cross_the_channel() {
        let (caches, host) = host();
        let client = host.connect();

        client.register_application_id("com.app.remote");
        client.register_route_group(
            "user",
            RemoteParam::single("profile", RouteBean::new("user", "profile").into_remote()),
        );

        assert!(caches.application_ids().contains("com.app.remote"));
        let ids = client.all_application_ids();
        assert!(matches!(ids.get(REMOTE_ALL_APPLICATION_ID), Some(RemoteValue::StringSet(_))));
        assert_eq!(
            client.find_route_bean("user", "profile").map(|r| r.route_bean.path),
            Some("profile".to_string())
        );
        assert!(client.find_route_bean("user", "missing").is_none());
        assert!(client.do_action("app::Missing", "run").is_none());
    }

    #[test]
    fn test_handle_interceptor_without_interceptors_completes() {
        let (_caches, host) = host();
        let client = host.connect();
        let events = Arc::new(Events::default());
        client.handle_interceptor(
            1_000,
            RemoteRouteBean::from_route(&RouteBean::new("user", "profile")),
            events.clone(),
        );
        thread::sleep(Duration::from_millis(50));
        assert!(events.0.lock().is_empty());
    }

    #[test]
    fn test_dead_host_degrades_to_absent() {
        let (sender, receiver) = unbounded::<Envelope>();
        drop(receiver);
        let client = ChannelRouteService { sender };

        assert!(client.find_route_bean("user", "profile").is_none());
        assert!(client.do_action("app::A", "run").is_none());
        assert!(client.all_application_ids().is_empty());
        client.register_application_id("com.app.any");
    }

    #[test]
    fn test_malformed_request_drops_reply_channel() {
        let (_caches, host) = host();
        let (reply, replies) = unbounded();
        host.sender
            .send(Envelope {
                call_id: Uuid::new_v4(),
                frame: b"garbage".to_vec(),
                reply,
            })
            .unwrap();
        assert!(replies.recv_timeout(Duration::from_secs(5)).is_err());
    }

    #[test]
    fn test_single_thread_host_reports_interrupt_before_done() {
        let (caches, host) = host_with_threads(1);
        caches.add_interceptor(Arc::new(DenyNow));
        let client = host.connect();

        let events = Arc::new(Events::default());
        let started = Instant::now();
        client.try_handle_interceptor(5_000, wallet(), events.clone()).unwrap();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(*events.0.lock(), vec!["interrupt".to_string()]);
    }

    #[test]
    fn test_concurrent_interceptor_calls_share_single_thread_host() {
        let (caches, host) = host_with_threads(1);
        caches.add_interceptor(Arc::new(SlowPass(Duration::from_millis(20))));

        let callers: Vec<_> = (0..8)
            .map(|_| {
                let client = host.connect();
                thread::spawn(move || {
                    let events = Arc::new(Events::default());
                    client.try_handle_interceptor(10_000, wallet(), events.clone()).unwrap();
                    let seen = events.0.lock().clone();
                    seen
                })
            })
            .collect();

        for caller in callers {
            assert_eq!(caller.join().unwrap(), vec!["continue".to_string()]);
        }
    }

    #[test]
    fn test_lost_completion_is_an_error() {
        let (sender, receiver) = unbounded::<Envelope>();
        drop(receiver);
        let dead = ChannelRouteService { sender };
        assert!(dead
            .try_handle_interceptor(1_000, wallet(), Arc::new(Events::default()))
            .is_err());

        let (caches, host) = host();
        caches.add_interceptor(Arc::new(DenyNow));
        let client = host.connect();
        host.shutdown();
        let events = Arc::new(Events::default());
        assert!(client.try_handle_interceptor(1_000, wallet(), events.clone()).is_err());
        assert!(events.0.lock().is_empty());
    }

    #[test]
    fn test_unexpected_frame_during_interception_is_an_error() {
        let events = Events::default();
        let ack = encode(&WireReply::Ack).unwrap();
        assert!(dispatch_event(&ack, &events).is_err());
        assert!(dispatch_event(b"not json", &events).is_err());
        assert!(dispatch_event(&encode(&WireReply::Done).unwrap(), &events).unwrap());
    }
}
