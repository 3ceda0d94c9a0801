//! 集成测试：通过通道传输访问另一个"进程"的路由服务
//!
//! 服务方由 `RouteServiceHost` 托管，调用方只持有 `ChannelRouteService`，
//! 两边不共享注册表。

use component_router::{
    ActionProcessor, ActionResult, AppContext, Caches, ChannelRouteService, Interceptor, InterceptorCallback,
    InterruptReason, NavigationOutcome, Postman, RemoteInterceptorCallback, RemoteParam,
    RemoteRouteBean, RemoteRouteService, RouteBean, RouteService, RouteServiceHost, RouteType,
    Router, Transferable, REMOTE_ACTION_RESULT, REMOTE_ALL_APPLICATION_ID,
    REMOTE_INTERRUPT_REASON,
};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

struct Ledger;

impl ActionProcessor for Ledger {
    fn do_action(&self, action_name: &str) -> anyhow::Result<Option<ActionResult>> {
        match action_name {
            "total" => Ok(Some(ActionResult::transferable(99_i64))),
            "cursor" => Ok(Some(ActionResult::local(Instant::now()))),
            other => anyhow::bail!("unknown ledger action {}", other),
        }
    }
}

/// 延迟后报告，`interrupt` 决定放行还是拦截
struct Delayed {
    delay: Duration,
    interrupt: bool,
}

impl Interceptor for Delayed {
    fn matches(&self, postman: &Postman) -> bool {
        postman.group() == "ledger"
    }

    fn on_intercept(&self, _: &AppContext, postman: Arc<Postman>, callback: Arc<dyn InterceptorCallback>) {
        let (delay, interrupt) = (self.delay, self.interrupt);
        thread::spawn(move || {
            thread::sleep(delay);
            if interrupt {
                callback.on_interrupt(&postman, InterruptReason::new(451, "blocked").with_payload(7_i32));
            } else {
                callback.on_continue(&postman);
            }
        });
    }
}

#[derive(Default)]
struct Recorder {
    continues: AtomicUsize,
    interrupts: Mutex<Vec<InterruptReason>>,
}

impl RemoteInterceptorCallback for Recorder {
    fn on_continue(&self) {
        self.continues.fetch_add(1, Ordering::SeqCst);
    }

    fn on_interrupt(&self, reason: RemoteParam) {
        if let Some(reason) = reason.get_as::<InterruptReason>(REMOTE_INTERRUPT_REASON) {
            self.interrupts.lock().push(reason);
        }
    }
}

/// 记录行为被执行的次数
struct Counted(Arc<AtomicUsize>);

impl ActionProcessor for Counted {
    fn do_action(&self, _: &str) -> anyhow::Result<Option<ActionResult>> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(Some(ActionResult::transferable(1_i64)))
    }
}

/// 在回调线程上立即拦截
struct DenyNow;

impl Interceptor for DenyNow {
    fn matches(&self, postman: &Postman) -> bool {
        postman.group() == "ledger"
    }

    fn on_intercept(&self, _: &AppContext, postman: Arc<Postman>, callback: Arc<dyn InterceptorCallback>) {
        callback.on_interrupt(&postman, InterruptReason::new(401, "login required"));
    }
}

/// 查找和行为走正常连接，拦截请求走已经断开的连接
struct SplitService {
    live: ChannelRouteService,
    dead: ChannelRouteService,
}

impl RouteService for SplitService {
    fn register_application_id(&self, application_id: &str) {
        self.live.register_application_id(application_id);
    }

    fn all_application_ids(&self) -> RemoteParam {
        self.live.all_application_ids()
    }

    fn register_route_group(&self, group: &str, param: RemoteParam) {
        self.live.register_route_group(group, param);
    }

    fn find_route_bean(&self, group: &str, path: &str) -> Option<RemoteRouteBean> {
        self.live.find_route_bean(group, path)
    }

    fn do_action(&self, class_name: &str, action_name: &str) -> Option<RemoteParam> {
        self.live.do_action(class_name, action_name)
    }

    fn handle_interceptor(
        &self,
        timeout_millis: u64,
        remote: RemoteRouteBean,
        callback: Arc<dyn RemoteInterceptorCallback>,
    ) {
        self.dead.handle_interceptor(timeout_millis, remote, callback);
    }

    fn try_handle_interceptor(
        &self,
        timeout_millis: u64,
        remote: RemoteRouteBean,
        callback: Arc<dyn RemoteInterceptorCallback>,
    ) -> component_router::Result<()> {
        self.dead.try_handle_interceptor(timeout_millis, remote, callback)
    }
}

fn spawn_process(application_id: &str) -> (Arc<Caches>, RouteServiceHost) {
    spawn_process_with(application_id, 4)
}

fn spawn_process_with(application_id: &str, threads: usize) -> (Arc<Caches>, RouteServiceHost) {
    let caches = Arc::new(Caches::new());
    let service = RemoteRouteService::new(caches.clone(), AppContext::new(application_id));
    let host = RouteServiceHost::spawn(Arc::new(service), threads).expect("host should start");
    (caches, host)
}

/// 远程进程登记 ledger/summary，行为执行次数记在返回的计数器里
fn counted_ledger(caches: &Caches) -> Arc<AtomicUsize> {
    caches.register_routes(
        "ledger",
        vec![RouteBean::new("ledger", "summary")
            .with_type(RouteType::ActionProcessor)
            .with_class_name("ledger::Counted")],
    );
    let runs = Arc::new(AtomicUsize::new(0));
    let r = runs.clone();
    caches.register_action("ledger::Counted", move || Ok(Counted(r.clone())));
    runs
}

fn local_router() -> Router {
    Router::with_timeout(Arc::new(Caches::new()), AppContext::new("com.app.main"), Duration::from_secs(2))
}

fn profile_route() -> RouteBean {
    RouteBean::new("user", "profile")
        .with_type(RouteType::Activity)
        .with_module_id("user-module")
        .with_class_name("user::ProfilePage")
}

#[test]
fn user_profile_scenario_across_processes() {
    let (_caches, host) = spawn_process("com.app.main");
    let main_process = host.connect();
    let remote_process = host.connect();

    main_process.register_route_group(
        "user",
        RemoteParam::single("profile", profile_route().into_remote()),
    );

    let found = remote_process.find_route_bean("user", "profile").expect("registered route");
    assert_eq!(found.route_bean, profile_route());
    assert!(main_process.find_route_bean("user", "settings").is_none());

    main_process.register_application_id("com.app.a");
    remote_process.register_application_id("com.app.a");
    let ids = remote_process
        .all_application_ids()
        .get_as::<BTreeSet<String>>(REMOTE_ALL_APPLICATION_ID)
        .unwrap();
    assert_eq!(ids.iter().filter(|id| id.as_str() == "com.app.a").count(), 1);
}

#[test]
fn route_group_registration_replaces_across_processes() {
    let (_caches, host) = spawn_process("com.app.main");
    let client = host.connect();

    client.register_route_group("user", RemoteParam::single("p1", RouteBean::new("user", "p1").into_remote()));
    client.register_route_group("user", RemoteParam::single("p2", RouteBean::new("user", "p2").into_remote()));

    assert!(client.find_route_bean("user", "p1").is_none());
    assert!(client.find_route_bean("user", "p2").is_some());
}

#[test]
fn do_action_collapses_every_failure() {
    let (caches, host) = spawn_process("com.app.ledger");
    caches.register_action("ledger::Ledger", || Ok(Ledger));
    let client = host.connect();

    let total = client.do_action("ledger::Ledger", "total").unwrap();
    assert_eq!(total.get_as::<i64>(REMOTE_ACTION_RESULT), Some(99));
    assert!(client.do_action("ledger::Missing", "total").is_none());
    assert!(client.do_action("ledger::Ledger", "cursor").is_none());
    assert!(client.do_action("ledger::Ledger", "refund").is_none());
}

#[test]
fn handle_interceptor_streams_every_outcome() {
    let (caches, host) = spawn_process("com.app.ledger");
    caches.add_interceptor(Arc::new(Delayed {
        delay: Duration::from_millis(20),
        interrupt: false,
    }));
    caches.add_interceptor(Arc::new(Delayed {
        delay: Duration::from_millis(40),
        interrupt: true,
    }));
    let client = host.connect();

    let recorder = Arc::new(Recorder::default());
    client.handle_interceptor(
        10_000,
        RemoteRouteBean::from_route(&RouteBean::new("ledger", "entries")),
        recorder.clone(),
    );

    assert_eq!(recorder.continues.load(Ordering::SeqCst), 1);
    let interrupts = recorder.interrupts.lock();
    assert_eq!(interrupts.len(), 1);
    assert_eq!(interrupts[0].code, 451);
    assert_eq!(interrupts[0].payload_as::<i32>(), Some(7));
}

#[test]
fn late_outcomes_arrive_after_zero_timeout() {
    let (caches, host) = spawn_process("com.app.ledger");
    caches.add_interceptor(Arc::new(Delayed {
        delay: Duration::from_millis(100),
        interrupt: false,
    }));
    let client = host.connect();

    let recorder = Arc::new(Recorder::default());
    let started = Instant::now();
    client.handle_interceptor(
        0,
        RemoteRouteBean::from_route(&RouteBean::new("ledger", "entries")),
        recorder.clone(),
    );
    assert!(started.elapsed() < Duration::from_millis(100));
    assert_eq!(recorder.continues.load(Ordering::SeqCst), 0);

    thread::sleep(Duration::from_millis(500));
    assert_eq!(recorder.continues.load(Ordering::SeqCst), 1);
}

#[test]
fn router_navigates_into_remote_process() {
    let (remote_caches, host) = spawn_process("com.app.ledger");
    remote_caches.register_routes(
        "ledger",
        vec![RouteBean::new("ledger", "summary")
            .with_type(RouteType::ActionProcessor)
            .with_class_name("ledger::Ledger")],
    );
    remote_caches.register_action("ledger::Ledger", || Ok(Ledger));

    let local_caches = Arc::new(Caches::new());
    local_caches.register_routes("user", vec![profile_route()]);
    let router = Router::with_timeout(local_caches, AppContext::new("com.app.main"), Duration::from_secs(2));
    let client = Arc::new(host.connect());
    router.publish_to(client.as_ref());
    router.add_remote_service(client);

    // 本进程的路由表已登记到远程注册表
    assert!(remote_caches.find_route("user", "profile").is_some());

    let received = Arc::new(Mutex::new(None));
    let r = received.clone();
    let outcome = Postman::new("ledger", "summary")
        .with_route_action("total")
        .add_on_result_callback(move |result: Option<Arc<i64>>| *r.lock() = result.map(|v| *v))
        .navigation(&router);
    assert_eq!(outcome, NavigationOutcome::Completed);
    assert_eq!(*received.lock(), Some(99));

    remote_caches.add_interceptor(Arc::new(Delayed {
        delay: Duration::from_millis(10),
        interrupt: true,
    }));
    let outcome = Postman::new("ledger", "summary").with_route_action("total").navigation(&router);
    match outcome {
        NavigationOutcome::Interrupted(reason) => assert_eq!(reason.code, 451),
        other => panic!("unexpected outcome {:?}", other),
    }

    assert_eq!(
        Postman::new("ledger", "missing").navigation(&router),
        NavigationOutcome::NotFound
    );
}

#[test]
fn concurrent_interrupts_hold_on_single_thread_host() {
    let (remote_caches, host) = spawn_process_with("com.app.ledger", 1);
    let runs = counted_ledger(&remote_caches);
    remote_caches.add_interceptor(Arc::new(DenyNow));

    let router = Arc::new(local_router());
    router.add_remote_service(Arc::new(host.connect()));

    let handles: Vec<_> = (0..8)
        .map(|index| {
            let router = router.clone();
            thread::spawn(move || {
                let postman = Postman::new("ledger", "summary").with_route_action("total");
                // 非有限的小数也必须能送达拦截器
                let postman = if index % 2 == 0 {
                    postman.with_double("amount", f64::NAN)
                } else {
                    postman.with_double("amount", f64::INFINITY)
                };
                postman.navigation(&router)
            })
        })
        .collect();

    for handle in handles {
        match handle.join().unwrap() {
            NavigationOutcome::Interrupted(reason) => assert_eq!(reason.code, 401),
            other => panic!("unexpected outcome {:?}", other),
        }
    }
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[test]
fn concurrent_handle_interceptor_callers_share_single_thread_host() {
    let (caches, host) = spawn_process_with("com.app.ledger", 1);
    caches.add_interceptor(Arc::new(DenyNow));
    caches.add_interceptor(Arc::new(Delayed {
        delay: Duration::from_millis(20),
        interrupt: false,
    }));

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let client = host.connect();
            thread::spawn(move || {
                let recorder = Arc::new(Recorder::default());
                client
                    .try_handle_interceptor(
                        10_000,
                        RemoteRouteBean::from_route(&RouteBean::new("ledger", "entries")),
                        recorder.clone(),
                    )
                    .map(|_| recorder)
            })
        })
        .collect();

    for handle in handles {
        let recorder = handle.join().unwrap().expect("interception should complete");
        assert_eq!(recorder.continues.load(Ordering::SeqCst), 1);
        let interrupts = recorder.interrupts.lock();
        assert_eq!(interrupts.len(), 1);
        assert_eq!(interrupts[0].code, 401);
    }
}

#[test]
fn lost_interception_fails_navigation_closed() {
    let (remote_caches, host) = spawn_process("com.app.ledger");
    let runs = counted_ledger(&remote_caches);

    let (_, gone) = spawn_process("com.app.gone");
    let dead = gone.connect();
    gone.shutdown();

    let router = local_router();
    router.add_remote_service(Arc::new(SplitService {
        live: host.connect(),
        dead,
    }));

    let results = Arc::new(AtomicUsize::new(0));
    let r = results.clone();
    let outcome = Postman::new("ledger", "summary")
        .with_route_action("total")
        .add_on_result_callback(move |_: Option<Arc<i64>>| {
            r.fetch_add(1, Ordering::SeqCst);
        })
        .navigation(&router);

    assert!(matches!(outcome, NavigationOutcome::Failed(_)), "unexpected outcome {:?}", outcome);
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert_eq!(results.load(Ordering::SeqCst), 0);

    // 连接正常时同一个路由照常执行
    let direct = local_router();
    direct.add_remote_service(Arc::new(host.connect()));
    assert_eq!(
        Postman::new("ledger", "summary").with_route_action("total").navigation(&direct),
        NavigationOutcome::Completed
    );
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}
