//! 拦截器与拦截链
//!
//! 匹配的拦截器在专用的拦截器线程池上各自独立执行，调用线程在倒计数屏障上等待，
//! 直到全部拦截器报告结果或超时。等待屏障的线程永远不属于执行拦截器的线程池。
//! 超时不会取消仍在执行的拦截器，它们晚到的结果照常转发，只是不再有人等待。

use super::caches::Caches;
use super::callback::InterceptorCallback;
use super::context::AppContext;
use super::postman::Postman;
use crate::core::CountDownLatch;
use crate::types::InterruptReason;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

static INTERCEPTOR_POOL: OnceCell<rayon::ThreadPool> = OnceCell::new();

fn interceptor_pool() -> Option<&'static rayon::ThreadPool> {
    INTERCEPTOR_POOL
        .get_or_try_init(|| {
            rayon::ThreadPoolBuilder::new()
                .num_threads(num_cpus::get().max(2))
                .thread_name(|index| format!("route-interceptor-{}", index))
                .build()
        })
        .map_err(|e| warn!("Interceptor pool unavailable: {}", e))
        .ok()
}

/// 在拦截器线程池上执行，调用方本身是该池的线程时改用独立线程
fn dispatch<F>(job: F)
where
    F: FnOnce() + Send + 'static,
{
    match interceptor_pool() {
        Some(pool) if pool.current_thread_index().is_none() => pool.spawn(job),
        _ => {
            let spawned = thread::Builder::new()
                .name("route-interceptor-nested".to_string())
                .spawn(job);
            if let Err(e) = spawned {
                warn!("Cannot dispatch interceptor: {}", e);
            }
        }
    }
}

/// 拦截器
pub trait Interceptor: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// 是否拦截这个请求
    fn matches(&self, postman: &Postman) -> bool;

    /// 处理请求，完成后必须调用 `callback` 的 `on_continue` 或 `on_interrupt`，
    /// 可以在任意线程上调用
    fn on_intercept(&self, context: &AppContext, postman: Arc<Postman>, callback: Arc<dyn InterceptorCallback>);
}

/// 一次拦截链执行在返回时刻的结果划分
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainOutcome {
    /// 匹配的拦截器数量
    pub matched: usize,
    /// 已放行的数量
    pub continued: usize,
    /// 已拦截的原因
    pub interrupted: Vec<InterruptReason>,
    /// 返回时仍未报告的数量
    pub pending: usize,
}

impl ChainOutcome {
    /// 全部匹配的拦截器都已放行
    pub fn is_clear(&self) -> bool {
        self.interrupted.is_empty() && self.pending == 0
    }

    pub fn is_interrupted(&self) -> bool {
        !self.interrupted.is_empty()
    }

    pub fn timed_out(&self) -> bool {
        self.pending > 0
    }
}

#[derive(Default)]
struct Tally {
    continued: AtomicUsize,
    interrupted: Mutex<Vec<InterruptReason>>,
}

/// 每个拦截器独享的回调：转发每次结果，但只在第一次报告时递减屏障
struct LatchedCallback {
    forward: Arc<dyn InterceptorCallback>,
    latch: Arc<CountDownLatch>,
    tally: Arc<Tally>,
    reported: AtomicBool,
}

impl InterceptorCallback for LatchedCallback {
    fn on_continue(&self, postman: &Postman) {
        self.forward.on_continue(postman);
        if !self.reported.swap(true, Ordering::AcqRel) {
            self.tally.continued.fetch_add(1, Ordering::AcqRel);
            self.latch.count_down();
        }
    }

    fn on_interrupt(&self, postman: &Postman, reason: InterruptReason) {
        let first = !self.reported.swap(true, Ordering::AcqRel);
        if first {
            self.tally.interrupted.lock().push(reason.clone());
        }
        self.forward.on_interrupt(postman, reason);
        if first {
            self.latch.count_down();
        }
    }
}

/// 把匹配的拦截器分发到线程池并在屏障上等待，最多等待 `timeout`
pub(crate) fn fan_out(
    context: &AppContext,
    interceptors: Vec<Arc<dyn Interceptor>>,
    postman: Arc<Postman>,
    timeout: Duration,
    forward: Arc<dyn InterceptorCallback>,
) -> ChainOutcome {
    let matched = interceptors.len();
    if matched == 0 {
        return ChainOutcome::default();
    }

    let latch = Arc::new(CountDownLatch::new(matched));
    let tally = Arc::new(Tally::default());
    for interceptor in interceptors {
        let callback: Arc<dyn InterceptorCallback> = Arc::new(LatchedCallback {
            forward: forward.clone(),
            latch: latch.clone(),
            tally: tally.clone(),
            reported: AtomicBool::new(false),
        });
        let context = context.clone();
        let postman = postman.clone();
        dispatch(move || {
            let result = catch_unwind(AssertUnwindSafe(|| {
                interceptor.on_intercept(&context, postman, callback)
            }));
            if result.is_err() {
                warn!("Interceptor {} panicked", interceptor.name());
            }
        });
    }

    if !latch.await_timeout(timeout) {
        debug!(
            "Interceptors for {} timed out after {:?}, {} pending",
            postman.key(),
            timeout,
            latch.count()
        );
    }

    let continued = tally.continued.load(Ordering::Acquire);
    let interrupted = tally.interrupted.lock().clone();
    ChainOutcome {
        matched,
        continued,
        pending: matched.saturating_sub(continued + interrupted.len()),
        interrupted,
    }
}

/// 把拦截器结果转给请求自己的继续/拦截回调
struct PostmanBridge;

impl InterceptorCallback for PostmanBridge {
    fn on_continue(&self, postman: &Postman) {
        postman.notify_continue();
    }

    fn on_interrupt(&self, postman: &Postman, reason: InterruptReason) {
        postman.notify_interrupt(&reason);
    }
}

/// 本进程的拦截链执行器
pub struct InterceptorChain {
    caches: Arc<Caches>,
    context: AppContext,
}

impl InterceptorChain {
    pub fn new(caches: Arc<Caches>, context: AppContext) -> Self {
        Self { caches, context }
    }

    /// 执行所有匹配的拦截器，结果同时转给请求的继续/拦截回调
    pub fn execute(&self, postman: &Arc<Postman>, timeout: Duration) -> ChainOutcome {
        let matched = self.caches.matching_interceptors(postman);
        fan_out(&self.context, matched, postman.clone(), timeout, Arc::new(PostmanBridge))
    }
}
