//! 生命周期作用域
//!
//! 宿主平台的生命周期被抽象为一个 [`Lifecycle`] 作用域：观察者以弱引用登记，
//! 作用域进入 `Destroyed` 时每个仍然存活的观察者恰好收到一次 `on_destroy`。

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// 生命周期状态，`Destroyed` 为终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    Initialized,
    Created,
    Started,
    Resumed,
    Destroyed,
}

/// 生命周期观察者
pub trait LifecycleObserver: Send + Sync {
    /// 非终态的状态变更
    fn on_state_changed(&self, _state: LifecycleState) {}

    /// 作用域被销毁
    fn on_destroy(&self, lifecycle: &Lifecycle);
}

struct ObserverEntry {
    id: u64,
    observer: Weak<dyn LifecycleObserver>,
}

struct LifecycleInner {
    name: String,
    state: Mutex<LifecycleState>,
    observers: Mutex<Vec<ObserverEntry>>,
    next_id: AtomicU64,
}

impl LifecycleInner {
    fn remove(&self, id: u64) -> bool {
        let mut observers = self.observers.lock();
        let before = observers.len();
        observers.retain(|entry| entry.id != id);
        before != observers.len()
    }
}

/// 生命周期作用域（可克隆的句柄）
#[derive(Clone)]
pub struct Lifecycle {
    inner: Arc<LifecycleInner>,
}

impl Lifecycle {
    pub fn new(name: &str) -> Self {
        Self {
            inner: Arc::new(LifecycleInner {
                name: name.to_string(),
                state: Mutex::new(LifecycleState::Initialized),
                observers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn state(&self) -> LifecycleState {
        *self.inner.state.lock()
    }

    pub fn is_destroyed(&self) -> bool {
        self.state() == LifecycleState::Destroyed
    }

    /// 当前登记的观察者数量
    pub fn observer_count(&self) -> usize {
        self.inner.observers.lock().len()
    }

    /// 登记观察者。作用域已经销毁时立即回调 `on_destroy`，返回的订阅不生效。
    pub fn add_observer(&self, observer: &Arc<dyn LifecycleObserver>) -> LifecycleSubscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        {
            // 持有状态锁登记，避免与 destroy 交错导致漏通知
            let state = self.inner.state.lock();
            if *state != LifecycleState::Destroyed {
                let mut observers = self.inner.observers.lock();
                observers.retain(|entry| entry.observer.strong_count() > 0);
                observers.push(ObserverEntry {
                    id,
                    observer: Arc::downgrade(observer),
                });
                return LifecycleSubscription {
                    id,
                    lifecycle: Arc::downgrade(&self.inner),
                };
            }
        }
        observer.on_destroy(self);
        LifecycleSubscription {
            id,
            lifecycle: Weak::new(),
        }
    }

    /// 推进到新状态。进入 `Destroyed` 后不再变化。
    pub fn move_to(&self, next: LifecycleState) {
        let observers = {
            let mut state = self.inner.state.lock();
            if *state == LifecycleState::Destroyed || *state == next {
                return;
            }
            *state = next;
            let mut observers = self.inner.observers.lock();
            if next == LifecycleState::Destroyed {
                std::mem::take(&mut *observers)
                    .into_iter()
                    .filter_map(|entry| entry.observer.upgrade())
                    .collect::<Vec<_>>()
            } else {
                observers
                    .iter()
                    .filter_map(|entry| entry.observer.upgrade())
                    .collect::<Vec<_>>()
            }
        };

        debug!("Lifecycle '{}' moved to {:?}, {} observers", self.inner.name, next, observers.len());
        for observer in observers {
            if next == LifecycleState::Destroyed {
                observer.on_destroy(self);
            } else {
                observer.on_state_changed(next);
            }
        }
    }

    pub fn destroy(&self) {
        self.move_to(LifecycleState::Destroyed);
    }
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .field("observers", &self.observer_count())
            .finish()
    }
}

/// 一次观察登记，取消后不再收到通知
#[derive(Debug)]
pub struct LifecycleSubscription {
    id: u64,
    lifecycle: Weak<LifecycleInner>,
}

impl LifecycleSubscription {
    /// 取消观察，重复取消或作用域已释放时为空操作
    pub fn cancel(&self) {
        if let Some(inner) = self.lifecycle.upgrade() {
            inner.remove(self.id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle
            .upgrade()
            .map(|inner| inner.observers.lock().iter().any(|entry| entry.id == self.id))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingObserver {
        destroyed: AtomicUsize,
        changes: AtomicUsize,
    }

    impl LifecycleObserver for CountingObserver {
        fn on_state_changed(&self, _state: LifecycleState) {
            self.changes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_destroy(&self, _lifecycle: &Lifecycle) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_destroy_notifies_once() {
        let lifecycle = Lifecycle::new("main");
        let observer = Arc::new(CountingObserver::default());
        let erased: Arc<dyn LifecycleObserver> = observer.clone();
        let subscription = lifecycle.add_observer(&erased);
        assert!(subscription.is_active());

        lifecycle.move_to(LifecycleState::Resumed);
        lifecycle.destroy();
        lifecycle.destroy();

        assert_eq!(observer.changes.load(Ordering::SeqCst), 1);
        assert_eq!(observer.destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(lifecycle.observer_count(), 0);
        assert!(!subscription.is_active());
    }

    #[test]
    fn test_cancelled_subscription_is_not_notified() {
        let lifecycle = Lifecycle::new("detail");
        let observer = Arc::new(CountingObserver::default());
        let erased: Arc<dyn LifecycleObserver> = observer.clone();
        let subscription = lifecycle.add_observer(&erased);

        subscription.cancel();
        subscription.cancel();
        lifecycle.destroy();

        assert_eq!(observer.destroyed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_observe_destroyed_scope_fires_immediately() {
        let lifecycle = Lifecycle::new("gone");
        lifecycle.destroy();

        let observer = Arc::new(CountingObserver::default());
        let erased: Arc<dyn LifecycleObserver> = observer.clone();
        let subscription = lifecycle.add_observer(&erased);

        assert_eq!(observer.destroyed.load(Ordering::SeqCst), 1);
        assert!(!subscription.is_active());
    }

    #[test]
    fn test_dropped_observer_is_skipped() {
        let lifecycle = Lifecycle::new("leak");
        {
            let erased: Arc<dyn LifecycleObserver> = Arc::new(CountingObserver::default());
            let _subscription = lifecycle.add_observer(&erased);
        }
        lifecycle.destroy();
        assert!(lifecycle.is_destroyed());
    }

    #[test]
    fn test_dead_observers_are_pruned_on_add() {
        let lifecycle = Lifecycle::new("long_lived");
        for _ in 0..8 {
            let erased: Arc<dyn LifecycleObserver> = Arc::new(CountingObserver::default());
            let _subscription = lifecycle.add_observer(&erased);
        }
        assert_eq!(lifecycle.observer_count(), 1);

        let kept: Arc<dyn LifecycleObserver> = Arc::new(CountingObserver::default());
        let _subscription = lifecycle.add_observer(&kept);
        assert_eq!(lifecycle.observer_count(), 1);
    }
}
