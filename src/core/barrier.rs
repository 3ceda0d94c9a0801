//! 倒计数屏障
//!
//! 等待 N 个独立完成事件，或者等到截止时间。计数到零之后的递减是空操作。

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// 倒计数屏障
#[derive(Debug)]
pub struct CountDownLatch {
    count: Mutex<usize>,
    zero: Condvar,
}

impl CountDownLatch {
    pub fn new(count: usize) -> Self {
        Self {
            count: Mutex::new(count),
            zero: Condvar::new(),
        }
    }

    /// 计数减一，返回本次调用是否使计数归零
    pub fn count_down(&self) -> bool {
        let mut count = self.count.lock();
        if *count == 0 {
            return false;
        }
        *count -= 1;
        if *count == 0 {
            self.zero.notify_all();
            true
        } else {
            false
        }
    }

    /// 当前剩余计数
    pub fn count(&self) -> usize {
        *self.count.lock()
    }

    /// 阻塞等待计数归零，最多等待 `timeout`。返回是否已归零。
    pub fn await_timeout(&self, timeout: Duration) -> bool {
        let mut count = self.count.lock();
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            while *count > 0 {
                self.zero.wait(&mut count);
            }
            return true;
        };
        while *count > 0 {
            if self.zero.wait_until(&mut count, deadline).timed_out() {
                return *count == 0;
            }
        }
        true
    }
}
