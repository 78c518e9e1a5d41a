use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 协作式取消标记
///
/// 取消只在流水线的阶段边界被检查，不会抢占正在进行的数值计算。
/// Job Store为每个任务持有一个标记，`cancel()` 置位后由Worker在
/// 下一个检查点观察到并提前退出。
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    inner: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_starts_clear() {
        let flag = CancellationFlag::new();
        assert!(!flag.is_cancelled());
    }

    #[test]
    fn test_cancel_is_visible_to_clones() {
        let flag = CancellationFlag::new();
        let observer = flag.clone();
        flag.cancel();
        assert!(observer.is_cancelled());
    }
}
