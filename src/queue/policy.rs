//! When a per-index update buffer is flushed.

use std::fmt::Debug;

pub trait FlushPolicy: Send + Sync + Debug {
    /// Decide after a command was buffered; `buffered` includes that command.
    fn should_flush(&self, buffered: usize, from_calling_thread: bool) -> bool;
}

/// Flush when the buffer reaches a size threshold, or immediately for
/// commands submitted in immediate mode.
#[derive(Debug, Clone, Copy)]
pub struct SizeThresholdPolicy {
    threshold: usize,
}

impl SizeThresholdPolicy {
    pub fn new(threshold: usize) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }
}

impl FlushPolicy for SizeThresholdPolicy {
    fn should_flush(&self, buffered: usize, from_calling_thread: bool) -> bool {
        // `>=` also catches a buffer that overshot through a concurrent push.
        from_calling_thread || self.threshold < 2 || buffered >= self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_threshold() {
        let policy = SizeThresholdPolicy::new(3);
        assert!(!policy.should_flush(1, false));
        assert!(policy.should_flush(1, true));
        assert!(policy.should_flush(3, false));
        assert!(policy.should_flush(5, false));
        assert!(SizeThresholdPolicy::new(1).should_flush(1, false));
    }
}
