use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide scene generation counter.
///
/// Work captured at epoch `n` is void once [`current`](Self::current)
/// moves past `n`. Cloning shares the counter.
#[derive(Debug, Clone, Default)]
pub struct SceneEpoch(Arc<AtomicU64>);

impl SceneEpoch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    /// Start a new generation and return it.
    pub fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Whether work captured at `epoch` is still current.
    pub fn is_current(&self, epoch: u64) -> bool {
        self.current() == epoch
    }
}

#[cfg(test)]
mod tests {
    use super::SceneEpoch;

    #[test]
    fn advance_invalidates_captured_epoch() {
        let epoch = SceneEpoch::new();
        let captured = epoch.current();
        let shared = epoch.clone();

        assert_eq!(shared.advance(), captured + 1);
        assert!(!epoch.is_current(captured));
        assert!(epoch.is_current(captured + 1));
    }
}
