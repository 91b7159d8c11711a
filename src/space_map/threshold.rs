//! Low free-space notification.

use std::fmt;

/// Callback invoked with the current free count when it crosses a threshold.
pub type ThresholdCallback = Box<dyn FnMut(u64) + Send>;

/// Fires a callback once when the free count drops to or below a level.
///
/// After firing, the threshold stays quiet until the free count rises back
/// above the level; the next drop fires it again.
pub struct Threshold {
    level: Option<u64>,
    callback: Option<ThresholdCallback>,
    /// Last free count seen, if any.
    current: Option<u64>,
}

impl Threshold {
    /// A threshold with nothing registered.
    pub fn new() -> Self {
        Self {
            level: None,
            callback: None,
            current: None,
        }
    }

    /// Register (or replace) the level and callback.
    pub fn set(&mut self, level: u64, callback: ThresholdCallback) {
        self.level = Some(level);
        self.callback = Some(callback);
        self.current = None;
    }

    fn below(&self, value: u64) -> bool {
        matches!(self.level, Some(level) if value <= level)
    }

    fn already_triggered(&self) -> bool {
        matches!(self.current, Some(current) if self.below(current))
    }

    /// Report a new free count, firing the callback on a downward crossing.
    ///
    /// Returns `true` if the callback ran.
    pub fn check(&mut self, free: u64) -> bool {
        let fire = self.below(free) && !self.already_triggered();
        if fire {
            if let Some(callback) = self.callback.as_mut() {
                callback(free);
            }
        }
        self.current = Some(free);
        fire
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Threshold")
            .field("level", &self.level)
            .field("current", &self.current)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    fn counting(level: u64) -> (Threshold, Arc<AtomicU64>) {
        let fired = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&fired);
        let mut t = Threshold::new();
        t.set(
            level,
            Box::new(move |_| {
                counter.fetch_add(1, Ordering::Relaxed);
            }),
        );
        (t, fired)
    }

    #[test]
    fn test_unset_never_fires() {
        let mut t = Threshold::new();
        assert!(!t.check(0));
    }

    #[test]
    fn test_fires_once_per_crossing() {
        let (mut t, fired) = counting(5);

        assert!(!t.check(10));
        assert!(t.check(5));
        assert!(!t.check(4));
        assert!(!t.check(3));
        assert_eq!(fired.load(Ordering::Relaxed), 1);

        // Rising above re-arms
        assert!(!t.check(6));
        assert!(t.check(2));
        assert_eq!(fired.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_fires_on_first_report_if_already_low() {
        let (mut t, fired) = counting(5);
        assert!(t.check(1));
        assert_eq!(fired.load(Ordering::Relaxed), 1);
    }
}
