//! Trailing-edge rate limiter.
//!
//! At most one value leaves the throttle per window. A value submitted while
//! the window is closed waits in a single pending slot; newer submissions
//! replace it. The pending value can be flushed early or cancelled.

#[cfg(target_arch = "wasm32")]
use web_time::{Duration, Instant};
#[cfg(not(target_arch = "wasm32"))]
use std::time::{Duration, Instant};

/// Default emission window.
pub const DEFAULT_THROTTLE_WINDOW: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct Throttle<T> {
    window: Duration,
    last_emit: Option<Instant>,
    pending: Option<T>,
}

impl<T> Throttle<T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_emit: None,
            pending: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Offer a value. Returns it back if it may be emitted now, otherwise
    /// keeps it as the pending value and returns `None`.
    pub fn submit(&mut self, value: T, now: Instant) -> Option<T> {
        if self.is_open(now) {
            // Anything pending is older than `value`.
            self.pending = None;
            self.last_emit = Some(now);
            Some(value)
        } else {
            self.pending = Some(value);
            None
        }
    }

    /// Release the pending value once its window has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        if self.pending.is_some() && self.is_open(now) {
            self.last_emit = Some(now);
            self.pending.take()
        } else {
            None
        }
    }

    /// Release the pending value immediately, ignoring the window.
    pub fn flush(&mut self, now: Instant) -> Option<T> {
        let value = self.pending.take()?;
        self.last_emit = Some(now);
        Some(value)
    }

    /// Drop the pending value without emitting it.
    pub fn cancel(&mut self) -> Option<T> {
        self.pending.take()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// When the pending value becomes eligible, if there is one.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref()?;
        Some(self.last_emit.map_or_else(Instant::now, |t| t + self.window))
    }

    fn is_open(&self, now: Instant) -> bool {
        self.last_emit
            .is_none_or(|last| now.saturating_duration_since(last) >= self.window)
    }
}

impl<T> Default for Throttle<T> {
    fn default() -> Self {
        Self::new(DEFAULT_THROTTLE_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_first_submit_passes() {
        let mut throttle = Throttle::default();
        let t0 = Instant::now();
        assert_eq!(throttle.submit(1, t0), Some(1));
        assert!(!throttle.has_pending());
    }

    #[test]
    fn test_burst_coalesces_to_latest() {
        let mut throttle = Throttle::new(ms(50));
        let t0 = Instant::now();
        assert_eq!(throttle.submit(1, t0), Some(1));
        assert_eq!(throttle.submit(2, t0 + ms(10)), None);
        assert_eq!(throttle.submit(3, t0 + ms(20)), None);

        assert_eq!(throttle.poll(t0 + ms(30)), None);
        assert_eq!(throttle.deadline(), Some(t0 + ms(50)));
        assert_eq!(throttle.poll(t0 + ms(50)), Some(3));
        assert_eq!(throttle.poll(t0 + ms(200)), None);
    }

    #[test]
    fn test_poll_restarts_window() {
        let mut throttle = Throttle::new(ms(50));
        let t0 = Instant::now();
        throttle.submit(1, t0);
        throttle.submit(2, t0 + ms(10));
        assert_eq!(throttle.poll(t0 + ms(60)), Some(2));
        assert_eq!(throttle.submit(3, t0 + ms(70)), None);
        assert_eq!(throttle.poll(t0 + ms(110)), Some(3));
    }

    #[test]
    fn test_flush_ignores_window() {
        let mut throttle = Throttle::new(ms(50));
        let t0 = Instant::now();
        throttle.submit("a", t0);
        throttle.submit("b", t0 + ms(5));
        assert_eq!(throttle.flush(t0 + ms(6)), Some("b"));
        assert_eq!(throttle.flush(t0 + ms(7)), None);
    }

    #[test]
    fn test_cancel_drops_pending() {
        let mut throttle = Throttle::new(ms(50));
        let t0 = Instant::now();
        throttle.submit(1, t0);
        throttle.submit(2, t0 + ms(1));
        assert_eq!(throttle.cancel(), Some(2));
        assert_eq!(throttle.poll(t0 + ms(100)), None);
        assert_eq!(throttle.deadline(), None);
    }
}
