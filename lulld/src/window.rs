//! Rolling window of recent utilization samples.

/// Fixed-capacity ring of samples with an incrementally maintained sum.
///
/// The average is only meaningful once the window holds a full complement
/// of samples, so [`RollingWindow::average`] distinguishes a partial window
/// from a full one instead of silently averaging over fewer entries.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    slots: Vec<f64>,
    cursor: usize,
    filled: usize,
    sum: f64,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "window capacity must be non-zero");
        Self {
            slots: vec![0.0; capacity],
            cursor: 0,
            filled: 0,
            sum: 0.0,
        }
    }

    /// Records a sample, evicting the oldest once the ring has wrapped.
    ///
    /// Unused slots hold 0.0, so the subtraction is a no-op until a slot
    /// is actually being reused.
    pub fn push(&mut self, sample: f64) {
        self.sum += sample - self.slots[self.cursor];
        self.slots[self.cursor] = sample;
        self.cursor = (self.cursor + 1) % self.slots.len();
        self.filled = (self.filled + 1).min(self.slots.len());
    }

    /// Mean of the window, once it has filled.
    pub fn average(&self) -> Option<f64> {
        self.is_full().then(|| self.sum / self.slots.len() as f64)
    }

    pub fn is_full(&self) -> bool {
        self.filled == self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}
