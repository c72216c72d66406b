/// Caller-supplied progress sink, receiving percentages in [0, 100]
pub type ProgressCallback = Box<dyn FnMut(f32) + Send>;

/// Turns frame counts into clamped, non-decreasing percentages
///
/// The total is an estimate (duration times capture rate), so the raw ratio
/// may overshoot or stall; the reported value never leaves [0, 100] and never
/// goes backwards.
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
    estimated_total: f64,
    last: f32,
}

impl ProgressReporter {
    pub fn new(callback: Option<ProgressCallback>) -> Self {
        Self {
            callback,
            estimated_total: 0.0,
            last: 0.0,
        }
    }

    pub fn set_estimated_total(&mut self, frames: f64) {
        self.estimated_total = frames;
    }

    /// Report that `frame_index` frames have been encoded
    pub fn frame(&mut self, frame_index: u64) {
        if self.estimated_total <= 0.0 {
            return;
        }
        let raw = (frame_index as f64 / self.estimated_total * 100.0) as f32;
        self.emit(raw);
    }

    /// Report completion
    pub fn finish(&mut self) {
        self.emit(100.0);
    }

    pub fn last(&self) -> f32 {
        self.last
    }

    fn emit(&mut self, raw: f32) {
        let value = raw.clamp(0.0, 100.0).max(self.last);
        self.last = value;
        if let Some(callback) = self.callback.as_mut() {
            callback(value);
        }
    }
}
