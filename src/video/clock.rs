use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{interval, Interval, MissedTickBehavior};

/// Render-tick source driving the frame loop
#[async_trait]
pub trait FrameClock: Send {
    /// Wait for the next tick
    async fn tick(&mut self);
}

/// Ticks at a fixed refresh rate, like a display's animation frames
pub struct IntervalClock {
    interval: Interval,
}

impl IntervalClock {
    pub fn new(refresh_rate_hz: u32) -> Self {
        let period = Duration::from_secs_f64(1.0 / f64::from(refresh_rate_hz.max(1)));
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

#[async_trait]
impl FrameClock for IntervalClock {
    async fn tick(&mut self) {
        self.interval.tick().await;
    }
}
