/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

//! Playout pacing driven by the frame buffer fullness signal.

use std::time::Duration;

use crate::frame_buffer::BufferLevel;

/// Adjustment applied per classification. A simple proportional controller:
/// no integral or derivative term, no overshoot protection beyond the floor
/// at zero.
const PACING_STEP: Duration = Duration::from_micros(100);

/// Tracks the interval the consumer should sleep between frame pulls,
/// nudged by the fullness classification returned with each frame.
#[derive(Debug, Clone)]
pub struct Pacer {
    interval: Duration,
}

impl Pacer {
    /// Starts at the nominal frame period, `1 / frame_rate`.
    pub fn new(frame_rate: u32) -> Self {
        let interval = if frame_rate == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(1.0 / frame_rate as f64)
        };
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Lengthens the interval when the buffer runs low, shortens it when the
    /// buffer runs high, and returns the interval to sleep before the next
    /// pull.
    pub fn adjust(&mut self, level: BufferLevel) -> Duration {
        match level {
            BufferLevel::TooEmpty => self.interval += PACING_STEP,
            BufferLevel::TooFull => self.interval = self.interval.saturating_sub(PACING_STEP),
            BufferLevel::Moderate => {}
        }
        self.interval
    }
}
