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

//! The adaptive frame buffer: a bounded, blocking FIFO of decoded frames
//! with a fullness classifier used to pace the consumer.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use serde::{Deserialize, Serialize};

use crate::decoder::DecodedFrame;

/// Occupancy relative to the target band, computed at each pop. The
/// consumer turns this into a pacing adjustment: lengthen the pull interval
/// on `TooEmpty`, shorten it on `TooFull`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BufferLevel {
    TooEmpty,
    Moderate,
    TooFull,
}

#[derive(Debug)]
struct Inner {
    frames: VecDeque<DecodedFrame>,
    frame_rate: u32,
    closed: bool,
}

/// Bounded FIFO shared between the single producer and the single consumer.
///
/// `push` never blocks: past `capacity = frame_rate * buffer_seconds` the
/// oldest frames are evicted (freshness over completeness). `pop` blocks
/// while the buffer is empty and the session is live, and classifies the
/// post-pop occupancy under the same lock so the signal cannot race a
/// concurrent mutation.
#[derive(Debug)]
pub struct AdaptiveFrameBuffer {
    inner: Mutex<Inner>,
    available: Condvar,
    buffer_seconds: u32,
}

impl AdaptiveFrameBuffer {
    pub fn new(buffer_seconds: u32) -> Self {
        Self {
            inner: Mutex::new(Inner {
                frames: VecDeque::new(),
                frame_rate: 0,
                closed: false,
            }),
            available: Condvar::new(),
            buffer_seconds,
        }
    }

    pub fn buffer_seconds(&self) -> u32 {
        self.buffer_seconds
    }

    /// The most recently observed stream frame rate, 0 until the producer
    /// has seen a matching part.
    pub fn frame_rate(&self) -> u32 {
        self.inner.lock().unwrap().frame_rate
    }

    /// Updates the frame rate, resizing the target band. The producer calls
    /// this for every matching part; the rate may change at group
    /// boundaries.
    pub fn set_frame_rate(&self, frame_rate: u32) {
        self.inner.lock().unwrap().frame_rate = frame_rate;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().frames.is_empty()
    }

    /// Appends a frame, evicting from the head once past capacity.
    pub fn push(&self, frame: DecodedFrame) {
        let mut inner = self.inner.lock().unwrap();
        inner.frames.push_back(frame);

        // Widened so a large advertised frame rate cannot overflow.
        let capacity = u64::from(inner.frame_rate) * u64::from(self.buffer_seconds);
        if capacity > 0 {
            let mut evicted = 0usize;
            while inner.frames.len() as u64 > capacity {
                inner.frames.pop_front();
                evicted += 1;
            }
            if evicted > 0 {
                log::debug!("frame buffer at capacity {capacity}, evicted {evicted} oldest frames");
            }
        }

        self.available.notify_one();
    }

    /// Blocks until a frame is available, then returns the oldest frame
    /// together with the fullness classification of the remaining occupancy.
    /// Returns `None` once the buffer has been closed and drained.
    pub fn pop(&self) -> Option<(DecodedFrame, BufferLevel)> {
        let mut inner = self.inner.lock().unwrap();
        while inner.frames.is_empty() && !inner.closed {
            inner = self.available.wait(inner).unwrap();
        }

        let frame = inner.frames.pop_front()?;
        let level = self.classify(inner.frames.len(), inner.frame_rate);
        Some((frame, level))
    }

    /// Wakes every blocked consumer; subsequent pops drain what is left and
    /// then yield `None`. Used for both normal stream end and cancellation.
    pub fn close(&self) {
        self.inner.lock().unwrap().closed = true;
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    /// Compares occupancy against the moderate band `T +/- 0.5 * rate`,
    /// where `T = frame_rate * buffer_seconds / 2`.
    fn classify(&self, occupancy: usize, frame_rate: u32) -> BufferLevel {
        let half_target = f64::from(frame_rate) * f64::from(self.buffer_seconds) / 2.0;
        let tolerance = 0.5 * frame_rate as f64;
        let occupancy = occupancy as f64;

        if occupancy < half_target - tolerance {
            BufferLevel::TooEmpty
        } else if occupancy > half_target + tolerance {
            BufferLevel::TooFull
        } else {
            BufferLevel::Moderate
        }
    }
}
