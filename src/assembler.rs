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

//! Groups elementary-stream parts into container blobs for the codec
//! decoder and feeds the decoded frames to the frame buffer.

use std::str::FromStr;
use std::sync::mpsc::SyncSender;
use std::sync::Arc;

use crate::decoder::Decodable;
use crate::frame_buffer::AdaptiveFrameBuffer;
use crate::multipart::Part;
use crate::{Result, StreamError};

/// Accumulates matching part payloads and flushes every `group_size` parts.
///
/// Consecutive container blobs are decoded independently rather than as one
/// continuous stream, so each flush hands the decoder the previously flushed
/// group plus the current one and discards the first `group_size` decoded
/// frames, which re-materialize the previous group's tail. The discard count
/// is a calibrated heuristic tied to a constant group size, not a general
/// guarantee; it is only correct while the producer keeps its group-size
/// convention for the whole connection.
pub struct StreamAssembler {
    media_type: String,
    group_size: u64,
    /// Payload bytes of the previously flushed group, kept as the prefix of
    /// the next blob.
    previous_group: Vec<u8>,
    /// Payload bytes accumulated since the last flush.
    current_group: Vec<u8>,
    decoder: Box<dyn Decodable>,
    buffer: Arc<AdaptiveFrameBuffer>,
    /// Fired once, with the first observed frame rate.
    ready_tx: Option<SyncSender<u32>>,
}

impl StreamAssembler {
    pub fn new(
        media_type: String,
        group_size: u64,
        decoder: Box<dyn Decodable>,
        buffer: Arc<AdaptiveFrameBuffer>,
        ready_tx: SyncSender<u32>,
    ) -> Self {
        Self {
            media_type,
            group_size,
            previous_group: Vec::new(),
            current_group: Vec::new(),
            decoder,
            buffer,
            ready_tx: Some(ready_tx),
        }
    }

    /// Handles one extracted part. Parts whose `Content-Type` does not match
    /// the expected media type are ignored entirely.
    ///
    /// Matching parts must carry numeric `X-Framerate` and `X-Tag` headers;
    /// the tag is assumed monotonically increasing by the upstream producer
    /// and is used only to detect the group boundary.
    pub fn on_part(&mut self, part: &Part) -> Result<()> {
        if part.header("Content-Type") != Some(self.media_type.as_str()) {
            return Ok(());
        }

        let frame_rate: u32 = required_header(part, "X-Framerate")?;
        let tag: u64 = required_header(part, "X-Tag")?;

        self.buffer.set_frame_rate(frame_rate);
        if let Some(ready_tx) = self.ready_tx.take() {
            let _ = ready_tx.send(frame_rate);
        }

        self.current_group.extend_from_slice(&part.body);

        if tag % self.group_size == 0 {
            self.flush();
        }
        Ok(())
    }

    /// Decodes the overlap window and enqueues everything past the
    /// already-emitted prefix. A rejected blob drops the group but never the
    /// session: continuous playback tolerates a lost group better than a
    /// crashed receiver.
    fn flush(&mut self) {
        let mut blob = Vec::with_capacity(self.previous_group.len() + self.current_group.len());
        blob.extend_from_slice(&self.previous_group);
        blob.extend_from_slice(&self.current_group);

        match self.decoder.decode(&blob) {
            Ok(frames) => {
                let total = frames.len();
                let mut enqueued = 0usize;
                for frame in frames.into_iter().skip(self.group_size as usize) {
                    self.buffer.push(frame);
                    enqueued += 1;
                }
                log::debug!(
                    "flushed {} byte group: {total} decoded frames, {enqueued} enqueued",
                    blob.len()
                );
            }
            Err(e) => {
                log::warn!("dropping undecodable {} byte group: {e}", blob.len());
            }
        }

        self.previous_group = std::mem::take(&mut self.current_group);
    }
}

fn required_header<T: FromStr>(part: &Part, name: &str) -> Result<T> {
    let value = part.header(name).ok_or_else(|| {
        StreamError::MalformedStream(format!("missing {name} header on matching part"))
    })?;
    value.parse().map_err(|_| {
        StreamError::MalformedStream(format!("non-numeric {name} header: {value:?}"))
    })
}
