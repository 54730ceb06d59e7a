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

//! Wires the pipeline together: one producer thread pulls chunks from the
//! transport and drives decoder, assembler, and frame buffer; the consumer
//! pulls `(frame, fullness)` pairs.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::assembler::StreamAssembler;
use crate::decoder::{Decodable, DecodedFrame};
use crate::frame_buffer::{AdaptiveFrameBuffer, BufferLevel};
use crate::multipart::MultipartDecoder;
use crate::{Result, StreamError};

/// Session configuration, defaulting to the camera firmware's conventions.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// `Content-Type` of the parts that carry codec payload; anything else
    /// is ignored.
    pub media_type: String,
    /// Buffering window; buffer capacity is `frame_rate * buffer_seconds`.
    pub buffer_seconds: u32,
    /// Parts per flushed container group. Also the number of decoded frames
    /// trimmed per flush, so it must match the producer's convention for the
    /// whole connection.
    pub group_size: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            media_type: "video/h265".to_string(),
            buffer_seconds: 5,
            group_size: 25,
        }
    }
}

/// A live decode session over one stream connection.
///
/// Exactly one producer thread runs the receive loop; the consumer calls
/// [`StreamSession::next_frame`] from exactly one other context. `pop` on
/// the underlying buffer is the only blocking point on the consumer side.
pub struct StreamSession {
    buffer: Arc<AdaptiveFrameBuffer>,
    run: Arc<AtomicBool>,
    /// Consumed by the first `wait_ready`; behind a mutex because a bare
    /// `mpsc::Receiver` would keep the session from being shared with the
    /// consumer thread.
    ready_rx: Mutex<Option<Receiver<u32>>>,
    error: Arc<Mutex<Option<StreamError>>>,
    producer: Option<JoinHandle<()>>,
}

impl StreamSession {
    /// Starts the producer thread over a transport chunk source.
    ///
    /// `content_type` is the HTTP response `Content-Type` announcing the
    /// multipart boundary. `decoder` is the external container/codec
    /// decoder collaborator.
    pub fn start<S, D>(
        source: S,
        content_type: &str,
        decoder: D,
        config: StreamConfig,
    ) -> Result<Self>
    where
        S: Iterator<Item = io::Result<Vec<u8>>> + Send + 'static,
        D: Decodable + 'static,
    {
        let mut parts = MultipartDecoder::new(content_type)?;
        let buffer = Arc::new(AdaptiveFrameBuffer::new(config.buffer_seconds));
        let run = Arc::new(AtomicBool::new(true));
        let error = Arc::new(Mutex::new(None));
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);

        let mut assembler = StreamAssembler::new(
            config.media_type,
            config.group_size,
            Box::new(decoder),
            buffer.clone(),
            ready_tx,
        );

        let producer = {
            let buffer = buffer.clone();
            let run = run.clone();
            let error = error.clone();
            thread::spawn(move || {
                if let Err(e) = Self::receive(source, &mut parts, &mut assembler, &run) {
                    log::error!("stream receiver terminated: {e}");
                    *error.lock().unwrap() = Some(e);
                }
                buffer.close();
            })
        };

        Ok(Self {
            buffer,
            run,
            ready_rx: Mutex::new(Some(ready_rx)),
            error,
            producer: Some(producer),
        })
    }

    /// The receive loop. The stop flag is checked once per extracted part so
    /// cancellation is observed within one part's processing latency.
    fn receive<S>(
        source: S,
        parts: &mut MultipartDecoder,
        assembler: &mut StreamAssembler,
        run: &AtomicBool,
    ) -> Result<()>
    where
        S: Iterator<Item = io::Result<Vec<u8>>>,
    {
        for chunk in source {
            let chunk = chunk?;
            parts.feed(&chunk);

            while let Some(part) = parts.try_next_part()? {
                if !run.load(Ordering::Relaxed) {
                    return Ok(());
                }
                assembler.on_part(&part)?;
            }
            if !run.load(Ordering::Relaxed) {
                return Ok(());
            }
        }

        // Input ended cleanly: hand the best-effort tail part through.
        if let Some(part) = parts.finish()? {
            assembler.on_part(&part)?;
        }
        Ok(())
    }

    /// Blocks until the first matching part has been seen and returns the
    /// stream's frame rate. A one-shot rendezvous consumed at session start;
    /// later calls return the current rate.
    pub fn wait_ready(&self) -> Result<u32> {
        // Take the receiver out before blocking so the lock is not held
        // across the rendezvous.
        let ready_rx = self.ready_rx.lock().unwrap().take();
        if let Some(ready_rx) = ready_rx {
            if let Ok(frame_rate) = ready_rx.recv() {
                return Ok(frame_rate);
            }
        } else {
            let frame_rate = self.buffer.frame_rate();
            if frame_rate > 0 {
                return Ok(frame_rate);
            }
        }

        // The producer died before the stream became ready.
        match self.error.lock().unwrap().take() {
            Some(e) => Err(e),
            None => Err(StreamError::SessionClosed),
        }
    }

    /// Pulls the next frame, blocking while the buffer is empty and the
    /// session is live. `None` means the session is over: stream end,
    /// cancellation, or a fatal error (see [`StreamSession::join`]).
    pub fn next_frame(&self) -> Option<(DecodedFrame, BufferLevel)> {
        self.buffer.pop()
    }

    /// The most recently observed frame rate, 0 before readiness.
    pub fn frame_rate(&self) -> u32 {
        self.buffer.frame_rate()
    }

    /// Current frame buffer occupancy.
    pub fn buffered_frames(&self) -> usize {
        self.buffer.len()
    }

    /// Signals the producer to stop and unblocks any waiting consumer. The
    /// producer emits no further frames once it observes the flag.
    pub fn stop(&self) {
        self.run.store(false, Ordering::Relaxed);
        self.buffer.close();
    }

    /// Reaps the producer thread and surfaces its terminal error, if any.
    pub fn join(mut self) -> Result<()> {
        if let Some(producer) = self.producer.take() {
            let _ = producer.join();
        }
        match self.error.lock().unwrap().take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        // Leaves the producer to notice the flag at its next part; joining
        // here could block indefinitely on a silent transport.
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::SyncSender;
    use std::time::Duration;

    const FRAME_BYTES: usize = 4;

    /// One frame per 4 payload bytes, mirroring one frame per part.
    struct StubDecoder;

    impl Decodable for StubDecoder {
        fn decode(&mut self, blob: &[u8]) -> Result<Vec<DecodedFrame>> {
            Ok(blob
                .chunks(FRAME_BYTES)
                .map(|chunk| DecodedFrame {
                    width: 1,
                    height: 1,
                    data: chunk.to_vec(),
                })
                .collect())
        }
    }

    const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

    fn video_part(tag: u32) -> Vec<u8> {
        let body = tag.to_be_bytes();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"--frame\r\n");
        bytes.extend_from_slice(b"Content-Type: video/h265\r\n");
        bytes.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
        bytes.extend_from_slice(b"X-Framerate: 10\r\n");
        bytes.extend_from_slice(format!("X-Tag: {tag}\r\n").as_bytes());
        bytes.extend_from_slice(b"\r\n");
        bytes.extend_from_slice(&body);
        bytes.extend_from_slice(b"\r\n");
        bytes
    }

    fn stream_of(tags: impl IntoIterator<Item = u32>) -> Vec<u8> {
        tags.into_iter().flat_map(video_part).collect()
    }

    /// Splits a byte stream into fixed-size transport chunks.
    fn chunked(bytes: Vec<u8>, size: usize) -> impl Iterator<Item = io::Result<Vec<u8>>> {
        let chunks: Vec<Vec<u8>> = bytes.chunks(size).map(<[u8]>::to_vec).collect();
        chunks.into_iter().map(Ok)
    }

    fn init_test_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn end_to_end_group_accounting() {
        init_test_logging();

        // Two groups of 25 parts; each group decodes to 25 frames and each
        // flush trims 25, leaving exactly the second group's 25 frames.
        let stream = stream_of(1..=50);
        let session = StreamSession::start(
            chunked(stream, 1024),
            CONTENT_TYPE,
            StubDecoder,
            StreamConfig::default(),
        )
        .unwrap();

        let mut frames = Vec::new();
        while let Some((frame, _level)) = session.next_frame() {
            frames.push(frame);
        }

        assert_eq!(frames.len(), 25);
        assert_eq!(frames[0].data, 26u32.to_be_bytes().to_vec());
        assert_eq!(frames[24].data, 50u32.to_be_bytes().to_vec());
        session.join().unwrap();
    }

    #[test]
    fn session_is_shareable_with_the_consumer_thread() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<StreamSession>();
        assert_send_sync::<Arc<StreamSession>>();
    }

    #[test]
    fn wait_ready_returns_the_frame_rate() {
        let stream = stream_of(1..=25);
        let session = StreamSession::start(
            chunked(stream, 7),
            CONTENT_TYPE,
            StubDecoder,
            StreamConfig::default(),
        )
        .unwrap();

        assert_eq!(session.wait_ready().unwrap(), 10);
        // Later calls fall back to the current rate.
        assert_eq!(session.wait_ready().unwrap(), 10);
    }

    #[test]
    fn malformed_stream_is_surfaced_through_join() {
        let garbage = b"this is not a multipart stream\r\n\r\n".to_vec();
        let session = StreamSession::start(
            chunked(garbage, 1024),
            CONTENT_TYPE,
            StubDecoder,
            StreamConfig::default(),
        )
        .unwrap();

        assert!(matches!(
            session.wait_ready(),
            Err(StreamError::MalformedStream(_))
        ));
        assert!(session.next_frame().is_none());
        // wait_ready consumed the terminal error.
        session.join().unwrap();
    }

    #[test]
    fn transport_error_is_fatal() {
        let source = vec![
            Ok(video_part(1)),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        ]
        .into_iter();
        let session = StreamSession::start(
            source,
            CONTENT_TYPE,
            StubDecoder,
            StreamConfig::default(),
        )
        .unwrap();

        assert!(session.next_frame().is_none());
        assert!(matches!(session.join(), Err(StreamError::Transport(_))));
    }

    /// A chunk source backed by a channel, so the stream can be held open.
    fn live_source(
    ) -> (SyncSender<Vec<u8>>, impl Iterator<Item = io::Result<Vec<u8>>> + Send + 'static) {
        let (tx, rx) = mpsc::sync_channel::<Vec<u8>>(64);
        (tx, rx.into_iter().map(Ok))
    }

    #[test]
    fn stop_unblocks_a_waiting_consumer() {
        let (tx, source) = live_source();
        let session = Arc::new(
            StreamSession::start(source, CONTENT_TYPE, StubDecoder, StreamConfig::default())
                .unwrap(),
        );

        let consumer = {
            let session = session.clone();
            thread::spawn(move || session.next_frame())
        };

        thread::sleep(Duration::from_millis(50));
        session.stop();

        // The blocked pop resolves to the termination signal, not a hang.
        assert!(consumer.join().unwrap().is_none());

        drop(tx);
        let session = Arc::try_unwrap(session).ok().expect("consumer done");
        session.join().unwrap();
    }

    #[test]
    fn producer_stops_emitting_after_cancellation() {
        init_test_logging();

        let (tx, source) = live_source();
        let config = StreamConfig {
            group_size: 5,
            ..StreamConfig::default()
        };
        let session = StreamSession::start(source, CONTENT_TYPE, StubDecoder, config).unwrap();

        // Two full groups: the second flush emits the first frames.
        tx.send(stream_of(1..=10)).unwrap();
        assert_eq!(session.wait_ready().unwrap(), 10);
        let (first, _) = session.next_frame().expect("frames after second flush");
        assert_eq!(first.data, 6u32.to_be_bytes().to_vec());

        session.stop();

        // Parts sent after the stop flag must not produce frames: drain
        // whatever was already buffered and expect the terminal None.
        tx.send(stream_of(11..=30)).unwrap();
        let mut remaining = 0;
        while session.next_frame().is_some() {
            remaining += 1;
        }
        assert!(remaining <= 4, "only pre-stop frames may drain");

        drop(tx);
        session.join().unwrap();
    }
}
