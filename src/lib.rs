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

//! Adaptive decoding of HTTP `multipart/x-mixed-replace` video streams, as
//! emitted by network cameras.
//!
//! The pipeline: raw transport chunks feed the [`MultipartDecoder`], which
//! extracts framed parts without assuming chunk boundaries align with
//! protocol boundaries; the [`StreamAssembler`] groups codec payloads into
//! container blobs for an external [`Decodable`] decoder; decoded frames
//! land in the [`AdaptiveFrameBuffer`], whose fullness signal closes the
//! loop by pacing the consumer's pull interval (see [`Pacer`]).
//!
//! [`StreamSession`] runs the producer side on its own thread; the consumer
//! pulls `(frame, fullness)` pairs with [`StreamSession::next_frame`].
//!
//! The HTTP client, the real codec decoder, color conversion, and rendering
//! are external collaborators behind the `Iterator` and [`Decodable`] seams.

pub mod assembler;
pub mod decoder;
pub mod error;
pub mod frame_buffer;
pub mod multipart;
pub mod pacing;
pub mod session;

pub use assembler::StreamAssembler;
pub use decoder::{Decodable, DecodedFrame};
pub use error::{Result, StreamError};
pub use frame_buffer::{AdaptiveFrameBuffer, BufferLevel};
pub use multipart::{MultipartDecoder, Part};
pub use pacing::Pacer;
pub use session::{StreamConfig, StreamSession};
