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

use thiserror::Error;

/// Result type for stream decoding operations
pub type Result<T> = std::result::Result<T, StreamError>;

/// Errors that can occur while decoding a mixed-replace stream
#[derive(Error, Debug)]
pub enum StreamError {
    /// The stream violated the multipart framing protocol. Fatal to the
    /// decode session; the caller decides whether to tear down the
    /// connection or the whole process.
    #[error("malformed stream: {0}")]
    MalformedStream(String),

    /// The external codec decoder rejected a container blob. Recoverable:
    /// the assembler drops the group and keeps receiving.
    #[error("codec decode failure: {0}")]
    CodecDecode(String),

    /// The chunk source failed. Fatal to the session.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The session ended before the stream became ready.
    #[error("session closed")]
    SessionClosed,
}
