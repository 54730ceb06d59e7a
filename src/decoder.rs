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

//! The common interface to the external container/codec decoder.

use serde::{Deserialize, Serialize};

use crate::Result;

/// Represents a fully decoded frame, ready for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedFrame {
    pub width: u32,
    pub height: u32,
    /// Row-major pixel data, one color model per connection.
    pub data: Vec<u8>,
}

/// A trait that abstracts over the container/codec decoder implementation.
///
/// The assembler hands over one self-contained container blob per flushed
/// group and expects the ordered run of raster frames it decodes to.
/// Compression semantics live entirely behind this seam; tests use stubs.
pub trait Decodable: Send {
    /// Decodes a container blob into its ordered frame sequence.
    fn decode(&mut self, blob: &[u8]) -> Result<Vec<DecodedFrame>>;
}
