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

//! Incremental decoder for HTTP `multipart/x-mixed-replace` streams.
//!
//! Network cameras deliver an unbounded body whose chunk boundaries have no
//! relationship to the protocol framing. The decoder accumulates raw chunks
//! in a single owned buffer and extracts complete `(headers, body)` parts as
//! soon as enough bytes are present, so output is identical for any split of
//! the same input.

use std::collections::HashMap;

use crate::{Result, StreamError};

const CRLF: &[u8] = b"\r\n";
const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";
const BOUNDARY_PREFIX: &[u8] = b"--";

/// One framed unit of the multipart stream.
///
/// Header names are case-sensitive and the leading boundary-marker line is
/// excluded from the map (it carries no colon).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl Part {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Stateful incremental parser turning arbitrary byte chunks into parts.
///
/// The buffer holds bytes received but not yet consumed into a completed
/// part. Once at least one full header block has arrived it always starts
/// with a `--boundary` marker at offset 0.
#[derive(Debug)]
pub struct MultipartDecoder {
    boundary: String,
    buffer: Vec<u8>,
}

impl MultipartDecoder {
    /// Creates a decoder for a stream announced with the given HTTP
    /// `Content-Type`. The boundary token is everything after `boundary=`,
    /// with exactly one leading `--` stripped if present.
    pub fn new(content_type: &str) -> Result<Self> {
        let token = content_type.split("boundary=").nth(1).ok_or_else(|| {
            StreamError::MalformedStream(format!(
                "no boundary parameter in content type {content_type:?}"
            ))
        })?;
        let boundary = token.strip_prefix("--").unwrap_or(token).to_string();
        Ok(Self {
            boundary,
            buffer: Vec::new(),
        })
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Number of buffered, not yet consumed bytes.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Appends a raw chunk. Never parses; extraction is separate so a caller
    /// can drain every ready part after each feed.
    pub fn feed(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Removes and returns one complete part from the front of the buffer,
    /// or `Ok(None)` if insufficient bytes are present. State is untouched
    /// in the not-ready case.
    ///
    /// Framing mode is decided per part: a `Content-Length` header gives the
    /// exact body extent, otherwise the body runs until the next
    /// `\r\n--boundary\r\n` delimiter occurrence.
    pub fn try_next_part(&mut self) -> Result<Option<Part>> {
        let Some(headers_end) = find(&self.buffer, HEADER_TERMINATOR) else {
            return Ok(None);
        };
        let headers = self.parse_header_block(headers_end)?;
        let body_start = headers_end + HEADER_TERMINATOR.len();

        let body_end = match content_length(&headers)? {
            Some(length) => {
                if self.buffer.len() - body_start < length {
                    return Ok(None);
                }
                let body_end = body_start + length;
                // The delimiter CRLF after the body may itself be torn
                // across transport chunks. Wait until enough bytes follow
                // the body to tell a torn delimiter from the next marker;
                // `finish` covers the end-of-stream tail.
                let remaining = &self.buffer[body_end..];
                if remaining.len() < CRLF.len() && CRLF.starts_with(remaining) {
                    return Ok(None);
                }
                body_end
            }
            None => {
                // The delimiter is built from the literal first line of the
                // buffer, not the configured token, so parts are split on
                // exactly what the producer sent.
                let line_end = find(&self.buffer, CRLF).unwrap_or(headers_end);
                let mut delimiter = Vec::with_capacity(line_end + 2 * CRLF.len());
                delimiter.extend_from_slice(CRLF);
                delimiter.extend_from_slice(&self.buffer[..line_end]);
                delimiter.extend_from_slice(CRLF);

                match find(&self.buffer[body_start..], &delimiter) {
                    Some(offset) => body_start + offset,
                    None => return Ok(None),
                }
            }
        };

        let body = self.buffer[body_start..body_end].to_vec();

        // Boundary delimiters are followed by CRLF before the next part's
        // leading marker; strip exactly one such pair, never more.
        let mut consumed = body_end;
        if self.buffer[consumed..].starts_with(CRLF) {
            consumed += CRLF.len();
        }
        self.buffer.drain(..consumed);

        Ok(Some(Part { headers, body }))
    }

    /// Best-effort tail extraction, called once after the input ends: emits
    /// a final part if a complete header block is buffered, even though the
    /// body framing condition was never satisfied. The body is whatever
    /// remains, truncated to `Content-Length` when declared and available.
    pub fn finish(&mut self) -> Result<Option<Part>> {
        let Some(headers_end) = find(&self.buffer, HEADER_TERMINATOR) else {
            if !self.buffer.is_empty() {
                log::debug!(
                    "discarding {} trailing bytes without a complete header block",
                    self.buffer.len()
                );
            }
            self.buffer.clear();
            return Ok(None);
        };
        let headers = self.parse_header_block(headers_end)?;
        let body_start = headers_end + HEADER_TERMINATOR.len();

        let mut body = self.buffer[body_start..].to_vec();
        if let Some(length) = content_length(&headers)? {
            body.truncate(length);
        }
        self.buffer.clear();

        Ok(Some(Part { headers, body }))
    }

    fn parse_header_block(&self, headers_end: usize) -> Result<HashMap<String, String>> {
        if !self.buffer.starts_with(BOUNDARY_PREFIX) {
            return Err(StreamError::MalformedStream(format!(
                "part does not begin with a boundary marker (leading bytes {:?})",
                String::from_utf8_lossy(&self.buffer[..self.buffer.len().min(16)])
            )));
        }

        let block = String::from_utf8_lossy(&self.buffer[..headers_end]);
        let mut headers = HashMap::new();
        for line in block.split("\r\n") {
            // Lines without a colon are skipped, which also drops the
            // leading boundary-marker line.
            let Some(colon) = line.find(':') else { continue };
            let key = line[..colon].to_string();
            let value = line[colon + 1..].trim().to_string();
            headers.insert(key, value);
        }
        Ok(headers)
    }
}

fn content_length(headers: &HashMap<String, String>) -> Result<Option<usize>> {
    match headers.get("Content-Length") {
        None => Ok(None),
        Some(value) => value.parse::<usize>().map(Some).map_err(|_| {
            StreamError::MalformedStream(format!("non-numeric Content-Length {value:?}"))
        }),
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
