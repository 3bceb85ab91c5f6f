/*
 * body.rs
 * Copyright (C) 2026 Staffetta contributors
 *
 * This file is part of Staffetta, an HTTP/1.1 client transport library.
 *
 * Staffetta is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Staffetta is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Staffetta.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Body framing decoder and the lazy body stream handle.
//!
//! `BodyDecoder` is an incremental state machine over buffered bytes:
//! length-limited counts down exactly `Content-Length` bytes, chunked walks
//! `<hex-size>\r\n<data>\r\n` segments to the zero chunk and then discards
//! trailers. `Body` pulls from the speculatively-read prefix first, then the
//! live socket. It owns the connection state guard for its whole life, so
//! the connection's busy flag and the pool permit are released only when the
//! body has been consumed or dropped; an unfinished body marks the
//! connection for reconnect so the next request never sees stale bytes.

use bytes::{Buf, Bytes, BytesMut};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;

use super::find_crlf;
use crate::connection::{read_some, ConnState, ConnectionRelease};
use crate::error::TransportError;

/// Framing mode selected from the parsed response flags.
#[derive(Debug)]
pub(crate) enum BodyDecoder {
    /// No framing declared: the body is empty.
    Empty,
    /// Exactly `remaining` more bytes, then end-of-body.
    Length { remaining: u64 },
    /// RFC 7230 chunk grammar until the zero-size chunk. Size and trailer
    /// lines longer than `line_cap` bytes are rejected.
    Chunked { state: ChunkState, line_cap: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChunkState {
    Size,
    Data { remaining: u64 },
    DataEnd,
    Trailer,
    Done,
}

pub(crate) enum Decoded {
    Data(Bytes),
    NeedMore,
    Finished,
}

impl BodyDecoder {
    /// Chunked and Content-Length are mutually exclusive; chunked wins when
    /// a server sends both. Neither flag means an empty body. `line_cap`
    /// bounds chunk-size and trailer lines, like the header block cap.
    pub(crate) fn for_response(chunked: bool, content_length: Option<u64>, line_cap: usize) -> Self {
        if chunked {
            BodyDecoder::Chunked {
                state: ChunkState::Size,
                line_cap,
            }
        } else {
            match content_length {
                Some(n) if n > 0 => BodyDecoder::Length { remaining: n },
                _ => BodyDecoder::Empty,
            }
        }
    }

    pub(crate) fn is_complete(&self) -> bool {
        match self {
            BodyDecoder::Empty => true,
            BodyDecoder::Length { remaining } => *remaining == 0,
            BodyDecoder::Chunked { state, .. } => *state == ChunkState::Done,
        }
    }

    /// Decode as much as possible from `buf`. Returns one data slice, a
    /// request for more bytes, or completion.
    pub(crate) fn decode(&mut self, buf: &mut BytesMut) -> Result<Decoded, TransportError> {
        match self {
            BodyDecoder::Empty => Ok(Decoded::Finished),
            BodyDecoder::Length { remaining } => {
                if *remaining == 0 {
                    return Ok(Decoded::Finished);
                }
                if buf.is_empty() {
                    return Ok(Decoded::NeedMore);
                }
                let take = (*remaining).min(buf.len() as u64) as usize;
                *remaining -= take as u64;
                Ok(Decoded::Data(buf.split_to(take).freeze()))
            }
            BodyDecoder::Chunked { state, line_cap } => loop {
                match *state {
                    ChunkState::Size => {
                        let line_end = match find_crlf(buf) {
                            Some(n) => n,
                            None if buf.len() > *line_cap => {
                                return Err(TransportError::Parse(format!(
                                    "chunk size line exceeds {} bytes",
                                    line_cap
                                )));
                            }
                            None => return Ok(Decoded::NeedMore),
                        };
                        let line = buf.split_to(line_end + 2);
                        let text = std::str::from_utf8(&line[..line_end]).map_err(|_| {
                            TransportError::Parse("chunk size line is not valid UTF-8".into())
                        })?;
                        // Chunk extensions after ';' are ignored.
                        let hex = text.split(';').next().unwrap_or(text).trim();
                        let size = u64::from_str_radix(hex, 16).map_err(|_| {
                            TransportError::Parse(format!("invalid chunk size {:?}", hex))
                        })?;
                        *state = if size == 0 {
                            ChunkState::Trailer
                        } else {
                            ChunkState::Data { remaining: size }
                        };
                    }
                    ChunkState::Data { remaining } => {
                        if buf.is_empty() {
                            return Ok(Decoded::NeedMore);
                        }
                        let take = remaining.min(buf.len() as u64) as usize;
                        let data = buf.split_to(take).freeze();
                        let left = remaining - take as u64;
                        *state = if left == 0 {
                            ChunkState::DataEnd
                        } else {
                            ChunkState::Data { remaining: left }
                        };
                        return Ok(Decoded::Data(data));
                    }
                    ChunkState::DataEnd => {
                        if buf.len() < 2 {
                            return Ok(Decoded::NeedMore);
                        }
                        if &buf[..2] != b"\r\n" {
                            return Err(TransportError::Parse(
                                "missing CRLF after chunk data".into(),
                            ));
                        }
                        buf.advance(2);
                        *state = ChunkState::Size;
                    }
                    ChunkState::Trailer => {
                        let line_end = match find_crlf(buf) {
                            Some(n) => n,
                            None if buf.len() > *line_cap => {
                                return Err(TransportError::Parse(format!(
                                    "trailer line exceeds {} bytes",
                                    line_cap
                                )));
                            }
                            None => return Ok(Decoded::NeedMore),
                        };
                        if line_end == 0 {
                            buf.advance(2);
                            *state = ChunkState::Done;
                        } else {
                            // Trailer headers are consumed and discarded.
                            buf.advance(line_end + 2);
                        }
                    }
                    ChunkState::Done => return Ok(Decoded::Finished),
                }
            },
        }
    }
}

/// Everything the body stream owns while in flight. Field order matters for
/// drop: the state guard unlocks before the release guard frees the busy
/// flag and the pool permit.
pub(crate) struct BodyState {
    pub(crate) guard: OwnedMutexGuard<ConnState>,
    pub(crate) buf: BytesMut,
    pub(crate) decoder: BodyDecoder,
    pub(crate) read_timeout: Duration,
    pub(crate) cancel: CancellationToken,
    pub(crate) release: ConnectionRelease,
}

impl Drop for BodyState {
    fn drop(&mut self) {
        if !self.decoder.is_complete() {
            // Unread body bytes would corrupt the next exchange; force a
            // reconnect on the connection's next use.
            self.guard.connected = false;
            self.guard.stream = None;
        }
    }
}

/// Lazy response body stream. Pull with `chunk()` until `None`, or collect
/// with `bytes()`. Dropping it (finished or not) releases the connection.
pub struct Body {
    state: Option<BodyState>,
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.state {
            Some(state) => write!(f, "Body({:?})", state.decoder),
            None => f.write_str("Body(consumed)"),
        }
    }
}

impl Body {
    pub(crate) fn new(state: BodyState) -> Self {
        Self { state: Some(state) }
    }

    /// Next slice of decoded body data, or `None` at end-of-body. The first
    /// calls drain bytes read speculatively with the headers; later calls
    /// read the live socket.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>, TransportError> {
        match self.advance().await {
            Ok(data) => Ok(data),
            Err(e) => {
                // Dropping the state poisons the connection (unfinished
                // decoder) and releases busy + permit.
                self.state = None;
                Err(e)
            }
        }
    }

    async fn advance(&mut self) -> Result<Option<Bytes>, TransportError> {
        loop {
            let state = match self.state.as_mut() {
                Some(s) => s,
                None => return Ok(None),
            };
            match state.decoder.decode(&mut state.buf)? {
                Decoded::Data(data) => return Ok(Some(data)),
                Decoded::Finished => {
                    self.state = None;
                    return Ok(None);
                }
                Decoded::NeedMore => {
                    let BodyState {
                        guard,
                        buf,
                        read_timeout,
                        cancel,
                        ..
                    } = state;
                    let stream = guard.stream.as_mut().ok_or(TransportError::ClosedByPeer)?;
                    let n = read_some(stream, buf, *read_timeout, cancel).await?;
                    if n == 0 {
                        return Err(TransportError::ClosedByPeer);
                    }
                }
            }
        }
    }

    /// Read the remaining body to completion and return it as one buffer.
    pub async fn bytes(mut self) -> Result<Bytes, TransportError> {
        let mut out = BytesMut::new();
        while let Some(chunk) = self.chunk().await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out.freeze())
    }

    /// True once the body has been fully consumed (or abandoned by error).
    pub fn is_consumed(&self) -> bool {
        self.state.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(decoder: &mut BodyDecoder, buf: &mut BytesMut) -> (Vec<u8>, bool) {
        let mut out = Vec::new();
        loop {
            match decoder.decode(buf).unwrap() {
                Decoded::Data(b) => out.extend_from_slice(&b),
                Decoded::NeedMore => return (out, false),
                Decoded::Finished => return (out, true),
            }
        }
    }

    #[test]
    fn length_delivers_exactly_n_bytes() {
        let mut decoder = BodyDecoder::for_response(false, Some(5), 32768);
        let mut buf = BytesMut::from(&b"hello, world"[..]);
        let (out, done) = collect(&mut decoder, &mut buf);
        assert_eq!(out, b"hello");
        assert!(done);
        // Bytes beyond the declared length stay in the buffer untouched.
        assert_eq!(&buf[..], b", world");
    }

    #[test]
    fn length_across_fragments() {
        let payload = b"0123456789";
        for split in 1..payload.len() {
            let mut decoder = BodyDecoder::for_response(false, Some(payload.len() as u64), 32768);
            let mut buf = BytesMut::from(&payload[..split]);
            let (mut out, done) = collect(&mut decoder, &mut buf);
            assert!(!done);
            buf.extend_from_slice(&payload[split..]);
            let (rest, done) = collect(&mut decoder, &mut buf);
            out.extend_from_slice(&rest);
            assert!(done);
            assert_eq!(out, payload);
        }
    }

    #[test]
    fn no_framing_means_empty_body() {
        let mut decoder = BodyDecoder::for_response(false, None, 32768);
        let mut buf = BytesMut::new();
        let (out, done) = collect(&mut decoder, &mut buf);
        assert!(out.is_empty());
        assert!(done);
        assert!(decoder.is_complete());
    }

    #[test]
    fn chunked_roundtrip_at_every_split() {
        let wire = b"3\r\nfoo\r\n6\r\nbarbaz\r\n1\r\n!\r\n0\r\n\r\n";
        for split in 1..wire.len() {
            let mut decoder = BodyDecoder::for_response(true, None, 32768);
            let mut buf = BytesMut::from(&wire[..split]);
            let (mut out, _) = collect(&mut decoder, &mut buf);
            buf.extend_from_slice(&wire[split..]);
            let (rest, done) = collect(&mut decoder, &mut buf);
            out.extend_from_slice(&rest);
            assert!(done, "split at {}", split);
            assert_eq!(out, b"foobarbaz!", "split at {}", split);
        }
    }

    #[test]
    fn chunk_extensions_ignored() {
        let mut decoder = BodyDecoder::for_response(true, None, 32768);
        let mut buf = BytesMut::from(&b"4;name=value\r\nabcd\r\n0\r\n\r\n"[..]);
        let (out, done) = collect(&mut decoder, &mut buf);
        assert_eq!(out, b"abcd");
        assert!(done);
    }

    #[test]
    fn trailers_consumed_and_discarded() {
        let mut decoder = BodyDecoder::for_response(true, None, 32768);
        let mut buf =
            BytesMut::from(&b"2\r\nok\r\n0\r\nX-Checksum: abc\r\nX-Extra: 1\r\n\r\ntail"[..]);
        let (out, done) = collect(&mut decoder, &mut buf);
        assert_eq!(out, b"ok");
        assert!(done);
        assert_eq!(&buf[..], b"tail");
    }

    #[test]
    fn invalid_chunk_size_is_a_parse_error() {
        let mut decoder = BodyDecoder::for_response(true, None, 32768);
        let mut buf = BytesMut::from(&b"zz\r\ndata"[..]);
        assert!(matches!(
            decoder.decode(&mut buf),
            Err(TransportError::Parse(_))
        ));
    }

    #[test]
    fn missing_chunk_crlf_is_a_parse_error() {
        let mut decoder = BodyDecoder::for_response(true, None, 32768);
        let mut buf = BytesMut::from(&b"2\r\nokXX0\r\n\r\n"[..]);
        let mut saw_error = false;
        loop {
            match decoder.decode(&mut buf) {
                Ok(Decoded::Data(_)) => continue,
                Ok(_) => break,
                Err(TransportError::Parse(_)) => {
                    saw_error = true;
                    break;
                }
                Err(e) => panic!("unexpected error {}", e),
            }
        }
        assert!(saw_error);
    }

    #[test]
    fn chunked_wins_over_content_length() {
        let decoder = BodyDecoder::for_response(true, Some(100), 32768);
        assert!(matches!(decoder, BodyDecoder::Chunked { .. }));
    }

    #[test]
    fn zero_content_length_is_complete() {
        let decoder = BodyDecoder::for_response(false, Some(0), 32768);
        assert!(decoder.is_complete());
    }

    #[test]
    fn endless_chunk_size_line_is_rejected() {
        let mut decoder = BodyDecoder::for_response(true, None, 64);
        let mut buf = BytesMut::from(&b"1"[..]);
        assert!(matches!(decoder.decode(&mut buf), Ok(Decoded::NeedMore)));
        // A server that never terminates the size line must not grow the
        // buffer forever.
        buf.extend_from_slice(&[b'1'; 128]);
        assert!(matches!(
            decoder.decode(&mut buf),
            Err(TransportError::Parse(_))
        ));
    }

    #[test]
    fn endless_trailer_line_is_rejected() {
        let mut decoder = BodyDecoder::for_response(true, None, 64);
        let mut buf = BytesMut::from(&b"0\r\nX-Trailer: "[..]);
        assert!(matches!(decoder.decode(&mut buf), Ok(Decoded::NeedMore)));
        buf.extend_from_slice(&[b'a'; 128]);
        assert!(matches!(
            decoder.decode(&mut buf),
            Err(TransportError::Parse(_))
        ));
    }
}
