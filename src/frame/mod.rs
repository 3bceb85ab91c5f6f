/*
 * mod.rs
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

//! Framed stream reading: locate the header/body boundary in a growing
//! buffer, then decode the body's own framing (chunked or length-limited).
//!
//! States mirror the exchange: seeking the CRLFCRLF terminator, one-shot
//! header parse (done by the response model), then streaming the body until
//! its framing signals completion. The buffer cap and zero-read failures
//! are enforced by the connection's read loop.

pub(crate) mod body;

pub use body::Body;

/// Resumable search for the 4-byte CRLFCRLF header terminator. Tracks how
/// far the buffer has been inspected so growing it never re-scans.
pub(crate) struct HeadScanner {
    scanned: usize,
}

impl HeadScanner {
    pub(crate) fn new() -> Self {
        Self { scanned: 0 }
    }

    /// Return the offset of the terminator if present. A partial match may
    /// straddle the old buffer tail, so scanning resumes three bytes back.
    pub(crate) fn find(&mut self, buf: &[u8]) -> Option<usize> {
        let mut i = self.scanned.saturating_sub(3);
        while i + 4 <= buf.len() {
            if &buf[i..i + 4] == b"\r\n\r\n" {
                return Some(i);
            }
            i += 1;
        }
        self.scanned = buf.len();
        None
    }
}

/// Offset of the first CRLF in `buf`, if any.
pub(crate) fn find_crlf(buf: &[u8]) -> Option<usize> {
    let mut i = 0;
    while i + 1 < buf.len() {
        if buf[i] == b'\r' && buf[i + 1] == b'\n' {
            return Some(i);
        }
        i += 1;
    }
    None
}
