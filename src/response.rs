/*
 * response.rs
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

//! Response model: structured view of a parsed header block.
//!
//! `parse_headers` consumes the decoded text between the status line and the
//! CRLFCRLF terminator and extracts the three framing-relevant flags with
//! case-insensitive matching: `Content-Length`, `Transfer-Encoding: chunked`
//! and `Connection: close`. The connection attaches the body stream after
//! selecting the framing; chunked wins when both framings are present
//! (RFC 7230 section 3.3.3).

use crate::error::TransportError;
use crate::frame::Body;

/// Parsed HTTP/1.1 response: status, headers, framing flags, lazy body.
#[derive(Debug)]
pub struct Response {
    pub code: u16,
    pub reason: Option<String>,
    /// Ordered as received; names may repeat.
    pub headers: Vec<(String, String)>,
    pub content_length: Option<u64>,
    pub chunked: bool,
    pub connection_close: bool,
    /// Attached by the connection once framing is selected. Consuming or
    /// dropping it releases the connection back to the pool.
    pub body: Option<Body>,
}

impl Response {
    /// First header with the given name, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// Take the body stream, leaving `None` behind.
    pub fn take_body(&mut self) -> Option<Body> {
        self.body.take()
    }
}

/// Parse the raw header text (status line + header lines, CRLF separated,
/// without the terminating empty line) into a `Response` with `body: None`.
pub fn parse_headers(text: &str) -> Result<Response, TransportError> {
    let mut lines = text.split("\r\n");
    let status_line = lines
        .next()
        .ok_or_else(|| TransportError::Parse("empty header block".into()))?;
    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().unwrap_or("");
    if !version.starts_with("HTTP/") {
        return Err(TransportError::Parse(format!(
            "not an HTTP status line: {:?}",
            status_line
        )));
    }
    let code = parts
        .next()
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| {
            TransportError::Parse(format!("missing status code in {:?}", status_line))
        })?;
    let reason = parts.next().filter(|s| !s.is_empty()).map(str::to_string);

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        // Lines without a colon are tolerated and skipped.
        if let Some(colon) = line.find(':') {
            let name = line[..colon].trim();
            let value = line[colon + 1..].trim();
            headers.push((name.to_string(), value.to_string()));
        }
    }

    let mut content_length = None;
    for (name, value) in &headers {
        if name.eq_ignore_ascii_case("content-length") {
            let parsed = value.trim().parse::<u64>().map_err(|_| {
                TransportError::Parse(format!("invalid Content-Length: {:?}", value))
            })?;
            content_length = Some(parsed);
            break;
        }
    }
    let chunked = headers.iter().any(|(name, value)| {
        name.eq_ignore_ascii_case("transfer-encoding")
            && value.to_ascii_lowercase().contains("chunked")
    });
    let connection_close = headers.iter().any(|(name, value)| {
        name.eq_ignore_ascii_case("connection") && value.to_ascii_lowercase().contains("close")
    });

    Ok(Response {
        code,
        reason,
        headers,
        content_length,
        chunked,
        connection_close,
        body: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_status_and_reason() {
        let response = parse_headers("HTTP/1.1 404 Not Found").unwrap();
        assert_eq!(response.code, 404);
        assert_eq!(response.reason.as_deref(), Some("Not Found"));
        assert!(!response.is_success());
    }

    #[test]
    fn reason_is_optional() {
        let response = parse_headers("HTTP/1.1 200").unwrap();
        assert_eq!(response.code, 200);
        assert!(response.reason.is_none());
    }

    #[test]
    fn framing_flags_case_insensitive() {
        let response = parse_headers(
            "HTTP/1.1 200 OK\r\nCONTENT-LENGTH: 42\r\nConnection: Close\r\nServer: x",
        )
        .unwrap();
        assert_eq!(response.content_length, Some(42));
        assert!(response.connection_close);
        assert!(!response.chunked);
        assert_eq!(response.header("server"), Some("x"));
    }

    #[test]
    fn chunked_flag_from_transfer_encoding() {
        let response =
            parse_headers("HTTP/1.1 200 OK\r\nTransfer-Encoding: gzip, Chunked").unwrap();
        assert!(response.chunked);
    }

    #[test]
    fn rejects_non_http_status_line() {
        assert!(matches!(
            parse_headers("FTP 200 OK"),
            Err(TransportError::Parse(_))
        ));
    }

    #[test]
    fn rejects_missing_status_code() {
        assert!(parse_headers("HTTP/1.1 abc OK").is_err());
    }

    #[test]
    fn rejects_invalid_content_length() {
        assert!(parse_headers("HTTP/1.1 200 OK\r\nContent-Length: twelve").is_err());
    }

    #[test]
    fn duplicate_headers_preserved() {
        let response =
            parse_headers("HTTP/1.1 200 OK\r\nSet-Cookie: a=1\r\nSet-Cookie: b=2").unwrap();
        let cookies: Vec<_> = response
            .headers
            .iter()
            .filter(|(n, _)| n == "Set-Cookie")
            .collect();
        assert_eq!(cookies.len(), 2);
    }
}
