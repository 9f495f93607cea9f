//! Wire codec: incremental request decoding and response encoding.
//!
//! The decoder reads byte-at-a-time through a fixed buffer it owns, so a request may
//! arrive in arbitrarily small pieces. Bytes past the end of one request stay in the
//! buffer and are the start of the next `decode` call.

use super::multipart::{self, MultipartError, Part};
use super::request::{parse_cookies, parse_urlencoded, Request};
use crate::ids::RequestId;
use super::response::{Body, Response};
use http::Method;
use serde::Deserialize;
use std::fmt;
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};
use tracing::debug;

/// Initial allocation for a body; larger bodies grow as bytes arrive
const INITIAL_BODY_CAPACITY: usize = 64 * 1024;

/// `WouldBlock` retries answered with a plain yield before backing off to sleeps
const SPIN_YIELDS: u32 = 16;

/// Longest pause between retries of an idle source
const MAX_BACKOFF: Duration = Duration::from_millis(50);

/// Decoder limits
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CodecConfig {
    /// Size of the read buffer owned by each decoder
    pub buffer_size: usize,
    /// Longest accepted request or header line
    pub max_line_bytes: usize,
    /// Largest accepted `Content-Length`
    pub max_body_bytes: usize,
    /// How long a non-blocking source may keep reporting `WouldBlock` before the
    /// decode is abandoned
    pub idle_timeout_ms: u64,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            buffer_size: 8 * 1024,
            max_line_bytes: 8 * 1024,
            max_body_bytes: 10 * 1024 * 1024,
            idle_timeout_ms: 30_000,
        }
    }
}

/// Outcome of a successful decode
#[derive(Debug)]
pub enum Decoded {
    Request(Box<Request>),
    /// `GET /favicon.ico`, answered without reading the rest of the request
    Favicon { version: String },
}

#[derive(Debug)]
pub enum DecodeError {
    /// Clean end of stream before the first byte of a request
    ConnectionClosed,
    /// End of stream in the middle of a request
    UnexpectedEof,
    MalformedRequestLine(String),
    MalformedHeader(String),
    InvalidContentLength(String),
    LineTooLong { limit: usize },
    BodyTooLarge { length: usize, limit: usize },
    Multipart(MultipartError),
    /// The source stayed `WouldBlock` for longer than the idle timeout
    Idle { waited: Duration },
    Io(io::Error),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionClosed => write!(f, "connection closed"),
            Self::UnexpectedEof => write!(f, "unexpected end of stream inside a request"),
            Self::MalformedRequestLine(line) => write!(f, "malformed request line: {line:?}"),
            Self::MalformedHeader(line) => write!(f, "malformed header line: {line:?}"),
            Self::InvalidContentLength(value) => write!(f, "invalid Content-Length: {value:?}"),
            Self::LineTooLong { limit } => write!(f, "line exceeds {limit} bytes"),
            Self::BodyTooLarge { length, limit } => {
                write!(f, "body of {length} bytes exceeds limit of {limit}")
            }
            Self::Multipart(e) => write!(f, "{e}"),
            Self::Idle { waited } => write!(f, "no data for {}ms", waited.as_millis()),
            Self::Io(e) => write!(f, "read failed: {e}"),
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Multipart(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for DecodeError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<MultipartError> for DecodeError {
    fn from(e: MultipartError) -> Self {
        Self::Multipart(e)
    }
}

/// Methods whose body is decoded
fn has_body(method: &Method) -> bool {
    *method == Method::POST || *method == Method::PUT || *method == Method::PATCH
}

/// Incremental request decoder over any byte source.
pub struct RequestDecoder<R> {
    source: R,
    buf: Box<[u8]>,
    start: usize,
    end: usize,
    config: CodecConfig,
}

impl<R: Read> RequestDecoder<R> {
    pub fn new(source: R, config: CodecConfig) -> Self {
        let buf = vec![0u8; config.buffer_size.max(1)].into_boxed_slice();
        Self {
            source,
            buf,
            start: 0,
            end: 0,
            config,
        }
    }

    /// Bytes read from the source but not yet consumed
    #[must_use]
    pub fn buffered(&self) -> &[u8] {
        &self.buf[self.start..self.end]
    }

    /// Decode the next request from the stream.
    ///
    /// # Errors
    ///
    /// [`DecodeError::ConnectionClosed`] on a clean end of stream, any other variant
    /// when the request cannot be decoded. The connection should be dropped either way.
    pub fn decode(&mut self) -> Result<Decoded, DecodeError> {
        let line = loop {
            match self.read_line()? {
                None => return Err(DecodeError::ConnectionClosed),
                // Tolerate stray CRLF between requests
                Some(line) if line.is_empty() => continue,
                Some(line) => break line,
            }
        };

        let mut tokens = line.split_whitespace();
        let (Some(method), Some(target), Some(version)) =
            (tokens.next(), tokens.next(), tokens.next())
        else {
            return Err(DecodeError::MalformedRequestLine(line));
        };
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|_| DecodeError::MalformedRequestLine(line.clone()))?;
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (target, None),
        };

        if path == "/favicon.ico" {
            return Ok(Decoded::Favicon {
                version: version.to_string(),
            });
        }

        let mut req = Request::new(method, path, version);
        if let Some(query) = query {
            for (k, v) in parse_urlencoded(query) {
                req.add_query_param(&k, v);
            }
        }

        self.read_headers(&mut req)?;
        // Keep a caller-supplied correlation id when it is a valid ULID
        if let Some(incoming) = req.header_ignore_case("X-Request-ID") {
            let id = RequestId::from_header_or_new(Some(incoming));
            req.request_id = id;
        }
        self.read_body(&mut req)?;

        debug!(
            request_id = %req.request_id,
            method = %req.method,
            path = %req.path,
            headers = req.headers.len(),
            buffered = self.end - self.start,
            "Request decoded"
        );
        Ok(Decoded::Request(Box::new(req)))
    }

    fn read_headers(&mut self, req: &mut Request) -> Result<(), DecodeError> {
        loop {
            let line = self.read_line()?.ok_or(DecodeError::UnexpectedEof)?;
            if line.is_empty() {
                return Ok(());
            }
            let Some((name, value)) = line.split_once(':') else {
                return Err(DecodeError::MalformedHeader(line));
            };
            let name = name.trim_end();
            let value = value.trim();
            if name.eq_ignore_ascii_case("Cookie") {
                req.cookies.extend(parse_cookies(value));
            } else {
                if name.eq_ignore_ascii_case("Content-Length") {
                    // a repeated line with the same name would otherwise overwrite silently
                    if let Some(previous) = content_length(req)? {
                        if value.parse::<usize>().ok() != Some(previous) {
                            return Err(DecodeError::InvalidContentLength(format!(
                                "conflicting values {previous} and {value}"
                            )));
                        }
                    }
                }
                req.headers.insert(name.to_string(), value.to_string());
            }
        }
    }

    fn read_body(&mut self, req: &mut Request) -> Result<(), DecodeError> {
        let Some(length) = content_length(req)? else {
            return Ok(());
        };
        if length > self.config.max_body_bytes {
            return Err(DecodeError::BodyTooLarge {
                length,
                limit: self.config.max_body_bytes,
            });
        }
        let body = self.read_exact_body(length)?;
        if !has_body(&req.method) {
            // Consumed only to keep the stream framed
            return Ok(());
        }

        let content_type = req
            .header_ignore_case("Content-Type")
            .unwrap_or_default()
            .to_string();
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match mime.as_str() {
            "application/x-www-form-urlencoded" => {
                for (k, v) in parse_urlencoded(&String::from_utf8_lossy(&body)) {
                    req.add_attribute(k, v);
                }
            }
            "text/plain" | "application/json" => {
                req.body = Some(String::from_utf8_lossy(&body).into_owned());
            }
            "multipart/form-data" => {
                let boundary = multipart::parse_boundary(&content_type)?;
                for part in multipart::parse(&body, &boundary)? {
                    match part {
                        Part::Field { name, value } => req.add_attribute(name, value),
                        Part::File(file) => req.files.push(file),
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Read exactly `length` body bytes, leaving anything after them buffered.
    fn read_exact_body(&mut self, length: usize) -> Result<Vec<u8>, DecodeError> {
        let mut body = Vec::with_capacity(length.min(INITIAL_BODY_CAPACITY));
        while body.len() < length {
            if self.start == self.end && self.fill()? == 0 {
                return Err(DecodeError::UnexpectedEof);
            }
            let take = (length - body.len()).min(self.end - self.start);
            body.extend_from_slice(&self.buf[self.start..self.start + take]);
            self.start += take;
        }
        Ok(body)
    }

    /// One line without its `\n` (and trailing `\r`). `None` on end of stream before
    /// any byte of the line.
    fn read_line(&mut self) -> Result<Option<String>, DecodeError> {
        let mut line = Vec::new();
        loop {
            let Some(byte) = self.next_byte()? else {
                if line.is_empty() {
                    return Ok(None);
                }
                return Err(DecodeError::UnexpectedEof);
            };
            if byte == b'\n' {
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
            }
            if line.len() >= self.config.max_line_bytes {
                return Err(DecodeError::LineTooLong {
                    limit: self.config.max_line_bytes,
                });
            }
            line.push(byte);
        }
    }

    fn next_byte(&mut self) -> Result<Option<u8>, DecodeError> {
        if self.start == self.end && self.fill()? == 0 {
            return Ok(None);
        }
        let byte = self.buf[self.start];
        self.start += 1;
        Ok(Some(byte))
    }

    /// Refill the empty buffer; 0 means end of stream.
    fn fill(&mut self) -> Result<usize, DecodeError> {
        self.start = 0;
        self.end = 0;
        let mut idle: Option<Instant> = None;
        let mut retries = 0u32;
        loop {
            match self.source.read(&mut self.buf) {
                Ok(n) => {
                    self.end = n;
                    return Ok(n);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    let since = *idle.get_or_insert_with(Instant::now);
                    let waited = since.elapsed();
                    if waited >= Duration::from_millis(self.config.idle_timeout_ms) {
                        return Err(DecodeError::Idle { waited });
                    }
                    back_off(retries);
                    retries = retries.saturating_add(1);
                }
                Err(e) => return Err(DecodeError::Io(e)),
            }
        }
    }
}

/// Yield for the first few retries, then sleep with a doubling pause capped at
/// [`MAX_BACKOFF`]. Inside a coroutine both park only the coroutine.
fn back_off(retries: u32) {
    let in_coroutine = may::coroutine::is_coroutine();
    if retries < SPIN_YIELDS {
        if in_coroutine {
            may::coroutine::yield_now();
        } else {
            std::thread::yield_now();
        }
        return;
    }
    let shift = (retries - SPIN_YIELDS).min(6);
    let pause = Duration::from_millis(1u64 << shift).min(MAX_BACKOFF);
    if in_coroutine {
        may::coroutine::sleep(pause);
    } else {
        std::thread::sleep(pause);
    }
}

/// The declared body length. Every `Content-Length` header, in any letter case, must
/// carry the same value; disagreeing copies make the framing ambiguous.
fn content_length(req: &Request) -> Result<Option<usize>, DecodeError> {
    let mut length = None;
    for (name, value) in &req.headers {
        if !name.eq_ignore_ascii_case("Content-Length") {
            continue;
        }
        let parsed: usize = value
            .parse()
            .map_err(|_| DecodeError::InvalidContentLength(value.clone()))?;
        match length {
            Some(seen) if seen != parsed => {
                return Err(DecodeError::InvalidContentLength(format!(
                    "conflicting values {seen} and {parsed}"
                )));
            }
            _ => length = Some(parsed),
        }
    }
    Ok(length)
}

/// Serialize the response head: status line, `Content-Type`, headers in insertion
/// order, one `Set-Cookie` per cookie, blank line.
#[must_use]
pub fn encode(response: &Response) -> Vec<u8> {
    let mut head = String::with_capacity(256);
    head.push_str(&response.version);
    head.push(' ');
    head.push_str(&response.status.to_string());
    head.push(' ');
    head.push_str(response.reason);
    head.push_str("\r\n");

    head.push_str("Content-Type: ");
    head.push_str(&response.content_type);
    head.push_str("\r\n");

    for (name, value) in &response.headers {
        head.push_str(name);
        head.push_str(": ");
        head.push_str(value);
        head.push_str("\r\n");
    }

    for cookie in &response.cookies {
        head.push_str("Set-Cookie: ");
        head.push_str(&cookie.name);
        head.push('=');
        head.push_str(&cookie.value);
        if let Some(max_age) = cookie.max_age {
            head.push_str(";Max-Age=");
            head.push_str(&max_age.to_string());
        }
        if cookie.secure {
            head.push_str(";Secure");
        }
        head.push_str(";Path=/\r\n");
    }

    head.push_str("\r\n");
    head.into_bytes()
}

/// Write a complete response.
///
/// Structured bodies are serialized first so their length is known. `Content-Length`
/// is added for every sized body; a streamed body forces the connection closed.
/// Returns whether the connection may carry another request.
///
/// # Errors
///
/// Any write or stream-copy failure.
pub fn write_response<W: Write>(
    out: &mut W,
    mut response: Response,
    keep_alive: bool,
) -> io::Result<bool> {
    let body = std::mem::replace(&mut response.body, Body::Empty);
    let (sized, stream) = match body {
        Body::Empty => (Some(Vec::new()), None),
        Body::Bytes(bytes) => (Some(bytes), None),
        Body::Value(serde_json::Value::String(text)) => (Some(text.into_bytes()), None),
        Body::Value(value) => (Some(serde_json::to_vec(&value).map_err(io::Error::other)?), None),
        Body::Stream(reader) => (None, Some(reader)),
    };

    let handler_closes = response
        .header("Connection")
        .is_some_and(|v| v.eq_ignore_ascii_case("close"));
    let keep_alive = keep_alive && sized.is_some() && !handler_closes;
    if let Some(bytes) = &sized {
        response.set_header("Content-Length", bytes.len().to_string());
    }
    if !keep_alive {
        response.set_header("Connection", "close");
    }

    out.write_all(&encode(&response))?;
    if let Some(bytes) = sized {
        out.write_all(&bytes)?;
    }
    if let Some(mut reader) = stream {
        io::copy(&mut reader, out)?;
    }
    out.flush()?;
    Ok(keep_alive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::response::SetCookie;
    use std::io::Cursor;

    /// Reader that hands out one byte per call and reports `WouldBlock` in between.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        blocked: bool,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.pos >= self.data.len() {
                return Ok(0);
            }
            self.blocked = !self.blocked;
            if self.blocked {
                return Err(io::ErrorKind::WouldBlock.into());
            }
            buf[0] = self.data[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    fn decoder(raw: &[u8]) -> RequestDecoder<Cursor<Vec<u8>>> {
        RequestDecoder::new(Cursor::new(raw.to_vec()), CodecConfig::default())
    }

    fn request(decoded: Decoded) -> Request {
        match decoded {
            Decoded::Request(req) => *req,
            Decoded::Favicon { .. } => panic!("unexpected favicon"),
        }
    }

    #[test]
    fn test_request_line_tokens() {
        let req = request(
            decoder(b"GET /items/7?sort=asc&sort=desc&flag HTTP/1.1\r\n\r\n")
                .decode()
                .unwrap(),
        );
        assert_eq!(req.method, Method::GET);
        assert_eq!(req.path, "/items/7");
        assert_eq!(req.version, "HTTP/1.1");
        assert_eq!(req.query_param("sort"), Some("asc"));
        assert_eq!(req.query_param("flag"), Some(""));
    }

    #[test]
    fn test_trickled_source_with_would_block() {
        let raw = b"POST /f HTTP/1.1\r\nContent-Type: text/plain\r\nContent-Length: 5\r\n\r\nhello";
        let source = Trickle {
            data: raw.to_vec(),
            pos: 0,
            blocked: false,
        };
        let mut dec = RequestDecoder::new(source, CodecConfig::default());
        let req = request(dec.decode().unwrap());
        assert_eq!(req.body.as_deref(), Some("hello"));
    }

    #[test]
    fn test_header_whitespace_is_trimmed() {
        let req = request(
            decoder(b"GET / HTTP/1.1\r\nA:one\r\nB: two\r\nC:   three  \r\n\r\n")
                .decode()
                .unwrap(),
        );
        assert_eq!(req.header("A"), Some("one"));
        assert_eq!(req.header("B"), Some("two"));
        assert_eq!(req.header("C"), Some("three"));
    }

    #[test]
    fn test_cookie_header_is_not_a_header() {
        let req = request(
            decoder(b"GET / HTTP/1.1\r\nCookie: a=1; b = 2\r\n\r\n")
                .decode()
                .unwrap(),
        );
        assert!(req.header("Cookie").is_none());
        assert_eq!(req.cookie("a"), Some("1"));
        assert_eq!(req.cookie("b"), Some("2"));
    }

    #[test]
    fn test_incoming_request_id_is_kept() {
        let id = RequestId::new();
        let raw = format!("GET / HTTP/1.1\r\nx-request-id: {id}\r\n\r\n");
        let req = request(decoder(raw.as_bytes()).decode().unwrap());
        assert_eq!(req.request_id, id);

        let req = request(
            decoder(b"GET / HTTP/1.1\r\nX-Request-ID: not-a-ulid\r\n\r\n")
                .decode()
                .unwrap(),
        );
        assert_ne!(req.request_id.to_string(), "not-a-ulid");
    }

    #[test]
    fn test_conflicting_content_lengths_are_rejected() {
        for raw in [
            &b"POST /x HTTP/1.1\r\nContent-Length: 2\r\ncontent-length: 5\r\n\r\nhello"[..],
            &b"POST /x HTTP/1.1\r\nContent-Length: 5\r\nContent-Length: 2\r\n\r\nhello"[..],
        ] {
            for _ in 0..20 {
                let err = decoder(raw).decode().unwrap_err();
                assert!(matches!(err, DecodeError::InvalidContentLength(_)), "{err}");
            }
        }
    }

    #[test]
    fn test_repeated_matching_content_length_is_accepted() {
        let raw = b"POST /x HTTP/1.1\r\nContent-Type: text/plain\r\nContent-Length: 5\r\ncontent-length: 5\r\n\r\nhello";
        let req = request(decoder(raw).decode().unwrap());
        assert_eq!(req.body.as_deref(), Some("hello"));
    }

    #[test]
    fn test_body_beyond_initial_capacity_grows() {
        let body = "a".repeat(INITIAL_BODY_CAPACITY + 4_464);
        let raw = format!(
            "POST /big HTTP/1.1\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        );
        let req = request(decoder(raw.as_bytes()).decode().unwrap());
        assert_eq!(req.body.map(|b| b.len()), Some(body.len()));

        let err = decoder(b"POST /big HTTP/1.1\r\nContent-Length: 9000000\r\n\r\nshort")
            .decode()
            .unwrap_err();
        assert!(matches!(err, DecodeError::UnexpectedEof));
    }

    /// Source that never has data ready.
    struct Stalled;

    impl Read for Stalled {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::ErrorKind::WouldBlock.into())
        }
    }

    #[test]
    fn test_stalled_source_times_out() {
        let config = CodecConfig {
            idle_timeout_ms: 30,
            ..CodecConfig::default()
        };
        let started = Instant::now();
        let err = RequestDecoder::new(Stalled, config).decode().unwrap_err();
        match err {
            DecodeError::Idle { waited } => assert!(waited >= Duration::from_millis(30)),
            other => panic!("expected idle timeout, got {other}"),
        }
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_status_outside_common_set_keeps_its_reason() {
        let mut res = Response::new("HTTP/1.1");
        res.set_status(422);
        let head = String::from_utf8(encode(&res)).unwrap();
        assert!(head.starts_with("HTTP/1.1 422 Unprocessable Entity\r\n"), "{head}");

        res.set_status(429);
        let head = String::from_utf8(encode(&res)).unwrap();
        assert!(head.starts_with("HTTP/1.1 429 Too Many Requests\r\n"), "{head}");

        res.set_status(599);
        let head = String::from_utf8(encode(&res)).unwrap();
        assert!(head.starts_with("HTTP/1.1 599 Unknown\r\n"), "{head}");
    }

    #[test]
    fn test_short_request_line() {
        let err = decoder(b"GET /\r\n\r\n").decode().unwrap_err();
        assert!(matches!(err, DecodeError::MalformedRequestLine(_)));
    }

    #[test]
    fn test_header_without_colon() {
        let err = decoder(b"GET / HTTP/1.1\r\nNoColon\r\n\r\n")
            .decode()
            .unwrap_err();
        assert!(matches!(err, DecodeError::MalformedHeader(_)));
    }

    #[test]
    fn test_empty_stream_is_a_quiet_close() {
        let err = decoder(b"").decode().unwrap_err();
        assert!(matches!(err, DecodeError::ConnectionClosed));
    }

    #[test]
    fn test_truncated_body() {
        let err = decoder(b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc")
            .decode()
            .unwrap_err();
        assert!(matches!(err, DecodeError::UnexpectedEof));
    }

    #[test]
    fn test_invalid_and_oversized_content_length() {
        let err = decoder(b"POST / HTTP/1.1\r\nContent-Length: ten\r\n\r\n")
            .decode()
            .unwrap_err();
        assert!(matches!(err, DecodeError::InvalidContentLength(_)));

        let config = CodecConfig {
            max_body_bytes: 4,
            ..CodecConfig::default()
        };
        let mut dec = RequestDecoder::new(
            Cursor::new(b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello".to_vec()),
            config,
        );
        assert!(matches!(
            dec.decode().unwrap_err(),
            DecodeError::BodyTooLarge { length: 5, limit: 4 }
        ));
    }

    #[test]
    fn test_line_too_long() {
        let config = CodecConfig {
            max_line_bytes: 16,
            ..CodecConfig::default()
        };
        let mut dec = RequestDecoder::new(
            Cursor::new(b"GET /a-very-long-path-indeed HTTP/1.1\r\n\r\n".to_vec()),
            config,
        );
        assert!(matches!(
            dec.decode().unwrap_err(),
            DecodeError::LineTooLong { limit: 16 }
        ));
    }

    #[test]
    fn test_favicon_short_circuit() {
        match decoder(b"GET /favicon.ico HTTP/1.0\r\nHost: x\r\n\r\n")
            .decode()
            .unwrap()
        {
            Decoded::Favicon { version } => assert_eq!(version, "HTTP/1.0"),
            Decoded::Request(_) => panic!("expected favicon"),
        }
    }

    #[test]
    fn test_small_buffer_still_decodes() {
        let config = CodecConfig {
            buffer_size: 3,
            ..CodecConfig::default()
        };
        let raw = b"POST /f HTTP/1.1\r\nContent-Type: application/json\r\nContent-Length: 8\r\n\r\n{\"a\":1}\n";
        let mut dec = RequestDecoder::new(Cursor::new(raw.to_vec()), config);
        let req = request(dec.decode().unwrap());
        assert_eq!(req.body.as_deref(), Some("{\"a\":1}\n"));
    }

    #[test]
    fn test_encode_head() {
        let mut res = Response::new("HTTP/1.1");
        res.set_content_type("text/plain; charset=utf-8");
        res.set_header("X-One", "1");
        res.add_cookie(SetCookie::new("sid", "abc").max_age(60).secure(true));
        res.add_cookie(SetCookie::new("plain", "v"));
        let head = String::from_utf8(encode(&res)).unwrap();
        assert_eq!(
            head,
            "HTTP/1.1 200 OK\r\n\
             Content-Type: text/plain; charset=utf-8\r\n\
             X-One: 1\r\n\
             Set-Cookie: sid=abc;Max-Age=60;Secure;Path=/\r\n\
             Set-Cookie: plain=v;Path=/\r\n\
             \r\n"
        );
    }

    #[test]
    fn test_write_response_sized_and_streamed() {
        let mut res = Response::new("HTTP/1.1");
        res.set_body(Body::Value(serde_json::json!({"ok": true})));
        let mut out = Vec::new();
        assert!(write_response(&mut out, res, true).unwrap());
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Content-Length: 11\r\n"));
        assert!(text.ends_with("\r\n\r\n{\"ok\":true}"));

        let mut res = Response::new("HTTP/1.1");
        res.set_body(Body::Stream(Box::new(Cursor::new(b"raw".to_vec()))));
        let mut out = Vec::new();
        assert!(!write_response(&mut out, res, true).unwrap());
        let text = String::from_utf8(out).unwrap();
        assert!(!text.contains("Content-Length"));
        assert!(text.contains("Connection: close\r\n"));
        assert!(text.ends_with("\r\n\r\nraw"));
    }

    #[test]
    fn test_handler_connection_close_ends_keep_alive() {
        let mut res = Response::new("HTTP/1.1");
        res.set_header("connection", "Close");
        res.set_body(Body::Bytes(b"bye".to_vec()));
        let mut out = Vec::new();
        assert!(!write_response(&mut out, res, true).unwrap());
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches("onnection:").count(), 1, "{text}");
        assert!(text.contains("Content-Length: 3\r\n"));
    }
}
