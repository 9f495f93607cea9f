//! `multipart/form-data` body splitting.
//!
//! The whole body is already in memory (bounded by the codec's `max_body_bytes`), so
//! parsing is a single pass over a byte slice: find each `--boundary` delimiter, read
//! the part headers up to the blank line, and take everything up to the CRLF that
//! precedes the next delimiter as the part's content.

use std::collections::HashMap;
use std::fmt;

/// A file part from a multipart body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Form field name from `Content-Disposition`
    pub field_name: String,
    /// Client-side file name
    pub file_name: String,
    /// Declared part content type, `application/octet-stream` when absent
    pub content_type: String,
    pub data: Vec<u8>,
}

impl UploadedFile {
    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// A parsed part: either a plain form field or a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Field { name: String, value: String },
    File(UploadedFile),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultipartError {
    MissingBoundary,
    MissingContentDisposition,
    MissingName,
    UnexpectedEof,
    InvalidFormat(&'static str),
}

impl fmt::Display for MultipartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingBoundary => write!(f, "missing boundary in multipart Content-Type"),
            Self::MissingContentDisposition => {
                write!(f, "missing Content-Disposition header in part")
            }
            Self::MissingName => write!(f, "Content-Disposition without a name parameter"),
            Self::UnexpectedEof => write!(f, "unexpected end of multipart data"),
            Self::InvalidFormat(detail) => write!(f, "invalid multipart format: {detail}"),
        }
    }
}

impl std::error::Error for MultipartError {}

/// Extract the boundary parameter from a `multipart/form-data` content type.
///
/// # Errors
///
/// [`MultipartError::MissingBoundary`] when there is no non-empty `boundary=`.
pub fn parse_boundary(content_type: &str) -> Result<String, MultipartError> {
    content_type
        .split(';')
        .map(str::trim)
        .find_map(|param| {
            let (key, value) = param.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("boundary")
                .then(|| unquote(value).to_string())
        })
        .filter(|b| !b.is_empty())
        .ok_or(MultipartError::MissingBoundary)
}

/// Split a multipart body into parts.
///
/// # Errors
///
/// Any [`MultipartError`] describing the first structural problem found.
pub fn parse(body: &[u8], boundary: &str) -> Result<Vec<Part>, MultipartError> {
    let delimiter = format!("--{boundary}").into_bytes();
    let mut parts = Vec::new();
    let mut pos = find(body, &delimiter, 0).ok_or(MultipartError::UnexpectedEof)?;

    loop {
        pos += delimiter.len();
        if body[pos..].starts_with(b"--") {
            return Ok(parts);
        }
        if !body[pos..].starts_with(b"\r\n") {
            return Err(MultipartError::InvalidFormat("expected CRLF after boundary"));
        }
        pos += 2;

        let (headers, content_start) = parse_part_headers(body, pos)?;
        let disposition = headers
            .get("content-disposition")
            .ok_or(MultipartError::MissingContentDisposition)?;
        let (name, file_name) = parse_content_disposition(disposition)?;

        let next = find(body, &delimiter, content_start).ok_or(MultipartError::UnexpectedEof)?;
        let content_end = if next >= content_start + 2 && &body[next - 2..next] == b"\r\n" {
            next - 2
        } else {
            next
        };
        let data = body[content_start..content_end].to_vec();

        parts.push(match file_name {
            Some(file_name) => Part::File(UploadedFile {
                field_name: name,
                file_name,
                content_type: headers
                    .get("content-type")
                    .cloned()
                    .unwrap_or_else(|| "application/octet-stream".to_string()),
                data,
            }),
            None => Part::Field {
                name,
                value: String::from_utf8_lossy(&data).into_owned(),
            },
        });
        pos = next;
    }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}

fn parse_part_headers(
    body: &[u8],
    mut pos: usize,
) -> Result<(HashMap<String, String>, usize), MultipartError> {
    let mut headers = HashMap::new();
    loop {
        let line_end = find(body, b"\r\n", pos).ok_or(MultipartError::UnexpectedEof)?;
        let line = &body[pos..line_end];
        pos = line_end + 2;
        if line.is_empty() {
            return Ok((headers, pos));
        }
        let line = std::str::from_utf8(line)
            .map_err(|_| MultipartError::InvalidFormat("invalid UTF-8 in part header"))?;
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }
}

/// `form-data; name="field"; filename="file.txt"` → (name, filename)
fn parse_content_disposition(value: &str) -> Result<(String, Option<String>), MultipartError> {
    let mut name = None;
    let mut file_name = None;
    for param in value.split(';').map(str::trim) {
        if let Some((key, val)) = param.split_once('=') {
            match key.trim().to_ascii_lowercase().as_str() {
                "name" => name = Some(unquote(val).to_string()),
                "filename" => file_name = Some(unquote(val).to_string()),
                _ => {}
            }
        }
    }
    Ok((name.ok_or(MultipartError::MissingName)?, file_name))
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    s.strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(s)
}
