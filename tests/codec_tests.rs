//! Integration tests for the request decoder
//!
//! # Test Coverage
//!
//! - Exactly `Content-Length` bytes are consumed; the next request stays buffered
//! - Form attributes keep their first occurrence
//! - Multipart bodies yield attributes and uploaded files
//! - Bodies on methods without a body are consumed but not decoded
//! - Unknown content types are discarded

use brrtserve::server::{CodecConfig, DecodeError, Decoded, Request, RequestDecoder};
use http::Method;
use std::io::Cursor;

fn decoder(raw: &[u8]) -> RequestDecoder<Cursor<Vec<u8>>> {
    RequestDecoder::new(Cursor::new(raw.to_vec()), CodecConfig::default())
}

fn next(dec: &mut RequestDecoder<Cursor<Vec<u8>>>) -> Request {
    match dec.decode().unwrap() {
        Decoded::Request(req) => *req,
        Decoded::Favicon { .. } => panic!("unexpected favicon"),
    }
}

#[test]
fn test_content_length_leaves_following_bytes() {
    let raw = b"POST /login HTTP/1.1\r\n\
Content-Type: application/x-www-form-urlencoded\r\n\
Content-Length: 19\r\n\
\r\n\
user=ann&user=bob&xGET /next HTTP/1.1\r\n\r\n";
    let mut dec = decoder(raw);

    let first = next(&mut dec);
    assert_eq!(first.method, Method::POST);
    assert_eq!(first.attribute("user"), Some("ann"));
    assert_eq!(first.attribute("x"), Some(""));
    assert!(first.body.is_none());
    assert!(dec.buffered().starts_with(b"GET /next"));

    let second = next(&mut dec);
    assert_eq!(second.path, "/next");
    assert!(matches!(dec.decode(), Err(DecodeError::ConnectionClosed)));
}

#[test]
fn test_percent_decoded_form() {
    let body = "q=caf%C3%A9+au+lait&tag=a%26b";
    let raw = format!(
        "POST /search HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded; charset=UTF-8\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );
    let req = next(&mut decoder(raw.as_bytes()));
    assert_eq!(req.attribute("q"), Some("café au lait"));
    assert_eq!(req.attribute("tag"), Some("a&b"));
}

#[test]
fn test_json_body_is_kept_raw() {
    let body = r#"{"name":"Rex"}"#;
    let raw = format!(
        "PUT /pets/1 HTTP/1.1\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );
    let req = next(&mut decoder(raw.as_bytes()));
    assert_eq!(req.method, Method::PUT);
    assert_eq!(req.body.as_deref(), Some(body));
    assert!(req.attributes.is_empty());
}

#[test]
fn test_multipart_upload() {
    let body = "--XyZ\r\n\
Content-Disposition: form-data; name=\"note\"\r\n\
\r\n\
holiday\r\n\
--XyZ\r\n\
Content-Disposition: form-data; name=\"upload\"; filename=\"beach.txt\"\r\n\
Content-Type: text/plain\r\n\
\r\n\
sand and sea\r\n\
--XyZ--\r\n";
    let raw = format!(
        "POST /api/upload HTTP/1.1\r\nContent-Type: multipart/form-data; boundary=XyZ\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );
    let req = next(&mut decoder(raw.as_bytes()));
    assert_eq!(req.attribute("note"), Some("holiday"));
    let file = req.file("upload").unwrap();
    assert_eq!(file.file_name, "beach.txt");
    assert_eq!(file.content_type, "text/plain");
    assert_eq!(file.data, b"sand and sea");
    assert_eq!(file.size(), 12);
}

#[test]
fn test_body_on_get_is_skipped_but_consumed() {
    let raw = b"GET /a HTTP/1.1\r\nContent-Type: text/plain\r\nContent-Length: 4\r\n\r\nbodyGET /b HTTP/1.1\r\n\r\n";
    let mut dec = decoder(raw);
    let first = next(&mut dec);
    assert!(first.body.is_none());
    assert_eq!(next(&mut dec).path, "/b");
}

#[test]
fn test_unknown_content_type_is_discarded() {
    let raw = b"POST /a HTTP/1.1\r\nContent-Type: application/xml\r\nContent-Length: 7\r\n\r\n<a></a>";
    let req = next(&mut decoder(raw));
    assert!(req.body.is_none());
    assert!(req.attributes.is_empty());
    assert!(req.files.is_empty());
}

#[test]
fn test_leading_blank_lines_are_skipped() {
    let req = next(&mut decoder(b"\r\n\r\nDELETE /items/3 HTTP/1.1\r\n\r\n"));
    assert_eq!(req.method, Method::DELETE);
    assert_eq!(req.path, "/items/3");
}

#[test]
fn test_torn_down_mid_headers() {
    let err = decoder(b"GET /a HTTP/1.1\r\nHost: x").decode().unwrap_err();
    assert!(matches!(err, DecodeError::UnexpectedEof));
}
