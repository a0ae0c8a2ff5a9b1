/*!
HTTP/1.x helpers for LiveProxy: tolerant request-head parsing and fixed response shapes.

Only the request head is read (no request bodies are expected); both CRLFCRLF and LFLF
terminators are accepted and the head is capped at 64 KiB. The request target keeps its
original case because base64 tokens are case-sensitive.
*/

use crate::util::find_header_end;
use std::collections::HashMap;
use std::io::{self, Read, Write};

pub const SERVER_NAME: &str = "LiveProxy";
const HDR_CAP: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Other(String),
}

/// Simple case-insensitive header map (keys lowercased)
pub type HeaderMap = HashMap<String, String>;

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    /// Target path without the query, exactly as sent.
    pub path: String,
    /// Raw query string without the leading `?`; empty when absent.
    pub query: String,
    pub headers: HeaderMap,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn user_agent(&self) -> &str {
        self.header("user-agent").unwrap_or("-")
    }
}

/// Read and parse one request head from `reader`.
pub fn read_http_request<R: Read>(reader: &mut R) -> io::Result<HttpRequest> {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 1024];
    let mut header_end: Option<usize> = None;

    while header_end.is_none() {
        if buf.len() >= HDR_CAP {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "request head exceeds 64 KiB",
            ));
        }
        let n = reader.read(&mut tmp)?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&tmp[..n]);
        header_end = find_header_end(&buf);
    }

    // A client that closes after the request line still gets an answer.
    let head = &buf[..header_end.unwrap_or(buf.len())];
    let text = String::from_utf8_lossy(head);
    let mut lines = text.lines();
    let request_line = lines.next().unwrap_or_default().trim();
    if request_line.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed before a request line was received",
        ));
    }
    let (method, path, query) = parse_request_line(request_line)?;
    Ok(HttpRequest {
        method,
        path,
        query,
        headers: parse_headers(lines),
    })
}

fn parse_headers<'a, I: Iterator<Item = &'a str>>(lines: I) -> HeaderMap {
    let mut map = HeaderMap::new();
    for line in lines {
        if let Some((k, v)) = line.split_once(':') {
            map.insert(k.trim().to_ascii_lowercase(), v.trim().to_string());
        }
    }
    map
}

fn parse_request_line(request_line: &str) -> io::Result<(Method, String, String)> {
    let mut parts = request_line.split_whitespace();
    let method = match parts.next().unwrap_or("").to_ascii_uppercase().as_str() {
        "GET" => Method::Get,
        "HEAD" => Method::Head,
        other => Method::Other(other.to_string()),
    };
    let target = parts.next().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidData, "request line has no target")
    })?;
    let (path, query) = match target.split_once('?') {
        Some((p, q)) => (p, q),
        None => (target, ""),
    };
    Ok((method, path.to_string(), query.to_string()))
}

/// Status line and headers for a streamed media body. No Content-Length; the body ends
/// when the connection closes.
pub fn write_stream_prelude<W: Write>(w: &mut W) -> io::Result<()> {
    let hdr = format!(
        "HTTP/1.1 200 OK\r\nServer: {SERVER_NAME}\r\nContent-Type: video/unknown\r\nConnection: close\r\n\r\n"
    );
    w.write_all(hdr.as_bytes())?;
    w.flush()
}

pub fn write_not_found<W: Write>(w: &mut W) -> io::Result<()> {
    let hdr = format!(
        "HTTP/1.1 404 Not Found\r\nServer: {SERVER_NAME}\r\nContent-Type: text/html\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
    );
    w.write_all(hdr.as_bytes())?;
    w.flush()
}

pub fn write_redirect<W: Write>(w: &mut W, location: &str) -> io::Result<()> {
    // Location must stay on one header line.
    let location: String = location.chars().filter(|c| *c != '\r' && *c != '\n').collect();
    let hdr = format!(
        "HTTP/1.1 301 Moved Permanently\r\nServer: {SERVER_NAME}\r\nContent-Type: text/html\r\nLocation: {location}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
    );
    w.write_all(hdr.as_bytes())?;
    w.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_request_keeps_path_case_and_raw_query() {
        let raw = b"GET /base64/QWJj/?x=1 HTTP/1.1\r\nHost: localhost\r\nUser-Agent: VLC/3.0\r\n\r\n";
        let req = read_http_request(&mut &raw[..]).unwrap();
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.path, "/base64/QWJj/");
        assert_eq!(req.query, "x=1");
        assert_eq!(req.user_agent(), "VLC/3.0");
        assert_eq!(req.header("HOST"), Some("localhost"));
    }

    #[test]
    fn test_read_request_lf_only_and_head_method() {
        let raw = b"HEAD /play/ HTTP/1.0\nAccept: */*\n\n";
        let req = read_http_request(&mut &raw[..]).unwrap();
        assert_eq!(req.method, Method::Head);
        assert_eq!(req.path, "/play/");
        assert_eq!(req.query, "");
        assert_eq!(req.user_agent(), "-");
    }

    #[test]
    fn test_read_request_rejects_empty_and_oversized() {
        assert!(read_http_request(&mut &b""[..]).is_err());
        let mut big = b"GET /play/?".to_vec();
        big.extend(std::iter::repeat(b'a').take(HDR_CAP + 10));
        assert_eq!(
            read_http_request(&mut &big[..]).unwrap_err().kind(),
            io::ErrorKind::InvalidData
        );
    }

    #[test]
    fn test_response_shapes() {
        let mut out = Vec::new();
        write_not_found(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.contains("Server: LiveProxy\r\n"));
        assert!(text.contains("Connection: close\r\n"));

        let mut out = Vec::new();
        write_redirect(&mut out, "https://cdn.test/a.m3u8\r\nX-Evil: 1").unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 301 Moved Permanently\r\n"));
        assert!(text.contains("Location: https://cdn.test/a.m3u8X-Evil: 1\r\n"));

        let mut out = Vec::new();
        write_stream_prelude(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Content-Type: video/unknown\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }
}
