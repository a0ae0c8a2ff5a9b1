#![allow(clippy::module_name_repetitions)]
//! Small utilities: shell quoting, header scanning, request ids, bounded subprocess execution.

pub mod exec;
pub mod id;

pub fn shell_join(args: &[String]) -> String {
    args.iter()
        .map(|a| shell_escape(a))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn shell_escape(s: &str) -> String {
    if s.is_empty() {
        "''".to_string()
    } else if s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_=./:@,".contains(c))
    {
        s.to_string()
    } else {
        let escaped = s.replace('\'', "'\"'\"'");
        format!("'{}'", escaped)
    }
}

pub fn find_crlfcrlf(buf: &[u8]) -> Option<usize> {
    if buf.len() < 4 {
        return None;
    }
    let pattern: &[u8; 4] = b"\r\n\r\n";
    buf.windows(4).position(|w| w == pattern)
}

/// Find end of HTTP headers, accepting either CRLF-CRLF or LF-LF separators.
/// Returns the index just after the header terminator when found.
pub fn find_header_end(buf: &[u8]) -> Option<usize> {
    if let Some(pos) = find_crlfcrlf(buf) {
        return Some(pos + 4);
    }
    buf.windows(2).position(|w| w == b"\n\n").map(|pos| pos + 2)
}

/// Split a byte buffer at the last newline; returns (complete lines, remainder).
pub fn split_complete_lines(buf: &[u8]) -> (&[u8], &[u8]) {
    match buf.iter().rposition(|b| *b == b'\n') {
        Some(pos) => buf.split_at(pos + 1),
        None => (&[], buf),
    }
}
