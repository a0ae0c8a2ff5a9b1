//! Turn an HTTP request target into the argument vector handed to the wrapped tool.
//!
//! Two encodings are accepted:
//! - query form: `?url=https://host/x&q=best` becomes `--url https://host/x --default-stream best`
//! - base64 form: a URL-safe base64 token holding a shell-quoted command line
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;

use crate::errors::DecodeError;

/// URL-safe alphabet; accepts tokens with or without `=` padding.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Query key kept for old playlists; renamed before launch.
const QUALITY_ALIAS: &str = "q";
const QUALITY_KEY: &str = "default-stream";

/// Ordered argument list for one request. Never reordered or deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArgumentList {
    /// Program named by the request; `None` means the configured default tool.
    pub program: Option<String>,
    pub args: Vec<String>,
}

impl ArgumentList {
    /// Build from an `application/x-www-form-urlencoded` query string (without the leading `?`).
    ///
    /// Keys and values are unescaped once. Every pair is kept, an empty value included.
    pub fn from_query(query: &str) -> Self {
        let mut args = Vec::new();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            let key = if key == QUALITY_ALIAS {
                QUALITY_KEY
            } else {
                key.as_ref()
            };
            args.push(format!("--{key}"));
            args.push(value.into_owned());
        }
        ArgumentList {
            program: None,
            args,
        }
    }

    /// Build from a URL-safe base64 token holding a shell-quoted command line.
    pub fn from_base64(token: &str) -> Result<Self, DecodeError> {
        let bytes = URL_SAFE_LENIENT.decode(token.trim())?;
        let line = String::from_utf8(bytes)?;
        let mut tokens = shlex::split(&line).ok_or(DecodeError::UnterminatedQuote)?;
        if tokens.is_empty() {
            return Err(DecodeError::Empty);
        }
        let program = if looks_like_program(&tokens[0]) {
            Some(tokens.remove(0))
        } else {
            None
        };
        Ok(ArgumentList {
            program,
            args: tokens,
        })
    }

    /// Inverse of `from_query` for lists made of `--key value` pairs.
    pub fn to_query_string(&self) -> String {
        self.args
            .chunks(2)
            .filter_map(|pair| match pair {
                [flag, value] => {
                    let key = flag.trim_start_matches("--");
                    Some(format!(
                        "{}={}",
                        urlencoding::encode(key),
                        urlencoding::encode(value)
                    ))
                }
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("&")
    }

}

/// A bare command name (`streamlink`, `yt-dlp`) or an explicit path. Schemeless
/// stream URLs such as `twitch.tv/channel` stay arguments.
fn looks_like_program(token: &str) -> bool {
    if token.starts_with('/') || token.starts_with("./") {
        return true;
    }
    !token.is_empty() && !token.starts_with('-') && !token.contains(['.', '/', ':'])
}

/// Encode a command line the way `/base64/` URLs carry it (URL-safe, padded).
pub fn encode_command_line(line: &str) -> String {
    URL_SAFE_LENIENT.encode(line.as_bytes())
}
