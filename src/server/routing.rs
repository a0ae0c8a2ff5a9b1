//! Request target classification. Pure: no decoding, no side effects.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Query-encoded arguments, stream inline.
    Play { query: String },
    /// Query-encoded arguments, answer 301 with the resolved stream URL.
    Redirect { query: String },
    /// Base64-encoded command line, stream inline.
    Base64 { token: String },
    NotFound,
}

const PLAY_PREFIXES: &[&str] = &["/play/", "/streamlink/"];
const REDIRECT_PREFIXES: &[&str] = &["/301/", "/streamlink_301/"];
const BASE64_PREFIX: &str = "/base64/";

pub fn classify(path: &str, query: &str) -> Route {
    if PLAY_PREFIXES.iter().any(|p| path.starts_with(p)) {
        return Route::Play {
            query: query.to_string(),
        };
    }
    if REDIRECT_PREFIXES.iter().any(|p| path.starts_with(p)) {
        return Route::Redirect {
            query: query.to_string(),
        };
    }
    if let Some(rest) = path.strip_prefix(BASE64_PREFIX) {
        let token = rest.strip_suffix('/').unwrap_or(rest);
        return Route::Base64 {
            token: token.to_string(),
        };
    }
    Route::NotFound
}

impl Route {
    pub fn name(&self) -> &'static str {
        match self {
            Route::Play { .. } => "play",
            Route::Redirect { .. } => "redirect",
            Route::Base64 { .. } => "base64",
            Route::NotFound => "not-found",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_prefixes() {
        let q = "url=https://e.test&q=best";
        for p in ["/play/", "/streamlink/", "/play/anything"] {
            assert_eq!(
                classify(p, q),
                Route::Play { query: q.into() },
                "{p}"
            );
        }
        for p in ["/301/", "/streamlink_301/"] {
            assert_eq!(classify(p, q), Route::Redirect { query: q.into() }, "{p}");
        }
    }

    #[test]
    fn test_classify_base64_strips_one_trailing_slash() {
        assert_eq!(
            classify("/base64/c3RyZWFtbGluaw==/", ""),
            Route::Base64 {
                token: "c3RyZWFtbGluaw==".into()
            }
        );
        assert_eq!(
            classify("/base64/abc", ""),
            Route::Base64 { token: "abc".into() }
        );
        assert_eq!(
            classify("/base64/abc//", ""),
            Route::Base64 { token: "abc/".into() }
        );
    }

    #[test]
    fn test_classify_unknown_paths() {
        for p in ["/", "/play", "/PLAY/", "/favicon.ico", "/301", "/base64"] {
            assert_eq!(classify(p, ""), Route::NotFound, "{p}");
        }
    }
}
