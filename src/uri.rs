//! URI escaping and resolution helpers.
//!
//! Feed documents are full of half-escaped, relative, or outright broken
//! URLs. [`sanitize`] brings an untrusted URL into a form safe to fetch or
//! embed without destroying information: octets that are already
//! percent-encoded stay exactly as they are, even when they are not valid
//! UTF-8 (some feeds encode legacy charsets into query strings).
//! [`build_url`] resolves a possibly relative reference against a base URL.

use percent_encoding::percent_encode_byte;
use url::Url;

/// Sanitizes an untrusted URL.
///
/// Escapes whitespace and non-ASCII characters (UTF-8 percent-encoding) and
/// nothing else. Existing `%XX` escapes are preserved as-is; a stray `%` that
/// is not followed by two hex digits is escaped to `%25`. The operation is
/// idempotent.
pub fn sanitize(uri: &str) -> String {
    let bytes = uri.as_bytes();
    let mut out = String::with_capacity(uri.len());
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'%' => {
                // Keep valid escapes untouched, they may encode non-UTF-8 octets.
                if i + 2 < bytes.len()
                    && bytes[i + 1].is_ascii_hexdigit()
                    && bytes[i + 2].is_ascii_hexdigit()
                {
                    out.push_str(&uri[i..i + 3]);
                    i += 3;
                    continue;
                }
                out.push_str("%25");
            }
            b' ' | b'\t' | b'\n' | b'\r' => out.push_str(percent_encode_byte(b)),
            _ if b < 0x80 => out.push(b as char),
            _ => out.push_str(percent_encode_byte(b)),
        }
        i += 1;
    }

    out
}

/// Resolves `rel` against `base`, escaping both first.
///
/// Returns the absolute URL, or the escaped `rel` unchanged when `base` is
/// absent or unparsable (matching the tolerant behavior expected from feed
/// content: a bad base must not lose the link entirely).
pub fn build_url(rel: &str, base: Option<&str>) -> String {
    let escaped = sanitize(rel);

    let Some(base) = base else {
        return escaped;
    };

    match Url::parse(&sanitize(base)) {
        Ok(base_url) => match base_url.join(&escaped) {
            Ok(resolved) => resolved.into(),
            Err(_) => escaped,
        },
        Err(_) => escaped,
    }
}

/// True when the string carries a URI scheme (`http://`, `file://`, ...).
pub(crate) fn has_scheme(uri: &str) -> bool {
    uri.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_passthrough() {
        assert_eq!(
            sanitize("https://example.com/?abc=123&def=15"),
            "https://example.com/?abc=123&def=15"
        );
        assert_eq!(
            sanitize("https://example.com/?abc=1+2"),
            "https://example.com/?abc=1+2"
        );
    }

    #[test]
    fn test_sanitize_spaces() {
        assert_eq!(
            sanitize("https://example.com/?abc=1 2"),
            "https://example.com/?abc=1%202"
        );
    }

    #[test]
    fn test_sanitize_keeps_encoded_non_utf8() {
        // Latin-2 octets already percent-encoded must not be decoded or
        // double-encoded.
        assert_eq!(
            sanitize("https://example.com/?szukaj=%AF%F3%B3ty%20dom"),
            "https://example.com/?szukaj=%AF%F3%B3ty%20dom"
        );
    }

    #[test]
    fn test_sanitize_umlauts_and_quotes() {
        assert_eq!(
            sanitize("https://example.com/?abc=äöü&def=?'\""),
            "https://example.com/?abc=%C3%A4%C3%B6%C3%BC&def=?'\""
        );
    }

    #[test]
    fn test_sanitize_idempotent() {
        for input in [
            "https://example.com/?abc=1 2",
            "https://example.com/?abc=äöü",
            "https://example.com/?szukaj=%AF%F3%B3ty%20dom",
            "https://example.com/100%",
        ] {
            let once = sanitize(input);
            assert_eq!(sanitize(&once), once, "input: {:?}", input);
        }
    }

    #[test]
    fn test_sanitize_stray_percent() {
        assert_eq!(sanitize("https://example.com/100%"), "https://example.com/100%25");
    }

    #[test]
    fn test_build_url_resolution() {
        assert_eq!(
            build_url("/news", Some("https://example.com/a/b")),
            "https://example.com/news"
        );
        assert_eq!(
            build_url("img.png", Some("https://example.com/a/")),
            "https://example.com/a/img.png"
        );
        assert_eq!(
            build_url("https://other.org/x", Some("https://example.com/")),
            "https://other.org/x"
        );
    }

    #[test]
    fn test_build_url_without_base() {
        assert_eq!(build_url("foo bar", None), "foo%20bar");
        assert_eq!(build_url("relative/path", Some("not a url")), "relative/path");
    }
}
