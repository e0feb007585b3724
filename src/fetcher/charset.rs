//! Response body decoding.
//!
//! Decoder selection order: explicit charset in the Content-Type header,
//! a `<meta charset>` / `<meta http-equiv>` declaration scanned in the
//! first 4 KB of the body, then UTF-8 with replacement. Binary media
//! types are never decoded.

use encoding_rs::{Encoding, UTF_8};
use once_cell::sync::Lazy;
use regex::Regex;

/// How much of the body to scan for a meta charset declaration
const META_SCAN_BYTES: usize = 4096;

static META_CHARSET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?\s*([\w-]+)"#)
        .expect("meta charset regex is valid")
});

/// Whether a media type carries text that should be decoded.
#[must_use]
pub fn is_textual(media_type: &str) -> bool {
    media_type.starts_with("text/")
        || media_type.ends_with("+xml")
        || media_type.ends_with("+json")
        || matches!(
            media_type,
            "application/xml"
                | "application/json"
                | "application/javascript"
                | "application/xhtml+xml"
        )
}

/// Charset parameter from a Content-Type header value, if present.
#[must_use]
pub fn charset_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("charset") {
            Some(value.trim().trim_matches('"').to_ascii_lowercase())
        } else {
            None
        }
    })
}

/// Media type with parameters stripped, lower-cased.
#[must_use]
pub fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

fn sniff_meta_charset(body: &[u8]) -> Option<String> {
    let head = &body[..body.len().min(META_SCAN_BYTES)];
    // Every byte is valid latin-1, so the scan itself cannot fail
    let snippet: String = head.iter().map(|&b| b as char).collect();
    META_CHARSET
        .captures(&snippet)
        .map(|c| c[1].to_ascii_lowercase())
}

/// Decode `body` into text, reporting the charset that was used.
///
/// Unknown charset labels fall back to UTF-8; undecodable byte sequences
/// become replacement characters rather than errors.
#[must_use]
pub fn decode(body: &[u8], header_charset: Option<&str>) -> (String, String) {
    let label = header_charset
        .map(str::to_string)
        .or_else(|| sniff_meta_charset(body))
        .unwrap_or_else(|| "utf-8".to_string());

    let encoding = Encoding::for_label(label.as_bytes()).unwrap_or(UTF_8);
    let (text, _, _) = encoding.decode(body);
    (text.into_owned(), encoding.name().to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn textual_detection() {
        assert!(is_textual("text/html"));
        assert!(is_textual("text/plain"));
        assert!(is_textual("application/json"));
        assert!(is_textual("application/xhtml+xml"));
        assert!(is_textual("application/ld+json"));
        assert!(!is_textual("image/png"));
        assert!(!is_textual("application/pdf"));
        assert!(!is_textual("application/octet-stream"));
    }

    #[test]
    fn charset_parsed_from_header() {
        assert_eq!(
            charset_from_content_type("text/html; charset=ISO-8859-1").as_deref(),
            Some("iso-8859-1")
        );
        assert_eq!(
            charset_from_content_type("text/html; boundary=x; charset=\"utf-8\"").as_deref(),
            Some("utf-8")
        );
        assert_eq!(charset_from_content_type("text/html"), None);
    }

    #[test]
    fn media_type_strips_params() {
        assert_eq!(media_type("Text/HTML; charset=utf-8"), "text/html");
        assert_eq!(media_type("application/json"), "application/json");
    }

    #[test]
    fn meta_charset_sniffed() {
        let body = br#"<html><head><meta charset="windows-1252"></head><body></body></html>"#;
        let (_, used) = decode(body, None);
        assert_eq!(used, "windows-1252");
    }

    #[test]
    fn meta_http_equiv_sniffed() {
        let body = br#"<meta http-equiv="content-type" content="text/html; charset=iso-8859-1">"#;
        let (_, used) = decode(body, None);
        // encoding_rs maps iso-8859-1 onto its windows-1252 decoder
        assert_eq!(used, "windows-1252");
    }

    #[test]
    fn header_charset_beats_meta() {
        let body = br#"<meta charset="iso-8859-1"><p>hi</p>"#;
        let (_, used) = decode(body, Some("utf-8"));
        assert_eq!(used, "utf-8");
    }

    #[test]
    fn unknown_label_falls_back_to_utf8() {
        let (text, used) = decode(b"hello", Some("not-a-charset"));
        assert_eq!(text, "hello");
        assert_eq!(used, "utf-8");
    }

    #[test]
    fn invalid_utf8_replaced_not_failed() {
        let (text, _) = decode(&[0x68, 0x69, 0xFF], Some("utf-8"));
        assert!(text.starts_with("hi"));
        assert!(text.contains('\u{FFFD}'));
    }

    #[test]
    fn latin1_decodes() {
        // "café" in latin-1
        let body = [0x63, 0x61, 0x66, 0xE9];
        let (text, _) = decode(&body, Some("iso-8859-1"));
        assert_eq!(text, "café");
    }
}
