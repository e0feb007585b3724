//! URL canonicalization and crawl-scope filtering.
//!
//! Every URL entering the engine passes through [`Normalizer::normalize`]
//! exactly once; the resulting [`CanonicalUrl`] string is the sole key used
//! for deduplication everywhere else (frontier, visited set, stores).

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use url::Url;

/// A URL in canonical form.
///
/// Invariant: two URLs are equal iff their canonical strings are equal.
/// Instances are only produced by [`Normalizer::normalize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalUrl {
    url: Url,
}

impl CanonicalUrl {
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    pub fn host_str(&self) -> &str {
        // A canonical URL always has a host: non-http(s) schemes are
        // rejected during normalization.
        self.url.host_str().unwrap_or_default()
    }

    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    pub fn as_url(&self) -> &Url {
        &self.url
    }

    pub fn into_url(self) -> Url {
        self.url
    }
}

impl fmt::Display for CanonicalUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

impl Hash for CanonicalUrl {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.url.as_str().hash(state);
    }
}

impl AsRef<str> for CanonicalUrl {
    fn as_ref(&self) -> &str {
        self.url.as_str()
    }
}

impl Serialize for CanonicalUrl {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.url.as_str())
    }
}

impl<'de> Deserialize<'de> for CanonicalUrl {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Normalizer::default()
            .normalize(&raw, None)
            .map_err(serde::de::Error::custom)
    }
}

/// Why a raw URL was rejected during normalization
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Reject {
    #[error("unsupported scheme: {0}")]
    Scheme(String),
    #[error("fragment-only reference")]
    FragmentOnly,
    #[error("malformed url: {0}")]
    Malformed(String),
    #[error("ignored extension: .{0}")]
    IgnoredExtension(String),
}

/// Canonicalizes raw URL strings, optionally resolving against a base.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    /// Lower-cased path extensions to reject (e.g. "jpg", "css")
    ignored_extensions: Vec<String>,
}

impl Normalizer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_ignored_extensions<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            ignored_extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    /// Canonicalize `raw`, resolving relative references against `base`.
    ///
    /// Rules: scheme must be http/https; host is lower-cased and
    /// IDNA-normalized; default ports are stripped; percent-escapes use
    /// upper-case hex; the fragment is discarded; an empty query is
    /// stripped; a trailing `/` is removed unless the path is exactly `/`.
    pub fn normalize(&self, raw: &str, base: Option<&CanonicalUrl>) -> Result<CanonicalUrl, Reject> {
        let trimmed = raw.trim();

        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Err(Reject::FragmentOnly);
        }

        // Cheap scheme pre-filter before full parsing. Protocol-relative
        // references (`//host/path`) fall through to base resolution and
        // inherit the base scheme, never a new one.
        if let Some((scheme, _)) = trimmed.split_once(':') {
            let lower = scheme.to_ascii_lowercase();
            if !lower.contains('/')
                && matches!(lower.as_str(), "javascript" | "mailto" | "tel" | "data" | "ftp" | "file")
            {
                return Err(Reject::Scheme(lower));
            }
        }

        let mut url = match base {
            Some(b) => b
                .as_url()
                .join(trimmed)
                .map_err(|e| Reject::Malformed(e.to_string()))?,
            None => Url::parse(trimmed).map_err(|e| Reject::Malformed(e.to_string()))?,
        };

        match url.scheme() {
            "http" | "https" => {}
            other => return Err(Reject::Scheme(other.to_string())),
        }
        if url.host_str().is_none() {
            return Err(Reject::Malformed("url has no host".to_string()));
        }

        url.set_fragment(None);

        if url.query() == Some("") {
            url.set_query(None);
        }

        let path = normalize_escapes(url.path());
        let path = if path.len() > 1 && path.ends_with('/') {
            path[..path.len() - 1].to_string()
        } else {
            path
        };
        url.set_path(&path);

        if let Some(query) = url.query() {
            let normalized = normalize_escapes(query);
            if normalized != query {
                url.set_query(Some(&normalized));
            }
        }

        if let Some(ext) = path_extension(url.path())
            && self.ignored_extensions.iter().any(|e| e == &ext)
        {
            return Err(Reject::IgnoredExtension(ext));
        }

        Ok(CanonicalUrl { url })
    }
}

/// Decode percent-escapes of unreserved characters and upper-case the hex
/// of the escapes that remain. Invalid escape sequences pass through
/// untouched.
fn normalize_escapes(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = String::with_capacity(s.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len()
            && let (Some(hi), Some(lo)) = (hex_val(bytes[i + 1]), hex_val(bytes[i + 2]))
        {
            let decoded = hi * 16 + lo;
            if is_unreserved(decoded) {
                out.push(decoded as char);
            } else {
                out.push('%');
                out.push(bytes[i + 1].to_ascii_uppercase() as char);
                out.push(bytes[i + 2].to_ascii_uppercase() as char);
            }
            i += 3;
            continue;
        }
        out.push(bytes[i] as char);
        i += 1;
    }

    out
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~')
}

fn path_extension(path: &str) -> Option<String> {
    let segment = path.rsplit('/').next()?;
    let (_, ext) = segment.rsplit_once('.')?;
    if ext.is_empty() || ext.len() > 8 {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Predicate limiting which URLs may enter the frontier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scope {
    pub start_host: String,
    pub start_path_prefix: String,
    pub same_host_only: bool,
    pub same_path_only: bool,
}

impl Scope {
    /// Derive the scope from the seed URL and config flags.
    #[must_use]
    pub fn from_seed(seed: &CanonicalUrl, same_host_only: bool, same_path_only: bool) -> Self {
        let mut prefix = seed.path().to_string();
        // Treat a seed like /docs/intro as scoping to /docs/; a bare host
        // seed scopes to the whole site.
        if !prefix.ends_with('/') {
            match prefix.rfind('/') {
                Some(idx) => prefix.truncate(idx + 1),
                None => prefix = "/".to_string(),
            }
        }

        Self {
            start_host: seed.host_str().to_string(),
            start_path_prefix: prefix,
            same_host_only,
            same_path_only,
        }
    }

    /// Whether `url` is inside the crawl scope.
    #[must_use]
    pub fn contains(&self, url: &CanonicalUrl) -> bool {
        if self.same_host_only && !url.host_str().eq_ignore_ascii_case(&self.start_host) {
            return false;
        }

        if self.same_path_only {
            let path = url.path();
            let prefix = self.start_path_prefix.trim_end_matches('/');
            if prefix.is_empty() {
                return true;
            }
            if !path.starts_with(prefix) {
                return false;
            }
            // Require a segment boundary so /docs does not admit /docs-old
            match path.as_bytes().get(prefix.len()) {
                None | Some(b'/') => {}
                Some(_) => return false,
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(raw: &str) -> CanonicalUrl {
        Normalizer::default().normalize(raw, None).unwrap()
    }

    #[test]
    fn strips_fragment_and_default_port() {
        assert_eq!(norm("http://Example.COM:80/a#frag").as_str(), "http://example.com/a");
        assert_eq!(norm("https://example.com:443/").as_str(), "https://example.com/");
    }

    #[test]
    fn keeps_explicit_port() {
        assert_eq!(norm("http://example.com:8080/x").as_str(), "http://example.com:8080/x");
    }

    #[test]
    fn trailing_slash_removed_except_root() {
        assert_eq!(norm("http://example.com/a/").as_str(), "http://example.com/a");
        assert_eq!(norm("http://example.com/").as_str(), "http://example.com/");
        assert_eq!(norm("http://example.com").as_str(), "http://example.com/");
    }

    #[test]
    fn empty_query_stripped_nonempty_preserved() {
        assert_eq!(norm("http://example.com/a?").as_str(), "http://example.com/a");
        assert_eq!(
            norm("http://example.com/a?b=2&a=1").as_str(),
            "http://example.com/a?b=2&a=1"
        );
    }

    #[test]
    fn percent_encoding_normalized() {
        // %7e is unreserved (~) so it decodes; %2f stays encoded, upper-cased
        assert_eq!(
            norm("http://example.com/%7eguido/a%2fb").as_str(),
            "http://example.com/~guido/a%2Fb"
        );
    }

    #[test]
    fn rejects_non_http_schemes() {
        let n = Normalizer::default();
        for raw in ["javascript:void(0)", "mailto:a@b.c", "tel:+4512345678", "data:text/plain,x"] {
            assert!(n.normalize(raw, None).is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn fragment_only_rejected() {
        let base = norm("http://example.com/page");
        assert_eq!(
            Normalizer::default().normalize("#section", Some(&base)),
            Err(Reject::FragmentOnly)
        );
    }

    #[test]
    fn protocol_relative_inherits_base_scheme() {
        let base = norm("https://example.com/dir/page");
        let resolved = Normalizer::default()
            .normalize("//other.org/x", Some(&base))
            .unwrap();
        assert_eq!(resolved.as_str(), "https://other.org/x");
    }

    #[test]
    fn relative_resolution() {
        let base = norm("http://example.com/a/b/page");
        let n = Normalizer::default();
        assert_eq!(
            n.normalize("../c", Some(&base)).unwrap().as_str(),
            "http://example.com/a/c"
        );
        assert_eq!(
            n.normalize("/root", Some(&base)).unwrap().as_str(),
            "http://example.com/root"
        );
    }

    #[test]
    fn ignored_extension_rejected() {
        let n = Normalizer::with_ignored_extensions(["jpg", ".css"]);
        assert!(matches!(
            n.normalize("http://example.com/logo.JPG", None),
            Err(Reject::IgnoredExtension(_))
        ));
        assert!(n.normalize("http://example.com/page.html", None).is_ok());
    }

    #[test]
    fn normalize_is_idempotent() {
        let n = Normalizer::default();
        for raw in [
            "HTTP://Example.com:80/A%2fb/?q=1#x",
            "https://example.com/a/b/../c/",
            "http://example.com/%7Euser",
        ] {
            let once = n.normalize(raw, None).unwrap();
            let twice = n.normalize(once.as_str(), None).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn scope_same_host() {
        let seed = norm("http://site.test/");
        let scope = Scope::from_seed(&seed, true, false);
        assert!(scope.contains(&norm("http://site.test/a/b")));
        assert!(!scope.contains(&norm("http://other.test/a")));
    }

    #[test]
    fn scope_path_prefix_boundary() {
        let seed = norm("http://site.test/docs/intro");
        let scope = Scope::from_seed(&seed, true, true);
        assert_eq!(scope.start_path_prefix, "/docs/");
        assert!(scope.contains(&norm("http://site.test/docs/guide")));
        assert!(scope.contains(&norm("http://site.test/docs")));
        assert!(!scope.contains(&norm("http://site.test/docs-old/x")));
        assert!(!scope.contains(&norm("http://site.test/blog")));
    }

    #[test]
    fn domain_seed_scopes_whole_site() {
        let seed = norm("http://site.test/");
        let scope = Scope::from_seed(&seed, true, true);
        assert!(scope.contains(&norm("http://site.test/anything/at/all")));
    }
}
