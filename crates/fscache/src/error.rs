use crate::digest::Digest;

pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors produced by cache construction, key derivation and persistence.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache lifetime must be a positive, finite duration (got {seconds} seconds)")]
    Lifetime { seconds: f64 },

    #[error("cache miss for {digest}")]
    Miss { digest: Digest },

    #[error("value has no canonical form: {message}")]
    UnsupportedType { message: String },

    #[error("cache entry {digest} could not be decoded: {message}")]
    CorruptEntry { digest: Digest, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode cache value: {message}")]
    Codec { message: String },

    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("json error: {message}")]
    Json { message: String },
}

impl CacheError {
    /// Whether this error only signals an absent or aged-out entry.
    pub fn is_miss(&self) -> bool {
        matches!(self, CacheError::Miss { .. })
    }

    pub(crate) fn unsupported(message: impl Into<String>) -> Self {
        CacheError::UnsupportedType {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: redact_quoted(&err.to_string()),
        }
    }
}

/// Blank out every double-quoted span of a serde_json message.
///
/// serde_json quotes offending string values (`invalid type: string "..."`),
/// and cached values may hold user data. Positions and type names survive.
fn redact_quoted(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    let mut chars = message.chars();
    while let Some(c) = chars.next() {
        out.push(c);
        if c != '"' {
            continue;
        }
        let mut closed = false;
        while let Some(inner) = chars.next() {
            match inner {
                '\\' => {
                    chars.next();
                }
                '"' => {
                    closed = true;
                    break;
                }
                _ => {}
            }
        }
        out.push_str("<redacted>");
        if closed {
            out.push('"');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_errors_do_not_echo_string_values() {
        let secret = "fscache-cached-secret";
        let err = serde_json::from_value::<bool>(serde_json::json!(secret))
            .expect_err("expected type error");

        let message = CacheError::from(err).to_string();
        assert!(
            !message.contains(secret),
            "expected json error message to omit string values: {message}"
        );
        assert!(message.contains("<redacted>"), "{message}");
    }

    #[test]
    fn redaction_handles_escapes_and_unterminated_quotes() {
        assert_eq!(
            redact_quoted(r#"invalid type: string "a\"b", expected u8 at line 1"#),
            r#"invalid type: string "<redacted>", expected u8 at line 1"#
        );
        assert_eq!(redact_quoted(r#"EOF in "abc"#), r#"EOF in "<redacted>"#);
        assert_eq!(redact_quoted("no quotes here"), "no quotes here");
    }

    #[test]
    fn miss_is_classified() {
        let digest = crate::make_digest(&crate::Value::from(1));
        assert!(CacheError::Miss { digest }.is_miss());
        assert!(!CacheError::Lifetime { seconds: -1.0 }.is_miss());
    }
}
