use {
    axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    secrecy::{ExposeSecret, Secret},
    subtle::ConstantTimeEq,
};

// ── Types ────────────────────────────────────────────────────────────────────

/// Resolved gateway auth configuration.
#[derive(Clone)]
pub struct ResolvedAuth {
    token: Secret<String>,
}

impl std::fmt::Debug for ResolvedAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedAuth")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// No `Authorization: Bearer ...` header.
    Missing,
    /// A bearer token was presented but does not match.
    Mismatch,
}

impl AuthFailure {
    pub fn reason(self) -> &'static str {
        match self {
            Self::Missing => "token_missing",
            Self::Mismatch => "token_mismatch",
        }
    }

    pub fn status(self) -> StatusCode {
        match self {
            Self::Missing => StatusCode::UNAUTHORIZED,
            Self::Mismatch => StatusCode::FORBIDDEN,
        }
    }

    /// Client-facing message.
    pub fn message(self) -> &'static str {
        match self {
            Self::Missing => "Token wajib disertakan pada header Authorization.",
            Self::Mismatch => "Token tidak valid atau tidak diizinkan.",
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Constant-time string comparison (prevents timing attacks).
fn safe_equal(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Extract the bearer token from the `Authorization` header.
///
/// The token is the first space-separated word after `Bearer `; an empty
/// word still counts as presented (and then fails to match).
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let rest = value.strip_prefix("Bearer ")?;
    Some(rest.split(' ').next().unwrap_or_default())
}

// ── Auth logic ───────────────────────────────────────────────────────────────

impl ResolvedAuth {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Secret::new(token.into()),
        }
    }

    /// Check the request headers against the configured token.
    pub fn authorize_bearer(&self, headers: &HeaderMap) -> Result<(), AuthFailure> {
        let given = bearer_token(headers).ok_or(AuthFailure::Missing)?;
        if !safe_equal(given, self.token.expose_secret()) {
            return Err(AuthFailure::Mismatch);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {super::*, axum::http::HeaderValue};

    fn headers(value: &'static str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(AUTHORIZATION, HeaderValue::from_static(value));
        h
    }

    #[test]
    fn safe_equal_compares_content_and_length() {
        assert!(safe_equal("abc", "abc"));
        assert!(!safe_equal("abc", "abd"));
        assert!(!safe_equal("abc", "abcd"));
        assert!(!safe_equal("", "a"));
    }

    #[test]
    fn bearer_token_takes_first_word() {
        assert_eq!(bearer_token(&headers("Bearer s3cr3t")), Some("s3cr3t"));
        assert_eq!(bearer_token(&headers("Bearer s3cr3t extra")), Some("s3cr3t"));
        assert_eq!(bearer_token(&headers("Bearer ")), Some(""));
    }

    #[test]
    fn bearer_token_requires_scheme() {
        assert_eq!(bearer_token(&HeaderMap::new()), None);
        assert_eq!(bearer_token(&headers("Basic dXNlcjpwYXNz")), None);
        assert_eq!(bearer_token(&headers("bearer s3cr3t")), None);
        assert_eq!(bearer_token(&headers("Bearers3cr3t")), None);
    }

    #[test]
    fn missing_is_checked_before_mismatch() {
        let auth = ResolvedAuth::new("s3cr3t");
        assert_eq!(
            auth.authorize_bearer(&HeaderMap::new()),
            Err(AuthFailure::Missing)
        );
        assert_eq!(
            auth.authorize_bearer(&headers("Token s3cr3t")),
            Err(AuthFailure::Missing)
        );
        assert_eq!(
            auth.authorize_bearer(&headers("Bearer wrong")),
            Err(AuthFailure::Mismatch)
        );
        assert_eq!(auth.authorize_bearer(&headers("Bearer s3cr3t")), Ok(()));
    }

    #[test]
    fn failure_mapping() {
        assert_eq!(AuthFailure::Missing.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthFailure::Mismatch.status(), StatusCode::FORBIDDEN);
        assert_eq!(AuthFailure::Mismatch.reason(), "token_mismatch");
    }

    #[test]
    fn debug_hides_token() {
        assert!(!format!("{:?}", ResolvedAuth::new("s3cr3t")).contains("s3cr3t"));
    }
}
