//! Authentication and request tracing.

use axum::extract::Request;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use depot_core::config::TokenConfig;
use depot_core::{Permissions, RepositoryRegistry, Session};
use sha2::{Digest, Sha256};
use tracing::{Instrument, debug, warn};
use uuid::Uuid;

/// Maximum length for trace IDs.
/// Longer trace IDs are truncated to prevent log bloat and potential log injection.
const MAX_TRACE_ID_LEN: usize = 128;

/// Trace ID for request correlation.
#[derive(Clone, Debug)]
pub struct TraceId(pub String);

impl TraceId {
    /// Generate a new random trace ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create a trace ID from a client-provided value.
    /// The value is truncated to MAX_TRACE_ID_LEN characters and non-printable characters removed.
    pub fn from_client(value: &str) -> Self {
        let sanitized: String = value
            .chars()
            .take(MAX_TRACE_ID_LEN)
            .filter(|c| c.is_ascii_graphic() || *c == ' ')
            .collect();

        if sanitized.is_empty() {
            Self::new()
        } else {
            Self(sanitized)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Middleware running each request inside a span carrying its trace ID.
pub async fn trace_middleware(mut req: Request, next: Next) -> Response {
    let trace_id = req
        .headers()
        .get("x-trace-id")
        .and_then(|v| v.to_str().ok())
        .map(TraceId::from_client)
        .unwrap_or_default();
    let span = tracing::info_span!("request", trace_id = %trace_id);
    req.extensions_mut().insert(trace_id);

    next.run(req).instrument(span).await
}

/// Trace ID attached by [`trace_middleware`].
pub fn get_trace_id(req: &Request) -> Option<&TraceId> {
    req.extensions().get::<TraceId>()
}

/// Resolves request credentials to a session.
pub trait Authenticator: Send + Sync {
    /// Authenticate the request headers. `None` means anonymous or rejected.
    fn authenticate(&self, headers: &HeaderMap) -> Option<Session>;
}

struct TokenEntry {
    alias: String,
    secret_sha256: String,
    path: String,
    permissions: Permissions,
    repositories: Vec<String>,
}

/// HTTP Basic authenticator over configured tokens.
///
/// The user name is the token alias and the password its secret; secrets are
/// compared by SHA-256 digest.
pub struct TokenAuthenticator {
    tokens: Vec<TokenEntry>,
}

impl TokenAuthenticator {
    /// Build from configuration. Tokens with unparseable permissions are skipped.
    pub fn new(tokens: &[TokenConfig], registry: &RepositoryRegistry) -> Self {
        let names: Vec<String> = registry
            .repositories()
            .iter()
            .map(|r| r.name().to_string())
            .collect();

        let tokens = tokens
            .iter()
            .filter_map(|token| {
                let permissions = match Permissions::parse(&token.permissions) {
                    Ok(permissions) => permissions,
                    Err(e) => {
                        warn!(alias = %token.alias, error = %e, "Token has invalid permissions, ignoring");
                        return None;
                    }
                };

                let repositories = if token.path == "*" || token.path.starts_with("/*") {
                    names.clone()
                } else {
                    names
                        .iter()
                        .find(|name| {
                            let scope = token.path.trim_start_matches('/');
                            scope == name.as_str() || scope.starts_with(&format!("{name}/"))
                        })
                        .cloned()
                        .into_iter()
                        .collect()
                };

                Some(TokenEntry {
                    alias: token.alias.clone(),
                    secret_sha256: token.secret_sha256.to_ascii_lowercase(),
                    path: token.path.clone(),
                    permissions,
                    repositories,
                })
            })
            .collect();

        Self { tokens }
    }

    fn credentials(headers: &HeaderMap) -> Option<(String, String)> {
        let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
        // The scheme is case-insensitive
        if value.len() < 6 || !value[..6].eq_ignore_ascii_case("basic ") {
            debug!("Unsupported authorization scheme");
            return None;
        }

        let decoded = STANDARD.decode(value[6..].trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (alias, secret) = decoded.split_once(':')?;
        Some((alias.to_string(), secret.to_string()))
    }
}

impl Authenticator for TokenAuthenticator {
    fn authenticate(&self, headers: &HeaderMap) -> Option<Session> {
        let (alias, secret) = Self::credentials(headers)?;
        let token = self.tokens.iter().find(|t| t.alias == alias)?;

        if hash_secret(&secret) != token.secret_sha256 {
            debug!(alias = %alias, "Invalid authorization credentials");
            return None;
        }

        Some(Session::new(
            token.alias.clone(),
            token.permissions,
            token.path.clone(),
            token.repositories.clone(),
        ))
    }
}

/// SHA-256 hex digest of a token secret.
pub fn hash_secret(secret: &str) -> String {
    Sha256::digest(secret.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use depot_core::config::{AppConfig, RepositoryConfig};
    use depot_core::Permission;

    fn registry(root: &std::path::Path) -> RepositoryRegistry {
        let config = AppConfig {
            repositories: vec![RepositoryConfig::new("main"), RepositoryConfig::new("private")],
            ..AppConfig::for_testing(root)
        };
        RepositoryRegistry::from_config(&config).unwrap()
    }

    fn token(alias: &str, secret: &str, path: &str, permissions: &str) -> TokenConfig {
        TokenConfig {
            alias: alias.to_string(),
            secret_sha256: hash_secret(secret),
            path: path.to_string(),
            permissions: permissions.to_string(),
        }
    }

    fn basic(alias: &str, secret: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let value = format!("Basic {}", STANDARD.encode(format!("{alias}:{secret}")));
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&value).unwrap());
        headers
    }

    #[test]
    fn test_hash_secret() {
        assert_eq!(
            hash_secret("hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_authenticate_valid_token() {
        let dir = tempfile::tempdir().unwrap();
        let auth = TokenAuthenticator::new(
            &[token("ci", "s3cret", "/private", "rw")],
            &registry(dir.path()),
        );

        let session = auth.authenticate(&basic("ci", "s3cret")).unwrap();
        assert_eq!(session.alias(), "ci");
        assert!(session.has_permission(Permission::Write));
        assert_eq!(session.repositories(), ["private".to_string()]);
        assert!(session.has_permission_to("private/g/a/1.0/a.jar"));
        assert!(!session.has_permission_to("main/g/a/1.0/a.jar"));
    }

    #[test]
    fn test_wildcard_token_sees_all_repositories() {
        let dir = tempfile::tempdir().unwrap();
        let auth = TokenAuthenticator::new(&[token("admin", "pw", "*", "m")], &registry(dir.path()));

        let session = auth.authenticate(&basic("admin", "pw")).unwrap();
        assert_eq!(session.repositories().len(), 2);
    }

    #[test]
    fn test_rejects_bad_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let auth = TokenAuthenticator::new(&[token("ci", "s3cret", "*", "r")], &registry(dir.path()));

        assert!(auth.authenticate(&basic("ci", "wrong")).is_none());
        assert!(auth.authenticate(&basic("other", "s3cret")).is_none());
        assert!(auth.authenticate(&HeaderMap::new()).is_none());

        let mut bearer = HeaderMap::new();
        bearer.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert!(auth.authenticate(&bearer).is_none());
    }

    #[test]
    fn test_trace_id_sanitized() {
        let long = "a".repeat(200);
        assert_eq!(TraceId::from_client(&long).as_str().len(), MAX_TRACE_ID_LEN);
        assert_eq!(TraceId::from_client("abc\n\u{7}").as_str(), "abc");
        assert!(!TraceId::from_client("\n").as_str().is_empty());
    }
}
