//! Request path routing and view resolution.

use crate::registry::RepositoryRegistry;
use crate::repository::Repository;
use std::fmt;
use std::sync::Arc;

/// Scope of a lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum View {
    /// A single repository addressed by name.
    Explicit,
    /// The release slice of one or all repositories.
    Releases,
    /// The snapshot slice of one or all repositories.
    Snapshots,
    /// Every repository, addressed without a repository name.
    All,
}

impl View {
    fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "releases" => Some(Self::Releases),
            "snapshots" => Some(Self::Snapshots),
            _ => None,
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Explicit => "explicit",
            Self::Releases => "releases",
            Self::Snapshots => "snapshots",
            Self::All => "all",
        };
        f.write_str(name)
    }
}

/// Result of routing a request path.
#[derive(Clone, Debug)]
pub struct Route {
    pub view: View,
    /// Candidate repositories in search order.
    pub repositories: Vec<Arc<Repository>>,
    /// Sanitized request path, without leading slashes.
    pub sanitized: String,
    /// Path with the view or repository segment stripped.
    pub filepath: String,
}

/// Normalize a raw request path.
///
/// Strips the legacy `/api/` prefix and leading slashes. Returns `None` if the
/// path contains `..`, `~`, `:` or a backslash.
pub fn sanitize(uri: &str) -> Option<String> {
    let uri = uri.strip_prefix("/api/").unwrap_or(uri);
    let path = uri.trim_start_matches('/');

    if path.contains("..") || path.contains('~') || path.contains(':') || path.contains('\\') {
        return None;
    }

    let path = match path {
        "releases" | "snapshots" => format!("{path}/"),
        _ => path.to_string(),
    };
    Some(path)
}

impl RepositoryRegistry {
    /// Resolve a raw request path to a view and its candidate repositories.
    pub fn route(&self, uri: &str) -> Option<Route> {
        let sanitized = sanitize(uri)?;
        let (first, rest) = match sanitized.split_once('/') {
            Some((first, rest)) => (first, rest),
            None => (sanitized.as_str(), ""),
        };

        let (view, repositories, filepath) = if let Some(view) = View::from_segment(first) {
            (view, self.repositories().to_vec(), rest.to_string())
        } else if let Some((view, repository)) = first
            .rsplit_once('-')
            .and_then(|(name, suffix)| Some((View::from_segment(suffix)?, self.get(name)?)))
        {
            (view, vec![Arc::clone(repository)], rest.to_string())
        } else if let Some(repository) = self.get(first) {
            (View::Explicit, vec![Arc::clone(repository)], rest.to_string())
        } else {
            (View::All, self.repositories().to_vec(), sanitized.clone())
        };

        Some(Route {
            view,
            repositories,
            sanitized,
            filepath,
        })
    }
}
