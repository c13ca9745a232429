//! Authenticated sessions and permissions.

use crate::{Error, Result};
use std::fmt;

/// A single access permission.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Permission {
    /// Read hidden repositories.
    Read,
    /// Deploy artifacts.
    Write,
    /// Full access, implies every other permission.
    Manager,
}

impl Permission {
    fn bit(self) -> u8 {
        match self {
            Self::Read => 0b001,
            Self::Write => 0b010,
            Self::Manager => 0b100,
        }
    }

    /// Permission letter.
    pub fn as_char(self) -> char {
        match self {
            Self::Read => 'r',
            Self::Write => 'w',
            Self::Manager => 'm',
        }
    }
}

/// Set of permissions held by a token.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Permissions(u8);

impl Permissions {
    /// Parse a string of permission letters, e.g. `rw` or `m`.
    pub fn parse(value: &str) -> Result<Self> {
        value.chars().try_fold(Self::default(), |set, c| {
            let permission = match c {
                'r' => Permission::Read,
                'w' => Permission::Write,
                'm' => Permission::Manager,
                _ => {
                    return Err(Error::InvalidPermissions(format!(
                        "unknown permission '{c}' in '{value}'"
                    )));
                }
            };
            Ok(set.with(permission))
        })
    }

    pub fn with(self, permission: Permission) -> Self {
        Self(self.0 | permission.bit())
    }

    pub fn contains(self, permission: Permission) -> bool {
        self.0 & permission.bit() != 0
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for permission in [Permission::Read, Permission::Write, Permission::Manager] {
            if self.contains(permission) {
                write!(f, "{}", permission.as_char())?;
            }
        }
        Ok(())
    }
}

/// Authenticated caller.
#[derive(Clone, Debug)]
pub struct Session {
    alias: String,
    permissions: Permissions,
    path: String,
    repositories: Vec<String>,
}

impl Session {
    /// Create a session for a token with the given path scope.
    ///
    /// `repositories` lists the repositories reachable through the scope.
    pub fn new(
        alias: impl Into<String>,
        permissions: Permissions,
        path: impl Into<String>,
        repositories: Vec<String>,
    ) -> Self {
        Self {
            alias: alias.into(),
            permissions,
            path: path.into(),
            repositories,
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn permissions(&self) -> Permissions {
        self.permissions
    }

    /// Path scope of the token.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Names of repositories reachable through the scope.
    pub fn repositories(&self) -> &[String] {
        &self.repositories
    }

    /// Check whether the scope covers `path` (`<repository>/<file>`).
    pub fn has_permission_to(&self, path: &str) -> bool {
        let path = format!("/{}", path.trim_start_matches('/'));

        if self.path == "*" {
            return true;
        }

        if let Some(prefix) = self.path.strip_prefix("/*") {
            let rest = path[1..].split_once('/').map_or("", |(_, rest)| rest);
            return format!("/{rest}").starts_with(prefix);
        }

        path.starts_with(&self.path)
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(Permission::Manager) || self.permissions.contains(permission)
    }

    pub fn has_any_permission(&self, permissions: &[Permission]) -> bool {
        permissions.iter().any(|p| self.has_permission(*p))
    }

    pub fn is_manager(&self) -> bool {
        self.permissions.contains(Permission::Manager)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(path: &str, permissions: &str) -> Session {
        Session::new("alias", Permissions::parse(permissions).unwrap(), path, vec![])
    }

    #[test]
    fn test_permissions_parse() {
        let permissions = Permissions::parse("rw").unwrap();
        assert!(permissions.contains(Permission::Read));
        assert!(permissions.contains(Permission::Write));
        assert!(!permissions.contains(Permission::Manager));
        assert_eq!(permissions.to_string(), "rw");
        assert!(Permissions::parse("").unwrap() == Permissions::default());
        assert!(Permissions::parse("rx").is_err());
    }

    #[test]
    fn test_manager_implies_everything() {
        let session = session("*", "m");
        assert!(session.has_permission(Permission::Write));
        assert!(session.has_any_permission(&[Permission::Read]));
        assert!(session.is_manager());
    }

    #[test]
    fn test_read_only_session_cannot_write() {
        let session = session("*", "r");
        assert!(!session.has_any_permission(&[Permission::Write, Permission::Manager]));
    }

    #[test]
    fn test_repository_scope() {
        let session = session("/main/com/acme", "w");
        assert!(session.has_permission_to("main/com/acme/lib/1.0/lib.jar"));
        assert!(session.has_permission_to("/main/com/acme/lib/1.0/lib.jar"));
        assert!(!session.has_permission_to("private/com/acme/lib/1.0/lib.jar"));
        assert!(!session.has_permission_to("main/org/example/x.jar"));
    }

    #[test]
    fn test_wildcard_repository_scope() {
        let session = session("/*/com/acme", "r");
        assert!(session.has_permission_to("main/com/acme/lib.jar"));
        assert!(session.has_permission_to("private/com/acme/lib.jar"));
        assert!(!session.has_permission_to("main/org/example/lib.jar"));
    }

    #[test]
    fn test_star_scope() {
        let session = session("*", "r");
        assert!(session.has_permission_to("anything/goes"));
    }
}
