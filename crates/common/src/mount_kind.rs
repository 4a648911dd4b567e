use std::fmt;

/// Where a mount keeps its role-like objects, relative to `auth/<mount>/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleSegment {
    Roles,
    Role,
    Groups,
    Users,
}

impl RoleSegment {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleSegment::Roles => "roles",
            RoleSegment::Role => "role",
            RoleSegment::Groups => "groups",
            RoleSegment::Users => "users",
        }
    }
}

impl fmt::Display for RoleSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared type of an auth mount.
///
/// The set is closed: a type we don't know how to lay out is carried
///  as `Unsupported` rather than guessed at, and gets skipped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MountKind {
    Aws,
    Gcp,
    Azure,
    Kubernetes,
    Oidc,
    Oci,
    Saml,
    AppRole,
    Kerberos,
    Ldap,
    Okta,
    Radius,
    Token,
    Unsupported(String),
}

impl MountKind {
    /// Classify a declared mount type. Matching is exact.
    pub fn parse(kind: &str) -> Self {
        match kind {
            "aws" => MountKind::Aws,
            "gcp" => MountKind::Gcp,
            "azure" => MountKind::Azure,
            "kubernetes" => MountKind::Kubernetes,
            "oidc" => MountKind::Oidc,
            "oci" => MountKind::Oci,
            "saml" => MountKind::Saml,
            "approle" => MountKind::AppRole,
            "kerberos" => MountKind::Kerberos,
            "ldap" => MountKind::Ldap,
            "okta" => MountKind::Okta,
            "radius" => MountKind::Radius,
            "token" => MountKind::Token,
            other => MountKind::Unsupported(other.to_string()),
        }
    }

    /// Segment under which this mount's objects are listed and stored,
    ///  or `None` for unsupported types.
    pub fn segment(&self) -> Option<RoleSegment> {
        match self {
            MountKind::Aws | MountKind::Gcp => Some(RoleSegment::Roles),
            MountKind::Azure
            | MountKind::Kubernetes
            | MountKind::Oidc
            | MountKind::Oci
            | MountKind::Saml
            | MountKind::AppRole => Some(RoleSegment::Role),
            MountKind::Kerberos | MountKind::Ldap | MountKind::Okta => Some(RoleSegment::Groups),
            MountKind::Radius => Some(RoleSegment::Users),
            MountKind::Token => Some(RoleSegment::Roles),
            MountKind::Unsupported(_) => None,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.segment().is_some()
    }
}

impl From<&str> for MountKind {
    fn from(kind: &str) -> Self {
        MountKind::parse(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_table() {
        let cases = [
            ("aws", "roles"),
            ("gcp", "roles"),
            ("azure", "role"),
            ("kubernetes", "role"),
            ("oidc", "role"),
            ("oci", "role"),
            ("saml", "role"),
            ("approle", "role"),
            ("kerberos", "groups"),
            ("ldap", "groups"),
            ("okta", "groups"),
            ("radius", "users"),
            ("token", "roles"),
        ];

        for (kind, segment) in cases {
            let parsed = MountKind::parse(kind);
            assert_eq!(
                parsed.segment().map(|s| s.as_str()),
                Some(segment),
                "mount type {}",
                kind
            );
        }
    }

    #[test]
    fn test_unknown_types_are_unsupported() {
        for kind in ["userpass", "github", "cert", "jwt", "", "AppRole", "approle/"] {
            let parsed = MountKind::parse(kind);
            assert_eq!(parsed, MountKind::Unsupported(kind.to_string()));
            assert!(parsed.segment().is_none());
            assert!(!parsed.is_supported());
        }
    }

    #[test]
    fn test_segment_display() {
        assert_eq!(RoleSegment::Groups.to_string(), "groups");
    }
}
