//! Path-prefix authorization policy.
//!
//! Only the *presence* of credentials is checked here. Verifying them is
//! the job of the application behind the gate.

use crate::config::PathProtectionConfig;
use crate::security::gate::RequestInfo;

/// Why a request failed the path policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathDenial {
    /// Admin path without an auth signal while `require_auth` is on.
    AdminAuthRequired,
    /// Mutating API call without an API key or CSRF token.
    InvalidApiAccess,
}

impl PathDenial {
    pub fn message(self) -> &'static str {
        match self {
            PathDenial::AdminAuthRequired => "Admin authentication required",
            PathDenial::InvalidApiAccess => "Invalid API access",
        }
    }
}

fn is_mutating(method: &str) -> bool {
    ["POST", "PUT", "PATCH", "DELETE"]
        .iter()
        .any(|m| m.eq_ignore_ascii_case(method))
}

/// Apply the admin and API prefix rules, admin first.
pub fn check_path_access(policy: &PathProtectionConfig, req: &RequestInfo) -> Result<(), PathDenial> {
    let path = req.path.as_str();

    if policy.require_auth
        && !req.has_auth_signal
        && policy.admin_paths.iter().any(|p| path.starts_with(p.as_str()))
    {
        return Err(PathDenial::AdminAuthRequired);
    }

    if is_mutating(&req.method)
        && !req.has_api_credential
        && policy.api_paths.iter().any(|p| path.starts_with(p.as_str()))
    {
        return Err(PathDenial::InvalidApiAccess);
    }

    Ok(())
}

/// Audit resource for a request path.
pub fn resource_for_path(path: &str) -> &'static str {
    const PREFIXES: [(&str, &str); 5] = [
        ("/api/", "api"),
        ("/admin/", "admin"),
        ("/auth/", "auth"),
        ("/properties/", "properties"),
        ("/comunidad/", "community"),
    ];
    PREFIXES
        .iter()
        .find(|(prefix, _)| path.starts_with(prefix))
        .map_or("web", |(_, resource)| resource)
}
