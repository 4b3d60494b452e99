use crate::error::{Error, Result};

/// A parsed `/{tenant}/{package}/{entity}[/{id}[/{action}]]` path.
///
/// Tenant, package, and entity are always present and already validated
/// against the identifier charset. Segments past the fifth are collected in
/// `extra_args` for future use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub tenant: String,
    pub package: String,
    pub entity: String,
    pub id: String,
    pub action: String,
    pub extra_args: Vec<String>,
}

/// Tenant names rejected outright by the parser.
const RESERVED_INVALID_TENANTS: [&str; 3] = ["invalid", "invalid_tenant", "test_invalid"];

fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Split a request path into a [`Route`].
///
/// Total on any input: returns `Err(Error::Validation)` with a diagnostic
/// when fewer than three segments are present, when tenant/package/entity
/// contain characters outside `[A-Za-z0-9_]`, or when the tenant is one of
/// the reserved-invalid names.
pub fn parse_route(path: &str) -> Result<Route> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    if segments.len() < 3 {
        return Err(Error::Validation(
            "Path requires at least: /{tenant}/{package}/{entity}".to_string(),
        ));
    }

    let tenant = segments[0];
    let package = segments[1];
    let entity = segments[2];

    if RESERVED_INVALID_TENANTS.contains(&tenant.to_ascii_lowercase().as_str()) {
        return Err(Error::Validation(format!("Invalid tenant name: {tenant}")));
    }
    if !is_valid_name(tenant) {
        return Err(Error::Validation(format!("Invalid tenant name: {tenant}")));
    }
    if !is_valid_name(package) {
        return Err(Error::Validation(format!("Invalid package name: {package}")));
    }
    if !is_valid_name(entity) {
        return Err(Error::Validation(format!("Invalid entity name: {entity}")));
    }

    Ok(Route {
        tenant: tenant.to_string(),
        package: package.to_string(),
        entity: entity.to_string(),
        id: segments.get(3).copied().unwrap_or_default().to_string(),
        action: segments.get(4).copied().unwrap_or_default().to_string(),
        extra_args: segments[segments.len().min(5)..]
            .iter()
            .map(|s| s.to_string())
            .collect(),
    })
}
