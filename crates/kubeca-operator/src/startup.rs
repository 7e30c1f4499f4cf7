//! Startup utilities for the kubeca operator

use std::path::Path;

use kubeca_authority::Authority;
use kubeca_common::Error;
use tracing::info;

/// Load the authority configuration and every issuer it names
///
/// Any failure is a startup error: the process must not serve with a
/// partially loaded authority.
pub fn load_authority(path: &Path) -> Result<Authority, Error> {
    info!(path = %path.display(), "Loading authority configuration");
    let authority = Authority::load(path).map_err(|e| {
        Error::startup_with_context(
            "authority",
            format!("failed to load {}: {}", path.display(), e),
        )
    })?;

    info!(
        issuers = ?authority.labels().collect::<Vec<_>>(),
        profiles = authority.profile_count(),
        "Authority ready"
    );
    Ok(authority)
}
