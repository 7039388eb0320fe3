//! First-run installation of a seed database.
//!
//! Applications usually ship a read-only seed database and copy it to a
//! writable location on first launch. [`install_seed`] performs that copy at
//! most once: if a file already exists at the target it is left alone.

use std::fs;
use std::path::Path;

use tracing::info;

use crate::error::{DbError, Result};

/// Result of [`install_seed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The seed was copied to the target path.
    Installed,
    /// A database already existed at the target path; nothing was copied.
    AlreadyPresent,
}

/// Copies `seed` to `target` unless `target` already exists.
///
/// Missing parent directories of `target` are created. The copy is written
/// next to the target first and then renamed into place, so an interrupted
/// install never leaves a truncated database behind.
///
/// # Errors
///
/// Returns [`DbError::SeedMissing`] if the target is absent and so is the
/// seed, or [`DbError::Io`] if copying fails.
///
/// # Examples
///
/// ```no_run
/// use sqlkeep::{InstallOutcome, install_seed};
///
/// let outcome = install_seed("/usr/share/app/seed.db", "/var/lib/app/app.db").unwrap();
/// if outcome == InstallOutcome::Installed {
///     println!("first launch");
/// }
/// ```
pub fn install_seed(seed: impl AsRef<Path>, target: impl AsRef<Path>) -> Result<InstallOutcome> {
    let seed = seed.as_ref();
    let target = target.as_ref();

    if target.exists() {
        return Ok(InstallOutcome::AlreadyPresent);
    }
    if !seed.is_file() {
        return Err(DbError::SeedMissing(seed.to_path_buf()));
    }

    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut partial = target.as_os_str().to_owned();
    partial.push(".installing");
    let partial = Path::new(&partial);

    if let Err(e) = fs::copy(seed, partial).and_then(|_| fs::rename(partial, target)) {
        let _ = fs::remove_file(partial);
        return Err(e.into());
    }

    info!(seed = %seed.display(), target = %target.display(), "Installed seed database");
    Ok(InstallOutcome::Installed)
}
