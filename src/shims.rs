use std::path::{Path, PathBuf};
use tracing::debug;
use crate::error::{Result, ZapError};
use crate::util::remove_if_exists;

/// What currently occupies the binary-directory slot of an app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinLink {
    /// Nothing there.
    Absent,
    /// Resolves to a file inside the local store.
    Managed(PathBuf),
    /// Resolves to a file zap does not own.
    Foreign(PathBuf),
    /// A symlink whose target is gone.
    Dangling,
}

impl BinLink {
    /// Inspects `link`, treating anything that resolves below `local_store` as ours.
    pub fn classify(link: &Path, local_store: &Path) -> Result<BinLink> {
        match std::fs::symlink_metadata(link) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BinLink::Absent),
            Err(e) => return Err(e.into()),
        }

        let Ok(target) = std::fs::canonicalize(link) else {
            debug!("{} is a dangling symlink", link.display());
            return Ok(BinLink::Dangling);
        };
        let store = std::fs::canonicalize(local_store).unwrap_or_else(|_| local_store.to_path_buf());
        if target.starts_with(&store) {
            Ok(BinLink::Managed(target))
        } else {
            Ok(BinLink::Foreign(target))
        }
    }

    /// Fails with [`ZapError::BinaryConflict`] if the slot is taken by a foreign file.
    pub fn ensure_replaceable(&self, link: &Path) -> Result<()> {
        match self {
            BinLink::Foreign(target) => Err(ZapError::BinaryConflict {
                path: link.to_path_buf(),
                target: target.clone(),
            }),
            _ => Ok(()),
        }
    }
}

/// Points `link` at `target`, given the slot's classification `state`.
/// Managed and dangling entries are replaced, foreign ones refused.
///
/// The new symlink is created next to `link` and renamed over it, so the
/// slot is never observed empty.
pub fn replace_link(state: &BinLink, target: &Path, link: &Path) -> Result<()> {
    state.ensure_replaceable(link)?;

    let file_name = link
        .file_name()
        .ok_or_else(|| ZapError::InvalidOptions(format!("{} is not a file path", link.display())))?;
    let staging = link.with_file_name(format!(".{}.zap-tmp", file_name.to_string_lossy()));
    remove_if_exists(&staging)?;

    create_symlink(target, &staging)?;
    if let Err(e) = std::fs::rename(&staging, link) {
        remove_if_exists(&staging)?;
        return Err(e.into());
    }
    debug!("Linked {} -> {}", link.display(), target.display());
    Ok(())
}

/// Deletes `link` only if it currently resolves into the local store.
/// Returns whether anything was removed.
pub fn remove_managed_link(link: &Path, local_store: &Path) -> Result<bool> {
    match BinLink::classify(link, local_store)? {
        BinLink::Managed(_) => {
            debug!("Removing symlink {}", link.display());
            remove_if_exists(link)
        }
        BinLink::Foreign(target) => {
            debug!("Leaving {} alone, it points to {}", link.display(), target.display());
            Ok(false)
        }
        BinLink::Dangling => {
            debug!("Leaving dangling {} alone", link.display());
            Ok(false)
        }
        BinLink::Absent => Ok(false),
    }
}

#[cfg(unix)]
pub(crate) fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link)?;
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn create_symlink(_target: &Path, link: &Path) -> Result<()> {
    Err(ZapError::Io(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        format!("cannot create {}: symlinks require a unix platform", link.display()),
    )))
}
