//! Managed configuration overlay
//!
//! While the game runs under autoclipper, its `cfg` and `custom`
//! directories are renamed to backups and replaced with symlinks into
//! the bundled managed tree. [`ConfigOverlay`] scopes that swap:
//! acquiring it performs the rename+link, releasing it (or dropping it
//! on a failure path) restores the user's directories. A failure
//! mid-swap rolls back, so the game directory is never left half
//! renamed.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::OverlayError;

const CFG_DIR: &str = "cfg";
const CUSTOM_DIR: &str = "custom";
const CFG_BACKUP: &str = "cfg_user_backup";
const CUSTOM_BACKUP: &str = "custom_user_backup";

/// Scoped swap of the game's `cfg`/`custom` directories
#[derive(Debug)]
pub struct ConfigOverlay {
    game_dir: PathBuf,
    released: bool,
}

impl ConfigOverlay {
    /// Back up the user's `cfg`/`custom` directories and symlink the
    /// managed tree in their place.
    ///
    /// `managed_dir` must contain `cfg/` and `custom/` subdirectories.
    /// The game directory must contain `cfg`; `custom` is created if
    /// absent so its backup/restore stays symmetric. Stale backups from
    /// an earlier unclean shutdown are renamed aside with a random
    /// suffix rather than overwritten.
    pub fn acquire(game_dir: &Path, managed_dir: &Path) -> Result<Self, OverlayError> {
        if let Err(swap) = rename_user_dirs(game_dir) {
            tracing::error!(
                "Backing up the user's cfg and custom folders failed: {swap}. Attempting to restore."
            );
            if let Err(restore) = restore_user_dirs(game_dir) {
                tracing::error!(
                    "Restoring cfg and custom after a failed backup also failed: {restore}"
                );
                return Err(OverlayError::SwapAndRestoreFailed {
                    swap: Box::new(swap),
                    restore: Box::new(restore),
                });
            }
            return Err(swap);
        }

        if let Err(e) = link_managed_dirs(game_dir, managed_dir) {
            tracing::error!("Creating symlinks to the managed cfg and custom folders failed: {e}");
            if let Err(restore) = restore_user_dirs(game_dir) {
                return Err(OverlayError::SwapAndRestoreFailed {
                    swap: Box::new(e),
                    restore: Box::new(restore),
                });
            }
            return Err(e);
        }

        Ok(Self {
            game_dir: game_dir.to_path_buf(),
            released: false,
        })
    }

    /// Remove the managed symlinks and restore the user's directories
    pub fn release(mut self) -> Result<(), OverlayError> {
        self.released = true;
        restore_user_dirs(&self.game_dir)
    }
}

impl Drop for ConfigOverlay {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = restore_user_dirs(&self.game_dir) {
                tracing::error!(
                    "Failed to restore {} while dropping the config overlay: {e}",
                    self.game_dir.display()
                );
            }
        }
    }
}

/// Rename `cfg`/`custom` to their backup names, rolling back the first
/// rename if the second fails.
fn rename_user_dirs(game_dir: &Path) -> Result<(), OverlayError> {
    let cfg = game_dir.join(CFG_DIR);
    let custom = game_dir.join(CUSTOM_DIR);

    if !cfg.is_dir() {
        return Err(OverlayError::MissingCfg(game_dir.to_path_buf()));
    }
    if !custom.exists() {
        std::fs::create_dir(&custom)?;
    }

    let cfg_backup = game_dir.join(CFG_BACKUP);
    let custom_backup = game_dir.join(CUSTOM_BACKUP);

    // Backups left over from an unclean shutdown are user data; move
    // them aside instead of overwriting.
    for stale in [&cfg_backup, &custom_backup] {
        if stale.exists() {
            let aside = stale_backup_name(stale);
            tracing::warn!(
                "Stale backup {} found, renaming to {}",
                stale.display(),
                aside.display()
            );
            std::fs::rename(stale, aside)?;
        }
    }

    std::fs::rename(&cfg, &cfg_backup)?;
    if let Err(e) = std::fs::rename(&custom, &custom_backup) {
        std::fs::rename(&cfg_backup, &cfg)?;
        return Err(e.into());
    }
    Ok(())
}

/// Symlink the managed `cfg`/`custom` trees into the game directory
fn link_managed_dirs(game_dir: &Path, managed_dir: &Path) -> Result<(), OverlayError> {
    for name in [CFG_DIR, CUSTOM_DIR] {
        let target = game_dir.join(name);
        if target.exists() {
            return Err(OverlayError::Obstructed(target));
        }
        symlink_dir(&managed_dir.join(name), &target)?;
    }
    Ok(())
}

/// Remove the managed symlinks, then move the backups back into place.
///
/// Missing backups are logged and skipped so that a partially-applied
/// swap can still be unwound.
fn restore_user_dirs(game_dir: &Path) -> Result<(), OverlayError> {
    for name in [CFG_DIR, CUSTOM_DIR] {
        let link = game_dir.join(name);
        match std::fs::symlink_metadata(&link) {
            Ok(meta) if meta.file_type().is_symlink() => remove_symlink(&link)?,
            Ok(_) | Err(_) => {}
        }
    }

    for (backup, original) in [(CFG_BACKUP, CFG_DIR), (CUSTOM_BACKUP, CUSTOM_DIR)] {
        let backup_path = game_dir.join(backup);
        if backup_path.is_dir() {
            std::fs::rename(&backup_path, game_dir.join(original))?;
        } else {
            tracing::warn!(
                "Directory '{}' did not exist and was not restored",
                backup_path.display()
            );
        }
    }
    Ok(())
}

fn stale_backup_name(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(Uuid::new_v4().simple().to_string());
    PathBuf::from(name)
}

#[cfg(unix)]
fn symlink_dir(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(src, dst)
}

#[cfg(windows)]
fn symlink_dir(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_dir(src, dst)
}

#[cfg(unix)]
fn remove_symlink(path: &Path) -> std::io::Result<()> {
    std::fs::remove_file(path)
}

#[cfg(windows)]
fn remove_symlink(path: &Path) -> std::io::Result<()> {
    std::fs::remove_dir(path)
}
