//! Composes a container's root filesystem from ordered image layers plus
//! per-container upper/work directories.

use std::path::PathBuf;

use crate::error::Result;
use crate::{paths, sys};

/// Creates the container's overlay directories and mounts the overlay at
/// `fs/mnt`.
///
/// `layer_dirs_bottom_up` must be each layer's unpacked `fs/` directory in
/// manifest order (base layer first); this function performs the reversal
/// the kernel requires (topmost layer leftmost in `lowerdir`).
pub fn assemble(cid: &str, layer_dirs_bottom_up: &[PathBuf]) -> Result<()> {
    let mnt = paths::container_mnt(cid);
    let upper = paths::container_upper(cid);
    let work = paths::container_work(cid);

    std::fs::create_dir_all(&mnt)?;
    std::fs::create_dir_all(&upper)?;
    std::fs::create_dir_all(&work)?;

    let lowerdirs: Vec<PathBuf> = layer_dirs_bottom_up.iter().rev().cloned().collect();
    tracing::debug!(cid, layers = lowerdirs.len(), "mounting overlay");
    sys::mount_overlay(&mnt, &lowerdirs, &upper, &work)
}

/// Unmounts the container's overlay and removes its directory tree.
pub fn disassemble(cid: &str) -> Result<()> {
    let mnt = paths::container_mnt(cid);
    if mnt.exists() {
        sys::unmount(&mnt)?;
    }
    let dir = paths::container_dir(cid);
    if dir.exists() {
        std::fs::remove_dir_all(dir)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowerdir_order_is_reversed_from_manifest_order() {
        let bottom_up = vec![
            PathBuf::from("/base"),
            PathBuf::from("/middle"),
            PathBuf::from("/top"),
        ];
        let reversed: Vec<_> = bottom_up.iter().rev().cloned().collect();
        assert_eq!(
            reversed,
            vec![
                PathBuf::from("/top"),
                PathBuf::from("/middle"),
                PathBuf::from("/base"),
            ]
        );
    }
}
