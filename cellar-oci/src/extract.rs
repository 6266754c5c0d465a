//! Gzip+tar layer extraction.
//!
//! Each layer unpacks into its own directory rather than a shared rootfs, so
//! whiteout markers (`.wh.<name>`, `.wh..wh..opq`) are preserved verbatim as
//! ordinary files instead of being resolved here — the kernel's overlay
//! driver is the single arbiter of final visibility once the per-layer
//! directories are stacked as `lowerdir` entries.

use std::fs;
use std::path::Path;

use flate2::read::GzDecoder;

/// Extracts a single gzip-compressed tar layer into `dest`, creating it if
/// needed.
pub fn extract_layer(tarball: &Path, dest: &Path) -> crate::Result<()> {
    fs::create_dir_all(dest)?;
    let file = fs::File::open(tarball)?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    archive.set_preserve_permissions(true);
    archive.set_preserve_mtime(true);
    archive.set_overwrite(true);
    archive.unpack(dest)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn make_layer(dir: &Path, entries: &[(&str, &[u8])]) -> std::path::PathBuf {
        let tar_path = dir.join("layer.tar.gz");
        let file = fs::File::create(&tar_path).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap().flush().unwrap();
        tar_path
    }

    #[test]
    fn extracts_regular_files() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let tarball = make_layer(src.path(), &[("hello.txt", b"hi")]);

        extract_layer(&tarball, dest.path()).unwrap();

        assert_eq!(fs::read_to_string(dest.path().join("hello.txt")).unwrap(), "hi");
    }

    #[test]
    fn preserves_whiteout_marker_as_a_plain_file() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let tarball = make_layer(src.path(), &[(".wh.deleted", b"")]);

        extract_layer(&tarball, dest.path()).unwrap();

        assert!(dest.path().join(".wh.deleted").exists());
    }
}
