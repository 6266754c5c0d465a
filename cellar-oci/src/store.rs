//! Local image storage: the name/tag index plus the on-disk layer layout
//! under `<home>/images/<digest>/`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const IMAGES_FILE: &str = "images.json";
const MANIFEST_FILE: &str = "manifest.json";

/// One entry of an OCI docker-save-style manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Filename of the copied config blob, relative to the image directory.
    #[serde(rename = "Config")]
    pub config: String,
    /// Repo tags this entry was pulled under.
    #[serde(rename = "RepoTags")]
    pub repo_tags: Vec<String>,
    /// Layer tarball filenames, bottom layer first (manifest order).
    #[serde(rename = "Layers")]
    pub layers: Vec<String>,
}

/// A parsed image manifest: exactly one entry with at least one layer.
pub type Manifest = Vec<ManifestEntry>;

/// Validates manifest shape: exactly one entry, at least one layer.
pub fn validate_manifest(manifest: &Manifest) -> Result<&ManifestEntry> {
    if manifest.len() != 1 {
        return Err(Error::InvalidManifest(format!(
            "expected exactly one manifest entry, found {}",
            manifest.len()
        )));
    }
    let entry = &manifest[0];
    if entry.layers.is_empty() {
        return Err(Error::InvalidManifest("manifest has zero layers".into()));
    }
    Ok(entry)
}

/// Subset of the OCI image config consumed by the core: the environment.
/// The default command is parsed but ignored in favor of user-supplied argv.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageConfig {
    /// `KEY=VALUE` environment assignments, in image order.
    #[serde(default)]
    pub env: Vec<String>,
    /// Default command argument vector. Parsed, never consumed by the core.
    #[serde(default)]
    pub cmd: Option<Vec<String>>,
}

/// Top-level OCI config blob: `{"config": {...}, ...}`.
#[derive(Debug, Deserialize)]
struct ConfigBlob {
    #[serde(default)]
    config: ImageConfig,
}

/// Name/tag → digest index, persisted as `images.json`.
pub type Index = BTreeMap<String, BTreeMap<String, String>>;

/// Local store rooted at `<home>/images`.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    /// Opens the store at `images_root`, creating it if absent.
    pub fn open(images_root: &Path) -> Result<Self> {
        fs::create_dir_all(images_root)?;
        Ok(Self {
            root: images_root.to_path_buf(),
        })
    }

    /// `<home>/images/<digest>`.
    pub fn image_dir(&self, digest: &str) -> PathBuf {
        self.root.join(digest)
    }

    /// `<home>/images/<digest>/manifest.json`.
    pub fn manifest_path(&self, digest: &str) -> PathBuf {
        self.image_dir(digest).join(MANIFEST_FILE)
    }

    /// `<home>/images/<digest>/<full_digest_hex>.json`.
    pub fn config_path(&self, digest: &str, full_digest_hex: &str) -> PathBuf {
        self.image_dir(digest).join(format!("{full_digest_hex}.json"))
    }

    /// `<home>/images/<digest>/<lid>/fs`.
    pub fn layer_fs_dir(&self, digest: &str, lid: &str) -> PathBuf {
        self.image_dir(digest).join(lid).join("fs")
    }

    /// Returns `true` if an image directory exists for `digest`.
    pub fn has_image(&self, digest: &str) -> bool {
        self.manifest_path(digest).is_file()
    }

    /// Reads and validates the manifest for `digest`.
    pub fn read_manifest(&self, digest: &str) -> Result<Manifest> {
        let data = fs::read(self.manifest_path(digest))?;
        let manifest: Manifest = serde_json::from_slice(&data)?;
        validate_manifest(&manifest)?;
        Ok(manifest)
    }

    /// Returns each layer's unpacked `fs/` directory, in manifest (bottom-up)
    /// order. Callers building an overlay `lowerdir` must reverse this.
    pub fn layer_dirs_bottom_up(&self, digest: &str) -> Result<Vec<PathBuf>> {
        let manifest = self.read_manifest(digest)?;
        let entry = &manifest[0];
        Ok(entry
            .layers
            .iter()
            .map(|layer_file| {
                let lid = layer_id(layer_file);
                self.layer_fs_dir(digest, &lid)
            })
            .collect())
    }

    /// Reads the image's environment assignments from its config blob.
    pub fn read_env(&self, digest: &str) -> Result<Vec<String>> {
        let dir = self.image_dir(digest);
        let config_file = fs::read_dir(&dir)?
            .filter_map(std::result::Result::ok)
            .find(|e| {
                e.path()
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(".json") && n != MANIFEST_FILE)
            })
            .ok_or_else(|| Error::InvalidManifest(format!("no config blob under {}", dir.display())))?;

        let data = fs::read(config_file.path())?;
        let blob: ConfigBlob = serde_json::from_slice(&data)?;
        Ok(blob.config.env)
    }

    /// Loads the name/tag index, or an empty one if it has never been written.
    pub fn load_index(&self) -> Result<Index> {
        let path = self.root.join(IMAGES_FILE);
        if !path.is_file() {
            return Ok(Index::new());
        }
        let data = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Persists the name/tag index.
    fn save_index(&self, index: &Index) -> Result<()> {
        let data = serde_json::to_string_pretty(index)?;
        fs::write(self.root.join(IMAGES_FILE), data)?;
        Ok(())
    }

    /// Looks up `(name, tag)` in the index.
    pub fn resolve(&self, name: &str, tag: &str) -> Result<Option<String>> {
        let index = self.load_index()?;
        Ok(index.get(name).and_then(|tags| tags.get(tag)).cloned())
    }

    /// Records `(name, tag) -> digest` in the index. Read-modify-write
    /// without locking: the last writer to `images.json` wins.
    pub fn alias(&self, name: &str, tag: &str, digest: &str) -> Result<()> {
        let mut index = self.load_index()?;
        index
            .entry(name.to_owned())
            .or_default()
            .insert(tag.to_owned(), digest.to_owned());
        self.save_index(&index)
    }

    /// Looks up the first `(name, tag)` pair indexed under `digest`, in
    /// index (name, then tag) order. `None` if the digest has no index
    /// entry — an on-disk image directory with every alias since removed.
    pub fn name_for_digest(&self, digest: &str) -> Result<Option<String>> {
        let index = self.load_index()?;
        for (name, tags) in &index {
            for (tag, d) in tags {
                if d == digest {
                    return Ok(Some(format!("{name}:{tag}")));
                }
            }
        }
        Ok(None)
    }

    /// Yields every `(name, tag, digest)` triple in the index.
    pub fn list(&self) -> Result<Vec<(String, String, String)>> {
        let index = self.load_index()?;
        let mut out = Vec::new();
        for (name, tags) in index {
            for (tag, digest) in tags {
                out.push((name.clone(), tag, digest));
            }
        }
        Ok(out)
    }

    /// Removes every index entry pointing at `digest` and the image directory
    /// itself. Does not check for in-use containers — that check belongs to
    /// the caller, which has visibility into running containers.
    pub fn remove(&self, digest: &str) -> Result<()> {
        let mut index = self.load_index()?;
        for tags in index.values_mut() {
            tags.retain(|_, d| d != digest);
        }
        index.retain(|_, tags| !tags.is_empty());
        self.save_index(&index)?;

        let dir = self.image_dir(digest);
        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        Ok(())
    }
}

/// The first 12 hex characters of a layer blob filename's digest, used as
/// the layer's on-disk directory name (`<lid>`).
pub fn layer_id(layer_filename: &str) -> String {
    let hex = layer_filename
        .strip_prefix("sha256:")
        .unwrap_or(layer_filename);
    let hex = hex.split('.').next().unwrap_or(hex);
    hex.chars().take(12).collect()
}

/// The first 12 hex characters of a `sha256:<hex>` digest string.
pub fn short_digest(full_digest: &str) -> String {
    let hex = full_digest.strip_prefix("sha256:").unwrap_or(full_digest);
    hex.chars().take(12).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_then_resolve_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();

        store.alias("alpine", "latest", "abc123def456").unwrap();
        assert_eq!(
            store.resolve("alpine", "latest").unwrap(),
            Some("abc123def456".to_owned())
        );
        assert_eq!(store.resolve("alpine", "missing").unwrap(), None);
    }

    #[test]
    fn two_tags_can_alias_the_same_digest() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();

        store.alias("alpine", "latest", "abc123def456").unwrap();
        store.alias("alpine", "3.19", "abc123def456").unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|(_, _, d)| d == "abc123def456"));
    }

    #[test]
    fn remove_drops_every_alias_of_a_digest() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        store.alias("alpine", "latest", "abc123def456").unwrap();
        store.alias("alpine", "3.19", "abc123def456").unwrap();
        store.alias("busybox", "latest", "other").unwrap();

        store.remove("abc123def456").unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed, vec![("busybox".to_owned(), "latest".to_owned(), "other".to_owned())]);
    }

    #[test]
    fn validate_manifest_rejects_zero_layers() {
        let manifest: Manifest = vec![ManifestEntry {
            config: "c.json".into(),
            repo_tags: vec![],
            layers: vec![],
        }];
        assert!(validate_manifest(&manifest).is_err());
    }

    #[test]
    fn validate_manifest_rejects_multiple_entries() {
        let entry = ManifestEntry {
            config: "c.json".into(),
            repo_tags: vec![],
            layers: vec!["l.tar.gz".into()],
        };
        let manifest: Manifest = vec![entry.clone(), entry];
        assert!(validate_manifest(&manifest).is_err());
    }

    #[test]
    fn layer_id_takes_first_twelve_hex_chars() {
        assert_eq!(
            layer_id("deadbeefcafef00dfacade1234567890.tar.gz"),
            "deadbeefcafe"
        );
    }

    #[test]
    fn short_digest_strips_sha256_prefix() {
        assert_eq!(
            short_digest("sha256:deadbeefcafef00dfacade1234567890"),
            "deadbeefcafe"
        );
    }
}
