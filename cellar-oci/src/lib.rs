//! OCI image acquisition and on-disk layer storage.
//!
//! ```text
//! Oci (public API)
//!  ├── Store   (name/tag index + per-digest layer directories on disk)
//!  └── registry::Client (anonymous registry pull)
//! ```
//!
//! The core only ever asks this crate for a digest, a manifest, an
//! environment, and a set of layer directories; registry wire format and
//! tar/gzip extraction are treated as settled, external concerns given a
//! thin concrete implementation here rather than reinvented.

mod extract;
mod reference;
mod registry;
mod store;

use std::fs;
use std::path::{Path, PathBuf};

pub use reference::Reference;
pub use store::{ImageConfig, Manifest, ManifestEntry};

/// Result alias for `cellar-oci` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from image acquisition and storage.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The `name[:tag]` source string could not be parsed.
    #[error("invalid image reference: {0}")]
    InvalidReference(String),

    /// A manifest did not have exactly one entry, or had zero layers.
    #[error("invalid manifest shape: {0}")]
    InvalidManifest(String),

    /// No manifest index entry matched the host platform.
    #[error("no manifest for platform {os}/{arch}")]
    NoPlatform {
        /// Requested architecture (`amd64`, `arm64`, ...).
        arch: String,
        /// Requested OS, always `linux` for this engine.
        os: String,
    },

    /// A registry HTTP request failed.
    #[error("registry request failed: {0}")]
    Http(String),

    /// Filesystem I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Acquires, indexes, and removes OCI images addressed by content hash.
#[derive(Debug)]
pub struct Oci {
    store: store::Store,
    tmp_root: PathBuf,
}

impl Oci {
    /// Opens the image store rooted at `home` (expects `<home>/images` and
    /// `<home>/tmp` to either exist or be creatable).
    pub fn open(home: &Path) -> Result<Self> {
        let store = store::Store::open(&home.join("images"))?;
        Ok(Self {
            store,
            tmp_root: home.join("tmp"),
        })
    }

    /// Consults the name/tag index only; does not touch the network.
    pub fn resolve(&self, name: &str, tag: &str) -> Result<Option<String>> {
        self.store.resolve(name, tag)
    }

    /// Resolves `source` (`name[:tag]`, tag defaults to `latest`) to a local
    /// digest, pulling and unpacking the image if it is not already present.
    pub fn acquire(&self, source: &str) -> Result<String> {
        let reference = Reference::parse(source)?;
        if let Some(digest) = self.store.resolve(reference.name(), &reference.tag)? {
            return Ok(digest);
        }

        let mut client = registry::Client::new();
        tracing::info!(source, "pulling image manifest");
        let manifest = client.pull_manifest(&reference)?;

        let full_digest = manifest.config.digest.clone();
        let digest = store::short_digest(&full_digest);

        if self.store.has_image(&digest) {
            tracing::debug!(digest, "digest already stored under another tag, aliasing");
            self.store.alias(reference.name(), &reference.tag, &digest)?;
            return Ok(digest);
        }

        self.download_and_unpack(&reference, &mut client, &manifest, &full_digest, &digest)?;
        self.store.alias(reference.name(), &reference.tag, &digest)?;
        Ok(digest)
    }

    /// Downloads layers and config to scratch, extracts each layer into its
    /// own directory, copies manifest/config into the final image directory,
    /// then deletes the scratch directory.
    fn download_and_unpack(
        &self,
        reference: &Reference,
        client: &mut registry::Client,
        manifest: &registry::ImageManifest,
        full_digest: &str,
        digest: &str,
    ) -> Result<()> {
        let scratch = self.tmp_root.join(digest);
        fs::create_dir_all(&scratch)?;

        let config_bytes = client.fetch_blob(reference, full_digest)?;
        let full_digest_hex = full_digest.strip_prefix("sha256:").unwrap_or(full_digest).to_owned();
        fs::write(scratch.join(format!("{full_digest_hex}.json")), &config_bytes)?;

        let mut layer_filenames = Vec::with_capacity(manifest.layers.len());
        for (i, layer) in manifest.layers.iter().enumerate() {
            tracing::debug!(layer = i + 1, total = manifest.layers.len(), "downloading layer");
            let filename = format!("{}.tar.gz", store::layer_id(&layer.digest));
            let tarball = scratch.join(&filename);
            client.download_blob(reference, &layer.digest, &tarball)?;
            layer_filenames.push(filename);
        }

        let entry = store::ManifestEntry {
            config: format!("{full_digest_hex}.json"),
            repo_tags: vec![format!("{}:{}", reference.name(), reference.tag)],
            layers: layer_filenames.clone(),
        };
        let local_manifest: Manifest = vec![entry];
        store::validate_manifest(&local_manifest)?;
        fs::write(
            scratch.join("manifest.json"),
            serde_json::to_vec_pretty(&local_manifest)?,
        )?;

        for filename in &layer_filenames {
            let lid = store::layer_id(filename);
            extract::extract_layer(&scratch.join(filename), &scratch.join(&lid).join("fs"))?;
        }

        let final_dir = self.store.image_dir(digest);
        if final_dir.exists() {
            fs::remove_dir_all(&final_dir)?;
        }
        fs::rename(&scratch, &final_dir)?;
        Ok(())
    }

    /// Removes the index entries and on-disk directory for `digest`. The
    /// caller is responsible for checking that no running container still
    /// references it.
    pub fn remove(&self, digest: &str) -> Result<()> {
        self.store.remove(digest)
    }

    /// Yields `(name, tag, digest)` triples from the index.
    pub fn list(&self) -> Result<Vec<(String, String, String)>> {
        self.store.list()
    }

    /// Returns `true` if an image directory exists for `digest`.
    pub fn has_image(&self, digest: &str) -> bool {
        self.store.has_image(digest)
    }

    /// Looks up the first `name:tag` indexed under `digest`, `None` if the
    /// digest has no remaining index entry.
    pub fn name_for_digest(&self, digest: &str) -> Result<Option<String>> {
        self.store.name_for_digest(digest)
    }

    /// Returns each layer's unpacked `fs/` directory in manifest (bottom-up)
    /// order. The overlay assembler reverses this for `lowerdir`.
    pub fn layer_dirs_bottom_up(&self, digest: &str) -> Result<Vec<PathBuf>> {
        self.store.layer_dirs_bottom_up(digest)
    }

    /// Reads the image's `KEY=VALUE` environment assignments.
    pub fn read_env(&self, digest: &str) -> Result<Vec<String>> {
        self.store.read_env(digest)
    }
}
