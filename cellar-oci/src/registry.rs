//! Thin OCI Distribution client: anonymous bearer-token pull of a manifest
//! and its blobs from a remote registry.
//!
//! No retry, no caching beyond the on-disk image store itself, no private-
//! registry auth beyond the standard two-legged anonymous flow. Wire-format
//! fidelity to the full OCI distribution spec is not the point of this
//! client; it exists so the crate pulls real images end to end.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use serde::Deserialize;
use sha2::Digest as _;

use crate::reference::Reference;
use crate::{Error, Result};

/// A [`Write`] wrapper that hashes every byte passed through it, so a blob's
/// `sha256:<hex>` digest can be checked without buffering it in memory.
struct HashingWriter<W> {
    inner: W,
    hasher: sha2::Sha256,
}

impl<W: Write> HashingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: sha2::Sha256::new(),
        }
    }

    /// Consumes the writer, returning the inner sink and the `sha256:<hex>`
    /// digest of everything written to it.
    fn finish(self) -> (W, String) {
        (self.inner, format!("sha256:{}", hex::encode(self.hasher.finalize())))
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// OCI / Docker manifest media types accepted during pull.
const ACCEPT_MANIFEST: &str = "\
    application/vnd.oci.image.manifest.v1+json, \
    application/vnd.oci.image.index.v1+json, \
    application/vnd.docker.distribution.manifest.v2+json, \
    application/vnd.docker.distribution.manifest.list.v2+json";

/// OCI content descriptor.
#[derive(Debug, Clone, Deserialize)]
pub struct Descriptor {
    /// `sha256:<hex>` digest of the referenced content.
    pub digest: String,
    /// Size of the referenced content in bytes.
    #[allow(dead_code)]
    pub size: u64,
}

/// A resolved, single-platform image manifest.
#[derive(Debug, Deserialize)]
pub struct ImageManifest {
    /// Descriptor of the image config blob.
    pub config: Descriptor,
    /// Descriptors of the layer blobs, bottom layer first (manifest order).
    pub layers: Vec<Descriptor>,
}

/// Platform selector in a manifest index entry.
#[derive(Debug, Deserialize)]
struct Platform {
    architecture: String,
    os: String,
}

/// Entry within a manifest index (fat manifest).
#[derive(Debug, Deserialize)]
struct IndexEntry {
    digest: String,
    platform: Option<Platform>,
}

/// Manifest index / manifest list (multi-platform).
#[derive(Debug, Deserialize)]
struct ImageIndex {
    manifests: Vec<IndexEntry>,
}

/// Bearer token response from a registry auth endpoint.
#[derive(Deserialize)]
struct TokenResp {
    token: String,
}

/// Registry client with per-repository bearer token caching.
#[derive(Debug, Default)]
pub struct Client {
    tokens: HashMap<String, String>,
}

impl Client {
    /// Creates a client with an empty token cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves `reference` to a single-platform manifest, following a
    /// manifest index to the host architecture's entry if present.
    pub fn pull_manifest(&mut self, reference: &Reference) -> Result<ImageManifest> {
        let url = format!(
            "{}/{}/manifests/{}",
            reference.api_base(),
            reference.repository,
            reference.tag
        );
        let body = self.request(reference, &url, ACCEPT_MANIFEST)?;
        let value: serde_json::Value = serde_json::from_slice(&body)?;

        if value.get("manifests").is_some() {
            let index: ImageIndex = serde_json::from_value(value)?;
            let entry = select_platform(&index)?;
            let platform_url = format!(
                "{}/{}/manifests/{}",
                reference.api_base(),
                reference.repository,
                entry.digest
            );
            let platform_body = self.request(reference, &platform_url, ACCEPT_MANIFEST)?;
            Ok(serde_json::from_slice(&platform_body)?)
        } else {
            Ok(serde_json::from_value(value)?)
        }
    }

    /// Fetches a blob (config or layer) into memory.
    pub fn fetch_blob(&mut self, reference: &Reference, digest: &str) -> Result<Vec<u8>> {
        let url = format!(
            "{}/{}/blobs/{}",
            reference.api_base(),
            reference.repository,
            digest
        );
        self.request(reference, &url, "*/*")
    }

    /// Streams a blob (typically a layer tarball) directly to `dest`,
    /// hashing it as it writes and rejecting it if the content doesn't match
    /// `digest`.
    pub fn download_blob(&mut self, reference: &Reference, digest: &str, dest: &Path) -> Result<()> {
        let url = format!(
            "{}/{}/blobs/{}",
            reference.api_base(),
            reference.repository,
            digest
        );
        let token = self.ensure_token(reference);

        let mut req = ureq::get(&url);
        if let Some(ref t) = token {
            req = req.header("Authorization", &format!("Bearer {t}"));
        }
        let resp = req.call().map_err(|e| Error::Http(e.to_string()))?;

        let file = File::create(dest)?;
        let mut writer = HashingWriter::new(file);
        let mut reader = resp.into_body().into_reader();
        std::io::copy(&mut reader, &mut writer)?;
        let (mut file, got) = writer.finish();
        file.flush()?;

        if got != digest {
            return Err(Error::Http(format!(
                "blob digest mismatch: expected {digest}, got {got}"
            )));
        }
        Ok(())
    }

    /// Performs an authenticated GET and returns the response body.
    fn request(&mut self, reference: &Reference, url: &str, accept: &str) -> Result<Vec<u8>> {
        let token = self.ensure_token(reference);

        let mut req = ureq::get(url).header("Accept", accept);
        if let Some(ref t) = token {
            req = req.header("Authorization", &format!("Bearer {t}"));
        }

        let resp = req.call().map_err(|e| Error::Http(e.to_string()))?;
        let mut body = Vec::new();
        resp.into_body()
            .into_reader()
            .read_to_end(&mut body)
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(body)
    }

    /// Returns a cached bearer token, fetching one if needed for known registries.
    fn ensure_token(&mut self, reference: &Reference) -> Option<String> {
        let key = format!("{}/{}", reference.registry, reference.repository);
        if let Some(token) = self.tokens.get(&key) {
            return Some(token.clone());
        }

        let (realm, service) = match reference.registry.as_str() {
            "docker.io" => ("https://auth.docker.io/token", "registry.docker.io"),
            "ghcr.io" => ("https://ghcr.io/token", "ghcr.io"),
            _ => return None,
        };

        let token = fetch_bearer_token(realm, service, &reference.repository).ok()?;
        self.tokens.insert(key, token.clone());
        Some(token)
    }
}

/// Fetches a bearer token scoped to anonymous pull of `repository`.
fn fetch_bearer_token(realm: &str, service: &str, repository: &str) -> Result<String> {
    let scope = format!("repository:{repository}:pull");
    let url = format!("{realm}?service={service}&scope={scope}");

    let resp = ureq::get(&url).call().map_err(|e| Error::Http(e.to_string()))?;
    let mut body = Vec::new();
    resp.into_body()
        .into_reader()
        .read_to_end(&mut body)
        .map_err(|e| Error::Http(e.to_string()))?;

    let t: TokenResp = serde_json::from_slice(&body)?;
    Ok(t.token)
}

/// Selects the manifest index entry matching the host architecture and `linux`.
fn select_platform(index: &ImageIndex) -> Result<&IndexEntry> {
    let arch = match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        other => other,
    };

    index
        .manifests
        .iter()
        .find(|m| {
            m.platform
                .as_ref()
                .is_some_and(|p| p.architecture == arch && p.os == "linux")
        })
        .ok_or_else(|| Error::NoPlatform {
            arch: arch.to_owned(),
            os: "linux".to_owned(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashing_writer_matches_known_sha256() {
        let mut writer = HashingWriter::new(Vec::new());
        writer.write_all(b"hello").unwrap();
        let (data, digest) = writer.finish();
        assert_eq!(data, b"hello");
        assert_eq!(
            digest,
            "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn select_platform_finds_matching_linux_entry() {
        let index = ImageIndex {
            manifests: vec![
                IndexEntry {
                    digest: "sha256:arm".into(),
                    platform: Some(Platform {
                        architecture: "arm64".into(),
                        os: "linux".into(),
                    }),
                },
                IndexEntry {
                    digest: "sha256:amd".into(),
                    platform: Some(Platform {
                        architecture: "amd64".into(),
                        os: "linux".into(),
                    }),
                },
            ],
        };
        let arch = if cfg!(target_arch = "aarch64") {
            "sha256:arm"
        } else {
            "sha256:amd"
        };
        // Only assert for the architectures this client maps; other hosts
        // are expected to fail selection, which is covered by the error path.
        if matches!(std::env::consts::ARCH, "x86_64" | "aarch64") {
            assert_eq!(select_platform(&index).unwrap().digest, arch);
        }
    }
}
