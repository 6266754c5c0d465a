//! Image source string parsing: `name[:tag]`.

use std::fmt;

const DEFAULT_REGISTRY: &str = "docker.io";
const DEFAULT_TAG: &str = "latest";
const OFFICIAL_REPO_PREFIX: &str = "library";

/// A parsed `name[:tag]` image source, resolved to a registry + repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Registry hostname (e.g. `docker.io`, `ghcr.io`).
    pub registry: String,
    /// Repository path (e.g. `library/alpine`, `org/app`).
    pub repository: String,
    /// Tag (defaults to `latest`).
    pub tag: String,
}

impl Reference {
    /// Parses `source` as `name[:tag]`, defaulting the tag to `latest`.
    pub fn parse(source: &str) -> crate::Result<Self> {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return Err(crate::Error::InvalidReference("empty image reference".into()));
        }

        let (registry, repo_with_tag) = match trimmed.split_once('/') {
            Some((first, rest)) if is_registry(first) => (first.to_owned(), rest.to_owned()),
            _ => {
                let repo = if trimmed.contains('/') {
                    trimmed.to_owned()
                } else {
                    format!("{OFFICIAL_REPO_PREFIX}/{trimmed}")
                };
                (DEFAULT_REGISTRY.to_owned(), repo)
            }
        };

        let (repository, tag) = match repo_with_tag.rsplit_once(':') {
            Some((repo, tag)) => (repo.to_owned(), tag.to_owned()),
            None => (repo_with_tag, DEFAULT_TAG.to_owned()),
        };

        Ok(Self {
            registry,
            repository,
            tag,
        })
    }

    /// Returns the registry's v2 API base URL.
    pub fn api_base(&self) -> String {
        let host = match self.registry.as_str() {
            "docker.io" => "registry-1.docker.io",
            other => other,
        };
        format!("https://{host}/v2")
    }

    /// Returns the bare image name (without registry or tag), as used as the
    /// key into the name/tag index.
    pub fn name(&self) -> &str {
        &self.repository
    }
}

/// Returns `true` if the string looks like a registry hostname rather than
/// the first path component of a repository.
fn is_registry(s: &str) -> bool {
    s.contains('.') || s.contains(':') || s == "localhost"
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.registry, self.repository, self.tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bare_name_defaults_registry_and_tag() {
        let r = Reference::parse("alpine").unwrap();
        assert_eq!(r.registry, "docker.io");
        assert_eq!(r.repository, "library/alpine");
        assert_eq!(r.tag, "latest");
    }

    #[test]
    fn parse_with_explicit_tag() {
        let r = Reference::parse("alpine:3.19").unwrap();
        assert_eq!(r.repository, "library/alpine");
        assert_eq!(r.tag, "3.19");
    }

    #[test]
    fn parse_user_repo() {
        let r = Reference::parse("myuser/myapp:v1").unwrap();
        assert_eq!(r.registry, "docker.io");
        assert_eq!(r.repository, "myuser/myapp");
        assert_eq!(r.tag, "v1");
    }

    #[test]
    fn parse_custom_registry() {
        let r = Reference::parse("ghcr.io/org/app:latest").unwrap();
        assert_eq!(r.registry, "ghcr.io");
        assert_eq!(r.repository, "org/app");
    }

    #[test]
    fn parse_localhost_with_port() {
        let r = Reference::parse("localhost:5000/test:v1").unwrap();
        assert_eq!(r.registry, "localhost:5000");
        assert_eq!(r.repository, "test");
        assert_eq!(r.tag, "v1");
    }

    #[test]
    fn parse_rejects_empty() {
        assert!(Reference::parse("").is_err());
        assert!(Reference::parse("   ").is_err());
    }
}
