//! Policies translate a logical URI into the physical identifier an adapter opens.
//!
//! [`AnchorPolicy`] is the filesystem sandbox: logical paths of the form
//! `<anchor>/<relative/path>` are mapped onto pre-registered base directories
//! and the canonical result is never allowed to leave its anchor.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use indexmap::IndexMap;
use tracing::debug;

use crate::error::{Result, StreamError};

/// Resolves logical URIs for one protocol.
pub trait StreamPolicy: Send + Sync + fmt::Debug {
    /// Translates `uri` into the physical identifier the adapter will open.
    ///
    /// # Errors
    ///
    /// Returns an error if `uri` is not permitted by this policy.
    fn resolve(&self, uri: &str) -> Result<String>;

    /// Pre-flight check on an identifier produced by [`StreamPolicy::resolve`].
    ///
    /// # Errors
    ///
    /// Returns an error if `resolved` is outside what the policy allows.
    fn validate_access(&self, resolved: &str) -> Result<()> {
        let _ = resolved;
        Ok(())
    }
}

/// Anchor-based path sandbox.
#[derive(Debug, Clone)]
pub struct AnchorPolicy {
    anchors: IndexMap<String, PathBuf>,
}

impl AnchorPolicy {
    /// Builds a policy from `key => directory` pairs.
    ///
    /// Directories are canonicalized once here; relative ones resolve against
    /// the current working directory.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::AnchorMissing`] if any directory does not exist.
    /// Anchors are never created by this crate.
    pub fn new<K, P, I>(anchors: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, P)>,
        K: Into<String>,
        P: AsRef<Path>,
    {
        let mut registered = IndexMap::new();
        for (key, dir) in anchors {
            let key = key.into();
            let dir = dir.as_ref();
            let canonical = match dir.canonicalize() {
                Ok(path) if path.is_dir() => path,
                _ => {
                    return Err(StreamError::AnchorMissing {
                        key,
                        path: dir.to_path_buf(),
                    });
                }
            };
            registered.insert(key, canonical);
        }
        Ok(Self {
            anchors: registered,
        })
    }

    /// Resolves `identifier` into a canonical absolute path inside an anchor.
    ///
    /// After the key, a leading run of segments equal to the anchor
    /// directory's own name is dropped (`data/data/x` becomes `<anchor>/x`).
    /// Only that final directory name is matched, never other ancestors.
    ///
    /// # Errors
    ///
    /// - [`StreamError::Unauthorized`] if the first segment is not an anchor key.
    /// - [`StreamError::PathTraversal`] if the result would leave the anchor.
    pub fn resolve_path(&self, identifier: &str) -> Result<PathBuf> {
        let stripped = identifier
            .split_once("://")
            .map_or(identifier, |(_, rest)| rest);

        // Already-resolved absolute paths come back unchanged.
        let raw = Path::new(stripped);
        if raw.is_absolute() {
            let canonical = canonicalize_lenient(raw)?;
            if self.owning_anchor(&canonical).is_some() {
                debug!(
                    input = identifier,
                    output = %canonical.display(),
                    "anchored path (absolute)"
                );
                return Ok(canonical);
            }
            if let Some(anchor) = self.anchors.values().find(|a| raw.starts_with(a)) {
                return Err(StreamError::PathTraversal {
                    path: canonical,
                    anchor: anchor.clone(),
                });
            }
        }

        let relative = stripped.trim_start_matches(['/', '\\']);
        let mut components = Path::new(relative)
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .peekable();

        let key = match components.next() {
            Some(Component::Normal(key)) => key.to_string_lossy().into_owned(),
            _ => {
                return Err(StreamError::config(
                    "AnchorPolicy",
                    format!("'{identifier}' does not name an anchor"),
                ));
            }
        };
        let Some(anchor) = self.anchors.get(&key) else {
            return Err(StreamError::Unauthorized {
                key,
                available: self.list_anchors(),
            });
        };

        // `data/data/x` against an anchor directory named `data` means `data/x`.
        if let Some(name) = anchor.file_name() {
            while components.next_if(|c| c.as_os_str() == name).is_some() {}
        }

        let mut joined = anchor.clone();
        joined.extend(components);
        let canonical = canonicalize_lenient(&joined)?;

        if !canonical.starts_with(anchor) {
            return Err(StreamError::PathTraversal {
                path: canonical,
                anchor: anchor.clone(),
            });
        }

        debug!(input = identifier, output = %canonical.display(), "anchored path");
        Ok(canonical)
    }

    /// Whether `key` is a registered anchor.
    #[must_use]
    pub fn has_anchor(&self, key: &str) -> bool {
        self.anchors.contains_key(key)
    }

    /// Registered keys in registration order.
    #[must_use]
    pub fn list_anchors(&self) -> Vec<String> {
        self.anchors.keys().cloned().collect()
    }

    /// Canonical directory of `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Unauthorized`] for an unknown key.
    pub fn anchor_path(&self, key: &str) -> Result<&Path> {
        self.anchors
            .get(key)
            .map(PathBuf::as_path)
            .ok_or_else(|| self.unauthorized(key))
    }

    /// Entries directly inside the anchor `key`, sorted by path.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Unauthorized`] for an unknown key, or an I/O
    /// error if the directory cannot be listed.
    pub fn list_contents(&self, key: &str) -> Result<Vec<PathBuf>> {
        let dir = self.anchor_path(key)?;
        let mut entries = fs::read_dir(dir)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<io::Result<Vec<_>>>()?;
        entries.sort();
        Ok(entries)
    }

    fn owning_anchor(&self, canonical: &Path) -> Option<&PathBuf> {
        self.anchors.values().find(|a| canonical.starts_with(a))
    }

    fn unauthorized(&self, key: &str) -> StreamError {
        StreamError::Unauthorized {
            key: key.to_string(),
            available: self.list_anchors(),
        }
    }
}

impl StreamPolicy for AnchorPolicy {
    fn resolve(&self, uri: &str) -> Result<String> {
        let path = self.resolve_path(uri)?;
        path.into_os_string().into_string().map_err(|raw| {
            StreamError::config(
                "AnchorPolicy",
                format!("resolved path {} is not valid UTF-8", Path::new(&raw).display()),
            )
        })
    }

    fn validate_access(&self, resolved: &str) -> Result<()> {
        if self.owning_anchor(Path::new(resolved)).is_some() {
            Ok(())
        } else {
            Err(self.unauthorized(resolved))
        }
    }
}

/// Canonicalizes an absolute path whose tail may not exist yet.
///
/// Existing prefixes are resolved through the filesystem (symlinks included);
/// missing components are applied lexically, which is sound because a
/// component that does not exist cannot be a symlink.
fn canonicalize_lenient(path: &Path) -> Result<PathBuf> {
    let mut resolved = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => resolved.push(component),
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            Component::Normal(name) => {
                resolved.push(name);
                if fs::symlink_metadata(&resolved).is_ok() {
                    resolved = resolved.canonicalize()?;
                }
            }
        }
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_anchor_is_fatal() {
        let dir = tempdir().unwrap();
        let err =
            AnchorPolicy::new([("bad_anchor", dir.path().join("missing_folder"))]).unwrap_err();
        assert!(matches!(err, StreamError::AnchorMissing { ref key, .. } if key == "bad_anchor"));
    }

    #[test]
    fn file_is_not_an_anchor() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("plain.txt");
        fs::write(&file, b"x").unwrap();
        assert!(AnchorPolicy::new([("f", &file)]).is_err());
    }

    #[test]
    fn lenient_canonicalization_handles_missing_tail() {
        let dir = tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let path = root.join("missing").join("..").join("other").join("./file.txt");
        assert_eq!(
            canonicalize_lenient(&path).unwrap(),
            root.join("other").join("file.txt")
        );
    }

    #[cfg(unix)]
    #[test]
    fn symlink_out_of_anchor_is_blocked() {
        let dir = tempdir().unwrap();
        let anchor = dir.path().join("data");
        let outside = dir.path().join("outside");
        fs::create_dir_all(&anchor).unwrap();
        fs::create_dir_all(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, anchor.join("escape")).unwrap();

        let policy = AnchorPolicy::new([("data", &anchor)]).unwrap();
        let err = policy.resolve_path("data/escape/secret.txt").unwrap_err();
        assert!(matches!(err, StreamError::PathTraversal { .. }));
    }

    #[test]
    fn accessors() {
        let dir = tempdir().unwrap();
        let data = dir.path().join("data");
        let logs = dir.path().join("logs");
        fs::create_dir_all(&data).unwrap();
        fs::create_dir_all(&logs).unwrap();
        fs::write(data.join("b.json"), b"{}").unwrap();
        fs::write(data.join("a.json"), b"{}").unwrap();

        let policy = AnchorPolicy::new([("data", &data), ("logs", &logs)]).unwrap();
        assert!(policy.has_anchor("data"));
        assert!(!policy.has_anchor("tmp"));
        assert_eq!(policy.list_anchors(), vec!["data", "logs"]);
        assert_eq!(policy.anchor_path("logs").unwrap(), logs.canonicalize().unwrap());

        let contents = policy.list_contents("data").unwrap();
        let names: Vec<_> = contents
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.json", "b.json"]);
        assert!(policy.list_contents("tmp").is_err());
    }

    #[test]
    fn validate_access_rejects_foreign_paths() {
        let dir = tempdir().unwrap();
        let policy = AnchorPolicy::new([("data", dir.path())]).unwrap();
        let inside = policy.resolve("data/x.log").unwrap();
        assert!(policy.validate_access(&inside).is_ok());
        assert!(policy.validate_access("/definitely/not/here").is_err());
    }
}
