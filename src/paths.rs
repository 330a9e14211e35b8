// src/paths.rs
// Output location resolution: sandbox root for relative paths, never the install tree

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

use crate::config::{OutputConfig, SandboxPolicy};
use crate::error::{OutputError, Result};

pub struct PathResolver {
    config: Arc<OutputConfig>,
    install_dir: PathBuf,
}

impl PathResolver {
    pub fn new(config: Arc<OutputConfig>) -> Self {
        Self {
            config,
            install_dir: detect_install_dir(),
        }
    }

    /// Override the directory treated as the service's own installation.
    pub fn with_install_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.install_dir = canonical_or_normalized(dir.as_ref());
        self
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    /// Resolve `location` (or the configured default directory) to a writable
    /// directory and return the full path of `filename` inside it.
    pub async fn resolve(&self, location: Option<&str>, filename: &str) -> Result<PathBuf> {
        let base = location.unwrap_or(self.config.default_output_dir.as_str());
        let base_path = PathBuf::from(base);
        let sandbox_root = self.config.client_root.as_deref().map(canonical_or_normalized);

        let dir = if base_path.is_absolute() {
            let dir = canonicalize_existing(&normalize(&base_path)).await;
            if self.config.sandbox_policy == SandboxPolicy::Deny {
                match &sandbox_root {
                    Some(root) if dir.starts_with(root) => {}
                    Some(root) => {
                        return Err(OutputError::OutsideSandbox {
                            path: dir,
                            root: root.clone(),
                        });
                    }
                    None => return Err(OutputError::NoSandboxRoot { path: base_path }),
                }
            }
            dir
        } else {
            let root = sandbox_root.ok_or_else(|| OutputError::NoSandboxRoot {
                path: base_path.clone(),
            })?;
            let joined = normalize(&root.join(&base_path));
            if !joined.starts_with(&root) {
                return Err(OutputError::OutsideSandbox { path: joined, root });
            }
            // Symlinks inside the sandbox may still point elsewhere
            let dir = canonicalize_existing(&joined).await;
            if !dir.starts_with(&root) {
                return Err(OutputError::OutsideSandbox { path: dir, root });
            }
            dir
        };

        if dir.starts_with(&self.install_dir) {
            warn!(path = %dir.display(), install_dir = %self.install_dir.display(), "Refusing to write inside install tree");
            return Err(OutputError::InsideInstallTree {
                path: dir,
                install_dir: self.install_dir.clone(),
            });
        }

        if let Ok(meta) = tokio::fs::metadata(&dir).await
            && !meta.is_dir()
        {
            return Err(OutputError::InvalidLocation {
                location: base.to_string(),
                reason: "points at an existing file, expected a directory".to_string(),
            });
        }

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| OutputError::DirectoryCreation {
                path: dir.clone(),
                source,
            })?;

        probe_writable(&dir).await?;

        debug!(dir = %dir.display(), filename, "Resolved output path");
        Ok(dir.join(filename))
    }
}

/// Create and delete a zero-byte marker file.
async fn probe_writable(dir: &Path) -> Result<()> {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    let marker = dir.join(format!(".write_probe_{}_{}", std::process::id(), nanos));

    let not_writable = |source| OutputError::NotWritable {
        path: dir.to_path_buf(),
        source,
    };
    tokio::fs::File::create(&marker).await.map_err(not_writable)?;
    tokio::fs::remove_file(&marker).await.map_err(not_writable)?;
    Ok(())
}

fn detect_install_dir() -> PathBuf {
    let dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")));
    canonical_or_normalized(&dir)
}

fn canonical_or_normalized(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| normalize(path))
}

/// Lexically resolve `.` and `..` without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Canonicalize the deepest existing ancestor and re-append the missing tail.
async fn canonicalize_existing(path: &Path) -> PathBuf {
    let mut existing = path.to_path_buf();
    let mut missing = Vec::new();

    loop {
        if let Ok(canonical) = tokio::fs::canonicalize(&existing).await {
            let mut result = canonical;
            for part in missing.iter().rev() {
                result.push(part);
            }
            return result;
        }
        match (existing.file_name(), existing.parent()) {
            (Some(name), Some(parent)) => {
                missing.push(name.to_os_string());
                existing = parent.to_path_buf();
            }
            _ => return path.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        root: PathBuf,
        install: PathBuf,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let base = std::fs::canonicalize(tmp.path()).unwrap();
        let root = base.join("project");
        let install = base.join("install");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::create_dir_all(&install).unwrap();
        Fixture {
            _tmp: tmp,
            root,
            install,
        }
    }

    fn resolver(root: Option<&Path>, install: &Path, policy: SandboxPolicy) -> PathResolver {
        let config = OutputConfig {
            client_root: root.map(Path::to_path_buf),
            sandbox_policy: policy,
            ..Default::default()
        };
        PathResolver::new(Arc::new(config)).with_install_dir(install)
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize(Path::new("a/../../b")), PathBuf::from("../b"));
    }

    #[tokio::test]
    async fn test_relative_without_root_fails() {
        let fx = fixture();
        let resolver = resolver(None, &fx.install, SandboxPolicy::Allow);
        let err = resolver
            .resolve(Some("./unsandboxed_out_dir"), "a.csv")
            .await
            .unwrap_err();
        assert!(matches!(err, OutputError::NoSandboxRoot { .. }));
        assert!(!Path::new("./unsandboxed_out_dir").exists());
    }

    #[tokio::test]
    async fn test_default_dir_is_relative_and_needs_root() {
        let fx = fixture();
        let resolver = resolver(None, &fx.install, SandboxPolicy::Allow);
        assert!(matches!(
            resolver.resolve(None, "a.csv").await,
            Err(OutputError::NoSandboxRoot { .. })
        ));
    }

    #[tokio::test]
    async fn test_relative_with_root_is_created() {
        let fx = fixture();
        let resolver = resolver(Some(&fx.root), &fx.install, SandboxPolicy::Allow);
        let path = resolver.resolve(Some("reports/daily"), "a.csv").await.unwrap();
        assert_eq!(path, fx.root.join("reports/daily/a.csv"));
        assert!(fx.root.join("reports/daily").is_dir());
        // Probe marker is cleaned up
        assert_eq!(std::fs::read_dir(fx.root.join("reports/daily")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_resolution_is_idempotent() {
        let fx = fixture();
        let resolver = resolver(Some(&fx.root), &fx.install, SandboxPolicy::Allow);
        let first = resolver.resolve(Some("out"), "r.json").await.unwrap();
        let second = resolver.resolve(Some("out"), "r.json").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_absolute_inside_install_tree_fails() {
        let fx = fixture();
        let resolver = resolver(Some(&fx.root), &fx.install, SandboxPolicy::Allow);
        let target = fx.install.join("data");
        let err = resolver
            .resolve(Some(target.to_str().unwrap()), "a.csv")
            .await
            .unwrap_err();
        assert!(matches!(err, OutputError::InsideInstallTree { .. }));
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_root_inside_install_tree_fails() {
        let fx = fixture();
        let resolver = resolver(Some(&fx.install), &fx.install, SandboxPolicy::Allow);
        assert!(matches!(
            resolver.resolve(Some("out"), "a.csv").await,
            Err(OutputError::InsideInstallTree { .. })
        ));
    }

    #[tokio::test]
    async fn test_parent_escape_rejected() {
        let fx = fixture();
        let resolver = resolver(Some(&fx.root), &fx.install, SandboxPolicy::Allow);
        assert!(matches!(
            resolver.resolve(Some("../elsewhere"), "a.csv").await,
            Err(OutputError::OutsideSandbox { .. })
        ));
    }

    #[tokio::test]
    async fn test_existing_file_in_root_is_invalid_location() {
        let fx = fixture();
        std::fs::write(fx.root.join("notes"), "x").unwrap();
        let resolver = resolver(Some(&fx.root), &fx.install, SandboxPolicy::Allow);
        let err = resolver.resolve(Some("notes"), "a.csv").await.unwrap_err();
        assert!(matches!(err, OutputError::InvalidLocation { .. }));
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
        assert!(fx.root.join("notes").is_file());
    }

    #[tokio::test]
    async fn test_location_resolves_against_root_not_cwd() {
        let fx = fixture();
        // The crate's working directory holds a Cargo.toml file; the root does not
        let resolver = resolver(Some(&fx.root), &fx.install, SandboxPolicy::Allow);
        let path = resolver.resolve(Some("Cargo.toml"), "a.csv").await.unwrap();
        assert_eq!(path, fx.root.join("Cargo.toml").join("a.csv"));
        assert!(fx.root.join("Cargo.toml").is_dir());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_into_install_tree_rejected() {
        let fx = fixture();
        std::os::unix::fs::symlink(&fx.install, fx.root.join("link")).unwrap();
        let resolver = resolver(Some(&fx.root), &fx.install, SandboxPolicy::Allow);
        let err = resolver.resolve(Some("link/out"), "a.csv").await.unwrap_err();
        assert!(matches!(
            err,
            OutputError::OutsideSandbox { .. } | OutputError::InsideInstallTree { .. }
        ));
    }

    #[tokio::test]
    async fn test_absolute_outside_root_respects_policy() {
        let fx = fixture();
        let outside = fx.root.parent().unwrap().join("elsewhere");
        let outside_str = outside.to_str().unwrap();

        let allow = resolver(Some(&fx.root), &fx.install, SandboxPolicy::Allow);
        let path = allow.resolve(Some(outside_str), "a.csv").await.unwrap();
        assert_eq!(path, outside.join("a.csv"));

        let deny = resolver(Some(&fx.root), &fx.install, SandboxPolicy::Deny);
        assert!(matches!(
            deny.resolve(Some(outside_str), "a.csv").await,
            Err(OutputError::OutsideSandbox { .. })
        ));
    }
}
