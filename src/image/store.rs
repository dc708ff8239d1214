use crate::errors::{BuildError, LaunchError};
use crate::image::ImageManifest;
use log::{debug, trace};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use uuid::Uuid;
use walkdir::WalkDir;

/// Content-addressed store for base filesystems, immutable layers, image
/// manifests, and materialized run directories.
///
/// Layout under the store root:
///   bases/<ref>/        pre-seeded base filesystem trees
///   layers/<id>/fs/     committed layer trees
///   images/<name>.json  image manifests
///   runs/<uuid>/        materialized root filesystems
///   tmp/<uuid>/         staging areas for in-flight layers
pub struct LayerStore {
    root: PathBuf,
}

pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

pub fn digest_file(path: &Path) -> std::io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Digest of a directory tree: the sha256 of the sorted stream of relative
/// paths and per-file digests. Two trees with identical contents produce
/// identical digests regardless of where they live on disk.
pub fn digest_dir(path: &Path) -> std::io::Result<String> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::other)?;
        if entry.file_type().is_file() {
            let relative = entry
                .path()
                .strip_prefix(path)
                .map_err(std::io::Error::other)?
                .to_string_lossy()
                .to_string();
            entries.push((relative, digest_file(entry.path())?));
        }
    }
    entries.sort();

    let mut hasher = Sha256::new();
    for (relative, digest) in entries {
        hasher.update(relative.as_bytes());
        hasher.update([0u8]);
        hasher.update(digest.as_bytes());
        hasher.update([b'\n']);
    }
    Ok(hex::encode(hasher.finalize()))
}

pub fn copy_tree(src: &Path, dst: &Path) -> std::io::Result<()> {
    trace!("Copying tree {} -> {}", src.display(), dst.display());
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(std::io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(std::io::Error::other)?;
        let target = dst.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        } else {
            // Symlinks and other special files are not carried into layers.
            log::warn!(
                "Skipping non-regular file {} while copying tree",
                entry.path().display()
            );
        }
    }
    Ok(())
}

impl LayerStore {
    pub fn open(root: &Path) -> std::io::Result<Self> {
        for subdir in ["bases", "layers", "images", "runs", "tmp"] {
            fs::create_dir_all(root.join(subdir))?;
        }
        debug!("Opened layer store at {}", root.display());
        Ok(LayerStore {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn base_dir(&self, base_ref: &str) -> PathBuf {
        self.root.join("bases").join(base_ref)
    }

    pub fn has_base(&self, base_ref: &str) -> bool {
        self.base_dir(base_ref).is_dir()
    }

    /// Derives a layer id from its parent, its step label, and a digest of
    /// the step's inputs. Identical inputs always derive identical ids,
    /// which is what makes cached layers reusable across rebuilds.
    pub fn layer_id(parent: Option<&str>, step_label: &str, input_digest: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(b"wharf-layer\0");
        hasher.update(parent.unwrap_or("").as_bytes());
        hasher.update([0u8]);
        hasher.update(step_label.as_bytes());
        hasher.update([0u8]);
        hasher.update(input_digest.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn layer_fs(&self, id: &str) -> PathBuf {
        self.root.join("layers").join(id).join("fs")
    }

    pub fn has_layer(&self, id: &str) -> bool {
        self.layer_fs(id).is_dir()
    }

    /// Creates a fresh staging area for a layer under construction. The
    /// staged tree only becomes visible once `commit_layer` renames it
    /// into place; a failed step leaves nothing behind in `layers/`.
    pub fn stage_layer(&self) -> std::io::Result<PathBuf> {
        let staging = self.root.join("tmp").join(Uuid::new_v4().to_string());
        fs::create_dir_all(staging.join("fs"))?;
        Ok(staging)
    }

    pub fn commit_layer(&self, id: &str, staging: &Path) -> std::io::Result<()> {
        let layer_dir = self.root.join("layers").join(id);
        if layer_dir.exists() {
            // Another build committed the same layer first; ours is identical.
            trace!("Layer {} already committed, discarding staging", id);
            fs::remove_dir_all(staging)?;
            return Ok(());
        }
        fs::rename(staging, &layer_dir)?;
        debug!("Committed layer {}", id);
        Ok(())
    }

    pub fn discard_staging(&self, staging: &Path) {
        if let Err(e) = fs::remove_dir_all(staging) {
            log::warn!(
                "Failed to remove staging directory {}: {}",
                staging.display(),
                e
            );
        }
    }

    fn image_path(&self, name: &str) -> PathBuf {
        self.root.join("images").join(format!("{}.json", name))
    }

    pub fn write_image(&self, manifest: &ImageManifest) -> Result<(), BuildError> {
        let contents = serde_json::to_string_pretty(manifest)
            .map_err(|e| BuildError::Recipe(format!("could not serialize image manifest: {}", e)))?;
        fs::write(self.image_path(&manifest.name), contents)?;
        debug!("Published image '{}' ({})", manifest.name, manifest.id);
        Ok(())
    }

    pub fn load_image(&self, name: &str) -> Result<ImageManifest, LaunchError> {
        let path = self.image_path(name);
        let contents =
            fs::read_to_string(&path).map_err(|_| LaunchError::ImageNotFound(name.to_string()))?;
        serde_json::from_str(&contents).map_err(|e| LaunchError::ImageCorrupt {
            name: name.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn list_images(&self) -> std::io::Result<Vec<ImageManifest>> {
        let mut images = Vec::new();
        for entry in fs::read_dir(self.root.join("images"))? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(name) = name.strip_suffix(".json") {
                match self.load_image(name) {
                    Ok(manifest) => images.push(manifest),
                    Err(e) => log::warn!("Skipping unreadable image '{}': {}", name, e),
                }
            }
        }
        images.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(images)
    }

    pub fn new_run_dir(&self) -> std::io::Result<PathBuf> {
        let run_dir = self.root.join("runs").join(Uuid::new_v4().to_string());
        fs::create_dir_all(&run_dir)?;
        Ok(run_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_ids_are_deterministic() {
        let a = LayerStore::layer_id(None, "copy-manifest", "abc");
        let b = LayerStore::layer_id(None, "copy-manifest", "abc");
        assert_eq!(a, b);
    }

    #[test]
    fn layer_ids_change_with_any_input() {
        let base = LayerStore::layer_id(Some("p"), "install-dependencies", "abc");
        assert_ne!(base, LayerStore::layer_id(Some("q"), "install-dependencies", "abc"));
        assert_ne!(base, LayerStore::layer_id(Some("p"), "copy-payload", "abc"));
        assert_ne!(base, LayerStore::layer_id(Some("p"), "install-dependencies", "abd"));
    }

    #[test]
    fn directory_digest_ignores_location() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        for dir in [a.path(), b.path()] {
            std::fs::create_dir(dir.join("sub")).unwrap();
            std::fs::write(dir.join("one.txt"), "one").unwrap();
            std::fs::write(dir.join("sub/two.txt"), "two").unwrap();
        }
        assert_eq!(digest_dir(a.path()).unwrap(), digest_dir(b.path()).unwrap());
    }

    #[test]
    fn directory_digest_tracks_content_changes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.py"), "print('a')").unwrap();
        let before = digest_dir(dir.path()).unwrap();
        std::fs::write(dir.path().join("main.py"), "print('b')").unwrap();
        let after = digest_dir(dir.path()).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn commit_makes_layer_visible_and_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let store = LayerStore::open(root.path()).unwrap();
        let id = LayerStore::layer_id(None, "copy-manifest", "x");

        let staging = store.stage_layer().unwrap();
        std::fs::write(staging.join("fs/requirements.txt"), "fastapi").unwrap();
        store.commit_layer(&id, &staging).unwrap();
        assert!(store.has_layer(&id));

        // Re-committing the same id discards the duplicate staging area.
        let staging = store.stage_layer().unwrap();
        store.commit_layer(&id, &staging).unwrap();
        assert!(store.has_layer(&id));
        assert!(!staging.exists());
    }

    #[test]
    fn copy_tree_preserves_structure() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(src.path().join("pkg/inner")).unwrap();
        std::fs::write(src.path().join("pkg/inner/mod.py"), "x = 1").unwrap();
        copy_tree(src.path(), dst.path()).unwrap();
        assert_eq!(
            std::fs::read_to_string(dst.path().join("pkg/inner/mod.py")).unwrap(),
            "x = 1"
        );
    }

    #[cfg(unix)]
    #[test]
    fn copy_tree_skips_symlinks_without_failing() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("real.txt"), "real").unwrap();
        std::os::unix::fs::symlink(src.path().join("real.txt"), src.path().join("link.txt"))
            .unwrap();

        copy_tree(src.path(), dst.path()).unwrap();
        assert!(dst.path().join("real.txt").is_file());
        assert!(!dst.path().join("link.txt").exists());
    }
}
