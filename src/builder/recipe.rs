use crate::errors::BuildError;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const RECIPE_FILE: &str = "wharf.yaml";

fn default_workdir() -> String {
    "/app".to_string()
}

fn default_manifest() -> String {
    "requirements.txt".to_string()
}

fn default_payload() -> String {
    ".".to_string()
}

/// The single command a container runs: one interpreter invoked on one
/// entry file, with no further arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entrypoint {
    pub interpreter: String,
    pub script: String,
}

/// A declarative build recipe, loaded from `wharf.yaml` in the recipe
/// directory. Everything here is fixed at build time; the produced image
/// carries it as immutable metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    name: Option<String>,
    base: String,
    #[serde(default = "default_workdir")]
    workdir: String,
    #[serde(default = "default_manifest")]
    manifest: String,
    #[serde(default = "default_payload")]
    payload: String,
    port: Option<u16>,
    entrypoint: Entrypoint,

    #[serde(skip)]
    recipe_dir: PathBuf,
}

impl Recipe {
    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn workdir(&self) -> &str {
        &self.workdir
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn entrypoint(&self) -> &Entrypoint {
        &self.entrypoint
    }

    pub fn recipe_dir(&self) -> &Path {
        &self.recipe_dir
    }

    /// Image name, defaulting to the recipe directory's name.
    pub fn name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self
                .recipe_dir
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "image".to_string()),
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.payload_dir().join(&self.manifest)
    }

    pub fn manifest_file(&self) -> &str {
        &self.manifest
    }

    pub fn payload_dir(&self) -> PathBuf {
        self.recipe_dir.join(&self.payload)
    }

    pub fn load(recipe_dir: &Path) -> Result<Self, BuildError> {
        let path = recipe_dir.join(RECIPE_FILE);
        debug!("Loading recipe from {}", path.display());

        let contents = std::fs::read_to_string(&path).map_err(|e| {
            BuildError::Recipe(format!("could not read '{}': {}", path.display(), e))
        })?;

        let mut recipe: Recipe = serde_yaml::from_str(&contents).map_err(|e| {
            BuildError::Recipe(format!("could not parse '{}': {}", path.display(), e))
        })?;
        recipe.recipe_dir = recipe_dir.to_path_buf();
        recipe.validate()?;

        trace!("Loaded recipe: {:?}", recipe);
        Ok(recipe)
    }

    fn validate(&self) -> Result<(), BuildError> {
        if self.base.trim().is_empty() {
            return Err(BuildError::Recipe("base image ref must not be empty".into()));
        }
        if !self.workdir.starts_with('/') {
            return Err(BuildError::Recipe(format!(
                "workdir '{}' must be an absolute path",
                self.workdir
            )));
        }
        if self.entrypoint.interpreter.trim().is_empty() {
            return Err(BuildError::Recipe(
                "entrypoint interpreter must not be empty".into(),
            ));
        }
        if self.entrypoint.script.trim().is_empty() {
            return Err(BuildError::Recipe(
                "entrypoint script must not be empty".into(),
            ));
        }
        if Path::new(&self.entrypoint.script).is_absolute() {
            return Err(BuildError::Recipe(format!(
                "entrypoint script '{}' must be relative to the workdir",
                self.entrypoint.script
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_recipe(dir: &Path, contents: &str) {
        std::fs::write(dir.join(RECIPE_FILE), contents).unwrap();
    }

    #[test]
    fn load_applies_defaults() {
        let dir = tempfile::tempdir().unwrap();
        write_recipe(
            dir.path(),
            "base: python-3.13-slim\nport: 8000\nentrypoint:\n  interpreter: python3\n  script: main.py\n",
        );

        let recipe = Recipe::load(dir.path()).unwrap();
        assert_eq!(recipe.workdir(), "/app");
        assert_eq!(recipe.manifest_file(), "requirements.txt");
        assert_eq!(recipe.payload_dir(), dir.path().join("."));
        assert_eq!(recipe.port(), Some(8000));
        assert_eq!(recipe.entrypoint().script, "main.py");
    }

    #[test]
    fn name_defaults_to_directory_name() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("hello-service");
        std::fs::create_dir(&dir).unwrap();
        write_recipe(
            &dir,
            "base: python-3.13-slim\nentrypoint:\n  interpreter: python3\n  script: main.py\n",
        );

        let recipe = Recipe::load(&dir).unwrap();
        assert_eq!(recipe.name(), "hello-service");
    }

    #[test]
    fn missing_recipe_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Recipe::load(dir.path()).unwrap_err();
        assert!(matches!(err, BuildError::Recipe(_)));
    }

    #[test]
    fn relative_workdir_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_recipe(
            dir.path(),
            "base: python-3.13-slim\nworkdir: app\nentrypoint:\n  interpreter: python3\n  script: main.py\n",
        );

        let err = Recipe::load(dir.path()).unwrap_err();
        assert!(matches!(err, BuildError::Recipe(_)));
    }

    #[test]
    fn absolute_entry_script_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_recipe(
            dir.path(),
            "base: python-3.13-slim\nentrypoint:\n  interpreter: python3\n  script: /srv/main.py\n",
        );

        let err = Recipe::load(dir.path()).unwrap_err();
        assert!(matches!(err, BuildError::Recipe(_)));
    }
}
