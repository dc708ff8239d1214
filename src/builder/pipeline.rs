use crate::builder::manifest::load_manifest;
use crate::builder::recipe::Recipe;
use crate::builder::steps::BuildStep;
use crate::errors::BuildError;
use crate::image::{
    copy_tree, digest_bytes, digest_dir, digest_file, ImageManifest, LayerRef, LayerStore,
};
use crate::installer::Installer;
use chrono::Utc;
use colored::Colorize;
use log::{debug, info};
use std::fs;
use std::sync::Arc;

/// Runs the build pipeline for one recipe: resolve the base, copy the
/// dependency manifest, install dependencies, copy the payload tree.
/// Layers are content-addressed, so a step whose inputs are unchanged is
/// satisfied from the store instead of being re-executed. In particular,
/// payload-only changes never re-run dependency installation.
pub struct ImageBuilder {
    store: Arc<LayerStore>,
    installer: Arc<dyn Installer + Send + Sync>,
    recipe: Recipe,
}

impl ImageBuilder {
    pub fn new(
        store: Arc<LayerStore>,
        installer: Arc<dyn Installer + Send + Sync>,
        recipe: Recipe,
    ) -> Self {
        ImageBuilder {
            store,
            installer,
            recipe,
        }
    }

    pub fn recipe(&self) -> &Recipe {
        &self.recipe
    }

    fn step_status(&self, step: BuildStep, cached: bool) {
        let state = if cached {
            "CACHED".white().bold()
        } else {
            "DONE".green().bold()
        };
        println!(
            "       {}  {:<22} [ {} ]",
            "step".blue().bold(),
            step.label(),
            state
        );
    }

    pub async fn build(&self) -> Result<ImageManifest, BuildError> {
        let recipe = &self.recipe;
        info!("Building image '{}' from {}", recipe.name(), recipe.recipe_dir().display());

        // Everything below is validated before any step executes, so a
        // missing manifest or payload fails the build with no partial work.
        if !self.store.has_base(recipe.base()) {
            return Err(BuildError::UnknownBase(recipe.base().to_string()));
        }
        let manifest_path = recipe.manifest_path();
        let dependencies = load_manifest(&manifest_path)?;
        debug!("Manifest declares {} dependencies", dependencies.len());
        let payload_dir = recipe.payload_dir();
        if !payload_dir.is_dir() {
            return Err(BuildError::PayloadUnreadable(payload_dir));
        }

        let workdir_rel = recipe.workdir().trim_start_matches('/').to_string();
        let mut layers = Vec::new();

        // The base is pinned by ref; its id anchors the layer chain.
        let base_id = LayerStore::layer_id(None, BuildStep::ResolveBase.label(), recipe.base());
        self.step_status(BuildStep::ResolveBase, true);

        // Layer 1: the dependency manifest, copied into the workdir before
        // anything else. The workdir and manifest filename take part in the
        // step input: they decide where files land inside the layer tree,
        // so recipes differing only there must not share cached layers.
        let manifest_digest = digest_file(&manifest_path)?;
        let manifest_input = digest_bytes(
            format!(
                "{}\0{}\0{}",
                recipe.workdir(),
                recipe.manifest_file(),
                manifest_digest
            )
            .as_bytes(),
        );
        let manifest_layer = LayerStore::layer_id(
            Some(&base_id),
            BuildStep::CopyManifest.label(),
            &manifest_input,
        );
        if self.store.has_layer(&manifest_layer) {
            self.step_status(BuildStep::CopyManifest, true);
        } else {
            let staging = self.store.stage_layer()?;
            let workdir = staging.join("fs").join(&workdir_rel);
            fs::create_dir_all(&workdir)?;
            fs::copy(&manifest_path, workdir.join(recipe.manifest_file()))?;
            self.store.commit_layer(&manifest_layer, &staging)?;
            self.step_status(BuildStep::CopyManifest, false);
        }
        layers.push(LayerRef {
            id: manifest_layer.clone(),
            step: BuildStep::CopyManifest.label().to_string(),
        });

        // Layer 2: installed dependencies. Cached whenever the manifest and
        // base are unchanged, regardless of payload edits.
        let install_layer = LayerStore::layer_id(
            Some(&manifest_layer),
            BuildStep::InstallDependencies.label(),
            &manifest_input,
        );
        if self.store.has_layer(&install_layer) {
            info!("Dependency layer {} reused from cache", &install_layer[..12]);
            self.step_status(BuildStep::InstallDependencies, true);
        } else {
            let staging = self.store.stage_layer()?;
            let workdir = staging.join("fs").join(&workdir_rel);
            fs::create_dir_all(&workdir)?;
            match self.installer.install(&manifest_path, &workdir).await {
                Ok(_) => {
                    self.store.commit_layer(&install_layer, &staging)?;
                    self.step_status(BuildStep::InstallDependencies, false);
                }
                Err(output) => {
                    self.store.discard_staging(&staging);
                    return Err(BuildError::StepFailed {
                        step: BuildStep::InstallDependencies.label().to_string(),
                        output,
                    });
                }
            }
        }
        layers.push(LayerRef {
            id: install_layer.clone(),
            step: BuildStep::InstallDependencies.label().to_string(),
        });

        // Layer 3: the application tree, overlaying the workdir.
        let payload_digest = digest_dir(&payload_dir)
            .map_err(|_| BuildError::PayloadUnreadable(payload_dir.clone()))?;
        let payload_input =
            digest_bytes(format!("{}\0{}", recipe.workdir(), payload_digest).as_bytes());
        let payload_layer = LayerStore::layer_id(
            Some(&install_layer),
            BuildStep::CopyPayload.label(),
            &payload_input,
        );
        if self.store.has_layer(&payload_layer) {
            self.step_status(BuildStep::CopyPayload, true);
        } else {
            let staging = self.store.stage_layer()?;
            let workdir = staging.join("fs").join(&workdir_rel);
            fs::create_dir_all(&workdir)?;
            copy_tree(&payload_dir, &workdir)?;
            self.store.commit_layer(&payload_layer, &staging)?;
            self.step_status(BuildStep::CopyPayload, false);
        }
        layers.push(LayerRef {
            id: payload_layer.clone(),
            step: BuildStep::CopyPayload.label().to_string(),
        });

        // The manifest is published only after every layer succeeded; a
        // failed build leaves no image behind.
        let manifest = ImageManifest {
            id: payload_layer,
            name: recipe.name(),
            base: recipe.base().to_string(),
            layers,
            workdir: recipe.workdir().to_string(),
            port: recipe.port(),
            entrypoint: recipe.entrypoint().clone(),
            created_at: Utc::now(),
        };
        self.store.write_image(&manifest)?;
        info!("Published image '{}' ({})", manifest.name, manifest.short_id());
        Ok(manifest)
    }
}
