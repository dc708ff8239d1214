use crate::utils::{first_which, run_command};
use async_trait::async_trait;
use colored::Colorize;
use core::fmt::Debug;
use log::{debug, info};
use std::path::Path;

impl Debug for dyn Installer + Send + Sync {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Installer")
    }
}

/// The dependency installation seam. The builder hands an installer the
/// dependency manifest and a target directory inside the layer being
/// staged; everything the installer writes under the target becomes part
/// of that layer.
#[async_trait]
pub trait Installer {
    /// Human-readable label for diagnostics.
    fn describe(&self) -> String;

    /// Installs the packages named by `manifest` into `target`. Returns
    /// the captured tool output on success and the failing step's output
    /// on a non-zero exit.
    async fn install(&self, manifest: &Path, target: &Path) -> Result<String, String>;
}

/// Installs Python packages with pip. The installer tool itself is
/// upgraded before the declared dependencies are installed, and the
/// download cache is disabled, so installs are reproducible across
/// rebuilds.
pub struct PipInstaller {
    python: String,
}

impl PipInstaller {
    pub fn resolve() -> Result<Self, String> {
        let python = first_which(vec!["python3", "python"])
            .ok_or_else(|| "No python interpreter found on the host".to_string())?;
        debug!("Resolved python interpreter: {}", python);
        Ok(PipInstaller { python })
    }
}

#[async_trait]
impl Installer for PipInstaller {
    fn describe(&self) -> String {
        format!("pip ({})", self.python)
    }

    async fn install(&self, manifest: &Path, target: &Path) -> Result<String, String> {
        info!("Upgrading pip before installing dependencies");
        run_command(
            "pip".cyan().bold(),
            &self.python,
            vec!["-m", "pip", "install", "--upgrade", "pip"],
        )
        .await?;

        let site_packages = target.join("site-packages");
        std::fs::create_dir_all(&site_packages)
            .map_err(|e| format!("Failed to create '{}': {}", site_packages.display(), e))?;
        let site_packages = site_packages.to_string_lossy().to_string();
        let manifest = manifest.to_string_lossy().to_string();

        info!("Installing dependencies from {}", manifest);
        run_command(
            "pip".cyan().bold(),
            &self.python,
            vec![
                "-m",
                "pip",
                "install",
                "--no-cache-dir",
                "--target",
                &site_packages,
                "-r",
                &manifest,
            ],
        )
        .await
    }
}
