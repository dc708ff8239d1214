use crate::errors::LaunchError;
use crate::image::{copy_tree, ImageManifest, LayerStore};
use crate::utils::{handle_stream, which};
use colored::Colorize;
use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::process::Command as TokioCommand;
use tokio::sync::mpsc;

/// Launches exactly one foreground process from a built image. The image's
/// layer stack is materialized into a fresh run directory, the entrypoint
/// is started with the declared workdir as its working directory, and its
/// exit code becomes the launcher's result. There is no restart policy.
pub struct Launcher {
    store: Arc<LayerStore>,
}

impl Launcher {
    pub fn new(store: Arc<LayerStore>) -> Self {
        Launcher { store }
    }

    /// Overlays the base filesystem and each layer, in order, into a fresh
    /// root filesystem. Later layers overwrite earlier ones.
    fn materialize(&self, image: &ImageManifest) -> Result<PathBuf, LaunchError> {
        let run_dir = self.store.new_run_dir()?;
        let rootfs = run_dir.join("rootfs");
        std::fs::create_dir_all(&rootfs)?;

        debug!("Materializing image '{}' into {}", image.name, rootfs.display());
        copy_tree(&self.store.base_dir(&image.base), &rootfs)?;
        for layer in &image.layers {
            copy_tree(&self.store.layer_fs(&layer.id), &rootfs)?;
        }
        Ok(rootfs)
    }

    pub async fn launch(&self, image_name: &str) -> Result<i32, LaunchError> {
        let image = self.store.load_image(image_name)?;
        info!("Launching image '{}' ({})", image.name, image.short_id());

        let rootfs = self.materialize(&image)?;
        let workdir = rootfs.join(image.workdir.trim_start_matches('/'));

        let interpreter = which(&image.entrypoint.interpreter)
            .ok_or_else(|| LaunchError::InterpreterNotFound(image.entrypoint.interpreter.clone()))?;
        let entry_file = workdir.join(&image.entrypoint.script);
        if !entry_file.is_file() {
            return Err(LaunchError::EntrypointMissing(entry_file));
        }

        if let Some(port) = image.port {
            // Advertised only; the launcher performs no verification of the bind.
            info!("Image advertises port {}", port);
        }

        let mut command = TokioCommand::new(&interpreter);
        command
            .arg(&image.entrypoint.script)
            .current_dir(&workdir)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        // Installed dependencies live under site-packages in the workdir.
        let site_packages = workdir.join("site-packages");
        if site_packages.is_dir() {
            command.env("PYTHONPATH", &site_packages);
        }

        debug!(
            "Starting entrypoint: {} {} (cwd {})",
            interpreter,
            image.entrypoint.script,
            workdir.display()
        );
        let mut child = command.spawn()?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let (stdout, stderr) = (child.stdout.take().unwrap(), child.stderr.take().unwrap());
        let stdout_task = tokio::spawn(handle_stream(stdout, tx.clone()));
        let stderr_task = tokio::spawn(handle_stream(stderr, tx));

        // Both senders drop once the reader tasks finish, which ends the loop.
        let label = image.name.white().bold();
        while let Some(line) = rx.recv().await {
            let clean_line = line.trim_end().replace(['\x1B', '\r', '\n'], "");
            println!("       {}  |   {}", label, clean_line);
        }
        let _ = tokio::join!(stdout_task, stderr_task);

        let status = child.wait().await?;
        match status.code() {
            Some(code) => {
                info!("Entrypoint exited with code {}", code);
                Ok(code)
            }
            None => {
                warn!("Entrypoint was terminated by a signal");
                Err(LaunchError::Io(std::io::Error::other(
                    "entrypoint terminated by a signal",
                )))
            }
        }
    }
}
