use std::path::PathBuf;
use thiserror::Error;

/// Failures raised while constructing an image. A build that fails never
/// publishes an image manifest; the store may retain already-committed
/// layers, which remain reusable by a later build.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("failed to load recipe: {0}")]
    Recipe(String),

    #[error("unknown base image '{0}': not present in the store")]
    UnknownBase(String),

    #[error("dependency manifest '{path}' is missing")]
    ManifestMissing { path: PathBuf },

    #[error("dependency manifest '{path}' is malformed: {reason}")]
    ManifestMalformed { path: PathBuf, reason: String },

    #[error("payload directory '{0}' is unreadable")]
    PayloadUnreadable(PathBuf),

    #[error("build step '{step}' failed:\n{output}")]
    StepFailed { step: String, output: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failures raised while launching a built image. The launched process's
/// own exit code is not an error; it becomes wharf's exit code.
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("image '{0}' not found in store")]
    ImageNotFound(String),

    #[error("image manifest for '{name}' is unreadable: {reason}")]
    ImageCorrupt { name: String, reason: String },

    #[error("interpreter '{0}' was not found on the host")]
    InterpreterNotFound(String),

    #[error("entry file '{0}' is missing from the image")]
    EntrypointMissing(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
