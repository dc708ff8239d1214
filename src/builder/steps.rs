use serde::{Deserialize, Serialize};

/// The fixed, strictly sequential build pipeline. Each step must succeed
/// before the next begins; the first failure aborts the whole build.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildStep {
    ResolveBase,
    CopyManifest,
    InstallDependencies,
    CopyPayload,
}

impl BuildStep {
    pub fn label(&self) -> &'static str {
        match self {
            BuildStep::ResolveBase => "resolve-base",
            BuildStep::CopyManifest => "copy-manifest",
            BuildStep::InstallDependencies => "install-dependencies",
            BuildStep::CopyPayload => "copy-payload",
        }
    }
}

impl std::fmt::Display for BuildStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}
