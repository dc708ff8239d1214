mod manifest;
mod pipeline;
mod recipe;
mod steps;

pub use manifest::{load_manifest, Dependency};
pub use pipeline::ImageBuilder;
pub use recipe::{Entrypoint, Recipe, RECIPE_FILE};
pub use steps::BuildStep;
