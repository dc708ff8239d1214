mod manifest;
mod store;

pub use manifest::{ImageManifest, LayerRef};
pub use store::{copy_tree, digest_bytes, digest_dir, digest_file, LayerStore};
