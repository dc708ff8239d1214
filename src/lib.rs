pub mod builder;
pub mod container;
pub mod errors;
pub mod image;
pub mod installer;
pub mod utils;
