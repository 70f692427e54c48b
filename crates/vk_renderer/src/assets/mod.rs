//! Loading meshes and images from disk

pub mod image_loader;
pub mod obj_loader;

pub use image_loader::ImageData;

use std::path::PathBuf;
use thiserror::Error;

/// Asset loading errors
#[derive(Error, Debug)]
pub enum AssetError {
    /// IO error during asset loading
    #[error("IO error reading {path}: {source}")]
    Io {
        /// File being read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Failed to decode an asset
    #[error("Failed to load asset: {0}")]
    LoadFailed(String),

    /// Malformed text asset
    #[error("{path}:{line}: {reason}")]
    Parse {
        /// File being parsed
        path: PathBuf,
        /// One-based line number
        line: usize,
        /// What was wrong with the line
        reason: String,
    },
}
