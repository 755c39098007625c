//! Error types for the ChefAR overlay engine
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

/// Main error type for the overlay engine
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Inference transport failure (network, HTTP status, service outage)
    #[error("Inference request failed: {0}")]
    Inference(String),

    /// Inference reply named an animation type outside the closed enum
    #[error("Unrecognized animation type: {0}")]
    UnrecognizedType(String),

    /// Inference reply could not be decoded into a usable descriptor
    #[error("Malformed inference response: {0}")]
    MalformedResponse(String),

    /// Requested 3D resource not found or not loadable
    #[error("Asset not loadable: {0}")]
    AssetMissing(String),

    /// Camera/session runtime failure (snapshot capture, probe access)
    #[error("Camera error: {0}")]
    Camera(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using the engine Error
pub type Result<T> = std::result::Result<T, Error>;
