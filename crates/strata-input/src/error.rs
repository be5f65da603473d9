//! Input listener error types

use thiserror::Error;

/// Errors that can occur while setting up device discovery
#[derive(Error, Debug)]
pub enum InputError {
    /// The HID transport could not be initialized
    #[error("Failed to initialize HID backend: {0}")]
    BackendInit(String),

    /// The listener thread could not be spawned
    #[error("Failed to spawn listener thread: {0}")]
    ThreadSpawn(String),
}

/// Result type for input operations
pub type InputResult<T> = Result<T, InputError>;
