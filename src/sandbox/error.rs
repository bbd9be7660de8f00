//! Domain-specific error types for sandbox backend operations.
//!
//! Typed errors enable callers to match on specific failure modes
//! rather than parsing error message strings.

/// Errors returned by a [`SandboxBackend`](super::SandboxBackend).
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    /// Docker daemon is not running or not accessible.
    #[error("Docker is not available: {message}")]
    Unavailable { message: String },

    /// Container image was not found.
    #[error("Container image not found: {image}")]
    ImageNotFound { image: String },

    /// Image build failed or reported an error record.
    #[error("Image build failed for {image}: {message}")]
    BuildFailed { image: String, message: String },

    /// Container operation failed (create, start, wait, kill, remove, etc.).
    #[error("Container operation failed: {message}")]
    ContainerFailed { message: String },

    /// The referenced container does not exist.
    #[error("No such container: {id}")]
    NoSuchContainer { id: String },
}

impl BackendError {
    /// Creates an `Unavailable` error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates an `ImageNotFound` error.
    pub fn image_not_found(image: impl Into<String>) -> Self {
        Self::ImageNotFound {
            image: image.into(),
        }
    }

    /// Creates a `BuildFailed` error.
    pub fn build_failed(image: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BuildFailed {
            image: image.into(),
            message: message.into(),
        }
    }

    /// Creates a `ContainerFailed` error.
    pub fn container_failed(message: impl Into<String>) -> Self {
        Self::ContainerFailed {
            message: message.into(),
        }
    }

    /// Creates a `NoSuchContainer` error.
    pub fn no_such_container(id: impl Into<String>) -> Self {
        Self::NoSuchContainer { id: id.into() }
    }

    /// Returns true if the backend could not be reached.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    /// Returns true if the container is already gone.
    pub fn is_no_such_container(&self) -> bool {
        matches!(self, Self::NoSuchContainer { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_error() {
        let err = BackendError::unavailable("daemon not running");
        assert!(err.is_unavailable());
        assert_eq!(
            err.to_string(),
            "Docker is not available: daemon not running"
        );
    }

    #[test]
    fn test_image_not_found_error() {
        let err = BackendError::image_not_found("funcbox-python:latest");
        assert!(!err.is_unavailable());
        assert_eq!(
            err.to_string(),
            "Container image not found: funcbox-python:latest"
        );
    }

    #[test]
    fn test_build_failed_error() {
        let err = BackendError::build_failed("funcbox-node:latest", "pull access denied");
        assert_eq!(
            err.to_string(),
            "Image build failed for funcbox-node:latest: pull access denied"
        );
    }

    #[test]
    fn test_no_such_container_error() {
        let err = BackendError::no_such_container("funcbox-python-1234");
        assert!(err.is_no_such_container());
        assert!(!BackendError::container_failed("x").is_no_such_container());
        assert_eq!(err.to_string(), "No such container: funcbox-python-1234");
    }
}
