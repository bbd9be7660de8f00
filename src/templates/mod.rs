//! Embedded build contexts for the built-in runtimes.

/// Dockerfile for the `python` runtime.
pub(crate) const PYTHON_DOCKERFILE: &str = include_str!("python.Dockerfile");

/// Dockerfile for the `javascript` runtime.
pub(crate) const JAVASCRIPT_DOCKERFILE: &str = include_str!("javascript.Dockerfile");
