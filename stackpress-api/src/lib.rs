//! Stackpress API Library
//!
//! Provisions WordPress + MySQL stacks on Kubernetes. Exposed as a library
//! so the HTTP surface and pipeline can be driven from tests.

// Core modules
pub mod config;
pub mod validation;

// Application state
pub mod state;
pub use state::AppState;

// Kubernetes integration
pub mod kubernetes;

// Stack provisioning
pub mod provision;

// HTTP routes
pub mod api;
pub use api::router;

// Logging configuration
pub mod logging;

// Graceful shutdown handling
pub mod shutdown;
