#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc, clippy::doc_markdown)]

//! Cluster authentication extension operator
//!
//! Installs a JWT authentication webhook and a group rolebinding controller
//! into managed cluster control planes, and patches the kube-apiserver
//! deployment at admission time so it authenticates tokens against the
//! webhook.

pub mod actuator;
pub mod config;
pub mod controller;
pub mod crds;
pub mod error;
pub mod managedresources;
pub mod merge;
pub mod registry;
pub mod resources;
pub mod webhook;

// Re-export commonly used types
pub use actuator::Actuator;
pub use config::{ControllerConfig, ExtensionVariant};
pub use crds::{AuthnConfig, Cluster, Extension, ManagedResource};
pub use error::{Error, Result};
pub use resources::ClusterContext;
