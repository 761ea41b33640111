//! Custom resource types consumed and owned by the operator.

pub mod cluster;
pub mod extension;
pub mod managedresource;

pub use cluster::{Cluster, ClusterSpec, ShootInfo};
pub use extension::{AuthnConfig, Extension, ExtensionSpec, ExtensionStatus};
pub use managedresource::{ManagedResource, ManagedResourceSpec, SecretRef};
