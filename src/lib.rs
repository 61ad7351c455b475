//! Router static DNS Kubernetes Operator
//!
//! Registers the name -> address mapping declared by each `DNS` custom
//! resource in a router's static DNS table, and removes it again when the
//! resource is deleted.

pub mod adapters;
pub mod controllers;
pub mod crd;
pub mod error;
pub mod metrics;
pub mod reconcilers;
pub mod router;

pub use error::{Error, Result};
