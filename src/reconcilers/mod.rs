//! Reconcilers for the DNS CRD
//!
//! The handlers here hold the business logic: validating the resource and
//! the router settings, talking to the router, and classifying the result.

pub mod dns;
