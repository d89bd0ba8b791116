//! Core abstractions for ghsm: the secret data model, the key and upsert
//! contracts a remote store must satisfy, and the batch pipeline that drives them.
//! This crate has no network or crypto dependencies of its own.

pub mod batch;
pub mod error;
pub mod model;
pub mod store;
