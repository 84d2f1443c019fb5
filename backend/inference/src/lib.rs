//! Inference gateway implementations.
//!
//! `ReplicateGateway` talks to the hosted provider; `MockGateway` is the
//! injectable fake used by every downstream test suite.

pub mod providers;

pub use providers::{MockGateway, ReplicateGateway};
