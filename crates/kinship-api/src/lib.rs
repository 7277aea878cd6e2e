//! Kinship daemon API types and a small client.
//!
//! Shared by the daemon and the CLI so both sides agree on the wire format.

pub mod client;
pub mod types;

pub use client::{KinshipClient, KinshipClientError};
pub use types::*;
