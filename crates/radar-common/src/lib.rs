//! radar-common — Shared error type and HTTP plumbing used across all Academic Radar crates.

pub mod error;
pub mod sandbox;

pub use error::{RadarError, Result};
pub use sandbox::SandboxClient;
