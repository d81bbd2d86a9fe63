//! Core abstractions shared by every hub component

pub mod error;

pub use error::{HubError, HubResult};
