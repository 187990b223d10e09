//! Matrix client-server API client.
//!
//! Covers the handful of calls the SMS bridge needs: password login,
//! sending message events and reading the message timeline.

mod client;
mod error;
mod types;

pub use client::MatrixClient;
pub use error::MatrixError;
pub use types::*;
