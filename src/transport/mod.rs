//! Engine Transport
//!
//! Sends textual statements to the engine's REST endpoint and returns the
//! tabular result or a structured failure.
//!
//! - **Transport**: the seam every other component talks to
//! - **HttpTransport**: reqwest-backed implementation with basic or token auth
//! - **TabularData**: ordered column header plus rows of untyped scalars
//!
//! No retries happen here; a caller wrapping the adapter owns retry policy.

mod client;
mod error;
mod response;

pub use client::{AuthMode, HttpTransport, TransportConfig};
pub use error::TransportError;
pub use response::{EngineResponse, TabularData, STATUS_SUCCESS};

use async_trait::async_trait;
use std::time::Duration;

/// Executes statements against the engine
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute one statement and return its tabular result
    async fn execute(&self, statement: &str) -> Result<TabularData, TransportError>;

    /// Execute with a deadline; the in-flight request is dropped when it elapses
    async fn execute_within(
        &self,
        statement: &str,
        deadline: Duration,
    ) -> Result<TabularData, TransportError> {
        match tokio::time::timeout(deadline, self.execute(statement)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        }
    }
}
