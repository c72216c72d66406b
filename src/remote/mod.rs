//! # Remote Optimization Service
//!
//! Interface to the external service that converts, optimizes and removes
//! backgrounds from images. The core only consumes it: every operation ends
//! in a success carrying a result locator, a `pending` outcome, or an opaque
//! [`RemoteError`].

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::RemoteError;

/// Compression trade-off requested from the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompressionMode {
    Lossless,
    #[default]
    Balanced,
    Aggressive,
}

/// Replacement for a removed background
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "type", content = "value")]
pub enum BackgroundSpec {
    #[default]
    Transparent,
    /// Solid hex color
    Color(String),
}

/// Options for the optimize operation
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizeOptions {
    pub compression: CompressionMode,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
    pub strip_metadata: bool,
}

/// An image handed to the service
#[derive(Debug, Clone)]
pub struct RemoteSource {
    pub data: Bytes,
    pub mime: String,
    pub file_name: String,
}

/// Payload of a successful remote operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSuccess {
    /// Where the result can be downloaded from
    pub locator: String,
    pub original_size: u64,
    pub result_size: u64,
    pub compression_ratio: f64,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Non-error outcome of a remote operation
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteOutcome {
    Success(RemoteSuccess),
    /// The job has not finished; try again later
    Pending,
}

impl RemoteOutcome {
    /// The success payload, or a retryable `PENDING` error
    pub fn into_success(self, operation: &str) -> Result<RemoteSuccess, RemoteError> {
        match self {
            Self::Success(success) => Ok(success),
            Self::Pending => Err(RemoteError::pending(operation)),
        }
    }
}

pub type RemoteResult = Result<RemoteOutcome, RemoteError>;

/// The remote optimization service
#[async_trait]
pub trait OptimizationService: Send + Sync {
    async fn convert(&self, image: RemoteSource, target_format: &str, compression: CompressionMode) -> RemoteResult;

    async fn remove_background(
        &self,
        image: RemoteSource,
        background: &BackgroundSpec,
        compression: CompressionMode,
    ) -> RemoteResult;

    async fn optimize(&self, image: RemoteSource, options: &OptimizeOptions) -> RemoteResult;

    /// Fetch the bytes behind a result locator
    async fn download(&self, locator: &str) -> Result<Bytes, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_becomes_retryable_error() {
        let err = RemoteOutcome::Pending.into_success("convert").unwrap_err();
        assert_eq!(err.code, RemoteError::PENDING);
        assert!(err.retryable);
    }

    #[test]
    fn test_success_payload_deserializes() {
        let json = r#"{
            "locator": "results/abc.webp",
            "original_size": 2048,
            "result_size": 512,
            "compression_ratio": 0.25
        }"#;
        let success: RemoteSuccess = serde_json::from_str(json).unwrap();
        assert_eq!(success.result_size, 512);
        assert!(success.metadata.is_empty());
        assert_eq!(
            RemoteOutcome::Success(success.clone()).into_success("optimize").unwrap(),
            success
        );
    }

    #[test]
    fn test_background_spec_serde() {
        let spec: BackgroundSpec = serde_json::from_str(r##"{"type": "color", "value": "#FFFFFF"}"##).unwrap();
        assert_eq!(spec, BackgroundSpec::Color("#FFFFFF".to_string()));
    }
}
