//! Payload compression.
//!
//! Payloads larger than the threshold are always zstd-compressed before
//! fragmentation, even when that does not make them smaller.

use std::io::Read;

use thiserror::Error;

use crate::core::SyncConfig;
use crate::core::constants::{COMPRESS_MIN_SIZE, DEFAULT_COMPRESSION_LEVEL, MAX_DECOMPRESSED_SIZE};

/// Errors from compression operations.
#[derive(Debug, Error)]
pub enum CompressionError {
    /// Zstd compression failed.
    #[error("compression failed: {0}")]
    CompressionFailed(String),

    /// Zstd decompression failed.
    #[error("decompression failed: {0}")]
    DecompressionFailed(String),

    /// Decompressed size exceeds the configured limit.
    #[error("decompressed size exceeded limit: more than {limit} bytes")]
    SizeExceeded {
        /// Maximum allowed size.
        limit: usize,
    },
}

/// Compressor for config payloads.
#[derive(Debug, Clone)]
pub struct Compressor {
    /// Payloads must be strictly larger than this to be compressed.
    min_size: usize,
    /// zstd level (1-22).
    level: i32,
    /// Decompression stops with an error past this many bytes.
    max_decompressed_size: usize,
}

impl Compressor {
    /// Create a compressor with default settings.
    pub fn new() -> Self {
        Self {
            min_size: COMPRESS_MIN_SIZE,
            level: DEFAULT_COMPRESSION_LEVEL,
            max_decompressed_size: MAX_DECOMPRESSED_SIZE,
        }
    }

    /// Create a compressor from the sync configuration.
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            min_size: config.compress_min_size,
            level: config.compression_level.clamp(1, 22),
            max_decompressed_size: config.max_decompressed_size,
        }
    }

    /// Compress `data` when it exceeds the threshold.
    pub fn compress(&self, data: &[u8]) -> Result<CompressResult, CompressionError> {
        if data.len() <= self.min_size {
            return Ok(CompressResult::Uncompressed(data.to_vec()));
        }

        let compressed = zstd::encode_all(data, self.level)
            .map_err(|e| CompressionError::CompressionFailed(e.to_string()))?;
        Ok(CompressResult::Compressed(compressed))
    }

    /// Decompress `data`, refusing output larger than the configured limit.
    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CompressionError> {
        let decoder = zstd::Decoder::new(data)
            .map_err(|e| CompressionError::DecompressionFailed(e.to_string()))?;

        let limit = self.max_decompressed_size;
        let mut output = Vec::new();
        decoder
            .take(limit as u64 + 1)
            .read_to_end(&mut output)
            .map_err(|e| CompressionError::DecompressionFailed(e.to_string()))?;

        if output.len() > limit {
            return Err(CompressionError::SizeExceeded { limit });
        }

        Ok(output)
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of a compression attempt.
#[derive(Debug, Clone)]
pub enum CompressResult {
    /// Data was compressed.
    Compressed(Vec<u8>),
    /// Data was at or below the threshold.
    Uncompressed(Vec<u8>),
}

impl CompressResult {
    /// Get the data bytes.
    pub fn data(&self) -> &[u8] {
        match self {
            CompressResult::Compressed(data) | CompressResult::Uncompressed(data) => data,
        }
    }

    /// Check if data was compressed.
    pub fn is_compressed(&self) -> bool {
        matches!(self, CompressResult::Compressed(_))
    }

    /// Consume and get the data.
    pub fn into_data(self) -> Vec<u8> {
        match self {
            CompressResult::Compressed(data) | CompressResult::Uncompressed(data) => data,
        }
    }
}
