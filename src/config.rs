//! # Configuration Management Module
//!
//! Compression constraints supplied by the upload form.
//!
//! ## Responsibilities:
//! - Defines the `CompressionConstraints` struct with all compression parameters
//! - Provides robust validation of input parameters
//! - Supports loading/saving constraint presets from/to JSON files
//! - Provides sensible defaults for listing photos
//!
//! ## Parameters:
//! - `max_width` / `max_height`: resolution bounds, images are never upscaled
//! - `quality`: initial re-encode quality in (0, 1]
//! - `max_size_bytes`: advisory size budget the adaptive compressor converges toward
//!
//! Constraints are immutable per invocation and are never persisted with a
//! listing; they belong to the active edit/create session only.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Resolution, quality and size bounds for one compression invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionConstraints {
    /// Maximum output width in pixels
    pub max_width: u32,
    /// Maximum output height in pixels
    pub max_height: u32,
    /// Initial re-encode quality, in (0, 1]
    pub quality: f32,
    /// Advisory byte-size budget for the encoded output
    pub max_size_bytes: usize,
}

impl Default for CompressionConstraints {
    fn default() -> Self {
        Self {
            max_width: 1200,
            max_height: 1200,
            quality: 0.8,
            max_size_bytes: 1_000_000,
        }
    }
}

impl CompressionConstraints {
    /// Validate constraint parameters
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.max_width == 0 || self.max_height == 0 {
            return Err(PipelineError::Validation(
                "resolution bounds must be greater than zero".to_string(),
            ));
        }

        if !(self.quality > 0.0 && self.quality <= 1.0) {
            return Err(PipelineError::Validation(format!(
                "quality must be in (0, 1], got {}",
                self.quality
            )));
        }

        if self.max_size_bytes == 0 {
            return Err(PipelineError::Validation(
                "size budget must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Load a constraint preset from a JSON file, falling back to defaults
    /// when the file does not exist
    pub async fn from_file(path: &Path) -> Result<Self, PipelineError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let constraints: CompressionConstraints = serde_json::from_str(&content)
            .map_err(|e| PipelineError::Validation(format!("invalid constraints file: {e}")))?;
        constraints.validate()?;
        Ok(constraints)
    }

    /// Save a constraint preset to a JSON file
    pub async fn save_to_file(&self, path: &Path) -> Result<(), PipelineError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| PipelineError::Validation(format!("unserializable constraints: {e}")))?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_constraints_validation() {
        let mut constraints = CompressionConstraints::default();
        assert!(constraints.validate().is_ok());

        constraints.quality = 0.0;
        assert!(constraints.validate().is_err());

        constraints.quality = 1.5;
        assert!(constraints.validate().is_err());

        constraints.quality = 0.8;
        constraints.max_width = 0;
        assert!(constraints.validate().is_err());

        constraints.max_width = 1200;
        constraints.max_size_bytes = 0;
        assert!(constraints.validate().is_err());
    }

    #[test]
    fn test_constraints_default() {
        let constraints = CompressionConstraints::default();
        assert_eq!(constraints.max_width, 1200);
        assert_eq!(constraints.max_height, 1200);
        assert_eq!(constraints.quality, 0.8);
        assert_eq!(constraints.max_size_bytes, 1_000_000);
    }

    #[tokio::test]
    async fn test_constraints_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let preset_path = temp_dir.path().join("constraints.json");

        let original = CompressionConstraints {
            max_width: 1600,
            max_height: 900,
            quality: 0.7,
            max_size_bytes: 500_000,
        };

        original.save_to_file(&preset_path).await.unwrap();
        let loaded = CompressionConstraints::from_file(&preset_path).await.unwrap();

        assert_eq!(loaded, original);
    }

    #[tokio::test]
    async fn test_constraints_missing_file_falls_back_to_default() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope.json");

        let loaded = CompressionConstraints::from_file(&missing).await.unwrap();
        assert_eq!(loaded, CompressionConstraints::default());
    }
}
