//! Collection configuration

use dynadoc_odm::labels;
use dynadoc_odm::MediaType;
use serde::{Deserialize, Serialize};

use crate::error::StateError;

pub const COLLECTION_ENV: &str = "DYNADOC_COLLECTION";
pub const MEDIA_TYPE_ENV: &str = "DYNADOC_MEDIA_TYPE";
pub const SAMPLE_TYPE_ENV: &str = "DYNADOC_SAMPLE_TYPE";

/// Settings for one collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Collection name, also the name of its schema scope in the registry
    pub name: String,
    /// Fixed media type; when `None` the first sample added decides it
    pub media_type: Option<MediaType>,
    /// Document type every sample must have
    pub sample_type: String,
}

impl CollectionConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            media_type: None,
            sample_type: labels::SAMPLE.to_string(),
        }
    }

    pub fn with_media_type(mut self, media_type: MediaType) -> Self {
        self.media_type = Some(media_type);
        self
    }

    pub fn with_sample_type(mut self, sample_type: impl Into<String>) -> Self {
        self.sample_type = sample_type.into();
        self
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - DYNADOC_COLLECTION (required)
    /// - DYNADOC_MEDIA_TYPE (optional: image, video or point-cloud)
    /// - DYNADOC_SAMPLE_TYPE (optional, default: "Sample")
    pub fn from_env() -> Result<Self, StateError> {
        let name = std::env::var(COLLECTION_ENV)
            .map_err(|_| StateError::Config(format!("{COLLECTION_ENV} not set")))?;
        let mut config = Self::new(name);
        if let Ok(raw) = std::env::var(MEDIA_TYPE_ENV) {
            config.media_type = Some(raw.parse()?);
        }
        if let Ok(sample_type) = std::env::var(SAMPLE_TYPE_ENV) {
            config.sample_type = sample_type;
        }
        Ok(config)
    }
}
