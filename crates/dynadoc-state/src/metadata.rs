//! Sample metadata probing
//!
//! A [`MetadataProber`] inspects the media behind a sample's `filepath` and
//! returns [`MediaMetadata`], which the collection stores in the sample's
//! pre-declared `metadata` field.

use async_trait::async_trait;
use dynadoc_odm::labels;
use dynadoc_odm::media::guess_mime_type;
use dynadoc_odm::{EmbeddedDocument, FieldAccess, Value};
use serde::{Deserialize, Serialize};

use crate::error::StateError;
use crate::Result;

/// Probed properties of one media file. Unknown properties stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub size_bytes: u64,
    pub mime_type: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub num_channels: Option<u32>,
}

impl MediaMetadata {
    /// `ImageMetadata` embedded document holding the known properties.
    pub fn to_embedded(&self) -> Result<EmbeddedDocument> {
        let size = i64::try_from(self.size_bytes).map_err(|_| StateError::Metadata {
            filepath: String::new(),
            reason: format!("size {} does not fit an int field", self.size_bytes),
        })?;
        let mut doc = EmbeddedDocument::new(labels::image_metadata_type());
        doc.set_field("size_bytes", Value::Int(size), false)?;
        doc.set_field("mime_type", Value::from(self.mime_type.clone()), false)?;
        doc.set_field("width", Value::from(self.width), false)?;
        doc.set_field("height", Value::from(self.height), false)?;
        doc.set_field("num_channels", Value::from(self.num_channels), false)?;
        Ok(doc)
    }
}

/// Source of media metadata.
#[async_trait]
pub trait MetadataProber: Send + Sync {
    async fn probe(&self, filepath: &str) -> Result<MediaMetadata>;
}

/// Prober that reads the file size from the filesystem and guesses the MIME
/// type from the extension. Pixel dimensions are left unknown.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatProber;

#[async_trait]
impl MetadataProber for StatProber {
    async fn probe(&self, filepath: &str) -> Result<MediaMetadata> {
        let stat = tokio::fs::metadata(filepath)
            .await
            .map_err(|e| StateError::Metadata {
                filepath: filepath.to_string(),
                reason: e.to_string(),
            })?;
        if !stat.is_file() {
            return Err(StateError::Metadata {
                filepath: filepath.to_string(),
                reason: "not a regular file".to_string(),
            });
        }
        Ok(MediaMetadata {
            size_bytes: stat.len(),
            mime_type: guess_mime_type(filepath).map(String::from),
            ..MediaMetadata::default()
        })
    }
}
