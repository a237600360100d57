//! Sample media types

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::OdmError;

/// Kind of media a sample's `filepath` points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediaType {
    Image,
    Video,
    PointCloud,
}

const VIDEO_EXTENSIONS: &[&str] = &[
    "3gp", "avi", "flv", "m4v", "mkv", "mov", "mp4", "mpeg", "mpg", "ogv", "webm", "wmv",
];

fn extension(filepath: &str) -> Option<String> {
    Path::new(filepath)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

/// Media type of `filepath`, judged by extension. Anything that is neither a
/// known video container nor a `.pcd` point cloud is an image.
pub fn get_media_type(filepath: &str) -> MediaType {
    match extension(filepath).as_deref() {
        Some("pcd") => MediaType::PointCloud,
        Some(ext) if VIDEO_EXTENSIONS.contains(&ext) => MediaType::Video,
        _ => MediaType::Image,
    }
}

/// Best-effort MIME type from the file extension.
pub fn guess_mime_type(filepath: &str) -> Option<&'static str> {
    let mime = match extension(filepath)?.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "webp" => "image/webp",
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "mpeg" | "mpg" => "video/mpeg",
        "pcd" => "application/octet-stream",
        _ => return None,
    };
    Some(mime)
}

impl MediaType {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
            MediaType::PointCloud => "point-cloud",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = OdmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "image" => Ok(MediaType::Image),
            "video" => Ok(MediaType::Video),
            "point-cloud" | "point_cloud" => Ok(MediaType::PointCloud),
            other => Err(OdmError::UnknownMediaType {
                value: other.to_string(),
            }),
        }
    }
}
