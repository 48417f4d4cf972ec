//! Read-only shapes served by the backend's browsing endpoints.
//!
//! These back the folder list and the image grid. The job client itself
//! only uses [`ImageEntry`], as part of an inline result bundle.

use serde::{Deserialize, Serialize};

/// One asset folder under `<parent_dir>/Cap3D_imgs/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderEntry {
    /// Folder name, which is the asset UID.
    pub uid: String,
    /// Server-side path of the folder.
    pub path: String,
    /// Number of rendered `.png` views in the folder.
    #[serde(rename = "num_images")]
    pub image_count: u32,
    /// Whether `structured_output.json` already exists.
    pub has_output: bool,
}

/// A single image, delivered inline as a data URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageEntry {
    pub name: String,
    /// `data:image/png;base64,...`
    #[serde(rename = "data", alias = "inline_data_uri")]
    pub inline_data_uri: String,
}
