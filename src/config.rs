use crate::enums::PixelPacking;
use serde::Deserialize;

/// Options controlling how a Segmentation object is written.
///
/// Every field has a default, so a partial JSON document is enough to
/// override a single setting.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    pub packing: PixelPacking,
    pub series_description: String,
    pub series_number: u32,
    pub content_label: String,
    pub content_creator_name: Option<String>,
    pub manufacturer: String,
    /// Segment Algorithm Type: `MANUAL`, `SEMIAUTOMATIC` or `AUTOMATIC`.
    pub algorithm_type: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            packing: PixelPacking::default(),
            series_description: "Segmentation".to_string(),
            series_number: 300,
            content_label: "SEGMENTATION".to_string(),
            content_creator_name: None,
            manufacturer: "dicom-rtstruct-seg".to_string(),
            algorithm_type: "MANUAL".to_string(),
        }
    }
}

impl ExportOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_packing(mut self, packing: PixelPacking) -> Self {
        self.packing = packing;
        self
    }

    pub fn with_series_description(mut self, description: impl Into<String>) -> Self {
        self.series_description = description.into();
        self
    }

    pub fn with_content_label(mut self, label: impl Into<String>) -> Self {
        self.content_label = label.into();
        self
    }

    pub fn with_content_creator_name(mut self, name: impl Into<String>) -> Self {
        self.content_creator_name = Some(name.into());
        self
    }
}
