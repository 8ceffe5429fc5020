use serde::Deserialize;

/// Contour Geometric Type (3006,0042) of one contour item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContourGeometricType {
    Point,
    OpenPlanar,
    OpenNonplanar,
    ClosedPlanar,
}

impl ContourGeometricType {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "POINT" => Some(Self::Point),
            "OPEN_PLANAR" => Some(Self::OpenPlanar),
            "OPEN_NONPLANAR" => Some(Self::OpenNonplanar),
            "CLOSED_PLANAR" => Some(Self::ClosedPlanar),
            _ => None,
        }
    }
}

/// How segmentation frames are stored in the pixel data.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelPacking {
    /// BINARY segmentation, one bit per pixel.
    #[default]
    Bit,
    /// FRACTIONAL segmentation, one byte per pixel (0 or 255).
    Byte,
}

impl PixelPacking {
    pub fn bits_allocated(self) -> u16 {
        match self {
            PixelPacking::Bit => 1,
            PixelPacking::Byte => 8,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    #[default]
    ImagePositionPatient,
    InstanceNumber,
    None,
}
