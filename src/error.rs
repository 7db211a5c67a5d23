// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use crate::config::CropMargins;

/// Errors surfaced by [crate::algorithm::locate_pupil()] and configuration
/// validation. Degenerate detections (no circle, no iris contour) are not
/// errors; they are reported through [crate::types::Localization::valid].
#[derive(Debug, thiserror::Error)]
pub enum PupilError {
    /// The crop margins (or the downsampling that follows them) leave no
    /// pixels of a `width`x`height` frame.
    #[error("crop margins {margins:?} leave no region of {width}x{height} frame")]
    InvalidRegion {
        width: u32,
        height: u32,
        margins: CropMargins,
    },

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

// mod tests.
