// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use crate::config::PupilConfig;
use crate::threshold::ThresholdCandidate;

/// Outcome of one localization strategy. When `valid` is false the point is
/// (0, 0).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Localization {
    /// Location in processed-grid (cropped, downsampled) pixel coordinates.
    pub x: i32,
    pub y: i32,
    pub valid: bool,
}

impl Localization {
    pub fn found(x: i32, y: i32) -> Self {
        Localization{x, y, valid: true}
    }

    pub fn not_found() -> Self {
        Localization{x: 0, y: 0, valid: false}
    }
}

/// Maps processed-grid coordinates back to the raw frame the grid was made
/// from. A grid pixel covers a `factor`x`factor` block of the cropped frame;
/// grid coordinates map to the center of that block.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GridMapping {
    pub factor: u32,
    pub offset_x: u32,
    pub offset_y: u32,
}

impl GridMapping {
    pub fn from_config(config: &PupilConfig) -> Self {
        GridMapping{factor: config.downsample_factor,
                    offset_x: config.crop_margins.left,
                    offset_y: config.crop_margins.top}
    }

    pub fn to_frame(&self, x: f32, y: f32) -> (f32, f32) {
        let factor = self.factor as f32;
        (self.offset_x as f32 + (x + 0.5) * factor - 0.5,
         self.offset_y as f32 + (y + 0.5) * factor - 0.5)
    }

    pub fn length_to_frame(&self, length: f32) -> f32 {
        length * self.factor as f32
    }
}

/// Per-frame result of [crate::algorithm::locate_pupil()]. The pupil and
/// iris locations come from independent strategies and are not reconciled.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DetectionResult {
    /// Center of the circle found by the Hough search.
    pub pupil: Localization,
    /// Radius of that circle, in grid pixels.
    pub pupil_radius: Option<f32>,
    /// Centroid of the iris contour.
    pub iris: Localization,
    /// The binarization level used for both strategies.
    pub threshold: ThresholdCandidate,
    pub mapping: GridMapping,
}

impl DetectionResult {
    /// Pupil location in raw frame coordinates, if found.
    pub fn pupil_in_frame(&self) -> Option<(i32, i32)> {
        self.localization_in_frame(&self.pupil)
    }

    /// Iris centroid in raw frame coordinates, if found.
    pub fn iris_in_frame(&self) -> Option<(i32, i32)> {
        self.localization_in_frame(&self.iris)
    }

    fn localization_in_frame(&self, loc: &Localization) -> Option<(i32, i32)> {
        if !loc.valid {
            return None;
        }
        let (x, y) = self.mapping.to_frame(loc.x as f32, loc.y as f32);
        Some((x.round() as i32, y.round() as i32))
    }
}

// mod tests.
