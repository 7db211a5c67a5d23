// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! Tunable constants of the pupil localization pipeline. The defaults are
//! those of a single camera/lighting setup looking at one eye from close
//! range; other setups will want to revisit at least the crop margins and the
//! target iris ratio.

use crate::error::PupilError;

/// Pixels removed from each edge of the raw frame before any processing.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CropMargins {
    pub top: u32,
    pub bottom: u32,
    pub left: u32,
    pub right: u32,
}

impl Default for CropMargins {
    fn default() -> Self {
        CropMargins { top: 10, bottom: 10, left: 150, right: 50 }
    }
}

impl CropMargins {
    pub fn none() -> Self {
        CropMargins { top: 0, bottom: 0, left: 0, right: 0 }
    }
}

/// Candidate binarization levels scanned by the threshold search. `end` is
/// inclusive.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ThresholdRange {
    pub start: u8,
    pub end: u8,
    pub step: u8,
}

impl Default for ThresholdRange {
    fn default() -> Self {
        ThresholdRange { start: 30, end: 98, step: 2 }
    }
}

impl ThresholdRange {
    /// The candidate thresholds, ascending. Empty if `step` is zero or
    /// `start > end`.
    pub fn candidates(&self) -> Vec<u8> {
        if self.step == 0 || self.start > self.end {
            return Vec::new();
        }
        (self.start..=self.end).step_by(self.step as usize).collect()
    }
}

/// Parameters of the edge-preserving smoothing applied after downsampling.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SmoothingParams {
    /// Diameter of the (circular) pixel neighborhood.
    pub diameter: u32,
    /// Gaussian sigma over intensity differences.
    pub sigma_color: f32,
    /// Gaussian sigma over spatial distance.
    pub sigma_space: f32,
}

impl Default for SmoothingParams {
    fn default() -> Self {
        SmoothingParams { diameter: 10, sigma_color: 15.0, sigma_space: 15.0 }
    }
}

/// Parameters of the circular Hough search, in downsampled pixel units.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct HoughParams {
    pub min_radius: u32,
    pub max_radius: u32,
    /// Minimum distance between the centers of two reported circles.
    pub min_distance: f32,
    /// Upper Canny threshold; the lower threshold is half of it.
    pub canny_high: f32,
    /// Votes needed for an accumulator cell to be a center candidate, and
    /// edge pixels needed to confirm its radius.
    pub vote_threshold: u32,
}

impl Default for HoughParams {
    fn default() -> Self {
        HoughParams {
            min_radius: 5,
            max_radius: 12,
            min_distance: 80.0,
            canny_high: 10.0,
            vote_threshold: 3,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PupilConfig {
    pub crop_margins: CropMargins,
    pub downsample_factor: u32,
    pub smoothing: SmoothingParams,
    /// Fraction of the eye region expected to be iris.
    pub target_iris_ratio: f64,
    pub threshold_range: ThresholdRange,
    /// 3x3 erosions applied before measuring each candidate's ratio.
    pub erosion_iterations: u32,
    pub hough: HoughParams,
    /// Width of the white border added around the mask before contour
    /// extraction.
    pub border_width: u32,
}

impl Default for PupilConfig {
    fn default() -> Self {
        PupilConfig {
            crop_margins: CropMargins::default(),
            downsample_factor: 10,
            smoothing: SmoothingParams::default(),
            target_iris_ratio: 0.20,
            threshold_range: ThresholdRange::default(),
            erosion_iterations: 3,
            hough: HoughParams::default(),
            border_width: 2,
        }
    }
}

impl PupilConfig {
    /// Checks the settings that do not depend on the frame size. Crop margins
    /// are checked against each frame by the preprocessor.
    pub fn validate(&self) -> Result<(), PupilError> {
        if self.downsample_factor == 0 {
            return Err(PupilError::InvalidConfig(
                "downsample_factor must be positive".to_string()));
        }
        self.validate_threshold_search()?;
        if self.smoothing.diameter == 0 ||
            self.smoothing.sigma_color <= 0.0 || self.smoothing.sigma_space <= 0.0 {
            return Err(PupilError::InvalidConfig(format!(
                "smoothing parameters {:?} must be positive", self.smoothing)));
        }
        let hough = &self.hough;
        if hough.min_radius == 0 || hough.min_radius > hough.max_radius {
            return Err(PupilError::InvalidConfig(format!(
                "hough radius band {}..={} is invalid",
                hough.min_radius, hough.max_radius)));
        }
        if hough.canny_high <= 0.0 || hough.min_distance < 0.0 {
            return Err(PupilError::InvalidConfig(format!(
                "hough parameters {:?} out of range", hough)));
        }
        Ok(())
    }

    /// The subset of [PupilConfig::validate()] that the threshold search
    /// depends on.
    pub fn validate_threshold_search(&self) -> Result<(), PupilError> {
        if self.threshold_range.candidates().is_empty() {
            return Err(PupilError::InvalidConfig(format!(
                "threshold range {:?} is empty", self.threshold_range)));
        }
        if !(self.target_iris_ratio > 0.0 && self.target_iris_ratio < 1.0) {
            return Err(PupilError::InvalidConfig(format!(
                "target_iris_ratio {} must be in (0, 1)", self.target_iris_ratio)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_threshold_candidates() {
        let candidates = ThresholdRange::default().candidates();
        assert_eq!(candidates.len(), 35);
        assert_eq!(candidates[0], 30);
        assert_eq!(*candidates.last().unwrap(), 98);
        assert!(candidates.windows(2).all(|w| w[1] - w[0] == 2));
    }

    #[test]
    fn test_empty_threshold_range() {
        assert!(ThresholdRange { start: 50, end: 40, step: 2 }.candidates().is_empty());
        assert!(ThresholdRange { start: 30, end: 98, step: 0 }.candidates().is_empty());
        // Single candidate.
        assert_eq!(ThresholdRange { start: 40, end: 40, step: 5 }.candidates(), vec![40]);
    }

    #[test]
    fn test_validate() {
        assert!(PupilConfig::default().validate().is_ok());

        let mut config = PupilConfig::default();
        config.downsample_factor = 0;
        assert!(matches!(config.validate(), Err(PupilError::InvalidConfig(_))));

        config = PupilConfig::default();
        config.threshold_range.step = 0;
        assert!(matches!(config.validate(), Err(PupilError::InvalidConfig(_))));

        config = PupilConfig::default();
        config.target_iris_ratio = 1.0;
        assert!(matches!(config.validate(), Err(PupilError::InvalidConfig(_))));

        config = PupilConfig::default();
        config.hough.min_radius = 13;
        assert!(matches!(config.validate(), Err(PupilError::InvalidConfig(_))));
    }
}  // mod tests.
