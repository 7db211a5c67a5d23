// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! Calibrates the binarization level of each frame. The iris of an open eye
//! covers a roughly known fraction of the cropped eye region, so rather than
//! guessing an absolute intensity we scan a grid of thresholds and keep the
//! one whose dark-pixel fraction lands nearest that expected fraction.

use std::time::Instant;

use image::GrayImage;
use log::debug;

use crate::config::PupilConfig;
use crate::error::PupilError;
use crate::histogram_funcs::{cumulative_counts, histogram_of};
use crate::image_funcs::{erode, MASK_FOREGROUND};

/// One scanned threshold and the fraction of (eroded) grid pixels at or below
/// it.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ThresholdCandidate {
    pub threshold: u8,
    pub darkness_ratio: f64,
}

/// Fraction of `mask` pixels that are foreground (dark).
pub fn darkness_ratio(mask: &GrayImage) -> f64 {
    let total = mask.as_raw().len();
    if total == 0 {
        return 0.0;
    }
    let dark = mask.as_raw().iter().filter(|&&v| v == MASK_FOREGROUND).count();
    dark as f64 / total as f64
}

/// Returns the candidate whose ratio is nearest `target_ratio`. When several
/// are equally near, the earliest one in `candidates` wins; callers pass
/// candidates in ascending threshold order so the lowest threshold wins.
pub fn select_best_candidate(candidates: &[ThresholdCandidate], target_ratio: f64)
                             -> Option<ThresholdCandidate> {
    let mut best: Option<(ThresholdCandidate, f64)> = None;
    for candidate in candidates {
        let distance = (candidate.darkness_ratio - target_ratio).abs();
        match best {
            Some((_, best_distance)) if distance >= best_distance => (),
            _ => best = Some((*candidate, distance)),
        }
    }
    best.map(|(candidate, _)| candidate)
}

pub struct ThresholdSearch {
    thresholds: Vec<u8>,
    target_ratio: f64,
    erosion_iterations: u32,
}

impl ThresholdSearch {
    /// Fails with [PupilError::InvalidConfig] if the threshold grid is empty or
    /// the target ratio is outside (0, 1).
    pub fn new(config: &PupilConfig) -> Result<Self, PupilError> {
        config.validate_threshold_search()?;
        Ok(ThresholdSearch{thresholds: config.threshold_range.candidates(),
                           target_ratio: config.target_iris_ratio,
                           erosion_iterations: config.erosion_iterations})
    }

    pub fn thresholds(&self) -> &[u8] {
        &self.thresholds
    }

    /// Computes the darkness ratio of every threshold in the grid, in
    /// ascending threshold order.
    ///
    /// Each candidate is defined as: erode `smoothed`, binarize at the
    /// threshold, count dark pixels. The erosion does not depend on the
    /// threshold, so it is done once and each candidate's dark count is read
    /// from the cumulative histogram of the eroded grid.
    pub fn evaluate(&self, smoothed: &GrayImage) -> Vec<ThresholdCandidate> {
        let eroded = erode(smoothed, self.erosion_iterations);
        let histogram = histogram_of(&eroded);
        let cumulative = cumulative_counts(&histogram);
        let total = eroded.as_raw().len();
        self.thresholds.iter().map(|&threshold| {
            let dark = cumulative[threshold as usize];
            let darkness_ratio = if total == 0 {
                0.0
            } else {
                dark as f64 / total as f64
            };
            ThresholdCandidate{threshold, darkness_ratio}
        }).collect()
    }

    /// Returns the threshold whose darkness ratio is nearest the target iris
    /// ratio. Ties go to the lowest threshold. Every threshold of the grid is
    /// evaluated.
    pub fn find_best_threshold(&self, smoothed: &GrayImage) -> ThresholdCandidate {
        let search_start = Instant::now();
        let candidates = self.evaluate(smoothed);
        for candidate in &candidates {
            debug!("threshold {} ratio {:.4}",
                   candidate.threshold, candidate.darkness_ratio);
        }
        // The grid is never empty (checked in new()).
        let best = select_best_candidate(&candidates, self.target_ratio)
            .unwrap_or(ThresholdCandidate{threshold: self.thresholds[0],
                                          darkness_ratio: 0.0});
        debug!("Best threshold {} (ratio {:.4}, target {}) found in {:?}",
               best.threshold, best.darkness_ratio, self.target_ratio,
               search_start.elapsed());
        best
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use image::Luma;
    use imageproc::gray_image;

    use super::*;
    use crate::config::ThresholdRange;
    use crate::image_funcs::binarize;

    fn no_erosion_config() -> PupilConfig {
        let mut config = PupilConfig::default();
        config.erosion_iterations = 0;
        config
    }

    #[test]
    fn test_darkness_ratio() {
        let mask = gray_image!(
            0, 255, 255, 255;
            0, 0, 255, 255);
        assert_abs_diff_eq!(darkness_ratio(&mask), 0.375, epsilon = 1e-12);
        assert_eq!(darkness_ratio(&GrayImage::new(0, 0)), 0.0);
    }

    #[test]
    fn test_select_best_candidate_prefers_first_of_ties() {
        let candidates = [
            ThresholdCandidate{threshold: 30, darkness_ratio: 0.0},
            ThresholdCandidate{threshold: 32, darkness_ratio: 0.125},
            ThresholdCandidate{threshold: 34, darkness_ratio: 0.375},
            ThresholdCandidate{threshold: 36, darkness_ratio: 0.125},
        ];
        let best = select_best_candidate(&candidates, 0.25).unwrap();
        assert_eq!(best.threshold, 32);
        assert!(select_best_candidate(&[], 0.25).is_none());
    }

    #[test]
    fn test_new_rejects_empty_grid() {
        let mut config = PupilConfig::default();
        config.threshold_range = ThresholdRange{start: 90, end: 30, step: 2};
        assert!(matches!(ThresholdSearch::new(&config),
                         Err(PupilError::InvalidConfig(_))));
        config = PupilConfig::default();
        config.target_iris_ratio = 0.0;
        assert!(ThresholdSearch::new(&config).is_err());
    }

    #[test]
    fn test_new_agrees_with_config_validation() {
        let mut config = PupilConfig::default();
        config.threshold_range = ThresholdRange{start: 30, end: 98, step: 0};
        let search_error = ThresholdSearch::new(&config).err().unwrap().to_string();
        let config_error = config.validate().unwrap_err().to_string();
        assert_eq!(search_error, config_error);

        config = PupilConfig::default();
        config.target_iris_ratio = 1.0;
        let search_error = ThresholdSearch::new(&config).err().unwrap().to_string();
        let config_error = config.validate().unwrap_err().to_string();
        assert_eq!(search_error, config_error);

        // Settings the search does not use are left to validate().
        config = PupilConfig::default();
        config.hough.min_radius = 0;
        assert!(ThresholdSearch::new(&config).is_ok());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_all_light_grid_returns_lowest_threshold() {
        let smoothed = GrayImage::from_pixel(44, 46, Luma([200]));
        let search = ThresholdSearch::new(&PupilConfig::default()).unwrap();
        let candidates = search.evaluate(&smoothed);
        assert_eq!(candidates.len(), 35);
        assert!(candidates.iter().all(|c| c.darkness_ratio == 0.0));
        let best = search.find_best_threshold(&smoothed);
        assert_eq!(best.threshold, 30);
        assert_eq!(best.darkness_ratio, 0.0);
    }

    #[test]
    fn test_tie_break_lowest_threshold() {
        // 8x8 grid: 8 pixels at 35, 16 at 50, the rest bright. With target
        // 0.25, thresholds 36..=48 (ratio 0.125) and 50.. (ratio 0.375) are
        // equally near.
        let mut smoothed = GrayImage::from_pixel(8, 8, Luma([200]));
        for x in 0..8 {
            smoothed.put_pixel(x, 0, Luma([35]));
            smoothed.put_pixel(x, 1, Luma([50]));
            smoothed.put_pixel(x, 2, Luma([50]));
        }
        let mut config = no_erosion_config();
        config.target_iris_ratio = 0.25;
        let search = ThresholdSearch::new(&config).unwrap();
        let best = search.find_best_threshold(&smoothed);
        assert_eq!(best.threshold, 36);
        assert_eq!(best.darkness_ratio, 0.125);
    }

    #[test]
    fn test_exact_match_wins() {
        // 20% of pixels at 60.
        let mut smoothed = GrayImage::from_pixel(10, 10, Luma([180]));
        for x in 0..10 {
            smoothed.put_pixel(x, 4, Luma([60]));
            smoothed.put_pixel(x, 5, Luma([60]));
        }
        let search = ThresholdSearch::new(&no_erosion_config()).unwrap();
        let best = search.find_best_threshold(&smoothed);
        assert_eq!(best.threshold, 60);
        assert_abs_diff_eq!(best.darkness_ratio, 0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_erosion_grows_dark_regions_during_search() {
        let mut smoothed = GrayImage::from_pixel(11, 11, Luma([200]));
        smoothed.put_pixel(5, 5, Luma([10]));
        let search = ThresholdSearch::new(&PupilConfig::default()).unwrap();
        let candidates = search.evaluate(&smoothed);
        // Three 3x3 erosions grow the dark pixel to 7x7.
        for candidate in candidates {
            assert_abs_diff_eq!(candidate.darkness_ratio, 49.0 / 121.0,
                                epsilon = 1e-12);
        }
        // The caller's grid is untouched.
        assert_eq!(smoothed.get_pixel(4, 5).0[0], 200);
    }

    #[test]
    fn test_histogram_shortcut_matches_per_threshold_masks() {
        let smoothed = GrayImage::from_fn(23, 17, |x, y| {
            Luma([((x * 37 + y * 11) % 120 + 20) as u8])
        });
        let config = PupilConfig::default();
        let search = ThresholdSearch::new(&config).unwrap();
        let eroded = erode(&smoothed, config.erosion_iterations);
        for candidate in search.evaluate(&smoothed) {
            let mask = binarize(&eroded, candidate.threshold);
            assert_eq!(candidate.darkness_ratio, darkness_ratio(&mask));
        }
    }

    #[test]
    fn test_search_is_deterministic() {
        let smoothed = GrayImage::from_fn(30, 20, |x, y| {
            Luma([((x * 13 + y * 29) % 150 + 10) as u8])
        });
        let search = ThresholdSearch::new(&PupilConfig::default()).unwrap();
        let first = search.find_best_threshold(&smoothed);
        for _ in 0..3 {
            assert_eq!(search.find_best_threshold(&smoothed), first);
        }
    }
}  // mod tests.
