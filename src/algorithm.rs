// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! PupilDetect locates the pupil and iris in a close-up video frame of one
//! eye. Given a frame, PupilDetect returns a pupil center from a circular
//! Hough search, an iris centroid from contour moments, and a copy of the
//! frame with both marked.
//!
//! # Algorithm
//!
//! Each frame is processed independently:
//!
//! 1. The frame is cropped to the eye region, downsampled by block averaging,
//!    converted to grayscale and smoothed with an edge-preserving (bilateral)
//!    filter. Downsampling bounds the cost of everything that follows.
//! 2. A grid of candidate thresholds is scanned. For each, the fraction of
//!    pixels at or below the threshold (after a transient erosion that grows
//!    dark regions) is compared with the expected iris fraction of the eye
//!    region; the nearest wins, lowest threshold first on ties.
//! 3. The smoothed grid is binarized at that threshold.
//! 4. A circular Hough search over the binary mask yields the pupil. The last
//!    circle reported is used.
//! 5. The mask is padded with a white border and its contours are traced. The
//!    second-largest contour (the largest being the padded border itself) is
//!    taken as the iris, and its centroid is computed from area moments.
//!
//! The two strategies are reported side by side, each with its own validity
//! flag. They are not cross-checked: the Hough circle tracks the darkest round
//! blob while the contour tracks the whole dark region, and they can
//! disagree.
//!
//! # Caveats
//!
//! The defaults (crop margins, target iris ratio, Hough radius band) are tuned
//! for one camera placement and lighting setup. Under other conditions expect
//! to adjust [PupilConfig].
//!
//! Failure to find a circle or an iris contour is not an error: the
//! corresponding [Localization] is returned with `valid` false and a (0, 0)
//! location, so a bad frame does not interrupt a processing loop. Only an
//! unusable configuration or a frame too small for the crop margins produce
//! a [PupilError].

use std::time::Instant;

use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_circle_mut, draw_line_segment_mut};
use log::{debug, info};

use crate::config::PupilConfig;
use crate::contour_funcs::locate_iris;
use crate::error::PupilError;
use crate::hough::{detect_circles, select_pupil_circle};
use crate::image_funcs::{add_border, binarize, preprocess_frame};
use crate::threshold::{darkness_ratio, ThresholdSearch};
use crate::types::{DetectionResult, GridMapping, Localization};

const PUPIL_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
const IRIS_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
// Half length of the crosshair arms, in grid pixels.
const CROSSHAIR_ARM: f32 = 3.0;

/// Everything computed for one frame: the detection result plus the binary
/// mask both strategies ran on.
pub struct FrameAnalysis {
    pub result: DetectionResult,
    pub mask: GrayImage,
}

/// Runs the localization pipeline with a fixed, validated configuration. Holds
/// no per-frame state; a single instance can process any number of frames.
pub struct PupilLocator {
    config: PupilConfig,
    search: ThresholdSearch,
}

impl PupilLocator {
    pub fn new(config: PupilConfig) -> Result<Self, PupilError> {
        config.validate()?;
        let search = ThresholdSearch::new(&config)?;
        Ok(PupilLocator{config, search})
    }

    pub fn config(&self) -> &PupilConfig {
        &self.config
    }

    /// Computes the detection result for `frame` without drawing anything.
    pub fn analyze(&self, frame: &RgbImage) -> Result<FrameAnalysis, PupilError> {
        let analyze_start = Instant::now();
        let smoothed = preprocess_frame(frame, &self.config)?;
        let threshold = self.search.find_best_threshold(&smoothed);
        let mask = binarize(&smoothed, threshold.threshold);
        debug!("Final mask darkness ratio {:.4}", darkness_ratio(&mask));

        let circles = detect_circles(&mask, &self.config.hough);
        let (pupil, pupil_radius) = match select_pupil_circle(&circles) {
            Some(circle) => {
                (Localization::found(circle.center_x.round() as i32,
                                     circle.center_y.round() as i32),
                 Some(circle.radius))
            },
            None => {
                debug!("No pupil circle found");
                (Localization::not_found(), None)
            },
        };

        let padded = add_border(&mask, self.config.border_width);
        let iris = locate_iris(&padded, self.config.border_width);

        let result = DetectionResult{pupil, pupil_radius, iris, threshold,
                                     mapping: GridMapping::from_config(&self.config)};
        info!("Threshold {} (ratio {:.3}); pupil {:?}; iris {:?}; analyzed in {:?}",
              threshold.threshold, threshold.darkness_ratio,
              result.pupil_in_frame(), result.iris_in_frame(),
              analyze_start.elapsed());
        Ok(FrameAnalysis{result, mask})
    }

    /// Analyzes `frame` and returns a copy of it with the detections drawn,
    /// along with the detection result.
    pub fn locate(&self, frame: &RgbImage)
                  -> Result<(RgbImage, DetectionResult), PupilError> {
        let analysis = self.analyze(frame)?;
        let mut annotated = frame.clone();
        draw_overlay(&mut annotated, &analysis.result);
        Ok((annotated, analysis.result))
    }
}

/// One-shot convenience wrapper around [PupilLocator::locate()].
pub fn locate_pupil(frame: &RgbImage, config: &PupilConfig)
                    -> Result<(RgbImage, DetectionResult), PupilError> {
    PupilLocator::new(config.clone())?.locate(frame)
}

fn draw_crosshair(frame: &mut RgbImage, (x, y): (f32, f32), arm: f32, color: Rgb<u8>) {
    // Two pixels thick.
    for offset in [0.0, 1.0] {
        draw_line_segment_mut(frame, (x - arm, y + offset), (x + arm, y + offset), color);
        draw_line_segment_mut(frame, (x + offset, y - arm), (x + offset, y + arm), color);
    }
}

/// Marks the valid localizations of `result` on `frame`, which must be the
/// raw frame `result` was computed from: the pupil circle and crosshair in
/// blue, the iris crosshair in green.
pub fn draw_overlay(frame: &mut RgbImage, result: &DetectionResult) {
    let mapping = &result.mapping;
    let arm = mapping.length_to_frame(CROSSHAIR_ARM);
    if result.pupil.valid {
        let center = mapping.to_frame(result.pupil.x as f32, result.pupil.y as f32);
        if let Some(radius) = result.pupil_radius {
            let radius = mapping.length_to_frame(radius).round() as i32;
            draw_hollow_circle_mut(frame, (center.0.round() as i32, center.1.round() as i32),
                                   radius, PUPIL_COLOR);
        }
        draw_crosshair(frame, center, arm, PUPIL_COLOR);
    }
    if result.iris.valid {
        let center = mapping.to_frame(result.iris.x as f32, result.iris.y as f32);
        draw_crosshair(frame, center, arm, IRIS_COLOR);
    }
}

#[cfg(test)]
mod tests {
    use imageproc::drawing::draw_filled_circle_mut;

    use super::*;
    use crate::config::CropMargins;

    const SCLERA_LEVEL: u8 = 200;
    const IRIS_LEVEL: u8 = 56;
    const PUPIL_LEVEL: u8 = 15;
    // Eye center in frame coordinates.
    const EYE_X: i32 = 370;
    const EYE_Y: i32 = 240;

    // 640x480 frame; the iris covers ~12% of the cropped region, ~20% once
    // eroded during the threshold search.
    fn synthetic_eye_frame() -> RgbImage {
        let mut frame = RgbImage::from_pixel(
            640, 480, Rgb([SCLERA_LEVEL, SCLERA_LEVEL, SCLERA_LEVEL]));
        draw_filled_circle_mut(&mut frame, (EYE_X, EYE_Y), 90,
                               Rgb([IRIS_LEVEL, IRIS_LEVEL, IRIS_LEVEL]));
        draw_filled_circle_mut(&mut frame, (EYE_X, EYE_Y), 30,
                               Rgb([PUPIL_LEVEL, PUPIL_LEVEL, PUPIL_LEVEL]));
        frame
    }

    // The eye center in grid coordinates: the frame pixel center mapped
    // through the crop and 10x downsampling.
    fn expected_grid_center() -> (f32, f32) {
        let margins = CropMargins::default();
        ((EYE_X as f32 - margins.left as f32 + 0.5) / 10.0 - 0.5,
         (EYE_Y as f32 - margins.top as f32 + 0.5) / 10.0 - 0.5)
    }

    #[test]
    fn test_synthetic_eye() {
        let frame = synthetic_eye_frame();
        let locator = PupilLocator::new(PupilConfig::default()).unwrap();
        let (annotated, result) = locator.locate(&frame).unwrap();

        assert!(result.threshold.threshold >= IRIS_LEVEL, "{:?}", result);
        assert!(result.threshold.threshold < SCLERA_LEVEL, "{:?}", result);

        let (gx, gy) = expected_grid_center();
        assert!(result.iris.valid, "{:?}", result);
        assert!((result.iris.x as f32 - gx).abs() <= 2.0, "{:?}", result);
        assert!((result.iris.y as f32 - gy).abs() <= 2.0, "{:?}", result);
        assert!(result.pupil.valid, "{:?}", result);
        assert!((result.pupil.x as f32 - gx).abs() <= 2.0, "{:?}", result);
        assert!((result.pupil.y as f32 - gy).abs() <= 2.0, "{:?}", result);
        let radius = result.pupil_radius.unwrap();
        assert!(radius >= 5.0 && radius <= 12.0, "{:?}", result);

        let (ix, iy) = result.iris_in_frame().unwrap();
        assert!((ix - EYE_X).abs() <= 20, "{:?}", (ix, iy));
        assert!((iy - EYE_Y).abs() <= 20, "{:?}", (ix, iy));
        let (px, py) = result.pupil_in_frame().unwrap();
        assert!((px - EYE_X).abs() <= 20, "{:?}", (px, py));
        assert!((py - EYE_Y).abs() <= 20, "{:?}", (px, py));

        // The overlay is drawn at full resolution.
        assert_eq!(annotated.dimensions(), frame.dimensions());
        assert_eq!(annotated.get_pixel(ix as u32, iy as u32), &IRIS_COLOR);
        assert_ne!(annotated, frame);
    }

    #[test]
    fn test_pipeline_is_deterministic() {
        let frame = synthetic_eye_frame();
        let locator = PupilLocator::new(PupilConfig::default()).unwrap();
        let first = locator.analyze(&frame).unwrap();
        for _ in 0..2 {
            let again = locator.analyze(&frame).unwrap();
            assert_eq!(again.result, first.result);
            assert_eq!(again.mask, first.mask);
        }
    }

    #[test]
    fn test_blank_frame_degrades_softly() {
        let frame = RgbImage::from_pixel(640, 480, Rgb([180, 180, 180]));
        let (annotated, result) = locate_pupil(&frame, &PupilConfig::default()).unwrap();
        assert_eq!(result.threshold.threshold, 30);
        assert_eq!(result.threshold.darkness_ratio, 0.0);
        assert_eq!(result.pupil, Localization::not_found());
        assert_eq!(result.pupil_radius, None);
        assert_eq!(result.iris, Localization::not_found());
        // Nothing to draw.
        assert_eq!(annotated, frame);
    }

    #[test]
    fn test_mask_matches_threshold() {
        let frame = synthetic_eye_frame();
        let locator = PupilLocator::new(PupilConfig::default()).unwrap();
        let analysis = locator.analyze(&frame).unwrap();
        assert_eq!(analysis.mask.dimensions(), (44, 46));
        let (gx, gy) = expected_grid_center();
        // Eye center is dark, corners are background.
        assert_eq!(analysis.mask.get_pixel(gx.round() as u32, gy.round() as u32).0[0], 0);
        assert_eq!(analysis.mask.get_pixel(0, 0).0[0], 255);
        assert_eq!(analysis.mask.get_pixel(43, 45).0[0], 255);
    }

    #[test]
    fn test_configuration_errors() {
        let mut config = PupilConfig::default();
        config.downsample_factor = 0;
        assert!(matches!(PupilLocator::new(config),
                         Err(PupilError::InvalidConfig(_))));

        let small_frame = RgbImage::new(150, 100);
        assert!(matches!(locate_pupil(&small_frame, &PupilConfig::default()),
                         Err(PupilError::InvalidRegion{..})));
    }
}  // mod tests.
