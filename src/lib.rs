// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

pub mod algorithm;
pub mod config;
pub mod contour_funcs;
pub mod error;
pub mod histogram_funcs;
pub mod hough;
pub mod image_funcs;
pub mod threshold;
pub mod types;

pub use algorithm::{locate_pupil, PupilLocator};
pub use config::PupilConfig;
pub use error::PupilError;
pub use types::{DetectionResult, Localization};
