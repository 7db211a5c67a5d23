// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::time::Instant;

use image::{GrayImage, Luma};
use imageproc::contours::find_contours;
use imageproc::point::Point;
use log::debug;

use crate::types::Localization;

/// A closed boundary traced in a mask, with its enclosed area.
#[derive(Clone, Debug)]
pub struct RankedContour {
    pub points: Vec<Point<i32>>,
    pub area: f64,
}

/// Zeroth and first order moments of the polygon through a contour's points.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AreaMoments {
    pub m00: f64,
    pub m10: f64,
    pub m01: f64,
}

impl AreaMoments {
    /// Returns None for a zero-area polygon.
    pub fn centroid(&self) -> Option<(f64, f64)> {
        if self.m00 == 0.0 {
            return None;
        }
        Some((self.m10 / self.m00, self.m01 / self.m00))
    }
}

/// Moments of the closed polygon through `points`, via Green's theorem. The
/// sign of the moments follows the winding direction; the centroid does not.
pub fn area_moments(points: &[Point<i32>]) -> AreaMoments {
    let mut m00 = 0.0_f64;
    let mut m10 = 0.0_f64;
    let mut m01 = 0.0_f64;
    let n = points.len();
    for i in 0..n {
        let p = points[i];
        let q = points[(i + 1) % n];
        let (x0, y0) = (p.x as f64, p.y as f64);
        let (x1, y1) = (q.x as f64, q.y as f64);
        let cross = x0 * y1 - x1 * y0;
        m00 += cross;
        m10 += cross * (x0 + x1);
        m01 += cross * (y0 + y1);
    }
    AreaMoments{m00: m00 / 2.0, m10: m10 / 6.0, m01: m01 / 6.0}
}

/// Unsigned area enclosed by the closed polygon through `points`.
pub fn contour_area(points: &[Point<i32>]) -> f64 {
    area_moments(points).m00.abs()
}

/// Returns a copy of `mask` with its outermost one-pixel ring set to zero.
/// Border following only starts an outer border at a zero-to-nonzero
/// transition, so background touching the image edge would otherwise never
/// get an outer contour.
fn clear_outer_ring(mask: &GrayImage) -> GrayImage {
    let (width, height) = mask.dimensions();
    let mut cleared = mask.clone();
    for (x, y, pixel) in cleared.enumerate_pixels_mut() {
        if x == 0 || y == 0 || x + 1 == width || y + 1 == height {
            *pixel = Luma([0]);
        }
    }
    cleared
}

/// Traces every border in `mask`, retaining all border points, and returns
/// them sorted by enclosed area, smallest first. The outermost pixel ring of
/// `mask` is treated as zero. Borders are traced around non-zero
/// (background) regions, so dark blobs show up as hole borders and the
/// background itself contributes the largest, outer border.
pub fn extract_contours(mask: &GrayImage) -> Vec<RankedContour> {
    let mut ranked: Vec<RankedContour> = find_contours::<i32>(&clear_outer_ring(mask))
        .into_iter()
        .map(|contour| {
            let area = contour_area(&contour.points);
            RankedContour{points: contour.points, area}
        })
        .collect();
    ranked.sort_by(|a, b| a.area.total_cmp(&b.area));
    ranked
}

/// The iris is the second-largest contour: the largest one is the outer
/// border of the white frame added around the mask. Returns None if there are fewer
/// than two contours.
pub fn select_iris_contour(ranked: &[RankedContour]) -> Option<&RankedContour> {
    if ranked.len() < 2 {
        return None;
    }
    Some(&ranked[ranked.len() - 2])
}

/// Locates the iris in a mask that was padded with a `border`-pixel white
/// frame. The returned location is in unpadded mask coordinates.
pub fn locate_iris(padded_mask: &GrayImage, border: u32) -> Localization {
    let contour_start = Instant::now();
    let ranked = extract_contours(padded_mask);
    let iris = match select_iris_contour(&ranked) {
        Some(iris) => iris,
        None => {
            debug!("Only {} contours; no iris contour", ranked.len());
            return Localization::not_found();
        },
    };
    let (cx, cy) = match area_moments(&iris.points).centroid() {
        Some(c) => c,
        None => {
            debug!("Iris contour of {} points has zero area", iris.points.len());
            return Localization::not_found();
        },
    };
    debug!("Iris contour area {} of {} contours; centroid ({:.2}, {:.2}) in {:?}",
           iris.area, ranked.len(), cx, cy, contour_start.elapsed());
    Localization::found(cx.round() as i32 - border as i32,
                        cy.round() as i32 - border as i32)
}

// mod tests.
