// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::time::Instant;

use image::GrayImage;
use imageproc::edges::canny;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use log::debug;

use crate::config::HoughParams;

/// A circle found by [detect_circles()], in mask pixel coordinates.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Circle {
    pub center_x: f32,
    pub center_y: f32,
    pub radius: f32,
    /// Accumulator votes for the center.
    pub votes: u32,
}

#[derive(Copy, Clone, Debug)]
struct CenterCandidate {
    x: i32,
    y: i32,
    votes: u32,
}

// Accumulates center votes. Every edge pixel votes along its gradient
// direction, both ways, at each distance in the radius band.
fn accumulate_centers(edges: &GrayImage, mask: &GrayImage, params: &HoughParams)
                      -> (Vec<u32>, Vec<(i32, i32)>) {
    let (width, height) = mask.dimensions();
    let (w, h) = (width as i32, height as i32);
    let gx = horizontal_sobel(mask);
    let gy = vertical_sobel(mask);
    let mut accumulator = vec![0_u32; (width * height) as usize];
    let mut edge_points = Vec::<(i32, i32)>::new();
    for (x, y, edge) in edges.enumerate_pixels() {
        if edge.0[0] == 0 {
            continue;
        }
        let dx = gx.get_pixel(x, y).0[0] as f32;
        let dy = gy.get_pixel(x, y).0[0] as f32;
        let magnitude = dx.hypot(dy);
        if magnitude == 0.0 {
            continue;
        }
        edge_points.push((x as i32, y as i32));
        let (ux, uy) = (dx / magnitude, dy / magnitude);
        for sign in [-1.0_f32, 1.0] {
            for r in params.min_radius..=params.max_radius {
                let cx = (x as f32 + sign * r as f32 * ux).round() as i32;
                let cy = (y as f32 + sign * r as f32 * uy).round() as i32;
                if cx < 0 || cx >= w || cy < 0 || cy >= h {
                    break;
                }
                accumulator[(cy * w + cx) as usize] += 1;
            }
        }
    }
    (accumulator, edge_points)
}

// Local maxima of the accumulator exceeding the vote threshold, strongest
// first. Equal votes keep raster order.
fn find_center_candidates(accumulator: &[u32], width: u32, height: u32,
                          vote_threshold: u32) -> Vec<CenterCandidate> {
    let (w, h) = (width as i32, height as i32);
    let votes_at = |x: i32, y: i32| -> u32 {
        if x < 0 || x >= w || y < 0 || y >= h {
            0
        } else {
            accumulator[(y * w + x) as usize]
        }
    };
    let mut candidates = Vec::<CenterCandidate>::new();
    for y in 0..h {
        for x in 0..w {
            let v = votes_at(x, y);
            // Strict on the left/top neighbors, non-strict on the right/bottom
            // ones, so a plateau yields a single maximum.
            if v > vote_threshold &&
                v > votes_at(x - 1, y) && v >= votes_at(x + 1, y) &&
                v > votes_at(x, y - 1) && v >= votes_at(x, y + 1)
            {
                candidates.push(CenterCandidate{x, y, votes: v});
            }
        }
    }
    candidates.sort_by(|a, b| b.votes.cmp(&a.votes));
    candidates
}

// Picks the radius in the band that is supported by the most edge pixels.
// Returns (radius, support); ties go to the smaller radius.
fn estimate_radius(center: &CenterCandidate, edge_points: &[(i32, i32)],
                   params: &HoughParams) -> (u32, u32) {
    let mut support = vec![0_u32; params.max_radius as usize + 1];
    for &(x, y) in edge_points {
        let dx = (x - center.x) as f32;
        let dy = (y - center.y) as f32;
        let dist = dx.hypot(dy).round() as u32;
        if dist >= params.min_radius && dist <= params.max_radius {
            support[dist as usize] += 1;
        }
    }
    let mut best_radius = params.min_radius;
    let mut best_support = 0;
    for r in params.min_radius..=params.max_radius {
        if support[r as usize] > best_support {
            best_radius = r;
            best_support = support[r as usize];
        }
    }
    (best_radius, best_support)
}

/// Circular Hough search for dark round blobs in a binary mask. Circles are
/// returned strongest first; no two centers are closer than
/// `params.min_distance`. Each circle's radius lies within
/// `params.min_radius..=params.max_radius` and is confirmed by at least
/// `params.vote_threshold` edge pixels.
pub fn detect_circles(mask: &GrayImage, params: &HoughParams) -> Vec<Circle> {
    let hough_start = Instant::now();
    let (width, height) = mask.dimensions();
    let edges = canny(mask, params.canny_high / 2.0, params.canny_high);
    let (accumulator, edge_points) = accumulate_centers(&edges, mask, params);
    let candidates = find_center_candidates(&accumulator, width, height,
                                            params.vote_threshold);
    debug!("{} edge pixels, {} center candidates",
           edge_points.len(), candidates.len());

    let min_distance_2 = params.min_distance * params.min_distance;
    let mut circles = Vec::<Circle>::new();
    for candidate in candidates {
        let too_close = circles.iter().any(|c| {
            let dx = c.center_x - candidate.x as f32;
            let dy = c.center_y - candidate.y as f32;
            dx * dx + dy * dy < min_distance_2
        });
        if too_close {
            continue;
        }
        let (radius, support) = estimate_radius(&candidate, &edge_points, params);
        if support < params.vote_threshold {
            debug!("Center ({}, {}) has only {} edge pixels in radius band",
                   candidate.x, candidate.y, support);
            continue;
        }
        circles.push(Circle{center_x: candidate.x as f32,
                            center_y: candidate.y as f32,
                            radius: radius as f32,
                            votes: candidate.votes});
    }
    debug!("Hough search found {} circles in {:?}",
           circles.len(), hough_start.elapsed());
    circles
}

/// The pupil is the last circle reported by [detect_circles()]. This is not
/// necessarily the strongest or largest one; with the default minimum center
/// distance the downsampled eye region holds a single circle anyway.
pub fn select_pupil_circle(circles: &[Circle]) -> Option<Circle> {
    circles.last().copied()
}

// mod tests.
