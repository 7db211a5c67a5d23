// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::time::Instant;

use image::{GrayImage, Luma, Rgb, RgbImage};
use image::imageops;
use imageproc::morphology::{grayscale_erode, Mask};
use log::debug;

use crate::config::{CropMargins, PupilConfig, SmoothingParams};
use crate::error::PupilError;

/// Value of mask pixels above the threshold (background: sclera, skin).
pub const MASK_BACKGROUND: u8 = 255;
/// Value of mask pixels at or below the threshold (dark: iris, pupil).
pub const MASK_FOREGROUND: u8 = 0;

/// Removes `margins` from the edges of `frame`, returning the remaining region
/// as a new image.
pub fn crop_frame(frame: &RgbImage, margins: &CropMargins)
                  -> Result<RgbImage, PupilError> {
    let (width, height) = frame.dimensions();
    let horizontal = margins.left as u64 + margins.right as u64;
    let vertical = margins.top as u64 + margins.bottom as u64;
    if horizontal >= width as u64 || vertical >= height as u64 {
        return Err(PupilError::InvalidRegion{width, height, margins: *margins});
    }
    let crop_width = width - margins.left - margins.right;
    let crop_height = height - margins.top - margins.bottom;
    Ok(imageops::crop_imm(frame, margins.left, margins.top,
                          crop_width, crop_height).to_image())
}

// Reduces the image size by `factor` in each direction. Each output pixel is
// the rounded mean of its `factor`x`factor` source block, per channel. Source
// rows/columns that do not fill a whole block are dropped.
pub fn downsample_area(image: &RgbImage, factor: u32) -> RgbImage {
    assert!(factor > 0);
    let (width, height) = image.dimensions();
    let new_width = width / factor;
    let new_height = height / factor;
    if factor == 1 {
        return image.clone();
    }
    let block_count = factor * factor;
    let mut binned = RgbImage::new(new_width, new_height);
    for by in 0..new_height {
        for bx in 0..new_width {
            let mut sums = [0_u32; 3];
            for y in by * factor..(by + 1) * factor {
                for x in bx * factor..(bx + 1) * factor {
                    let pixel = image.get_pixel(x, y);
                    for c in 0..3 {
                        sums[c] += pixel.0[c] as u32;
                    }
                }
            }
            let mean = sums.map(|s| ((s + block_count / 2) / block_count) as u8);
            binned.put_pixel(bx, by, Rgb(mean));
        }
    }
    binned
}

// Mirror `pos` back into 0..len without repeating the edge pixel:
// ... 2 1 | 0 1 2 ... len-2 len-1 | len-2 ...
fn reflect_101(mut pos: i32, len: i32) -> i32 {
    if len == 1 {
        return 0;
    }
    loop {
        if pos < 0 {
            pos = -pos;
        } else if pos >= len {
            pos = 2 * len - 2 - pos;
        } else {
            return pos;
        }
    }
}

/// Edge-preserving smoothing. Each output pixel is a weighted mean over a disk
/// of diameter `params.diameter`, where the weight of a neighbor falls off
/// with both its distance (`sigma_space`) and its intensity difference from
/// the center pixel (`sigma_color`). Pixels beyond the image edge are
/// reflected.
pub fn bilateral_filter(image: &GrayImage, params: &SmoothingParams) -> GrayImage {
    let (width, height) = image.dimensions();
    let radius = std::cmp::max(params.diameter / 2, 1) as i32;
    let space_coeff = -0.5 / (params.sigma_space * params.sigma_space);
    let color_coeff = -0.5 / (params.sigma_color * params.sigma_color);

    // (dx, dy, spatial weight) for every offset within the disk.
    let mut offsets = Vec::<(i32, i32, f32)>::new();
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let dist_2 = (dx * dx + dy * dy) as f32;
            if dist_2 > (radius * radius) as f32 {
                continue;
            }
            offsets.push((dx, dy, (dist_2 * space_coeff).exp()));
        }
    }
    let mut color_weights = [0_f32; 256];
    for (diff, weight) in color_weights.iter_mut().enumerate() {
        *weight = ((diff * diff) as f32 * color_coeff).exp();
    }

    let pixels = image.as_raw();
    let (w, h) = (width as i32, height as i32);
    let mut smoothed = GrayImage::new(width, height);
    for y in 0..h {
        for x in 0..w {
            let center = pixels[(y * w + x) as usize];
            let mut sum = 0_f32;
            let mut weight_sum = 0_f32;
            for &(dx, dy, space_weight) in &offsets {
                let nx = reflect_101(x + dx, w);
                let ny = reflect_101(y + dy, h);
                let value = pixels[(ny * w + nx) as usize];
                let weight = space_weight *
                    color_weights[(value as i16 - center as i16).unsigned_abs() as usize];
                sum += weight * value as f32;
                weight_sum += weight;
            }
            // The center pixel always has weight 1, so weight_sum > 0.
            let value = (sum / weight_sum).round().clamp(0.0, 255.0) as u8;
            smoothed.put_pixel(x as u32, y as u32, Luma([value]));
        }
    }
    smoothed
}

/// Grayscale erosion: each pass replaces every pixel with the minimum of its
/// 3x3 neighborhood. Neighbors outside the image are ignored. Dark regions
/// grow by one pixel per iteration.
pub fn erode(image: &GrayImage, iterations: u32) -> GrayImage {
    let neighborhood = Mask::square(1);
    let mut eroded = image.clone();
    for _ in 0..iterations {
        eroded = grayscale_erode(&eroded, &neighborhood);
    }
    eroded
}

/// Returns the binary mask of `image`: pixels at or below `threshold` become
/// [MASK_FOREGROUND], the others [MASK_BACKGROUND].
pub fn binarize(image: &GrayImage, threshold: u8) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut mask = GrayImage::new(width, height);
    for (src, dst) in image.as_raw().iter().zip(mask.iter_mut()) {
        *dst = if *src > threshold { MASK_BACKGROUND } else { MASK_FOREGROUND };
    }
    mask
}

/// Returns a copy of `mask` surrounded by a `border`-pixel wide frame of
/// [MASK_BACKGROUND].
pub fn add_border(mask: &GrayImage, border: u32) -> GrayImage {
    let (width, height) = mask.dimensions();
    GrayImage::from_fn(width + 2 * border, height + 2 * border, |x, y| {
        let inside = x >= border && x < width + border &&
            y >= border && y < height + border;
        if inside {
            *mask.get_pixel(x - border, y - border)
        } else {
            Luma([MASK_BACKGROUND])
        }
    })
}

/// Crops, downsamples, converts to grayscale and smooths a raw eye-region
/// frame. The result is the grid on which thresholds are evaluated.
pub fn preprocess_frame(frame: &RgbImage, config: &PupilConfig)
                        -> Result<GrayImage, PupilError> {
    let preprocess_start = Instant::now();
    let cropped = crop_frame(frame, &config.crop_margins)?;
    let binned = downsample_area(&cropped, config.downsample_factor);
    if binned.width() == 0 || binned.height() == 0 {
        let (width, height) = frame.dimensions();
        return Err(PupilError::InvalidRegion{width, height,
                                             margins: config.crop_margins});
    }
    let gray = imageops::grayscale(&binned);
    let smoothed = bilateral_filter(&gray, &config.smoothing);
    debug!("Preprocessed {}x{} frame to {}x{} grid in {:?}",
           frame.width(), frame.height(), smoothed.width(), smoothed.height(),
           preprocess_start.elapsed());
    Ok(smoothed)
}

// mod tests.
