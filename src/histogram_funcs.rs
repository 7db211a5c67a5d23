// Copyright (c) 2024 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use image::GrayImage;

/// Returns the 256 bin histogram of the image's pixel values.
pub fn histogram_of(image: &GrayImage) -> [u32; 256] {
    let mut histogram = [0_u32; 256];
    for &pixel in image.as_raw() {
        histogram[pixel as usize] += 1;
    }
    histogram
}

/// Element N of the result is the number of histogram entries in bins 0..=N.
pub fn cumulative_counts(histogram: &[u32; 256]) -> [u32; 256] {
    let mut cumulative = [0_u32; 256];
    let mut count = 0;
    for h in 0..256 {
        count += histogram[h];
        cumulative[h] = count;
    }
    cumulative
}

#[cfg(test)]
mod tests {
    use imageproc::gray_image;
    use crate::histogram_funcs::{cumulative_counts, histogram_of};

    #[test]
    fn test_histogram_and_cumulative_counts() {
        let image = gray_image!(
            0, 30, 30;
            31, 255, 30);
        let histogram = histogram_of(&image);
        assert_eq!(histogram[0], 1);
        assert_eq!(histogram[30], 3);
        assert_eq!(histogram[31], 1);
        assert_eq!(histogram[255], 1);

        let cumulative = cumulative_counts(&histogram);
        assert_eq!(cumulative[0], 1);
        assert_eq!(cumulative[29], 1);
        assert_eq!(cumulative[30], 4);
        assert_eq!(cumulative[31], 5);
        assert_eq!(cumulative[254], 5);
        assert_eq!(cumulative[255], 6);
    }
}  // mod tests.
