// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Instant;

use clap::Parser;
use env_logger;
use image::ImageReader;
use log::{error, info, warn};

use pupil_detect::algorithm::{draw_overlay, PupilLocator};
use pupil_detect::config::{CropMargins, PupilConfig};

/// Example program for running the PupilDetect localization pipeline on eye
/// image(s).
#[derive(Parser, Debug)]
#[command(author, version, about, long_about=None)]
struct Args {
    /// Path of the file or directory to process.
    #[arg(short, long)]
    input: String,

    /// Directory where annotated output file(s) are written.
    #[arg(short, long)]
    output: String,

    /// Pixels cropped from the top edge.
    #[arg(long, default_value_t = 10)]
    crop_top: u32,

    /// Pixels cropped from the bottom edge.
    #[arg(long, default_value_t = 10)]
    crop_bottom: u32,

    /// Pixels cropped from the left edge.
    #[arg(long, default_value_t = 150)]
    crop_left: u32,

    /// Pixels cropped from the right edge.
    #[arg(long, default_value_t = 50)]
    crop_right: u32,

    /// Downsampling factor applied after cropping.
    #[arg(short, long, default_value_t = 10)]
    downsample: u32,

    /// Expected fraction of the eye region covered by the iris.
    #[arg(short, long, default_value_t = 0.20)]
    target_ratio: f64,

    /// Erosion passes applied during the threshold search.
    #[arg(long, default_value_t = 3)]
    erosion_iterations: u32,

    /// Smallest pupil radius searched, in downsampled pixels.
    #[arg(long, default_value_t = 5)]
    min_radius: u32,

    /// Largest pupil radius searched, in downsampled pixels.
    #[arg(long, default_value_t = 12)]
    max_radius: u32,

    /// Minimum distance between detected circle centers, in downsampled
    /// pixels.
    #[arg(long, default_value_t = 80.0)]
    min_distance: f32,

    /// Also write the binary mask of each frame.
    #[arg(long, default_value_t = false)]
    debug_mask: std::primitive::bool,
}

impl Args {
    fn to_config(&self) -> PupilConfig {
        let mut config = PupilConfig::default();
        config.crop_margins = CropMargins{top: self.crop_top,
                                          bottom: self.crop_bottom,
                                          left: self.crop_left,
                                          right: self.crop_right};
        config.downsample_factor = self.downsample;
        config.target_iris_ratio = self.target_ratio;
        config.erosion_iterations = self.erosion_iterations;
        config.hough.min_radius = self.min_radius;
        config.hough.max_radius = self.max_radius;
        config.hough.min_distance = self.min_distance;
        config
    }
}

fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let locator = match PupilLocator::new(args.to_config()) {
        Ok(locator) => locator,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        },
    };
    let input_metadata = fs::metadata(&args.input).unwrap_or_else(|e| {
        panic!("Input file/dir '{}' does not exist? {:?}", args.input, e);
    });
    let output_metadata = fs::metadata(&args.output).unwrap_or_else(|e| {
        panic!("Output dir '{}' does not exist? {:?}", args.output, e);
    });
    assert!(output_metadata.is_dir(),
            "Output '{}' must be a directory", args.output);
    if input_metadata.is_dir() {
        // Process the files in name order, as consecutive video frames.
        let mut paths: Vec<PathBuf> = fs::read_dir(&args.input).unwrap()
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file())
            .collect();
        paths.sort();
        for path in paths {
            process_file(&path, &locator, &args);
        }
    } else {
        // Process the single file.
        assert!(input_metadata.is_file());
        process_file(Path::new(&args.input), &locator, &args);
    }
}

fn process_file(input_path: &Path, locator: &PupilLocator, args: &Args) {
    info!("Processing {:?}", input_path);
    let mut output_path = PathBuf::from(&args.output);
    output_path.push(input_path.file_name().unwrap());
    output_path.set_extension("png");

    let img = match ImageReader::open(input_path).and_then(|r| r.with_guessed_format()) {
        Ok(reader) => match reader.decode() {
            Ok(img) => img,
            Err(e) => {
                warn!("Skipping {:?} due to: {:?}", input_path, e);
                return;
            },
        },
        Err(e) => {
            warn!("Skipping {:?} due to: {:?}", input_path, e);
            return;
        },
    };
    let frame = img.into_rgb8();

    let locate_start = Instant::now();
    let analysis = match locator.analyze(&frame) {
        Ok(analysis) => analysis,
        Err(e) => {
            warn!("Skipping {:?} due to: {}", input_path, e);
            return;
        },
    };
    let result = &analysis.result;
    info!("Localization took {:?}", locate_start.elapsed());
    info!("threshold {} pupil {:?} (radius {:?}) iris {:?}",
          result.threshold.threshold, result.pupil_in_frame(),
          result.pupil_radius, result.iris_in_frame());

    let mut annotated = frame;
    draw_overlay(&mut annotated, result);
    if let Err(e) = annotated.save(&output_path) {
        warn!("Could not write {:?}: {:?}", output_path, e);
    }
    if args.debug_mask {
        let mut mask_path = output_path.clone();
        mask_path.set_extension("mask.png");
        if let Err(e) = analysis.mask.save(&mask_path) {
            warn!("Could not write {:?}: {:?}", mask_path, e);
        }
    }
}
