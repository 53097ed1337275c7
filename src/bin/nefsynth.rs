// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * nefsynth - bin/nefsynth.rs
 *
 * Copyright (C) 2022 Hubert Figuière
 *
 * This library is free software: you can redistribute it and/or
 * modify it under the terms of the GNU Lesser General Public License
 * as published by the Free Software Foundation, either version 3 of
 * the License, or (at your option) any later version.
 *
 * This library is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
 * Lesser General Public License for more details.
 *
 * You should have received a copy of the GNU Lesser General Public
 * License along with this library.  If not, see
 * <http://www.gnu.org/licenses/>.
 */

use std::path::Path;
use std::process::ExitCode;

use getopts::Options;
use log::{error, LevelFilter};
use simple_logger::SimpleLogger;

use nefsynth::context::{Context, Resampler};
use nefsynth::donor;
use nefsynth::geometry::GeometryMode;
use nefsynth::model::Dimensions;
use nefsynth::pixelpipe::{Rgb8Plane, SourceImage};

fn print_usage(program: &str, opts: &Options) {
    let brief = format!("Usage: {program} -d DONOR.NEF -s SOURCE.jpg -o OUTPUT.NEF");
    print!("{}", opts.usage(&brief));
}

fn parse_resampler(name: &str) -> Option<Resampler> {
    match name {
        "lanczos4" => Some(Resampler::Lanczos4),
        "cubic" => Some(Resampler::Cubic),
        "area" => Some(Resampler::Area),
        "linear" => Some(Resampler::Linear),
        "nearest" => Some(Resampler::Nearest),
        _ => None,
    }
}

fn parse_geometry_mode(name: &str) -> Option<GeometryMode> {
    match name {
        "none" => Some(GeometryMode::None),
        "minimum" => Some(GeometryMode::Minimum),
        "full" => Some(GeometryMode::Full),
        _ => None,
    }
}

fn load_source_image(path: &Path, grayscale: bool) -> Result<SourceImage, String> {
    let img = image::open(path).map_err(|e| format!("can't read source image: {e}"))?;
    if grayscale {
        let gray = img.into_luma8();
        Ok(SourceImage::Gray8(nefsynth::pixelpipe::Gray8Plane {
            dims: Dimensions::new(gray.width(), gray.height()),
            data: gray.into_raw(),
        }))
    } else {
        let rgb = img.into_rgb8();
        Ok(SourceImage::Rgb8(Rgb8Plane {
            dims: Dimensions::new(rgb.width(), rgb.height()),
            data: rgb.into_raw(),
        }))
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let program = args[0].clone();

    let mut opts = Options::new();
    opts.optopt("d", "donor", "Donor NEF path", "DONOR");
    opts.optopt("s", "source", "Source image path", "SOURCE");
    opts.optopt("o", "output", "Output NEF path", "OUTPUT");
    opts.optopt(
        "g",
        "geometry",
        "Resize geometry: none, minimum, full (default full)",
        "MODE",
    );
    opts.optopt(
        "r",
        "resampler",
        "Resampler: lanczos4, cubic, area, linear, nearest (default lanczos4)",
        "ALGO",
    );
    opts.optflag("", "grayscale", "Treat the source as grayscale");
    opts.optflagmulti("v", "", "Increase verbosity (-v, -vv)");
    opts.optflag("h", "help", "Print this help");

    let matches = match opts.parse(&args[1..]) {
        Ok(m) => m,
        Err(f) => {
            eprintln!("{f}");
            print_usage(&program, &opts);
            return ExitCode::FAILURE;
        }
    };

    if matches.opt_present("h") {
        print_usage(&program, &opts);
        return ExitCode::SUCCESS;
    }

    let loglevel = match matches.opt_count("v") {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    SimpleLogger::new()
        .with_module_level("nefsynth", loglevel)
        .init()
        .unwrap();

    let (donor_path, source_path, output_path) = match (
        matches.opt_str("d"),
        matches.opt_str("s"),
        matches.opt_str("o"),
    ) {
        (Some(d), Some(s), Some(o)) => (d, s, o),
        _ => {
            print_usage(&program, &opts);
            return ExitCode::FAILURE;
        }
    };

    let mut ctx = Context::default();
    if let Some(mode) = matches.opt_str("g") {
        match parse_geometry_mode(&mode) {
            Some(m) => ctx.resize_geometry = m,
            None => {
                error!("unrecognized geometry mode: {mode}");
                return ExitCode::FAILURE;
            }
        }
    }
    if let Some(algo) = matches.opt_str("r") {
        match parse_resampler(&algo) {
            Some(r) => ctx.resampler = r,
            None => {
                error!("unrecognized resampler: {algo}");
                return ExitCode::FAILURE;
            }
        }
    }
    ctx.grayscale = matches.opt_present("grayscale");

    let donor_bytes = match std::fs::read(&donor_path) {
        Ok(b) => b,
        Err(e) => {
            error!("can't read donor {donor_path}: {e}");
            return ExitCode::FAILURE;
        }
    };
    let metadata = match donor::parse(&donor_bytes) {
        Ok(m) => m,
        Err(e) => {
            error!("can't parse donor {donor_path}: {e}");
            return ExitCode::FAILURE;
        }
    };
    let source = match load_source_image(Path::new(&source_path), ctx.grayscale) {
        Ok(s) => s,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    match nefsynth::synthesize(
        &donor_bytes,
        &metadata,
        &source,
        &ctx,
        Path::new(&output_path),
    ) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("synthesis failed: {e}");
            ExitCode::FAILURE
        }
    }
}
