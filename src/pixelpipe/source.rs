/*
 * nefsynth - pixelpipe/source.rs
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

//! The shapes a source image can arrive in. Ordinary 8/16-bit RGB and
//! 2-D grayscale go through the full pixel pipeline; the three
//! pre-bayered array shapes bypass the color stages entirely.

use crate::geometry::Size;
use crate::model::Dimensions;
use crate::{Error, Result};

/// An already-decoded 8-bit RGB image, row-major, 3 bytes per pixel.
#[derive(Clone, Debug)]
pub struct Rgb8Plane {
    pub dims: Dimensions,
    pub data: Vec<u8>,
}

/// An already-decoded 16-bit RGB image, row-major, 3 samples per pixel.
#[derive(Clone, Debug)]
pub struct Rgb16Plane {
    pub dims: Dimensions,
    pub data: Vec<u16>,
}

/// An 8-bit grayscale image, row-major, one byte per pixel.
#[derive(Clone, Debug)]
pub struct Gray8Plane {
    pub dims: Dimensions,
    pub data: Vec<u8>,
}

/// `(rows, cols, 4)` uint16 per-channel RGGB data: channels 0..3 are R,
/// G1, G2, B and each has half the final plane's dimensions.
#[derive(Clone, Debug)]
pub struct PerChannelArray {
    pub half_dims: Dimensions,
    pub r: Vec<u16>,
    pub g1: Vec<u16>,
    pub g2: Vec<u16>,
    pub b: Vec<u16>,
}

/// A source image in any of the shapes the loader or the pre-bayered
/// array variant can produce.
#[derive(Clone, Debug)]
pub enum SourceImage {
    Rgb8(Rgb8Plane),
    Rgb16(Rgb16Plane),
    Gray8(Gray8Plane),
    /// `(rows, cols)` uint16, already a Bayer plane. Values must be
    /// `< 16384`; black-level bias is still applied, everything else is
    /// bypassed.
    BayerArray { dims: Dimensions, samples: Vec<u16> },
    /// `(rows, cols, 3)` uint16, treated as an ordinary RGB source (goes
    /// through the full pipeline, just like `Rgb16`, but the bit depth
    /// is already native so stage 1's promotion is a no-op).
    RgbArray(Rgb16Plane),
    /// `(rows, cols, 4)` uint16 per-channel RGGB; channels 0..3 are R,
    /// G1, G2, B and each has half the final plane's dimensions.
    PerChannelArray(PerChannelArray),
}

impl SourceImage {
    /// The dimensions this source would occupy as a final Bayer plane
    /// (for the per-channel shape, that is double its stored
    /// half-dimensions).
    pub fn bayer_dims(&self) -> Dimensions {
        match self {
            SourceImage::Rgb8(p) => p.dims,
            SourceImage::Rgb16(p) => p.dims,
            SourceImage::Gray8(p) => p.dims,
            SourceImage::BayerArray { dims, .. } => *dims,
            SourceImage::RgbArray(p) => p.dims,
            SourceImage::PerChannelArray(p) => {
                Dimensions::new(p.half_dims.columns * 2, p.half_dims.rows * 2)
            }
        }
    }

    pub fn as_size(&self) -> Size {
        let d = self.bayer_dims();
        Size {
            width: d.columns,
            height: d.rows,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            SourceImage::BayerArray { dims, samples } => {
                check_len("BayerArray", *dims, 1, samples.len())?;
                if let Some(&bad) = samples.iter().find(|&&v| v >= 16384) {
                    return Err(Error::SourceFormatError(format!(
                        "pre-Bayer sample {bad} out of range, must be < 16384"
                    )));
                }
                Ok(())
            }
            SourceImage::RgbArray(p) => check_len("RgbArray", p.dims, 3, p.data.len()),
            SourceImage::PerChannelArray(p) => {
                let expected = p.half_dims.rows as usize * p.half_dims.columns as usize;
                for (name, chan) in [("R", &p.r), ("G1", &p.g1), ("G2", &p.g2), ("B", &p.b)] {
                    if chan.len() != expected {
                        return Err(Error::SourceFormatError(format!(
                            "per-channel source: channel {name} has {} samples, expected {expected}",
                            chan.len()
                        )));
                    }
                }
                Ok(())
            }
            SourceImage::Rgb8(p) => check_len("Rgb8", p.dims, 3, p.data.len()),
            SourceImage::Rgb16(p) => check_len("Rgb16", p.dims, 3, p.data.len()),
            SourceImage::Gray8(p) => check_len("Gray8", p.dims, 1, p.data.len()),
        }
    }

    /// True for the three pre-bayered shapes: these skip the color
    /// pipeline stages (3-10) entirely; black-level bias is still
    /// applied downstream.
    pub fn is_pre_bayered(&self) -> bool {
        matches!(
            self,
            SourceImage::BayerArray { .. } | SourceImage::PerChannelArray { .. }
        )
    }
}

fn check_len(name: &str, dims: Dimensions, channels: usize, actual: usize) -> Result<()> {
    let expected = dims.rows as usize * dims.columns as usize * channels;
    if actual != expected {
        return Err(Error::SourceFormatError(format!(
            "{name} source: expected {expected} samples for a {}x{} image, got {actual}",
            dims.columns, dims.rows
        )));
    }
    Ok(())
}
