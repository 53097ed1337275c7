/*
 * nefsynth - context.rs
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

//! The configuration record threaded through the pipeline and
//! regenerator, replacing a process-wide config singleton: each
//! component receives only the fields it needs, taken from a `Context`
//! value built once up front.

use std::path::PathBuf;

use crate::geometry::{GeometryMode, HorizAlign, VertAlign};

/// Resampling algorithm used by the geometry pipeline stage and the
/// preview regenerator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Resampler {
    #[default]
    Lanczos4,
    Cubic,
    Area,
    Linear,
    Nearest,
}

/// 24-bit RGB fill color for padded regions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BorderColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Default for BorderColor {
    fn default() -> BorderColor {
        BorderColor { r: 0, g: 0, b: 0 }
    }
}

/// Multiplicative HSV adjustment. Named `srcHsl` in the configuration
/// record this is grounded on, but the operation is HSV, not HSL — see
/// the design notes on that naming mismatch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HslMultipliers {
    pub h_mul: f32,
    pub s_mul: f32,
    pub l_mul: f32,
}

impl Default for HslMultipliers {
    fn default() -> HslMultipliers {
        HslMultipliers {
            h_mul: 1.0,
            s_mul: 0.5,
            l_mul: 1.0,
        }
    }
}

/// Everything the core needs to synthesize one output NEF, gathered once
/// by the (out-of-scope) CLI/config layer and passed down by value.
#[derive(Clone, Debug)]
pub struct Context {
    pub resize_geometry: GeometryMode,
    pub maintain_aspect_ratio: bool,
    pub horz_align: HorizAlign,
    pub vert_align: VertAlign,
    pub resampler: Resampler,
    pub border_color: BorderColor,
    pub src_hsl: HslMultipliers,
    pub srgb_to_linear: bool,
    pub wb_multipliers_override: Option<(f32, f32)>,
    pub grayscale: bool,
    pub embedded_image_override: Option<PathBuf>,
}

impl Default for Context {
    fn default() -> Context {
        Context {
            resize_geometry: GeometryMode::Full,
            maintain_aspect_ratio: true,
            horz_align: HorizAlign::Center,
            vert_align: VertAlign::Center,
            resampler: Resampler::default(),
            border_color: BorderColor::default(),
            src_hsl: HslMultipliers::default(),
            srgb_to_linear: true,
            wb_multipliers_override: None,
            grayscale: false,
            embedded_image_override: None,
        }
    }
}
