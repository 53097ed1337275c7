/*
 * nefsynth - pixelpipe/mod.rs
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

//! Converts a loaded source image into a 14-bit RGGB Bayer plane.

pub mod source;
pub mod stages;

pub use source::{Gray8Plane, PerChannelArray, Rgb16Plane, Rgb8Plane, SourceImage};
pub use stages::build_bayer_plane;
