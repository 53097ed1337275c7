/*
 * nefsynth - model.rs
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

//! Core data model shared across the pipeline: dimensions, white balance
//! and the Bayer plane that the predictor codec consumes.

use crate::{Error, Result};

/// Pixel dimensions, `(columns, rows)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Dimensions {
    pub columns: u32,
    pub rows: u32,
}

impl Dimensions {
    pub fn new(columns: u32, rows: u32) -> Dimensions {
        Dimensions { columns, rows }
    }
}

/// Red/blue multipliers applied to invert white balance. Green sites are
/// never scaled.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WhiteBalance {
    pub red_mul: f32,
    pub blue_mul: f32,
}

impl WhiteBalance {
    pub fn new(red_mul: f32, blue_mul: f32) -> Result<WhiteBalance> {
        if !(red_mul > 0.0) || !(blue_mul > 0.0) {
            return Err(Error::DonorFormatError(format!(
                "white balance multipliers must be positive, got ({red_mul}, {blue_mul})"
            )));
        }
        Ok(WhiteBalance { red_mul, blue_mul })
    }
}

/// A 2-D plane of unsigned 14-bit samples in RGGB Bayer layout: `(0,0)=R`,
/// `(0,1)=G1`, `(1,0)=G2`, `(1,1)=B`, tiled across the plane.
///
/// `rows` and `columns` are always even; this is checked once at
/// construction and never re-verified downstream.
#[derive(Clone, Debug)]
pub struct BayerPlane {
    dims: Dimensions,
    samples: Vec<u16>,
}

impl BayerPlane {
    /// Build a plane filled with `fill` (typically the black level).
    pub fn filled(dims: Dimensions, fill: u16) -> Result<BayerPlane> {
        Self::validate_dims(dims)?;
        let len = dims.rows as usize * dims.columns as usize;
        Ok(BayerPlane {
            dims,
            samples: vec![fill; len],
        })
    }

    /// Build a plane from already-computed samples, row-major.
    pub fn from_samples(dims: Dimensions, samples: Vec<u16>) -> Result<BayerPlane> {
        Self::validate_dims(dims)?;
        if samples.len() != dims.rows as usize * dims.columns as usize {
            return Err(Error::SourceFormatError(format!(
                "expected {} samples for {}x{} plane, got {}",
                dims.rows as usize * dims.columns as usize,
                dims.columns,
                dims.rows,
                samples.len()
            )));
        }
        Ok(BayerPlane { dims, samples })
    }

    fn validate_dims(dims: Dimensions) -> Result<()> {
        if dims.rows == 0 || dims.columns == 0 || dims.rows % 2 != 0 || dims.columns % 2 != 0 {
            return Err(Error::SourceFormatError(format!(
                "Bayer plane dimensions must be positive and even, got {}x{}",
                dims.columns, dims.rows
            )));
        }
        Ok(())
    }

    pub fn dims(&self) -> Dimensions {
        self.dims
    }

    #[inline]
    pub fn get(&self, row: u32, col: u32) -> u16 {
        self.samples[row as usize * self.dims.columns as usize + col as usize]
    }

    #[inline]
    pub fn set(&mut self, row: u32, col: u32, value: u16) {
        self.samples[row as usize * self.dims.columns as usize + col as usize] = value;
    }

    pub fn samples(&self) -> &[u16] {
        &self.samples
    }

    /// Iterate samples in the row-ascending, column-ascending order the
    /// predictor codec is required to process them in.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[u16]> {
        self.samples.chunks(self.dims.columns as usize)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_filled_rejects_odd_dims() {
        assert!(BayerPlane::filled(Dimensions::new(3, 4), 0).is_err());
        assert!(BayerPlane::filled(Dimensions::new(4, 3), 0).is_err());
    }

    #[test]
    fn test_filled_get_set() {
        let mut plane = BayerPlane::filled(Dimensions::new(4, 2), 1008).unwrap();
        assert_eq!(plane.get(0, 0), 1008);
        plane.set(1, 3, 2000);
        assert_eq!(plane.get(1, 3), 2000);
        assert_eq!(plane.get(0, 1), 1008);
    }

    #[test]
    fn test_white_balance_rejects_nonpositive() {
        assert!(WhiteBalance::new(0.0, 1.0).is_err());
        assert!(WhiteBalance::new(1.0, -1.0).is_err());
        assert!(WhiteBalance::new(2.0, 1.5).is_ok());
    }
}
