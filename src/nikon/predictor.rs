// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * nefsynth - nikon/predictor.rs
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

//! Row-pair predictive encoder for Nikon's 14-bit lossless raw
//! compression. Four predictor registers — even-row/even-column,
//! even-row/odd-column, odd-row/even-column, odd-row/odd-column — are
//! all reset to the donor's `predictorSeed` at the start of every row
//! pair, then each carries the previous same-parity sample in its row
//! forward as the prediction for the next one.

use log::debug;

use super::huffman::encode_symbol;
use crate::bitstream::BitstreamWriter;
use crate::model::BayerPlane;
use crate::Result;

pub struct PredictorCodec {
    predictor_seed: u16,
}

impl PredictorCodec {
    pub fn new(predictor_seed: u16) -> PredictorCodec {
        PredictorCodec { predictor_seed }
    }

    /// Encode the whole Bayer plane into a freshly allocated compressed
    /// strip, row by row, top to bottom.
    pub fn encode(&self, plane: &BayerPlane, strip_capacity: usize) -> Result<Vec<u8>> {
        let mut writer = BitstreamWriter::with_capacity(strip_capacity);
        let dims = plane.dims();
        let mut pred_even_row = [0u16; 2];
        let mut pred_odd_row = [0u16; 2];

        for row in 0..dims.rows {
            if row % 2 == 0 {
                pred_even_row = [self.predictor_seed; 2];
                pred_odd_row = [self.predictor_seed; 2];
            }
            let registers = if row % 2 == 0 {
                &mut pred_even_row
            } else {
                &mut pred_odd_row
            };
            for col in 0..dims.columns {
                let sample = plane.get(row, col);
                let slot = (col & 1) as usize;
                let predicted = registers[slot];
                let diff = sample as i32 - predicted as i32;
                let (category, bits) = encode_diff(diff);
                encode_symbol(&mut writer, category)?;
                if category > 0 {
                    writer.write_bits(bits, category)?;
                }
                registers[slot] = sample;
            }
        }

        let bytes = writer.finish()?;
        debug!("encoded {} bytes for a {}x{} plane", bytes.len(), dims.columns, dims.rows);
        Ok(bytes)
    }
}

/// Standard lossless-JPEG-style category/sign-magnitude split: category
/// 0 means no diff, otherwise category is the bit length of `|diff|` and
/// the extra bits are `diff` itself when positive, or `diff - 1`'s low
/// bits when negative.
fn encode_diff(diff: i32) -> (u8, u32) {
    if diff == 0 {
        return (0, 0);
    }
    let mag = diff.unsigned_abs();
    let category = (32 - mag.leading_zeros()) as u8;
    let bits = if diff > 0 {
        diff as u32
    } else {
        ((diff - 1) as u32) & ((1u32 << category) - 1)
    };
    (category, bits)
}
