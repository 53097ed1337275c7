// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * nefsynth - nikon/huffman.rs
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

//! Canonical Huffman encoding for Nikon's 14-bit lossless raw
//! compression, a.k.a `LOSSLESS_14BIT` in the decode tables this is
//! derived from: one fixed code per difference category, 0 through 14
//! (a 14-bit sample's difference never needs a 15th or 16th category).

use crate::bitstream::BitstreamWriter;
use crate::Result;

/// `(code, code length in bits)` for each difference category, read off
/// the canonical `LOSSLESS_14BIT` decode tree leaf by leaf.
const CODES: [(u32, u8); 15] = [
    /* 0  */ (0x3e, 6),
    /* 1  */ (0x7e, 7),
    /* 2  */ (0x3d, 6),
    /* 3  */ (0x1c, 5),
    /* 4  */ (0x0c, 4),
    /* 5  */ (0x04, 3),
    /* 6  */ (0x02, 3),
    /* 7  */ (0x00, 2),
    /* 8  */ (0x03, 3),
    /* 9  */ (0x05, 3),
    /* 10 */ (0x0d, 4),
    /* 11 */ (0x1d, 5),
    /* 12 */ (0x3c, 6),
    /* 13 */ (0xfe, 8),
    /* 14 */ (0xff, 8),
];

/// Write the canonical code for `category` (0..=14) to `writer`.
pub fn encode_symbol(writer: &mut BitstreamWriter, category: u8) -> Result<()> {
    debug_assert!((category as usize) < CODES.len());
    let (code, len) = CODES[category as usize];
    writer.write_bits(code, len)
}
