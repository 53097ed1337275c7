/*
 * nefsynth - preview.rs
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

//! Regenerates each embedded preview JPEG so it fits inside the donor's
//! original byte budget for that record.

use std::io::Cursor;

use image::imageops::FilterType;
use jpeg_encoder::{ColorType, Encoder, SamplingFactor};
use log::warn;

use crate::donor::PreviewRecord;
use crate::pixelpipe::Rgb8Plane;
use crate::{Error, Result};

const QUALITY_LADDER: [u8; 9] = [100, 90, 80, 70, 60, 50, 40, 30, 20];
const PLACEHOLDER_QUALITY: u8 = 50;

/// One regenerated preview, ready to be spliced into the donor byte
/// image by the assembler.
pub struct RegeneratedPreview {
    pub record: PreviewRecord,
    pub jpeg_bytes: Vec<u8>,
}

/// Decode the donor's existing preview JPEG solely to learn its pixel
/// dimensions; Nikon does not store preview dimensions anywhere else.
fn decode_dimensions(jpeg_bytes: &[u8]) -> Result<(u16, u16)> {
    let mut decoder = jpeg_decoder::Decoder::new(Cursor::new(jpeg_bytes));
    decoder
        .read_info()
        .map_err(|e| Error::DonorFormatError(format!("unreadable preview JPEG: {e}")))?;
    let info = decoder
        .info()
        .ok_or_else(|| Error::DonorFormatError("preview JPEG has no header info".into()))?;
    Ok((info.width, info.height))
}

fn resize_source(source: &Rgb8Plane, width: u16, height: u16, filter: FilterType) -> Vec<u8> {
    let img: image::RgbImage =
        image::ImageBuffer::from_raw(source.dims.columns, source.dims.rows, source.data.clone())
            .expect("Rgb8Plane data length was already validated");
    let resized = image::imageops::resize(&img, width as u32, height as u32, filter);
    resized.into_raw()
}

fn encode_jpeg(rgb: &[u8], width: u16, height: u16, quality: u8) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut encoder = Encoder::new(&mut out, quality);
    encoder.set_sampling_factor(SamplingFactor::F_2_2);
    encoder
        .encode(rgb, width, height, ColorType::Rgb)
        .map_err(|e| Error::DonorFormatError(format!("JPEG encode failed: {e}")))?;
    Ok(out)
}

/// Draw `text` centered on a black canvas using the built-in glyph
/// table, scaled so the line occupies roughly a third of the image
/// height. No font file is bundled; glyphs outside the built-in table
/// (see `glyph::lookup`) are rendered as a blank cell.
fn placeholder_rgb(width: u16, height: u16, text: &str) -> Vec<u8> {
    let mut rgb = vec![0u8; width as usize * height as usize * 3];
    let scale = ((height as usize / 24).max(1)).min(8);
    let glyph_w = glyph::WIDTH * scale;
    let glyph_h = glyph::HEIGHT * scale;
    let gap = scale;
    let line_width = text.len() * (glyph_w + gap);
    let mut x0 = (width as usize).saturating_sub(line_width) / 2;
    let y0 = (height as usize).saturating_sub(glyph_h) / 2;

    for ch in text.chars() {
        let bits = glyph::lookup(ch);
        for (gy, row_bits) in bits.iter().enumerate() {
            for gx in 0..glyph::WIDTH {
                if row_bits & (1 << (glyph::WIDTH - 1 - gx)) == 0 {
                    continue;
                }
                for sy in 0..scale {
                    for sx in 0..scale {
                        let px = x0 + gx * scale + sx;
                        let py = y0 + gy * scale + sy;
                        if px < width as usize && py < height as usize {
                            let idx = (py * width as usize + px) * 3;
                            rgb[idx] = 255;
                            rgb[idx + 1] = 255;
                            rgb[idx + 2] = 255;
                        }
                    }
                }
            }
        }
        x0 += glyph_w + gap;
    }
    rgb
}

/// A minimal fixed 5x7 bitmap font covering the characters that appear
/// in preview tag names and dimension strings: letters, digits, space,
/// comma and 'x'.
mod glyph {
    pub const WIDTH: usize = 5;
    pub const HEIGHT: usize = 7;

    pub fn lookup(ch: char) -> [u8; HEIGHT] {
        match ch.to_ascii_uppercase() {
            '0' => [0x1f, 0x11, 0x15, 0x15, 0x15, 0x11, 0x1f],
            '1' => [0x04, 0x0c, 0x04, 0x04, 0x04, 0x04, 0x0e],
            '2' => [0x1f, 0x01, 0x01, 0x1f, 0x10, 0x10, 0x1f],
            '3' => [0x1f, 0x01, 0x01, 0x0f, 0x01, 0x01, 0x1f],
            '4' => [0x11, 0x11, 0x11, 0x1f, 0x01, 0x01, 0x01],
            '5' => [0x1f, 0x10, 0x10, 0x1f, 0x01, 0x01, 0x1f],
            '6' => [0x1f, 0x10, 0x10, 0x1f, 0x11, 0x11, 0x1f],
            '7' => [0x1f, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
            '8' => [0x1f, 0x11, 0x11, 0x1f, 0x11, 0x11, 0x1f],
            '9' => [0x1f, 0x11, 0x11, 0x1f, 0x01, 0x01, 0x1f],
            'X' => [0x11, 0x11, 0x0a, 0x04, 0x0a, 0x11, 0x11],
            ',' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0c, 0x08],
            ' ' => [0; HEIGHT],
            c if c.is_ascii_uppercase() => letter(c),
            _ => [0x00, 0x00, 0x00, 0x1f, 0x00, 0x00, 0x00],
        }
    }

    fn letter(c: char) -> [u8; HEIGHT] {
        match c {
            'A' => [0x0e, 0x11, 0x11, 0x1f, 0x11, 0x11, 0x11],
            'B' => [0x1e, 0x11, 0x11, 0x1e, 0x11, 0x11, 0x1e],
            'C' => [0x0f, 0x10, 0x10, 0x10, 0x10, 0x10, 0x0f],
            'D' => [0x1e, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1e],
            'E' => [0x1f, 0x10, 0x10, 0x1e, 0x10, 0x10, 0x1f],
            'F' => [0x1f, 0x10, 0x10, 0x1e, 0x10, 0x10, 0x10],
            'G' => [0x0f, 0x10, 0x10, 0x17, 0x11, 0x11, 0x0f],
            'H' => [0x11, 0x11, 0x11, 0x1f, 0x11, 0x11, 0x11],
            'I' => [0x0e, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0e],
            'J' => [0x01, 0x01, 0x01, 0x01, 0x01, 0x11, 0x0e],
            'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
            'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1f],
            'M' => [0x11, 0x1b, 0x15, 0x15, 0x11, 0x11, 0x11],
            'N' => [0x11, 0x19, 0x15, 0x13, 0x11, 0x11, 0x11],
            'O' => [0x0e, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0e],
            'P' => [0x1e, 0x11, 0x11, 0x1e, 0x10, 0x10, 0x10],
            'Q' => [0x0e, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0d],
            'R' => [0x1e, 0x11, 0x11, 0x1e, 0x14, 0x12, 0x11],
            'S' => [0x0f, 0x10, 0x10, 0x0e, 0x01, 0x01, 0x1e],
            'T' => [0x1f, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
            'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0e],
            'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0a, 0x04],
            'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0a],
            'Y' => [0x11, 0x11, 0x0a, 0x04, 0x04, 0x04, 0x04],
            'Z' => [0x1f, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1f],
            _ => [0x00, 0x00, 0x00, 0x1f, 0x00, 0x00, 0x00],
        }
    }
}

/// Regenerate one preview record, following the quality ladder and
/// placeholder fallback in order; returns `None` (with a logged warning)
/// if even the placeholder cannot fit the original budget.
pub fn regenerate(
    record: &PreviewRecord,
    donor_bytes: &[u8],
    source: &Rgb8Plane,
    resampler: FilterType,
) -> Result<Option<RegeneratedPreview>> {
    let original = donor_bytes
        .get(record.data_offset as usize..(record.data_offset + record.length) as usize)
        .ok_or_else(|| Error::DonorFormatError("preview JPEG offset out of range".into()))?;
    let (width, height) = decode_dimensions(original)?;

    let resized_rgb = resize_source(source, width, height, resampler);
    for &quality in QUALITY_LADDER.iter() {
        let bytes = encode_jpeg(&resized_rgb, width, height, quality)?;
        if bytes.len() as u32 <= record.length {
            return Ok(Some(RegeneratedPreview {
                record: record.clone(),
                jpeg_bytes: bytes,
            }));
        }
    }

    let text = format!("{}, {} x {}", record.tag_name, width, height);
    let placeholder = placeholder_rgb(width, height, &text);
    let bytes = encode_jpeg(&placeholder, width, height, PLACEHOLDER_QUALITY)?;
    if bytes.len() as u32 <= record.length {
        return Ok(Some(RegeneratedPreview {
            record: record.clone(),
            jpeg_bytes: bytes,
        }));
    }

    warn!(
        "preview {} ({width}x{height}) cannot fit within its {} byte budget even as a placeholder, skipping",
        record.tag_name, record.length
    );
    Ok(None)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_quality_ladder_is_descending_to_20() {
        assert_eq!(QUALITY_LADDER.first(), Some(&100));
        assert_eq!(QUALITY_LADDER.last(), Some(&20));
        assert!(QUALITY_LADDER.windows(2).all(|w| w[0] > w[1]));
    }
}
