/*
 * nefsynth - assembler.rs
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

//! Splices the compressed raw strip and the regenerated previews into
//! the donor byte image, and writes the result to disk atomically.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use image::imageops::FilterType;
use log::debug;

use crate::context::Resampler;
use crate::donor::DonorMetadata;
use crate::pixelpipe::Rgb8Plane;
use crate::{preview, Error, Result};

fn resampler_filter(resampler: Resampler) -> FilterType {
    match resampler {
        Resampler::Lanczos4 => FilterType::Lanczos3,
        Resampler::Cubic => FilterType::CatmullRom,
        Resampler::Linear => FilterType::Triangle,
        Resampler::Nearest => FilterType::Nearest,
        Resampler::Area => FilterType::Triangle,
    }
}

/// Assemble the output NEF bytes: donor prefix, new strip, patched
/// strip-byte-count field, patched preview records. Does not write to
/// disk; see [`write_atomically`] for that.
pub fn assemble(
    donor_bytes: &[u8],
    metadata: &DonorMetadata,
    compressed_strip: &[u8],
    preview_source: &Rgb8Plane,
    resampler: Resampler,
) -> Result<Vec<u8>> {
    let strip_offset = metadata.strip_offset as usize;
    if strip_offset > donor_bytes.len() {
        return Err(Error::DonorFormatError(
            "strip offset runs past end of donor file".into(),
        ));
    }

    let mut buf = donor_bytes[..strip_offset].to_vec();
    buf.extend_from_slice(compressed_strip);
    debug!(
        "assembled {} prefix bytes + {} strip bytes = {} total",
        strip_offset,
        compressed_strip.len(),
        buf.len()
    );

    patch_u32_le(
        &mut buf,
        metadata.strip_byte_count_field_offset,
        compressed_strip.len() as u32,
    )?;

    let filter = resampler_filter(resampler);
    for record in &metadata.previews {
        match preview::regenerate(record, donor_bytes, preview_source, filter) {
            Ok(Some(regenerated)) => apply_preview_patch(&mut buf, &regenerated)?,
            Ok(None) => {}
            Err(e) => {
                log::warn!("skipping preview {}: {e}", record.tag_name);
            }
        }
    }

    Ok(buf)
}

fn apply_preview_patch(buf: &mut [u8], regen: &preview::RegeneratedPreview) -> Result<()> {
    let record = &regen.record;
    let start = record.data_offset as usize;
    let end = start + record.length as usize;
    let new_end = start + regen.jpeg_bytes.len();
    if end > buf.len() || new_end > end {
        return Err(Error::DonorFormatError(
            "regenerated preview does not fit within its original byte budget".into(),
        ));
    }
    buf[start..new_end].copy_from_slice(&regen.jpeg_bytes);
    for b in &mut buf[new_end..end] {
        *b = 0;
    }
    patch_u32_le(buf, record.length_field_offset, regen.jpeg_bytes.len() as u32)
}

fn patch_u32_le(buf: &mut [u8], offset: u32, value: u32) -> Result<()> {
    let offset = offset as usize;
    let slice = buf
        .get_mut(offset..offset + 4)
        .ok_or_else(|| Error::DonorFormatError("length field offset out of range".into()))?;
    slice.copy_from_slice(&value.to_le_bytes());
    Ok(())
}

/// Write `bytes` to `path` atomically: write to a sibling temp file,
/// flush, then rename over the destination.
pub fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension("nefsynth.tmp");
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
