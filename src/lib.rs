/*
 * nefsynth - lib.rs
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

//! Synthesizes a Nikon lossless-compressed NEF from an ordinary source
//! image plus a donor NEF: the donor supplies the TIFF/EXIF container,
//! linearization table and white balance; the raw strip and preview
//! JPEGs are regenerated from the source image and spliced in place.

mod assembler;
mod bitstream;
pub mod context;
pub mod donor;
pub mod geometry;
pub mod model;
mod nikon;
pub mod pixelpipe;
mod preview;

use std::path::Path;

use log::{debug, info};

pub use context::Context;
use nikon::PredictorCodec;
use pixelpipe::SourceImage;

/// Standard Result for nefsynth.
pub type Result<T> = std::result::Result<T, Error>;

/// Standard Error for nefsynth.
#[derive(Debug)]
pub enum Error {
    /// Invalid configuration option value.
    ConfigError(String),
    /// Missing or invalid EXIF field, wrong compression, wrong bit depth.
    DonorFormatError(String),
    /// Unreadable image, unsupported array shape, Bayer source out of range.
    SourceFormatError(String),
    /// Compressed output exceeded its pre-sized buffer.
    EncoderOverflow(String),
    /// Read, write or rename failure.
    IoError(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err.to_string())
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConfigError(msg) => write!(f, "configuration error: {msg}"),
            Self::DonorFormatError(msg) => write!(f, "donor format error: {msg}"),
            Self::SourceFormatError(msg) => write!(f, "source format error: {msg}"),
            Self::EncoderOverflow(msg) => write!(f, "encoder overflow: {msg}"),
            Self::IoError(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

/// A sufficient margin over the uncompressed strip size before
/// `EncoderOverflow` is considered a real failure rather than
/// under-provisioning.
const STRIP_CAPACITY_MARGIN: usize = 1 << 20;

/// Synthesize a NEF at `output_path` from `source` and the already-
/// parsed `donor_bytes`/`metadata`, and write it to disk atomically.
pub fn synthesize(
    donor_bytes: &[u8],
    metadata: &donor::DonorMetadata,
    source: &SourceImage,
    ctx: &Context,
    output_path: &Path,
) -> Result<()> {
    info!(
        "synthesizing {}x{} NEF for donor model {}",
        metadata.raw_dimensions.columns, metadata.raw_dimensions.rows, metadata.camera_model
    );

    let (plane, preview_source) = pixelpipe::build_bayer_plane(
        source,
        metadata.raw_dimensions,
        metadata.wb,
        metadata.black_level,
        ctx,
    )?;

    let codec = PredictorCodec::new(metadata.predictor_seed);
    let dims = plane.dims();
    let uncompressed_size = dims.rows as usize * dims.columns as usize * 2;
    let strip = codec.encode(&plane, uncompressed_size + STRIP_CAPACITY_MARGIN)?;
    debug!("compressed strip is {} bytes", strip.len());

    let out_bytes = assembler::assemble(
        donor_bytes,
        metadata,
        &strip,
        &preview_source,
        ctx.resampler,
    )?;

    assembler::write_atomically(output_path, &out_bytes)?;
    info!("wrote {} bytes to {}", out_bytes.len(), output_path.display());
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_error_display_includes_message() {
        let err = Error::DonorFormatError("missing StripOffsets".into());
        assert!(err.to_string().contains("missing StripOffsets"));
    }
}
