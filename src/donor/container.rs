/*
 * nefsynth - donor/container.rs
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

//! A minimal, offset-tracking TIFF/IFD walker over an in-memory donor
//! file. Unlike `tiff::container::Container` (which this is grounded on)
//! this one only reads the handful of Nikon fields the donor parser
//! needs, but it records the *absolute* byte offset of every value it
//! extracts, since the assembler needs those offsets to patch the donor
//! bytes in place.

use std::collections::HashMap;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    pub fn u16(&self, b: &[u8]) -> u16 {
        match self {
            Endian::Little => LittleEndian::read_u16(b),
            Endian::Big => BigEndian::read_u16(b),
        }
    }

    pub fn u32(&self, b: &[u8]) -> u32 {
        match self {
            Endian::Little => LittleEndian::read_u32(b),
            Endian::Big => BigEndian::read_u32(b),
        }
    }
}

/// TIFF type codes relevant to the fields this parser reads.
const TYPE_BYTE: u16 = 1;
const TYPE_ASCII: u16 = 2;
const TYPE_SHORT: u16 = 3;
const TYPE_LONG: u16 = 4;
const TYPE_RATIONAL: u16 = 5;
const TYPE_UNDEFINED: u16 = 7;

fn type_size(type_: u16) -> usize {
    match type_ {
        TYPE_BYTE | TYPE_ASCII | TYPE_UNDEFINED => 1,
        TYPE_SHORT => 2,
        TYPE_LONG => 4,
        TYPE_RATIONAL => 8,
        _ => 1,
    }
}

/// One parsed IFD entry, with the absolute offsets needed to later patch
/// its value in place.
#[derive(Clone, Debug)]
pub struct Entry {
    pub tag: u16,
    pub type_: u16,
    pub count: u32,
    /// Absolute offset of this entry's 12-byte record.
    pub entry_offset: u32,
    /// The raw 4-byte value/offset field, in file byte order.
    pub raw: [u8; 4],
}

impl Entry {
    fn byte_len(&self) -> usize {
        type_size(self.type_) * self.count as usize
    }

    fn is_inline(&self) -> bool {
        self.byte_len() <= 4
    }

    /// Absolute offset of the 4-byte value/offset field within the IFD
    /// entry record (tag:2 + type:2 + count:4 + value/offset:4).
    pub fn value_field_offset(&self) -> u32 {
        self.entry_offset + 8
    }

}

/// A TIFF container. `base` is added to any external (offset-stored)
/// entry's raw value before it is used to index into `bytes`. This is 0
/// for the main file container, and the MakerNote's data start (+10, past
/// its mini TIFF header) for the nested MakerNote container Nikon embeds
/// — every offset inside a MakerNote is relative to that header, not to
/// the start of the file.
pub struct Container<'a> {
    pub bytes: &'a [u8],
    pub endian: Endian,
    pub base: u32,
}

impl<'a> Container<'a> {
    /// Detect endianness from the 4-byte TIFF magic header and wrap the
    /// buffer. Does not yet walk any IFD.
    pub fn load(bytes: &'a [u8]) -> Result<Container<'a>> {
        let (endian, _) = Self::detect_magic(bytes)?;
        Ok(Container {
            bytes,
            endian,
            base: 0,
        })
    }

    /// Load a nested container whose offsets are relative to `base`
    /// rather than absolute, reading its own magic header at `base`.
    pub fn load_nested(bytes: &'a [u8], base: u32) -> Result<Container<'a>> {
        let (endian, _) =
            Self::detect_magic(bytes.get(base as usize..).ok_or_else(|| {
                Error::DonorFormatError("MakerNote base offset out of range".into())
            })?)?;
        Ok(Container {
            bytes,
            endian,
            base,
        })
    }

    fn detect_magic(bytes: &[u8]) -> Result<(Endian, ())> {
        if bytes.len() < 8 {
            return Err(Error::DonorFormatError("TIFF header too small".into()));
        }
        let endian = match &bytes[0..4] {
            [0x49, 0x49, 0x2a, 0x00] => Endian::Little,
            [0x4d, 0x4d, 0x00, 0x2a] => Endian::Big,
            _ => {
                return Err(Error::DonorFormatError(
                    "unrecognized TIFF magic header".into(),
                ))
            }
        };
        Ok((endian, ()))
    }

    /// Absolute offset of the IFD pointed to by the 4-byte relative
    /// offset stored right after this container's magic header.
    pub fn first_ifd_offset(&self) -> Result<u32> {
        Ok(self.base + self.u32_at(self.base + 4)?)
    }

    fn entry_data_offset(&self, e: &Entry) -> u32 {
        if e.is_inline() {
            e.value_field_offset()
        } else {
            self.base + self.endian.u32(&e.raw)
        }
    }

    fn check_range(&self, offset: u32, len: usize) -> Result<()> {
        let end = offset as usize + len;
        if end > self.bytes.len() {
            return Err(Error::DonorFormatError(format!(
                "read of {len} bytes at offset {offset} runs past end of donor file"
            )));
        }
        Ok(())
    }

    pub fn u16_at(&self, offset: u32) -> Result<u16> {
        self.check_range(offset, 2)?;
        Ok(self.endian.u16(&self.bytes[offset as usize..]))
    }

    pub fn u32_at(&self, offset: u32) -> Result<u32> {
        self.check_range(offset, 4)?;
        Ok(self.endian.u32(&self.bytes[offset as usize..]))
    }

    pub fn bytes_at(&self, offset: u32, len: usize) -> Result<&'a [u8]> {
        self.check_range(offset, len)?;
        Ok(&self.bytes[offset as usize..offset as usize + len])
    }

    /// Read the IFD at `abs_offset`: entry count, `count` 12-byte entries,
    /// then the 4-byte absolute offset of the next IFD (0 if none).
    pub fn read_dir(&self, abs_offset: u32) -> Result<(HashMap<u16, Entry>, u32)> {
        let n = self.u16_at(abs_offset)? as u32;
        let mut entries = HashMap::with_capacity(n as usize);
        for i in 0..n {
            let entry_offset = abs_offset + 2 + i * 12;
            self.check_range(entry_offset, 12)?;
            let tag = self.u16_at(entry_offset)?;
            let type_ = self.u16_at(entry_offset + 2)?;
            let count = self.u32_at(entry_offset + 4)?;
            let mut raw = [0u8; 4];
            raw.copy_from_slice(self.bytes_at(entry_offset + 8, 4)?);
            entries.insert(
                tag,
                Entry {
                    tag,
                    type_,
                    count,
                    entry_offset,
                    raw,
                },
            );
        }
        let next = self.u32_at(abs_offset + 2 + n * 12)?;
        let next = if next == 0 { 0 } else { self.base + next };
        Ok((entries, next))
    }

    pub fn entry_uint(&self, e: &Entry) -> Result<u32> {
        match e.type_ {
            TYPE_SHORT => Ok(self.endian.u16(&e.raw) as u32),
            TYPE_LONG => Ok(self.endian.u32(&e.raw)),
            TYPE_BYTE => Ok(e.raw[0] as u32),
            _ => Err(Error::DonorFormatError(format!(
                "tag 0x{:x}: expected an integer type, found type {}",
                e.tag, e.type_
            ))),
        }
    }

    pub fn entry_uint_at(&self, e: &Entry, index: u32) -> Result<u32> {
        if index >= e.count {
            return Err(Error::DonorFormatError(format!(
                "tag 0x{:x}: index {index} out of range (count {})",
                e.tag, e.count
            )));
        }
        let offset = self.entry_data_offset(e) + index * type_size(e.type_) as u32;
        match e.type_ {
            TYPE_SHORT => self.u16_at(offset).map(|v| v as u32),
            TYPE_LONG => self.u32_at(offset),
            TYPE_BYTE => Ok(self.bytes_at(offset, 1)?[0] as u32),
            _ => Err(Error::DonorFormatError(format!(
                "tag 0x{:x}: expected an integer type, found type {}",
                e.tag, e.type_
            ))),
        }
    }

    pub fn entry_string(&self, e: &Entry) -> Result<String> {
        let bytes = self.bytes_at(self.entry_data_offset(e), e.byte_len())?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    pub fn entry_bytes(&self, e: &Entry) -> Result<&'a [u8]> {
        self.bytes_at(self.entry_data_offset(e), e.byte_len())
    }

    /// Read the `index`-th RATIONAL in a RATIONAL-typed entry as `num/den`.
    pub fn entry_rational(&self, e: &Entry, index: u32) -> Result<(u32, u32)> {
        if e.type_ != TYPE_RATIONAL {
            return Err(Error::DonorFormatError(format!(
                "tag 0x{:x}: expected RATIONAL, found type {}",
                e.tag, e.type_
            )));
        }
        let offset = self.entry_data_offset(e) + index * 8;
        Ok((self.u32_at(offset)?, self.u32_at(offset + 4)?))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn build_minimal_le_tiff() -> Vec<u8> {
        let mut buf = vec![0x49, 0x49, 0x2a, 0x00, 8, 0, 0, 0];
        // one entry: tag 0x100 (ImageWidth), type SHORT, count 1, value 42
        buf.extend_from_slice(&1u16.to_le_bytes());
        buf.extend_from_slice(&0x100u16.to_le_bytes());
        buf.extend_from_slice(&TYPE_SHORT.to_le_bytes());
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&42u16.to_le_bytes());
        buf.extend_from_slice(&[0, 0]);
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf
    }

    #[test]
    fn test_load_detects_endian() {
        let buf = build_minimal_le_tiff();
        let c = Container::load(&buf).unwrap();
        assert_eq!(c.endian, Endian::Little);
    }

    #[test]
    fn test_read_dir_and_value() {
        let buf = build_minimal_le_tiff();
        let c = Container::load(&buf).unwrap();
        let (entries, next) = c.read_dir(8).unwrap();
        assert_eq!(next, 0);
        let e = entries.get(&0x100).unwrap();
        assert_eq!(c.entry_uint(e).unwrap(), 42);
    }

    #[test]
    fn test_rejects_bad_magic() {
        let buf = vec![0u8; 8];
        assert!(Container::load(&buf).is_err());
    }
}
