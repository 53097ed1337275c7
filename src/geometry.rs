// SPDX-License-Identifier: LGPL-3.0-or-later
/*
 * nefsynth - geometry.rs
 *
 * Copyright (C) 2022-2024 Hubert Figuière
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

//! Geometry types and the resize/crop/pad planner.

use crate::{Error, Result};

/// Half-open rectangle: `x0 < x1`, `y0 < y1`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl Rect {
    pub fn new(x0: u32, y0: u32, x1: u32, y1: u32) -> Result<Rect> {
        if x0 >= x1 || y0 >= y1 {
            return Err(Error::SourceFormatError(format!(
                "invalid rect ({x0},{y0})-({x1},{y1})"
            )));
        }
        Ok(Rect { x0, y0, x1, y1 })
    }

    pub fn width(&self) -> u32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> u32 {
        self.y1 - self.y0
    }
}

/// Point struct
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

/// Size struct
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

/// Resize strategy for fitting a source image onto the target raw
/// dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GeometryMode {
    /// Never resize; only crop and/or pad.
    None,
    /// Enlarge only the deficient axis (or axes, independently, when
    /// aspect ratio is not locked).
    Minimum,
    /// Enlarge until both axes reach or exceed target, then crop the
    /// surplus axis.
    Full,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HorizAlign {
    Left,
    Center,
    Right,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VertAlign {
    Top,
    Center,
    Bottom,
}

/// The result of fitting a source image onto the target raw dimensions:
/// an optional resize, an optional crop (in resized coordinates), and a
/// placement offset for whatever padding remains.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeometryPlan {
    pub resize_to: Option<Size>,
    pub crop: Option<Rect>,
    pub placement: Point,
    pub target: Size,
    /// True when the plan is a no-op: source already equals target.
    pub is_identity: bool,
}

impl GeometryPlan {
    fn identity(target: Size) -> GeometryPlan {
        GeometryPlan {
            resize_to: None,
            crop: None,
            placement: Point::default(),
            target,
            is_identity: true,
        }
    }
}

/// Compute the resize, crop and pad placement needed to fit `source` onto
/// `target` under `mode`.
#[allow(clippy::too_many_arguments)]
pub fn plan(
    source: Size,
    target: Size,
    mode: GeometryMode,
    maintain_aspect_ratio: bool,
    horz_align: HorizAlign,
    vert_align: VertAlign,
) -> GeometryPlan {
    if source == target {
        return GeometryPlan::identity(target);
    }

    let covers_w = source.width >= target.width;
    let covers_h = source.height >= target.height;

    let resize_to = if mode == GeometryMode::None || (covers_w && covers_h) {
        None
    } else {
        let ratio_w = target.width as f64 / source.width as f64;
        let ratio_h = target.height as f64 / source.height as f64;
        if maintain_aspect_ratio {
            let candidates: Vec<f64> = [ratio_w, ratio_h].into_iter().filter(|r| *r > 1.0).collect();
            let mul = match mode {
                GeometryMode::Minimum => candidates.iter().cloned().fold(f64::MAX, f64::min),
                GeometryMode::Full => candidates.iter().cloned().fold(0.0, f64::max),
                GeometryMode::None => unreachable!(),
            };
            let mul = if candidates.is_empty() { 1.0 } else { mul };
            Some(Size {
                width: (source.width as f64 * mul).round() as u32,
                height: (source.height as f64 * mul).round() as u32,
            })
        } else {
            // Without an aspect-ratio lock there is no surplus axis to
            // crop later: each deficient axis is matched to target
            // directly, independent of the other.
            Some(Size {
                width: source.width.max(target.width),
                height: source.height.max(target.height),
            })
        }
    };

    let post_resize = resize_to.unwrap_or(source);

    let crop = if post_resize.width > target.width || post_resize.height > target.height {
        let (x0, x1) = crop_axis(post_resize.width, target.width, horz_align_surplus(horz_align));
        let (y0, y1) = crop_axis(post_resize.height, target.height, vert_align_surplus(vert_align));
        Some(Rect { x0, y0, x1, y1 })
    } else {
        None
    };

    let post_crop = Size {
        width: crop.map(|r| r.width()).unwrap_or(post_resize.width),
        height: crop.map(|r| r.height()).unwrap_or(post_resize.height),
    };

    let placement = Point {
        x: pad_offset(post_crop.width, target.width, horz_align),
        y: pad_offset(post_crop.height, target.height, vert_align),
    };

    GeometryPlan {
        resize_to,
        crop,
        placement,
        target,
        is_identity: false,
    }
}

/// Internal 3-way surplus-removal policy shared by both axes: `Low`
/// removes surplus from the low (start) side, `High` from the high side,
/// `Split` divides it, giving the odd remainder to the high side.
#[derive(Clone, Copy)]
enum SurplusPolicy {
    Low,
    High,
    Split,
}

fn horz_align_surplus(a: HorizAlign) -> SurplusPolicy {
    match a {
        // LEFT keeps the low side, so surplus is removed from the high side.
        HorizAlign::Left => SurplusPolicy::High,
        HorizAlign::Center => SurplusPolicy::Split,
        // RIGHT keeps the high side, so surplus is removed from the low side.
        HorizAlign::Right => SurplusPolicy::Low,
    }
}

fn vert_align_surplus(a: VertAlign) -> SurplusPolicy {
    match a {
        VertAlign::Top => SurplusPolicy::High,
        VertAlign::Center => SurplusPolicy::Split,
        VertAlign::Bottom => SurplusPolicy::Low,
    }
}

fn crop_axis(size: u32, target: u32, policy: SurplusPolicy) -> (u32, u32) {
    let surplus = size - target;
    match policy {
        SurplusPolicy::High => (0, target),
        SurplusPolicy::Low => (surplus, size),
        SurplusPolicy::Split => {
            let low_cut = surplus / 2;
            (low_cut, low_cut + target)
        }
    }
}

fn pad_offset(size: u32, target: u32, align: impl Into<AlignAxis>) -> u32 {
    if size >= target {
        return 0;
    }
    match align.into() {
        AlignAxis::Start => 0,
        AlignAxis::End => target - size,
        AlignAxis::Center => (target - size) / 2,
    }
}

enum AlignAxis {
    Start,
    Center,
    End,
}

impl From<HorizAlign> for AlignAxis {
    fn from(a: HorizAlign) -> AlignAxis {
        match a {
            HorizAlign::Left => AlignAxis::Start,
            HorizAlign::Center => AlignAxis::Center,
            HorizAlign::Right => AlignAxis::End,
        }
    }
}

impl From<VertAlign> for AlignAxis {
    fn from(a: VertAlign) -> AlignAxis {
        match a {
            VertAlign::Top => AlignAxis::Start,
            VertAlign::Center => AlignAxis::Center,
            VertAlign::Bottom => AlignAxis::End,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_identity_when_source_equals_target() {
        let size = Size {
            width: 6000,
            height: 4000,
        };
        let p = plan(
            size,
            size,
            GeometryMode::Full,
            true,
            HorizAlign::Center,
            VertAlign::Center,
        );
        assert!(p.is_identity);
        assert_eq!(p.resize_to, None);
        assert_eq!(p.crop, None);
    }

    #[test]
    fn test_full_aspect_locked_center() {
        // seed scenario 2: 1000x1000 into 6000x4000, FULL, CENTER/CENTER.
        let p = plan(
            Size {
                width: 1000,
                height: 1000,
            },
            Size {
                width: 6000,
                height: 4000,
            },
            GeometryMode::Full,
            true,
            HorizAlign::Center,
            VertAlign::Center,
        );
        assert_eq!(
            p.resize_to,
            Some(Size {
                width: 6000,
                height: 6000
            })
        );
        assert_eq!(
            p.crop,
            Some(Rect {
                x0: 0,
                y0: 1000,
                x1: 6000,
                y1: 5000
            })
        );
        assert_eq!(p.placement, Point { x: 0, y: 0 });
    }

    #[test]
    fn test_minimum_aspect_locked() {
        // seed scenario 3: same source, MINIMUM.
        let p = plan(
            Size {
                width: 1000,
                height: 1000,
            },
            Size {
                width: 6000,
                height: 4000,
            },
            GeometryMode::Minimum,
            true,
            HorizAlign::Center,
            VertAlign::Center,
        );
        assert_eq!(
            p.resize_to,
            Some(Size {
                width: 4000,
                height: 4000
            })
        );
        assert_eq!(p.crop, None);
        assert_eq!(p.placement, Point { x: 1000, y: 0 });
    }

    #[test]
    fn test_odd_surplus_removed_from_high_side() {
        let (x0, x1) = crop_axis(7, 4, SurplusPolicy::Split);
        // surplus 3: low gets floor(3/2)=1, high side loses the extra pixel.
        assert_eq!((x0, x1), (1, 5));
    }

    #[test]
    fn test_left_top_crops_from_high_side() {
        let (x0, x1) = crop_axis(10, 6, horz_align_surplus(HorizAlign::Left));
        assert_eq!((x0, x1), (0, 6));
    }

    #[test]
    fn test_right_bottom_crops_from_low_side() {
        let (x0, x1) = crop_axis(10, 6, horz_align_surplus(HorizAlign::Right));
        assert_eq!((x0, x1), (4, 10));
    }
}
