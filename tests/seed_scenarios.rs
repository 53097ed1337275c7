// SPDX-License-Identifier: LGPL-3.0-or-later
//! End-to-end pixel-pipeline scenarios against the public
//! `pixelpipe::build_bayer_plane` entry point: a constant gray source, a
//! pre-Bayer array that already matches the donor's dimensions, and a
//! grayscale source. Dimensions are scaled down from the scenarios'
//! full-resolution description to keep the tests fast; the ratios and
//! values that exercise the math are kept exact.

use nefsynth::context::{Context, HslMultipliers};
use nefsynth::geometry::GeometryMode;
use nefsynth::model::{Dimensions, WhiteBalance};
use nefsynth::pixelpipe::{Gray8Plane, Rgb8Plane, SourceImage};

fn identity_context() -> Context {
    let mut ctx = Context::default();
    ctx.resize_geometry = GeometryMode::Full;
    ctx.maintain_aspect_ratio = true;
    ctx
}

#[test]
fn constant_gray_source_matches_the_inverse_white_balance_formula() {
    // Scenario 1: a constant (128,128,128) sRGB source, no HSL change,
    // srgbToLinear disabled, wb=(2.0,1.5), blackLevel=1008.
    let dims = Dimensions::new(8, 8);
    let source = SourceImage::Rgb8(Rgb8Plane {
        dims,
        data: vec![128u8; 8 * 8 * 3],
    });

    let mut ctx = identity_context();
    ctx.src_hsl = HslMultipliers {
        h_mul: 1.0,
        s_mul: 1.0,
        l_mul: 1.0,
    };
    ctx.srgb_to_linear = false;

    let wb = WhiteBalance::new(2.0, 1.5).unwrap();
    let black_level = 1008u16;
    let (plane, _preview) =
        nefsynth::pixelpipe::build_bayer_plane(&source, dims, wb, black_level, &ctx).unwrap();

    // The value that survives stage 1's u8->u16 promotion (x256) and the
    // float round-trip through stage 5/7 exactly, since HSL is identity.
    let v = (128u32 * 256) as f64 / 65535.0;
    let span = (16383 - black_level) as f64;
    let expect_green = (v * span).round() as u16 + black_level;
    let expect_red = ((v / 2.0) * span).round() as u16 + black_level;
    let expect_blue = ((v / 1.5) * span).round() as u16 + black_level;

    assert_eq!(plane.get(0, 0), expect_red); // R site
    assert_eq!(plane.get(0, 1), expect_green); // G site
    assert_eq!(plane.get(1, 0), expect_green); // G site
    assert_eq!(plane.get(1, 1), expect_blue); // B site
}

#[test]
fn pre_bayer_array_already_matching_donor_dims_just_adds_black_level() {
    // Scenario 4: a pre-Bayer uint16 array whose size already matches
    // the donor raw dimensions passes through unchanged except for the
    // black-level bias.
    let dims = Dimensions::new(8, 8);
    let samples: Vec<u16> = (0..64).map(|i| (i * 200) % 16384).collect();
    let source = SourceImage::BayerArray {
        dims,
        samples: samples.clone(),
    };

    let ctx = identity_context();
    let wb = WhiteBalance::new(1.0, 1.0).unwrap();
    let black_level = 1008u16;
    let (plane, _preview) =
        nefsynth::pixelpipe::build_bayer_plane(&source, dims, wb, black_level, &ctx).unwrap();

    for row in 0..dims.rows {
        for col in 0..dims.columns {
            let idx = (row * dims.columns + col) as usize;
            assert_eq!(plane.get(row, col), samples[idx] + black_level);
        }
    }
}

#[test]
fn pre_bayer_array_smaller_than_donor_dims_is_centered_and_padded() {
    // A pre-Bayer array smaller than the donor raw dimensions is placed
    // directly onto a black-level-filled full sensor plane (geometry
    // planner mode NONE, centered), not rejected.
    let donor_dims = Dimensions::new(8, 8);
    let samples: Vec<u16> = (1..=16).collect();
    let source = SourceImage::BayerArray {
        dims: Dimensions::new(4, 4),
        samples: samples.clone(),
    };
    let ctx = identity_context();
    let wb = WhiteBalance::new(1.0, 1.0).unwrap();
    let black_level = 500u16;
    let (plane, _preview) =
        nefsynth::pixelpipe::build_bayer_plane(&source, donor_dims, wb, black_level, &ctx)
            .unwrap();

    // (8-4)/2 = 2 offset on both axes.
    for row in 0..4u32 {
        for col in 0..4u32 {
            let idx = (row * 4 + col) as usize;
            assert_eq!(plane.get(row + 2, col + 2), samples[idx] + black_level);
        }
    }
    // Padding outside the placed region sits at exactly the black level.
    assert_eq!(plane.get(0, 0), black_level);
    assert_eq!(plane.get(7, 7), black_level);
}

#[test]
fn grayscale_source_bypasses_white_balance() {
    // Scenario 6: every Bayer site equals the source pixel scaled to
    // 14-bit plus blackLevel; white balance must not be applied.
    let dims = Dimensions::new(8, 8);
    let source = SourceImage::Gray8(Gray8Plane {
        dims,
        data: vec![200u8; 64],
    });

    let ctx = identity_context();
    let wb = WhiteBalance::new(2.0, 1.5).unwrap();
    let black_level = 1008u16;
    let (plane, _preview) =
        nefsynth::pixelpipe::build_bayer_plane(&source, dims, wb, black_level, &ctx).unwrap();

    let promoted = 200u32 * 256;
    let expect = ((promoted as f64 * 16383.0 / 65535.0).round()) as u16 + black_level;
    for row in 0..dims.rows {
        for col in 0..dims.columns {
            assert_eq!(plane.get(row, col), expect);
        }
    }
}

#[test]
fn same_inputs_produce_byte_identical_bayer_planes() {
    let dims = Dimensions::new(8, 8);
    let source = SourceImage::Rgb8(Rgb8Plane {
        dims,
        data: (0..8 * 8 * 3).map(|i| (i % 256) as u8).collect(),
    });
    let ctx = identity_context();
    let wb = WhiteBalance::new(1.8, 1.4).unwrap();

    let (plane_a, _) =
        nefsynth::pixelpipe::build_bayer_plane(&source, dims, wb, 200, &ctx).unwrap();
    let (plane_b, _) =
        nefsynth::pixelpipe::build_bayer_plane(&source, dims, wb, 200, &ctx).unwrap();

    assert_eq!(plane_a.samples(), plane_b.samples());
}
