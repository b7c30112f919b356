//! Separable bicubic resampling in 22-bit fixed point.
//!
//! The horizontal pass runs first and its output is rounded to `u8` before
//! the vertical pass. Weights are computed in `f64`, normalized per output
//! pixel, then quantized. The models were trained on images resampled this
//! exactly, so any change here shifts every prediction.

use image::{GrayImage, Luma};

const PRECISION_BITS: u32 = 32 - 8 - 2;
const SUPPORT: f64 = 2.0;
const A: f64 = -0.5;

fn bicubic(x: f64) -> f64 {
    let x = x.abs();
    if x < 1.0 {
        ((A + 2.0) * x - (A + 3.0)) * x * x + 1.0
    } else if x < 2.0 {
        (((x - 5.0) * x + 8.0) * x - 4.0) * A
    } else {
        0.0
    }
}

fn clip8(acc: i64) -> u8 {
    if acc >= (1 << PRECISION_BITS << 8) {
        255
    } else if acc <= 0 {
        0
    } else {
        (acc >> PRECISION_BITS) as u8
    }
}

/// Source window and fixed-point weights for one output pixel.
struct Taps {
    start: usize,
    weights: Vec<i32>,
}

impl Taps {
    fn apply(&self, sample: impl Fn(u32) -> u8) -> u8 {
        let mut acc: i64 = 1 << (PRECISION_BITS - 1);
        for (i, &w) in self.weights.iter().enumerate() {
            acc += sample((self.start + i) as u32) as i64 * w as i64;
        }
        clip8(acc)
    }
}

fn taps_for(in_size: u32, out_size: u32) -> Vec<Taps> {
    let scale = in_size as f64 / out_size as f64;
    let filterscale = scale.max(1.0);
    let support = SUPPORT * filterscale;
    let ss = 1.0 / filterscale;

    (0..out_size)
        .map(|xx| {
            let center = (xx as f64 + 0.5) * scale;
            // truncation toward zero, then clamp to the source
            let xmin = ((center - support + 0.5) as i64).max(0);
            let xmax = ((center + support + 0.5) as i64).min(in_size as i64);

            let raw: Vec<f64> = (xmin..xmax)
                .map(|x| bicubic((x as f64 - center + 0.5) * ss))
                .collect();
            let total = raw.iter().fold(0.0, |acc, w| acc + w);

            let weights = raw
                .into_iter()
                .map(|w| {
                    let w = if total != 0.0 { w / total } else { w };
                    let scaled = w * (1 << PRECISION_BITS) as f64;
                    if w < 0.0 {
                        (scaled - 0.5) as i32
                    } else {
                        (scaled + 0.5) as i32
                    }
                })
                .collect();

            Taps {
                start: xmin as usize,
                weights,
            }
        })
        .collect()
}

/// Resize `src` to `width`×`height`. An axis whose size is unchanged is not
/// resampled.
pub fn resize_bicubic(src: &GrayImage, width: u32, height: u32) -> GrayImage {
    let (in_w, in_h) = src.dimensions();

    let horizontal;
    let src = if width != in_w {
        let taps = taps_for(in_w, width);
        horizontal = GrayImage::from_fn(width, in_h, |x, y| {
            Luma([taps[x as usize].apply(|sx| src.get_pixel(sx, y)[0])])
        });
        &horizontal
    } else {
        src
    };

    if height == in_h {
        return src.clone();
    }
    let taps = taps_for(in_h, height);
    GrayImage::from_fn(width, height, |x, y| {
        Luma([taps[y as usize].apply(|sy| src.get_pixel(x, sy)[0])])
    })
}
