use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::config::ResizeFilter;

const COEF_BITS: u32 = 11;
const COEF_SCALE: i32 = 1 << COEF_BITS;

/// One output coordinate: two source indices and their fixed-point weights.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Tap {
    i0: usize,
    i1: usize,
    w0: i32,
    w1: i32,
}

/// Sample positions use half-pixel centres, `(d + 0.5) * scale - 0.5`, clamped
/// at both borders with the fractional part zeroed there.
fn taps(src_len: u32, dst_len: u32) -> Vec<Tap> {
    let scale = src_len as f64 / dst_len as f64;
    let last = src_len as i64 - 1;

    (0..dst_len)
        .map(|d| {
            let f = ((d as f64 + 0.5) * scale - 0.5) as f32;
            let mut s = f.floor() as i64;
            let mut frac = f - s as f32;
            if s < 0 {
                s = 0;
                frac = 0.0;
            }
            if s >= last {
                s = last;
                frac = 0.0;
            }

            let i0 = s as usize;
            Tap {
                i0,
                i1: (i0 + 1).min(last as usize),
                w0: ((1.0 - frac) * COEF_SCALE as f32).round_ties_even() as i32,
                w1: (frac * COEF_SCALE as f32).round_ties_even() as i32,
            }
        })
        .collect()
}

fn horizontal_pass(row: &[u8], xtaps: &[Tap]) -> Vec<i32> {
    let mut out = Vec::with_capacity(xtaps.len() * 3);
    for tap in xtaps {
        for c in 0..3 {
            out.push(row[tap.i0 * 3 + c] as i32 * tap.w0 + row[tap.i1 * 3 + c] as i32 * tap.w1);
        }
    }
    out
}

/// Bilinear resize matching OpenCV's generic 8-bit `INTER_LINEAR` path:
/// 11-bit weights per axis, horizontal pass into `i32`, then a vertical pass
/// with the same shift-and-round sequence. No antialiasing when shrinking.
///
/// Both dimensions of `src` and the target must be non-zero.
pub fn resize_bilinear(src: &RgbImage, width: u32, height: u32) -> RgbImage {
    let (src_w, src_h) = src.dimensions();
    if (src_w, src_h) == (width, height) {
        return src.clone();
    }

    let xtaps = taps(src_w, width);
    let ytaps = taps(src_h, height);
    let raw = src.as_raw();
    let row_len = src_w as usize * 3;

    let mut rows: Vec<Option<Vec<i32>>> = vec![None; src_h as usize];
    let mut out = RgbImage::new(width, height);
    let out_row_len = width as usize * 3;
    let out_buf: &mut [u8] = &mut out;

    for (dy, ytap) in ytaps.iter().enumerate() {
        for y in [ytap.i0, ytap.i1] {
            if rows[y].is_none() {
                rows[y] = Some(horizontal_pass(&raw[y * row_len..(y + 1) * row_len], &xtaps));
            }
        }
        let (Some(r0), Some(r1)) = (&rows[ytap.i0], &rows[ytap.i1]) else {
            continue;
        };

        let dst = &mut out_buf[dy * out_row_len..(dy + 1) * out_row_len];
        for (x, px) in dst.iter_mut().enumerate() {
            let v = (((ytap.w0 * (r0[x] >> 4)) >> 16) + ((ytap.w1 * (r1[x] >> 4)) >> 16) + 2) >> 2;
            *px = v.clamp(0, 255) as u8;
        }
    }

    out
}

/// Resizes with the configured filter. The algorithm is always chosen
/// explicitly; nothing falls through to a library default.
pub fn resize(src: &RgbImage, width: u32, height: u32, filter: ResizeFilter) -> RgbImage {
    let filter = match filter {
        ResizeFilter::Bilinear => return resize_bilinear(src, width, height),
        ResizeFilter::Nearest => FilterType::Nearest,
        ResizeFilter::Triangle => FilterType::Triangle,
        ResizeFilter::CatmullRom => FilterType::CatmullRom,
        ResizeFilter::Lanczos3 => FilterType::Lanczos3,
    };
    imageops::resize(src, width, height, filter)
}
