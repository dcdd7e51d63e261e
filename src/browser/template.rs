//! Locating a visually-defined control by matching a reference image against
//! a screenshot.
//!
//! Scores are normalized cross-correlation coefficients (the
//! `TM_CCOEFF_NORMED` measure): 1.0 is a pixel-perfect match, 0 is no
//! correlation. Large screenshots are searched on a downscaled copy first and
//! each promising spot is then re-scored at full resolution, so the reported
//! confidence is always a full-resolution score.

use std::path::Path;

use eyre::Result;
use image::GrayImage;
use image::imageops::{self, FilterType};
use rayon::prelude::*;

pub const DEFAULT_THRESHOLD: f32 = 0.7;

/// Matches whose top-left corners are closer than this on both axes are the
/// same control.
const DEDUP_RADIUS: u32 = 50;
/// Screenshots wider than this are searched coarse-to-fine.
const COARSE_WIDTH: u32 = 640;
/// Smallest template side still worth matching after downscaling.
const MIN_COARSE_SIDE: u32 = 8;
const COARSE_SLACK: f32 = 0.2;
const MAX_REFINED: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateMatch {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub confidence: f32,
}

impl TemplateMatch {
    pub fn center(&self) -> (u32, u32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }
}

pub fn load_template(path: &Path) -> Result<GrayImage> {
    Ok(image::open(path)?.to_luma8())
}

pub fn decode_screenshot(png: &[u8]) -> Result<GrayImage> {
    Ok(image::load_from_memory(png)?.to_luma8())
}

/// Every place `needle` occurs in `haystack` with a score of at least
/// `threshold`, best first.
pub fn match_template(
    haystack: &GrayImage,
    needle: &GrayImage,
    threshold: f32,
) -> Vec<TemplateMatch> {
    if needle.width() > haystack.width() || needle.height() > haystack.height() {
        return Vec::new();
    }
    let Some(full_needle) = Prepared::new(needle) else {
        // a flat template correlates with nothing
        return Vec::new();
    };
    let full_hay = Integral::new(haystack);

    let factor = scale_factor(haystack, needle);
    let candidates = if factor == 1 {
        scan(haystack, &full_hay, &full_needle, threshold)
    } else {
        coarse_to_fine(haystack, &full_hay, needle, &full_needle, factor, threshold)
    };

    dedup(candidates)
}

fn scale_factor(haystack: &GrayImage, needle: &GrayImage) -> u32 {
    let wanted = haystack.width().div_ceil(COARSE_WIDTH);
    let allowed = (needle.width() / MIN_COARSE_SIDE).min(needle.height() / MIN_COARSE_SIDE);
    wanted.min(allowed).max(1)
}

fn coarse_to_fine(
    haystack: &GrayImage,
    full_hay: &Integral,
    needle: &GrayImage,
    full_needle: &Prepared,
    factor: u32,
    threshold: f32,
) -> Vec<TemplateMatch> {
    let small_hay = imageops::resize(
        haystack,
        haystack.width() / factor,
        haystack.height() / factor,
        FilterType::Triangle,
    );
    let small_needle = imageops::resize(
        needle,
        needle.width() / factor,
        needle.height() / factor,
        FilterType::Triangle,
    );
    let Some(prepared) = Prepared::new(&small_needle) else {
        return Vec::new();
    };
    let integral = Integral::new(&small_hay);

    let mut coarse = scan(
        &small_hay,
        &integral,
        &prepared,
        (threshold - COARSE_SLACK).max(0.0),
    );
    coarse.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    coarse.truncate(MAX_REFINED * 8);
    let coarse = dedup_within(coarse, DEDUP_RADIUS / factor);

    let max_x = haystack.width() - full_needle.width;
    let max_y = haystack.height() - full_needle.height;
    let reach = factor * 2;

    coarse
        .into_iter()
        .take(MAX_REFINED)
        .filter_map(|c| {
            let (cx, cy) = (c.x * factor, c.y * factor);
            let xs = cx.saturating_sub(reach)..=(cx + reach).min(max_x);
            let ys = cy.saturating_sub(reach)..=(cy + reach).min(max_y);

            ys.flat_map(|y| xs.clone().map(move |x| (x, y)))
                .map(|(x, y)| (x, y, score_at(haystack, full_hay, full_needle, x, y)))
                .max_by(|a, b| a.2.total_cmp(&b.2))
                .filter(|(_, _, score)| *score >= threshold)
                .map(|(x, y, score)| TemplateMatch {
                    x,
                    y,
                    width: full_needle.width,
                    height: full_needle.height,
                    confidence: score,
                })
        })
        .collect()
}

/// Scores every position, one row per rayon task.
fn scan(
    haystack: &GrayImage,
    integral: &Integral,
    needle: &Prepared,
    threshold: f32,
) -> Vec<TemplateMatch> {
    let max_x = haystack.width() - needle.width;
    let max_y = haystack.height() - needle.height;

    (0..=max_y)
        .into_par_iter()
        .flat_map_iter(|y| {
            (0..=max_x).filter_map(move |x| {
                let score = score_at(haystack, integral, needle, x, y);
                (score >= threshold).then_some(TemplateMatch {
                    x,
                    y,
                    width: needle.width,
                    height: needle.height,
                    confidence: score,
                })
            })
        })
        .collect()
}

fn score_at(haystack: &GrayImage, integral: &Integral, needle: &Prepared, x: u32, y: u32) -> f32 {
    let (sum, sum_sq) = integral.window(x, y, needle.width, needle.height);
    let n = needle.values.len() as f64;
    let variance = sum_sq - sum * sum / n;
    if variance <= 1e-6 {
        return 0.0;
    }

    let raw = haystack.as_raw();
    let stride = haystack.width() as usize;
    let w = needle.width as usize;
    let mut cross = 0.0f64;
    for row in 0..needle.height as usize {
        let start = (y as usize + row) * stride + x as usize;
        let pixels = &raw[start..start + w];
        let template = &needle.values[row * w..(row + 1) * w];
        cross += pixels
            .iter()
            .zip(template)
            .map(|(&p, &t)| p as f64 * t)
            .sum::<f64>();
    }

    (cross / (variance.sqrt() * needle.norm)).clamp(-1.0, 1.0) as f32
}

fn dedup(candidates: Vec<TemplateMatch>) -> Vec<TemplateMatch> {
    let mut sorted = candidates;
    sorted.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    dedup_within(sorted, DEDUP_RADIUS)
}

/// Keeps the first of every cluster; `sorted` must be best-first.
fn dedup_within(sorted: Vec<TemplateMatch>, radius: u32) -> Vec<TemplateMatch> {
    let mut kept: Vec<TemplateMatch> = Vec::new();
    for candidate in sorted {
        let duplicate = kept
            .iter()
            .any(|k| k.x.abs_diff(candidate.x) < radius && k.y.abs_diff(candidate.y) < radius);
        if !duplicate {
            kept.push(candidate);
        }
    }
    kept
}

/// Template with its mean removed, ready for correlation.
struct Prepared {
    width: u32,
    height: u32,
    values: Vec<f64>,
    norm: f64,
}

impl Prepared {
    fn new(image: &GrayImage) -> Option<Self> {
        let raw = image.as_raw();
        if raw.is_empty() {
            return None;
        }
        let mean = raw.iter().map(|&p| p as f64).sum::<f64>() / raw.len() as f64;
        let values: Vec<f64> = raw.iter().map(|&p| p as f64 - mean).collect();
        let norm = values.iter().map(|v| v * v).sum::<f64>().sqrt();
        (norm > 1e-6).then_some(Self {
            width: image.width(),
            height: image.height(),
            values,
            norm,
        })
    }
}

/// Summed-area tables of pixel values and their squares.
struct Integral {
    stride: usize,
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
}

impl Integral {
    fn new(image: &GrayImage) -> Self {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let stride = w + 1;
        let mut sum = vec![0.0; stride * (h + 1)];
        let mut sum_sq = vec![0.0; stride * (h + 1)];
        let raw = image.as_raw();

        for y in 0..h {
            let (mut row, mut row_sq) = (0.0, 0.0);
            for x in 0..w {
                let p = raw[y * w + x] as f64;
                row += p;
                row_sq += p * p;
                sum[(y + 1) * stride + x + 1] = sum[y * stride + x + 1] + row;
                sum_sq[(y + 1) * stride + x + 1] = sum_sq[y * stride + x + 1] + row_sq;
            }
        }

        Self { stride, sum, sum_sq }
    }

    fn window(&self, x: u32, y: u32, w: u32, h: u32) -> (f64, f64) {
        let (x0, y0) = (x as usize, y as usize);
        let (x1, y1) = (x0 + w as usize, y0 + h as usize);
        let at = |t: &[f64], xx: usize, yy: usize| t[yy * self.stride + xx];
        let area = |t: &[f64]| at(t, x1, y1) - at(t, x0, y1) - at(t, x1, y0) + at(t, x0, y0);
        (area(&self.sum), area(&self.sum_sq))
    }
}
