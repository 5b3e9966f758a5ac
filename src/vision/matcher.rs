//! Template matching against window screenshots.
//!
//! Matching is the normalized correlation coefficient (both sides
//! mean-centered, scores in [-1, 1], 1.0 = perfect match). The
//! non-centered variant is useless here: game screens are mostly flat
//! fills, which correlate near 1.0 with anything when means are kept.
//!
//! Both the screenshot and the templates are Gaussian-blurred before
//! correlation so that emulator scaling artifacts do not tank the match
//! score. Blurred templates are cached per asset id; the cache must be
//! invalidated whenever the asset scale changes.

use crate::automation::config::ThresholdConfig;
use crate::vision::assets::Asset;
use crate::vision::regions::{BuyRoiSpec, Rect};
use image::GrayImage;
use imageproc::filter::gaussian_blur_f32;
use std::collections::HashMap;

/// Blur applied before correlation. Equivalent to a 3x3 OpenCV
/// GaussianBlur with auto sigma.
const BLUR_SIGMA: f32 = 0.8;

/// Lowest threshold the mystic-item tuning may reach.
const MYSTIC_FLOOR: f32 = 0.70;

/// A point in screen coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

pub struct TemplateMatcher {
    /// Blurred templates keyed by asset id, valid for the current scale.
    blurred: HashMap<String, GrayImage>,
}

impl TemplateMatcher {
    pub fn new() -> Self {
        Self {
            blurred: HashMap::new(),
        }
    }

    /// Drops all cached blurred templates. Must be called after the
    /// asset store is rescaled.
    pub fn invalidate(&mut self) {
        self.blurred.clear();
    }

    fn blurred_template(&mut self, asset: &Asset) -> GrayImage {
        self.blurred
            .entry(asset.id().to_string())
            .or_insert_with(|| gaussian_blur_f32(asset.template(), BLUR_SIGMA))
            .clone()
    }

    /// Crops `screenshot` to `region`, clamped to the image bounds.
    /// Falls back to the full screenshot when the clamped region cannot
    /// hold the template.
    fn crop_region(
        screenshot: &GrayImage,
        region: Option<&Rect>,
        template: &GrayImage,
        name: &str,
    ) -> (GrayImage, i32, i32) {
        if let Some(region) = region {
            let x0 = region.x.clamp(0, screenshot.width() as i32);
            let y0 = region.y.clamp(0, screenshot.height() as i32);
            let x1 = (region.x + region.width as i32).clamp(0, screenshot.width() as i32);
            let y1 = (region.y + region.height as i32).clamp(0, screenshot.height() as i32);
            let w = (x1 - x0) as u32;
            let h = (y1 - y0) as u32;
            if w >= template.width() && h >= template.height() {
                let crop =
                    image::imageops::crop_imm(screenshot, x0 as u32, y0 as u32, w, h).to_image();
                return (crop, x0, y0);
            }
            crate::debug(&format!(
                "Search region for '{}' is smaller than its template ({}x{} < {}x{}), scanning full screenshot",
                name,
                w,
                h,
                template.width(),
                template.height()
            ));
        }
        (screenshot.clone(), 0, 0)
    }

    /// Runs blurred correlation of `template` inside `haystack`.
    /// Returns the best score and its top-left location, or None when
    /// the template does not fit.
    fn best_match(&mut self, haystack: &GrayImage, asset: &Asset) -> Option<(f32, u32, u32)> {
        let template = self.blurred_template(asset);
        if template.width() > haystack.width() || template.height() > haystack.height() {
            return None;
        }
        let blurred_haystack = gaussian_blur_f32(haystack, BLUR_SIGMA);
        best_correlation(&blurred_haystack, &template)
    }

    /// Searches for a button template and returns the center of the
    /// best match in screen coordinates, if it clears `threshold`.
    ///
    /// `origin` is the window's top-left in screen coordinates;
    /// `region` is in window coordinates.
    pub fn find_button(
        &mut self,
        screenshot: &GrayImage,
        asset: &Asset,
        threshold: f32,
        region: Option<&Rect>,
        origin: (i32, i32),
        name: &str,
    ) -> Option<Point> {
        let template = asset.template().clone();
        let (haystack, off_x, off_y) = Self::crop_region(screenshot, region, &template, name);
        let (score, x, y) = self.best_match(&haystack, asset)?;
        crate::debug(&format!(
            "'{}' best score {:.3} (threshold {:.2})",
            name, score, threshold
        ));
        if score < threshold {
            return None;
        }
        Some(Point {
            x: origin.0 + off_x + x as i32 + template.width() as i32 / 2,
            y: origin.1 + off_y + y as i32 + template.height() as i32 / 2,
        })
    }

    /// Searches the item column for `item`, then derives the buy-button
    /// region of interest next to the hit and confirms a purchasable
    /// buy button inside it.
    ///
    /// Returns the buy button's center in screen coordinates, or None
    /// when the item is absent, already sold, or its buy region falls
    /// outside the screenshot.
    pub fn find_item(
        &mut self,
        screenshot: &GrayImage,
        item: &Asset,
        region: &Rect,
        buy: &Asset,
        sold: &Asset,
        roi_spec: &BuyRoiSpec,
        thresholds: &ThresholdConfig,
        origin: (i32, i32),
    ) -> Option<Point> {
        let item_template = item.template().clone();
        let (haystack, off_x, off_y) =
            Self::crop_region(screenshot, Some(region), &item_template, item.id());
        let (score, x, y) = self.best_match(&haystack, item)?;

        let threshold = if item.id().to_lowercase().contains("mystic") {
            (thresholds.item_match - thresholds.mystic_item_delta).max(MYSTIC_FLOOR)
        } else {
            thresholds.item_match
        };
        crate::debug(&format!(
            "item '{}' best score {:.3} (threshold {:.2})",
            item.id(),
            score,
            threshold
        ));
        if score < threshold {
            return None;
        }

        let item_x = off_x + x as i32;
        let item_y = off_y + y as i32;

        let buy_template = buy.template().clone();
        let roi_x = item_x + roi_spec.margin_x;
        let roi_y = item_y;
        let roi_w = roi_spec.width.max(buy_template.width() + 20);
        let roi_h = roi_spec.height.max(buy_template.height() + 20);

        // Clamp the region of interest to the screenshot. Items hugging
        // the window edge can push it fully or partially outside.
        let x0 = roi_x.clamp(0, screenshot.width() as i32);
        let y0 = roi_y.clamp(0, screenshot.height() as i32);
        let x1 = (roi_x + roi_w as i32).clamp(0, screenshot.width() as i32);
        let y1 = (roi_y + roi_h as i32).clamp(0, screenshot.height() as i32);
        let clamped_w = (x1 - x0) as u32;
        let clamped_h = (y1 - y0) as u32;
        if clamped_w < buy_template.width() || clamped_h < buy_template.height() {
            crate::debug(&format!(
                "buy region for '{}' out of bounds, skipping",
                item.id()
            ));
            return None;
        }

        let roi =
            image::imageops::crop_imm(screenshot, x0 as u32, y0 as u32, clamped_w, clamped_h)
                .to_image();

        if let Some((buy_score, bx, by)) = self.best_match(&roi, buy) {
            if buy_score >= thresholds.buy_button {
                return Some(Point {
                    x: origin.0 + x0 + bx as i32 + buy_template.width() as i32 / 2,
                    y: origin.1 + y0 + by as i32 + buy_template.height() as i32 / 2,
                });
            }
        }

        // No buy button. A sold indicator explains why; anything else
        // was a spurious item hit.
        if let Some((sold_score, _, _)) = self.best_match(&roi, sold) {
            if sold_score >= thresholds.sold_indicator {
                crate::debug(&format!("item '{}' already sold", item.id()));
            }
        }
        None
    }
}

impl Default for TemplateMatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalized correlation coefficient of `template` at every placement
/// inside `haystack`. Returns the best score with its top-left offset,
/// or None when the template does not fit.
///
/// Both sides are mean-centered per window, so a flat window scores
/// 0.0 against any template. Windowed region sums come from integral
/// images; only the cross term is a per-placement loop.
fn best_correlation(haystack: &GrayImage, template: &GrayImage) -> Option<(f32, u32, u32)> {
    let (hw, hh) = haystack.dimensions();
    let (tw, th) = template.dimensions();
    if tw == 0 || th == 0 || tw > hw || th > hh {
        return None;
    }
    let n = (tw as f64) * (th as f64);

    let t_mean = template.as_raw().iter().map(|&v| v as f64).sum::<f64>() / n;
    let centered: Vec<f64> = template.as_raw().iter().map(|&v| v as f64 - t_mean).collect();
    let t_energy: f64 = centered.iter().map(|v| v * v).sum();
    if t_energy <= f64::EPSILON {
        // A flat template carries no signal to correlate against.
        return Some((0.0, 0, 0));
    }

    let raw = haystack.as_raw();
    let stride = (hw + 1) as usize;
    let mut sums = vec![0f64; stride * (hh as usize + 1)];
    let mut squares = vec![0f64; stride * (hh as usize + 1)];
    for y in 0..hh as usize {
        let mut row = 0f64;
        let mut row_sq = 0f64;
        for x in 0..hw as usize {
            let v = raw[y * hw as usize + x] as f64;
            row += v;
            row_sq += v * v;
            sums[(y + 1) * stride + x + 1] = sums[y * stride + x + 1] + row;
            squares[(y + 1) * stride + x + 1] = squares[y * stride + x + 1] + row_sq;
        }
    }
    let window = |table: &[f64], x: usize, y: usize| -> f64 {
        table[(y + th as usize) * stride + x + tw as usize]
            - table[y * stride + x + tw as usize]
            - table[(y + th as usize) * stride + x]
            + table[y * stride + x]
    };

    let mut best: Option<(f32, u32, u32)> = None;
    for y in 0..=(hh - th) {
        for x in 0..=(hw - tw) {
            // Sum(t - mean(t)) is zero, so centering the window does not
            // change the cross term; only the window energy needs it.
            let mut cross = 0f64;
            for ty in 0..th {
                let hrow = ((y + ty) * hw + x) as usize;
                let trow = (ty * tw) as usize;
                for tx in 0..tw as usize {
                    cross += raw[hrow + tx] as f64 * centered[trow + tx];
                }
            }
            let s = window(&sums, x as usize, y as usize);
            let s2 = window(&squares, x as usize, y as usize);
            let w_energy = s2 - s * s / n;
            let score = if w_energy <= f64::EPSILON {
                0.0
            } else {
                (cross / (t_energy * w_energy).sqrt()) as f32
            };
            if best.is_none_or(|(b, _, _)| score > b) {
                best = Some((score, x, y));
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// A sparse high-contrast pattern. Templates need structure for the
    /// correlation to discriminate; a flat template scores 0 everywhere.
    fn textured(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            if (x * 7 + y * 13) % 11 == 0 {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }

    fn flat(width: u32, height: u32, value: u8) -> GrayImage {
        GrayImage::from_pixel(width, height, Luma([value]))
    }

    fn paste(target: &mut GrayImage, src: &GrayImage, x: u32, y: u32) {
        image::imageops::overlay(target, src, x as i64, y as i64);
    }

    fn thresholds() -> ThresholdConfig {
        ThresholdConfig::default()
    }

    #[test]
    fn test_button_found_at_pasted_location() {
        let template = textured(40, 20);
        let asset = Asset::from_image("button_refresh".to_string(), template.clone());
        let mut screenshot = flat(400, 300, 128);
        paste(&mut screenshot, &template, 100, 200);

        let mut matcher = TemplateMatcher::new();
        let hit = matcher
            .find_button(&screenshot, &asset, 0.75, None, (0, 0), "refresh")
            .unwrap();
        assert_eq!(hit, Point { x: 120, y: 210 });
    }

    #[test]
    fn test_button_absent_below_threshold() {
        let asset = Asset::from_image("button_refresh".to_string(), textured(40, 20));
        let screenshot = flat(400, 300, 128);

        let mut matcher = TemplateMatcher::new();
        assert!(matcher
            .find_button(&screenshot, &asset, 0.75, None, (0, 0), "refresh")
            .is_none());
    }

    #[test]
    fn test_button_center_includes_region_and_origin_offsets() {
        let template = textured(40, 20);
        let asset = Asset::from_image("button_confirm".to_string(), template.clone());
        let mut screenshot = flat(400, 300, 128);
        paste(&mut screenshot, &template, 150, 100);

        let region = Rect {
            x: 140,
            y: 90,
            width: 120,
            height: 80,
        };
        let mut matcher = TemplateMatcher::new();
        let hit = matcher
            .find_button(&screenshot, &asset, 0.75, Some(&region), (1000, 500), "confirm")
            .unwrap();
        assert_eq!(hit, Point { x: 1170, y: 610 });
    }

    #[test]
    fn test_region_smaller_than_template_falls_back_to_full_frame() {
        let template = textured(40, 20);
        let asset = Asset::from_image("button_confirm".to_string(), template.clone());
        let mut screenshot = flat(400, 300, 128);
        paste(&mut screenshot, &template, 300, 250);

        let region = Rect {
            x: 0,
            y: 0,
            width: 10,
            height: 10,
        };
        let mut matcher = TemplateMatcher::new();
        let hit = matcher
            .find_button(&screenshot, &asset, 0.75, Some(&region), (0, 0), "confirm")
            .unwrap();
        assert_eq!(hit, Point { x: 320, y: 260 });
    }

    #[test]
    fn test_template_larger_than_screenshot_is_none() {
        let asset = Asset::from_image("button_buy".to_string(), textured(500, 400));
        let screenshot = flat(100, 80, 128);

        let mut matcher = TemplateMatcher::new();
        assert!(matcher
            .find_button(&screenshot, &asset, 0.5, None, (0, 0), "buy")
            .is_none());
    }

    #[test]
    fn test_item_with_buy_button_returns_buy_center() {
        let item_template = textured(30, 30);
        let buy_template = textured(24, 12);
        let item = Asset::from_image("item_covenant".to_string(), item_template.clone());
        let buy = Asset::from_image("button_buy".to_string(), buy_template.clone());
        let sold = Asset::from_image("button_buy_sold".to_string(), textured(24, 16));

        let mut screenshot = flat(500, 300, 128);
        paste(&mut screenshot, &item_template, 50, 100);
        // Buy button inside the ROI that starts margin_x right of the item.
        paste(&mut screenshot, &buy_template, 270, 110);

        let region = Rect {
            x: 40,
            y: 0,
            width: 60,
            height: 300,
        };
        let roi_spec = BuyRoiSpec {
            margin_x: 200,
            width: 120,
            height: 80,
        };
        let mut matcher = TemplateMatcher::new();
        let hit = matcher
            .find_item(
                &screenshot,
                &item,
                &region,
                &buy,
                &sold,
                &roi_spec,
                &thresholds(),
                (0, 0),
            )
            .unwrap();
        assert_eq!(hit, Point { x: 282, y: 116 });
    }

    #[test]
    fn test_item_without_buy_button_is_none() {
        let item_template = textured(30, 30);
        let item = Asset::from_image("item_covenant".to_string(), item_template.clone());
        let buy = Asset::from_image("button_buy".to_string(), textured(24, 12));
        let sold = Asset::from_image("button_buy_sold".to_string(), textured(24, 16));

        let mut screenshot = flat(500, 300, 128);
        paste(&mut screenshot, &item_template, 50, 100);

        let region = Rect {
            x: 40,
            y: 0,
            width: 60,
            height: 300,
        };
        let roi_spec = BuyRoiSpec {
            margin_x: 200,
            width: 120,
            height: 80,
        };
        let mut matcher = TemplateMatcher::new();
        assert!(matcher
            .find_item(
                &screenshot,
                &item,
                &region,
                &buy,
                &sold,
                &roi_spec,
                &thresholds(),
                (0, 0),
            )
            .is_none());
    }

    #[test]
    fn test_item_near_edge_with_unusable_buy_region_is_none() {
        let item_template = textured(30, 30);
        let item = Asset::from_image("item_covenant".to_string(), item_template.clone());
        let buy = Asset::from_image("button_buy".to_string(), textured(24, 12));
        let sold = Asset::from_image("button_buy_sold".to_string(), textured(24, 16));

        // Item near the right edge so the ROI clamps to a sliver too
        // narrow for the buy template.
        let mut screenshot = flat(300, 200, 128);
        paste(&mut screenshot, &item_template, 260, 80);

        let region = Rect {
            x: 250,
            y: 0,
            width: 50,
            height: 200,
        };
        let roi_spec = BuyRoiSpec {
            margin_x: 35,
            width: 120,
            height: 80,
        };
        let mut matcher = TemplateMatcher::new();
        assert!(matcher
            .find_item(
                &screenshot,
                &item,
                &region,
                &buy,
                &sold,
                &roi_spec,
                &thresholds(),
                (0, 0),
            )
            .is_none());
    }

    #[test]
    fn test_mystic_item_uses_lowered_threshold() {
        let item = Asset::from_image("item_mystic".to_string(), textured(30, 30));
        let cfg = thresholds();
        let threshold = (cfg.item_match - cfg.mystic_item_delta).max(MYSTIC_FLOOR);
        assert_eq!(threshold, 0.70);

        // Delta larger than the headroom still floors at 0.70.
        let mut aggressive = cfg.clone();
        aggressive.mystic_item_delta = 0.3;
        let floored =
            (aggressive.item_match - aggressive.mystic_item_delta).max(MYSTIC_FLOOR);
        assert_eq!(floored, MYSTIC_FLOOR);
        assert!(item.id().to_lowercase().contains("mystic"));
    }

    #[test]
    fn test_invalidate_clears_blur_cache() {
        let template = textured(40, 20);
        let asset = Asset::from_image("button_refresh".to_string(), template.clone());
        let mut screenshot = flat(200, 100, 128);
        paste(&mut screenshot, &template, 20, 30);

        let mut matcher = TemplateMatcher::new();
        assert!(matcher
            .find_button(&screenshot, &asset, 0.75, None, (0, 0), "refresh")
            .is_some());
        assert!(!matcher.blurred.is_empty());
        matcher.invalidate();
        assert!(matcher.blurred.is_empty());
    }
}
