//! Aspect classification and search-region geometry.
//!
//! Each UI element gets a search rectangle derived from per-aspect
//! reference measurements (3840x1600 for ultrawide, 1920x1080 for
//! standard 16:9). X-axis values scale with window width, Y-axis values
//! with window height; this is deliberately decoupled from the asset
//! scale factor, which is height-only.

use crate::automation::config::{Config, RegionTableConfig};
use crate::capture::WindowRect;

/// Coarse aspect-ratio bucket selecting which geometry table applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AspectClass {
    /// width/height >= 2.0 (21:9 and wider)
    UltraWide,
    /// width/height >= 1.6 (16:9, 16:10)
    Standard,
    /// Anything narrower; falls back to the ultrawide-style table.
    Other,
}

impl AspectClass {
    pub fn from_size(width: u32, height: u32) -> Self {
        if height == 0 {
            return AspectClass::Other;
        }
        let ratio = width as f32 / height as f32;
        if ratio >= 2.0 {
            AspectClass::UltraWide
        } else if ratio >= 1.6 {
            AspectClass::Standard
        } else {
            AspectClass::Other
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AspectClass::UltraWide => "21:9",
            AspectClass::Standard => "16:9",
            AspectClass::Other => "other",
        }
    }
}

/// A rectangle in window-local pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// The buy button has no absolute region: it sits a fixed horizontal
/// margin to the right of whichever item row matched, so only the margin
/// and ROI size are pre-scaled here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuyRoiSpec {
    pub margin_x: i32,
    pub width: u32,
    pub height: u32,
}

/// Scaled search regions for the current window size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchRegions {
    pub refresh: Rect,
    pub confirm: Rect,
    pub items: Rect,
    pub buy: BuyRoiSpec,
    pub confirm_buy: Rect,
}

/// Computes search regions, memoized on the (width, height) pair since
/// the engine asks for them on every detection call of a tight loop.
pub struct RegionCalculator {
    reference: (u32, u32),
    ultrawide: RegionTableConfig,
    standard: RegionTableConfig,
    other: RegionTableConfig,
    cache: Option<((u32, u32), SearchRegions)>,
}

impl RegionCalculator {
    pub fn from_config(config: &Config) -> Self {
        Self {
            reference: (config.reference.width, config.reference.height),
            ultrawide: config.search_regions_21_9.clone(),
            standard: config.search_regions_16_9.clone(),
            other: config.search_regions_other.clone(),
            cache: None,
        }
    }

    fn table(&self, aspect: AspectClass) -> &RegionTableConfig {
        match aspect {
            AspectClass::UltraWide => &self.ultrawide,
            AspectClass::Standard => &self.standard,
            AspectClass::Other => &self.other,
        }
    }

    /// Returns the regions for the current window size, recomputing only
    /// when the size changed since the last call.
    pub fn regions(&mut self, rect: &WindowRect) -> SearchRegions {
        let key = rect.size();
        if let Some((cached_key, cached)) = self.cache {
            if cached_key == key {
                return cached;
            }
        }
        let computed = self.compute(rect);
        self.cache = Some((key, computed));
        computed
    }

    fn compute(&self, rect: &WindowRect) -> SearchRegions {
        let aspect = AspectClass::from_size(rect.width, rect.height);
        let (ref_w, ref_h) = match aspect {
            AspectClass::Standard => (1920, 1080),
            _ => self.reference,
        };
        let width_scale = rect.width as f32 / ref_w as f32;
        let height_scale = rect.height as f32 / ref_h as f32;
        let table = self.table(aspect);

        let scale_w = |v: u32| (v as f32 * width_scale) as i32;
        let scale_h = |v: u32| (v as f32 * height_scale) as i32;

        let refresh_w = scale_w(table.refresh_button.width);
        let refresh_h = scale_h(table.refresh_button.height);
        let refresh = Rect {
            x: scale_w(table.refresh_button.margin_left),
            y: rect.height as i32 - refresh_h,
            width: refresh_w as u32,
            height: refresh_h as u32,
        };

        let confirm_w = scale_w(table.confirm_button.width);
        let confirm_h = scale_h(table.confirm_button.height);
        let confirm = Rect {
            x: rect.width as i32 / 2 + scale_w(table.confirm_button.margin_right),
            y: rect.height as i32 - scale_h(table.confirm_button.margin_bottom) - confirm_h,
            width: confirm_w as u32,
            height: confirm_h as u32,
        };

        let items = Rect {
            x: scale_w(table.items_search.x),
            y: 0,
            width: scale_w(table.items_search.width) as u32,
            height: rect.height,
        };

        let buy = BuyRoiSpec {
            margin_x: scale_w(table.buy_button.margin_x),
            width: scale_w(table.buy_button.width) as u32,
            height: scale_h(table.buy_button.height) as u32,
        };

        let confirm_buy_w = scale_w(table.confirm_buy_button.width);
        let confirm_buy_h = scale_h(table.confirm_buy_button.height);
        let confirm_buy = Rect {
            x: rect.width as i32 / 2 + scale_w(table.confirm_buy_button.offset_right),
            y: rect.height as i32 - scale_h(table.confirm_buy_button.margin_bottom) - confirm_buy_h,
            width: confirm_buy_w as u32,
            height: confirm_buy_h as u32,
        };

        SearchRegions {
            refresh,
            confirm,
            items,
            buy,
            confirm_buy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::config::Config;

    fn rect(width: u32, height: u32) -> WindowRect {
        WindowRect {
            left: 0,
            top: 0,
            width,
            height,
        }
    }

    fn calculator() -> RegionCalculator {
        RegionCalculator::from_config(&Config::default())
    }

    #[test]
    fn test_aspect_partition_is_total() {
        assert_eq!(AspectClass::from_size(3840, 1600), AspectClass::UltraWide);
        // Boundary at 2.0 is inclusive-low for UltraWide.
        assert_eq!(AspectClass::from_size(3200, 1600), AspectClass::UltraWide);
        assert_eq!(AspectClass::from_size(1920, 1080), AspectClass::Standard);
        // Boundary at 1.6 is inclusive-low for Standard.
        assert_eq!(AspectClass::from_size(1600, 1000), AspectClass::Standard);
        assert_eq!(AspectClass::from_size(1599, 1000), AspectClass::Other);
        assert_eq!(AspectClass::from_size(1000, 800), AspectClass::Other);
        assert_eq!(AspectClass::from_size(10, 0), AspectClass::Other);
    }

    #[test]
    fn test_ultrawide_regions_at_reference_size() {
        let mut calc = calculator();
        let regions = calc.regions(&rect(3840, 1600));
        // At the exact reference resolution both scales are 1.0, so the
        // raw table values come straight through.
        assert_eq!(
            regions.refresh,
            Rect {
                x: 540,
                y: 1600 - 275,
                width: 900,
                height: 275
            }
        );
        assert_eq!(regions.confirm.x, 1920 + 250);
        assert_eq!(regions.confirm.y, 1600 - 225 - 500);
        assert_eq!(regions.items.height, 1600);
        assert_eq!(regions.buy.margin_x, 1139);
        assert_eq!(regions.confirm_buy.x, 1920 + 15);
    }

    #[test]
    fn test_width_scaling_is_linear_and_independent() {
        let mut calc = calculator();
        let base = calc.regions(&rect(3840, 1600));
        let wide = calc.regions(&rect(7680, 1600));
        // Doubling width doubles X-derived values and leaves Y-derived
        // values unchanged.
        assert_eq!(wide.refresh.x, base.refresh.x * 2);
        assert_eq!(wide.refresh.width, base.refresh.width * 2);
        assert_eq!(wide.refresh.height, base.refresh.height);
        assert_eq!(wide.items.x, base.items.x * 2);
        assert_eq!(wide.buy.margin_x, base.buy.margin_x * 2);
        assert_eq!(wide.confirm.height, base.confirm.height);
    }

    #[test]
    fn test_standard_aspect_uses_1080p_reference() {
        let mut calc = calculator();
        let regions = calc.regions(&rect(1920, 1080));
        assert_eq!(
            regions.refresh,
            Rect {
                x: 0,
                y: 1080 - 160,
                width: 580,
                height: 160
            }
        );
        // margin_right is 0 for 16:9, so the confirm region starts at
        // the window centerline.
        assert_eq!(regions.confirm.x, 960);
        assert_eq!(regions.items.x, 810);
    }

    #[test]
    fn test_regions_memoized_per_window_size() {
        let mut calc = calculator();
        let a = calc.regions(&rect(3840, 1600));
        let b = calc.regions(&rect(3840, 1600));
        assert_eq!(a, b);
        let c = calc.regions(&rect(1920, 1080));
        assert_ne!(a, c);
        // Going back to the first size recomputes the same geometry.
        assert_eq!(calc.regions(&rect(3840, 1600)), a);
    }
}
