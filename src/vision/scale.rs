//! Asset scale computation.
//!
//! The asset scale factor is always height-based: the game UI scales with
//! vertical space, so window width is deliberately ignored here. Search
//! region geometry scales independently per axis (see `regions.rs`).

use image::GrayImage;
use image::imageops::FilterType;

use crate::capture::WindowRect;
use crate::vision::regions::AspectClass;

/// Scale changes smaller than this are ignored (no asset re-derivation).
pub const SCALE_EPSILON: f32 = 0.01;

/// Computes the height-based asset scale factor and plans window resizes
/// when the window is too small for reliable matching.
pub struct ScaleEngine {
    reference_height: u32,
    factor: f32,
}

impl ScaleEngine {
    pub fn new(reference_height: u32) -> Self {
        Self {
            reference_height,
            factor: 1.0,
        }
    }

    pub fn factor(&self) -> f32 {
        self.factor
    }

    pub fn compute(&self, window_height: u32) -> f32 {
        window_height as f32 / self.reference_height as f32
    }

    /// The window height (and resulting scale) below which template match
    /// confidence degrades sharply. 900px for 16:9 windows, 1000px
    /// otherwise, both relative to the 1600px asset reference.
    pub fn min_viable_height(aspect: AspectClass) -> u32 {
        match aspect {
            AspectClass::Standard => 900,
            _ => 1000,
        }
    }

    /// Recomputes the scale factor from the current window rectangle.
    ///
    /// Returns `Some((width, height))` when the scale is below the
    /// minimum viable threshold: the caller should request that resize
    /// (failures are non-fatal) and then call `update` again. Standard
    /// windows are resized to a canonical 16:9; other aspect classes
    /// keep their current ratio.
    pub fn update(&mut self, rect: &WindowRect, aspect: AspectClass) -> Option<(u32, u32)> {
        self.factor = self.compute(rect.height);

        let target_height = Self::min_viable_height(aspect);
        let target_scale = target_height as f32 / self.reference_height as f32;
        if self.factor >= target_scale || rect.height == 0 {
            return None;
        }

        let target_width = match aspect {
            AspectClass::Standard => (target_height as f32 * (16.0 / 9.0)) as u32,
            _ => {
                let current_aspect = rect.width as f32 / rect.height as f32;
                (target_height as f32 * current_aspect) as u32
            }
        };
        Some((target_width, target_height))
    }
}

/// Resizes an image by `factor` with linear interpolation.
///
/// A degenerate target size (<1px in either dimension) returns the input
/// unscaled rather than erroring.
pub fn scale_image(image: &GrayImage, factor: f32) -> GrayImage {
    let new_width = (image.width() as f32 * factor) as u32;
    let new_height = (image.height() as f32 * factor) as u32;
    if new_width < 1 || new_height < 1 {
        return image.clone();
    }
    image::imageops::resize(image, new_width, new_height, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(width: u32, height: u32) -> WindowRect {
        WindowRect {
            left: 0,
            top: 0,
            width,
            height,
        }
    }

    #[test]
    fn test_factor_is_height_ratio() {
        let engine = ScaleEngine::new(1600);
        assert_eq!(engine.compute(1600), 1.0);
        assert_eq!(engine.compute(800), 0.5);
        assert_eq!(engine.compute(2400), 1.5);
    }

    #[test]
    fn test_factor_monotonic_in_height() {
        let engine = ScaleEngine::new(1600);
        let mut last = 0.0;
        for h in (100..3200).step_by(100) {
            let f = engine.compute(h);
            assert!(f > last);
            last = f;
        }
    }

    #[test]
    fn test_no_resize_request_at_reference_size() {
        let mut engine = ScaleEngine::new(1600);
        assert_eq!(engine.update(&rect(3840, 1600), AspectClass::UltraWide), None);
        assert_eq!(engine.factor(), 1.0);
    }

    #[test]
    fn test_small_ultrawide_requests_resize_preserving_aspect() {
        let mut engine = ScaleEngine::new(1600);
        let request = engine.update(&rect(1920, 800), AspectClass::UltraWide);
        // 800/1600 = 0.5 is below the 1000/1600 = 0.625 floor.
        assert_eq!(request, Some((2400, 1000)));
    }

    #[test]
    fn test_small_standard_requests_canonical_16_9() {
        let mut engine = ScaleEngine::new(1600);
        let request = engine.update(&rect(1280, 720), AspectClass::Standard);
        assert_eq!(request, Some((1600, 900)));
    }

    #[test]
    fn test_standard_above_floor_keeps_size() {
        let mut engine = ScaleEngine::new(1600);
        assert_eq!(engine.update(&rect(1600, 900), AspectClass::Standard), None);
        assert!((engine.factor() - 0.5625).abs() < 1e-6);
    }

    #[test]
    fn test_scale_image_degenerate_returns_input() {
        let img = GrayImage::from_pixel(10, 10, image::Luma([42]));
        let out = scale_image(&img, 0.01);
        assert_eq!(out.dimensions(), (10, 10));
    }

    #[test]
    fn test_scale_image_resizes() {
        let img = GrayImage::from_pixel(100, 40, image::Luma([42]));
        let out = scale_image(&img, 0.5);
        assert_eq!(out.dimensions(), (50, 20));
    }
}
