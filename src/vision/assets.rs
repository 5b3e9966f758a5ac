//! Template asset loading.
//!
//! Assets are authored at the reference resolution (3840x1600 by default)
//! and converted to grayscale once at load time. The scaled copy is
//! recomputed by the scale engine whenever the window scale changes.

use anyhow::{Context, Result};
use image::GrayImage;
use std::path::Path;

use crate::vision::scale;

/// A grayscale template image plus its copy scaled to the current window.
#[derive(Debug, Clone)]
pub struct Asset {
    id: String,
    reference: GrayImage,
    scaled: GrayImage,
}

impl Asset {
    pub fn from_image(id: impl Into<String>, reference: GrayImage) -> Self {
        let scaled = reference.clone();
        Self {
            id: id.into(),
            reference,
            scaled,
        }
    }

    /// Loads an image file and converts it to grayscale.
    pub fn load(id: impl Into<String>, path: &Path) -> Result<Self> {
        let id = id.into();
        let image = image::open(path)
            .with_context(|| format!("Failed to load asset {}", path.display()))?
            .into_luma8();
        Ok(Self::from_image(id, image))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The template at its current scale, used for matching.
    pub fn template(&self) -> &GrayImage {
        &self.scaled
    }

    /// Re-derives the scaled copy from the reference buffer.
    pub fn rescale(&mut self, factor: f32) {
        self.scaled = scale::scale_image(&self.reference, factor);
    }
}

/// The five button/indicator templates the shop loop depends on.
pub struct AssetStore {
    pub refresh: Asset,
    pub confirm: Asset,
    pub confirm_buy: Asset,
    pub buy: Asset,
    pub sold: Asset,
}

impl AssetStore {
    /// Loads the button templates from the assets directory.
    pub fn load(dir: &Path) -> Result<Self> {
        let load = |name: &str| Asset::load(name, &dir.join(name));
        Ok(Self {
            refresh: load("button_refresh.png")?,
            confirm: load("button_refresh_confirm.png")?,
            confirm_buy: load("button_buy_confirm.png")?,
            buy: load("button_buy.png")?,
            sold: load("button_buy_sold.png")?,
        })
    }

    pub fn rescale_all(&mut self, factor: f32) {
        self.refresh.rescale(factor);
        self.confirm.rescale(factor);
        self.confirm_buy.rescale(factor);
        self.buy.rescale(factor);
        self.sold.rescale(factor);
    }
}
