//! Visual detection pipeline: template assets, scaling, search-region
//! geometry, and correlation-coefficient template matching.

pub mod assets;
pub mod matcher;
pub mod regions;
pub mod scale;

pub use assets::{Asset, AssetStore};
pub use matcher::{Point, TemplateMatcher};
pub use regions::{AspectClass, BuyRoiSpec, Rect, RegionCalculator, SearchRegions};
pub use scale::ScaleEngine;
