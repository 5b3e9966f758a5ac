//! Configuration loading.
//!
//! All tuning values live in an optional `config.json` next to the
//! executable. Missing keys fall back to the built-in defaults *per key*
//! (the user file is deep-merged onto the default table before
//! deserializing), so a config that overrides one threshold keeps every
//! other default.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

/// Global configuration instance, initialized once at startup.
static CONFIG: OnceLock<Config> = OnceLock::new();

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Pause after mouse movements/clicks (seconds).
    pub mouse_sleep: f64,
    /// Pause before taking a screenshot (seconds).
    pub screenshot_sleep: f64,
    /// How long to wait for the shop to reappear before giving up.
    pub shop_wait_secs: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            mouse_sleep: 0.15,
            screenshot_sleep: 0.15,
            shop_wait_secs: 30.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AntiDetectionConfig {
    /// Maximum random offset applied to every click, in pixels.
    pub click_offset_max: i32,
    /// Probability of a double click instead of a single click.
    pub double_click_chance: f64,
    pub scroll_random_extra_min: f64,
    pub scroll_random_extra_max: f64,
}

impl Default for AntiDetectionConfig {
    fn default() -> Self {
        Self {
            click_offset_max: 10,
            double_click_chance: 0.3,
            scroll_random_extra_min: 0.0,
            scroll_random_extra_max: 0.15,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollingConfig {
    /// Scroll drag distance as a fraction of window height.
    pub scroll_ratio: f64,
    pub scroll_start_x_ratio: f64,
    pub scroll_start_y_ratio: f64,
}

impl Default for ScrollingConfig {
    fn default() -> Self {
        Self {
            scroll_ratio: 0.277,
            scroll_start_x_ratio: 0.58,
            scroll_start_y_ratio: 0.65,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub item_match: f32,
    pub button_match: f32,
    pub shop_check: f32,
    pub buy_button: f32,
    pub sold_indicator: f32,
    /// Empirical tuning: items whose name contains "mystic" score lower
    /// even on true positives, so their threshold drops by this much
    /// (floored at 0.70).
    pub mystic_item_delta: f32,
    /// Empirical tuning: the refresh button silhouette is more
    /// compressed on 16:9 windows, so the shop-presence threshold drops
    /// by this much there (floored at 0.65).
    pub standard_shop_check_delta: f32,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            item_match: 0.75,
            button_match: 0.75,
            shop_check: 0.7,
            buy_button: 0.7,
            sold_indicator: 0.7,
            mystic_item_delta: 0.05,
            standard_shop_check_delta: 0.05,
        }
    }
}

/// The resolution the template assets were authored at.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            width: 3840,
            height: 1600,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefreshButtonRegion {
    pub width: u32,
    pub height: u32,
    pub margin_left: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfirmButtonRegion {
    pub width: u32,
    pub height: u32,
    pub margin_bottom: u32,
    pub margin_right: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemsSearchRegion {
    pub x: u32,
    pub width: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuyButtonRegion {
    pub margin_x: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfirmBuyButtonRegion {
    pub width: u32,
    pub height: u32,
    pub margin_bottom: u32,
    pub offset_right: u32,
}

/// Reference-resolution search-region measurements for one aspect class.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegionTableConfig {
    pub refresh_button: RefreshButtonRegion,
    pub confirm_button: ConfirmButtonRegion,
    pub items_search: ItemsSearchRegion,
    pub buy_button: BuyButtonRegion,
    pub confirm_buy_button: ConfirmBuyButtonRegion,
}

fn default_regions_21_9() -> RegionTableConfig {
    RegionTableConfig {
        refresh_button: RefreshButtonRegion {
            width: 900,
            height: 275,
            margin_left: 540,
        },
        confirm_button: ConfirmButtonRegion {
            width: 500,
            height: 500,
            margin_bottom: 225,
            margin_right: 250,
        },
        items_search: ItemsSearchRegion { x: 1680, width: 300 },
        buy_button: BuyButtonRegion {
            margin_x: 1139,
            width: 450,
            height: 250,
        },
        confirm_buy_button: ConfirmBuyButtonRegion {
            width: 600,
            height: 230,
            margin_bottom: 350,
            offset_right: 15,
        },
    }
}

fn default_regions_16_9() -> RegionTableConfig {
    RegionTableConfig {
        refresh_button: RefreshButtonRegion {
            width: 580,
            height: 160,
            margin_left: 0,
        },
        confirm_button: ConfirmButtonRegion {
            width: 400,
            height: 300,
            margin_bottom: 160,
            margin_right: 0,
        },
        items_search: ItemsSearchRegion { x: 810, width: 190 },
        buy_button: BuyButtonRegion {
            margin_x: 740,
            width: 300,
            height: 180,
        },
        confirm_buy_button: ConfirmBuyButtonRegion {
            width: 440,
            height: 150,
            margin_bottom: 240,
            offset_right: 15,
        },
    }
}

fn default_regions_other() -> RegionTableConfig {
    RegionTableConfig {
        refresh_button: RefreshButtonRegion {
            width: 900,
            height: 275,
            margin_left: 540,
        },
        confirm_button: ConfirmButtonRegion {
            width: 450,
            height: 500,
            margin_bottom: 275,
            margin_right: 250,
        },
        items_search: ItemsSearchRegion { x: 1680, width: 300 },
        buy_button: BuyButtonRegion {
            margin_x: 1100,
            width: 450,
            height: 250,
        },
        confirm_buy_button: ConfirmBuyButtonRegion {
            width: 650,
            height: 200,
            margin_bottom: 375,
            offset_right: 15,
        },
    }
}

/// A shop item the user can opt into tracking.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShopItemConfig {
    /// Template image filename under the assets directory.
    pub image: String,
    pub name: String,
    /// Gold price, used for the spend ledger.
    pub price: u64,
}

fn default_shop_items() -> Vec<ShopItemConfig> {
    vec![
        ShopItemConfig {
            image: "item_covenant.png".to_string(),
            name: "Covenant bookmark".to_string(),
            price: 184_000,
        },
        ShopItemConfig {
            image: "item_mystic.png".to_string(),
            name: "Mystic medal".to_string(),
            price: 280_000,
        },
        ShopItemConfig {
            image: "item_friendship.png".to_string(),
            name: "Friendship bookmark".to_string(),
            price: 18_000,
        },
    ]
}

fn default_recognized_titles() -> Vec<String> {
    [
        "Epic Seven",
        "BlueStacks App Player",
        "LDPlayer",
        "MuMu Player 12",
        "에픽세븐",
        "Google Play Games on PC Emulator",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub enabled: bool,
}

/// Complete configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub timing: TimingConfig,
    pub anti_detection: AntiDetectionConfig,
    pub scrolling: ScrollingConfig,
    pub thresholds: ThresholdConfig,
    pub reference: ReferenceConfig,
    pub search_regions_21_9: RegionTableConfig,
    pub search_regions_16_9: RegionTableConfig,
    pub search_regions_other: RegionTableConfig,
    pub recognized_titles: Vec<String>,
    pub shop_items: Vec<ShopItemConfig>,
    pub debug: DebugConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timing: TimingConfig::default(),
            anti_detection: AntiDetectionConfig::default(),
            scrolling: ScrollingConfig::default(),
            thresholds: ThresholdConfig::default(),
            reference: ReferenceConfig::default(),
            search_regions_21_9: default_regions_21_9(),
            search_regions_16_9: default_regions_16_9(),
            search_regions_other: default_regions_other(),
            recognized_titles: default_recognized_titles(),
            shop_items: default_shop_items(),
            debug: DebugConfig::default(),
        }
    }
}

/// Deep-merges `overlay` into `base`; objects merge per key, everything
/// else is replaced wholesale.
fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Parses a config JSON document on top of the built-in defaults.
pub fn parse_config(contents: &str) -> serde_json::Result<Config> {
    let mut merged = serde_json::to_value(Config::default())?;
    let overlay: Value = serde_json::from_str(contents)?;
    deep_merge(&mut merged, overlay);
    serde_json::from_value(merged)
}

/// Loads configuration from `config.json` next to the executable, or
/// returns the defaults.
fn load_config() -> Config {
    let config_path = crate::paths::get_exe_dir().join("config.json");
    crate::log(&format!("Looking for config at: {}", config_path.display()));

    if config_path.exists() {
        match fs::read_to_string(&config_path) {
            Ok(contents) => match parse_config(&contents) {
                Ok(config) => {
                    crate::log("Config loaded from config.json");
                    return config;
                }
                Err(e) => {
                    crate::log(&format!("Failed to parse config.json: {}. Using defaults.", e));
                }
            },
            Err(e) => {
                crate::log(&format!("Failed to read config.json: {}. Using defaults.", e));
            }
        }
    } else {
        crate::log("config.json not found. Using default config.");
    }

    Config::default()
}

/// Initializes the global configuration. Call once at startup.
///
/// `custom_reference` overrides the asset reference resolution (the
/// `--size` flag, for users who captured their own templates).
pub fn init_config(custom_reference: Option<(u32, u32)>) {
    let mut config = load_config();
    if let Some((width, height)) = custom_reference {
        config.reference = ReferenceConfig { width, height };
    }
    let _ = CONFIG.set(config);
}

/// Returns a reference to the global configuration.
/// Panics if called before init_config().
pub fn get_config() -> &'static Config {
    CONFIG
        .get()
        .expect("Config not initialized. Call init_config() first.")
}

/// Writes the full default configuration as a template the user can
/// copy to config.json and trim down.
pub fn save_default_config(path: &Path) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(&Config::default())?;
    fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds() {
        let config = Config::default();
        assert_eq!(config.thresholds.item_match, 0.75);
        assert_eq!(config.thresholds.shop_check, 0.7);
        assert_eq!(config.reference.width, 3840);
        assert_eq!(config.shop_items.len(), 3);
    }

    #[test]
    fn test_partial_override_keeps_sibling_keys() {
        let config = parse_config(r#"{"thresholds": {"item_match": 0.9}}"#).unwrap();
        assert_eq!(config.thresholds.item_match, 0.9);
        // Untouched siblings keep their defaults.
        assert_eq!(config.thresholds.button_match, 0.75);
        assert_eq!(config.timing.mouse_sleep, 0.15);
    }

    #[test]
    fn test_partial_region_override_merges_per_key() {
        let config =
            parse_config(r#"{"search_regions_16_9": {"refresh_button": {"width": 600}}}"#).unwrap();
        assert_eq!(config.search_regions_16_9.refresh_button.width, 600);
        // The rest of the 16:9 table survives the partial override.
        assert_eq!(config.search_regions_16_9.refresh_button.height, 160);
        assert_eq!(config.search_regions_16_9.items_search.x, 810);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(parse_config("not json").is_err());
    }

    #[test]
    fn test_roundtrip_default_config() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        let config = parse_config(&json).unwrap();
        assert_eq!(config.search_regions_21_9, default_regions_21_9());
        assert_eq!(config.search_regions_other.buy_button.margin_x, 1100);
    }
}
