//! Wires the engine to the live window, capture, and input backends.

use crate::automation::config::ShopItemConfig;

/// Command-line run parameters.
#[derive(Clone, Debug, Default)]
pub struct RunArgs {
    pub title: Option<String>,
    pub budget: Option<u32>,
    pub allow_move: bool,
    /// Case-insensitive tokens matched against item names and image
    /// filenames; `None` tracks every configured item.
    pub items_filter: Option<Vec<String>>,
}

fn matches_filter(item: &ShopItemConfig, filter: Option<&[String]>) -> bool {
    match filter {
        None => true,
        Some(tokens) => tokens.iter().any(|token| {
            let token = token.to_lowercase();
            item.name.to_lowercase().contains(&token)
                || item.image.to_lowercase().contains(&token)
        }),
    }
}

#[cfg(windows)]
mod live {
    use super::{matches_filter, RunArgs};
    use crate::automation::config::{get_config, Config};
    use crate::automation::engine::{RefreshEngine, RunOptions, StopReason};
    use crate::automation::input::SystemPointer;
    use crate::automation::{csv_writer, CancelToken};
    use crate::capture::{find_window_by_title, list_window_titles, GdiCapture, Win32Window};
    use crate::paths;
    use crate::vision::{Asset, AssetStore};
    use anyhow::{bail, ensure, Result};
    use regex::Regex;
    use std::thread;
    use std::time::Duration;
    use windows::Win32::UI::Input::KeyboardAndMouse::{GetAsyncKeyState, VK_ESCAPE};

    fn resolve_window(config: &Config, requested: Option<&str>) -> Result<(Win32Window, String)> {
        if let Some(title) = requested {
            return Ok((find_window_by_title(title)?, title.to_string()));
        }

        let titles = list_window_titles();
        for title in &titles {
            if config.recognized_titles.iter().any(|known| known == title) {
                crate::log(&format!("Auto-detected game window: {}", title));
                return Ok((find_window_by_title(title)?, title.clone()));
            }
        }
        // Some emulators append an instance suffix to the game title.
        let pattern = Regex::new(r"^(Epic Seven|에픽세븐)( - .+)?$")?;
        for title in &titles {
            if pattern.is_match(title) {
                crate::log(&format!("Auto-detected game window: {}", title));
                return Ok((find_window_by_title(title)?, title.clone()));
            }
        }
        bail!("No game window found. Pass --title with the exact window title.")
    }

    fn load_items(config: &Config, filter: Option<&[String]>) -> Result<Vec<(Asset, String, u64)>> {
        let assets_dir = paths::get_assets_dir();
        let mut items = Vec::new();
        for item in &config.shop_items {
            if !matches_filter(item, filter) {
                continue;
            }
            let asset = Asset::load(item.image.clone(), &assets_dir.join(&item.image))?;
            items.push((asset, item.name.clone(), item.price));
        }
        ensure!(!items.is_empty(), "No shop items selected to track");
        Ok(items)
    }

    fn spawn_stop_poller(token: CancelToken) {
        thread::spawn(move || {
            while !token.is_cancelled() {
                let state = unsafe { GetAsyncKeyState(VK_ESCAPE.0 as i32) };
                if (state as u16 & 0x8000) != 0 {
                    crate::log("Stop key pressed");
                    token.cancel();
                    break;
                }
                thread::sleep(Duration::from_millis(10));
            }
        });
    }

    pub fn run(args: &RunArgs) -> Result<StopReason> {
        let config = get_config().clone();
        let (window, title) = resolve_window(&config, args.title.as_deref())?;
        let assets = AssetStore::load(&paths::get_assets_dir())?;
        let items = load_items(&config, args.items_filter.as_deref())?;

        let token = CancelToken::new();
        spawn_stop_poller(token.clone());
        crate::log("Press ESC to stop at any time");

        let mut engine = RefreshEngine::new(
            config,
            window,
            GdiCapture::new(),
            SystemPointer::new(),
            assets,
            items,
            RunOptions {
                budget: args.budget,
                allow_move: args.allow_move,
                expected_title: title,
            },
            token,
        );
        let reason = engine.run();

        match csv_writer::append_run(engine.tracker()) {
            Ok(path) => crate::log(&format!("Run history appended to {}", path.display())),
            Err(e) => crate::log(&format!("Failed to write run history: {}", e)),
        }
        Ok(reason)
    }
}

#[cfg(windows)]
pub use live::run;
