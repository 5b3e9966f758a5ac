//! The refresh loop state machine.
//!
//! One `step()` call performs one unit of work and returns whether the
//! loop should continue. Every step re-checks cancellation and window
//! validity first, so the loop reacts to the stop key and to the game
//! closing within one step.

use crate::automation::config::{Config, ThresholdConfig};
use crate::automation::input::{self, Pointer};
use crate::automation::tracker::{PurchaseTracker, REFRESH_COST};
use crate::automation::CancelToken;
use crate::capture::{GameWindow, ScreenCapture, WindowRect};
use crate::vision::scale::SCALE_EPSILON;
use crate::vision::{
    Asset, AssetStore, AspectClass, Point, RegionCalculator, ScaleEngine, TemplateMatcher,
};
use anyhow::{ensure, Result};
use image::{DynamicImage, GrayImage};
use std::collections::HashSet;
use std::fmt;
use std::thread;
use std::time::Duration;

/// Lowest threshold the 16:9 shop-check tuning may reach.
const STANDARD_SHOP_FLOOR: f32 = 0.65;

/// Why the run ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    WindowClosed,
    BudgetExhausted,
    OutOfCurrency,
    ShopTimeout,
    Failed(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Cancelled => write!(f, "stopped by user"),
            StopReason::WindowClosed => write!(f, "game window closed"),
            StopReason::BudgetExhausted => write!(f, "skystone budget exhausted"),
            StopReason::OutOfCurrency => write!(f, "out of skystones"),
            StopReason::ShopTimeout => write!(f, "shop did not appear in time"),
            StopReason::Failed(message) => write!(f, "error: {}", message),
        }
    }
}

#[derive(Debug)]
enum State {
    CheckingShop,
    WaitingForShop { waited: f64 },
    BuyingBeforeScroll,
    Scrolling,
    BuyingAfterScroll,
    Refreshing,
    Terminated(StopReason),
}

#[derive(Clone, Copy)]
enum ButtonKind {
    Refresh,
    Confirm,
    ConfirmBuy,
}

impl ButtonKind {
    fn name(self) -> &'static str {
        match self {
            ButtonKind::Refresh => "refresh",
            ButtonKind::Confirm => "refresh confirm",
            ButtonKind::ConfirmBuy => "buy confirm",
        }
    }

    /// Window-relative position clicked when matching fails repeatedly.
    fn fallback_ratio(self) -> (f64, f64) {
        match self {
            ButtonKind::Refresh => (0.20, 0.90),
            ButtonKind::Confirm => (0.58, 0.65),
            ButtonKind::ConfirmBuy => (0.55, 0.70),
        }
    }
}

/// Run parameters that come from the command line.
pub struct RunOptions {
    /// Skystone budget; `None` runs until stopped or out of currency.
    pub budget: Option<u32>,
    /// Whether an off-screen window may be moved back to the origin.
    /// Below-minimum windows always get a resize request.
    pub allow_move: bool,
    pub expected_title: String,
}

pub struct RefreshEngine<W, C, P> {
    config: Config,
    window: W,
    capture: C,
    pointer: P,
    token: CancelToken,
    assets: AssetStore,
    item_assets: Vec<Asset>,
    matcher: TemplateMatcher,
    scale: ScaleEngine,
    regions: RegionCalculator,
    tracker: PurchaseTracker,
    options: RunOptions,
    state: State,
    /// Item indexes bought in the current shop, cleared on refresh.
    bought: HashSet<usize>,
}

impl<W: GameWindow, C: ScreenCapture, P: Pointer> RefreshEngine<W, C, P> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        window: W,
        capture: C,
        pointer: P,
        assets: AssetStore,
        items: Vec<(Asset, String, u64)>,
        options: RunOptions,
        token: CancelToken,
    ) -> Self {
        let tracker = PurchaseTracker::new(
            items
                .iter()
                .map(|(_, name, price)| (name.clone(), *price))
                .collect::<Vec<_>>(),
        );
        let item_assets = items.into_iter().map(|(asset, _, _)| asset).collect();
        let scale = ScaleEngine::new(config.reference.height);
        let regions = RegionCalculator::from_config(&config);
        Self {
            config,
            window,
            capture,
            pointer,
            token,
            assets,
            item_assets,
            matcher: TemplateMatcher::new(),
            scale,
            regions,
            tracker,
            options,
            state: State::CheckingShop,
            bought: HashSet::new(),
        }
    }

    pub fn tracker(&self) -> &PurchaseTracker {
        &self.tracker
    }

    /// Runs until a stop condition. Always releases the capture and
    /// cancels the shared token on exit.
    pub fn run(&mut self) -> StopReason {
        if let Err(e) = self.prepare_window() {
            self.terminate(StopReason::Failed(e.to_string()));
        }
        loop {
            match self.step() {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    self.terminate(StopReason::Failed(e.to_string()));
                    break;
                }
            }
        }
        self.capture.release();
        self.token.cancel();
        let reason = match &self.state {
            State::Terminated(reason) => reason.clone(),
            _ => StopReason::Cancelled,
        };
        crate::log(&format!(
            "Run finished ({}): {} refreshes, {} purchases, {} skystones, {} gold",
            reason,
            self.tracker.refresh_count(),
            self.tracker.total_purchases(),
            self.tracker.skystones_spent(),
            self.tracker.gold_spent()
        ));
        reason
    }

    /// Performs one unit of work. Returns false when the run is over.
    pub fn step(&mut self) -> Result<bool> {
        if matches!(self.state, State::Terminated(_)) {
            return Ok(false);
        }
        if self.token.is_cancelled() {
            self.terminate(StopReason::Cancelled);
            return Ok(false);
        }
        let title_ok = self
            .window
            .title()
            .map(|title| title == self.options.expected_title)
            .unwrap_or(false);
        if !title_ok {
            self.terminate(StopReason::WindowClosed);
            return Ok(false);
        }

        let state = std::mem::replace(&mut self.state, State::CheckingShop);
        match state {
            State::CheckingShop => {
                self.bought.clear();
                let (frame, rect) = self.take_screenshot(true)?;
                if self.is_in_shop(&frame, &rect) {
                    self.state = State::BuyingBeforeScroll;
                } else {
                    crate::log("Shop not detected, waiting for it to load");
                    self.state = State::WaitingForShop { waited: 0.0 };
                }
            }
            State::WaitingForShop { waited } => {
                if waited >= self.config.timing.shop_wait_secs {
                    self.terminate(StopReason::ShopTimeout);
                } else {
                    let interval = (self.config.timing.shop_wait_secs - waited).min(1.0);
                    self.sleep(interval);
                    let (frame, rect) = self.take_screenshot(false)?;
                    if self.is_in_shop(&frame, &rect) {
                        self.state = State::BuyingBeforeScroll;
                    } else {
                        self.state = State::WaitingForShop {
                            waited: waited + interval,
                        };
                    }
                }
            }
            State::BuyingBeforeScroll => {
                self.buy_pass()?;
                self.state = State::Scrolling;
            }
            State::Scrolling => {
                self.scroll_shop()?;
                self.sleep(self.config.timing.mouse_sleep);
                self.state = State::BuyingAfterScroll;
            }
            State::BuyingAfterScroll => {
                self.buy_pass()?;
                self.state = State::Refreshing;
            }
            State::Refreshing => {
                if let Some(budget) = self.options.budget {
                    if self.tracker.refresh_count() >= budget / REFRESH_COST {
                        crate::log(&format!(
                            "Budget of {} skystones allows no further refresh",
                            budget
                        ));
                        self.terminate(StopReason::BudgetExhausted);
                        return Ok(false);
                    }
                }
                self.click_button(ButtonKind::Refresh)?;
                self.sleep(self.config.timing.mouse_sleep);
                self.click_button(ButtonKind::Confirm)?;
                self.sleep(self.config.timing.screenshot_sleep);
                self.tracker.increment_refresh();
                if !self.refresh_went_through()? {
                    self.terminate(StopReason::OutOfCurrency);
                    return Ok(false);
                }
                self.state = State::CheckingShop;
            }
            State::Terminated(reason) => {
                self.state = State::Terminated(reason);
                return Ok(false);
            }
        }
        Ok(!matches!(self.state, State::Terminated(_)))
    }

    fn terminate(&mut self, reason: StopReason) {
        crate::log(&format!("Stopping: {}", reason));
        self.state = State::Terminated(reason);
    }

    fn sleep(&self, secs: f64) {
        if secs > 0.0 {
            thread::sleep(Duration::from_secs_f64(secs));
        }
    }

    fn prepare_window(&mut self) -> Result<()> {
        crate::log(&format!(
            "Target window: {}",
            self.options.expected_title
        ));
        if self.window.is_minimized()? {
            self.window.restore()?;
            self.sleep(0.3);
        }
        self.window.activate()?;
        if self.options.allow_move {
            let rect = self.window.rect()?;
            if rect.left < 0 || rect.top < 0 {
                crate::log("Window is off-screen, moving it to the origin");
                self.window.move_to(0, 0)?;
            }
        }
        Ok(())
    }

    /// Recomputes the asset scale from the window height, requesting a
    /// window resize first when the window is too small to match
    /// reliably. Rescales all templates when the factor moved.
    fn sync_scale(&mut self, rect: &WindowRect) -> Result<WindowRect> {
        let aspect = AspectClass::from_size(rect.width, rect.height);
        let previous = self.scale.factor();
        let mut rect = *rect;
        if let Some((width, height)) = self.scale.update(&rect, aspect) {
            crate::log(&format!(
                "Window too small for reliable matching, resizing to {}x{}",
                width, height
            ));
            match self.window.resize_to(width, height) {
                Ok(()) => {
                    self.sleep(0.5);
                    rect = self.window.rect()?;
                    self.scale.update(&rect, aspect);
                }
                Err(e) => {
                    crate::log(&format!("Resize failed, continuing at current scale: {}", e));
                }
            }
        }
        let factor = self.scale.factor();
        if (factor - previous).abs() > SCALE_EPSILON {
            crate::log(&format!(
                "Asset scale set to {:.3} ({} window)",
                factor,
                aspect.label()
            ));
            self.assets.rescale_all(factor);
            for item in &mut self.item_assets {
                item.rescale(factor);
            }
            self.matcher.invalidate();
        }
        Ok(rect)
    }

    fn take_screenshot(&mut self, activate: bool) -> Result<(GrayImage, WindowRect)> {
        if activate {
            self.window.activate()?;
        }
        self.sleep(self.config.timing.screenshot_sleep);
        let rect = self.window.rect()?;
        let rect = self.sync_scale(&rect)?;
        let frame = self.capture.grab(rect)?;
        ensure!(frame.width() > 0 && frame.height() > 0, "Captured an empty frame");
        Ok((DynamicImage::ImageRgba8(frame).into_luma8(), rect))
    }

    /// The shop is considered open when the refresh button matches in
    /// its expected corner.
    fn is_in_shop(&mut self, frame: &GrayImage, rect: &WindowRect) -> bool {
        let aspect = AspectClass::from_size(rect.width, rect.height);
        let threshold = shop_check_threshold(&self.config.thresholds, aspect);
        let regions = self.regions.regions(rect);
        self.matcher
            .find_button(
                frame,
                &self.assets.refresh,
                threshold,
                Some(&regions.refresh),
                (rect.left, rect.top),
                "shop check",
            )
            .is_some()
    }

    /// Buys every tracked item currently on offer, re-screenshotting
    /// after each purchase so sold overlays are seen.
    fn buy_pass(&mut self) -> Result<()> {
        let max_rounds = self.item_assets.len() + 1;
        for _ in 0..max_rounds {
            if self.token.is_cancelled() {
                return Ok(());
            }
            let (frame, rect) = self.take_screenshot(false)?;
            let mut purchased = false;
            for index in 0..self.item_assets.len() {
                if self.bought.contains(&index) {
                    continue;
                }
                let regions = self.regions.regions(&rect);
                let hit = self.matcher.find_item(
                    &frame,
                    &self.item_assets[index],
                    &regions.items,
                    &self.assets.buy,
                    &self.assets.sold,
                    &regions.buy,
                    &self.config.thresholds,
                    (rect.left, rect.top),
                );
                if let Some(point) = hit {
                    let name = self.tracker.items()[index].name.clone();
                    crate::log(&format!("Found {}, buying", name));
                    self.click_at(point)?;
                    self.sleep(self.config.timing.mouse_sleep);
                    self.click_button(ButtonKind::ConfirmBuy)?;
                    self.tracker.record_purchase(index);
                    self.bought.insert(index);
                    self.sleep(0.3);
                    purchased = true;
                    break;
                }
            }
            if !purchased {
                return Ok(());
            }
        }
        Ok(())
    }

    /// Clicks a button by template match, retrying up to three times,
    /// then falling back to a fixed window-relative position. Returns
    /// whether the template actually matched.
    fn click_button(&mut self, kind: ButtonKind) -> Result<bool> {
        let threshold = self.config.thresholds.button_match;
        for attempt in 0..3 {
            if self.token.is_cancelled() {
                return Ok(false);
            }
            let activate = attempt == 0;
            let (frame, rect) = self.take_screenshot(activate)?;
            let regions = self.regions.regions(&rect);
            let (asset, region) = match kind {
                ButtonKind::Refresh => (&self.assets.refresh, regions.refresh),
                ButtonKind::Confirm => (&self.assets.confirm, regions.confirm),
                ButtonKind::ConfirmBuy => (&self.assets.confirm_buy, regions.confirm_buy),
            };
            let hit = self.matcher.find_button(
                &frame,
                asset,
                threshold,
                Some(&region),
                (rect.left, rect.top),
                kind.name(),
            );
            if let Some(point) = hit {
                self.click_at(point)?;
                return Ok(true);
            }
            self.sleep(0.1);
        }

        let (ratio_x, ratio_y) = kind.fallback_ratio();
        let rect = self.window.rect()?;
        let point = Point {
            x: rect.left + (rect.width as f64 * ratio_x) as i32,
            y: rect.top + (rect.height as f64 * ratio_y) as i32,
        };
        crate::log(&format!(
            "No match for {} button, clicking fallback position",
            kind.name()
        ));
        self.click_at(point)?;
        Ok(false)
    }

    fn click_at(&mut self, point: Point) -> Result<()> {
        if self.token.is_cancelled() {
            return Ok(());
        }
        let (dx, dy) = input::jitter_offset(self.config.anti_detection.click_offset_max);
        self.pointer.move_to(point.x + dx, point.y + dy)?;
        self.pointer.click()?;
        if input::roll(self.config.anti_detection.double_click_chance) {
            self.sleep(0.05);
            self.pointer.click()?;
        }
        Ok(())
    }

    /// Drags the item list upward to reveal the lower shop slots.
    fn scroll_shop(&mut self) -> Result<()> {
        if self.token.is_cancelled() {
            return Ok(());
        }
        let rect = self.window.rect()?;
        let x = rect.left + (rect.width as f64 * self.config.scrolling.scroll_start_x_ratio) as i32;
        let y = rect.top + (rect.height as f64 * self.config.scrolling.scroll_start_y_ratio) as i32;
        let extra = input::uniform(
            self.config.anti_detection.scroll_random_extra_min,
            self.config.anti_detection.scroll_random_extra_max,
        );
        let distance =
            (rect.height as f64 * self.config.scrolling.scroll_ratio * (1.0 + extra)) as i32;

        self.pointer.move_to(x, y)?;
        self.sleep(0.1);
        self.pointer.button_down()?;
        self.sleep(0.1);
        self.pointer.move_to(x, y - distance)?;
        self.sleep(0.1);
        self.pointer.button_up()?;
        Ok(())
    }

    /// After the refresh confirm click, verifies the shop actually
    /// refreshed. A confirm button still on screen means a dialog is
    /// blocking; if dismissing it does not bring the shop back, the
    /// account is out of skystones.
    fn refresh_went_through(&mut self) -> Result<bool> {
        // A cancelled run reports success here; the next step() turns it
        // into a Cancelled stop instead of OutOfCurrency.
        if self.token.is_cancelled() {
            return Ok(true);
        }
        let (frame, rect) = self.take_screenshot(false)?;
        let regions = self.regions.regions(&rect);
        let hit = self.matcher.find_button(
            &frame,
            &self.assets.confirm,
            self.config.thresholds.button_match,
            Some(&regions.confirm),
            (rect.left, rect.top),
            "refresh confirm",
        );
        let Some(point) = hit else {
            return Ok(true);
        };
        crate::log("Confirm dialog still visible after refresh, re-checking");
        self.click_at(point)?;
        self.sleep(0.5);
        if self.token.is_cancelled() {
            return Ok(true);
        }
        let (frame, rect) = self.take_screenshot(false)?;
        let in_shop = self.is_in_shop(&frame, &rect);
        if !in_shop {
            crate::log("Shop did not come back after dismissing the dialog");
        }
        Ok(in_shop)
    }
}

/// Effective shop-presence threshold. 16:9 windows go through the
/// canonical resize, which softens the refresh button enough to need a
/// lower bar, floored at [`STANDARD_SHOP_FLOOR`].
fn shop_check_threshold(thresholds: &ThresholdConfig, aspect: AspectClass) -> f32 {
    if aspect == AspectClass::Standard {
        (thresholds.shop_check - thresholds.standard_shop_check_delta).max(STANDARD_SHOP_FLOOR)
    } else {
        thresholds.shop_check
    }
}
