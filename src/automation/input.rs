//! Mouse input abstraction.

use anyhow::Result;
use rand::Rng;

/// Mouse driver. Coordinates are absolute screen coordinates.
pub trait Pointer {
    fn move_to(&mut self, x: i32, y: i32) -> Result<()>;
    fn button_down(&mut self) -> Result<()>;
    fn button_up(&mut self) -> Result<()>;

    fn click(&mut self) -> Result<()> {
        self.button_down()?;
        self.button_up()
    }
}

/// Random per-click offset in `[-max, max]` on each axis.
pub fn jitter_offset(max: i32) -> (i32, i32) {
    if max <= 0 {
        return (0, 0);
    }
    let mut rng = rand::thread_rng();
    (rng.gen_range(-max..=max), rng.gen_range(-max..=max))
}

/// True with probability `chance`.
pub fn roll(chance: f64) -> bool {
    if chance <= 0.0 {
        return false;
    }
    rand::thread_rng().gen_bool(chance.min(1.0))
}

/// Uniform sample from `[min, max]`, tolerating a degenerate range.
pub fn uniform(min: f64, max: f64) -> f64 {
    if max <= min {
        return min;
    }
    rand::thread_rng().gen_range(min..=max)
}

#[cfg(windows)]
mod send_input {
    use super::Pointer;
    use anyhow::{bail, Result};
    use windows::Win32::UI::Input::KeyboardAndMouse::{
        SendInput, INPUT, INPUT_0, INPUT_MOUSE, MOUSEEVENTF_ABSOLUTE, MOUSEEVENTF_LEFTDOWN,
        MOUSEEVENTF_LEFTUP, MOUSEEVENTF_MOVE, MOUSEINPUT,
    };
    use windows::Win32::UI::WindowsAndMessaging::{GetSystemMetrics, SM_CXSCREEN, SM_CYSCREEN};

    /// Mouse driver backed by SendInput.
    pub struct SystemPointer;

    impl SystemPointer {
        pub fn new() -> Self {
            Self
        }

        fn send(&self, flags: windows::Win32::UI::Input::KeyboardAndMouse::MOUSE_EVENT_FLAGS, dx: i32, dy: i32) -> Result<()> {
            let input = INPUT {
                r#type: INPUT_MOUSE,
                Anonymous: INPUT_0 {
                    mi: MOUSEINPUT {
                        dx,
                        dy,
                        mouseData: 0,
                        dwFlags: flags,
                        time: 0,
                        dwExtraInfo: 0,
                    },
                },
            };
            let sent = unsafe { SendInput(&[input], std::mem::size_of::<INPUT>() as i32) };
            if sent != 1 {
                bail!("SendInput failed");
            }
            Ok(())
        }
    }

    impl Pointer for SystemPointer {
        fn move_to(&mut self, x: i32, y: i32) -> Result<()> {
            let screen_w = unsafe { GetSystemMetrics(SM_CXSCREEN) }.max(1);
            let screen_h = unsafe { GetSystemMetrics(SM_CYSCREEN) }.max(1);
            // Absolute coordinates are normalized to a 0..65535 grid.
            let nx = x * 65535 / screen_w;
            let ny = y * 65535 / screen_h;
            self.send(MOUSEEVENTF_MOVE | MOUSEEVENTF_ABSOLUTE, nx, ny)
        }

        fn button_down(&mut self) -> Result<()> {
            self.send(MOUSEEVENTF_LEFTDOWN, 0, 0)
        }

        fn button_up(&mut self) -> Result<()> {
            self.send(MOUSEEVENTF_LEFTUP, 0, 0)
        }
    }
}

#[cfg(windows)]
pub use send_input::SystemPointer;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jitter_offset_within_bounds() {
        for _ in 0..200 {
            let (dx, dy) = jitter_offset(10);
            assert!((-10..=10).contains(&dx));
            assert!((-10..=10).contains(&dy));
        }
    }

    #[test]
    fn test_jitter_offset_zero_max() {
        assert_eq!(jitter_offset(0), (0, 0));
    }

    #[test]
    fn test_roll_extremes() {
        assert!(!roll(0.0));
        assert!(roll(1.0));
    }

    #[test]
    fn test_uniform_degenerate_range() {
        assert_eq!(uniform(0.3, 0.3), 0.3);
        let v = uniform(0.0, 0.15);
        assert!((0.0..=0.15).contains(&v));
    }
}
