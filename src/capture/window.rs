//! Win32 window collaborator: title-based lookup and live geometry polling.

use anyhow::{Result, anyhow};
use std::ffi::OsString;
use std::os::windows::ffi::OsStringExt;

use windows::Win32::Foundation::{BOOL, HWND, LPARAM, RECT, TRUE};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetWindowRect, GetWindowTextLengthW, GetWindowTextW, IsIconic, IsWindow,
    IsWindowVisible, SW_RESTORE, SWP_NOMOVE, SWP_NOSIZE, SWP_NOZORDER, SetForegroundWindow,
    SetWindowPos, ShowWindow,
};

use crate::capture::{GameWindow, WindowRect};

fn window_text(hwnd: HWND) -> String {
    unsafe {
        let len = GetWindowTextLengthW(hwnd);
        if len <= 0 {
            return String::new();
        }
        let mut buf: Vec<u16> = vec![0; (len + 1) as usize];
        GetWindowTextW(hwnd, &mut buf);
        OsString::from_wide(&buf[..len as usize])
            .to_string_lossy()
            .to_string()
    }
}

/// Lists the titles of all visible top-level windows.
pub fn list_window_titles() -> Vec<String> {
    struct EnumData {
        titles: Vec<String>,
    }

    unsafe extern "system" fn enum_callback(hwnd: HWND, lparam: LPARAM) -> BOOL {
        unsafe {
            let data = &mut *(lparam.0 as *mut EnumData);
            if !IsWindowVisible(hwnd).as_bool() {
                return TRUE;
            }
            let title = window_text(hwnd);
            if !title.is_empty() {
                data.titles.push(title);
            }
            TRUE
        }
    }

    let mut data = EnumData { titles: Vec::new() };
    unsafe {
        let _ = EnumWindows(Some(enum_callback), LPARAM(&mut data as *mut _ as isize));
    }
    data.titles
}

/// Finds the first visible top-level window whose title matches exactly.
pub fn find_window_by_title(title: &str) -> Result<Win32Window> {
    struct EnumData {
        target: String,
        hwnd: Option<HWND>,
    }

    unsafe extern "system" fn enum_callback(hwnd: HWND, lparam: LPARAM) -> BOOL {
        unsafe {
            let data = &mut *(lparam.0 as *mut EnumData);
            if !IsWindowVisible(hwnd).as_bool() {
                return TRUE;
            }
            if window_text(hwnd) == data.target {
                data.hwnd = Some(hwnd);
                return BOOL(0); // Stop enumeration
            }
            TRUE
        }
    }

    let mut data = EnumData {
        target: title.to_string(),
        hwnd: None,
    };
    unsafe {
        // EnumWindows returns FALSE when the callback stops it early,
        // which is expected here, not an error.
        let _ = EnumWindows(Some(enum_callback), LPARAM(&mut data as *mut _ as isize));
    }

    data.hwnd
        .map(|hwnd| Win32Window { hwnd })
        .ok_or_else(|| anyhow!("No window titled \"{}\". Is the emulator running?", title))
}

/// A tracked emulator window backed by a Win32 handle.
pub struct Win32Window {
    hwnd: HWND,
}

// SAFETY: HWND is just a pointer-sized handle; Windows window handles are
// valid across threads.
unsafe impl Send for Win32Window {}

impl Win32Window {
    fn ensure_valid(&self) -> Result<()> {
        if unsafe { IsWindow(self.hwnd) }.as_bool() {
            Ok(())
        } else {
            Err(anyhow!("Window no longer exists"))
        }
    }
}

impl GameWindow for Win32Window {
    fn rect(&mut self) -> Result<WindowRect> {
        self.ensure_valid()?;
        let mut rect = RECT::default();
        unsafe { GetWindowRect(self.hwnd, &mut rect)? };
        Ok(WindowRect {
            left: rect.left,
            top: rect.top,
            width: (rect.right - rect.left).max(0) as u32,
            height: (rect.bottom - rect.top).max(0) as u32,
        })
    }

    fn title(&mut self) -> Result<String> {
        self.ensure_valid()?;
        Ok(window_text(self.hwnd))
    }

    fn is_minimized(&mut self) -> Result<bool> {
        self.ensure_valid()?;
        Ok(unsafe { IsIconic(self.hwnd) }.as_bool())
    }

    fn restore(&mut self) -> Result<()> {
        self.ensure_valid()?;
        unsafe {
            let _ = ShowWindow(self.hwnd, SW_RESTORE);
        }
        Ok(())
    }

    fn activate(&mut self) -> Result<()> {
        self.ensure_valid()?;
        if unsafe { SetForegroundWindow(self.hwnd) }.as_bool() {
            Ok(())
        } else {
            Err(anyhow!("SetForegroundWindow failed"))
        }
    }

    fn move_to(&mut self, x: i32, y: i32) -> Result<()> {
        self.ensure_valid()?;
        unsafe { SetWindowPos(self.hwnd, None, x, y, 0, 0, SWP_NOSIZE | SWP_NOZORDER)? };
        Ok(())
    }

    fn resize_to(&mut self, width: u32, height: u32) -> Result<()> {
        self.ensure_valid()?;
        unsafe {
            SetWindowPos(
                self.hwnd,
                None,
                0,
                0,
                width as i32,
                height as i32,
                SWP_NOMOVE | SWP_NOZORDER,
            )?
        };
        Ok(())
    }
}
