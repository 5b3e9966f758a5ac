//! Screen capture of the emulator window rectangle via GDI BitBlt.
//!
//! The screen device context is opened lazily on the first grab and held
//! for the lifetime of the run; the engine releases it on every
//! termination path so repeated runs never leak the handle.

use anyhow::{Result, anyhow};
use image::RgbaImage;

use windows::Win32::Graphics::Gdi::{
    BITMAPINFO, BITMAPINFOHEADER, BitBlt, CreateCompatibleBitmap, CreateCompatibleDC,
    DIB_RGB_COLORS, DeleteDC, DeleteObject, GetDC, GetDIBits, HDC, ReleaseDC, SRCCOPY,
    SelectObject,
};

use crate::capture::{ScreenCapture, WindowRect};

/// GDI-backed screen grabber.
pub struct GdiCapture {
    screen_dc: Option<HDC>,
}

// SAFETY: the device context is only ever used from the engine thread.
unsafe impl Send for GdiCapture {}

impl GdiCapture {
    pub fn new() -> Self {
        Self { screen_dc: None }
    }

    fn screen_dc(&mut self) -> HDC {
        *self.screen_dc.get_or_insert_with(|| unsafe { GetDC(None) })
    }
}

impl Default for GdiCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl ScreenCapture for GdiCapture {
    fn grab(&mut self, rect: WindowRect) -> Result<RgbaImage> {
        let (width, height) = (rect.width, rect.height);
        if width == 0 || height == 0 {
            return Err(anyhow!("Capture rectangle is empty ({}x{})", width, height));
        }

        let screen_dc = self.screen_dc();

        unsafe {
            let mem_dc = CreateCompatibleDC(screen_dc);
            if mem_dc.is_invalid() {
                return Err(anyhow!("CreateCompatibleDC failed"));
            }
            let bitmap = CreateCompatibleBitmap(screen_dc, width as i32, height as i32);
            if bitmap.is_invalid() {
                let _ = DeleteDC(mem_dc);
                return Err(anyhow!("CreateCompatibleBitmap failed"));
            }

            let old = SelectObject(mem_dc, bitmap);
            let blt = BitBlt(
                mem_dc,
                0,
                0,
                width as i32,
                height as i32,
                screen_dc,
                rect.left,
                rect.top,
                SRCCOPY,
            );

            let mut info = BITMAPINFO {
                bmiHeader: BITMAPINFOHEADER {
                    biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                    biWidth: width as i32,
                    // Negative height requests a top-down DIB.
                    biHeight: -(height as i32),
                    biPlanes: 1,
                    biBitCount: 32,
                    biCompression: 0,
                    ..Default::default()
                },
                ..Default::default()
            };
            let mut pixels = vec![0u8; (width * height * 4) as usize];
            let lines = GetDIBits(
                mem_dc,
                bitmap,
                0,
                height,
                Some(pixels.as_mut_ptr() as *mut _),
                &mut info,
                DIB_RGB_COLORS,
            );

            SelectObject(mem_dc, old);
            let _ = DeleteObject(bitmap);
            let _ = DeleteDC(mem_dc);

            blt?;
            if lines == 0 {
                return Err(anyhow!("GetDIBits returned no scanlines"));
            }

            // GDI hands back BGRA; swap to RGBA and force alpha opaque.
            for px in pixels.chunks_exact_mut(4) {
                px.swap(0, 2);
                px[3] = 255;
            }

            RgbaImage::from_raw(width, height, pixels)
                .ok_or_else(|| anyhow!("Captured buffer has unexpected length"))
        }
    }

    fn release(&mut self) {
        if let Some(dc) = self.screen_dc.take() {
            unsafe {
                let _ = ReleaseDC(None, dc);
            }
        }
    }
}

impl Drop for GdiCapture {
    fn drop(&mut self) {
        self.release();
    }
}
