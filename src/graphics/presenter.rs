use anyhow::{anyhow, Result};
use log::info;
use softbuffer::{Context, Surface};
use std::num::NonZeroU32;
use std::sync::Arc;
use tiny_skia::Pixmap;
use winit::window::Window;

/// Copies finished pixmaps onto the window through a CPU framebuffer.
pub struct Presenter {
    _context: Context<Arc<Window>>,
    surface: Surface<Arc<Window>, Arc<Window>>,
    size: (u32, u32),
}

impl Presenter {
    pub fn new(window: Arc<Window>) -> Result<Self> {
        let context = Context::new(window.clone()).map_err(|e| anyhow!("Failed to create display context: {}", e))?;
        let surface =
            Surface::new(&context, window.clone()).map_err(|e| anyhow!("Failed to create surface: {}", e))?;

        let size = window.inner_size();
        let mut presenter = Self {
            _context: context,
            surface,
            size: (0, 0),
        };
        presenter.resize(size.width, size.height)?;
        info!("✅ Presenter initialized at {}x{}", size.width, size.height);
        Ok(presenter)
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        let (Some(w), Some(h)) = (NonZeroU32::new(width), NonZeroU32::new(height)) else {
            return Ok(());
        };
        self.surface
            .resize(w, h)
            .map_err(|e| anyhow!("Failed to resize surface: {}", e))?;
        self.size = (width, height);
        Ok(())
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn present(&mut self, pixmap: &Pixmap) -> Result<()> {
        if self.size.0 == 0 || self.size.1 == 0 {
            return Ok(());
        }
        let mut buffer = self
            .surface
            .buffer_mut()
            .map_err(|e| anyhow!("Failed to acquire frame buffer: {}", e))?;
        copy_to_framebuffer(pixmap, &mut buffer, self.size.0, self.size.1);
        buffer.present().map_err(|e| anyhow!("Failed to present frame: {}", e))?;
        Ok(())
    }
}

/// Writes premultiplied RGBA as `0RGB`, cropping or padding with black when sizes differ.
pub fn copy_to_framebuffer(pixmap: &Pixmap, dst: &mut [u32], width: u32, height: u32) {
    let src = pixmap.data();
    let (pw, ph) = (pixmap.width(), pixmap.height());
    for y in 0..height {
        for x in 0..width {
            let out = (y * width + x) as usize;
            if out >= dst.len() {
                return;
            }
            dst[out] = if x < pw && y < ph {
                let i = ((y * pw + x) * 4) as usize;
                (src[i] as u32) << 16 | (src[i + 1] as u32) << 8 | src[i + 2] as u32
            } else {
                0
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiny_skia::Color;

    #[test]
    fn test_framebuffer_packing_and_padding() {
        let mut pixmap = Pixmap::new(1, 1).unwrap();
        pixmap.fill(Color::from_rgba8(0x12, 0x34, 0x56, 255));
        let mut dst = vec![0xffff_ffff; 4];
        copy_to_framebuffer(&pixmap, &mut dst, 2, 2);
        assert_eq!(dst, vec![0x0012_3456, 0, 0, 0]);
    }
}
