//! Pixel formats understood by the tile subsystem.

/// Channel layout of a drawable's pixels.
///
/// Alpha, when present, is always the last channel of a pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// One gray channel
    Gray,
    /// Gray plus alpha
    GrayAlpha,
    /// Red, green, blue
    Rgb,
    /// Red, green, blue plus alpha
    RgbAlpha,
}

impl PixelFormat {
    /// Number of bytes (channels) per pixel
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Gray => 1,
            PixelFormat::GrayAlpha => 2,
            PixelFormat::Rgb => 3,
            PixelFormat::RgbAlpha => 4,
        }
    }

    /// Returns true if the last channel of each pixel is alpha
    pub const fn has_alpha(self) -> bool {
        matches!(self, PixelFormat::GrayAlpha | PixelFormat::RgbAlpha)
    }

    /// Byte offset of the alpha channel within a pixel, if any
    pub const fn alpha_index(self) -> Option<usize> {
        if self.has_alpha() {
            Some(self.bytes_per_pixel() - 1)
        } else {
            None
        }
    }

    /// Number of non-alpha channels
    pub const fn color_channels(self) -> usize {
        if self.has_alpha() {
            self.bytes_per_pixel() - 1
        } else {
            self.bytes_per_pixel()
        }
    }

    /// Maps a bytes-per-pixel count to its format.
    pub fn from_bytes_per_pixel(bpp: usize) -> Option<Self> {
        match bpp {
            1 => Some(PixelFormat::Gray),
            2 => Some(PixelFormat::GrayAlpha),
            3 => Some(PixelFormat::Rgb),
            4 => Some(PixelFormat::RgbAlpha),
            _ => None,
        }
    }
}
