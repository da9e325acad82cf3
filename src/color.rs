//! GBA color quantization
//!
//! The GBA stores colors as 15-bit BGR555 values: five bits per channel and
//! no alpha. Transparency is expressed with a reserved key color instead, so
//! fully transparent source pixels are replaced by [`TRANSPARENT_KEY`] before
//! quantization.
//!
//! Decoders used by this crate produce straight (non-premultiplied) 8-bit
//! RGBA, and a pixel counts as transparent when its alpha equals
//! [`TRANSPARENT_ALPHA`].

use image::{Rgba, RgbaImage};

/// Reserved RGB substituted for fully transparent pixels.
pub const TRANSPARENT_KEY: Rgba<u8> = Rgba([255, 0, 246, 255]);

/// Alpha value treated as "fully transparent".
pub const TRANSPARENT_ALPHA: u8 = 0;

/// Maximum value of a 5-bit channel.
pub const CHANNEL_MAX: u8 = 31;

/// A color in the GBA's reduced color space, each channel in `0..=31`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GbaColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl GbaColor {
    /// Create a color from 5-bit channels, masking anything above bit 4.
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r: r & CHANNEL_MAX, g: g & CHANNEL_MAX, b: b & CHANNEL_MAX }
    }

    /// Reduce an 8-bit channel triple by flooring each channel to 5 bits.
    pub const fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self { r: r / 8, g: g / 8, b: b / 8 }
    }

    /// Expand back to an opaque 8-bit pixel for writing intermediate rasters.
    ///
    /// Each channel is shifted left by three, so `from_rgb8` applied to the
    /// result returns the same color.
    pub fn to_rgba8(self) -> Rgba<u8> {
        Rgba([self.r << 3, self.g << 3, self.b << 3, 255])
    }
}

/// The quantized value of [`TRANSPARENT_KEY`].
pub fn transparent_key() -> GbaColor {
    GbaColor::from_rgb8(TRANSPARENT_KEY[0], TRANSPARENT_KEY[1], TRANSPARENT_KEY[2])
}

/// Quantize a single straight-alpha RGBA pixel.
pub fn quantize(pixel: Rgba<u8>) -> GbaColor {
    let [r, g, b, a] = pixel.0;
    if a == TRANSPARENT_ALPHA {
        transparent_key()
    } else {
        GbaColor::from_rgb8(r, g, b)
    }
}

/// Quantize every pixel of `image` into a new, fully opaque image.
///
/// The input is left untouched and the output has identical dimensions.
pub fn convert_image(image: &RgbaImage) -> RgbaImage {
    RgbaImage::from_fn(image.width(), image.height(), |x, y| {
        quantize(*image.get_pixel(x, y)).to_rgba8()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_white_maps_to_channel_max() {
        let c = quantize(Rgba([255, 255, 255, 255]));
        assert_eq!(c, GbaColor::new(31, 31, 31));
    }

    #[test]
    fn test_channels_floor_divide_by_eight() {
        assert_eq!(quantize(Rgba([7, 8, 15, 255])), GbaColor::new(0, 1, 1));
        assert_eq!(quantize(Rgba([16, 247, 248, 255])), GbaColor::new(2, 30, 31));
    }

    #[test]
    fn test_alpha_at_threshold_uses_sentinel() {
        let c = quantize(Rgba([12, 200, 40, TRANSPARENT_ALPHA]));
        assert_eq!(c, GbaColor::new(31, 0, 30));
        assert_eq!(c, transparent_key());
    }

    #[test]
    fn test_alpha_above_threshold_keeps_color() {
        // Nearly transparent is still a real color
        assert_eq!(quantize(Rgba([12, 200, 40, 1])), GbaColor::new(1, 25, 5));
        assert_eq!(quantize(Rgba([12, 200, 40, 128])), GbaColor::new(1, 25, 5));
        assert_eq!(quantize(Rgba([12, 200, 40, 255])), GbaColor::new(1, 25, 5));
    }

    #[test]
    fn test_only_threshold_alpha_uses_sentinel() {
        // Sweeps every straight alpha value on both sides of the threshold
        let color = GbaColor::new(1, 25, 5);
        for alpha in u8::MIN..=u8::MAX {
            let expected = if alpha == TRANSPARENT_ALPHA { transparent_key() } else { color };
            assert_eq!(quantize(Rgba([12, 200, 40, alpha])), expected, "alpha {}", alpha);
        }
    }

    #[test]
    fn test_sentinel_survives_quantization() {
        assert_eq!(quantize(TRANSPARENT_KEY), transparent_key());
    }

    #[test]
    fn test_to_rgba8_is_opaque_and_stable() {
        let c = GbaColor::new(31, 16, 1);
        let px = c.to_rgba8();
        assert_eq!(px, Rgba([248, 128, 8, 255]));
        assert_eq!(quantize(px), c);
    }

    #[test]
    fn test_convert_image_is_pure() {
        let mut input = RgbaImage::new(2, 1);
        input.put_pixel(0, 0, Rgba([255, 255, 255, 255]));
        input.put_pixel(1, 0, Rgba([0, 0, 0, 0]));
        let before = input.clone();

        let out = convert_image(&input);

        assert_eq!(input, before);
        assert_eq!(out.dimensions(), (2, 1));
        assert_eq!(*out.get_pixel(0, 0), Rgba([248, 248, 248, 255]));
        assert_eq!(*out.get_pixel(1, 0), transparent_key().to_rgba8());
        assert_eq!(convert_image(&input), out);
    }
}
