//! Palette quantization for 8-bit indexed intermediates.
//!
//! The raw bitmap compiler consumes 8-bit indexed BMP files. Palette index 0
//! is always the transparent key color; the remaining 255 entries hold the
//! image's quantized colors in first-seen order. Images with more distinct
//! colors are reduced with a median cut.

use crate::color::{quantize, transparent_key, GbaColor};
use image::codecs::bmp::BmpEncoder;
use image::{ColorType, ImageResult, RgbaImage};
use std::collections::HashMap;
use std::io::Write;

/// Number of palette slots available for opaque colors.
pub const MAX_OPAQUE_COLORS: usize = 255;

/// An image stored as palette indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedImage {
    pub width: u32,
    pub height: u32,
    /// Palette in quantized colors; entry 0 is the transparent key
    pub palette: Vec<GbaColor>,
    /// One palette index per pixel, row-major
    pub indices: Vec<u8>,
}

impl IndexedImage {
    /// Quantize and index an RGBA image.
    pub fn from_rgba(image: &RgbaImage) -> Self {
        let key = transparent_key();
        let pixels: Vec<GbaColor> = image.pixels().map(|p| quantize(*p)).collect();

        let mut counts: HashMap<GbaColor, u32> = HashMap::new();
        let mut order: Vec<GbaColor> = Vec::new();
        for &c in &pixels {
            if c == key {
                continue;
            }
            let count = counts.entry(c).or_insert(0);
            if *count == 0 {
                order.push(c);
            }
            *count += 1;
        }

        let mut palette = vec![key];
        if order.len() <= MAX_OPAQUE_COLORS {
            palette.extend(order);
        } else {
            let weighted: Vec<(GbaColor, u32)> = order.iter().map(|c| (*c, counts[c])).collect();
            palette.extend(median_cut(weighted, MAX_OPAQUE_COLORS));
        }

        let lookup: HashMap<GbaColor, u8> =
            palette.iter().enumerate().map(|(i, c)| (*c, i as u8)).collect();
        let indices = pixels
            .iter()
            .map(|c| match lookup.get(c) {
                Some(&idx) => idx,
                None => closest_opaque(*c, &palette),
            })
            .collect();

        Self { width: image.width(), height: image.height(), palette, indices }
    }

    /// Palette as 8-bit RGB triples for the BMP color table.
    pub fn rgb_palette(&self) -> Vec<[u8; 3]> {
        self.palette
            .iter()
            .map(|c| {
                let px = c.to_rgba8();
                [px[0], px[1], px[2]]
            })
            .collect()
    }

    /// Encode as an 8-bit indexed BMP.
    pub fn write_bmp<W: Write>(&self, writer: &mut W) -> ImageResult<()> {
        let palette = self.rgb_palette();
        let mut encoder = BmpEncoder::new(writer);
        encoder.encode_with_palette(
            &self.indices,
            self.width,
            self.height,
            ColorType::L8,
            Some(palette.as_slice()),
        )
    }
}

/// Index of the nearest non-key palette entry.
fn closest_opaque(color: GbaColor, palette: &[GbaColor]) -> u8 {
    palette
        .iter()
        .enumerate()
        .skip(1)
        .min_by_key(|(_, p)| distance(color, **p))
        .map(|(i, _)| i as u8)
        .unwrap_or(0)
}

fn distance(a: GbaColor, b: GbaColor) -> u32 {
    let dr = a.r as i32 - b.r as i32;
    let dg = a.g as i32 - b.g as i32;
    let db = a.b as i32 - b.b as i32;
    (dr * dr + dg * dg + db * db) as u32
}

#[derive(Debug, Clone, Copy)]
enum Channel {
    Red,
    Green,
    Blue,
}

/// A box of colors for the median cut.
#[derive(Debug, Clone)]
struct ColorBox {
    colors: Vec<(GbaColor, u32)>,
}

impl ColorBox {
    fn widest_channel(&self) -> Channel {
        let range = |f: fn(&GbaColor) -> u8| {
            let min = self.colors.iter().map(|(c, _)| f(c)).min().unwrap_or(0);
            let max = self.colors.iter().map(|(c, _)| f(c)).max().unwrap_or(0);
            max - min
        };
        let (r, g, b) = (range(|c| c.r), range(|c| c.g), range(|c| c.b));

        if r >= g && r >= b {
            Channel::Red
        } else if g >= b {
            Channel::Green
        } else {
            Channel::Blue
        }
    }

    /// Split along the widest channel at the pixel-weighted median.
    fn split(mut self) -> (ColorBox, ColorBox) {
        let channel = self.widest_channel();
        self.colors.sort_by_key(|(c, _)| match channel {
            Channel::Red => (c.r, c.g, c.b),
            Channel::Green => (c.g, c.r, c.b),
            Channel::Blue => (c.b, c.r, c.g),
        });

        let total: u32 = self.pixel_count();
        let mut running = 0u32;
        let mut split_idx = self.colors.len() / 2;
        for (i, (_, count)) in self.colors.iter().enumerate() {
            running += count;
            if running >= total / 2 {
                split_idx = i + 1;
                break;
            }
        }

        // Ensure we don't create empty boxes
        split_idx = split_idx.max(1).min(self.colors.len() - 1);

        let right = self.colors.split_off(split_idx);
        (ColorBox { colors: self.colors }, ColorBox { colors: right })
    }

    fn average_color(&self) -> GbaColor {
        let total: u64 = self.colors.iter().map(|(_, n)| *n as u64).sum::<u64>().max(1);
        let avg = |f: fn(&GbaColor) -> u8| {
            (self.colors.iter().map(|(c, n)| f(c) as u64 * *n as u64).sum::<u64>() / total) as u8
        };
        GbaColor::new(avg(|c| c.r), avg(|c| c.g), avg(|c| c.b))
    }

    fn pixel_count(&self) -> u32 {
        self.colors.iter().map(|(_, n)| n).sum()
    }
}

/// Reduce weighted colors to at most `max_colors` representatives.
fn median_cut(colors: Vec<(GbaColor, u32)>, max_colors: usize) -> Vec<GbaColor> {
    let mut boxes = vec![ColorBox { colors }];

    while boxes.len() < max_colors {
        let Some((idx, _)) = boxes
            .iter()
            .enumerate()
            .filter(|(_, b)| b.colors.len() > 1)
            .max_by_key(|(_, b)| b.pixel_count())
        else {
            break;
        };

        let (left, right) = boxes.remove(idx).split();
        boxes.push(left);
        boxes.push(right);
    }

    let key = transparent_key();
    let mut result: Vec<GbaColor> = Vec::with_capacity(boxes.len());
    for color in boxes.iter().map(ColorBox::average_color) {
        // Averages can coincide with the key or each other; keep entries unique
        if color != key && !result.contains(&color) {
            result.push(color);
        }
    }
    result
}
