//! 8-bit HSV conversion and band thresholding.
//!
//! Hue is stored halved (0..=179) so a full turn fits in a byte; saturation and
//! value span 0..=255. This is the layout most vision tooling uses for 8-bit
//! frames, so thresholds copied from such tooling apply unchanged.

use image::{Rgb, RgbImage};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Hsv {
    pub h: u8,
    pub s: u8,
    pub v: u8,
}

pub fn rgb_to_hsv(Rgb([r, g, b]): Rgb<u8>) -> Hsv {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = f32::from(max - min);

    let v = max;
    let s = if max == 0 {
        0
    } else {
        (delta * 255.0 / f32::from(max)).round() as u8
    };

    if delta == 0.0 {
        return Hsv { h: 0, s, v };
    }

    let (rf, gf, bf) = (f32::from(r), f32::from(g), f32::from(b));
    let mut degrees = if max == r {
        60.0 * (gf - bf) / delta
    } else if max == g {
        120.0 + 60.0 * (bf - rf) / delta
    } else {
        240.0 + 60.0 * (rf - gf) / delta
    };
    if degrees < 0.0 {
        degrees += 360.0;
    }
    let h = ((degrees / 2.0).round() as u16 % 180) as u8;
    Hsv { h, s, v }
}

/// Inclusive HSV band. Saturation and value have no upper cap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HsvBand {
    pub hue_min: u8,
    pub hue_max: u8,
    pub saturation_min: u8,
    pub value_min: u8,
}

impl HsvBand {
    /// Safety-helmet yellow.
    pub const YELLOW: HsvBand = HsvBand {
        hue_min: 20,
        hue_max: 30,
        saturation_min: 100,
        value_min: 100,
    };

    pub fn contains(&self, hsv: Hsv) -> bool {
        (self.hue_min..=self.hue_max).contains(&hsv.h)
            && hsv.s >= self.saturation_min
            && hsv.v >= self.value_min
    }
}

impl Default for HsvBand {
    fn default() -> Self {
        Self::YELLOW
    }
}

/// Binary pixel mask in row-major order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl Mask {
    pub fn from_band(frame: &RgbImage, band: HsvBand) -> Self {
        let bits = frame
            .pixels()
            .map(|px| band.contains(rgb_to_hsv(*px)))
            .collect();
        Self {
            width: frame.width(),
            height: frame.height(),
            bits,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        self.bits[(y as usize) * (self.width as usize) + x as usize]
    }

    pub fn count(&self) -> usize {
        self.bits.iter().filter(|bit| **bit).count()
    }

    #[cfg(test)]
    pub(crate) fn from_rows(rows: &[&str]) -> Self {
        let height = rows.len() as u32;
        let width = rows.first().map(|row| row.len()).unwrap_or(0) as u32;
        let bits = rows
            .iter()
            .flat_map(|row| row.chars().map(|c| c == '#'))
            .collect();
        Self {
            width,
            height,
            bits,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_colors_map_to_halved_hue() {
        assert_eq!(rgb_to_hsv(Rgb([255, 0, 0])), Hsv { h: 0, s: 255, v: 255 });
        assert_eq!(rgb_to_hsv(Rgb([0, 255, 0])), Hsv { h: 60, s: 255, v: 255 });
        assert_eq!(rgb_to_hsv(Rgb([0, 0, 255])), Hsv { h: 120, s: 255, v: 255 });
        assert_eq!(rgb_to_hsv(Rgb([255, 255, 0])), Hsv { h: 30, s: 255, v: 255 });
    }

    #[test]
    fn grays_have_no_hue_or_saturation() {
        assert_eq!(rgb_to_hsv(Rgb([0, 0, 0])), Hsv { h: 0, s: 0, v: 0 });
        assert_eq!(rgb_to_hsv(Rgb([128, 128, 128])), Hsv { h: 0, s: 0, v: 128 });
    }

    #[test]
    fn yellow_band_accepts_helmet_tones_only() {
        let band = HsvBand::YELLOW;
        assert!(band.contains(rgb_to_hsv(Rgb([255, 255, 0]))));
        // amber, hue ~45 degrees
        assert!(band.contains(rgb_to_hsv(Rgb([255, 191, 0]))));
        assert!(!band.contains(rgb_to_hsv(Rgb([255, 0, 0]))));
        assert!(!band.contains(rgb_to_hsv(Rgb([0, 0, 255]))));
        // washed out
        assert!(!band.contains(rgb_to_hsv(Rgb([255, 255, 200]))));
        // too dark
        assert!(!band.contains(rgb_to_hsv(Rgb([80, 80, 0]))));
    }

    #[test]
    fn mask_marks_band_pixels() {
        let mut frame = RgbImage::from_pixel(4, 2, Rgb([0, 0, 255]));
        frame.put_pixel(1, 0, Rgb([255, 255, 0]));
        frame.put_pixel(3, 1, Rgb([255, 255, 0]));
        let mask = Mask::from_band(&frame, HsvBand::YELLOW);
        assert_eq!(mask.count(), 2);
        assert!(mask.get(1, 0));
        assert!(mask.get(3, 1));
        assert!(!mask.get(0, 0));
        assert!(!mask.get(9, 9));
    }
}
