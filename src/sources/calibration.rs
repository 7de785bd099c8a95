//! Reading a temperature anomaly off a seasonal forecast map.
//!
//! The forecast maps are color-coded PNGs. The color under a fixed probe pixel is translated into
//! a temperature anomaly through a color scale sampled from the map's own legend, with a fixed
//! reference scale as fallback. Zone borders are drawn in gray, so when the probe pixel is not on
//! the scale the surrounding pixels are searched outward along the four diagonals.

use crate::sources::error::SourceError;
use image::{ImageFormat, RgbaImage};
use log::debug;
use serde::Deserialize;
use std::collections::HashMap;

pub type Rgb = [u8; 3];

/// Anomalies of the legend swatches left of zero, in legend order.
pub const NEGATIVE_SWATCHES: [f64; 9] = [-3.5, -3.0, -2.5, -2.0, -1.5, -1.0, -0.5, -0.25, 0.0];
/// Anomalies of the legend swatches right of zero, in legend order.
pub const POSITIVE_SWATCHES: [f64; 8] = [0.25, 0.5, 1.0, 1.5, 2.0, 2.5, 3.0, 3.5];

/// Published color of each anomaly class.
pub const REFERENCE_COLORS: [(Rgb, f64); 17] = [
    ([0x00, 0x00, 0xb0], -3.5),
    ([0x00, 0x24, 0xe0], -3.0),
    ([0x00, 0x48, 0xff], -2.5),
    ([0x00, 0x6c, 0xff], -2.0),
    ([0x00, 0x90, 0xff], -1.5),
    ([0x00, 0xb4, 0xff], -1.0),
    ([0x00, 0xd8, 0xff], -0.5),
    ([0x00, 0xff, 0xff], -0.25),
    ([0xff, 0xff, 0xff], 0.0),
    ([0xff, 0xe0, 0xa8], 0.25),
    ([0xff, 0xc0, 0x90], 0.5),
    ([0xff, 0xa0, 0x78], 1.0),
    ([0xff, 0x80, 0x60], 1.5),
    ([0xff, 0x60, 0x48], 2.0),
    ([0xff, 0x40, 0x30], 2.5),
    ([0xe0, 0x20, 0x18], 3.0),
    ([0xb0, 0x00, 0x00], 3.5),
];

const DIAGONALS: [(i64, i64); 4] = [(1, 1), (1, -1), (-1, 1), (-1, -1)];

/// Pixel geometry of a forecast map.
///
/// The default matches the JRC European seasonal forecast maps with the probe on Helsinki.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MapLayout {
    pub width: u32,
    pub height: u32,
    pub probe_x: u32,
    pub probe_y: u32,
    /// Row crossing the middle of the legend swatches.
    pub calibration_row: u32,
    pub negative_start_col: u32,
    pub positive_start_col: u32,
    pub swatch_spacing: u32,
    /// How far (in pixels) to search around the probe for a known color.
    pub fuzz_radius: u32,
}

impl Default for MapLayout {
    fn default() -> Self {
        Self {
            width: 6260,
            height: 4810,
            probe_x: 3841,
            probe_y: 2117,
            calibration_row: 770,
            negative_start_col: 472,
            positive_start_col: 3522,
            swatch_spacing: 288,
            fuzz_radius: 20,
        }
    }
}

impl MapLayout {
    pub fn validate(&self) -> Result<(), String> {
        if self.probe_x >= self.width || self.probe_y >= self.height {
            return Err(format!(
                "anomaly_map probe ({}, {}) lies outside the {}x{} map",
                self.probe_x, self.probe_y, self.width, self.height
            ));
        }
        if self.calibration_row >= self.height {
            return Err(format!(
                "anomaly_map calibration_row {} lies outside the map",
                self.calibration_row
            ));
        }
        let last_negative = self.negative_start_col as u64
            + (NEGATIVE_SWATCHES.len() as u64 - 1) * self.swatch_spacing as u64;
        let last_positive = self.positive_start_col as u64
            + (POSITIVE_SWATCHES.len() as u64 - 1) * self.swatch_spacing as u64;
        if last_negative.max(last_positive) >= self.width as u64 {
            return Err("anomaly_map legend swatches extend past the map edge".to_string());
        }
        Ok(())
    }

    /// `(x, y, anomaly)` of every legend swatch.
    fn swatches(&self) -> impl Iterator<Item = (u32, u32, f64)> + '_ {
        let negatives = NEGATIVE_SWATCHES
            .iter()
            .enumerate()
            .map(|(i, t)| (self.negative_start_col + i as u32 * self.swatch_spacing, *t));
        let positives = POSITIVE_SWATCHES
            .iter()
            .enumerate()
            .map(|(i, t)| (self.positive_start_col + i as u32 * self.swatch_spacing, *t));
        negatives
            .chain(positives)
            .map(|(x, t)| (x, self.calibration_row, t))
    }

    /// Pixels visited when the probe color is unknown, nearest rows first.
    fn fuzz_offsets(&self) -> impl Iterator<Item = (i64, i64)> {
        let radius = self.fuzz_radius as i64;
        (1..=radius).flat_map(move |dy| {
            (0..=radius)
                .flat_map(move |dx| DIAGONALS.iter().map(move |(my, mx)| (my * dy, mx * dx)))
        })
    }
}

/// Color to anomaly lookup.
#[derive(Debug, Clone, Default)]
pub struct ColorScale {
    colors: HashMap<Rgb, f64>,
}

impl ColorScale {
    pub fn reference() -> Self {
        Self {
            colors: REFERENCE_COLORS.into_iter().collect(),
        }
    }

    /// Reads the swatch colors from the legend of `image`. A color seen twice keeps the later
    /// swatch's anomaly.
    pub fn sample(image: &RgbaImage, layout: &MapLayout) -> Self {
        let colors = layout
            .swatches()
            .filter_map(|(x, y, t)| pixel_rgb(image, x as i64, y as i64).map(|rgb| (rgb, t)))
            .collect();
        Self { colors }
    }

    pub fn lookup(&self, color: Rgb) -> Option<f64> {
        self.colors.get(&color).copied()
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}

fn pixel_rgb(image: &RgbaImage, x: i64, y: i64) -> Option<Rgb> {
    let x = u32::try_from(x).ok()?;
    let y = u32::try_from(y).ok()?;
    image
        .get_pixel_checked(x, y)
        .map(|p| [p.0[0], p.0[1], p.0[2]])
}

pub fn decode_map(bytes: &[u8], file: &str) -> Result<RgbaImage, SourceError> {
    image::load_from_memory_with_format(bytes, ImageFormat::Png)
        .map(|img| img.to_rgba8())
        .map_err(|e| SourceError::ImageDecode {
            file: file.to_string(),
            source: e,
        })
}

/// The anomaly under the probe pixel of `image`.
///
/// # Errors
///
/// [`SourceError::MapLayout`] when the map does not have the expected size, and
/// [`SourceError::Calibration`] when no pixel within the fuzz radius has a known color.
pub fn read_anomaly(image: &RgbaImage, layout: &MapLayout, file: &str) -> Result<f64, SourceError> {
    if image.dimensions() != (layout.width, layout.height) {
        return Err(SourceError::MapLayout {
            file: file.to_string(),
            expected_width: layout.width,
            expected_height: layout.height,
            found_width: image.width(),
            found_height: image.height(),
        });
    }

    let sampled = ColorScale::sample(image, layout);
    let reference = ColorScale::reference();
    let resolve = |rgb: Rgb| sampled.lookup(rgb).or_else(|| reference.lookup(rgb));

    let (px, py) = (layout.probe_x as i64, layout.probe_y as i64);
    let probe = pixel_rgb(image, px, py).unwrap_or_default();
    if let Some(value) = resolve(probe) {
        return Ok(value);
    }

    debug!("Probe color {:?} of {} is off the scale, searching nearby", probe, file);
    layout
        .fuzz_offsets()
        .filter_map(|(dy, dx)| pixel_rgb(image, px + dx, py + dy))
        .find_map(resolve)
        .ok_or_else(|| SourceError::Calibration {
            file: file.to_string(),
            color: probe,
        })
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_default_layout_is_valid() {
        assert_eq!(MapLayout::default().validate(), Ok(()));
        assert_eq!(small_layout().validate(), Ok(()));
    }

    #[test]
    fn test_layout_rejects_out_of_bounds_geometry() {
        let mut layout = small_layout();
        layout.probe_x = 40;
        assert!(layout.validate().is_err());

        let mut layout = small_layout();
        layout.swatch_spacing = 3;
        assert!(layout.validate().is_err());
    }

    #[test]
    fn test_probe_color_from_legend() {
        let layout = small_layout();
        let image = synthetic_map(&layout, [0xff, 0x80, 0x60]);
        assert_eq!(read_anomaly(&image, &layout, "map.png").unwrap(), 1.5);
    }

    #[test]
    fn test_sampled_legend_takes_precedence() {
        let layout = small_layout();
        // A renderer that shifts colors slightly: the legend shows the shifted color, and only the
        // sampled scale knows it.
        let shifted = [0xfe, 0x7f, 0x61];
        let mut image = synthetic_map(&layout, shifted);
        let (x, y, _) = layout.swatches().nth(12).unwrap();
        image.put_pixel(x, y, rgba(shifted));
        assert_eq!(read_anomaly(&image, &layout, "map.png").unwrap(), 1.5);
    }

    #[test]
    fn test_fuzz_search_finds_reference_color_near_border() {
        let layout = small_layout();
        let mut image = synthetic_map(&layout, BORDER);
        // -2.0 is not painted anywhere else, so it can only come from the fuzz search
        image.put_pixel(layout.probe_x - 2, layout.probe_y + 3, rgba([0x00, 0x6c, 0xff]));
        // Repaint the legend swatch so the reference table has to resolve it
        let (x, y, _) = layout.swatches().nth(3).unwrap();
        image.put_pixel(x, y, rgba([9, 9, 9]));
        assert_eq!(read_anomaly(&image, &layout, "map.png").unwrap(), -2.0);
    }

    #[test]
    fn test_unknown_color_is_a_calibration_error() {
        let layout = small_layout();
        let mut image = synthetic_map(&layout, [1, 2, 3]);
        // Fill the whole search area with the unknown color
        for y in 0..layout.height {
            for x in 0..layout.width {
                if y != layout.calibration_row {
                    image.put_pixel(x, y, rgba([1, 2, 3]));
                }
            }
        }
        match read_anomaly(&image, &layout, "map.png") {
            Err(SourceError::Calibration { file, color }) => {
                assert_eq!(file, "map.png");
                assert_eq!(color, [1, 2, 3]);
            }
            other => panic!("expected calibration error, got {other:?}"),
        }
    }

    #[test]
    fn test_resized_map_needs_recalibration() {
        let layout = small_layout();
        let image = RgbaImage::new(41, 30);
        assert!(matches!(
            read_anomaly(&image, &layout, "map.png"),
            Err(SourceError::MapLayout { found_width: 41, .. })
        ));
    }

    #[test]
    fn test_decode_png() {
        let layout = small_layout();
        let image = synthetic_map(&layout, [0xff, 0xff, 0xff]);
        let decoded = decode_map(&encode_png(&image), "map.png").unwrap();
        assert_eq!(decoded.dimensions(), (40, 30));
        assert_eq!(read_anomaly(&decoded, &layout, "map.png").unwrap(), 0.0);

        assert!(matches!(
            decode_map(b"not a png", "broken.png"),
            Err(SourceError::ImageDecode { .. })
        ));
    }
}
