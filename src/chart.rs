//! Chart rendering for the report menu.
//!
//! Charts are drawn straight into an RGB buffer and encoded as PNG. The only
//! text on a chart is numbers, which a tiny built-in 3x5 digit font covers.

use std::fmt;
use std::io::Cursor;
use std::str::FromStr;

use image::{ImageFormat, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Manufacturer;

pub const WIDTH: u32 = 800;
pub const HEIGHT: u32 = 500;

const MARGIN_LEFT: u32 = 60;
const MARGIN_RIGHT: u32 = 20;
const MARGIN_TOP: u32 = 30;
const MARGIN_BOTTOM: u32 = 40;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([60, 60, 60]);
const INK: Rgb<u8> = Rgb([20, 20, 20]);

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("nothing to chart: the document has no manufacturers")]
    EmptyDataset,

    #[error("unknown chart type '{0}' (expected revenue_bar, founded_bar, product_pie or revenue_line)")]
    UnknownChartType(String),

    #[error("unknown color scheme '{0}' (expected classic, pastel or grayscale)")]
    UnknownColorScheme(String),

    #[error("failed to encode chart image")]
    Encode(#[from] image::ImageError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartType {
    /// Revenue per manufacturer.
    #[default]
    RevenueBar,
    /// Founding year per manufacturer.
    FoundedBar,
    /// Share of manufacturers per product type.
    ProductPie,
    /// Revenue per manufacturer as a line.
    RevenueLine,
}

impl ChartType {
    pub const ALL: [ChartType; 4] = [
        ChartType::RevenueBar,
        ChartType::FoundedBar,
        ChartType::ProductPie,
        ChartType::RevenueLine,
    ];

    pub fn key(self) -> &'static str {
        match self {
            ChartType::RevenueBar => "revenue_bar",
            ChartType::FoundedBar => "founded_bar",
            ChartType::ProductPie => "product_pie",
            ChartType::RevenueLine => "revenue_line",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ChartType::RevenueBar => "Revenue (bar)",
            ChartType::FoundedBar => "Founded year (bar)",
            ChartType::ProductPie => "Product types (pie)",
            ChartType::RevenueLine => "Revenue (line)",
        }
    }
}

impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for ChartType {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        ChartType::ALL
            .into_iter()
            .find(|kind| kind.key() == key)
            .ok_or_else(|| ChartError::UnknownChartType(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorScheme {
    #[default]
    Classic,
    Pastel,
    Grayscale,
}

impl ColorScheme {
    pub const ALL: [ColorScheme; 3] = [
        ColorScheme::Classic,
        ColorScheme::Pastel,
        ColorScheme::Grayscale,
    ];

    pub fn key(self) -> &'static str {
        match self {
            ColorScheme::Classic => "classic",
            ColorScheme::Pastel => "pastel",
            ColorScheme::Grayscale => "grayscale",
        }
    }

    fn palette(self) -> &'static [[u8; 3]] {
        match self {
            ColorScheme::Classic => &[
                [31, 119, 180],
                [255, 127, 14],
                [44, 160, 44],
                [214, 39, 40],
                [148, 103, 189],
                [140, 86, 75],
            ],
            ColorScheme::Pastel => &[
                [174, 199, 232],
                [255, 187, 120],
                [152, 223, 138],
                [255, 152, 150],
                [197, 176, 213],
                [196, 156, 148],
            ],
            ColorScheme::Grayscale => &[
                [40, 40, 40],
                [90, 90, 90],
                [130, 130, 130],
                [170, 170, 170],
                [60, 60, 60],
                [110, 110, 110],
            ],
        }
    }

    fn color(self, index: usize) -> Rgb<u8> {
        let palette = self.palette();
        Rgb(palette[index % palette.len()])
    }
}

impl FromStr for ColorScheme {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        ColorScheme::ALL
            .into_iter()
            .find(|scheme| scheme.key() == key)
            .ok_or_else(|| ChartError::UnknownColorScheme(s.to_string()))
    }
}

/// Everything the chart dialog lets the user pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartConfig {
    pub chart_type: ChartType,
    pub color_scheme: ColorScheme,
    /// Print the value above each bar/point, or percentages for pies.
    pub show_values: bool,
    /// Plot largest values first.
    pub sort_data: bool,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            chart_type: ChartType::RevenueBar,
            color_scheme: ColorScheme::Classic,
            show_values: true,
            sort_data: false,
        }
    }
}

/// One plotted value.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint {
    pub label: String,
    pub value: f64,
}

/// Values a chart of `config.chart_type` plots, in plotting order.
pub fn series(records: &[Manufacturer], config: &ChartConfig) -> Vec<DataPoint> {
    let mut points: Vec<DataPoint> = match config.chart_type {
        ChartType::RevenueBar | ChartType::RevenueLine => records
            .iter()
            .map(|m| DataPoint {
                label: m.name.clone(),
                value: m.revenue,
            })
            .collect(),
        ChartType::FoundedBar => records
            .iter()
            .map(|m| DataPoint {
                label: m.name.clone(),
                value: f64::from(m.founded_year),
            })
            .collect(),
        ChartType::ProductPie => {
            let mut counts: Vec<DataPoint> = Vec::new();
            for m in records {
                let kind = match m.product_type.trim() {
                    "" => "Other",
                    kind => kind,
                };
                match counts.iter_mut().find(|p| p.label.eq_ignore_ascii_case(kind)) {
                    Some(point) => point.value += 1.0,
                    None => counts.push(DataPoint {
                        label: kind.to_string(),
                        value: 1.0,
                    }),
                }
            }
            counts
        }
    };
    if config.sort_data {
        points.sort_by(|a, b| b.value.total_cmp(&a.value));
    }
    points
}

/// Render `records` as a PNG according to `config`.
pub fn generate(records: &[Manufacturer], config: &ChartConfig) -> Result<Vec<u8>, ChartError> {
    if records.is_empty() {
        return Err(ChartError::EmptyDataset);
    }
    let points = series(records, config);
    let mut img = RgbImage::from_pixel(WIDTH, HEIGHT, BACKGROUND);

    match config.chart_type {
        ChartType::RevenueBar => draw_bars(&mut img, &points, config, 0.0, 2),
        ChartType::FoundedBar => {
            let min = points.iter().map(|p| p.value).fold(f64::INFINITY, f64::min);
            let baseline = ((min / 10.0).floor() * 10.0 - 10.0).max(0.0);
            draw_bars(&mut img, &points, config, baseline, 0);
        }
        ChartType::RevenueLine => draw_line_chart(&mut img, &points, config),
        ChartType::ProductPie => draw_pie(&mut img, &points, config),
    }

    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    tracing::debug!(chart = %config.chart_type, points = points.len(), "rendered chart");
    Ok(bytes)
}

struct PlotArea {
    left: u32,
    top: u32,
    width: u32,
    height: u32,
}

impl PlotArea {
    fn new() -> Self {
        Self {
            left: MARGIN_LEFT,
            top: MARGIN_TOP,
            width: WIDTH - MARGIN_LEFT - MARGIN_RIGHT,
            height: HEIGHT - MARGIN_TOP - MARGIN_BOTTOM,
        }
    }

    fn bottom(&self) -> u32 {
        self.top + self.height
    }

    fn draw_axes(&self, img: &mut RgbImage) {
        fill_rect(img, self.left, self.top, 2, self.height, AXIS);
        fill_rect(img, self.left, self.bottom(), self.width, 2, AXIS);
    }

    /// Pixel height for `value` on a scale from `baseline` to `max`.
    fn scale(&self, value: f64, baseline: f64, max: f64) -> u32 {
        if max <= baseline {
            return 0;
        }
        let ratio = ((value - baseline) / (max - baseline)).clamp(0.0, 1.0);
        (ratio * f64::from(self.height - 12)) as u32
    }
}

fn draw_bars(img: &mut RgbImage, points: &[DataPoint], config: &ChartConfig, baseline: f64, decimals: usize) {
    let area = PlotArea::new();
    area.draw_axes(img);
    let max = points.iter().map(|p| p.value).fold(0.0, f64::max);
    let slot = (area.width / points.len() as u32).max(1);
    let bar_width = (slot * 7 / 10).max(1);

    for (i, point) in points.iter().enumerate() {
        let height = area.scale(point.value, baseline, max);
        let x = area.left + 2 + i as u32 * slot + (slot - bar_width) / 2;
        let y = area.bottom() - height;
        fill_rect(img, x, y, bar_width, height, config.color_scheme.color(i));
        if config.show_values {
            let text = format!("{:.*}", decimals, point.value);
            let text_x = (x + bar_width / 2).saturating_sub(text_width(&text, 1) / 2);
            draw_text(img, text_x, y.saturating_sub(8), &text, 1, INK);
        }
    }
}

fn draw_line_chart(img: &mut RgbImage, points: &[DataPoint], config: &ChartConfig) {
    let area = PlotArea::new();
    area.draw_axes(img);
    let max = points.iter().map(|p| p.value).fold(0.0, f64::max);
    let slot = (area.width / points.len() as u32).max(1);
    let color = config.color_scheme.color(0);

    let coords: Vec<(u32, u32)> = points
        .iter()
        .enumerate()
        .map(|(i, point)| {
            let x = area.left + 2 + i as u32 * slot + slot / 2;
            (x, area.bottom() - area.scale(point.value, 0.0, max))
        })
        .collect();

    for pair in coords.windows(2) {
        draw_segment(img, pair[0], pair[1], color);
    }
    for (point, &(x, y)) in points.iter().zip(&coords) {
        fill_rect(img, x.saturating_sub(3), y.saturating_sub(3), 7, 7, color);
        if config.show_values {
            let text = format!("{:.2}", point.value);
            let text_x = x.saturating_sub(text_width(&text, 1) / 2);
            draw_text(img, text_x, y.saturating_sub(12), &text, 1, INK);
        }
    }
}

fn draw_pie(img: &mut RgbImage, points: &[DataPoint], config: &ChartConfig) {
    let total: f64 = points.iter().map(|p| p.value).sum();
    if total <= 0.0 {
        return;
    }
    let radius = f64::from(HEIGHT - MARGIN_TOP - MARGIN_BOTTOM) / 2.0;
    let cx = f64::from(MARGIN_LEFT) + radius;
    let cy = f64::from(MARGIN_TOP) + radius;

    // Cumulative slice boundaries as fractions of a full turn.
    let mut bounds = Vec::with_capacity(points.len());
    let mut acc = 0.0;
    for point in points {
        acc += point.value / total;
        bounds.push(acc);
    }

    let full_turn = std::f64::consts::TAU;
    for y in (cy - radius) as u32..=(cy + radius) as u32 {
        for x in (cx - radius) as u32..=(cx + radius) as u32 {
            let dx = f64::from(x) - cx;
            let dy = f64::from(y) - cy;
            if dx * dx + dy * dy > radius * radius {
                continue;
            }
            // Clockwise from twelve o'clock.
            let angle = (dx.atan2(-dy) + full_turn) % full_turn;
            let fraction = angle / full_turn;
            let slice = bounds
                .iter()
                .position(|&bound| fraction <= bound)
                .unwrap_or(points.len() - 1);
            put(img, x, y, config.color_scheme.color(slice));
        }
    }

    // Legend: swatch per slice, percentage next to it.
    let legend_x = (cx + radius) as u32 + 40;
    for (i, point) in points.iter().enumerate() {
        let y = MARGIN_TOP + i as u32 * 20;
        if y + 14 > HEIGHT {
            break;
        }
        fill_rect(img, legend_x, y, 14, 14, config.color_scheme.color(i));
        if config.show_values {
            let text = format!("{:.1}%", point.value / total * 100.0);
            draw_text(img, legend_x + 20, y + 2, &text, 2, INK);
        }
    }
}

fn put(img: &mut RgbImage, x: u32, y: u32, color: Rgb<u8>) {
    if x < img.width() && y < img.height() {
        img.put_pixel(x, y, color);
    }
}

fn fill_rect(img: &mut RgbImage, x: u32, y: u32, width: u32, height: u32, color: Rgb<u8>) {
    for py in y..y.saturating_add(height) {
        for px in x..x.saturating_add(width) {
            put(img, px, py, color);
        }
    }
}

/// Bresenham segment, two pixels thick.
fn draw_segment(img: &mut RgbImage, from: (u32, u32), to: (u32, u32), color: Rgb<u8>) {
    let (mut x0, mut y0) = (i64::from(from.0), i64::from(from.1));
    let (x1, y1) = (i64::from(to.0), i64::from(to.1));
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        if x0 >= 0 && y0 >= 0 {
            fill_rect(img, x0 as u32, y0 as u32, 2, 2, color);
        }
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

/// 3x5 glyphs, one row per byte, high bit on the left.
fn glyph(ch: char) -> Option<[u8; 5]> {
    let rows = match ch {
        '0' => [0b111, 0b101, 0b101, 0b101, 0b111],
        '1' => [0b010, 0b110, 0b010, 0b010, 0b111],
        '2' => [0b111, 0b001, 0b111, 0b100, 0b111],
        '3' => [0b111, 0b001, 0b111, 0b001, 0b111],
        '4' => [0b101, 0b101, 0b111, 0b001, 0b001],
        '5' => [0b111, 0b100, 0b111, 0b001, 0b111],
        '6' => [0b111, 0b100, 0b111, 0b101, 0b111],
        '7' => [0b111, 0b001, 0b001, 0b001, 0b001],
        '8' => [0b111, 0b101, 0b111, 0b101, 0b111],
        '9' => [0b111, 0b101, 0b111, 0b001, 0b111],
        '.' => [0b000, 0b000, 0b000, 0b000, 0b010],
        '-' => [0b000, 0b000, 0b111, 0b000, 0b000],
        '%' => [0b101, 0b001, 0b010, 0b100, 0b101],
        _ => return None,
    };
    Some(rows)
}

fn text_width(text: &str, scale: u32) -> u32 {
    text.chars().count() as u32 * 4 * scale
}

fn draw_text(img: &mut RgbImage, x: u32, y: u32, text: &str, scale: u32, color: Rgb<u8>) {
    for (i, ch) in text.chars().enumerate() {
        let Some(rows) = glyph(ch) else { continue };
        let origin = x + i as u32 * 4 * scale;
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..3u32 {
                if bits & (0b100 >> col) != 0 {
                    fill_rect(
                        img,
                        origin + col * scale,
                        y + row as u32 * scale,
                        scale,
                        scale,
                        color,
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

    fn records() -> Vec<Manufacturer> {
        [("Acme", "Bricks", 1950, 120.5), ("Beton", "Cement", 1890, 300.0), ("Ceramo", "bricks", 2001, 75.25)]
            .into_iter()
            .enumerate()
            .map(|(i, (name, kind, year, revenue))| Manufacturer {
                id: i as u32 + 1,
                name: name.into(),
                product_type: kind.into(),
                founded_year: year,
                revenue,
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn every_chart_type_renders_a_png() {
        for chart_type in ChartType::ALL {
            for color_scheme in ColorScheme::ALL {
                let config = ChartConfig {
                    chart_type,
                    color_scheme,
                    show_values: true,
                    sort_data: true,
                };
                let bytes = generate(&records(), &config).unwrap();
                assert_eq!(&bytes[..8], &PNG_SIGNATURE, "{chart_type}");
            }
        }
    }

    #[test]
    fn empty_dataset_is_an_error() {
        assert!(matches!(
            generate(&[], &ChartConfig::default()),
            Err(ChartError::EmptyDataset)
        ));
    }

    #[test]
    fn chart_types_parse_and_reject_unknown_names() {
        assert_eq!("product_pie".parse::<ChartType>().unwrap(), ChartType::ProductPie);
        let err = "scatter".parse::<ChartType>().unwrap_err();
        assert!(err.to_string().contains("scatter"));
        assert!("neon".parse::<ColorScheme>().is_err());
    }

    #[test]
    fn pie_series_counts_product_types_case_insensitively() {
        let config = ChartConfig {
            chart_type: ChartType::ProductPie,
            ..Default::default()
        };
        let points = series(&records(), &config);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].label, "Bricks");
        assert_eq!(points[0].value, 2.0);
    }

    #[test]
    fn sort_data_orders_largest_first() {
        let config = ChartConfig {
            sort_data: true,
            ..Default::default()
        };
        let labels: Vec<String> = series(&records(), &config)
            .into_iter()
            .map(|p| p.label)
            .collect();
        assert_eq!(labels, vec!["Beton", "Acme", "Ceramo"]);
    }
}
