//! PNG line chart of systolic, diastolic and pulse series.
//!
//! Rendering is a pure function of the points: no fonts are embedded, so the
//! axis labels travel in [`ChartImage::caption`] instead of the bitmap.

use std::io::Cursor;

use image::{ImageFormat, Rgb, RgbImage};
use thiserror::Error;
use tonus_store::Reading;

pub const CHART_WIDTH: u32 = 640;
pub const CHART_HEIGHT: u32 = 400;
const MARGIN: u32 = 32;
const GRID_LINES: u32 = 5;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([64, 64, 64]);
const GRID: Rgb<u8> = Rgb([225, 225, 225]);
const SYSTOLIC: Rgb<u8> = Rgb([214, 39, 40]);
const DIASTOLIC: Rgb<u8> = Rgb([31, 119, 180]);
const PULSE: Rgb<u8> = Rgb([44, 160, 44]);

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("cannot render a chart without points")]
    EmptySeries,
    #[error("failed to encode chart png: {0}")]
    Encode(#[from] image::ImageError),
}

/// One x-axis position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartPoint {
    pub label: String,
    pub systolic: u16,
    pub diastolic: u16,
    pub pulse: u16,
}

impl ChartPoint {
    pub fn from_reading(reading: &Reading, label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            systolic: reading.systolic,
            diastolic: reading.diastolic,
            pulse: reading.pulse,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartImage {
    pub png: Vec<u8>,
    pub caption: String,
}

pub fn render_chart(title: &str, points: &[ChartPoint]) -> Result<ChartImage, ChartError> {
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return Err(ChartError::EmptySeries);
    };

    let mut canvas = RgbImage::from_pixel(CHART_WIDTH, CHART_HEIGHT, BACKGROUND);
    let scale = ValueScale::fit(points);
    draw_frame(&mut canvas);

    let series: [(Rgb<u8>, fn(&ChartPoint) -> u16); 3] = [
        (SYSTOLIC, |point| point.systolic),
        (DIASTOLIC, |point| point.diastolic),
        (PULSE, |point| point.pulse),
    ];
    for (color, value_of) in series {
        let positions = points
            .iter()
            .enumerate()
            .map(|(index, point)| {
                (
                    x_position(index, points.len()),
                    scale.y_position(value_of(point)),
                )
            })
            .collect::<Vec<_>>();
        for pair in positions.windows(2) {
            draw_thick_line(&mut canvas, pair[0], pair[1], color);
        }
        for (x, y) in &positions {
            draw_marker(&mut canvas, *x, *y, color);
        }
    }

    let mut png = Vec::new();
    canvas.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

    let range = if points.len() == 1 {
        first.label.clone()
    } else {
        format!("{} to {}", first.label, last.label)
    };
    let caption = format!(
        "{title}\nSBP red, DBP blue, Pulse green\n{range} ({} point{})",
        points.len(),
        if points.len() == 1 { "" } else { "s" }
    );
    Ok(ChartImage { png, caption })
}

struct ValueScale {
    min: i64,
    max: i64,
}

impl ValueScale {
    fn fit(points: &[ChartPoint]) -> Self {
        let values = points
            .iter()
            .flat_map(|point| [point.systolic, point.diastolic, point.pulse])
            .map(i64::from);
        let (min, max) = values.fold((i64::MAX, i64::MIN), |(min, max), value| {
            (min.min(value), max.max(value))
        });
        let pad = ((max - min) / 10).max(5);
        Self {
            min: (min - pad).max(0),
            max: max + pad,
        }
    }

    fn y_position(&self, value: u16) -> i64 {
        let span = (self.max - self.min).max(1);
        let plot_height = i64::from(CHART_HEIGHT - 2 * MARGIN);
        let offset = (i64::from(value) - self.min) * plot_height / span;
        i64::from(CHART_HEIGHT - MARGIN) - offset
    }
}

fn x_position(index: usize, count: usize) -> i64 {
    let plot_width = i64::from(CHART_WIDTH - 2 * MARGIN);
    if count <= 1 {
        return i64::from(MARGIN) + plot_width / 2;
    }
    let index = i64::try_from(index).unwrap_or(i64::MAX);
    let last = i64::try_from(count - 1).unwrap_or(i64::MAX);
    i64::from(MARGIN) + index * plot_width / last
}

fn draw_frame(canvas: &mut RgbImage) {
    let left = i64::from(MARGIN);
    let right = i64::from(CHART_WIDTH - MARGIN);
    let top = i64::from(MARGIN);
    let bottom = i64::from(CHART_HEIGHT - MARGIN);
    for step in 1..GRID_LINES {
        let y = top + (bottom - top) * i64::from(step) / i64::from(GRID_LINES);
        draw_line(canvas, (left, y), (right, y), GRID);
    }
    draw_line(canvas, (left, top), (left, bottom), AXIS);
    draw_line(canvas, (left, bottom), (right, bottom), AXIS);
}

fn put_pixel(canvas: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    let (Ok(x), Ok(y)) = (u32::try_from(x), u32::try_from(y)) else {
        return;
    };
    if x < canvas.width() && y < canvas.height() {
        canvas.put_pixel(x, y, color);
    }
}

/// Bresenham line, clipped to the canvas.
fn draw_line(canvas: &mut RgbImage, from: (i64, i64), to: (i64, i64), color: Rgb<u8>) {
    let (mut x, mut y) = from;
    let dx = (to.0 - x).abs();
    let dy = -(to.1 - y).abs();
    let step_x = if x < to.0 { 1 } else { -1 };
    let step_y = if y < to.1 { 1 } else { -1 };
    let mut error = dx + dy;
    loop {
        put_pixel(canvas, x, y, color);
        if x == to.0 && y == to.1 {
            break;
        }
        let doubled = 2 * error;
        if doubled >= dy {
            error += dy;
            x += step_x;
        }
        if doubled <= dx {
            error += dx;
            y += step_y;
        }
    }
}

fn draw_thick_line(canvas: &mut RgbImage, from: (i64, i64), to: (i64, i64), color: Rgb<u8>) {
    draw_line(canvas, from, to, color);
    draw_line(canvas, (from.0, from.1 + 1), (to.0, to.1 + 1), color);
}

fn draw_marker(canvas: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    for dx in -2..=2 {
        for dy in -2..=2 {
            put_pixel(canvas, x + dx, y + dy, color);
        }
    }
}
