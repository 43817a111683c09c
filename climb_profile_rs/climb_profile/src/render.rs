//! Gradient-colored fill under the elevation curve, plus the band legend.
//!
//! Geometry is computed first as plain data (`profile_trapezoids`,
//! `legend_swatches`) and only then handed to a plotters drawing area, so
//! nothing is drawn when the inputs fail a precondition.

use plotters::coord::types::RangedCoordf64;
use plotters::coord::Shift;
use plotters::drawing::DrawingAreaErrorKind;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use tracing::debug;

use crate::bands::BandSet;
use crate::classify::WindowAssignment;
use crate::sequence::DerivedPoint;
use crate::ProfileError;

/// Polygons with a smaller area (data units) are dropped after clipping.
const MIN_AREA: f64 = 1e-9;

/// Plotting rectangle in data coordinates (metres, metres).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClipRect {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl ClipRect {
    fn contains(&self, edge: Edge, (x, y): (f64, f64)) -> bool {
        match edge {
            Edge::Left => x >= self.x_min,
            Edge::Right => x <= self.x_max,
            Edge::Bottom => y >= self.y_min,
            Edge::Top => y <= self.y_max,
        }
    }

    fn crossing(&self, edge: Edge, (ax, ay): (f64, f64), (bx, by): (f64, f64)) -> (f64, f64) {
        match edge {
            Edge::Left | Edge::Right => {
                let x = if edge == Edge::Left { self.x_min } else { self.x_max };
                let t = (x - ax) / (bx - ax);
                (x, ay + t * (by - ay))
            }
            Edge::Bottom | Edge::Top => {
                let y = if edge == Edge::Bottom { self.y_min } else { self.y_max };
                let t = (y - ay) / (by - ay);
                (ax + t * (bx - ax), y)
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Edge {
    Left,
    Right,
    Bottom,
    Top,
}

/// Filled region under the curve between points `start` and `start + 1`.
#[derive(Clone, Debug, PartialEq)]
pub struct Trapezoid {
    pub start: usize,
    pub band: usize,
    pub vertices: Vec<(f64, f64)>,
}

#[derive(Clone, Debug)]
pub struct RenderStyle {
    /// Outline color; `None` strokes each shape in its band color.
    pub outline: Option<RGBColor>,
    pub stroke_width: u32,
    pub legend_font_size: f64,
    pub legend_text: RGBColor,
}

impl Default for RenderStyle {
    fn default() -> Self {
        Self {
            outline: None,
            stroke_width: 1,
            legend_font_size: 18.0,
            legend_text: RGBColor(0, 0, 0),
        }
    }
}

/// Legend placement as fractions of the canvas size, independent of the
/// chart's data ranges.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LegendLayout {
    pub left: f64,
    pub top: f64,
    pub swatch_width: f64,
    pub swatch_height: f64,
    pub label_gap: f64,
}

impl Default for LegendLayout {
    fn default() -> Self {
        Self {
            left: 0.06,
            top: 0.08,
            swatch_width: 0.05,
            swatch_height: 0.045,
            label_gap: 0.01,
        }
    }
}

/// One legend entry in canvas pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct LegendSwatch {
    pub band: usize,
    pub upper_left: (i32, i32),
    pub bottom_right: (i32, i32),
    pub label: String,
    pub label_pos: (i32, i32),
}

/// Trapezoids for every adjacent point pair, clipped to `clip`.
///
/// A pair `(i, i + 1)` takes the band of the window containing `i + 1`.
/// Zero-width pairs, pairs with a missing elevation and polygons that clip
/// away to nothing are skipped.
pub fn profile_trapezoids(
    points: &[DerivedPoint],
    windows: &[WindowAssignment],
    clip: &ClipRect,
) -> Result<Vec<Trapezoid>, ProfileError> {
    let band_of = band_per_index(points.len(), windows)?;
    let base = clip.y_min;
    let mut out = Vec::with_capacity(points.len() - 1);

    for (i, pair) in points.windows(2).enumerate() {
        let (a, b) = (pair[0], pair[1]);
        if b.distance <= a.distance || !a.elevation.is_finite() || !b.elevation.is_finite() {
            continue;
        }
        let quad = [
            (a.distance, base),
            (b.distance, base),
            (b.distance, b.elevation),
            (a.distance, a.elevation),
        ];
        let vertices = clip_polygon(&quad, clip);
        if vertices.len() < 3 || polygon_area(&vertices) < MIN_AREA {
            continue;
        }
        out.push(Trapezoid {
            start: i,
            band: band_of[i + 1],
            vertices,
        });
    }
    Ok(out)
}

/// Fill the area under the profile on `chart`, one trapezoid per point pair.
pub fn draw_profile<DB>(
    chart: &ChartContext<'_, DB, Cartesian2d<RangedCoordf64, RangedCoordf64>>,
    points: &[DerivedPoint],
    windows: &[WindowAssignment],
    bands: &BandSet,
    style: &RenderStyle,
) -> Result<(), ProfileError>
where
    DB: DrawingBackend,
{
    let x = chart.x_range();
    let y = chart.y_range();
    let clip = ClipRect {
        x_min: x.start,
        x_max: x.end,
        y_min: y.start,
        y_max: y.end,
    };
    let trapezoids = profile_trapezoids(points, windows, &clip)?;
    if let Some(bad) = trapezoids.iter().find(|t| bands.get(t.band).is_none()) {
        return Err(ProfileError::Precondition(format!(
            "band {} out of range ({} bands)",
            bad.band,
            bands.len()
        )));
    }

    let area = chart.plotting_area();
    for trapezoid in &trapezoids {
        let Some(band) = bands.get(trapezoid.band) else {
            continue;
        };
        let mut outline = trapezoid.vertices.clone();
        outline.push(trapezoid.vertices[0]);
        area.draw(&Polygon::new(trapezoid.vertices.clone(), band.color.filled()))
            .map_err(drawing_error)?;
        area.draw(&PathElement::new(
            outline,
            outline_style(band.color, style),
        ))
        .map_err(drawing_error)?;
    }
    debug!("drew {} profile trapezoids", trapezoids.len());
    Ok(())
}

/// Swatch rectangles and label anchors for every band, steepest on top.
pub fn legend_swatches(
    bands: &BandSet,
    layout: &LegendLayout,
    (width, height): (u32, u32),
) -> Vec<LegendSwatch> {
    let (w, h) = (width as f64, height as f64);
    let left = (layout.left * w).round() as i32;
    let top = (layout.top * h).round() as i32;
    let swatch_w = ((layout.swatch_width * w).round() as i32).max(1);
    let swatch_h = ((layout.swatch_height * h).round() as i32).max(1);
    let gap = (layout.label_gap * w).round() as i32;

    bands
        .iter()
        .enumerate()
        .rev()
        .enumerate()
        .map(|(slot, (band_idx, band))| {
            let y0 = top + slot as i32 * swatch_h;
            let y1 = y0 + swatch_h;
            LegendSwatch {
                band: band_idx,
                upper_left: (left, y0),
                bottom_right: (left + swatch_w, y1),
                label: band.label(),
                label_pos: (left + swatch_w + gap, y0 + swatch_h / 2),
            }
        })
        .collect()
}

/// Draw the band legend onto the whole canvas.
pub fn draw_legend<DB>(
    area: &DrawingArea<DB, Shift>,
    bands: &BandSet,
    layout: &LegendLayout,
    style: &RenderStyle,
) -> Result<(), ProfileError>
where
    DB: DrawingBackend,
{
    let font = FontDesc::new(FontFamily::SansSerif, style.legend_font_size, FontStyle::Normal)
        .color(&style.legend_text)
        .pos(Pos::new(HPos::Left, VPos::Center));

    for swatch in legend_swatches(bands, layout, area.dim_in_pixel()) {
        let Some(band) = bands.get(swatch.band) else {
            continue;
        };
        let corners = [swatch.upper_left, swatch.bottom_right];
        area.draw(&Rectangle::new(corners, band.color.filled()))
            .map_err(drawing_error)?;
        area.draw(&Rectangle::new(corners, outline_style(band.color, style)))
            .map_err(drawing_error)?;
        area.draw(&Text::new(swatch.label, swatch.label_pos, font.clone()))
            .map_err(drawing_error)?;
    }
    Ok(())
}

fn outline_style(band_color: RGBColor, style: &RenderStyle) -> ShapeStyle {
    ShapeStyle {
        color: style.outline.unwrap_or(band_color).to_rgba(),
        filled: false,
        stroke_width: style.stroke_width,
    }
}

fn drawing_error<E>(err: DrawingAreaErrorKind<E>) -> ProfileError
where
    E: std::error::Error + Send + Sync,
{
    ProfileError::Drawing(err.to_string())
}

/// Band index per point index, checking that `windows` cover `1..len`
/// exactly once and in order.
fn band_per_index(len: usize, windows: &[WindowAssignment]) -> Result<Vec<usize>, ProfileError> {
    if len < 2 {
        return Err(ProfileError::Precondition(format!(
            "need at least two points to draw, got {}",
            len
        )));
    }
    let mut bands = vec![0; len];
    let mut next = 1;
    for window in windows {
        if window.start != next || window.end <= window.start || window.end > len {
            return Err(ProfileError::Precondition(format!(
                "window [{}, {}) does not continue coverage at index {}",
                window.start, window.end, next
            )));
        }
        bands[window.start..window.end].fill(window.band);
        next = window.end;
    }
    if next != len {
        return Err(ProfileError::Precondition(format!(
            "windows cover indices 1..{} but the profile has {} points",
            next, len
        )));
    }
    Ok(bands)
}

fn clip_polygon(polygon: &[(f64, f64)], clip: &ClipRect) -> Vec<(f64, f64)> {
    let mut current = polygon.to_vec();
    for edge in [Edge::Left, Edge::Right, Edge::Bottom, Edge::Top] {
        if current.is_empty() {
            break;
        }
        let input = std::mem::take(&mut current);
        let mut prev = input[input.len() - 1];
        for &point in &input {
            let point_in = clip.contains(edge, point);
            let prev_in = clip.contains(edge, prev);
            if point_in {
                if !prev_in {
                    current.push(clip.crossing(edge, prev, point));
                }
                current.push(point);
            } else if prev_in {
                current.push(clip.crossing(edge, prev, point));
            }
            prev = point;
        }
    }
    current
}

fn polygon_area(vertices: &[(f64, f64)]) -> f64 {
    let n = vertices.len();
    let twice: f64 = (0..n)
        .map(|i| {
            let (x0, y0) = vertices[i];
            let (x1, y1) = vertices[(i + 1) % n];
            x0 * y1 - x1 * y0
        })
        .sum();
    (twice / 2.0).abs()
}
