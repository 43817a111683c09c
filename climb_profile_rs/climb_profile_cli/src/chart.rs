use std::fs;
use std::panic;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use climb_profile::{
    draw_legend, draw_profile, BandSet, LegendLayout, Profile, RenderStyle,
};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::{FontDesc, FontFamily, FontStyle};
use plotters_backend::{
    text_anchor, BackendColor, BackendCoord, BackendStyle, BackendTextStyle, DrawingBackend,
    DrawingErrorKind,
};
use tracing::debug;

/// 16 x 8 inches at 100 dpi.
pub const CANVAS_SIZE: (u32, u32) = (1600, 800);

#[derive(Clone, Debug)]
pub struct ChartOptions {
    pub size: (u32, u32),
    pub title: Option<String>,
    pub y_min: f64,
    pub y_max: f64,
    pub show_axes: bool,
    pub x_tick_m: f64,
    pub y_tick_m: f64,
    pub legend: bool,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            size: CANVAS_SIZE,
            title: None,
            y_min: 0.0,
            y_max: 2000.0,
            show_axes: false,
            x_tick_m: 1000.0,
            y_tick_m: 100.0,
            legend: true,
        }
    }
}

/// Upper elevation bound when none is given: 10% headroom, rounded up to
/// the next 100 m.
pub fn auto_y_max(profile: &Profile, y_min: f64) -> f64 {
    let top = profile.max_elevation().unwrap_or(y_min);
    let padded = ((top * 1.1) / 100.0).ceil() * 100.0;
    if padded > y_min {
        padded
    } else {
        y_min + 100.0
    }
}

/// Render the profile to a PNG at `path`. The file is only created once the
/// whole chart has been drawn and encoded.
pub fn render_png(
    profile: &Profile,
    bands: &BandSet,
    path: &Path,
    opts: &ChartOptions,
) -> Result<()> {
    if !(opts.y_max > opts.y_min) {
        return Err(anyhow!(
            "elevation range {}..{} is empty",
            opts.y_min,
            opts.y_max
        ));
    }
    let (width, height) = opts.size;
    let mut buffer = vec![0u8; width as usize * height as usize * 3];

    let render = || -> Result<()> {
        let backend = BitMapBackend::with_buffer(&mut buffer[..], (width, height));
        let root = FontSafeBackend::new(backend).into_drawing_area();
        draw_chart(root, profile, bands, opts)
    };
    panic::catch_unwind(panic::AssertUnwindSafe(render))
        .map_err(|_| anyhow!("plotting backend panicked"))??;

    save_png(path, &buffer, (width, height))
}

fn save_png(path: &Path, buffer: &[u8], (width, height): (u32, u32)) -> Result<()> {
    let partial = partial_path(path);
    image::save_buffer_with_format(
        &partial,
        buffer,
        width,
        height,
        image::ColorType::Rgb8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("failed to encode {}", partial.display()))?;
    fs::rename(&partial, path).with_context(|| {
        let _ = fs::remove_file(&partial);
        format!("failed to move image into {}", path.display())
    })?;
    Ok(())
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "profile.png".into());
    name.push(".part");
    path.with_file_name(name)
}

fn draw_chart<DB>(
    root: DrawingArea<DB, Shift>,
    profile: &Profile,
    bands: &BandSet,
    opts: &ChartOptions,
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;
    let area = match opts.title.as_deref() {
        Some(title) => root.titled(
            title,
            FontDesc::new(FontFamily::Serif, 26.0, FontStyle::Normal),
        )?,
        None => root.clone(),
    };

    let x_max = profile.total_distance().max(1.0);
    let (margin, left_area, bottom_area) = if opts.show_axes { (25, 60, 40) } else { (10, 0, 0) };
    let mut chart = ChartBuilder::on(&area)
        .margin(margin)
        .set_label_area_size(LabelAreaPosition::Left, left_area)
        .set_label_area_size(LabelAreaPosition::Bottom, bottom_area)
        .build_cartesian_2d(0.0..x_max, opts.y_min..opts.y_max)?;

    if opts.show_axes {
        let x_labels = tick_count(x_max, opts.x_tick_m);
        let y_labels = tick_count(opts.y_max - opts.y_min, opts.y_tick_m);
        chart
            .configure_mesh()
            .light_line_style(&TRANSPARENT)
            .bold_line_style(&BLACK.mix(0.1))
            .x_labels(x_labels)
            .y_labels(y_labels)
            .x_desc("Distance (m)")
            .y_desc("Elevation (m)")
            .x_label_formatter(&|v| format!("{:.0}", v.round()))
            .y_label_formatter(&|v| format!("{:.0}", v.round()))
            .label_style(FontDesc::new(FontFamily::SansSerif, 16.0, FontStyle::Normal))
            .draw()?;
    }

    let style = RenderStyle::default();
    draw_profile(&chart, &profile.points, &profile.windows, bands, &style)?;

    let line_style = ShapeStyle {
        color: BLACK.to_rgba(),
        filled: false,
        stroke_width: 2,
    };
    for run in elevation_runs(profile) {
        chart.draw_series(LineSeries::new(run, line_style))?;
    }

    if opts.legend {
        draw_legend(&root, bands, &LegendLayout::default(), &style)?;
    }

    root.present()?;
    debug!("chart drawn: {} x {} px", opts.size.0, opts.size.1);
    Ok(())
}

fn tick_count(span: f64, interval: f64) -> usize {
    if !(interval > 0.0) || !span.is_finite() {
        return 10;
    }
    ((span / interval).floor() as usize + 1).clamp(2, 50)
}

/// Contiguous stretches of the curve with a known elevation.
fn elevation_runs(profile: &Profile) -> Vec<Vec<(f64, f64)>> {
    let mut runs = Vec::new();
    let mut current = Vec::new();
    for point in &profile.points {
        if point.elevation.is_finite() {
            current.push((point.distance, point.elevation));
        } else if !current.is_empty() {
            runs.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}

/// Wraps a backend so text still renders, with a built-in bitmap font, when
/// the system font path fails or panics.
struct FontSafeBackend<DB> {
    inner: DB,
}

impl<DB> FontSafeBackend<DB> {
    fn new(inner: DB) -> Self {
        Self { inner }
    }
}

// Only text needs the fallback; paths decompose into the inner lines.
impl<DB: DrawingBackend> DrawingBackend for FontSafeBackend<DB> {
    type ErrorType = DB::ErrorType;

    fn get_size(&self) -> (u32, u32) {
        self.inner.get_size()
    }

    fn ensure_prepared(&mut self) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.ensure_prepared()
    }

    fn present(&mut self) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.present()
    }

    fn draw_pixel(
        &mut self,
        point: BackendCoord,
        color: BackendColor,
    ) -> Result<(), DrawingErrorKind<DB::ErrorType>> {
        self.inner.draw_pixel(point, color)
    }

    fn draw_line<S: BackendStyle>(
        &mut self,
        from: BackendCoord,
        to: BackendCoord,
        style: &S,
    ) -> Result<(), DrawingErrorKind<DB::ErrorType>> {
        self.inner.draw_line(from, to, style)
    }

    fn draw_rect<S: BackendStyle>(
        &mut self,
        upper_left: BackendCoord,
        bottom_right: BackendCoord,
        style: &S,
        fill: bool,
    ) -> Result<(), DrawingErrorKind<DB::ErrorType>> {
        self.inner.draw_rect(upper_left, bottom_right, style, fill)
    }

    fn fill_polygon<S: BackendStyle, I: IntoIterator<Item = BackendCoord>>(
        &mut self,
        vert: I,
        style: &S,
    ) -> Result<(), DrawingErrorKind<DB::ErrorType>> {
        self.inner.fill_polygon(vert, style)
    }

    fn draw_text<TStyle: BackendTextStyle>(
        &mut self,
        text: &str,
        style: &TStyle,
        pos: BackendCoord,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        match panic::catch_unwind(panic::AssertUnwindSafe(|| {
            self.inner.draw_text(text, style, pos)
        })) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(DrawingErrorKind::FontError(_))) | Err(_) => {
                self.draw_text_fallback(text, style, pos)
            }
            Ok(Err(err)) => Err(err),
        }
    }

    fn estimate_text_size<TStyle: BackendTextStyle>(
        &self,
        text: &str,
        style: &TStyle,
    ) -> Result<(u32, u32), DrawingErrorKind<Self::ErrorType>> {
        match panic::catch_unwind(panic::AssertUnwindSafe(|| {
            self.inner.estimate_text_size(text, style)
        })) {
            Ok(Ok(size)) => Ok(size),
            _ => Ok(fallback_text_size(text, style.size())),
        }
    }
}

impl<DB: DrawingBackend> FontSafeBackend<DB> {
    fn draw_text_fallback<TStyle: BackendTextStyle>(
        &mut self,
        text: &str,
        style: &TStyle,
        pos: BackendCoord,
    ) -> Result<(), DrawingErrorKind<DB::ErrorType>> {
        let color = style.color();
        if color.alpha == 0.0 || text.trim().is_empty() {
            return Ok(());
        }

        let scale = fallback_scale(style.size());
        let (width, height) = fallback_text_size(text, style.size());
        let (width, height) = (width as i32, height as i32);
        let dx = match style.anchor().h_pos {
            text_anchor::HPos::Left => 0,
            text_anchor::HPos::Right => -width,
            text_anchor::HPos::Center => -width / 2,
        };
        let dy = match style.anchor().v_pos {
            text_anchor::VPos::Top => 0,
            text_anchor::VPos::Center => -height / 2,
            text_anchor::VPos::Bottom => -height,
        };

        let mut cursor_x = pos.0 + dx;
        let top_y = pos.1 + dy;
        for ch in text.chars() {
            let Some((glyph_width, rows)) = fallback_glyph(ch) else {
                cursor_x += scale * (FALLBACK_SPACE_WIDTH + 1);
                continue;
            };
            for (row, pattern) in rows.iter().enumerate() {
                for col in 0..glyph_width {
                    if pattern & (1 << (glyph_width - 1 - col)) != 0 {
                        let x = cursor_x + col * scale;
                        let y = top_y + row as i32 * scale;
                        self.inner
                            .draw_rect((x, y), (x + scale - 1, y + scale - 1), &color, true)?;
                    }
                }
            }
            cursor_x += scale * (glyph_width + 1);
        }
        Ok(())
    }
}

const FALLBACK_FONT_HEIGHT: i32 = 7;
const FALLBACK_SPACE_WIDTH: i32 = 3;

fn fallback_scale(font_size: f64) -> i32 {
    (font_size / FALLBACK_FONT_HEIGHT as f64).round().max(1.0) as i32
}

fn fallback_text_size(text: &str, font_size: f64) -> (u32, u32) {
    let scale = fallback_scale(font_size);
    let columns: i32 = text
        .chars()
        .map(|ch| fallback_glyph(ch).map_or(FALLBACK_SPACE_WIDTH, |(w, _)| w) + 1)
        .sum();
    (
        (columns * scale).max(0) as u32,
        (FALLBACK_FONT_HEIGHT * scale) as u32,
    )
}

/// 7-row bitmap glyphs: (character, width in columns, row bits).
const FALLBACK_GLYPHS: &[(char, i32, [u8; 7])] = &[
    ('A', 5, [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001]),
    ('B', 5, [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110]),
    ('C', 5, [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110]),
    ('D', 5, [0b11100, 0b10010, 0b10001, 0b10001, 0b10001, 0b10010, 0b11100]),
    ('E', 5, [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111]),
    ('F', 5, [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000]),
    ('G', 5, [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111]),
    ('H', 5, [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001]),
    ('I', 3, [0b111, 0b010, 0b010, 0b010, 0b010, 0b010, 0b111]),
    ('J', 5, [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100]),
    ('K', 5, [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001]),
    ('L', 5, [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111]),
    ('M', 5, [0b10001, 0b11011, 0b10101, 0b10001, 0b10001, 0b10001, 0b10001]),
    ('N', 5, [0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001, 0b10001]),
    ('O', 5, [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110]),
    ('P', 5, [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000]),
    ('Q', 5, [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101]),
    ('R', 5, [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001]),
    ('S', 5, [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110]),
    ('T', 5, [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100]),
    ('U', 5, [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110]),
    ('V', 5, [0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b01010, 0b00100]),
    ('W', 5, [0b10001, 0b10001, 0b10001, 0b10001, 0b10101, 0b11011, 0b10001]),
    ('X', 5, [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001]),
    ('Y', 5, [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100]),
    ('Z', 5, [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111]),
    ('0', 5, [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110]),
    ('1', 3, [0b010, 0b110, 0b010, 0b010, 0b010, 0b010, 0b111]),
    ('2', 5, [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111]),
    ('3', 5, [0b11110, 0b00001, 0b00001, 0b00110, 0b00001, 0b00001, 0b11110]),
    ('4', 5, [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010]),
    ('5', 5, [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110]),
    ('6', 5, [0b01110, 0b10001, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110]),
    ('7', 5, [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000]),
    ('8', 5, [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110]),
    ('9', 5, [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b10001, 0b01110]),
    ('%', 5, [0b11001, 0b11010, 0b00010, 0b00100, 0b01000, 0b01011, 0b10011]),
    ('<', 4, [0b0001, 0b0010, 0b0100, 0b1000, 0b0100, 0b0010, 0b0001]),
    ('>', 4, [0b1000, 0b0100, 0b0010, 0b0001, 0b0010, 0b0100, 0b1000]),
    ('-', 3, [0b000, 0b000, 0b000, 0b111, 0b000, 0b000, 0b000]),
    ('/', 3, [0b001, 0b001, 0b010, 0b010, 0b100, 0b100, 0b100]),
    ('(', 3, [0b001, 0b010, 0b100, 0b100, 0b100, 0b010, 0b001]),
    (')', 3, [0b100, 0b010, 0b001, 0b001, 0b001, 0b010, 0b100]),
    (':', 1, [0b0, 0b1, 0b0, 0b0, 0b0, 0b1, 0b0]),
    ('.', 1, [0b0, 0b0, 0b0, 0b0, 0b0, 0b0, 0b1]),
    (',', 2, [0b00, 0b00, 0b00, 0b00, 0b00, 0b01, 0b10]),
    ('\'', 1, [0b1, 0b1, 0b0, 0b0, 0b0, 0b0, 0b0]),
];

fn fallback_glyph(ch: char) -> Option<(i32, [u8; 7])> {
    let upper = ch.to_ascii_uppercase();
    FALLBACK_GLYPHS
        .iter()
        .find(|(c, _, _)| *c == upper)
        .map(|&(_, width, rows)| (width, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::io;

    use climb_profile::{compute_profile, Params};
    use image::GenericImageView;

    /// A backend with no usable fonts that counts what reaches it.
    #[derive(Default)]
    struct FontlessBackend {
        rects: usize,
        lines: usize,
    }

    impl DrawingBackend for FontlessBackend {
        type ErrorType = Infallible;

        fn get_size(&self) -> (u32, u32) {
            (200, 100)
        }

        fn ensure_prepared(&mut self) -> Result<(), DrawingErrorKind<Infallible>> {
            Ok(())
        }

        fn present(&mut self) -> Result<(), DrawingErrorKind<Infallible>> {
            Ok(())
        }

        fn draw_pixel(
            &mut self,
            _point: BackendCoord,
            _color: BackendColor,
        ) -> Result<(), DrawingErrorKind<Infallible>> {
            Ok(())
        }

        fn draw_line<S: BackendStyle>(
            &mut self,
            _from: BackendCoord,
            _to: BackendCoord,
            _style: &S,
        ) -> Result<(), DrawingErrorKind<Infallible>> {
            self.lines += 1;
            Ok(())
        }

        fn draw_rect<S: BackendStyle>(
            &mut self,
            _upper_left: BackendCoord,
            _bottom_right: BackendCoord,
            _style: &S,
            _fill: bool,
        ) -> Result<(), DrawingErrorKind<Infallible>> {
            self.rects += 1;
            Ok(())
        }

        fn draw_text<TStyle: BackendTextStyle>(
            &mut self,
            _text: &str,
            _style: &TStyle,
            _pos: BackendCoord,
        ) -> Result<(), DrawingErrorKind<Infallible>> {
            Err(DrawingErrorKind::FontError(Box::new(io::Error::other("no fonts"))))
        }

        fn estimate_text_size<TStyle: BackendTextStyle>(
            &self,
            _text: &str,
            _style: &TStyle,
        ) -> Result<(u32, u32), DrawingErrorKind<Infallible>> {
            Err(DrawingErrorKind::FontError(Box::new(io::Error::other("no fonts"))))
        }
    }

    #[test]
    fn test_font_safe_backend_falls_back_to_bitmap_glyphs() {
        let mut backend = FontSafeBackend::new(FontlessBackend::default());
        let style = TextStyle::from(FontDesc::new(FontFamily::SansSerif, 14.0, FontStyle::Normal));

        backend.draw_text("> 15%", &style, (10, 10)).unwrap();
        assert!(backend.inner.rects > 0);
        assert_eq!(
            backend.estimate_text_size("> 15%", &style).unwrap(),
            fallback_text_size("> 15%", 14.0)
        );

        backend
            .draw_path(vec![(0, 0), (50, 0), (50, 50)], &BLACK)
            .unwrap();
        assert_eq!(backend.inner.lines, 2);
    }

    fn climb_profile(points: usize) -> Profile {
        let track: Vec<(f64, f64, f64)> = (0..points)
            .map(|i| (44.17 + i as f64 * 0.0004, 5.27, 300.0 + i as f64 * (i % 7) as f64 * 0.4))
            .collect();
        let params = Params {
            window_width: Some(3),
            ..Params::default()
        };
        compute_profile(track.as_slice(), &params).unwrap()
    }

    fn temp_png(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("climb_profile_{}_{}.png", name, std::process::id()))
    }

    #[test]
    fn test_legend_labels_have_fallback_glyphs() {
        for label in ["< 2%", "2 - 5%", "5 - 10%", "10 - 15%", "> 15%", "Elevation (m)"] {
            for ch in label.chars().filter(|c| *c != ' ') {
                assert!(fallback_glyph(ch).is_some(), "missing glyph {:?}", ch);
            }
        }
    }

    #[test]
    fn test_auto_y_max_rounds_up_with_headroom() {
        let profile = climb_profile(20);
        let top = profile.max_elevation().unwrap();
        let y_max = auto_y_max(&profile, 0.0);
        assert!(y_max >= top * 1.1);
        assert_eq!(y_max % 100.0, 0.0);
        assert_eq!(auto_y_max(&profile, 5000.0), 5100.0);
    }

    #[test]
    fn test_elevation_runs_split_at_gaps() {
        let track = vec![
            (45.0, 6.0, 100.0),
            (45.001, 6.0, 101.0),
            (45.002, 6.0, f64::NAN),
            (45.003, 6.0, 103.0),
        ];
        let profile = compute_profile(track.as_slice(), &Params::default()).unwrap();
        let runs = elevation_runs(&profile);
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].len(), 2);
        assert_eq!(runs[1].len(), 1);
    }

    #[test]
    fn test_render_png_writes_complete_image() {
        let profile = climb_profile(40);
        let path = temp_png("ok");
        let opts = ChartOptions {
            size: (400, 200),
            y_max: auto_y_max(&profile, 0.0),
            legend: false,
            ..ChartOptions::default()
        };
        render_png(&profile, &BandSet::default(), &path, &opts).unwrap();
        let img = image::open(&path).unwrap();
        assert_eq!(img.dimensions(), (400, 200));
        assert!(!partial_path(&path).exists());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_render_png_leaves_no_file_on_failure() {
        let profile = climb_profile(1);
        let path = temp_png("single");
        let opts = ChartOptions {
            size: (400, 200),
            legend: false,
            ..ChartOptions::default()
        };
        let err = render_png(&profile, &BandSet::default(), &path, &opts).unwrap_err();
        assert!(err.to_string().contains("precondition"));
        assert!(!path.exists());
        assert!(!partial_path(&path).exists());
    }
}
