use log::debug;
use std::fmt;

/// Fill or stroke color: either three channels or an opaque token such as
/// `"red"` or `"#ff8800"` that the surface interprets.
#[derive(Debug, Clone, PartialEq)]
pub enum Color {
    Rgb(u8, u8, u8),
    Token(String),
}

impl Color {
    pub const BLACK: Color = Color::Rgb(0, 0, 0);
    pub const WHITE: Color = Color::Rgb(255, 255, 255);

    /// Builds a color from channel values, clamping each into 0..=255.
    pub fn from_channels(r: f64, g: f64, b: f64) -> Self {
        let clamp = |c: f64| if c.is_nan() { 0 } else { c.clamp(0.0, 255.0) as u8 };
        Color::Rgb(clamp(r), clamp(g), clamp(b))
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::Rgb(r, g, b) => write!(f, "rgb({r}, {g}, {b})"),
            Color::Token(token) => f.write_str(token),
        }
    }
}

/// One primitive recorded into the current frame's display list.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Clear(Color),
    Rect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        color: Color,
    },
    Circle {
        x: f64,
        y: f64,
        radius: f64,
        color: Color,
    },
    Line {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        color: Color,
        width: f64,
    },
    Text {
        text: String,
        x: f64,
        y: f64,
        color: Color,
        size: f64,
        center: bool,
    },
    Image {
        source: String,
        x: f64,
        y: f64,
        /// Only used when both are present.
        size: Option<(f64, f64)>,
    },
}

/// Output device the host runtime draws into.
pub trait Surface {
    /// Prepares a `width` x `height` surface. Returns false when no surface
    /// is available.
    fn configure(&mut self, width: u32, height: u32, title: &str) -> bool;

    /// Shows one completed frame.
    fn present(&mut self, frame: &[DrawCommand]);
}

/// Surface that keeps presented frames in memory.
#[derive(Debug, Default)]
pub struct HeadlessSurface {
    size: Option<(u32, u32)>,
    title: String,
    frames_presented: u64,
    last_frame: Vec<DrawCommand>,
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(&self) -> Option<(u32, u32)> {
        self.size
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    pub fn last_frame(&self) -> &[DrawCommand] {
        &self.last_frame
    }
}

impl Surface for HeadlessSurface {
    fn configure(&mut self, width: u32, height: u32, title: &str) -> bool {
        debug!("headless surface configured: {width}x{height} \"{title}\"");
        self.size = Some((width, height));
        self.title = title.to_string();
        true
    }

    fn present(&mut self, frame: &[DrawCommand]) {
        self.frames_presented += 1;
        self.last_frame = frame.to_vec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channels_are_clamped() {
        assert_eq!(Color::from_channels(300.0, -4.0, 12.7), Color::Rgb(255, 0, 12));
    }

    #[test]
    fn color_renders_like_a_css_value() {
        assert_eq!(Color::Rgb(20, 30, 50).to_string(), "rgb(20, 30, 50)");
        assert_eq!(Color::Token("red".into()).to_string(), "red");
    }

    #[test]
    fn headless_surface_counts_presented_frames() {
        let mut surface = HeadlessSurface::new();
        assert!(surface.configure(800, 600, "Snake"));
        surface.present(&[DrawCommand::Clear(Color::BLACK)]);
        surface.present(&[]);
        assert_eq!(surface.frames_presented(), 2);
        assert!(surface.last_frame().is_empty());
        assert_eq!(surface.size(), Some((800, 600)));
    }
}
