//! Text watermark overlay.
//!
//! The watermark is burned in with `drawtext` at the bottom-right corner,
//! semi-transparent, sized relative to the frame height so every preset gets
//! a proportionate mark.

/// Appearance of the text watermark.
#[derive(Debug, Clone)]
pub struct WatermarkStyle {
    /// Opacity (0.0 to 1.0)
    pub opacity: f32,
    /// Font size as a fraction of frame height (`h / divisor`)
    pub font_size_divisor: u32,
    /// Distance from the right and bottom edges in pixels
    pub margin: u32,
    /// Optional font file; drawtext's default font otherwise
    pub font_file: Option<String>,
}

impl Default for WatermarkStyle {
    fn default() -> Self {
        Self {
            opacity: 0.6,
            font_size_divisor: 24,
            margin: 24,
            font_file: None,
        }
    }
}

impl WatermarkStyle {
    /// Set watermark opacity (0.0 = invisible, 1.0 = fully opaque).
    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity.clamp(0.0, 1.0);
        self
    }

    pub fn with_margin(mut self, margin: u32) -> Self {
        self.margin = margin;
        self
    }
}

/// Make arbitrary text safe inside a single-quoted drawtext value.
///
/// Apostrophes become typographic ones and backslashes are dropped since
/// neither can be expressed inside the quoted value.
pub fn escape_drawtext(text: &str) -> String {
    text.chars()
        .filter(|c| *c != '\\' && !c.is_control())
        .map(|c| if c == '\'' { '\u{2019}' } else { c })
        .collect()
}

/// Build the drawtext filter for a watermark.
pub fn drawtext_filter(text: &str, style: &WatermarkStyle) -> String {
    let mut filter = format!(
        "drawtext=text='{}':expansion=none:fontcolor=white@{:.2}:fontsize=h/{}:x=w-tw-{}:y=h-th-{}:shadowcolor=black@{:.2}:shadowx=2:shadowy=2",
        escape_drawtext(text),
        style.opacity,
        style.font_size_divisor.max(1),
        style.margin,
        style.margin,
        style.opacity * 0.5,
    );
    if let Some(font) = &style.font_file {
        filter.push_str(&format!(":fontfile='{}'", font.replace('\'', "")));
    }
    filter
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drawtext_bottom_right() {
        let filter = drawtext_filter("reelcut.gg", &WatermarkStyle::default());
        assert!(filter.starts_with("drawtext=text='reelcut.gg'"));
        assert!(filter.contains("x=w-tw-24:y=h-th-24"));
        assert!(filter.contains("fontcolor=white@0.60"));
    }

    #[test]
    fn test_escape_drawtext() {
        assert_eq!(escape_drawtext("it's a\\test"), "it\u{2019}s atest");
    }

    #[test]
    fn test_opacity_is_clamped() {
        let style = WatermarkStyle::default().with_opacity(3.0);
        assert_eq!(style.opacity, 1.0);
    }
}
