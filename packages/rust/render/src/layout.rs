//! Creative geometry and SVG composition.
//!
//! The SVG is only an intermediate; it is rasterized before upload.
//!
//! Composition is a pure function of the layout, the two embedded images and
//! the text, so identical inputs always produce identical bytes.

use postrelay_shared::CreativeFormat;

const BACKGROUND: &str = "#ffffff";
const FRAME_COLOR: &str = "#d90429";
const PANEL_COLOR: &str = "#0d1b2a";
const TEXT_COLOR: &str = "#ffffff";
const FONT_FAMILY: &str = "Anton, Impact, 'Arial Narrow', sans-serif";

/// Axis-aligned box in canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Fixed geometry of one creative shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreativeLayout {
    pub width: u32,
    pub height: u32,
    /// Where the article photo is scaled into (cropped to fill).
    pub photo: Rect,
    /// Rounded accent frame behind the text panel.
    pub frame: Rect,
    pub frame_radius: u32,
    /// Dark panel carrying logo, title and footer.
    pub panel: Rect,
    /// Square logo box, horizontally centered.
    pub logo_size: u32,
    pub logo_y: u32,
    /// Vertical center of the title block.
    pub title_center_y: u32,
    pub font_size: u32,
    pub line_height: u32,
    /// Maximum characters per title line.
    pub wrap_width: usize,
    pub uppercase: bool,
    pub footer_y: u32,
    pub footer_size: u32,
}

impl CreativeLayout {
    pub fn for_format(format: CreativeFormat) -> Self {
        match format {
            CreativeFormat::Square => Self {
                width: 1080,
                height: 1080,
                photo: Rect::new(50, 50, 980, 551),
                frame: Rect::new(40, 610, 1000, 430),
                frame_radius: 40,
                panel: Rect::new(50, 620, 980, 410),
                logo_size: 220,
                logo_y: 620,
                title_center_y: 800,
                font_size: 50,
                line_height: 60,
                wrap_width: 32,
                uppercase: true,
                footer_y: 990,
                footer_size: 30,
            },
            CreativeFormat::Tall => Self {
                width: 1080,
                height: 1920,
                photo: Rect::new(50, 50, 980, 1100),
                frame: Rect::new(40, 1170, 1000, 710),
                frame_radius: 40,
                panel: Rect::new(50, 1180, 980, 690),
                logo_size: 260,
                logo_y: 1190,
                title_center_y: 1580,
                font_size: 64,
                line_height: 76,
                wrap_width: 24,
                uppercase: false,
                footer_y: 1830,
                footer_size: 34,
            },
        }
    }

    /// Apply this layout's casing and wrapping to a title.
    pub fn title_lines(&self, title: &str) -> Vec<String> {
        let title = if self.uppercase {
            title.to_uppercase()
        } else {
            title.to_string()
        };
        wrap_text(&title, self.wrap_width)
    }
}

/// Greedy word wrap to at most `width` characters per line. Words longer
/// than `width` are split.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let chars: Vec<char> = word.chars().collect();
        let mut rest: &[char] = &chars;

        while !rest.is_empty() {
            let needed = if current_len == 0 {
                rest.len()
            } else {
                current_len + 1 + rest.len()
            };

            if needed <= width {
                if current_len > 0 {
                    current.push(' ');
                    current_len += 1;
                }
                current.extend(rest.iter());
                current_len += rest.len();
                rest = &[];
            } else if current_len > 0 {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            } else {
                let (head, tail) = rest.split_at(width);
                lines.push(head.iter().collect());
                rest = tail;
            }
        }
    }

    if current_len > 0 {
        lines.push(current);
    }
    lines
}

/// Escape text for use in SVG character data and attribute values.
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

/// Compose the creative. `photo_uri` and `logo_uri` are data URIs.
pub fn compose_svg(
    layout: &CreativeLayout,
    photo_uri: &str,
    logo_uri: &str,
    title: &str,
    footer: &str,
) -> String {
    let CreativeLayout {
        width: w,
        height: h,
        photo,
        frame,
        panel,
        ..
    } = layout;
    let center_x = w / 2;
    let logo_x = center_x.saturating_sub(layout.logo_size / 2);

    let lines = layout.title_lines(title);
    let block_height = layout.line_height * lines.len().saturating_sub(1) as u32;
    let first_y = layout.title_center_y.saturating_sub(block_height / 2);

    let mut svg = String::with_capacity(photo_uri.len() + logo_uri.len() + 2048);
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#
    ));
    svg.push_str(&format!(
        r#"<rect width="{w}" height="{h}" fill="{BACKGROUND}"/>"#
    ));
    svg.push_str(&format!(
        r#"<image x="{}" y="{}" width="{}" height="{}" preserveAspectRatio="xMidYMid slice" xlink:href="{photo_uri}"/>"#,
        photo.x, photo.y, photo.width, photo.height
    ));
    svg.push_str(&format!(
        r#"<rect x="{}" y="{}" width="{}" height="{}" rx="{r}" ry="{r}" fill="{FRAME_COLOR}"/>"#,
        frame.x,
        frame.y,
        frame.width,
        frame.height,
        r = layout.frame_radius
    ));
    svg.push_str(&format!(
        r#"<rect x="{}" y="{}" width="{}" height="{}" fill="{PANEL_COLOR}"/>"#,
        panel.x, panel.y, panel.width, panel.height
    ));
    svg.push_str(&format!(
        r#"<image x="{logo_x}" y="{}" width="{s}" height="{s}" preserveAspectRatio="xMidYMid meet" xlink:href="{logo_uri}"/>"#,
        layout.logo_y,
        s = layout.logo_size
    ));

    svg.push_str(&format!(
        r#"<text x="{center_x}" y="{first_y}" font-family="{FONT_FAMILY}" font-size="{}" fill="{TEXT_COLOR}" text-anchor="middle" dominant-baseline="middle">"#,
        layout.font_size
    ));
    for (i, line) in lines.iter().enumerate() {
        let dy = if i == 0 { 0 } else { layout.line_height };
        svg.push_str(&format!(
            r#"<tspan x="{center_x}" dy="{dy}">{}</tspan>"#,
            escape_xml(line)
        ));
    }
    svg.push_str("</text>");

    if !footer.is_empty() {
        svg.push_str(&format!(
            r#"<text x="{center_x}" y="{}" font-family="{FONT_FAMILY}" font-size="{}" fill="{TEXT_COLOR}" text-anchor="middle" dominant-baseline="middle">{}</text>"#,
            layout.footer_y,
            layout.footer_size,
            escape_xml(footer)
        ));
    }

    svg.push_str("</svg>");
    svg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_respects_width() {
        let lines = wrap_text("Prefeitura anuncia obras na orla de Caraguatatuba nesta semana", 32);
        assert!(lines.iter().all(|l| l.chars().count() <= 32));
        assert_eq!(lines.join(" "), "Prefeitura anuncia obras na orla de Caraguatatuba nesta semana");
        assert_eq!(lines[0], "Prefeitura anuncia obras na orla");
    }

    #[test]
    fn wrap_splits_overlong_words() {
        assert_eq!(wrap_text("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
        assert_eq!(wrap_text("ab abcdefgh", 4), vec!["ab", "abcd", "efgh"]);
    }

    #[test]
    fn wrap_of_blank_title_is_empty() {
        assert!(wrap_text("   ", 32).is_empty());
    }

    #[test]
    fn square_layout_upper_cases_title() {
        let layout = CreativeLayout::for_format(CreativeFormat::Square);
        assert_eq!(layout.title_lines("ação na praia"), vec!["AÇÃO NA PRAIA"]);

        let tall = CreativeLayout::for_format(CreativeFormat::Tall);
        assert_eq!(tall.title_lines("ação na praia"), vec!["ação na praia"]);
        assert_eq!(tall.height, 1920);
    }

    #[test]
    fn escape_handles_markup_characters() {
        assert_eq!(escape_xml(r#"A & B <"c">"#), "A &amp; B &lt;&quot;c&quot;&gt;");
    }

    #[test]
    fn svg_contains_every_element() {
        let layout = CreativeLayout::for_format(CreativeFormat::Square);
        let svg = compose_svg(
            &layout,
            "data:image/jpeg;base64,AAAA",
            "data:image/png;base64,BBBB",
            "Tom & Jerry",
            "@HANDLE",
        );

        assert!(svg.starts_with("<svg "));
        assert!(svg.ends_with("</svg>"));
        assert!(svg.contains(r#"width="1080" height="1080""#));
        assert!(svg.contains("data:image/jpeg;base64,AAAA"));
        assert!(svg.contains("data:image/png;base64,BBBB"));
        assert!(svg.contains("TOM &amp; JERRY"));
        assert!(svg.contains("@HANDLE"));
        assert!(svg.contains(FRAME_COLOR));
    }

    #[test]
    fn title_block_is_vertically_centered() {
        let layout = CreativeLayout::for_format(CreativeFormat::Square);
        // three lines at 60px spacing start one line above the center
        let title = "one two three four five six seven eight nine ten eleven twelve thirteen";
        assert_eq!(layout.title_lines(title).len(), 3);
        let svg = compose_svg(&layout, "a", "b", title, "");
        assert!(svg.contains(r#"<text x="540" y="740""#));
    }
}
