//! ANSI escape sequences to HTML markup.

use regex::Regex;
use std::sync::LazyLock;

/// CSI sequences (group 1 = parameters, group 2 = intermediate bytes,
/// group 3 = final byte), OSC strings and two-byte escapes.
static ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\x1b\[([0-?]*)([ -/]*)([@-~])|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[ -/]*[0-~]",
    )
    .expect("valid escape regex")
});

/// xterm colors 0-15.
const PALETTE: [&str; 16] = [
    "#000000", "#cd0000", "#00cd00", "#cdcd00", "#0000ee", "#cd00cd", "#00cdcd", "#e5e5e5",
    "#7f7f7f", "#ff0000", "#00ff00", "#ffff00", "#5c5cff", "#ff00ff", "#00ffff", "#ffffff",
];

const DEFAULT_FG: &str = "#e5e5e5";
const DEFAULT_BG: &str = "#000000";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    Indexed(u8),
    Rgb(u8, u8, u8),
}

impl Color {
    fn css(&self) -> String {
        match *self {
            Color::Indexed(n) if n < 16 => PALETTE[n as usize].to_string(),
            Color::Indexed(n) if n < 232 => {
                let n = n - 16;
                let level = |v: u8| if v == 0 { 0 } else { 55 + v * 40 };
                format!(
                    "#{:02x}{:02x}{:02x}",
                    level(n / 36),
                    level((n / 6) % 6),
                    level(n % 6)
                )
            }
            Color::Indexed(n) => {
                let gray = 8 + (n - 232) * 10;
                format!("#{:02x}{:02x}{:02x}", gray, gray, gray)
            }
            Color::Rgb(r, g, b) => format!("#{:02x}{:02x}{:02x}", r, g, b),
        }
    }
}

/// Graphic rendition state accumulated from SGR sequences.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Style {
    fg: Option<Color>,
    bg: Option<Color>,
    bold: bool,
    italic: bool,
    underline: bool,
    inverse: bool,
}

impl Style {
    /// Applies the parameters of one `ESC [ ... m` sequence.
    fn apply(&mut self, params: &str) {
        let codes: Vec<u16> = params.split(';').flat_map(sgr_codes).collect();

        let mut i = 0;
        while i < codes.len() {
            match codes[i] {
                0 => *self = Style::default(),
                1 => self.bold = true,
                3 => self.italic = true,
                4 => self.underline = true,
                7 => self.inverse = true,
                22 => self.bold = false,
                23 => self.italic = false,
                24 => self.underline = false,
                27 => self.inverse = false,
                n @ 30..=37 => self.fg = Some(Color::Indexed((n - 30) as u8)),
                39 => self.fg = None,
                n @ 40..=47 => self.bg = Some(Color::Indexed((n - 40) as u8)),
                49 => self.bg = None,
                n @ 90..=97 => self.fg = Some(Color::Indexed((n - 90 + 8) as u8)),
                n @ 100..=107 => self.bg = Some(Color::Indexed((n - 100 + 8) as u8)),
                n @ (38 | 48) => {
                    let (color, used) = extended_color(&codes[i + 1..]);
                    if let Some(color) = color {
                        if n == 38 {
                            self.fg = Some(color);
                        } else {
                            self.bg = Some(color);
                        }
                    }
                    i += used;
                }
                _ => {}
            }
            i += 1;
        }
    }

    fn css(&self) -> Option<String> {
        if *self == Style::default() {
            return None;
        }

        let (fg, bg) = if self.inverse {
            (
                Some(self.bg.map_or_else(|| DEFAULT_BG.to_string(), |c| c.css())),
                Some(self.fg.map_or_else(|| DEFAULT_FG.to_string(), |c| c.css())),
            )
        } else {
            (self.fg.map(|c| c.css()), self.bg.map(|c| c.css()))
        };

        let mut parts = Vec::new();
        if let Some(bg) = bg {
            parts.push(format!("background-color: {}", bg));
        }
        if let Some(fg) = fg {
            parts.push(format!("color: {}", fg));
        }
        if self.bold {
            parts.push("font-weight: bold".to_string());
        }
        if self.italic {
            parts.push("font-style: italic".to_string());
        }
        if self.underline {
            parts.push("text-decoration: underline".to_string());
        }

        if parts.is_empty() {
            None
        } else {
            Some(parts.join("; "))
        }
    }
}

/// Codes of one `;`-separated SGR parameter. Colon sub-parameters
/// (`38:5:n`, `38:2:[space]:r:g:b`, `4:3`) are flattened to their `;` form.
fn sgr_codes(param: &str) -> Vec<u16> {
    let parts: Vec<u16> = param.split(':').map(|p| p.parse().unwrap_or(0)).collect();
    match parts.as_slice() {
        [n @ (38 | 48), 2, _, r, g, b, ..] => vec![*n, 2, *r, *g, *b],
        [4, style, ..] => vec![if *style == 0 { 24 } else { 4 }],
        _ => parts,
    }
}

/// Parses `5;n` or `2;r;g;b` after a 38/48 code. Returns the color and how
/// many codes were consumed.
fn extended_color(rest: &[u16]) -> (Option<Color>, usize) {
    match rest {
        [5, n, ..] => (Some(Color::Indexed((*n).min(255) as u8)), 2),
        [2, r, g, b, ..] => (
            Some(Color::Rgb(
                (*r).min(255) as u8,
                (*g).min(255) as u8,
                (*b).min(255) as u8,
            )),
            4,
        ),
        [] => (None, 0),
        _ => (None, rest.len()),
    }
}

/// Escapes text for inclusion in HTML.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Reverses [`escape_html`].
pub fn unescape_html(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Normalizes line endings: CRLF becomes LF, stray CRs are dropped.
pub fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "")
}

/// Converts terminal output to HTML.
///
/// Colors and text attributes become `<span style="...">`, other escape
/// sequences are dropped, text is HTML-escaped and newlines become `<br>`.
pub fn to_html(raw: &str) -> String {
    let text = normalize_newlines(raw);
    let mut html = String::with_capacity(text.len());
    let mut style = Style::default();
    let mut last = 0;

    for caps in ESCAPE.captures_iter(&text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        push_segment(&mut html, &text[last..whole.start()], &style);
        last = whole.end();

        let params = caps.get(1).map_or("", |m| m.as_str());
        let is_sgr = caps.get(3).is_some_and(|m| m.as_str() == "m")
            && caps.get(2).is_some_and(|m| m.is_empty())
            && !params.starts_with(['<', '=', '>', '?']);
        if is_sgr {
            style.apply(params);
        }
    }
    push_segment(&mut html, &text[last..], &style);

    html.replace('\n', "<br>")
}

fn push_segment(html: &mut String, text: &str, style: &Style) {
    if text.is_empty() {
        return;
    }
    match style.css() {
        Some(css) => {
            html.push_str("<span style=\"");
            html.push_str(&css);
            html.push_str("\">");
            html.push_str(&escape_html(text));
            html.push_str("</span>");
        }
        None => html.push_str(&escape_html(text)),
    }
}

/// Removes ANSI escape sequences, leaving plain text.
pub fn remove_ansi_codes(text: &str) -> String {
    strip_ansi_escapes::strip_str(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_escaped() {
        assert_eq!(to_html("a < b & c"), "a &lt; b &amp; c");
    }

    #[test]
    fn test_newlines_become_breaks() {
        assert_eq!(to_html("one\r\ntwo\nthree"), "one<br>two<br>three");
        assert_eq!(to_html("progress\r done"), "progress done");
    }

    #[test]
    fn test_foreground_color() {
        assert_eq!(
            to_html("\x1b[31mFAIL\x1b[0m ok"),
            "<span style=\"color: #cd0000\">FAIL</span> ok"
        );
    }

    #[test]
    fn test_combined_attributes() {
        assert_eq!(
            to_html("\x1b[1;42;30mPASS\x1b[39m!\x1b[0m"),
            "<span style=\"background-color: #00cd00; color: #000000; font-weight: bold\">PASS</span>\
             <span style=\"background-color: #00cd00; font-weight: bold\">!</span>"
        );
    }

    #[test]
    fn test_extended_colors() {
        assert_eq!(
            to_html("\x1b[38;5;196mx\x1b[38;2;1;2;3my"),
            "<span style=\"color: #ff0000\">x</span><span style=\"color: #010203\">y</span>"
        );
    }

    #[test]
    fn test_non_color_sequences_dropped() {
        assert_eq!(to_html("\x1b[2Kline\x1b[1A\x1b]0;title\x07"), "line");
    }

    #[test]
    fn test_colon_sub_parameters() {
        assert_eq!(
            to_html("\x1b[38:5:196mred\x1b[0m \x1b[48:2::1:2:3mbg\x1b[4:3mu\x1b[4:0m"),
            "<span style=\"color: #ff0000\">red</span> \
             <span style=\"background-color: #010203\">bg</span>\
             <span style=\"background-color: #010203; text-decoration: underline\">u</span>"
        );
    }

    #[test]
    fn test_no_escape_byte_survives() {
        let noisy = "\x1b[>0c\x1b[<5m\x1b[?25l\x1b[1 qa\x1b[38:2:0:255:0:0mb\x1b(Bc\x1b=d\x1b[0m";
        let html = to_html(noisy);
        assert!(!html.contains('\x1b'), "{:?}", html);
        let red = |text: &str| format!("<span style=\"color: #ff0000\">{}</span>", text);
        assert_eq!(html, format!("a{}{}{}", red("b"), red("c"), red("d")));
    }

    #[test]
    fn test_private_sequences_do_not_style() {
        assert_eq!(to_html("\x1b[>4;2mplain"), "plain");
    }

    #[test]
    fn test_remove_ansi_codes() {
        assert_eq!(remove_ansi_codes("\x1b[32mgreen\x1b[0m"), "green");
    }

    #[test]
    fn test_unescape_round_trip() {
        let text = "<a href=\"x\">'&'</a>";
        assert_eq!(unescape_html(&escape_html(text)), text);
    }
}
