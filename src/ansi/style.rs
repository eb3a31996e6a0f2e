//! Text style state driven by SGR (Select Graphic Rendition) codes.

/// The eight basic terminal colours, in SGR order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BasicColor {
    /// Offset 0.
    Black,
    /// Offset 1.
    Red,
    /// Offset 2.
    Green,
    /// Offset 3.
    Yellow,
    /// Offset 4.
    Blue,
    /// Offset 5.
    Magenta,
    /// Offset 6.
    Cyan,
    /// Offset 7.
    White,
}

impl BasicColor {
    /// Colour for an SGR offset in `0..8`.
    #[must_use]
    pub fn from_offset(offset: u16) -> Option<Self> {
        Some(match offset {
            0 => Self::Black,
            1 => Self::Red,
            2 => Self::Green,
            3 => Self::Yellow,
            4 => Self::Blue,
            5 => Self::Magenta,
            6 => Self::Cyan,
            7 => Self::White,
            _ => return None,
        })
    }
}

/// A foreground or background colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    /// Codes 30–37 / 40–47.
    Basic(BasicColor),
    /// High-intensity codes 90–97 / 100–107.
    Bright(BasicColor),
    /// 256-colour palette entry (`38;5;n`).
    Indexed(u8),
    /// True colour (`38;2;r;g;b`).
    Rgb(u8, u8, u8),
}

/// Foreground used after a reset.
pub const DEFAULT_FOREGROUND: Color = Color::Basic(BasicColor::Black);

/// Background used after a reset.
pub const DEFAULT_BACKGROUND: Color = Color::Basic(BasicColor::White);

/// Font weight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Weight {
    /// Neither bold nor faint.
    #[default]
    Normal,
    /// Code 1.
    Bold,
    /// Code 2.
    Faint,
}

/// Underline kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Underline {
    /// No underline.
    #[default]
    None,
    /// Code 4.
    Single,
}

/// Current rendition, persisting across plaintext runs until changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(clippy::struct_excessive_bools)]
pub struct Style {
    /// Font weight.
    pub weight: Weight,
    /// Italic.
    pub italic: bool,
    /// Underline.
    pub underline: Underline,
    /// Crossed out.
    pub strikeout: bool,
    /// Overlined.
    pub overline: bool,
    /// Foreground and background are swapped when rendered.
    pub reversed: bool,
    /// Foreground colour as set by SGR codes, before any reversal.
    pub foreground: Color,
    /// Background colour as set by SGR codes, before any reversal.
    pub background: Color,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            weight: Weight::Normal,
            italic: false,
            underline: Underline::None,
            strikeout: false,
            overline: false,
            reversed: false,
            foreground: DEFAULT_FOREGROUND,
            background: DEFAULT_BACKGROUND,
        }
    }
}

impl Style {
    /// Colour the text is drawn in, taking reverse video into account.
    #[must_use]
    pub fn rendered_foreground(&self) -> Color {
        if self.reversed {
            self.background
        } else {
            self.foreground
        }
    }

    /// Colour behind the text, taking reverse video into account.
    #[must_use]
    pub fn rendered_background(&self) -> Color {
        if self.reversed {
            self.foreground
        } else {
            self.background
        }
    }

    /// Apply a list of SGR codes in order.
    ///
    /// `38` and `48` consume their colour arguments (`5;n` or `2;r;g;b`); a
    /// malformed extended colour ends processing of the list.
    pub fn apply_sgr(&mut self, codes: &[u16]) {
        let mut rest = codes;
        while let Some((&code, tail)) = rest.split_first() {
            rest = tail;
            match code {
                38 | 48 => {
                    let Some((color, remaining)) = extended_color(rest) else {
                        return;
                    };
                    rest = remaining;
                    if code == 38 {
                        self.foreground = color;
                    } else {
                        self.background = color;
                    }
                }
                _ => self.apply_code(code),
            }
        }
    }

    fn apply_code(&mut self, code: u16) {
        match code {
            0 => *self = Self::default(),
            1 => self.weight = Weight::Bold,
            2 => self.weight = Weight::Faint,
            3 => self.italic = true,
            4 => self.underline = Underline::Single,
            7 => self.reversed = true,
            9 => self.strikeout = true,
            21 | 22 => self.weight = Weight::Normal,
            23 => self.italic = false,
            24 => self.underline = Underline::None,
            27 => self.reversed = false,
            29 => self.strikeout = false,
            30..=37 => {
                if let Some(color) = BasicColor::from_offset(code - 30) {
                    self.foreground = Color::Basic(color);
                }
            }
            39 => self.foreground = DEFAULT_FOREGROUND,
            40..=47 => {
                if let Some(color) = BasicColor::from_offset(code - 40) {
                    self.background = Color::Basic(color);
                }
            }
            49 => self.background = DEFAULT_BACKGROUND,
            53 => self.overline = true,
            55 => self.overline = false,
            90..=97 => {
                if let Some(color) = BasicColor::from_offset(code - 90) {
                    self.foreground = Color::Bright(color);
                }
            }
            100..=107 => {
                if let Some(color) = BasicColor::from_offset(code - 100) {
                    self.background = Color::Bright(color);
                }
            }
            // Blink, conceal, alternate fonts and the rest have no rendering.
            _ => {}
        }
    }

}

fn extended_color(args: &[u16]) -> Option<(Color, &[u16])> {
    match args {
        [5, index, rest @ ..] => Some((Color::Indexed(u8::try_from(*index).ok()?), rest)),
        [2, r, g, b, rest @ ..] => Some((
            Color::Rgb(
                u8::try_from(*r).ok()?,
                u8::try_from(*g).ok()?,
                u8::try_from(*b).ok()?,
            ),
            rest,
        )),
        _ => None,
    }
}

/// Parse the parameter string of an SGR sequence into codes.
///
/// An empty string or empty field means 0. Parsing stops at the first field
/// that is not a number, keeping the codes before it.
#[must_use]
pub fn parse_sgr_params(params: &str) -> Vec<u16> {
    if params.is_empty() {
        return vec![0];
    }

    let mut codes = Vec::new();
    for field in params.split(';') {
        if field.is_empty() {
            codes.push(0);
            continue;
        }
        match field.parse::<u16>() {
            Ok(code) => codes.push(code),
            Err(_) => break,
        }
    }
    codes
}
