use tracing::warn;

// Used whenever a configured color cannot be parsed
pub const DEFAULT_PRIMARY: &str = "#3b82f6";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hsl {
    pub h: u16,
    pub s: u8,
    pub l: u8,
}

impl Hsl {
    // css custom property form, "225 100% 60%"
    pub fn to_css(self) -> String {
        format!("{} {}% {}%", self.h, self.s, self.l)
    }

    pub fn with_lightness(self, l: u8) -> Self {
        Self { l, ..self }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub base: Hsl,
    pub hover: Hsl,
    pub light: Hsl,
    pub lighter: Hsl,
}

impl Palette {
    pub fn from_base(base: Hsl) -> Self {
        Self {
            base,
            hover: base.with_lightness(base.l.saturating_sub(5)),
            light: base.with_lightness((base.l + 35).min(95)),
            lighter: base.with_lightness((base.l + 45).min(98)),
        }
    }
}

fn parse_hex(input: &str) -> Option<(u8, u8, u8)> {
    let digits = input.trim().trim_start_matches('#');
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let expanded: String = match digits.len() {
        3 => digits.chars().flat_map(|c| [c, c]).collect(),
        6 => digits.to_string(),
        _ => return None,
    };
    let channel = |i: usize| u8::from_str_radix(&expanded[i..i + 2], 16).ok();
    Some((channel(0)?, channel(2)?, channel(4)?))
}

/// Converts `#rrggbb` (or `#rgb`) to HSL with integer degrees and percents.
pub fn hex_to_hsl(input: &str) -> Option<Hsl> {
    let (r, g, b) = parse_hex(input)?;
    let r = f64::from(r) / 255.0;
    let g = f64::from(g) / 255.0;
    let b = f64::from(b) / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;

    let (h, s) = if max == min {
        (0.0, 0.0)
    } else {
        let d = max - min;
        let s = if l > 0.5 {
            d / (2.0 - max - min)
        } else {
            d / (max + min)
        };
        let h = if max == r {
            (g - b) / d + if g < b { 6.0 } else { 0.0 }
        } else if max == g {
            (b - r) / d + 2.0
        } else {
            (r - g) / d + 4.0
        };
        (h / 6.0, s)
    };

    Some(Hsl {
        h: ((h * 360.0).round() as u16) % 360,
        s: (s * 100.0).round() as u8,
        l: (l * 100.0).round() as u8,
    })
}

// Never fails, malformed input falls back to the default primary
pub fn palette_for(input: &str) -> Palette {
    let base = hex_to_hsl(input).unwrap_or_else(|| {
        warn!(color = input, fallback = DEFAULT_PRIMARY, "invalid color, using default");
        hex_to_hsl(DEFAULT_PRIMARY).unwrap_or(Hsl { h: 0, s: 0, l: 50 })
    });
    Palette::from_base(base)
}
