//! Arrow Styling Derived from Point Styles
//!
//! Point styles are free-form maps handed to the renderer. Arrows reuse the
//! point's color with an alpha channel and a fixed head shape:
//!
//! | Point style                      | Arrow color               |
//! |----------------------------------|---------------------------|
//! | none                             | `[1.0, 0.8, 0.1, 0.6]`    |
//! | `color: darkgreen`               | `[0.0, 0.392, 0.0, 0.6]`  |
//! | `color: "#ff0000", alpha: 0.3`   | `[1.0, 0.0, 0.0, 0.3]`    |
//! | `color: [0.2, 0.4, 0.6, 0.9]`    | `[0.2, 0.4, 0.6, 0.9]`    |

use log::debug;
use serde_json::{Map, Value};

use crate::constants::{ARROW_SHAPE, DEFAULT_ARROW_ALPHA, DEFAULT_ARROW_COLOR};
use crate::model::ArrowStyle;

const NAMED_COLORS: &[(&str, [u8; 3])] = &[
    ("black", [0, 0, 0]),
    ("blue", [0, 0, 255]),
    ("brown", [165, 42, 42]),
    ("cyan", [0, 255, 255]),
    ("darkblue", [0, 0, 139]),
    ("darkgreen", [0, 100, 0]),
    ("darkorange", [255, 140, 0]),
    ("darkred", [139, 0, 0]),
    ("darkviolet", [148, 0, 211]),
    ("gold", [255, 215, 0]),
    ("gray", [128, 128, 128]),
    ("green", [0, 128, 0]),
    ("grey", [128, 128, 128]),
    ("lime", [0, 255, 0]),
    ("magenta", [255, 0, 255]),
    ("navy", [0, 0, 128]),
    ("olive", [128, 128, 0]),
    ("orange", [255, 165, 0]),
    ("pink", [255, 192, 203]),
    ("purple", [128, 0, 128]),
    ("red", [255, 0, 0]),
    ("teal", [0, 128, 128]),
    ("violet", [238, 130, 238]),
    ("white", [255, 255, 255]),
    ("yellow", [255, 255, 0]),
];

// Single-letter shorthands in 0..=1 units
const SHORT_COLORS: &[(&str, [f64; 3])] = &[
    ("b", [0.0, 0.0, 1.0]),
    ("g", [0.0, 0.5, 0.0]),
    ("r", [1.0, 0.0, 0.0]),
    ("c", [0.0, 0.75, 0.75]),
    ("m", [0.75, 0.0, 0.75]),
    ("y", [0.75, 0.75, 0.0]),
    ("k", [0.0, 0.0, 0.0]),
    ("w", [1.0, 1.0, 1.0]),
];

/// Parse a color name, `#rgb`/`#rrggbb[aa]` hex or grey level into RGB
///
/// An alpha byte in a hex color is dropped; arrows get their alpha from the
/// style's `alpha` entry instead.
pub fn parse_color(text: &str) -> Option<[f64; 3]> {
    let text = text.trim();
    if let Some(hex) = text.strip_prefix('#') {
        return parse_hex(hex);
    }
    let lower = text.to_ascii_lowercase();
    if let Some((_, rgb)) = SHORT_COLORS.iter().find(|(name, _)| *name == lower) {
        return Some(*rgb);
    }
    if let Some((_, rgb)) = NAMED_COLORS.iter().find(|(name, _)| *name == lower) {
        return Some(rgb.map(|c| f64::from(c) / 255.0));
    }
    // "0.75" is a grey level
    match text.parse::<f64>() {
        Ok(level) if (0.0..=1.0).contains(&level) => Some([level; 3]),
        _ => None,
    }
}

fn parse_hex(hex: &str) -> Option<[f64; 3]> {
    let channel = |s: &str| u8::from_str_radix(s, 16).ok().map(|c| f64::from(c) / 255.0);
    match hex.len() {
        3 => {
            let mut rgb = [0.0; 3];
            for (slot, ch) in rgb.iter_mut().zip(hex.chars()) {
                let digit = ch.to_digit(16)? as u8;
                *slot = f64::from(digit * 17) / 255.0;
            }
            Some(rgb)
        }
        6 | 8 if hex.is_ascii() => Some([channel(&hex[0..2])?, channel(&hex[2..4])?, channel(&hex[4..6])?]),
        _ => None,
    }
}

fn color_components(value: &Value) -> Option<Vec<f64>> {
    match value {
        Value::String(text) => parse_color(text).map(|rgb| rgb.to_vec()),
        Value::Array(items) => {
            let components: Option<Vec<f64>> = items.iter().map(Value::as_f64).collect();
            components.filter(|c| c.len() == 3 || c.len() == 4)
        }
        _ => None,
    }
}

/// Arrow style for a point drawn with `point_style`
pub fn arrow_style(point_style: &Map<String, Value>) -> ArrowStyle {
    let mut color = match point_style.get("color") {
        Some(value) => color_components(value).unwrap_or_else(|| {
            debug!("Unusable point color {value}, using the default arrow color");
            DEFAULT_ARROW_COLOR.to_vec()
        }),
        None => DEFAULT_ARROW_COLOR.to_vec(),
    };

    match point_style.get("alpha").and_then(Value::as_f64) {
        Some(alpha) => {
            color.truncate(3);
            color.push(alpha);
        }
        None if color.len() == 3 => color.push(DEFAULT_ARROW_ALPHA),
        None => {}
    }

    ArrowStyle {
        color,
        arrowstyle: ARROW_SHAPE.to_string(),
    }
}
