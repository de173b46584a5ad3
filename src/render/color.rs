use image::Rgba;

use crate::render::RenderError;

/// Named colors accepted in style tables, lowercase
const NAMED_COLORS: &[(&str, [u8; 4])] = &[
    ("black", [0, 0, 0, 255]),
    ("white", [255, 255, 255, 255]),
    ("red", [255, 0, 0, 255]),
    ("green", [0, 128, 0, 255]),
    ("blue", [0, 0, 255, 255]),
    ("yellow", [255, 255, 0, 255]),
    ("cyan", [0, 255, 255, 255]),
    ("magenta", [255, 0, 255, 255]),
    ("gray", [128, 128, 128, 255]),
    ("grey", [128, 128, 128, 255]),
    ("lightgray", [211, 211, 211, 255]),
    ("lightgrey", [211, 211, 211, 255]),
    ("darkgray", [169, 169, 169, 255]),
    ("darkgrey", [169, 169, 169, 255]),
    ("dimgray", [105, 105, 105, 255]),
    ("silver", [192, 192, 192, 255]),
    ("gainsboro", [220, 220, 220, 255]),
    ("whitesmoke", [245, 245, 245, 255]),
    ("orange", [255, 165, 0, 255]),
    ("purple", [128, 0, 128, 255]),
    ("pink", [255, 192, 203, 255]),
    ("brown", [165, 42, 42, 255]),
    ("navy", [0, 0, 128, 255]),
    ("teal", [0, 128, 128, 255]),
    ("olive", [128, 128, 0, 255]),
    ("maroon", [128, 0, 0, 255]),
    ("lime", [0, 255, 0, 255]),
    ("gold", [255, 215, 0, 255]),
    ("beige", [245, 245, 220, 255]),
    ("tan", [210, 180, 140, 255]),
    ("khaki", [240, 230, 140, 255]),
    ("salmon", [250, 128, 114, 255]),
    ("coral", [255, 127, 80, 255]),
    ("crimson", [220, 20, 60, 255]),
    ("violet", [238, 130, 238, 255]),
    ("indigo", [75, 0, 130, 255]),
    ("lightblue", [173, 216, 230, 255]),
    ("skyblue", [135, 206, 235, 255]),
    ("darkblue", [0, 0, 139, 255]),
    ("lightgreen", [144, 238, 144, 255]),
    ("palegreen", [152, 251, 152, 255]),
    ("darkgreen", [0, 100, 0, 255]),
    ("darkred", [139, 0, 0, 255]),
    ("k", [0, 0, 0, 255]),
    ("w", [255, 255, 255, 255]),
    ("r", [255, 0, 0, 255]),
    ("g", [0, 128, 0, 255]),
    ("b", [0, 0, 255, 255]),
    ("y", [191, 191, 0, 255]),
    ("none", [0, 0, 0, 0]),
];

fn hex_digit(c: u8) -> Option<u8> {
    (c as char).to_digit(16).map(|d| d as u8)
}

/// Parse `#rgb`, `#rrggbb`, `#rrggbbaa` or a named color
pub fn parse_color(raw: &str) -> Result<Rgba<u8>, RenderError> {
    let value = raw.trim();
    let invalid = || RenderError::InvalidColor(raw.to_string());

    if let Some(hex) = value.strip_prefix('#') {
        let digits: Vec<u8> = hex
            .bytes()
            .map(hex_digit)
            .collect::<Option<Vec<u8>>>()
            .ok_or_else(invalid)?;

        return match digits.len() {
            3 => Ok(Rgba([digits[0] * 17, digits[1] * 17, digits[2] * 17, 255])),
            6 | 8 => {
                let mut channels = [255u8; 4];
                for (channel, pair) in channels.iter_mut().zip(digits.chunks(2)) {
                    *channel = pair[0] * 16 + pair[1];
                }
                Ok(Rgba(channels))
            }
            _ => Err(invalid()),
        };
    }

    let lower = value.to_ascii_lowercase();
    NAMED_COLORS
        .iter()
        .find(|(name, _)| *name == lower)
        .map(|(_, rgba)| Rgba(*rgba))
        .ok_or_else(invalid)
}
