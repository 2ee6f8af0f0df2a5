/// Deterministic gang color via CRC32 hash of the gang name.
/// Returns (r, g, b) from first 3 bytes of hash.
pub fn gang_color(name: &str) -> (u8, u8, u8) {
    let hash = crc32fast::hash(name.trim().as_bytes());
    let bytes = hash.to_be_bytes();
    (bytes[0], bytes[1], bytes[2])
}

/// Parse `#RRGGBB` (leading `#` optional).
pub fn parse_hex_color(hex: &str) -> Option<(u8, u8, u8)> {
    let hex = hex.strip_prefix('#').unwrap_or(hex);
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some((r, g, b))
}

pub fn is_hex_color(value: &str) -> bool {
    value.starts_with('#') && parse_hex_color(value).is_some()
}

/// Format RGB as an uppercase `#RRGGBB` string.
pub fn to_hex((r, g, b): (u8, u8, u8)) -> String {
    format!("#{r:02X}{g:02X}{b:02X}")
}

/// Format RGBA as a CSS color string.
pub fn rgba_css((r, g, b): (u8, u8, u8), a: f64) -> String {
    format!("rgba({r},{g},{b},{a})")
}

/// Stored color when it parses, otherwise the gang's hashed color.
pub fn resolve_color(color: &str, gang: &str) -> (u8, u8, u8) {
    parse_hex_color(color).unwrap_or_else(|| gang_color(gang))
}

#[cfg(test)]
mod tests {
    use super::{gang_color, is_hex_color, parse_hex_color, resolve_color, rgba_css, to_hex};

    #[test]
    fn parses_with_and_without_hash() {
        assert_eq!(parse_hex_color("#FF0000"), Some((255, 0, 0)));
        assert_eq!(parse_hex_color("00ff7f"), Some((0, 255, 127)));
    }

    #[test]
    fn rejects_malformed_hex() {
        assert_eq!(parse_hex_color("#FFF"), None);
        assert_eq!(parse_hex_color("#GG0000"), None);
        assert_eq!(parse_hex_color("#ÿÿÿ"), None);
        assert!(!is_hex_color("FF0000"));
        assert!(is_hex_color("#12abEF"));
    }

    #[test]
    fn hex_formatting_is_uppercase() {
        assert_eq!(to_hex((255, 16, 1)), "#FF1001");
        assert_eq!(rgba_css((1, 2, 3), 0.7), "rgba(1,2,3,0.7)");
    }

    #[test]
    fn gang_color_is_deterministic() {
        assert_eq!(gang_color("Ballas"), gang_color("Ballas"));
        assert_eq!(gang_color(" Ballas "), gang_color("Ballas"));
        assert_ne!(gang_color("Ballas"), gang_color("Vagos"));
    }

    #[test]
    fn resolve_color_falls_back_to_gang_hash() {
        assert_eq!(resolve_color("#0000FF", "Ballas"), (0, 0, 255));
        assert_eq!(resolve_color("blue", "Ballas"), gang_color("Ballas"));
    }
}
