use unicode_normalization::UnicodeNormalization;

/// Average Helvetica advance as a fraction of the font size.
const AVG_ADVANCE_EM: f64 = 0.52;

/// Encode text for a standard PDF font (WinAnsiEncoding).
/// Characters WinAnsi has are kept as-is; others are tried in their NFKC
/// form (`ﬁ` -> `fi`). Control characters are dropped, anything still
/// unmappable becomes `?`.
pub fn to_winansi(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    for ch in s.nfc().filter(|ch| !ch.is_control()) {
        match winansi_byte(ch) {
            Some(b) => out.push(b),
            None => out.extend(
                std::iter::once(ch)
                    .nfkc()
                    .filter(|c| !c.is_control())
                    .map(|c| winansi_byte(c).unwrap_or(b'?')),
            ),
        }
    }
    out
}

fn winansi_byte(ch: char) -> Option<u8> {
    let cp = ch as u32;
    if (0x20..=0x7E).contains(&cp) || (0xA0..=0xFF).contains(&cp) {
        return Some(cp as u8);
    }
    // cp1252 0x80-0x9F
    match cp {
        0x20AC => Some(0x80),
        0x201A => Some(0x82),
        0x0192 => Some(0x83),
        0x201E => Some(0x84),
        0x2026 => Some(0x85),
        0x2020 => Some(0x86),
        0x2021 => Some(0x87),
        0x02C6 => Some(0x88),
        0x2030 => Some(0x89),
        0x0160 => Some(0x8A),
        0x2039 => Some(0x8B),
        0x0152 => Some(0x8C),
        0x017D => Some(0x8E),
        0x2018 => Some(0x91),
        0x2019 => Some(0x92),
        0x201C => Some(0x93),
        0x201D => Some(0x94),
        0x2022 => Some(0x95),
        0x2013 => Some(0x96),
        0x2014 => Some(0x97),
        0x02DC => Some(0x98),
        0x2122 => Some(0x99),
        0x0161 => Some(0x9A),
        0x203A => Some(0x9B),
        0x0153 => Some(0x9C),
        0x017E => Some(0x9E),
        0x0178 => Some(0x9F),
        _ => None,
    }
}

/// Width of `s` as it will be drawn, i.e. after WinAnsi encoding.
pub fn estimate_width(s: &str, font_size: f64) -> f64 {
    to_winansi(s).len() as f64 * font_size * AVG_ADVANCE_EM
}

/// Greedy word wrap. The first line may be narrower than the rest
/// (the label column indents it).
pub fn wrap(s: &str, font_size: f64, first_width: f64, width: f64) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut limit = first_width;

    for word in s.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{current} {word}")
        };
        if current.is_empty() || estimate_width(&candidate, font_size) <= limit {
            current = candidate;
        } else {
            lines.push(std::mem::take(&mut current));
            limit = width;
            current = word.to_string();
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
