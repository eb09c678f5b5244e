use crate::types::{NormalizedLine, RawLine};

/// Map a confusable glyph to its ASCII form. `None` drops the character.
fn canonical_char(c: char) -> Option<char> {
    match c {
        '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{2032}' | '`' | '\u{00B4}' => {
            Some('\'')
        }
        '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{2033}' | '\u{00AB}' | '\u{00BB}' => Some('"'),
        '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2014}' | '\u{2212}' => Some('-'),
        '\u{FF0C}' | '\u{201F}' => Some(','),
        '\u{FF0E}' | '\u{2024}' => Some('.'),
        '\u{FF1A}' => Some(':'),
        '\u{FF05}' => Some('%'),
        '\u{00A6}' => Some('|'),
        '\u{00A0}' | '\u{2007}' | '\u{202F}' | '\u{3000}' => Some(' '),
        '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{FEFF}' => None,
        c if c.is_control() && !c.is_whitespace() => None,
        c => Some(c),
    }
}

/// Clean one OCR row: canonical punctuation, single spaces, trimmed.
pub fn normalize_line(raw: &str) -> String {
    let mapped: String = raw.chars().filter_map(canonical_char).collect();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize every row, dropping those left empty but remembering where each came from.
pub fn normalize_lines<S: AsRef<str>>(raw: &[S]) -> Vec<NormalizedLine> {
    raw.iter()
        .enumerate()
        .filter_map(|(ordinal, l)| {
            let text = normalize_line(l.as_ref());
            (!text.is_empty()).then_some(NormalizedLine { ordinal, text })
        })
        .collect()
}

pub fn normalize_raw_lines(raw: &[RawLine]) -> Vec<NormalizedLine> {
    let texts: Vec<&str> = raw.iter().map(|l| l.text.as_str()).collect();
    normalize_lines(&texts)
}
