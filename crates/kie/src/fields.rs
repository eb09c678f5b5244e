use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;

use crate::config::EngineConfig;
use crate::types::{Currency, NormalizedLine, Store};

// ── Compiled regex cache ─────────────────────────────────────────────────────

re!(re_street,
    r"(?i)\b(?:via|viale|v\.?le|piazza|p\.?za|p\.?zza|corso|cso\.?|largo|lgo\.|strada|str\.)(?:\s|\.|$)");
re!(re_postal_code, r"\b(\d{5})\b");
re!(re_city_run, r"([A-ZÀ-Ý][A-ZÀ-Ý\s'\-]{2,})");
re!(re_vat_id,
    r"(?i)\b(?:p[\s.]*i[\s.]*v[\s.]*a|partita\s+i[\s.]*v[\s.]*a|v[\s.]*a[\s.]*t)\D*?(\d{11})(?:\D|$)");
re!(re_datetime,
    r"(\d{1,2})[./-](\d{1,2})[./-](\d{2,4})(?:\s+(\d{1,2}):(\d{2})(?::(\d{2}))?\s?([AaPp][Mm])?)?");
re!(re_eur, r"(?i)\bEUR\b");
re!(re_usd, r"(?i)\bUSD\b");
re!(re_gbp, r"(?i)\bGBP\b");

// ── Store ─────────────────────────────────────────────────────────────────────

/// First line near the top that reads like a name rather than a number.
pub fn extract_store_name(lines: &[NormalizedLine], config: &EngineConfig) -> Option<String> {
    lines
        .iter()
        .take(config.store_scan_lines)
        .map(|l| l.text.as_str())
        .find(|l| {
            let letters = l.chars().filter(|c| c.is_alphabetic()).count();
            let digits = l.chars().filter(|c| c.is_ascii_digit()).count();
            letters >= 3 && digits <= 2 && l.chars().count() >= 3
        })
        .or_else(|| lines.first().map(|l| l.text.as_str()))
        .map(str::to_string)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Location {
    pub address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
}

pub fn extract_location(lines: &[NormalizedLine], config: &EngineConfig) -> Location {
    let mut loc = Location::default();
    for line in lines.iter().take(config.address_scan_lines) {
        let l = line.text.as_str();
        if loc.postal_code.is_none() {
            loc.postal_code = re_postal_code().captures(l).map(|c| c[1].to_string());
        }
        if loc.address.is_none() && re_street().is_match(l) {
            loc.address = Some(l.to_string());
        }
    }
    // The postal-code row may sit above or below the street row.
    if let (Some(_), Some(cap)) = (loc.address.as_ref(), loc.postal_code.as_deref()) {
        loc.city = lines
            .iter()
            .take(config.address_scan_lines)
            .find_map(|l| city_after_postal_code(&l.text, cap));
    }
    loc
}

fn city_after_postal_code(line: &str, postal_code: &str) -> Option<String> {
    let (_, tail) = line.rsplit_once(postal_code)?;
    let run = re_city_run().find(tail.trim())?;
    let city = run.as_str().trim_end_matches([' ', '-', '\'']).trim();
    (city.chars().filter(|c| c.is_alphabetic()).count() >= 3).then(|| title_case(city))
}

/// Capitalize the first letter of each alphabetic run, lowercase the rest.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

pub fn extract_vat_number(lines: &[NormalizedLine], config: &EngineConfig) -> Option<String> {
    let find = |l: &NormalizedLine| re_vat_id().captures(&l.text).map(|c| c[1].to_string());
    lines
        .iter()
        .take(config.vat_id_scan_lines)
        .find_map(find)
        .or_else(|| lines.iter().find_map(find))
}

pub fn extract_store(lines: &[NormalizedLine], config: &EngineConfig) -> Store {
    let loc = extract_location(lines, config);
    Store {
        name: extract_store_name(lines, config).unwrap_or_default(),
        address: loc.address,
        city: loc.city,
        postal_code: loc.postal_code,
        vat_number: extract_vat_number(lines, config),
    }
}

// ── Datetime ──────────────────────────────────────────────────────────────────

/// The first day-first date on the receipt, with its time when printed beside it.
pub fn extract_datetime(lines: &[NormalizedLine]) -> Option<NaiveDateTime> {
    let text = lines.iter().map(|l| l.text.as_str()).collect::<Vec<_>>().join(" ");
    let c = re_datetime().captures(&text)?;

    let mut day: u32 = c.get(1)?.as_str().parse().ok()?;
    let mut month: u32 = c.get(2)?.as_str().parse().ok()?;
    let year = expand_year(c.get(3)?.as_str())?;
    if month > 12 && day <= 12 {
        std::mem::swap(&mut day, &mut month);
    }
    let date = NaiveDate::from_ymd_opt(year, month, day)?;

    let time = match (c.get(4), c.get(5)) {
        (Some(h), Some(m)) => {
            let mut hour: u32 = h.as_str().parse().ok()?;
            let minute: u32 = m.as_str().parse().ok()?;
            let second: u32 = c.get(6).map_or(Some(0), |s| s.as_str().parse().ok())?;
            if let Some(meridiem) = c.get(7) {
                let pm = meridiem.as_str().eq_ignore_ascii_case("pm");
                hour = match (hour, pm) {
                    (12, false) => 0,
                    (h, true) if h < 12 => h + 12,
                    (h, _) => h,
                };
            }
            // An unreadable time still leaves a usable date.
            NaiveTime::from_hms_opt(hour, minute, second).unwrap_or(NaiveTime::MIN)
        }
        _ => NaiveTime::MIN,
    };
    Some(date.and_time(time))
}

fn expand_year(s: &str) -> Option<i32> {
    let y: i32 = s.parse().ok()?;
    match s.len() {
        2 => Some(2000 + y),
        4 => Some(y),
        _ => None,
    }
}

// ── Currency ──────────────────────────────────────────────────────────────────

pub fn extract_currency(lines: &[NormalizedLine]) -> Currency {
    let has = |sym: char, re: &Regex| lines.iter().any(|l| l.text.contains(sym) || re.is_match(&l.text));
    if has('€', re_eur()) {
        Currency::Eur
    } else if has('$', re_usd()) {
        Currency::Usd
    } else if has('£', re_gbp()) {
        Currency::Gbp
    } else {
        Currency::Eur
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
