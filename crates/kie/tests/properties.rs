//! Property-based checks of the engine's invariants.

use proptest::prelude::*;
use tally_kie::normalize::{normalize_line, normalize_lines};
use tally_kie::segment::segment;
use tally_kie::{interpret, parse_number, EngineConfig};

/// Group the integer part of `cents` by thousands.
fn format_amount(cents: u64, group: char, decimal: char) -> String {
    let int = (cents / 100).to_string();
    let mut grouped = String::new();
    for (i, c) in int.chars().enumerate() {
        if i > 0 && (int.len() - i) % 3 == 0 {
            grouped.push(group);
        }
        grouped.push(c);
    }
    format!("{grouped}{decimal}{:02}", cents % 100)
}

fn receipt_line() -> impl Strategy<Value = String> {
    prop_oneof![
        "[A-Z]{3,10}( [A-Z]{2,8})? [0-9]{1,3},[0-9]{2}",
        "[A-Z]{3,10} [0-9] x [0-9]{1,2},[0-9]{2} [0-9]{1,3},[0-9]{2}",
        "[0-9],[0-9]{3} kg( x [0-9],[0-9]{2} €/kg)?",
        "[0-9]{1,3},[0-9]{2}",
        "(SUBTOTALE|TOTALE|IVA 22%|CONTANTI|RESTO) [0-9]{1,3},[0-9]{2}",
        "[A-Z ]{0,20}",
    ]
}

fn receipt() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(receipt_line(), 0..25)
}

proptest! {
    #[test]
    fn interpretation_is_deterministic(lines in receipt()) {
        prop_assert_eq!(interpret(&lines), interpret(&lines));
    }

    #[test]
    fn european_amounts_round_trip(cents in 0u64..10_000_000_000) {
        let text = format_amount(cents, '.', ',');
        let parsed = parse_number(&text);
        prop_assert!(parsed.is_some(), "{} did not parse", text);
        prop_assert!((parsed.unwrap_or_default() - cents as f64 / 100.0).abs() < 1e-6);
    }

    #[test]
    fn us_amounts_round_trip(cents in 0u64..10_000_000_000) {
        let text = format_amount(cents, ',', '.');
        let parsed = parse_number(&text);
        prop_assert!(parsed.is_some(), "{} did not parse", text);
        prop_assert!((parsed.unwrap_or_default() - cents as f64 / 100.0).abs() < 1e-6);
    }

    #[test]
    fn totals_stay_within_tolerance(lines in receipt()) {
        let t = interpret(&lines).totals;
        let gap = (t.subtotal + t.tax - t.total).abs();
        let tolerance = 0.20f64.max(0.20 * (t.subtotal + t.tax));
        prop_assert!(gap <= tolerance + 1e-9, "{:?}", t);
        prop_assert!(t.subtotal >= 0.0 && t.tax >= 0.0 && t.total >= 0.0);
    }

    #[test]
    fn normalization_is_idempotent(raw in "\\PC{0,80}") {
        let once = normalize_line(&raw);
        prop_assert_eq!(normalize_line(&once), once);
    }

    #[test]
    fn no_line_feeds_two_items(lines in receipt()) {
        let normalized = normalize_lines(&lines);
        let items = segment(&normalized, &EngineConfig::default());
        let mut seen = vec![false; normalized.len()];
        for item in &items {
            for &idx in &item.consumed {
                prop_assert!(!seen[idx], "line {} claimed twice", idx);
                seen[idx] = true;
            }
        }
    }
}

#[test]
fn format_amount_groups_thousands() {
    assert_eq!(format_amount(123_456_789, '.', ','), "1.234.567,89");
    assert_eq!(format_amount(5, ',', '.'), "0.05");
}
