//! End-to-end receipts through the public API.

use chrono::{NaiveDate, TimeZone, Utc};
use tally_kie::{
    interpret, interpret_text, interpret_with_boxes, BoundingBox, Currency, EngineConfig,
    Interpreter, RawLine, Totals,
};

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

fn carrefour() -> Vec<&'static str> {
    vec![
        "CARREFOUR EXPRESS",
        "Via Roma 123, Milano",
        "P.IVA: 12345678901",
        "LATTE INTERO LT 1.0    2.50",
        "PANE INTEGRALE 500G    1.80",
        "SUBTOTALE: 4.30",
        "TOTALE: 4.30",
    ]
}

#[test]
fn supermarket_receipt() {
    let rec = interpret(&carrefour());

    assert_eq!(rec.store.name, "CARREFOUR EXPRESS");
    assert_eq!(rec.store.vat_number.as_deref(), Some("12345678901"));
    assert_eq!(rec.store.address.as_deref(), Some("Via Roma 123, Milano"));

    let totals: Vec<f64> = rec.lines.iter().map(|l| l.line_total).collect();
    assert_eq!(totals.len(), 2);
    assert!(close(totals[0], 2.50));
    assert!(close(totals[1], 1.80));
    assert!(rec.lines.iter().all(|l| l.weight_kg.is_none()));

    assert!(close(rec.totals.subtotal, 4.30));
    assert!(close(rec.totals.total, 4.30));
    assert!(close(rec.totals.tax, 0.0));
}

#[test]
fn inline_weight_without_continuation() {
    let rec = interpret(&["POMODORI KG 1.200 3.60"]);
    assert_eq!(rec.lines.len(), 1);
    let item = &rec.lines[0];
    assert_eq!(item.label_raw, "POMODORI");
    assert!(close(item.weight_kg.unwrap_or_default(), 1.2));
    assert!(close(item.line_total, 3.60));
    assert!(close(item.price_per_kg.unwrap_or_default(), 3.0));
}

#[test]
fn duplicate_total_candidates_agree() {
    let rec = interpret(&["TOTALE 9.10", "TOTALE DA PAGARE 9.10"]);
    assert!(rec.lines.is_empty());
    assert!(close(rec.totals.total, 9.10));
    assert!(rec.totals.is_consistent(0.20, 0.20));
}

#[test]
fn printed_receipt_with_euro_prefixes() {
    let text = "\
CARREFOUR EXPRESS
Via Roma 123, Milano
P.IVA: 12345678901

SCONTRINO FISCALE
12/10/2025 15:30:25

LATTE INTERO LT 1.0    €2.50
PANE INTEGRALE 500G    €1.80
POMODORI KG 1.200      €3.60
PASTA BARILLA 500G     €1.20

SUBTOTALE:             €9.10
TOTALE:                €9.10

CONTANTI:              €10.00
RESTO:                 €0.90

Grazie per la visita!
";
    let rec = interpret_text(text);

    let labels: Vec<&str> = rec.lines.iter().map(|l| l.label_raw.as_str()).collect();
    assert_eq!(labels, ["LATTE INTERO LT 1.0", "PANE INTEGRALE", "POMODORI", "PASTA BARILLA"]);
    // pack sizes are stripped from labels but never set a weight
    assert!(rec.lines.iter().filter(|l| l.label_raw != "POMODORI").all(|l| l.weight_kg.is_none()));
    assert!(close(rec.items_sum(), 9.10));
    assert!(close(rec.totals.subtotal, 9.10));
    assert!(close(rec.totals.total, 9.10));
    assert!(close(rec.totals.tax, 0.0));
    assert_eq!(rec.currency, Currency::Eur);

    let expected = NaiveDate::from_ymd_opt(2025, 10, 12).and_then(|d| d.and_hms_opt(15, 30, 25));
    assert_eq!(rec.datetime, expected);
}

#[test]
fn missing_datetime_filled_by_caller() {
    let mut rec = interpret(&carrefour());
    assert!(rec.datetime.is_none());
    let now = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
    rec.fill_datetime(now);
    assert_eq!(rec.datetime, Some(now.naive_utc()));
}

#[test]
fn dollar_receipt() {
    let rec = interpret(&["CORNER DELI", "SANDWICH $6.50", "COFFEE $2.00", "TOTAL $8.50"]);
    assert_eq!(rec.currency, Currency::Usd);
    assert_eq!(rec.lines.len(), 2);
    assert!(close(rec.totals.total, 8.50));
}

#[test]
fn bounding_boxes_carried_to_items() {
    let bb = |y| BoundingBox { x: 12, y, w: 300, h: 20 };
    let raw: Vec<RawLine> = carrefour()
        .into_iter()
        .enumerate()
        .map(|(i, t)| RawLine::with_box(t, bb(i as i32 * 25)))
        .collect();

    let rec = interpret_with_boxes(&raw);
    assert_eq!(rec.store_ocr_box, Some(bb(0)));
    let boxes: Vec<_> = rec.lines.iter().map(|l| l.ocr_box).collect();
    assert_eq!(boxes, vec![Some(bb(75)), Some(bb(100))]);

    // identical semantics apart from the boxes
    let mut plain = interpret(&carrefour());
    plain.store_ocr_box = rec.store_ocr_box;
    for (p, b) in plain.lines.iter_mut().zip(&rec.lines) {
        p.ocr_box = b.ocr_box;
    }
    assert_eq!(plain, rec);
}

#[test]
fn empty_document() {
    let empty: [&str; 0] = [];
    let rec = interpret(&empty);
    assert!(rec.lines.is_empty());
    assert_eq!(rec.totals, Totals::default());
    assert_eq!(rec.store.name, "");
    assert_eq!(rec.currency, Currency::Eur);
}

#[test]
fn record_json_shape() {
    let rec = interpret(&["POMODORI KG 1.200 3.60", "TOTALE 3.60"]);
    let json = serde_json::to_value(&rec).unwrap();
    assert_eq!(json["currency"], "EUR");
    assert!(json["store"].get("vatNumber").is_some());
    let item = &json["lines"][0];
    assert_eq!(item["labelRaw"], "POMODORI");
    assert!(item.get("lineTotal").is_some());
    assert!(item.get("pricePerKg").is_some());
    assert!(item.get("ocrBox").is_none());
    assert!(json.get("storeOcrBox").is_none());
}

#[test]
fn config_from_toml_changes_store_window() {
    let config = EngineConfig::from_toml("store_scan_lines = 1").unwrap();
    let rec = Interpreter::new(config).interpret(&["0001", "NEGOZIO"]);
    assert_eq!(rec.store.name, "0001");
}
