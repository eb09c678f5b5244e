//! Line-item segmentation.
//!
//! Each normalized line is classified into a [`LinePattern`] by trying the
//! patterns in a fixed priority order. The segmenter then walks the lines top to
//! bottom, turning product lines into [`LineItem`]s and stitching weighed items
//! that OCR split over two or three rows. Every line index is consumed at most
//! once per document.

use regex::Regex;

use crate::config::EngineConfig;
use crate::number::{amounts, parse_number, round_cents, Amount};
use crate::types::{LineItem, NormalizedLine};

// ── Compiled regex cache ─────────────────────────────────────────────────────

re!(re_blacklist,
    r"(?i)\b(?:totale\s+complessivo|totale\s+euro|sub\s*totale?|totale?|pagamento|resto|sconto|bancomat|carta\s+di\s+credito|contanti|articoli|importo|cassa|change|cash|discount)\b");
// Keywords that, leading a line, mark it as a totals/payment/tax row even when priced.
re!(re_blacklist_lead,
    r"(?i)^[^\p{L}\d]*(?:totale\s+complessivo|totale\s+euro|sub\s*totale?|totale?|pagamento|resto|sconto|bancomat|carta\s+di\s+credito|contanti|articoli|importo|cassa|change|cash|discount|p\.?\s?iva|i\.?v\.?a\.?|imposta|aliquota|vat|tax)\b");
re!(re_date_stamp, r"\b\d{1,2}[./-]\d{1,2}[./-]\d{2,4}\b");
re!(re_price_only, r"(?i)^(?:[€$£]|eur)?\s*(-?\d+(?:[.,]\d{3})*[.,]\d{2})\s*(?:€|eur)?$");
re!(re_qty_price_total,
    r"^(?P<label>.+?)\s+(?P<qty>\d+(?:[.,]\d+)?)\s*[xX*]\s*(?:[€$£]\s?)?(?P<unit>-?\d+(?:[.,]\d{3})*[.,]\d{2})\s+(?:[€$£]\s?)?(?P<tot>-?\d+(?:[.,]\d{3})*[.,]\d{2})(?:\s+.*?(?P<vat>\d{1,2}(?:[.,]\d+)?)\s*%)?\s*$");
re!(re_label_total,
    r"(?i)^(?P<label>.+?)\s+(?:[€$£]\s?|eur\s)?(?P<tot>-?\d+(?:[.,]\d{3})*[.,]\d{2})(?:\s+.*?(?P<vat>\d{1,2}(?:[.,]\d+)?)\s*%)?\s*$");
re!(re_weight_suffix,
    r"(?i)(?P<w>\d+(?:[.,]\d+)?)\s*(?P<unit>kgs?|kilo|kil|hg|etto|ett|grammi|gr|g)\b");
re!(re_weight_prefix, r"(?i)\b(?P<unit>kg)\s*(?P<w>\d+(?:[.,]\d+)?)\b");
re!(re_price_per_unit,
    r"(?i)(?P<p>\d+[.,]\d+)\s*(?:€|eur[o]?)?\s*(?:/|\bal\b|\bper\b)\s*(?P<unit>kg|hg|etto)\b");
re!(re_price_at, r"(?i)[x@]\s*(?:€\s?)?(?P<p>\d+[.,]\d+)");
re!(re_weight_filler,
    r"(?i)\b(?:x|al|per|eur|euro|kgs?|hg|g|gr|prezzo|peso|netto|lordo|tara)\b");
re!(re_vat_percent, r"(\d{1,2}(?:[.,]\d+)?)\s*%");
re!(re_vat_label,
    r"(?i)(?:\bIVA\b|\bI\.?V\.?A\.?|\bALIQ(?:UOTA)?\b)[^\d%]{0,10}(\d{1,2}(?:[.,]\d+)?)%?");

// ── Line patterns ─────────────────────────────────────────────────────────────

/// Weight reading found on a line, normalized to kilograms.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightInfo {
    pub weight_kg: f64,
    pub price_per_kg: Option<f64>,
    /// Amount printed on the same row that is neither the weight nor the unit price.
    pub total: Option<f64>,
    /// Looks like a scale reading (fractional kilograms or a per-kg price)
    /// rather than a pack size such as `500G`.
    pub weighed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LinePattern {
    /// `label qty x unit total [vat%]`
    QtyPriceTotal { label: String, qty: f64, unit_price: f64, total: f64, vat: Option<f64> },
    /// `label total [vat%]`, or a label followed somewhere by its last amount.
    LabelTotal { label: String, total: f64, vat: Option<f64> },
    /// A row carrying only a weight reading and its prices.
    WeightLine(WeightInfo),
    /// A row carrying a single amount and nothing else.
    PriceOnly(f64),
    /// Totals, payments, tax summaries and timestamps.
    Blacklisted,
    Unmatched,
}

fn letter_count(s: &str) -> usize {
    s.chars().filter(|c| c.is_alphabetic()).count()
}

fn is_label(s: &str) -> bool {
    letter_count(s) >= 2
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn overlaps(a: &Amount, start: usize, end: usize) -> bool {
    a.start < end && start < a.end
}

fn to_kg(value: f64, unit: &str) -> f64 {
    let unit = unit.to_lowercase();
    if unit.starts_with('g') {
        value / 1000.0
    } else if unit.starts_with("hg") || unit.starts_with("ett") {
        value / 10.0
    } else {
        value
    }
}

/// Read a weight token (`1,200 kg`, `350 g`, `KG 1.200`) and any prices beside it.
pub fn parse_weight(text: &str) -> Option<WeightInfo> {
    let (span, raw_weight, unit) = if let Some(c) = re_weight_suffix().captures(text) {
        let m = c.get(0)?;
        (m.start()..m.end(), c.name("w")?.as_str(), c.name("unit")?.as_str())
    } else {
        let c = re_weight_prefix().captures(text)?;
        let m = c.get(0)?;
        (m.start()..m.end(), c.name("w")?.as_str(), c.name("unit")?.as_str())
    };
    let weight_kg = to_kg(parse_number(raw_weight)?, unit);

    let per_unit = re_price_per_unit()
        .captures(text)
        .and_then(|c| {
            let m = c.get(0)?;
            let price = parse_number(c.name("p")?.as_str())?;
            let per_kg = match c.name("unit")?.as_str().to_lowercase().as_str() {
                "kg" => price,
                _ => price * 10.0,
            };
            Some((m.start()..m.end(), per_kg))
        })
        .or_else(|| {
            let c = re_price_at().captures(text)?;
            let m = c.get(0)?;
            Some((m.start()..m.end(), parse_number(c.name("p")?.as_str())?))
        });

    let total = amounts(text)
        .into_iter()
        .filter(|a| !overlaps(a, span.start, span.end))
        .filter(|a| per_unit.as_ref().map_or(true, |(r, _)| !overlaps(a, r.start, r.end)))
        .last()
        .map(|a| a.value);

    let is_kg = unit.to_lowercase().starts_with('k');
    let weighed = per_unit.is_some() || (is_kg && raw_weight.contains(['.', ',']) && weight_kg.fract() != 0.0);

    Some(WeightInfo {
        weight_kg,
        price_per_kg: per_unit.map(|(_, p)| p),
        total,
        weighed,
    })
}

fn is_weight_row(text: &str) -> bool {
    let residue = re_weight_suffix().replace_all(text, " ");
    let residue = re_weight_prefix().replace_all(&residue, " ");
    let residue = re_weight_filler().replace_all(&residue, " ");
    letter_count(&residue) < 3
}

fn is_blacklisted(text: &str) -> bool {
    if re_date_stamp().is_match(text) || re_blacklist_lead().is_match(text) {
        return true;
    }
    // A keyword further along the row only excludes it when nothing is priced.
    re_blacklist().is_match(text) && amounts(text).is_empty()
}

fn optional_vat(c: &regex::Captures<'_>) -> Option<f64> {
    c.name("vat").and_then(|m| parse_number(m.as_str()))
}

/// Classify a normalized line, first matching pattern wins.
pub fn classify(text: &str) -> LinePattern {
    let text = text.trim();
    if text.is_empty() {
        return LinePattern::Unmatched;
    }
    if is_blacklisted(text) {
        return LinePattern::Blacklisted;
    }
    if let Some(c) = re_price_only().captures(text) {
        if let Some(v) = parse_number(&c[1]) {
            return LinePattern::PriceOnly(v);
        }
    }
    if is_weight_row(text) {
        if let Some(w) = parse_weight(text) {
            return LinePattern::WeightLine(w);
        }
    }
    if let Some(c) = re_qty_price_total().captures(text) {
        let label = c["label"].trim().to_string();
        let parsed = (
            parse_number(&c["qty"]),
            parse_number(&c["unit"]),
            parse_number(&c["tot"]),
        );
        if let (Some(qty), Some(unit_price), Some(total)) = parsed {
            if is_label(&label) {
                let qty = if qty > 0.0 { qty } else { 1.0 };
                return LinePattern::QtyPriceTotal { label, qty, unit_price, total, vat: optional_vat(&c) };
            }
        }
    }
    if let Some(c) = re_label_total().captures(text) {
        let label = c["label"].trim().to_string();
        if let Some(total) = parse_number(&c["tot"]) {
            if is_label(&label) {
                return LinePattern::LabelTotal { label, total, vat: optional_vat(&c) };
            }
        }
    }
    // Last amount on the row is the total, whatever trails it.
    if let Some(last) = amounts(text).last() {
        let label = text[..last.start].trim();
        if is_label(label) && !re_blacklist().is_match(label) {
            let vat = re_vat_percent()
                .captures(text)
                .and_then(|c| parse_number(&c[1]));
            return LinePattern::LabelTotal { label: label.to_string(), total: last.value, vat };
        }
    }
    LinePattern::Unmatched
}

/// A row with no amount at all can still name a product priced on a neighbour.
fn label_only(text: &str) -> Option<String> {
    (amounts(text).is_empty() && is_label(text)).then(|| text.trim().to_string())
}

// ── Label post-processing ────────────────────────────────────────────────────

/// Remove VAT-rate tokens from a label, returning the last plausible rate seen.
pub fn strip_vat_tokens(label: &str, existing: Option<f64>, max_rate: f64) -> (String, Option<f64>) {
    let plausible = |v: f64| v > 0.0 && v <= max_rate;
    let mut vat = existing;
    let mut cleaned = label.to_string();

    for c in re_vat_percent().captures_iter(label) {
        if let Some(v) = parse_number(&c[1]).filter(|v| plausible(*v)) {
            vat = Some(v);
            cleaned = cleaned.replacen(&c[0], " ", 1);
        }
    }
    let snapshot = cleaned.clone();
    for c in re_vat_label().captures_iter(&snapshot) {
        if let Some(v) = parse_number(&c[1]).filter(|v| plausible(*v)) {
            vat = Some(v);
            cleaned = cleaned.replacen(&c[0], " ", 1);
        }
    }
    (collapse(&cleaned), vat)
}

pub fn remove_weight_tokens(label: &str) -> String {
    let out = re_weight_suffix().replace_all(label, " ");
    let out = re_weight_prefix().replace_all(&out, " ");
    collapse(&out)
}

// ── Segmentation ──────────────────────────────────────────────────────────────

/// Per-document record of which line indices already belong to an item.
#[derive(Debug)]
struct ConsumedLines(Vec<bool>);

impl ConsumedLines {
    fn new(len: usize) -> Self {
        Self(vec![false; len])
    }

    fn is_free(&self, idx: usize) -> bool {
        self.0.get(idx).is_some_and(|used| !used)
    }

    fn claim(&mut self, idx: usize) {
        if let Some(slot) = self.0.get_mut(idx) {
            *slot = true;
        }
    }
}

/// An accepted item together with the line positions it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentedItem {
    pub item: LineItem,
    /// Position (in the normalized sequence) of the row carrying the label.
    pub position: usize,
    /// Every position claimed by this item, `position` included.
    pub consumed: Vec<usize>,
}

struct Draft {
    label: String,
    qty: f64,
    unit_price: Option<f64>,
    total: Option<f64>,
    vat: Option<f64>,
}

struct Segmenter<'a> {
    patterns: Vec<LinePattern>,
    lines: &'a [NormalizedLine],
    consumed: ConsumedLines,
    config: &'a EngineConfig,
}

impl<'a> Segmenter<'a> {
    fn new(lines: &'a [NormalizedLine], config: &'a EngineConfig) -> Self {
        Self {
            patterns: lines.iter().map(|l| classify(&l.text)).collect(),
            lines,
            consumed: ConsumedLines::new(lines.len()),
            config,
        }
    }

    fn free_weight(&self, idx: usize) -> Option<&WeightInfo> {
        match self.patterns.get(idx) {
            Some(LinePattern::WeightLine(w)) if self.consumed.is_free(idx) => Some(w),
            _ => None,
        }
    }

    fn free_price(&self, idx: usize) -> Option<f64> {
        match self.patterns.get(idx) {
            Some(LinePattern::PriceOnly(p)) if self.consumed.is_free(idx) => Some(*p),
            _ => None,
        }
    }

    /// Weight row at `weight_idx`, priced either on itself or on the bare amount at `price_idx`.
    fn stitch_at(&self, weight_idx: usize, price_idx: usize) -> Option<(WeightInfo, f64, Vec<usize>)> {
        let w = self.free_weight(weight_idx)?;
        if let Some(total) = w.total {
            return Some((w.clone(), total, vec![weight_idx]));
        }
        let price = self.free_price(price_idx)?;
        Some((w.clone(), price, vec![weight_idx, price_idx]))
    }

    fn stitch(&self, i: usize) -> Option<(WeightInfo, f64, Vec<usize>)> {
        self.stitch_at(i + 1, i + 2)
            .or_else(|| i.checked_sub(1).and_then(|prev| self.stitch_at(prev, i + 1)))
    }

    fn draft(&self, i: usize) -> Option<Draft> {
        match &self.patterns[i] {
            LinePattern::QtyPriceTotal { label, qty, unit_price, total, vat } => Some(Draft {
                label: label.clone(),
                qty: *qty,
                unit_price: Some(*unit_price),
                total: Some(*total),
                vat: *vat,
            }),
            LinePattern::LabelTotal { label, total, vat } => Some(Draft {
                label: label.clone(),
                qty: 1.0,
                unit_price: Some(*total),
                total: Some(*total),
                vat: *vat,
            }),
            LinePattern::Unmatched => label_only(&self.lines[i].text).map(|label| Draft {
                label,
                qty: 1.0,
                unit_price: None,
                total: None,
                vat: None,
            }),
            _ => None,
        }
    }

    fn item_at(&self, i: usize) -> Option<SegmentedItem> {
        let mut draft = self.draft(i)?;
        let mut consumed = vec![i];
        let mut weight: Option<WeightInfo> = None;

        if draft.total.is_none() {
            let (w, total, used) = self.stitch(i)?;
            tracing::debug!(position = i, ?used, total, "stitched weighed item");
            draft.total = Some(total);
            weight = Some(w);
            consumed.extend(used);
        }
        let total = draft.total?;

        let (label, vat) = strip_vat_tokens(&draft.label, draft.vat, self.config.max_item_vat_rate);
        let label = remove_weight_tokens(&label);
        if !is_label(&label) {
            tracing::trace!(position = i, "rejected row without a usable label");
            return None;
        }
        let vat = vat.filter(|v| *v > 0.0 && *v <= self.config.max_item_vat_rate);

        if weight.is_none() {
            weight = parse_weight(&self.lines[i].text).filter(|w| w.weighed);
        }
        if weight.is_none() {
            let adjacent = [Some(i + 1), i.checked_sub(1)];
            if let Some((idx, w)) = adjacent
                .into_iter()
                .flatten()
                .find_map(|idx| self.free_weight(idx).map(|w| (idx, w.clone())))
            {
                consumed.push(idx);
                weight = Some(w);
            }
        }

        let mut item = LineItem {
            label_raw: label,
            qty: draft.qty,
            unit_price: draft.unit_price.filter(|u| *u != 0.0).unwrap_or_else(|| {
                round_cents(total / draft.qty.max(1e-6))
            }),
            line_total: total,
            vat_rate: vat,
            weight_kg: None,
            price_per_kg: None,
            ocr_box: None,
        };

        if let Some(w) = weight.filter(|w| w.weight_kg > 0.0) {
            let per_kg = w
                .price_per_kg
                .unwrap_or_else(|| round_cents(total / w.weight_kg));
            item.qty = w.weight_kg;
            item.weight_kg = Some(w.weight_kg);
            item.unit_price = per_kg;
            item.price_per_kg = Some(per_kg);
        }

        consumed.sort_unstable();
        consumed.dedup();
        Some(SegmentedItem { item, position: i, consumed })
    }

    fn run(mut self) -> Vec<SegmentedItem> {
        let mut items = Vec::new();
        for i in 0..self.lines.len() {
            if !self.consumed.is_free(i) {
                continue;
            }
            if let Some(seg) = self.item_at(i) {
                for &idx in &seg.consumed {
                    self.consumed.claim(idx);
                }
                items.push(seg);
            }
        }
        items.sort_by_key(|s| s.position);
        items
    }
}

/// Extract line items in receipt order.
pub fn segment(lines: &[NormalizedLine], config: &EngineConfig) -> Vec<SegmentedItem> {
    Segmenter::new(lines, config).run()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
