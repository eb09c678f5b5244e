//! Totals reconciliation.
//!
//! Receipts print their totals redundantly and OCR garbles some of the copies,
//! so every labelled value is kept as a [`Candidate`] and the final
//! subtotal/tax/total triple is chosen against the item sum, then repaired
//! until `subtotal + tax` agrees with `total` within tolerance.

use regex::Regex;

use crate::config::EngineConfig;
use crate::number::{amounts, percentages, round_cents};
use crate::types::{NormalizedLine, Totals};

// ── Compiled regex cache ─────────────────────────────────────────────────────

re!(re_subtotal_kw, r"(?i)\bsub\s*-?\s*totale?\b");
re!(re_total_kw, r"(?i)\b(?:importo\s+)?totale?\b");
re!(re_total_of_tax, r"(?i)\btotale?\s+(?:i\.?v\.?a|imposta|imposte|tax|vat)\b");
re!(re_tax_kw, r"(?i)\b(?:i\.?v\.?a|vat|tax|imposta|imposte)\b");
re!(re_vat_id_label, r"(?i)\b(?:p\.?\s?iva|partita\s+iva)\b");

/// A labelled amount and the line position it was read from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub value: f64,
    pub position: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Candidates {
    pub totals: Vec<Candidate>,
    pub subtotals: Vec<Candidate>,
    pub taxes: Vec<Candidate>,
}

fn first_amount_after(text: &str, offset: usize) -> Option<f64> {
    amounts(text).into_iter().find(|a| a.start >= offset).map(|a| a.value)
}

fn last_amount_after(text: &str, offset: usize) -> Option<f64> {
    amounts(text).into_iter().filter(|a| a.start >= offset).last().map(|a| a.value)
}

/// Scan every line for labelled subtotal, total and tax amounts.
pub fn collect_candidates(lines: &[NormalizedLine]) -> Candidates {
    let mut out = Candidates::default();
    for (position, line) in lines.iter().enumerate() {
        let text = line.text.as_str();

        if let Some(m) = re_subtotal_kw().find(text) {
            if let Some(value) = first_amount_after(text, m.end()) {
                out.subtotals.push(Candidate { value, position });
            }
        } else if !re_total_of_tax().is_match(text) {
            if let Some(m) = re_total_kw().find(text) {
                if let Some(value) = first_amount_after(text, m.end()) {
                    out.totals.push(Candidate { value, position });
                }
            }
        }

        if re_vat_id_label().is_match(text) {
            continue;
        }
        if let Some(m) = re_tax_kw().find(text) {
            // Rows carrying only a rate ("IVA 22%") have no amount and are skipped.
            if let Some(value) = last_amount_after(text, m.end()) {
                out.taxes.push(Candidate { value, position });
            }
        }
    }
    out
}

fn closest_to(candidates: &[Candidate], target: f64) -> Option<f64> {
    candidates
        .iter()
        .min_by(|a, b| (a.value - target).abs().total_cmp(&(b.value - target).abs()))
        .map(|c| c.value)
}

/// Lowest `distance / (1 + position/len)`; on equal scores the later line wins.
fn best_total(candidates: &[Candidate], subtotal: f64, line_count: usize) -> Option<f64> {
    let n = line_count.max(1) as f64;
    let mut best: Option<(f64, f64)> = None;
    for c in candidates {
        let score = (c.value - subtotal).abs() / (1.0 + c.position as f64 / n);
        if best.map_or(true, |(s, _)| score <= s) {
            best = Some((score, c.value));
        }
    }
    best.map(|(_, v)| v)
}

fn trailing_amount(lines: &[NormalizedLine], window: usize) -> Option<f64> {
    let start = lines.len().saturating_sub(window);
    lines[start..]
        .iter()
        .rev()
        .find_map(|l| amounts(&l.text).last().map(|a| a.value))
}

fn footer_tax(candidates: &[Candidate], line_count: usize, window: usize) -> Option<f64> {
    let footer_start = line_count.saturating_sub(window);
    candidates
        .iter()
        .filter(|c| c.position >= footer_start)
        .last()
        .or_else(|| candidates.last())
        .map(|c| c.value)
}

/// Highest plausible VAT percentage printed anywhere on the receipt.
fn highest_vat_rate(lines: &[NormalizedLine], max_rate: f64) -> Option<f64> {
    lines
        .iter()
        .flat_map(|l| percentages(&l.text))
        .filter(|r| *r > 0.0 && *r <= max_rate)
        .max_by(f64::total_cmp)
}

/// Choose and repair the subtotal/tax/total triple for a document.
pub fn reconcile(lines: &[NormalizedLine], items_sum: f64, config: &EngineConfig) -> Totals {
    let candidates = collect_candidates(lines);
    let n = lines.len();
    tracing::debug!(
        totals = candidates.totals.len(),
        subtotals = candidates.subtotals.len(),
        taxes = candidates.taxes.len(),
        "totals candidates"
    );

    let items_sum = round_cents(items_sum);
    let mut subtotal = closest_to(&candidates.subtotals, items_sum).unwrap_or(items_sum);

    let mut total = best_total(&candidates.totals, subtotal, n)
        .or_else(|| trailing_amount(lines, config.total_fallback_lines))
        .unwrap_or(0.0)
        .max(0.0);

    let printed_tax = footer_tax(&candidates.taxes, n, config.tax_footer_lines);
    if subtotal <= 0.0 && total > 0.0 {
        // Nothing itemized and no subtotal printed: the total is all we have.
        subtotal = (total - printed_tax.unwrap_or(0.0)).max(0.0);
    }
    let mut tax = printed_tax
        .or_else(|| (total >= subtotal).then(|| total - subtotal))
        .unwrap_or(0.0)
        .max(0.0);

    // Sanity pass.
    subtotal = subtotal.max(0.0);
    if total == 0.0 {
        total = subtotal + tax;
    }
    if tax > config.tax_share_limit * total {
        let limit = config.tax_share_limit * total;
        tax = match highest_vat_rate(lines, config.max_reconcile_vat_rate) {
            Some(rate) => subtotal * rate / 100.0,
            // No printed rate: fall back to the printed difference when it is plausible.
            None => Some(total - subtotal).filter(|d| *d >= 0.0 && *d <= limit).unwrap_or(tax),
        };
        tracing::debug!(tax, "tax recomputed after exceeding share of total");
    }

    let mut out = Totals {
        subtotal: round_cents(subtotal),
        tax: round_cents(tax),
        total: round_cents(total),
    };
    if !out.is_consistent(config.tolerance_abs, config.tolerance_ratio) {
        tracing::debug!(from = out.total, to = out.subtotal + out.tax, "total snapped to subtotal + tax");
        out.total = round_cents(out.subtotal + out.tax);
    }
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────
