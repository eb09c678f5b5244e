use crate::config::EngineConfig;
use crate::fields;
use crate::normalize::{normalize_lines, normalize_raw_lines};
use crate::segment::{segment, SegmentedItem};
use crate::totals::reconcile;
use crate::types::{BoundingBox, NormalizedLine, RawLine, ReceiptRecord};

/// Runs normalize → header fields → line items → totals over one document.
///
/// Holds no per-document state, so one instance can be shared across threads.
#[derive(Debug, Clone, Default)]
pub struct Interpreter {
    config: EngineConfig,
}

impl Interpreter {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Interpret plain OCR lines.
    pub fn interpret<S: AsRef<str>>(&self, lines: &[S]) -> ReceiptRecord {
        let normalized = normalize_lines(lines);
        self.build(&normalized, None)
    }

    /// Interpret OCR lines carrying bounding boxes; items and the store name
    /// get the box of the row they were read from.
    pub fn interpret_with_boxes(&self, lines: &[RawLine]) -> ReceiptRecord {
        let normalized = normalize_raw_lines(lines);
        self.build(&normalized, Some(lines))
    }

    /// Interpret a newline-separated OCR dump.
    pub fn interpret_text(&self, text: &str) -> ReceiptRecord {
        let lines: Vec<&str> = text.lines().collect();
        self.interpret(&lines)
    }

    fn build(&self, lines: &[NormalizedLine], raw: Option<&[RawLine]>) -> ReceiptRecord {
        let store = fields::extract_store(lines, &self.config);
        let datetime = fields::extract_datetime(lines);
        let currency = fields::extract_currency(lines);

        let segmented = segment(lines, &self.config);
        let items_sum: f64 = segmented.iter().map(|s| s.item.line_total).sum();
        let totals = reconcile(lines, items_sum, &self.config);
        tracing::debug!(
            lines = lines.len(),
            items = segmented.len(),
            total = totals.total,
            "receipt interpreted"
        );

        let store_ocr_box = raw.and_then(|raw| store_box(lines, raw, &store.name));
        let items = segmented
            .into_iter()
            .map(|SegmentedItem { mut item, position, .. }| {
                if let Some(raw) = raw {
                    item.ocr_box = box_at(lines, raw, position);
                }
                item
            })
            .collect();

        ReceiptRecord {
            store,
            store_ocr_box,
            datetime,
            currency,
            lines: items,
            totals,
        }
    }
}

fn box_at(lines: &[NormalizedLine], raw: &[RawLine], position: usize) -> Option<BoundingBox> {
    let ordinal = lines.get(position)?.ordinal;
    raw.get(ordinal)?.bbox
}

/// Box of the row the store name was read from, else the first raw row's.
fn store_box(lines: &[NormalizedLine], raw: &[RawLine], name: &str) -> Option<BoundingBox> {
    let from_name = if name.is_empty() {
        None
    } else {
        lines
            .iter()
            .position(|l| l.text == name)
            .and_then(|pos| box_at(lines, raw, pos))
    };
    from_name.or_else(|| raw.first()?.bbox)
}

/// Interpret plain OCR lines with the default configuration.
pub fn interpret<S: AsRef<str>>(lines: &[S]) -> ReceiptRecord {
    Interpreter::default().interpret(lines)
}

/// Interpret boxed OCR lines with the default configuration.
pub fn interpret_with_boxes(lines: &[RawLine]) -> ReceiptRecord {
    Interpreter::default().interpret_with_boxes(lines)
}

/// Interpret a newline-separated OCR dump with the default configuration.
pub fn interpret_text(text: &str) -> ReceiptRecord {
    Interpreter::default().interpret_text(text)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
