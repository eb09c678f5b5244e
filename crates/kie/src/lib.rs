//! Key-information extraction for OCR'd retail receipts.
//!
//! Input is the recognizer's line sequence (optionally with bounding boxes);
//! output is a [`ReceiptRecord`] with store fields, line items and a totals
//! triple that always satisfies `subtotal + tax ≈ total`.

/// Declare a function returning a lazily compiled, process-wide regex.
macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

pub mod assemble;
pub mod config;
pub mod fields;
pub mod normalize;
pub mod number;
pub mod segment;
pub mod totals;
pub mod types;

pub use assemble::{interpret, interpret_text, interpret_with_boxes, Interpreter};
pub use config::{ConfigError, EngineConfig};
pub use normalize::normalize_line;
pub use number::parse_number;
pub use types::{BoundingBox, Currency, LineItem, RawLine, ReceiptRecord, Store, Totals};
