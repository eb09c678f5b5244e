use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pixel rectangle of an OCR row, in image coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

/// One OCR row as delivered by the recognizer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawLine {
    pub text: String,
    #[serde(default)]
    pub bbox: Option<BoundingBox>,
}

impl RawLine {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), bbox: None }
    }

    pub fn with_box(text: impl Into<String>, bbox: BoundingBox) -> Self {
        Self { text: text.into(), bbox: Some(bbox) }
    }
}

/// A cleaned, non-empty line. `ordinal` is the index of the [`RawLine`] it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedLine {
    pub ordinal: usize,
    pub text: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Currency {
    #[default]
    #[serde(rename = "EUR")]
    Eur,
    #[serde(rename = "USD")]
    Usd,
    #[serde(rename = "GBP")]
    Gbp,
}

impl Currency {
    pub fn code(self) -> &'static str {
        match self {
            Currency::Eur => "EUR",
            Currency::Usd => "USD",
            Currency::Gbp => "GBP",
        }
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for Currency {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "EUR" => Ok(Currency::Eur),
            "USD" => Ok(Currency::Usd),
            "GBP" => Ok(Currency::Gbp),
            other => Err(format!("Unknown currency code: '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Store {
    /// Empty when no candidate line was found.
    pub name: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub vat_number: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub label_raw: String,
    /// Units for unit-priced items, kilograms for weighed ones.
    pub qty: f64,
    pub unit_price: f64,
    pub line_total: f64,
    pub vat_rate: Option<f64>,
    pub weight_kg: Option<f64>,
    pub price_per_kg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr_box: Option<BoundingBox>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Totals {
    pub subtotal: f64,
    pub tax: f64,
    pub total: f64,
}

impl Totals {
    /// Largest gap allowed between `subtotal + tax` and `total`.
    pub fn tolerance(&self, abs: f64, ratio: f64) -> f64 {
        abs.max(ratio * (self.subtotal + self.tax))
    }

    pub fn is_consistent(&self, abs: f64, ratio: f64) -> bool {
        (self.subtotal + self.tax - self.total).abs() <= self.tolerance(abs, ratio) + 1e-9
    }
}

/// The structured interpretation of one receipt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptRecord {
    pub store: Store,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_ocr_box: Option<BoundingBox>,
    /// `None` when no date was printed or it could not be read.
    pub datetime: Option<NaiveDateTime>,
    pub currency: Currency,
    pub lines: Vec<LineItem>,
    pub totals: Totals,
}

impl ReceiptRecord {
    /// Substitute `fallback` when the receipt carried no readable timestamp.
    pub fn fill_datetime(&mut self, fallback: DateTime<Utc>) {
        if self.datetime.is_none() {
            self.datetime = Some(fallback.naive_utc());
        }
    }

    pub fn items_sum(&self) -> f64 {
        self.lines.iter().map(|l| l.line_total).sum()
    }
}
