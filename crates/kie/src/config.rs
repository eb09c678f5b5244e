use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Scan windows and thresholds used by the interpretation heuristics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Leading lines considered for the store name.
    pub store_scan_lines: usize,
    /// Leading lines considered for address, city and postal code.
    pub address_scan_lines: usize,
    /// Leading lines searched for the VAT number before the whole document.
    pub vat_id_scan_lines: usize,
    /// Trailing lines searched for a bare amount when no total is labelled.
    pub total_fallback_lines: usize,
    /// Trailing lines in which a tax candidate is preferred.
    pub tax_footer_lines: usize,
    pub tolerance_abs: f64,
    pub tolerance_ratio: f64,
    /// Highest VAT rate accepted on an item line.
    pub max_item_vat_rate: f64,
    /// Highest VAT rate accepted when recomputing tax from a printed percentage.
    pub max_reconcile_vat_rate: f64,
    /// Tax above this share of the total is considered misread.
    pub tax_share_limit: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_scan_lines: 6,
            address_scan_lines: 12,
            vat_id_scan_lines: 15,
            total_fallback_lines: 6,
            tax_footer_lines: 8,
            tolerance_abs: 0.20,
            tolerance_ratio: 0.20,
            max_item_vat_rate: 24.0,
            max_reconcile_vat_rate: 25.0,
            tax_share_limit: 0.5,
        }
    }
}

impl EngineConfig {
    pub fn from_toml(toml_content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(toml_content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let windows = [
            ("store_scan_lines", self.store_scan_lines),
            ("address_scan_lines", self.address_scan_lines),
            ("vat_id_scan_lines", self.vat_id_scan_lines),
            ("total_fallback_lines", self.total_fallback_lines),
            ("tax_footer_lines", self.tax_footer_lines),
        ];
        if let Some((name, _)) = windows.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::Invalid(format!("{name} must be at least 1")));
        }
        if !(self.tolerance_abs >= 0.0 && self.tolerance_ratio >= 0.0) {
            return Err(ConfigError::Invalid("tolerances must be non-negative".into()));
        }
        for (name, rate) in [
            ("max_item_vat_rate", self.max_item_vat_rate),
            ("max_reconcile_vat_rate", self.max_reconcile_vat_rate),
        ] {
            if !(rate > 0.0 && rate <= 100.0) {
                return Err(ConfigError::Invalid(format!("{name} must be in (0, 100]")));
            }
        }
        if !(self.tax_share_limit > 0.0 && self.tax_share_limit <= 1.0) {
            return Err(ConfigError::Invalid("tax_share_limit must be in (0, 1]".into()));
        }
        Ok(())
    }
}
