//! Runtime configuration.
//!
//! Loaded from a JSON file; every key is optional and falls back to the
//! value in [`CoreConfig::default`].

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{MAX_DUE_DAYS, MAX_ITEM_PRICE};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// SQLite database file.
    pub database_path: PathBuf,
    /// Root directory for scans and attachments.
    pub media_root: PathBuf,
    /// Largest accepted scan file, in bytes.
    pub max_scan_bytes: usize,
    /// Accepted scan extensions, without the dot.
    pub allowed_scan_extensions: Vec<String>,
    /// Flat shipping fee added to every invoice.
    pub shipping_fee: Decimal,
    /// Tax rate applied to the invoice subtotal.
    pub tax_rate: Decimal,
    /// Price of one prescription on orders and generated invoices.
    pub prescription_price: Decimal,
    /// Days between invoice generation and its due date.
    pub invoice_due_days: i64,
    /// Template created on demand when no active template exists.
    pub default_template_name: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("orthotics.db"),
            media_root: PathBuf::from("media"),
            max_scan_bytes: 50 * 1024 * 1024,
            allowed_scan_extensions: ["stl", "wrl", "vrml", "obj", "ply"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            shipping_fee: Decimal::new(1000, 2),
            tax_rate: Decimal::new(9, 2),
            prescription_price: Decimal::new(10000, 2),
            invoice_due_days: 30,
            default_template_name: "Default Template".to_string(),
        }
    }
}

impl CoreConfig {
    /// Read a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.max_scan_bytes > 0, "max_scan_bytes must be positive");
        ensure!(
            !self.allowed_scan_extensions.is_empty(),
            "allowed_scan_extensions must not be empty"
        );
        for (name, amount) in [
            ("shipping_fee", self.shipping_fee),
            ("prescription_price", self.prescription_price),
        ] {
            ensure!(!amount.is_sign_negative(), "{} must not be negative", name);
            ensure!(amount.normalize().scale() <= 2, "{} must have at most 2 decimal places", name);
            ensure!(amount <= MAX_ITEM_PRICE, "{} must not exceed {}", name, MAX_ITEM_PRICE);
        }
        ensure!(!self.tax_rate.is_sign_negative(), "tax_rate must not be negative");
        ensure!(
            (0..=MAX_DUE_DAYS).contains(&self.invoice_due_days),
            "invoice_due_days must be between 0 and {}",
            MAX_DUE_DAYS
        );
        ensure!(
            !self.default_template_name.trim().is_empty(),
            "default_template_name must not be empty"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::str::FromStr;

    #[test]
    fn test_defaults() {
        let config = CoreConfig::default();
        assert_eq!(config.max_scan_bytes, 52_428_800);
        assert_eq!(config.shipping_fee, Decimal::from_str("10.00").unwrap());
        assert_eq!(config.tax_rate, Decimal::from_str("0.09").unwrap());
        assert_eq!(config.prescription_price, Decimal::from_str("100.00").unwrap());
        assert_eq!(config.allowed_scan_extensions.len(), 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"media_root": "/srv/media", "invoice_due_days": 14}}"#).unwrap();

        let config = CoreConfig::load(file.path()).unwrap();
        assert_eq!(config.media_root, PathBuf::from("/srv/media"));
        assert_eq!(config.invoice_due_days, 14);
        assert_eq!(config.default_template_name, "Default Template");
    }

    #[test]
    fn test_load_rejects_bad_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"allowed_scan_extensions": []}}"#).unwrap();
        assert!(CoreConfig::load(file.path()).is_err());

        assert!(CoreConfig::load("/nonexistent/orthotics.json").is_err());
    }

    #[test]
    fn test_money_needs_cents_precision() {
        for raw in [
            r#"{"shipping_fee": "10.005"}"#,
            r#"{"prescription_price": "99.999"}"#,
            r#"{"prescription_price": "100000000.00"}"#,
        ] {
            let config: CoreConfig = serde_json::from_str(raw).unwrap();
            assert!(config.validate().is_err(), "{raw} accepted");
        }

        let config: CoreConfig = serde_json::from_str(r#"{"shipping_fee": "12.500"}"#).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_due_days_are_bounded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"invoice_due_days": 9223372036854775807}}"#).unwrap();
        assert!(CoreConfig::load(file.path()).is_err());

        let config = CoreConfig {
            invoice_due_days: MAX_DUE_DAYS,
            ..CoreConfig::default()
        };
        assert!(config.validate().is_ok());
    }
}
