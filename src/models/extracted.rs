use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Business fields pulled out of a document.
///
/// Known keys are typed; anything else the extractor (or a caller) records is
/// kept in `other` and serialized flat alongside them, so the stored JSON keeps
/// the stable key names (`lot_number`, `invoice_number`, `total_amount`, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lot_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fob_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roe_ours: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roe_client: Option<f64>,
    #[serde(flatten)]
    pub other: BTreeMap<String, serde_json::Value>,
}

impl ExtractedFields {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Amount, date and counterparty, only when all three are present.
    pub fn field_tuple(&self) -> Option<(f64, NaiveDate, &str)> {
        match (self.total_amount, self.invoice_date, self.supplier_name.as_deref()) {
            (Some(amount), Some(date), Some(name)) if !name.trim().is_empty() => {
                Some((amount, date, name))
            }
            _ => None,
        }
    }

    /// Record an unclassified value under a free-form key.
    pub fn insert_other(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.other.insert(key.into(), value.into());
    }

    /// Fill every missing known field from `fallback`, leaving present ones untouched.
    pub fn merge_missing(&mut self, fallback: ExtractedFields) {
        self.lot_number = self.lot_number.take().or(fallback.lot_number);
        self.supplier_name = self.supplier_name.take().or(fallback.supplier_name);
        self.client_name = self.client_name.take().or(fallback.client_name);
        self.invoice_number = self.invoice_number.take().or(fallback.invoice_number);
        self.total_amount = self.total_amount.or(fallback.total_amount);
        self.invoice_date = self.invoice_date.or(fallback.invoice_date);
        self.fob_amount = self.fob_amount.or(fallback.fob_amount);
        self.roe_ours = self.roe_ours.or(fallback.roe_ours);
        self.roe_client = self.roe_client.or(fallback.roe_client);
        for (key, value) in fallback.other {
            self.other.entry(key).or_insert(value);
        }
    }
}
