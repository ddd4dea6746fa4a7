//! Duplicate detection for incoming files.
//!
//! Five independent strategies run against existing documents and their
//! results are unioned:
//! - exact filename (case-insensitive) within the lookback window
//! - fuzzy filename (normalized Levenshtein) within the lookback window
//! - invoice number from extracted fields
//! - (amount, invoice date, supplier) field tuple
//! - content hash over the raw bytes
//!
//! Detection is advisory. A failing lookup is logged and contributes no
//! matches; the engine never mutates anything and never blocks on its own.
//! Two near-simultaneous uploads of the same bytes can both come back clean:
//! the window is read without locks and that race is accepted.

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{repository, DatabaseError};
use crate::models::enums::MatchStrategy;
use crate::models::{Document, ExtractedFields};

use super::hash::compute_content_hash;
use super::similarity::{filename_similarity, is_exact_filename_match};

const INVOICE_NUMBER_CONFIDENCE: f64 = 0.95;
const FIELD_TUPLE_CONFIDENCE: f64 = 0.90;
const AMOUNT_TOLERANCE: f64 = 0.005;

/// Tunables for the engine, persisted as a singleton settings row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateSettings {
    pub enabled: bool,
    pub filename_threshold: f64,
    /// Refuse intake outright when the file is byte-identical or has the same name.
    pub auto_block_exact: bool,
    pub check_invoice_numbers: bool,
    /// `None` means no window.
    pub lookback_days: Option<u32>,
}

impl Default for DuplicateSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            filename_threshold: 0.85,
            auto_block_exact: false,
            check_invoice_numbers: true,
            lookback_days: Some(90),
        }
    }
}

impl DuplicateSettings {
    /// Start of the lookback window relative to `now`.
    pub fn window_start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.lookback_days
            .filter(|days| *days > 0)
            .map(|days| now - Duration::days(i64::from(days)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateMatch {
    pub strategy: MatchStrategy,
    pub confidence: f64,
    pub document_id: Uuid,
    pub document_name: String,
    pub reason: String,
}

impl DuplicateMatch {
    /// Certain matches: identical bytes or identical name.
    pub fn is_exact(&self) -> bool {
        matches!(
            self.strategy,
            MatchStrategy::ContentHash | MatchStrategy::ExactFilename
        ) && self.confidence >= 1.0
    }
}

/// The file being checked.
#[derive(Debug, Clone)]
pub struct DuplicateCandidate<'a> {
    pub file_name: &'a str,
    pub content_hash: String,
    pub extracted: Option<&'a ExtractedFields>,
}

impl<'a> DuplicateCandidate<'a> {
    pub fn from_bytes(
        file_name: &'a str,
        bytes: &[u8],
        extracted: Option<&'a ExtractedFields>,
    ) -> Self {
        Self {
            file_name,
            content_hash: compute_content_hash(bytes),
            extracted,
        }
    }
}

/// Read access to existing documents, as needed by the strategies.
pub trait DocumentLookup {
    fn uploaded_since(&self, since: Option<DateTime<Utc>>) -> Result<Vec<Document>, DatabaseError>;

    fn by_content_hash(&self, hash: &str) -> Result<Vec<Document>, DatabaseError>;

    fn by_invoice_number(&self, invoice_number: &str) -> Result<Vec<Document>, DatabaseError>;

    fn by_field_tuple(
        &self,
        total_amount: f64,
        invoice_date: NaiveDate,
        supplier_name: &str,
    ) -> Result<Vec<Document>, DatabaseError>;
}

impl DocumentLookup for Connection {
    fn uploaded_since(&self, since: Option<DateTime<Utc>>) -> Result<Vec<Document>, DatabaseError> {
        repository::list_documents_uploaded_since(self, since)
    }

    fn by_content_hash(&self, hash: &str) -> Result<Vec<Document>, DatabaseError> {
        repository::get_documents_by_hash(self, hash)
    }

    fn by_invoice_number(&self, invoice_number: &str) -> Result<Vec<Document>, DatabaseError> {
        repository::get_documents_by_invoice_number(self, invoice_number)
    }

    fn by_field_tuple(
        &self,
        total_amount: f64,
        invoice_date: NaiveDate,
        supplier_name: &str,
    ) -> Result<Vec<Document>, DatabaseError> {
        repository::get_documents_by_field_tuple(self, total_amount, invoice_date, supplier_name)
    }
}

/// In-memory lookup over an already-loaded set of documents.
impl DocumentLookup for [Document] {
    fn uploaded_since(&self, since: Option<DateTime<Utc>>) -> Result<Vec<Document>, DatabaseError> {
        Ok(self
            .iter()
            .filter(|d| since.map_or(true, |since| d.uploaded_at >= since))
            .cloned()
            .collect())
    }

    fn by_content_hash(&self, hash: &str) -> Result<Vec<Document>, DatabaseError> {
        Ok(self
            .iter()
            .filter(|d| d.content_hash.as_deref() == Some(hash))
            .cloned()
            .collect())
    }

    fn by_invoice_number(&self, invoice_number: &str) -> Result<Vec<Document>, DatabaseError> {
        let wanted = invoice_number.trim();
        Ok(self
            .iter()
            .filter(|d| d.extracted.invoice_number.as_deref().map(str::trim) == Some(wanted))
            .cloned()
            .collect())
    }

    fn by_field_tuple(
        &self,
        total_amount: f64,
        invoice_date: NaiveDate,
        supplier_name: &str,
    ) -> Result<Vec<Document>, DatabaseError> {
        let supplier = supplier_name.trim().to_lowercase();
        Ok(self
            .iter()
            .filter(|d| match d.extracted.field_tuple() {
                Some((amount, date, name)) => {
                    (amount - total_amount).abs() < AMOUNT_TOLERANCE
                        && date == invoice_date
                        && name.trim().to_lowercase() == supplier
                }
                None => false,
            })
            .cloned()
            .collect())
    }
}

/// Run every enabled strategy and return the ranked, de-duplicated matches.
///
/// One entry per existing document survives: the highest-confidence one.
/// Ordering is confidence descending, then strategy priority, then id.
pub fn detect_duplicates<L: DocumentLookup + ?Sized>(
    lookup: &L,
    candidate: &DuplicateCandidate<'_>,
    settings: &DuplicateSettings,
    now: DateTime<Utc>,
) -> Vec<DuplicateMatch> {
    if !settings.enabled {
        tracing::debug!(file = %candidate.file_name, "Duplicate detection disabled");
        return Vec::new();
    }

    let mut found = Vec::new();
    found.extend(match_filenames(lookup, candidate, settings, now));
    found.extend(match_content_hash(lookup, candidate));
    if let Some(extracted) = candidate.extracted {
        if settings.check_invoice_numbers {
            found.extend(match_invoice_number(lookup, extracted));
        }
        found.extend(match_field_tuple(lookup, extracted));
    }

    let ranked = rank_matches(found);
    tracing::debug!(
        file = %candidate.file_name,
        matches = ranked.len(),
        "Duplicate detection complete"
    );
    ranked
}

/// The match that should stop intake under `auto_block_exact`, if any.
pub fn blocking_match<'m>(
    matches: &'m [DuplicateMatch],
    settings: &DuplicateSettings,
) -> Option<&'m DuplicateMatch> {
    if !settings.auto_block_exact {
        return None;
    }
    matches.iter().find(|m| m.is_exact())
}

fn advisory(
    strategy: MatchStrategy,
    result: Result<Vec<Document>, DatabaseError>,
) -> Vec<Document> {
    match result {
        Ok(docs) => docs,
        Err(e) => {
            tracing::warn!(
                strategy = %strategy,
                error = %e,
                "Duplicate lookup failed, skipping strategy"
            );
            Vec::new()
        }
    }
}

fn match_filenames<L: DocumentLookup + ?Sized>(
    lookup: &L,
    candidate: &DuplicateCandidate<'_>,
    settings: &DuplicateSettings,
    now: DateTime<Utc>,
) -> Vec<DuplicateMatch> {
    let window = advisory(
        MatchStrategy::ExactFilename,
        lookup.uploaded_since(settings.window_start(now)),
    );

    let mut matches = Vec::new();
    for doc in &window {
        if is_exact_filename_match(candidate.file_name, &doc.name) {
            matches.push(DuplicateMatch {
                strategy: MatchStrategy::ExactFilename,
                confidence: 1.0,
                document_id: doc.id,
                document_name: doc.name.clone(),
                reason: format!(
                    "A file named '{}' was uploaded on {}",
                    doc.name,
                    doc.uploaded_at.format("%Y-%m-%d")
                ),
            });
            continue;
        }

        let similarity = filename_similarity(candidate.file_name, &doc.name);
        if similarity >= settings.filename_threshold {
            matches.push(DuplicateMatch {
                strategy: MatchStrategy::FuzzyFilename,
                confidence: similarity,
                document_id: doc.id,
                document_name: doc.name.clone(),
                reason: format!(
                    "File name is {:.0}% similar to '{}'",
                    similarity * 100.0,
                    doc.name
                ),
            });
        }
    }
    tracing::debug!(window = window.len(), matches = matches.len(), "Filename strategies");
    matches
}

fn match_content_hash<L: DocumentLookup + ?Sized>(
    lookup: &L,
    candidate: &DuplicateCandidate<'_>,
) -> Vec<DuplicateMatch> {
    advisory(
        MatchStrategy::ContentHash,
        lookup.by_content_hash(&candidate.content_hash),
    )
    .into_iter()
    .map(|doc| DuplicateMatch {
        strategy: MatchStrategy::ContentHash,
        confidence: 1.0,
        reason: format!("Identical content to '{}'", doc.name),
        document_id: doc.id,
        document_name: doc.name,
    })
    .collect()
}

fn match_invoice_number<L: DocumentLookup + ?Sized>(
    lookup: &L,
    extracted: &ExtractedFields,
) -> Vec<DuplicateMatch> {
    let Some(invoice_number) = extracted
        .invoice_number
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
    else {
        return Vec::new();
    };

    advisory(
        MatchStrategy::InvoiceNumber,
        lookup.by_invoice_number(invoice_number),
    )
    .into_iter()
    .map(|doc| DuplicateMatch {
        strategy: MatchStrategy::InvoiceNumber,
        confidence: INVOICE_NUMBER_CONFIDENCE,
        reason: format!("Invoice number {invoice_number} already recorded on '{}'", doc.name),
        document_id: doc.id,
        document_name: doc.name,
    })
    .collect()
}

fn match_field_tuple<L: DocumentLookup + ?Sized>(
    lookup: &L,
    extracted: &ExtractedFields,
) -> Vec<DuplicateMatch> {
    let Some((amount, date, supplier)) = extracted.field_tuple() else {
        return Vec::new();
    };

    advisory(
        MatchStrategy::FieldTuple,
        lookup.by_field_tuple(amount, date, supplier),
    )
    .into_iter()
    .map(|doc| DuplicateMatch {
        strategy: MatchStrategy::FieldTuple,
        confidence: FIELD_TUPLE_CONFIDENCE,
        reason: format!(
            "Same amount ({amount:.2}), date ({date}) and supplier ({supplier}) as '{}'",
            doc.name
        ),
        document_id: doc.id,
        document_name: doc.name,
    })
    .collect()
}

fn outranks(a: &DuplicateMatch, b: &DuplicateMatch) -> bool {
    a.confidence > b.confidence
        || (a.confidence == b.confidence && a.strategy.priority() < b.strategy.priority())
}

fn rank_matches(found: Vec<DuplicateMatch>) -> Vec<DuplicateMatch> {
    let mut best: HashMap<Uuid, DuplicateMatch> = HashMap::new();
    for m in found {
        match best.get(&m.document_id) {
            Some(existing) if !outranks(&m, existing) => {}
            _ => {
                best.insert(m.document_id, m);
            }
        }
    }

    let mut ranked: Vec<DuplicateMatch> = best.into_values().collect();
    ranked.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| a.strategy.priority().cmp(&b.strategy.priority()))
            .then_with(|| a.document_id.cmp(&b.document_id))
    });
    ranked
}
