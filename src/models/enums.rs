use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(WorkflowStatus {
    Draft => "draft",
    PendingReview => "pending_review",
    Approved => "approved",
    Rejected => "rejected",
    Archived => "archived",
});

str_enum!(WorkflowAction {
    StagedForReview => "staged_for_review",
    Approved => "approved",
    Rejected => "rejected",
    Archived => "archived",
});

str_enum!(DocumentCategory {
    SupplierInvoice => "supplier_invoice",
    BillOfLading => "bill_of_lading",
    CostingSheet => "costing_sheet",
    PackingList => "packing_list",
});

str_enum!(MatchStrategy {
    ExactFilename => "exact_filename",
    FuzzyFilename => "fuzzy_filename",
    InvoiceNumber => "invoice_number",
    FieldTuple => "field_tuple",
    ContentHash => "content_hash",
});

impl MatchStrategy {
    /// Tie-break order when two strategies report the same confidence.
    pub fn priority(&self) -> u8 {
        match self {
            Self::ContentHash => 0,
            Self::ExactFilename => 1,
            Self::InvoiceNumber => 2,
            Self::FieldTuple => 3,
            Self::FuzzyFilename => 4,
        }
    }
}

str_enum!(IntakeChannel {
    Upload => "upload",
    Chat => "chat",
    Messaging => "messaging",
    Batch => "batch",
});

str_enum!(CostingStatus {
    Draft => "draft",
    PendingReview => "pending_review",
    Finalized => "finalized",
});

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn workflow_status_round_trip() {
        for (variant, s) in [
            (WorkflowStatus::Draft, "draft"),
            (WorkflowStatus::PendingReview, "pending_review"),
            (WorkflowStatus::Approved, "approved"),
            (WorkflowStatus::Rejected, "rejected"),
            (WorkflowStatus::Archived, "archived"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(WorkflowStatus::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn serde_uses_snake_case_tags() {
        let json = serde_json::to_string(&MatchStrategy::FuzzyFilename).unwrap();
        assert_eq!(json, "\"fuzzy_filename\"");
        let parsed: DocumentCategory = serde_json::from_str("\"bill_of_lading\"").unwrap();
        assert_eq!(parsed, DocumentCategory::BillOfLading);
    }

    #[test]
    fn invalid_enum_returns_error() {
        assert!(WorkflowStatus::from_str("finalized").is_err());
        assert!(CostingStatus::from_str("").is_err());
        assert!(MatchStrategy::from_str("hash").is_err());
    }
}
