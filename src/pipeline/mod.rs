pub mod costing; // Costing workbook codec, locators and extractor
pub mod intake; // Per-file intake: detection, duplicates, persistence
