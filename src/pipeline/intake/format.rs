use serde::{Deserialize, Serialize};

pub const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const OCTET_STREAM: &str = "application/octet-stream";

/// Result of format detection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormatDetection {
    pub mime_type: String,
    /// True when the type came from magic bytes rather than the name or the caller.
    pub sniffed: bool,
}

impl FormatDetection {
    pub fn is_spreadsheet(&self) -> bool {
        self.mime_type == XLSX_MIME
    }
}

/// Detect a file's MIME type.
///
/// Magic bytes win; a ZIP container is refined by the filename extension
/// (OOXML workbooks are ZIPs). Otherwise the type is guessed from the
/// filename, then taken from the caller's declared type.
pub fn detect_format(bytes: &[u8], file_name: &str, declared: Option<&str>) -> FormatDetection {
    let guessed = mime_guess::from_path(file_name).first_raw();

    let sniffed = match bytes {
        [0x25, 0x50, 0x44, 0x46, ..] => Some("application/pdf"),
        [0x89, 0x50, 0x4E, 0x47, ..] => Some("image/png"),
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        [0x47, 0x49, 0x46, 0x38, ..] => Some("image/gif"),
        [0x49, 0x49, 0x2A, 0x00, ..] | [0x4D, 0x4D, 0x00, 0x2A, ..] => Some("image/tiff"),
        [0x50, 0x4B, 0x03, 0x04, ..] => Some(match guessed {
            Some(mime) if mime.starts_with("application/vnd.openxmlformats") => mime,
            _ => "application/zip",
        }),
        _ => None,
    };

    if let Some(mime) = sniffed {
        return FormatDetection {
            mime_type: mime.to_string(),
            sniffed: true,
        };
    }

    let mime_type = guessed
        .or(declared.filter(|d| !d.trim().is_empty()))
        .unwrap_or(OCTET_STREAM)
        .to_string();
    FormatDetection {
        mime_type,
        sniffed: false,
    }
}

/// Filename extension (lower-cased, without the dot), `bin` when absent.
pub fn file_extension(file_name: &str) -> String {
    std::path::Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_else(|| "bin".to_string())
}

/// Display name for an incoming file: last path segment, no separators or
/// control characters, at most 255 characters.
pub fn sanitize_filename(original: &str) -> String {
    let name = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    let clean: String = name
        .chars()
        .filter(|c| !c.is_control())
        .take(255)
        .collect();

    if clean.is_empty() || clean == "." || clean == ".." {
        "document".to_string()
    } else {
        clean
    }
}
