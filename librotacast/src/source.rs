//! Content source reader
//!
//! Loads the rotation queue from a CSV file with `text` and `category`
//! columns. The file is re-read on every cycle, so edits take effect without
//! restarting the daemon. Item indices are row positions; reordering rows
//! between cycles changes which items count as posted.

use std::path::Path;

use tracing::{debug, warn};

use crate::error::SourceError;
use crate::types::ContentItem;

const TEXT_COLUMN: &str = "text";
const CATEGORY_COLUMN: &str = "category";

/// Read every content item from the CSV file at `path`.
///
/// Rows that cannot be parsed are skipped with a warning and do not consume
/// an index. An empty file yields an empty list.
///
/// # Errors
///
/// Returns `SourceError` if the file is missing, unreadable, or lacks one of
/// the required columns.
pub fn read(path: &Path) -> Result<Vec<ContentItem>, SourceError> {
    if !path.exists() {
        return Err(SourceError::NotFound(path.to_path_buf()));
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|source| SourceError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;

    let headers = match reader.headers() {
        Ok(headers) => headers.clone(),
        Err(source) => {
            return Err(SourceError::Unreadable {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    // A completely empty file has no header row at all.
    if headers.is_empty() {
        return Ok(Vec::new());
    }

    let column = |name: &'static str| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
            .ok_or(SourceError::MissingColumn {
                path: path.to_path_buf(),
                column: name,
            })
    };
    let text_col = column(TEXT_COLUMN)?;
    let category_col = column(CATEGORY_COLUMN)?;

    let mut items = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping unreadable row {} in {}: {}", row + 1, path.display(), e);
                continue;
            }
        };

        match (record.get(text_col), record.get(category_col)) {
            (Some(text), Some(category)) => {
                items.push(ContentItem::new(items.len(), text, category));
            }
            _ => {
                warn!(
                    "Skipping row {} in {}: missing text or category",
                    row + 1,
                    path.display()
                );
            }
        }
    }

    debug!("Read {} content items from {}", items.len(), path.display());
    Ok(items)
}
