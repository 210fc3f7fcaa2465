use crate::domain::model::DatasetKind;
use crate::utils::error::{EtlError, Result};
use serde::de::DeserializeOwned;
use tracing::debug;

/// Decodes one CSV export into typed records.
///
/// Headers are trimmed; a malformed row fails the whole dataset with the
/// file name and line number in the message.
pub fn parse_records<T: DeserializeOwned>(kind: DatasetKind, file: &str, data: &[u8]) -> Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .flexible(false)
        .from_reader(data);

    let mut records = Vec::new();
    for row in reader.deserialize::<T>() {
        match row {
            Ok(record) => records.push(record),
            Err(err) => {
                let line = err
                    .position()
                    .map(|p| p.line().to_string())
                    .unwrap_or_else(|| "?".to_string());
                return Err(EtlError::dataset(
                    kind.name(),
                    format!("{} line {}: {}", file, line, err),
                ));
            }
        }
    }

    debug!("Parsed {} {} rows from {}", records.len(), kind, file);
    Ok(records)
}
