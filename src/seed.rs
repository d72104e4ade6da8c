//! Sample matter export used for demos and tests.

use std::path::Path;

use crate::error::StoreError;

/// Ten fictitious matters: one workers' comp, nine personal injury.
pub const SAMPLE_MATTERS_CSV: &str = include_str!("../data/litify_matters.csv");

/// Write the sample export to `path`.
///
/// Returns `false` without touching the file when it already exists and
/// `overwrite` is not set. Parent directories are created as needed.
pub async fn write_sample_csv(path: &Path, overwrite: bool) -> Result<bool, StoreError> {
    if !overwrite
        && tokio::fs::try_exists(path)
            .await
            .map_err(|e| StoreError::from_io(path, e))?
    {
        tracing::debug!(path = %path.display(), "Sample CSV already present, leaving it");
        return Ok(false);
    }

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::from_io(parent, e))?;
    }

    tokio::fs::write(path, SAMPLE_MATTERS_CSV)
        .await
        .map_err(|e| StoreError::from_io(path, e))?;
    tracing::info!(path = %path.display(), "Wrote sample matters CSV");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::{SAMPLE_MATTERS_CSV, write_sample_csv};

    #[test]
    fn sample_has_header_and_ten_rows() {
        let mut reader = csv::Reader::from_reader(SAMPLE_MATTERS_CSV.as_bytes());
        assert_eq!(reader.headers().expect("header").len(), 15);
        let rows: Vec<_> = reader
            .records()
            .collect::<Result<_, _>>()
            .expect("rows parse");
        assert_eq!(rows.len(), 10);
        let pi = rows
            .iter()
            .filter(|row| row.get(6).is_some_and(|t| t.starts_with("PI")))
            .count();
        assert_eq!(pi, 9);
    }

    #[tokio::test]
    async fn write_sample_respects_existing_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("matters.csv");

        assert!(write_sample_csv(&path, false).await.expect("first write"));
        std::fs::write(&path, "custom").expect("overwrite by hand");

        assert!(!write_sample_csv(&path, false).await.expect("second write"));
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "custom");

        assert!(write_sample_csv(&path, true).await.expect("forced write"));
        assert_eq!(
            std::fs::read_to_string(&path).expect("read"),
            SAMPLE_MATTERS_CSV
        );
    }
}
