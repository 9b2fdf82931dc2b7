//! Gaia archive DataLink integration (bulk spectral products).
//!
//! The data server answers with a zip archive holding one file per product.
//! Each member becomes a `ProductTable` keyed by its file name.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;
use thiserror::Error;
use tracing::debug;

use crate::error::AppError;

#[derive(Debug, Error)]
pub enum DataServiceError {
    #[error("data service request failed: {0}")]
    Transport(String),
    #[error("data service returned status {0}")]
    Status(u16),
    #[error("invalid product archive: {0}")]
    Archive(String),
    #[error("invalid product '{key}': {message}")]
    Product { key: String, message: String },
}

/// A tabular data product: header row plus string cells.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProductTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ProductTable {
    /// Read a CSV product (`#` comment lines are skipped).
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, csv::Error> {
        let mut reader = csv::ReaderBuilder::new()
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record?.iter().map(str::to_string).collect());
        }
        Ok(Self { headers, rows })
    }

    /// Write as CSV, replacing any existing file.
    pub fn write_csv(&self, path: &Path) -> Result<(), csv::Error> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Case-insensitive column lookup.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name))
    }
}

/// Product key → products stored under that key.
pub type ProductMap = BTreeMap<String, Vec<ProductTable>>;

/// Bulk retrieval capability over the archive's data server.
pub trait BulkDataService: Send + Sync {
    fn fetch_products(
        &self,
        source_id: u64,
        retrieval_type: &str,
        data_release: &str,
    ) -> Result<ProductMap, DataServiceError>;
}

pub struct DataLinkClient {
    client: Client,
    url: String,
}

impl DataLinkClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::internal(format!("Failed to build DataLink client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl BulkDataService for DataLinkClient {
    fn fetch_products(
        &self,
        source_id: u64,
        retrieval_type: &str,
        data_release: &str,
    ) -> Result<ProductMap, DataServiceError> {
        let id = source_id.to_string();
        debug!(source_id, retrieval_type, data_release, "Requesting DataLink products");

        let resp = self
            .client
            .get(&self.url)
            .query(&[
                ("RETRIEVAL_TYPE", retrieval_type),
                ("ID", id.as_str()),
                ("RELEASE", data_release),
                ("DATA_STRUCTURE", "INDIVIDUAL"),
                ("FORMAT", "csv"),
            ])
            .send()
            .map_err(|e| DataServiceError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(DataServiceError::Status(resp.status().as_u16()));
        }

        let bytes = resp
            .bytes()
            .map_err(|e| DataServiceError::Transport(format!("failed to read body: {e}")))?;
        unpack_products(&bytes)
    }
}

/// Unpack a zip body into CSV products keyed by member file name.
///
/// Directory entries and non-CSV members are skipped.
pub fn unpack_products(bytes: &[u8]) -> Result<ProductMap, DataServiceError> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| DataServiceError::Archive(e.to_string()))?;

    let mut products = ProductMap::new();
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|e| DataServiceError::Archive(e.to_string()))?;
        if entry.is_dir() {
            continue;
        }

        let key = entry
            .name()
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        if !key.to_ascii_lowercase().ends_with(".csv") {
            debug!(member = %key, "Skipping non-CSV archive member");
            continue;
        }

        let table = ProductTable::from_csv_reader(entry).map_err(|e| DataServiceError::Product {
            key: key.clone(),
            message: e.to_string(),
        })?;
        products.entry(key).or_default().push(table);
    }
    Ok(products)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::FileOptions;

    fn zip_of(members: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in members {
            writer.start_file(*name, FileOptions::default()).unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn unpacks_csv_members_and_skips_comments() {
        let bytes = zip_of(&[
            (
                "XP_SAMPLED-Gaia DR3 42.csv",
                "# generated by the archive\nsource_id,wavelength,flux\n42,336.0,1.5\n42,338.0,2.5\n",
            ),
            ("README.txt", "not a product"),
        ]);
        let products = unpack_products(&bytes).unwrap();
        assert_eq!(products.len(), 1);
        let table = &products["XP_SAMPLED-Gaia DR3 42.csv"][0];
        assert_eq!(table.headers, vec!["source_id", "wavelength", "flux"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.column("FLUX"), Some(2));
    }

    #[test]
    fn garbage_body_is_an_archive_error() {
        let err = unpack_products(b"<html>maintenance</html>").unwrap_err();
        assert!(matches!(err, DataServiceError::Archive(_)));
    }

    #[test]
    fn write_csv_overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("product.csv");
        std::fs::write(&path, "stale,content\n1,2\n3,4\n").unwrap();

        let table = ProductTable {
            headers: vec!["flux".to_string()],
            rows: vec![vec!["1.0".to_string()]],
        };
        table.write_csv(&path).unwrap();

        let reread = ProductTable::from_csv_reader(std::fs::File::open(&path).unwrap()).unwrap();
        assert_eq!(reread, table);
    }
}
