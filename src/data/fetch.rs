//! Spectrum fetcher: bulk download → per-run staging directory.

use tracing::{debug, error, info, warn};

use crate::data::datalink::BulkDataService;
use crate::domain::{PipelineConfig, ResolvedSource};
use crate::error::AppError;
use crate::io::staging::{StagingArea, sanitize_product_key};

/// Download the configured spectral product for `source` and stage it as CSV.
///
/// Only keys containing the retrieval type are written, one file per key. On
/// any failure the staging directory is removed before the error is returned;
/// on success ownership of the directory passes to the caller.
pub fn fetch_spectrum(
    service: &dyn BulkDataService,
    source: &ResolvedSource,
    config: &PipelineConfig,
) -> Result<StagingArea, AppError> {
    info!(source_id = source.source_id, "Starting data pull");
    debug!(
        retrieval_type = %config.retrieval_type,
        data_release = %config.data_release,
        "Retrieving products"
    );

    let products = service
        .fetch_products(source.source_id, &config.retrieval_type, &config.data_release)
        .map_err(|e| {
            error!("Error occurred while pulling data: {e}");
            AppError::download(format!("Failed to download data: {e}"))
        })?;

    let matching: Vec<_> = products
        .iter()
        .filter(|(key, _)| key.contains(config.retrieval_type.as_str()))
        .collect();
    if matching.is_empty() {
        return Err(AppError::download(format!(
            "Failed to download data: no {} products returned for source {}",
            config.retrieval_type, source.source_id
        )));
    }

    let staging = StagingArea::create(&config.staging_root).map_err(|e| {
        AppError::download(format!(
            "Failed to create staging directory under '{}': {e}",
            config.staging_root.display()
        ))
    })?;

    let mut written = 0usize;
    for (key, tables) in matching {
        let Some(table) = tables.first() else {
            warn!(key = %key, "Product key has no tables; skipping");
            continue;
        };
        let path = staging
            .path()
            .join(format!("{}.csv", sanitize_product_key(key)));
        info!(file = %path.display(), "Writing table");
        table.write_csv(&path).map_err(|e| {
            AppError::download(format!("Failed to download data: writing '{}' failed: {e}", path.display()))
        })?;
        written += 1;
    }
    if written == 0 {
        return Err(AppError::download(format!(
            "Failed to download data: {} products for source {} contained no tables",
            config.retrieval_type, source.source_id
        )));
    }

    info!(path = %staging.path().display(), "Data successfully downloaded");
    Ok(staging)
}
