//! Catalog-backed resolution of a `SourceQuery` into one `ResolvedSource`.
//!
//! Coordinates take two steps: a cone search to find the nearest cataloged
//! object, then the joined attribute lookup by that object's identifier.

use tracing::{debug, info, warn};

use crate::data::tap::CatalogClient;
use crate::domain::{ConeBox, ResolvedSource, SourceQuery};
use crate::error::AppError;

pub struct Resolver<'a> {
    catalog: &'a dyn CatalogClient,
    cone: ConeBox,
}

impl<'a> Resolver<'a> {
    pub fn new(catalog: &'a dyn CatalogClient, cone: ConeBox) -> Self {
        Self { catalog, cone }
    }

    pub fn resolve(&self, query: &SourceQuery) -> Result<ResolvedSource, AppError> {
        info!(%query, "Resolving source");
        let source_id = match *query {
            SourceQuery::Identifier(id) => id,
            SourceQuery::Coordinates { ra, dec } => self.nearest(ra, dec)?,
        };
        let source = self.lookup_joined(source_id)?;
        info!(source_id = source.source_id, ra = source.ra, dec = source.dec, "Source resolved");
        Ok(source)
    }

    fn nearest(&self, ra: f64, dec: f64) -> Result<u64, AppError> {
        let matches = self.catalog.query_by_cone(ra, dec, self.cone).map_err(|e| {
            warn!("Error querying catalog for RA={ra}, Dec={dec}: {e}");
            AppError::invalid_request(format!("Cone search failed for RA={ra}, Dec={dec}: {e}"))
        })?;

        let Some(first) = matches.first() else {
            return Err(AppError::no_source_found(format!("No sources found at RA={ra}, Dec={dec}")));
        };
        if matches.len() > 1 {
            debug!(count = matches.len(), "Cone search returned several objects; using the nearest");
        }
        debug!(source_id = first.source_id, ra = first.ra, dec = first.dec, "Cone match");
        Ok(first.source_id)
    }

    fn lookup_joined(&self, source_id: u64) -> Result<ResolvedSource, AppError> {
        let rows = self.catalog.query_joined(source_id).map_err(|e| {
            warn!(source_id, "Joined query failed: {e}");
            AppError::no_source_found(format!("Failed to query source {source_id}: {e}"))
        })?;

        let count = rows.len();
        let Some(first) = rows.into_iter().next() else {
            return Err(self.explain_missing(source_id));
        };
        if count > 1 {
            warn!(source_id, count, "Catalog returned several rows; using the first");
        }
        Ok(first)
    }

    /// Distinguish "no such object" from "object without astrophysical parameters".
    fn explain_missing(&self, source_id: u64) -> AppError {
        match self.catalog.query_by_identifier(source_id) {
            Ok(entries) if !entries.is_empty() => AppError::no_source_found(format!(
                "Source {source_id} exists but has no astrophysical parameters"
            )),
            Ok(_) => AppError::no_source_found("No sources found!"),
            Err(e) => {
                debug!(source_id, "Identifier lookup failed: {e}");
                AppError::no_source_found("No sources found!")
            }
        }
    }
}
