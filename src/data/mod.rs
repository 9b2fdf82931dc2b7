//! Remote collaborators and the spectrum fetcher.
//!
//! - catalog queries over TAP/ADQL (`tap`)
//! - bulk spectral products over DataLink (`datalink`)
//! - staging of fetched products for one run (`fetch`)

pub mod datalink;
pub mod fetch;
pub mod tap;

pub use datalink::{BulkDataService, DataLinkClient, DataServiceError, ProductMap, ProductTable};
pub use fetch::fetch_spectrum;
pub use tap::{CatalogClient, CatalogError, TapClient};
