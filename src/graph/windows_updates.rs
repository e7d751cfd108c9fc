//! Windows Update catalog (Windows Autopatch deployment service, beta)

use crate::error::Result;
use crate::graph::GraphClient;
use chrono::{DateTime, Utc};
use serde::Deserialize;

const QUALITY_ENTRY_TYPE: &str = "microsoft.graph.windowsUpdates.qualityUpdateCatalogEntry";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub release_date_time: DateTime<Utc>,
    #[serde(default)]
    pub quality_update_classification: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub revisions: Vec<ProductRevision>,
}

/// A released OS build, e.g. version `10.0.22631.4317`
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProductRevision {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub version: String,
    /// Missing on some revisions; those cannot be ordered and are ignored
    #[serde(default)]
    pub release_date_time: Option<DateTime<Utc>>,
}

/// Quality update catalog entries, newest first
pub async fn list_quality_catalog_entries(client: &GraphClient) -> Result<Vec<CatalogEntry>> {
    let endpoint = format!(
        "admin/windows/updates/catalog/entries?$filter=isof('{}')&$orderby=releaseDateTime desc",
        QUALITY_ENTRY_TYPE
    );
    let mut entries: Vec<CatalogEntry> = client.get_all_pages_beta(&endpoint).await?;

    // top-N selection relies on newest-first order
    entries.sort_by(|a, b| b.release_date_time.cmp(&a.release_date_time));
    Ok(entries)
}

/// Product revisions shipped by one catalog entry
pub async fn list_catalog_entry_revisions(
    client: &GraphClient,
    catalog_id: &str,
) -> Result<Vec<ProductRevision>> {
    let endpoint = format!(
        "admin/windows/updates/products/FindByCatalogId(catalogID='{}')?$expand=revisions",
        catalog_id
    );
    let products: Vec<Product> = client.get_all_pages_beta(&endpoint).await?;

    Ok(products
        .into_iter()
        .flat_map(|product| product.revisions)
        .collect())
}
