//! CSV export of the wallet store
//!
//! The report is built in memory and handed to the caller; nothing is
//! retained on disk by the bot path.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::error::Result;

use super::store::WalletStore;
use super::Category;

/// Identity port: resolves an opaque user id to a display name
#[async_trait]
pub trait NameResolver: Send + Sync {
    async fn display_name(&self, user_id: &str) -> Result<String>;
}

/// One exported entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRow {
    pub category: Category,
    pub user_id: String,
    pub username: String,
    pub address: String,
}

/// Tabular export of every registered wallet, OG entries first
#[derive(Debug, Clone)]
pub struct ExportReport {
    pub rows: Vec<ExportRow>,
    pub og_count: usize,
    pub wl_count: usize,
    pub generated_at: DateTime<Utc>,
}

impl ExportReport {
    pub fn total(&self) -> usize {
        self.og_count + self.wl_count
    }

    /// Render the report as CSV with a header row
    pub fn to_csv(&self) -> String {
        let mut out = String::from("Role,User ID,Username,Wallet Address\r\n");
        for row in &self.rows {
            out.push_str(&format!(
                "{},{},{},{}\r\n",
                csv_field(row.category.label()),
                csv_field(&row.user_id),
                csv_field(&row.username),
                csv_field(&row.address),
            ));
        }
        out
    }

    /// Timestamped file name for the artifact
    pub fn filename(&self) -> String {
        format!(
            "wallet_export_{}.csv",
            self.generated_at.format("%Y%m%d_%H%M%S")
        )
    }

    /// Short human-readable summary of the export
    pub fn summary(&self) -> String {
        format!(
            "Total wallets exported: {}\nOG wallets: {}\nWL wallets: {}",
            self.total(),
            self.og_count,
            self.wl_count
        )
    }
}

/// Build the report from a store snapshot, resolving display names per row.
/// A failed resolution falls back to a label derived from the id and never
/// aborts the batch.
pub async fn build_report(store: &WalletStore, resolver: &dyn NameResolver) -> ExportReport {
    let mut rows = Vec::with_capacity(store.total());

    for category in [Category::Og, Category::Wl] {
        for (user_id, address) in store.category(category) {
            let username = match resolver.display_name(user_id).await {
                Ok(name) => name,
                Err(e) => {
                    warn!("Failed to resolve name for {}: {}", user_id, e);
                    format!("User {}", user_id)
                }
            };
            rows.push(ExportRow {
                category,
                user_id: user_id.clone(),
                username,
                address: address.clone(),
            });
        }
    }

    ExportReport {
        og_count: store.count(Category::Og),
        wl_count: store.count(Category::Wl),
        rows,
        generated_at: Utc::now(),
    }
}

/// Quote a CSV field when it contains a delimiter, quote, or line break
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
