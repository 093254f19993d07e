//! Static AAAA record replacement
//!
//! For each hostname, every existing AAAA record with that name is removed
//! and one fresh record pointing at the new address is added. Records are
//! replaced even when they already hold the desired address; the engine's
//! cycle-level cache is what skips unchanged runs.

use tracing::info;

use crate::error::Result;
use crate::traits::RouterStore;

/// Operations applied by one DNS reconciliation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DnsOutcome {
    /// `(hostname, old address)` pairs that were removed
    pub removed: Vec<(String, String)>,
    /// Hostnames that were (re)created
    pub added: Vec<String>,
}

/// Point every hostname in `hostnames` at `address`
///
/// Empty or whitespace-only hostnames are ignored. The record listing is
/// fetched once up front; stops at the first failing store call.
pub async fn reconcile_dns(
    store: &dyn RouterStore,
    hostnames: &[String],
    address: &str,
) -> Result<DnsOutcome> {
    let existing = store.list_dns_records().await?;
    let mut outcome = DnsOutcome::default();

    for hostname in hostnames.iter().map(|h| h.trim()).filter(|h| !h.is_empty()) {
        for entry in existing.iter().filter(|e| e.name == hostname) {
            info!("Removing AAAA {} -> {}", entry.name, entry.address);
            store.remove_dns_record(&entry.handle).await?;
            outcome.removed.push((entry.name.clone(), entry.address.clone()));
        }

        info!("Adding AAAA {} -> {}", hostname, address);
        store.add_dns_record(hostname, address).await?;
        outcome.added.push(hostname.to_string());
    }

    Ok(outcome)
}
