//! Diff/apply engine for router address lists
//!
//! Given a bucket and a desired set of addresses, make the router's list
//! equal to that set with the fewest add/remove calls.
//!
//! ## Algorithm
//!
//! 1. List the bucket's records from the router. This listing is the ground
//!    truth; cached snapshots never drive removals.
//! 2. Remove every record whose address is not desired, plus any second
//!    record carrying an address already seen.
//! 3. Add every desired address not among the surviving records.
//!
//! Removals strictly precede additions so a shrink-then-grow never exceeds
//! the store's capacity. Nothing is rolled back on failure: the error goes
//! to the caller, which leaves its cache stale so the next cycle re-diffs
//! against whatever the router holds by then.

pub mod dns;

use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::error::Result;
use crate::traits::{Bucket, RouterStore, Snapshot};

pub use dns::{DnsOutcome, reconcile_dns};

/// Operations applied by one reconciliation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Addresses whose records were removed, in removal order
    pub removed: Vec<String>,
    /// Addresses that were added, in add order
    pub added: Vec<String>,
}

impl ReconcileOutcome {
    /// True when the router already matched
    pub fn is_noop(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }
}

/// Make `bucket` on the router contain exactly `desired`
///
/// Stops at the first failing store call and returns its error. Changes made
/// before that point stay applied.
pub async fn reconcile_bucket(
    store: &dyn RouterStore,
    bucket: &Bucket,
    desired: &Snapshot,
) -> Result<ReconcileOutcome> {
    debug!("Reconciling {} against {} desired address(es)", bucket, desired.len());

    let existing = store.list_entries(bucket).await?;

    let mut outcome = ReconcileOutcome::default();
    let mut surviving = BTreeSet::new();

    for entry in existing {
        if entry.list != bucket.list {
            continue;
        }

        let keep = desired.contains(&entry.address) && !surviving.contains(&entry.address);
        if keep {
            surviving.insert(entry.address);
            continue;
        }

        info!("Removing {} from {}", entry.address, bucket);
        store.remove_entry(bucket, &entry.handle).await?;
        outcome.removed.push(entry.address);
    }

    for address in desired.difference(&surviving) {
        info!("Adding {} to {}", address, bucket);
        store.add_entry(bucket, address).await?;
        outcome.added.push(address.clone());
    }

    if outcome.is_noop() {
        debug!("{} already up to date", bucket);
    }

    Ok(outcome)
}
