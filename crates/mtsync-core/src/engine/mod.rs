//! Poll loop / orchestrator
//!
//! The SyncEngine is responsible for:
//! - Asking each enabled source for a snapshot once per cycle
//! - Skipping buckets whose snapshot equals the last applied one
//! - Reconciling the rest against the router
//! - Recording the snapshot only after a reconciliation succeeded
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌────────────────┐
//! │ RangeSource  │   │InterfaceSource │
//! └──────────────┘   └────────────────┘
//!         │ v4 / v6 sets     │ Option<address>
//!         └────────┬─────────┘
//!                  ▼
//!          ┌──────────────┐       ┌───────────────┐
//!          │  SyncEngine  │──────▶│ SnapshotStore │
//!          └──────────────┘       │ (skip check)  │
//!                  │              └───────────────┘
//!                  ▼
//!          ┌──────────────┐
//!          │ RouterStore  │  address lists + static AAAA
//!          └──────────────┘
//! ```
//!
//! ## Cycle Flow
//!
//! 1. Fetch Cloudflare ranges (if enabled); on failure skip both Cloudflare
//!    buckets for this cycle
//! 2. Sync `cloudflarev6`, then `cloudflarev4`
//! 3. Read the interface address (if enabled); if none, leave the interface
//!    bucket and DNS untouched
//! 4. Sync the interface bucket, then the static AAAA records
//!
//! A failing bucket never stops the others. Errors are logged and reported
//! in the [`CycleReport`]; the loop always sleeps the full interval and
//! tries again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{CloudflareConfig, InterfaceConfig, SyncConfig};
use crate::error::{Error, Result};
use crate::reconcile::{reconcile_bucket, reconcile_dns};
use crate::traits::{Bucket, InterfaceSource, RangeSource, RouterStore, Snapshot, SnapshotStore};

/// Cache key for the static AAAA record set
pub const DNS_CACHE_KEY: &str = "dns/AAAA";

/// Events emitted by the SyncEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Engine started
    Started {
        buckets: usize,
    },

    /// A poll cycle began
    CycleStarted {
        cycle: u64,
    },

    /// Snapshot unchanged (or empty and guarded), nothing sent to the router
    BucketSkipped {
        key: String,
        reason: String,
    },

    /// Router brought in line with the snapshot
    BucketReconciled {
        key: String,
        removed: usize,
        added: usize,
    },

    /// Reconciliation failed; cache left stale
    BucketFailed {
        key: String,
        error: String,
    },

    /// A source could not produce a snapshot
    SourceFailed {
        source: String,
        error: String,
    },

    /// Static AAAA records now point at `address`
    DnsReconciled {
        address: String,
        hostnames: usize,
    },

    /// Engine stopped
    Stopped {
        reason: String,
    },
}

/// Result of one bucket within a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BucketStatus {
    /// Snapshot equal to the last applied one
    Unchanged,
    /// Reconciled; counts of operations sent to the router
    Applied { removed: usize, added: usize },
    /// Empty snapshot after a non-empty one, skipped by configuration
    SkippedEmpty,
    /// Store or cache error
    Failed(String),
}

/// What happened during one poll cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Status per cache key, in processing order
    pub buckets: Vec<(String, BucketStatus)>,
    /// Source failures, as `(source, error)`
    pub source_errors: Vec<(String, String)>,
    /// Interface address observed this cycle
    pub interface_address: Option<String>,
}

impl CycleReport {
    /// Status of one cache key, if it was processed this cycle
    pub fn status(&self, key: &str) -> Option<&BucketStatus> {
        self.buckets.iter().find(|(k, _)| k == key).map(|(_, s)| s)
    }

    /// True when no source and no bucket failed
    pub fn is_clean(&self) -> bool {
        self.source_errors.is_empty()
            && !self
                .buckets
                .iter()
                .any(|(_, s)| matches!(s, BucketStatus::Failed(_)))
    }
}

/// Core sync engine
///
/// Owns the router session and the last-applied snapshots for the life of
/// the process. Cycles run one at a time on the caller's task; nothing is
/// processed in parallel.
pub struct SyncEngine {
    /// Router session
    store: Box<dyn RouterStore>,

    /// Last applied snapshot per bucket
    snapshots: Box<dyn SnapshotStore>,

    /// Cloudflare ranges (None when disabled)
    ranges: Option<Box<dyn RangeSource>>,

    /// Interface address (None when disabled)
    interface: Option<Box<dyn InterfaceSource>>,

    cloudflare: CloudflareConfig,

    interface_config: Option<InterfaceConfig>,

    /// Sleep between cycles
    check_interval: Duration,

    cycles: AtomicU64,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl SyncEngine {
    /// Create a new sync engine
    ///
    /// # Parameters
    ///
    /// - `store`: Router store implementation
    /// - `snapshots`: Snapshot store for change detection
    /// - `ranges`: Cloudflare range source, required iff Cloudflare is enabled
    /// - `interface`: Interface source, required iff interface tracking is enabled
    /// - `config`: Sync configuration
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        store: Box<dyn RouterStore>,
        snapshots: Box<dyn SnapshotStore>,
        ranges: Option<Box<dyn RangeSource>>,
        interface: Option<Box<dyn InterfaceSource>>,
        config: &SyncConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        if config.cloudflare.enabled != ranges.is_some() {
            return Err(Error::config(
                "A range source must be supplied exactly when Cloudflare tracking is enabled",
            ));
        }
        if config.interface.is_some() != interface.is_some() {
            return Err(Error::config(
                "An interface source must be supplied exactly when interface tracking is enabled",
            ));
        }

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);

        let engine = Self {
            store,
            snapshots,
            ranges,
            interface,
            cloudflare: config.cloudflare.clone(),
            interface_config: config.interface.clone(),
            check_interval: config.engine.check_interval(),
            cycles: AtomicU64::new(0),
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Run until `shutdown` is cancelled
    ///
    /// The token is checked before each cycle and raced against the sleep
    /// between cycles. A cycle that has started always runs to completion.
    pub async fn run(&self, shutdown: CancellationToken) {
        let buckets = self.bucket_count();
        info!(
            "Sync engine started: {} bucket(s), interval {:?}",
            buckets, self.check_interval
        );
        self.emit_event(EngineEvent::Started { buckets });

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let report = self.run_cycle().await;
            if !report.is_clean() {
                warn!("Cycle finished with errors; retrying in {:?}", self.check_interval);
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.check_interval) => {}
            }
        }

        info!("Shutdown requested, sync engine stopped");
        self.emit_event(EngineEvent::Stopped {
            reason: "Shutdown signal".to_string(),
        });
    }

    /// Run one pass over every enabled bucket
    pub async fn run_cycle(&self) -> CycleReport {
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("Starting cycle {}", cycle);
        self.emit_event(EngineEvent::CycleStarted { cycle });

        let mut report = CycleReport::default();

        if let Some(ranges) = &self.ranges {
            self.sync_cloudflare(ranges.as_ref(), &mut report).await;
        }

        if let (Some(source), Some(config)) = (&self.interface, &self.interface_config) {
            self.sync_interface(source.as_ref(), config, &mut report).await;
        }

        report
    }

    fn bucket_count(&self) -> usize {
        let cloudflare = if self.ranges.is_some() { 2 } else { 0 };
        let interface = match &self.interface_config {
            Some(c) if !c.dns_hostnames.is_empty() => 2,
            Some(_) => 1,
            None => 0,
        };
        cloudflare + interface
    }

    async fn sync_cloudflare(&self, source: &dyn RangeSource, report: &mut CycleReport) {
        let ranges = match source.ranges().await {
            Ok(ranges) => ranges,
            Err(e) => {
                error!("Failed to fetch ranges from {}: {}", source.source_name(), e);
                self.source_failed(source.source_name(), &e, report);
                return;
            }
        };

        info!(
            "Fetched {} IPv6 and {} IPv4 range(s) from {}",
            ranges.ipv6.len(),
            ranges.ipv4.len(),
            source.source_name()
        );

        let status = self
            .sync_bucket(&self.cloudflare.v6_bucket(), &ranges.ipv6, true)
            .await;
        report.buckets.push((self.cloudflare.v6_bucket().cache_key(), status));

        let status = self
            .sync_bucket(&self.cloudflare.v4_bucket(), &ranges.ipv4, true)
            .await;
        report.buckets.push((self.cloudflare.v4_bucket().cache_key(), status));
    }

    async fn sync_interface(
        &self,
        source: &dyn InterfaceSource,
        config: &InterfaceConfig,
        report: &mut CycleReport,
    ) {
        let address = match source.global_ipv6().await {
            Ok(Some(address)) => address,
            Ok(None) => {
                info!(
                    "No global IPv6 address on {}, leaving {} untouched",
                    source.interface_name(),
                    config.list_name
                );
                return;
            }
            Err(e) => {
                warn!(
                    "Failed to read address of {}: {}; treating as no address",
                    source.interface_name(),
                    e
                );
                self.source_failed(source.interface_name(), &e, report);
                return;
            }
        };

        info!("Interface {} IPv6: {}", source.interface_name(), address);
        report.interface_address = Some(address.clone());

        let bucket = config.bucket();
        let desired: Snapshot = [address.clone()].into();
        let status = self.sync_bucket(&bucket, &desired, false).await;
        report.buckets.push((bucket.cache_key(), status));

        if !config.dns_hostnames.is_empty() {
            let status = self.sync_dns(&config.dns_hostnames, &address).await;
            report.buckets.push((DNS_CACHE_KEY.to_string(), status));
        }
    }

    /// Skip-or-reconcile one address list
    async fn sync_bucket(
        &self,
        bucket: &Bucket,
        desired: &Snapshot,
        guard_empty: bool,
    ) -> BucketStatus {
        let key = bucket.cache_key();

        let previous = match self.snapshots.get_snapshot(&key).await {
            Ok(previous) => previous,
            Err(e) => return self.bucket_failed(&key, &e),
        };

        if let Some(previous) = &previous {
            if previous.addresses == *desired {
                debug!("{} unchanged since {}, skipping", bucket, previous.applied_at);
                self.emit_event(EngineEvent::BucketSkipped {
                    key,
                    reason: "unchanged".to_string(),
                });
                return BucketStatus::Unchanged;
            }

            // An upstream glitch returning no ranges would otherwise empty the list
            if guard_empty && desired.is_empty() && !previous.addresses.is_empty() {
                warn!(
                    "Source returned no addresses for {} (previously {})",
                    bucket,
                    previous.addresses.len()
                );
                if self.cloudflare.skip_empty {
                    self.emit_event(EngineEvent::BucketSkipped {
                        key,
                        reason: "empty snapshot".to_string(),
                    });
                    return BucketStatus::SkippedEmpty;
                }
            }
        }

        let outcome = match reconcile_bucket(self.store.as_ref(), bucket, desired).await {
            Ok(outcome) => outcome,
            Err(e) => return self.bucket_failed(&key, &e),
        };

        if let Err(e) = self.snapshots.set_snapshot(&key, desired.clone()).await {
            return self.bucket_failed(&key, &e);
        }

        info!(
            "{} updated: {} removed, {} added",
            bucket,
            outcome.removed.len(),
            outcome.added.len()
        );
        self.emit_event(EngineEvent::BucketReconciled {
            key,
            removed: outcome.removed.len(),
            added: outcome.added.len(),
        });

        BucketStatus::Applied {
            removed: outcome.removed.len(),
            added: outcome.added.len(),
        }
    }

    /// Skip-or-replace the static AAAA records
    async fn sync_dns(&self, hostnames: &[String], address: &str) -> BucketStatus {
        let desired: Snapshot = [address.to_string()].into();

        match self.snapshots.get_snapshot(DNS_CACHE_KEY).await {
            Ok(Some(previous)) if previous.addresses == desired => {
                debug!("AAAA records already point at {}, skipping", address);
                self.emit_event(EngineEvent::BucketSkipped {
                    key: DNS_CACHE_KEY.to_string(),
                    reason: "unchanged".to_string(),
                });
                return BucketStatus::Unchanged;
            }
            Ok(_) => {}
            Err(e) => return self.bucket_failed(DNS_CACHE_KEY, &e),
        }

        info!("Updating AAAA static DNS entries: {}", hostnames.join(","));

        let outcome = match reconcile_dns(self.store.as_ref(), hostnames, address).await {
            Ok(outcome) => outcome,
            Err(e) => return self.bucket_failed(DNS_CACHE_KEY, &e),
        };

        if let Err(e) = self.snapshots.set_snapshot(DNS_CACHE_KEY, desired).await {
            return self.bucket_failed(DNS_CACHE_KEY, &e);
        }

        self.emit_event(EngineEvent::DnsReconciled {
            address: address.to_string(),
            hostnames: outcome.added.len(),
        });

        BucketStatus::Applied {
            removed: outcome.removed.len(),
            added: outcome.added.len(),
        }
    }

    fn bucket_failed(&self, key: &str, e: &Error) -> BucketStatus {
        error!("Failed to update {} on {}: {}", key, self.store.store_name(), e);
        self.emit_event(EngineEvent::BucketFailed {
            key: key.to_string(),
            error: e.to_string(),
        });
        BucketStatus::Failed(e.to_string())
    }

    fn source_failed(&self, source: &str, e: &Error, report: &mut CycleReport) {
        self.emit_event(EngineEvent::SourceFailed {
            source: source.to_string(),
            error: e.to_string(),
        });
        report.source_errors.push((source.to_string(), e.to_string()));
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        // A full channel must not stall the cycle; a closed one means nobody listens
        match self.event_tx.try_send(event) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
        }
    }
}
