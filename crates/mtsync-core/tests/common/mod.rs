//! Test doubles shared by the engine contract tests
//!
//! Each double keeps its state behind an `Arc`, so a clone handed to the
//! engine and the clone kept by the test observe the same router.

#![allow(dead_code)]

use async_trait::async_trait;
use mtsync_core::config::{CloudflareConfig, EngineConfig, InterfaceConfig, RouterConfig, SyncConfig};
use mtsync_core::error::{Error, Result};
use mtsync_core::traits::{
    Bucket, DnsEntry, InterfaceSource, ListEntry, RangeSnapshot, RangeSource, RecordHandle,
    RouterStore,
};
use mtsync_core::{InterfaceName, MemorySnapshotStore, SyncEngine};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// A mutating call observed by the fake router
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Remove { key: String, address: String },
    Add { key: String, address: String },
    RemoveDns { name: String, address: String },
    AddDns { name: String, address: String },
}

#[derive(Default)]
struct RouterState {
    next_id: u32,
    lists: Vec<(Bucket, ListEntry)>,
    dns: Vec<DnsEntry>,
    ops: Vec<Op>,
    list_calls: usize,
    failing_lists: Vec<String>,
    fail_dns: bool,
    /// Index (into `ops`) of the mutating call that fails
    fail_change_at: Option<usize>,
}

/// In-memory RouterStore
#[derive(Clone, Default)]
pub struct FakeRouter {
    state: Arc<Mutex<RouterState>>,
}

impl FakeRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, bucket: &Bucket, addresses: &[&str]) {
        let mut state = self.state.lock().unwrap();
        for address in addresses {
            state.next_id += 1;
            let entry = ListEntry {
                handle: RecordHandle::new(format!("*{:X}", state.next_id)),
                list: bucket.list.clone(),
                address: address.to_string(),
            };
            state.lists.push((bucket.clone(), entry));
        }
    }

    pub fn seed_dns(&self, name: &str, address: &str) {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let entry = DnsEntry {
            handle: RecordHandle::new(format!("*{:X}", state.next_id)),
            name: name.to_string(),
            address: address.to_string(),
        };
        state.dns.push(entry);
    }

    /// Sorted addresses currently in a bucket
    pub fn addresses(&self, bucket: &Bucket) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut out: Vec<String> = state
            .lists
            .iter()
            .filter(|(b, _)| b == bucket)
            .map(|(_, e)| e.address.clone())
            .collect();
        out.sort();
        out
    }

    /// `(name, address)` of every static AAAA record
    pub fn dns(&self) -> Vec<(String, String)> {
        let state = self.state.lock().unwrap();
        state
            .dns
            .iter()
            .map(|e| (e.name.clone(), e.address.clone()))
            .collect()
    }

    pub fn ops(&self) -> Vec<Op> {
        self.state.lock().unwrap().ops.clone()
    }

    pub fn op_count(&self) -> usize {
        self.state.lock().unwrap().ops.len()
    }

    /// Number of listing calls (address lists and DNS)
    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }

    /// Make every call touching `list` fail until cleared
    pub fn fail_list(&self, list: &str) {
        self.state.lock().unwrap().failing_lists.push(list.to_string());
    }

    pub fn fail_dns(&self, fail: bool) {
        self.state.lock().unwrap().fail_dns = fail;
    }

    /// Fail the nth add/remove (0-based, counted over the whole router)
    pub fn fail_change_at(&self, n: usize) {
        self.state.lock().unwrap().fail_change_at = Some(n);
    }

    pub fn heal(&self) {
        let mut state = self.state.lock().unwrap();
        state.failing_lists.clear();
        state.fail_dns = false;
        state.fail_change_at = None;
    }

    fn check_change(state: &RouterState) -> Result<()> {
        if state.fail_change_at == Some(state.ops.len()) {
            return Err(Error::store("fake", "injected failure"));
        }
        Ok(())
    }

    fn check_list(state: &RouterState, bucket: &Bucket) -> Result<()> {
        if state.failing_lists.contains(&bucket.list) {
            return Err(Error::store("fake", format!("{} unavailable", bucket.list)));
        }
        Ok(())
    }

    fn check_dns(state: &RouterState) -> Result<()> {
        if state.fail_dns {
            return Err(Error::store("fake", "dns unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl RouterStore for FakeRouter {
    async fn list_entries(&self, bucket: &Bucket) -> Result<Vec<ListEntry>> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        Self::check_list(&state, bucket)?;
        Ok(state
            .lists
            .iter()
            .filter(|(b, _)| b == bucket)
            .map(|(_, e)| e.clone())
            .collect())
    }

    async fn add_entry(&self, bucket: &Bucket, address: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_list(&state, bucket)?;
        Self::check_change(&state)?;
        state.next_id += 1;
        let entry = ListEntry {
            handle: RecordHandle::new(format!("*{:X}", state.next_id)),
            list: bucket.list.clone(),
            address: address.to_string(),
        };
        state.lists.push((bucket.clone(), entry));
        state.ops.push(Op::Add {
            key: bucket.cache_key(),
            address: address.to_string(),
        });
        Ok(())
    }

    async fn remove_entry(&self, bucket: &Bucket, handle: &RecordHandle) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_list(&state, bucket)?;
        Self::check_change(&state)?;
        let pos = state
            .lists
            .iter()
            .position(|(b, e)| b == bucket && &e.handle == handle)
            .ok_or_else(|| Error::store("fake", "no such item"))?;
        let (_, entry) = state.lists.remove(pos);
        state.ops.push(Op::Remove {
            key: bucket.cache_key(),
            address: entry.address,
        });
        Ok(())
    }

    async fn list_dns_records(&self) -> Result<Vec<DnsEntry>> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        Self::check_dns(&state)?;
        Ok(state.dns.clone())
    }

    async fn add_dns_record(&self, name: &str, address: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_dns(&state)?;
        Self::check_change(&state)?;
        state.next_id += 1;
        let entry = DnsEntry {
            handle: RecordHandle::new(format!("*{:X}", state.next_id)),
            name: name.to_string(),
            address: address.to_string(),
        };
        state.dns.push(entry);
        state.ops.push(Op::AddDns {
            name: name.to_string(),
            address: address.to_string(),
        });
        Ok(())
    }

    async fn remove_dns_record(&self, handle: &RecordHandle) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_dns(&state)?;
        Self::check_change(&state)?;
        let pos = state
            .dns
            .iter()
            .position(|e| &e.handle == handle)
            .ok_or_else(|| Error::store("fake", "no such item"))?;
        let entry = state.dns.remove(pos);
        state.ops.push(Op::RemoveDns {
            name: entry.name,
            address: entry.address,
        });
        Ok(())
    }

    fn store_name(&self) -> &'static str {
        "fake"
    }
}

/// Scripted outcome for one `ranges()` call
#[derive(Clone)]
pub enum RangeStep {
    Ok(RangeSnapshot),
    Fail,
}

/// RangeSource replaying a script; the last step repeats forever
#[derive(Clone)]
pub struct ScriptedRanges {
    steps: Arc<Mutex<VecDeque<RangeStep>>>,
    calls: Arc<Mutex<usize>>,
}

impl ScriptedRanges {
    pub fn new(steps: Vec<RangeStep>) -> Self {
        Self {
            steps: Arc::new(Mutex::new(steps.into())),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn always(v4: &[&str], v6: &[&str]) -> Self {
        Self::new(vec![RangeStep::Ok(ranges(v4, v6))])
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl RangeSource for ScriptedRanges {
    async fn ranges(&self) -> Result<RangeSnapshot> {
        *self.calls.lock().unwrap() += 1;
        let mut steps = self.steps.lock().unwrap();
        let step = if steps.len() > 1 {
            steps.pop_front()
        } else {
            steps.front().cloned()
        };
        match step {
            Some(RangeStep::Ok(snapshot)) => Ok(snapshot),
            Some(RangeStep::Fail) | None => {
                Err(Error::upstream("scripted", "connection reset by peer"))
            }
        }
    }

    fn source_name(&self) -> &'static str {
        "scripted"
    }
}

/// Scripted outcome for one `global_ipv6()` call
#[derive(Clone)]
pub enum InterfaceStep {
    Address(String),
    NoAddress,
    Fail,
}

/// InterfaceSource replaying a script; the last step repeats forever
#[derive(Clone)]
pub struct ScriptedInterface {
    steps: Arc<Mutex<VecDeque<InterfaceStep>>>,
}

impl ScriptedInterface {
    pub fn new(steps: Vec<InterfaceStep>) -> Self {
        Self {
            steps: Arc::new(Mutex::new(steps.into())),
        }
    }

    pub fn always(address: &str) -> Self {
        Self::new(vec![InterfaceStep::Address(address.to_string())])
    }
}

#[async_trait]
impl InterfaceSource for ScriptedInterface {
    async fn global_ipv6(&self) -> Result<Option<String>> {
        let mut steps = self.steps.lock().unwrap();
        let step = if steps.len() > 1 {
            steps.pop_front()
        } else {
            steps.front().cloned()
        };
        match step {
            Some(InterfaceStep::Address(a)) => Ok(Some(a)),
            Some(InterfaceStep::NoAddress) => Ok(None),
            Some(InterfaceStep::Fail) | None => {
                Err(Error::local_source("ip exited with status 1"))
            }
        }
    }

    fn interface_name(&self) -> &str {
        "eth0"
    }
}

pub fn ranges(v4: &[&str], v6: &[&str]) -> RangeSnapshot {
    RangeSnapshot::new(v4.iter().copied(), v6.iter().copied())
}

/// Config with Cloudflare enabled and interface tracking optional
pub fn config(cloudflare: bool, interface: Option<&[&str]>) -> SyncConfig {
    SyncConfig {
        router: RouterConfig::new("test-password"),
        cloudflare: CloudflareConfig {
            enabled: cloudflare,
            ..CloudflareConfig::default()
        },
        interface: interface.map(|hostnames| {
            InterfaceConfig::new(InterfaceName::parse("eth0").unwrap())
                .with_dns_hostnames(hostnames.iter().copied())
        }),
        engine: EngineConfig {
            check_interval_secs: 1,
            event_channel_capacity: 1024,
        },
    }
}

/// Build an engine over the given doubles
pub fn engine(
    router: &FakeRouter,
    ranges: Option<&ScriptedRanges>,
    interface: Option<&ScriptedInterface>,
    config: &SyncConfig,
) -> (SyncEngine, tokio::sync::mpsc::Receiver<mtsync_core::EngineEvent>) {
    SyncEngine::new(
        Box::new(router.clone()),
        Box::new(MemorySnapshotStore::new()),
        ranges.map(|r| Box::new(r.clone()) as Box<dyn RangeSource>),
        interface.map(|i| Box::new(i.clone()) as Box<dyn InterfaceSource>),
        config,
    )
    .expect("engine construction succeeds")
}

pub fn cf_v4() -> Bucket {
    Bucket::v4("cloudflarev4")
}

pub fn cf_v6() -> Bucket {
    Bucket::v6("cloudflarev6")
}

pub fn proxy() -> Bucket {
    Bucket::v6("proxyv6")
}
