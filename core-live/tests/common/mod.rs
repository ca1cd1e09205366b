//! Shared fixtures for the live album integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::catalog::{
    AssetCatalog, AssetId, BulkOutcome, CollectionId, CollectionSummary, SearchSpec,
};
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::storage::FileSystemAccess;
use bridge_traits::time::{Clock, TickSource, Ticker};
use bytes::Bytes;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use core_live::{DefinitionStore, LiveAlbumDependencies};
use core_runtime::events::EventBus;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

pub fn ids(items: &[&str]) -> Vec<AssetId> {
    items.iter().map(|s| s.to_string()).collect()
}

// ============================================================================
// In-memory catalog
// ============================================================================

#[derive(Debug, Clone, Default)]
struct Collection {
    name: String,
    description: String,
    assets: Vec<AssetId>,
}

#[derive(Default)]
struct CatalogState {
    collections: BTreeMap<CollectionId, Collection>,
    results: HashMap<String, Vec<AssetId>>,
    next_id: usize,

    fail_search: Option<String>,
    fail_contents: Option<String>,
    fail_list: Option<String>,
    fail_bulk_add: Option<String>,
    fail_set_description: Option<String>,
    reject_add: HashSet<AssetId>,
    reject_remove: HashSet<AssetId>,

    search_calls: usize,
    bulk_add_calls: usize,
    bulk_remove_calls: usize,
    last_max_results: Option<u32>,
}

/// Catalog fake with failure injection and call accounting
#[derive(Default)]
pub struct InMemoryCatalog {
    state: Mutex<CatalogState>,
    search_delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

fn spec_key(spec: &SearchSpec) -> String {
    serde_json::to_string(spec).unwrap()
}

impl InMemoryCatalog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_collection(&self, name: &str, description: &str, assets: &[&str]) -> CollectionId {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("col-{}", state.next_id);
        state.collections.insert(
            id.clone(),
            Collection {
                name: name.to_string(),
                description: description.to_string(),
                assets: ids(assets),
            },
        );
        id
    }

    pub fn remove_collection(&self, id: &str) {
        self.state.lock().unwrap().collections.remove(id);
    }

    pub fn set_results(&self, spec: &SearchSpec, results: &[&str]) {
        self.state
            .lock()
            .unwrap()
            .results
            .insert(spec_key(spec), ids(results));
    }

    pub fn contents(&self, id: &str) -> Vec<AssetId> {
        self.state
            .lock()
            .unwrap()
            .collections
            .get(id)
            .map(|c| c.assets.clone())
            .unwrap_or_default()
    }

    pub fn sorted_contents(&self, id: &str) -> Vec<AssetId> {
        let mut assets = self.contents(id);
        assets.sort();
        assets
    }

    /// Edit a description behind the engine's back
    pub fn set_description(&self, id: &str, description: &str) {
        if let Some(collection) = self.state.lock().unwrap().collections.get_mut(id) {
            collection.description = description.to_string();
        }
    }

    pub fn description(&self, id: &str) -> String {
        self.state
            .lock()
            .unwrap()
            .collections
            .get(id)
            .map(|c| c.description.clone())
            .unwrap_or_default()
    }

    pub fn collection_names(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .collections
            .values()
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn fail_search(&self, message: Option<&str>) {
        self.state.lock().unwrap().fail_search = message.map(str::to_string);
    }

    pub fn fail_contents(&self, message: Option<&str>) {
        self.state.lock().unwrap().fail_contents = message.map(str::to_string);
    }

    pub fn fail_list(&self, message: Option<&str>) {
        self.state.lock().unwrap().fail_list = message.map(str::to_string);
    }

    pub fn fail_bulk_add(&self, message: Option<&str>) {
        self.state.lock().unwrap().fail_bulk_add = message.map(str::to_string);
    }

    pub fn fail_set_description(&self, message: Option<&str>) {
        self.state.lock().unwrap().fail_set_description = message.map(str::to_string);
    }

    pub fn reject_on_add(&self, asset: &str) {
        self.state.lock().unwrap().reject_add.insert(asset.to_string());
    }

    pub fn reject_on_remove(&self, asset: &str) {
        self.state
            .lock()
            .unwrap()
            .reject_remove
            .insert(asset.to_string());
    }

    pub fn clear_rejections(&self) {
        let mut state = self.state.lock().unwrap();
        state.reject_add.clear();
        state.reject_remove.clear();
    }

    /// Make every search take this long (virtual time friendly)
    pub fn delay_search(&self, delay: Duration) {
        *self.search_delay.lock().unwrap() = Some(delay);
    }

    pub fn search_calls(&self) -> usize {
        self.state.lock().unwrap().search_calls
    }

    pub fn bulk_add_calls(&self) -> usize {
        self.state.lock().unwrap().bulk_add_calls
    }

    pub fn bulk_remove_calls(&self) -> usize {
        self.state.lock().unwrap().bulk_remove_calls
    }

    pub fn last_max_results(&self) -> Option<u32> {
        self.state.lock().unwrap().last_max_results
    }

    /// Highest number of searches observed running at the same time
    pub fn max_concurrent_searches(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AssetCatalog for InMemoryCatalog {
    async fn search(&self, spec: &SearchSpec, max_results: u32) -> Result<Vec<AssetId>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let delay = *self.search_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        state.search_calls += 1;
        state.last_max_results = Some(max_results);
        if let Some(message) = &state.fail_search {
            return Err(BridgeError::OperationFailed(message.clone()));
        }
        let mut results = state.results.get(&spec_key(spec)).cloned().unwrap_or_default();
        results.truncate(max_results as usize);
        Ok(results)
    }

    async fn collection_contents(&self, collection_id: &str) -> Result<Vec<AssetId>> {
        let state = self.state.lock().unwrap();
        if let Some(message) = &state.fail_contents {
            return Err(BridgeError::OperationFailed(message.clone()));
        }
        state
            .collections
            .get(collection_id)
            .map(|c| c.assets.clone())
            .ok_or_else(|| BridgeError::NotFound(format!("collection {}", collection_id)))
    }

    async fn bulk_add(&self, collection_id: &str, ids: &[AssetId]) -> Result<BulkOutcome> {
        let mut state = self.state.lock().unwrap();
        state.bulk_add_calls += 1;
        if let Some(message) = &state.fail_bulk_add {
            return Err(BridgeError::OperationFailed(message.clone()));
        }
        let rejected = state.reject_add.clone();
        let collection = state
            .collections
            .get_mut(collection_id)
            .ok_or_else(|| BridgeError::NotFound(format!("collection {}", collection_id)))?;

        let mut outcome = BulkOutcome::default();
        for id in ids {
            if rejected.contains(id) {
                outcome.failed.push(id.clone());
            } else {
                if !collection.assets.contains(id) {
                    collection.assets.push(id.clone());
                }
                outcome.succeeded.push(id.clone());
            }
        }
        Ok(outcome)
    }

    async fn bulk_remove(&self, collection_id: &str, ids: &[AssetId]) -> Result<BulkOutcome> {
        let mut state = self.state.lock().unwrap();
        state.bulk_remove_calls += 1;
        let rejected = state.reject_remove.clone();
        let collection = state
            .collections
            .get_mut(collection_id)
            .ok_or_else(|| BridgeError::NotFound(format!("collection {}", collection_id)))?;

        let mut outcome = BulkOutcome::default();
        for id in ids {
            if rejected.contains(id) {
                outcome.failed.push(id.clone());
            } else {
                collection.assets.retain(|a| a != id);
                outcome.succeeded.push(id.clone());
            }
        }
        Ok(outcome)
    }

    async fn create_collection(&self, name: &str, description: &str) -> Result<CollectionId> {
        Ok(self.add_collection(name, description, &[]))
    }

    async fn collection_description(&self, collection_id: &str) -> Result<String> {
        self.state
            .lock()
            .unwrap()
            .collections
            .get(collection_id)
            .map(|c| c.description.clone())
            .ok_or_else(|| BridgeError::NotFound(format!("collection {}", collection_id)))
    }

    async fn set_collection_description(&self, collection_id: &str, description: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(message) = &state.fail_set_description {
            return Err(BridgeError::OperationFailed(message.clone()));
        }
        let collection = state
            .collections
            .get_mut(collection_id)
            .ok_or_else(|| BridgeError::NotFound(format!("collection {}", collection_id)))?;
        collection.description = description.to_string();
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<CollectionSummary>> {
        let state = self.state.lock().unwrap();
        if let Some(message) = &state.fail_list {
            return Err(BridgeError::OperationFailed(message.clone()));
        }
        Ok(state
            .collections
            .iter()
            .map(|(id, c)| CollectionSummary {
                id: id.clone(),
                name: c.name.clone(),
                description: c.description.clone(),
                asset_count: c.assets.len() as u64,
            })
            .collect())
    }
}

// ============================================================================
// Clock, ticks and file system
// ============================================================================

/// Clock that only moves when told to
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
        })
    }

    pub fn advance(&self, seconds: i64) {
        *self.now.lock().unwrap() += ChronoDuration::seconds(seconds);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Tick source fired by hand from the test
pub struct ManualTickSource {
    sender: broadcast::Sender<()>,
    tickers_created: AtomicUsize,
}

impl ManualTickSource {
    pub fn new() -> Arc<Self> {
        let (sender, _) = broadcast::channel(16);
        Arc::new(Self {
            sender,
            tickers_created: AtomicUsize::new(0),
        })
    }

    /// Fire one tick; returns how many tickers were listening
    pub fn fire(&self) -> usize {
        self.sender.send(()).unwrap_or(0)
    }

    pub fn tickers_created(&self) -> usize {
        self.tickers_created.load(Ordering::SeqCst)
    }
}

struct ManualTicker {
    receiver: broadcast::Receiver<()>,
}

#[async_trait]
impl Ticker for ManualTicker {
    async fn tick(&mut self) {
        loop {
            match self.receiver.recv().await {
                Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => return,
                Err(broadcast::error::RecvError::Closed) => std::future::pending::<()>().await,
            }
        }
    }
}

impl TickSource for ManualTickSource {
    fn ticker(&self, _period: Duration) -> Box<dyn Ticker> {
        self.tickers_created.fetch_add(1, Ordering::SeqCst);
        Box::new(ManualTicker {
            receiver: self.sender.subscribe(),
        })
    }
}

/// In-memory file system whose writes can be made to fail
#[derive(Default)]
pub struct MemoryFileSystem {
    files: Mutex<HashMap<PathBuf, Bytes>>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryFileSystem {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn contents(&self, path: &Path) -> Option<String> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    pub fn put(&self, path: &Path, data: &str) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), Bytes::from(data.to_string()));
    }
}

#[async_trait]
impl FileSystemAccess for MemoryFileSystem {
    async fn get_data_directory(&self) -> Result<PathBuf> {
        Ok(PathBuf::from("/data"))
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(self.files.lock().unwrap().contains_key(path))
    }

    async fn create_dir_all(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    async fn read_file(&self, path: &Path) -> Result<Bytes> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| BridgeError::NotFound(path.display().to_string()))
    }

    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()> {
        self.write_file_atomic(path, data).await
    }

    async fn write_file_atomic(&self, path: &Path, data: Bytes) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BridgeError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), data);
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        self.files.lock().unwrap().remove(path);
        Ok(())
    }
}

// ============================================================================
// Wiring
// ============================================================================

pub const STORE_PATH: &str = "/data/definitions.json";

pub struct Harness {
    pub catalog: Arc<InMemoryCatalog>,
    pub fs: Arc<MemoryFileSystem>,
    pub clock: Arc<ManualClock>,
    pub ticks: Arc<ManualTickSource>,
    pub events: EventBus,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            catalog: InMemoryCatalog::new(),
            fs: MemoryFileSystem::new(),
            clock: ManualClock::new(),
            ticks: ManualTickSource::new(),
            events: EventBus::new(64),
        }
    }

    pub fn deps(&self) -> LiveAlbumDependencies {
        LiveAlbumDependencies {
            catalog: self.catalog.clone(),
            file_system: self.fs.clone(),
            clock: self.clock.clone(),
            tick_source: self.ticks.clone(),
            event_bus: self.events.clone(),
        }
    }

    pub async fn store(&self) -> Arc<DefinitionStore> {
        Arc::new(
            DefinitionStore::open(self.fs.clone(), self.clock.clone(), PathBuf::from(STORE_PATH))
                .await
                .unwrap(),
        )
    }
}
