//! Tile service for answering batched client requests.
//!
//! The TileService is the main entry point for tile requests. Clients send
//! an ordered list of descriptors; the service answers with as many of them
//! as it can within the time budget and byte limit.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          TileService                             │
//! │  ┌────────────────────────────────────────────────────────────┐  │
//! │  │ get_tiles(), per group of descriptors:                     │  │
//! │  │  1. Collecting   parse, resolve resources, cache lookups   │  │
//! │  │  2. Dispatching  generate / compose misses concurrently    │  │
//! │  │  3. Validating   pick deliverable buffers, append output   │  │
//! │  └────────────────────────────────────────────────────────────┘  │
//! │        │                │                 │               │      │
//! │        ▼                ▼                 ▼               ▼      │
//! │  ┌───────────┐  ┌──────────────┐  ┌─────────────┐  ┌──────────┐  │
//! │  │CacheStore │  │ Consistency  │  │   Rights    │  │ Resource │  │
//! │  │           │  │ Validator    │  │  Composer   │  │ Resolver │  │
//! │  └───────────┘  └──────────────┘  └─────────────┘  └──────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The time budget is checked between groups only; a group that has been
//! dispatched always completes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::descriptor::{
    Descriptor, MapRights, ResourceDescriptor, RightsEvaluator, TileDescriptor, DEFAULT_ACP_LAYER,
};

use super::buffer::TileBuffer;
use super::cache::{CacheLookup, CacheStats, CacheStore};
use super::compose::{ComposeOutcome, RightsComposer};
use super::origin::{Generator, TileOrigin, TileRequest};
use super::record::CacheEntryGroup;
use super::resources::{BitmapTable, ResourceResolver};
use super::retry::RetryPolicy;
use super::stream::{BatchOutput, PushResult};
use super::validator::ConsistencyValidator;

/// Default number of descriptors handled per group
pub const DEFAULT_GROUP_SIZE: usize = 10;

/// Default client time budget
pub const DEFAULT_TIME_BUDGET: Duration = Duration::from_secs(5);

// =============================================================================
// Configuration
// =============================================================================

/// Settings of a [`TileService`].
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Current server prefix; tiles with any other prefix are stale
    pub server_prefix: u32,
    pub group_size: usize,
    pub time_budget: Duration,
    pub max_batch_bytes: Option<usize>,
    /// Layer whose tiles are composed from rights slices
    pub acp_layer: u32,
    /// Rights bits that have slices
    pub acp_rights: MapRights,
    /// Re-check cached string groups against their data group on every hit
    pub verify_cached: bool,
    pub retry: RetryPolicy,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            server_prefix: 1,
            group_size: DEFAULT_GROUP_SIZE,
            time_budget: DEFAULT_TIME_BUDGET,
            max_batch_bytes: None,
            acp_layer: DEFAULT_ACP_LAYER,
            acp_rights: MapRights::ALL,
            verify_cached: true,
            retry: RetryPolicy::default(),
        }
    }
}

// =============================================================================
// Batch Request / Response
// =============================================================================

/// An ordered list of descriptors from one client.
#[derive(Debug, Clone, Default)]
pub struct BatchRequest {
    pub descriptors: Vec<String>,
    pub user: Option<String>,
    /// Overrides the service's default budget
    pub time_budget: Option<Duration>,
    /// Overrides the service's default byte limit
    pub max_bytes: Option<usize>,
}

impl BatchRequest {
    pub fn new<I, S>(descriptors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            descriptors: descriptors.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = Some(budget);
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }
}

/// Stage of a batch, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPhase {
    Collecting,
    Dispatching,
    Validating,
    Done,
}

/// Why a batch ended before every descriptor was considered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    TimeBudget,
    /// A tile used an old server prefix; the client got the current format
    /// descriptor instead
    StalePrefix,
    ByteLimit,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::TimeBudget => "time_budget",
            StopReason::StalePrefix => "stale_prefix",
            StopReason::ByteLimit => "byte_limit",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub wanted: usize,
    /// Entries written to the output
    pub added: usize,
    pub cached: usize,
    pub generated: usize,
    pub non_tiles: usize,
    pub placeholders: usize,
    /// Descriptors that produced nothing deliverable
    pub failed: usize,
    /// Descriptors not answered because the batch stopped or they repeated
    pub skipped: usize,
    pub stop_reason: Option<StopReason>,
}

/// Answer to a [`BatchRequest`].
#[derive(Debug)]
pub struct BatchResponse {
    pub output: BatchOutput,
    pub report: BatchReport,
}

// =============================================================================
// Per-batch bookkeeping
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Cached,
    Generated,
    Resource,
    Placeholder,
}

/// What one descriptor of a group resolves to.
enum Slot {
    Ready(TileBuffer, Source),
    Cached { text: String, group: CacheEntryGroup },
    Pending { text: String, key: String },
    Failed,
}

enum Work {
    Generate(TileRequest),
    Compose(TileDescriptor),
}

enum WorkResult {
    Group(CacheEntryGroup),
    Placeholder,
    Failed,
}

// =============================================================================
// Tile Service
// =============================================================================

/// Service answering batched tile requests from the cache, generating and
/// validating whatever is missing.
pub struct TileService {
    config: ServiceConfig,
    cache: Arc<CacheStore>,
    generator: Generator,
    validator: Arc<ConsistencyValidator>,
    composer: RightsComposer,
    resources: ResourceResolver,
    rights: Arc<dyn RightsEvaluator>,
}

impl TileService {
    pub fn new(
        config: ServiceConfig,
        cache: Arc<CacheStore>,
        origin: Arc<dyn TileOrigin>,
        bitmaps: BitmapTable,
        rights: Arc<dyn RightsEvaluator>,
    ) -> Self {
        let generator = Generator::new(origin, config.retry);
        let validator = Arc::new(ConsistencyValidator::new(cache.clone(), generator.clone()));
        let composer = RightsComposer::new(
            cache.clone(),
            generator.clone(),
            validator.clone(),
            config.acp_rights,
        )
        .with_verify_cached(config.verify_cached);
        let resources =
            ResourceResolver::new(bitmaps, cache.clone(), generator.clone(), config.server_prefix);
        Self {
            config,
            cache,
            generator,
            validator,
            composer,
            resources,
            rights,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn resources(&self) -> &ResourceResolver {
        &self.resources
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Drop the cached group behind `descriptor`. Returns the cache key, or
    /// `None` for descriptors that are never cached.
    pub async fn invalidate(&self, descriptor: &str) -> Option<String> {
        let key = match Descriptor::parse(descriptor) {
            Descriptor::Tile(tile) => tile.normalize(),
            Descriptor::Resource(resource @ ResourceDescriptor::FormatDesc { .. }) => {
                resource.to_string()
            }
            Descriptor::Resource(_) | Descriptor::Invalid(_) => return None,
        };
        self.cache.invalidate(&key).await;
        info!(key = %key, "Invalidated cache entry");
        Some(key)
    }

    /// Answer a batch of descriptors.
    pub async fn get_tiles(&self, request: BatchRequest) -> BatchResponse {
        let started = Instant::now();
        let budget = request.time_budget.unwrap_or(self.config.time_budget);
        let user_rights = self.rights.permissions_for(request.user.as_deref());
        let mut output = BatchOutput::new(request.max_bytes.or(self.config.max_batch_bytes));
        let mut report = BatchReport {
            wanted: request.descriptors.len(),
            ..BatchReport::default()
        };

        let group_size = self.config.group_size.max(1);
        let groups: Vec<&[String]> = request.descriptors.chunks(group_size).collect();
        for (index, descriptors) in groups.iter().enumerate() {
            debug!(phase = ?BatchPhase::Collecting, group = index, "Batch group");
            let (slots, work, stale) = self.collect(descriptors, user_rights).await;
            if stale {
                report.stop_reason = Some(StopReason::StalePrefix);
            }

            debug!(phase = ?BatchPhase::Dispatching, group = index, requests = work.len(), "Batch group");
            let results = self.dispatch(work, user_rights).await;

            debug!(phase = ?BatchPhase::Validating, group = index, "Batch group");
            if !self.accumulate(slots, &results, &mut output, &mut report) {
                report.stop_reason = Some(StopReason::ByteLimit);
            }

            if report.stop_reason.is_some() {
                break;
            }
            let more = index + 1 < groups.len();
            if more && started.elapsed() >= budget {
                warn!(
                    budget_ms = budget.as_millis() as u64,
                    "Time budget exceeded, not adding any more tiles"
                );
                report.stop_reason = Some(StopReason::TimeBudget);
                break;
            }
        }

        report.skipped = report.wanted.saturating_sub(report.added + report.failed);
        info!(
            phase = ?BatchPhase::Done,
            wanted = report.wanted,
            added = report.added,
            cached = report.cached,
            generated = report.generated,
            non_tiles = report.non_tiles,
            placeholders = report.placeholders,
            failed = report.failed,
            skipped = report.skipped,
            stop = ?report.stop_reason,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Batch done"
        );
        BatchResponse { output, report }
    }

    /// Resolve what can be resolved without the origin and list the rest.
    /// Stops early, returning `true`, at a tile with a stale server prefix.
    async fn collect(
        &self,
        descriptors: &[String],
        user_rights: MapRights,
    ) -> (Vec<Slot>, Vec<(String, Work)>, bool) {
        let mut slots = Vec::with_capacity(descriptors.len());
        let mut work: Vec<(String, Work)> = Vec::new();

        for text in descriptors {
            let tile = match Descriptor::parse(text) {
                Descriptor::Invalid(text) => {
                    warn!(descriptor = %text, "Invalid descriptor, sending ocean tile");
                    slots.push(Slot::Ready(TileBuffer::ocean(text), Source::Placeholder));
                    continue;
                }
                Descriptor::Resource(resource) => {
                    slots.push(match self.resources.resolve(&resource).await {
                        Ok(buffer) => Slot::Ready(buffer, Source::Resource),
                        Err(e) => {
                            warn!(descriptor = %text, error = %e, "Failed to resolve resource");
                            Slot::Failed
                        }
                    });
                    continue;
                }
                Descriptor::Tile(tile) => tile,
            };

            if tile.server_prefix != self.config.server_prefix {
                info!(
                    descriptor = %text,
                    current = self.config.server_prefix,
                    "Stale server prefix, sending format descriptor"
                );
                slots.push(
                    match self.resources.current_format_descriptor(tile.language).await {
                        Ok(buffer) => Slot::Ready(buffer, Source::Resource),
                        Err(e) => {
                            warn!(error = %e, "Failed to produce format descriptor");
                            Slot::Failed
                        }
                    },
                );
                return (slots, work, true);
            }

            if let Some(rights) = tile.rights {
                if !user_rights.contains(rights) {
                    debug!(descriptor = %text, "Rights slice not held by user");
                    slots.push(Slot::Ready(
                        TileBuffer::placeholder(text.clone()),
                        Source::Placeholder,
                    ));
                    continue;
                }
            }

            let key = tile.normalize();
            if tile.needs_rights_split(self.config.acp_layer) {
                queue(&mut work, &key, || Work::Compose(tile.with_importance(0)));
            } else if !tile.is_cacheable() {
                queue(&mut work, &key, || Work::Generate(TileRequest::for_descriptor(&tile)));
            } else if let Some(group) = self.cached_group(&key).await {
                slots.push(Slot::Cached {
                    text: text.clone(),
                    group,
                });
                continue;
            } else {
                queue(&mut work, &key, || Work::Generate(TileRequest::for_descriptor(&tile)));
            }
            slots.push(Slot::Pending {
                text: text.clone(),
                key,
            });
        }

        (slots, work, false)
    }

    /// Cached group for `key`, unless it fails the pairing check.
    async fn cached_group(&self, key: &str) -> Option<CacheEntryGroup> {
        let CacheLookup::Hit(group) = self.cache.lookup(key).await else {
            return None;
        };
        if self.config.verify_cached && !self.validator.verify_cached(&group).await {
            return None;
        }
        Some(group)
    }

    /// Run every queued generation or composition concurrently.
    async fn dispatch(
        &self,
        work: Vec<(String, Work)>,
        user_rights: MapRights,
    ) -> HashMap<String, WorkResult> {
        let futures = work.into_iter().map(|(key, work)| async move {
            let result = match work {
                Work::Generate(request) => match self.generator.generate(&request).await {
                    Ok(group) => WorkResult::Group(self.validator.validate_and_store(group).await.group),
                    Err(e) => {
                        warn!(key = %key, error = %e, "Failed to generate tile group");
                        WorkResult::Failed
                    }
                },
                Work::Compose(descriptor) => {
                    match self.composer.compose_for_rights(&descriptor, user_rights).await {
                        ComposeOutcome::Composed(group) => WorkResult::Group(group),
                        ComposeOutcome::Placeholder(_) => WorkResult::Placeholder,
                        // Never hand out a partial merge
                        ComposeOutcome::Failed { .. } => WorkResult::Placeholder,
                    }
                }
            };
            (key, result)
        });
        join_all(futures).await.into_iter().collect()
    }

    /// Append the group's answers in request order. Returns `false` once
    /// the output is full.
    fn accumulate(
        &self,
        slots: Vec<Slot>,
        results: &HashMap<String, WorkResult>,
        output: &mut BatchOutput,
        report: &mut BatchReport,
    ) -> bool {
        for slot in slots {
            let (buffer, source) = match slot {
                Slot::Ready(buffer, source) => (buffer, source),
                Slot::Failed => {
                    report.failed += 1;
                    continue;
                }
                Slot::Cached { text, group } => match member(&group, &text) {
                    Some(buffer) => (buffer, Source::Cached),
                    None => {
                        debug!(descriptor = %text, "Importance not in cached group");
                        report.failed += 1;
                        continue;
                    }
                },
                Slot::Pending { text, key } => match results.get(&key) {
                    Some(WorkResult::Group(group)) => match member(group, &text) {
                        Some(buffer) if buffer.is_placeholder() => (buffer, Source::Placeholder),
                        Some(buffer) if buffer.good => (buffer, Source::Generated),
                        _ => {
                            debug!(descriptor = %text, "No deliverable buffer");
                            report.failed += 1;
                            continue;
                        }
                    },
                    Some(WorkResult::Placeholder) => {
                        (TileBuffer::placeholder(text), Source::Placeholder)
                    }
                    Some(WorkResult::Failed) | None => {
                        report.failed += 1;
                        continue;
                    }
                },
            };

            match output.push(&buffer) {
                PushResult::Added => {
                    report.added += 1;
                    match source {
                        Source::Cached => report.cached += 1,
                        Source::Generated => report.generated += 1,
                        Source::Resource => report.non_tiles += 1,
                        Source::Placeholder => report.placeholders += 1,
                    }
                }
                PushResult::Duplicate => {}
                PushResult::Full => return false,
            }
        }
        true
    }
}

fn queue(work: &mut Vec<(String, Work)>, key: &str, make: impl FnOnce() -> Work) {
    if !work.iter().any(|(queued, _)| queued == key) {
        work.push((key.to_string(), make()));
    }
}

fn member(group: &CacheEntryGroup, text: &str) -> Option<TileBuffer> {
    group.buffers().iter().find(|b| b.descriptor == text).cloned()
}

// =============================================================================
// Tests
// =============================================================================
