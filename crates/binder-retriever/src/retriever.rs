//! Retriever: drives descriptor evaluation and publishes the aggregate
//!
//! A run walks the spec descriptors, then the status descriptors, and finally
//! publishes everything collected as one secret:
//!
//! ```text
//! Init -> ResolvingSpec -> ResolvingStatus -> Publishing -> Done
//!              \                 \                \
//!               +-----------------+----------------+--> Failed
//! ```
//!
//! Within a section, markers are classified first and referenced resources
//! are fetched afterwards, once per distinct name. Any error aborts the run
//! and nothing is published.

use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use kube::api::DynamicObject;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use binder_common::{Error, Result};

use crate::client::{ResourceClient, ResourceKind};
use crate::config::RetrieverConfig;
use crate::descriptor::{BindingRequests, Marker, RequestedItems};
use crate::naming::{KeyNamer, KeySource};
use crate::path::{self, PathError};
use crate::plan::{Plan, Section};
use crate::publisher::{PublishOutcome, Publisher};
use crate::reader::{FetchedResource, ReferenceReader};
use crate::store::AggregateStore;

/// Where a retriever is in its run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetrievalPhase {
    /// No run started yet
    Init,
    /// Evaluating spec descriptors
    ResolvingSpec,
    /// Evaluating status descriptors
    ResolvingStatus,
    /// Writing the aggregate secret
    Publishing,
    /// Last run succeeded
    Done,
    /// Last run failed
    Failed,
}

impl RetrievalPhase {
    fn resolving(section: Section) -> Self {
        match section {
            Section::Spec => RetrievalPhase::ResolvingSpec,
            Section::Status => RetrievalPhase::ResolvingStatus,
        }
    }
}

/// Result of a successful run
#[derive(Clone, Debug)]
pub struct Retrieved {
    /// Every resource read or written, in the order it was touched; the
    /// aggregate secret is last
    pub objects: Vec<DynamicObject>,
    /// Secret names referenced by volume-mount markers, in first-seen order
    pub volume_keys: Vec<String>,
    /// Whether the aggregate was created or updated
    pub outcome: PublishOutcome,
}

/// State accumulated during one run, dropped on failure
struct RunState {
    store: AggregateStore,
    objects: Vec<DynamicObject>,
    volume_keys: Vec<String>,
}

impl RunState {
    fn add_volume_key(&mut self, name: &str) {
        if !self.volume_keys.iter().any(|k| k == name) {
            self.volume_keys.push(name.to_string());
        }
    }

    fn absorb(&mut self, resource: FetchedResource) {
        let source = match resource.kind {
            ResourceKind::Secret => KeySource::Secret,
            ResourceKind::ConfigMap => KeySource::ConfigMap,
        };
        for (key, value) in resource.entries {
            self.store.store(source, &key, value);
        }
        self.objects.push(resource.object);
    }
}

/// Resolves the binding data referenced by a plan into an aggregate secret
pub struct Retriever {
    client: Arc<dyn ResourceClient>,
    config: RetrieverConfig,
    cancel: CancellationToken,
    phase: RetrievalPhase,
}

impl Retriever {
    /// Create a retriever using `client` for every API call
    pub fn new(client: Arc<dyn ResourceClient>, config: RetrieverConfig) -> Self {
        Self {
            client,
            config,
            cancel: CancellationToken::new(),
            phase: RetrievalPhase::Init,
        }
    }

    /// Abort runs when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Current phase
    pub fn phase(&self) -> RetrievalPhase {
        self.phase
    }

    /// Resolve every descriptor of `plan` and publish the aggregate secret
    pub async fn retrieve(&mut self, plan: &Plan) -> Result<Retrieved> {
        self.phase = RetrievalPhase::Init;
        let result = self.run(plan).await;
        match &result {
            Ok(retrieved) => {
                self.transition(RetrievalPhase::Done);
                info!(
                    namespace = %plan.namespace,
                    name = %plan.name,
                    objects = retrieved.objects.len(),
                    "Binding data retrieved"
                );
            }
            Err(e) => {
                self.transition(RetrievalPhase::Failed);
                warn!(
                    namespace = %plan.namespace,
                    name = %plan.name,
                    resource = e.resource_name().unwrap_or("-"),
                    error = %e,
                    "Binding data retrieval failed, nothing published"
                );
            }
        }
        result
    }

    fn transition(&mut self, next: RetrievalPhase) {
        debug!(from = ?self.phase, to = ?next, "Retriever phase transition");
        self.phase = next;
    }

    async fn run(&mut self, plan: &Plan) -> Result<Retrieved> {
        let namer = KeyNamer::new(self.config.binding_prefix.as_deref(), plan.cr_kind()?);
        let mut state = RunState {
            store: AggregateStore::new(namer),
            objects: Vec::new(),
            volume_keys: Vec::new(),
        };

        for section in [Section::Spec, Section::Status] {
            self.transition(RetrievalPhase::resolving(section));
            info!(section = %section, "Looking for descriptors");
            let requests = classify_section(plan, section, &mut state)?;
            self.fetch(plan, requests, &mut state).await?;
        }

        self.transition(RetrievalPhase::Publishing);
        if state.store.is_empty() {
            warn!(name = %plan.name, "No binding data resolved, publishing an empty aggregate");
        } else {
            debug!(name = %plan.name, keys = state.store.len(), "Publishing binding data");
        }
        let (aggregate, outcome) = Publisher::new(self.client.as_ref(), &self.cancel)
            .publish(&plan.namespace, &plan.name, state.store.data())
            .await?;
        state.objects.push(aggregate);

        Ok(Retrieved {
            objects: state.objects,
            volume_keys: state.volume_keys,
            outcome,
        })
    }

    /// Fetch every requested resource once and store its entries
    ///
    /// Fetches may overlap up to the configured concurrency, but results are
    /// stored in request order (secrets, then config maps) so overlapping
    /// keys resolve the same way as a sequential run.
    async fn fetch(
        &self,
        plan: &Plan,
        requests: BindingRequests,
        state: &mut RunState,
    ) -> Result<()> {
        if requests.is_empty() {
            return Ok(());
        }

        let reader = &ReferenceReader::new(
            self.client.as_ref(),
            &plan.namespace,
            self.config.item_selection,
            &self.cancel,
        );

        let jobs: Vec<(ResourceKind, String, RequestedItems)> = requests
            .secrets
            .into_iter()
            .map(|(name, items)| (ResourceKind::Secret, name, items))
            .chain(
                requests
                    .config_maps
                    .into_iter()
                    .map(|(name, items)| (ResourceKind::ConfigMap, name, items)),
            )
            .collect();

        let fetched: Vec<FetchedResource> = stream::iter(jobs.iter())
            .map(move |(kind, name, items)| async move {
                match kind {
                    ResourceKind::Secret => reader.read_secret(name, items).await,
                    ResourceKind::ConfigMap => reader.read_config_map(name, items).await,
                }
            })
            .buffered(self.config.fetch_concurrency.max(1))
            .try_collect()
            .await?;

        for resource in fetched {
            state.absorb(resource);
        }
        Ok(())
    }
}

/// Classify every marker of a section
///
/// Attribute values are stored immediately; secret and config map references
/// are collected for fetching.
fn classify_section(plan: &Plan, section: Section, state: &mut RunState) -> Result<BindingRequests> {
    let mut requests = BindingRequests::default();

    for descriptor in plan.descriptors.for_section(section) {
        if descriptor.x_descriptors.is_empty() {
            continue;
        }
        let value = resolve_field(plan, section, &descriptor.path)?;

        for marker in &descriptor.x_descriptors {
            debug!(section = %section, path = %descriptor.path, marker = %marker, "Inspecting marker");
            match Marker::classify(marker) {
                Marker::Secret { item } => requests.request_secret(&value, item),
                Marker::ConfigMap { item } => requests.request_config_map(&value, item),
                Marker::VolumeMountSecret { item } => {
                    requests.request_secret(&value, item);
                    state.add_volume_key(&value);
                }
                Marker::Attribute => {
                    state
                        .store
                        .store(KeySource::Attribute, &descriptor.path, value.clone().into_bytes());
                }
                Marker::Ignored => {
                    debug!(marker = %marker, "Ignoring non-binding marker");
                }
            }
        }
    }

    Ok(requests)
}

/// Read the value at `path` in a section of the custom resource
fn resolve_field(plan: &Plan, section: Section, field_path: &str) -> Result<String> {
    info!(
        cr = %plan.cr_name(),
        section = %section,
        path = %field_path,
        "Reading CR attribute"
    );

    let tree = plan
        .custom_resource
        .data
        .get(section.key())
        .ok_or_else(|| Error::field_not_found(section.key(), field_path, section.key()))?;

    path::resolve_string(field_path, tree).map_err(|e| match e {
        PathError::Missing { segment } => Error::field_not_found(section.key(), field_path, segment),
        PathError::NotAMapping { segment } => Error::malformed(
            "custom resource",
            plan.cr_name(),
            format!("{section}.{field_path}: value holding '{segment}' is not a mapping"),
        ),
    })
}
