//! Binding data retrieval for descriptor-annotated custom resources
//!
//! Reads fields of a custom resource named by its CRD descriptors, follows
//! secret and config map references, and publishes everything as a single
//! aggregate secret.

#![deny(missing_docs)]

pub mod cancel;
pub mod client;
pub mod config;
pub mod descriptor;
pub mod naming;
pub mod path;
pub mod plan;
pub mod publisher;
pub mod reader;
pub mod retriever;
pub mod store;

pub use client::{KubeResourceClient, ResourceClient, ResourceKind};
pub use config::{ItemSelection, RetrieverConfig, DEFAULT_FETCH_CONCURRENCY};
pub use plan::{DescriptorSchema, FieldDescriptor, Plan, Section};
pub use publisher::PublishOutcome;
pub use retriever::{RetrievalPhase, Retrieved, Retriever};
