//! NetAssist - Chat Assistant Fulfillment Backend
//!
//! Answers chat questions about a managed network hierarchy
//! (organizations → networks → devices/admins). Users name resources
//! approximately and across several turns; the backend resolves those names
//! against an in-memory snapshot of the hierarchy, asks follow-up questions
//! when a name is missing or ambiguous, and talks to the rate-limited
//! management API only through a retrying, throttled executor.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  Conversational platform (Google, Facebook, Slack, Spark)       │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │ POST /chat
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  Webhook: source filter, context reconcile, render per platform │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  Action Registry ──► ActionHandler                              │
//! │        ResolutionOrchestrator (fuzzy match, reprompts)          │
//! └─────────────────────────────────────────────────────────────────┘
//!              │ reads                          │ traffic, clients
//!              ▼                                ▼
//! ┌──────────────────────────┐    ┌─────────────────────────────────┐
//! │  SnapshotStore (+ KV)    │◄───│  RetryExecutor + Throttle       │
//! └──────────────────────────┘    │        ManagementApi            │
//!              ▲                  └─────────────────────────────────┘
//!              │ install                        ▲
//! ┌──────────────────────────┐                  │
//! │  Refresh Pipeline        │──────────────────┘
//! └──────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use netassist::{AppConfig, RefreshPipeline, SnapshotStore};
//!
//! let config = AppConfig::load(None)?;
//! let store = Arc::new(SnapshotStore::new());
//! let pipeline = Arc::new(RefreshPipeline::new(api, executor, store.clone()));
//! pipeline.initial_refresh().await?;
//! tokio::spawn(run_refresh_loop(pipeline, config.refresh.interval()));
//! ```

pub mod actions;
pub mod config;
pub mod context;
pub mod duration;
pub mod error;
pub mod fuzzy;
pub mod model;
pub mod refresh;
pub mod resolution;
pub mod retry;
pub mod snapshot;
pub mod upstream;
pub mod webhook;

// Re-export main types
pub use actions::{ActionHandler, ActionId, ActionRegistry, ActionServices};
pub use config::AppConfig;
pub use error::{BotError, RefreshError, UpstreamError};
pub use model::{Admin, Device, EntityKind, Network, Organization, Snapshot};
pub use refresh::{run_refresh_loop, RefreshPipeline};
pub use resolution::{FieldKind, ResolutionOrchestrator, ResolutionOutcome};
pub use retry::{RetryExecutor, RetryPolicy, UpstreamThrottle};
pub use snapshot::{InMemoryKvStore, KvMirror, KvStore, SnapshotStore};
pub use upstream::{HttpManagementApi, ManagementApi};
pub use webhook::WebhookService;
