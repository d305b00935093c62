//! # Vitalsync
//!
//! Health metric aggregation and upload pipeline: collects personal
//! health metrics from a device-local store, merges them into one
//! consistent daily snapshot, and delivers it to keyed object storage.
//!
//! ## Pipeline
//!
//! Scheduler trigger -> auth gate check/refresh -> concurrent metric
//! collection -> deterministic document render -> keyed object put.
//! Each stage is independently retryable and observable; a single
//! failing metric source never aborts a cycle, and a cycle either
//! uploads the full snapshot or nothing.
//!
//! ## Modules
//!
//! - [`metrics`]: sample types, query windows, the health store trait
//! - [`aggregator`]: concurrent fan-out/fan-in snapshot collection
//! - [`formatter`]: canonical upload document rendering
//! - [`upload`]: keyed object-store puts with credential refresh
//! - [`auth`]: identity token freshness and the auth state machine
//! - [`scheduler`]: manual, daily, and background-window triggers

pub mod aggregator;
pub mod auth;
pub mod config;
pub mod formatter;
pub mod metrics;
pub mod profile;
pub mod scheduler;
pub mod upload;

// Re-export top-level types for convenience
pub use aggregator::{Aggregator, HealthSnapshot, Slot, SourceFailure};

pub use auth::{
    AuthError, AuthGate, AuthState, HttpTokenRefresher, IdentityToken, TokenRefresher,
};

pub use config::{Config, ConfigError, LoggingConfig, ProfileConfig, SchedulerSection, UploadConfig};

pub use formatter::{render, storage_key, UploadDocument};

pub use metrics::{
    HealthStore, MemoryHealthStore, QuantityKind, Sample, SleepSample, SleepStage,
    SleepStageAccumulator, SourceError, StageSummary, Window, WorkoutSample,
};

pub use profile::{ProfileError, ProfileStore};

pub use scheduler::{
    BackgroundHost, CycleError, CycleReport, CycleState, ExecutionWindow, IntervalBackgroundHost,
    Scheduler, SchedulerConfig, Trigger,
};

pub use upload::{
    CredentialProvider, ExchangeCredentialProvider, ObjectStoreConfig, SnapshotUploader,
    UploadClient, UploadCredentials, UploadError,
};
