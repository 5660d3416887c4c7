//! Core types and traits for the adaptive execution-strategy engine.
//!
//! This crate provides the value types shared by every part of the engine
//! (tasks, strategy parameters, system metrics, execution progress, analysis
//! and scoring output), the batch descriptor handed to the engine, the error
//! taxonomy, configuration, and the [`Branch`] trait for the external work
//! primitive.

/// Batch descriptors and request shapes.
pub mod batch;
/// Engine configuration.
pub mod config;
/// Error types and result definitions.
pub mod error;
/// Mutable run state and checkpoints.
pub mod progress;
/// Trait definitions for the external work primitive.
pub mod traits;
/// Core value types for tasks, parameters, metrics and scores.
pub mod types;

pub use batch::{BatchDescriptor, FieldSpec, RequestShape};
pub use config::{EngineConfig, SwitchConfig};
pub use error::{Error, Result};
pub use progress::{Checkpoint, ExecutionProgress, ProgressSnapshot};
pub use traits::Branch;
pub use types::{
    ModelAnalysis, OperationKind, ScoringWeights, Session, StrategyConstraints, StrategyKind,
    StrategyParams, StrategyScore, SystemMetrics, Task, TaskId,
};
