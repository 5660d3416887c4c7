//! Strategy registry.
//!
//! Maps each strategy to the constructor for its executor. The registry is an
//! ordinary value owned by a factory; registration order doubles as the
//! tie-break when two strategies score the same.
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

use pivot_core::{Error, Result, StrategyKind};

use crate::executor::{
    ChunkedExecutor, ConcurrentExecutor, ExecutorConstructor, ExecutorInit, HybridExecutor,
    SequentialExecutor, StrategyExecutor,
};

/// Wraps an executor's constructor for registration.
pub fn constructor<E, F>(build: F) -> ExecutorConstructor
where
    E: StrategyExecutor + 'static,
    F: Fn(ExecutorInit) -> E + Send + Sync + 'static,
{
    Arc::new(move |init: ExecutorInit| -> Box<dyn StrategyExecutor> { Box::new(build(init)) })
}

/// Registry of executor constructors in registration order.
#[derive(Clone)]
pub struct StrategyRegistry {
    entries: Vec<(StrategyKind, ExecutorConstructor)>,
}

impl StrategyRegistry {
    /// Creates a new empty strategy registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Creates a registry with the four built-in strategies.
    ///
    /// Registration order: sequential, concurrent, chunked, hybrid.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(StrategyKind::Sequential, constructor(SequentialExecutor::new));
        registry.register(StrategyKind::Concurrent, constructor(ConcurrentExecutor::new));
        registry.register(StrategyKind::Chunked, constructor(ChunkedExecutor::new));
        registry.register(StrategyKind::Hybrid, constructor(HybridExecutor::new));
        registry
    }

    /// Registers the constructor for `kind`.
    ///
    /// A strategy that is already registered keeps its position and gets the
    /// new constructor.
    pub fn register(&mut self, kind: StrategyKind, constructor: ExecutorConstructor) {
        if let Some(entry) = self.entries.iter_mut().find(|(registered, _)| *registered == kind) {
            entry.1 = constructor;
        } else {
            self.entries.push((kind, constructor));
        }
    }

    /// Registered strategies in registration order.
    pub fn kinds(&self) -> Vec<StrategyKind> {
        self.entries.iter().map(|(kind, _)| *kind).collect()
    }

    /// Whether `kind` is registered.
    pub fn contains(&self, kind: StrategyKind) -> bool {
        self.entries.iter().any(|(registered, _)| *registered == kind)
    }

    /// Returns the number of registered strategies.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Builds the executor for `kind`.
    ///
    /// # Errors
    /// Returns [`Error::StrategyNotRegistered`] if `kind` has no constructor.
    pub fn create(
        &self,
        kind: StrategyKind,
        init: ExecutorInit,
    ) -> Result<Box<dyn StrategyExecutor>> {
        let (_, build) = self
            .entries
            .iter()
            .find(|(registered, _)| *registered == kind)
            .ok_or(Error::StrategyNotRegistered(kind))?;
        Ok(build(init))
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl Debug for StrategyRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("StrategyRegistry")
            .field("strategies", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::StaticMetrics;
    use pivot_core::{ExecutionProgress, StrategyParams};

    fn init() -> ExecutorInit {
        ExecutorInit::new(
            StrategyParams::default(),
            ExecutionProgress::default(),
            Arc::new(StaticMetrics::default()),
        )
    }

    #[test]
    fn test_defaults_in_registration_order() {
        let registry = StrategyRegistry::with_defaults();
        assert_eq!(registry.kinds(), StrategyKind::ALL.to_vec());
        for kind in StrategyKind::ALL {
            match registry.create(kind, init()) {
                Ok(executor) => assert_eq!(executor.kind(), kind),
                Err(error) => panic!("failed to create {kind}: {error}"),
            }
        }
    }

    #[test]
    fn test_register_replaces_in_place() {
        let mut registry = StrategyRegistry::with_defaults();
        registry.register(StrategyKind::Sequential, constructor(ChunkedExecutor::new));
        assert_eq!(registry.len(), 4);
        assert_eq!(registry.kinds()[0], StrategyKind::Sequential);
        match registry.create(StrategyKind::Sequential, init()) {
            Ok(executor) => assert_eq!(executor.kind(), StrategyKind::Chunked),
            Err(error) => panic!("failed to create replacement: {error}"),
        }
    }

    #[test]
    fn test_debug_lists_strategies() {
        let registry = StrategyRegistry::with_defaults();
        assert_eq!(
            format!("{registry:?}"),
            "StrategyRegistry { strategies: [Sequential, Concurrent, Chunked, Hybrid] }"
        );
    }

    #[test]
    fn test_unregistered_strategy() {
        let mut registry = StrategyRegistry::new();
        assert!(registry.is_empty());
        registry.register(StrategyKind::Hybrid, constructor(HybridExecutor::new));
        assert!(registry.contains(StrategyKind::Hybrid));
        assert!(matches!(
            registry.create(StrategyKind::Concurrent, init()),
            Err(Error::StrategyNotRegistered(StrategyKind::Concurrent))
        ));
    }
}
