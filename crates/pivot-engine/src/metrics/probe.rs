use std::sync::{Mutex, PoisonError, RwLock};

use pivot_core::SystemMetrics;
use sysinfo::System;

/// Source of live system metrics.
///
/// Sampled by the controller when it selects or re-evaluates a strategy, and by
/// the chunked executors between chunks.
pub trait MetricsProbe: Send + Sync {
    /// Take a fresh sample.
    fn sample(&self) -> SystemMetrics;
}

/// Probe that reports whatever metrics were last set on it.
#[derive(Debug, Default)]
pub struct StaticMetrics {
    metrics: RwLock<SystemMetrics>,
}

impl StaticMetrics {
    /// Creates a probe reporting `metrics`
    pub fn new(metrics: SystemMetrics) -> Self {
        Self {
            metrics: RwLock::new(metrics),
        }
    }

    /// Replaces the reported metrics
    pub fn set(&self, metrics: SystemMetrics) {
        *self.metrics.write().unwrap_or_else(PoisonError::into_inner) = metrics;
    }

    /// Currently reported metrics
    pub fn current(&self) -> SystemMetrics {
        *self.metrics.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MetricsProbe for StaticMetrics {
    fn sample(&self) -> SystemMetrics {
        self.current()
    }
}

/// Probe reading CPU and memory usage of the host.
///
/// Load is the mean CPU usage across cores as a fraction; memory is used over
/// total physical memory. Historical fields keep their defaults.
pub struct HostMetricsProbe {
    system: Mutex<System>,
}

impl HostMetricsProbe {
    /// Creates a probe and primes the CPU counters
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        system.refresh_memory();
        Self {
            system: Mutex::new(system),
        }
    }
}

impl Default for HostMetricsProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsProbe for HostMetricsProbe {
    fn sample(&self) -> SystemMetrics {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_cpu();
        system.refresh_memory();

        let cpus = system.cpus();
        let load = if cpus.is_empty() {
            0.0
        } else {
            let usage: f64 = cpus.iter().map(|cpu| f64::from(cpu.cpu_usage())).sum();
            usage / (cpus.len() as f64 * 100.0)
        };
        let total_memory = system.total_memory().max(1);
        let memory = system.used_memory() as f64 / total_memory as f64;
        drop(system);

        SystemMetrics::default()
            .with_load(load)
            .with_memory(memory.clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_metrics_update() {
        let probe = StaticMetrics::default();
        assert!(probe.sample().current_system_load.abs() < f64::EPSILON);

        probe.set(SystemMetrics::default().with_load(0.9).with_memory(0.4));
        let sampled = probe.sample();
        assert!((sampled.current_system_load - 0.9).abs() < f64::EPSILON);
        assert!((sampled.memory_usage - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn test_host_probe_reports_fractions() {
        let probe = HostMetricsProbe::new();
        let sampled = probe.sample();
        assert!(sampled.current_system_load >= 0.0);
        assert!((0.0..=1.0).contains(&sampled.memory_usage));
        assert!((sampled.historical_success_rate - 1.0).abs() < f64::EPSILON);
    }
}
