//! CPU budget for worker pools.
//!
//! External tools run their own threads, so stages only claim a fraction of
//! the cores: `max(1, floor(cpu_count × fraction))`.

use crate::error::{PipelineError, Result};

/// Number of logical CPUs, falling back to 1 when the query fails.
pub fn cpu_count() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1)
}

/// Reject fractions outside (0, 1].
pub fn validate_fraction(fraction: f64) -> Result<()> {
    if fraction.is_finite() && fraction > 0.0 && fraction <= 1.0 {
        Ok(())
    } else {
        Err(PipelineError::Config(format!(
            "cpu fraction must be in (0, 1], got {fraction}"
        )))
    }
}

/// `max(1, floor(cpu_count × fraction))`.
pub fn worker_count(cpu_count: usize, fraction: f64) -> usize {
    ((cpu_count as f64 * fraction).floor() as usize).max(1)
}

/// Worker count for this machine.
pub fn available_workers(fraction: f64) -> usize {
    worker_count(cpu_count(), fraction)
}

/// Caps an explicit request at the CPU budget; `None` takes the whole budget.
pub fn bounded_workers(requested: Option<usize>, cpu_count: usize, fraction: f64) -> usize {
    let budget = worker_count(cpu_count, fraction);
    match requested {
        Some(n) => n.min(budget).max(1),
        None => budget,
    }
}

/// Docking invocations are multi-core themselves, so they get half the budget.
pub fn docking_workers(cpu_count: usize, fraction: f64) -> usize {
    (worker_count(cpu_count, fraction) / 2).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_count_floors_product() {
        assert_eq!(worker_count(16, 0.9), 14);
        assert_eq!(worker_count(10, 0.95), 9);
        assert_eq!(worker_count(8, 1.0), 8);
    }

    #[test]
    fn test_worker_count_never_below_one() {
        assert_eq!(worker_count(1, 0.9), 1);
        assert_eq!(worker_count(1, 0.01), 1);
    }

    #[test]
    fn test_worker_count_matches_formula_over_grid() {
        for cpus in 1..=64usize {
            for step in 1..=20 {
                let fraction = step as f64 / 20.0;
                let expected = ((cpus as f64 * fraction).floor() as usize).max(1);
                assert_eq!(worker_count(cpus, fraction), expected, "cpus={cpus} f={fraction}");
            }
        }
    }

    #[test]
    fn test_bounded_workers_respects_request() {
        assert_eq!(bounded_workers(Some(4), 16, 0.9), 4);
        assert_eq!(bounded_workers(Some(64), 16, 0.9), 14);
        assert_eq!(bounded_workers(Some(0), 16, 0.9), 1);
        assert_eq!(bounded_workers(None, 16, 0.9), 14);
    }

    #[test]
    fn test_docking_workers_halves_budget() {
        assert_eq!(docking_workers(16, 0.9), 7);
        assert_eq!(docking_workers(2, 0.9), 1);
    }

    #[test]
    fn test_validate_fraction() {
        assert!(validate_fraction(0.9).is_ok());
        assert!(validate_fraction(1.0).is_ok());
        assert!(validate_fraction(0.0).is_err());
        assert!(validate_fraction(1.5).is_err());
        assert!(validate_fraction(f64::NAN).is_err());
    }
}
