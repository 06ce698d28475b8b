use edgeplay_core::{Task, WorkloadConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Draws client tasks with uniformly random compute and storage costs.
pub struct TaskGenerator {
    rng: StdRng,
    config: WorkloadConfig,
}

impl TaskGenerator {
    pub fn new(config: WorkloadConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng, config }
    }

    pub fn next_task(&mut self) -> Task {
        let c = &self.config;
        let time = draw(&mut self.rng, c.min_time_ms, c.max_time_ms);
        let storage = draw(&mut self.rng, c.min_storage_mb, c.max_storage_mb);
        Task::new(time, storage)
    }
}

fn draw(rng: &mut StdRng, a: u64, b: u64) -> u64 {
    rng.gen_range(a.min(b)..=a.max(b))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn tasks_stay_within_bounds() {
        let mut generator = TaskGenerator::new(WorkloadConfig::default(), Some(1));
        for _ in 0..500 {
            let task = generator.next_task();
            assert!(task.compute_cost >= Duration::from_millis(50));
            assert!(task.compute_cost <= Duration::from_millis(150));
            assert!((10..=50).contains(&task.storage_cost));
        }
    }

    #[test]
    fn seeded_generators_agree() {
        let mut a = TaskGenerator::new(WorkloadConfig::default(), Some(5));
        let mut b = TaskGenerator::new(WorkloadConfig::default(), Some(5));
        for _ in 0..20 {
            assert_eq!(a.next_task(), b.next_task());
        }
    }

    #[test]
    fn degenerate_range_is_constant() {
        let config = WorkloadConfig {
            min_time_ms: 7,
            max_time_ms: 7,
            min_storage_mb: 0,
            max_storage_mb: 0,
        };
        let task = TaskGenerator::new(config, None).next_task();
        assert_eq!(task.compute_cost, Duration::from_millis(7));
        assert!(task.is_compute_only());
    }
}
