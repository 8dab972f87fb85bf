use std::path::Path;

use cvd_forest::config::TrainConfig;
use cvd_forest::project::ProjectPaths;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

pub const HEADER: [&str; 6] = ["age", "sbp", "bmi", "smoker", "noise", "cvd_any"];

/// Seeded synthetic cohort. The `positive_rate` share of rows with the
/// highest latent risk are labelled 1, so class counts are exact.
pub struct Cohort {
    pub rows: Vec<[f32; 5]>,
    pub labels: Vec<i64>,
}

impl Cohort {
    pub fn generate(n: usize, positive_rate: f64, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut rows = Vec::with_capacity(n);
        let mut risk = Vec::with_capacity(n);
        for _ in 0..n {
            let age: f32 = rng.random_range(30.0..80.0);
            let sbp: f32 = rng.random_range(100.0..180.0);
            let bmi: f32 = rng.random_range(18.0..40.0);
            let smoker = f32::from(u8::from(rng.random_bool(0.25)));
            let noise: f32 = rng.random_range(0.0..1.0);
            let jitter: f32 = rng.random_range(-0.5..0.5);
            risk.push((age - 55.0) / 14.4 + (sbp - 140.0) / 23.0 + smoker + jitter);
            rows.push([age, sbp, bmi, smoker, noise]);
        }
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| risk[b].total_cmp(&risk[a]));
        let positives = (n as f64 * positive_rate).round() as usize;
        let mut labels = vec![0i64; n];
        for &idx in order.iter().take(positives) {
            labels[idx] = 1;
        }
        Self { rows, labels }
    }

    /// Shuffle labels so they carry no signal.
    pub fn permute_labels(&mut self, seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed);
        self.labels.shuffle(&mut rng);
    }

    /// Write the cohort as CSV. Every 37th row has a missing `smoker` value.
    pub fn write_csv(&self, path: &Path, header: &[&str]) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create data dir");
        }
        let mut writer = csv::Writer::from_path(path).expect("create csv");
        writer.write_record(header).expect("write header");
        for (idx, (row, label)) in self.rows.iter().zip(&self.labels).enumerate() {
            let mut record: Vec<String> = row.iter().map(|v| format!("{v:.3}")).collect();
            if idx % 37 == 5 {
                record[3] = "NA".to_string();
            }
            record.push(label.to_string());
            writer.write_record(&record).expect("write row");
        }
        writer.flush().expect("flush csv");
    }
}

/// Temporary project root with `data/ess_model_ready.csv` in place.
pub fn project_with_cohort(cohort: &Cohort) -> (TempDir, ProjectPaths) {
    let dir = tempfile::tempdir().expect("tempdir");
    let paths = ProjectPaths::new(dir.path());
    cohort.write_csv(&dir.path().join("data/ess_model_ready.csv"), &HEADER);
    (dir, paths)
}

/// Default config with a small forest, resolved against `paths`.
pub fn quick_config(paths: &ProjectPaths, n_trees: usize) -> TrainConfig {
    let mut config = TrainConfig::default();
    config.forest.n_trees = n_trees;
    config.resolved(paths)
}
