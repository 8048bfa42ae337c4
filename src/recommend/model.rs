//! Learned preference model.
//!
//! Scoring only depends on [`PreferenceModel::predict`]. The shipped model is a
//! hybrid factorization: every user feature column and every menu feature
//! column owns a latent vector and a bias, a user (menu) is the
//! feature-weighted sum of those, and the score is their dot product plus the
//! summed biases.

use std::path::Path;
use std::sync::{Arc, RwLock};

use anyhow::Context;
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::features::{DenseMatrix, InteractionMatrix, MENU_FEATURE_COLUMNS, USER_FEATURE_COLUMNS};

pub trait PreferenceModel: Send + Sync {
    /// One raw score per entry of `menu_indices`, in the same order.
    fn predict(
        &self,
        user_index: usize,
        menu_indices: &[usize],
        user_features: &DenseMatrix,
        menu_features: &DenseMatrix,
    ) -> anyhow::Result<Vec<f64>>;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub components: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub regularization: f64,
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            components: 16,
            epochs: 30,
            learning_rate: 0.05,
            regularization: 1e-4,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridModel {
    components: usize,
    user_embeddings: Vec<Vec<f64>>,
    menu_embeddings: Vec<Vec<f64>>,
    user_biases: Vec<f64>,
    menu_biases: Vec<f64>,
}

fn weighted_sum(weights: &[f64], vectors: &[Vec<f64>], biases: &[f64], k: usize) -> (Vec<f64>, f64) {
    let mut out = vec![0.0; k];
    let mut bias = 0.0;
    for (f, &x) in weights.iter().enumerate() {
        if x == 0.0 {
            continue;
        }
        for (o, v) in out.iter_mut().zip(&vectors[f]) {
            *o += x * v;
        }
        bias += x * biases[f];
    }
    (out, bias)
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

impl HybridModel {
    /// Untrained model with small random embeddings.
    pub fn new(user_dim: usize, menu_dim: usize, cfg: &TrainingConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let k = cfg.components;
        let scale = 1.0 / k as f64;
        let mut init = |n: usize| -> Vec<Vec<f64>> {
            (0..n)
                .map(|_| (0..k).map(|_| rng.gen_range(-scale..scale)).collect())
                .collect()
        };
        let user_embeddings = init(user_dim);
        let menu_embeddings = init(menu_dim);
        Self {
            components: k,
            user_embeddings,
            menu_embeddings,
            user_biases: vec![0.0; user_dim],
            menu_biases: vec![0.0; menu_dim],
        }
    }

    pub fn user_dim(&self) -> usize {
        self.user_embeddings.len()
    }

    pub fn menu_dim(&self) -> usize {
        self.menu_embeddings.len()
    }

    fn check_shapes(&self, user_features: &DenseMatrix, menu_features: &DenseMatrix) -> anyhow::Result<()> {
        anyhow::ensure!(
            user_features.cols() == self.user_dim(),
            "model expects {} user feature columns, got {}",
            self.user_dim(),
            user_features.cols()
        );
        anyhow::ensure!(
            menu_features.cols() == self.menu_dim(),
            "model expects {} menu feature columns, got {}",
            self.menu_dim(),
            menu_features.cols()
        );
        Ok(())
    }

    /// Stochastic gradient descent on squared error over the observed ratings,
    /// each rating rescaled from 1..=5 to -1..=1. Returns the last epoch's mean
    /// squared error.
    pub fn fit(
        &mut self,
        interactions: &InteractionMatrix,
        user_features: &DenseMatrix,
        menu_features: &DenseMatrix,
        cfg: &TrainingConfig,
    ) -> anyhow::Result<f64> {
        self.check_shapes(user_features, menu_features)?;
        let (users, menus) = interactions.shape();
        anyhow::ensure!(
            users == user_features.rows() && menus == menu_features.rows(),
            "interaction shape {:?} does not match feature rows ({}, {})",
            interactions.shape(),
            user_features.rows(),
            menu_features.rows()
        );

        let mut samples: Vec<(usize, usize, f64)> = interactions
            .iter()
            .map(|(u, m, r)| (u, m, (r - 3.0) / 2.0))
            .collect();
        if samples.is_empty() {
            warn!("no observed ratings; model left untouched");
            return Ok(0.0);
        }

        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let (lr, reg, k) = (cfg.learning_rate, cfg.regularization, self.components);
        let mut mse = 0.0;

        for _ in 0..cfg.epochs {
            samples.shuffle(&mut rng);
            let mut sq = 0.0;
            for &(u, m, target) in &samples {
                let x = user_features.row(u);
                let y = menu_features.row(m);
                let (pu, bu) = weighted_sum(x, &self.user_embeddings, &self.user_biases, k);
                let (qm, bm) = weighted_sum(y, &self.menu_embeddings, &self.menu_biases, k);
                let err = dot(&pu, &qm) + bu + bm - target;
                sq += err * err;

                for (f, &xf) in x.iter().enumerate() {
                    if xf == 0.0 {
                        continue;
                    }
                    for (w, q) in self.user_embeddings[f].iter_mut().zip(&qm) {
                        *w -= lr * (err * xf * q + reg * *w);
                    }
                    self.user_biases[f] -= lr * err * xf;
                }
                for (g, &yg) in y.iter().enumerate() {
                    if yg == 0.0 {
                        continue;
                    }
                    for (w, p) in self.menu_embeddings[g].iter_mut().zip(&pu) {
                        *w -= lr * (err * yg * p + reg * *w);
                    }
                    self.menu_biases[g] -= lr * err * yg;
                }
            }
            mse = sq / samples.len() as f64;
        }

        info!(samples = samples.len(), epochs = cfg.epochs, mse, "preference model fitted");
        Ok(mse)
    }

    pub async fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read(path)
            .await
            .with_context(|| format!("read model {}", path.display()))?;
        let model: Self = serde_json::from_slice(&raw)
            .with_context(|| format!("decode model {}", path.display()))?;
        model
            .check_consistent()
            .with_context(|| format!("inconsistent model {}", path.display()))?;
        Ok(model)
    }

    /// Every feature needs a bias and a `components`-long embedding.
    fn check_consistent(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.components > 0, "model has no latent components");
        anyhow::ensure!(
            self.user_biases.len() == self.user_embeddings.len(),
            "{} user biases for {} user embeddings",
            self.user_biases.len(),
            self.user_embeddings.len()
        );
        anyhow::ensure!(
            self.menu_biases.len() == self.menu_embeddings.len(),
            "{} menu biases for {} menu embeddings",
            self.menu_biases.len(),
            self.menu_embeddings.len()
        );
        let ragged = self
            .user_embeddings
            .iter()
            .chain(&self.menu_embeddings)
            .find(|v| v.len() != self.components);
        if let Some(v) = ragged {
            anyhow::bail!("embedding of length {} in a {}-component model", v.len(), self.components);
        }
        Ok(())
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("create {}", dir.display()))?;
        }
        let raw = serde_json::to_vec(self).context("encode model")?;
        tokio::fs::write(path, raw)
            .await
            .with_context(|| format!("write model {}", path.display()))?;
        Ok(())
    }
}

impl PreferenceModel for HybridModel {
    fn predict(
        &self,
        user_index: usize,
        menu_indices: &[usize],
        user_features: &DenseMatrix,
        menu_features: &DenseMatrix,
    ) -> anyhow::Result<Vec<f64>> {
        self.check_shapes(user_features, menu_features)?;
        anyhow::ensure!(
            user_index < user_features.rows(),
            "user index {user_index} out of range"
        );
        let k = self.components;
        let (pu, bu) = weighted_sum(
            user_features.row(user_index),
            &self.user_embeddings,
            &self.user_biases,
            k,
        );
        menu_indices
            .iter()
            .map(|&m| {
                anyhow::ensure!(m < menu_features.rows(), "menu index {m} out of range");
                let (qm, bm) =
                    weighted_sum(menu_features.row(m), &self.menu_embeddings, &self.menu_biases, k);
                Ok(dot(&pu, &qm) + bu + bm)
            })
            .collect()
    }
}

/// Shared slot for the live model; retraining swaps the whole model at once.
pub struct ModelHandle {
    current: RwLock<Arc<dyn PreferenceModel>>,
}

impl ModelHandle {
    pub fn new(model: Arc<dyn PreferenceModel>) -> Self {
        Self {
            current: RwLock::new(model),
        }
    }

    /// Load the persisted model, or start from an untrained one.
    pub async fn load_or_untrained(path: &str) -> Self {
        let model = match HybridModel::load(path).await {
            Ok(m) if m.user_dim() == USER_FEATURE_COLUMNS && m.menu_dim() == MENU_FEATURE_COLUMNS => {
                info!(path, "preference model loaded");
                m
            }
            Ok(_) => {
                warn!(path, "persisted model has stale dimensions; starting untrained");
                Self::untrained()
            }
            Err(e) => {
                warn!(error = %e, path, "no usable persisted model; starting untrained");
                Self::untrained()
            }
        };
        Self::new(Arc::new(model))
    }

    fn untrained() -> HybridModel {
        HybridModel::new(USER_FEATURE_COLUMNS, MENU_FEATURE_COLUMNS, &TrainingConfig::default())
    }

    pub fn current(&self) -> Arc<dyn PreferenceModel> {
        self.current
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn replace(&self, model: Arc<dyn PreferenceModel>) {
        *self.current.write().unwrap_or_else(|p| p.into_inner()) = model;
    }
}

#[cfg(test)]
mod model_tests {
    use super::*;

    fn toy() -> (InteractionMatrix, DenseMatrix, DenseMatrix) {
        // one user who loves spicy food and dislikes the plain dish
        let users = DenseMatrix::from_rows(2, vec![vec![1.0, 0.0]]).unwrap();
        let menus = DenseMatrix::from_rows(2, vec![vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
        let mut inter = InteractionMatrix::new(1, 2);
        inter.insert(0, 0, 5.0);
        inter.insert(0, 1, 1.0);
        (inter, users, menus)
    }

    #[test]
    fn fit_learns_observed_preference() {
        let (inter, users, menus) = toy();
        let cfg = TrainingConfig { epochs: 200, ..Default::default() };
        let mut model = HybridModel::new(2, 2, &cfg);
        let mse = model.fit(&inter, &users, &menus, &cfg).unwrap();
        assert!(mse < 0.05, "mse {mse}");

        let scores = model.predict(0, &[0, 1], &users, &menus).unwrap();
        assert!(scores[0] > scores[1]);
    }

    #[test]
    fn predict_rejects_wrong_shapes() {
        let (_, users, menus) = toy();
        let model = HybridModel::new(3, 2, &TrainingConfig::default());
        assert!(model.predict(0, &[0], &users, &menus).is_err());

        let model = HybridModel::new(2, 2, &TrainingConfig::default());
        assert!(model.predict(5, &[0], &users, &menus).is_err());
        assert!(model.predict(0, &[9], &users, &menus).is_err());
    }

    #[test]
    fn same_seed_same_model() {
        let cfg = TrainingConfig::default();
        let a = HybridModel::new(4, 4, &cfg);
        let b = HybridModel::new(4, 4, &cfg);
        assert_eq!(a.user_embeddings, b.user_embeddings);
    }

    #[tokio::test]
    async fn save_and_load_keep_predictions() {
        let (_, users, menus) = toy();
        let model = HybridModel::new(2, 2, &TrainingConfig::default());
        let path = std::env::temp_dir().join(format!("eatwise-model-{}.json", uuid::Uuid::new_v4()));
        model.save(&path).await.unwrap();
        let loaded = HybridModel::load(&path).await.unwrap();
        let _ = std::fs::remove_file(&path);

        let before = model.predict(0, &[0, 1], &users, &menus).unwrap();
        let after = loaded.predict(0, &[0, 1], &users, &menus).unwrap();
        for (a, b) in before.iter().zip(&after) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[tokio::test]
    async fn missing_file_starts_untrained() {
        let handle = ModelHandle::load_or_untrained("/nonexistent/eatwise/model.json").await;
        let users = DenseMatrix::zeros(1, USER_FEATURE_COLUMNS);
        let menus = DenseMatrix::zeros(3, MENU_FEATURE_COLUMNS);
        let scores = handle.current().predict(0, &[0, 1, 2], &users, &menus).unwrap();
        assert_eq!(scores.len(), 3);
    }

    #[tokio::test]
    async fn mismatched_persisted_lengths_start_untrained() {
        let model = HybridModel::new(USER_FEATURE_COLUMNS, MENU_FEATURE_COLUMNS, &TrainingConfig::default());
        let users = DenseMatrix::zeros(1, USER_FEATURE_COLUMNS);
        let menus = DenseMatrix::zeros(2, MENU_FEATURE_COLUMNS);

        let mut short_biases = serde_json::to_value(&model).unwrap();
        short_biases["user_biases"].as_array_mut().unwrap().truncate(3);
        let mut ragged = serde_json::to_value(&model).unwrap();
        ragged["menu_embeddings"][0].as_array_mut().unwrap().pop();

        for broken in [short_biases, ragged] {
            let path = std::env::temp_dir().join(format!("eatwise-model-{}.json", uuid::Uuid::new_v4()));
            std::fs::write(&path, serde_json::to_vec(&broken).unwrap()).unwrap();
            assert!(HybridModel::load(&path).await.is_err());

            let handle = ModelHandle::load_or_untrained(&path.to_string_lossy()).await;
            let _ = std::fs::remove_file(&path);
            let scores = handle.current().predict(0, &[0, 1], &users, &menus).unwrap();
            assert_eq!(scores.len(), 2);
        }
    }
}
