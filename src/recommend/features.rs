//! Feature assembly: users, menus and order history → the three aligned
//! structures the preference model and scorer consume.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::db::Store;
use crate::menus::repo_types::{Menu, MenuTags};
use crate::orders::repo_types::Order;
use crate::users::repo_types::{PreferenceTag, User};

/// age, height, weight, gender one-hot (2), preference counts (10)
pub const USER_FEATURE_COLUMNS: usize = 3 + 2 + PreferenceTag::ALL.len();
pub const MENU_FEATURE_COLUMNS: usize = MenuTags::LEN;

/// Row-major dense matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl DenseMatrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn from_rows(cols: usize, rows: Vec<Vec<f64>>) -> anyhow::Result<Self> {
        let mut m = Self::zeros(rows.len(), cols);
        for (i, row) in rows.into_iter().enumerate() {
            anyhow::ensure!(row.len() == cols, "row {i} has {} columns, expected {cols}", row.len());
            m.data[i * cols..(i + 1) * cols].copy_from_slice(&row);
        }
        Ok(m)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    fn row_mut(&mut self, i: usize) -> &mut [f64] {
        &mut self.data[i * self.cols..(i + 1) * self.cols]
    }
}

/// Sparse user × menu matrix of mean ratings. Shape always covers the whole
/// population; absent pairs are zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InteractionMatrix {
    num_users: usize,
    num_menus: usize,
    entries: BTreeMap<(usize, usize), f64>,
}

impl InteractionMatrix {
    pub fn new(num_users: usize, num_menus: usize) -> Self {
        Self {
            num_users,
            num_menus,
            entries: BTreeMap::new(),
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.num_users, self.num_menus)
    }

    pub fn insert(&mut self, user: usize, menu: usize, value: f64) {
        debug_assert!(user < self.num_users && menu < self.num_menus);
        self.entries.insert((user, menu), value);
    }

    /// Observed (user, menu, value) triples in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.entries.iter().map(|(&(u, m), &v)| (u, m, v))
    }

    pub fn nnz(&self) -> usize {
        self.entries.len()
    }
}

/// Min-max scaler fit on one column. A zero range keeps a divisor of 1, so the
/// column collapses to `x - min` instead of dividing by zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinMaxScaler {
    min: f64,
    scale: f64,
}

impl MinMaxScaler {
    pub fn fit(values: &[f64]) -> Self {
        let (min, max) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
        if values.is_empty() {
            return Self { min: 0.0, scale: 1.0 };
        }
        let range = max - min;
        Self {
            min,
            scale: if range > 0.0 { range } else { 1.0 },
        }
    }

    pub fn transform(&self, v: f64) -> f64 {
        (v - self.min) / self.scale
    }
}

#[derive(Debug, Clone)]
pub struct AssembledFeatures {
    pub user_features: DenseMatrix,
    pub menu_features: DenseMatrix,
    pub interactions: InteractionMatrix,
    /// user id → row
    pub user_index: HashMap<i64, usize>,
    /// menu id → column
    pub menu_index: HashMap<i64, usize>,
    /// Catalogue in column order.
    pub menus: Vec<Menu>,
}

/// Build all three structures from one consistent snapshot. `users` and `menus`
/// must already be in id order.
pub fn assemble(
    users: &[User],
    tags: &[(i64, PreferenceTag)],
    menus: Vec<Menu>,
    orders: &[Order],
    current_year: i32,
) -> AssembledFeatures {
    let user_index: HashMap<i64, usize> =
        users.iter().enumerate().map(|(i, u)| (u.id, i)).collect();
    let menu_index: HashMap<i64, usize> =
        menus.iter().enumerate().map(|(i, m)| (m.id, i)).collect();

    let ages: Vec<f64> = users
        .iter()
        .map(|u| (current_year - u.birth_date.year()) as f64)
        .collect();
    let heights: Vec<f64> = users.iter().map(|u| u.height).collect();
    let weights: Vec<f64> = users.iter().map(|u| u.weight).collect();
    let (age_sc, height_sc, weight_sc) = (
        MinMaxScaler::fit(&ages),
        MinMaxScaler::fit(&heights),
        MinMaxScaler::fit(&weights),
    );

    let mut user_features = DenseMatrix::zeros(users.len(), USER_FEATURE_COLUMNS);
    for (i, u) in users.iter().enumerate() {
        let row = user_features.row_mut(i);
        row[0] = age_sc.transform(ages[i]);
        row[1] = height_sc.transform(u.height);
        row[2] = weight_sc.transform(u.weight);
        row[3..5].copy_from_slice(&u.gender.one_hot());
    }
    for (user_id, tag) in tags {
        match user_index.get(user_id) {
            Some(&i) => user_features.row_mut(i)[5 + tag.column()] += 1.0,
            None => warn!(user_id, tag = tag.as_str(), "preference tag for unknown user"),
        }
    }

    let mut menu_features = DenseMatrix::zeros(menus.len(), MENU_FEATURE_COLUMNS);
    for (j, m) in menus.iter().enumerate() {
        menu_features.row_mut(j).copy_from_slice(&m.tags.to_vector());
    }

    let mut sums: BTreeMap<(usize, usize), (f64, u32)> = BTreeMap::new();
    for o in orders {
        let Some(rating) = o.rating else { continue };
        match (user_index.get(&o.user_id), menu_index.get(&o.menu_id)) {
            (Some(&u), Some(&m)) => {
                let e = sums.entry((u, m)).or_insert((0.0, 0));
                e.0 += rating as f64;
                e.1 += 1;
            }
            _ => warn!(order_id = o.id, "order references unknown user or menu; skipped"),
        }
    }
    let mut interactions = InteractionMatrix::new(users.len(), menus.len());
    for ((u, m), (sum, n)) in sums {
        interactions.insert(u, m, sum / n as f64);
    }

    debug!(
        users = users.len(),
        menus = menus.len(),
        interactions = interactions.nnz(),
        "features assembled"
    );

    AssembledFeatures {
        user_features,
        menu_features,
        interactions,
        user_index,
        menu_index,
        menus,
    }
}

struct CachedFeatures {
    version: u64,
    year: i32,
    features: Arc<AssembledFeatures>,
}

/// Assembled features memoized against a population version. Every write to
/// users, tags, menus or orders must call [`FeatureCache::invalidate`].
#[derive(Default)]
pub struct FeatureCache {
    version: AtomicU64,
    slot: Mutex<Option<CachedFeatures>>,
}

impl FeatureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidate(&self) {
        self.version.fetch_add(1, Ordering::SeqCst);
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    pub async fn get_or_assemble(
        &self,
        store: &dyn Store,
        current_year: i32,
    ) -> anyhow::Result<Arc<AssembledFeatures>> {
        let mut slot = self.slot.lock().await;
        // Read the version before the snapshot: a write racing the reads
        // leaves a stale version behind and forces the next call to rebuild.
        let version = self.version();
        if let Some(cached) = slot.as_ref() {
            if cached.version == version && cached.year == current_year {
                return Ok(cached.features.clone());
            }
        }

        let (users, tags, menus, orders) = tokio::try_join!(
            store.list_users(),
            store.list_user_tags(),
            store.list_menus(),
            store.list_orders(),
        )?;
        let features = Arc::new(assemble(&users, &tags, menus, &orders, current_year));
        *slot = Some(CachedFeatures {
            version,
            year: current_year,
            features: features.clone(),
        });
        Ok(features)
    }
}
