//! Test doubles and fixtures shared by the unit tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use crate::db::memory::MemoryStore;
use crate::images::classifier::ImageClassifier;
use crate::menus::repo_types::{MealTimeScores, Menu, MenuTags, NewMenu, Nutrients};
use crate::recommend::features::{MENU_FEATURE_COLUMNS, USER_FEATURE_COLUMNS};
use crate::recommend::model::{HybridModel, ModelHandle, TrainingConfig};
use crate::state::{fake_config, AppState};
use crate::storage::StorageClient;
use crate::users::dto::RegisterRequest;
use crate::users::repo_types::{Gender, PreferenceTag, User};

/// Object store kept in memory so tests can look at what was written.
#[derive(Default)]
pub struct FakeStorage {
    objects: Mutex<BTreeMap<String, Bytes>>,
}

impl FakeStorage {
    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl StorageClient for FakeStorage {
    async fn put_object(&self, key: &str, body: Bytes, _ct: &str) -> anyhow::Result<()> {
        self.objects.lock().unwrap().insert(key.to_string(), body);
        Ok(())
    }

    async fn copy_object(&self, from: &str, to: &str) -> anyhow::Result<()> {
        let mut objects = self.objects.lock().unwrap();
        let body = objects
            .get(from)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no such key {from}"))?;
        objects.insert(to.to_string(), body);
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn presign_get(&self, key: &str, _seconds: u64) -> anyhow::Result<String> {
        Ok(format!("https://fake.local/{}", key))
    }
}

/// Classifier whose answers the test sets up front.
pub struct ScriptedClassifier {
    food: AtomicBool,
    menu_id: AtomicI64,
    calls: AtomicUsize,
}

impl ScriptedClassifier {
    pub fn new(food: bool, menu_id: i64) -> Self {
        Self {
            food: AtomicBool::new(food),
            menu_id: AtomicI64::new(menu_id),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_food(&self, food: bool) {
        self.food.store(food, Ordering::SeqCst);
    }

    pub fn set_menu(&self, menu_id: i64) {
        self.menu_id.store(menu_id, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageClassifier for ScriptedClassifier {
    async fn is_food(&self, _image: Bytes) -> anyhow::Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.food.load(Ordering::SeqCst))
    }

    async fn recognize_menu(&self, _image: Bytes) -> anyhow::Result<i64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.menu_id.load(Ordering::SeqCst))
    }
}

pub struct Fakes {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub storage: Arc<FakeStorage>,
    pub classifier: Arc<ScriptedClassifier>,
}

pub fn fakes() -> Fakes {
    let storage = Arc::new(FakeStorage::default());
    let classifier = Arc::new(ScriptedClassifier::new(true, 1));
    let model = HybridModel::new(USER_FEATURE_COLUMNS, MENU_FEATURE_COLUMNS, &TrainingConfig::default());
    let store = Arc::new(MemoryStore::new());
    let state = AppState::from_parts(
        store.clone(),
        Arc::new(fake_config()),
        storage.clone(),
        classifier.clone(),
        Arc::new(ModelHandle::new(Arc::new(model))),
    );
    Fakes { state, store, storage, classifier }
}

pub fn fake_storage() -> (AppState, Arc<FakeStorage>) {
    let f = fakes();
    (f.state, f.storage)
}

fn dish(name: &str, nutrients: [f64; 4], meal_times: [f64; 3], tags: MenuTags) -> NewMenu {
    let [calories, protein, fat, carbs] = nutrients;
    let [breakfast, lunch, dinner] = meal_times;
    NewMenu {
        name: name.into(),
        nutrients: Nutrients { calories, protein, fat, carbs },
        meal_times: MealTimeScores { breakfast, lunch, dinner },
        tags,
    }
}

/// Five dishes with distinct tag profiles, returned in id order.
pub async fn seed_catalogue(state: &AppState) -> Vec<Menu> {
    let dishes = [
        dish(
            "Pad Kra Pao",
            [580.0, 25.0, 24.0, 65.0],
            [0.2, 0.9, 0.7],
            MenuTags { spicy: 1, has_chicken: 1, high_sodium: 1, ..Default::default() },
        ),
        dish(
            "Khao Man Gai",
            [600.0, 30.0, 22.0, 70.0],
            [0.3, 0.9, 0.6],
            MenuTags { has_chicken: 1, high_fat: 1, ..Default::default() },
        ),
        dish(
            "Tom Yum Goong",
            [250.0, 20.0, 10.0, 15.0],
            [0.1, 0.6, 0.9],
            MenuTags { spicy: 1, contain_water: 1, is_light: 1, ..Default::default() },
        ),
        dish(
            "Som Tam",
            [150.0, 4.0, 3.0, 25.0],
            [0.2, 0.8, 0.5],
            MenuTags { spicy: 1, has_vegetable: 1, is_light: 1, ..Default::default() },
        ),
        dish(
            "Jok",
            [300.0, 12.0, 6.0, 45.0],
            [0.9, 0.3, 0.2],
            MenuTags { contain_water: 1, has_pork: 1, ..Default::default() },
        ),
    ];
    let mut menus = Vec::with_capacity(dishes.len());
    for d in &dishes {
        menus.push(state.store.create_menu(d).await.unwrap());
    }
    state.features.invalidate();
    menus
}

pub fn register_request(handle: &str) -> RegisterRequest {
    RegisterRequest {
        handle: handle.into(),
        name: format!("user {handle}"),
        birth_date: "1996-04-12".into(),
        gender: Gender::Female,
        height: 162.0,
        weight: 54.0,
        picture_url: None,
        preferences: vec![PreferenceTag::Spicy, PreferenceTag::Soup],
    }
}

pub async fn register(state: &AppState, handle: &str) -> User {
    crate::users::services::register(state, register_request(handle))
        .await
        .unwrap()
}
