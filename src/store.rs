//! Persisted application state
//!
//! State is split into named slices, each serialized to its own JSON file
//! under the data dir and restored at startup. Mutators are synchronous and
//! total: they never fail, and persistence is fire-and-forget — a storage
//! write failure is logged and the in-memory state stays authoritative for
//! the session. Subscribers receive the new snapshot after every mutation.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use flux_studio_protocol::{JobKind, JobRequest};

// ============================================================================
// Generic slice container
// ============================================================================

/// Handle returned by [`Slice::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

type Subscriber<T> = Box<dyn Fn(&T) + Send + Sync>;

/// One independently-persisted region of application state.
///
/// Every mutation clones a fresh snapshot for persistence and notification;
/// snapshots handed out earlier are never touched by later mutations.
pub struct Slice<T> {
    name: &'static str,
    path: Option<PathBuf>,
    state: Mutex<T>,
    subscribers: Mutex<Vec<(u64, Subscriber<T>)>>,
    next_subscriber: AtomicU64,
}

impl<T> Slice<T>
where
    T: Clone + Default + Serialize + DeserializeOwned,
{
    /// Restore the slice from `<dir>/<name>.json`, or start from default.
    ///
    /// A file that fails to parse resets the slice to its default value; no
    /// schema version is tracked and old data is never migrated in place.
    pub fn load(name: &'static str, dir: &Path) -> Self {
        let path = dir.join(format!("{}.json", name));
        let state = match fs::read_to_string(&path) {
            Ok(content) if !content.trim().is_empty() => match serde_json::from_str(&content) {
                Ok(value) => value,
                Err(err) => {
                    tracing::warn!(slice = name, %err, "state file unreadable, resetting slice");
                    T::default()
                }
            },
            _ => T::default(),
        };

        Self {
            name,
            path: Some(path),
            state: Mutex::new(state),
            subscribers: Mutex::new(Vec::new()),
            next_subscriber: AtomicU64::new(0),
        }
    }

    /// Session-only slice that is never written to disk.
    pub fn in_memory(name: &'static str) -> Self {
        Self {
            name,
            path: None,
            state: Mutex::new(T::default()),
            subscribers: Mutex::new(Vec::new()),
            next_subscriber: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> T {
        self.state.lock().unwrap().clone()
    }

    /// Apply a mutation, persist the result, notify subscribers.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let (result, snapshot) = {
            let mut state = self.state.lock().unwrap();
            let result = f(&mut state);
            (result, state.clone())
        };
        self.persist(&snapshot);
        self.notify(&snapshot);
        result
    }

    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> SubscriptionId {
        let id = self.next_subscriber.fetch_add(1, Ordering::SeqCst);
        self.subscribers
            .lock()
            .unwrap()
            .push((id, Box::new(callback)));
        SubscriptionId(id)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers
            .lock()
            .unwrap()
            .retain(|(sub_id, _)| *sub_id != id.0);
    }

    fn persist(&self, snapshot: &T) {
        let Some(path) = &self.path else {
            return;
        };

        let write = || -> crate::error::Result<()> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let content = serde_json::to_string_pretty(snapshot)?;
            fs::write(path, content)?;
            Ok(())
        };

        if let Err(err) = write() {
            tracing::warn!(slice = self.name, %err, "failed to persist slice");
        }
    }

    fn notify(&self, snapshot: &T) {
        for (_, callback) in self.subscribers.lock().unwrap().iter() {
            callback(snapshot);
        }
    }
}

// ============================================================================
// Settings slice
// ============================================================================

/// Default generation parameters applied when a request leaves them unset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationDefaults {
    #[serde(default = "default_dimension")]
    pub width: u32,
    #[serde(default = "default_dimension")]
    pub height: u32,
    #[serde(default = "default_steps")]
    pub steps: u32,
    /// `-1` lets the engine pick a random seed.
    #[serde(default = "default_seed")]
    pub seed: i64,
    #[serde(default = "default_denoise")]
    pub denoise: f64,
}

fn default_dimension() -> u32 {
    1024
}

fn default_steps() -> u32 {
    28
}

fn default_seed() -> i64 {
    flux_studio_protocol::RANDOM_SEED
}

fn default_denoise() -> f64 {
    0.6
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            width: default_dimension(),
            height: default_dimension(),
            steps: default_steps(),
            seed: default_seed(),
            denoise: default_denoise(),
        }
    }
}

/// Connection credentials and generation defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StudioSettings {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub endpoint_id: String,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default)]
    pub defaults: GenerationDefaults,
}

fn default_locale() -> String {
    "en".to_string()
}

impl Default for StudioSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint_id: String::new(),
            locale: default_locale(),
            defaults: GenerationDefaults::default(),
        }
    }
}

impl StudioSettings {
    /// Derived, never stored: both credential fields are non-empty.
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty() && !self.endpoint_id.is_empty()
    }
}

/// Partial settings update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct SettingsPatch {
    pub api_key: Option<String>,
    pub endpoint_id: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub steps: Option<u32>,
    pub seed: Option<i64>,
    pub denoise: Option<f64>,
}

// ============================================================================
// Gallery slice
// ============================================================================

/// A generated asset kept in the local gallery.
///
/// Created when a completed job yields at least one image; mutated only by
/// the favorite toggle; destroyed by explicit delete or bulk clear.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratedImage {
    pub id: Uuid,
    /// Base64 JPEG payload as returned by the engine.
    pub image: String,
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    pub kind: JobKind,
    /// Full parameter object the job ran with.
    pub request: JobRequest,
    /// Seed the engine actually used; differs from a requested `-1`.
    pub seed: i64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub favorite: bool,
}

impl GeneratedImage {
    pub fn from_job(request: &JobRequest, image: String, seed: i64) -> Self {
        let negative_prompt = match request {
            JobRequest::Generate(p) => p.negative_prompt.clone(),
            _ => None,
        };
        Self {
            id: Uuid::new_v4(),
            image,
            prompt: request.prompt().unwrap_or_default().to_string(),
            negative_prompt,
            kind: request.kind(),
            request: request.clone(),
            seed,
            created_at: Utc::now(),
            favorite: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GalleryState {
    #[serde(default)]
    pub images: Vec<GeneratedImage>,
}

// ============================================================================
// Character slice
// ============================================================================

/// Face identity profile merged into generate/edit requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CharacterProfile {
    pub name: String,
    #[serde(default)]
    pub persona: Option<String>,
    #[serde(default)]
    pub face_lora: Option<String>,
    #[serde(default)]
    pub face_lora_strength: Option<f64>,
    /// "pulid" or "ip_adapter".
    #[serde(default)]
    pub face_mode: Option<String>,
    /// Base64 reference image for PuLID / IP-Adapter.
    #[serde(default)]
    pub reference_image: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CharacterState {
    #[serde(default)]
    pub profile: Option<CharacterProfile>,
}

// ============================================================================
// Template and collection slices
// ============================================================================

/// Reusable prompt preset, addressed by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PromptTemplate {
    pub name: String,
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TemplateState {
    #[serde(default)]
    pub templates: Vec<PromptTemplate>,
}

/// Named set of gallery image ids.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Collection {
    pub name: String,
    #[serde(default)]
    pub image_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CollectionState {
    #[serde(default)]
    pub collections: Vec<Collection>,
}

// ============================================================================
// Queue slice (session-only)
// ============================================================================

/// Local job display state, a client-side shadow of the remote lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalJobState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl LocalJobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocalJobState::Pending => "pending",
            LocalJobState::Running => "running",
            LocalJobState::Completed => "completed",
            LocalJobState::Failed => "failed",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, LocalJobState::Completed | LocalJobState::Failed)
    }
}

/// Session-local tracking record. Decoupled from the remote handle
/// lifecycle; not guaranteed to match remote state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueJob {
    pub id: Uuid,
    pub kind: JobKind,
    pub label: String,
    pub state: LocalJobState,
    #[serde(default)]
    pub remote_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl QueueJob {
    pub fn new(kind: JobKind, label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            label: label.into(),
            state: LocalJobState::Pending,
            remote_id: None,
            error: None,
            created_at: Utc::now(),
        }
    }
}

/// Partial queue-job update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct QueueJobPatch {
    pub state: Option<LocalJobState>,
    pub remote_id: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueueState {
    #[serde(default)]
    pub jobs: Vec<QueueJob>,
}

// ============================================================================
// Store
// ============================================================================

/// All application state slices.
///
/// The queue slice is in-memory by design: job tracking is only meaningful
/// for the current session.
pub struct StudioStore {
    pub settings: Slice<StudioSettings>,
    pub gallery: Slice<GalleryState>,
    pub character: Slice<CharacterState>,
    pub templates: Slice<TemplateState>,
    pub collections: Slice<CollectionState>,
    pub queue: Slice<QueueState>,
}

impl StudioStore {
    /// Open the store under `<data_dir>/state`, restoring persisted slices.
    pub fn open(data_dir: &Path) -> Self {
        let dir = data_dir.join("state");
        Self {
            settings: Slice::load("settings", &dir),
            gallery: Slice::load("gallery", &dir),
            character: Slice::load("character", &dir),
            templates: Slice::load("templates", &dir),
            collections: Slice::load("collections", &dir),
            queue: Slice::in_memory("queue"),
        }
    }

    /// Fully in-memory store for tests.
    pub fn in_memory() -> Self {
        Self {
            settings: Slice::in_memory("settings"),
            gallery: Slice::in_memory("gallery"),
            character: Slice::in_memory("character"),
            templates: Slice::in_memory("templates"),
            collections: Slice::in_memory("collections"),
            queue: Slice::in_memory("queue"),
        }
    }

    // --- settings ---

    pub fn update_settings(&self, patch: SettingsPatch) {
        self.settings.mutate(|settings| {
            if let Some(api_key) = patch.api_key {
                settings.api_key = api_key;
            }
            if let Some(endpoint_id) = patch.endpoint_id {
                settings.endpoint_id = endpoint_id;
            }
            if let Some(width) = patch.width {
                settings.defaults.width = width;
            }
            if let Some(height) = patch.height {
                settings.defaults.height = height;
            }
            if let Some(steps) = patch.steps {
                settings.defaults.steps = steps;
            }
            if let Some(seed) = patch.seed {
                settings.defaults.seed = seed;
            }
            if let Some(denoise) = patch.denoise {
                settings.defaults.denoise = denoise;
            }
        });
    }

    pub fn set_locale(&self, locale: impl Into<String>) {
        let locale = locale.into();
        self.settings.mutate(|settings| settings.locale = locale);
    }

    pub fn reset_settings(&self) {
        self.settings.mutate(|settings| *settings = StudioSettings::default());
    }

    // --- gallery ---

    /// Prepend: newest first.
    pub fn gallery_add(&self, image: GeneratedImage) {
        self.gallery.mutate(|gallery| gallery.images.insert(0, image));
    }

    pub fn gallery_remove(&self, id: Uuid) -> bool {
        self.gallery.mutate(|gallery| {
            let before = gallery.images.len();
            gallery.images.retain(|img| img.id != id);
            gallery.images.len() != before
        })
    }

    /// Returns the new favorite flag, or `None` when the id is unknown.
    pub fn gallery_toggle_favorite(&self, id: Uuid) -> Option<bool> {
        self.gallery.mutate(|gallery| {
            gallery.images.iter_mut().find(|img| img.id == id).map(|img| {
                img.favorite = !img.favorite;
                img.favorite
            })
        })
    }

    pub fn gallery_clear(&self) {
        self.gallery.mutate(|gallery| gallery.images.clear());
    }

    // --- character ---

    pub fn set_character(&self, profile: CharacterProfile) {
        self.character
            .mutate(|character| character.profile = Some(profile));
    }

    pub fn clear_character(&self) {
        self.character.mutate(|character| character.profile = None);
    }

    // --- templates ---

    /// Add or replace a template by name.
    pub fn add_template(&self, template: PromptTemplate) {
        self.templates.mutate(|state| {
            state.templates.retain(|t| t.name != template.name);
            state.templates.push(template);
        });
    }

    pub fn remove_template(&self, name: &str) -> bool {
        self.templates.mutate(|state| {
            let before = state.templates.len();
            state.templates.retain(|t| t.name != name);
            state.templates.len() != before
        })
    }

    pub fn template(&self, name: &str) -> Option<PromptTemplate> {
        self.templates
            .snapshot()
            .templates
            .into_iter()
            .find(|t| t.name == name)
    }

    // --- collections ---

    pub fn collection_create(&self, name: impl Into<String>) {
        let name = name.into();
        self.collections.mutate(|state| {
            if !state.collections.iter().any(|c| c.name == name) {
                state.collections.push(Collection {
                    name,
                    image_ids: Vec::new(),
                });
            }
        });
    }

    /// Append ids to a collection, skipping ones it already holds.
    /// Returns how many were actually appended.
    pub fn collection_add_images(&self, name: &str, ids: &[Uuid]) -> usize {
        self.collections.mutate(|state| {
            match state.collections.iter_mut().find(|c| c.name == name) {
                Some(collection) => {
                    let mut added = 0;
                    for id in ids {
                        if !collection.image_ids.contains(id) {
                            collection.image_ids.push(*id);
                            added += 1;
                        }
                    }
                    added
                }
                None => 0,
            }
        })
    }

    pub fn collection_remove(&self, name: &str) -> bool {
        self.collections.mutate(|state| {
            let before = state.collections.len();
            state.collections.retain(|c| c.name != name);
            state.collections.len() != before
        })
    }

    // --- queue ---

    pub fn queue_add(&self, job: QueueJob) -> Uuid {
        let id = job.id;
        self.queue.mutate(|queue| queue.jobs.push(job));
        id
    }

    pub fn queue_update(&self, id: Uuid, patch: QueueJobPatch) {
        self.queue.mutate(|queue| {
            if let Some(job) = queue.jobs.iter_mut().find(|job| job.id == id) {
                if let Some(state) = patch.state {
                    job.state = state;
                }
                if let Some(remote_id) = patch.remote_id {
                    job.remote_id = Some(remote_id);
                }
                if let Some(error) = patch.error {
                    job.error = Some(error);
                }
            }
        });
    }

    pub fn queue_remove(&self, id: Uuid) -> bool {
        self.queue.mutate(|queue| {
            let before = queue.jobs.len();
            queue.jobs.retain(|job| job.id != id);
            queue.jobs.len() != before
        })
    }

    pub fn queue_clear_completed(&self) {
        self.queue
            .mutate(|queue| queue.jobs.retain(|job| !job.state.is_finished()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::utils::test_helpers::*;
    use flux_studio_protocol::GenerateParams;
    use proptest::prelude::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn image(prompt: &str) -> GeneratedImage {
        GeneratedImage::from_job(
            &JobRequest::Generate(GenerateParams {
                prompt: prompt.to_string(),
                ..Default::default()
            }),
            TINY_IMAGE_B64.to_string(),
            42,
        )
    }

    #[test]
    fn gallery_add_prepends_newest_first() {
        let store = StudioStore::in_memory();
        let a = image("a");
        let b = image("b");
        let c = image("c");
        let (id_a, id_b, id_c) = (a.id, b.id, c.id);

        store.gallery_add(a);
        store.gallery_add(b);
        store.gallery_add(c);

        let ids: Vec<Uuid> = store
            .gallery
            .snapshot()
            .images
            .iter()
            .map(|img| img.id)
            .collect();
        assert_eq!(ids, vec![id_c, id_b, id_a]);
    }

    #[test]
    fn toggle_favorite_is_idempotent_under_double_application() {
        let store = StudioStore::in_memory();
        let target = image("target");
        let other = image("other");
        let (target_id, other_id) = (target.id, other.id);
        store.gallery_add(target);
        store.gallery_add(other);

        assert_eq!(store.gallery_toggle_favorite(target_id), Some(true));
        assert_eq!(store.gallery_toggle_favorite(target_id), Some(false));

        let gallery = store.gallery.snapshot();
        assert!(gallery.images.iter().all(|img| !img.favorite));
        // only the targeted id was ever touched
        assert!(!gallery
            .images
            .iter()
            .find(|img| img.id == other_id)
            .unwrap()
            .favorite);
    }

    #[test]
    fn toggle_favorite_unknown_id_is_none() {
        let store = StudioStore::in_memory();
        assert_eq!(store.gallery_toggle_favorite(Uuid::new_v4()), None);
    }

    #[test]
    fn is_configured_requires_both_credentials() {
        let mut settings = StudioSettings::default();
        assert!(!settings.is_configured());

        settings.api_key = "rp_key".to_string();
        assert!(!settings.is_configured());

        settings.endpoint_id = "ep-1".to_string();
        assert!(settings.is_configured());

        settings.api_key.clear();
        assert!(!settings.is_configured());
    }

    #[test]
    fn subscribers_observe_each_mutation() {
        let store = StudioStore::in_memory();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in_cb = seen.clone();
        let id = store.gallery.subscribe(move |gallery| {
            seen_in_cb.store(gallery.images.len(), Ordering::SeqCst);
        });

        store.gallery_add(image("one"));
        store.gallery_add(image("two"));
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        store.gallery.unsubscribe(id);
        store.gallery_add(image("three"));
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn slices_round_trip_across_restart() {
        let dir = create_temp_dir();
        let data_dir = dir.path();

        let store = StudioStore::open(data_dir);
        store.update_settings(SettingsPatch {
            api_key: Some("rp_key".to_string()),
            endpoint_id: Some("ep-1".to_string()),
            steps: Some(20),
            ..Default::default()
        });
        store.set_locale("de");
        store.gallery_add(image("kept"));
        store.set_character(CharacterProfile {
            name: "ava".to_string(),
            face_lora: Some("ava-rank64.safetensors".to_string()),
            face_lora_strength: Some(0.85),
            ..Default::default()
        });
        store.add_template(PromptTemplate {
            name: "portrait".to_string(),
            prompt: "studio portrait".to_string(),
            negative_prompt: None,
        });
        store.collection_create("best-of");

        let settings = store.settings.snapshot();
        let gallery = store.gallery.snapshot();
        let character = store.character.snapshot();
        let templates = store.templates.snapshot();
        let collections = store.collections.snapshot();
        drop(store);

        // simulated restart: every slice restores deep-equal
        let reopened = StudioStore::open(data_dir);
        assert_eq!(reopened.settings.snapshot(), settings);
        assert_eq!(reopened.gallery.snapshot(), gallery);
        assert_eq!(reopened.character.snapshot(), character);
        assert_eq!(reopened.templates.snapshot(), templates);
        assert_eq!(reopened.collections.snapshot(), collections);
    }

    #[test]
    fn queue_is_session_only() {
        let dir = create_temp_dir();
        let store = StudioStore::open(dir.path());
        store.queue_add(QueueJob::new(JobKind::Generate, "portrait"));
        drop(store);

        assert!(!dir.path().join("state/queue.json").exists());
        let reopened = StudioStore::open(dir.path());
        assert!(reopened.queue.snapshot().jobs.is_empty());
    }

    #[test]
    fn unparseable_state_file_resets_to_default() {
        let dir = create_temp_dir();
        let state_dir = dir.path().join("state");
        std::fs::create_dir_all(&state_dir).unwrap();
        std::fs::write(state_dir.join("settings.json"), "{not json").unwrap();

        let store = StudioStore::open(dir.path());
        assert_eq!(store.settings.snapshot(), StudioSettings::default());
    }

    #[test]
    fn queue_lifecycle_updates_and_clear_completed() {
        let store = StudioStore::in_memory();
        let running = store.queue_add(QueueJob::new(JobKind::Generate, "a"));
        let done = store.queue_add(QueueJob::new(JobKind::Edit, "b"));

        store.queue_update(
            running,
            QueueJobPatch {
                state: Some(LocalJobState::Running),
                remote_id: Some("job-9".to_string()),
                ..Default::default()
            },
        );
        store.queue_update(
            done,
            QueueJobPatch {
                state: Some(LocalJobState::Completed),
                ..Default::default()
            },
        );

        store.queue_clear_completed();
        let jobs = store.queue.snapshot().jobs;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, running);
        assert_eq!(jobs[0].remote_id.as_deref(), Some("job-9"));
    }

    proptest! {
        #[test]
        fn double_toggle_is_identity(count in 1usize..8, target in 0usize..8) {
            let store = StudioStore::in_memory();
            let mut ids = Vec::new();
            for i in 0..count {
                let img = image(&format!("p{}", i));
                ids.push(img.id);
                store.gallery_add(img);
            }
            let before = store.gallery.snapshot();

            let target = ids[target % ids.len()];
            store.gallery_toggle_favorite(target);
            store.gallery_toggle_favorite(target);

            prop_assert_eq!(store.gallery.snapshot(), before);
        }
    }
}
