//! Gallery operations over the persisted image slice
//!
//! Filtering and search run on snapshots; bulk operations apply per item
//! with no atomicity, so a failure mid-way leaves earlier items done.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use flux_studio_protocol::JobKind;

use crate::error::{Result, StudioError};
use crate::store::{Collection, GeneratedImage, StudioStore};

/// Snapshot-side filter for gallery listings.
#[derive(Debug, Clone, Default)]
pub struct GalleryFilter {
    pub kind: Option<JobKind>,
    pub favorites_only: bool,
    /// Case-insensitive substring over prompt and negative prompt.
    pub search: Option<String>,
}

impl GalleryFilter {
    fn matches(&self, image: &GeneratedImage) -> bool {
        if let Some(kind) = self.kind {
            if image.kind != kind {
                return false;
            }
        }
        if self.favorites_only && !image.favorite {
            return false;
        }
        if let Some(needle) = &self.search {
            let needle = needle.to_lowercase();
            let in_prompt = image.prompt.to_lowercase().contains(&needle);
            let in_negative = image
                .negative_prompt
                .as_deref()
                .is_some_and(|n| n.to_lowercase().contains(&needle));
            if !in_prompt && !in_negative {
                return false;
            }
        }
        true
    }
}

/// One item that could not be exported; the rest of the batch still ran.
#[derive(Debug)]
pub struct ExportFailure {
    pub id: Uuid,
    pub reason: String,
}

/// Outcome of a bulk export.
#[derive(Debug, Default)]
pub struct ExportReport {
    pub written: Vec<PathBuf>,
    pub failures: Vec<ExportFailure>,
}

/// Read-side queries and bulk operations over the gallery slice.
pub struct GalleryService {
    store: Arc<StudioStore>,
}

impl GalleryService {
    pub fn new(store: Arc<StudioStore>) -> Self {
        Self { store }
    }

    /// Images matching the filter, newest first (slice order).
    pub fn list(&self, filter: &GalleryFilter) -> Vec<GeneratedImage> {
        self.store
            .gallery
            .snapshot()
            .images
            .into_iter()
            .filter(|image| filter.matches(image))
            .collect()
    }

    pub fn get(&self, id: Uuid) -> Result<GeneratedImage> {
        self.store
            .gallery
            .snapshot()
            .images
            .into_iter()
            .find(|image| image.id == id)
            .ok_or_else(|| StudioError::not_found(format!("gallery image {}", id)))
    }

    pub fn add(&self, image: GeneratedImage) {
        self.store.gallery_add(image);
    }

    pub fn remove(&self, id: Uuid) -> Result<()> {
        if self.store.gallery_remove(id) {
            Ok(())
        } else {
            Err(StudioError::not_found(format!("gallery image {}", id)))
        }
    }

    /// Remove several images; returns how many actually existed.
    pub fn remove_many(&self, ids: &[Uuid]) -> usize {
        ids.iter().filter(|id| self.store.gallery_remove(**id)).count()
    }

    pub fn toggle_favorite(&self, id: Uuid) -> Result<bool> {
        self.store
            .gallery_toggle_favorite(id)
            .ok_or_else(|| StudioError::not_found(format!("gallery image {}", id)))
    }

    pub fn clear(&self) {
        self.store.gallery_clear();
    }

    /// Decode and write each image to `<dir>/<id>.jpg`.
    ///
    /// Items fail independently; a bad payload or write error is recorded
    /// and the export moves on.
    pub fn export(&self, images: &[GeneratedImage], dir: &Path) -> Result<ExportReport> {
        fs::create_dir_all(dir)
            .map_err(|err| StudioError::io_from_error(dir.display().to_string(), err))?;

        let mut report = ExportReport::default();
        for image in images {
            let path = dir.join(format!("{}.jpg", image.id));
            let outcome = BASE64
                .decode(&image.image)
                .map_err(|err| format!("invalid base64 payload: {}", err))
                .and_then(|bytes| {
                    fs::write(&path, bytes).map_err(|err| format!("write failed: {}", err))
                });
            match outcome {
                Ok(()) => report.written.push(path),
                Err(reason) => {
                    tracing::warn!(id = %image.id, reason, "export item failed");
                    report.failures.push(ExportFailure {
                        id: image.id,
                        reason,
                    });
                }
            }
        }
        Ok(report)
    }

    // --- collections ---

    pub fn collections(&self) -> Vec<Collection> {
        self.store.collections.snapshot().collections
    }

    /// Put images into a named collection, creating it on first use.
    ///
    /// Unknown and already-collected ids are skipped; the returned count is
    /// how many images were actually added.
    pub fn collect(&self, name: &str, ids: &[Uuid]) -> Result<usize> {
        let known: Vec<Uuid> = {
            let gallery = self.store.gallery.snapshot();
            ids.iter()
                .copied()
                .filter(|id| gallery.images.iter().any(|img| img.id == *id))
                .collect()
        };
        if known.is_empty() {
            return Err(StudioError::invalid_input(
                "none of the given ids exist in the gallery",
            ));
        }

        self.store.collection_create(name);
        Ok(self.store.collection_add_images(name, &known))
    }

    pub fn remove_collection(&self, name: &str) -> Result<()> {
        if self.store.collection_remove(name) {
            Ok(())
        } else {
            Err(StudioError::not_found(format!("collection {}", name)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::GalleryState;
    use crate::tests::utils::test_helpers::*;
    use flux_studio_protocol::{GenerateParams, JobRequest};

    fn service() -> GalleryService {
        GalleryService::new(Arc::new(StudioStore::in_memory()))
    }

    fn image(prompt: &str, negative: Option<&str>) -> GeneratedImage {
        let mut img = GeneratedImage::from_job(
            &JobRequest::Generate(GenerateParams {
                prompt: prompt.to_string(),
                negative_prompt: negative.map(str::to_string),
                ..Default::default()
            }),
            TINY_IMAGE_B64.to_string(),
            7,
        );
        img.negative_prompt = negative.map(str::to_string);
        img
    }

    #[test]
    fn search_is_case_insensitive_over_both_prompts() {
        let svc = service();
        svc.add(image("Golden hour PORTRAIT", None));
        svc.add(image("city street", Some("blurry Portrait")));
        svc.add(image("landscape", None));

        let hits = svc.list(&GalleryFilter {
            search: Some("portrait".to_string()),
            ..Default::default()
        });
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn filter_combines_kind_and_favorites() {
        let svc = service();
        let fav = image("keep me", None);
        let fav_id = fav.id;
        svc.add(fav);
        svc.add(image("not favorite", None));
        svc.toggle_favorite(fav_id).unwrap();

        let hits = svc.list(&GalleryFilter {
            kind: Some(JobKind::Generate),
            favorites_only: true,
            search: None,
        });
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, fav_id);
    }

    #[test]
    fn remove_unknown_id_is_not_found() {
        let svc = service();
        let err = svc.remove(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, StudioError::NotFound { .. }));
    }

    #[test]
    fn export_writes_good_items_and_records_bad_ones() {
        let svc = service();
        let good = image("fine", None);
        let mut bad = image("broken", None);
        bad.image = "!!not-base64!!".to_string();

        let dir = create_temp_dir();
        let report = svc.export(&[good.clone(), bad.clone()], dir.path()).unwrap();

        assert_eq!(report.written.len(), 1);
        assert!(report.written[0].exists());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].id, bad.id);
    }

    #[test]
    fn collect_creates_collection_and_skips_unknown_ids() {
        let svc = service();
        let img = image("collected", None);
        let id = img.id;
        svc.add(img);

        // unknown ids are skipped and never counted as added
        let added = svc.collect("best", &[id, Uuid::new_v4()]).unwrap();
        assert_eq!(added, 1);
        let collections = svc.collections();
        assert_eq!(collections.len(), 1);
        assert_eq!(collections[0].image_ids, vec![id]);

        // re-collecting an already-collected id adds nothing
        assert_eq!(svc.collect("best", &[id]).unwrap(), 0);

        // only unknown ids is an input error
        let err = svc.collect("best", &[Uuid::new_v4()]).unwrap_err();
        assert!(matches!(err, StudioError::InvalidInput { .. }));
    }

    #[test]
    fn clear_empties_the_slice() {
        let svc = service();
        svc.add(image("a", None));
        svc.add(image("b", None));
        svc.clear();
        assert_eq!(
            svc.store.gallery.snapshot(),
            GalleryState::default()
        );
    }
}
