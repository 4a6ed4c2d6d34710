//! Generation workflow: request assembly, job execution, gallery intake
//!
//! `StudioService` is the seam between the CLI and the core: it merges
//! stored defaults, the active character profile and an optional prompt
//! template into a wire request, drives the job through the client while
//! mirroring its lifecycle into the local queue, and lands completed images
//! in the gallery and on disk.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use flux_studio_protocol::{
    DetailerParams, EditParams, GenerateParams, JobRequest, JobResult,
};

use crate::client::{JobClient, JobProgress, JobTransport, PollOptions};
use crate::error::{Result, StudioError};
use crate::gallery::GalleryService;
use crate::queue::QueueService;
use crate::store::{GeneratedImage, StudioStore};

/// Engine-side default denoise for the face detailer pass.
const DEFAULT_FACE_DETAILER_DENOISE: f64 = 0.42;

/// Engine-side default downscale factor before detailing.
const DEFAULT_SCALE_BY: f64 = 0.5;

/// Queue labels are prompts truncated for display.
const LABEL_MAX_CHARS: usize = 48;

/// CLI-facing parameters for a `generate` job. `None` fields fall back to
/// the stored defaults; image fields are paths read and encoded here.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub steps: Option<u32>,
    pub seed: Option<i64>,
    pub template: Option<String>,
    pub reference_image: Option<PathBuf>,
    pub pose_image: Option<PathBuf>,
    pub depth_image: Option<PathBuf>,
    pub canny_image: Option<PathBuf>,
    pub controlnet_strength: Option<f64>,
    pub upscale: bool,
    pub detail_daemon: bool,
    pub lora_url: Option<String>,
    pub lora_name: Option<String>,
    /// Skip merging the active character profile.
    pub no_character: bool,
}

/// CLI-facing parameters for an `edit` job.
#[derive(Debug, Clone, Default)]
pub struct EditOptions {
    pub prompt: String,
    pub input_image: PathBuf,
    pub denoise: Option<f64>,
    pub steps: Option<u32>,
    pub seed: Option<i64>,
    pub upscale: bool,
    pub no_character: bool,
}

/// CLI-facing parameters for a `detailer` job.
#[derive(Debug, Clone, Default)]
pub struct DetailerOptions {
    pub input_image: PathBuf,
    pub denoise: Option<f64>,
    pub scale_by: Option<f64>,
    pub seed: Option<i64>,
}

/// What one finished job produced.
#[derive(Debug)]
pub struct JobOutcome {
    pub remote_id: String,
    /// Seed the engine actually used.
    pub seed: i64,
    pub gallery_ids: Vec<Uuid>,
    /// Files written to the output dir; export failures are logged, not fatal.
    pub files: Vec<PathBuf>,
}

/// Outcome of a sequential batch; jobs fail independently.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub completed: Vec<JobOutcome>,
    pub failures: Vec<(usize, StudioError)>,
}

pub struct StudioService<T: JobTransport> {
    store: Arc<StudioStore>,
    gallery: GalleryService,
    queue: QueueService,
    client: JobClient<T>,
    options: PollOptions,
}

impl<T: JobTransport> StudioService<T> {
    pub fn new(store: Arc<StudioStore>, client: JobClient<T>, options: PollOptions) -> Self {
        Self {
            gallery: GalleryService::new(store.clone()),
            queue: QueueService::new(store.clone()),
            store,
            client,
            options,
        }
    }

    pub fn client(&self) -> &JobClient<T> {
        &self.client
    }

    // ------------------------------------------------------------------
    // Request assembly
    // ------------------------------------------------------------------

    /// Merge stored defaults, template and character profile into a
    /// generate request. Explicit options always win over stored values.
    pub fn build_generate_request(&self, opts: &GenerateOptions) -> Result<JobRequest> {
        let defaults = self.store.settings.snapshot().defaults;

        let (prompt, negative_prompt) = self.resolve_prompt(
            &opts.prompt,
            opts.negative_prompt.clone(),
            opts.template.as_deref(),
        )?;

        let mut params = GenerateParams {
            prompt,
            negative_prompt,
            width: Some(opts.width.unwrap_or(defaults.width)),
            height: Some(opts.height.unwrap_or(defaults.height)),
            steps: Some(opts.steps.unwrap_or(defaults.steps)),
            seed: Some(opts.seed.unwrap_or(defaults.seed)),
            controlnet_strength: opts.controlnet_strength,
            upscale: opts.upscale.then_some(true),
            detail_daemon: opts.detail_daemon.then_some(true),
            lora_url: opts.lora_url.clone(),
            lora_name: opts.lora_name.clone(),
            ..Default::default()
        };

        if let Some(path) = &opts.reference_image {
            params.reference_image = Some(encode_image(path)?);
        }
        if let Some(path) = &opts.pose_image {
            params.pose_image = Some(encode_image(path)?);
        }
        if let Some(path) = &opts.depth_image {
            params.depth_image = Some(encode_image(path)?);
        }
        if let Some(path) = &opts.canny_image {
            params.canny_image = Some(encode_image(path)?);
        }

        if !opts.no_character {
            if let Some(profile) = self.store.character.snapshot().profile {
                params.face_lora = profile.face_lora;
                params.face_lora_strength = profile.face_lora_strength;
                params.face_mode = profile.face_mode;
                if params.reference_image.is_none() {
                    params.reference_image = profile.reference_image;
                }
            }
        }

        Ok(JobRequest::Generate(params))
    }

    pub fn build_edit_request(&self, opts: &EditOptions) -> Result<JobRequest> {
        let defaults = self.store.settings.snapshot().defaults;

        let mut params = EditParams {
            prompt: opts.prompt.clone(),
            input_image: Some(encode_image(&opts.input_image)?),
            denoise: Some(opts.denoise.unwrap_or(defaults.denoise)),
            steps: Some(opts.steps.unwrap_or(defaults.steps)),
            seed: Some(opts.seed.unwrap_or(defaults.seed)),
            upscale: opts.upscale.then_some(true),
            ..Default::default()
        };

        if !opts.no_character {
            if let Some(profile) = self.store.character.snapshot().profile {
                params.face_lora = profile.face_lora;
                params.face_lora_strength = profile.face_lora_strength;
            }
        }

        Ok(JobRequest::Edit(params))
    }

    pub fn build_detailer_request(&self, opts: &DetailerOptions) -> Result<JobRequest> {
        let defaults = self.store.settings.snapshot().defaults;

        Ok(JobRequest::Detailer(DetailerParams {
            input_image: Some(encode_image(&opts.input_image)?),
            face_detailer_denoise: Some(opts.denoise.unwrap_or(DEFAULT_FACE_DETAILER_DENOISE)),
            scale_by: Some(opts.scale_by.unwrap_or(DEFAULT_SCALE_BY)),
            seed: Some(opts.seed.unwrap_or(defaults.seed)),
        }))
    }

    fn resolve_prompt(
        &self,
        prompt: &str,
        negative: Option<String>,
        template: Option<&str>,
    ) -> Result<(String, Option<String>)> {
        let Some(name) = template else {
            return Ok((prompt.to_string(), negative));
        };

        let template = self
            .store
            .template(name)
            .ok_or_else(|| StudioError::not_found(format!("template {}", name)))?;

        let prompt = if prompt.is_empty() {
            template.prompt
        } else {
            format!("{}, {}", template.prompt, prompt)
        };
        Ok((prompt, negative.or(template.negative_prompt)))
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    /// Run one job to completion, mirroring it into the local queue and
    /// landing results in the gallery and `output_dir`.
    ///
    /// `sync` uses the blocking `/runsync` round trip; otherwise the job is
    /// polled asynchronously and `on_progress` observes each phase.
    pub async fn run_job(
        &self,
        request: JobRequest,
        sync: bool,
        output_dir: &Path,
        mut on_progress: impl FnMut(JobProgress),
    ) -> Result<JobOutcome> {
        let label = request
            .prompt()
            .filter(|p| !p.is_empty())
            .map(truncate_label)
            .unwrap_or_else(|| request.kind().as_str().to_string());
        let local_id = self.queue.track(request.kind(), label);

        let run = async {
            let result = if sync {
                self.queue.mark_running(local_id, None);
                on_progress(JobProgress::Queued);
                let result = self.client.submit_sync(&request).await?;
                on_progress(JobProgress::Completed);
                result
            } else {
                let mut running = false;
                self.client
                    .submit_and_wait(&request, self.options, |progress| {
                        if !running {
                            self.queue.mark_running(local_id, None);
                            running = true;
                        }
                        on_progress(progress);
                    })
                    .await?
            };
            self.intake(&request, result, output_dir)
        };

        match run.await {
            Ok(outcome) => {
                self.queue
                    .mark_completed(local_id, Some(&outcome.remote_id));
                Ok(outcome)
            }
            Err(err) => {
                self.queue.mark_failed(local_id, err.to_string());
                Err(err)
            }
        }
    }

    /// Record a completed result: one gallery entry per returned image,
    /// plus decoded JPEG files in `output_dir`.
    fn intake(
        &self,
        request: &JobRequest,
        result: JobResult,
        output_dir: &Path,
    ) -> Result<JobOutcome> {
        let images = result.images();
        if images.is_empty() {
            let message = result
                .error_message()
                .unwrap_or("job completed without images")
                .to_string();
            return Err(StudioError::job_failed(message));
        }

        let seed = result
            .seed()
            .or_else(|| request.seed())
            .unwrap_or(flux_studio_protocol::RANDOM_SEED);

        let mut records = Vec::with_capacity(images.len());
        for image in images {
            let record = GeneratedImage::from_job(request, image.clone(), seed);
            self.gallery.add(record.clone());
            records.push(record);
        }

        let report = self.gallery.export(&records, output_dir)?;
        for failure in &report.failures {
            tracing::warn!(id = %failure.id, reason = failure.reason, "image kept in gallery but not written to disk");
        }

        Ok(JobOutcome {
            remote_id: result.id,
            seed,
            gallery_ids: records.iter().map(|r| r.id).collect(),
            files: report.written,
        })
    }

    /// Run `count` generate jobs strictly one after another.
    ///
    /// Jobs fail independently; a failed job is recorded and the batch moves
    /// on. There is no mid-flight cancellation of the remainder.
    pub async fn batch(
        &self,
        opts: &GenerateOptions,
        count: usize,
        output_dir: &Path,
        mut on_progress: impl FnMut(usize, JobProgress),
    ) -> Result<BatchReport> {
        let request = self.build_generate_request(opts)?;

        let mut report = BatchReport::default();
        for index in 0..count {
            match self
                .run_job(request.clone(), false, output_dir, |p| {
                    on_progress(index, p)
                })
                .await
            {
                Ok(outcome) => report.completed.push(outcome),
                Err(err) => {
                    tracing::warn!(index, %err, "batch job failed");
                    report.failures.push((index, err));
                }
            }
        }
        Ok(report)
    }
}

fn truncate_label(prompt: &str) -> String {
    if prompt.chars().count() <= LABEL_MAX_CHARS {
        prompt.to_string()
    } else {
        let head: String = prompt.chars().take(LABEL_MAX_CHARS).collect();
        format!("{}…", head.trim_end())
    }
}

/// Read a local image and base64-encode it for the wire.
pub fn encode_image(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(StudioError::file_not_found(path.display().to_string()));
    }
    let bytes =
        fs::read(path).map_err(|err| StudioError::io_from_error(path.display().to_string(), err))?;
    Ok(BASE64.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CharacterProfile, LocalJobState, PromptTemplate, SettingsPatch};
    use crate::tests::mocks::MockTransport;
    use crate::tests::utils::test_helpers::*;
    use flux_studio_protocol::{JobOutput, JobStatus};
    use std::time::Duration;

    fn fast_options() -> PollOptions {
        PollOptions {
            poll_interval: Duration::from_millis(1),
            max_wait: Duration::from_millis(250),
        }
    }

    fn service(transport: MockTransport) -> StudioService<MockTransport> {
        StudioService::new(
            Arc::new(StudioStore::in_memory()),
            JobClient::new(transport),
            fast_options(),
        )
    }

    fn one_image_output(seed: i64) -> JobOutput {
        JobOutput {
            images: Some(vec![TINY_IMAGE_B64.to_string()]),
            seed: Some(seed),
            ..Default::default()
        }
    }

    #[test]
    fn generate_request_applies_stored_defaults() {
        let svc = service(MockTransport::never_terminal());
        svc.store.update_settings(SettingsPatch {
            steps: Some(12),
            width: Some(768),
            ..Default::default()
        });

        let request = svc
            .build_generate_request(&GenerateOptions {
                prompt: "sunset".to_string(),
                height: Some(512),
                ..Default::default()
            })
            .unwrap();

        let JobRequest::Generate(params) = request else {
            panic!("expected generate variant");
        };
        assert_eq!(params.steps, Some(12));
        assert_eq!(params.width, Some(768));
        assert_eq!(params.height, Some(512));
        assert_eq!(params.seed, Some(flux_studio_protocol::RANDOM_SEED));
        assert_eq!(params.upscale, None);
    }

    #[test]
    fn generate_request_merges_character_and_template() {
        let svc = service(MockTransport::never_terminal());
        svc.store.set_character(CharacterProfile {
            name: "ava".to_string(),
            face_lora: Some("ava.safetensors".to_string()),
            face_lora_strength: Some(0.8),
            face_mode: Some("pulid".to_string()),
            reference_image: Some(TINY_IMAGE_B64.to_string()),
            ..Default::default()
        });
        svc.store.add_template(PromptTemplate {
            name: "portrait".to_string(),
            prompt: "studio portrait".to_string(),
            negative_prompt: Some("blurry".to_string()),
        });

        let request = svc
            .build_generate_request(&GenerateOptions {
                prompt: "red dress".to_string(),
                template: Some("portrait".to_string()),
                ..Default::default()
            })
            .unwrap();

        let JobRequest::Generate(params) = request else {
            panic!("expected generate variant");
        };
        assert_eq!(params.prompt, "studio portrait, red dress");
        assert_eq!(params.negative_prompt.as_deref(), Some("blurry"));
        assert_eq!(params.face_lora.as_deref(), Some("ava.safetensors"));
        assert_eq!(params.face_mode.as_deref(), Some("pulid"));
        assert_eq!(params.reference_image.as_deref(), Some(TINY_IMAGE_B64));
    }

    #[test]
    fn no_character_flag_skips_profile() {
        let svc = service(MockTransport::never_terminal());
        svc.store.set_character(CharacterProfile {
            name: "ava".to_string(),
            face_lora: Some("ava.safetensors".to_string()),
            ..Default::default()
        });

        let request = svc
            .build_generate_request(&GenerateOptions {
                prompt: "landscape".to_string(),
                no_character: true,
                ..Default::default()
            })
            .unwrap();

        let JobRequest::Generate(params) = request else {
            panic!("expected generate variant");
        };
        assert_eq!(params.face_lora, None);
    }

    #[test]
    fn unknown_template_is_not_found() {
        let svc = service(MockTransport::never_terminal());
        let err = svc
            .build_generate_request(&GenerateOptions {
                prompt: "x".to_string(),
                template: Some("missing".to_string()),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, StudioError::NotFound { .. }));
    }

    #[test]
    fn edit_and_detailer_requests_carry_encoded_input_image() {
        let svc = service(MockTransport::never_terminal());
        let dir = create_temp_dir();
        let input = dir.path().join("input.jpg");
        std::fs::write(&input, b"jpeg-bytes").unwrap();

        let request = svc
            .build_edit_request(&EditOptions {
                prompt: "retouch".to_string(),
                input_image: input.clone(),
                ..Default::default()
            })
            .unwrap();
        let JobRequest::Edit(params) = request else {
            panic!("expected edit variant");
        };
        let encoded = encode_image(&input).unwrap();
        assert_eq!(params.input_image.as_deref(), Some(encoded.as_str()));

        let request = svc
            .build_detailer_request(&DetailerOptions {
                input_image: input.clone(),
                ..Default::default()
            })
            .unwrap();
        let JobRequest::Detailer(params) = request else {
            panic!("expected detailer variant");
        };
        assert_eq!(params.input_image.as_deref(), Some(encoded.as_str()));
    }

    #[test]
    fn missing_input_image_is_file_not_found() {
        let svc = service(MockTransport::never_terminal());
        let err = svc
            .build_edit_request(&EditOptions {
                prompt: "retouch".to_string(),
                input_image: PathBuf::from("/nonexistent/input.jpg"),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, StudioError::Io { .. }));
    }

    #[tokio::test]
    async fn run_job_lands_images_in_gallery_queue_and_disk() {
        let transport = MockTransport::completing_after(vec![
            JobStatus::InQueue,
            JobStatus::InProgress,
            JobStatus::Completed,
        ])
        .with_output(one_image_output(1234));
        let svc = service(transport);
        let request = svc
            .build_generate_request(&GenerateOptions {
                prompt: "sunset".to_string(),
                seed: Some(flux_studio_protocol::RANDOM_SEED),
                ..Default::default()
            })
            .unwrap();

        let dir = create_temp_dir();
        let outcome = svc
            .run_job(request, false, dir.path(), |_| {})
            .await
            .unwrap();

        // engine-reported seed wins over the requested sentinel
        assert_eq!(outcome.seed, 1234);
        assert_eq!(outcome.gallery_ids.len(), 1);
        assert_eq!(outcome.files.len(), 1);
        assert!(outcome.files[0].exists());

        let gallery = svc.store.gallery.snapshot();
        assert_eq!(gallery.images.len(), 1);
        assert_eq!(gallery.images[0].seed, 1234);

        let jobs = svc.store.queue.snapshot().jobs;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].state, LocalJobState::Completed);
        assert_eq!(jobs[0].remote_id.as_deref(), Some("job-1"));
        assert_eq!(jobs[0].label, "sunset");
    }

    #[tokio::test]
    async fn failed_job_marks_queue_and_leaves_gallery_alone() {
        let transport = MockTransport::completing_after(vec![JobStatus::Failed])
            .with_failure_message("worker exception");
        let svc = service(transport);
        let request = svc
            .build_generate_request(&GenerateOptions {
                prompt: "doomed".to_string(),
                ..Default::default()
            })
            .unwrap();

        let dir = create_temp_dir();
        let err = svc
            .run_job(request, false, dir.path(), |_| {})
            .await
            .unwrap_err();

        assert!(matches!(err, StudioError::JobFailed { .. }));
        assert!(svc.store.gallery.snapshot().images.is_empty());
        let jobs = svc.store.queue.snapshot().jobs;
        assert_eq!(jobs[0].state, LocalJobState::Failed);
        assert_eq!(jobs[0].error.as_deref(), Some(err.to_string()).as_deref());
    }

    #[tokio::test]
    async fn completed_without_images_is_an_error() {
        let transport = MockTransport::completing_after(vec![JobStatus::Completed]);
        let svc = service(transport);
        let request = svc
            .build_generate_request(&GenerateOptions {
                prompt: "empty".to_string(),
                ..Default::default()
            })
            .unwrap();

        let dir = create_temp_dir();
        let err = svc
            .run_job(request, false, dir.path(), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, StudioError::JobFailed { .. }));
    }

    #[tokio::test]
    async fn sync_run_uses_single_round_trip() {
        let transport = MockTransport::completing_after(vec![JobStatus::Completed])
            .with_output(one_image_output(5));
        let svc = service(transport);
        let request = svc
            .build_generate_request(&GenerateOptions {
                prompt: "quick".to_string(),
                ..Default::default()
            })
            .unwrap();

        let dir = create_temp_dir();
        let outcome = svc.run_job(request, true, dir.path(), |_| {}).await.unwrap();

        assert_eq!(outcome.remote_id, "job-sync");
        assert_eq!(svc.client().transport().poll_count(), 0);
    }

    #[tokio::test]
    async fn batch_runs_sequentially_and_collects_outcomes() {
        let transport = MockTransport::completing_after(vec![JobStatus::Completed])
            .with_output(one_image_output(9));
        let svc = service(transport);

        let dir = create_temp_dir();
        let report = svc
            .batch(
                &GenerateOptions {
                    prompt: "series".to_string(),
                    ..Default::default()
                },
                3,
                dir.path(),
                |_, _| {},
            )
            .await
            .unwrap();

        assert_eq!(report.completed.len(), 3);
        assert!(report.failures.is_empty());
        assert_eq!(svc.store.gallery.snapshot().images.len(), 3);
        // one poll per job, never interleaved
        assert_eq!(svc.client().transport().poll_count(), 3);
    }
}
