//! Job-queue client for the remote serverless inference endpoint
//!
//! The endpoint is an opaque HTTP job queue: submit, poll, cancel. The
//! engine offers no push notification, so `submit_and_wait` polls at a fixed
//! interval until a terminal status or the local deadline.

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::{Duration, Instant};

use flux_studio_protocol::{HealthStatus, JobRequest, JobResult, JobStatus, SubmitResponse};

use crate::config::ClientConfig;
use crate::error::{Result, StudioError};

/// Opaque identifier assigned by the engine on submit.
///
/// Valid from a successful submit until a terminal status is observed or the
/// client gives up on the job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Progress notifications emitted by [`JobClient::submit_and_wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobProgress {
    /// Submit acknowledged, job queued remotely.
    Queued,
    /// Poll observed `IN_QUEUE`.
    InQueue,
    /// Poll observed `IN_PROGRESS`.
    InProgress,
    /// Terminal success observed.
    Completed,
}

impl JobProgress {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobProgress::Queued => "queued",
            JobProgress::InQueue => "waiting in queue",
            JobProgress::InProgress => "generating",
            JobProgress::Completed => "completed",
        }
    }
}

/// Per-call polling bounds for [`JobClient::submit_and_wait`].
#[derive(Debug, Clone, Copy)]
pub struct PollOptions {
    pub poll_interval: Duration,
    pub max_wait: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(crate::config::DEFAULT_POLL_INTERVAL_MS),
            max_wait: Duration::from_millis(crate::config::DEFAULT_MAX_WAIT_MS),
        }
    }
}

impl PollOptions {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_wait: Duration::from_millis(config.max_wait_ms),
        }
    }
}

/// Transport seam over the five endpoint operations.
///
/// `HttpTransport` is the production implementation; tests substitute a
/// scripted mock (see `tests::mocks`).
#[allow(async_fn_in_trait)]
pub trait JobTransport {
    /// `POST /runsync` — the engine itself waits for completion.
    async fn run_sync(&self, request: &JobRequest) -> Result<JobResult>;
    /// `POST /run` — async submit acknowledgement.
    async fn run(&self, request: &JobRequest) -> Result<SubmitResponse>;
    /// `GET /status/{id}` — single status check.
    async fn status(&self, id: &str) -> Result<JobResult>;
    /// `POST /cancel/{id}` — best-effort cancellation.
    async fn cancel(&self, id: &str) -> Result<()>;
    /// `GET /health` — queue depth and worker counts.
    async fn health(&self) -> Result<HealthStatus>;
}

/// HTTP transport over reqwest with bearer-token auth.
#[derive(Debug)]
pub struct HttpTransport {
    client: Client,
    config: ClientConfig,
}

impl HttpTransport {
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let mut builder = Client::builder().timeout(Duration::from_secs(config.timeout));
        if !config.use_proxy {
            builder = builder.no_proxy();
        }
        let client = builder.build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send a prepared request; non-2xx becomes an `Api` error carrying the
    /// status code and raw body text.
    async fn execute_raw(&self, request: RequestBuilder) -> Result<String> {
        let response = request
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(StudioError::api(status.as_u16(), body));
        }
        Ok(body)
    }

    async fn execute<R: DeserializeOwned>(&self, request: RequestBuilder) -> Result<R> {
        let body = self.execute_raw(request).await?;
        serde_json::from_str(&body)
            .map_err(|e| StudioError::invalid_response(format!("{}: {}", e, body)))
    }
}

impl JobTransport for HttpTransport {
    async fn run_sync(&self, request: &JobRequest) -> Result<JobResult> {
        // Sync jobs block server-side for their full duration; the regular
        // per-request timeout would cut them off.
        let request = self
            .client
            .post(self.config.endpoint_url("runsync"))
            .timeout(Duration::from_millis(self.config.max_wait_ms))
            .json(&json!({ "input": request }));
        self.execute(request).await
    }

    async fn run(&self, request: &JobRequest) -> Result<SubmitResponse> {
        let request = self
            .client
            .post(self.config.endpoint_url("run"))
            .json(&json!({ "input": request }));
        self.execute(request).await
    }

    async fn status(&self, id: &str) -> Result<JobResult> {
        let request = self
            .client
            .get(self.config.endpoint_url(&format!("status/{}", id)));
        self.execute(request).await
    }

    async fn cancel(&self, id: &str) -> Result<()> {
        let request = self
            .client
            .post(self.config.endpoint_url(&format!("cancel/{}", id)));
        self.execute_raw(request).await?;
        Ok(())
    }

    async fn health(&self) -> Result<HealthStatus> {
        let request = self.client.get(self.config.endpoint_url("health"));
        self.execute(request).await
    }
}

/// Client for one endpoint / credential pair.
///
/// Holds no state between calls; construct one per credential pair and pass
/// it down.
#[derive(Debug)]
pub struct JobClient<T = HttpTransport> {
    transport: T,
}

impl JobClient<HttpTransport> {
    /// Build a client over HTTP from a validated configuration.
    pub fn connect(config: ClientConfig) -> Result<Self> {
        Ok(Self::new(HttpTransport::new(config)?))
    }
}

impl<T: JobTransport> JobClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Single blocking round trip; the engine waits for completion.
    pub async fn submit_sync(&self, request: &JobRequest) -> Result<JobResult> {
        self.transport.run_sync(request).await
    }

    /// Non-blocking submit. A response without a job id is fatal and
    /// non-retryable for this call.
    pub async fn submit(&self, request: &JobRequest) -> Result<JobHandle> {
        let response = self.transport.run(request).await?;
        match response.job_id() {
            Some(id) => {
                tracing::debug!(job_id = id, "job submitted");
                Ok(JobHandle(id.to_string()))
            }
            None => Err(StudioError::no_job_id()),
        }
    }

    /// Single status check.
    pub async fn poll(&self, handle: &JobHandle) -> Result<JobResult> {
        self.transport.status(handle.as_str()).await
    }

    /// Best-effort cancel. Errors propagate to direct callers; only the
    /// timeout path of [`submit_and_wait`](Self::submit_and_wait) swallows
    /// them.
    pub async fn cancel(&self, handle: &JobHandle) -> Result<()> {
        self.transport.cancel(handle.as_str()).await
    }

    /// Connectivity diagnostic; never consulted for scheduling.
    pub async fn health(&self) -> Result<HealthStatus> {
        self.transport.health().await
    }

    /// Submit a job and poll it to completion within a bounded wait.
    ///
    /// Polls strictly sequentially, suspending only between polls. On local
    /// timeout a single remote cancel is attempted so queued work is not
    /// leaked; its failure never masks the timeout error. All other errors
    /// propagate unmodified.
    pub async fn submit_and_wait(
        &self,
        request: &JobRequest,
        options: PollOptions,
        mut on_progress: impl FnMut(JobProgress),
    ) -> Result<JobResult> {
        let handle = self.submit(request).await?;
        on_progress(JobProgress::Queued);

        let started = Instant::now();
        while started.elapsed() < options.max_wait {
            tokio::time::sleep(options.poll_interval).await;

            let result = self.poll(&handle).await?;
            match result.status {
                JobStatus::Completed => {
                    on_progress(JobProgress::Completed);
                    return Ok(result);
                }
                JobStatus::Failed => {
                    let message = result
                        .error_message()
                        .unwrap_or("Job failed without an error message")
                        .to_string();
                    return Err(StudioError::job_failed(message));
                }
                JobStatus::Cancelled => {
                    return Err(StudioError::job_cancelled(handle.as_str()));
                }
                JobStatus::InQueue => on_progress(JobProgress::InQueue),
                JobStatus::InProgress => on_progress(JobProgress::InProgress),
            }
        }

        if let Err(err) = self.cancel(&handle).await {
            tracing::debug!(job_id = handle.as_str(), %err, "cancel after timeout failed");
        }
        Err(StudioError::job_timeout(options.max_wait.as_secs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::mocks::MockTransport;
    use flux_studio_protocol::JobOutput;

    fn generate_request() -> JobRequest {
        JobRequest::Generate(flux_studio_protocol::GenerateParams {
            prompt: "portrait, golden hour".to_string(),
            ..Default::default()
        })
    }

    fn fast_options() -> PollOptions {
        PollOptions {
            poll_interval: Duration::from_millis(1),
            max_wait: Duration::from_millis(250),
        }
    }

    #[tokio::test]
    async fn submit_returns_handle() {
        let client = JobClient::new(MockTransport::completing_after(vec![JobStatus::Completed]));
        let handle = client.submit(&generate_request()).await.unwrap();
        assert_eq!(handle.as_str(), "job-1");
    }

    #[tokio::test]
    async fn submit_without_id_is_fatal() {
        let transport = MockTransport::completing_after(vec![JobStatus::Completed]).without_job_id();
        let client = JobClient::new(transport);
        let err = client.submit(&generate_request()).await.unwrap_err();
        assert!(matches!(err, StudioError::NoJobId { .. }));
    }

    #[tokio::test]
    async fn completes_on_first_poll() {
        let transport = MockTransport::completing_after(vec![JobStatus::Completed]).with_output(
            JobOutput {
                images: Some(vec!["aW1n".to_string()]),
                seed: Some(7),
                ..Default::default()
            },
        );
        let client = JobClient::new(transport);

        let mut progress = Vec::new();
        let result = client
            .submit_and_wait(&generate_request(), fast_options(), |p| progress.push(p))
            .await
            .unwrap();

        assert_eq!(result.status, JobStatus::Completed);
        assert_eq!(result.seed(), Some(7));
        assert_eq!(client.transport().poll_count(), 1);
        assert_eq!(progress, vec![JobProgress::Queued, JobProgress::Completed]);
    }

    #[tokio::test]
    async fn polls_through_queue_and_progress_states() {
        let transport = MockTransport::completing_after(vec![
            JobStatus::InQueue,
            JobStatus::InProgress,
            JobStatus::Completed,
        ]);
        let client = JobClient::new(transport);

        let mut progress = Vec::new();
        client
            .submit_and_wait(&generate_request(), fast_options(), |p| progress.push(p))
            .await
            .unwrap();

        assert_eq!(client.transport().poll_count(), 3);
        assert_eq!(
            progress,
            vec![
                JobProgress::Queued,
                JobProgress::InQueue,
                JobProgress::InProgress,
                JobProgress::Completed,
            ]
        );
    }

    #[tokio::test]
    async fn failed_job_surfaces_engine_message_verbatim() {
        let transport =
            MockTransport::completing_after(vec![JobStatus::InProgress, JobStatus::Failed])
                .with_failure_message("OOM");
        let client = JobClient::new(transport);

        let err = client
            .submit_and_wait(&generate_request(), fast_options(), |_| {})
            .await
            .unwrap_err();

        match err {
            StudioError::JobFailed { message, .. } => assert_eq!(message, "OOM"),
            other => panic!("expected JobFailed, got {other}"),
        }
    }

    #[tokio::test]
    async fn failed_job_without_message_uses_fallback() {
        let transport = MockTransport::completing_after(vec![JobStatus::Failed]);
        let client = JobClient::new(transport);

        let err = client
            .submit_and_wait(&generate_request(), fast_options(), |_| {})
            .await
            .unwrap_err();

        match err {
            StudioError::JobFailed { message, .. } => {
                assert_eq!(message, "Job failed without an error message")
            }
            other => panic!("expected JobFailed, got {other}"),
        }
    }

    #[tokio::test]
    async fn cancelled_job_is_terminal() {
        let transport = MockTransport::completing_after(vec![JobStatus::Cancelled]);
        let client = JobClient::new(transport);

        let err = client
            .submit_and_wait(&generate_request(), fast_options(), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, StudioError::JobCancelled { .. }));
    }

    #[tokio::test]
    async fn timeout_cancels_once_and_reports_timeout() {
        let transport = MockTransport::never_terminal();
        let client = JobClient::new(transport);
        let options = PollOptions {
            poll_interval: Duration::from_millis(1),
            max_wait: Duration::from_millis(20),
        };

        let err = client
            .submit_and_wait(&generate_request(), options, |_| {})
            .await
            .unwrap_err();

        assert!(matches!(err, StudioError::JobTimeout { .. }));
        assert_eq!(client.transport().cancel_count(), 1);
    }

    #[tokio::test]
    async fn cancel_failure_does_not_mask_timeout() {
        let transport = MockTransport::never_terminal().with_failing_cancel();
        let client = JobClient::new(transport);
        let options = PollOptions {
            poll_interval: Duration::from_millis(1),
            max_wait: Duration::from_millis(20),
        };

        let err = client
            .submit_and_wait(&generate_request(), options, |_| {})
            .await
            .unwrap_err();

        assert!(matches!(err, StudioError::JobTimeout { .. }));
        assert_eq!(client.transport().cancel_count(), 1);
    }

    #[tokio::test]
    async fn submit_error_propagates_without_polling() {
        let transport = MockTransport::never_terminal().with_submit_error();
        let client = JobClient::new(transport);

        let err = client
            .submit_and_wait(&generate_request(), fast_options(), |_| {})
            .await
            .unwrap_err();

        assert!(matches!(err, StudioError::Api { status: 500, .. }));
        assert_eq!(client.transport().poll_count(), 0);
    }

    #[tokio::test]
    async fn terminal_status_is_sticky_across_polls() {
        let transport =
            MockTransport::completing_after(vec![JobStatus::InQueue, JobStatus::Completed]);
        let client = JobClient::new(transport);
        let handle = client.submit(&generate_request()).await.unwrap();

        let mut statuses = Vec::new();
        for _ in 0..5 {
            statuses.push(client.poll(&handle).await.unwrap().status);
        }

        // once terminal, every later poll reports the same terminal state
        let first_terminal = statuses.iter().position(|s| s.is_terminal()).unwrap();
        assert!(statuses[first_terminal..]
            .iter()
            .all(|s| *s == JobStatus::Completed));
    }

    #[tokio::test]
    async fn submit_sync_round_trip() {
        let transport = MockTransport::completing_after(vec![JobStatus::Completed]).with_output(
            JobOutput {
                images: Some(vec!["aW1n".to_string()]),
                ..Default::default()
            },
        );
        let client = JobClient::new(transport);

        let result = client.submit_sync(&generate_request()).await.unwrap();
        assert_eq!(result.status, JobStatus::Completed);
        assert_eq!(result.images().len(), 1);
    }
}
