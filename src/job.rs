//! Generation job controller
//!
//! Runs each generation request as a tokio task that walks the milestone
//! table, reports progress to subscribers in emission order, and resolves
//! with a result image or a failure. Every event is published under the
//! registry lock after checking the job is still running, so a cancelled job
//! never emits again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::catalog::{StyleCatalog, StyleDefinition};
use crate::config::{Config, UnknownStylePolicy};
use crate::error::{JobError, PortraitError, Result};
use crate::image_loader::ImageHandle;
use crate::milestone::MilestoneTable;
use crate::params::ParameterSet;
use crate::transform::{TransformRequest, Transformer};

pub type JobId = u64;

/// Lifecycle of a generation job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// Snapshot of one generation job
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationJob {
    pub id: JobId,
    pub source_image: ImageHandle,
    pub style_id: String,
    pub parameters: ParameterSet,
    pub status: JobStatus,
    pub progress: u8,
    /// Phase of the last milestone reached
    pub phase: Option<&'static str>,
    pub result: Option<ImageHandle>,
    pub error: Option<JobError>,
}

/// Receives events for one job
///
/// Callbacks run while the controller holds its registry lock; they must not
/// call back into the [`JobController`].
pub trait JobSubscriber: Send {
    fn on_progress(&mut self, job_id: JobId, percent: u8, phase: &'static str);
    fn on_complete(&mut self, job_id: JobId, result: &ImageHandle);
    fn on_error(&mut self, job_id: JobId, error: &JobError);
}

/// Job events as plain values, for channel-based consumers
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Progress {
        job_id: JobId,
        percent: u8,
        phase: &'static str,
    },
    Completed {
        job_id: JobId,
        result: ImageHandle,
    },
    Failed {
        job_id: JobId,
        error: JobError,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> JobId {
        match self {
            JobEvent::Progress { job_id, .. }
            | JobEvent::Completed { job_id, .. }
            | JobEvent::Failed { job_id, .. } => *job_id,
        }
    }
}

impl JobSubscriber for mpsc::UnboundedSender<JobEvent> {
    fn on_progress(&mut self, job_id: JobId, percent: u8, phase: &'static str) {
        let _ = self.send(JobEvent::Progress {
            job_id,
            percent,
            phase,
        });
    }

    fn on_complete(&mut self, job_id: JobId, result: &ImageHandle) {
        let _ = self.send(JobEvent::Completed {
            job_id,
            result: result.clone(),
        });
    }

    fn on_error(&mut self, job_id: JobId, error: &JobError) {
        let _ = self.send(JobEvent::Failed {
            job_id,
            error: error.clone(),
        });
    }
}

/// Subscriber built from three closures
pub struct Callbacks<P, C, E> {
    on_progress: P,
    on_complete: C,
    on_error: E,
}

impl<P, C, E> Callbacks<P, C, E>
where
    P: FnMut(JobId, u8, &'static str) + Send,
    C: FnMut(JobId, &ImageHandle) + Send,
    E: FnMut(JobId, &JobError) + Send,
{
    pub fn new(on_progress: P, on_complete: C, on_error: E) -> Self {
        Self {
            on_progress,
            on_complete,
            on_error,
        }
    }
}

impl<P, C, E> JobSubscriber for Callbacks<P, C, E>
where
    P: FnMut(JobId, u8, &'static str) + Send,
    C: FnMut(JobId, &ImageHandle) + Send,
    E: FnMut(JobId, &JobError) + Send,
{
    fn on_progress(&mut self, job_id: JobId, percent: u8, phase: &'static str) {
        (self.on_progress)(job_id, percent, phase)
    }

    fn on_complete(&mut self, job_id: JobId, result: &ImageHandle) {
        (self.on_complete)(job_id, result)
    }

    fn on_error(&mut self, job_id: JobId, error: &JobError) {
        (self.on_error)(job_id, error)
    }
}

/// Identifies one subscription so it can be removed again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionHandle {
    pub job_id: JobId,
    id: u64,
}

/// Returned by [`JobController::start_job`]
#[derive(Debug)]
pub struct JobHandle {
    id: JobId,
    status_rx: watch::Receiver<JobStatus>,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Latest known status
    pub fn status(&self) -> JobStatus {
        *self.status_rx.borrow()
    }

    /// Wait until the job reaches a terminal state
    pub async fn finished(&mut self) -> JobStatus {
        loop {
            let status = *self.status_rx.borrow_and_update();
            if status.is_terminal() {
                return status;
            }
            if self.status_rx.changed().await.is_err() {
                // Job was released; whatever we saw last is final
                return *self.status_rx.borrow();
            }
        }
    }
}

struct JobEntry {
    job: GenerationJob,
    subscribers: Vec<(u64, Box<dyn JobSubscriber>)>,
    status_tx: watch::Sender<JobStatus>,
    task: Option<JoinHandle<()>>,
}

impl JobEntry {
    fn set_status(&mut self, status: JobStatus) {
        self.job.status = status;
        let _ = self.status_tx.send(status);
    }
}

#[derive(Default)]
struct Registry {
    jobs: HashMap<JobId, JobEntry>,
    next_job_id: JobId,
    next_subscription_id: u64,
}

type SharedRegistry = Arc<Mutex<Registry>>;

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Starts, tracks and cancels generation jobs
pub struct JobController {
    catalog: Arc<StyleCatalog>,
    transformer: Arc<dyn Transformer>,
    milestones: MilestoneTable,
    timeout: Duration,
    unknown_style: UnknownStylePolicy,
    registry: SharedRegistry,
}

impl JobController {
    pub fn new(catalog: Arc<StyleCatalog>, transformer: Arc<dyn Transformer>) -> Self {
        Self {
            catalog,
            transformer,
            milestones: MilestoneTable::default(),
            timeout: Duration::from_secs(30),
            unknown_style: UnknownStylePolicy::default(),
            registry: Arc::default(),
        }
    }

    pub fn from_config(
        config: &Config,
        catalog: Arc<StyleCatalog>,
        transformer: Arc<dyn Transformer>,
    ) -> Self {
        Self::new(catalog, transformer)
            .with_milestones(config.job.milestones())
            .with_timeout(config.job.timeout())
            .with_unknown_style(config.styles.unknown_style)
    }

    pub fn with_milestones(mut self, milestones: MilestoneTable) -> Self {
        self.milestones = milestones;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_unknown_style(mut self, policy: UnknownStylePolicy) -> Self {
        self.unknown_style = policy;
        self
    }

    pub fn catalog(&self) -> &Arc<StyleCatalog> {
        &self.catalog
    }

    pub fn milestones(&self) -> &MilestoneTable {
        &self.milestones
    }

    /// Start a job; must be called from within a tokio runtime
    ///
    /// Fails before any progress if there is no source image, or if the style
    /// is unknown under [`UnknownStylePolicy::Reject`]. Subscribers attached
    /// later with [`subscribe`](Self::subscribe) may miss early milestones;
    /// use [`start_job_subscribed`](Self::start_job_subscribed) to see all of
    /// them.
    pub fn start_job(
        &self,
        source_image: Option<ImageHandle>,
        style_id: &str,
        parameters: ParameterSet,
    ) -> Result<JobHandle> {
        self.spawn_job(source_image, style_id, parameters, None)
            .map(|(handle, _)| handle)
    }

    /// Start a job with `subscriber` attached before the task runs
    pub fn start_job_subscribed(
        &self,
        source_image: Option<ImageHandle>,
        style_id: &str,
        parameters: ParameterSet,
        subscriber: impl JobSubscriber + 'static,
    ) -> Result<(JobHandle, SubscriptionHandle)> {
        let (handle, subscription) =
            self.spawn_job(source_image, style_id, parameters, Some(Box::new(subscriber)))?;
        let subscription = subscription.ok_or(PortraitError::JobNotFound(handle.id()))?;
        Ok((handle, subscription))
    }

    fn spawn_job(
        &self,
        source_image: Option<ImageHandle>,
        style_id: &str,
        parameters: ParameterSet,
        subscriber: Option<Box<dyn JobSubscriber>>,
    ) -> Result<(JobHandle, Option<SubscriptionHandle>)> {
        let source_image = source_image.ok_or_else(|| {
            PortraitError::UnreadableImage("no source image uploaded".to_string())
        })?;
        let style = self.resolve_style(style_id)?.clone();

        let (status_tx, status_rx) = watch::channel(JobStatus::Pending);
        let (id, subscription) = {
            let mut registry = lock(&self.registry);
            registry.next_job_id += 1;
            let id = registry.next_job_id;

            let mut subscribers = Vec::new();
            let subscription = subscriber.map(|subscriber| {
                registry.next_subscription_id += 1;
                let sub_id = registry.next_subscription_id;
                subscribers.push((sub_id, subscriber));
                SubscriptionHandle {
                    job_id: id,
                    id: sub_id,
                }
            });

            registry.jobs.insert(
                id,
                JobEntry {
                    job: GenerationJob {
                        id,
                        source_image: source_image.clone(),
                        style_id: style.id.clone(),
                        parameters,
                        status: JobStatus::Pending,
                        progress: 0,
                        phase: None,
                        result: None,
                        error: None,
                    },
                    subscribers,
                    status_tx,
                    task: None,
                },
            );
            (id, subscription)
        };

        tracing::info!(
            job = id,
            style = %style.id,
            backend = self.transformer.name(),
            "starting generation job"
        );

        let run = JobRun {
            id,
            registry: Arc::clone(&self.registry),
            transformer: Arc::clone(&self.transformer),
            milestones: self.milestones.clone(),
            timeout: self.timeout,
            source_image,
            style,
            parameters,
        };
        let task = tokio::spawn(run.execute());

        if let Some(entry) = lock(&self.registry).jobs.get_mut(&id) {
            entry.task = Some(task);
        }

        Ok((JobHandle { id, status_rx }, subscription))
    }

    fn resolve_style(&self, style_id: &str) -> Result<&StyleDefinition> {
        match self.catalog.find_style(style_id) {
            Some(style) => Ok(style),
            None => match self.unknown_style {
                UnknownStylePolicy::Reject => {
                    Err(PortraitError::InvalidStyle(style_id.to_string()))
                }
                UnknownStylePolicy::Substitute => {
                    let fallback = self.catalog.default_style();
                    tracing::warn!(
                        requested = style_id,
                        substitute = %fallback.id,
                        "unknown style, using catalog default"
                    );
                    Ok(fallback)
                }
            },
        }
    }

    /// Attach a subscriber; a finished job replays its terminal event
    pub fn subscribe(
        &self,
        job_id: JobId,
        mut subscriber: impl JobSubscriber + 'static,
    ) -> Result<SubscriptionHandle> {
        let mut registry = lock(&self.registry);
        registry.next_subscription_id += 1;
        let id = registry.next_subscription_id;
        let entry = registry
            .jobs
            .get_mut(&job_id)
            .ok_or(PortraitError::JobNotFound(job_id))?;

        match entry.job.status {
            JobStatus::Succeeded => {
                if let Some(result) = &entry.job.result {
                    subscriber.on_complete(job_id, result);
                }
            }
            JobStatus::Failed => {
                if let Some(error) = &entry.job.error {
                    subscriber.on_error(job_id, error);
                }
            }
            JobStatus::Cancelled => {}
            JobStatus::Pending | JobStatus::Running => {
                entry.subscribers.push((id, Box::new(subscriber)));
            }
        }

        Ok(SubscriptionHandle { job_id, id })
    }

    /// Remove a subscription; returns whether it was still attached
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut registry = lock(&self.registry);
        match registry.jobs.get_mut(&handle.job_id) {
            Some(entry) => {
                let before = entry.subscribers.len();
                entry.subscribers.retain(|(id, _)| *id != handle.id);
                entry.subscribers.len() != before
            }
            None => false,
        }
    }

    /// Cancel a job that has not finished yet
    ///
    /// Returns `false` for unknown or already terminal jobs.
    pub fn cancel(&self, job_id: JobId) -> bool {
        let mut registry = lock(&self.registry);
        let Some(entry) = registry.jobs.get_mut(&job_id) else {
            return false;
        };
        if entry.job.status.is_terminal() {
            return false;
        }

        entry.set_status(JobStatus::Cancelled);
        entry.subscribers.clear();
        if let Some(task) = entry.task.take() {
            task.abort();
        }
        tracing::info!(job = job_id, progress = entry.job.progress, "job cancelled");
        true
    }

    /// Forget a job, cancelling it first if it is still active
    pub fn release(&self, job_id: JobId) -> Option<GenerationJob> {
        self.cancel(job_id);
        lock(&self.registry)
            .jobs
            .remove(&job_id)
            .map(|entry| entry.job)
    }

    /// Snapshot of a tracked job
    pub fn job(&self, job_id: JobId) -> Option<GenerationJob> {
        lock(&self.registry)
            .jobs
            .get(&job_id)
            .map(|entry| entry.job.clone())
    }

    /// Number of jobs that are pending or running
    pub fn active_jobs(&self) -> usize {
        lock(&self.registry)
            .jobs
            .values()
            .filter(|entry| !entry.job.status.is_terminal())
            .count()
    }

    /// Cancel every active job
    pub fn shutdown(&self) {
        let ids: Vec<JobId> = lock(&self.registry).jobs.keys().copied().collect();
        for id in ids {
            self.cancel(id);
        }
    }
}

impl Drop for JobController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Everything a spawned job task owns
struct JobRun {
    id: JobId,
    registry: SharedRegistry,
    transformer: Arc<dyn Transformer>,
    milestones: MilestoneTable,
    timeout: Duration,
    source_image: ImageHandle,
    style: StyleDefinition,
    parameters: ParameterSet,
}

impl JobRun {
    async fn execute(self) {
        if !self.mark_running() {
            return;
        }

        match tokio::time::timeout(self.timeout, self.drive()).await {
            Ok(Ok(Some(result))) => self.succeed(result),
            Ok(Ok(None)) => {}
            Ok(Err(error)) => self.fail(error),
            Err(_) => self.fail(JobError::Timeout(self.timeout)),
        }
    }

    fn mark_running(&self) -> bool {
        let mut registry = lock(&self.registry);
        match registry.jobs.get_mut(&self.id) {
            Some(entry) if entry.job.status == JobStatus::Pending => {
                entry.set_status(JobStatus::Running);
                true
            }
            _ => false,
        }
    }

    /// Walk the milestones; `Ok(None)` means the job was cancelled mid-way
    async fn drive(&self) -> std::result::Result<Option<ImageHandle>, JobError> {
        let mut result = None;
        let last = self.milestones.milestones().len().saturating_sub(1);

        for (index, milestone) in self.milestones.milestones().iter().enumerate() {
            tokio::time::sleep(milestone.min_delay).await;

            if index == last {
                result = Some(self.run_transform().await?);
            }

            if !self.publish_progress(milestone.percent, milestone.phase) {
                return Ok(None);
            }
        }

        Ok(result)
    }

    /// Run the backend on the blocking pool so the timeout can still fire
    async fn run_transform(&self) -> std::result::Result<ImageHandle, JobError> {
        let transformer = Arc::clone(&self.transformer);
        let source = self.source_image.clone();
        let style = self.style.clone();
        let parameters = self.parameters;

        tokio::task::spawn_blocking(move || {
            transformer.transform(&TransformRequest {
                source: &source,
                style: &style,
                parameters: &parameters,
            })
        })
        .await
        .map_err(|e| JobError::Transform(format!("transform task failed: {}", e)))?
    }

    fn publish_progress(&self, percent: u8, phase: &'static str) -> bool {
        let mut registry = lock(&self.registry);
        let Some(entry) = registry.jobs.get_mut(&self.id) else {
            return false;
        };
        if entry.job.status != JobStatus::Running {
            return false;
        }

        tracing::debug!(job = self.id, percent, phase, "milestone reached");
        entry.job.progress = percent;
        entry.job.phase = Some(phase);
        for (_, subscriber) in entry.subscribers.iter_mut() {
            subscriber.on_progress(self.id, percent, phase);
        }
        true
    }

    fn succeed(&self, result: ImageHandle) {
        let mut registry = lock(&self.registry);
        let Some(entry) = registry.jobs.get_mut(&self.id) else {
            return;
        };
        if entry.job.status != JobStatus::Running {
            return;
        }

        tracing::info!(
            job = self.id,
            width = result.width(),
            height = result.height(),
            "generation job succeeded"
        );
        for (_, subscriber) in entry.subscribers.iter_mut() {
            subscriber.on_complete(self.id, &result);
        }
        entry.job.result = Some(result);
        entry.subscribers.clear();
        entry.task = None;
        entry.set_status(JobStatus::Succeeded);
    }

    fn fail(&self, error: JobError) {
        let mut registry = lock(&self.registry);
        let Some(entry) = registry.jobs.get_mut(&self.id) else {
            return;
        };
        if entry.job.status != JobStatus::Running {
            return;
        }

        tracing::warn!(job = self.id, %error, "generation job failed");
        for (_, subscriber) in entry.subscribers.iter_mut() {
            subscriber.on_error(self.id, &error);
        }
        entry.job.error = Some(error);
        entry.subscribers.clear();
        entry.task = None;
        entry.set_status(JobStatus::Failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::milestone::Milestone;
    use crate::transform::SimulatedTransformer;

    struct FailingTransformer;

    impl Transformer for FailingTransformer {
        fn name(&self) -> &str {
            "failing"
        }

        fn transform(&self, _request: &TransformRequest<'_>) -> std::result::Result<ImageHandle, JobError> {
            Err(JobError::Transform("model unavailable".to_string()))
        }
    }

    /// Blocks its thread for `delay` before producing a placeholder
    struct SlowTransformer {
        delay: Duration,
    }

    impl Transformer for SlowTransformer {
        fn name(&self) -> &str {
            "slow"
        }

        fn transform(&self, request: &TransformRequest<'_>) -> std::result::Result<ImageHandle, JobError> {
            std::thread::sleep(self.delay);
            SimulatedTransformer.transform(request)
        }
    }

    fn instant_milestones() -> MilestoneTable {
        MilestoneTable::uniform(Duration::ZERO)
    }

    fn controller() -> JobController {
        JobController::new(
            Arc::new(StyleCatalog::builtin()),
            Arc::new(SimulatedTransformer),
        )
    }

    fn img1() -> ImageHandle {
        ImageHandle::from_uri("/uploads/IMG1.jpg", 640, 480)
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_sequence_and_result() {
        let jobs = controller();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (mut handle, _) = jobs
            .start_job_subscribed(Some(img1()), "queen", ParameterSet::default(), tx)
            .unwrap();

        let mut percents = Vec::new();
        let result = loop {
            match rx.recv().await.unwrap() {
                JobEvent::Progress { percent, .. } => percents.push(percent),
                JobEvent::Completed { result, .. } => break result,
                JobEvent::Failed { error, .. } => panic!("unexpected failure: {error}"),
            }
        };

        assert_eq!(percents, vec![20, 40, 60, 80, 100]);
        assert!(result.uri().unwrap().contains("queen"));
        assert_eq!(handle.finished().await, JobStatus::Succeeded);

        let job = jobs.job(handle.id()).unwrap();
        assert_eq!(job.progress, 100);
        assert_eq!(job.phase, Some("completion"));
        assert_eq!(job.result, Some(result));
        // Channel closes once the job is terminal
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_milestones_respect_min_delay() {
        let jobs = controller();
        let start = tokio::time::Instant::now();
        let (tx, mut rx) = mpsc::unbounded_channel();
        jobs.start_job_subscribed(Some(img1()), "pharaoh", ParameterSet::default(), tx)
            .unwrap();

        let mut seen = 0u64;
        while let Some(JobEvent::Progress { .. }) = rx.recv().await {
            seen += 1;
            assert!(start.elapsed() >= Duration::from_millis(1000 * seen));
        }
        assert_eq!(seen, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_source_fails_before_progress() {
        let jobs = controller();
        let err = jobs
            .start_job(None, "queen", ParameterSet::default())
            .unwrap_err();
        assert!(matches!(err, PortraitError::UnreadableImage(_)));
        assert_eq!(jobs.active_jobs(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_style_policies() {
        let jobs = controller();
        let handle = jobs
            .start_job(Some(img1()), "astronaut", ParameterSet::default())
            .unwrap();
        assert_eq!(jobs.job(handle.id()).unwrap().style_id, "pharaoh");

        let strict = controller().with_unknown_style(UnknownStylePolicy::Reject);
        let err = strict
            .start_job(Some(img1()), "astronaut", ParameterSet::default())
            .unwrap_err();
        assert!(matches!(err, PortraitError::InvalidStyle(id) if id == "astronaut"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_silences_job() {
        let jobs = controller();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (mut handle, _) = jobs
            .start_job_subscribed(Some(img1()), "queen", ParameterSet::default(), tx)
            .unwrap();

        assert!(matches!(rx.recv().await, Some(JobEvent::Progress { percent: 20, .. })));
        assert!(matches!(rx.recv().await, Some(JobEvent::Progress { percent: 40, .. })));

        assert!(jobs.cancel(handle.id()));
        assert_eq!(handle.finished().await, JobStatus::Cancelled);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.recv().await.is_none());

        let job = jobs.job(handle.id()).unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert_eq!(job.progress, 40);
        assert!(job.result.is_none());
        assert!(!jobs.cancel(handle.id()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transform_failure_reported() {
        let jobs = JobController::new(
            Arc::new(StyleCatalog::builtin()),
            Arc::new(FailingTransformer),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (mut handle, _) = jobs
            .start_job_subscribed(Some(img1()), "scribe", ParameterSet::default(), tx)
            .unwrap();

        let mut last_progress = 0;
        let error = loop {
            match rx.recv().await.unwrap() {
                JobEvent::Progress { percent, .. } => last_progress = percent,
                JobEvent::Failed { error, .. } => break error,
                JobEvent::Completed { .. } => panic!("failing backend completed"),
            }
        };

        assert_eq!(last_progress, 80);
        assert_eq!(error, JobError::Transform("model unavailable".to_string()));
        assert_eq!(handle.finished().await, JobStatus::Failed);
        assert!(jobs.job(handle.id()).unwrap().result.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fails_job() {
        let jobs = controller().with_timeout(Duration::from_millis(2500));
        let mut handle = jobs
            .start_job(Some(img1()), "queen", ParameterSet::default())
            .unwrap();

        assert_eq!(handle.finished().await, JobStatus::Failed);
        let job = jobs.job(handle.id()).unwrap();
        assert_eq!(job.error, Some(JobError::Timeout(Duration::from_millis(2500))));
        assert_eq!(job.progress, 40);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_subscriber_gets_terminal_event() {
        let jobs = controller().with_milestones(
            MilestoneTable::new(vec![Milestone {
                percent: 100,
                phase: "completion",
                min_delay: Duration::from_millis(10),
            }])
            .unwrap(),
        );
        let mut handle = jobs
            .start_job(Some(img1()), "queen", ParameterSet::default())
            .unwrap();
        handle.finished().await;

        let completed = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&completed);
        jobs.subscribe(
            handle.id(),
            Callbacks::new(
                |_, _, _| panic!("no progress after completion"),
                move |id, result: &ImageHandle| sink.lock().unwrap().push((id, result.clone())),
                |_, _| panic!("job did not fail"),
            ),
        )
        .unwrap();

        assert_eq!(completed.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribe_and_release() {
        let jobs = controller();
        let handle = jobs
            .start_job(Some(img1()), "queen", ParameterSet::default())
            .unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscription = jobs.subscribe(handle.id(), tx).unwrap();

        assert!(jobs.unsubscribe(subscription));
        assert!(!jobs.unsubscribe(subscription));
        assert!(rx.recv().await.is_none());

        assert_eq!(jobs.active_jobs(), 1);
        let released = jobs.release(handle.id()).unwrap();
        assert_eq!(released.status, JobStatus::Cancelled);
        assert!(jobs.job(handle.id()).is_none());
        assert!(matches!(
            jobs.subscribe(handle.id(), mpsc::unbounded_channel().0),
            Err(PortraitError::JobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_timeout_interrupts_slow_backend() {
        let jobs = JobController::new(
            Arc::new(StyleCatalog::builtin()),
            Arc::new(SlowTransformer {
                delay: Duration::from_millis(1500),
            }),
        )
        .with_milestones(instant_milestones())
        .with_timeout(Duration::from_millis(200));

        let started = std::time::Instant::now();
        let mut handle = jobs
            .start_job(Some(img1()), "queen", ParameterSet::default())
            .unwrap();

        assert_eq!(handle.finished().await, JobStatus::Failed);
        assert!(started.elapsed() < Duration::from_millis(1500));
        let job = jobs.job(handle.id()).unwrap();
        assert_eq!(job.error, Some(JobError::Timeout(Duration::from_millis(200))));
        assert!(job.result.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_initial_subscriber_sees_every_milestone() {
        let jobs = controller().with_milestones(instant_milestones());

        for _ in 0..50 {
            let (tx, mut rx) = mpsc::unbounded_channel();
            jobs.start_job_subscribed(Some(img1()), "queen", ParameterSet::default(), tx)
                .unwrap();

            let mut percents = Vec::new();
            while let Some(event) = rx.recv().await {
                match event {
                    JobEvent::Progress { percent, .. } => percents.push(percent),
                    JobEvent::Completed { .. } => break,
                    JobEvent::Failed { error, .. } => panic!("unexpected failure: {error}"),
                }
            }
            assert_eq!(percents, vec![20, 40, 60, 80, 100]);
        }
    }
}
