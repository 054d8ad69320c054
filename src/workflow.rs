//! Workflow state machine
//!
//! Single source of truth for one portrait session. All changes go through
//! the pure [`advance`] function; [`Workflow`] owns the state, the job
//! controller and the channel that carries job events back into `advance`.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::catalog::StyleCatalog;
use crate::config::{Config, ExportPreferences, SharePreferences};
use crate::error::{JobError, PortraitError, Result, TransitionError};
use crate::export::{self, ExportedImage, Exporter, Notice, SharePayload, Sharer};
use crate::image_loader::{self, ImageHandle};
use crate::job::{GenerationJob, JobController, JobEvent, JobId, JobStatus};
use crate::params::{set_parameter, ParameterField, ParameterSet};
use crate::transform::Transformer;

/// The four phases of the portrait pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Stage {
    #[default]
    Upload,
    Customize,
    Generate,
    Result,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Upload, Stage::Customize, Stage::Generate, Stage::Result];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Upload => "Upload",
            Stage::Customize => "Customize",
            Stage::Generate => "Generate",
            Stage::Result => "Result",
        }
    }
}

/// Authoritative state of one session
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowState {
    pub stage: Stage,
    pub source_image: Option<ImageHandle>,
    pub selected_style_id: String,
    pub parameters: ParameterSet,
    pub active_job: Option<GenerationJob>,
    /// Message of the most recent job failure, for display
    pub last_error: Option<JobError>,
}

impl WorkflowState {
    pub fn initial(default_style_id: &str) -> Self {
        Self {
            stage: Stage::Upload,
            source_image: None,
            selected_style_id: default_style_id.to_string(),
            parameters: ParameterSet::default(),
            active_job: None,
            last_error: None,
        }
    }

    /// The result image of a succeeded job, if any
    pub fn result(&self) -> Option<&ImageHandle> {
        self.active_job
            .as_ref()
            .filter(|job| job.status == JobStatus::Succeeded)
            .and_then(|job| job.result.as_ref())
    }

    pub fn is_generating(&self) -> bool {
        self.active_job
            .as_ref()
            .is_some_and(|job| !job.status.is_terminal())
    }
}

/// Inputs to the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowEvent {
    Uploaded(ImageHandle),
    SelectStyle(String),
    SetParameter(ParameterField, i32),
    SelectStage(Stage),
    JobStarted(GenerationJob),
    JobProgress {
        job_id: JobId,
        percent: u8,
        phase: &'static str,
    },
    JobSucceeded {
        job_id: JobId,
        result: ImageHandle,
    },
    JobFailed {
        job_id: JobId,
        error: JobError,
    },
    JobCancelled {
        job_id: JobId,
    },
    Restart,
}

impl From<JobEvent> for WorkflowEvent {
    fn from(event: JobEvent) -> Self {
        match event {
            JobEvent::Progress {
                job_id,
                percent,
                phase,
            } => WorkflowEvent::JobProgress {
                job_id,
                percent,
                phase,
            },
            JobEvent::Completed { job_id, result } => WorkflowEvent::JobSucceeded { job_id, result },
            JobEvent::Failed { job_id, error } => WorkflowEvent::JobFailed { job_id, error },
        }
    }
}

/// Fixed facts the transition function consults
#[derive(Debug, Clone)]
pub struct WorkflowRules {
    pub catalog: Arc<StyleCatalog>,
    /// Style selected after a restart; always present in the catalog
    pub default_style_id: String,
}

impl WorkflowRules {
    /// Resolve `preferred` against the catalog, falling back to its first entry
    pub fn new(catalog: Arc<StyleCatalog>, preferred: &str) -> Self {
        let default_style_id = catalog.resolve_default(preferred).id.clone();
        Self {
            catalog,
            default_style_id,
        }
    }

    pub fn initial_state(&self) -> WorkflowState {
        WorkflowState::initial(&self.default_style_id)
    }
}

/// Check whether `target` may be entered from `state`
pub fn stage_guard(
    state: &WorkflowState,
    target: Stage,
    rules: &WorkflowRules,
) -> std::result::Result<(), TransitionError> {
    let reject = |reason| Err(TransitionError::GuardRejected { target, reason });
    match target {
        Stage::Upload => Ok(()),
        Stage::Customize if state.source_image.is_none() => reject("no image uploaded"),
        Stage::Customize => Ok(()),
        Stage::Generate if state.source_image.is_none() => reject("no image uploaded"),
        Stage::Generate if !rules.catalog.contains(&state.selected_style_id) => {
            reject("selected style is not in the catalog")
        }
        Stage::Generate => Ok(()),
        Stage::Result if state.result().is_none() => reject("no generated portrait yet"),
        Stage::Result => Ok(()),
    }
}

/// Whether the UI should enable navigation to `stage`
pub fn is_stage_enabled(state: &WorkflowState, stage: Stage, rules: &WorkflowRules) -> bool {
    stage_guard(state, stage, rules).is_ok()
}

/// Pure transition function
///
/// Returns the next state, or the reason the event was refused. Job events
/// for anything other than the active job are stale and leave the state as
/// it is.
pub fn advance(
    state: &WorkflowState,
    event: WorkflowEvent,
    rules: &WorkflowRules,
) -> std::result::Result<WorkflowState, TransitionError> {
    let mut next = state.clone();

    match event {
        WorkflowEvent::Uploaded(image) => {
            next.stage = Stage::Customize;
            next.source_image = Some(image);
            next.active_job = None;
            next.last_error = None;
        }
        WorkflowEvent::SelectStyle(style_id) => {
            if !rules.catalog.contains(&style_id) {
                return Err(TransitionError::InvalidStyle(style_id));
            }
            next.selected_style_id = style_id;
        }
        WorkflowEvent::SetParameter(field, value) => {
            next.parameters = set_parameter(&state.parameters, field, value);
        }
        WorkflowEvent::SelectStage(target) => {
            stage_guard(state, target, rules)?;
            next.stage = target;
        }
        WorkflowEvent::JobStarted(job) => {
            if state.stage != Stage::Generate {
                return Err(TransitionError::WrongStage(state.stage));
            }
            stage_guard(state, Stage::Generate, rules)?;
            next.active_job = Some(job);
            next.last_error = None;
        }
        WorkflowEvent::JobProgress {
            job_id,
            percent,
            phase,
        } => {
            if let Some(job) = active_job_mut(&mut next, job_id) {
                job.status = JobStatus::Running;
                job.progress = job.progress.max(percent);
                job.phase = Some(phase);
            }
        }
        WorkflowEvent::JobSucceeded { job_id, result } => {
            if let Some(job) = active_job_mut(&mut next, job_id) {
                job.status = JobStatus::Succeeded;
                job.progress = 100;
                job.result = Some(result);
                next.stage = Stage::Result;
            }
        }
        WorkflowEvent::JobFailed { job_id, error } => {
            if active_job_mut(&mut next, job_id).is_some() {
                next.active_job = None;
                next.last_error = Some(error);
                if next.stage == Stage::Result {
                    next.stage = Stage::Generate;
                }
            }
        }
        WorkflowEvent::JobCancelled { job_id } => {
            if active_job_mut(&mut next, job_id).is_some() {
                next.active_job = None;
                if next.stage == Stage::Result {
                    next.stage = Stage::Generate;
                }
            }
        }
        WorkflowEvent::Restart => next = rules.initial_state(),
    }

    Ok(next)
}

/// The active job if it has `job_id` and has not finished yet
fn active_job_mut(state: &mut WorkflowState, job_id: JobId) -> Option<&mut GenerationJob> {
    state
        .active_job
        .as_mut()
        .filter(|job| job.id == job_id && !job.status.is_terminal())
}

/// Owns one session's state and drives its generation jobs
pub struct Workflow {
    state: WorkflowState,
    rules: WorkflowRules,
    jobs: JobController,
    events_tx: mpsc::UnboundedSender<JobEvent>,
    events_rx: mpsc::UnboundedReceiver<JobEvent>,
    export: ExportPreferences,
    share: SharePreferences,
}

impl Workflow {
    pub fn new(config: &Config, catalog: Arc<StyleCatalog>, transformer: Arc<dyn Transformer>) -> Self {
        let rules = WorkflowRules::new(Arc::clone(&catalog), &config.styles.default_style);
        let jobs = JobController::from_config(config, catalog, transformer);
        Self::with_controller(config, rules, jobs)
    }

    /// Build around an already configured job controller
    pub fn with_controller(config: &Config, rules: WorkflowRules, jobs: JobController) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            state: rules.initial_state(),
            rules,
            jobs,
            events_tx,
            events_rx,
            export: config.export.clone(),
            share: config.share.clone(),
        }
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn stage(&self) -> Stage {
        self.state.stage
    }

    pub fn rules(&self) -> &WorkflowRules {
        &self.rules
    }

    pub fn catalog(&self) -> &StyleCatalog {
        &self.rules.catalog
    }

    pub fn jobs(&self) -> &JobController {
        &self.jobs
    }

    pub fn is_stage_enabled(&self, stage: Stage) -> bool {
        is_stage_enabled(&self.state, stage, &self.rules)
    }

    /// Feed one event through the state machine
    pub fn apply(&mut self, event: WorkflowEvent) -> std::result::Result<&WorkflowState, TransitionError> {
        self.state = advance(&self.state, event, &self.rules)?;
        Ok(&self.state)
    }

    /// Accept a new source image, superseding any job
    pub fn upload(&mut self, image: ImageHandle) {
        self.discard_active_job();
        tracing::info!(
            width = image.width(),
            height = image.height(),
            "image uploaded"
        );
        if let Ok(next) = advance(&self.state, WorkflowEvent::Uploaded(image), &self.rules) {
            self.state = next;
        }
    }

    /// Decode and accept uploaded bytes; the stage does not change on failure
    pub fn upload_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let image = image_loader::load_image_from_bytes(bytes).inspect_err(|e| {
            tracing::warn!(error = %e, "upload rejected");
        })?;
        self.upload(image);
        Ok(())
    }

    pub fn upload_file(&mut self, path: &Path) -> Result<()> {
        let image = image_loader::load_image(path).inspect_err(|e| {
            tracing::warn!(error = %e, "upload rejected");
        })?;
        self.upload(image);
        Ok(())
    }

    pub fn upload_data_uri(&mut self, uri: &str) -> Result<()> {
        let image = image_loader::load_image_from_data_uri(uri).inspect_err(|e| {
            tracing::warn!(error = %e, "upload rejected");
        })?;
        self.upload(image);
        Ok(())
    }

    pub fn select_style(&mut self, style_id: &str) -> Result<()> {
        self.apply(WorkflowEvent::SelectStyle(style_id.to_string()))?;
        Ok(())
    }

    pub fn set_parameter(&mut self, field: ParameterField, value: i32) -> u8 {
        // Parameter updates are never rejected
        let _ = self.apply(WorkflowEvent::SetParameter(field, value));
        self.state.parameters.get(field)
    }

    /// Tab navigation; disabled stages are refused
    pub fn select_stage(&mut self, stage: Stage) -> Result<()> {
        self.apply(WorkflowEvent::SelectStage(stage))?;
        Ok(())
    }

    /// Enter the Generate stage and start a fresh job
    ///
    /// Any job already attached to this workflow is cancelled first.
    pub fn generate(&mut self) -> Result<JobId> {
        self.apply(WorkflowEvent::SelectStage(Stage::Generate))?;
        self.discard_active_job();
        self.state.last_error = None;

        let (handle, _) = self.jobs.start_job_subscribed(
            self.state.source_image.clone(),
            &self.state.selected_style_id,
            self.state.parameters,
            self.events_tx.clone(),
        )?;
        let job_id = handle.id();

        let job = self
            .jobs
            .job(job_id)
            .ok_or(PortraitError::JobNotFound(job_id))?;
        self.apply(WorkflowEvent::JobStarted(job))?;
        Ok(job_id)
    }

    /// Cancel the running job, staying in the Generate stage
    pub fn cancel_generation(&mut self) -> bool {
        let Some(job_id) = self.state.active_job.as_ref().map(|job| job.id) else {
            return false;
        };
        let cancelled = self.jobs.cancel(job_id);
        if cancelled {
            let _ = self.apply(WorkflowEvent::JobCancelled { job_id });
        }
        cancelled
    }

    fn discard_active_job(&mut self) {
        if let Some(job) = self.state.active_job.take() {
            self.jobs.release(job.id);
        }
    }

    fn handle_job_event(&mut self, event: &JobEvent) {
        if let Err(e) = self.apply(WorkflowEvent::from(event.clone())) {
            tracing::warn!(error = %e, job = event.job_id(), "job event rejected");
        }
    }

    /// Apply all job events that have already arrived, without waiting
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_job_event(&event);
            applied += 1;
        }
        applied
    }

    /// Wait for the next job event and apply it
    pub async fn next_event(&mut self) -> Option<JobEvent> {
        let event = self.events_rx.recv().await?;
        self.handle_job_event(&event);
        Some(event)
    }

    /// Wait for the active job to finish, reporting each event on the way
    pub async fn run_to_completion(
        &mut self,
        mut on_event: impl FnMut(&JobEvent),
    ) -> Result<ImageHandle> {
        if let Some(result) = self.state.result() {
            return Ok(result.clone());
        }
        let job_id = self
            .state
            .active_job
            .as_ref()
            .filter(|job| !job.status.is_terminal())
            .map(|job| job.id)
            .ok_or(PortraitError::NoActiveJob)?;

        while let Some(event) = self.next_event().await {
            if event.job_id() != job_id {
                continue;
            }
            on_event(&event);
            match event {
                JobEvent::Progress { .. } => {}
                JobEvent::Completed { result, .. } => return Ok(result),
                JobEvent::Failed { error, .. } => return Err(error.into()),
            }
        }
        Err(PortraitError::NoActiveJob)
    }

    /// Start over from an empty Upload stage
    pub fn restart(&mut self) {
        self.discard_active_job();
        self.state = self.rules.initial_state();
        tracing::info!("workflow restarted");
    }

    /// The result as a named byte stream
    pub fn export_result(&self) -> Result<ExportedImage> {
        let result = self
            .state
            .result()
            .ok_or_else(|| PortraitError::Export("no generated portrait to export".to_string()))?;
        export::export_result(result, &self.export.subject)
    }

    /// Save the result; failures become a notice and leave the state alone
    pub fn download(&self, exporter: &dyn Exporter) -> Notice {
        match self.export_result().and_then(|image| exporter.save(&image)) {
            Ok(location) => Notice::Info(format!("Saved portrait to {}", location)),
            Err(e) => {
                tracing::warn!(error = %e, "download failed");
                Notice::Warning(e.to_string())
            }
        }
    }

    /// Hand the result to a share target; failures are logged, never fatal
    pub fn share_result(&self, sharer: &dyn Sharer) -> Notice {
        let Some(result) = self.state.result() else {
            return Notice::Warning("no generated portrait to share".to_string());
        };
        let payload = SharePayload {
            title: self.share.title.clone(),
            text: self.share.text.clone(),
            image: result.clone(),
        };
        match sharer.share(&payload) {
            Ok(()) => Notice::Info("Portrait shared".to_string()),
            Err(e) => {
                tracing::warn!(error = %e, "sharing failed");
                Notice::Warning(e.to_string())
            }
        }
    }
}
