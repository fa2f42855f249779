//! Clip generation pipeline.
//!
//! One job runs its stages strictly in order:
//! downloading → transcribing → analyzing → generating → uploading → completed.
//! Any stage error turns into a single `failed` status with progress 0 and is
//! returned to the executor; nothing is retried at this level.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use reel_media::CaptionStyle;
use reel_models::{
    clip_filename, clip_object_key, ClipRecord, ClipWindow, JobStatus, ProjectType, Segment, Stage,
    StatusUpdate, WordTiming,
};
use reel_queue::{effect_key, ClipJob, IdempotencyLedger};
use tokio::sync::mpsc;
use tracing::{debug, info, warn, Instrument};

use crate::download::{MediaAcquirer, PreparedMedia};
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::progress::{
    download_progress, generating_progress, ProgressTracker, ANALYZING, COMPLETED,
    DOWNLOAD_START, GENERATING_START, TRANSCRIBING, UPLOADING,
};
use crate::render::{ClipRenderer, RenderRequest};
use crate::segments::{relative_word_timings, SegmentExtractor};
use crate::status::StatusSink;
use crate::transcript::Transcriber;
use crate::upload::ArtifactStore;

/// Stage text of a job that finished without any clip.
pub const NO_SEGMENTS_STAGE: &str = "No interesting segments found";

/// Collaborators shared by every job.
pub struct ProcessingContext {
    pub acquirer: Arc<dyn MediaAcquirer>,
    pub transcriber: Arc<dyn Transcriber>,
    pub extractor: Arc<SegmentExtractor>,
    pub renderer: Arc<dyn ClipRenderer>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub status: Arc<dyn StatusSink>,
    pub ledger: Arc<dyn IdempotencyLedger>,
    /// Parent of the per-job temp directories
    pub work_dir: PathBuf,
}

/// Result of a successful run.
#[derive(Debug, Clone, Default)]
pub struct JobOutcome {
    /// Clips published by this run, in segment order
    pub clips: Vec<ClipRecord>,
    /// Clips an earlier delivery of the same job already published
    pub skipped: usize,
}

/// A clip about to be rendered.
struct ClipPlan {
    segment: Segment,
    source: PathBuf,
    window: Option<ClipWindow>,
    words: Vec<WordTiming>,
    caption_offset: f64,
}

/// Sends status updates for one job and keeps its progress monotonic.
struct JobReporter<'a> {
    sink: &'a dyn StatusSink,
    job: &'a ClipJob,
    title: Option<String>,
    timeframe: Option<String>,
    tracker: ProgressTracker,
}

impl<'a> JobReporter<'a> {
    fn new(sink: &'a dyn StatusSink, job: &'a ClipJob) -> Self {
        Self {
            sink,
            job,
            title: job.title.clone(),
            timeframe: job
                .processing_timeframe
                .clone()
                .or_else(|| job.trim.map(format_timeframe)),
            tracker: ProgressTracker::new(0.0, job.quality),
        }
    }

    /// Report entering `stage`.
    async fn stage(&mut self, stage: Stage, progress: u8) {
        let snapshot = self.tracker.advance(stage, progress);
        let update = self.payload(
            JobStatus::Processing,
            stage.as_str(),
            snapshot.progress,
            Some(snapshot.remaining_estimate),
        );
        self.send(&update).await;
    }

    /// Report progress within `stage`, only when it moved forward.
    async fn progress(&mut self, stage: Stage, progress: u8) {
        if let Some(snapshot) = self.tracker.advance_if_moved(stage, progress) {
            let update = self.payload(
                JobStatus::Processing,
                stage.as_str(),
                snapshot.progress,
                Some(snapshot.remaining_estimate),
            );
            self.send(&update).await;
        }
    }

    async fn terminal(&self, status: JobStatus, stage: &str, progress: u8) {
        let update = self.payload(status, stage, progress, None);
        self.send(&update).await;
    }

    fn payload(
        &self,
        status: JobStatus,
        stage: &str,
        progress: u8,
        remaining_estimate: Option<f64>,
    ) -> StatusUpdate {
        StatusUpdate {
            user_id: self.job.user_id.clone(),
            project_id: self.job.project_id.clone(),
            status,
            stage: stage.to_string(),
            progress,
            title: self.title.clone(),
            processing_timeframe: self.timeframe.clone(),
            remaining_estimate,
        }
    }

    /// Sink failures never fail the job.
    async fn send(&self, update: &StatusUpdate) {
        if let Err(e) = self.sink.update(update).await {
            warn!(
                project_id = %update.project_id,
                stage = %update.stage,
                error = %e,
                "Failed to post status update"
            );
        }
    }
}

/// `HH:MM:SS - HH:MM:SS`, hours omitted when zero.
pub fn format_timeframe(window: ClipWindow) -> String {
    fn clock(seconds: f64) -> String {
        let total = seconds.max(0.0).floor() as u64;
        let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
        if h > 0 {
            format!("{:02}:{:02}:{:02}", h, m, s)
        } else {
            format!("{:02}:{:02}", m, s)
        }
    }
    format!("{} - {}", clock(window.start), clock(window.end))
}

/// Run `job` end to end.
pub async fn process_job(ctx: &ProcessingContext, job: &ClipJob) -> WorkerResult<JobOutcome> {
    let operation = match job.project_type {
        ProjectType::Auto => "auto_clips",
        ProjectType::Manual => "manual_clips",
    };
    let logger = JobLogger::new(&job.job_id, operation);
    let mut reporter = JobReporter::new(ctx.status.as_ref(), job);

    logger.log_start(&format!("source {}", job.source));
    metrics::record_job_started(job.project_type.as_str());

    let result = run(ctx, job, &mut reporter)
        .instrument(logger.create_span())
        .await;

    match result {
        Ok(outcome) => {
            metrics::record_job_completed(job.project_type.as_str());
            logger.log_completion(&format!(
                "{} clips published, {} already published",
                outcome.clips.len(),
                outcome.skipped
            ));
            Ok(outcome)
        }
        Err(e) => {
            logger.log_error(&e.to_string());
            metrics::record_job_failed(e.kind());
            finish(ctx, &reporter, "failed", JobStatus::Failed, Stage::Failed.as_str(), 0).await;
            Err(e)
        }
    }
}

async fn run(
    ctx: &ProcessingContext,
    job: &ClipJob,
    reporter: &mut JobReporter<'_>,
) -> WorkerResult<JobOutcome> {
    let caption_style = CaptionStyle::from_name(&job.caption_style)?;

    tokio::fs::create_dir_all(&ctx.work_dir).await?;
    let scratch = tempfile::Builder::new()
        .prefix(&format!("{}-", job.job_id))
        .tempdir_in(&ctx.work_dir)?;

    reporter.stage(Stage::Downloading, DOWNLOAD_START).await;
    let media = acquire(ctx, job, scratch.path(), reporter).await?;
    reporter.tracker.set_duration(media.duration);
    reporter.title = Some(media.title.clone());

    let plans = match job.project_type {
        ProjectType::Auto => plan_auto(ctx, job, &media, reporter).await?,
        ProjectType::Manual => plan_manual(ctx, &media, reporter).await?,
    };

    if plans.is_empty() {
        info!(job_id = %job.job_id, "No segments to render");
        finish(ctx, reporter, "completed", JobStatus::Completed, NO_SEGMENTS_STAGE, COMPLETED).await;
        return Ok(JobOutcome::default());
    }

    let started = Instant::now();
    reporter.stage(Stage::Generating, GENERATING_START).await;
    let mut outcome = JobOutcome::default();
    let total = plans.len();

    for (i, plan) in plans.into_iter().enumerate() {
        let key = effect_key(&job.job_id, "clip", Some(i));
        if !ctx.ledger.claim(&key).await? {
            debug!(job_id = %job.job_id, clip = i, "Clip already published, skipping");
            metrics::record_effect_skipped("clip");
            outcome.skipped += 1;
        } else {
            match publish_clip(ctx, job, scratch.path(), i, plan, caption_style).await {
                Ok(record) => outcome.clips.push(record),
                Err(e) => {
                    if let Err(release_err) = ctx.ledger.release(&key).await {
                        warn!(key = %key, error = %release_err, "Failed to release effect key");
                    }
                    return Err(e);
                }
            }
        }
        reporter
            .progress(Stage::Generating, generating_progress(i + 1, total))
            .await;
    }
    metrics::record_stage_duration("generating", started.elapsed().as_secs_f64());

    reporter.stage(Stage::Uploading, UPLOADING).await;
    finish(ctx, reporter, "completed", JobStatus::Completed, Stage::Completed.as_str(), COMPLETED).await;
    Ok(outcome)
}

/// Download and prepare the source, forwarding download progress.
async fn acquire(
    ctx: &ProcessingContext,
    job: &ClipJob,
    dir: &Path,
    reporter: &mut JobReporter<'_>,
) -> WorkerResult<PreparedMedia> {
    let (tx, mut rx) = mpsc::unbounded_channel::<f64>();
    let acquire = ctx.acquirer.acquire(job, dir, tx);
    tokio::pin!(acquire);

    let result = loop {
        tokio::select! {
            result = &mut acquire => break result,
            Some(fraction) = rx.recv() => {
                reporter.progress(Stage::Downloading, download_progress(fraction)).await;
            }
        }
    };

    // Reports sent right before the acquirer finished.
    while let Ok(fraction) = rx.try_recv() {
        reporter.progress(Stage::Downloading, download_progress(fraction)).await;
    }
    result
}

async fn plan_auto(
    ctx: &ProcessingContext,
    job: &ClipJob,
    media: &PreparedMedia,
    reporter: &mut JobReporter<'_>,
) -> WorkerResult<Vec<ClipPlan>> {
    reporter.stage(Stage::Transcribing, TRANSCRIBING).await;
    let audio = media
        .audio
        .as_deref()
        .ok_or_else(|| WorkerError::transcription("no audio track was extracted"))?;
    let started = Instant::now();
    let transcript = ctx.transcriber.transcribe(audio).await?;
    metrics::record_stage_duration("transcribing", started.elapsed().as_secs_f64());

    reporter.stage(Stage::Analyzing, ANALYZING).await;
    let started = Instant::now();
    let segments = ctx
        .extractor
        .extract(&transcript, job.clip_length, job.keywords.as_deref())
        .await?;
    metrics::record_stage_duration("analyzing", started.elapsed().as_secs_f64());

    Ok(segments
        .into_iter()
        .map(|segment| ClipPlan {
            source: media.video.clone(),
            window: Some(ClipWindow {
                start: segment.start,
                end: segment.end,
            }),
            words: segment.word_timings.clone(),
            caption_offset: segment.start,
            segment,
        })
        .collect())
}

/// Manual projects: every requested window becomes a clip; the oracle only
/// names and grades it.
async fn plan_manual(
    ctx: &ProcessingContext,
    media: &PreparedMedia,
    reporter: &mut JobReporter<'_>,
) -> WorkerResult<Vec<ClipPlan>> {
    reporter.stage(Stage::Transcribing, TRANSCRIBING).await;
    let mut transcripts = Vec::with_capacity(media.clips.len());
    for clip in &media.clips {
        transcripts.push(ctx.transcriber.transcribe(&clip.audio).await?);
    }

    reporter.stage(Stage::Analyzing, ANALYZING).await;
    let mut plans = Vec::with_capacity(media.clips.len());
    for (clip, transcript) in media.clips.iter().zip(transcripts) {
        let clip_metrics = ctx.extractor.describe(&transcript.text).await?;
        let span = ClipWindow {
            start: 0.0,
            end: clip.window.duration(),
        };
        let words = relative_word_timings(&transcript.words, span);

        plans.push(ClipPlan {
            segment: Segment {
                title: clip_metrics.title,
                text: transcript.text,
                transcript: clip_metrics.transcript,
                start: clip.window.start,
                end: clip.window.end,
                word_timings: words.clone(),
                score: clip_metrics.score,
                grades: clip_metrics.grades,
                hashtags: clip_metrics.hashtags,
            },
            source: clip.video.clone(),
            window: None,
            words,
            caption_offset: 0.0,
        });
    }
    Ok(plans)
}

/// Render, upload and announce clip `index`.
async fn publish_clip(
    ctx: &ProcessingContext,
    job: &ClipJob,
    dir: &Path,
    index: usize,
    plan: ClipPlan,
    caption_style: CaptionStyle,
) -> WorkerResult<ClipRecord> {
    let filename = clip_filename(&job.user_id, &job.project_id, &plan.segment.title, job.orientation);
    let output = dir.join(format!("{:02}_{}", index, filename));

    ctx.renderer
        .render(&RenderRequest {
            source: plan.source,
            window: plan.window,
            words: plan.words,
            caption_offset: plan.caption_offset,
            orientation: job.orientation,
            caption_style,
            watermark: job.add_watermark,
            output: output.clone(),
        })
        .await?;

    let key = clip_object_key(&job.user_id, &job.project_id, &filename);
    let url = ctx.artifacts.publish(&output, &key).await?;

    let record = ClipRecord::from_segment(&job.project_id, &plan.segment, url);
    if let Err(e) = ctx.status.clip_ready(&record).await {
        warn!(project_id = %job.project_id, clip = index, error = %e, "Failed to post clip record");
    }
    info!(job_id = %job.job_id, clip = index, key = %key, "Clip published");
    Ok(record)
}

/// Emit a terminal status once per job, even across redeliveries.
async fn finish(
    ctx: &ProcessingContext,
    reporter: &JobReporter<'_>,
    effect: &str,
    status: JobStatus,
    stage: &str,
    progress: u8,
) {
    let key = effect_key(&reporter.job.job_id, effect, None);
    match ctx.ledger.claim(&key).await {
        Ok(true) => reporter.terminal(status, stage, progress).await,
        Ok(false) => {
            debug!(key = %key, "Terminal status already sent");
            metrics::record_effect_skipped(effect);
        }
        Err(e) => {
            warn!(key = %key, error = %e, "Idempotency ledger unavailable, sending status anyway");
            reporter.terminal(status, stage, progress).await;
        }
    }
}
