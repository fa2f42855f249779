//! End-to-end pipeline runs against in-memory collaborators.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reel_media::ReframeReport;
use reel_models::{
    ClipMetrics, ClipRecord, ClipWindow, Grade, JobStatus, SegmentGrades, StatusUpdate, Transcript,
    WordTiming,
};
use reel_queue::{ClipJob, IdempotencyLedger, MemoryLedger};
use reel_worker::oracle::OracleResult;
use reel_worker::{
    process_job, ArtifactStore, CandidateSegment, ClipRenderer, ExtractionRequest, MediaAcquirer,
    PreparedClip, PreparedMedia, ProcessingContext, ProgressSender, RenderRequest, RetryPolicy,
    SegmentExtractor, SegmentOracle, StatusSink, Transcriber, WorkerError, WorkerResult,
    NO_SEGMENTS_STAGE,
};

/// Words `w0..w{n}`, one every half second.
fn words(n: usize) -> Vec<WordTiming> {
    (0..n)
        .map(|i| {
            let start = i as f64 * 0.5;
            WordTiming::new(format!("w{}", i), start, start + 0.4)
        })
        .collect()
}

fn phrase(from: usize, to: usize) -> String {
    (from..to).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
}

fn grades() -> SegmentGrades {
    SegmentGrades {
        hook: Grade::A,
        flow: Grade::BPlus,
        engagement: Grade::A,
        trend: Grade::B,
    }
}

struct FakeAcquirer;

#[async_trait]
impl MediaAcquirer for FakeAcquirer {
    async fn acquire(&self, job: &ClipJob, work_dir: &Path, progress: ProgressSender) -> WorkerResult<PreparedMedia> {
        for fraction in [0.25, 0.5, 0.2, 1.0] {
            let _ = progress.send(fraction);
        }
        let video = work_dir.join("source.mp4");
        let clips = job
            .clips
            .iter()
            .enumerate()
            .map(|(i, window)| PreparedClip {
                window: *window,
                video: work_dir.join(format!("clip_{:02}.mp4", i)),
                audio: work_dir.join(format!("clip_{:02}.mp3", i)),
            })
            .collect();
        Ok(PreparedMedia {
            title: "Deep Dive: Rust".into(),
            audio: Some(video.with_extension("mp3")),
            video,
            duration: 600.0,
            clips,
        })
    }
}

struct FakeTranscriber {
    words: usize,
    fail: bool,
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(&self, _audio: &Path) -> WorkerResult<Transcript> {
        if self.fail {
            return Err(WorkerError::transcription("service unavailable"));
        }
        Ok(Transcript::from_words(words(self.words)))
    }
}

struct FakeOracle {
    candidates: Vec<CandidateSegment>,
    describes: AtomicUsize,
}

impl FakeOracle {
    fn new(candidates: Vec<CandidateSegment>) -> Self {
        Self {
            candidates,
            describes: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SegmentOracle for FakeOracle {
    async fn propose(&self, _request: &ExtractionRequest) -> OracleResult<Vec<CandidateSegment>> {
        Ok(self.candidates.clone())
    }

    async fn describe(&self, transcript: &str) -> OracleResult<ClipMetrics> {
        let n = self.describes.fetch_add(1, Ordering::SeqCst);
        Ok(ClipMetrics {
            title: format!("Manual {}", n),
            transcript: transcript.to_string(),
            score: 77,
            grades: grades(),
            hashtags: vec!["#manual".into()],
        })
    }
}

fn candidate(title: &str, from: usize, to: usize) -> CandidateSegment {
    CandidateSegment {
        title: title.into(),
        text: phrase(from, to),
        transcript: phrase(from, to),
        score: 90,
        hook: Grade::A,
        flow: Grade::A,
        engagement: Grade::AMinus,
        trend: Grade::BPlus,
        hashtags: vec!["#rust".into()],
    }
}

/// Records requests; fails the render of any title in `fail_titles` while armed.
#[derive(Default)]
struct FakeRenderer {
    requests: Mutex<Vec<RenderRequest>>,
    fail_titles: Mutex<Vec<String>>,
}

#[async_trait]
impl ClipRenderer for FakeRenderer {
    async fn render(&self, request: &RenderRequest) -> WorkerResult<ReframeReport> {
        self.requests.lock().unwrap().push(request.clone());
        let name = request.output.to_string_lossy().to_string();
        if self.fail_titles.lock().unwrap().iter().any(|t| name.contains(t.as_str())) {
            return Err(WorkerError::render("encoder crashed"));
        }
        Ok(ReframeReport::default())
    }
}

#[derive(Default)]
struct FakeArtifacts {
    keys: Mutex<Vec<String>>,
}

#[async_trait]
impl ArtifactStore for FakeArtifacts {
    async fn publish(&self, _path: &Path, key: &str) -> WorkerResult<String> {
        self.keys.lock().unwrap().push(key.to_string());
        Ok(format!("https://signed.example/{}", key))
    }
}

#[derive(Default)]
struct RecordingSink {
    updates: Mutex<Vec<StatusUpdate>>,
    clips: Mutex<Vec<ClipRecord>>,
}

impl RecordingSink {
    fn updates(&self) -> Vec<StatusUpdate> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatusSink for RecordingSink {
    async fn update(&self, update: &StatusUpdate) -> WorkerResult<()> {
        self.updates.lock().unwrap().push(update.clone());
        Ok(())
    }

    async fn clip_ready(&self, record: &ClipRecord) -> WorkerResult<()> {
        self.clips.lock().unwrap().push(record.clone());
        Ok(())
    }
}

struct Harness {
    ctx: ProcessingContext,
    renderer: Arc<FakeRenderer>,
    artifacts: Arc<FakeArtifacts>,
    sink: Arc<RecordingSink>,
    oracle: Arc<FakeOracle>,
    _work: tempfile::TempDir,
}

fn harness(candidates: Vec<CandidateSegment>, transcriber: FakeTranscriber, ledger: Arc<MemoryLedger>) -> Harness {
    let work = tempfile::tempdir().unwrap();
    let renderer = Arc::new(FakeRenderer::default());
    let artifacts = Arc::new(FakeArtifacts::default());
    let sink = Arc::new(RecordingSink::default());
    let oracle = Arc::new(FakeOracle::new(candidates));

    let extractor = SegmentExtractor::new(
        oracle.clone(),
        RetryPolicy::new("oracle", 1, Duration::ZERO),
    );
    let ctx = ProcessingContext {
        acquirer: Arc::new(FakeAcquirer),
        transcriber: Arc::new(transcriber),
        extractor: Arc::new(extractor),
        renderer: renderer.clone(),
        artifacts: artifacts.clone(),
        status: sink.clone(),
        ledger,
        work_dir: PathBuf::from(work.path()),
    };
    Harness {
        ctx,
        renderer,
        artifacts,
        sink,
        oracle,
        _work: work,
    }
}

fn assert_monotonic(updates: &[StatusUpdate]) {
    let processing: Vec<u8> = updates
        .iter()
        .filter(|u| u.status == JobStatus::Processing)
        .map(|u| u.progress)
        .collect();
    assert!(
        processing.windows(2).all(|w| w[0] <= w[1]),
        "progress went backwards: {:?}",
        processing
    );
}

#[tokio::test]
async fn test_auto_job_publishes_aligned_clips() {
    let h = harness(
        vec![candidate("Opening", 0, 20), candidate("Closing", 40, 60)],
        FakeTranscriber { words: 80, fail: false },
        Arc::new(MemoryLedger::new()),
    );
    let job = ClipJob::new("u1", "p1", "https://youtube.com/watch?v=x").with_caption_style("elon");

    let outcome = process_job(&h.ctx, &job).await.unwrap();
    assert_eq!(outcome.clips.len(), 2);
    assert_eq!(outcome.skipped, 0);

    let keys = h.artifacts.keys.lock().unwrap().clone();
    assert_eq!(
        keys,
        vec![
            "u1/p1/u1_p1_Opening_portrait.mp4".to_string(),
            "u1/p1/u1_p1_Closing_portrait.mp4".to_string(),
        ]
    );

    let requests = h.renderer.requests.lock().unwrap().clone();
    let first = &requests[0];
    let window = first.window.unwrap();
    assert_eq!(window.start, 0.0);
    assert!((window.end - (19.0 * 0.5 + 0.4)).abs() < 1e-9);
    assert_eq!(first.caption_offset, window.start);
    assert_eq!(first.words.len(), 20);
    assert_eq!(requests[1].caption_offset, 20.0);

    let clips = h.sink.clips.lock().unwrap().clone();
    assert_eq!(clips[0].s3_uri, "https://signed.example/u1/p1/u1_p1_Opening_portrait.mp4");
    assert_eq!(clips[0].engagement, "A-");

    let updates = h.sink.updates();
    assert_monotonic(&updates);
    assert_eq!(updates.first().map(|u| u.stage.as_str()), Some("downloading"));
    let stages: Vec<&str> = updates.iter().map(|u| u.stage.as_str()).collect();
    for stage in ["transcribing", "analyzing", "generating", "uploading"] {
        assert!(stages.contains(&stage), "missing stage {}", stage);
    }
    let last = updates.last().unwrap();
    assert_eq!(last.status, JobStatus::Completed);
    assert_eq!(last.progress, 100);
    assert_eq!(last.title.as_deref(), Some("Deep Dive: Rust"));
}

#[tokio::test]
async fn test_download_progress_is_forwarded_and_monotonic() {
    let h = harness(vec![], FakeTranscriber { words: 40, fail: false }, Arc::new(MemoryLedger::new()));
    let job = ClipJob::new("u1", "p1", "https://youtube.com/watch?v=x");
    process_job(&h.ctx, &job).await.unwrap();

    let downloading: Vec<u8> = h
        .sink
        .updates()
        .iter()
        .filter(|u| u.stage == "downloading")
        .map(|u| u.progress)
        .collect();
    assert_eq!(downloading.first(), Some(&1));
    assert_eq!(downloading.last(), Some(&15));
    assert!(downloading.iter().all(|p| (1..=15).contains(p)));
    assert_monotonic(&h.sink.updates());
}

#[tokio::test]
async fn test_zero_segments_completes_without_clips() {
    let h = harness(
        vec![candidate("Too short", 0, 5)],
        FakeTranscriber { words: 40, fail: false },
        Arc::new(MemoryLedger::new()),
    );
    let job = ClipJob::new("u1", "p1", "https://youtube.com/watch?v=x");

    let outcome = process_job(&h.ctx, &job).await.unwrap();
    assert!(outcome.clips.is_empty());
    assert!(h.renderer.requests.lock().unwrap().is_empty());

    let last = h.sink.updates().last().cloned().unwrap();
    assert_eq!(last.status, JobStatus::Completed);
    assert_eq!(last.stage, NO_SEGMENTS_STAGE);
    assert_eq!(last.progress, 100);
}

#[tokio::test]
async fn test_stage_error_fails_job_with_zero_progress() {
    let h = harness(
        vec![candidate("Opening", 0, 20)],
        FakeTranscriber { words: 40, fail: true },
        Arc::new(MemoryLedger::new()),
    );
    let job = ClipJob::new("u1", "p1", "https://youtube.com/watch?v=x");

    let err = process_job(&h.ctx, &job).await.unwrap_err();
    assert!(matches!(err, WorkerError::Transcription(_)));

    let updates = h.sink.updates();
    let last = updates.last().unwrap();
    assert_eq!(last.status, JobStatus::Failed);
    assert_eq!(last.progress, 0);
    assert_eq!(last.stage, "failed");
    assert!(last.remaining_estimate.is_none());
    assert_eq!(updates.iter().filter(|u| u.status.is_terminal()).count(), 1);
    assert!(h.sink.clips.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_caption_style_fails_job() {
    let h = harness(vec![], FakeTranscriber { words: 40, fail: false }, Arc::new(MemoryLedger::new()));
    let job = ClipJob::new("u1", "p1", "https://youtube.com/watch?v=x").with_caption_style("comic_sans");

    assert!(process_job(&h.ctx, &job).await.is_err());
    assert_eq!(h.sink.updates().last().unwrap().status, JobStatus::Failed);
}

#[tokio::test]
async fn test_redelivery_does_not_republish_clips() {
    let ledger = Arc::new(MemoryLedger::new());
    let candidates = vec![candidate("Opening", 0, 20), candidate("Closing", 40, 60)];
    let job = ClipJob::new("u1", "p1", "https://youtube.com/watch?v=x");

    let first = harness(candidates.clone(), FakeTranscriber { words: 80, fail: false }, ledger.clone());
    first.renderer.fail_titles.lock().unwrap().push("Closing".into());
    assert!(process_job(&first.ctx, &job).await.is_err());
    assert_eq!(first.artifacts.keys.lock().unwrap().len(), 1);

    let second = harness(candidates, FakeTranscriber { words: 80, fail: false }, ledger.clone());
    let outcome = process_job(&second.ctx, &job).await.unwrap();
    assert_eq!(outcome.skipped, 1);
    assert_eq!(outcome.clips.len(), 1);
    assert_eq!(outcome.clips[0].title, "Closing");
    assert_eq!(
        *second.artifacts.keys.lock().unwrap(),
        vec!["u1/p1/u1_p1_Closing_portrait.mp4".to_string()]
    );
    assert_eq!(second.sink.updates().last().unwrap().status, JobStatus::Completed);

    // A third delivery has nothing left to publish and sends no terminal status.
    let third = harness(vec![candidate("Opening", 0, 20), candidate("Closing", 40, 60)], FakeTranscriber { words: 80, fail: false }, ledger.clone());
    let outcome = process_job(&third.ctx, &job).await.unwrap();
    assert_eq!(outcome.skipped, 2);
    assert!(third.renderer.requests.lock().unwrap().is_empty());
    assert!(third.sink.updates().iter().all(|u| !u.status.is_terminal()));
    assert!(!ledger.claim(&format!("{}:completed", job.job_id)).await.unwrap());
}

#[tokio::test]
async fn test_manual_job_renders_each_window() {
    let h = harness(vec![], FakeTranscriber { words: 30, fail: false }, Arc::new(MemoryLedger::new()));
    let windows = vec![
        ClipWindow::new(10.0, 20.0).unwrap(),
        ClipWindow::new(60.0, 90.0).unwrap(),
    ];
    let job = ClipJob::new("u1", "p1", "s3://uploads/talk.mp4")
        .with_clips(windows)
        .with_caption_style("iman");

    let outcome = process_job(&h.ctx, &job).await.unwrap();
    assert_eq!(outcome.clips.len(), 2);
    assert_eq!(h.oracle.describes.load(Ordering::SeqCst), 2);

    let requests = h.renderer.requests.lock().unwrap().clone();
    for (i, request) in requests.iter().enumerate() {
        assert!(request.window.is_none());
        assert_eq!(request.caption_offset, 0.0);
        assert_eq!(request.source.file_name().unwrap(), format!("clip_{:02}.mp4", i).as_str());
    }
    // The 10 s window keeps only words that end inside it.
    assert!(requests[0].words.iter().all(|w| w.end <= 10.0));
    assert_eq!(requests[0].words.len(), 20);

    let clips = h.sink.clips.lock().unwrap().clone();
    assert_eq!(clips[0].title, "Manual 0");
    assert_eq!(clips[1].hashtags, vec!["#manual".to_string()]);
    assert_monotonic(&h.sink.updates());
}
