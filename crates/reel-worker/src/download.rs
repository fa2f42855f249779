//! Source acquisition: proxied download with retry, then trim and audio extraction.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reel_media::{cut_video, extract_audio, fetch_source, fetch_title, probe_video, FetchRequest};
use reel_models::{ClipWindow, ProjectType, VideoQuality};
use reel_queue::ClipJob;
use reel_storage::{ObjectRef, ObjectStore};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::proxy::{ProxyEndpoint, ProxyPool};
use crate::retry::RetryPolicy;

/// Lightweight endpoint used to check a proxy before downloading through it.
pub const PROBE_URL: &str = "https://ipv4.icanhazip.com";
const PROBE_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const PROBE_TIMEOUT: Duration = Duration::from_secs(15);

/// Download progress as a fraction in `0.0..=1.0`.
pub type ProgressSender = UnboundedSender<f64>;

/// Network side of a download.
#[async_trait]
pub trait DownloadBackend: Send + Sync {
    /// Check that `proxy` can reach the internet.
    async fn probe(&self, proxy: &ProxyEndpoint) -> WorkerResult<()>;

    /// Fetch `source` into `dest`.
    async fn fetch(
        &self,
        source: &str,
        proxy: Option<&ProxyEndpoint>,
        quality: VideoQuality,
        dest: &Path,
        progress: &ProgressSender,
    ) -> WorkerResult<()>;

    /// Resolve a display title for `source`.
    async fn title(&self, source: &str, proxy: Option<&ProxyEndpoint>) -> WorkerResult<String>;
}

/// yt-dlp downloads with a reqwest connectivity probe.
#[derive(Debug, Default, Clone)]
pub struct YtDlpBackend;

impl YtDlpBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DownloadBackend for YtDlpBackend {
    async fn probe(&self, proxy: &ProxyEndpoint) -> WorkerResult<()> {
        let proxy_cfg = reqwest::Proxy::all(proxy.proxy_url())
            .map_err(|e| WorkerError::download(format!("invalid proxy {}: {}", proxy, e)))?;
        let client = reqwest::Client::builder()
            .proxy(proxy_cfg)
            .connect_timeout(PROBE_CONNECT_TIMEOUT)
            .timeout(PROBE_TIMEOUT)
            .build()
            .map_err(|e| WorkerError::download(format!("probe client: {}", e)))?;

        let response = client
            .get(PROBE_URL)
            .send()
            .await
            .map_err(|e| WorkerError::download(format!("proxy probe failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(WorkerError::download(format!(
                "proxy probe returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn fetch(
        &self,
        source: &str,
        proxy: Option<&ProxyEndpoint>,
        quality: VideoQuality,
        dest: &Path,
        progress: &ProgressSender,
    ) -> WorkerResult<()> {
        let proxy_url = proxy.map(|p| p.proxy_url());
        let request = FetchRequest {
            url: source,
            dest,
            quality,
            proxy: proxy_url.as_deref(),
        };
        fetch_source(&request, |fraction| {
            let _ = progress.send(fraction);
        })
        .await
        .map_err(|e| WorkerError::download(e.to_string()))
    }

    async fn title(&self, source: &str, proxy: Option<&ProxyEndpoint>) -> WorkerResult<String> {
        let proxy_url = proxy.map(|p| p.proxy_url());
        fetch_title(source, proxy_url.as_deref())
            .await
            .map_err(|e| WorkerError::download(e.to_string()))
    }
}

/// A clip window cut from the source for a manual project.
#[derive(Debug, Clone)]
pub struct PreparedClip {
    pub window: ClipWindow,
    pub video: PathBuf,
    pub audio: PathBuf,
}

/// Local media ready for transcription and rendering.
#[derive(Debug, Clone)]
pub struct PreparedMedia {
    pub title: String,
    /// Source video, already trimmed when the job asked for it
    pub video: PathBuf,
    /// Audio of `video`; only extracted for auto projects
    pub audio: Option<PathBuf>,
    /// Duration of `video` in seconds
    pub duration: f64,
    /// Manual projects: one cut per requested window, in request order
    pub clips: Vec<PreparedClip>,
}

/// Produces the local media a job works on.
#[async_trait]
pub trait MediaAcquirer: Send + Sync {
    async fn acquire(
        &self,
        job: &ClipJob,
        work_dir: &Path,
        progress: ProgressSender,
    ) -> WorkerResult<PreparedMedia>;
}

/// Failed attempt, remembering which proxy it went through.
#[derive(Debug)]
struct AttemptError {
    proxy: Option<ProxyEndpoint>,
    error: WorkerError,
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.proxy {
            Some(proxy) => write!(f, "{} (via {})", self.error, proxy),
            None => write!(f, "{}", self.error),
        }
    }
}

/// Fetches sources through the proxy pool and prepares them for the pipeline.
pub struct DownloadManager {
    backend: Arc<dyn DownloadBackend>,
    proxies: Arc<ProxyPool>,
    retry: RetryPolicy,
    objects: Option<Arc<ObjectStore>>,
}

impl DownloadManager {
    pub fn new(backend: Arc<dyn DownloadBackend>, proxies: Arc<ProxyPool>, retry: RetryPolicy) -> Self {
        Self {
            backend,
            proxies,
            retry,
            objects: None,
        }
    }

    /// Enable `s3://` sources.
    pub fn with_object_store(mut self, objects: Arc<ObjectStore>) -> Self {
        self.objects = Some(objects);
        self
    }

    /// Download a web source to `dest`.
    ///
    /// Every attempt picks a random proxy, probes it and downloads through
    /// it. A failed attempt marks the proxy and waits before the next one;
    /// running out of attempts is a terminal download error.
    pub async fn download(
        &self,
        source: &str,
        quality: VideoQuality,
        dest: &Path,
        progress: &ProgressSender,
    ) -> WorkerResult<()> {
        let proxies = &self.proxies;
        let backend = &self.backend;

        let result = self
            .retry
            .run_with(
                |attempt| async move {
                    let proxy = proxies.choose();
                    let outcome = async {
                        if let Some(p) = &proxy {
                            backend.probe(p).await?;
                        }
                        backend.fetch(source, proxy.as_ref(), quality, dest, progress).await
                    }
                    .await;

                    match outcome {
                        Ok(()) => {
                            info!(attempt, "Download succeeded");
                            metrics::record_download_attempt("success");
                            Ok(())
                        }
                        Err(error) => {
                            metrics::record_download_attempt("failure");
                            Err(AttemptError { proxy, error })
                        }
                    }
                },
                |attempt, failure| {
                    warn!(attempt, "Download attempt failed: {}", failure);
                    if let Some(proxy) = &failure.proxy {
                        proxies.mark_failed(proxy, attempt, &failure.error.to_string());
                    }
                },
            )
            .await;

        result.map_failure(|failure, attempts| {
            WorkerError::download(format!("{} after {} attempts", failure.error, attempts))
        })
    }

    /// Download an uploaded object, then delete it from the bucket.
    async fn download_object(&self, object: &ObjectRef, dest: &Path) -> WorkerResult<()> {
        let objects = self
            .objects
            .as_ref()
            .ok_or_else(|| WorkerError::download("object-store sources are not configured"))?;

        objects
            .download(object, dest)
            .await
            .map_err(|e| WorkerError::download(e.to_string()))?;

        if let Err(e) = objects.delete(object).await {
            warn!(object = %object, "Failed to delete uploaded source: {}", e);
        }
        Ok(())
    }

    async fn resolve_title(&self, job: &ClipJob) -> String {
        if let Some(title) = job.title.as_deref().filter(|t| !t.trim().is_empty()) {
            return title.to_string();
        }
        if let Ok(object) = ObjectRef::parse(&job.source) {
            return object
                .file_name()
                .rsplit_once('.')
                .map(|(stem, _)| stem.to_string())
                .unwrap_or_else(|| object.file_name().to_string());
        }
        match self.backend.title(&job.source, self.proxies.choose().as_ref()).await {
            Ok(title) => title,
            Err(e) => {
                warn!(source = %job.source, "Could not resolve title: {}", e);
                "Untitled".to_string()
            }
        }
    }
}

#[async_trait]
impl MediaAcquirer for DownloadManager {
    async fn acquire(
        &self,
        job: &ClipJob,
        work_dir: &Path,
        progress: ProgressSender,
    ) -> WorkerResult<PreparedMedia> {
        let started = Instant::now();
        let title = self.resolve_title(job).await;
        let source_path = work_dir.join("source.mp4");

        if ObjectRef::is_object_uri(&job.source) {
            let object = ObjectRef::parse(&job.source)?;
            self.download_object(&object, &source_path).await?;
            let _ = progress.send(1.0);
        } else {
            self.download(&job.source, job.quality, &source_path, &progress).await?;
        }
        metrics::record_stage_duration("downloading", started.elapsed().as_secs_f64());

        let trim = match job.project_type {
            ProjectType::Auto => job.trim,
            ProjectType::Manual => None,
        };
        let mut media = prepare_media(&source_path, trim, job.project_type == ProjectType::Auto).await?;
        media.title = title;

        if job.project_type == ProjectType::Manual {
            media.clips = prepare_clips(&media.video, &job.clips).await?;
        }
        Ok(media)
    }
}

/// Cut the optional trim window and extract the audio track.
pub async fn prepare_media(
    video: &Path,
    trim: Option<ClipWindow>,
    with_audio: bool,
) -> WorkerResult<PreparedMedia> {
    let video = match trim {
        Some(window) => {
            let trimmed = video.with_file_name("source_cut.mp4");
            cut_video(video, &trimmed, window).await?;
            trimmed
        }
        None => video.to_path_buf(),
    };

    let audio = if with_audio {
        Some(extract_audio(&video).await?)
    } else {
        None
    };
    let duration = probe_video(&video).await?.duration;

    Ok(PreparedMedia {
        title: String::new(),
        video,
        audio,
        duration,
        clips: Vec::new(),
    })
}

/// Cut one sub-clip and its audio per window.
pub async fn prepare_clips(video: &Path, windows: &[ClipWindow]) -> WorkerResult<Vec<PreparedClip>> {
    let mut clips = Vec::with_capacity(windows.len());
    for (i, window) in windows.iter().enumerate() {
        let clip_path = video.with_file_name(format!("clip_{:02}.mp4", i));
        cut_video(video, &clip_path, *window).await?;
        let audio = extract_audio(&clip_path).await?;
        clips.push(PreparedClip {
            window: *window,
            video: clip_path,
            audio,
        });
    }
    Ok(clips)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Backend whose probe or fetch fails a scripted number of times.
    #[derive(Default)]
    struct FlakyBackend {
        probe_failures: u32,
        fetch_failures: u32,
        probes: AtomicU32,
        fetches: AtomicU32,
        proxies_seen: Mutex<Vec<Option<String>>>,
    }

    #[async_trait]
    impl DownloadBackend for FlakyBackend {
        async fn probe(&self, _proxy: &ProxyEndpoint) -> WorkerResult<()> {
            let n = self.probes.fetch_add(1, Ordering::SeqCst);
            if n < self.probe_failures {
                return Err(WorkerError::download("probe timed out"));
            }
            Ok(())
        }

        async fn fetch(
            &self,
            _source: &str,
            proxy: Option<&ProxyEndpoint>,
            _quality: VideoQuality,
            dest: &Path,
            progress: &ProgressSender,
        ) -> WorkerResult<()> {
            self.proxies_seen
                .lock()
                .unwrap()
                .push(proxy.map(|p| p.host.clone()));
            let n = self.fetches.fetch_add(1, Ordering::SeqCst);
            if n < self.fetch_failures {
                return Err(WorkerError::download("HTTP 403"));
            }
            let _ = progress.send(1.0);
            std::fs::write(dest, b"video").map_err(WorkerError::from)
        }

        async fn title(&self, _source: &str, _proxy: Option<&ProxyEndpoint>) -> WorkerResult<String> {
            Ok("A Talk".to_string())
        }
    }

    fn manager(backend: Arc<FlakyBackend>, proxies: Vec<ProxyEndpoint>) -> DownloadManager {
        DownloadManager::new(
            backend,
            Arc::new(ProxyPool::new(proxies)),
            RetryPolicy::new("download", 3, Duration::from_millis(1)),
        )
    }

    fn channel() -> ProgressSender {
        tokio::sync::mpsc::unbounded_channel().0
    }

    #[tokio::test]
    async fn test_three_failures_are_terminal() {
        let backend = Arc::new(FlakyBackend {
            fetch_failures: u32::MAX,
            ..Default::default()
        });
        let dir = tempfile::tempdir().unwrap();
        let dm = manager(backend.clone(), vec![ProxyEndpoint::new("10.0.0.1", 8080)]);

        let err = dm
            .download("https://example.com/v", VideoQuality::P720, &dir.path().join("v.mp4"), &channel())
            .await
            .unwrap_err();

        assert!(matches!(err, WorkerError::Download(_)));
        assert_eq!(backend.fetches.load(Ordering::SeqCst), 3);
        assert_eq!(backend.probes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_probe_failure_counts_as_attempt() {
        let backend = Arc::new(FlakyBackend {
            probe_failures: 2,
            ..Default::default()
        });
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("v.mp4");
        let dm = manager(backend.clone(), vec![ProxyEndpoint::new("10.0.0.1", 8080)]);

        dm.download("https://example.com/v", VideoQuality::P720, &dest, &channel())
            .await
            .unwrap();

        assert_eq!(backend.probes.load(Ordering::SeqCst), 3);
        assert_eq!(backend.fetches.load(Ordering::SeqCst), 1);
        assert!(dest.exists());
    }

    #[tokio::test]
    async fn test_empty_pool_downloads_directly() {
        let backend = Arc::new(FlakyBackend::default());
        let dir = tempfile::tempdir().unwrap();
        let dm = manager(backend.clone(), Vec::new());

        dm.download("https://example.com/v", VideoQuality::P360, &dir.path().join("v.mp4"), &channel())
            .await
            .unwrap();

        assert_eq!(backend.probes.load(Ordering::SeqCst), 0);
        assert_eq!(*backend.proxies_seen.lock().unwrap(), vec![None]);
    }

    #[tokio::test]
    async fn test_title_prefers_job_title() {
        let dm = manager(Arc::new(FlakyBackend::default()), Vec::new());
        let job = ClipJob::new("u", "p", "https://example.com/v").with_title("Given");
        assert_eq!(dm.resolve_title(&job).await, "Given");

        let job = ClipJob::new("u", "p", "s3://bucket/uploads/interview.mov");
        assert_eq!(dm.resolve_title(&job).await, "interview");

        let job = ClipJob::new("u", "p", "https://example.com/v");
        assert_eq!(dm.resolve_title(&job).await, "A Talk");
    }

    #[test]
    fn test_attempt_error_names_proxy() {
        let failure = AttemptError {
            proxy: Some(ProxyEndpoint::new("10.0.0.9", 3128)),
            error: WorkerError::download("HTTP 403"),
        };
        assert_eq!(failure.to_string(), "Download failed: HTTP 403 (via 10.0.0.9:3128)");
    }
}
