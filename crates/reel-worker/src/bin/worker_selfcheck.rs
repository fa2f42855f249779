use std::path::Path;

use reel_media::{check_ffmpeg, check_ffprobe, check_ytdlp};
use reel_ml_client::DetectorClient;
use reel_queue::JobQueue;
use reel_storage::ObjectStore;
use reel_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;
    dotenvy::dotenv().ok();

    let config = WorkerConfig::from_env();

    println!(
        "worker-selfcheck: starting with work_dir={}",
        config.work_dir.display()
    );
    ensure_workdir(&config.work_dir).await?;
    ensure_binaries()?;
    ensure_env_present(&["REDIS_URL", "ANTHROPIC_API_KEY", "DEEPGRAM_API_KEY", "S3_BUCKET_NAME"])?;
    ensure_redis().await?;
    ensure_storage().await?;
    ensure_detector().await?;

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_workdir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path).await?;
    Ok(())
}

fn ensure_binaries() -> anyhow::Result<()> {
    let checks = [
        ("ffmpeg", check_ffmpeg()),
        ("ffprobe", check_ffprobe()),
        ("yt-dlp", check_ytdlp()),
    ];
    for (name, found) in checks {
        let path = found.map_err(|e| anyhow::anyhow!("{} not available: {}", name, e))?;
        println!("worker-selfcheck: {} at {}", name, path.display());
    }
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).is_err() {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}

async fn ensure_redis() -> anyhow::Result<()> {
    let queue = JobQueue::from_env()?;
    queue.ping().await?;
    println!("worker-selfcheck: redis reachable");
    Ok(())
}

async fn ensure_storage() -> anyhow::Result<()> {
    let store = ObjectStore::from_env()?;
    store.check_connectivity().await?;
    println!("worker-selfcheck: bucket {} reachable", store.bucket());
    Ok(())
}

async fn ensure_detector() -> anyhow::Result<()> {
    let client = DetectorClient::from_env()?;
    if !client.health_check().await? {
        return Err(anyhow::anyhow!("face detector reports unhealthy"));
    }
    println!("worker-selfcheck: face detector healthy");
    Ok(())
}
