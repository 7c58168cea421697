use std::path::Path;

use reelcut_media::{check_ffmpeg, check_ffprobe};
use reelcut_worker::{JobStoreKind, StorageBackend, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();

    println!(
        "reelcut-selfcheck: starting with work_dir={}",
        config.work_dir.display()
    );
    ensure_dir(&config.work_dir).await?;

    let ffmpeg = check_ffmpeg().map_err(|e| anyhow::anyhow!("ffmpeg not available: {}", e))?;
    let ffprobe = check_ffprobe().map_err(|e| anyhow::anyhow!("ffprobe not available: {}", e))?;
    println!("reelcut-selfcheck: ffmpeg={} ffprobe={}", ffmpeg.display(), ffprobe.display());

    ensure_env_present(&["REDIS_URL"])?;
    match config.storage_backend {
        StorageBackend::Local => ensure_dir(&config.storage_local_root).await?,
        StorageBackend::R2 => ensure_env_present(&[
            "R2_ENDPOINT_URL",
            "R2_ACCESS_KEY_ID",
            "R2_SECRET_ACCESS_KEY",
            "R2_BUCKET_NAME",
        ])?,
    }
    if config.job_store == JobStoreKind::Memory {
        println!("reelcut-selfcheck: warning: JOB_STORE=memory keeps job records in-process only");
    }

    println!("reelcut-selfcheck: ok");
    Ok(())
}

async fn ensure_dir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| anyhow::anyhow!("cannot create {}: {}", path.display(), e))?;
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
