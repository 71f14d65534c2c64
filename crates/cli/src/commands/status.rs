//! `forgeloop status` — show queue status.

use forgeloop_config::AppConfig;
use forgeloop_queue::TaskQueue;

pub async fn run(config: &AppConfig) -> anyhow::Result<()> {
    let queue = TaskQueue::open(&config.queue.path).await?;
    let pending = queue.pending_count().await?;

    println!("Queue:   {}", config.queue.path);
    println!("Pending: {pending}");
    Ok(())
}
