//! `forgeloop enqueue` — add a task to the durable queue.

use forgeloop_config::AppConfig;
use forgeloop_queue::TaskQueue;

pub async fn run(config: &AppConfig, instruction: String, priority: i64) -> anyhow::Result<()> {
    let queue = TaskQueue::open(&config.queue.path).await?;
    let id = queue
        .enqueue(serde_json::json!({ "instruction": instruction }), priority)
        .await?;

    println!("Enqueued task {id} (priority {priority})");
    Ok(())
}
