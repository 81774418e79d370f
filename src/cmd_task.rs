//! One-shot task subcommand handlers for relayq.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::info;

use relayq_queue::{QueueName, RelayQueue, Task};
use relayq_store::{Clock, SystemClock};

/// Parse a JSON object payload into a task.
pub(crate) fn parse_payload(payload: &str) -> Result<Task, Box<dyn std::error::Error>> {
    let value: serde_json::Value = serde_json::from_str(payload)?;
    Ok(Task::from_value(value)?)
}

/// Resolve `--delay-ms` / `--at` into an absolute due time in epoch millis.
pub(crate) fn due_time(
    now_ms: i64,
    delay_ms: Option<u64>,
    at: Option<&str>,
) -> Result<i64, Box<dyn std::error::Error>> {
    match (delay_ms, at) {
        (Some(delay), _) => Ok(now_ms.saturating_add(i64::try_from(delay)?)),
        (None, Some(at)) => {
            let when: DateTime<Utc> = DateTime::parse_from_rfc3339(at)?.with_timezone(&Utc);
            Ok(when.timestamp_millis())
        }
        (None, None) => Ok(now_ms),
    }
}

pub(crate) async fn push(queue: &RelayQueue, payload: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut task = parse_payload(payload)?;
    let task_ref = queue.push(&mut task).await?;
    info!("Pushed task {}", task_ref);
    println!("{}", task_ref);
    Ok(())
}

pub(crate) async fn defer(
    queue: &RelayQueue,
    payload: &str,
    delay_ms: Option<u64>,
    at: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut task = parse_payload(payload)?;
    let when_ms = due_time(SystemClock.now_ms(), delay_ms, at)?;
    let task_ref = queue.defer(&mut task, when_ms).await?;
    info!("Deferred task {} until {}", task_ref, when_ms);
    println!("{}", task_ref);
    Ok(())
}

pub(crate) async fn recur(
    queue: &RelayQueue,
    payload: &str,
    every_ms: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut task = parse_payload(payload)?;
    let task_ref = queue
        .recur(&mut task, Duration::from_millis(every_ms))
        .await?;
    info!("Scheduled task {} every {}ms", task_ref, every_ms);
    println!("{}", task_ref);
    Ok(())
}

pub(crate) async fn undefer(
    queue: &RelayQueue,
    task_ref: &str,
    now: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let moved = if now {
        queue.undefer_push(task_ref).await?
    } else {
        queue.undefer_remove(task_ref).await?
    };
    if moved == 0 {
        println!("{} is not deferred", task_ref);
    } else if now {
        println!("{} pushed to todo", task_ref);
    } else {
        println!("{} removed", task_ref);
    }
    Ok(())
}

pub(crate) async fn unrecur(queue: &RelayQueue, task_ref: &str) -> Result<(), Box<dyn std::error::Error>> {
    if queue.unrecur_remove(task_ref).await? == 0 {
        println!("{} is not recurring", task_ref);
    } else {
        println!("{} removed", task_ref);
    }
    Ok(())
}

pub(crate) async fn remove(
    queue: &RelayQueue,
    from: QueueName,
    task_ref: &str,
    keep_storage: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let removed = queue.remove(from, task_ref, keep_storage).await?;
    println!("Removed {} occurrence(s) of {} from {}", removed, task_ref, from);
    Ok(())
}

pub(crate) async fn show(queue: &RelayQueue, task_ref: &str) -> Result<(), Box<dyn std::error::Error>> {
    match queue.get(task_ref).await? {
        Some(task) => println!("{}", serde_json::to_string_pretty(&task)?),
        None => println!("No stored task for {}", task_ref),
    }
    Ok(())
}

pub(crate) async fn list(queue: &RelayQueue, name: QueueName) -> Result<(), Box<dyn std::error::Error>> {
    let refs = queue.list(name).await?;
    if refs.is_empty() {
        println!("{} is empty.", name);
        return Ok(());
    }
    for task_ref in refs {
        println!("{}", task_ref);
    }
    Ok(())
}

pub(crate) async fn stats(queue: &RelayQueue, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let counts = queue.counts().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&counts)?);
        return Ok(());
    }

    println!("{:<12} {}", "QUEUE", "SIZE");
    println!("{}", "-".repeat(20));
    println!("{:<12} {}", "todo", counts.todo);
    println!("{:<12} {}", "doing", counts.doing);
    println!("{:<12} {}", "failed", counts.failed);
    if queue.config().finish_mode.has_done_queue() {
        println!("{:<12} {}", "done", counts.done);
    }
    if queue.deferred().is_some() {
        println!("{:<12} {}", "deferred", counts.deferred);
    }
    if queue.recurring().is_some() {
        println!("{:<12} {}", "recurring", counts.recurring);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_payload_object() {
        let task = parse_payload(r#"{"kind": "mail", "to": ["a@b"]}"#).unwrap();
        assert_eq!(task.len(), 2);
    }

    #[test]
    fn test_parse_payload_rejects_non_object() {
        assert!(parse_payload("[1, 2]").is_err());
        assert!(parse_payload("not json").is_err());
    }

    #[test]
    fn test_due_time_from_delay() {
        assert_eq!(due_time(1_000, Some(250), None).unwrap(), 1_250);
    }

    #[test]
    fn test_due_time_from_rfc3339() {
        let due = due_time(0, None, Some("2030-01-01T00:00:00Z")).unwrap();
        assert_eq!(due, 1_893_456_000_000);
    }

    #[test]
    fn test_due_time_defaults_to_now() {
        assert_eq!(due_time(42, None, None).unwrap(), 42);
    }

    #[test]
    fn test_due_time_rejects_bad_timestamp() {
        assert!(due_time(0, None, Some("tomorrow")).is_err());
    }
}
