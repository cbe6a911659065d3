//! Terminal mode, used when the HTTP bridge is disabled.
//!
//! Announces the node with `Hello from <id>`, then publishes each line
//! typed on stdin. A failed publish is retried once.

use std::io::BufRead;

use chrono::Local;
use tokio::sync::{mpsc, watch};

use alertmesh_network::RoomPublisher;
use alertmesh_protocol::message::log_line;

use crate::http::SELF_NICK;
use crate::message_log::MessageLog;

const STDIN_BUFFER: usize = 16;

/// Reads stdin until EOF or shutdown.
pub async fn run(publisher: RoomPublisher, log: MessageLog, shutdown: watch::Receiver<bool>) {
    run_lines(spawn_stdin_reader(), publisher, log, shutdown).await
}

/// Forwards stdin lines from a plain thread; a blocked read must not
/// hold up runtime shutdown.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(STDIN_BUFFER);
    let spawned = std::thread::Builder::new()
        .name("alertmesh-stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.blocking_send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(%e, "failed to read terminal input");
                        break;
                    }
                }
            }
        });
    if let Err(e) = spawned {
        tracing::error!(%e, "failed to start terminal reader");
    }
    rx
}

/// Publishes the greeting and then every non-empty line received.
pub async fn run_lines(
    mut lines: mpsc::Receiver<String>,
    publisher: RoomPublisher,
    log: MessageLog,
    mut shutdown: watch::Receiver<bool>,
) {
    println!("Sending test message...");
    let greeting = format!("Hello from {}", publisher.local());
    send(&publisher, &log, &greeting).await;

    if *shutdown.borrow() {
        return;
    }

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            line = lines.recv() => match line {
                Some(line) => {
                    let body = line.trim_end_matches('\r');
                    if body.trim().is_empty() {
                        continue;
                    }
                    send(&publisher, &log, body).await;
                }
                None => {
                    tracing::debug!("terminal input closed");
                    break;
                }
            },
        }
    }
}

async fn send(publisher: &RoomPublisher, log: &MessageLog, body: &str) {
    if let Err(e) = log.append(log_line(&Local::now(), SELF_NICK, body)) {
        tracing::warn!(%e, "failed to record sent message");
    }

    if let Err(first) = publisher.publish(body).await {
        tracing::debug!(%first, "publish failed, retrying once");
        println!("Sending message failed trying again...");
        if let Err(e) = publisher.publish(body).await {
            tracing::warn!(%e, "publish failed after retry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::testing::{join, node_id, TestBroadcast};

    async fn feed(lines: &[&str]) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(lines.len().max(1));
        for line in lines {
            let _ = tx.send((*line).to_string()).await;
        }
        rx
    }

    #[tokio::test]
    async fn greets_then_publishes_each_line() {
        let engine = Arc::new(TestBroadcast::default());
        let (publisher, _messages) = join(engine.clone()).await;
        let log = MessageLog::new();
        let (_tx, shutdown) = watch::channel(false);

        let input = feed(&["first", "", "   ", "second\r"]).await;
        run_lines(input, publisher, log.clone(), shutdown).await;

        let greeting = format!("Hello from {}", node_id(1));
        assert_eq!(
            engine.published_bodies(),
            vec![greeting, "first".to_string(), "second".to_string()]
        );
        assert_eq!(log.len(), 3);
    }

    #[tokio::test]
    async fn failed_publish_is_retried_once() {
        let engine = Arc::new(TestBroadcast::failing(1));
        let (publisher, _messages) = join(engine.clone()).await;
        let (_tx, shutdown) = watch::channel(false);

        run_lines(feed(&[]).await, publisher, MessageLog::new(), shutdown).await;

        assert_eq!(engine.published_bodies().len(), 1);
    }

    #[tokio::test]
    async fn second_failure_gives_up() {
        let engine = Arc::new(TestBroadcast::failing(2));
        let (publisher, _messages) = join(engine.clone()).await;
        let (_tx, shutdown) = watch::channel(false);

        run_lines(feed(&["next"]).await, publisher, MessageLog::new(), shutdown).await;

        assert_eq!(engine.published_bodies(), vec!["next".to_string()]);
    }

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn stops_on_shutdown() {
        let engine = Arc::new(TestBroadcast::default());
        let (publisher, _messages) = join(engine).await;
        let (tx, shutdown) = watch::channel(false);

        let (_keep_open, lines) = mpsc::channel(1);
        let terminal = run_lines(lines, publisher, MessageLog::new(), shutdown);
        assert_send(&terminal);
        let task = tokio::spawn(terminal);

        let _ = tx.send(true);
        let finished = tokio::time::timeout(Duration::from_secs(5), task).await;
        assert!(finished.is_ok());
    }
}
