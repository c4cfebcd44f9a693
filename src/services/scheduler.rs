//! Background dispatch loop.
//!
//! One task owns the loop. On every tick it publishes all due posts, at most
//! `max_concurrent_posts` at a time; a nudge (sent when a post is created)
//! publishes that one post straight away if it is already due. Duplicate
//! work is harmless: `claim` lets exactly one attempt through.

use crate::services::{post_service::PostService, publisher_manager::PublisherManager};
use chrono::Utc;
use futures::{StreamExt, stream};
use std::time::Duration;
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

const NUDGE_BUFFER: usize = 256;

#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    pub poll_interval: Duration,
    pub max_concurrent_posts: usize,
}

/// Cloneable handle for asking the scheduler to look at a post now.
#[derive(Clone, Debug)]
pub struct DispatchHandle {
    tx: mpsc::Sender<i64>,
}

impl DispatchHandle {
    /// Never blocks. A full or closed channel is ignored; the next tick
    /// picks the post up.
    pub fn nudge(&self, post_id: i64) {
        match self.tx.try_send(post_id) {
            Ok(()) => debug!(post_id, "nudged scheduler"),
            Err(TrySendError::Full(_)) => debug!(post_id, "dispatch queue full, leaving post for next tick"),
            Err(TrySendError::Closed(_)) => debug!(post_id, "scheduler stopped, nudge dropped"),
        }
    }

    /// A handle whose nudges go nowhere.
    #[cfg(test)]
    pub fn detached() -> Self {
        let (tx, _rx) = mpsc::channel(1);
        Self { tx }
    }
}

pub struct Scheduler;

impl Scheduler {
    pub fn start(
        manager: PublisherManager,
        posts: PostService,
        config: SchedulerConfig,
        cancel: CancellationToken,
    ) -> (DispatchHandle, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<i64>(NUDGE_BUFFER);

        let task = tokio::spawn(async move {
            let mut ticker = interval(config.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                "[Scheduler] Background engine started (every {:?}, up to {} posts at once)",
                config.poll_interval, config.max_concurrent_posts
            );

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        run_due_posts(&manager, &posts, config.max_concurrent_posts).await;
                    }
                    Some(post_id) = rx.recv() => {
                        run_post(&manager, post_id).await;
                    }
                }
            }
            info!("[Scheduler] Background engine stopped.");
        });

        (DispatchHandle { tx }, task)
    }
}

async fn run_due_posts(manager: &PublisherManager, posts: &PostService, limit: usize) {
    let due = match posts.due_post_ids(Utc::now()).await {
        Ok(ids) => ids,
        Err(err) => {
            error!("[Scheduler] Could not list due posts: {}", err);
            return;
        }
    };
    if due.is_empty() {
        return;
    }
    info!("[Scheduler] {} post(s) due", due.len());

    stream::iter(due)
        .for_each_concurrent(limit.max(1), |post_id| run_post(manager, post_id))
        .await;
}

async fn run_post(manager: &PublisherManager, post_id: i64) {
    if let Err(err) = manager.process_post(post_id).await {
        error!(post_id, "[Scheduler] Post could not be processed: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{platform::Platform, post::PostStatus},
        services::publisher_manager::testing::{harness, slow_harness},
    };

    async fn wait_for_status(posts: &PostService, id: i64, want: PostStatus) {
        for _ in 0..200 {
            let (post, _) = posts.get_post(id).await.unwrap();
            if post.status == want {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("post {} never reached {}", id, want);
    }

    #[tokio::test]
    async fn tick_publishes_due_posts() {
        let h = harness(&[]).await;
        h.connect(Platform::Youtube).await;
        let a = h.schedule(&["youtube"], "clips/launch.mp4").await;
        let b = h.schedule(&["youtube"], "clips/launch.mp4").await;

        let cancel = CancellationToken::new();
        let (_handle, task) = Scheduler::start(
            h.manager.clone(),
            h.posts.clone(),
            SchedulerConfig {
                poll_interval: Duration::from_millis(20),
                max_concurrent_posts: 2,
            },
            cancel.clone(),
        );

        wait_for_status(&h.posts, a, PostStatus::Completed).await;
        wait_for_status(&h.posts, b, PostStatus::Completed).await;
        cancel.cancel();
        task.await.unwrap();
        assert_eq!(h.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn tick_caps_posts_in_flight() {
        let h = slow_harness(&[], Duration::from_millis(100)).await;
        h.connect(Platform::Youtube).await;
        let mut ids = Vec::new();
        for _ in 0..5 {
            ids.push(h.schedule(&["youtube"], "clips/launch.mp4").await);
        }

        let cancel = CancellationToken::new();
        let (_handle, task) = Scheduler::start(
            h.manager.clone(),
            h.posts.clone(),
            SchedulerConfig {
                poll_interval: Duration::from_secs(3600),
                max_concurrent_posts: 2,
            },
            cancel.clone(),
        );

        for id in ids {
            wait_for_status(&h.posts, id, PostStatus::Completed).await;
        }
        cancel.cancel();
        task.await.unwrap();
        assert_eq!(h.in_flight.peak(), 2);
        assert_eq!(h.seen.lock().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn nudge_publishes_without_waiting_for_tick() {
        let h = harness(&[]).await;
        h.connect(Platform::Youtube).await;

        let cancel = CancellationToken::new();
        let (handle, task) = Scheduler::start(
            h.manager.clone(),
            h.posts.clone(),
            SchedulerConfig {
                poll_interval: Duration::from_secs(3600),
                max_concurrent_posts: 1,
            },
            cancel.clone(),
        );

        // let the immediate first tick pass with an empty queue
        tokio::time::sleep(Duration::from_millis(50)).await;
        let id = h.schedule(&["youtube"], "clips/launch.mp4").await;
        handle.nudge(id);

        wait_for_status(&h.posts, id, PostStatus::Completed).await;
        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn nudge_after_shutdown_is_ignored() {
        let h = harness(&[]).await;
        let cancel = CancellationToken::new();
        let (handle, task) = Scheduler::start(
            h.manager.clone(),
            h.posts.clone(),
            SchedulerConfig {
                poll_interval: Duration::from_secs(3600),
                max_concurrent_posts: 1,
            },
            cancel.clone(),
        );
        cancel.cancel();
        task.await.unwrap();

        handle.nudge(1);
        DispatchHandle::detached().nudge(2);
    }
}
