//! Task lookup and completion polling.
//!
//! Write operations return a [`TaskInfo`](crate::types::TaskInfo) whose
//! `task_uid` can be awaited here. The poller checks once immediately, then
//! on a fixed interval until the task leaves the `enqueued`/`processing`
//! states. Fetch failures are returned as-is; retries of individual fetches
//! belong to the executor's [`RetryPolicy`](crate::client::RetryPolicy).

use super::fetch::SearchClient;
use crate::error::{Error, ErrorKind, Result};
use crate::types::{Request, Task};
use std::future::Future;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Poll interval used when none (or zero) is given.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

impl SearchClient {
    /// Fetch a task by id (`GET /tasks/{uid}`).
    pub async fn get_task(&self, task_uid: u64) -> Result<Task> {
        self.execute(
            Request::get(task_path(task_uid))
                .with_accepted_status([200])
                .with_function("get_task"),
        )
        .await
    }

    /// Wait until the task is no longer pending.
    pub async fn wait_for_task(&self, task_uid: u64, interval: Option<Duration>) -> Result<Task> {
        self.poll_task(task_uid, interval, std::future::pending::<()>(), ErrorKind::Cancelled)
            .await
    }

    /// Wait until the task is no longer pending or `cancel` completes.
    ///
    /// Cancellation wins over a fetch that finishes at the same time: once
    /// `cancel` has fired, no task is returned. The error kind is
    /// [`ErrorKind::Cancelled`].
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use docsearch_http::SearchClient;
    /// use tokio::sync::oneshot;
    ///
    /// # async fn example(client: SearchClient) -> docsearch_http::Result<()> {
    /// let (stop, stopped) = oneshot::channel::<()>();
    /// let waiting = client.wait_for_task_with_cancel(42, None, async move {
    ///     let _ = stopped.await;
    /// });
    /// drop(stop);
    /// let err = waiting.await.unwrap_err();
    /// assert_eq!(err.kind(), docsearch_http::ErrorKind::Cancelled);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn wait_for_task_with_cancel<C>(
        &self,
        task_uid: u64,
        interval: Option<Duration>,
        cancel: C,
    ) -> Result<Task>
    where
        C: Future<Output = ()>,
    {
        self.poll_task(task_uid, interval, cancel, ErrorKind::Cancelled)
            .await
    }

    /// Wait until the task is no longer pending or `deadline` passes.
    ///
    /// An expired deadline yields [`ErrorKind::Timeout`].
    pub async fn wait_for_task_until(
        &self,
        task_uid: u64,
        interval: Option<Duration>,
        deadline: Instant,
    ) -> Result<Task> {
        self.poll_task(
            task_uid,
            interval,
            tokio::time::sleep_until(deadline),
            ErrorKind::Timeout,
        )
        .await
    }

    async fn poll_task<C>(
        &self,
        task_uid: u64,
        interval: Option<Duration>,
        cancel: C,
        cancel_kind: ErrorKind,
    ) -> Result<Task>
    where
        C: Future<Output = ()>,
    {
        let interval = interval
            .filter(|d| !d.is_zero())
            .unwrap_or(DEFAULT_POLL_INTERVAL);
        let stopped = || {
            Error::new(cancel_kind, task_path(task_uid), "GET", "wait_for_task")
        };
        tokio::pin!(cancel);

        let task = tokio::select! {
            biased;
            _ = &mut cancel => return Err(stopped()),
            task = self.get_task(task_uid) => task?,
        };
        if !task.status.is_pending() {
            return Ok(task);
        }

        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = &mut cancel => return Err(stopped()),
                _ = ticker.tick() => {}
            }

            let task = tokio::select! {
                biased;
                _ = &mut cancel => return Err(stopped()),
                task = self.get_task(task_uid) => task?,
            };
            if !task.status.is_pending() {
                return Ok(task);
            }
        }
    }
}

fn task_path(task_uid: u64) -> String {
    format!("/tasks/{}", task_uid)
}
