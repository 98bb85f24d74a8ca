//! Sequential batch processing.
//!
//! A [`BulkJob`] is an ordered, non-empty list of requests. [`BulkRunner::run`]
//! processes them strictly one after another, pausing between successful
//! items according to the job's [`DelayPolicy`], and stops at the first
//! failure: later items are never attempted and earlier results are kept.
//! Progress is reported as a stream of [`BulkEvent`]s.

use std::{future::Future, sync::Arc, time::Duration};

use async_stream::stream;
use log::{info, warn};
use nonempty::NonEmpty;
use tokio::{sync::watch, time::sleep};
use tokio_stream::Stream;

use crate::error::{GenerationError, Result};

/// Seconds to wait between two items of a media bulk job, within 40..=200.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(from = "u64", into = "u64")]
pub struct BulkDelay(u64);

impl BulkDelay {
    pub const MIN_SECS: u64 = 40;
    pub const MAX_SECS: u64 = 200;

    pub fn from_secs(secs: u64) -> Self {
        Self(secs.clamp(Self::MIN_SECS, Self::MAX_SECS))
    }

    /// Lenient parse of user input: anything that isn't a number is the minimum
    pub fn parse(input: &str) -> Self {
        input
            .trim()
            .parse::<u64>()
            .map(Self::from_secs)
            .unwrap_or_default()
    }

    pub fn secs(&self) -> u64 {
        self.0
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.0)
    }
}

impl Default for BulkDelay {
    fn default() -> Self {
        Self(Self::MIN_SECS)
    }
}

impl From<u64> for BulkDelay {
    fn from(secs: u64) -> Self {
        Self::from_secs(secs)
    }
}

impl From<BulkDelay> for u64 {
    fn from(delay: BulkDelay) -> Self {
        delay.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayPolicy {
    None,
    Fixed(Duration),
    Bulk(BulkDelay),
}

impl DelayPolicy {
    /// Pause of the image flow between two items
    pub const IMAGE: DelayPolicy = DelayPolicy::Fixed(Duration::from_secs(2));

    pub fn duration(&self) -> Option<Duration> {
        match self {
            DelayPolicy::None => None,
            DelayPolicy::Fixed(d) => Some(*d),
            DelayPolicy::Bulk(d) => Some(d.duration()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BulkJob<R> {
    pub requests: NonEmpty<R>,
    pub delay: DelayPolicy,
    bulk: bool,
}

impl<R> BulkJob<R> {
    pub fn new(requests: Vec<R>, delay: DelayPolicy) -> Result<Self> {
        let requests = NonEmpty::from_vec(requests).ok_or_else(|| {
            GenerationError::validation(
                "Bulk mode is on, but no prompts were entered. Please enter one prompt per line.",
            )
        })?;
        Ok(Self {
            requests,
            delay,
            bulk: true,
        })
    }

    /// A job made from one prompt typed outside bulk mode
    pub fn single(request: R) -> Self {
        Self {
            requests: NonEmpty::new(request),
            delay: DelayPolicy::None,
            bulk: false,
        }
    }

    /// Whether failures name the request they happened on
    pub fn is_bulk(&self) -> bool {
        self.bulk
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn map<S>(self, f: impl FnMut(R) -> S) -> BulkJob<S> {
        BulkJob {
            requests: self.requests.map(f),
            delay: self.delay,
            bulk: self.bulk,
        }
    }
}

impl BulkJob<String> {
    /// One prompt per non-blank line
    pub fn from_lines(text: &str, delay: DelayPolicy) -> Result<Self> {
        Self::new(prompt_lines(text), delay)
    }
}

pub fn prompt_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

/// Cooperative cancellation shared between a job and whoever may supersede it
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Whether both tokens belong to the same job
    pub fn is_same(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.tx, &other.tx)
    }

    /// Resolves once `cancel` has been called on any clone
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // the sender lives as long as any token does, so this only ends on cancel
        _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BulkState {
    #[default]
    Idle,
    Running {
        index: usize,
        total: usize,
    },
    Completed,
    Failed {
        index: usize,
        message: String,
    },
    Cancelled {
        index: usize,
    },
}

#[derive(Debug)]
pub enum BulkEvent<R, T> {
    Started {
        index: usize,
        total: usize,
    },
    Succeeded {
        index: usize,
        total: usize,
        request: R,
        result: T,
    },
    Waiting {
        delay: Duration,
    },
    Failed {
        index: usize,
        request: R,
        error: GenerationError,
    },
    Cancelled {
        index: usize,
    },
    Completed {
        total: usize,
    },
}

#[derive(Debug, Default)]
pub struct BulkRunner {
    state: BulkState,
}

impl BulkRunner {
    pub fn state(&self) -> &BulkState {
        &self.state
    }

    /// Runs `step` once per request, in order.
    ///
    /// The stream ends after `Completed`, `Failed` or `Cancelled`. Dropping the
    /// stream abandons the job at its current suspension point.
    pub fn run<'a, R, T, F, Fut>(
        &'a mut self,
        job: BulkJob<R>,
        cancel: CancelToken,
        mut step: F,
    ) -> impl Stream<Item = BulkEvent<R, T>> + 'a
    where
        R: Clone + 'a,
        T: 'a,
        F: FnMut(R) -> Fut + 'a,
        Fut: Future<Output = Result<T>> + 'a,
    {
        stream! {
            let total = job.len();
            let delay = job.delay.duration();
            info!("starting bulk job with {total} items");

            for (index, request) in job.requests.into_iter().enumerate() {
                if cancel.is_cancelled() {
                    self.state = BulkState::Cancelled { index };
                    yield BulkEvent::Cancelled { index };
                    return;
                }

                self.state = BulkState::Running { index, total };
                yield BulkEvent::Started { index, total };

                let outcome = tokio::select! {
                    res = step(request.clone()) => Some(res),
                    _ = cancel.cancelled() => None,
                };

                match outcome {
                    None => {
                        info!("bulk job cancelled at item {index}");
                        self.state = BulkState::Cancelled { index };
                        yield BulkEvent::Cancelled { index };
                        return;
                    }
                    Some(Err(error)) => {
                        warn!("bulk job stopped at item {index}: {error}");
                        self.state = BulkState::Failed {
                            index,
                            message: error.to_string(),
                        };
                        yield BulkEvent::Failed { index, request, error };
                        return;
                    }
                    Some(Ok(result)) => {
                        yield BulkEvent::Succeeded { index, total, request, result };
                    }
                }

                let is_last = index + 1 == total;
                if let (false, Some(delay)) = (is_last, delay) {
                    yield BulkEvent::Waiting { delay };
                    let cancelled = tokio::select! {
                        _ = sleep(delay) => false,
                        _ = cancel.cancelled() => true,
                    };
                    if cancelled {
                        self.state = BulkState::Cancelled { index: index + 1 };
                        yield BulkEvent::Cancelled { index: index + 1 };
                        return;
                    }
                }
            }

            self.state = BulkState::Completed;
            yield BulkEvent::Completed { total };
        }
    }
}

/// `Error on prompt 2 ("A neon hologram of a..."): <message>`
pub fn failure_message(label: &str, index: usize, prompt: &str, error: &GenerationError) -> String {
    let head: String = prompt.chars().take(20).collect();
    format!("Error on {label} {} (\"{head}...\"): {error}", index + 1)
}
