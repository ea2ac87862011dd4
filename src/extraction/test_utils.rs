// Shared helpers for unit tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::element::ElementRef;
use super::errors::StrategyError;
use super::metrics::ExtractionSummary;
use super::models::{
    ContentInfo, ExtractionContext, ExtractionOptions, ExtractionResult, MediaDescriptor, MediaType,
};
use super::traits::{ExtractionStrategy, SummarySink};

/// Route tracing output to the test harness; repeated calls are no-ops
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn items(prefix: &str, count: usize) -> Vec<MediaDescriptor> {
    (0..count)
        .map(|i| {
            MediaDescriptor::new(
                format!("{}_{}", prefix, i),
                format!("https://pbs.twimg.com/media/{}_{}.jpg", prefix, i),
                MediaType::Image,
            )
        })
        .collect()
}

pub fn photo(testid: &str) -> ElementRef {
    ElementRef::new("img", [("data-testid", testid), ("src", "https://pbs.twimg.com/media/x.jpg")])
}

pub fn context() -> ExtractionContext {
    ExtractionContext::new(photo("tweetPhoto"), ExtractionOptions::default())
}

pub fn content(id: &str) -> ContentInfo {
    ContentInfo::new(id, "author", format!("https://x.com/author/status/{}", id))
}

#[derive(Debug, Clone)]
enum Behavior {
    Succeed(usize),
    Fail,
    Raise(String),
    /// Fail the first `n` calls, then succeed with one item
    Flaky(usize),
}

/// Scripted strategy that counts its invocations
#[derive(Debug)]
pub struct MockStrategy {
    name: String,
    priority: i32,
    applicable: bool,
    behavior: Behavior,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockStrategy {
    fn build(name: &str, priority: i32, behavior: Behavior) -> Self {
        Self {
            name: name.to_string(),
            priority,
            applicable: true,
            behavior,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn succeeding(name: &str, priority: i32, count: usize) -> Arc<Self> {
        Arc::new(Self::build(name, priority, Behavior::Succeed(count)))
    }

    pub fn failing(name: &str, priority: i32) -> Arc<Self> {
        Arc::new(Self::build(name, priority, Behavior::Fail))
    }

    pub fn raising(name: &str, priority: i32, message: &str) -> Arc<Self> {
        Arc::new(Self::build(
            name,
            priority,
            Behavior::Raise(message.to_string()),
        ))
    }

    pub fn flaky(name: &str, priority: i32, failures: usize) -> Arc<Self> {
        Arc::new(Self::build(name, priority, Behavior::Flaky(failures)))
    }

    /// Only valid right after construction
    pub fn not_applicable(self: Arc<Self>) -> Arc<Self> {
        let mut inner = Arc::try_unwrap(self).unwrap();
        inner.applicable = false;
        Arc::new(inner)
    }

    pub fn with_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        let mut inner = Arc::try_unwrap(self).unwrap();
        inner.delay = Some(delay);
        Arc::new(inner)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExtractionStrategy for MockStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn can_handle(&self, _ctx: &ExtractionContext) -> bool {
        self.applicable
    }

    async fn extract(
        &self,
        ctx: &ExtractionContext,
        _correlation_id: &str,
    ) -> Result<ExtractionResult, StrategyError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let success = |count: usize| {
            ExtractionResult::success(items(&self.name, count), 0, "mock", &self.name)
                .with_content_info(ctx.content_info.clone())
        };

        match &self.behavior {
            Behavior::Succeed(count) => Ok(success(*count)),
            Behavior::Fail => Ok(success(0)),
            Behavior::Raise(message) => Err(StrategyError::Failed(message.clone())),
            Behavior::Flaky(failures) if call < *failures => Ok(success(0)),
            Behavior::Flaky(_) => Ok(success(1)),
        }
    }
}

/// Sink that keeps every summary it receives
#[derive(Default)]
pub struct CollectingSink {
    summaries: Mutex<Vec<ExtractionSummary>>,
}

impl CollectingSink {
    pub fn summaries(&self) -> Vec<ExtractionSummary> {
        self.summaries.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.summaries.lock().len()
    }

    pub fn last(&self) -> Option<ExtractionSummary> {
        self.summaries.lock().last().cloned()
    }
}

impl SummarySink for CollectingSink {
    fn emit(&self, summary: &ExtractionSummary) {
        self.summaries.lock().push(summary.clone());
    }
}
