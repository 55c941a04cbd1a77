//! services/api/src/web/focus_task.rs
//!
//! This module contains the focus-summary orchestrator and its asynchronous
//! "worker" function.
//!
//! Each focus area moves through `Uncached -> Pending -> {Cached | Failed}`.
//! Requests are debounced (250 ms of quiescence before the network call)
//! and single-flight across the whole orchestrator: selecting a new area
//! cancels whatever is still running, and a superseded Pending area reverts
//! to Uncached. Workers are fenced by a request sequence number checked
//! under the state lock, so a superseded worker can never write after its
//! cancellation was observed.

use crate::prompts;
use astro_guide_core::domain::{AiSigns, ChatMessage, FocusArea, MoonInfo};
use astro_guide_core::ports::GuidanceService;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Quiescence window before a summary request reaches the network.
pub const DEBOUNCE: Duration = Duration::from_millis(250);

/// Minimum interval between flushes of buffered stream tokens to the
/// visible partial text (about 20 updates per second).
pub const FLUSH_INTERVAL: Duration = Duration::from_millis(50);

/// The display state of one focus area. Absence from the map is Uncached.
#[derive(Debug, Clone, PartialEq)]
pub enum SummaryState {
    Pending { partial: String },
    Cached(String),
    Failed(String),
}

#[derive(Default)]
struct FocusInner {
    entries: HashMap<FocusArea, SummaryState>,
    cancellation_token: Option<CancellationToken>,
    current_area: Option<FocusArea>,
    request_seq: u64,
}

//=========================================================================================
// FocusSummaryOrchestrator
//=========================================================================================

/// Caches one generated summary per focus area for the lifetime of the
/// process and coordinates the debounced, cancelable generation requests.
///
/// Cloning produces another handle onto the same state; workers run against
/// a clone.
#[derive(Clone)]
pub struct FocusSummaryOrchestrator {
    guidance: Arc<dyn GuidanceService>,
    debounce: Duration,
    flush_interval: Duration,
    inner: Arc<Mutex<FocusInner>>,
}

impl FocusSummaryOrchestrator {
    pub fn new(guidance: Arc<dyn GuidanceService>) -> Self {
        Self::with_timings(guidance, DEBOUNCE, FLUSH_INTERVAL)
    }

    pub fn with_timings(
        guidance: Arc<dyn GuidanceService>,
        debounce: Duration,
        flush_interval: Duration,
    ) -> Self {
        Self {
            guidance,
            debounce,
            flush_interval,
            inner: Arc::new(Mutex::new(FocusInner::default())),
        }
    }

    /// Requests the summary for `area`, returning the area's display state.
    ///
    /// A cached non-empty summary is served immediately with no network
    /// call. Otherwise the area is marked Pending and a debounced worker is
    /// spawned; any in-flight worker is cancelled first.
    pub async fn request_summary(
        &self,
        profile_summary: String,
        area: FocusArea,
        moon: Option<MoonInfo>,
        ai_signs: Option<AiSigns>,
    ) -> SummaryState {
        let mut inner = self.inner.lock().await;

        if let Some(SummaryState::Cached(text)) = inner.entries.get(&area) {
            if !text.trim().is_empty() {
                return SummaryState::Cached(text.clone());
            }
        }

        if let Some(token) = inner.cancellation_token.take() {
            token.cancel();
        }
        if let Some(previous) = inner.current_area.take() {
            if previous != area
                && matches!(inner.entries.get(&previous), Some(SummaryState::Pending { .. }))
            {
                inner.entries.remove(&previous);
            }
        }

        let token = CancellationToken::new();
        inner.cancellation_token = Some(token.clone());
        inner.current_area = Some(area);
        inner.request_seq += 1;
        let seq = inner.request_seq;
        let state = SummaryState::Pending {
            partial: String::new(),
        };
        inner.entries.insert(area, state.clone());
        drop(inner);

        tokio::spawn(summary_process(
            self.clone(),
            area,
            seq,
            token,
            profile_summary,
            moon,
            ai_signs,
        ));

        state
    }

    /// The current display state of `area`; `None` means Uncached.
    pub async fn display(&self, area: FocusArea) -> Option<SummaryState> {
        self.inner.lock().await.entries.get(&area).cloned()
    }

    /// Drops every cache entry and cancels any in-flight worker. Called
    /// whenever profile-invalidating fields change and on reset.
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(token) = inner.cancellation_token.take() {
            token.cancel();
        }
        inner.current_area = None;
        inner.entries.clear();
        // Advance the fence so a worker between cancellation checks cannot
        // repopulate the cleared map.
        inner.request_seq += 1;
    }

    async fn store_partial(&self, area: FocusArea, seq: u64, partial: String) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.request_seq != seq {
            return false;
        }
        inner.entries.insert(area, SummaryState::Pending { partial });
        true
    }

    async fn store_cached(&self, area: FocusArea, seq: u64, text: String) {
        let mut inner = self.inner.lock().await;
        if inner.request_seq != seq {
            return;
        }
        inner.entries.insert(area, SummaryState::Cached(text));
        inner.cancellation_token = None;
        inner.current_area = None;
    }

    async fn store_failure(&self, area: FocusArea, seq: u64, message: String) {
        let mut inner = self.inner.lock().await;
        if inner.request_seq != seq {
            return;
        }
        inner.entries.insert(area, SummaryState::Failed(message));
        inner.cancellation_token = None;
        inner.current_area = None;
    }
}

//=========================================================================================
// The Worker
//=========================================================================================

/// Generates one focus-area summary: debounce, stream, aggregate, cache.
async fn summary_process(
    orchestrator: FocusSummaryOrchestrator,
    area: FocusArea,
    seq: u64,
    token: CancellationToken,
    profile_summary: String,
    moon: Option<MoonInfo>,
    ai_signs: Option<AiSigns>,
) {
    // Debounce: rapid re-selection cancels us here, before any network I/O.
    tokio::select! {
        _ = token.cancelled() => return,
        _ = tokio::time::sleep(orchestrator.debounce) => {}
    }

    let lunar_sign = moon.map(|m| m.sign).unwrap_or_else(|| "Unknown".to_string());
    let (solar_sign, chinese_sign) = match &ai_signs {
        Some(signs) => (signs.solar_sign.clone(), signs.chinese_sign.clone()),
        None => ("Unknown".to_string(), "Unknown".to_string()),
    };
    let user = prompts::focus_user(
        area.label(),
        &lunar_sign,
        &solar_sign,
        &chinese_sign,
        &profile_summary,
    );
    let messages = vec![ChatMessage::user(user)];

    let mut stream = match orchestrator
        .guidance
        .complete_streaming(prompts::FOCUS_SYSTEM, &messages)
        .await
    {
        Ok(stream) => stream,
        Err(e) => {
            warn!("Focus summary request failed for {}: {e}", area.label());
            orchestrator.store_failure(area, seq, e.to_string()).await;
            return;
        }
    };

    let mut accumulated = String::new();
    let mut last_flush = Instant::now();

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                info!("Focus summary for {} cancelled.", area.label());
                return;
            }
            next = stream.next() => match next {
                None => break,
                Some(Ok(delta)) => {
                    accumulated.push_str(&delta);
                    if last_flush.elapsed() >= orchestrator.flush_interval {
                        if !orchestrator.store_partial(area, seq, accumulated.clone()).await {
                            return;
                        }
                        last_flush = Instant::now();
                    }
                }
                Some(Err(e)) => {
                    warn!("Focus summary stream failed for {}: {e}", area.label());
                    orchestrator.store_failure(area, seq, e.to_string()).await;
                    return;
                }
            }
        }
    }

    // Final flush: whatever is still buffered must land even though no
    // display deadline remains.
    let text = accumulated.trim();
    let text = if text.is_empty() {
        prompts::EMPTY_SUMMARY_FALLBACK.to_string()
    } else {
        text.to_string()
    };
    orchestrator.store_cached(area, seq, text).await;
}

//=========================================================================================
// Tests
//=========================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::testing::ScriptedGuidance;
    use std::sync::atomic::Ordering;

    fn make_orchestrator(
        guidance: ScriptedGuidance,
    ) -> (Arc<ScriptedGuidance>, FocusSummaryOrchestrator) {
        let guidance = Arc::new(guidance);
        let orchestrator = FocusSummaryOrchestrator::with_timings(
            guidance.clone(),
            Duration::from_millis(250),
            Duration::from_millis(50),
        );
        (guidance, orchestrator)
    }

    async fn wait_for_settled(
        orchestrator: &FocusSummaryOrchestrator,
        area: FocusArea,
    ) -> SummaryState {
        for _ in 0..200 {
            match orchestrator.display(area).await {
                Some(state @ (SummaryState::Cached(_) | SummaryState::Failed(_))) => return state,
                _ => tokio::time::sleep(Duration::from_millis(10)).await,
            }
        }
        panic!("summary for {:?} never settled", area);
    }

    #[tokio::test(start_paused = true)]
    async fn summary_streams_and_caches() {
        let (guidance, orchestrator) = make_orchestrator(ScriptedGuidance {
            tokens: vec!["Moon ".to_string(), "rises.".to_string()],
            ..ScriptedGuidance::default()
        });

        let state = orchestrator
            .request_summary("Name: Ada".to_string(), FocusArea::Career, None, None)
            .await;
        assert_eq!(
            state,
            SummaryState::Pending {
                partial: String::new()
            }
        );

        let settled = wait_for_settled(&orchestrator, FocusArea::Career).await;
        assert_eq!(settled, SummaryState::Cached("Moon rises.".to_string()));
        assert_eq!(guidance.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cached_summary_is_served_without_a_network_call() {
        let (guidance, orchestrator) = make_orchestrator(ScriptedGuidance {
            tokens: vec!["Steady week ahead.".to_string()],
            ..ScriptedGuidance::default()
        });

        orchestrator
            .request_summary("Name: Ada".to_string(), FocusArea::Wealth, None, None)
            .await;
        wait_for_settled(&orchestrator, FocusArea::Wealth).await;

        let state = orchestrator
            .request_summary("Name: Ada".to_string(), FocusArea::Wealth, None, None)
            .await;
        assert_eq!(state, SummaryState::Cached("Steady week ahead.".to_string()));
        assert_eq!(guidance.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_reselection_coalesces_to_one_request() {
        let (guidance, orchestrator) = make_orchestrator(ScriptedGuidance {
            tokens: vec!["Guidance.".to_string()],
            ..ScriptedGuidance::default()
        });

        // Three selections inside the 250 ms quiescence window: only the
        // last survives its debounce.
        for area in [FocusArea::Career, FocusArea::Health, FocusArea::Travel] {
            orchestrator
                .request_summary("Name: Ada".to_string(), area, None, None)
                .await;
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let settled = wait_for_settled(&orchestrator, FocusArea::Travel).await;
        assert_eq!(settled, SummaryState::Cached("Guidance.".to_string()));
        assert_eq!(guidance.calls.load(Ordering::SeqCst), 1);

        // Superseded areas reverted to Uncached.
        assert_eq!(orchestrator.display(FocusArea::Career).await, None);
        assert_eq!(orchestrator.display(FocusArea::Health).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn partial_text_flushes_while_the_stream_runs() {
        let (_guidance, orchestrator) = make_orchestrator(ScriptedGuidance {
            tokens: vec!["First ".to_string(), "second.".to_string()],
            token_delay: Duration::from_millis(100),
            ..ScriptedGuidance::default()
        });

        orchestrator
            .request_summary("Name: Ada".to_string(), FocusArea::Purpose, None, None)
            .await;

        // Debounce (250) + first token (100) has elapsed; the second token
        // (at 450) has not.
        tokio::time::sleep(Duration::from_millis(400)).await;
        match orchestrator.display(FocusArea::Purpose).await {
            Some(SummaryState::Pending { partial }) => assert_eq!(partial, "First "),
            other => panic!("expected a flushed partial, got {other:?}"),
        }

        let settled = wait_for_settled(&orchestrator, FocusArea::Purpose).await;
        assert_eq!(settled, SummaryState::Cached("First second.".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_stream_caches_the_fallback_text() {
        let (_guidance, orchestrator) = make_orchestrator(ScriptedGuidance::default());

        orchestrator
            .request_summary("Name: Ada".to_string(), FocusArea::Education, None, None)
            .await;
        let settled = wait_for_settled(&orchestrator, FocusArea::Education).await;
        assert_eq!(
            settled,
            SummaryState::Cached(prompts::EMPTY_SUMMARY_FALLBACK.to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn request_failure_marks_the_area_failed() {
        let (_guidance, orchestrator) = make_orchestrator(ScriptedGuidance {
            fail_on_start: true,
            ..ScriptedGuidance::default()
        });

        orchestrator
            .request_summary("Name: Ada".to_string(), FocusArea::Health, None, None)
            .await;
        let settled = wait_for_settled(&orchestrator, FocusArea::Health).await;
        assert!(matches!(settled, SummaryState::Failed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn clear_cancels_the_worker_and_empties_the_cache() {
        let (guidance, orchestrator) = make_orchestrator(ScriptedGuidance {
            tokens: vec!["Slow ".to_string(), "answer.".to_string()],
            token_delay: Duration::from_millis(100),
            ..ScriptedGuidance::default()
        });

        orchestrator
            .request_summary("Name: Ada".to_string(), FocusArea::Career, None, None)
            .await;
        // Past the debounce, mid-stream.
        tokio::time::sleep(Duration::from_millis(300)).await;
        orchestrator.clear().await;

        // Give the cancelled worker time to observe the token.
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(orchestrator.display(FocusArea::Career).await, None);
        assert_eq!(guidance.calls.load(Ordering::SeqCst), 1);
    }
}
