//! Usage: Popup-based consent driver: fetch the consent URL, open a popup, obtain the
//! authorization code (location polling or return-page messages), exchange it once.

use crate::client::api::ServiceApi;
use crate::client::popup::{returned_code, PopupLauncher, PopupWindow, ReturnedCode};
use crate::gateway::oauth::return_page::{ReturnMessage, RETURN_MESSAGE_TYPE};
use crate::shared::error::AppError;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const CODE_POPUP_BLOCKED: &str = "POPUP_BLOCKED";
pub const CODE_CONSENT_TIMEOUT: &str = "CONSENT_TIMEOUT";
pub const CODE_CONSENT_IN_PROGRESS: &str = "CONSENT_IN_PROGRESS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsentState {
    Idle,
    AwaitingConsent,
    ExchangingCode,
    Connected,
    /// Carries the surfaced error text; the next attempt starts from `Idle` again.
    Failed(String),
}

#[derive(Debug, Clone)]
pub enum ConsentOutcome {
    Connected,
    /// Popup closed before a code arrived. Not an error.
    Abandoned,
    Failed(AppError),
    /// Host tore the broker down mid-flow.
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub poll_interval: Duration,
    /// Unbounded when `None`.
    pub max_wait: Option<Duration>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: None,
        }
    }
}

/// Fires a callback at most once per consent session.
#[derive(Debug, Default)]
pub struct OnceNotifier {
    fired: AtomicBool,
}

impl OnceNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&self, f: impl FnOnce()) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            return false;
        }
        f();
        true
    }

    pub fn fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

pub type ConnectedCallback = Arc<dyn Fn() + Send + Sync>;

enum Wait {
    Code(ReturnedCode),
    Abandoned,
    TimedOut,
    Cancelled,
}

struct PollGuard(Arc<AtomicUsize>);

impl PollGuard {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for PollGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Puts the broker back to `Idle` if a session ends without settling, including when the
/// `connect` future is dropped mid-flow.
struct SessionGuard<'a> {
    state: &'a watch::Sender<ConsentState>,
    settled: bool,
}

impl<'a> SessionGuard<'a> {
    fn new(state: &'a watch::Sender<ConsentState>) -> Self {
        Self {
            state,
            settled: false,
        }
    }

    fn disarm(&mut self) {
        self.settled = true;
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.state.send_replace(ConsentState::Idle);
        }
    }
}

/// Closes the popup on every exit path. `close` is idempotent.
struct OpenPopup(Box<dyn PopupWindow>);

impl Drop for OpenPopup {
    fn drop(&mut self) {
        self.0.close();
    }
}

fn poll_ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = tokio::time::interval(period.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

fn deadline_passed(started: Instant, max_wait: Option<Duration>) -> bool {
    max_wait.is_some_and(|max| started.elapsed() >= max)
}

pub struct ConsentBroker {
    api: Arc<dyn ServiceApi>,
    launcher: Arc<dyn PopupLauncher>,
    config: BrokerConfig,
    state: watch::Sender<ConsentState>,
    on_connected: Option<ConnectedCallback>,
    teardown: CancellationToken,
    polling: Arc<AtomicUsize>,
}

impl ConsentBroker {
    pub fn new(
        api: Arc<dyn ServiceApi>,
        launcher: Arc<dyn PopupLauncher>,
        config: BrokerConfig,
    ) -> Self {
        let (state, _) = watch::channel(ConsentState::Idle);
        Self {
            api,
            launcher,
            config,
            state,
            on_connected: None,
            teardown: CancellationToken::new(),
            polling: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Host hook invoked once per successful consent session.
    pub fn with_on_connected(mut self, callback: ConnectedCallback) -> Self {
        self.on_connected = Some(callback);
        self
    }

    pub fn state(&self) -> ConsentState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConsentState> {
        self.state.subscribe()
    }

    /// Whether a poll timer is currently alive.
    pub fn is_polling(&self) -> bool {
        self.polling.load(Ordering::SeqCst) > 0
    }

    /// Cancels any running flow and rejects new ones.
    pub fn teardown(&self) {
        self.teardown.cancel();
    }

    /// `Failed -> Idle` once the host has surfaced the error.
    pub fn acknowledge(&self) {
        self.state.send_if_modified(|state| {
            if matches!(state, ConsentState::Failed(_)) {
                *state = ConsentState::Idle;
                return true;
            }
            false
        });
    }

    fn set(&self, next: ConsentState) {
        self.state.send_replace(next);
    }

    fn fail(&self, err: AppError) -> ConsentOutcome {
        tracing::warn!(error_code = err.code(), "consent flow failed: {}", err.message());
        self.set(ConsentState::Failed(err.message().to_string()));
        ConsentOutcome::Failed(err)
    }

    fn claim(&self) -> bool {
        self.state.send_if_modified(|state| match state {
            ConsentState::AwaitingConsent | ConsentState::ExchangingCode => false,
            _ => {
                *state = ConsentState::AwaitingConsent;
                true
            }
        })
    }

    /// Runs one consent session, reading the code from the popup location.
    pub async fn connect(&self) -> ConsentOutcome {
        self.run(None).await
    }

    /// Runs one consent session, taking the code from return-page messages.
    pub async fn connect_with_messages(
        &self,
        messages: mpsc::Receiver<ReturnMessage>,
    ) -> ConsentOutcome {
        self.run(Some(messages)).await
    }

    async fn run(&self, messages: Option<mpsc::Receiver<ReturnMessage>>) -> ConsentOutcome {
        if self.teardown.is_cancelled() {
            return ConsentOutcome::Cancelled;
        }
        if !self.claim() {
            return ConsentOutcome::Failed(AppError::new(
                CODE_CONSENT_IN_PROGRESS,
                "a consent flow is already running",
            ));
        }

        let mut guard = SessionGuard::new(&self.state);
        let session = OnceNotifier::new();

        let url = match self.api.consent_url().await {
            Ok(url) => url,
            Err(err) => {
                guard.disarm();
                return self.fail(err);
            }
        };
        if self.teardown.is_cancelled() {
            return ConsentOutcome::Cancelled;
        }
        let Some(popup) = self.launcher.open(&url) else {
            guard.disarm();
            return self.fail(AppError::new(
                CODE_POPUP_BLOCKED,
                "Popup blocked. Please allow popups for this site.",
            ));
        };
        let mut popup = OpenPopup(popup);

        let cancel = self.teardown.child_token();
        let waited = {
            let _poll = PollGuard::new(&self.polling);
            match messages {
                Some(rx) => self.wait_for_message(popup.0.as_mut(), rx, &cancel).await,
                None => self.poll_for_code(popup.0.as_mut(), &cancel).await,
            }
        };

        let returned = match waited {
            Wait::Code(returned) => returned,
            Wait::Abandoned => {
                tracing::debug!("consent popup closed without a code");
                return ConsentOutcome::Abandoned;
            }
            Wait::TimedOut => {
                popup.0.close();
                guard.disarm();
                return self.fail(AppError::new(CODE_CONSENT_TIMEOUT, "consent timed out"));
            }
            Wait::Cancelled => return ConsentOutcome::Cancelled,
        };

        self.set(ConsentState::ExchangingCode);
        popup.0.close();

        let exchanged = self
            .api
            .exchange_code(&returned.code, returned.state.as_deref())
            .await;
        if let Err(err) = exchanged {
            guard.disarm();
            return self.fail(err);
        }
        if self.teardown.is_cancelled() {
            tracing::debug!("consent completed after teardown; host not notified");
            return ConsentOutcome::Cancelled;
        }

        guard.disarm();
        session.notify(|| {
            if let Some(callback) = &self.on_connected {
                callback();
            }
        });
        self.set(ConsentState::Connected);
        ConsentOutcome::Connected
    }

    async fn poll_for_code(
        &self,
        popup: &mut dyn PopupWindow,
        cancel: &CancellationToken,
    ) -> Wait {
        let mut ticker = poll_ticker(self.config.poll_interval);
        // The first tick completes immediately.
        ticker.tick().await;
        let started = Instant::now();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Wait::Cancelled,
                _ = ticker.tick() => {}
            }

            if popup.is_closed() {
                return Wait::Abandoned;
            }
            // Cross-origin reads fail while the provider's pages are shown.
            if let Ok(location) = popup.read_location() {
                if let Some(returned) = returned_code(&location) {
                    return Wait::Code(returned);
                }
            }
            if deadline_passed(started, self.config.max_wait) {
                return Wait::TimedOut;
            }
        }
    }

    async fn wait_for_message(
        &self,
        popup: &mut dyn PopupWindow,
        mut messages: mpsc::Receiver<ReturnMessage>,
        cancel: &CancellationToken,
    ) -> Wait {
        let mut ticker = poll_ticker(self.config.poll_interval);
        ticker.tick().await;
        let started = Instant::now();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Wait::Cancelled,
                message = messages.recv() => match message {
                    Some(message) if message.kind == RETURN_MESSAGE_TYPE => {
                        if let Some(code) = message.code {
                            return Wait::Code(ReturnedCode { code, state: message.state });
                        }
                        if let Some(error) = message.error.as_deref() {
                            tracing::info!(error, "consent denied in popup");
                            popup.close();
                            return Wait::Abandoned;
                        }
                    }
                    Some(_) => {}
                    None => return Wait::Abandoned,
                },
                _ = ticker.tick() => {
                    if popup.is_closed() {
                        return Wait::Abandoned;
                    }
                    if deadline_passed(started, self.config.max_wait) {
                        return Wait::TimedOut;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::api::{ApiFuture, ChannelSummary, Identity, TimelineEntry};
    use crate::client::popup::CrossOrigin;
    use reqwest::Url;
    use std::sync::Mutex;

    type Events = Arc<Mutex<Vec<String>>>;

    #[derive(Clone, Copy)]
    enum Step {
        CrossOrigin,
        Location(&'static str),
        Closed,
    }

    struct PopupInner {
        script: Vec<Step>,
        tick: usize,
        closed: bool,
        close_calls: usize,
    }

    #[derive(Clone)]
    struct ScriptedPopup {
        inner: Arc<Mutex<PopupInner>>,
        events: Events,
    }

    impl ScriptedPopup {
        fn new(script: Vec<Step>, events: Events) -> Self {
            Self {
                inner: Arc::new(Mutex::new(PopupInner {
                    script,
                    tick: 0,
                    closed: false,
                    close_calls: 0,
                })),
                events,
            }
        }

        fn current(inner: &PopupInner) -> Step {
            inner
                .script
                .get(inner.tick.saturating_sub(1))
                .copied()
                .unwrap_or(Step::CrossOrigin)
        }

        fn ticks(&self) -> usize {
            self.inner.lock().unwrap().tick
        }

        fn closed(&self) -> bool {
            self.inner.lock().unwrap().closed
        }
    }

    impl PopupWindow for ScriptedPopup {
        fn is_closed(&self) -> bool {
            let mut inner = self.inner.lock().unwrap();
            inner.tick += 1;
            inner.closed || matches!(Self::current(&inner), Step::Closed)
        }

        fn read_location(&self) -> Result<Url, CrossOrigin> {
            let inner = self.inner.lock().unwrap();
            match Self::current(&inner) {
                Step::Location(url) => Ok(Url::parse(url).unwrap()),
                _ => Err(CrossOrigin),
            }
        }

        fn close(&mut self) {
            let mut inner = self.inner.lock().unwrap();
            inner.close_calls += 1;
            if !inner.closed {
                inner.closed = true;
                self.events.lock().unwrap().push("close".to_string());
            }
        }
    }

    struct FakeLauncher {
        popup: Option<ScriptedPopup>,
        opened: Mutex<Vec<String>>,
    }

    impl PopupLauncher for FakeLauncher {
        fn open(&self, url: &str) -> Option<Box<dyn PopupWindow>> {
            self.opened.lock().unwrap().push(url.to_string());
            self.popup
                .clone()
                .map(|p| Box::new(p) as Box<dyn PopupWindow>)
        }
    }

    struct FakeApi {
        exchange_result: Result<(), AppError>,
        exchange_delay: Duration,
        exchanges: Mutex<Vec<(String, Option<String>)>>,
        events: Events,
    }

    impl FakeApi {
        fn new(events: Events, exchange_result: Result<(), AppError>) -> Self {
            Self {
                exchange_result,
                exchange_delay: Duration::ZERO,
                exchanges: Mutex::new(Vec::new()),
                events,
            }
        }

        fn exchange_count(&self) -> usize {
            self.exchanges.lock().unwrap().len()
        }
    }

    impl ServiceApi for FakeApi {
        fn consent_url(&self) -> ApiFuture<'_, String> {
            Box::pin(async { Ok("https://accounts.example/consent".to_string()) })
        }

        fn exchange_code<'a>(
            &'a self,
            code: &'a str,
            state: Option<&'a str>,
        ) -> ApiFuture<'a, ()> {
            Box::pin(async move {
                self.exchanges
                    .lock()
                    .unwrap()
                    .push((code.to_string(), state.map(str::to_string)));
                self.events.lock().unwrap().push(format!("exchange:{code}"));
                tokio::time::sleep(self.exchange_delay).await;
                self.exchange_result.clone()
            })
        }

        fn identity(&self) -> ApiFuture<'_, Identity> {
            Box::pin(async { Err(AppError::new("UNAUTHENTICATED", "unused")) })
        }

        fn channel_stats(&self) -> ApiFuture<'_, ChannelSummary> {
            Box::pin(async { Err(AppError::new("UPSTREAM_ERROR", "unused")) })
        }

        fn timeline(&self, _range_days: u32) -> ApiFuture<'_, Vec<TimelineEntry>> {
            Box::pin(async { Ok(Vec::new()) })
        }
    }

    struct Harness {
        broker: Arc<ConsentBroker>,
        api: Arc<FakeApi>,
        popup: ScriptedPopup,
        events: Events,
        notified: Arc<AtomicUsize>,
    }

    fn harness(script: Vec<Step>, exchange: Result<(), AppError>, config: BrokerConfig) -> Harness {
        harness_with_api(script, config, |events| FakeApi::new(events, exchange))
    }

    fn harness_with_api(
        script: Vec<Step>,
        config: BrokerConfig,
        api: impl FnOnce(Events) -> FakeApi,
    ) -> Harness {
        let events: Events = Arc::new(Mutex::new(Vec::new()));
        let popup = ScriptedPopup::new(script, events.clone());
        let api = Arc::new(api(events.clone()));
        let launcher = Arc::new(FakeLauncher {
            popup: Some(popup.clone()),
            opened: Mutex::new(Vec::new()),
        });
        let notified = Arc::new(AtomicUsize::new(0));
        let counter = notified.clone();
        let broker = ConsentBroker::new(api.clone(), launcher, config).with_on_connected(Arc::new(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        ));
        Harness {
            broker: Arc::new(broker),
            api,
            popup,
            events,
            notified,
        }
    }

    fn cross_origin_ticks(n: usize) -> Vec<Step> {
        vec![Step::CrossOrigin; n]
    }

    #[tokio::test(start_paused = true)]
    async fn code_on_eleventh_tick_is_exchanged_once_after_close() {
        let mut script = cross_origin_ticks(10);
        script.push(Step::Location("http://localhost:5173/?code=XYZ&state=n.s"));
        let h = harness(script, Ok(()), BrokerConfig::default());

        let started = Instant::now();
        let outcome = h.broker.connect().await;

        assert!(matches!(outcome, ConsentOutcome::Connected));
        assert_eq!(h.broker.state(), ConsentState::Connected);
        assert_eq!(h.popup.ticks(), 11);
        assert_eq!(started.elapsed(), DEFAULT_POLL_INTERVAL * 11);
        assert_eq!(
            h.api.exchanges.lock().unwrap().clone(),
            vec![("XYZ".to_string(), Some("n.s".to_string()))]
        );
        assert_eq!(
            h.events.lock().unwrap().clone(),
            vec!["close".to_string(), "exchange:XYZ".to_string()]
        );
        assert_eq!(h.notified.load(Ordering::SeqCst), 1);
        assert!(!h.broker.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn popup_closed_without_code_returns_to_idle() {
        let mut script = cross_origin_ticks(4);
        script.push(Step::Closed);
        let h = harness(script, Ok(()), BrokerConfig::default());

        let outcome = h.broker.connect().await;

        assert!(matches!(outcome, ConsentOutcome::Abandoned));
        assert_eq!(h.broker.state(), ConsentState::Idle);
        assert_eq!(h.popup.ticks(), 5);
        assert_eq!(h.api.exchange_count(), 0);
        assert_eq!(h.notified.load(Ordering::SeqCst), 0);
        assert!(!h.broker.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn readable_location_without_code_keeps_polling() {
        let script = vec![
            Step::CrossOrigin,
            Step::Location("http://localhost:5173/?error=access_denied"),
            Step::Location("http://localhost:5173/"),
            Step::Location("http://localhost:5173/?code=abc"),
        ];
        let h = harness(script, Ok(()), BrokerConfig::default());

        assert!(matches!(h.broker.connect().await, ConsentOutcome::Connected));
        assert_eq!(h.popup.ticks(), 4);
        assert_eq!(h.api.exchange_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn blocked_popup_fails_without_exchange() {
        let events: Events = Arc::new(Mutex::new(Vec::new()));
        let api = Arc::new(FakeApi::new(events, Ok(())));
        let launcher = Arc::new(FakeLauncher {
            popup: None,
            opened: Mutex::new(Vec::new()),
        });
        let broker = ConsentBroker::new(api.clone(), launcher.clone(), BrokerConfig::default());

        let outcome = broker.connect().await;

        match outcome {
            ConsentOutcome::Failed(err) => assert_eq!(err.code(), CODE_POPUP_BLOCKED),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(matches!(broker.state(), ConsentState::Failed(_)));
        assert_eq!(
            launcher.opened.lock().unwrap().clone(),
            vec!["https://accounts.example/consent".to_string()]
        );
        assert_eq!(api.exchange_count(), 0);

        broker.acknowledge();
        assert_eq!(broker.state(), ConsentState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn exchange_failure_surfaces_error_without_notification() {
        let script = vec![Step::Location("http://localhost:5173/?code=bad")];
        let h = harness(
            script,
            Err(AppError::new("UPSTREAM_ERROR", "YouTube connection failed")),
            BrokerConfig::default(),
        );

        let outcome = h.broker.connect().await;

        assert!(matches!(outcome, ConsentOutcome::Failed(_)));
        assert_eq!(
            h.broker.state(),
            ConsentState::Failed("YouTube connection failed".to_string())
        );
        assert_eq!(h.api.exchange_count(), 1);
        assert_eq!(h.notified.load(Ordering::SeqCst), 0);
        assert!(h.popup.closed());
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_wait_times_out_and_closes_popup() {
        let h = harness(
            Vec::new(),
            Ok(()),
            BrokerConfig {
                poll_interval: DEFAULT_POLL_INTERVAL,
                max_wait: Some(Duration::from_secs(2)),
            },
        );

        let outcome = h.broker.connect().await;

        match outcome {
            ConsentOutcome::Failed(err) => assert_eq!(err.code(), CODE_CONSENT_TIMEOUT),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(h.popup.closed());
        assert_eq!(h.api.exchange_count(), 0);
        assert!(!h.broker.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_cancels_polling_and_closes_popup() {
        let h = harness(Vec::new(), Ok(()), BrokerConfig::default());
        let broker = h.broker.clone();
        let task = tokio::spawn(async move { broker.connect().await });

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(h.broker.is_polling());
        h.broker.teardown();

        let outcome = task.await.expect("join");
        assert!(matches!(outcome, ConsentOutcome::Cancelled));
        assert!(h.popup.closed());
        assert!(!h.broker.is_polling());
        assert_eq!(h.api.exchange_count(), 0);
        assert!(matches!(h.broker.connect().await, ConsentOutcome::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_connect_releases_session_for_next_attempt() {
        let h = harness(Vec::new(), Ok(()), BrokerConfig::default());

        let waited = tokio::time::timeout(Duration::from_secs(3), h.broker.connect()).await;
        assert!(waited.is_err());

        assert_eq!(h.broker.state(), ConsentState::Idle);
        assert!(h.popup.closed());
        assert!(!h.broker.is_polling());

        // The shared popup is already closed, so the next session runs and is abandoned.
        let outcome = h.broker.connect().await;
        assert!(matches!(outcome, ConsentOutcome::Abandoned), "{outcome:?}");
        assert_eq!(h.broker.state(), ConsentState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_during_exchange_skips_connected_notification() {
        let script = vec![Step::Location("http://localhost:5173/?code=late")];
        let h = harness_with_api(script, BrokerConfig::default(), |events| FakeApi {
            exchange_delay: Duration::from_secs(2),
            ..FakeApi::new(events, Ok(()))
        });
        let broker = h.broker.clone();
        let task = tokio::spawn(async move { broker.connect().await });

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(h.broker.state(), ConsentState::ExchangingCode);
        h.broker.teardown();

        let outcome = task.await.expect("join");
        assert!(matches!(outcome, ConsentOutcome::Cancelled), "{outcome:?}");
        assert_eq!(h.api.exchange_count(), 1);
        assert_eq!(h.notified.load(Ordering::SeqCst), 0);
        assert_eq!(h.broker.state(), ConsentState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn message_source_exchanges_code_once_and_ignores_foreign_messages() {
        let h = harness(Vec::new(), Ok(()), BrokerConfig::default());
        let (tx, rx) = mpsc::channel(4);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            let foreign = ReturnMessage {
                kind: "something-else".to_string(),
                code: Some("nope".to_string()),
                state: None,
                error: None,
            };
            tx.send(foreign).await.expect("send foreign");
            let message = ReturnMessage {
                kind: RETURN_MESSAGE_TYPE.to_string(),
                code: Some("MSG-CODE".to_string()),
                state: Some("n.s".to_string()),
                error: None,
            };
            tx.send(message).await.expect("send code");
        });

        let outcome = h.broker.connect_with_messages(rx).await;

        assert!(matches!(outcome, ConsentOutcome::Connected));
        assert_eq!(
            h.api.exchanges.lock().unwrap().clone(),
            vec![("MSG-CODE".to_string(), Some("n.s".to_string()))]
        );
        assert_eq!(h.notified.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn message_source_treats_closed_popup_as_abandonment() {
        let mut script = cross_origin_ticks(2);
        script.push(Step::Closed);
        let h = harness(script, Ok(()), BrokerConfig::default());
        let (_tx, rx) = mpsc::channel::<ReturnMessage>(1);

        let outcome = h.broker.connect_with_messages(rx).await;

        assert!(matches!(outcome, ConsentOutcome::Abandoned));
        assert_eq!(h.broker.state(), ConsentState::Idle);
        assert_eq!(h.api.exchange_count(), 0);
    }

    #[test]
    fn once_notifier_fires_only_once() {
        let notifier = OnceNotifier::new();
        let count = AtomicUsize::new(0);
        assert!(notifier.notify(|| {
            count.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(!notifier.notify(|| {
            count.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(notifier.fired());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn popup_close_is_idempotent() {
        let events: Events = Arc::new(Mutex::new(Vec::new()));
        let mut popup = ScriptedPopup::new(Vec::new(), events.clone());
        popup.close();
        popup.close();
        assert!(popup.closed());
        assert_eq!(popup.inner.lock().unwrap().close_calls, 2);
        assert_eq!(events.lock().unwrap().len(), 1);
    }
}
