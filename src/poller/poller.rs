//! # Poller: drives reconcile → enrich → rebuild cycles.
//!
//! ```text
//! start(api_token)
//!   ├─► state = Starting
//!   ├─► spawn listener: Bus ─► SubscriberSet::emit
//!   ├─► store.load(), fix_integrity()
//!   ├─► state = Running, publish PollerStarted
//!   └─► spawn loop:
//!         loop {
//!           ├─► state = Running, publish CycleStarted
//!           ├─► reconcile()
//!           │     ├─ Err            → error event          → wait idle_delay
//!           │     ├─ nothing pending → rebuild registry     → wait idle_delay
//!           │     └─ pending        → enrich → rebuild      → wait busy_delay
//!           ├─► store.flush()
//!           └─► state = Waiting, sleep (cancellable)
//!         }
//!
//! stop()
//!   ├─► cancel loop token (aborts the wait or the in-flight cycle)
//!   ├─► await loop, flush store
//!   ├─► state = Stopped, publish PollerStopped
//!   └─► drain and close subscribers
//! ```
//!
//! ## Rules
//! - One cycle at a time; the next wait is armed only by a cycle that did not
//!   observe the stop.
//! - No error stops the loop; every failure becomes an `Error` event.

use std::{sync::Arc, time::Duration};

use tokio::{
    select,
    sync::{Mutex, broadcast::error::RecvError, watch},
    task::JoinHandle,
    time,
};
use tokio_util::sync::CancellationToken;

use crate::{
    config::Config,
    error::ScrapeError,
    events::{Bus, Event, EventKind},
    scrape::{
        Clock, EnrichmentDriver, RegistryHandle, fix_integrity, rebuild_registry, reconcile,
    },
    source::{ApiToken, RemoteSource},
    store::RecordStore,
    subscribers::{Subscribe, SubscriberSet},
};

use super::{builder::PollerBuilder, shutdown, state::PollerState};

struct Shared {
    config: Config,
    bus: Bus,
    source: Arc<dyn RemoteSource>,
    store: Arc<dyn RecordStore>,
    registry: RegistryHandle,
    subscribers: Vec<Arc<dyn Subscribe>>,
    clock: Option<Clock>,
    state: watch::Sender<PollerState>,
}

impl Shared {
    fn set_state(&self, state: PollerState) {
        self.state.send_replace(state);
    }

    fn report(&self, err: &ScrapeError) {
        self.bus.publish(
            Event::error(err.to_string()).with_api_path_opt(err.api_path()),
        );
    }

    async fn flush(&self) {
        if let Err(e) = self.store.flush().await {
            self.report(&ScrapeError::Store(e));
        }
    }
}

struct Running {
    token: CancellationToken,
    cycles: JoinHandle<()>,
    listener_token: CancellationToken,
    listener: JoinHandle<()>,
}

/// Continuously synchronizes the store with the remote and republishes the
/// registry.
///
/// ## Example
/// ```rust
/// use std::sync::Arc;
/// use deploy_registry::{ApiToken, Config, MemorySource, Poller, PollerState, RawDeployment};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), deploy_registry::ScrapeError> {
/// let source = Arc::new(MemorySource::new());
/// source.set_listing([RawDeployment {
///     uid: Some("d1".into()),
///     name: Some("svc".into()),
///     url: Some("svc-d1.example".into()),
///     created: Some(1),
/// }]);
///
/// let poller = Poller::builder(Config::default(), source).build();
/// poller.start(ApiToken::new("token")).await?;
/// assert_ne!(poller.state(), PollerState::Stopped);
///
/// poller.stop().await;
/// assert_eq!(poller.state(), PollerState::Stopped);
/// # Ok(())
/// # }
/// ```
pub struct Poller {
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
}

impl Poller {
    /// Starts configuring a poller reading from `source`.
    pub fn builder(config: Config, source: Arc<dyn RemoteSource>) -> PollerBuilder {
        PollerBuilder::new(config, source)
    }

    pub(super) fn from_parts(
        config: Config,
        bus: Bus,
        source: Arc<dyn RemoteSource>,
        store: Arc<dyn RecordStore>,
        registry: RegistryHandle,
        subscribers: Vec<Arc<dyn Subscribe>>,
        clock: Option<Clock>,
    ) -> Self {
        let (state, _rx) = watch::channel(PollerState::Stopped);
        Self {
            shared: Arc::new(Shared {
                config,
                bus,
                source,
                store,
                registry,
                subscribers,
                clock,
                state,
            }),
            running: Mutex::new(None),
        }
    }

    /// Event bus every stage publishes to.
    pub fn bus(&self) -> &Bus {
        &self.shared.bus
    }

    /// Published registry.
    pub fn registry(&self) -> RegistryHandle {
        self.shared.registry.clone()
    }

    /// Record store the poller writes through.
    pub fn store(&self) -> Arc<dyn RecordStore> {
        Arc::clone(&self.shared.store)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PollerState {
        *self.shared.state.borrow()
    }

    /// Receiver notified on every state change.
    pub fn watch_state(&self) -> watch::Receiver<PollerState> {
        self.shared.state.subscribe()
    }

    /// Loads the store, fixes its integrity and starts cycling.
    ///
    /// The first reconcile starts immediately.
    ///
    /// # Errors
    /// - [`ScrapeError::AlreadyStarted`] unless the poller is stopped
    /// - [`ScrapeError::Store`] if the store cannot be loaded; the poller stays stopped
    pub async fn start(&self, api_token: ApiToken) -> Result<(), ScrapeError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(ScrapeError::AlreadyStarted);
        }
        let shared = &self.shared;
        shared.set_state(PollerState::Starting);

        let listener_token = CancellationToken::new();
        let listener = spawn_listener(shared, listener_token.clone());

        let loaded = match shared.store.load().await {
            Ok(n) => n,
            Err(e) => {
                let err = ScrapeError::Store(e);
                shared.report(&err);
                shared.set_state(PollerState::Stopped);
                listener_token.cancel();
                let _ = listener.await;
                return Err(err);
            }
        };
        let removed = fix_integrity(shared.store.as_ref(), &shared.bus).await;
        shared.set_state(PollerState::Running);
        shared.bus.publish(
            Event::new(EventKind::PollerStarted).with_reason(format!(
                "{loaded} records loaded, {} removed",
                removed.len()
            )),
        );

        let token = CancellationToken::new();
        let cycles = tokio::spawn(run_cycles(Arc::clone(shared), api_token, token.clone()));

        *running = Some(Running {
            token,
            cycles,
            listener_token,
            listener,
        });
        Ok(())
    }

    /// Stops cycling and waits for the loop to exit.
    ///
    /// Cancels the pending wait or the in-flight cycle, flushes the store and
    /// drains the subscribers. Does nothing if the poller is stopped.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };
        let shared = &self.shared;

        running.token.cancel();
        let _ = running.cycles.await;
        shared.flush().await;

        shared.set_state(PollerState::Stopped);
        shared.bus.publish(Event::new(EventKind::PollerStopped));

        running.listener_token.cancel();
        let _ = running.listener.await;
    }

    /// Starts, runs until SIGINT/SIGTERM/SIGQUIT (Ctrl-C elsewhere), then stops.
    ///
    /// # Errors
    /// Propagates [`Poller::start`] errors and signal registration failures;
    /// the poller is stopped in every case.
    pub async fn run_until_shutdown(&self, api_token: ApiToken) -> Result<(), ScrapeError> {
        self.start(api_token).await?;
        let waited = shutdown::wait_for_shutdown_signal().await;
        if waited.is_ok() {
            self.shared.bus.publish(Event::new(EventKind::ShutdownRequested));
        }
        self.stop().await;
        waited.map_err(ScrapeError::Signal)
    }
}

/// Forwards bus events to the subscribers until `token` is cancelled, then
/// delivers whatever is still queued and waits for the subscribers to drain.
fn spawn_listener(shared: &Shared, token: CancellationToken) -> JoinHandle<()> {
    let mut rx = shared.bus.subscribe();
    let set = SubscriberSet::new(shared.subscribers.clone(), shared.bus.clone());

    tokio::spawn(async move {
        loop {
            select! {
                biased;
                ev = rx.recv() => match ev {
                    Ok(ev) => set.emit(&ev),
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                },
                _ = token.cancelled() => break,
            }
        }
        while let Ok(ev) = rx.try_recv() {
            set.emit(&ev);
        }
        set.shutdown().await;
    })
}

async fn run_cycles(shared: Arc<Shared>, api_token: ApiToken, token: CancellationToken) {
    let mut driver = EnrichmentDriver::new(
        Arc::clone(&shared.source),
        Arc::clone(&shared.store),
        api_token.clone(),
        shared.bus.clone(),
        shared.config.clone(),
    );
    if let Some(clock) = &shared.clock {
        driver = driver.with_clock(Arc::clone(clock));
    }

    let mut cycle: u64 = 0;
    while !token.is_cancelled() {
        cycle = cycle.wrapping_add(1);
        shared.set_state(PollerState::Running);
        shared
            .bus
            .publish(Event::new(EventKind::CycleStarted).with_cycle(cycle));

        let Some(delay) = run_cycle(&shared, &driver, &api_token, &token).await else {
            break;
        };
        shared.flush().await;

        shared.set_state(PollerState::Waiting);
        select! {
            _ = time::sleep(delay) => {}
            _ = token.cancelled() => break,
        }
    }
}

/// One reconcile → enrich → rebuild pass.
///
/// Returns the delay before the next cycle, or `None` if the pass observed
/// the stop.
async fn run_cycle(
    shared: &Shared,
    driver: &EnrichmentDriver,
    api_token: &ApiToken,
    token: &CancellationToken,
) -> Option<Duration> {
    let reconciled = select! {
        r = reconcile(shared.source.as_ref(), api_token, shared.store.as_ref(), &shared.bus) => r,
        _ = token.cancelled() => return None,
    };

    let report = match reconciled {
        Ok(report) => report,
        Err(err) => {
            shared.report(&err);
            return Some(shared.config.idle_delay);
        }
    };

    if report.is_idle() {
        rebuild_registry(shared.store.as_ref(), &shared.registry, &shared.bus).await;
        return Some(shared.config.idle_delay);
    }

    let summary = driver.run(report.pending, token).await;
    if token.is_cancelled() {
        return None;
    }
    shared.bus.info(format!(
        "{} deployments scraped, {} failed",
        summary.completed, summary.failed
    ));
    rebuild_registry(shared.store.as_ref(), &shared.registry, &shared.bus).await;
    Some(shared.config.busy_delay)
}
