use std::time::Duration;

use chrono::Local;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::client::{Acquisition, SensorClient};
use crate::command::Command;
use crate::config::{DEFAULT_POLL_INTERVAL_SECS, MAX_SENSOR, MIN_SENSOR};
use crate::reading::SensorReading;
use crate::synthetic::TIME_FORMAT;

/// What the display shows. Changes only through the transition methods below.
#[derive(Debug, Clone, PartialEq)]
pub struct PollerState {
    pub selected: u32,
    pub reading: Option<SensorReading>,
    pub fault: Option<String>,
    pub last_update: Option<String>,
    pub in_flight: bool,
}

impl PollerState {
    pub fn new(selected: u32) -> Self {
        Self {
            selected: selected.clamp(MIN_SENSOR, MAX_SENSOR),
            reading: None,
            fault: None,
            last_update: None,
            in_flight: false,
        }
    }

    /// Switches to sensor `id`. Returns `false` if `id` is out of range or
    /// already selected.
    pub fn select_sensor(&mut self, id: u32) -> bool {
        if !(MIN_SENSOR..=MAX_SENSOR).contains(&id) || id == self.selected {
            return false;
        }
        self.selected = id;
        self.fault = None;
        self.in_flight = false;
        true
    }

    pub fn step(&mut self, delta: i64) -> bool {
        match u32::try_from(i64::from(self.selected) + delta) {
            Ok(id) => self.select_sensor(id),
            Err(_) => false,
        }
    }

    pub fn poll_started(&mut self) {
        self.in_flight = true;
    }

    pub fn poll_succeeded(&mut self, tag: u32, reading: SensorReading) -> bool {
        self.apply(tag, reading, None)
    }

    pub fn poll_failed(&mut self, tag: u32, reading: SensorReading, fault: String) -> bool {
        self.apply(tag, reading, Some(fault))
    }

    fn apply(&mut self, tag: u32, reading: SensorReading, fault: Option<String>) -> bool {
        if tag != self.selected {
            return false;
        }
        self.reading = Some(reading);
        self.fault = fault;
        self.last_update = Some(Local::now().format(TIME_FORMAT).to_string());
        self.in_flight = false;
        true
    }
}

/// Drives periodic acquisition for the selected sensor and publishes a state
/// snapshot after every change.
#[derive(Debug)]
pub struct Poller {
    client: SensorClient,
    interval: Duration,
    state: PollerState,
}

impl Poller {
    /// A zero `interval` falls back to the default polling period.
    pub fn new(client: SensorClient, initial_sensor: u32, interval: Duration) -> Self {
        let interval = if interval.is_zero() {
            log::warn!("Zero polling interval, using {DEFAULT_POLL_INTERVAL_SECS}s");
            Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS)
        } else {
            interval
        };

        Self {
            client,
            interval,
            state: PollerState::new(initial_sensor),
        }
    }

    pub fn state(&self) -> &PollerState {
        &self.state
    }

    /// Runs until `Quit` arrives, the command channel closes, or nobody
    /// listens on `updates` anymore.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        updates: mpsc::Sender<PollerState>,
    ) {
        let (done_tx, mut done_rx) = mpsc::channel::<(u32, Acquisition)>(4);
        let mut in_flight: Option<JoinHandle<()>> = None;

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let changed = tokio::select! {
                _ = ticker.tick() => {
                    if in_flight.as_ref().is_some_and(|h| !h.is_finished()) {
                        log::debug!("Sensor {}: previous poll still running", self.state.selected);
                        false
                    } else {
                        in_flight = Some(self.spawn_poll(done_tx.clone()));
                        true
                    }
                }
                Some((tag, acquisition)) = done_rx.recv() => {
                    let Acquisition { reading, fault } = acquisition;
                    log::info!("{reading:?}");
                    let applied = match fault {
                        None => self.state.poll_succeeded(tag, reading),
                        Some(fault) => self.state.poll_failed(tag, reading, fault.to_string()),
                    };
                    if !applied {
                        log::debug!(
                            "Discarding stale reading for sensor {tag}, sensor {} is selected",
                            self.state.selected
                        );
                    }
                    applied
                }
                command = commands.recv() => match command {
                    None | Some(Command::Quit) => break,
                    Some(Command::Refresh) => {
                        if !in_flight.as_ref().is_some_and(|h| !h.is_finished()) {
                            ticker.reset_immediately();
                        }
                        false
                    }
                    Some(Command::Previous) => self.switch(-1, &mut in_flight, &mut ticker),
                    Some(Command::Next) => self.switch(1, &mut in_flight, &mut ticker),
                },
            };

            if changed && updates.send(self.state.clone()).await.is_err() {
                log::debug!("State receiver dropped, stopping poller");
                break;
            }
        }

        if let Some(handle) = in_flight {
            handle.abort();
        }
    }

    fn switch(
        &mut self,
        delta: i64,
        in_flight: &mut Option<JoinHandle<()>>,
        ticker: &mut tokio::time::Interval,
    ) -> bool {
        let previous = self.state.selected;
        if !self.state.step(delta) {
            log::debug!("Sensor {previous} is at the edge of the range");
            return false;
        }

        log::info!("Switched from sensor {previous} to sensor {}", self.state.selected);
        if let Some(handle) = in_flight.take() {
            handle.abort();
        }
        ticker.reset_immediately();
        true
    }

    fn spawn_poll(&mut self, done: mpsc::Sender<(u32, Acquisition)>) -> JoinHandle<()> {
        let tag = self.state.selected;
        let client = self.client.clone();
        self.state.poll_started();

        tokio::spawn(async move {
            let acquisition = client.acquire_traced(tag).await;
            // The poller may be gone already.
            let _ = done.send((tag, acquisition)).await;
        })
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::{Json, Router};
    use reqwest::Client;
    use url::Url;

    use super::*;
    use crate::reading::Status;

    fn reading(id: u32) -> SensorReading {
        SensorReading {
            id,
            temperature: "21.0".into(),
            humidity: "40.0".into(),
            location: format!("Lab {id}"),
            status: Status::Ok,
            last_updated: "12:00:00".into(),
            battery: "90".into(),
            co2: "420".into(),
        }
    }

    #[test]
    fn test_select_sensor_bounds() {
        let mut state = PollerState::new(1);
        assert!(!state.select_sensor(0));
        assert!(!state.select_sensor(9));
        assert!(!state.select_sensor(1));
        assert!(state.select_sensor(8));
        assert_eq!(state.selected, 8);

        assert!(!state.step(1));
        assert!(state.step(-1));
        assert_eq!(state.selected, 7);

        let mut state = PollerState::new(1);
        assert!(!state.step(-1));
        assert_eq!(state.selected, 1);
    }

    #[test]
    fn test_poll_transitions() {
        let mut state = PollerState::new(2);
        state.poll_started();
        assert!(state.in_flight);

        assert!(state.poll_failed(2, reading(2), "server responded with 500".into()));
        assert_eq!(state.fault.as_deref(), Some("server responded with 500"));
        assert!(state.last_update.is_some());
        assert!(!state.in_flight);

        assert!(state.poll_succeeded(2, reading(2)));
        assert!(state.fault.is_none());
        assert_eq!(state.reading, Some(reading(2)));
    }

    #[test]
    fn test_stale_result_is_discarded() {
        let mut state = PollerState::new(1);
        state.poll_started();
        assert!(state.select_sensor(2));

        let before = state.clone();
        assert!(!state.poll_succeeded(1, reading(1)));
        assert!(!state.poll_failed(1, reading(1), "timeout".into()));
        assert_eq!(state, before);
    }

    #[test]
    fn test_select_clears_fault() {
        let mut state = PollerState::new(3);
        state.poll_failed(3, reading(3), "timeout".into());
        assert!(state.select_sensor(4));
        assert!(state.fault.is_none());
        // The previous reading stays on screen until the new one lands.
        assert_eq!(state.reading, Some(reading(3)));
    }

    #[test]
    fn test_zero_interval_uses_default() {
        let client = SensorClient::with_http(
            Client::new(),
            Url::parse("http://127.0.0.1:9/sensors").unwrap(),
        );
        let poller = Poller::new(client.clone(), 1, Duration::ZERO);
        assert_eq!(poller.interval, Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS));

        let poller = Poller::new(client, 1, Duration::from_millis(250));
        assert_eq!(poller.interval, Duration::from_millis(250));
    }

    fn counting_router(hits: Arc<AtomicUsize>, delay: Duration) -> Router {
        Router::new().route(
            "/sensors/{id}",
            get(move |Path(id): Path<u32>| {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(delay).await;
                    Json(reading(id))
                }
            }),
        )
    }

    async fn spawn_server(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    fn client_for(addr: SocketAddr) -> SensorClient {
        let http = Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap();
        SensorClient::with_http(http, Url::parse(&format!("http://{addr}/sensors")).unwrap())
    }

    async fn wait_for<F>(updates: &mut mpsc::Receiver<PollerState>, mut pred: F) -> PollerState
    where
        F: FnMut(&PollerState) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let state = updates.recv().await.expect("poller stopped");
                if pred(&state) {
                    return state;
                }
            }
        })
        .await
        .expect("timed out waiting for state")
    }

    #[tokio::test]
    async fn test_polls_and_switches_sensor() {
        let router = Router::new().route(
            "/sensors/{id}",
            get(|Path(id): Path<u32>| async move { Json(reading(id)) }),
        );
        let addr = spawn_server(router).await;

        let poller = Poller::new(client_for(addr), 1, Duration::from_millis(100));
        assert_eq!(poller.state().selected, 1);

        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (upd_tx, mut upd_rx) = mpsc::channel(64);
        let task = tokio::spawn(poller.run(cmd_rx, upd_tx));

        let state = wait_for(&mut upd_rx, |s| s.reading.is_some()).await;
        assert_eq!(state.reading, Some(reading(1)));
        assert!(state.fault.is_none());

        cmd_tx.send(Command::Next).await.unwrap();
        let state = wait_for(&mut upd_rx, |s| {
            s.reading.as_ref().is_some_and(|r| r.id == 2)
        })
        .await;
        assert_eq!(state.selected, 2);
        assert_eq!(state.reading, Some(reading(2)));

        cmd_tx.send(Command::Quit).await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("poller did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_failure_sets_fault_flag() {
        let router = Router::new().route(
            "/sensors/{id}",
            get(|| async { StatusCode::SERVICE_UNAVAILABLE.into_response() }),
        );
        let addr = spawn_server(router).await;

        let poller = Poller::new(client_for(addr), 5, Duration::from_millis(100));
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (upd_tx, mut upd_rx) = mpsc::channel(64);
        let task = tokio::spawn(poller.run(cmd_rx, upd_tx));

        let state = wait_for(&mut upd_rx, |s| s.reading.is_some()).await;
        assert!(state.fault.is_some());
        let synthetic = state.reading.unwrap();
        assert_eq!(synthetic.id, 5);
        assert_eq!(synthetic.location, "Room B");

        drop(cmd_tx);
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("poller did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_slow_reading_for_previous_sensor_never_lands() {
        let router = Router::new().route(
            "/sensors/{id}",
            get(|Path(id): Path<u32>| async move {
                if id == 1 {
                    tokio::time::sleep(Duration::from_millis(400)).await;
                }
                Json(reading(id))
            }),
        );
        let addr = spawn_server(router).await;

        let poller = Poller::new(client_for(addr), 1, Duration::from_secs(60));
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (upd_tx, mut upd_rx) = mpsc::channel(64);
        let task = tokio::spawn(poller.run(cmd_rx, upd_tx));

        let state = wait_for(&mut upd_rx, |s| s.in_flight).await;
        assert_eq!(state.selected, 1);
        cmd_tx.send(Command::Next).await.unwrap();

        let state = wait_for(&mut upd_rx, |s| s.reading.is_some()).await;
        assert_eq!(state.reading.map(|r| r.id), Some(2));

        let deadline = tokio::time::sleep(Duration::from_millis(600));
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                Some(state) = upd_rx.recv() => {
                    assert_eq!(state.selected, 2);
                    assert_ne!(state.reading.map(|r| r.id), Some(1));
                }
            }
        }

        cmd_tx.send(Command::Quit).await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_refresh_polls_immediately() {
        let hits = Arc::new(AtomicUsize::new(0));
        let addr = spawn_server(counting_router(hits.clone(), Duration::ZERO)).await;

        let poller = Poller::new(client_for(addr), 3, Duration::from_secs(60));
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (upd_tx, mut upd_rx) = mpsc::channel(64);
        let task = tokio::spawn(poller.run(cmd_rx, upd_tx));

        wait_for(&mut upd_rx, |s| s.reading.is_some()).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        cmd_tx.send(Command::Refresh).await.unwrap();
        wait_for(&mut upd_rx, |s| s.in_flight).await;
        let state = wait_for(&mut upd_rx, |s| !s.in_flight).await;
        assert_eq!(state.reading, Some(reading(3)));
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        cmd_tx.send(Command::Quit).await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_refresh_while_in_flight_is_ignored() {
        let hits = Arc::new(AtomicUsize::new(0));
        let addr = spawn_server(counting_router(hits.clone(), Duration::from_millis(300))).await;

        let poller = Poller::new(client_for(addr), 1, Duration::from_secs(60));
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (upd_tx, mut upd_rx) = mpsc::channel(64);
        let task = tokio::spawn(poller.run(cmd_rx, upd_tx));

        wait_for(&mut upd_rx, |s| s.in_flight).await;
        cmd_tx.send(Command::Refresh).await.unwrap();
        cmd_tx.send(Command::Refresh).await.unwrap();

        wait_for(&mut upd_rx, |s| s.reading.is_some()).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        cmd_tx.send(Command::Quit).await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_stops_when_updates_receiver_dropped() {
        let hits = Arc::new(AtomicUsize::new(0));
        let addr = spawn_server(counting_router(hits, Duration::ZERO)).await;

        let poller = Poller::new(client_for(addr), 1, Duration::from_millis(50));
        let (_cmd_tx, cmd_rx) = mpsc::channel(8);
        let (upd_tx, upd_rx) = mpsc::channel(64);
        drop(upd_rx);

        tokio::time::timeout(Duration::from_secs(2), poller.run(cmd_rx, upd_tx))
            .await
            .expect("poller kept running without a listener");
    }
}
