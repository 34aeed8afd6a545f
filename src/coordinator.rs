use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{Notify, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::client::ApiSession;
use crate::device::Device;
use crate::home::{Home, User};
use crate::scheduler::{Clock, PollScheduler, PollState, SchedulerConfig, SystemClock};
use crate::types::{Event, HeatMode, TempSlot, Temperature};
use crate::{Error, Result};

type EventCallback = Box<dyn Fn(&Event) + Send + Sync>;
type TokenCallback = Box<dyn Fn(&str) + Send + Sync>;

/// A home shared with consumers. Merges take the write lock once, so a
/// reader sees either the previous or the fully merged state.
pub type SharedHome = Arc<RwLock<Home>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The scheduler said this tick is not due.
    Skipped,
    Polled,
}

pub struct CoordinatorBuilder<C: Clock = SystemClock> {
    session: Arc<ApiSession>,
    scheduler: SchedulerConfig,
    clock: C,
    event_callbacks: Vec<EventCallback>,
    token_callbacks: Vec<TokenCallback>,
}

impl CoordinatorBuilder<SystemClock> {
    pub fn new(session: Arc<ApiSession>) -> Self {
        Self {
            session,
            scheduler: SchedulerConfig::default(),
            clock: SystemClock,
            event_callbacks: Vec::new(),
            token_callbacks: Vec::new(),
        }
    }
}

impl<C: Clock> CoordinatorBuilder<C> {
    pub fn scheduler(mut self, config: SchedulerConfig) -> Self {
        self.scheduler = config;
        self
    }

    pub fn clock<C2: Clock>(self, clock: C2) -> CoordinatorBuilder<C2> {
        CoordinatorBuilder {
            session: self.session,
            scheduler: self.scheduler,
            clock,
            event_callbacks: self.event_callbacks,
            token_callbacks: self.token_callbacks,
        }
    }

    pub fn on_event(mut self, f: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        self.event_callbacks.push(Box::new(f));
        self
    }

    /// Called with the new token whenever it differs from the last one seen,
    /// so the host can persist it.
    pub fn on_token_rotated(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.token_callbacks.push(Box::new(f));
        self
    }

    pub fn build(self) -> Coordinator<C> {
        let reported_token = self.session.token();
        let next_interval = self.scheduler.standard_interval;
        Coordinator {
            session: self.session,
            scheduler: Mutex::new(PollScheduler::with_clock(self.scheduler, self.clock)),
            user: RwLock::new(None),
            homes: RwLock::new(BTreeMap::new()),
            next_interval: Mutex::new(next_interval),
            reported_token: Mutex::new(reported_token),
            wake: Notify::new(),
            poll_lock: tokio::sync::Mutex::new(()),
            event_callbacks: self.event_callbacks,
            token_callbacks: self.token_callbacks,
        }
    }
}

/// Drives polling for one account and routes device writes.
pub struct Coordinator<C: Clock = SystemClock> {
    session: Arc<ApiSession>,
    scheduler: Mutex<PollScheduler<C>>,
    user: RwLock<Option<User>>,
    homes: RwLock<BTreeMap<String, SharedHome>>,
    next_interval: Mutex<Duration>,
    reported_token: Mutex<Option<String>>,
    wake: Notify,
    poll_lock: tokio::sync::Mutex<()>,
    event_callbacks: Vec<EventCallback>,
    token_callbacks: Vec<TokenCallback>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl Coordinator<SystemClock> {
    pub fn builder(session: Arc<ApiSession>) -> CoordinatorBuilder<SystemClock> {
        CoordinatorBuilder::new(session)
    }
}

impl<C: Clock> Coordinator<C> {
    pub fn session(&self) -> &Arc<ApiSession> {
        &self.session
    }

    pub async fn user(&self) -> Option<User> {
        self.user.read().await.clone()
    }

    pub async fn homes(&self) -> BTreeMap<String, SharedHome> {
        self.homes.read().await.clone()
    }

    pub async fn home(&self, home_id: &str) -> Result<SharedHome> {
        self.homes
            .read()
            .await
            .get(home_id)
            .cloned()
            .ok_or_else(|| Error::UnknownHome(home_id.to_string()))
    }

    pub fn poll_state(&self) -> PollState {
        lock(&self.scheduler).state()
    }

    /// Delay the loop will wait before its next tick.
    pub fn next_interval(&self) -> Duration {
        *lock(&self.next_interval)
    }

    fn set_next_interval(&self, interval: Duration) {
        *lock(&self.next_interval) = interval;
    }

    /// Run one scheduler tick, polling the API if it is due.
    ///
    /// Authentication failures are returned without touching the backoff;
    /// any other failure moves the scheduler into (or deeper into) backoff.
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        let _guard = self.poll_lock.lock().await;

        let decision = lock(&self.scheduler).on_update_tick();
        self.set_next_interval(decision.next_interval);
        if !decision.poll_now {
            trace!(wait = ?decision.next_interval, "update skipped");
            return Ok(RefreshOutcome::Skipped);
        }

        match self.poll_homes().await {
            Ok(()) => {
                self.check_token_rotation();
                let interval = lock(&self.scheduler).on_success();
                self.set_next_interval(interval);
                Ok(RefreshOutcome::Polled)
            }
            Err(e) if e.is_auth() => {
                error!(error = %e, "authorization failed");
                Err(e)
            }
            Err(e) => {
                let backoff = lock(&self.scheduler).on_error();
                self.set_next_interval(backoff);
                warn!(error = %e, backoff = ?backoff, "refresh failed, backing off");
                Err(e)
            }
        }
    }

    /// Refresh every home listed on the account. Known homes are merged in
    /// place; homes not hydrated yet (first run, or an earlier failed read)
    /// are created.
    async fn poll_homes(&self) -> Result<()> {
        let cached = self.user.read().await.clone();
        let user = match cached {
            Some(user) => user,
            None => {
                let user = self.session.get_user().await?;
                *self.user.write().await = Some(user.clone());
                user
            }
        };

        for home_id in user.homes.keys() {
            let known = self.homes.read().await.get(home_id).cloned();
            let data = self.session.read_home(home_id).await?;
            let events = match known {
                Some(home) => home.write().await.apply_snapshot(&data)?,
                None => {
                    let mut home = Home::new(home_id.clone());
                    let events = home.apply_snapshot(&data)?;
                    self.homes
                        .write()
                        .await
                        .insert(home_id.clone(), Arc::new(RwLock::new(home)));
                    info!(home_id = %home_id, "retrieved home");
                    events
                }
            };
            self.dispatch(&events);
        }
        debug!(homes = user.homes.len(), "refreshed homes");
        Ok(())
    }

    fn check_token_rotation(&self) {
        let current = self.session.token();
        let mut reported = lock(&self.reported_token);
        if current.is_none() || *reported == current {
            return;
        }
        debug!("token updated");
        if let Some(token) = &current {
            for cb in &self.token_callbacks {
                cb(token);
            }
        }
        *reported = current;
    }

    fn dispatch(&self, events: &[Event]) {
        for event in events {
            for cb in &self.event_callbacks {
                cb(event);
            }
        }
    }

    /// Ask for a burst of quick polls. When the scheduler was on its standard
    /// cadence the running loop is woken so it reschedules right away.
    pub fn request_quick_window(&self, count: Option<u32>) -> bool {
        let wake = lock(&self.scheduler).request_quick_window(count);
        if wake {
            self.wake.notify_one();
        }
        wake
    }

    /// Poll on the scheduler's cadence until `cancel` fires.
    ///
    /// Transient failures are logged and retried after backoff. An
    /// authentication failure ends the loop and is returned so the host can
    /// re-authenticate.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        loop {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                outcome = self.refresh() => outcome,
            };
            if let Err(e) = outcome
                && e.is_auth()
            {
                return Err(e);
            }

            let wait = self.next_interval();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.wake.notified() => trace!("woken for quick update"),
                _ = tokio::time::sleep(wait) => {}
            }
        }
        debug!("refresh loop stopped");
        Ok(())
    }

    // -- Write commands --

    /// Write a radiator setpoint and mirror it locally right away.
    pub async fn set_temperature(
        &self,
        home_id: &str,
        device_id: &str,
        slot: TempSlot,
        temp: Temperature,
    ) -> Result<()> {
        let home = self.home(home_id).await?;
        let query = {
            let home = home.read().await;
            let device = home
                .device(device_id)
                .ok_or_else(|| Error::UnknownDevice(device_id.to_string()))?;
            device.temperature_query(slot, temp)?
        };
        self.session.push_query(home_id, "set_temperature", &query).await?;

        let events = {
            let mut home = home.write().await;
            let device = home
                .device_mut(device_id)
                .ok_or_else(|| Error::UnknownDevice(device_id.to_string()))?;
            device.apply_temperature(slot, temp)?;
            let radiator = device.as_radiator();
            let mut events = vec![Event::TemperatureChanged {
                home_id: home_id.to_string(),
                device_id: device_id.to_string(),
                slot,
                temp: radiator.and_then(|r| r.temperature(slot)),
            }];
            if radiator.and_then(|r| r.temp_slot()) == Some(slot) {
                events.push(Event::TemperatureChanged {
                    home_id: home_id.to_string(),
                    device_id: device_id.to_string(),
                    slot: TempSlot::Target,
                    temp: radiator.and_then(|r| r.target()),
                });
            }
            events
        };
        self.dispatch(&events);
        self.request_quick_window(None);
        Ok(())
    }

    /// Change a radiator's heat mode. Local state follows on the next poll.
    pub async fn set_heat_mode(&self, home_id: &str, device_id: &str, mode: HeatMode) -> Result<()> {
        let query = self
            .with_device(home_id, device_id, |d| d.mode_query(mode))
            .await?;
        self.session.push_query(home_id, "set_heat_mode", &query).await?;
        self.request_quick_window(None);
        Ok(())
    }

    pub async fn activate_boost(
        &self,
        home_id: &str,
        device_id: &str,
        duration: Duration,
        temp: Option<Temperature>,
    ) -> Result<()> {
        let query = self
            .with_device(home_id, device_id, |d| d.boost_query(duration, temp))
            .await?;
        self.session.push_query(home_id, "activate_boost", &query).await?;
        self.request_quick_window(None);
        Ok(())
    }

    pub async fn set_on_off(&self, home_id: &str, device_id: &str, on: bool) -> Result<()> {
        let query = self
            .with_device(home_id, device_id, |d| d.on_off_query(on))
            .await?;
        self.session.push_query(home_id, "set_on_off", &query).await?;
        self.request_quick_window(None);
        Ok(())
    }

    async fn with_device<T>(
        &self,
        home_id: &str,
        device_id: &str,
        f: impl FnOnce(&Device) -> Result<T>,
    ) -> Result<T> {
        let home = self.home(home_id).await?;
        let home = home.read().await;
        let device = home
            .device(device_id)
            .ok_or_else(|| Error::UnknownDevice(device_id.to_string()))?;
        f(device)
    }
}
