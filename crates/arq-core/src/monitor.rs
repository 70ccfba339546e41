//! Network status monitoring: reachability, quality probes, change events.
//!
//! One monitor owns the process-wide [`NetworkState`]; every other
//! component only reads it. Reachability (`Online`/`Offline`) comes from
//! the host via [`NetworkMonitor::set_online`]/[`NetworkMonitor::set_offline`]
//! and is authoritative; quality (`Fast`/`Slow`) is inferred from periodic
//! lightweight probes while online. Listeners are notified synchronously on
//! every status transition, in registration order, and never for a repeat
//! of the current status.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::transport::{RequestDescriptor, Transport};

/// Probe RTT below this means a fast connection.
const FAST_RTT: Duration = Duration::from_millis(300);
/// Probe RTT below this means a nominal connection; anything slower (or a
/// failed probe while nominally online) means slow.
const ONLINE_RTT: Duration = Duration::from_millis(1000);
/// How many probe RTTs to keep for averaging.
const PING_HISTORY: usize = 5;

/// Connectivity status, coarsest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    Online,
    Offline,
    Slow,
    Fast,
}

impl NetworkStatus {
    pub fn is_online(&self) -> bool {
        !matches!(self, NetworkStatus::Offline)
    }
}

/// Physical connection type, when the host platform can report one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionType {
    Wifi,
    Cellular2g,
    Cellular3g,
    Cellular4g,
    Cellular5g,
    Ethernet,
    #[default]
    Unknown,
}

impl ConnectionType {
    /// Connections where requests should be stretched (longer timeouts,
    /// longer cache lifetimes).
    pub fn is_constrained(&self) -> bool {
        matches!(self, ConnectionType::Cellular2g | ConnectionType::Cellular3g)
    }
}

/// Snapshot of the current network condition.
#[derive(Debug, Clone)]
pub struct NetworkState {
    pub status: NetworkStatus,
    pub conn_type: ConnectionType,
    pub last_ping: Option<Duration>,
}

type Listener = Arc<dyn Fn(&NetworkState) + Send + Sync>;

struct MonitorInner {
    state: NetworkState,
    listeners: Vec<(u64, Listener)>,
    next_listener: u64,
    ping_history: VecDeque<Duration>,
}

/// The monitor. Cheap to clone; clones share one state.
#[derive(Clone)]
pub struct NetworkMonitor {
    inner: Arc<Mutex<MonitorInner>>,
    probe_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

/// Handle returned by [`NetworkMonitor::add_listener`]; keep it to
/// unsubscribe later.
pub struct Subscription {
    id: u64,
    inner: Weak<Mutex<MonitorInner>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(inner) = self.inner.upgrade() {
            inner
                .lock()
                .unwrap()
                .listeners
                .retain(|(id, _)| *id != self.id);
        }
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkMonitor {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MonitorInner {
                state: NetworkState {
                    status: NetworkStatus::Online,
                    conn_type: ConnectionType::Unknown,
                    last_ping: None,
                },
                listeners: Vec::new(),
                next_listener: 0,
                ping_history: VecDeque::new(),
            })),
            probe_task: Arc::new(Mutex::new(None)),
        }
    }

    pub fn state(&self) -> NetworkState {
        self.inner.lock().unwrap().state.clone()
    }

    pub fn is_online(&self) -> bool {
        self.inner.lock().unwrap().state.status.is_online()
    }

    /// Registers a status listener. It is invoked immediately with the
    /// current state, then once per status transition.
    pub fn add_listener(
        &self,
        listener: impl Fn(&NetworkState) + Send + Sync + 'static,
    ) -> Subscription {
        let listener: Listener = Arc::new(listener);
        let (id, state) = {
            let mut inner = self.inner.lock().unwrap();
            inner.next_listener += 1;
            let id = inner.next_listener;
            inner.listeners.push((id, Arc::clone(&listener)));
            (id, inner.state.clone())
        };
        listener(&state);
        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Host signal: connectivity restored. Quality is refined by the next
    /// probe.
    pub fn set_online(&self) {
        self.transition(NetworkStatus::Online);
    }

    /// Host signal: connectivity lost. Authoritative until `set_online`;
    /// probes never override it.
    pub fn set_offline(&self) {
        self.transition(NetworkStatus::Offline);
    }

    /// Host signal: platform connection info changed. Updates the state
    /// snapshot without notifying (only status transitions notify).
    pub fn set_connection_type(&self, conn_type: ConnectionType) {
        self.inner.lock().unwrap().state.conn_type = conn_type;
    }

    /// Records the outcome of one quality probe: `Some(rtt)` on success,
    /// `None` on timeout or transport failure. Ignored while offline.
    pub fn record_probe(&self, rtt: Option<Duration>) {
        let (listeners, state) = {
            let mut inner = self.inner.lock().unwrap();
            if inner.state.status == NetworkStatus::Offline {
                return;
            }
            let new_status = match rtt {
                Some(rtt) => {
                    inner.ping_history.push_back(rtt);
                    while inner.ping_history.len() > PING_HISTORY {
                        inner.ping_history.pop_front();
                    }
                    inner.state.last_ping = Some(rtt);
                    if rtt < FAST_RTT {
                        NetworkStatus::Fast
                    } else if rtt < ONLINE_RTT {
                        NetworkStatus::Online
                    } else {
                        NetworkStatus::Slow
                    }
                }
                None => NetworkStatus::Slow,
            };
            if inner.state.status == new_status {
                return;
            }
            inner.state.status = new_status;
            (snapshot_listeners(&inner), inner.state.clone())
        };
        notify(&listeners, &state);
    }

    /// Mean of the recent probe RTTs, if any probe has succeeded yet.
    pub fn average_ping(&self) -> Option<Duration> {
        let inner = self.inner.lock().unwrap();
        if inner.ping_history.is_empty() {
            return None;
        }
        let total: Duration = inner.ping_history.iter().sum();
        Some(total / inner.ping_history.len() as u32)
    }

    /// Starts the periodic quality probe against `ping_url`. The probe is a
    /// HEAD request with a short timeout; its failures never propagate,
    /// they only degrade `status`. Restarting replaces the old task.
    pub fn start_monitoring(
        &self,
        transport: Arc<dyn Transport>,
        ping_url: &str,
        frequency: Duration,
        probe_timeout: Duration,
    ) {
        let monitor = self.clone();
        let ping_url = ping_url.to_string();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(frequency);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !monitor.is_online() {
                    continue;
                }
                let request =
                    RequestDescriptor::head(ping_url.as_str()).with_timeout(probe_timeout);
                let started = std::time::Instant::now();
                let rtt = match transport.execute(&request).await {
                    Ok(_) => Some(started.elapsed()),
                    Err(err) => {
                        tracing::debug!(error = %err, "quality probe failed");
                        None
                    }
                };
                monitor.record_probe(rtt);
            }
        });
        if let Some(old) = self.probe_task.lock().unwrap().replace(handle) {
            old.abort();
        }
    }

    pub fn stop_monitoring(&self) {
        if let Some(handle) = self.probe_task.lock().unwrap().take() {
            handle.abort();
        }
    }

    fn transition(&self, status: NetworkStatus) {
        let (listeners, state) = {
            let mut inner = self.inner.lock().unwrap();
            if inner.state.status == status {
                return;
            }
            inner.state.status = status;
            (snapshot_listeners(&inner), inner.state.clone())
        };
        notify(&listeners, &state);
    }
}

fn snapshot_listeners(inner: &MonitorInner) -> Vec<Listener> {
    inner
        .listeners
        .iter()
        .map(|(_, listener)| Arc::clone(listener))
        .collect()
}

// Listeners run outside the lock so they may freely read the monitor, but
// still synchronously within the mutating call, in registration order.
fn notify(listeners: &[Listener], state: &NetworkState) {
    for listener in listeners {
        listener(state);
    }
}
