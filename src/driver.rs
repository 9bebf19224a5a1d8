//! The driver for one MySming peripheral.
//!
//! [`BleDriver`] is the control surface consumers use. Transport events and
//! sequencer timer firings are funnelled through one event loop task, so the
//! connection state, the measurement run and the timer are only ever mutated
//! by one event at a time.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::ble::connection::{ConnectionManager, ConnectionState, NotificationTarget};
use crate::ble::platform::BtleplugBackend;
use crate::ble::transport::{
    BleBackend, CharacteristicId, GattCharacteristic, GattEvent, GattEventReceiver,
    GattEventSender, GattService,
};
use crate::config::DriverConfig;
use crate::dispatcher;
use crate::error::Result;
use crate::events::{CallbackHandle, DriverEvent, EventBus};
use crate::sequencer::{MeasurementRun, Schedule, Sequencer, SequencerAction, TimerTag};

/// A sequencer timer that elapsed.
#[derive(Debug, Clone, Copy)]
struct TimerFired {
    tag: TimerTag,
    generation: u64,
}

/// Measurement run plus the one outstanding timer.
struct Measurement {
    sequencer: Sequencer,
    timer: Option<JoinHandle<()>>,
    /// Bumped whenever a timer is armed or cancelled; firings carrying an
    /// older value are ignored.
    generation: u64,
}

struct Receivers {
    gatt: GattEventReceiver,
    timer: mpsc::UnboundedReceiver<TimerFired>,
}

struct DriverInner {
    backend: Arc<dyn BleBackend>,
    connection: ConnectionManager,
    events: EventBus,
    measurement: Mutex<Measurement>,
    gatt_tx: GattEventSender,
    timer_tx: mpsc::UnboundedSender<TimerFired>,
    receivers: Mutex<Option<Receivers>>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

/// Driver for one MySming heart-rate / LSM330 peripheral.
///
/// Cloning yields another handle to the same driver.
#[derive(Clone)]
pub struct BleDriver {
    inner: Arc<DriverInner>,
}

impl BleDriver {
    /// Create a driver on top of a transport backend.
    pub fn new(backend: Arc<dyn BleBackend>, config: DriverConfig) -> Self {
        let (gatt_tx, gatt_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();

        Self {
            inner: Arc::new(DriverInner {
                backend,
                connection: ConnectionManager::new(),
                events: EventBus::new(config.event_capacity),
                measurement: Mutex::new(Measurement {
                    sequencer: Sequencer::new(&config),
                    timer: None,
                    generation: 0,
                }),
                gatt_tx,
                timer_tx,
                receivers: Mutex::new(Some(Receivers {
                    gatt: gatt_rx,
                    timer: timer_rx,
                })),
                event_loop: Mutex::new(None),
            }),
        }
    }

    /// Create a driver using the platform Bluetooth stack.
    pub fn platform(config: DriverConfig) -> Self {
        Self::new(Arc::new(BtleplugBackend::new()), config)
    }

    /// Acquire the Bluetooth adapter and start the event loop.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AdapterUnavailable`](crate::Error::AdapterUnavailable)
    /// if no adapter can be obtained.
    pub async fn initialize(&self) -> Result<()> {
        self.ensure_event_loop();
        self.inner
            .connection
            .initialize(self.inner.backend.as_ref(), self.inner.gatt_tx.clone())
            .await
    }

    /// Connect to the device at `address`.
    ///
    /// Returns once the attempt is under way. [`DriverEvent::Connected`] or
    /// [`DriverEvent::Disconnected`] reports the outcome.
    pub async fn connect(&self, address: &str) -> Result<()> {
        info!("Connecting to {}", address);
        self.inner.connection.connect(address).await
    }

    /// Request a disconnect. [`DriverEvent::Disconnected`] reports the outcome.
    pub async fn disconnect(&self) {
        self.inner.connection.disconnect().await;
    }

    /// Abandon any measurement run and release the connection.
    pub async fn close(&self) {
        self.inner.cancel_measurement();
        self.inner.connection.close().await;
    }

    /// Request a characteristic read. The value arrives as
    /// [`DriverEvent::DataAvailable`].
    pub async fn read_characteristic(&self, id: CharacteristicId) {
        self.inner.connection.read(id).await;
    }

    /// Request a characteristic write. Completion arrives as
    /// [`DriverEvent::DataWritten`].
    pub async fn write_characteristic(&self, id: CharacteristicId, value: &[u8]) {
        self.inner.connection.write(id, value.to_vec()).await;
    }

    /// Enable or disable notifications for a characteristic.
    ///
    /// Accepts either a [`GattCharacteristic`] from [`list_services`](Self::list_services)
    /// or a [`CharacteristicId`].
    pub async fn set_notification(
        &self,
        target: impl Into<NotificationTarget>,
        enabled: bool,
    ) -> Result<()> {
        self.inner
            .connection
            .set_notification(target.into(), enabled)
            .await
    }

    /// Services discovered on the connected device.
    pub fn list_services(&self) -> Option<Vec<GattService>> {
        self.inner.connection.list_services()
    }

    /// Look up a discovered characteristic.
    pub fn characteristic(&self, id: &CharacteristicId) -> Option<GattCharacteristic> {
        self.inner.connection.characteristic(id)
    }

    /// Start the measurement begin sequence.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MeasurementInProgress`](crate::Error::MeasurementInProgress)
    /// if a run is already active.
    pub fn start_measurement(&self) -> Result<()> {
        self.ensure_event_loop();
        if !self.connection_state().is_connected() {
            warn!("Starting measurement without a connection, writes will be dropped");
        }
        let mut measurement = self.inner.measurement.lock();
        let schedule = measurement.sequencer.start()?;
        self.inner.arm(&mut measurement, schedule);
        info!("Measurement starting");
        Ok(())
    }

    /// Start the measurement end sequence.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotMeasuring`](crate::Error::NotMeasuring) if no
    /// measurement is being started or running.
    pub fn stop_measurement(&self) -> Result<()> {
        self.ensure_event_loop();
        let mut measurement = self.inner.measurement.lock();
        let schedule = measurement.sequencer.stop()?;
        self.inner.arm(&mut measurement, schedule);
        info!("Measurement stopping");
        Ok(())
    }

    /// Rewind the current run to its first step. The pending timer is kept.
    pub fn reset_measurement_step(&self) {
        self.inner.measurement.lock().sequencer.reset();
    }

    /// Current measurement run.
    pub fn measurement_run(&self) -> MeasurementRun {
        self.inner.measurement.lock().sequencer.run()
    }

    /// Get the current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.connection.state()
    }

    /// Address of the device last passed to [`connect`](Self::connect).
    pub fn device_address(&self) -> Option<String> {
        self.inner.connection.device_address()
    }

    /// Subscribe to driver events.
    pub fn subscribe(&self) -> broadcast::Receiver<DriverEvent> {
        self.inner.events.subscribe()
    }

    /// Register a callback for driver events.
    pub fn on_event<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(DriverEvent) + Send + Sync + 'static,
    {
        self.inner.events.on_event(callback)
    }

    /// Sender a host transport can use to feed events into the event loop.
    pub fn gatt_event_sender(&self) -> GattEventSender {
        self.inner.gatt_tx.clone()
    }

    /// Queue one transport event on the event loop, as if the transport had
    /// reported it.
    pub fn handle_gatt_event(&self, event: GattEvent) {
        self.ensure_event_loop();
        if self.inner.gatt_tx.send(event).is_err() {
            warn!("Event loop gone, dropping GATT event");
        }
    }

    fn ensure_event_loop(&self) {
        let mut event_loop = self.inner.event_loop.lock();
        if event_loop.is_some() {
            return;
        }
        let Some(receivers) = self.inner.receivers.lock().take() else {
            return;
        };

        let weak = Arc::downgrade(&self.inner);
        *event_loop = Some(tokio::spawn(run_event_loop(weak, receivers)));
        debug!("Event loop started");
    }
}

async fn run_event_loop(inner: Weak<DriverInner>, mut receivers: Receivers) {
    loop {
        tokio::select! {
            Some(event) = receivers.gatt.recv() => {
                let Some(inner) = inner.upgrade() else { break };
                inner.handle_gatt_event(event).await;
            }
            Some(fired) = receivers.timer.recv() => {
                let Some(inner) = inner.upgrade() else { break };
                inner.on_timer(fired).await;
            }
            else => break,
        }
    }

    debug!("Event loop stopped");
}

impl DriverInner {
    async fn handle_gatt_event(&self, event: GattEvent) {
        trace!("GATT event: {:?}", event);

        match &event {
            GattEvent::ConnectionStateChanged { connected, .. } => {
                if !connected {
                    if self.connection.state().is_measuring() {
                        warn!("Link lost during measurement");
                    }
                    self.cancel_measurement();
                }
                self.connection.on_connection_changed(*connected);
            }
            GattEvent::ServicesDiscovered { status } if status.is_success() => {
                self.connection.on_services_discovered();
            }
            _ => {}
        }

        let domain_event = self
            .connection
            .with_catalog(|catalog| dispatcher::translate(&event, catalog));
        if let Some(domain_event) = domain_event {
            self.events.publish(domain_event);
        }

        if matches!(
            event,
            GattEvent::ConnectionStateChanged {
                connected: true,
                ..
            }
        ) {
            self.connection.discover_services().await;
        }
    }

    async fn on_timer(&self, fired: TimerFired) {
        let tick = {
            let mut measurement = self.measurement.lock();
            if measurement.generation != fired.generation {
                trace!("Ignoring superseded {:?} timer", fired.tag);
                return;
            }
            measurement.timer = None;
            measurement.sequencer.on_tick(fired.tag)
        };

        if let Some(state) = tick.state {
            self.connection.set_state(state);
        }

        if let Some(action) = tick.action {
            self.perform(action).await;
        }

        if let Some(next) = tick.next {
            let mut measurement = self.measurement.lock();
            // Something else re-armed or cancelled while the action ran
            if measurement.generation == fired.generation {
                self.arm(&mut measurement, next);
            }
        }
    }

    async fn perform(&self, action: SequencerAction) {
        match action {
            SequencerAction::Notify(event) => self.events.publish(event),
            SequencerAction::Write {
                characteristic,
                value,
            } => self.connection.write(characteristic, value).await,
            SequencerAction::Read { characteristic } => self.connection.read(characteristic).await,
        }
    }

    /// Replace the outstanding timer with `schedule`.
    fn arm(&self, measurement: &mut Measurement, schedule: Schedule) {
        if let Some(timer) = measurement.timer.take() {
            timer.abort();
        }
        measurement.generation += 1;

        let fired = TimerFired {
            tag: schedule.tag,
            generation: measurement.generation,
        };
        let timer_tx = self.timer_tx.clone();
        measurement.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(schedule.delay).await;
            let _ = timer_tx.send(fired);
        }));
    }

    fn cancel_measurement(&self) {
        let mut measurement = self.measurement.lock();
        if let Some(timer) = measurement.timer.take() {
            timer.abort();
        }
        measurement.generation += 1;
        if measurement.sequencer.run().is_active() {
            debug!("Abandoning measurement run {}", measurement.sequencer.run());
        }
        measurement.sequencer.clear();
    }
}

impl Drop for DriverInner {
    fn drop(&mut self) {
        if let Some(handle) = self.event_loop.get_mut().take() {
            handle.abort();
        }
        if let Some(timer) = self.measurement.get_mut().timer.take() {
            timer.abort();
        }
    }
}
