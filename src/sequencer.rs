//! Measurement sequencer.
//!
//! The peripheral has no "start measurement" command that is acknowledged as a
//! whole. Starting a measurement is a script of single-byte writes, each given
//! a fixed settling delay, after which the temperature sample is polled.
//! Stopping runs the reverse script.
//!
//! [`Sequencer`] is the pure state machine: it is told which timer fired and
//! answers with the GATT action to perform and the next timer to arm. Arming
//! timers and talking to the transport is left to the driver.

use std::fmt;
use std::time::Duration;
use tracing::debug;

use crate::ble::connection::ConnectionState;
use crate::ble::transport::CharacteristicId;
use crate::ble::uuids::{LSM330_ACC_EN, LSM330_GYRO_EN, LSM330_TEMP_SAMPLE, MEASURE_START, MEASURE_STOP};
use crate::config::DriverConfig;
use crate::error::{Error, Result};
use crate::events::DriverEvent;

/// Identifies which handler a timer firing is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TimerTag {
    /// Steady-state temperature sampling.
    RefreshTemp = 0,
    /// Begin sequence.
    BeginMeasurement = 1,
    /// End sequence.
    EndMeasurement = 2,
}

/// The active run and its position in the script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MeasurementRun {
    /// No run active.
    #[default]
    Idle,
    /// Enabling sensors and starting the stream.
    Begin {
        /// Next step to execute.
        step: u8,
    },
    /// Sampling the temperature.
    Steady {
        /// Next step to execute.
        step: u8,
    },
    /// Stopping the stream and disabling sensors.
    End {
        /// Next step to execute.
        step: u8,
    },
}

impl MeasurementRun {
    /// Timer tag driving this run.
    pub fn tag(&self) -> Option<TimerTag> {
        match self {
            Self::Idle => None,
            Self::Begin { .. } => Some(TimerTag::BeginMeasurement),
            Self::Steady { .. } => Some(TimerTag::RefreshTemp),
            Self::End { .. } => Some(TimerTag::EndMeasurement),
        }
    }

    /// Step counter of the run.
    pub fn step(&self) -> Option<u8> {
        match *self {
            Self::Idle => None,
            Self::Begin { step } | Self::Steady { step } | Self::End { step } => Some(step),
        }
    }

    /// Check if a run is in progress.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle)
    }

    fn with_step(self, step: u8) -> Self {
        match self {
            Self::Idle => Self::Idle,
            Self::Begin { .. } => Self::Begin { step },
            Self::Steady { .. } => Self::Steady { step },
            Self::End { .. } => Self::End { step },
        }
    }
}

impl fmt::Display for MeasurementRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Begin { step } => write!(f, "Begin[{}]", step),
            Self::Steady { step } => write!(f, "Steady[{}]", step),
            Self::End { step } => write!(f, "End[{}]", step),
        }
    }
}

/// Work requested by one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequencerAction {
    /// Publish an event to consumers.
    Notify(DriverEvent),
    /// Write a value to a characteristic.
    Write {
        /// Target characteristic.
        characteristic: CharacteristicId,
        /// Value to write.
        value: Vec<u8>,
    },
    /// Read a characteristic.
    Read {
        /// Target characteristic.
        characteristic: CharacteristicId,
    },
}

impl SequencerAction {
    fn write(characteristic: CharacteristicId, value: u8) -> Self {
        Self::Write {
            characteristic,
            value: vec![value],
        }
    }
}

/// A timer to arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    /// Handler the timer is meant for.
    pub tag: TimerTag,
    /// Delay before it fires.
    pub delay: Duration,
}

/// Outcome of one timer firing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tick {
    /// Connection state implied by the handler that ran.
    pub state: Option<ConnectionState>,
    /// GATT operation or notification to perform.
    pub action: Option<SequencerAction>,
    /// Timer to arm next, if the run continues.
    pub next: Option<Schedule>,
}

/// Step state machine for the begin, steady-state and end scripts.
#[derive(Debug, Clone)]
pub struct Sequencer {
    run: MeasurementRun,
    entry_delay: Duration,
    step_delay: Duration,
}

impl Sequencer {
    /// Create an idle sequencer.
    pub fn new(config: &DriverConfig) -> Self {
        Self {
            run: MeasurementRun::Idle,
            entry_delay: config.entry_delay(),
            step_delay: config.step_delay(),
        }
    }

    /// Current run.
    pub fn run(&self) -> MeasurementRun {
        self.run
    }

    /// Start the begin script. Returns the first timer to arm.
    pub fn start(&mut self) -> Result<Schedule> {
        if self.run.is_active() {
            return Err(Error::MeasurementInProgress);
        }

        self.run = MeasurementRun::Begin { step: 0 };
        debug!("Measurement run {}", self.run);

        Ok(Schedule {
            tag: TimerTag::BeginMeasurement,
            delay: self.entry_delay,
        })
    }

    /// Start the end script. Returns the first timer to arm.
    ///
    /// Fails with [`Error::NotMeasuring`] when idle or already ending.
    pub fn stop(&mut self) -> Result<Schedule> {
        match self.run {
            MeasurementRun::Idle | MeasurementRun::End { .. } => Err(Error::NotMeasuring),
            _ => {
                self.run = MeasurementRun::End { step: 0 };
                debug!("Measurement run {}", self.run);

                Ok(Schedule {
                    tag: TimerTag::EndMeasurement,
                    delay: self.entry_delay,
                })
            }
        }
    }

    /// Rewind the current run to step 0.
    pub fn reset(&mut self) {
        self.run = self.run.with_step(0);
    }

    /// Abandon the current run.
    pub fn clear(&mut self) {
        self.run = MeasurementRun::Idle;
    }

    /// Execute one step for a timer that fired with `tag`.
    ///
    /// A tag that does not belong to the current run yields an empty tick.
    pub fn on_tick(&mut self, tag: TimerTag) -> Tick {
        match (self.run, tag) {
            (MeasurementRun::Begin { step }, TimerTag::BeginMeasurement) => self.begin_step(step),
            (MeasurementRun::Steady { step }, TimerTag::RefreshTemp) => self.steady_step(step),
            (MeasurementRun::End { step }, TimerTag::EndMeasurement) => self.end_step(step),
            (run, tag) => {
                debug!("Ignoring {:?} tick during {}", tag, run);
                Tick::default()
            }
        }
    }

    fn begin_step(&mut self, step: u8) -> Tick {
        let action = match step {
            0 => SequencerAction::Notify(DriverEvent::MeasurementInitializing),
            1 => SequencerAction::write(LSM330_ACC_EN, 0x01),
            2 => SequencerAction::write(LSM330_GYRO_EN, 0x01),
            3 => SequencerAction::write(MEASURE_START, 0x01),
            _ => {
                self.run = MeasurementRun::Steady { step: 0 };
                debug!("Begin sequence complete, entering {}", self.run);
                return Tick {
                    state: Some(ConnectionState::InitMeasure),
                    action: None,
                    next: Some(Schedule {
                        tag: TimerTag::RefreshTemp,
                        delay: self.step_delay,
                    }),
                };
            }
        };

        self.advance(ConnectionState::InitMeasure, action)
    }

    fn steady_step(&mut self, step: u8) -> Tick {
        match step {
            0 => self.advance(
                ConnectionState::Measuring,
                SequencerAction::Notify(DriverEvent::MeasuringStarted),
            ),
            // Sampling repeats on step 1 until the run is stopped
            _ => Tick {
                state: Some(ConnectionState::Measuring),
                action: Some(SequencerAction::Read {
                    characteristic: LSM330_TEMP_SAMPLE,
                }),
                next: Some(Schedule {
                    tag: TimerTag::RefreshTemp,
                    delay: self.step_delay,
                }),
            },
        }
    }

    fn end_step(&mut self, step: u8) -> Tick {
        let action = match step {
            0 => SequencerAction::write(MEASURE_STOP, 0x01),
            1 => SequencerAction::write(LSM330_GYRO_EN, 0x00),
            2 => SequencerAction::write(LSM330_ACC_EN, 0x00),
            _ => {
                self.run = MeasurementRun::Idle;
                debug!("End sequence complete");
                return Tick {
                    state: Some(ConnectionState::Connected),
                    action: Some(SequencerAction::Notify(DriverEvent::Connected)),
                    next: None,
                };
            }
        };

        self.advance(ConnectionState::Connected, action)
    }

    /// Move to the next step and re-arm the current tag.
    fn advance(&mut self, state: ConnectionState, action: SequencerAction) -> Tick {
        let step = self.run.step().unwrap_or(0).saturating_add(1);
        self.run = self.run.with_step(step);

        Tick {
            state: Some(state),
            action: Some(action),
            next: self.run.tag().map(|tag| Schedule {
                tag,
                delay: self.step_delay,
            }),
        }
    }
}
