use crate::SimTime;
use crate::channel::ChannelLevel;
use crate::config::ConfigError;
use crate::dcc::StateId;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DccError {
    #[error("occupancy window is empty")]
    EmptyWindow,
    #[error("occupancy window has zero capacity")]
    UnconfiguredWindow,
    #[error("non-finite occupancy sample: {0}")]
    NonFiniteSample(f64),
    #[error("occupancy sample outside [0, 1]: {0}")]
    SampleOutOfRange(f64),
    #[error("zero-length sampling interval at {at:?}")]
    DegenerateSample { at: SimTime },
    #[error("channel already {got:?} at {at:?}, expected a transition out of {expected:?}")]
    OrderingViolation {
        expected: ChannelLevel,
        got: ChannelLevel,
        at: SimTime,
    },
    #[error("timestamp {at:?} precedes previous event at {previous:?}")]
    TimeReversal { at: SimTime, previous: SimTime },
    #[error("state machine not initialized")]
    Uninitialized,
    #[error("state machine already initialized")]
    AlreadyInitialized,
    #[error("unknown state: {0}")]
    UnknownState(StateId),
    #[error("state {0} carries no control value")]
    NoControlValue(StateId),
    #[error("engine not started")]
    NotStarted,
    #[error("engine already started")]
    AlreadyStarted,
    #[error("beacon transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("engine error: {0}")]
    Dcc(#[from] DccError),
    #[error("watch channel send failed")]
    WatchSend,
    #[error("state lock poisoned")]
    StateLock,
}
