mod backend;
mod display;
mod manager;

pub use backend::{ControlAddress, ControlMethod, DisplayId};
pub use display::{Display, DisplaySnapshot};
pub use manager::{
    DEFAULT_BACKEND_TIMEOUT, DEFAULT_LEVEL, DEFAULT_LOCK_TIMEOUT, DEFAULT_STEPS, DisplayManager,
    DisplayOutcome, Outcome, Report, Settings, Status, Step,
};
