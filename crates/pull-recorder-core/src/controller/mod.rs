mod command;
#[allow(clippy::module_inception)]
mod controller;
mod detection;
mod event;
mod state;

pub use {
    controller::{CaptureController, ControllerConfig, ControllerDeps, ControllerHandle},
    detection::{DEFAULT_RETRY_DELAY, DetectionConfig},
    event::LifecycleEvent,
    state::{ControllerSnapshot, ControllerState},
};
