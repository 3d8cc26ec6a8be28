//! Pull Recorder Core Library
//!
//! Detects the start and end of a game pull from a live capture source and
//! records the span in between, with manual start/stop always taking
//! precedence over automatic detection.
//!
//! The pipeline runs source resolution, fixed-cadence frame sampling, a
//! single-flight inference gate, the capture controller state machine and
//! finally the recording finalizer, which hands encoded bytes to a
//! persistence service. Platform concerns sit behind the traits in
//! [`capture`], [`inference`], [`recording`] and [`persistence`].
//!
//! # Example
//!
//! ```no_run
//! use pull_recorder_core::{
//!     CaptureController, ControllerConfig, ControllerDeps, CoreResult, LifecycleEvent,
//! };
//!
//! async fn record(deps: ControllerDeps) -> CoreResult<()> {
//!     let (controller, task) = CaptureController::spawn(deps, ControllerConfig::default());
//!     let mut events = controller.subscribe();
//!
//!     controller.manual_start().await?;
//!     tokio::time::sleep(std::time::Duration::from_secs(10)).await;
//!     controller.manual_stop().await?;
//!
//!     while let Ok(event) = events.recv().await {
//!         if let LifecycleEvent::SessionCompleted { playback, .. } = event {
//!             println!("Saved: {:?}", playback);
//!             break;
//!         }
//!     }
//!
//!     controller.shutdown().await?;
//!     let _ = task.await;
//!     Ok(())
//! }
//! ```

pub mod capture;
pub mod controller;
mod error;
pub mod inference;
pub mod persistence;
pub mod recording;
pub mod sampler;

pub use {
    controller::{
        CaptureController, ControllerConfig, ControllerDeps, ControllerHandle, ControllerSnapshot,
        ControllerState, LifecycleEvent,
    },
    error::{CaptureError, Result as CoreResult},
};

#[cfg(test)]
mod tests;
