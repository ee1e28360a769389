#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core sorting logic (hardware-agnostic).
//!
//! All hardware interactions go through the `sorter_traits` collaborator
//! traits (`WeightSource`, `LightDriver`, `Camera`, `Classifier`).
//!
//! ## Architecture
//!
//! - **Monitor**: step-delta debounce over scale readings (`monitor`)
//! - **Dispatch**: event -> handler routing, muted during shutdown (`dispatcher`)
//! - **Supervision**: one live background task per kind (`supervisor`)
//! - **Workflow**: capture, classify, indicate (`workflow`)
//! - **Shutdown**: idempotent teardown from any thread (`shutdown`)
//! - **Station**: the wired-up whole and its cycle loop (`station`, `builder`)
//!
//! ## Threads
//!
//! The scale listener and the light animation each run on their own named
//! thread. Event handlers run on the listener thread; the main loop blocks
//! on the completion signal between cycles.

pub mod builder;
pub mod categories;
pub mod config;
pub mod conversions;
pub mod dispatcher;
pub mod error;
pub mod hw_error;
pub mod lights;
pub mod mocks;
pub mod monitor;
pub mod shutdown;
pub mod signal;
pub mod station;
pub mod status;
pub mod supervisor;
pub mod types;
pub mod util;
pub mod workflow;

pub use builder::StationBuilder;
pub use categories::CategoryTable;
pub use config::{Animation, MonitorCfg, Pattern, TeardownCfg, WorkflowCfg};
pub use dispatcher::EventDispatcher;
pub use error::{BuildError, Result, SorterError};
pub use monitor::{DebounceDetector, DebounceWindow, ScaleMonitor};
pub use shutdown::{ShutdownCoordinator, ShutdownReport, TerminationTrigger, TerminationWatcher};
pub use signal::{CancelToken, CompletionSignal, ShutdownFlag, Wake};
pub use station::Station;
pub use status::{Classification, CycleOutcome, Dispatch, StopOutcome};
pub use supervisor::{SupervisorError, TaskHandle, TaskKind, TaskSupervisor};
pub use types::{ScaleState, SemanticEvent, WasteCategory, WeightSample};
pub use workflow::ClassificationWorkflow;
