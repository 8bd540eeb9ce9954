pub mod controller;

pub use controller::{
    ControllerConfig, ErrorCallback, PipelineError, ResultCallback, SessionController,
    SessionState,
};
