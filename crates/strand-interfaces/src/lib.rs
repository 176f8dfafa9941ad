#![warn(
    rust_2018_idioms,
    nonstandard_style,
    future_incompatible,
    clippy::mod_module_files,
    clippy::print_stdout,
    clippy::print_stderr
)]

mod options;
mod source;
mod step;

pub use options::StreamOptions;
pub use source::{RowSource, SourceError};
pub use step::{PipelineStep, RowSink, SinkError, StepError};

#[cfg(any(test, feature = "testing"))]
pub mod testing;
