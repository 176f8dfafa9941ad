use std::time::Duration;

use error_stack::Report;
use parking_lot::Mutex;

/// Top level errors reported by a batched stream.
#[derive(derive_more::Display, Debug)]
pub enum Error {
    #[display(fmt = "error reading from row source")]
    Source,
    #[display(fmt = "error in pipeline step")]
    Step,
    #[display(fmt = "batch handoff stalled for more than {:?}", _0)]
    HandoffTimeout(Duration),
    #[display(fmt = "spawning producer thread")]
    SpawnProducer,
    #[display(fmt = "producer thread panicked")]
    ProducerPanic,
}

impl error_stack::Context for Error {}

/// Sticky error slot shared between the producer and the facade.
///
/// The first error wins; later ones are logged and dropped. Taking the
/// error marks it consumed so `close` never reports it a second time.
#[derive(Default)]
pub(crate) struct ErrorState {
    slot: Mutex<Option<Report<Error>>>,
}

impl ErrorState {
    pub fn set(&self, report: Report<Error>) {
        let mut slot = self.slot.lock();
        if slot.is_none() {
            *slot = Some(report);
        } else {
            tracing::debug!("dropping secondary stream error: {report:?}");
        }
    }

    pub fn is_set(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Take the error for raising, leaving the slot consumed.
    pub fn take(&self) -> Option<Report<Error>> {
        self.slot.lock().take()
    }
}
