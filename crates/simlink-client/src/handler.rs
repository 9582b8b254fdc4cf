use crossbeam_channel::Sender;
use tracing::trace;

use crate::message::SimMessage;

/// Receives every decoded message, on the I/O worker thread.
///
/// Calls happen synchronously in wire order. Keep the work short: the
/// worker does not read or write while the handler runs.
pub trait MessageHandler: Send + 'static {
    fn on_message(&mut self, message: SimMessage);
}

impl<F> MessageHandler for F
where
    F: FnMut(SimMessage) + Send + 'static,
{
    fn on_message(&mut self, message: SimMessage) {
        self(message)
    }
}

/// Forwards messages to another thread. A dropped receiver is not an error.
impl MessageHandler for Sender<SimMessage> {
    fn on_message(&mut self, message: SimMessage) {
        if self.send(message).is_err() {
            trace!("message receiver dropped");
        }
    }
}
