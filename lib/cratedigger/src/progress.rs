use shared::ProgressEvent;
use tokio::sync::mpsc;
use tracing::debug;

pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;
pub type ProgressReceiver = mpsc::UnboundedReceiver<ProgressEvent>;

pub fn channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Emit a progress event. A dropped receiver is not an error: the caller
/// stopped listening, the work carries on.
pub fn report(progress: Option<&ProgressSender>, current: usize, total: usize, message: impl Into<String>) {
    let message = message.into();
    match progress {
        Some(tx) => {
            if tx.send(ProgressEvent::new(current, total, message)).is_err() {
                debug!("Progress receiver dropped");
            }
        }
        None => debug!("[{}/{}] {}", current, total, message),
    }
}
