use crate::{
    domain::NotificationEvent,
    telegram::{MessageTransport, SendError},
};

pub fn render(event: &NotificationEvent) -> String {
    format!(
        "Homework review status changed for \"{}\" ({} -> {}). {}",
        event.homework_name,
        event.old_status,
        event.new_status,
        event.new_status.verdict()
    )
}

/// Best-effort delivery on top of a [`MessageTransport`].
///
/// Delivery is at most once: a failed send is logged and handed back to the
/// caller for inspection, never retried.
pub struct Notifier<T> {
    transport: T,
}

impl<T: MessageTransport> Notifier<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn notify(&self, message: &str) -> Result<(), SendError> {
        match self.transport.send_text(message) {
            Ok(()) => {
                tracing::info!(text = message, "Notification sent");
                Ok(())
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to send notification");
                Err(err)
            }
        }
    }
}
