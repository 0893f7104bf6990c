/// Errors that can occur while publishing a history event.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The sink has been shut down and accepts no more events.
    #[error("notification sink closed")]
    Closed,

    /// The sink refused the event.
    #[error("notification rejected: {0}")]
    Rejected(String),
}
