/// Outbound email collaborator. `LoggingMailer` is the only implementation
/// shipped; a production deployment would swap in a real SMTP/API client
/// behind the same trait.
pub trait Mailer: Send + Sync {
    fn send(&self, recipient: &str, subject: &str, message: &str);
}

#[derive(Default)]
pub struct LoggingMailer;

impl Mailer for LoggingMailer {
    fn send(&self, recipient: &str, subject: &str, message: &str) {
        log::info!(
            "mail to {}: subject={:?} body={:?}",
            recipient,
            subject,
            message
        );
    }
}
