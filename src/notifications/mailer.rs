//! Outbound mail transport.
//!
//! `Mailer::send` is synchronous; async callers go through
//! [`send_with_retry`], which runs each attempt on the blocking pool and
//! waits between attempts without holding a thread. `SmtpMailer` needs the
//! `mail` feature; without it (or with `email.enabled = false`) messages are
//! only logged.

use log::{info, warn};
use std::sync::{Arc, Mutex};

use crate::core::config::EmailConfig;
use crate::tasks::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum MailError {
    #[error("invalid address: {0}")]
    Address(String),
    #[error("could not build message: {0}")]
    Build(String),
    #[error("transport error: {0}")]
    Transport(String),
}

pub trait Mailer: Send + Sync {
    fn send(&self, email: &OutgoingEmail) -> Result<(), MailError>;
}

pub async fn send_with_retry(
    mailer: &Arc<dyn Mailer>,
    retry: RetryPolicy,
    label: &str,
    email: &OutgoingEmail,
) -> Result<(), MailError> {
    retry
        .run(label, |_| {
            let mailer = mailer.clone();
            let email = email.clone();
            async move {
                tokio::task::spawn_blocking(move || mailer.send(&email))
                    .await
                    .map_err(|e| MailError::Transport(format!("mail task failed: {e}")))?
            }
        })
        .await
}

/// Picks the transport for the current configuration.
pub fn build_mailer(config: &EmailConfig) -> Arc<dyn Mailer> {
    if !config.enabled {
        info!("Email delivery disabled; notifications will be logged");
        return Arc::new(LogMailer);
    }

    #[cfg(feature = "mail")]
    {
        Arc::new(SmtpMailer::new(config.clone()))
    }

    #[cfg(not(feature = "mail"))]
    {
        warn!("email.enabled is set but grcserver was built without the mail feature");
        Arc::new(LogMailer)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        info!("[mail disabled] to={} subject={:?}", email.to, email.subject);
        Ok(())
    }
}

#[cfg(feature = "mail")]
pub struct SmtpMailer {
    config: EmailConfig,
}

#[cfg(feature = "mail")]
impl SmtpMailer {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    fn transport(&self) -> Result<lettre::SmtpTransport, MailError> {
        use lettre::transport::smtp::authentication::Credentials;
        use lettre::SmtpTransport;

        if self.config.has_credentials() {
            let creds = Credentials::new(
                self.config.username.clone().unwrap_or_default(),
                self.config.password.clone().unwrap_or_default(),
            );
            Ok(SmtpTransport::starttls_relay(&self.config.smtp_server)
                .map_err(|e| MailError::Transport(e.to_string()))?
                .port(self.config.smtp_port)
                .credentials(creds)
                .build())
        } else {
            Ok(SmtpTransport::builder_dangerous(&self.config.smtp_server)
                .port(self.config.smtp_port)
                .build())
        }
    }
}

#[cfg(feature = "mail")]
impl Mailer for SmtpMailer {
    fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        use lettre::message::{MultiPart, SinglePart};
        use lettre::{Message, Transport};

        let message = Message::builder()
            .from(
                self.config
                    .from
                    .parse()
                    .map_err(|e| MailError::Address(format!("from: {e}")))?,
            )
            .to(email
                .to
                .parse()
                .map_err(|e| MailError::Address(format!("{}: {e}", email.to)))?)
            .subject(email.subject.clone())
            .multipart(
                MultiPart::alternative()
                    .singlepart(SinglePart::plain(email.text.clone()))
                    .singlepart(SinglePart::html(email.html.clone())),
            )
            .map_err(|e| MailError::Build(e.to_string()))?;

        self.transport()?
            .send(&message)
            .map_err(|e| MailError::Transport(e.to_string()))?;
        info!("Email sent to {} ({})", email.to, email.subject);
        Ok(())
    }
}

/// In-memory mailer that keeps every message; optionally fails the first `n` sends.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
    failures_left: Mutex<u32>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(times: u32) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failures_left: Mutex::new(times),
        }
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Mailer for RecordingMailer {
    fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        if let Ok(mut left) = self.failures_left.lock() {
            if *left > 0 {
                *left -= 1;
                warn!("RecordingMailer simulating failure for {}", email.to);
                return Err(MailError::Transport("simulated failure".to_string()));
            }
        }
        self.sent
            .lock()
            .map_err(|_| MailError::Transport("mailbox poisoned".to_string()))?
            .push(email.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email() -> OutgoingEmail {
        OutgoingEmail {
            to: "owner@example.com".into(),
            subject: "Reminder".into(),
            html: "<p>hi</p>".into(),
            text: "hi".into(),
        }
    }

    #[test]
    fn test_recording_mailer_fails_then_records() {
        let mailer = RecordingMailer::failing(1);
        assert!(mailer.send(&email()).is_err());
        assert!(mailer.send(&email()).is_ok());
        assert_eq!(mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_send_with_retry_survives_transient_failures() {
        let recording = Arc::new(RecordingMailer::failing(2));
        let mailer: Arc<dyn Mailer> = recording.clone();
        let retry = RetryPolicy::new(3, std::time::Duration::ZERO);

        send_with_retry(&mailer, retry, "reminder", &email())
            .await
            .unwrap();
        assert_eq!(recording.sent().len(), 1);

        let exhausted: Arc<dyn Mailer> = Arc::new(RecordingMailer::failing(5));
        let result = send_with_retry(&exhausted, RetryPolicy::no_retry(), "reminder", &email()).await;
        assert!(matches!(result, Err(MailError::Transport(_))));
    }

    #[test]
    fn test_disabled_config_uses_log_mailer() {
        let config = EmailConfig {
            enabled: false,
            smtp_server: "localhost".into(),
            smtp_port: 25,
            username: None,
            password: None,
            from: "grc@example.com".into(),
            max_attempts: 1,
            retry_delay_secs: 0,
        };
        let mailer = build_mailer(&config);
        assert!(mailer.send(&email()).is_ok());
    }
}
