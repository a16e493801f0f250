//! SMTP notifier — delivers run summaries with optional attachments.

use std::collections::HashSet;
use std::path::PathBuf;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Body, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use refreshd_core::{MailConfig, RefreshdError, Result};

/// Out-of-band delivery boundary. Callers must treat failures as
/// non-fatal: log and move on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, subject: &str, body: &str, attachments: &[PathBuf]) -> Result<()>;
}

/// Sends summaries over SMTP (STARTTLS relay, async transport).
pub struct SmtpNotifier {
    config: MailConfig,
}

impl SmtpNotifier {
    pub fn new(config: MailConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn notify(&self, subject: &str, body: &str, attachments: &[PathBuf]) -> Result<()> {
        if !self.config.enabled {
            tracing::info!("Mail disabled → skipping notification");
            return Ok(());
        }
        if self.config.to.is_empty() {
            tracing::warn!("mail.to is empty → no summary will be sent");
            return Ok(());
        }

        let from_name = self.config.display_name.as_deref().unwrap_or("refreshd");
        let from_mailbox: Mailbox = format!("{from_name} <{}>", self.config.from)
            .parse()
            .map_err(|e| RefreshdError::Notify(format!("Invalid from address: {e}")))?;

        let mut builder = Message::builder().from(from_mailbox).subject(subject);
        for addr in &self.config.to {
            let to_mailbox: Mailbox = addr
                .parse()
                .map_err(|e| RefreshdError::Notify(format!("Invalid recipient '{addr}': {e}")))?;
            builder = builder.to(to_mailbox);
        }

        let mut multipart = MultiPart::mixed().singlepart(SinglePart::plain(body.to_string()));
        let octet_stream = ContentType::parse("application/octet-stream")
            .map_err(|e| RefreshdError::Notify(format!("Content type: {e}")))?;
        let mut seen = HashSet::new();
        for path in attachments {
            if !seen.insert(path.clone()) {
                continue;
            }
            match std::fs::read(path) {
                Ok(data) => {
                    let filename = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| "attachment".into());
                    tracing::info!("Attaching {}", path.display());
                    multipart = multipart
                        .singlepart(Attachment::new(filename).body(Body::new(data), octet_stream.clone()));
                }
                Err(e) => {
                    // an unattachable file never blocks the summary
                    tracing::warn!("Could not attach {}: {e}", path.display());
                }
            }
        }

        let email = builder
            .multipart(multipart)
            .map_err(|e| RefreshdError::Notify(format!("Build message: {e}")))?;

        let mut transport =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_host)
                .map_err(|e| RefreshdError::Notify(format!("SMTP relay: {e}")))?
                .port(self.config.smtp_port);
        if !self.config.password.is_empty() {
            transport = transport.credentials(Credentials::new(
                self.config.from.clone(),
                self.config.password.clone(),
            ));
        }

        transport
            .build()
            .send(email)
            .await
            .map_err(|e| RefreshdError::Notify(format!("SMTP send: {e}")))?;

        tracing::info!("📤 Summary mailed to {} recipient(s)", self.config.to.len());
        Ok(())
    }
}

/// Stand-in when mail is not configured.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, subject: &str, _body: &str, _attachments: &[PathBuf]) -> Result<()> {
        tracing::debug!("Notifier disabled; dropping summary '{subject}'");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_mail_is_a_noop() {
        let notifier = SmtpNotifier::new(MailConfig::default());
        notifier.notify("subject", "body", &[]).await.unwrap();
    }

    #[tokio::test]
    async fn test_enabled_without_recipients_is_a_noop() {
        let config = MailConfig {
            enabled: true,
            smtp_host: "smtp.example.com".into(),
            ..MailConfig::default()
        };
        let notifier = SmtpNotifier::new(config);
        notifier.notify("subject", "body", &[]).await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_from_is_a_notify_error() {
        let config = MailConfig {
            enabled: true,
            smtp_host: "smtp.example.com".into(),
            from: "not an address".into(),
            to: vec!["ops@example.com".into()],
            ..MailConfig::default()
        };
        let err = SmtpNotifier::new(config)
            .notify("subject", "body", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, RefreshdError::Notify(_)));
    }
}
