use anyhow::{anyhow, Context, Result};
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::sync::{Arc, Mutex};

use crate::config::SmtpSettings;

/// One contact-form submission. Transient; forwarded to the mail
/// transport and never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContactMessage {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub body: String,
}

impl ContactMessage {
    /// All four fields are required; whitespace-only counts as empty.
    pub fn validate(&self) -> Result<()> {
        let complete = !self.name.trim().is_empty()
            && !self.email.trim().is_empty()
            && !self.subject.trim().is_empty()
            && !self.body.trim().is_empty();
        if complete {
            Ok(())
        } else {
            Err(IncompleteContactForm.into())
        }
    }

    /// Mail body as delivered to the recipient.
    pub fn formatted_body(&self) -> String {
        format!(
            "Nombre: {}\nCorreo Electrónico: {}\n\nMensaje:\n{}",
            self.name, self.email, self.body
        )
    }
}

/// Submission with one or more empty fields. Surfaced as a warning, not
/// a transport failure, and discriminable by callers.
#[derive(Clone, Copy, Debug)]
pub struct IncompleteContactForm;

impl std::fmt::Display for IncompleteContactForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "all contact form fields are required")
    }
}
impl std::error::Error for IncompleteContactForm {}

/// Contact notifier boundary.
///
/// `notify` validates field completeness before any transport attempt;
/// an incomplete message never reaches the wire.
pub trait Mailer: Send {
    fn notify(&self, msg: &ContactMessage) -> Result<()>;
}

/// SMTP submission: STARTTLS, fixed sender/recipient from configuration,
/// explicit connection timeout. Credentials come from the environment.
pub struct SmtpMailer {
    transport: SmtpTransport,
    sender: Mailbox,
    recipient: Mailbox,
}

impl SmtpMailer {
    pub fn from_settings(settings: &SmtpSettings) -> Result<Self> {
        let username = settings
            .username
            .as_ref()
            .ok_or_else(|| anyhow!("PLAGASCAN_SMTP_USERNAME is not set"))?;
        let password = settings
            .password
            .as_ref()
            .ok_or_else(|| anyhow!("PLAGASCAN_SMTP_PASSWORD is not set"))?;
        let sender: Mailbox = settings
            .sender
            .as_deref()
            .unwrap_or(username)
            .parse()
            .map_err(|e| anyhow!("invalid smtp sender address: {}", e))?;
        let recipient: Mailbox = settings
            .recipient
            .as_ref()
            .ok_or_else(|| anyhow!("smtp recipient is not configured"))?
            .parse()
            .map_err(|e| anyhow!("invalid smtp recipient address: {}", e))?;

        let transport = SmtpTransport::starttls_relay(&settings.host)
            .with_context(|| format!("failed to resolve smtp relay {}", settings.host))?
            .port(settings.port)
            .credentials(Credentials::new(username.clone(), password.clone()))
            .timeout(Some(settings.timeout))
            .build();

        Ok(Self {
            transport,
            sender,
            recipient,
        })
    }
}

impl Mailer for SmtpMailer {
    fn notify(&self, msg: &ContactMessage) -> Result<()> {
        msg.validate()?;
        let email = Message::builder()
            .from(self.sender.clone())
            .to(self.recipient.clone())
            .subject(msg.subject.clone())
            .body(msg.formatted_body())
            .context("failed to build mail message")?;
        self.transport
            .send(&email)
            .context("mail transport failed")?;
        Ok(())
    }
}

/// Records notified messages instead of sending them. For tests.
#[derive(Clone, Default)]
pub struct MemoryMailer {
    sent: Arc<Mutex<Vec<ContactMessage>>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<ContactMessage> {
        self.sent.lock().expect("mailer lock poisoned").clone()
    }
}

impl Mailer for MemoryMailer {
    fn notify(&self, msg: &ContactMessage) -> Result<()> {
        msg.validate()?;
        self.sent
            .lock()
            .map_err(|_| anyhow!("mailer lock poisoned"))?
            .push(msg.clone());
        Ok(())
    }
}

/// Used when credentials are absent: every complete submission fails with
/// a configuration error instead of being silently dropped.
pub struct DisabledMailer;

impl Mailer for DisabledMailer {
    fn notify(&self, msg: &ContactMessage) -> Result<()> {
        msg.validate()?;
        Err(anyhow!("mail transport is not configured"))
    }
}
