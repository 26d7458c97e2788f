//! Outgoing mail transports.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use monsti_core::Mail;

use crate::error::DaemonError;
use crate::settings::MailSettings;

/// Something that can deliver a [`Mail`].
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, mail: &Mail) -> Result<(), DaemonError>;
}

/// Builds the transport described by the daemon's mail settings.
pub fn from_settings(settings: &MailSettings) -> Box<dyn MailTransport> {
    if settings.debug {
        Box::new(DebugMailer)
    } else {
        Box::new(SmtpMailer::from_settings(settings))
    }
}

/// Rejects messages whose header values carry line breaks or that have
/// nobody to deliver to. Runs before any transport sees the mail.
pub fn check_mail(mail: &Mail) -> Result<(), DaemonError> {
    let singles = [("From", Some(&mail.from)), ("Reply-To", mail.reply_to.as_ref())];
    let lists = [("To", &mail.to), ("Cc", &mail.cc), ("Bcc", &mail.bcc)];

    let headers = singles
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name, v.as_str())))
        .chain(std::iter::once(("Subject", mail.subject.as_str())))
        .chain(
            lists
                .into_iter()
                .flat_map(|(name, values)| values.iter().map(move |v| (name, v.as_str()))),
        );
    for (name, value) in headers {
        if value.contains(['\r', '\n']) {
            return Err(DaemonError::Mail(format!("{name} header contains a line break")));
        }
    }

    if mail.recipients().is_empty() {
        return Err(DaemonError::Mail("message has no recipients".to_string()));
    }
    Ok(())
}

/// Renders `mail` as an RFC 5322 message. `Bcc` stays on the envelope and
/// is left out of the written headers.
pub fn build_message(mail: &Mail) -> Result<Message, DaemonError> {
    let mut builder = Message::builder()
        .from(mailbox("From", &mail.from)?)
        .subject(mail.subject.as_str())
        .header(ContentType::TEXT_PLAIN);
    if let Some(reply_to) = &mail.reply_to {
        builder = builder.reply_to(mailbox("Reply-To", reply_to)?);
    }
    for to in &mail.to {
        builder = builder.to(mailbox("To", to)?);
    }
    for cc in &mail.cc {
        builder = builder.cc(mailbox("Cc", cc)?);
    }
    for bcc in &mail.bcc {
        builder = builder.bcc(mailbox("Bcc", bcc)?);
    }
    builder
        .body(mail.body.clone())
        .map_err(|e| DaemonError::Mail(format!("building message: {e}")))
}

fn mailbox(header: &str, address: &str) -> Result<Mailbox, DaemonError> {
    address
        .parse()
        .map_err(|e| DaemonError::Mail(format!("invalid {header} address {address:?}: {e}")))
}

/// Logs every message instead of sending it.
#[derive(Debug, Default, Clone, Copy)]
pub struct DebugMailer;

#[async_trait]
impl MailTransport for DebugMailer {
    async fn send(&self, mail: &Mail) -> Result<(), DaemonError> {
        tracing::info!(
            from = %mail.from,
            to = ?mail.to,
            cc = ?mail.cc,
            bcc = ?mail.bcc,
            subject = %mail.subject,
            "SendMail debug:\n-- Body Start --\n{}\n-- Body End --",
            mail.body,
        );
        Ok(())
    }
}

/// Relays messages through an SMTP server using STARTTLS.
#[derive(Clone)]
pub struct SmtpMailer {
    host: String,
    port: u16,
    credentials: Option<Credentials>,
}

impl std::fmt::Debug for SmtpMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpMailer")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("authenticated", &self.credentials.is_some())
            .finish()
    }
}

impl SmtpMailer {
    pub fn new(host: impl Into<String>, port: u16, credentials: Option<Credentials>) -> Self {
        Self {
            host: host.into(),
            port,
            credentials,
        }
    }

    pub fn from_settings(settings: &MailSettings) -> Self {
        let credentials = settings.username.as_ref().map(|user| {
            Credentials::new(user.clone(), settings.password.clone().unwrap_or_default())
        });
        Self::new(settings.host.clone(), settings.port, credentials)
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, DaemonError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.host)
            .map_err(|e| DaemonError::Mail(format!("smtp relay {}: {e}", self.host)))?
            .port(self.port);
        if let Some(credentials) = &self.credentials {
            builder = builder.credentials(credentials.clone());
        }
        Ok(builder.build())
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, mail: &Mail) -> Result<(), DaemonError> {
        let message = build_message(mail)?;
        self.transport()?
            .send(message)
            .await
            .map_err(|e| DaemonError::Mail(format!("{}:{}: {e}", self.host, self.port)))?;
        tracing::info!(
            subject = %mail.subject,
            recipients = mail.recipients().len(),
            host = %self.host,
            "mail sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mail() -> Mail {
        Mail {
            from: "site@example.com".into(),
            to: vec!["owner@example.com".into()],
            subject: "Contact".into(),
            body: "Hello".into(),
            ..Mail::default()
        }
    }

    fn rendered(message: &Message) -> String {
        String::from_utf8(message.formatted()).expect("utf-8 message")
    }

    #[tokio::test]
    async fn debug_mailer_never_fails() {
        DebugMailer.send(&mail()).await.expect("debug send");
    }

    #[test]
    fn line_break_in_subject_is_rejected() {
        let mut injected = mail();
        injected.subject = "Hi\r\nBcc: attacker@evil.test\r\nX-Injected: yes".into();
        let err = check_mail(&injected).unwrap_err();
        assert!(matches!(err, DaemonError::Mail(_)));
        assert!(err.to_string().contains("Subject"), "got: {err}");
    }

    #[test]
    fn line_break_in_any_address_is_rejected() {
        let mut bare_lf = mail();
        bare_lf.cc = vec!["a@example.com\nX-Injected: yes".into()];
        assert!(check_mail(&bare_lf).unwrap_err().to_string().contains("Cc"));

        let mut reply = mail();
        reply.reply_to = Some("b@example.com\rBcc: c@example.com".into());
        assert!(check_mail(&reply)
            .unwrap_err()
            .to_string()
            .contains("Reply-To"));
    }

    #[test]
    fn mail_without_recipients_is_rejected() {
        let mut empty = mail();
        empty.to.clear();
        let err = check_mail(&empty).unwrap_err();
        assert!(err.to_string().contains("no recipients"), "got: {err}");
    }

    #[test]
    fn multiline_body_is_allowed() {
        let mut letter = mail();
        letter.body = "line one\nline two\r\nline three".into();
        check_mail(&letter).expect("body may span lines");
    }

    #[test]
    fn message_keeps_bcc_off_the_headers() {
        let letter = Mail {
            bcc: vec!["audit@example.com".into()],
            reply_to: Some("visitor@example.com".into()),
            subject: "Hello".into(),
            ..mail()
        };
        let message = build_message(&letter).expect("message");
        let text = rendered(&message);
        assert!(text.contains("To: owner@example.com"), "{text}");
        assert!(text.contains("Reply-To: visitor@example.com"), "{text}");
        assert!(text.contains("Subject: Hello"), "{text}");
        assert!(!text.contains("audit@example.com"), "{text}");

        let envelope: Vec<String> = message
            .envelope()
            .to()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert!(envelope.contains(&"audit@example.com".to_string()));
    }

    #[test]
    fn malformed_address_is_a_mail_error() {
        let mut bad = mail();
        bad.to = vec!["not an address".into()];
        let err = build_message(&bad).unwrap_err();
        assert!(err.to_string().contains("invalid To address"), "got: {err}");
    }

    #[test]
    fn smtp_credentials_follow_settings() {
        let settings = MailSettings {
            debug: false,
            host: "smtp.example.com".into(),
            port: 2525,
            username: Some("monsti".into()),
            password: Some("secret".into()),
        };
        let mailer = SmtpMailer::from_settings(&settings);
        let shown = format!("{mailer:?}");
        assert!(shown.contains("smtp.example.com"));
        assert!(shown.contains("2525"));
        assert!(shown.contains("authenticated: true"));
        assert!(!shown.contains("secret"));
    }

    #[tokio::test]
    async fn unreachable_smtp_server_is_reported() {
        let mailer = SmtpMailer::new("localhost", 1, None);
        let err = mailer.send(&mail()).await.unwrap_err();
        assert!(err.to_string().contains("could not send mail"), "got: {err}");
    }
}
