use async_trait::async_trait;
use serde::Serialize;

use crate::models::Todo;
use crate::otp::Purpose;

#[derive(thiserror::Error, Debug)]
pub enum MailError {
    #[error("mail transport error: {0}")]
    Transport(String),
    #[error("mailer is not configured (set MAIL_API_BASE / MAIL_API_KEY / MAIL_FROM)")]
    NotConfigured,
}

/// Outbound email transport. One-time codes and list exports go through here.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        text: &str,
        html: Option<&str>,
    ) -> Result<(), MailError>;
}

#[derive(Serialize)]
struct OutgoingMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    html: Option<&'a str>,
}

/// Transport that POSTs messages to an HTTP mail API.
#[derive(Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    from: String,
}

impl HttpMailer {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into(),
            api_key: api_key.into(),
            from: from.into(),
        }
    }

    /// None when any of MAIL_API_BASE / MAIL_API_KEY / MAIL_FROM is missing.
    pub fn from_env() -> Option<Self> {
        let api_base = std::env::var("MAIL_API_BASE").ok()?;
        let api_key = std::env::var("MAIL_API_KEY").ok()?;
        let from = std::env::var("MAIL_FROM").ok()?;
        Some(Self::new(api_base, api_key, from))
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        text: &str,
        html: Option<&str>,
    ) -> Result<(), MailError> {
        let body = OutgoingMessage {
            from: &self.from,
            to,
            subject,
            text,
            html,
        };
        let resp = self
            .client
            .post(format!("{}/messages", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(MailError::Transport(format!(
                "mail API returned {}",
                resp.status()
            )));
        }
        Ok(())
    }
}

/// Transport used when no mail API is configured: every send fails, so callers
/// surface the failure instead of silently dropping codes.
pub struct UnconfiguredMailer;

#[async_trait]
impl Mailer for UnconfiguredMailer {
    async fn send(&self, _: &str, _: &str, _: &str, _: Option<&str>) -> Result<(), MailError> {
        Err(MailError::NotConfigured)
    }
}

// ---------------- templates ------------------------------------------

/// Subject, plain-text and HTML bodies for an OTP email.
pub fn otp_email(code: &str, purpose: Purpose) -> (String, String, String) {
    let (subject, action) = match purpose {
        Purpose::Signup => (
            "Your OTP for Todo App Signup".to_string(),
            "creating your account",
        ),
        Purpose::PasswordReset => (
            "Your OTP for Todo App Password Reset".to_string(),
            "resetting your password",
        ),
    };
    let text = format!(
        "Your OTP is: {code}\n\nYou've requested a verification code for {action}.\n\
         This code will expire in 5 minutes. If you didn't request it, ignore this email."
    );
    let html = format!(
        "<html><body style=\"font-family:sans-serif\">\
         <h1>Todo App</h1>\
         <p>You've requested a verification code for {action}. \
         Use the code below to complete the process:</p>\
         <p style=\"font-size:36px;letter-spacing:8px;font-family:monospace\"><b>{code}</b></p>\
         <p style=\"color:#888\">This code will expire in 5 minutes.<br>\
         If you didn't request this code, please ignore this email.</p>\
         </body></html>"
    );
    (subject, text, html)
}

/// Export of a user's list, grouped pending/completed.
pub fn todo_export_email(
    username: &str,
    todos: &[Todo],
    website_url: Option<&str>,
) -> (String, String, String) {
    let (done, pending): (Vec<&Todo>, Vec<&Todo>) = todos.iter().partition(|t| t.done);

    let line = |idx: usize, t: &Todo| {
        format!(
            "{}. {} - {} ({} {}){}",
            idx + 1,
            t.title,
            t.description.as_deref().unwrap_or("No description"),
            t.date.as_deref().unwrap_or("No date"),
            t.time.as_deref().unwrap_or("No time"),
            if t.done { " [Done]" } else { " [Pending]" },
        )
    };
    let mut lines: Vec<String> = Vec::with_capacity(todos.len());
    for (i, t) in pending.iter().copied().chain(done.iter().copied()).enumerate() {
        lines.push(line(i, t));
    }
    let mut text = format!("Here are your todos:\n\n{}", lines.join("\n"));
    if let Some(url) = website_url {
        text.push_str(&format!("\n\nVisit our website to manage your todos: {url}"));
    }

    let card = |idx: usize, t: &Todo| {
        format!(
            "<li><b>{}. {}</b> — {}{}{}</li>",
            idx + 1,
            t.title,
            t.description.as_deref().unwrap_or("No description"),
            t.date
                .as_deref()
                .map(|d| format!(" ({d})"))
                .unwrap_or_default(),
            t.time
                .as_deref()
                .map(|t| format!(" {t}"))
                .unwrap_or_default(),
        )
    };
    let mut html = format!(
        "<html><body style=\"font-family:sans-serif\">\
         <h1>Your Todo List</h1><p>Hello, {username}!</p>\
         <p>{} completed / {} pending</p>",
        done.len(),
        pending.len()
    );
    if !pending.is_empty() {
        html.push_str(&format!("<h2>Pending Tasks ({})</h2><ul>", pending.len()));
        for (i, t) in pending.iter().copied().enumerate() {
            html.push_str(&card(i, t));
        }
        html.push_str("</ul>");
    }
    if !done.is_empty() {
        html.push_str(&format!("<h2>Completed Tasks ({})</h2><ul>", done.len()));
        for (i, t) in done.iter().copied().enumerate() {
            html.push_str(&card(pending.len() + i, t));
        }
        html.push_str("</ul>");
    }
    if let Some(url) = website_url {
        html.push_str(&format!("<p><a href=\"{url}\">Open Todo App</a></p>"));
    }
    html.push_str("</body></html>");

    ("Your Todo List - Todo App".to_string(), text, html)
}
