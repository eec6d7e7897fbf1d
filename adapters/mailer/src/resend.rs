//! Primary backend: the Resend transactional email HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::content::ContactEmail;
use crate::error::MailerError;
use crate::EmailBackend;

pub const DEFAULT_API_URL: &str = "https://api.resend.com";
pub const DEFAULT_FROM: &str = "Contact Form <onboarding@resend.dev>";

#[derive(Clone)]
pub struct ResendConfig {
    /// Unset means the backend reports a configuration error without sending.
    pub api_key: Option<String>,
    pub from: String,
    pub api_url: String,
}

impl Default for ResendConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            from: DEFAULT_FROM.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
        }
    }
}

impl std::fmt::Debug for ResendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResendConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("from", &self.from)
            .field("api_url", &self.api_url)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct SendEmailPayload<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendEmailResponse {
    id: String,
}

pub struct ResendBackend {
    client: reqwest::Client,
    config: ResendConfig,
}

impl ResendBackend {
    pub fn new(config: ResendConfig, timeout: Duration) -> Result<Self, MailerError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, config })
    }

    pub fn is_configured(&self) -> bool {
        self.config.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

#[async_trait]
impl EmailBackend for ResendBackend {
    fn name(&self) -> &'static str {
        "resend"
    }

    async fn send(&self, email: &ContactEmail) -> Result<(), MailerError> {
        let api_key = match self.config.api_key.as_deref() {
            Some(k) if !k.is_empty() => k,
            _ => return Err(MailerError::NotConfigured("RESEND_API_KEY not set".into())),
        };

        let url = format!("{}/emails", self.config.api_url.trim_end_matches('/'));
        let payload = SendEmailPayload {
            from: &self.config.from,
            to: [&email.to],
            subject: &email.subject,
            html: &email.html_body,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(MailerError::Api {
                status: status.as_u16(),
                body,
            });
        }

        // Any 2xx means Resend took the email; the id is only for the logs.
        match response.json::<SendEmailResponse>().await {
            Ok(sent) => info!(email_id = %sent.id, to = %email.to, "resend accepted email"),
            Err(e) => warn!(to = %email.to, err = %e, "resend accepted email; response id unreadable"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::CsvAttachment;
    use mockito::Matcher;

    fn email() -> ContactEmail {
        ContactEmail {
            to: "admin@example.com".into(),
            subject: "Nouveau contact: Awa".into(),
            html_body: "<p>Awa</p>".into(),
            attachment: CsvAttachment {
                filename: "contact_1.csv".into(),
                content: b"ID\n1\n".to_vec(),
            },
        }
    }

    fn backend(api_url: String, api_key: Option<&str>) -> ResendBackend {
        ResendBackend::new(
            ResendConfig {
                api_key: api_key.map(str::to_string),
                from: "Forms <forms@example.com>".into(),
                api_url,
            },
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn posts_email_with_bearer_key() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("POST", "/emails")
            .match_header("authorization", "Bearer re_test")
            .match_body(Matcher::Json(serde_json::json!({
                "from": "Forms <forms@example.com>",
                "to": ["admin@example.com"],
                "subject": "Nouveau contact: Awa",
                "html": "<p>Awa</p>"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"49a3999c-0ce1-4ea6-ab68-afcd6dc2e794"}"#)
            .create_async()
            .await;

        backend(server.url(), Some("re_test"))
            .send(&email())
            .await
            .expect("sent");
        m.assert_async().await;
    }

    #[tokio::test]
    async fn accepted_without_readable_id_is_still_delivered() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("POST", "/emails")
            .with_status(202)
            .with_body("queued")
            .expect(1)
            .create_async()
            .await;

        backend(server.url(), Some("re_test"))
            .send(&email())
            .await
            .expect("2xx counts as delivered");
        m.assert_async().await;
    }

    #[tokio::test]
    async fn api_error_carries_status_and_body() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/emails")
            .with_status(422)
            .with_body(r#"{"message":"Invalid `from` field."}"#)
            .create_async()
            .await;

        let err = backend(server.url(), Some("re_test"))
            .send(&email())
            .await
            .unwrap_err();
        match err {
            MailerError::Api { status, body } => {
                assert_eq!(status, 422);
                assert!(body.contains("Invalid `from` field."));
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_key_short_circuits_without_request() {
        let mut server = mockito::Server::new_async().await;
        let m = server.mock("POST", "/emails").expect(0).create_async().await;

        let b = backend(server.url(), None);
        assert!(!b.is_configured());
        let err = b.send(&email()).await.unwrap_err();
        assert!(matches!(err, MailerError::NotConfigured(_)));

        let err = backend(server.url(), Some("")).send(&email()).await.unwrap_err();
        assert!(matches!(err, MailerError::NotConfigured(_)));
        m.assert_async().await;
    }
}
