use crate::error::ProviderError;
use crate::ports::{Mailer, OutgoingEmail, ProviderFuture};
use crate::utils::{b64url_encode, send_checked};

use lettre::message::{header::ContentType, Mailbox};
use lettre::Message;
use tracing::info;
use yup_oauth2::authenticator::DefaultAuthenticator;
use yup_oauth2::authorized_user::AuthorizedUserSecret;

const SEND_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me/messages/send";
const GMAIL_SEND_SCOPE: &str = "https://www.googleapis.com/auth/gmail.send";
const SERVICE: &str = "gmail";

pub struct GmailClient {
    http_client: reqwest::Client,
    authenticator: DefaultAuthenticator,
    sender: Mailbox,
}

impl GmailClient {
    /// The authorized-user flow refreshes and caches access tokens from the stored refresh token.
    pub async fn connect(
        http_client: reqwest::Client,
        client_id: String,
        client_secret: String,
        refresh_token: String,
        sender: Mailbox,
    ) -> std::io::Result<Self> {
        let secret = AuthorizedUserSecret {
            client_id,
            client_secret,
            refresh_token,
            key_type: "authorized_user".to_string(),
        };
        let authenticator = yup_oauth2::AuthorizedUserAuthenticator::builder(secret)
            .build()
            .await?;
        Ok(Self {
            http_client,
            authenticator,
            sender,
        })
    }

    async fn access_token(&self) -> Result<String, ProviderError> {
        let token = self
            .authenticator
            .token(&[GMAIL_SEND_SCOPE])
            .await
            .map_err(|e| ProviderError::Auth {
                service: SERVICE,
                reason: e.to_string(),
            })?;
        token
            .token()
            .map(str::to_string)
            .ok_or_else(|| ProviderError::Auth {
                service: SERVICE,
                reason: "token response carried no access token".to_string(),
            })
    }
}

/// Plain-text message, base64url encoded for the `raw` field.
pub fn encode_message(sender: &Mailbox, email: &OutgoingEmail) -> Result<String, ProviderError> {
    let invalid = |reason: String| ProviderError::InvalidRequest {
        service: SERVICE,
        reason,
    };
    let to: Mailbox = email
        .to
        .parse()
        .map_err(|e| invalid(format!("recipient '{}': {e}", email.to.escape_debug())))?;
    // Booking titles end up in the subject; never let them start a new header line.
    let subject: String = email
        .subject
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    let message = Message::builder()
        .from(sender.clone())
        .to(to)
        .subject(subject)
        .header(ContentType::TEXT_PLAIN)
        .body(email.body.clone())
        .map_err(|e| invalid(e.to_string()))?;
    Ok(b64url_encode(&message.formatted()))
}

impl Mailer for GmailClient {
    fn send<'a>(&'a self, email: &'a OutgoingEmail) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            let raw = encode_message(&self.sender, email)?;
            let token = self.access_token().await?;
            let rq = self
                .http_client
                .post(SEND_URL)
                .bearer_auth(token)
                .json(&serde_json::json!({ "raw": raw }));
            send_checked(SERVICE, rq).await?;
            info!(to = %email.to, subject = %email.subject, "gmail message sent");
            Ok(())
        })
    }
}
