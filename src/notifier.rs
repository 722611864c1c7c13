//! Notifiers receive the changes detected by each refresh cycle.
use std::{collections::HashMap, sync::Arc, time::Duration};

use derive_more::From;
use hmac::{Hmac, Mac};
use reqwest::Url;
use serde::Serialize;
use serde_json::json;
use sha2::Sha256;

use crate::{DiffCache, Error, Result};

/// A component that gets told about flag changes.
///
/// `notify()` is called on a dedicated thread for every refresh cycle that changed at least one
/// flag. Returning (with `Ok` or `Err`) marks the delivery as complete; errors are logged and
/// otherwise ignored.
pub trait Notifier: Send + Sync {
    /// Deliver `diff`.
    fn notify(&self, diff: &DiffCache) -> Result<()>;

    /// Short name used in log messages.
    fn name(&self) -> &str {
        "custom"
    }
}

impl<T: Fn(&DiffCache) -> Result<()> + Send + Sync> Notifier for T {
    fn notify(&self, diff: &DiffCache) -> Result<()> {
        self(diff)
    }
}

/// Configuration of a notifier, turned into a [`Notifier`] when the client is built.
#[derive(Clone, From)]
pub enum NotifierConfig {
    /// Call an HTTP endpoint with the changes.
    Webhook(WebhookConfig),
    /// Post a message to a Slack incoming webhook.
    Slack(SlackConfig),
    /// A user-supplied notifier.
    Custom(Arc<dyn Notifier>),
}

impl NotifierConfig {
    /// Wrap a user-supplied notifier.
    ///
    /// ```
    /// # use flagsync::{DiffCache, NotifierConfig};
    /// let config = NotifierConfig::custom(|diff: &DiffCache| -> flagsync::Result<()> {
    ///     println!("{} flags added", diff.added.len());
    ///     Ok(())
    /// });
    /// ```
    pub fn custom(notifier: impl Notifier + 'static) -> NotifierConfig {
        NotifierConfig::Custom(Arc::new(notifier))
    }

    pub(crate) fn build(&self) -> Result<Arc<dyn Notifier>> {
        Ok(match self {
            NotifierConfig::Webhook(config) => Arc::new(WebhookNotifier::new(config)?),
            NotifierConfig::Slack(config) => Arc::new(SlackNotifier::new(config)?),
            NotifierConfig::Custom(notifier) => notifier.clone(),
        })
    }
}

const NOTIFIER_TIMEOUT: Duration = Duration::from_secs(10);

fn http_client() -> Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(NOTIFIER_TIMEOUT)
        .build()?)
}

fn check_status(response: reqwest::blocking::Response) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(Error::UnexpectedStatus(status.as_u16()))
    }
}

/// Writes every change to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, diff: &DiffCache) -> Result<()> {
        for key in diff.deleted.keys() {
            log::info!(target: "flagsync", flag_key = key.as_str(); "flag {key} removed");
        }
        for key in diff.added.keys() {
            log::info!(target: "flagsync", flag_key = key.as_str(); "flag {key} added");
        }
        for (key, change) in &diff.updated {
            if change.before.disable != change.after.disable {
                let state = if change.after.disable { "OFF" } else { "ON" };
                log::info!(target: "flagsync", flag_key = key.as_str(); "flag {key} is turned {state}");
            } else {
                log::info!(target: "flagsync",
                           flag_key = key.as_str(),
                           before:serde = change.before,
                           after:serde = change.after;
                           "flag {key} updated");
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Configuration of a [`WebhookNotifier`].
///
/// The endpoint receives a `POST` request with the following body:
///
/// ```json
/// {
///   "meta": {"app.name": "my app"},
///   "flags": {
///     "deleted": {"test-flag": {...}},
///     "added": {"test-flag3": {...}},
///     "updated": {"test-flag2": {"old_value": {...}, "new_value": {...}}}
///   }
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct WebhookConfig {
    /// URL receiving the `POST` request.
    pub endpoint_url: String,
    /// If not empty, the body is signed with HMAC-SHA256 using this secret and the signature is
    /// sent in the `X-Hub-Signature-256` header.
    pub secret: String,
    /// Additional information sent along with the changes.
    pub meta: HashMap<String, String>,
}

impl WebhookConfig {
    /// Create a webhook configuration for `endpoint_url`.
    pub fn new(endpoint_url: impl Into<String>) -> WebhookConfig {
        WebhookConfig {
            endpoint_url: endpoint_url.into(),
            ..WebhookConfig::default()
        }
    }

    /// Sign request bodies with `secret`.
    pub fn secret(mut self, secret: impl Into<String>) -> WebhookConfig {
        self.secret = secret.into();
        self
    }

    /// Add a meta entry sent with every request.
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<String>) -> WebhookConfig {
        self.meta.insert(key.into(), value.into());
        self
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    meta: &'a HashMap<String, String>,
    flags: &'a DiffCache,
}

/// Sends changes to an HTTP endpoint.
pub struct WebhookNotifier {
    client: reqwest::blocking::Client,
    endpoint_url: Url,
    secret: String,
    meta: HashMap<String, String>,
}

impl WebhookNotifier {
    /// Create a notifier from its configuration. Fails if the endpoint is not a valid URL.
    pub fn new(config: &WebhookConfig) -> Result<WebhookNotifier> {
        let endpoint_url =
            Url::parse(&config.endpoint_url).map_err(|source| Error::InvalidNotifierConfig {
                notifier: "webhook",
                source,
            })?;

        let mut meta = config.meta.clone();
        if !meta.contains_key("hostname") {
            if let Some(hostname) = hostname() {
                meta.insert("hostname".to_owned(), hostname);
            }
        }

        Ok(WebhookNotifier {
            client: http_client()?,
            endpoint_url,
            secret: config.secret.clone(),
            meta,
        })
    }

    /// Endpoint this notifier posts to.
    pub fn endpoint_url(&self) -> &Url {
        &self.endpoint_url
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, diff: &DiffCache) -> Result<()> {
        let body = serde_json::to_vec(&WebhookPayload {
            meta: &self.meta,
            flags: diff,
        })?;

        let mut request = self
            .client
            .post(self.endpoint_url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if !self.secret.is_empty() {
            request = request.header("X-Hub-Signature-256", sign(&self.secret, &body)?);
        }

        check_status(request.body(body).send()?)
    }

    fn name(&self) -> &str {
        "webhook"
    }
}

fn hostname() -> Option<String> {
    ["HOSTNAME", "COMPUTERNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok())
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|hostname| hostname.trim().to_owned())
        .filter(|hostname| !hostname.is_empty())
}

/// Compute the `sha256=<hex>` signature of `body`.
fn sign(secret: &str, body: &[u8]) -> Result<String> {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(secret.as_bytes())
        .map_err(|_| Error::notifier("invalid webhook secret"))?;
    mac.update(body);
    Ok(format!("sha256={:x}", mac.finalize().into_bytes()))
}

/// Configuration of a [`SlackNotifier`].
#[derive(Debug, Clone, Default)]
pub struct SlackConfig {
    /// Slack incoming webhook URL.
    pub webhook_url: String,
}

impl SlackConfig {
    /// Create a Slack configuration for `webhook_url`.
    pub fn new(webhook_url: impl Into<String>) -> SlackConfig {
        SlackConfig {
            webhook_url: webhook_url.into(),
        }
    }
}

/// Posts a human readable summary of the changes to Slack.
pub struct SlackNotifier {
    client: reqwest::blocking::Client,
    webhook_url: Url,
}

impl SlackNotifier {
    /// Create a notifier from its configuration. Fails if the webhook is not a valid URL.
    pub fn new(config: &SlackConfig) -> Result<SlackNotifier> {
        let webhook_url =
            Url::parse(&config.webhook_url).map_err(|source| Error::InvalidNotifierConfig {
                notifier: "slack notifier",
                source,
            })?;

        Ok(SlackNotifier {
            client: http_client()?,
            webhook_url,
        })
    }
}

impl Notifier for SlackNotifier {
    fn notify(&self, diff: &DiffCache) -> Result<()> {
        let response = self
            .client
            .post(self.webhook_url.clone())
            .json(&slack_message(diff))
            .send()?;
        check_status(response)
    }

    fn name(&self) -> &str {
        "slack"
    }
}

fn slack_message(diff: &DiffCache) -> serde_json::Value {
    let mut attachments = Vec::new();
    for key in diff.deleted.keys() {
        attachments.push(json!({
            "title": format!("Flag \"{key}\" deleted"),
            "color": "#FF0000",
        }));
    }
    for (key, flag) in &diff.added {
        attachments.push(json!({
            "title": format!("Flag \"{key}\" created"),
            "color": "#008000",
            "text": serde_json::to_string(flag).unwrap_or_default(),
        }));
    }
    for (key, change) in &diff.updated {
        attachments.push(json!({
            "title": format!("Flag \"{key}\" updated"),
            "color": "#FFA500",
            "fields": [
                {"title": "Before", "value": serde_json::to_string(&change.before).unwrap_or_default()},
                {"title": "After", "value": serde_json::to_string(&change.after).unwrap_or_default()},
            ],
        }));
    }

    json!({
        "text": "Changes detected in your feature flag file",
        "attachments": attachments,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;
    use crate::{DiffUpdated, Flag};

    fn diff() -> DiffCache {
        DiffCache {
            deleted: HashMap::from([("old".to_owned(), Flag::default())]),
            added: HashMap::from([("new".to_owned(), Flag::default())]),
            updated: HashMap::from([(
                "changed".to_owned(),
                DiffUpdated {
                    before: Flag::default(),
                    after: Flag {
                        disable: true,
                        ..Flag::default()
                    },
                },
            )]),
        }
    }

    #[test]
    fn builds_webhook_notifier() {
        let notifier = WebhookNotifier::new(
            &WebhookConfig::new("http://webhook.com/hook")
                .secret("Secret")
                .meta("my-app", "test"),
        )
        .unwrap();

        assert_eq!(notifier.endpoint_url().as_str(), "http://webhook.com/hook");
        assert_eq!(notifier.meta["my-app"], "test");
    }

    #[test]
    fn keeps_configured_hostname() {
        let notifier = WebhookNotifier::new(
            &WebhookConfig::new("http://webhook.com/hook").meta("hostname", "my-host"),
        )
        .unwrap();

        assert_eq!(notifier.meta["hostname"], "my-host");
    }

    #[test]
    fn rejects_invalid_webhook_url() {
        let err = NotifierConfig::from(WebhookConfig::new("not a url"))
            .build()
            .err()
            .unwrap();

        assert!(matches!(
            err,
            Error::InvalidNotifierConfig {
                notifier: "webhook",
                ..
            }
        ));
        assert!(err
            .to_string()
            .starts_with("wrong configuration in your webhook: "));
    }

    #[test]
    fn rejects_invalid_slack_url() {
        let err = NotifierConfig::from(SlackConfig::new("/relative"))
            .build()
            .err()
            .unwrap();

        assert!(matches!(
            err,
            Error::InvalidNotifierConfig {
                notifier: "slack notifier",
                ..
            }
        ));
    }

    #[test]
    fn signature_is_stable() {
        let a = sign("secret", b"{}").unwrap();
        let b = sign("secret", b"{}").unwrap();
        let c = sign("other", b"{}").unwrap();

        assert!(a.starts_with("sha256="));
        assert_eq!(a.len(), "sha256=".len() + 64);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn webhook_payload_shape() {
        let meta = HashMap::from([("app".to_owned(), "test".to_owned())]);
        let diff = diff();
        let value = serde_json::to_value(WebhookPayload {
            meta: &meta,
            flags: &diff,
        })
        .unwrap();

        assert_eq!(value["meta"], json!({"app": "test"}));
        assert!(value["flags"]["deleted"]["old"].is_object());
        assert!(value["flags"]["added"]["new"].is_object());
        assert_eq!(
            value["flags"]["updated"]["changed"]["new_value"]["disable"],
            json!(true)
        );
    }

    #[test]
    fn slack_message_lists_every_change() {
        let message = slack_message(&diff());
        assert_eq!(message["attachments"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn unreachable_webhook_returns_error() {
        // Port 9 (discard) is not expected to accept HTTP connections locally.
        let notifier =
            WebhookNotifier::new(&WebhookConfig::new("http://127.0.0.1:9/hook")).unwrap();
        assert!(notifier.notify(&diff()).is_err());
    }

    #[test]
    fn closures_are_notifiers() {
        let notifier = |diff: &DiffCache| -> Result<()> {
            assert!(diff.has_diff());
            Ok(())
        };
        assert!(Notifier::notify(&notifier, &diff()).is_ok());
        assert_eq!(Notifier::name(&notifier), "custom");
        assert!(LogNotifier.notify(&diff()).is_ok());
    }
}
