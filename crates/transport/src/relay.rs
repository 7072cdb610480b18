//! HTTP implementation of [`Relay`].

use url::Url;

use crate::{BoxFuture, EventStream, HttpClient, Relay, TransportError};

/// Relay reached over HTTPS at a fixed bridge URL.
#[derive(Clone)]
pub struct HttpRelay {
    base: String,
    client: HttpClient,
}

impl HttpRelay {
    /// `bridge_url` is the relay root, e.g. `https://bridge.tonapi.io/bridge`.
    pub fn new(bridge_url: &str, client: HttpClient) -> Self {
        Self {
            base: bridge_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn bridge_url(&self) -> &str {
        &self.base
    }

    /// URL of the event stream for `client_ids`.
    pub fn events_url(
        &self,
        client_ids: &[String],
        last_event_id: Option<&str>,
    ) -> Result<String, TransportError> {
        events_url(&self.base, client_ids, last_event_id)
    }

    /// URL for posting one message.
    pub fn message_url(&self, client_id: &str, to: &str, ttl_secs: u64) -> Result<String, TransportError> {
        message_url(&self.base, client_id, to, ttl_secs)
    }
}

fn endpoint(base: &str, path: &str) -> Result<Url, TransportError> {
    Url::parse(&format!("{}/{path}", base.trim_end_matches('/')))
        .map_err(|_| TransportError::InvalidUrl(base.to_string()))
}

fn events_url(
    base: &str,
    client_ids: &[String],
    last_event_id: Option<&str>,
) -> Result<String, TransportError> {
    let mut url = endpoint(base, "events")?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("client_id", &client_ids.join(","));
        if let Some(id) = last_event_id {
            query.append_pair("last_event_id", id);
        }
    }
    Ok(url.into())
}

fn message_url(base: &str, client_id: &str, to: &str, ttl_secs: u64) -> Result<String, TransportError> {
    let mut url = endpoint(base, "message")?;
    url.query_pairs_mut()
        .append_pair("client_id", client_id)
        .append_pair("to", to)
        .append_pair("ttl", &ttl_secs.to_string());
    Ok(url.into())
}

impl Relay for HttpRelay {
    fn subscribe<'a>(
        &'a self,
        client_ids: &'a [String],
        last_event_id: Option<&'a str>,
    ) -> BoxFuture<'a, Result<EventStream, TransportError>> {
        Box::pin(async move {
            let url = self.events_url(client_ids, last_event_id)?;
            tracing::debug!(sessions = client_ids.len(), ?last_event_id, "opening relay stream");
            self.client.open_stream(&url).await
        })
    }

    fn post_message<'a>(
        &'a self,
        client_id: &'a str,
        to: &'a str,
        ttl_secs: u64,
        body: String,
    ) -> BoxFuture<'a, Result<(), TransportError>> {
        Box::pin(async move {
            let url = self.message_url(client_id, to, ttl_secs)?;
            self.client.post_text(&url, body).await?;
            tracing::debug!(client_id, to, "relay message posted");
            Ok(())
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://bridge.example.com/bridge/";

    #[test]
    fn events_url_joins_sessions() {
        let url = events_url(BASE, &["aa".into(), "bb".into()], None).unwrap();
        assert_eq!(url, "https://bridge.example.com/bridge/events?client_id=aa%2Cbb");
    }

    #[test]
    fn events_url_with_cursor() {
        let url = events_url(BASE, &["aa".into()], Some("42")).unwrap();
        assert_eq!(
            url,
            "https://bridge.example.com/bridge/events?client_id=aa&last_event_id=42"
        );
    }

    #[test]
    fn message_url_has_ttl() {
        let url = message_url(BASE, "me", "you", 300).unwrap();
        assert_eq!(
            url,
            "https://bridge.example.com/bridge/message?client_id=me&to=you&ttl=300"
        );
    }

    #[test]
    fn bad_base_is_invalid_url() {
        assert!(matches!(
            message_url("not a url", "a", "b", 1),
            Err(TransportError::InvalidUrl(_))
        ));
    }
}
