//! Thin HTTPS client over hyper + rustls.

use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use http_body_util::{BodyExt, BodyStream, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;

use crate::sse::SseDecoder;
use crate::{EventStream, TransportError};

type HyperClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// Shared HTTPS client. Cheap to clone.
#[derive(Clone)]
pub struct HttpClient {
    inner: HyperClient,
    timeout: Duration,
}

impl HttpClient {
    /// Builds a TLS-enabled client using the platform's native roots.
    ///
    /// `timeout` bounds one-shot requests; event streams are unbounded.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let _ = rustls::crypto::ring::default_provider().install_default();

        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|_| TransportError::TlsFailed)?
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .build();

        Ok(Self {
            inner: Client::builder(hyper_util::rt::TokioExecutor::new()).build(https),
            timeout,
        })
    }

    /// GETs `url` and returns the body as text.
    pub async fn get_text(&self, url: &str) -> Result<String, TransportError> {
        let req = hyper::Request::builder()
            .method(hyper::Method::GET)
            .uri(url)
            .header("accept", "application/json")
            .body(Full::new(Bytes::new()))
            .map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
        self.send_collect(req).await
    }

    /// POSTs a `text/plain` body to `url`.
    pub async fn post_text(&self, url: &str, body: String) -> Result<String, TransportError> {
        let req = hyper::Request::builder()
            .method(hyper::Method::POST)
            .uri(url)
            .header("content-type", "text/plain")
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
        self.send_collect(req).await
    }

    /// Opens a server-sent event stream at `url`.
    ///
    /// The returned stream yields decoded events until the connection breaks,
    /// then a single error ([`TransportError::StreamClosed`] on clean EOF).
    pub async fn open_stream(&self, url: &str) -> Result<EventStream, TransportError> {
        let req = hyper::Request::builder()
            .method(hyper::Method::GET)
            .uri(url)
            .header("accept", "text/event-stream")
            .header("cache-control", "no-cache")
            .body(Full::new(Bytes::new()))
            .map_err(|e| TransportError::InvalidUrl(e.to_string()))?;

        let resp = self.inner.request(req).await.map_err(|e| {
            tracing::warn!(?e, "event stream request failed");
            TransportError::RequestFailed(e.to_string())
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let frames = BodyStream::new(resp.into_body());
        let state = StreamState {
            frames: Box::pin(frames),
            decoder: SseDecoder::new(),
            ready: std::collections::VecDeque::new(),
            done: false,
        };

        let stream = futures::stream::unfold(state, |mut st| async move {
            loop {
                if let Some(event) = st.ready.pop_front() {
                    return Some((Ok(event), st));
                }
                if st.done {
                    return None;
                }
                match st.frames.next().await {
                    Some(Ok(frame)) => {
                        if let Ok(data) = frame.into_data() {
                            st.ready.extend(st.decoder.feed(&data));
                        }
                    }
                    Some(Err(e)) => {
                        st.done = true;
                        return Some((Err(TransportError::Stream(e.to_string())), st));
                    }
                    None => {
                        st.done = true;
                        return Some((Err(TransportError::StreamClosed), st));
                    }
                }
            }
        });

        Ok(Box::pin(stream))
    }

    async fn send_collect(
        &self,
        req: hyper::Request<Full<Bytes>>,
    ) -> Result<String, TransportError> {
        let fut = async {
            let resp = self.inner.request(req).await.map_err(|e| {
                tracing::warn!(?e, "HTTP request failed");
                TransportError::RequestFailed(e.to_string())
            })?;

            let status = resp.status();
            let body = resp
                .into_body()
                .collect()
                .await
                .map_err(|e| TransportError::RequestFailed(e.to_string()))?
                .to_bytes();

            let text = std::str::from_utf8(&body)
                .map_err(|_| TransportError::InvalidResponse("body is not UTF-8"))?;

            if !status.is_success() {
                tracing::warn!(%status, body = text, "HTTP error response");
                return Err(TransportError::Status(status.as_u16()));
            }
            Ok(text.to_owned())
        };

        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| TransportError::Timeout)?
    }
}

struct StreamState {
    frames: std::pin::Pin<
        Box<dyn futures::Stream<Item = Result<hyper::body::Frame<Bytes>, hyper::Error>> + Send>,
    >,
    decoder: SseDecoder,
    ready: std::collections::VecDeque<crate::RelayEvent>,
    done: bool,
}
