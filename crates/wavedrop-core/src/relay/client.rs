//! HTTP client for the relay, used by both CLI roles.

use async_stream::stream;
use futures::{Stream, StreamExt};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::session::{FileInfo, Role, SessionEvent};
use crate::transport::{IceCandidate, SessionDescription};

use super::protocol::{
    AckResponse, CleanupResponse, CloseRequest, CreateRequest, CreateResponse, ListenQuery,
    SignalPayload, SignalRequest, ValidateRequest, ValidateResponse,
};

/// A connection to one relay.
#[derive(Clone)]
pub struct RelayClient {
    http: reqwest::Client,
    base_url: String,
}

impl RelayClient {
    /// Point at a relay base URL (scheme and host, no trailing slash
    /// needed).
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn post_json<Req: serde::Serialize, Resp: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        request: &Req,
    ) -> Result<Resp> {
        let response = self
            .http
            .post(self.url(path))
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Relay(format!("{path}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Relay(format!("{path}: {status}: {body}")));
        }
        response
            .json()
            .await
            .map_err(|e| Error::Relay(format!("{path}: bad response: {e}")))
    }

    /// Publish an offer and get a share token back.
    pub async fn create_session(
        &self,
        offer: SessionDescription,
        file: FileInfo,
    ) -> Result<CreateResponse> {
        self.post_json("/api/create", &CreateRequest { offer, file })
            .await
    }

    /// Check a token and fetch the session summary behind it.
    pub async fn validate(&self, token: &str) -> Result<ValidateResponse> {
        self.post_json(
            "/api/validate",
            &ValidateRequest {
                token: token.to_string(),
            },
        )
        .await
    }

    /// Submit the receiver's answer.
    pub async fn submit_answer(
        &self,
        token: &str,
        role: Role,
        answer: SessionDescription,
    ) -> Result<()> {
        let _: AckResponse = self
            .post_json(
                "/api/signal",
                &SignalRequest {
                    token: token.to_string(),
                    role,
                    payload: SignalPayload::Answer { answer },
                },
            )
            .await?;
        Ok(())
    }

    /// Publish one local candidate. Callers treat failures as non-fatal.
    pub async fn submit_candidate(
        &self,
        token: &str,
        role: Role,
        candidate: IceCandidate,
    ) -> Result<()> {
        let _: AckResponse = self
            .post_json(
                "/api/signal",
                &SignalRequest {
                    token: token.to_string(),
                    role,
                    payload: SignalPayload::Candidate { candidate },
                },
            )
            .await?;
        Ok(())
    }

    /// Delete a session once it is finished with. Best-effort; a token
    /// that already lapsed is fine.
    pub async fn close_session(&self, token: &str) -> Result<()> {
        let _: AckResponse = self
            .post_json(
                "/api/close",
                &CloseRequest {
                    token: token.to_string(),
                },
            )
            .await?;
        Ok(())
    }

    /// Trigger an expiry sweep on the relay.
    pub async fn cleanup(&self, secret: Option<&str>) -> Result<usize> {
        let mut request = self.http.get(self.url("/api/cleanup"));
        if let Some(secret) = secret {
            request = request.bearer_auth(secret);
        }
        let response = request
            .send()
            .await
            .map_err(|e| Error::Relay(format!("/api/cleanup: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Relay(format!("/api/cleanup: {status}")));
        }
        let body: CleanupResponse = response
            .json()
            .await
            .map_err(|e| Error::Relay(format!("/api/cleanup: bad response: {e}")))?;
        Ok(body.deleted)
    }

    /// Open the SSE update stream for a session.
    ///
    /// Yields one [`SessionEvent`] per `data:` line. The stream ends when
    /// the relay closes it (typically right after an `Expired` event).
    pub async fn listen(
        &self,
        token: &str,
        role: Role,
    ) -> Result<impl Stream<Item = Result<SessionEvent>> + 'static> {
        let query = ListenQuery {
            token: token.to_string(),
            role,
        };
        let response = self
            .http
            .get(self.url("/api/listen"))
            .query(&query)
            .send()
            .await
            .map_err(|e| Error::Relay(format!("/api/listen: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Relay(format!("/api/listen: {status}")));
        }

        let mut body = response.bytes_stream();
        Ok(stream! {
            let mut buffer = String::new();
            while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(Error::Relay(format!("listen stream: {e}")));
                        break;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                // SSE events are separated by a blank line.
                while let Some(boundary) = buffer.find("\n\n") {
                    let raw = buffer[..boundary].to_string();
                    buffer.drain(..boundary + 2);
                    for event in parse_sse_block(&raw) {
                        yield event;
                    }
                }
            }
            debug!("listen stream ended");
        })
    }
}

/// Pull session events out of one SSE block.
fn parse_sse_block(block: &str) -> Vec<Result<SessionEvent>> {
    let mut events = Vec::new();
    for line in block.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(data) = line.strip_prefix("data:") {
            match serde_json::from_str::<SessionEvent>(data.trim_start()) {
                Ok(event) => events.push(Ok(event)),
                Err(e) => {
                    warn!(%e, "undecodable relay event");
                    events.push(Err(Error::Relay(format!("bad event payload: {e}"))));
                }
            }
        }
        // Comment and retry lines are keep-alive noise.
    }
    events
}
