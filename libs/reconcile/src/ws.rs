//! WebSocket transport for the live channel.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use reqwest::Url;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::debug;

use crate::error::ConsoleError;
use crate::live::{FrameStream, LiveConnector};
use crate::session::SessionContext;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connects to the dashboard push endpoint.
#[derive(Debug, Clone)]
pub struct WsConnector {
    api_url: String,
    path: String,
    session: SessionContext,
}

impl WsConnector {
    pub fn new(api_url: &str, path: &str, session: SessionContext) -> Self {
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            path: path.to_string(),
            session,
        }
    }

    /// Derive the socket URL from the API URL, carrying the token as a query
    /// parameter.
    pub fn ws_url(&self, token: &str) -> Result<Url, ConsoleError> {
        let mut url = Url::parse(&format!("{}{}", self.api_url, self.path))
            .map_err(|e| ConsoleError::Invalid(format!("invalid API URL {}: {e}", self.api_url)))?;

        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            other => {
                return Err(ConsoleError::Invalid(format!(
                    "unsupported URL scheme '{other}'"
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| ConsoleError::Invalid(format!("cannot use scheme {scheme}")))?;
        url.query_pairs_mut().append_pair("token", token);

        Ok(url)
    }
}

fn map_ws_error(err: tungstenite::Error) -> ConsoleError {
    match err {
        tungstenite::Error::Http(response) => {
            let status = response.status();
            if status == 401 || status == 403 {
                ConsoleError::Auth(format!("live endpoint refused credential ({status})"))
            } else {
                ConsoleError::rejected(status.as_u16(), "live endpoint refused connection")
            }
        }
        other => ConsoleError::Network(other.to_string()),
    }
}

#[async_trait]
impl LiveConnector for WsConnector {
    async fn connect(&self) -> Result<FrameStream, ConsoleError> {
        let token = self.session.token()?;
        let url = self.ws_url(token)?;

        let (socket, _) = tokio::time::timeout(
            CONNECT_TIMEOUT,
            tokio_tungstenite::connect_async(url.as_str()),
        )
        .await
        .map_err(|_| {
            ConsoleError::Network(format!(
                "connection timeout after {} seconds",
                CONNECT_TIMEOUT.as_secs()
            ))
        })?
        .map_err(map_ws_error)?;

        debug!(path = %self.path, "Live socket connected");

        let frames = stream::unfold(Some(socket), |socket| async move {
            let mut socket = socket?;
            loop {
                match socket.next().await {
                    Some(Ok(Message::Text(text))) => {
                        return Some((Ok(text.as_str().to_owned()), Some(socket)));
                    }
                    Some(Ok(Message::Binary(data))) => {
                        let frame = String::from_utf8(data.to_vec())
                            .map_err(|e| ConsoleError::decode("binary live frame", e));
                        return Some((frame, Some(socket)));
                    }
                    Some(Ok(Message::Close(_))) | None => return None,
                    Some(Ok(_)) => continue,
                    Some(Err(
                        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed,
                    )) => return None,
                    Some(Err(e)) => return Some((Err(map_ws_error(e)), None)),
                }
            }
        });

        Ok(frames.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{EphemeralStore, Role, StoredSession, UserProfile};
    use std::sync::Arc;

    fn connector(api_url: &str) -> WsConnector {
        let session = SessionContext::from_stored(
            StoredSession {
                token: "abc".into(),
                profile: UserProfile {
                    name: "Ops".into(),
                    role: Role::Manager,
                    email: None,
                },
            },
            Arc::new(EphemeralStore),
        );
        WsConnector::new(api_url, "/ws/dashboard", session)
    }

    #[test]
    fn test_ws_url_from_http() {
        let url = connector("http://localhost:8000/").ws_url("abc").unwrap();
        assert_eq!(url.as_str(), "ws://localhost:8000/ws/dashboard?token=abc");
    }

    #[test]
    fn test_wss_url_from_https() {
        let url = connector("https://beds.example.org").ws_url("a b").unwrap();
        assert_eq!(url.as_str(), "wss://beds.example.org/ws/dashboard?token=a+b");
    }

    #[test]
    fn test_rejects_other_schemes() {
        assert!(connector("ftp://host").ws_url("abc").is_err());
    }
}
