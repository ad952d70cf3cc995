use async_trait::async_trait;
use chatsync_core::{FetchError, HistoryApi};
use chatsync_types::api::{BelowQuery, ByIdQuery, DataEnvelope, HistoryQuery, PinnedQuery};
use chatsync_types::models::{Message, MessageId, PinnedMessage, Selection};
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

/// [`HistoryApi`] over the chat service's REST endpoints.
#[derive(Clone)]
pub struct RestHistoryApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl RestHistoryApi {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    async fn get<Q, T>(&self, path: &str, query: &Q) -> Result<Vec<T>, FetchError>
    where
        Q: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.get(&url).query(query);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        let status = resp.status();
        debug!("GET {} -> {}", path, status);
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound);
        }
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        let envelope: DataEnvelope<T> =
            serde_json::from_slice(&body).map_err(|e| FetchError::Decode(e.to_string()))?;
        Ok(envelope.into_items())
    }
}

#[async_trait]
impl HistoryApi for RestHistoryApi {
    async fn fetch_history(
        &self,
        selection: &Selection,
        limit: usize,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Message>, FetchError> {
        self.get("/message/get-message", &HistoryQuery::new(selection, limit, before))
            .await
    }

    async fn fetch_newer(
        &self,
        selection: &Selection,
        limit: usize,
        after: DateTime<Utc>,
    ) -> Result<Vec<Message>, FetchError> {
        self.get("/message/get-message-below", &BelowQuery::new(selection, limit, after))
            .await
    }

    async fn fetch_by_id(
        &self,
        selection: &Selection,
        target: &MessageId,
    ) -> Result<Vec<Message>, FetchError> {
        self.get("/message/get-message-by-id", &ByIdQuery::new(selection, target))
            .await
    }

    async fn fetch_pinned(&self, selection: &Selection) -> Result<Vec<PinnedMessage>, FetchError> {
        self.get("/message/pinned", &PinnedQuery::new(selection)).await
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn message_json(id: &str, at: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "sender_id": "bob",
            "receiver_id": "me",
            "content": "hi",
            "created_at": at,
            "type": "text"
        })
    }

    #[tokio::test]
    async fn history_sends_cursor_and_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/message/get-message"))
            .and(query_param("receiver_id", "bob"))
            .and(query_param("limit", "30"))
            .and(query_param("beforeTime", "2024-01-12T20:00:03.000Z"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [message_json("65a1b2c3000000000000000a", "2024-01-12T20:00:01Z")]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = RestHistoryApi::new(server.uri(), Some("secret".into()));
        let before = DateTime::parse_from_rfc3339("2024-01-12T20:00:03Z")
            .unwrap()
            .with_timezone(&Utc);
        let page = api
            .fetch_history(&Selection::direct("bob"), 30, Some(before))
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].sender_id, "bob");
    }

    #[tokio::test]
    async fn null_data_is_an_empty_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/message/get-message-by-id"))
            .and(query_param("message_id", "mX"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": null})))
            .mount(&server)
            .await;

        let api = RestHistoryApi::new(server.uri(), None);
        let page = api
            .fetch_by_id(&Selection::group("g1"), &MessageId::new("mX"))
            .await
            .unwrap();
        assert!(page.is_empty());
    }

    #[tokio::test]
    async fn status_codes_map_to_fetch_errors() {
        let server = MockServer::start().await;
        Mock::given(path("/message/get-message-by-id"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(path("/message/pinned"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(path("/message/get-message-below"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let api = RestHistoryApi::new(server.uri(), None);
        let sel = Selection::direct("bob");

        assert_eq!(
            api.fetch_by_id(&sel, &MessageId::new("m1")).await,
            Err(FetchError::NotFound)
        );
        assert_eq!(api.fetch_pinned(&sel).await, Err(FetchError::Status(503)));
        assert!(matches!(
            api.fetch_newer(&sel, 30, Utc::now()).await,
            Err(FetchError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_server_is_transport_error() {
        let api = RestHistoryApi::new("http://127.0.0.1:9", None);
        let err = api
            .fetch_history(&Selection::direct("bob"), 30, None)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Transport(_)));
    }
}
