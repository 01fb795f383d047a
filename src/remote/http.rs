use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::wire::{
    ErrorBody, LookupResponse, SessionResponse, StatsResponse, StoriesResponse, StoryResponse,
    WordDetailResponse, WordsResponse,
};
use super::{RemoteError, RemoteService};
use crate::config::RemoteConfig;
use crate::models::{ContentFlag, ReviewMode};
use crate::queue::mutation::{
    QuizResultPayload, SentenceReviewPayload, StoryActionPayload, WordReviewPayload,
};

const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// JSON-over-HTTP implementation of [`RemoteService`].
#[derive(Clone)]
pub struct HttpRemote {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpRemote {
    pub fn new(config: &RemoteConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone().filter(|t| !t.trim().is_empty()),
            client,
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn get_json<T>(&self, builder: RequestBuilder) -> Result<T, RemoteError>
    where
        T: DeserializeOwned,
    {
        let response = builder.send().await.map_err(map_transport)?;
        let response = check_status(response).await?;
        let bytes = response.bytes().await.map_err(map_transport)?;
        decode_body(&bytes)
    }

    async fn post_mutation<P>(
        &self,
        path: &str,
        client_mutation_id: &str,
        payload: &P,
    ) -> Result<Response, RemoteError>
    where
        P: Serialize + ?Sized,
    {
        let body = with_mutation_id(client_mutation_id, payload)?;
        let response = self
            .request(Method::POST, path)
            .header(IDEMPOTENCY_HEADER, client_mutation_id)
            .json(&body)
            .send()
            .await
            .map_err(map_transport)?;
        check_status(response).await
    }
}

#[async_trait]
impl RemoteService for HttpRemote {
    async fn fetch_words(&self, page: u32) -> Result<WordsResponse, RemoteError> {
        let builder = self.request(Method::GET, "/api/words").query(&[("page", page)]);
        self.get_json(builder).await
    }

    async fn fetch_word_detail(&self, lemma_id: i64) -> Result<WordDetailResponse, RemoteError> {
        let builder = self.request(Method::GET, &format!("/api/words/{lemma_id}"));
        self.get_json(builder).await
    }

    async fn fetch_stats(&self) -> Result<StatsResponse, RemoteError> {
        self.get_json(self.request(Method::GET, "/api/stats")).await
    }

    async fn fetch_session(&self, mode: ReviewMode) -> Result<SessionResponse, RemoteError> {
        let builder = self
            .request(Method::GET, "/api/review/session")
            .query(&[("mode", mode.as_str())]);
        self.get_json(builder).await
    }

    async fn fetch_stories(&self, page: u32) -> Result<StoriesResponse, RemoteError> {
        let builder = self.request(Method::GET, "/api/stories").query(&[("page", page)]);
        self.get_json(builder).await
    }

    async fn fetch_story(&self, story_id: i64) -> Result<StoryResponse, RemoteError> {
        let builder = self.request(Method::GET, &format!("/api/stories/{story_id}"));
        self.get_json(builder).await
    }

    async fn lookup_word(&self, text: &str) -> Result<LookupResponse, RemoteError> {
        let builder = self.request(Method::GET, "/api/lookup").query(&[("text", text)]);
        self.get_json(builder).await
    }

    async fn lookup_story_word(
        &self,
        story_id: i64,
        position: u32,
    ) -> Result<LookupResponse, RemoteError> {
        let builder = self.request(
            Method::GET,
            &format!("/api/stories/{story_id}/lookup/{position}"),
        );
        self.get_json(builder).await
    }

    async fn submit_sentence_review(
        &self,
        client_mutation_id: &str,
        payload: &SentenceReviewPayload,
    ) -> Result<(), RemoteError> {
        self.post_mutation("/api/review/sentence", client_mutation_id, payload)
            .await
            .map(|_| ())
    }

    async fn submit_word_review(
        &self,
        client_mutation_id: &str,
        payload: &WordReviewPayload,
    ) -> Result<(), RemoteError> {
        self.post_mutation("/api/review/word", client_mutation_id, payload)
            .await
            .map(|_| ())
    }

    async fn undo_sentence_review(&self, client_mutation_id: &str) -> Result<(), RemoteError> {
        self.post_mutation(
            "/api/review/sentence/undo",
            client_mutation_id,
            &serde_json::json!({}),
        )
        .await
        .map(|_| ())
    }

    async fn submit_quiz_result(
        &self,
        client_mutation_id: &str,
        payload: &QuizResultPayload,
    ) -> Result<(), RemoteError> {
        self.post_mutation("/api/quiz/results", client_mutation_id, payload)
            .await
            .map(|_| ())
    }

    async fn story_action(
        &self,
        client_mutation_id: &str,
        payload: &StoryActionPayload,
    ) -> Result<(), RemoteError> {
        let path = format!("/api/stories/{}/{}", payload.story_id, payload.action.as_str());
        self.post_mutation(&path, client_mutation_id, payload)
            .await
            .map(|_| ())
    }

    async fn introduce_word(
        &self,
        client_mutation_id: &str,
        lemma_id: i64,
    ) -> Result<WordDetailResponse, RemoteError> {
        let response = self
            .post_mutation(
                &format!("/api/words/{lemma_id}/introduce"),
                client_mutation_id,
                &serde_json::json!({ "lemma_id": lemma_id }),
            )
            .await?;
        let bytes = response.bytes().await.map_err(map_transport)?;
        decode_body(&bytes)
    }

    async fn suspend_word(&self, client_mutation_id: &str, lemma_id: i64) -> Result<(), RemoteError> {
        self.post_mutation(
            &format!("/api/words/{lemma_id}/suspend"),
            client_mutation_id,
            &serde_json::json!({ "lemma_id": lemma_id }),
        )
        .await
        .map(|_| ())
    }

    async fn flag_content(&self, client_mutation_id: &str, flag: &ContentFlag) -> Result<(), RemoteError> {
        self.post_mutation("/api/flags", client_mutation_id, flag)
            .await
            .map(|_| ())
    }
}

/// Decodes a success body. The backend wraps payloads as
/// `{ "success": true, "data": ... }`; bare bodies are accepted as well.
fn decode_body<T>(bytes: &[u8]) -> Result<T, RemoteError>
where
    T: DeserializeOwned,
{
    let mut value: Value =
        serde_json::from_slice(bytes).map_err(|e| RemoteError::Decode(e.to_string()))?;
    let enveloped = value
        .as_object()
        .is_some_and(|map| map.contains_key("success") && map.contains_key("data"));
    if enveloped {
        value = value["data"].take();
    }
    serde_json::from_value(value).map_err(|e| RemoteError::Decode(e.to_string()))
}

fn with_mutation_id<P>(client_mutation_id: &str, payload: &P) -> Result<Value, RemoteError>
where
    P: Serialize + ?Sized,
{
    let mut body = serde_json::to_value(payload).map_err(|e| RemoteError::Decode(e.to_string()))?;
    match body.as_object_mut() {
        Some(map) => {
            map.insert(
                "client_mutation_id".to_string(),
                Value::String(client_mutation_id.to_string()),
            );
            Ok(body)
        }
        None => Err(RemoteError::Decode("mutation payload is not an object".to_string())),
    }
}

fn map_transport(err: reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        RemoteError::Timeout
    } else {
        RemoteError::Network(err.to_string())
    }
}

async fn check_status(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(status_error(status.as_u16(), &body))
}

fn status_error(status: u16, body: &str) -> RemoteError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => RemoteError::Status {
            status,
            code: parsed.code.unwrap_or_default(),
            message: parsed.error,
        },
        Err(_) => RemoteError::Status {
            status,
            code: String::new(),
            message: body.to_string(),
        },
    }
}
