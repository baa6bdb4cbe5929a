use std::env;
use std::time::Duration;

use async_trait::async_trait;
use poll_core::model::{
    Answer, AnswerId, ModeratorId, Poll, PollId, Question, QuestionId, Session, SessionCode, Token,
};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::GatewayError;
use crate::gateway::PollGateway;

const DEFAULT_BASE_URL: &str = "http://localhost:8080";

#[derive(Clone, Debug)]
pub struct HttpGatewayConfig {
    pub base_url: Url,
    pub timeout: Duration,
}

impl HttpGatewayConfig {
    /// Build a config for `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Endpoint` if the URL does not parse.
    pub fn new(base_url: &str) -> Result<Self, GatewayError> {
        let base_url =
            Url::parse(base_url).map_err(|err| GatewayError::Endpoint(format!("{base_url}: {err}")))?;
        Ok(Self {
            base_url,
            timeout: Duration::from_secs(10),
        })
    }

    /// Reads `POLL_API_BASE_URL`, falling back to a local backend.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Endpoint` if the configured URL does not parse.
    pub fn from_env() -> Result<Self, GatewayError> {
        let base_url = env::var("POLL_API_BASE_URL")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.into());
        Self::new(&base_url)
    }
}

/// `PollGateway` speaking JSON over HTTP.
#[derive(Clone)]
pub struct HttpPollGateway {
    client: Client,
    config: HttpGatewayConfig,
}

impl HttpPollGateway {
    /// # Errors
    ///
    /// Returns `GatewayError::Transport` if the HTTP client cannot be built.
    pub fn new(config: HttpGatewayConfig) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.config.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, GatewayError> {
        let url = format!(
            "{}/{}",
            self.config.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Url::parse(&url).map_err(|err| GatewayError::Endpoint(format!("{url}: {err}")))
    }

    fn poll_path(moderator_id: ModeratorId, poll_id: PollId) -> String {
        format!("mod/{moderator_id}/poll/{poll_id}")
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        token: &Token,
    ) -> Result<T, GatewayError> {
        let url = self.endpoint(path)?;
        debug!(%url, "GET");
        let response = self
            .client
            .get(url)
            .query(&[("token", token.as_str())])
            .send()
            .await?;
        let response = ensure_success(response)?;
        Ok(response.json().await?)
    }
}

fn ensure_success(response: Response) -> Result<Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(GatewayError::Server {
            status: status.as_u16(),
        })
    }
}

#[async_trait]
impl PollGateway for HttpPollGateway {
    async fn exchange_code(&self, code: &SessionCode) -> Result<Token, GatewayError> {
        let url = self.endpoint("connect")?;
        debug!(%url, "POST");
        let response = self
            .client
            .post(url)
            .json(&ConnectRequest {
                code: code.as_str(),
            })
            .send()
            .await?;
        let body: ConnectResponse = ensure_success(response)?.json().await?;
        Ok(body.token)
    }

    async fn fetch_session(&self, token: &Token) -> Result<Session, GatewayError> {
        self.get_json("session", token).await
    }

    async fn fetch_poll(
        &self,
        moderator_id: ModeratorId,
        poll_id: PollId,
        token: &Token,
    ) -> Result<Poll, GatewayError> {
        self.get_json(&Self::poll_path(moderator_id, poll_id), token)
            .await
    }

    async fn fetch_questions(
        &self,
        moderator_id: ModeratorId,
        poll_id: PollId,
        token: &Token,
    ) -> Result<Vec<Question>, GatewayError> {
        let path = format!("{}/question", Self::poll_path(moderator_id, poll_id));
        self.get_json(&path, token).await
    }

    async fn fetch_answers(
        &self,
        moderator_id: ModeratorId,
        poll_id: PollId,
        question_id: QuestionId,
        token: &Token,
    ) -> Result<Vec<Answer>, GatewayError> {
        let path = format!(
            "{}/question/{question_id}/answer",
            Self::poll_path(moderator_id, poll_id)
        );
        self.get_json(&path, token).await
    }

    async fn cast_vote(
        &self,
        moderator_id: ModeratorId,
        poll_id: PollId,
        question_id: QuestionId,
        answer_id: AnswerId,
        token: &Token,
        answer: &Answer,
    ) -> Result<(), GatewayError> {
        let url = self.endpoint(&format!(
            "{}/question/{question_id}/answer/{answer_id}/vote",
            Self::poll_path(moderator_id, poll_id)
        ))?;
        debug!(%url, selected = answer.selected, "PUT");
        let response = self
            .client
            .put(url)
            .query(&[("token", token.as_str())])
            .json(answer)
            .send()
            .await?;
        ensure_success(response)?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct ConnectRequest<'a> {
    code: &'a str,
}

#[derive(Debug, Deserialize)]
struct ConnectResponse {
    token: Token,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_join_without_double_slashes() {
        let config = HttpGatewayConfig::new("https://polls.example.org/api/").unwrap();
        let gateway = HttpPollGateway::new(config).unwrap();
        let path = format!(
            "{}/question",
            HttpPollGateway::poll_path(ModeratorId::new(5), PollId::new(9))
        );
        assert_eq!(
            gateway.endpoint(&path).unwrap().as_str(),
            "https://polls.example.org/api/mod/5/poll/9/question"
        );
        assert_eq!(
            gateway.endpoint("/connect").unwrap().as_str(),
            "https://polls.example.org/api/connect"
        );
    }

    #[test]
    fn invalid_base_url_is_reported() {
        let err = HttpGatewayConfig::new("not a url").unwrap_err();
        assert!(matches!(err, GatewayError::Endpoint(_)));
    }

    #[test]
    fn connect_payload_shape() {
        let body = serde_json::to_string(&ConnectRequest { code: "0x1A3F" }).unwrap();
        assert_eq!(body, r#"{"code":"0x1A3F"}"#);
        let parsed: ConnectResponse = serde_json::from_str(r#"{"token":"tok-abc"}"#).unwrap();
        assert_eq!(parsed.token.as_str(), "tok-abc");
    }
}
