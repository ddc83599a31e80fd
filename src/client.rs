//! HTTP glue for the challenge service: fetch a problem, post a nonce.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::Config;
use crate::difficulty::Difficulty;
use crate::error::ClientError;
use crate::error_handling::ErrorHandler;
use crate::metrics::MetricsCollector;
use crate::types::{Payload, Problem, Solution};

pub struct ChallengeClient {
    http: reqwest::Client,
    problem_url: String,
    solution_url: String,
    access_token: String,
    errors: ErrorHandler,
}

impl ChallengeClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            problem_url: config.problem_url.clone(),
            solution_url: config.solution_url.clone(),
            access_token: config.access_token.clone(),
            errors: ErrorHandler::new(config.retry_config()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.errors = self.errors.with_metrics(metrics);
        self
    }

    pub async fn fetch_problem(&self) -> Result<Problem, ClientError> {
        self.errors
            .execute_with_retry("fetch_problem", move || async move {
                let resp = self
                    .http
                    .get(&self.problem_url)
                    .query(&[("access_token", &self.access_token)])
                    .send()
                    .await?;
                let resp = check_status(resp).await?;
                let problem: Problem = resp.json().await?;
                debug!(target: "mini_miner::client", difficulty = problem.difficulty, "fetched problem");
                Ok::<_, ClientError>(problem)
            })
            .await
    }

    pub async fn submit(&self, solution: Solution) -> Result<String, ClientError> {
        self.errors
            .execute_with_retry("submit", move || async move {
                let resp = self
                    .http
                    .post(&self.solution_url)
                    .query(&[("access_token", &self.access_token)])
                    .json(&solution)
                    .send()
                    .await?;
                let resp = check_status(resp).await?;
                let body = resp.text().await?;
                info!(target: "mini_miner::client", nonce = solution.nonce, "solution submitted");
                Ok::<_, ClientError>(body)
            })
            .await
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ClientError::Status {
        status: status.as_u16(),
        body,
    })
}

impl Problem {
    /// Split into the validated difficulty and the block payload.
    pub fn into_parts(self) -> Result<(Difficulty, Payload), ClientError> {
        let difficulty =
            Difficulty::try_from(self.difficulty).map_err(|e| ClientError::Problem(e.to_string()))?;
        let payload =
            Payload::from_value(self.block).map_err(|e| ClientError::Problem(e.to_string()))?;
        Ok((difficulty, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn problem_into_parts() {
        let problem = Problem {
            difficulty: 9,
            block: json!({"nonce": null, "data": [["a", 1]]}),
        };
        let (d, payload) = problem.into_parts().unwrap();
        assert_eq!(d.bits(), 9);
        assert!(payload.as_map().contains_key("data"));
    }

    #[test]
    fn problem_rejects_bad_difficulty_and_block() {
        let negative = Problem {
            difficulty: -1,
            block: json!({}),
        };
        assert!(matches!(negative.into_parts(), Err(ClientError::Problem(_))));

        let not_object = Problem {
            difficulty: 1,
            block: json!([1, 2]),
        };
        assert!(matches!(not_object.into_parts(), Err(ClientError::Problem(_))));
    }
}
