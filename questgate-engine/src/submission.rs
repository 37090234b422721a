//! Score submission seam.

use async_trait::async_trait;
use questgate_common::{GoalId, ProofBundle};

use crate::error::SubmitError;

/// Accepts an aggregate proof bundle and returns the score it earned.
#[async_trait]
pub trait ScoreSubmitter: Send + Sync {
    async fn submit(&self, bundle: &ProofBundle, goal_id: GoalId) -> Result<u64, SubmitError>;
}

#[async_trait]
impl<S: ScoreSubmitter + ?Sized> ScoreSubmitter for std::sync::Arc<S> {
    async fn submit(&self, bundle: &ProofBundle, goal_id: GoalId) -> Result<u64, SubmitError> {
        (**self).submit(bundle, goal_id).await
    }
}

#[cfg(feature = "http")]
pub use http::HttpScoreSubmitter;

#[cfg(feature = "http")]
mod http {
    use std::time::Duration;

    use async_trait::async_trait;
    use questgate_common::{GoalId, ProofBundle};
    use serde::Deserialize;

    use super::ScoreSubmitter;
    use crate::error::SubmitError;

    const DEFAULT_TIMEOUT_SECS: u64 = 120;

    /// Posts bundles to `{base}/api/{quests|powers}/{id}/leaderboard`.
    #[derive(Clone, Debug)]
    pub struct HttpScoreSubmitter {
        client: reqwest::Client,
        base_url: String,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct SubmitResponse {
        score_added: u64,
    }

    impl HttpScoreSubmitter {
        pub fn new(base_url: impl Into<String>) -> Result<Self, SubmitError> {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
                .build()
                .map_err(|err| SubmitError::Transport(err.to_string()))?;
            Ok(Self::with_client(client, base_url))
        }

        pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
            Self {
                client,
                base_url: base_url.into().trim_end_matches('/').to_string(),
            }
        }

        pub fn endpoint(&self, bundle: &ProofBundle, goal_id: GoalId) -> String {
            format!(
                "{}/api/{}/{}/leaderboard",
                self.base_url,
                bundle.goal_kind.collection_name(),
                goal_id
            )
        }
    }

    #[async_trait]
    impl ScoreSubmitter for HttpScoreSubmitter {
        async fn submit(&self, bundle: &ProofBundle, goal_id: GoalId) -> Result<u64, SubmitError> {
            let url = self.endpoint(bundle, goal_id);
            let response = self
                .client
                .post(&url)
                .json(bundle)
                .send()
                .await
                .map_err(|err| SubmitError::Transport(err.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(SubmitError::Rejected {
                    status: status.as_u16(),
                    message,
                });
            }

            let body: SubmitResponse = response
                .json()
                .await
                .map_err(|err| SubmitError::MalformedResponse(err.to_string()))?;
            Ok(body.score_added)
        }
    }

}
