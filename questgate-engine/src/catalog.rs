//! Goal retrieval.
//!
//! Lookups never raise: a missing goal is `None`, a failed listing is empty,
//! and the failure is logged so the host can render a not-found state.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use questgate_common::{Goal, GoalId, GoalKind};
use serde::Deserialize;

use crate::error::CatalogError;

#[async_trait]
pub trait GoalSource: Send + Sync {
    async fn fetch_goal(&self, kind: GoalKind, id: GoalId) -> Option<Goal>;

    async fn fetch_goal_list(&self, kind: GoalKind) -> Vec<Goal>;
}

/// On-disk catalog document. Powers nested under a quest are indexed too.
#[derive(Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    quests: Vec<Goal>,
    #[serde(default)]
    powers: Vec<Goal>,
}

/// Goals loaded once from JSON, with policies validated at load time.
#[derive(Clone, Debug, Default)]
pub struct JsonGoalCatalog {
    quests: BTreeMap<GoalId, Goal>,
    powers: BTreeMap<GoalId, Goal>,
}

impl JsonGoalCatalog {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        let document: CatalogDocument = serde_json::from_str(raw)?;
        let mut powers = document.powers;
        for power in &mut powers {
            power.kind = GoalKind::Power;
        }
        Self::from_goals(document.quests, powers)
    }

    pub fn from_goals(quests: Vec<Goal>, powers: Vec<Goal>) -> Result<Self, CatalogError> {
        let mut catalog = Self::default();
        for quest in quests {
            if catalog.quests.contains_key(&quest.id) {
                return Err(CatalogError::Duplicate {
                    kind: GoalKind::Quest,
                    id: quest.id,
                });
            }
            catalog.quests.insert(quest.id, quest);
        }
        for power in powers {
            if catalog.powers.contains_key(&power.id) {
                return Err(CatalogError::Duplicate {
                    kind: GoalKind::Power,
                    id: power.id,
                });
            }
            catalog.powers.insert(power.id, power);
        }
        // Nested powers fill in whatever the top-level list did not declare.
        for quest in catalog.quests.values() {
            for power in &quest.powers {
                catalog
                    .powers
                    .entry(power.id)
                    .or_insert_with(|| power.clone());
            }
        }
        Ok(catalog)
    }

    fn group(&self, kind: GoalKind) -> &BTreeMap<GoalId, Goal> {
        match kind {
            GoalKind::Quest => &self.quests,
            GoalKind::Power => &self.powers,
        }
    }

    pub fn get(&self, kind: GoalKind, id: GoalId) -> Option<&Goal> {
        self.group(kind).get(&id)
    }

    pub fn goals(&self, kind: GoalKind) -> impl Iterator<Item = &Goal> {
        self.group(kind).values()
    }

    pub fn len(&self) -> usize {
        self.quests.len() + self.powers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl GoalSource for JsonGoalCatalog {
    async fn fetch_goal(&self, kind: GoalKind, id: GoalId) -> Option<Goal> {
        let goal = self.get(kind, id).cloned();
        if goal.is_none() {
            tracing::warn!(%kind, id, "goal not found in catalog");
        }
        goal
    }

    async fn fetch_goal_list(&self, kind: GoalKind) -> Vec<Goal> {
        self.goals(kind).cloned().collect()
    }
}

#[cfg(feature = "http")]
pub use http::HttpGoalCatalog;

#[cfg(feature = "http")]
mod http {
    use std::time::Duration;

    use async_trait::async_trait;
    use questgate_common::{Goal, GoalId, GoalKind};
    use serde::de::DeserializeOwned;

    use super::GoalSource;

    /// Reads goals from `GET {base}/api/{quests|powers}[/{id}]`.
    #[derive(Clone, Debug)]
    pub struct HttpGoalCatalog {
        client: reqwest::Client,
        base_url: String,
    }

    impl HttpGoalCatalog {
        pub fn new(base_url: impl Into<String>) -> Result<Self, reqwest::Error> {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()?;
            Ok(Self::with_client(client, base_url))
        }

        pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
            Self {
                client,
                base_url: base_url.into().trim_end_matches('/').to_string(),
            }
        }

        pub fn list_url(&self, kind: GoalKind) -> String {
            format!("{}/api/{}", self.base_url, kind.collection_name())
        }

        pub fn goal_url(&self, kind: GoalKind, id: GoalId) -> String {
            format!("{}/{}", self.list_url(kind), id)
        }

        async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Option<T> {
            let response = match self.client.get(url).send().await {
                Ok(response) => response,
                Err(err) => {
                    tracing::warn!(%url, error = %err, "goal request failed");
                    return None;
                }
            };
            if !response.status().is_success() {
                tracing::warn!(%url, status = %response.status(), "goal request rejected");
                return None;
            }
            match response.json::<T>().await {
                Ok(body) => Some(body),
                Err(err) => {
                    tracing::warn!(%url, error = %err, "goal response did not parse");
                    None
                }
            }
        }
    }

    fn with_kind(mut goal: Goal, kind: GoalKind) -> Goal {
        goal.kind = kind;
        goal
    }

    #[async_trait]
    impl GoalSource for HttpGoalCatalog {
        async fn fetch_goal(&self, kind: GoalKind, id: GoalId) -> Option<Goal> {
            let goal: Goal = self.get_json(&self.goal_url(kind, id)).await?;
            Some(with_kind(goal, kind))
        }

        async fn fetch_goal_list(&self, kind: GoalKind) -> Vec<Goal> {
            self.get_json::<Vec<Goal>>(&self.list_url(kind))
                .await
                .unwrap_or_default()
                .into_iter()
                .map(|goal| with_kind(goal, kind))
                .collect()
        }
    }

}
