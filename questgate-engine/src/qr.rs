//! Onboarding QR codes: opaque scan id → power binding.

use std::collections::HashMap;

use async_trait::async_trait;
use questgate_common::{Goal, GoalId, GoalKind};
use serde::{Deserialize, Serialize};

use crate::catalog::GoalSource;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrBinding {
    pub uuid: String,
    pub power_id: GoalId,
    #[serde(default)]
    pub quest_id: Option<GoalId>,
}

#[async_trait]
pub trait QrResolver: Send + Sync {
    async fn resolve(&self, scan_id: &str) -> Option<QrBinding>;
}

#[derive(Clone, Debug, Default)]
pub struct StaticQrResolver {
    bindings: HashMap<String, QrBinding>,
}

impl StaticQrResolver {
    pub fn new(bindings: impl IntoIterator<Item = QrBinding>) -> Self {
        Self {
            bindings: bindings
                .into_iter()
                .map(|binding| (binding.uuid.clone(), binding))
                .collect(),
        }
    }

    pub fn insert(&mut self, binding: QrBinding) -> Option<QrBinding> {
        self.bindings.insert(binding.uuid.clone(), binding)
    }
}

#[async_trait]
impl QrResolver for StaticQrResolver {
    async fn resolve(&self, scan_id: &str) -> Option<QrBinding> {
        let binding = self.bindings.get(scan_id).cloned();
        if binding.is_none() {
            tracing::warn!(scan_id, "unknown QR code");
        }
        binding
    }
}

/// Resolve a scan to the power it unlocks.
pub async fn resolve_power(
    resolver: &dyn QrResolver,
    goals: &dyn GoalSource,
    scan_id: &str,
) -> Option<Goal> {
    let binding = resolver.resolve(scan_id).await?;
    goals.fetch_goal(GoalKind::Power, binding.power_id).await
}
