//! Notification collaborator.
//!
//! The driver fires one message per terminal transition. Delivery is
//! fire-and-forget: a broken notification channel must never block or
//! fail a workflow, so failures are logged and swallowed at this
//! boundary.

use async_trait::async_trait;
use krane_common::Cluster;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{info, warn};

/// Resource scope of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Cluster,
    Host,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Cluster => "CLUSTER",
            Scope::Host => "HOST",
        }
    }
}

/// Trait for the external notification system
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_msg(
        &self,
        operation: &str,
        scope: Scope,
        cluster: &Cluster,
        success: bool,
        content: HashMap<String, String>,
    ) -> anyhow::Result<()>;
}

/// Send a notification, logging (not propagating) any delivery failure
pub async fn notify_best_effort(
    notifier: &dyn Notifier,
    operation: &str,
    scope: Scope,
    cluster: &Cluster,
    success: bool,
    content: HashMap<String, String>,
) {
    if let Err(e) = notifier
        .send_msg(operation, scope, cluster, success, content)
        .await
    {
        warn!(operation, cluster = %cluster.name, error = %e, "notification delivery failed");
    }
}

/// Default notifier: structured log lines only
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_msg(
        &self,
        operation: &str,
        scope: Scope,
        cluster: &Cluster,
        success: bool,
        content: HashMap<String, String>,
    ) -> anyhow::Result<()> {
        info!(
            operation,
            scope = scope.as_str(),
            cluster = %cluster.name,
            success,
            ?content,
            "notification"
        );
        Ok(())
    }
}

/// Notifier that records messages, for tests
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<(String, bool)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(String, bool)> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_msg(
        &self,
        operation: &str,
        _scope: Scope,
        _cluster: &Cluster,
        success: bool,
        _content: HashMap<String, String>,
    ) -> anyhow::Result<()> {
        self.messages
            .lock()
            .unwrap()
            .push((operation.to_string(), success));
        Ok(())
    }
}
