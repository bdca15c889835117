//! End-to-end pipeline wiring
//!
//! One `FeedbackPipeline` owns the four subsystems and runs them in order:
//! intake → aggregation → pattern detection → notification. The aggregator
//! and engine run synchronously in the request that completed a session or
//! attached an annotation; both are idempotent, so a retried trigger is
//! harmless.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::escalation::{EscalationEngine, EscalationError, SweepReport};
use crate::intake::IntakeMachine;
use crate::metrics::MetricsAggregator;
use crate::notify::{HttpMessageChannel, MessageChannel, NotificationDispatcher};
use crate::store::types::{Escalation, EscalationStatus, OfficeMetrics, SessionAnnotation};
use crate::store::{SharedFeedbackStore, StoreError};

/// Error type for pipeline entry points
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Rejected before any state mutation
    #[error("Missing sender address")]
    MissingSender,

    /// Rejected before any state mutation
    #[error("Missing message body")]
    MissingBody,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Escalation(#[from] EscalationError),

    #[error("Unknown escalation: {0}")]
    UnknownEscalation(String),

    #[error("Escalation {0} is already resolved")]
    EscalationClosed(String),
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// The assembled intake → metrics → escalation → notification pipeline
pub struct FeedbackPipeline {
    store: SharedFeedbackStore,
    intake: IntakeMachine,
    aggregator: MetricsAggregator,
    engine: EscalationEngine,
}

impl FeedbackPipeline {
    /// Build the pipeline from configuration.
    ///
    /// A channel that cannot be constructed (or absent credentials) leaves
    /// dispatch in audit-only mode rather than failing startup.
    pub fn new(store: SharedFeedbackStore, config: &AppConfig) -> Self {
        let channel: Option<Arc<dyn MessageChannel>> = match &config.channel {
            Some(cfg) => match HttpMessageChannel::new(&cfg.api_url, &cfg.api_key) {
                Ok(channel) => Some(Arc::new(channel) as Arc<dyn MessageChannel>),
                Err(e) => {
                    warn!(error = %e, "outbound channel unavailable; dispatch will audit failures");
                    None
                }
            },
            None => None,
        };
        let from_address = config
            .channel
            .as_ref()
            .map(|c| c.from_address.clone())
            .unwrap_or_default();

        let dispatcher = Arc::new(NotificationDispatcher::new(
            store.clone(),
            channel,
            from_address,
            config.default_country_code.clone(),
        ));
        Self::with_dispatcher(store, dispatcher)
    }

    /// Assemble around an existing dispatcher (tests inject doubles here)
    pub fn with_dispatcher(
        store: SharedFeedbackStore,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            intake: IntakeMachine::new(store.clone()),
            aggregator: MetricsAggregator::new(store.clone()),
            engine: EscalationEngine::new(store.clone(), dispatcher),
            store,
        }
    }

    pub fn store(&self) -> &SharedFeedbackStore {
        &self.store
    }

    /// Webhook entry point: one inbound message, one well-formed reply.
    ///
    /// A missing sender or body is the only hard rejection, and it happens
    /// before any state mutation. Everything else — including downstream
    /// recompute failures — still produces a conversational reply.
    pub async fn handle_inbound(&self, phone: &str, body: &str) -> PipelineResult<String> {
        let phone = phone.trim();
        let body = body.trim();
        if phone.is_empty() {
            return Err(PipelineError::MissingSender);
        }
        if body.is_empty() {
            return Err(PipelineError::MissingBody);
        }

        let turn = self.intake.handle_message(phone, body);
        if let Some(session) = &turn.completed {
            info!(
                session_id = %session.id,
                office_id = %session.office_id,
                flow = %session.flow,
                "session completed"
            );
            self.refresh_office(&session.office_id).await;
        }
        Ok(turn.reply)
    }

    /// Annotation producer entry point: attach the payload, then refresh.
    pub async fn attach_annotation(
        &self,
        session_id: &str,
        annotation: SessionAnnotation,
    ) -> PipelineResult<()> {
        self.store.set_annotation(session_id, &annotation)?;
        if let Some(session) = self.store.get_session(session_id)? {
            self.refresh_office(&session.office_id).await;
        }
        Ok(())
    }

    /// Recompute metrics and re-evaluate escalation state for one office.
    ///
    /// Failures here are logged, not surfaced: the citizen's data is already
    /// durable and both stages are safe to re-run later.
    async fn refresh_office(&self, office_id: &str) {
        if let Err(e) = self.aggregator.recompute(office_id) {
            warn!(office_id, error = %e, "metrics recompute failed; will catch up on next trigger");
            return;
        }
        if let Err(e) = self.engine.evaluate(office_id).await {
            warn!(office_id, error = %e, "escalation evaluation failed; will catch up on next trigger");
        }
    }

    /// Operator entry point: recompute one office's metrics on demand
    pub fn recompute_metrics(&self, office_id: &str) -> PipelineResult<OfficeMetrics> {
        Ok(self.aggregator.recompute(office_id)?)
    }

    /// Official's corrective-action upload.
    ///
    /// Settable only while the escalation is not resolved; moves an open
    /// escalation to action-uploaded.
    pub fn record_corrective_action(
        &self,
        escalation_id: &str,
        note: impl Into<String>,
        uploaded_by: impl Into<String>,
    ) -> PipelineResult<Escalation> {
        let mut escalation = self
            .store
            .get_escalation(escalation_id)?
            .ok_or_else(|| PipelineError::UnknownEscalation(escalation_id.to_string()))?;

        if escalation.status == EscalationStatus::Resolved {
            return Err(PipelineError::EscalationClosed(escalation_id.to_string()));
        }

        escalation.corrective_action_note = Some(note.into());
        escalation.corrective_action_by = Some(uploaded_by.into());
        escalation.corrective_action_at = Some(Utc::now());
        escalation.status = EscalationStatus::ActionUploaded;
        self.store.update_escalation(&escalation)?;
        info!(escalation_id, "corrective action recorded");
        Ok(escalation)
    }

    /// Scheduled/manual trigger: evaluate every active office
    pub async fn run_sweep(&self) -> PipelineResult<SweepReport> {
        Ok(self.engine.run_sweep().await?)
    }
}
