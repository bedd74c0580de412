//! Execution Orchestrator (`spec.md` §4.7): polls `trade_intents` for
//! `APPROVED` rows rather than consuming a push channel, so a crashed and
//! restarted orchestrator simply resumes at its next poll — there is no
//! in-flight channel state to lose.

use std::sync::Arc;

use atlas_core::{EventWriter, UserBrokerId};
use atlas_persistence::Repositories;
use atlas_tms::TradeManagementService;
use dashmap::DashMap;

use atlas_broker::BrokerRegistry;
use atlas_integration::RateLimiter;

use crate::error::ExecutionError;
use crate::events::ExecutionEvent;
use crate::order_service::OrderPlacementService;

/// `spec.md` §4.10/§5: max in-flight broker calls per `UserBroker`, shared
/// with the per-broker semaphore shape the reconcilers use.
const MAX_CONCURRENT_PLACEMENTS_PER_BROKER: usize = 4;

/// Upper bound on intents pulled per poll cycle, so one cycle can't starve
/// the rest of the system under a burst of approvals.
const DEFAULT_BATCH_SIZE: i64 = 50;

pub struct ExecutionOrchestrator {
    repos: Repositories,
    order_service: OrderPlacementService,
    limiters: DashMap<UserBrokerId, RateLimiter>,
}

impl std::fmt::Debug for ExecutionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionOrchestrator").finish_non_exhaustive()
    }
}

impl ExecutionOrchestrator {
    pub fn new(repos: Repositories, registry: Arc<BrokerRegistry>, tms: TradeManagementService, events: EventWriter<ExecutionEvent>) -> Self {
        let order_service = OrderPlacementService::new(repos.clone(), registry, tms, events);
        Self { repos, order_service, limiters: DashMap::new() }
    }

    fn limiter_for(&self, user_broker_id: UserBrokerId) -> RateLimiter {
        self.limiters.entry(user_broker_id).or_insert_with(|| RateLimiter::new(MAX_CONCURRENT_PLACEMENTS_PER_BROKER)).clone()
    }

    /// One polling cycle: pulls up to `DEFAULT_BATCH_SIZE` `APPROVED` intents
    /// and attempts to place each. A single intent's failure doesn't abort
    /// the batch — it's logged and the cycle continues, matching the
    /// single-writer-per-row model where each intent's state is independent.
    pub async fn poll_once(&self) -> Result<usize, ExecutionError> {
        let intents = self.repos.trade_intents.find_approved_unplaced(DEFAULT_BATCH_SIZE).await?;
        let mut processed = 0;
        for intent in &intents {
            let limiter = self.limiter_for(intent.user_broker_id);
            match self.order_service.place(intent, &limiter).await {
                Ok(()) => processed += 1,
                Err(err) => {
                    tracing::error!(intent_id = %intent.intent_id, error = %err, "failed to process trade intent");
                }
            }
        }
        Ok(processed)
    }
}
