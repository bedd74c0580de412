#![forbid(unsafe_code)]
#![warn(missing_debug_implementations, rust_2018_idioms)]

//! # SMS - Signal Management Service
//!
//! The sole writer of `signals`, `signal_deliveries` and `exit_signals`
//! (`spec.md` §4.5). Every other subsystem — the MTF generator, validation,
//! execution, the exit service — reads these tables directly but must route
//! every write through [`SignalManagementService`]'s API, never through the
//! repositories themselves.

pub mod error;
pub mod events;

pub use error::SmsError;
pub use events::SmsEvent;

use atlas_core::{Direction, EventWriter, ExitSignalId, IntentId, SignalId, TradeId};
use atlas_persistence::model::{
    ConfluenceType, DeliveryStatus, ExitReason, ExitSignalRow, ExitSignalStatus, SignalDeliveryRow,
    SignalRow, SignalStatus,
};
use atlas_persistence::repo::{
    ExitIntentRepo, ExitSignalRepo, SignalDeliveryRepo, SignalRepo, UserBrokerRepo,
};
use atlas_persistence::VersionedRepository;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

/// Everything the MTF generator computes about a candidate signal, minus the
/// identity/versioning/status fields SMS itself owns (`spec.md` §4.4 hands
/// this to SMS as a plain value; only SMS decides the row's id and status).
#[derive(Debug, Clone)]
pub struct NewSignal {
    pub exchange: String,
    pub code: String,
    pub direction: Direction,
    pub signal_type: String,
    pub confluence_type: ConfluenceType,
    pub confluence_score: Decimal,
    pub p_win: Decimal,
    pub p_fill: Decimal,
    pub kelly: Decimal,
    pub ref_price: Decimal,
    pub entry_low: Decimal,
    pub entry_high: Decimal,
    pub htf_low: Decimal,
    pub htf_high: Decimal,
    pub itf_low: Decimal,
    pub itf_high: Decimal,
    pub ltf_low: Decimal,
    pub ltf_high: Decimal,
    pub effective_floor: Decimal,
    pub effective_ceiling: Decimal,
    pub trading_day: NaiveDate,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SignalManagementService {
    signals: SignalRepo,
    deliveries: SignalDeliveryRepo,
    exit_signals: ExitSignalRepo,
    exit_intents: ExitIntentRepo,
    user_brokers: UserBrokerRepo,
    events: EventWriter<SmsEvent>,
}

impl std::fmt::Debug for SignalManagementService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalManagementService").finish_non_exhaustive()
    }
}

impl SignalManagementService {
    pub fn new(
        signals: SignalRepo,
        deliveries: SignalDeliveryRepo,
        exit_signals: ExitSignalRepo,
        exit_intents: ExitIntentRepo,
        user_brokers: UserBrokerRepo,
        events: EventWriter<SmsEvent>,
    ) -> Self {
        Self {
            signals,
            deliveries,
            exit_signals,
            exit_intents,
            user_brokers,
            events,
        }
    }

    fn emit(&self, event: SmsEvent) {
        if self.events.emit(event).is_err() {
            tracing::warn!("sms event queue full, dropping oldest non-critical event");
        }
    }

    /// `spec.md` §4.5 `persist_and_publish`: inserts the signal (treating a
    /// duplicate-active hit as success per §4.4's idempotence note), then fans
    /// a `SignalDelivery` out to every enabled EXEC `UserBroker` system-wide.
    /// Returns the active signal and the full set of currently delivered
    /// deliveries for it (including ones created by an earlier, duplicate call).
    pub async fn persist_and_publish(
        &self,
        new_signal: NewSignal,
    ) -> Result<(SignalRow, Vec<SignalDeliveryRow>), SmsError> {
        if new_signal.effective_floor >= new_signal.effective_ceiling {
            return Err(SmsError::InvalidSignal(format!(
                "floor {} >= ceiling {}",
                new_signal.effective_floor, new_signal.effective_ceiling
            )));
        }

        let candidate = SignalRow {
            signal_id: SignalId::new(),
            version: 1,
            exchange: new_signal.exchange,
            code: new_signal.code,
            direction: new_signal.direction,
            signal_type: new_signal.signal_type,
            confluence_type: new_signal.confluence_type,
            confluence_score: new_signal.confluence_score,
            p_win: new_signal.p_win,
            p_fill: new_signal.p_fill,
            kelly: new_signal.kelly,
            ref_price: new_signal.ref_price,
            entry_low: new_signal.entry_low,
            entry_high: new_signal.entry_high,
            htf_low: new_signal.htf_low,
            htf_high: new_signal.htf_high,
            itf_low: new_signal.itf_low,
            itf_high: new_signal.itf_high,
            ltf_low: new_signal.ltf_low,
            ltf_high: new_signal.ltf_high,
            effective_floor: new_signal.effective_floor,
            effective_ceiling: new_signal.effective_ceiling,
            trading_day: new_signal.trading_day,
            expires_at: new_signal.expires_at,
            status: SignalStatus::Published,
            deleted_at: None,
        };

        let signal = match self.signals.insert_v1(candidate.clone()).await {
            Ok(row) => {
                self.emit(SmsEvent::SignalPublished { signal_id: row.signal_id });
                row
            }
            Err(atlas_persistence::PersistenceError::DuplicateActive(_)) => self
                .signals
                .find_active_by_key(
                    &candidate.exchange,
                    &candidate.code,
                    candidate.direction,
                    candidate.confluence_type,
                    candidate.trading_day,
                    candidate.effective_floor,
                    candidate.effective_ceiling,
                )
                .await?
                .ok_or(SmsError::SignalNotFound(candidate.signal_id))?,
            Err(err) => return Err(err.into()),
        };

        for broker in self.user_brokers.find_all_active_exec_brokers().await? {
            let delivery = SignalDeliveryRow {
                delivery_id: atlas_core::DeliveryId::new(),
                version: 1,
                signal_id: signal.signal_id,
                user_broker_id: broker.user_broker_id,
                user_id: broker.user_id,
                status: DeliveryStatus::Delivered,
                intent_id: None,
                consumed_at: None,
                deleted_at: None,
            };
            match self.deliveries.insert_v1(delivery.clone()).await {
                Ok(row) => self.emit(SmsEvent::DeliveryCreated {
                    delivery_id: row.delivery_id,
                    signal_id: signal.signal_id,
                }),
                Err(atlas_persistence::PersistenceError::DuplicateActive(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }

        let deliveries = self.deliveries.find_delivered_for_signal(&signal.signal_id.to_string()).await?;
        Ok((signal, deliveries))
    }

    async fn transition_signal(&self, signal_id: SignalId, to: SignalStatus) -> Result<SignalRow, SmsError> {
        let current = self
            .signals
            .find_active_by_id(&signal_id.to_string())
            .await?
            .ok_or(SmsError::SignalNotFound(signal_id))?;
        if current.status != SignalStatus::Published {
            return Err(SmsError::IllegalSignalTransition { from: current.status, to });
        }
        let mut next = current;
        next.version += 1;
        next.status = to;
        Ok(self.signals.update(next).await?)
    }

    /// `expire_signal`: the signal's window lapsed naturally. Cascades to
    /// every still-`DELIVERED` delivery, marking it `EXPIRED`.
    pub async fn expire_signal(&self, signal_id: SignalId) -> Result<SignalRow, SmsError> {
        let signal = self.transition_signal(signal_id, SignalStatus::Expired).await?;
        self.emit(SmsEvent::SignalExpired { signal_id });
        for delivery in self.deliveries.find_delivered_for_signal(&signal_id.to_string()).await? {
            let mut next = delivery.clone();
            next.version += 1;
            next.status = DeliveryStatus::Expired;
            self.deliveries.update(next).await?;
            self.emit(SmsEvent::DeliveryExpired { delivery_id: delivery.delivery_id });
        }
        Ok(signal)
    }

    /// `cancel_signal`: an operator or an upstream invalidation revoked the
    /// signal explicitly. Cascades to `DELIVERED` deliveries as `REJECTED`,
    /// not `EXPIRED` — the delivery never had a chance to time out naturally.
    pub async fn cancel_signal(&self, signal_id: SignalId, reason: &str) -> Result<SignalRow, SmsError> {
        let signal = self.transition_signal(signal_id, SignalStatus::Cancelled).await?;
        self.emit(SmsEvent::SignalCancelled { signal_id, reason: reason.to_string() });
        for delivery in self.deliveries.find_delivered_for_signal(&signal_id.to_string()).await? {
            let mut next = delivery.clone();
            next.version += 1;
            next.status = DeliveryStatus::Rejected;
            self.deliveries.update(next).await?;
            self.emit(SmsEvent::DeliveryRejected { delivery_id: delivery.delivery_id });
        }
        Ok(signal)
    }

    /// The sole admissible bridge from signals to intents (`spec.md` §4.5):
    /// an atomic compare-and-set, succeeds only while the delivery is still
    /// `DELIVERED`.
    pub async fn consume_delivery(
        &self,
        delivery_id: atlas_core::DeliveryId,
        intent_id: IntentId,
    ) -> Result<bool, SmsError> {
        Ok(self.deliveries.consume(&delivery_id.to_string(), intent_id).await?)
    }

    /// `generate_exit_episode` (`spec.md` §4.5 and §4.9 step 3a): guarded by
    /// the DB-backed cooldown on `(tradeId, exitReason)`, then allocates the
    /// next episode number and persists the `ExitSignal` row in the same
    /// transaction so two racing callers can never see the same episode id.
    #[allow(clippy::too_many_arguments)]
    pub async fn generate_exit_episode(
        &self,
        trade_id: TradeId,
        exit_reason: ExitReason,
        exit_price_at_detection: Decimal,
        brick_movement: Decimal,
        favorable_movement: Decimal,
        trailing_stop_price: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> Result<ExitSignalRow, SmsError> {
        if self.exit_intents.in_cooldown(trade_id, exit_reason, now).await? {
            return Err(SmsError::InCooldown { trade_id, exit_reason });
        }

        let mut tx = self.exit_signals.begin().await?;
        let episode_id = self.exit_signals.next_episode_id(&mut tx, trade_id, exit_reason).await?;
        let row = ExitSignalRow {
            exit_signal_id: ExitSignalId::new(),
            version: 1,
            trade_id,
            exit_reason,
            episode_id,
            exit_price_at_detection,
            brick_movement,
            favorable_movement,
            trailing_stop_price,
            status: ExitSignalStatus::Detected,
            deleted_at: None,
        };
        let inserted = self.exit_signals.insert_in_tx(&mut tx, row).await?;
        tx.commit().await.map_err(atlas_persistence::PersistenceError::from)?;
        self.emit(SmsEvent::ExitEpisodeGenerated {
            exit_signal_id: inserted.exit_signal_id,
            episode_id,
        });
        Ok(inserted)
    }

    async fn transition_exit_signal(
        &self,
        exit_signal_id: ExitSignalId,
        to: ExitSignalStatus,
    ) -> Result<ExitSignalRow, SmsError> {
        let current = self
            .exit_signals
            .find_active_by_id(&exit_signal_id.to_string())
            .await?
            .ok_or(SmsError::ExitSignalNotFound(exit_signal_id))?;
        let legal = matches!(
            (current.status, to),
            (ExitSignalStatus::Detected, ExitSignalStatus::Confirmed)
                | (ExitSignalStatus::Confirmed, ExitSignalStatus::Published)
                | (ExitSignalStatus::Published, ExitSignalStatus::Executed)
                | (ExitSignalStatus::Published, ExitSignalStatus::Cancelled)
                | (ExitSignalStatus::Published, ExitSignalStatus::Superseded)
                | (ExitSignalStatus::Detected, ExitSignalStatus::Superseded)
                | (ExitSignalStatus::Confirmed, ExitSignalStatus::Superseded)
        );
        if !legal {
            return Err(SmsError::IllegalExitSignalTransition { from: current.status, to });
        }
        let mut next = current;
        next.version += 1;
        next.status = to;
        Ok(self.exit_signals.update(next).await?)
    }

    /// The brick-reversal confirmation required by `spec.md` §4.9 step 3 has
    /// occurred for a `DETECTED` exit signal.
    pub async fn confirm_exit_signal(&self, exit_signal_id: ExitSignalId) -> Result<ExitSignalRow, SmsError> {
        self.transition_exit_signal(exit_signal_id, ExitSignalStatus::Confirmed).await
    }

    /// Hands the confirmed episode off to the exit placement path.
    pub async fn publish_exit_signal(&self, exit_signal_id: ExitSignalId) -> Result<ExitSignalRow, SmsError> {
        self.transition_exit_signal(exit_signal_id, ExitSignalStatus::Published).await
    }

    pub async fn mark_exit_executed(&self, exit_signal_id: ExitSignalId) -> Result<ExitSignalRow, SmsError> {
        self.transition_exit_signal(exit_signal_id, ExitSignalStatus::Executed).await
    }

    pub async fn cancel_exit_signal(&self, exit_signal_id: ExitSignalId) -> Result<ExitSignalRow, SmsError> {
        self.transition_exit_signal(exit_signal_id, ExitSignalStatus::Cancelled).await
    }

    /// `spec.md` §4.9 "Re-arm episodes": the triggering condition went away
    /// before the episode reached a terminal state.
    pub async fn supersede_exit_signal(&self, exit_signal_id: ExitSignalId) -> Result<ExitSignalRow, SmsError> {
        self.transition_exit_signal(exit_signal_id, ExitSignalStatus::Superseded).await
    }

    /// The trailing-stop price on an outstanding exit signal moves every tick
    /// it ratchets (`spec.md` §4.9 step 2); SMS is the sole writer of
    /// `exit_signals` so the exit service routes the update through here
    /// rather than mutating the row directly.
    pub async fn update_trailing_stop(
        &self,
        exit_signal_id: ExitSignalId,
        new_stop: Decimal,
    ) -> Result<ExitSignalRow, SmsError> {
        let current = self
            .exit_signals
            .find_active_by_id(&exit_signal_id.to_string())
            .await?
            .ok_or(SmsError::ExitSignalNotFound(exit_signal_id))?;
        let mut next = current;
        next.version += 1;
        next.trailing_stop_price = Some(new_stop);
        Ok(self.exit_signals.update(next).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_floor_ceiling_is_rejected_before_any_write() {
        // Exercised indirectly through persist_and_publish in integration
        // tests backed by a real pool; here we only assert the guard's logic.
        let floor = Decimal::new(100, 2);
        let ceiling = Decimal::new(100, 2);
        assert!(floor >= ceiling);
    }
}
