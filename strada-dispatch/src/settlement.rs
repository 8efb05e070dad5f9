use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use strada_core::events::{publish, NotificationSink, RideEvent};
use strada_core::payment::{Payment, PaymentProcessor, PaymentStatus, ProcessorStatus};
use strada_core::ride::Ride;
use strada_core::{BoxError, DispatchError, DispatchResult};
use strada_shared::clock::Clock;

/// Drives payment intent creation and confirmation against the external
/// processor. Exactly one payment per ride: settling twice returns the
/// existing record.
///
/// The map lock is only ever held to look up or insert a ride's slot; the
/// processor calls run under the slot's own lock, so settlements for
/// unrelated rides never contend.
pub struct PaymentOrchestrator {
    processor: Arc<dyn PaymentProcessor>,
    notifier: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    payments: Mutex<HashMap<Uuid, Arc<Mutex<Option<Payment>>>>>,
}

impl PaymentOrchestrator {
    pub fn new(
        processor: Arc<dyn PaymentProcessor>,
        notifier: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            processor,
            notifier,
            clock,
            payments: Mutex::new(HashMap::new()),
        }
    }

    async fn slot(&self, ride_id: Uuid) -> Arc<Mutex<Option<Payment>>> {
        self.payments
            .lock()
            .await
            .entry(ride_id)
            .or_default()
            .clone()
    }

    /// Create the ride's payment, idempotent on the ride id. A second settle
    /// racing the first waits on the ride's slot and returns the same record.
    /// A processor error leaves the slot empty, so the ride can be settled
    /// again.
    pub async fn settle(&self, ride: &Ride, amount_cents: i64) -> DispatchResult<Payment> {
        let slot = self.slot(ride.id).await;
        let mut slot = slot.lock().await;
        if let Some(existing) = slot.as_ref() {
            return Ok(existing.clone());
        }

        let intent_id = self
            .processor
            .create_intent(ride.id, amount_cents, &ride.currency)
            .await
            .map_err(|err| DispatchError::Processor(err.to_string()))?;

        let payment = Payment::new(
            ride.id,
            amount_cents,
            &ride.currency,
            intent_id,
            self.clock.now(),
        );
        *slot = Some(payment.clone());
        drop(slot);

        info!(ride_id = %ride.id, amount_cents, "payment created");
        publish(
            self.notifier.as_ref(),
            RideEvent::PaymentSettled {
                ride_id: ride.id,
                payment_id: payment.id,
                status: payment.status,
            },
        )
        .await;
        Ok(payment)
    }

    /// Apply the processor's current status to a pending payment. A payment
    /// already in a terminal status is returned unchanged; a processor still
    /// reporting PENDING surfaces `PaymentSettlementPending`. FAILED is
    /// recorded and reported, never retried here, and never rolls back the
    /// ride's lifecycle state.
    pub async fn confirm(&self, ride_id: Uuid) -> DispatchResult<Payment> {
        let slot = {
            let payments = self.payments.lock().await;
            payments.get(&ride_id).cloned()
        };
        let slot = slot.ok_or(DispatchError::PaymentNotFound(ride_id))?;
        let mut slot = slot.lock().await;
        let payment = slot
            .as_mut()
            .ok_or(DispatchError::PaymentNotFound(ride_id))?;

        if payment.status.is_terminal() {
            return Ok(payment.clone());
        }

        let status = self
            .processor
            .status(&payment.intent_id)
            .await
            .map_err(|err| DispatchError::Processor(err.to_string()))?;

        match status {
            ProcessorStatus::Pending => {
                return Err(DispatchError::PaymentSettlementPending(
                    payment.intent_id.clone(),
                ))
            }
            ProcessorStatus::Paid => {
                payment.status = PaymentStatus::Paid;
                payment.updated_at = self.clock.now();
                info!(ride_id = %ride_id, "payment confirmed");
            }
            ProcessorStatus::Failed => {
                payment.status = PaymentStatus::Failed;
                payment.failure_reason = Some("processor reported failure".to_string());
                payment.updated_at = self.clock.now();
                warn!(ride_id = %ride_id, "payment failed");
            }
        }

        let snapshot = payment.clone();
        drop(slot);

        publish(
            self.notifier.as_ref(),
            RideEvent::PaymentSettled {
                ride_id,
                payment_id: snapshot.id,
                status: snapshot.status,
            },
        )
        .await;
        Ok(snapshot)
    }

    /// The payment recorded for a ride, if any.
    pub async fn record(&self, ride_id: Uuid) -> Option<Payment> {
        let slot = {
            let payments = self.payments.lock().await;
            payments.get(&ride_id).cloned()
        }?;
        let slot = slot.lock().await;
        slot.clone()
    }
}

/// Processor double with a settable outcome, for tests and local runs.
pub struct MockProcessor {
    outcome: std::sync::Mutex<ProcessorStatus>,
}

impl MockProcessor {
    pub fn new() -> Self {
        Self {
            outcome: std::sync::Mutex::new(ProcessorStatus::Pending),
        }
    }

    pub fn set_outcome(&self, status: ProcessorStatus) {
        *self.outcome.lock().expect("outcome poisoned") = status;
    }
}

impl Default for MockProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PaymentProcessor for MockProcessor {
    async fn create_intent(
        &self,
        ride_id: Uuid,
        _amount_cents: i64,
        _currency: &str,
    ) -> Result<String, BoxError> {
        Ok(format!("mock_pi_{}", ride_id.simple()))
    }

    async fn status(&self, _intent_id: &str) -> Result<ProcessorStatus, BoxError> {
        Ok(*self.outcome.lock().expect("outcome poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use strada_core::events::NoopNotifier;
    use strada_core::ride::{RideRequest, RideType};
    use strada_shared::clock::ManualClock;
    use strada_shared::geo::Coordinates;

    fn test_ride() -> Ride {
        Ride::new(
            RideRequest {
                passenger_id: Uuid::new_v4(),
                origin: Coordinates::new(0.0, 0.0),
                destination: Coordinates::new(1.0, 1.0),
                origin_address: None,
                destination_address: None,
                ride_type: RideType::Standard,
                currency: "EUR".to_string(),
                female_driver_only: false,
                special_requirements: None,
                baggage_count: 0,
            },
            1000,
            900,
            5.0,
            Utc::now(),
        )
    }

    fn orchestrator() -> (PaymentOrchestrator, Arc<MockProcessor>) {
        let processor = Arc::new(MockProcessor::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
        ));
        (
            PaymentOrchestrator::new(processor.clone(), Arc::new(NoopNotifier), clock),
            processor,
        )
    }

    struct CountingProcessor {
        intents_created: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl PaymentProcessor for CountingProcessor {
        async fn create_intent(
            &self,
            ride_id: Uuid,
            _amount_cents: i64,
            _currency: &str,
        ) -> Result<String, BoxError> {
            self.intents_created
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            Ok(format!("pi_{}", ride_id.simple()))
        }

        async fn status(&self, _intent_id: &str) -> Result<ProcessorStatus, BoxError> {
            Ok(ProcessorStatus::Pending)
        }
    }

    /// Processor that only returns once two intents are in flight at the
    /// same time. Settlements for unrelated rides must reach it
    /// concurrently; if they serialized through a common lock this would
    /// never complete.
    struct RendezvousProcessor {
        barrier: tokio::sync::Barrier,
    }

    #[async_trait::async_trait]
    impl PaymentProcessor for RendezvousProcessor {
        async fn create_intent(
            &self,
            ride_id: Uuid,
            _amount_cents: i64,
            _currency: &str,
        ) -> Result<String, BoxError> {
            self.barrier.wait().await;
            Ok(format!("pi_{}", ride_id.simple()))
        }

        async fn status(&self, _intent_id: &str) -> Result<ProcessorStatus, BoxError> {
            Ok(ProcessorStatus::Pending)
        }
    }

    #[tokio::test]
    async fn settle_is_idempotent_per_ride() {
        let (orchestrator, _) = orchestrator();
        let ride = test_ride();

        let first = orchestrator.settle(&ride, 1450).await.unwrap();
        let second = orchestrator.settle(&ride, 9999).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.amount_cents, 1450);
        assert_eq!(first.intent_id, second.intent_id);
    }

    #[tokio::test]
    async fn concurrent_settles_create_exactly_one_intent() {
        let processor = Arc::new(CountingProcessor {
            intents_created: std::sync::atomic::AtomicUsize::new(0),
        });
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
        ));
        let orchestrator =
            PaymentOrchestrator::new(processor.clone(), Arc::new(NoopNotifier), clock);
        let ride = test_ride();

        let (first, second) = tokio::join!(
            orchestrator.settle(&ride, 1450),
            orchestrator.settle(&ride, 1450),
        );
        let first = first.unwrap();
        let second = second.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.intent_id, second.intent_id);
        assert_eq!(
            processor
                .intents_created
                .load(std::sync::atomic::Ordering::SeqCst),
            1
        );
    }

    #[tokio::test]
    async fn settles_for_unrelated_rides_do_not_contend() {
        let processor = Arc::new(RendezvousProcessor {
            barrier: tokio::sync::Barrier::new(2),
        });
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
        ));
        let orchestrator = PaymentOrchestrator::new(processor, Arc::new(NoopNotifier), clock);
        let ride_a = test_ride();
        let ride_b = test_ride();

        let settled = tokio::time::timeout(std::time::Duration::from_secs(1), async {
            tokio::join!(
                orchestrator.settle(&ride_a, 1450),
                orchestrator.settle(&ride_b, 900),
            )
        })
        .await
        .expect("settlements for different rides blocked each other");

        assert!(settled.0.is_ok());
        assert!(settled.1.is_ok());
    }

    #[tokio::test]
    async fn confirm_pending_surfaces_settlement_pending() {
        let (orchestrator, processor) = orchestrator();
        let ride = test_ride();
        orchestrator.settle(&ride, 1450).await.unwrap();

        processor.set_outcome(ProcessorStatus::Pending);
        let err = orchestrator.confirm(ride.id).await.unwrap_err();
        assert!(matches!(err, DispatchError::PaymentSettlementPending(_)));
    }

    #[tokio::test]
    async fn confirm_applies_terminal_status_once() {
        let (orchestrator, processor) = orchestrator();
        let ride = test_ride();
        orchestrator.settle(&ride, 1450).await.unwrap();

        processor.set_outcome(ProcessorStatus::Paid);
        let paid = orchestrator.confirm(ride.id).await.unwrap();
        assert_eq!(paid.status, PaymentStatus::Paid);

        // A later FAILED report cannot undo a terminal status.
        processor.set_outcome(ProcessorStatus::Failed);
        let still_paid = orchestrator.confirm(ride.id).await.unwrap();
        assert_eq!(still_paid.status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn failed_payment_records_reason() {
        let (orchestrator, processor) = orchestrator();
        let ride = test_ride();
        orchestrator.settle(&ride, 1450).await.unwrap();

        processor.set_outcome(ProcessorStatus::Failed);
        let failed = orchestrator.confirm(ride.id).await.unwrap();
        assert_eq!(failed.status, PaymentStatus::Failed);
        assert!(failed.failure_reason.is_some());
    }

    #[tokio::test]
    async fn confirm_without_settle_is_not_found() {
        let (orchestrator, _) = orchestrator();
        let err = orchestrator.confirm(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, DispatchError::PaymentNotFound(_)));
    }
}
