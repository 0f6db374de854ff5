use crate::config::PollerConfig;
use crate::orders::gateway::OrderGateway;
use crate::orders::types::Order;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// How a confirmation poll ended. Produced once per poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The order API reported the order as validated.
    Validated(Order),
    /// Every tick of the budget elapsed without validation.
    TimedOut { ticks: u32, failed_ticks: u32 },
}

impl PollOutcome {
    pub fn is_validated(&self) -> bool {
        matches!(self, PollOutcome::Validated(_))
    }
}

// ---------------------------------------------------------------------------
// Poller
// ---------------------------------------------------------------------------

/// Polls the order API until the order is validated or the tick budget ends.
pub struct ValidationPoller {
    gateway: Arc<dyn OrderGateway>,
    order_id: Uuid,
    config: PollerConfig,
}

impl ValidationPoller {
    pub fn new(gateway: Arc<dyn OrderGateway>, order_id: Uuid, config: PollerConfig) -> Self {
        Self {
            gateway,
            order_id,
            config,
        }
    }

    /// Runs ticks `1..=max_ticks`, one `get` per tick. The first tick fires
    /// one interval after the call, like a browser `setInterval`. A `get`
    /// still pending when its interval ends counts as a failed tick, so the
    /// whole poll ends within one interval of the configured budget.
    pub async fn run(self) -> PollOutcome {
        let period = self.config.interval;
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            order_id = %self.order_id,
            interval_ms = period.as_millis() as u64,
            max_ticks = self.config.max_ticks,
            budget_ms = self.config.budget().as_millis() as u64,
            "waiting for order validation"
        );

        let mut failed_ticks = 0u32;
        for tick in 1..=self.config.max_ticks {
            ticker.tick().await;

            match time::timeout(period, self.gateway.get(self.order_id)).await {
                Ok(Ok(order)) if order.is_validated() => {
                    info!(order_id = %self.order_id, tick, "order validated");
                    return PollOutcome::Validated(order);
                }
                Ok(Ok(order)) => {
                    debug!(
                        order_id = %self.order_id,
                        tick,
                        state = ?order.state,
                        "order not validated yet"
                    );
                }
                Ok(Err(e)) => {
                    failed_ticks += 1;
                    warn!(
                        order_id = %self.order_id,
                        tick,
                        failed_ticks,
                        error = %e,
                        "order validation check failed"
                    );
                }
                Err(_) => {
                    failed_ticks += 1;
                    warn!(
                        order_id = %self.order_id,
                        tick,
                        failed_ticks,
                        "order validation check outlived its tick"
                    );
                }
            }
        }

        warn!(
            order_id = %self.order_id,
            ticks = self.config.max_ticks,
            failed_ticks,
            "order validation timed out"
        );
        PollOutcome::TimedOut {
            ticks: self.config.max_ticks,
            failed_ticks,
        }
    }

    /// Spawns the poll and hands the outcome to `on_outcome`. Nothing is
    /// delivered once the returned handle is cancelled or dropped.
    pub fn spawn<F>(self, on_outcome: F) -> PollHandle
    where
        F: FnOnce(PollOutcome) + Send + 'static,
    {
        let order_id = self.order_id;
        let task = tokio::spawn(async move {
            let outcome = self.run().await;
            on_outcome(outcome);
        });
        PollHandle {
            order_id,
            task: Some(task),
        }
    }
}

/// Owner of a running poll.
pub struct PollHandle {
    order_id: Uuid,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    pub fn order_id(&self) -> Uuid {
        self.order_id
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            debug!(order_id = %self.order_id, "validation poll cancelled");
            task.abort();
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::error::{OrderError, OrderResult};
    use crate::orders::types::{OrderCreateInput, OrderState};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::sync::oneshot;

    /// Reports `validated` from the given get onwards; fails every get listed in `failing`.
    struct ScriptedGateway {
        gets: AtomicU32,
        validated_at: Option<u32>,
        failing: Vec<u32>,
        get_delay: Duration,
    }

    impl ScriptedGateway {
        fn new(validated_at: Option<u32>) -> Self {
            Self {
                gets: AtomicU32::new(0),
                validated_at,
                failing: Vec::new(),
                get_delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl OrderGateway for ScriptedGateway {
        async fn create(&self, _input: OrderCreateInput) -> OrderResult<Order> {
            unreachable!("poller never creates orders")
        }

        async fn get(&self, id: Uuid) -> OrderResult<Order> {
            let n = self.gets.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.get_delay.is_zero() {
                time::sleep(self.get_delay).await;
            }
            if self.failing.contains(&n) {
                return Err(OrderError::NetworkError {
                    message: "connection reset".to_string(),
                });
            }
            let validated = self.validated_at.map_or(false, |at| n >= at);
            Ok(Order {
                id,
                state: if validated {
                    OrderState::Validated
                } else {
                    OrderState::Pending
                },
                course: None,
                product: None,
                main_invoice: None,
                payment_info: None,
                created_on: None,
            })
        }

        async fn abort(&self, _id: Uuid, _payment_id: &str) -> OrderResult<()> {
            Ok(())
        }

        async fn list(&self) -> OrderResult<Vec<Order>> {
            Ok(Vec::new())
        }
    }

    fn config(max_ticks: u32) -> PollerConfig {
        PollerConfig {
            interval: Duration::from_secs(1),
            max_ticks,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn validated_on_third_tick() {
        let gateway = Arc::new(ScriptedGateway::new(Some(3)));
        let started = Instant::now();

        let outcome = ValidationPoller::new(gateway.clone(), Uuid::new_v4(), config(30))
            .run()
            .await;

        assert!(outcome.is_validated());
        assert_eq!(gateway.gets.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_after_full_budget() {
        let gateway = Arc::new(ScriptedGateway::new(None));
        let started = Instant::now();

        let outcome = ValidationPoller::new(gateway.clone(), Uuid::new_v4(), config(30))
            .run()
            .await;

        assert_eq!(
            outcome,
            PollOutcome::TimedOut {
                ticks: 30,
                failed_ticks: 0
            }
        );
        assert_eq!(gateway.gets.load(Ordering::SeqCst), 30);
        assert_eq!(started.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_ticks_are_counted_and_polling_continues() {
        let mut scripted = ScriptedGateway::new(Some(4));
        scripted.failing = vec![1, 2];
        let gateway = Arc::new(scripted);

        let outcome = ValidationPoller::new(gateway.clone(), Uuid::new_v4(), config(5))
            .run()
            .await;
        assert!(outcome.is_validated());

        let mut scripted = ScriptedGateway::new(None);
        scripted.failing = vec![1, 3];
        let outcome = ValidationPoller::new(Arc::new(scripted), Uuid::new_v4(), config(3))
            .run()
            .await;
        assert_eq!(
            outcome,
            PollOutcome::TimedOut {
                ticks: 3,
                failed_ticks: 2
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_gets_do_not_stretch_the_budget() {
        let mut scripted = ScriptedGateway::new(Some(1));
        scripted.get_delay = Duration::from_secs(15);
        let gateway = Arc::new(scripted);
        let config = PollerConfig::default();
        let started = Instant::now();

        let outcome = ValidationPoller::new(gateway.clone(), Uuid::new_v4(), config.clone())
            .run()
            .await;

        assert_eq!(
            outcome,
            PollOutcome::TimedOut {
                ticks: 30,
                failed_ticks: 30
            }
        );
        assert_eq!(gateway.gets.load(Ordering::SeqCst), 30);
        assert!(started.elapsed() <= config.budget() + config.interval);
    }

    #[tokio::test(start_paused = true)]
    async fn get_answering_within_its_tick_still_counts() {
        let mut scripted = ScriptedGateway::new(Some(2));
        scripted.get_delay = Duration::from_millis(600);
        let gateway = Arc::new(scripted);

        let outcome = ValidationPoller::new(gateway.clone(), Uuid::new_v4(), config(30))
            .run()
            .await;

        assert!(outcome.is_validated());
        assert_eq!(gateway.gets.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_poll_reports_nothing() {
        let gateway = Arc::new(ScriptedGateway::new(Some(5)));
        let (tx, mut rx) = oneshot::channel();

        let mut handle = ValidationPoller::new(gateway.clone(), Uuid::new_v4(), config(30))
            .spawn(move |outcome| {
                let _ = tx.send(outcome);
            });
        time::sleep(Duration::from_millis(2500)).await;
        handle.cancel();
        time::sleep(Duration::from_secs(10)).await;

        assert!(handle.is_finished());
        assert_eq!(gateway.gets.load(Ordering::SeqCst), 2);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_poll_delivers_outcome_once() {
        let gateway = Arc::new(ScriptedGateway::new(Some(1)));
        let (tx, rx) = oneshot::channel();
        let order_id = Uuid::new_v4();

        let handle = ValidationPoller::new(gateway, order_id, config(30)).spawn(move |outcome| {
            let _ = tx.send(outcome);
        });
        assert_eq!(handle.order_id(), order_id);

        match rx.await.expect("outcome should be delivered") {
            PollOutcome::Validated(order) => assert_eq!(order.id, order_id),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
