use crate::cache::{CacheRecompute, CacheTarget, DerivedCacheQueue};
use crate::sinks::{
    ActivityEvent, ActivityKind, ActivitySink, BidEventsSink, WebsocketEvent, WebsocketEventKind,
    WebsocketRouter,
};
use crate::storage::{OrderEventWriter, OrderReader};
use async_trait::async_trait;
use indexer_core::types::{
    BidEventEntry, Order, OrderEvent, OrderSide, OrderType, OrderUpdateInfo, TokenSetId, Trigger,
    TriggerKind,
};
use indexer_core::Result;
use indexer_queue::JobHandler;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Consumer of the order-updates-by-id queue
pub struct OrderUpdatesByIdHandler {
    orders: Arc<dyn OrderReader>,
    ledger: Arc<dyn OrderEventWriter>,
    caches: Arc<dyn DerivedCacheQueue>,
    bid_events: Arc<dyn BidEventsSink>,
    activities: Arc<dyn ActivitySink>,
    websocket: Arc<dyn WebsocketRouter>,
    single_token_top_bids: bool,
}

impl OrderUpdatesByIdHandler {
    pub fn new(
        orders: Arc<dyn OrderReader>,
        ledger: Arc<dyn OrderEventWriter>,
        caches: Arc<dyn DerivedCacheQueue>,
        bid_events: Arc<dyn BidEventsSink>,
        activities: Arc<dyn ActivitySink>,
        websocket: Arc<dyn WebsocketRouter>,
    ) -> Self {
        Self {
            orders,
            ledger,
            caches,
            bid_events,
            activities,
            websocket,
            single_token_top_bids: false,
        }
    }

    /// Also recompute top bids of single-token sets. Off by default; that
    /// cache is maintained by a separate path.
    pub fn with_single_token_top_bids(mut self, enabled: bool) -> Self {
        self.single_token_top_bids = enabled;
        self
    }

    async fn recompute_caches(
        &self,
        context: &str,
        trigger: &Trigger,
        side: OrderSide,
        token_set_id: &str,
    ) -> Result<()> {
        let request = |target: CacheTarget| CacheRecompute {
            context: context.to_string(),
            trigger: trigger.clone(),
            target,
        };

        match side {
            OrderSide::Buy => {
                if TokenSetId::new(token_set_id).is_single_token() && !self.single_token_top_bids {
                    return Ok(());
                }
                self.caches
                    .recompute(request(CacheTarget::TopBid {
                        token_set_id: token_set_id.to_string(),
                    }))
                    .await
            }
            OrderSide::Sell => {
                tokio::try_join!(
                    self.caches.recompute(request(CacheTarget::FloorAsk {
                        token_set_id: token_set_id.to_string(),
                    })),
                    self.caches.recompute(request(CacheTarget::NormalizedFloorAsk {
                        token_set_id: token_set_id.to_string(),
                    })),
                )?;
                Ok(())
            }
        }
    }

    async fn record_sell(&self, context: &str, trigger: &Trigger, order: &Order) -> Result<()> {
        let event = OrderEvent::snapshot(context, order, trigger);
        if self.ledger.append(&event).await? {
            indexer_metrics::counters::order_events_written(event.status.as_str());
        } else {
            debug!(order_id = %order.id, context = %context, "Ledger row already written");
        }

        let token_set = TokenSetId::new(&order.token_set_id);
        let token_id = token_set.single_token().map(|(_, token_id)| token_id.to_string());
        self.caches
            .recompute(CacheRecompute {
                context: context.to_string(),
                trigger: trigger.clone(),
                target: CacheTarget::NftBalanceFloorAsk {
                    contract: token_set.contract().map(str::to_string),
                    token_id,
                    owner: order.maker.clone(),
                },
            })
            .await
    }

    async fn emit_activity(&self, context: &str, trigger: &Trigger, order: &Order) -> Result<()> {
        let kind = match trigger.kind {
            TriggerKind::Cancel => ActivityKind::cancelled(order.side),
            TriggerKind::NewOrder | TriggerKind::Reprice if order.is_active() => {
                ActivityKind::created(order.side)
            }
            _ => return Ok(()),
        };

        self.activities
            .add_activities(vec![ActivityEvent {
                kind,
                order_id: order.id.clone(),
                context: context.to_string(),
                trigger: trigger.clone(),
            }])
            .await
    }

    async fn notify_websocket(&self, trigger: &Trigger, order: &Order) {
        let event = WebsocketEvent {
            kind: WebsocketEventKind::for_side(order.side),
            order_id: order.id.clone(),
            trigger: trigger.kind,
        };
        if let Err(e) = self.websocket.route(event).await {
            warn!(order_id = %order.id, error = %e, "Failed to route websocket event");
        }
    }

    fn record_latency(&self, order: &Order) {
        let Some(order_type) = OrderType::classify(order.side, &order.token_set_id) else {
            return;
        };

        let started_at = order
            .originated_at
            .unwrap_or_else(|| order.valid_from.saturating_mul(1000));
        let latency_ms = order.created_at.saturating_sub(started_at);
        if latency_ms < 0 {
            debug!(order_id = %order.id, latency_ms = latency_ms, "Skipping negative order latency");
            return;
        }

        let source = order.source.as_deref().unwrap_or("unknown");
        indexer_metrics::histograms::order_latency(
            source,
            order_type.as_str(),
            Duration::from_millis(latency_ms as u64),
        );
        debug!(
            order_id = %order.id,
            source = %source,
            order_type = order_type.as_str(),
            latency_ms = latency_ms,
            "Order indexing latency"
        );
    }
}

#[async_trait]
impl JobHandler<OrderUpdateInfo> for OrderUpdatesByIdHandler {
    async fn handle(&self, info: OrderUpdateInfo) -> Result<()> {
        let OrderUpdateInfo {
            context,
            trigger,
            id,
            token_set_id,
            side,
        } = info;

        let order = match id.as_deref() {
            Some(id) => {
                let order = self.orders.order_by_id(id).await?;
                if order.is_none() {
                    debug!(order_id = %id, context = %context, "Order not found");
                }
                order
            }
            None => None,
        };

        let target = match (&order, &id) {
            (Some(order), _) => Some((order.side, order.token_set_id.clone())),
            (None, Some(_)) => None,
            (None, None) => side.zip(token_set_id),
        };

        if let Some((side, token_set_id)) = &target {
            self.recompute_caches(&context, &trigger, *side, token_set_id)
                .await?;
        }

        let Some(order) = order else {
            return Ok(());
        };

        match order.side {
            OrderSide::Sell => self.record_sell(&context, &trigger, &order).await?,
            OrderSide::Buy => {
                self.bid_events
                    .add_bid_events(vec![BidEventEntry {
                        trigger: trigger.clone(),
                        order: order.clone(),
                    }])
                    .await?
            }
        }

        self.emit_activity(&context, &trigger, &order).await?;
        self.notify_websocket(&trigger, &order).await;

        if trigger.kind == TriggerKind::NewOrder {
            self.record_latency(&order);
        }

        debug!(
            order_id = %order.id,
            context = %context,
            trigger = %trigger.kind,
            "Order update processed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DERIVED_CACHE_QUEUE;
    use crate::order_updates::{OrderUpdatesQueue, ORDER_UPDATES_QUEUE};
    use indexer_core::types::{ApprovalStatus, FillabilityStatus, OrderEventStatus};
    use indexer_core::IndexerError;
    use indexer_queue::{
        JobQueue, MemoryQueueBackend, QueueBackend, QueueCounts, QueueWorker, RetryPolicy,
        WorkerConfig,
    };
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Fakes {
        orders: Mutex<HashMap<String, Order>>,
        ledger: Mutex<Vec<OrderEvent>>,
        bid_events: Mutex<Vec<BidEventEntry>>,
        activities: Mutex<Vec<ActivityEvent>>,
        websocket: Mutex<Vec<WebsocketEvent>>,
        fail_reads: Mutex<bool>,
    }

    #[async_trait]
    impl OrderReader for Fakes {
        async fn order_by_id(&self, id: &str) -> Result<Option<Order>> {
            if *self.fail_reads.lock() {
                return Err(IndexerError::Storage("connection reset".into()));
            }
            Ok(self.orders.lock().get(id).cloned())
        }
    }

    #[async_trait]
    impl OrderEventWriter for Fakes {
        async fn append(&self, event: &OrderEvent) -> Result<bool> {
            // Mirrors the unique (context, order_id) index
            let mut ledger = self.ledger.lock();
            if ledger
                .iter()
                .any(|row| row.context == event.context && row.order_id == event.order_id)
            {
                return Ok(false);
            }
            ledger.push(event.clone());
            Ok(true)
        }
    }

    #[async_trait]
    impl BidEventsSink for Fakes {
        async fn add_bid_events(&self, entries: Vec<BidEventEntry>) -> Result<()> {
            self.bid_events.lock().extend(entries);
            Ok(())
        }
    }

    #[async_trait]
    impl ActivitySink for Fakes {
        async fn add_activities(&self, events: Vec<ActivityEvent>) -> Result<()> {
            self.activities.lock().extend(events);
            Ok(())
        }
    }

    #[async_trait]
    impl WebsocketRouter for Fakes {
        async fn route(&self, event: WebsocketEvent) -> Result<()> {
            self.websocket.lock().push(event);
            Ok(())
        }
    }

    /// Cache queue whose first balance recompute fails
    struct FlakyBalanceCache {
        inner: JobQueue<CacheRecompute>,
        failed: Mutex<bool>,
    }

    #[async_trait]
    impl DerivedCacheQueue for FlakyBalanceCache {
        async fn recompute(&self, request: CacheRecompute) -> Result<()> {
            if matches!(request.target, CacheTarget::NftBalanceFloorAsk { .. })
                && !std::mem::replace(&mut *self.failed.lock(), true)
            {
                return Err(IndexerError::CoordinationUnavailable("connection reset".into()));
            }
            self.inner.recompute(request).await
        }
    }

    struct Harness {
        fakes: Arc<Fakes>,
        caches: Arc<MemoryQueueBackend>,
        handler: Arc<OrderUpdatesByIdHandler>,
    }

    impl Harness {
        fn new() -> Self {
            Self::build(false)
        }

        fn with_flaky_balance_cache() -> Self {
            Self::build(true)
        }

        fn build(flaky_balance_cache: bool) -> Self {
            let fakes = Arc::new(Fakes::default());
            let caches = Arc::new(MemoryQueueBackend::new(DERIVED_CACHE_QUEUE));
            let cache_queue: JobQueue<CacheRecompute> =
                JobQueue::new(caches.clone() as Arc<dyn QueueBackend>);
            let cache_queue: Arc<dyn DerivedCacheQueue> = if flaky_balance_cache {
                Arc::new(FlakyBalanceCache {
                    inner: cache_queue,
                    failed: Mutex::new(false),
                })
            } else {
                Arc::new(cache_queue)
            };
            let handler = OrderUpdatesByIdHandler::new(
                fakes.clone(),
                fakes.clone(),
                cache_queue,
                fakes.clone(),
                fakes.clone(),
                fakes.clone(),
            );
            Self {
                fakes,
                caches,
                handler: Arc::new(handler),
            }
        }

        fn insert(&self, order: Order) {
            self.fakes.orders.lock().insert(order.id.clone(), order);
        }

        async fn cache_targets(&self) -> Vec<CacheTarget> {
            let mut targets: Vec<CacheTarget> = self
                .caches
                .pending_payloads()
                .await
                .iter()
                .map(|payload| JobQueue::<CacheRecompute>::decode(payload).unwrap().target)
                .collect();
            targets.sort_by_key(|target| target.name());
            targets
        }
    }

    fn order(id: &str, side: OrderSide, token_set_id: &str) -> Order {
        Order {
            id: id.to_string(),
            kind: "seaport-v1.5".to_string(),
            side,
            token_set_id: token_set_id.to_string(),
            source: Some("opensea.io".to_string()),
            valid_from: 1_700_000_000,
            valid_to: None,
            quantity_remaining: "1".to_string(),
            nonce: Some("0".to_string()),
            maker: "0xmaker".to_string(),
            price: Some("1000000000000000000".to_string()),
            value: Some("1000000000000000000".to_string()),
            normalized_value: None,
            currency: Some("0x0000000000000000000000000000000000000000".to_string()),
            fillability_status: FillabilityStatus::Fillable,
            approval_status: ApprovalStatus::Approved,
            raw_data: serde_json::json!({}),
            originated_at: Some(1_700_000_000_500),
            created_at: 1_700_000_001_000,
        }
    }

    #[tokio::test]
    async fn test_new_sell_order_end_to_end() {
        let harness = Harness::new();
        harness.insert(order("0x01", OrderSide::Sell, "token:123"));

        let info = OrderUpdateInfo::by_id("new-order-0x01-1", Trigger::new(TriggerKind::NewOrder), "0x01");
        harness.handler.handle(info).await.unwrap();

        let ledger = harness.fakes.ledger.lock().clone();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].status, OrderEventStatus::Active);
        assert_eq!(ledger[0].order_id, "0x01");

        assert_eq!(
            harness.cache_targets().await,
            vec![
                CacheTarget::FloorAsk {
                    token_set_id: "token:123".into()
                },
                CacheTarget::NftBalanceFloorAsk {
                    contract: Some("123".into()),
                    token_id: None,
                    owner: "0xmaker".into(),
                },
                CacheTarget::NormalizedFloorAsk {
                    token_set_id: "token:123".into()
                },
            ]
        );

        let activities = harness.fakes.activities.lock().clone();
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].kind, ActivityKind::NewSellOrder);

        let websocket = harness.fakes.websocket.lock().clone();
        assert_eq!(
            websocket,
            vec![WebsocketEvent {
                kind: WebsocketEventKind::SellOrder,
                order_id: "0x01".into(),
                trigger: TriggerKind::NewOrder,
            }]
        );
        assert!(harness.fakes.bid_events.lock().is_empty());
    }

    #[tokio::test]
    async fn test_no_balance_sell_order_is_recorded_inactive() {
        let harness = Harness::new();
        let mut sell = order("0x01", OrderSide::Sell, "token:0xabc:1");
        sell.fillability_status = FillabilityStatus::NoBalance;
        harness.insert(sell);

        let info = OrderUpdateInfo::by_id("ctx", Trigger::new(TriggerKind::BalanceChange), "0x01");
        harness.handler.handle(info).await.unwrap();

        let ledger = harness.fakes.ledger.lock().clone();
        assert_eq!(ledger[0].status, OrderEventStatus::Inactive);
        assert_eq!(ledger[0].contract.as_deref(), Some("0xabc"));
        assert_eq!(ledger[0].token_id.as_deref(), Some("1"));
        assert!(harness.fakes.activities.lock().is_empty());
        assert_eq!(harness.fakes.websocket.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_always_emits_cancellation() {
        let harness = Harness::new();
        let mut bid = order("0x02", OrderSide::Buy, "contract:0xabc");
        bid.fillability_status = FillabilityStatus::Cancelled;
        harness.insert(bid);

        let info = OrderUpdateInfo::by_id("ctx", Trigger::new(TriggerKind::Cancel), "0x02");
        harness.handler.handle(info).await.unwrap();

        let activities = harness.fakes.activities.lock().clone();
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].kind, ActivityKind::BuyOrderCancelled);
    }

    #[tokio::test]
    async fn test_reprice_of_cancelled_order_emits_no_activity() {
        let harness = Harness::new();
        let mut sell = order("0x01", OrderSide::Sell, "token:0xabc:1");
        sell.fillability_status = FillabilityStatus::Cancelled;
        harness.insert(sell);

        let info = OrderUpdateInfo::by_id("ctx", Trigger::new(TriggerKind::Reprice), "0x01");
        harness.handler.handle(info).await.unwrap();

        assert!(harness.fakes.activities.lock().is_empty());
        assert_eq!(harness.fakes.ledger.lock()[0].status, OrderEventStatus::Cancelled);
        assert_eq!(harness.fakes.websocket.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_buy_order_goes_to_bid_events_not_ledger() {
        let harness = Harness::new();
        harness.insert(order("0x02", OrderSide::Buy, "contract:0xabc"));

        let info = OrderUpdateInfo::by_id("ctx", Trigger::new(TriggerKind::NewOrder), "0x02");
        harness.handler.handle(info).await.unwrap();

        assert!(harness.fakes.ledger.lock().is_empty());
        assert_eq!(harness.fakes.bid_events.lock().len(), 1);
        assert_eq!(
            harness.cache_targets().await,
            vec![CacheTarget::TopBid {
                token_set_id: "contract:0xabc".into()
            }]
        );
        assert_eq!(harness.fakes.activities.lock()[0].kind, ActivityKind::NewBuyOrder);
    }

    #[tokio::test]
    async fn test_single_token_bid_skips_top_bid() {
        let harness = Harness::new();
        harness.insert(order("0x02", OrderSide::Buy, "token:0xabc:1"));

        let info = OrderUpdateInfo::by_id("ctx", Trigger::new(TriggerKind::NewOrder), "0x02");
        harness.handler.handle(info).await.unwrap();

        assert!(harness.cache_targets().await.is_empty());
        assert_eq!(harness.fakes.bid_events.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_order_is_a_no_op() {
        let harness = Harness::new();

        let info = OrderUpdateInfo::by_id("ctx", Trigger::new(TriggerKind::Revalidate), "0xgone");
        harness.handler.handle(info).await.unwrap();

        assert!(harness.cache_targets().await.is_empty());
        assert!(harness.fakes.ledger.lock().is_empty());
        assert!(harness.fakes.websocket.lock().is_empty());
    }

    #[tokio::test]
    async fn test_token_set_trigger_recomputes_without_order() {
        let harness = Harness::new();

        let info = OrderUpdateInfo::by_token_set(
            "ctx",
            Trigger::new(TriggerKind::Revalidate),
            "contract:0xabc",
            OrderSide::Sell,
        );
        harness.handler.handle(info).await.unwrap();

        assert_eq!(harness.cache_targets().await.len(), 2);
        assert!(harness.fakes.ledger.lock().is_empty());
        assert!(harness.fakes.websocket.lock().is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_fails_the_job() {
        let harness = Harness::new();
        *harness.fakes.fail_reads.lock() = true;

        let info = OrderUpdateInfo::by_id("ctx", Trigger::new(TriggerKind::NewOrder), "0x01");
        let err = harness.handler.handle(info).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_same_context_executes_once() {
        let harness = Harness::new();
        harness.insert(order("0x01", OrderSide::Sell, "token:0xabc:1"));

        let backend = Arc::new(MemoryQueueBackend::new(ORDER_UPDATES_QUEUE));
        let queue = JobQueue::new(backend as Arc<dyn QueueBackend>);
        let updates = OrderUpdatesQueue::new(queue.clone());
        let worker = QueueWorker::new(queue, harness.handler.clone(), WorkerConfig::default());

        let trigger = Trigger::new(TriggerKind::NewOrder);
        for _ in 0..5 {
            updates
                .add_to_queue(vec![OrderUpdateInfo::by_id("new-order-0x01-1", trigger.clone(), "0x01")])
                .await
                .unwrap();
            worker.process_available().await.unwrap();
        }

        assert_eq!(harness.fakes.ledger.lock().len(), 1);
        assert_eq!(harness.fakes.activities.lock().len(), 1);
        assert_eq!(harness.cache_targets().await.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_late_failure_writes_one_ledger_row() {
        let harness = Harness::with_flaky_balance_cache();
        harness.insert(order("0x01", OrderSide::Sell, "token:0xabc:1"));

        let backend = Arc::new(MemoryQueueBackend::new(ORDER_UPDATES_QUEUE));
        let queue: JobQueue<OrderUpdateInfo> =
            JobQueue::new(backend.clone() as Arc<dyn QueueBackend>);
        let config = WorkerConfig {
            retry: RetryPolicy::new(3, Duration::from_secs(1)),
            ..WorkerConfig::default()
        };
        let worker = QueueWorker::new(queue.clone(), harness.handler.clone(), config);

        let info = OrderUpdateInfo::by_id("new-order-0x01-1", Trigger::new(TriggerKind::NewOrder), "0x01");
        queue.add(&info.context, &info).await.unwrap();

        // The ledger row lands, then the balance recompute fails the job
        assert_eq!(worker.process_available().await.unwrap(), 1);
        assert_eq!(harness.fakes.ledger.lock().len(), 1);
        assert!(harness.fakes.activities.lock().is_empty());
        assert_eq!(backend.counts().await.unwrap().pending, 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(worker.process_available().await.unwrap(), 1);

        let ledger = harness.fakes.ledger.lock().clone();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].context, "new-order-0x01-1");
        assert_eq!(harness.fakes.activities.lock().len(), 1);
        assert_eq!(harness.cache_targets().await.len(), 3);
        assert_eq!(backend.counts().await.unwrap(), QueueCounts::default());
    }
}
