//! Integration tests for the message bus wired with the standard handlers.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use domain::{
    Aggregate, BatchRef, Command, CommandKind, Event, EventKind, Message, OrderId, OrderLine, Sku,
    Version,
};
use projections::{AllocationRow, AllocationsReadModel, InMemoryAllocationsView};
use service_layer::handlers::SendOutOfStockNotification;
use service_layer::{
    ALLOCATED_CHANNEL, CommandHandler, Dependencies, EventHandler, InMemoryNotifier,
    InMemoryPublisher, MessageBus, Result, ServiceError, bootstrap,
};
use store::{InMemoryStore, InMemoryUnitOfWork, ProductRepository, UnitOfWork, UnitOfWorkFactory};

struct TestHarness {
    bus: MessageBus,
    store: InMemoryStore,
    notifier: InMemoryNotifier,
    publisher: InMemoryPublisher,
    view: InMemoryAllocationsView,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_store(InMemoryStore::new())
    }

    fn with_store(store: InMemoryStore) -> Self {
        let factory: Arc<dyn UnitOfWorkFactory> = Arc::new(store.clone());
        Self::with_factory(store, factory)
    }

    fn with_factory(store: InMemoryStore, factory: Arc<dyn UnitOfWorkFactory>) -> Self {
        let notifier = InMemoryNotifier::new();
        let publisher = InMemoryPublisher::new();
        let view = InMemoryAllocationsView::new();

        let deps = Dependencies::new(factory, Arc::new(view.clone()))
            .with_notifier(Arc::new(notifier.clone()))
            .with_publisher(Arc::new(publisher.clone()));

        Self {
            bus: bootstrap(deps),
            store,
            notifier,
            publisher,
            view,
        }
    }

    async fn add_batch(&self, reference: &str, sku: &str, qty: u32, today: bool) {
        let eta = today.then(|| Utc::now().date_naive());
        self.bus
            .handle_command(Command::create_batch(reference, sku, qty, eta))
            .await
            .unwrap();
    }

    async fn available(&self, sku: &str, reference: &str) -> i64 {
        self.store
            .product(&Sku::new(sku))
            .await
            .unwrap()
            .batch(&BatchRef::new(reference))
            .unwrap()
            .available_quantity()
    }
}

mod add_batch {
    use super::*;

    #[tokio::test]
    async fn for_new_product() {
        let h = TestHarness::new();

        h.add_batch("b1", "CRUNCHY-ARMCHAIR", 100, false).await;

        assert!(h.store.product(&Sku::new("CRUNCHY-ARMCHAIR")).await.is_some());
        assert_eq!(h.store.commit_count(), 1);
    }

    #[tokio::test]
    async fn for_existing_product() {
        let h = TestHarness::new();

        h.add_batch("b1", "GARISH-RUG", 100, false).await;
        h.add_batch("b2", "GARISH-RUG", 99, false).await;

        let product = h.store.product(&Sku::new("GARISH-RUG")).await.unwrap();
        let references: Vec<_> = product.batches().iter().map(|b| b.reference().as_str()).collect();
        assert!(references.contains(&"b2"));
        assert_eq!(h.store.product_count().await, 1);
    }
}

mod allocate {
    use super::*;

    #[tokio::test]
    async fn errors_for_invalid_sku() {
        let h = TestHarness::new();
        h.add_batch("b1", "AREALSKU", 100, false).await;

        let err = h
            .bus
            .handle_command(Command::allocate("o1", "NONEXISTENTSKU", 10))
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::InvalidSku(ref sku) if sku.as_str() == "NONEXISTENTSKU"));
    }

    #[tokio::test]
    async fn commits() {
        let h = TestHarness::new();
        h.add_batch("b1", "OMINOUS-MIRROR", 100, false).await;

        h.bus
            .handle_command(Command::allocate("o1", "OMINOUS-MIRROR", 10))
            .await
            .unwrap();

        assert_eq!(h.store.commit_count(), 2);
        assert_eq!(h.available("OMINOUS-MIRROR", "b1").await, 90);
        let product = h.store.product(&Sku::new("OMINOUS-MIRROR")).await.unwrap();
        assert_eq!(product.version(), Version::new(1));
    }

    #[tokio::test]
    async fn sends_email_on_out_of_stock_error() {
        let h = TestHarness::new();
        h.add_batch("b1", "POPULAR-CURTAINS", 9, false).await;

        h.bus
            .handle_command(Command::allocate("o1", "POPULAR-CURTAINS", 10))
            .await
            .unwrap();

        assert_eq!(
            h.notifier.sent_to("stock@made.com").await,
            vec!["Out of stock for POPULAR-CURTAINS"]
        );
        assert_eq!(h.available("POPULAR-CURTAINS", "b1").await, 9);
    }

    #[tokio::test]
    async fn publishes_allocated_event() {
        let h = TestHarness::new();
        h.add_batch("b1", "LAMP", 10, false).await;

        h.bus
            .handle_command(Command::allocate("o1", "LAMP", 3))
            .await
            .unwrap();

        let published = h.publisher.published().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].channel, ALLOCATED_CHANNEL);
        assert_eq!(
            published[0].payload,
            serde_json::json!({"orderid": "o1", "sku": "LAMP", "qty": 3, "batchref": "b1"})
        );
    }

    #[tokio::test]
    async fn updates_read_model() {
        let h = TestHarness::new();
        h.add_batch("b1", "LAMP", 10, false).await;

        h.bus
            .handle_command(Command::allocate("o1", "LAMP", 3))
            .await
            .unwrap();

        let rows = h.view.allocations_for(&OrderId::new("o1")).await.unwrap();
        assert_eq!(rows, vec![AllocationRow::new("LAMP", "b1")]);
    }

    #[tokio::test]
    async fn losing_a_concurrent_race_is_a_conflict() {
        let store = InMemoryStore::new();
        let setup = TestHarness::with_store(store.clone());
        setup.add_batch("b1", "LAMP", 100, false).await;

        let mut rival = store.unit_of_work();
        rival
            .products()
            .get(&Sku::new("LAMP"))
            .await
            .unwrap()
            .unwrap()
            .allocate(OrderLine::new("orderA", "LAMP", 10));

        let racing = RacingStore {
            inner: store.clone(),
            rival: Mutex::new(Some(rival)),
        };
        let h = TestHarness::with_factory(store.clone(), Arc::new(racing));

        let err = h
            .bus
            .handle_command(Command::allocate("orderB", "LAMP", 10))
            .await
            .unwrap_err();

        assert!(err.is_conflict());
        let product = store.product(&Sku::new("LAMP")).await.unwrap();
        assert_eq!(product.version(), Version::new(1));
        let orders: Vec<_> = product.batches()[0]
            .allocations()
            .map(|line| line.orderid.as_str().to_string())
            .collect();
        assert_eq!(orders, vec!["orderA"]);
    }
}

mod change_batch_quantity {
    use super::*;

    #[tokio::test]
    async fn changes_available_quantity() {
        let h = TestHarness::new();
        h.add_batch("batch1", "ADORABLE-SETTEE", 100, false).await;
        assert_eq!(h.available("ADORABLE-SETTEE", "batch1").await, 100);

        h.bus
            .handle_command(Command::change_batch_quantity("batch1", 50))
            .await
            .unwrap();

        assert_eq!(h.available("ADORABLE-SETTEE", "batch1").await, 50);
    }

    #[tokio::test]
    async fn reallocates_if_necessary() {
        let h = TestHarness::new();
        h.add_batch("batch1", "INDIFFERENT-TABLE", 50, false).await;
        h.add_batch("batch2", "INDIFFERENT-TABLE", 50, true).await;
        h.bus
            .handle_command(Command::allocate("order1", "INDIFFERENT-TABLE", 20))
            .await
            .unwrap();
        h.bus
            .handle_command(Command::allocate("order2", "INDIFFERENT-TABLE", 20))
            .await
            .unwrap();
        assert_eq!(h.available("INDIFFERENT-TABLE", "batch1").await, 10);
        assert_eq!(h.available("INDIFFERENT-TABLE", "batch2").await, 50);

        h.bus
            .handle_command(Command::change_batch_quantity("batch1", 25))
            .await
            .unwrap();

        assert_eq!(h.available("INDIFFERENT-TABLE", "batch1").await, 5);
        assert_eq!(h.available("INDIFFERENT-TABLE", "batch2").await, 30);
    }

    #[tokio::test]
    async fn shrinking_below_two_lines_moves_both() {
        let h = TestHarness::new();
        h.add_batch("b1", "TALL-LAMP", 50, false).await;
        h.add_batch("b2", "TALL-LAMP", 100, true).await;
        for orderid in ["o1", "o2"] {
            h.bus
                .handle_command(Command::allocate(orderid, "TALL-LAMP", 20))
                .await
                .unwrap();
        }
        assert_eq!(h.available("TALL-LAMP", "b1").await, 10);

        h.bus
            .handle_command(Command::change_batch_quantity("b1", 5))
            .await
            .unwrap();

        assert_eq!(h.available("TALL-LAMP", "b1").await, 5);
        assert_eq!(h.available("TALL-LAMP", "b2").await, 60);
        for orderid in ["o1", "o2"] {
            assert_eq!(
                h.view.allocations_for(&OrderId::new(orderid)).await.unwrap(),
                vec![AllocationRow::new("TALL-LAMP", "b2")]
            );
        }
    }

    #[tokio::test]
    async fn errors_for_unknown_batch() {
        let h = TestHarness::new();

        let err = h
            .bus
            .handle_command(Command::change_batch_quantity("nope", 5))
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::BatchNotFound(ref r) if r.as_str() == "nope"));
    }

    #[tokio::test]
    async fn read_model_follows_reallocation() {
        let h = TestHarness::new();
        h.add_batch("b1", "SMALL-TABLE", 10, false).await;
        h.add_batch("b2", "SMALL-TABLE", 10, true).await;
        h.bus
            .handle_command(Command::allocate("o1", "SMALL-TABLE", 10))
            .await
            .unwrap();
        assert_eq!(
            h.view.allocations_for(&OrderId::new("o1")).await.unwrap(),
            vec![AllocationRow::new("SMALL-TABLE", "b1")]
        );

        h.bus
            .handle_command(Command::change_batch_quantity("b1", 5))
            .await
            .unwrap();

        assert_eq!(
            h.view.allocations_for(&OrderId::new("o1")).await.unwrap(),
            vec![AllocationRow::new("SMALL-TABLE", "b2")]
        );
    }
}

mod dispatch {
    use super::*;

    type Log = Arc<Mutex<Vec<&'static str>>>;

    /// Records that it ran and returns a fixed set of messages.
    struct Recorder {
        label: &'static str,
        log: Log,
        emits: Vec<Message>,
    }

    impl Recorder {
        fn new(label: &'static str, log: &Log, emits: Vec<Message>) -> Arc<Self> {
            Arc::new(Self {
                label,
                log: log.clone(),
                emits,
            })
        }

        fn record(&self) -> Vec<Message> {
            self.log.lock().unwrap().push(self.label);
            self.emits.clone()
        }
    }

    #[async_trait]
    impl CommandHandler for Recorder {
        fn name(&self) -> &'static str {
            self.label
        }

        async fn handle(&self, _command: Command) -> Result<Vec<Message>> {
            Ok(self.record())
        }
    }

    #[async_trait]
    impl EventHandler for Recorder {
        fn name(&self) -> &'static str {
            self.label
        }

        async fn handle(&self, _event: &Event) -> Result<Vec<Message>> {
            Ok(self.record())
        }
    }

    struct Failing;

    #[async_trait]
    impl CommandHandler for Failing {
        fn name(&self) -> &'static str {
            "Failing"
        }

        async fn handle(&self, command: Command) -> Result<Vec<Message>> {
            match command {
                Command::Allocate(cmd) => Err(ServiceError::InvalidSku(cmd.sku)),
                _ => Ok(Vec::new()),
            }
        }
    }

    #[tokio::test]
    async fn cascades_breadth_first() {
        let log: Log = Arc::default();
        let bus = MessageBus::builder()
            .command(
                CommandKind::CreateBatch,
                Recorder::new(
                    "create",
                    &log,
                    vec![
                        Event::out_of_stock("X").into(),
                        Event::allocated("o1", "X", 1, "b1").into(),
                    ],
                ),
            )
            .event(
                EventKind::OutOfStock,
                Recorder::new(
                    "out_of_stock",
                    &log,
                    vec![Command::change_batch_quantity("b1", 1).into()],
                ),
            )
            .event(EventKind::Allocated, Recorder::new("allocated", &log, vec![]))
            .command(
                CommandKind::ChangeBatchQuantity,
                Recorder::new("change", &log, vec![]),
            )
            .build();

        bus.handle_command(Command::create_batch("b1", "X", 1, None))
            .await
            .unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["create", "out_of_stock", "allocated", "change"]
        );
    }

    #[tokio::test]
    async fn failing_event_handler_does_not_stop_the_others() {
        let log: Log = Arc::default();
        let notifier = InMemoryNotifier::new();
        notifier.set_fail_on_send(true);
        let bus = MessageBus::builder()
            .command(
                CommandKind::Allocate,
                Recorder::new("allocate", &log, vec![Event::out_of_stock("LAMP").into()]),
            )
            .event(
                EventKind::OutOfStock,
                Arc::new(SendOutOfStockNotification::new(
                    Arc::new(notifier.clone()),
                    "stock@made.com",
                )),
            )
            .event(EventKind::OutOfStock, Recorder::new("second", &log, vec![]))
            .build();

        bus.handle_command(Command::allocate("o1", "LAMP", 1))
            .await
            .unwrap();

        assert_eq!(notifier.sent_count().await, 0);
        assert_eq!(*log.lock().unwrap(), vec!["allocate", "second"]);
    }

    #[tokio::test]
    async fn failing_command_stops_dispatch() {
        let log: Log = Arc::default();
        let bus = MessageBus::builder()
            .command(
                CommandKind::CreateBatch,
                Recorder::new(
                    "create",
                    &log,
                    vec![
                        Command::allocate("o1", "LAMP", 1).into(),
                        Event::out_of_stock("LAMP").into(),
                    ],
                ),
            )
            .command(CommandKind::Allocate, Arc::new(Failing))
            .event(EventKind::OutOfStock, Recorder::new("out_of_stock", &log, vec![]))
            .build();

        let err = bus
            .handle_command(Command::create_batch("b1", "LAMP", 1, None))
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::InvalidSku(_)));
        assert_eq!(*log.lock().unwrap(), vec!["create"]);
    }
}

/// Factory whose units of work let a rival unit of work commit first.
struct RacingStore {
    inner: InMemoryStore,
    rival: Mutex<Option<InMemoryUnitOfWork>>,
}

#[async_trait]
impl UnitOfWorkFactory for RacingStore {
    async fn begin(&self) -> store::Result<Box<dyn UnitOfWork>> {
        let rival = self.rival.lock().unwrap().take();
        Ok(Box::new(RacingUnitOfWork {
            inner: self.inner.unit_of_work(),
            rival,
        }))
    }
}

struct RacingUnitOfWork {
    inner: InMemoryUnitOfWork,
    rival: Option<InMemoryUnitOfWork>,
}

#[async_trait]
impl UnitOfWork for RacingUnitOfWork {
    fn products(&mut self) -> &mut dyn ProductRepository {
        self.inner.products()
    }

    async fn commit(&mut self) -> store::Result<Vec<Message>> {
        if let Some(mut rival) = self.rival.take() {
            rival.commit().await?;
        }
        self.inner.commit().await
    }

    async fn rollback(&mut self) -> store::Result<()> {
        self.inner.rollback().await
    }
}
