//! In-memory fakes and fixtures shared by the engine's unit tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use till_core::discount::{DiscountDefinition, DiscountScope, DiscountStatus};
use till_core::{
    Approver, LineItem, Money, Operator, Product, SizeStock, StockDelta, TransactionRecord,
    TransactionRequest, VoidRecord,
};

use crate::cart_store::CartStore;
use crate::catalog::CatalogCache;
use crate::checkout::CheckoutFinalizer;
use crate::error::{ServiceError, ServiceResult};
use crate::services::{
    CartRemoteStore, DiscountCatalog, LocalCartCache, PinVerifier, PinVerdict, ProductCatalog,
    ReconciliationJournal, StockService, TransactionService, VoidLog,
};
use crate::void_flow::VoidAuthorizer;

// =============================================================================
// Fixtures
// =============================================================================

/// Sized product: M = 5 @ 275.50, L = 3 at the product price of 250.00.
pub fn tee() -> Product {
    let mut sizes = BTreeMap::new();
    sizes.insert(
        "M".to_string(),
        SizeStock::new(5, Some(Money::from_cents(27_550))),
    );
    sizes.insert("L".to_string(), SizeStock::new(3, None));
    Product {
        id: "p-tee".to_string(),
        name: "Tee".to_string(),
        sku: Some("TEE-01".to_string()),
        image: None,
        category: Some("Tops".to_string()),
        sizes,
        current_stock: None,
        item_price: Money::from_cents(25_000),
    }
}

/// Sizeless product with product-level stock of 10.
pub fn jeans() -> Product {
    Product {
        id: "p-jeans".to_string(),
        name: "Jeans".to_string(),
        sku: Some("JNS-01".to_string()),
        image: None,
        category: Some("Bottoms".to_string()),
        sizes: BTreeMap::new(),
        current_stock: Some(10),
        item_price: Money::from_cents(120_000),
    }
}

/// Product without any stock information.
pub fn mug() -> Product {
    Product {
        id: "p-mug".to_string(),
        name: "Mug".to_string(),
        sku: None,
        image: None,
        category: Some("Home".to_string()),
        sizes: BTreeMap::new(),
        current_stock: None,
        item_price: Money::from_cents(15_000),
    }
}

/// A tee line in `size`.
pub fn line(size: &str, quantity: i64) -> LineItem {
    LineItem::from_product(&tee(), Some(size), quantity).unwrap()
}

pub fn discount(
    id: &str,
    value: &str,
    scope: DiscountScope,
    category: Option<&str>,
) -> DiscountDefinition {
    DiscountDefinition {
        id: id.to_string(),
        title: format!("Promo {}", id),
        code: None,
        discount_value: value.parse().unwrap(),
        scope,
        category: category.map(str::to_string),
        product_ids: Vec::new(),
        status: DiscountStatus::Active,
    }
}

pub fn cashier() -> Operator {
    Operator {
        id: "u-cashier".to_string(),
        name: "Cashier One".to_string(),
        role: Some("cashier".to_string()),
    }
}

pub fn manager() -> Approver {
    Operator {
        id: "u-manager".to_string(),
        name: "Store Manager".to_string(),
        role: Some("manager".to_string()),
    }
}

fn unreachable() -> ServiceError {
    ServiceError::Unreachable("connection refused".to_string())
}

/// How a fake answers.
#[derive(Debug, Clone)]
pub enum Behavior {
    Succeed,
    Fail(ServiceError),
    /// Never answers; only a timeout gets the caller out.
    Hang,
    /// Answers normally after a wait.
    Delay(Duration),
}

impl Behavior {
    async fn apply(&self) -> ServiceResult<()> {
        match self {
            Behavior::Succeed => Ok(()),
            Behavior::Fail(err) => Err(err.clone()),
            Behavior::Hang => std::future::pending().await,
            Behavior::Delay(wait) => {
                tokio::time::sleep(*wait).await;
                Ok(())
            }
        }
    }
}

// =============================================================================
// Catalog
// =============================================================================

pub struct FakeCatalog {
    products: Vec<Product>,
    discounts: Vec<DiscountDefinition>,
    product_fetches: Mutex<usize>,
}

impl FakeCatalog {
    pub fn new(products: Vec<Product>, discounts: Vec<DiscountDefinition>) -> Self {
        FakeCatalog {
            products,
            discounts,
            product_fetches: Mutex::new(0),
        }
    }

    pub fn product_fetches(&self) -> usize {
        *self.product_fetches.lock().unwrap()
    }
}

#[async_trait]
impl ProductCatalog for FakeCatalog {
    async fn fetch_products(&self) -> ServiceResult<Vec<Product>> {
        *self.product_fetches.lock().unwrap() += 1;
        Ok(self.products.clone())
    }
}

#[async_trait]
impl DiscountCatalog for FakeCatalog {
    async fn fetch_discounts(&self) -> ServiceResult<Vec<DiscountDefinition>> {
        Ok(self.discounts.clone())
    }
}

// =============================================================================
// Cart Persistence
// =============================================================================

#[derive(Default)]
struct RemoteState {
    carts: HashMap<String, Vec<LineItem>>,
    saves: Vec<Vec<LineItem>>,
    attempts: usize,
    fail_next: u32,
    fail_with: Option<ServiceError>,
}

impl RemoteState {
    fn failure(&mut self) -> Option<ServiceError> {
        if let Some(err) = &self.fail_with {
            return Some(err.clone());
        }
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Some(unreachable());
        }
        None
    }
}

#[derive(Default)]
pub struct FakeCartRemote {
    state: Mutex<RemoteState>,
}

impl FakeCartRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, terminal: &str, items: Vec<LineItem>) {
        self.state
            .lock()
            .unwrap()
            .carts
            .insert(terminal.to_string(), items);
    }

    /// The next `count` calls fail as unreachable.
    pub fn fail_next(&self, count: u32) {
        self.state.lock().unwrap().fail_next = count;
    }

    /// Every call fails with `err`.
    pub fn fail_with(&self, err: ServiceError) {
        self.state.lock().unwrap().fail_with = Some(err);
    }

    /// Successful saves, oldest first.
    pub fn saves(&self) -> Vec<Vec<LineItem>> {
        self.state.lock().unwrap().saves.clone()
    }

    /// Save attempts, failed ones included.
    pub fn attempts(&self) -> usize {
        self.state.lock().unwrap().attempts
    }
}

#[async_trait]
impl CartRemoteStore for FakeCartRemote {
    async fn load_cart(&self, terminal: &str) -> ServiceResult<Vec<LineItem>> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.failure() {
            return Err(err);
        }
        Ok(state.carts.get(terminal).cloned().unwrap_or_default())
    }

    async fn save_cart(&self, terminal: &str, items: &[LineItem]) -> ServiceResult<()> {
        let mut state = self.state.lock().unwrap();
        state.attempts += 1;
        if let Some(err) = state.failure() {
            return Err(err);
        }
        state.carts.insert(terminal.to_string(), items.to_vec());
        state.saves.push(items.to_vec());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeLocalCache {
    carts: Mutex<HashMap<String, Vec<LineItem>>>,
    saves: Mutex<usize>,
}

impl FakeLocalCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, terminal: &str, items: Vec<LineItem>) {
        self.carts
            .lock()
            .unwrap()
            .insert(terminal.to_string(), items);
    }

    pub fn stored(&self, terminal: &str) -> Option<Vec<LineItem>> {
        self.carts.lock().unwrap().get(terminal).cloned()
    }

    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap()
    }
}

#[async_trait]
impl LocalCartCache for FakeLocalCache {
    async fn load_local(&self, terminal: &str) -> ServiceResult<Option<Vec<LineItem>>> {
        Ok(self.stored(terminal))
    }

    async fn save_local(&self, terminal: &str, items: &[LineItem]) -> ServiceResult<()> {
        self.put(terminal, items.to_vec());
        *self.saves.lock().unwrap() += 1;
        Ok(())
    }
}

// =============================================================================
// Sale & Stock
// =============================================================================

pub struct FakeTransactions {
    behavior: Mutex<Behavior>,
    requests: Mutex<Vec<TransactionRequest>>,
}

impl FakeTransactions {
    pub fn new() -> Self {
        FakeTransactions {
            behavior: Mutex::new(Behavior::Succeed),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn set(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    /// Requests that reached the service, recorded or not.
    pub fn requests(&self) -> Vec<TransactionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransactionService for FakeTransactions {
    async fn submit_transaction(
        &self,
        request: &TransactionRequest,
    ) -> ServiceResult<TransactionRecord> {
        let number = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len()
        };
        let behavior = self.behavior.lock().unwrap().clone();
        behavior.apply().await?;

        Ok(TransactionRecord {
            id: format!("tx-{}", number),
            receipt_id: Some(format!("R-{:04}", number)),
            status: request.status,
            total: request.total,
            created_at: None,
        })
    }
}

pub struct FakeStock {
    behavior: Mutex<Behavior>,
    calls: Mutex<Vec<Vec<StockDelta>>>,
}

impl FakeStock {
    pub fn new() -> Self {
        FakeStock {
            behavior: Mutex::new(Behavior::Succeed),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn calls(&self) -> Vec<Vec<StockDelta>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl StockService for FakeStock {
    async fn decrement_stock(&self, deltas: &[StockDelta]) -> ServiceResult<()> {
        self.calls.lock().unwrap().push(deltas.to_vec());
        let behavior = self.behavior.lock().unwrap().clone();
        behavior.apply().await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    pub terminal: String,
    pub transaction_id: String,
    pub deltas: Vec<StockDelta>,
    pub error: String,
}

#[derive(Default)]
pub struct FakeJournal {
    entries: Mutex<Vec<JournalEntry>>,
    failing: Mutex<bool>,
}

impl FakeJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self) {
        *self.failing.lock().unwrap() = true;
    }

    pub fn entries(&self) -> Vec<JournalEntry> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReconciliationJournal for FakeJournal {
    async fn record_discrepancy(
        &self,
        terminal: &str,
        record: &TransactionRecord,
        deltas: &[StockDelta],
        error: &str,
    ) -> ServiceResult<String> {
        if *self.failing.lock().unwrap() {
            return Err(ServiceError::Local("disk full".to_string()));
        }
        let mut entries = self.entries.lock().unwrap();
        entries.push(JournalEntry {
            terminal: terminal.to_string(),
            transaction_id: record.id.clone(),
            deltas: deltas.to_vec(),
            error: error.to_string(),
        });
        Ok(format!("journal-{}", entries.len()))
    }
}

// =============================================================================
// Authorization & Audit
// =============================================================================

pub struct FakePins {
    approvers: HashMap<String, Approver>,
    behavior: Mutex<Behavior>,
    calls: Mutex<Vec<(String, Option<String>)>>,
}

impl FakePins {
    /// Accepts `pin` for [`manager`].
    pub fn accepting(pin: &str) -> Self {
        let mut approvers = HashMap::new();
        approvers.insert(pin.to_string(), manager());
        FakePins {
            approvers,
            behavior: Mutex::new(Behavior::Succeed),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_hint(&self) -> Option<String> {
        self.calls
            .lock()
            .unwrap()
            .last()
            .and_then(|(_, hint)| hint.clone())
    }
}

#[async_trait]
impl PinVerifier for FakePins {
    async fn verify_pin(&self, pin: &str, hint: Option<&str>) -> ServiceResult<PinVerdict> {
        self.calls
            .lock()
            .unwrap()
            .push((pin.to_string(), hint.map(str::to_string)));
        let behavior = self.behavior.lock().unwrap().clone();
        behavior.apply().await?;

        Ok(match self.approvers.get(pin) {
            Some(approver) => PinVerdict::Approved(approver.clone()),
            None => PinVerdict::Rejected,
        })
    }
}

pub struct FakeVoidLog {
    behavior: Mutex<Behavior>,
    records: Mutex<Vec<VoidRecord>>,
}

impl FakeVoidLog {
    pub fn new() -> Self {
        FakeVoidLog {
            behavior: Mutex::new(Behavior::Succeed),
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn set(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    /// Records the log accepted.
    pub fn records(&self) -> Vec<VoidRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl VoidLog for FakeVoidLog {
    async fn submit_void(&self, record: &VoidRecord) -> ServiceResult<()> {
        let behavior = self.behavior.lock().unwrap().clone();
        behavior.apply().await?;
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

// =============================================================================
// Harness
// =============================================================================

pub const MANAGER_PIN: &str = "246810";

/// A store wired to every fake, plus both flows.
pub struct Harness {
    pub catalog: Arc<FakeCatalog>,
    pub cache: Arc<CatalogCache>,
    pub store: Arc<CartStore>,
    pub transactions: Arc<FakeTransactions>,
    pub stock: Arc<FakeStock>,
    pub journal: Arc<FakeJournal>,
    pub pins: Arc<FakePins>,
    pub voids: Arc<FakeVoidLog>,
    pub authorizer: VoidAuthorizer,
    pub finalizer: CheckoutFinalizer,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_catalog(FakeCatalog::new(vec![tee(), jeans(), mug()], vec![]))
    }

    pub fn with_catalog(catalog: FakeCatalog) -> Self {
        let catalog = Arc::new(catalog);
        let cache = Arc::new(CatalogCache::new(catalog.clone(), catalog.clone()));
        let store = Arc::new(CartStore::new("till-1", cache.clone()));
        let transactions = Arc::new(FakeTransactions::new());
        let stock = Arc::new(FakeStock::new());
        let journal = Arc::new(FakeJournal::new());
        let pins = Arc::new(FakePins::accepting(MANAGER_PIN));
        let voids = Arc::new(FakeVoidLog::new());

        let authorizer = VoidAuthorizer::new(
            store.clone(),
            pins.clone(),
            voids.clone(),
            transactions.clone(),
            Duration::from_secs(8),
            Duration::from_secs(10),
        );
        let finalizer = CheckoutFinalizer::new(
            store.clone(),
            cache.clone(),
            transactions.clone(),
            stock.clone(),
            journal.clone(),
            Duration::from_secs(15),
            Duration::from_secs(10),
        );

        Harness {
            catalog,
            cache,
            store,
            transactions,
            stock,
            journal,
            pins,
            voids,
            authorizer,
            finalizer,
        }
    }
}
