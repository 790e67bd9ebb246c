//! # Till Engine
//!
//! Wires one terminal together: local database, remote services, catalog
//! cache, the cart with its persister, and both flows.
//!
//! ## Startup Sequence
//! 1. Validate configuration
//! 2. Open the local cache database (migrations run on open)
//! 3. Build the HTTP backend for every remote port
//! 4. Spawn the cart persister
//! 5. Load the terminal's cart (remote, else local)

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use till_db::{Database, DbConfig};

use crate::cart_store::{CartSource, CartStore};
use crate::catalog::CatalogCache;
use crate::checkout::CheckoutFinalizer;
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::http::HttpBackend;
use crate::persistence::{CartPersister, PersisterConfig};
use crate::services::{LocalCartCache, ReconciliationJournal, Services};
use crate::void_flow::VoidAuthorizer;

pub struct TillEngine {
    config: EngineConfig,
    db: Database,
    catalog: Arc<CatalogCache>,
    store: Arc<CartStore>,
    authorizer: VoidAuthorizer,
    finalizer: CheckoutFinalizer,
    persister_task: JoinHandle<()>,
    loaded_from: CartSource,
}

impl TillEngine {
    /// Starts the engine against the configured HTTP services.
    pub async fn start(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;

        let path = config.persistence.resolved_cache_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::new(DbConfig::new(path)).await?;
        let services = Services::http(HttpBackend::new(&config.services)?);

        Self::with_services(config, db, services).await
    }

    /// Starts the engine with explicit collaborators.
    pub async fn with_services(
        config: EngineConfig,
        db: Database,
        services: Services,
    ) -> EngineResult<Self> {
        config.validate()?;
        let terminal = config.terminal_id().to_string();

        let local: Arc<dyn LocalCartCache> = Arc::new(db.clone());
        let journal: Arc<dyn ReconciliationJournal> = Arc::new(db.clone());
        let catalog = Arc::new(CatalogCache::new(
            services.products.clone(),
            services.discounts.clone(),
        ));

        let (persister, persister_task) = CartPersister::spawn(
            terminal.clone(),
            services.carts.clone(),
            local.clone(),
            PersisterConfig::from(&config.persistence),
        );

        let store = Arc::new(
            CartStore::new(terminal.clone(), catalog.clone())
                .with_stacking(config.stacking_policy())
                .with_persister(persister),
        );
        let loaded_from = store.load(services.carts.as_ref(), local.as_ref()).await;

        let authorizer = VoidAuthorizer::new(
            store.clone(),
            services.pins.clone(),
            services.voids.clone(),
            services.transactions.clone(),
            config.services.pin_timeout(),
            config.services.request_timeout(),
        );
        let finalizer = CheckoutFinalizer::new(
            store.clone(),
            catalog.clone(),
            services.transactions.clone(),
            services.stock.clone(),
            journal,
            config.services.transaction_timeout(),
            config.services.stock_timeout(),
        );

        info!(
            terminal = %terminal,
            name = %config.terminal.name,
            ?loaded_from,
            "Till engine started"
        );

        Ok(TillEngine {
            config,
            db,
            catalog,
            store,
            authorizer,
            finalizer,
            persister_task,
            loaded_from,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<CartStore> {
        &self.store
    }

    pub fn catalog(&self) -> &Arc<CatalogCache> {
        &self.catalog
    }

    pub fn authorizer(&self) -> &VoidAuthorizer {
        &self.authorizer
    }

    pub fn finalizer(&self) -> &CheckoutFinalizer {
        &self.finalizer
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Where the cart came from at startup.
    pub fn loaded_from(&self) -> CartSource {
        self.loaded_from
    }

    /// Flushes the pending cart, stops the persister and closes the database.
    pub async fn shutdown(self) {
        info!(terminal = %self.config.terminal_id(), "Shutting down till engine");

        self.store.shutdown_persistence();
        if let Err(err) = self.persister_task.await {
            warn!(error = %err, "Cart persister ended abnormally");
        }
        self.db.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        cashier, jeans, line, manager, mug, tee, FakeCartRemote, FakeCatalog, FakePins,
        FakeStock, FakeTransactions, FakeVoidLog, MANAGER_PIN,
    };
    use crate::void_flow::VoidRequest;
    use till_core::adjustment::ConfirmOutcome;
    use till_core::{LineKey, PaymentMeta, PaymentMethod, VoidReason};

    fn config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.terminal.id = "till-1".to_string();
        config
    }

    fn services(remote: Arc<FakeCartRemote>) -> Services {
        let catalog = Arc::new(FakeCatalog::new(vec![tee(), jeans(), mug()], vec![]));
        Services {
            products: catalog.clone(),
            discounts: catalog,
            carts: remote,
            transactions: Arc::new(FakeTransactions::new()),
            stock: Arc::new(FakeStock::new()),
            pins: Arc::new(FakePins::accepting(MANAGER_PIN)),
            voids: Arc::new(FakeVoidLog::new()),
        }
    }

    #[tokio::test]
    async fn test_start_loads_remote_cart() {
        let remote = Arc::new(FakeCartRemote::new());
        remote.put("till-1", vec![line("M", 2)]);
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let engine = TillEngine::with_services(config(), db, services(remote))
            .await
            .unwrap();

        assert_eq!(engine.loaded_from(), CartSource::Remote);
        assert_eq!(engine.store().items().len(), 1);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_flushes_pending_cart() {
        let remote = Arc::new(FakeCartRemote::new());
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let engine = TillEngine::with_services(config(), db, services(remote.clone()))
            .await
            .unwrap();
        assert_eq!(engine.loaded_from(), CartSource::Empty);

        engine.store().add_product(&mug(), None, 3).unwrap();
        engine.shutdown().await;

        let saves = remote.saves();
        assert_eq!(saves.len(), 1);
        assert_eq!(saves[0][0].product_id, "p-mug");
        assert_eq!(saves[0][0].quantity, 3);
    }

    #[tokio::test]
    async fn test_sale_and_void_end_to_end() {
        let remote = Arc::new(FakeCartRemote::new());
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let engine = TillEngine::with_services(config(), db, services(remote))
            .await
            .unwrap();
        let store = engine.store();
        let key = LineKey::new("p-tee", Some("M"));

        store.add_item(line("M", 4)).unwrap();
        store.propose_quantity(&key, 3).unwrap();
        assert!(matches!(
            store.confirm_adjustment(&key).unwrap(),
            ConfirmOutcome::RequiresAuthorization(_)
        ));
        let outcome = engine
            .authorizer()
            .authorize(&key, VoidRequest::new(VoidReason::DuplicateScan, MANAGER_PIN))
            .await
            .unwrap();
        assert_eq!(outcome.record.approver, manager());
        assert_eq!(store.quantity_of(&key), Some(3));

        let receipt = engine
            .finalizer()
            .finalize(PaymentMeta {
                method: PaymentMethod::Qr,
                performed_by: cashier(),
                reference: Some("QR-123".into()),
            })
            .await
            .unwrap();
        assert!(receipt.reconciliation.is_none());
        assert!(store.items().is_empty());

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_config_refused() {
        let mut config = config();
        config.terminal.id = String::new();
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let result =
            TillEngine::with_services(config, db, services(Arc::new(FakeCartRemote::new()))).await;
        assert!(result.is_err());
    }
}
