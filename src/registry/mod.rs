//! Wallet registry - role-scoped CRUD over the wallet store
//!
//! Each caller-facing operation resolves the caller's role category, then
//! runs its own load-mutate-save cycle against the injected storage port.
//! Overwrites and deletions are two-phase: a request records a pending
//! decision, and a separate resolve call applies or discards it.

pub mod export;
pub mod store;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};

pub use export::{ExportReport, ExportRow, NameResolver};
pub use store::{JsonFileStorage, WalletStorage, WalletStore};

/// Minimum wallet address length (Solana base58 pubkeys)
pub const MIN_ADDRESS_LEN: usize = 32;
/// Maximum wallet address length
pub const MAX_ADDRESS_LEN: usize = 44;

/// Role-derived wallet bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Og,
    Wl,
}

impl Category {
    /// Label shown in user-facing messages and the export
    pub fn label(&self) -> &'static str {
        match self {
            Category::Og => "OG",
            Category::Wl => "WL",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Whoever invoked an operation: platform account id plus role membership
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: u64,
    pub role_ids: Vec<u64>,
    pub is_admin: bool,
}

impl Caller {
    fn key(&self) -> String {
        self.user_id.to_string()
    }
}

/// Configured role ids for the two categories
#[derive(Debug, Clone, Copy)]
pub struct RoleConfig {
    pub og_role_id: u64,
    pub wl_role_id: u64,
}

impl RoleConfig {
    /// Classify a caller into a category. OG takes priority over WL when a
    /// caller holds both roles; a caller with neither classifies as None.
    pub fn classify(&self, caller: &Caller) -> Option<Category> {
        if caller.role_ids.contains(&self.og_role_id) {
            Some(Category::Og)
        } else if caller.role_ids.contains(&self.wl_role_id) {
            Some(Category::Wl)
        } else {
            None
        }
    }
}

/// Outcome of a submit request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// No prior address existed; the new one is stored
    Registered { category: Category },
    /// An address already exists; nothing was written. The caller must
    /// resolve the pending decision to proceed.
    NeedsConfirmation {
        category: Category,
        current: String,
        proposed: String,
    },
}

/// Outcome of resolving a pending submit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitResolution {
    Replaced {
        category: Category,
        previous: String,
        address: String,
    },
    Cancelled,
    /// No pending replacement exists for this caller (already resolved,
    /// or the prompt expired)
    Expired,
}

/// A wallet registered for a caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredWallet {
    pub category: Category,
    pub address: String,
}

/// Outcome of a remove request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// Nothing stored for this caller; not an error
    NotRegistered { category: Category },
    NeedsConfirmation { category: Category, address: String },
}

/// Outcome of resolving a pending remove
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveResolution {
    Removed { category: Category, address: String },
    Cancelled,
    Expired,
}

/// A decision waiting on caller confirmation. At most one per user; a new
/// request replaces any prior pending entry.
#[derive(Debug, Clone)]
enum PendingAction {
    Replace { category: Category, address: String },
    Remove { category: Category },
}

/// The wallet registry
pub struct WalletRegistry {
    storage: Arc<dyn WalletStorage>,
    roles: RoleConfig,
    pending: Mutex<HashMap<u64, PendingAction>>,
}

impl WalletRegistry {
    pub fn new(storage: Arc<dyn WalletStorage>, roles: RoleConfig) -> Self {
        Self {
            storage,
            roles,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Classify a caller without touching the store
    pub fn classify(&self, caller: &Caller) -> Option<Category> {
        self.roles.classify(caller)
    }

    /// Classify a caller, failing with Unauthorized when they hold neither role
    fn require_category(&self, caller: &Caller) -> Result<Category> {
        self.roles.classify(caller).ok_or(Error::Unauthorized)
    }

    /// Begin a submit. Stores immediately when the caller has no address in
    /// their category; otherwise records a pending replacement and returns
    /// the conflicting pair.
    pub async fn request_submit(&self, caller: &Caller, address: &str) -> Result<SubmitOutcome> {
        let category = self.require_category(caller)?;
        let address = validate_address(address)?;

        let mut store = self.storage.load().await;
        let key = caller.key();

        if let Some(current) = store.category(category).get(&key) {
            let current = current.clone();
            let mut pending = self.pending.lock().await;
            pending.insert(
                caller.user_id,
                PendingAction::Replace {
                    category,
                    address: address.clone(),
                },
            );
            debug!(user_id = caller.user_id, %category, "Submit needs confirmation");
            return Ok(SubmitOutcome::NeedsConfirmation {
                category,
                current,
                proposed: address,
            });
        }

        store.category_mut(category).insert(key, address);
        self.storage.save(&store).await?;
        info!(user_id = caller.user_id, %category, "Wallet registered");

        Ok(SubmitOutcome::Registered { category })
    }

    /// Resolve a pending replacement. The pending entry is consumed either
    /// way, so a repeated confirm reports Expired instead of writing twice.
    pub async fn resolve_submit(&self, caller: &Caller, confirmed: bool) -> Result<SubmitResolution> {
        let _ = self.require_category(caller)?;

        let action = {
            let mut pending = self.pending.lock().await;
            match pending.get(&caller.user_id) {
                Some(PendingAction::Replace { .. }) => pending.remove(&caller.user_id),
                _ => None,
            }
        };

        let Some(PendingAction::Replace { category, address }) = action else {
            return Ok(SubmitResolution::Expired);
        };

        if !confirmed {
            debug!(user_id = caller.user_id, %category, "Replacement declined");
            return Ok(SubmitResolution::Cancelled);
        }

        let mut store = self.storage.load().await;
        let previous = store
            .category_mut(category)
            .insert(caller.key(), address.clone())
            .unwrap_or_default();
        self.storage.save(&store).await?;
        info!(user_id = caller.user_id, %category, "Wallet replaced");

        Ok(SubmitResolution::Replaced {
            category,
            previous,
            address,
        })
    }

    /// Look up the caller's registered wallet. None is the normal
    /// "not yet submitted" state.
    pub async fn view(&self, caller: &Caller) -> Result<Option<RegisteredWallet>> {
        let category = self.require_category(caller)?;

        let store = self.storage.load().await;
        Ok(store
            .category(category)
            .get(&caller.key())
            .map(|address| RegisteredWallet {
                category,
                address: address.clone(),
            }))
    }

    /// Begin a remove. Records a pending deletion when an address exists;
    /// mutates nothing either way.
    pub async fn request_remove(&self, caller: &Caller) -> Result<RemoveOutcome> {
        let category = self.require_category(caller)?;

        let store = self.storage.load().await;
        let Some(address) = store.category(category).get(&caller.key()) else {
            return Ok(RemoveOutcome::NotRegistered { category });
        };
        let address = address.clone();

        let mut pending = self.pending.lock().await;
        pending.insert(caller.user_id, PendingAction::Remove { category });
        debug!(user_id = caller.user_id, %category, "Remove needs confirmation");

        Ok(RemoveOutcome::NeedsConfirmation { category, address })
    }

    /// Resolve a pending deletion. Single-shot, like resolve_submit.
    pub async fn resolve_remove(&self, caller: &Caller, confirmed: bool) -> Result<RemoveResolution> {
        let _ = self.require_category(caller)?;

        let action = {
            let mut pending = self.pending.lock().await;
            match pending.get(&caller.user_id) {
                Some(PendingAction::Remove { .. }) => pending.remove(&caller.user_id),
                _ => None,
            }
        };

        let Some(PendingAction::Remove { category }) = action else {
            return Ok(RemoveResolution::Expired);
        };

        if !confirmed {
            debug!(user_id = caller.user_id, %category, "Removal declined");
            return Ok(RemoveResolution::Cancelled);
        }

        let mut store = self.storage.load().await;
        let Some(address) = store.category_mut(category).remove(&caller.key()) else {
            // Entry disappeared between request and confirm (e.g. a racing
            // removal); treat like an expired prompt.
            return Ok(RemoveResolution::Expired);
        };
        self.storage.save(&store).await?;
        info!(user_id = caller.user_id, %category, "Wallet removed");

        Ok(RemoveResolution::Removed { category, address })
    }

    /// Build the export report. Requires administrator authority, which is
    /// distinct from OG/WL classification.
    pub async fn export(&self, caller: &Caller, resolver: &dyn NameResolver) -> Result<ExportReport> {
        if !caller.is_admin {
            return Err(Error::Unauthorized);
        }

        let store = self.storage.load().await;
        let report = export::build_report(&store, resolver).await;
        info!(
            og = report.og_count,
            wl = report.wl_count,
            "Wallet export built"
        );
        Ok(report)
    }
}

/// Trim and length-check a submitted address. No format validation beyond
/// length bounds.
fn validate_address(address: &str) -> Result<String> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidAddress("address is empty".into()));
    }
    let len = trimmed.chars().count();
    if !(MIN_ADDRESS_LEN..=MAX_ADDRESS_LEN).contains(&len) {
        return Err(Error::InvalidAddress(format!(
            "address must be {} to {} characters, got {}",
            MIN_ADDRESS_LEN, MAX_ADDRESS_LEN, len
        )));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::store::MemoryStorage;
    use super::*;

    const OG_ROLE: u64 = 1001;
    const WL_ROLE: u64 = 1002;
    const ADDR_A: &str = "Addr11111111111111111111111111AA";
    const ADDR_B: &str = "Addr11111111111111111111111111BB";

    fn roles() -> RoleConfig {
        RoleConfig {
            og_role_id: OG_ROLE,
            wl_role_id: WL_ROLE,
        }
    }

    fn og_caller(user_id: u64) -> Caller {
        Caller {
            user_id,
            role_ids: vec![OG_ROLE],
            is_admin: false,
        }
    }

    fn wl_caller(user_id: u64) -> Caller {
        Caller {
            user_id,
            role_ids: vec![WL_ROLE],
            is_admin: false,
        }
    }

    fn registry() -> (Arc<MemoryStorage>, WalletRegistry) {
        let storage = Arc::new(MemoryStorage::empty());
        let registry = WalletRegistry::new(storage.clone(), roles());
        (storage, registry)
    }

    #[test]
    fn test_classify_priority() {
        let both = Caller {
            user_id: 1,
            role_ids: vec![WL_ROLE, OG_ROLE],
            is_admin: false,
        };
        assert_eq!(roles().classify(&both), Some(Category::Og));

        let neither = Caller {
            user_id: 1,
            role_ids: vec![9999],
            is_admin: false,
        };
        assert_eq!(roles().classify(&neither), None);
    }

    #[test]
    fn test_validate_address_bounds() {
        assert!(validate_address(&"a".repeat(32)).is_ok());
        assert!(validate_address(&"a".repeat(44)).is_ok());
        assert!(validate_address(&"a".repeat(31)).is_err());
        assert!(validate_address(&"a".repeat(45)).is_err());
        assert!(validate_address("   ").is_err());
        // Trimmed before length check
        assert_eq!(
            validate_address(&format!("  {}  ", ADDR_A)).unwrap(),
            ADDR_A
        );
    }

    #[tokio::test]
    async fn test_submit_then_view() {
        let (_, registry) = registry();
        let caller = og_caller(42);

        let outcome = registry.request_submit(&caller, ADDR_A).await.unwrap();
        assert_eq!(
            outcome,
            SubmitOutcome::Registered {
                category: Category::Og
            }
        );

        let viewed = registry.view(&caller).await.unwrap().unwrap();
        assert_eq!(viewed.address, ADDR_A);
        assert_eq!(viewed.category, Category::Og);
    }

    #[tokio::test]
    async fn test_unauthorized_never_touches_store() {
        let (storage, registry) = registry();
        let caller = Caller {
            user_id: 42,
            role_ids: vec![],
            is_admin: false,
        };

        assert!(matches!(
            registry.request_submit(&caller, ADDR_A).await,
            Err(Error::Unauthorized)
        ));
        assert!(matches!(
            registry.view(&caller).await,
            Err(Error::Unauthorized)
        ));
        assert!(matches!(
            registry.request_remove(&caller).await,
            Err(Error::Unauthorized)
        ));
        assert_eq!(storage.snapshot().total(), 0);
    }

    #[tokio::test]
    async fn test_submit_conflict_confirm_replaces() {
        let (storage, registry) = registry();
        let caller = og_caller(42);

        registry.request_submit(&caller, ADDR_A).await.unwrap();
        let outcome = registry.request_submit(&caller, ADDR_B).await.unwrap();
        assert_eq!(
            outcome,
            SubmitOutcome::NeedsConfirmation {
                category: Category::Og,
                current: ADDR_A.into(),
                proposed: ADDR_B.into(),
            }
        );
        // Nothing written until confirmed
        assert_eq!(storage.snapshot().og.get("42").unwrap(), ADDR_A);

        let resolution = registry.resolve_submit(&caller, true).await.unwrap();
        assert_eq!(
            resolution,
            SubmitResolution::Replaced {
                category: Category::Og,
                previous: ADDR_A.into(),
                address: ADDR_B.into(),
            }
        );
        assert_eq!(storage.snapshot().og.get("42").unwrap(), ADDR_B);
    }

    #[tokio::test]
    async fn test_submit_conflict_decline_preserves() {
        let (storage, registry) = registry();
        let caller = og_caller(42);

        registry.request_submit(&caller, ADDR_A).await.unwrap();
        registry.request_submit(&caller, ADDR_B).await.unwrap();

        let resolution = registry.resolve_submit(&caller, false).await.unwrap();
        assert_eq!(resolution, SubmitResolution::Cancelled);
        assert_eq!(storage.snapshot().og.get("42").unwrap(), ADDR_A);

        let viewed = registry.view(&caller).await.unwrap().unwrap();
        assert_eq!(viewed.address, ADDR_A);
    }

    #[tokio::test]
    async fn test_resolve_submit_is_single_shot() {
        let (storage, registry) = registry();
        let caller = og_caller(42);

        registry.request_submit(&caller, ADDR_A).await.unwrap();
        registry.request_submit(&caller, ADDR_B).await.unwrap();

        registry.resolve_submit(&caller, true).await.unwrap();
        let again = registry.resolve_submit(&caller, true).await.unwrap();
        assert_eq!(again, SubmitResolution::Expired);
        assert_eq!(storage.snapshot().og.get("42").unwrap(), ADDR_B);
    }

    #[tokio::test]
    async fn test_resolve_without_request_expires() {
        let (_, registry) = registry();
        let caller = og_caller(42);

        assert_eq!(
            registry.resolve_submit(&caller, true).await.unwrap(),
            SubmitResolution::Expired
        );
        assert_eq!(
            registry.resolve_remove(&caller, true).await.unwrap(),
            RemoveResolution::Expired
        );
    }

    #[tokio::test]
    async fn test_remove_not_registered() {
        let (_, registry) = registry();
        let caller = wl_caller(7);

        let outcome = registry.request_remove(&caller).await.unwrap();
        assert_eq!(
            outcome,
            RemoveOutcome::NotRegistered {
                category: Category::Wl
            }
        );
    }

    #[tokio::test]
    async fn test_remove_confirm_deletes() {
        let (storage, registry) = registry();
        let caller = wl_caller(7);

        registry.request_submit(&caller, ADDR_A).await.unwrap();
        let outcome = registry.request_remove(&caller).await.unwrap();
        assert_eq!(
            outcome,
            RemoveOutcome::NeedsConfirmation {
                category: Category::Wl,
                address: ADDR_A.into(),
            }
        );

        let resolution = registry.resolve_remove(&caller, true).await.unwrap();
        assert_eq!(
            resolution,
            RemoveResolution::Removed {
                category: Category::Wl,
                address: ADDR_A.into(),
            }
        );
        assert!(registry.view(&caller).await.unwrap().is_none());
        assert_eq!(storage.snapshot().total(), 0);
    }

    #[tokio::test]
    async fn test_remove_decline_preserves() {
        let (_, registry) = registry();
        let caller = wl_caller(7);

        registry.request_submit(&caller, ADDR_A).await.unwrap();
        registry.request_remove(&caller).await.unwrap();

        let resolution = registry.resolve_remove(&caller, false).await.unwrap();
        assert_eq!(resolution, RemoveResolution::Cancelled);

        let viewed = registry.view(&caller).await.unwrap().unwrap();
        assert_eq!(viewed.address, ADDR_A);
    }

    #[tokio::test]
    async fn test_resolve_remove_is_single_shot() {
        let (_, registry) = registry();
        let caller = wl_caller(7);

        registry.request_submit(&caller, ADDR_A).await.unwrap();
        registry.request_remove(&caller).await.unwrap();

        registry.resolve_remove(&caller, true).await.unwrap();
        assert_eq!(
            registry.resolve_remove(&caller, true).await.unwrap(),
            RemoveResolution::Expired
        );
    }

    #[tokio::test]
    async fn test_new_request_replaces_pending() {
        let (storage, registry) = registry();
        let caller = og_caller(42);

        registry.request_submit(&caller, ADDR_A).await.unwrap();
        // Pending replace with ADDR_B...
        registry.request_submit(&caller, ADDR_B).await.unwrap();
        // ...superseded by a pending remove
        registry.request_remove(&caller).await.unwrap();

        // Confirming the submit prompt now reports Expired
        assert_eq!(
            registry.resolve_submit(&caller, true).await.unwrap(),
            SubmitResolution::Expired
        );
        assert_eq!(storage.snapshot().og.get("42").unwrap(), ADDR_A);
    }

    #[tokio::test]
    async fn test_save_failure_surfaces_and_applies_nothing() {
        let (storage, registry) = registry();
        let caller = og_caller(42);

        storage.fail_saves();
        let result = registry.request_submit(&caller, ADDR_A).await;
        assert!(matches!(result, Err(Error::Persistence(_))));
        assert_eq!(storage.snapshot().total(), 0);
    }

    #[tokio::test]
    async fn test_categories_are_independent() {
        let (storage, registry) = registry();

        registry
            .request_submit(&og_caller(1), ADDR_A)
            .await
            .unwrap();
        registry
            .request_submit(&wl_caller(2), ADDR_B)
            .await
            .unwrap();

        let snapshot = storage.snapshot();
        assert_eq!(snapshot.og.get("1").unwrap(), ADDR_A);
        assert_eq!(snapshot.wl.get("2").unwrap(), ADDR_B);
    }

    #[tokio::test]
    async fn test_end_to_end_lifecycle() {
        let (storage, registry) = registry();
        let caller = og_caller(42);

        assert_eq!(storage.snapshot(), WalletStore::default());

        registry.request_submit(&caller, ADDR_A).await.unwrap();
        assert_eq!(storage.snapshot().og.get("42").unwrap(), ADDR_A);

        let viewed = registry.view(&caller).await.unwrap().unwrap();
        assert_eq!(viewed.address, ADDR_A);

        registry.request_remove(&caller).await.unwrap();
        registry.resolve_remove(&caller, true).await.unwrap();
        assert_eq!(storage.snapshot(), WalletStore::default());
    }
}
