//! Session manager: accounts, selection and login status.

use std::sync::Arc;

use railpilot_core::{
    Account, AccountId, LoginQrCode, LoginStatus, QrPoll, QrScanState, Synced, ValidationError,
};
use railpilot_gateway::{call, call_data, Ack, Action, Gateway, GatewayError, Result};
use railpilot_storage::{Cache, CacheError, CacheExt, CacheKey};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use crate::state::{SessionEvent, SessionState};

/// Owns the account list, the selected account and its login status.
///
/// State is only changed through the operations below. Every change that
/// matters across restarts is written through to the cache in the same
/// step. The state lock is never held across a gateway call, so observers
/// see provisional values while a round trip is in flight.
pub struct SessionManager {
    gateway: Arc<dyn Gateway>,
    cache: Arc<dyn Cache>,
    state: RwLock<SessionState>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionManager {
    /// Create a session manager over a gateway and a durable cache.
    pub fn new(gateway: Arc<dyn Gateway>, cache: Arc<dyn Cache>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            gateway,
            cache,
            state: RwLock::new(SessionState::default()),
            events,
        }
    }

    /// Subscribe to state change events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Copy of the current state.
    pub async fn snapshot(&self) -> SessionState {
        self.state.read().await.clone()
    }

    /// Known accounts.
    pub async fn accounts(&self) -> Vec<Account> {
        self.state.read().await.accounts.clone()
    }

    /// Selected account.
    pub async fn selected(&self) -> Option<Account> {
        self.state.read().await.selected.clone()
    }

    /// Login status of the selected account.
    pub async fn login_status(&self) -> Option<LoginStatus> {
        self.state.read().await.login_status.clone()
    }

    /// Selected account present and logged in.
    pub async fn is_authenticated(&self) -> bool {
        self.state.read().await.is_authenticated()
    }

    /// Whether [`restore_session`](Self::restore_session) has run.
    pub async fn is_initialized(&self) -> bool {
        self.state.read().await.initialized
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    /// Write an entry, logging failures.
    fn write_through<T: Serialize + ?Sized>(&self, key: CacheKey, value: &T) {
        if let Err(e) = self.cache.store(key, value) {
            warn!(%key, error = %e, "cache write failed");
        }
    }

    /// Remove entries, logging failures.
    fn evict(&self, keys: &[CacheKey]) {
        if let Err(e) = self.cache.forget_all(keys) {
            warn!(?keys, error = %e, "cache removal failed");
        }
    }

    /// Read an entry. Malformed entries are removed and read as absent.
    fn read_cached<T: DeserializeOwned>(&self, key: CacheKey) -> Option<T> {
        match self.cache.load(key) {
            Ok(value) => value,
            Err(CacheError::Json(e)) => {
                warn!(%key, error = %e, "discarding malformed cache entry");
                self.evict(&[key]);
                None
            }
            Err(e) => {
                warn!(%key, error = %e, "cache read failed");
                None
            }
        }
    }

    /// Fetch all accounts and replace the local list.
    ///
    /// On failure the previous list is kept and returned stale.
    pub async fn list_accounts(&self) -> Synced<Vec<Account>> {
        match call_data::<Vec<Account>>(&*self.gateway, Action::ListAccounts).await {
            Ok(accounts) => {
                debug!(count = accounts.len(), "account list refreshed");
                self.state.write().await.accounts = accounts.clone();
                self.emit(SessionEvent::AccountsChanged);
                Synced::fresh(accounts)
            }
            Err(e) => {
                warn!(error = %e, "failed to list accounts");
                Synced::stale(self.accounts().await, e.to_string())
            }
        }
    }

    /// Register an account and append it to the list.
    pub async fn register_account(&self, username: &str) -> Result<Account> {
        let username = username.trim();
        if username.is_empty() {
            return Err(ValidationError::Blank("username").into());
        }

        let account: Account = call_data(
            &*self.gateway,
            Action::RegisterAccount { username: username.to_string() },
        )
        .await?;

        info!(account_id = %account.id, username, "account registered");
        self.state.write().await.accounts.push(account.clone());
        self.emit(SessionEvent::AccountAdded(account.clone()));
        Ok(account)
    }

    /// Select an account, then confirm its login status with the service.
    ///
    /// The selection is cached before any network call. If the account's
    /// flag says it is logged in, a provisional status is shown (and cached)
    /// until the confirmed one arrives; otherwise the live status is cleared.
    /// A failed confirmation keeps whatever status was set here.
    pub async fn select_account(&self, account: Account) -> Synced<Option<LoginStatus>> {
        let account_id = account.id;
        let provisional = account.provisional_status();
        {
            let mut state = self.state.write().await;
            self.write_through(CacheKey::SelectedAccountId, &account_id);
            self.write_through(CacheKey::SelectedAccount, &account);
            if let Some(status) = &provisional {
                self.write_through(CacheKey::LoginStatus(account_id), status);
            }
            state.selected = Some(account);
            state.login_status = provisional.clone();
        }
        info!(%account_id, provisional = provisional.is_some(), "account selected");
        self.emit(SessionEvent::Selected(Some(account_id)));
        self.emit(SessionEvent::LoginStatusChanged { account_id, status: provisional });

        self.refresh_login_status().await
    }

    /// Confirm the selected account's login status with the service.
    ///
    /// No-op without a selection. On failure the held status is kept. An
    /// answer that arrives after the selection moved to another account is
    /// cached for its own account but not shown.
    pub async fn refresh_login_status(&self) -> Synced<Option<LoginStatus>> {
        let Some(account_id) = self.state.read().await.selected_id() else {
            return Synced::fresh(None);
        };

        let status = match call_data::<LoginStatus>(
            &*self.gateway,
            Action::LoginStatus { account_id },
        )
        .await
        {
            Ok(status) => status,
            Err(e) => {
                warn!(%account_id, error = %e, "login status check failed; keeping last known");
                return Synced::stale(self.login_status().await, e.to_string());
            }
        };

        let mut state = self.state.write().await;
        self.write_through(CacheKey::LoginStatus(account_id), &status);
        state.apply_login_flags(account_id, &status);

        if state.selected_id() != Some(account_id) {
            debug!(%account_id, "selection changed during status check; not applying");
            return Synced::stale(state.login_status.clone(), "selection changed during refresh");
        }

        if let Some(selected) = &state.selected {
            self.write_through(CacheKey::SelectedAccount, selected);
        }
        state.login_status = Some(status.clone());
        drop(state);

        debug!(%account_id, logged_in = status.is_logged_in, "login status confirmed");
        self.emit(SessionEvent::LoginStatusChanged { account_id, status: Some(status.clone()) });
        Synced::fresh(Some(status))
    }

    async fn logout(&self, account_id: AccountId) -> Result<()> {
        let ack: Ack = call(&*self.gateway, Action::Logout { account_id }).await?;
        ack.ensure_success("logout")?;

        let mut state = self.state.write().await;
        self.evict(&[CacheKey::LoginStatus(account_id)]);
        let was_selected = state.selected_id() == Some(account_id);
        state.mark_logged_out(account_id);
        if was_selected {
            if let Some(selected) = &state.selected {
                self.write_through(CacheKey::SelectedAccount, selected);
            }
        }
        drop(state);

        info!(%account_id, "session ended");
        self.emit(SessionEvent::AccountsChanged);
        if was_selected {
            self.emit(SessionEvent::LoginStatusChanged { account_id, status: None });
        }
        Ok(())
    }

    /// End the selected account's session. Best effort: failures are logged
    /// and reported as stale, never raised.
    pub async fn end_session(&self) -> Synced<()> {
        let Some(account_id) = self.state.read().await.selected_id() else {
            return Synced::fresh(());
        };
        match self.logout(account_id).await {
            Ok(()) => Synced::fresh(()),
            Err(e) => {
                warn!(%account_id, error = %e, "logout failed");
                Synced::stale((), e.to_string())
            }
        }
    }

    /// End a specific account's session.
    pub async fn end_session_for(&self, account: &Account) -> Result<()> {
        self.logout(account.id).await
    }

    /// Delete an account.
    ///
    /// Returns `false` when the service declined. If the account was
    /// selected, selection, status and every related cache entry are cleared
    /// together.
    pub async fn remove_account(&self, account_id: AccountId) -> Result<bool> {
        let ack: Ack = call(&*self.gateway, Action::DeleteAccount { account_id }).await?;
        if !ack.success {
            warn!(%account_id, message = %ack.message, "account deletion declined");
            return Ok(false);
        }

        let mut state = self.state.write().await;
        state.accounts.retain(|account| account.id != account_id);
        let was_selected = state.selected_id() == Some(account_id);
        if was_selected {
            self.evict(&[
                CacheKey::SelectedAccountId,
                CacheKey::SelectedAccount,
                CacheKey::LoginStatus(account_id),
            ]);
            state.selected = None;
            state.login_status = None;
        } else {
            self.evict(&[CacheKey::LoginStatus(account_id)]);
        }
        drop(state);

        info!(%account_id, was_selected, "account removed");
        self.emit(SessionEvent::AccountRemoved(account_id));
        if was_selected {
            self.emit(SessionEvent::Selected(None));
        }
        Ok(true)
    }

    /// Restore the previous session. Runs once per manager; later calls
    /// return the current selection without touching the network.
    ///
    /// Cached selection and status are applied first, each on its own
    /// (a malformed entry drops only itself). Then, if a selection was
    /// cached, the authoritative account record and login status are
    /// fetched. Network failure leaves the cached state in place and the
    /// result stale.
    pub async fn restore_session(&self) -> Synced<Option<Account>> {
        let (cached_id, pending_status) = {
            let mut state = self.state.write().await;
            if state.initialized {
                return Synced::fresh(state.selected.clone());
            }
            state.initialized = true;

            let cached_id: Option<AccountId> = self.read_cached(CacheKey::SelectedAccountId);
            let cached_account = self
                .read_cached::<Account>(CacheKey::SelectedAccount)
                .filter(|account| {
                    let consistent = cached_id.map_or(true, |id| id == account.id);
                    if !consistent {
                        warn!(account_id = %account.id, "cached account does not match cached selection");
                    }
                    consistent
                });
            let cached_id = cached_id.or(cached_account.as_ref().map(|a| a.id));
            let status = cached_id
                .and_then(|id| self.read_cached::<LoginStatus>(CacheKey::LoginStatus(id)));
            debug!(
                selected = ?cached_id,
                has_account = cached_account.is_some(),
                has_status = status.is_some(),
                "applied cached session"
            );

            // A status is only shown together with its account record.
            let pending = if cached_account.is_some() {
                state.login_status = status;
                None
            } else {
                state.login_status = None;
                status
            };
            state.selected = cached_account;
            (cached_id, pending)
        };
        self.emit(SessionEvent::Restored);

        let Some(account_id) = cached_id else {
            return Synced::fresh(None);
        };

        let listed = self.list_accounts().await;
        if let Some(reason) = listed.stale_reason() {
            warn!(%account_id, "restore kept cached session");
            return Synced::stale(self.selected().await, reason);
        }

        let Some(account) = listed.value.into_iter().find(|a| a.id == account_id) else {
            info!(%account_id, "cached account not listed by service; keeping cached selection");
            return Synced::fresh(self.selected().await);
        };

        {
            let mut state = self.state.write().await;
            self.write_through(CacheKey::SelectedAccountId, &account.id);
            self.write_through(CacheKey::SelectedAccount, &account);
            state.selected = Some(account);
            if state.login_status.is_none() {
                state.login_status = pending_status;
            }
        }
        self.emit(SessionEvent::Selected(Some(account_id)));

        let refreshed = self.refresh_login_status().await;
        match refreshed.stale_reason() {
            Some(reason) => Synced::stale(self.selected().await, reason),
            None => Synced::fresh(self.selected().await),
        }
    }

    /// Ask the service for a login QR code for the selected account.
    pub async fn request_login_qr(&self) -> Result<LoginQrCode> {
        let account_id = self.state.read().await.selected_id().ok_or(GatewayError::NoSelection)?;
        let code: LoginQrCode =
            call_data(&*self.gateway, Action::LoginQrCode { account_id }).await?;
        debug!(%account_id, uuid = %code.uuid, "login QR code issued");
        Ok(code)
    }

    /// Poll a login QR code for the selected account.
    ///
    /// Once confirmed, the account is marked logged in and its status is
    /// refreshed from the service.
    pub async fn poll_login_qr(&self, uuid: &str) -> Result<QrPoll> {
        let account_id = self.state.read().await.selected_id().ok_or(GatewayError::NoSelection)?;
        let poll: QrPoll = call_data(
            &*self.gateway,
            Action::LoginQrStatus { account_id, uuid: uuid.to_string() },
        )
        .await?;

        if poll.state() == QrScanState::Confirmed {
            info!(%account_id, "QR login confirmed");
            if let Some(account) = self.state.write().await.account_mut(account_id) {
                account.is_logged_in = true;
            }
            self.emit(SessionEvent::AccountsChanged);
            let refreshed = self.refresh_login_status().await;
            if let Some(reason) = refreshed.stale_reason() {
                debug!(%account_id, reason, "status after QR login not confirmed; showing cached");
            }
        }
        Ok(poll)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use railpilot_gateway::ScriptedGateway;
    use railpilot_storage::MemoryCache;
    use serde_json::json;

    fn account_json(id: i64, username: &str, logged_in: bool) -> serde_json::Value {
        json!({"id": id, "username": username, "railway_username": null, "is_logged_in": logged_in, "is_active": true})
    }

    fn account(id: i64, username: &str, logged_in: bool) -> Account {
        serde_json::from_value(account_json(id, username, logged_in)).unwrap()
    }

    fn ok(data: serde_json::Value) -> serde_json::Value {
        json!({"success": true, "message": "", "data": data})
    }

    fn setup() -> (Arc<ScriptedGateway>, Arc<MemoryCache>, Arc<SessionManager>) {
        let gateway = Arc::new(ScriptedGateway::new());
        let cache = Arc::new(MemoryCache::new());
        let manager = Arc::new(SessionManager::new(gateway.clone(), cache.clone()));
        (gateway, cache, manager)
    }

    #[tokio::test]
    async fn test_list_failure_keeps_previous_accounts() {
        let (gateway, _cache, manager) = setup();
        gateway.push_ok("list_accounts", ok(json!([account_json(1, "a", false)])));
        gateway.push_err("list_accounts", GatewayError::Transport("offline".to_string()));

        assert!(manager.list_accounts().await.is_fresh());
        let second = manager.list_accounts().await;
        assert_eq!(second.stale_reason(), Some("transport error: offline"));
        assert_eq!(second.value.len(), 1);
        assert_eq!(manager.accounts().await.len(), 1);
    }

    #[tokio::test]
    async fn test_register_appends_and_propagates_errors() {
        let (gateway, _cache, manager) = setup();
        gateway.push_ok("list_accounts", ok(json!([account_json(1, "a", false)])));
        let _ = manager.list_accounts().await;

        gateway.push_ok("register_account", ok(account_json(2, "b", false)));
        let created = manager.register_account(" b ").await.unwrap();
        assert_eq!(created.id, AccountId::new(2));
        let ids: Vec<i64> = manager.accounts().await.iter().map(|a| a.id.get()).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(
            gateway.calls().last(),
            Some(&Action::RegisterAccount { username: "b".to_string() })
        );

        gateway.push_err("register_account", GatewayError::Rejected("username exists".to_string()));
        let err = manager.register_account("b").await.unwrap_err();
        assert_eq!(err.to_string(), "username exists");
        assert_eq!(manager.accounts().await.len(), 2);

        assert!(matches!(manager.register_account("  ").await, Err(GatewayError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_select_logged_in_account_is_authenticated_before_confirmation() {
        let (gateway, cache, manager) = setup();
        let hold = gateway.hold("login_status");
        gateway.push_ok("login_status", ok(json!({"is_logged_in": false, "username": "a"})));

        let m = manager.clone();
        let selecting = tokio::spawn(async move { m.select_account(account(1, "a", true)).await });

        hold.entered().await;
        assert!(manager.is_authenticated().await);
        let cached: LoginStatus = cache.load(CacheKey::LoginStatus(AccountId::new(1))).unwrap().unwrap();
        assert!(cached.is_logged_in);

        hold.release();
        let confirmed = selecting.await.unwrap();
        assert!(confirmed.is_fresh());
        assert!(!manager.is_authenticated().await);
        assert!(!manager.selected().await.unwrap().is_logged_in);
    }

    #[tokio::test]
    async fn test_select_logged_out_account_waits_for_refresh() {
        let (gateway, cache, manager) = setup();
        gateway.push_ok("register_account", ok(account_json(7, "a", false)));
        let account = manager.register_account("a").await.unwrap();

        let hold = gateway.hold("login_status");
        gateway.push_ok("login_status", ok(json!({"is_logged_in": true, "username": "a", "railway_username": "rail_a"})));

        let m = manager.clone();
        let selecting = tokio::spawn(async move { m.select_account(account).await });

        hold.entered().await;
        assert!(manager.login_status().await.is_none());
        assert!(!manager.is_authenticated().await);
        assert_eq!(cache.load::<AccountId>(CacheKey::SelectedAccountId).unwrap(), Some(AccountId::new(7)));

        hold.release();
        selecting.await.unwrap();
        assert!(manager.is_authenticated().await);
        let listed = manager.accounts().await;
        assert!(listed[0].is_logged_in);
        assert_eq!(listed[0].railway_username.as_deref(), Some("rail_a"));
    }

    #[tokio::test]
    async fn test_switching_accounts_does_not_carry_status_over() {
        let (gateway, _cache, manager) = setup();
        gateway.push_ok("login_status", ok(json!({"is_logged_in": true})));
        let _ = manager.select_account(account(1, "a", true)).await;
        assert!(manager.is_authenticated().await);

        gateway.push_err("login_status", GatewayError::Transport("offline".to_string()));
        let result = manager.select_account(account(2, "b", false)).await;
        assert!(!result.is_fresh());
        assert!(manager.login_status().await.is_none());
        assert!(!manager.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_late_status_answer_is_not_attributed_to_new_selection() {
        let (gateway, cache, manager) = setup();
        let hold = gateway.hold("login_status");
        gateway.push_ok("login_status", ok(json!({"is_logged_in": true, "username": "a"})));
        gateway.push_ok("login_status", ok(json!({"is_logged_in": false, "username": "b"})));

        let m = manager.clone();
        let first = tokio::spawn(async move { m.select_account(account(1, "a", false)).await });
        hold.entered().await;

        let second = manager.select_account(account(2, "b", false)).await;
        assert!(second.is_fresh());

        hold.release();
        let late = first.await.unwrap();
        assert!(!late.is_fresh());
        assert_eq!(manager.selected().await.unwrap().id, AccountId::new(2));
        assert!(!manager.is_authenticated().await);

        let cached: LoginStatus = cache.load(CacheKey::LoginStatus(AccountId::new(1))).unwrap().unwrap();
        assert!(cached.is_logged_in);
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_provisional_status() {
        let (gateway, _cache, manager) = setup();
        gateway.push_err("login_status", GatewayError::Rejected("timeout".to_string()));
        let result = manager.select_account(account(1, "a", true)).await;
        assert_eq!(result.stale_reason(), Some("timeout"));
        assert!(result.value.unwrap().is_logged_in);
        assert!(manager.is_authenticated().await);

        gateway.push_err("login_status", GatewayError::Transport("offline".to_string()));
        let again = manager.refresh_login_status().await;
        assert!(!again.is_fresh());
        assert!(manager.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_refresh_without_selection_is_noop() {
        let (gateway, _cache, manager) = setup();
        let result = manager.refresh_login_status().await;
        assert!(result.is_fresh());
        assert!(result.value.is_none());
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_end_session_is_best_effort() {
        let (gateway, cache, manager) = setup();
        gateway.push_ok("login_status", ok(json!({"is_logged_in": true})));
        let _ = manager.select_account(account(1, "a", true)).await;

        gateway.push_err("logout", GatewayError::Transport("offline".to_string()));
        let failed = manager.end_session().await;
        assert!(!failed.is_fresh());
        assert!(manager.is_authenticated().await);

        gateway.push_ok("logout", json!({"success": true, "message": "logged out"}));
        assert!(manager.end_session().await.is_fresh());
        assert!(manager.login_status().await.is_none());
        assert!(cache.get("login_status/1").unwrap().is_none());
        assert!(!manager.selected().await.unwrap().is_logged_in);
    }

    #[tokio::test]
    async fn test_end_session_for_other_account() {
        let (gateway, cache, manager) = setup();
        gateway.push_ok(
            "list_accounts",
            ok(json!([account_json(1, "a", true), account_json(2, "b", true)])),
        );
        let _ = manager.list_accounts().await;
        gateway.push_ok("login_status", ok(json!({"is_logged_in": true})));
        let _ = manager.select_account(account(1, "a", true)).await;
        cache.store(CacheKey::LoginStatus(AccountId::new(2)), &LoginStatus::logged_out()).unwrap();

        gateway.push_ok("logout", json!({"success": true}));
        manager.end_session_for(&account(2, "b", true)).await.unwrap();
        let accounts = manager.accounts().await;
        assert!(accounts[0].is_logged_in);
        assert!(!accounts[1].is_logged_in);
        assert!(manager.is_authenticated().await);
        assert!(cache.get("login_status/2").unwrap().is_none());

        gateway.push_err("logout", GatewayError::Rejected("user not found".to_string()));
        assert!(manager.end_session_for(&account(9, "z", true)).await.is_err());
    }

    #[tokio::test]
    async fn test_remove_selected_account_clears_everything() {
        let (gateway, cache, manager) = setup();
        gateway.push_ok("list_accounts", ok(json!([account_json(1, "a", true), account_json(2, "b", false)])));
        let _ = manager.list_accounts().await;
        gateway.push_ok("login_status", ok(json!({"is_logged_in": true})));
        let _ = manager.select_account(account(1, "a", true)).await;
        let mut events = manager.subscribe();

        gateway.push_ok("delete_account", json!({"success": true, "message": "deleted"}));
        assert!(manager.remove_account(AccountId::new(1)).await.unwrap());

        let state = manager.snapshot().await;
        assert!(state.selected.is_none());
        assert!(state.login_status.is_none());
        assert_eq!(state.accounts.len(), 1);
        assert!(cache.is_empty());
        assert_eq!(events.recv().await.unwrap(), SessionEvent::AccountRemoved(AccountId::new(1)));
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Selected(None));
    }

    #[tokio::test]
    async fn test_remove_account_failure_paths() {
        let (gateway, _cache, manager) = setup();
        gateway.push_ok("list_accounts", ok(json!([account_json(1, "a", false)])));
        let _ = manager.list_accounts().await;

        gateway.push_ok("delete_account", json!({"success": false, "message": "busy"}));
        assert!(!manager.remove_account(AccountId::new(1)).await.unwrap());
        assert_eq!(manager.accounts().await.len(), 1);

        gateway.push_err("delete_account", GatewayError::Rejected("user not found".to_string()));
        assert!(manager.remove_account(AccountId::new(1)).await.is_err());
        assert_eq!(manager.accounts().await.len(), 1);
    }

    #[tokio::test]
    async fn test_restore_runs_once() {
        let (gateway, cache, manager) = setup();
        cache.store(CacheKey::SelectedAccountId, &AccountId::new(1)).unwrap();
        cache.store(CacheKey::SelectedAccount, &account(1, "a", true)).unwrap();
        gateway.push_ok("list_accounts", ok(json!([account_json(1, "a", true)])));
        gateway.push_ok("login_status", ok(json!({"is_logged_in": true})));

        let first = manager.restore_session().await;
        assert!(first.is_fresh());
        assert!(manager.is_initialized().await);
        let calls = gateway.calls().len();
        assert_eq!(calls, 2);

        let second = manager.restore_session().await;
        assert_eq!(second.value.map(|a| a.id), Some(AccountId::new(1)));
        assert_eq!(gateway.calls().len(), calls);
    }

    #[tokio::test]
    async fn test_restore_applies_cache_and_survives_network_failure() {
        let (gateway, cache, manager) = setup();
        cache.store(CacheKey::SelectedAccountId, &AccountId::new(3)).unwrap();
        cache.store(CacheKey::SelectedAccount, &account(3, "c", true)).unwrap();
        cache
            .store(
                CacheKey::LoginStatus(AccountId::new(3)),
                &LoginStatus { is_logged_in: true, ..LoginStatus::logged_out() },
            )
            .unwrap();
        gateway.push_err("list_accounts", GatewayError::Transport("offline".to_string()));

        let restored = manager.restore_session().await;
        assert!(!restored.is_fresh());
        assert_eq!(restored.value.map(|a| a.id), Some(AccountId::new(3)));
        assert!(manager.is_authenticated().await);
        assert_eq!(gateway.count("login_status"), 0);
    }

    #[tokio::test]
    async fn test_restore_discards_malformed_entries_individually() {
        let (gateway, cache, manager) = setup();
        cache.store(CacheKey::SelectedAccountId, &AccountId::new(4)).unwrap();
        cache.set("selected_account", "{broken").unwrap();
        gateway.push_ok("list_accounts", ok(json!([account_json(4, "d", false)])));
        gateway.push_ok("login_status", ok(json!({"is_logged_in": false})));

        let restored = manager.restore_session().await;
        assert!(restored.is_fresh());
        assert_eq!(restored.value.map(|a| a.username), Some("d".to_string()));

        let recached: Account = cache.load(CacheKey::SelectedAccount).unwrap().unwrap();
        assert_eq!(recached.id, AccountId::new(4));
    }

    #[tokio::test]
    async fn test_restore_malformed_status_keeps_account() {
        let (gateway, cache, manager) = setup();
        cache.store(CacheKey::SelectedAccountId, &AccountId::new(5)).unwrap();
        cache.store(CacheKey::SelectedAccount, &account(5, "e", true)).unwrap();
        cache.set("login_status/5", "nope").unwrap();
        gateway.push_err("list_accounts", GatewayError::Transport("offline".to_string()));

        let _ = manager.restore_session().await;
        assert_eq!(manager.selected().await.map(|a| a.id), Some(AccountId::new(5)));
        assert!(manager.login_status().await.is_none());
        assert!(cache.get("login_status/5").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_restore_keeps_cached_status_when_account_entry_is_malformed() {
        let (gateway, cache, manager) = setup();
        cache.store(CacheKey::SelectedAccountId, &AccountId::new(4)).unwrap();
        cache.set("selected_account", "{broken").unwrap();
        cache
            .store(
                CacheKey::LoginStatus(AccountId::new(4)),
                &LoginStatus { is_logged_in: true, ..LoginStatus::logged_out() },
            )
            .unwrap();
        let hold = gateway.hold("list_accounts");
        gateway.push_ok("list_accounts", ok(json!([account_json(4, "d", true)])));
        gateway.push_err("login_status", GatewayError::Transport("offline".to_string()));

        let m = manager.clone();
        let restoring = tokio::spawn(async move { m.restore_session().await });
        hold.entered().await;
        assert!(manager.selected().await.is_none());
        assert!(manager.login_status().await.is_none());

        hold.release();
        let restored = restoring.await.unwrap();
        assert!(!restored.is_fresh());
        assert_eq!(restored.value.map(|a| a.id), Some(AccountId::new(4)));
        assert!(manager.is_authenticated().await);
        assert!(cache.get("login_status/4").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_restore_with_empty_cache_makes_no_calls() {
        let (gateway, _cache, manager) = setup();
        let restored = manager.restore_session().await;
        assert!(restored.is_fresh());
        assert!(restored.value.is_none());
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_qr_login_confirms_and_refreshes() {
        let (gateway, _cache, manager) = setup();
        assert!(matches!(manager.request_login_qr().await, Err(GatewayError::NoSelection)));

        gateway.push_ok("list_accounts", ok(json!([account_json(1, "a", false)])));
        let _ = manager.list_accounts().await;
        gateway.push_ok("login_status", ok(json!({"is_logged_in": false})));
        let _ = manager.select_account(account(1, "a", false)).await;

        gateway.push_ok("login_qr_code", ok(json!({"uuid": "u-1", "image_base64": "iVBOR"})));
        let code = manager.request_login_qr().await.unwrap();
        assert_eq!(code.uuid, "u-1");

        gateway.push_ok("login_qr_status", ok(json!({"status": 1, "message": "scanned", "is_success": false})));
        let poll = manager.poll_login_qr("u-1").await.unwrap();
        assert_eq!(poll.state(), QrScanState::Scanned);
        assert!(!manager.is_authenticated().await);

        gateway.push_ok("login_qr_status", ok(json!({"status": 2, "message": "ok", "is_success": true})));
        gateway.push_ok("login_status", ok(json!({"is_logged_in": true, "railway_username": "r"})));
        manager.poll_login_qr("u-1").await.unwrap();
        assert!(manager.is_authenticated().await);
        assert!(manager.accounts().await[0].is_logged_in);
    }

    #[tokio::test]
    async fn test_qr_confirmation_survives_failed_status_check() {
        let (gateway, _cache, manager) = setup();
        gateway.push_ok("list_accounts", ok(json!([account_json(2, "b", false)])));
        let _ = manager.list_accounts().await;
        gateway.push_ok("login_status", ok(json!({"is_logged_in": false})));
        let _ = manager.select_account(account(2, "b", false)).await;

        gateway.push_ok("login_qr_status", ok(json!({"status": 2, "message": "ok", "is_success": true})));
        gateway.push_err("login_status", GatewayError::Transport("offline".to_string()));
        let poll = manager.poll_login_qr("u-2").await.unwrap();
        assert_eq!(poll.state(), QrScanState::Confirmed);
        assert!(manager.accounts().await[0].is_logged_in);
        assert_eq!(gateway.count("login_status"), 2);
        assert!(!manager.is_authenticated().await);
    }
}
