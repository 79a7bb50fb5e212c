//! Session state snapshot and change events.

use railpilot_core::{Account, AccountId, LoginStatus};

/// Point-in-time copy of the session manager's state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    /// Known accounts, in service order plus local appends
    pub accounts: Vec<Account>,

    /// Selected account
    pub selected: Option<Account>,

    /// Login status of the selected account
    pub login_status: Option<LoginStatus>,

    /// Whether restore has run
    pub initialized: bool,
}

impl SessionState {
    /// Selected account is present and its session is live.
    pub fn is_authenticated(&self) -> bool {
        self.selected.is_some()
            && self.login_status.as_ref().is_some_and(|status| status.is_logged_in)
    }

    /// Id of the selected account.
    pub fn selected_id(&self) -> Option<AccountId> {
        self.selected.as_ref().map(|account| account.id)
    }

    pub(crate) fn account_mut(&mut self, id: AccountId) -> Option<&mut Account> {
        self.accounts.iter_mut().find(|account| account.id == id)
    }

    /// Copy the status's login facts onto the account records.
    pub(crate) fn apply_login_flags(&mut self, id: AccountId, status: &LoginStatus) {
        let update = |account: &mut Account| {
            account.is_logged_in = status.is_logged_in;
            if status.railway_username.is_some() {
                account.railway_username = status.railway_username.clone();
            }
        };
        if let Some(account) = self.account_mut(id) {
            update(account);
        }
        if let Some(selected) = self.selected.as_mut().filter(|a| a.id == id) {
            update(selected);
        }
    }

    /// Record that an account's session ended.
    pub(crate) fn mark_logged_out(&mut self, id: AccountId) {
        if let Some(account) = self.account_mut(id) {
            account.is_logged_in = false;
        }
        if let Some(selected) = self.selected.as_mut().filter(|a| a.id == id) {
            selected.is_logged_in = false;
            self.login_status = None;
        }
    }
}

/// Change notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The account list was replaced or edited
    AccountsChanged,
    /// An account was registered
    AccountAdded(Account),
    /// An account was deleted
    AccountRemoved(AccountId),
    /// Selection changed; `None` when cleared
    Selected(Option<AccountId>),
    /// Live login status changed
    LoginStatusChanged {
        /// Account the status belongs to
        account_id: AccountId,
        /// New status, `None` when cleared
        status: Option<LoginStatus>,
    },
    /// Restore finished its cache step
    Restored,
}
