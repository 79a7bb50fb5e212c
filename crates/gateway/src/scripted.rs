//! Scripted in-memory gateway for tests.
//!
//! Responses are queued per action name and handed out in arrival order. A request
//! with nothing queued fails with [`GatewayError::Transport`]. A [`Hold`]
//! parks the next request for an action until released, so callers can
//! observe state while a round trip is in flight.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Notify;

use super::{Action, Gateway, GatewayError, Result};

/// Pause point for one request.
#[derive(Default)]
pub struct Hold {
    entered: Notify,
    release: Notify,
}

impl Hold {
    /// Wait until the held request has arrived.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let the held request continue.
    pub fn release(&self) {
        self.release.notify_one();
    }
}

/// Gateway answering from queued responses.
#[derive(Default)]
pub struct ScriptedGateway {
    responses: Mutex<HashMap<&'static str, VecDeque<Result<Value>>>>,
    holds: Mutex<HashMap<&'static str, Arc<Hold>>>,
    calls: Mutex<Vec<Action>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedGateway {
    /// Create an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response body for `action`.
    pub fn push_ok(&self, action: &'static str, value: Value) {
        self.push(action, Ok(value));
    }

    /// Queue a failure for `action`.
    pub fn push_err(&self, action: &'static str, error: GatewayError) {
        self.push(action, Err(error));
    }

    fn push(&self, action: &'static str, response: Result<Value>) {
        lock(&self.responses).entry(action).or_default().push_back(response);
    }

    /// Park the next `action` request until the returned hold is released.
    pub fn hold(&self, action: &'static str) -> Arc<Hold> {
        let hold = Arc::new(Hold::default());
        lock(&self.holds).insert(action, hold.clone());
        hold
    }

    /// Every request received so far.
    pub fn calls(&self) -> Vec<Action> {
        lock(&self.calls).clone()
    }

    /// Number of requests received for `action`.
    pub fn count(&self, action: &str) -> usize {
        lock(&self.calls).iter().filter(|a| a.name() == action).count()
    }
}

#[async_trait]
impl Gateway for ScriptedGateway {
    async fn request(&self, action: Action) -> Result<Value> {
        let name = action.name();
        lock(&self.calls).push(action);

        let response = lock(&self.responses)
            .get_mut(name)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(GatewayError::Transport(format!("no scripted response for {name}"))));

        let hold = lock(&self.holds).remove(name);
        if let Some(hold) = hold {
            hold.entered.notify_one();
            hold.release.notified().await;
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_responses_are_served_in_order() {
        let gateway = ScriptedGateway::new();
        gateway.push_ok("list_accounts", json!(1));
        gateway.push_err("list_accounts", GatewayError::Rejected("down".to_string()));

        assert_eq!(gateway.request(Action::ListAccounts).await.unwrap(), json!(1));
        assert!(matches!(gateway.request(Action::ListAccounts).await, Err(GatewayError::Rejected(_))));
        assert!(matches!(gateway.request(Action::ListAccounts).await, Err(GatewayError::Transport(_))));
        assert_eq!(gateway.count("list_accounts"), 3);
    }

    #[tokio::test]
    async fn test_hold_parks_request() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_ok("list_accounts", json!([]));
        let hold = gateway.hold("list_accounts");

        let g = gateway.clone();
        let pending = tokio::spawn(async move { g.request(Action::ListAccounts).await });

        hold.entered().await;
        assert!(!pending.is_finished());
        hold.release();
        assert_eq!(pending.await.unwrap().unwrap(), json!([]));
    }
}
