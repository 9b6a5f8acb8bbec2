//! Named remote functions: install on first use, invalidate on
//! reconnect, retry once on `UNKNOWN_FUNCTION`.

use crate::client::BridgeClient;
use crate::error::BridgeError;
use crate::events::{BridgeEvent, CONNECTED_EVENT};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;

/// A named script with an ordered argument list.
///
/// Scripts are data: tool code never interpolates values into the body.
/// Arguments travel through the bridge's positional channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFunction {
    /// Stable function name.
    pub name: String,
    /// Positional argument names, in call order.
    pub arguments: Vec<String>,
    /// The script body.
    pub script: String,
}

impl RemoteFunction {
    /// Define a function.
    pub fn new(
        name: impl Into<String>,
        arguments: &[&str],
        script: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            arguments: arguments.iter().map(|s| s.to_string()).collect(),
            script: script.into(),
        }
    }

    /// The installation script: the body wrapped in a named function
    /// definition. Name and argument list are authored constants.
    fn install_script(&self) -> String {
        format!(
            "function {}({})\n{}\nend",
            self.name,
            self.arguments.join(", "),
            self.script
        )
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum RegState {
    Unregistered,
    Registered,
}

struct Entry {
    // Compared under the map lock; the state lock may be held across a
    // slow bridge call.
    script: String,
    state: Arc<Mutex<RegState>>,
}

/// Tracks which functions the bridge currently knows.
///
/// The per-name lock serializes registration and call for one function
/// while different functions proceed concurrently.
#[derive(Clone)]
pub struct FunctionRegistry {
    client: BridgeClient,
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl FunctionRegistry {
    /// Create a registry over the given client.
    pub fn new(client: BridgeClient) -> Self {
        Self {
            client,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Invoke a function, installing it first if the bridge does not
    /// have it. An `UNKNOWN_FUNCTION` response triggers exactly one
    /// re-install and one retry.
    pub async fn invoke(
        &self,
        func: &RemoteFunction,
        args: &[serde_json::Value],
        deadline: Option<Duration>,
    ) -> Result<serde_json::Value, BridgeError> {
        let state = self.state_for(func).await?;
        let mut state = state.lock().await;

        if *state != RegState::Registered {
            self.register(func).await?;
            *state = RegState::Registered;
        }

        match self.client.call(&func.name, args, deadline).await {
            Err(e) if e.script_code() == Some("UNKNOWN_FUNCTION") => {
                tracing::info!(function = %func.name, "bridge lost function, re-registering");
                *state = RegState::Unregistered;
                self.register(func).await?;
                *state = RegState::Registered;
                self.client.call(&func.name, args, deadline).await
            }
            other => other,
        }
    }

    /// Remove a function from the bridge and forget its registration.
    pub async fn unregister(&self, name: &str) -> Result<(), BridgeError> {
        let state = {
            let entries = self.entries.lock().await;
            entries.get(name).map(|e| Arc::clone(&e.state))
        };
        if let Some(state) = state {
            *state.lock().await = RegState::Unregistered;
        }
        self.client
            .execute(&format!("{name} = nil"), None)
            .await
            .map(|_| ())
    }

    /// Mark every function unregistered. Called when the event stream
    /// reconnects: the game may have reloaded and lost them all.
    pub async fn invalidate_all(&self) {
        let states: Vec<Arc<Mutex<RegState>>> = {
            let entries = self.entries.lock().await;
            entries.values().map(|e| Arc::clone(&e.state)).collect()
        };
        let count = states.len();
        for state in states {
            *state.lock().await = RegState::Unregistered;
        }
        tracing::info!(count, "remote functions invalidated");
    }

    /// Spawn a task that invalidates all functions on each `Connected`
    /// signal from the event stream.
    pub fn spawn_invalidator(
        &self,
        mut rx: broadcast::Receiver<BridgeEvent>,
    ) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) if event.event_type == CONNECTED_EVENT => {
                        registry.invalidate_all().await;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        // Missed events may have included a reconnect.
                        registry.invalidate_all().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    async fn state_for(&self, func: &RemoteFunction) -> Result<Arc<Mutex<RegState>>, BridgeError> {
        let mut entries = self.entries.lock().await;
        match entries.get(&func.name) {
            Some(existing) => {
                if existing.script != func.script {
                    return Err(BridgeError::FunctionConflict(func.name.clone()));
                }
                Ok(Arc::clone(&existing.state))
            }
            None => {
                let state = Arc::new(Mutex::new(RegState::Unregistered));
                entries.insert(
                    func.name.clone(),
                    Entry {
                        script: func.script.clone(),
                        state: Arc::clone(&state),
                    },
                );
                Ok(state)
            }
        }
    }

    async fn register(&self, func: &RemoteFunction) -> Result<(), BridgeError> {
        self.client
            .execute(&func.install_script(), None)
            .await
            .map(|_| ())
            .map_err(|e| BridgeError::Registration {
                name: func.name.clone(),
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counters {
        execs: AtomicUsize,
        calls: AtomicUsize,
        unknown_until: usize,
    }

    async fn serve(counters: Arc<Counters>) -> String {
        let exec_counters = Arc::clone(&counters);
        let call_counters = Arc::clone(&counters);
        let router = Router::new()
            .route(
                "/script/exec",
                post(move |Json(_body): Json<serde_json::Value>| {
                    let c = Arc::clone(&exec_counters);
                    async move {
                        c.execs.fetch_add(1, Ordering::SeqCst);
                        Json(serde_json::json!({"success": true, "result": null}))
                    }
                }),
            )
            .route(
                "/script/call",
                post(move |Json(_body): Json<serde_json::Value>| {
                    let c = Arc::clone(&call_counters);
                    async move {
                        let n = c.calls.fetch_add(1, Ordering::SeqCst);
                        if n < c.unknown_until {
                            Json(serde_json::json!({
                                "success": false,
                                "error": {"code": "UNKNOWN_FUNCTION", "message": "gone"}
                            }))
                        } else {
                            Json(serde_json::json!({"success": true, "result": {"ok": true}}))
                        }
                    }
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn get_cities() -> RemoteFunction {
        RemoteFunction::new(
            "VoxGetCities",
            &["playerId"],
            "return Players[playerId]:GetCities()",
        )
    }

    #[tokio::test]
    async fn first_invoke_registers_then_calls() {
        let counters = Arc::new(Counters {
            execs: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            unknown_until: 0,
        });
        let base = serve(Arc::clone(&counters)).await;
        let registry = FunctionRegistry::new(BridgeClient::new(&base).unwrap());

        let result = registry
            .invoke(&get_cities(), &[serde_json::json!(0)], None)
            .await
            .unwrap();
        assert_eq!(result["ok"], true);
        assert_eq!(counters.execs.load(Ordering::SeqCst), 1);
        assert_eq!(counters.calls.load(Ordering::SeqCst), 1);

        // Second invoke skips registration.
        registry
            .invoke(&get_cities(), &[serde_json::json!(0)], None)
            .await
            .unwrap();
        assert_eq!(counters.execs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_function_reregisters_once() {
        let counters = Arc::new(Counters {
            execs: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            unknown_until: 1,
        });
        let base = serve(Arc::clone(&counters)).await;
        let registry = FunctionRegistry::new(BridgeClient::new(&base).unwrap());

        let result = registry
            .invoke(&get_cities(), &[serde_json::json!(3)], None)
            .await
            .unwrap();
        assert_eq!(result["ok"], true);
        // install, failed call, re-install, successful call
        assert_eq!(counters.execs.load(Ordering::SeqCst), 2);
        assert_eq!(counters.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn conflicting_body_is_rejected() {
        let counters = Arc::new(Counters {
            execs: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            unknown_until: 0,
        });
        let base = serve(counters).await;
        let registry = FunctionRegistry::new(BridgeClient::new(&base).unwrap());

        registry.invoke(&get_cities(), &[], None).await.unwrap();
        let conflicting = RemoteFunction::new("VoxGetCities", &["playerId"], "return nil");
        let err = registry.invoke(&conflicting, &[], None).await.unwrap_err();
        assert!(matches!(err, BridgeError::FunctionConflict(_)));
    }

    #[tokio::test]
    async fn invalidate_forces_reregistration() {
        let counters = Arc::new(Counters {
            execs: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            unknown_until: 0,
        });
        let base = serve(Arc::clone(&counters)).await;
        let registry = FunctionRegistry::new(BridgeClient::new(&base).unwrap());

        registry.invoke(&get_cities(), &[], None).await.unwrap();
        registry.invalidate_all().await;
        registry.invoke(&get_cities(), &[], None).await.unwrap();
        // Registered exactly once more after invalidation.
        assert_eq!(counters.execs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn install_script_wraps_body() {
        let func = get_cities();
        let script = func.install_script();
        assert!(script.starts_with("function VoxGetCities(playerId)\n"));
        assert!(script.ends_with("\nend"));
    }
}
