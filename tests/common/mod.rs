#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use guard_backend::{
    config::{Config, RemoteStoreConfig},
    store::{RemoteStoreClient, StoreGate},
};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpListener;

pub const STORE_TOKEN: &str = "test-token";

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

/// 管道协议的内存实现，命令在一把锁里串行执行
pub struct FakeStoreState {
    entries: Mutex<HashMap<String, Entry>>,
    failing: AtomicBool,
    stalled: AtomicBool,
    auto_deserialize: AtomicBool,
    requests: AtomicUsize,
}

impl FakeStoreState {
    /// 接受连接后不再响应
    pub fn set_stalled(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// 模拟会自动反序列化 JSON 的存储
    pub fn set_auto_deserialize(&self, enabled: bool) {
        self.auto_deserialize.store(enabled, Ordering::SeqCst);
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// 模拟过期淘汰
    pub fn evict(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    pub fn evict_all(&self) {
        self.entries.lock().clear();
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).map(|e| e.value.clone())
    }

    fn run(&self, command: &[String]) -> Value {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.retain(|_, e| e.expires_at.is_none_or(|at| at > now));

        let name = command.first().map(|s| s.to_ascii_uppercase()).unwrap_or_default();
        let arg = |i: usize| command.get(i).cloned().unwrap_or_default();

        match name.as_str() {
            "GET" => match entries.get(&arg(1)) {
                Some(e) if self.auto_deserialize.load(Ordering::SeqCst) => {
                    let parsed = serde_json::from_str(&e.value)
                        .unwrap_or_else(|_| Value::String(e.value.clone()));
                    json!({ "result": parsed })
                }
                Some(e) => json!({ "result": e.value }),
                None => json!({ "result": null }),
            },
            "SET" => {
                let expires_at = match (command.get(3).map(|s| s.to_ascii_uppercase()), command.get(4)) {
                    (Some(ex), Some(secs)) if ex == "EX" => match secs.parse::<u64>() {
                        Ok(secs) if secs > 0 => Some(now + Duration::from_secs(secs)),
                        _ => return json!({ "error": "ERR invalid expire time in 'set' command" }),
                    },
                    _ => None,
                };
                entries.insert(arg(1), Entry { value: arg(2), expires_at });
                json!({ "result": "OK" })
            }
            "INCR" => {
                let entry = entries.entry(arg(1)).or_insert(Entry {
                    value: "0".to_string(),
                    expires_at: None,
                });
                match entry.value.parse::<i64>() {
                    Ok(n) => {
                        entry.value = (n + 1).to_string();
                        json!({ "result": n + 1 })
                    }
                    Err(_) => json!({ "error": "ERR value is not an integer or out of range" }),
                }
            }
            "EXPIRE" => {
                let nx = command.get(3).is_some_and(|s| s.eq_ignore_ascii_case("NX"));
                let Ok(secs) = arg(2).parse::<u64>() else {
                    return json!({ "error": "ERR value is not an integer or out of range" });
                };
                match entries.get_mut(&arg(1)) {
                    Some(e) if nx && e.expires_at.is_some() => json!({ "result": 0 }),
                    Some(e) => {
                        e.expires_at = Some(now + Duration::from_secs(secs));
                        json!({ "result": 1 })
                    }
                    None => json!({ "result": 0 }),
                }
            }
            "TTL" => match entries.get(&arg(1)) {
                None => json!({ "result": -2 }),
                Some(Entry { expires_at: None, .. }) => json!({ "result": -1 }),
                Some(Entry { expires_at: Some(at), .. }) => {
                    let left = at.saturating_duration_since(now);
                    let secs = left.as_secs() + u64::from(left.subsec_nanos() > 0);
                    json!({ "result": secs })
                }
            },
            "DEL" => {
                let removed = command[1..].iter().filter(|k| entries.remove(*k).is_some()).count();
                json!({ "result": removed })
            }
            _ => json!({ "error": format!("ERR unknown command '{}'", name) }),
        }
    }
}

async fn pipeline(
    State(store): State<Arc<FakeStoreState>>,
    headers: HeaderMap,
    Json(commands): Json<Vec<Vec<String>>>,
) -> Response {
    store.requests.fetch_add(1, Ordering::SeqCst);

    if store.stalled.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_secs(600)).await;
    }

    if store.failing.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "store unavailable").into_response();
    }

    let expected = format!("Bearer {}", STORE_TOKEN);
    if headers.get("authorization").and_then(|h| h.to_str().ok()) != Some(expected.as_str()) {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Unauthorized" }))).into_response();
    }

    let results: Vec<Value> = commands.iter().map(|c| store.run(c)).collect();
    Json(results).into_response()
}

pub struct FakeStore {
    pub url: String,
    pub state: Arc<FakeStoreState>,
}

impl FakeStore {
    pub async fn spawn() -> Self {
        let state = Arc::new(FakeStoreState {
            entries: Mutex::new(HashMap::new()),
            failing: AtomicBool::new(false),
            stalled: AtomicBool::new(false),
            auto_deserialize: AtomicBool::new(false),
            requests: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/pipeline", post(pipeline))
            .with_state(state.clone());
        let addr = serve(app).await;

        Self {
            url: format!("http://{}", addr),
            state,
        }
    }

    pub fn config(&self) -> RemoteStoreConfig {
        RemoteStoreConfig {
            url: self.url.clone(),
            token: STORE_TOKEN.to_string(),
            timeout: Duration::from_secs(2),
        }
    }

    pub fn client(&self) -> RemoteStoreClient {
        RemoteStoreClient::new(&self.config()).expect("client")
    }

    pub fn gate(&self) -> StoreGate {
        StoreGate::remote(self.client())
    }

    pub fn gate_with_timeout(&self, timeout: Duration) -> StoreGate {
        let config = RemoteStoreConfig {
            timeout,
            ..self.config()
        };
        StoreGate::remote(RemoteStoreClient::new(&config).expect("client"))
    }
}

/// 假的上游服务，把请求体回显在 `echo` 字段里并统计调用次数
pub struct FakeUpstream {
    pub url: String,
    pub calls: Arc<AtomicUsize>,
    pub failing: Arc<AtomicBool>,
}

#[derive(Clone)]
struct UpstreamState {
    calls: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
}

async fn upstream(State(state): State<UpstreamState>, Json(body): Json<Value>) -> Response {
    let n = state.calls.fetch_add(1, Ordering::SeqCst) + 1;
    if state.failing.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "model crashed").into_response();
    }
    Json(json!({ "text": "hola", "echo": body, "call": n })).into_response()
}

impl FakeUpstream {
    pub async fn spawn() -> Self {
        let calls = Arc::new(AtomicUsize::new(0));
        let failing = Arc::new(AtomicBool::new(false));
        let app = Router::new().route("/", post(upstream)).with_state(UpstreamState {
            calls: calls.clone(),
            failing: failing.clone(),
        });
        let addr = serve(app).await;

        Self {
            url: format!("http://{}/", addr),
            calls,
            failing,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    addr
}

pub fn test_config(pairs: &[(&str, &str)]) -> Config {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Config::from_lookup(|name| vars.get(name).cloned()).expect("config")
}
