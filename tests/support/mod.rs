//! ---
//! ems_section: "15-testing-qa-runbook"
//! ems_subsection: "integration-tests"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Simulated Nanogrid Air device for integration tests."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use nanogrid_common::config::DeviceConfig;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const USERNAME: &str = "admin";
pub const PASSWORD: &str = "nanogrid-secret";

pub fn status_document() -> Value {
    json!({
        "deviceInfo": {"serial": "NGA-2207-0113", "firmware": "1.4.2", "mac": "AC:1F:09:12:34:56"},
        "chargeboxInfo": {"state": "CONNECTED"},
        "wifiInfo": {"ssid": "home-iot", "rssi": -61}
    })
}

pub fn meter_document() -> Value {
    json!({
        "activePowerIn": 3450,
        "activePowerOut": 0,
        "current": [5.1, 4.9, 5.3],
        "voltage": [231.2, 229.8, 230.5],
        "totalEnergyActiveImport": 1523400,
        "totalEnergyActiveExport": 1200
    })
}

pub fn evse_document() -> Value {
    json!({
        "cb_id": "CB-7731",
        "connection_status": "online",
        "evse": [
            {"state": "CHARGING", "current": 15.8, "phaseCount": 3},
            {"state": "IDLE", "current": 0}
        ]
    })
}

/// Canned reply for one endpoint.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: String,
    pub delay: Duration,
}

impl Reply {
    pub fn json(document: Value) -> Self {
        Self {
            status: 200,
            body: document.to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: json!({"error": "device fault"}).to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn raw(body: &str) -> Self {
        Self {
            status: 200,
            body: body.to_owned(),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Default)]
struct DeviceState {
    replies: Mutex<HashMap<String, Reply>>,
    requests: Mutex<Vec<String>>,
}

/// HTTP server imitating the device API. Routes only answer with a trailing slash.
pub struct MockDevice {
    addr: SocketAddr,
    state: Arc<DeviceState>,
    task: JoinHandle<()>,
}

impl MockDevice {
    /// Device serving realistic `/status`, `/meter` and `/evse` documents.
    pub async fn start() -> Self {
        let device = Self::empty().await;
        device.set("/status", Reply::json(status_document()));
        device.set("/meter", Reply::json(meter_document()));
        device.set("/evse", Reply::json(evse_document()));
        device
    }

    /// Device answering 404 everywhere until replies are configured.
    pub async fn empty() -> Self {
        let state = Arc::new(DeviceState::default());
        let router = Router::new().fallback(handle).with_state(state.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        Self { addr, state, task }
    }

    pub fn set(&self, endpoint: &str, reply: Reply) {
        self.state
            .replies
            .lock()
            .insert(format!("{endpoint}/"), reply);
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn device_config(&self) -> DeviceConfig {
        DeviceConfig::new("127.0.0.1", self.port(), USERNAME, PASSWORD)
    }

    /// Request paths received so far, in arrival order.
    pub fn requests(&self) -> Vec<String> {
        self.state.requests.lock().clone()
    }

    pub fn hits(&self, path: &str) -> usize {
        self.state
            .requests
            .lock()
            .iter()
            .filter(|p| p.as_str() == path)
            .count()
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn authorised(headers: &HeaderMap) -> bool {
    let expected = format!("Basic {}", STANDARD.encode(format!("{USERNAME}:{PASSWORD}")));
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == expected)
}

async fn handle(State(state): State<Arc<DeviceState>>, uri: Uri, headers: HeaderMap) -> Response {
    let path = uri.path().to_owned();
    state.requests.lock().push(path.clone());

    if !authorised(&headers) {
        return (StatusCode::UNAUTHORIZED, "unauthorised").into_response();
    }
    let reply = state.replies.lock().get(&path).cloned();
    let Some(reply) = reply else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if !reply.delay.is_zero() {
        tokio::time::sleep(reply.delay).await;
    }
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, [(header::CONTENT_TYPE, "application/json")], reply.body).into_response()
}
