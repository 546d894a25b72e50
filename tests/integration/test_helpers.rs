//! Shared fixtures: a scriptable mock protocol client, a failing renderer,
//! and manager construction helpers.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use courier_gateway::client::ProtocolClient;
use courier_gateway::config::GlobalConfig;
use courier_gateway::render::{PairingRenderer, QrSvgRenderer};
use courier_gateway::session::SessionManager;
use courier_gateway::{AppError, Result};

/// Default test configuration: short waits so suspension and debounce
/// behavior can be observed without slowing the suite down.
pub const TEST_TOML: &str = r#"
http_port = 0

[bridge]
command = "bridge-stub"

[timeouts]
send_wait_seconds = 1
shutdown_seconds = 2

[reconnect]
debounce_ms = 80
"#;

/// Scriptable in-memory [`ProtocolClient`].
#[derive(Default)]
pub struct MockClient {
    /// Number of `initialize` calls observed.
    pub init_calls: AtomicUsize,
    /// Number of `destroy` calls observed.
    pub destroy_calls: AtomicUsize,
    /// Deliveries accepted by `send`, in order.
    pub sent: Mutex<Vec<(String, String)>>,
    /// When set, `initialize` fails with this transport message.
    pub fail_initialize: Mutex<Option<String>>,
    /// When set, `send` fails with this cause.
    pub fail_send: Mutex<Option<String>>,
    /// When set, `destroy` fails with this transport message.
    pub destroy_error: Mutex<Option<String>>,
}

impl MockClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn init_count(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn destroy_count(&self) -> usize {
        self.destroy_calls.load(Ordering::SeqCst)
    }

    pub fn deliveries(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn set_fail_initialize(&self, message: Option<&str>) {
        *self.fail_initialize.lock().unwrap() = message.map(str::to_owned);
    }

    pub fn set_fail_send(&self, cause: Option<&str>) {
        *self.fail_send.lock().unwrap() = cause.map(str::to_owned);
    }

    pub fn set_destroy_error(&self, message: Option<&str>) {
        *self.destroy_error.lock().unwrap() = message.map(str::to_owned);
    }
}

impl ProtocolClient for MockClient {
    fn initialize(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.init_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(msg) = self.fail_initialize.lock().unwrap().clone() {
                return Err(AppError::Transport(msg));
            }
            Ok(())
        })
    }

    fn send<'a>(
        &'a self,
        target: &'a str,
        body: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send + 'a>> {
        Box::pin(async move {
            if let Some(cause) = self.fail_send.lock().unwrap().clone() {
                return Err(AppError::Send(cause));
            }
            self.sent
                .lock()
                .unwrap()
                .push((target.to_owned(), body.to_owned()));
            Ok(serde_json::json!({ "id": "MSG-1" }))
        })
    }

    fn destroy(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.destroy_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(msg) = self.destroy_error.lock().unwrap().clone() {
                return Err(AppError::Transport(msg));
            }
            Ok(())
        })
    }
}

/// Renderer that always fails, for exercising the render error path.
pub struct FailingRenderer;

impl PairingRenderer for FailingRenderer {
    fn render(&self, _code: &str) -> Result<String> {
        Err(AppError::Render("renderer offline".into()))
    }
}

/// Build a manager over `client` with the given TOML and the real renderer.
pub fn manager_with(client: &Arc<MockClient>, toml: &str) -> Arc<SessionManager> {
    let config = GlobalConfig::from_toml_str(toml).expect("test config parses");
    SessionManager::new(
        Arc::clone(client) as Arc<dyn ProtocolClient>,
        Arc::new(QrSvgRenderer),
        &config,
    )
}

/// Build a manager over `client` with the default test configuration.
pub fn test_manager(client: &Arc<MockClient>) -> Arc<SessionManager> {
    manager_with(client, TEST_TOML)
}

/// Build a manager whose renderer always fails.
pub fn manager_with_failing_renderer(client: &Arc<MockClient>) -> Arc<SessionManager> {
    let config = GlobalConfig::from_toml_str(TEST_TOML).expect("test config parses");
    SessionManager::new(
        Arc::clone(client) as Arc<dyn ProtocolClient>,
        Arc::new(FailingRenderer),
        &config,
    )
}
