use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

use crate::config::TtsConfig;

const PROXY_ENV_KEYS: [&str; 6] = [
    "HTTPS_PROXY",
    "https_proxy",
    "HTTP_PROXY",
    "http_proxy",
    "ALL_PROXY",
    "all_proxy",
];

/// Proxy settings found in the environment
pub fn env_proxies() -> Vec<String> {
    PROXY_ENV_KEYS
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

async fn is_local_port_open(port: u16) -> bool {
    let connect = TcpStream::connect(("127.0.0.1", port));
    matches!(tokio::time::timeout(Duration::from_millis(350), connect).await, Ok(Ok(_)))
}

/// Direct route first, then each distinct proxy in discovery order
pub fn build_routes(env: &[String], configured: &[String], open_ports: &[u16]) -> Vec<Option<String>> {
    let mut routes: Vec<Option<String>> = vec![None];
    let local = open_ports.iter().map(|p| format!("http://127.0.0.1:{}", p));
    for proxy in env.iter().cloned().chain(configured.iter().cloned()).chain(local) {
        let proxy = proxy.trim().to_string();
        if !proxy.is_empty() && !routes.iter().any(|r| r.as_deref() == Some(proxy.as_str())) {
            routes.push(Some(proxy));
        }
    }
    routes
}

/// Routes available to the synthesizer right now
pub async fn discover_routes(config: &TtsConfig) -> Vec<Option<String>> {
    let mut open_ports = Vec::new();
    for &port in &config.probe_local_proxy_ports {
        if is_local_port_open(port).await {
            open_ports.push(port);
        }
    }
    let routes = build_routes(&env_proxies(), &config.proxies, &open_ports);
    debug!("TTS routes: {:?}", routes);
    routes
}
