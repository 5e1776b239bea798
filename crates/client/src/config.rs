//! Endpoint configuration for the REST API and the realtime socket.

const DEFAULT_API_BASE_URL: &str = "https://anochat.app/rest_api/api";
const DEFAULT_SOCKET_URL: &str = "wss://anochat.app";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL for the REST API.
    pub api_base_url: String,
    /// WebSocket endpoint of the realtime server.
    pub socket_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            socket_url: DEFAULT_SOCKET_URL.to_string(),
        }
    }
}

impl ClientConfig {
    /// Derive both endpoints from a host. Accepts a bare `host[:port]` or a
    /// full URL; local addresses get plain http/ws schemes.
    pub fn for_host(host: &str) -> Self {
        let bare = match url::Url::parse(host) {
            Ok(parsed) => {
                let mut authority = parsed.host_str().unwrap_or("localhost").to_string();
                if let Some(port) = parsed.port() {
                    authority = format!("{authority}:{port}");
                }
                authority
            }
            Err(_) => host
                .trim_start_matches("http://")
                .trim_start_matches("https://")
                .trim_end_matches('/')
                .to_string(),
        };

        let (http, ws) = if is_local_address(&bare) {
            ("http", "ws")
        } else {
            ("https", "wss")
        };

        Self {
            api_base_url: format!("{http}://{bare}/rest_api/api"),
            socket_url: format!("{ws}://{bare}"),
        }
    }

    /// Socket URL carrying the bearer token as a query parameter, the way
    /// the realtime server authenticates the handshake.
    pub(crate) fn socket_url_with_token(&self, token: &str) -> String {
        format!(
            "{}/?token={}",
            self.socket_url.trim_end_matches('/'),
            urlencoding::encode(token)
        )
    }
}

/// Check if a host is a local/development address.
fn is_local_address(host: &str) -> bool {
    let host_part = host.split(':').next().unwrap_or(host);
    host_part == "localhost"
        || host_part == "127.0.0.1"
        || host_part == "0.0.0.0"
        || host_part.starts_with("192.168.")
        || host_part.starts_with("10.")
}
