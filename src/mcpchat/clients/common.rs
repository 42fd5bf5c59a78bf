use lazy_static::lazy_static;
use std::time::Duration;

lazy_static! {
    /// Process-wide pooled HTTP client shared by every model client and the MCP transport.
    static ref SHARED_HTTP_CLIENT: reqwest::Client = build_pooled_client();
}

/// Borrow the shared, connection-pooled [`reqwest::Client`].
///
/// Per-call deadlines are applied by the callers; the client itself only bounds
/// connection establishment.
pub fn get_shared_http_client() -> &'static reqwest::Client {
    &SHARED_HTTP_CLIENT
}

fn build_pooled_client() -> reqwest::Client {
    reqwest::ClientBuilder::new()
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .pool_max_idle_per_host(10)
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .connect_timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_else(|err| {
            log::error!("falling back to a default HTTP client: {}", err);
            reqwest::Client::new()
        })
}

/// Join a base URL and a path without doubling or dropping the separator.
pub fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_client_is_a_singleton() {
        let first = get_shared_http_client() as *const reqwest::Client;
        let second = get_shared_http_client() as *const reqwest::Client;
        assert_eq!(first, second);
    }

    #[test]
    fn join_url_normalises_slashes() {
        assert_eq!(
            join_url("https://host/v1/", "/chat/completions"),
            "https://host/v1/chat/completions"
        );
        assert_eq!(
            join_url("https://host/compatible-mode/v1", "chat/completions"),
            "https://host/compatible-mode/v1/chat/completions"
        );
    }
}
