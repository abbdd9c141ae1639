pub mod retry;

#[cfg(test)]
pub mod stub;

use crate::config::RemoteCallConfig;

const BODY_EXCERPT_CHARS: usize = 512;

/// One client per upstream service, built at startup and shared across requests.
pub fn http_client(config: &RemoteCallConfig) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().timeout(config.timeout).build()
}

/// Upstream bodies can be large; logs and errors only keep the head.
pub fn excerpt(body: &str) -> String {
    let mut chars = body.chars();
    let head: String = chars.by_ref().take(BODY_EXCERPT_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}
