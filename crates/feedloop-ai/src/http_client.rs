use std::time::Duration;

use reqwest::{Client, Response};

use crate::error::{AiError, Result};

const DISABLE_SYSTEM_PROXY_ENV: &str = "FEEDLOOP_DISABLE_SYSTEM_PROXY";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// Truncate error bodies to avoid leaking large or sensitive responses.
const MAX_ERROR_BODY: usize = 512;

pub(crate) fn build_http_client() -> Result<Client> {
    let builder = Client::builder().connect_timeout(CONNECT_TIMEOUT);
    let builder = if should_disable_system_proxy() {
        builder.no_proxy()
    } else {
        builder
    };
    Ok(builder.build()?)
}

fn should_disable_system_proxy() -> bool {
    if std::env::var_os(DISABLE_SYSTEM_PROXY_ENV).is_some() {
        return true;
    }

    cfg!(test)
}

/// Turn a non-success provider response into an [`AiError::LlmHttp`].
pub(crate) async fn response_to_error(response: Response, provider: &str) -> AiError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();

    let message = if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}... [truncated]", &body[..cut])
    } else {
        body
    };

    AiError::LlmHttp {
        provider: provider.to_string(),
        status,
        message,
    }
}
