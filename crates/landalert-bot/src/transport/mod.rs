//! Chat platform adapters: parse inbound webhooks into [`Incoming`] events
//! and deliver [`Reply`] values through each platform's send API.
//!
//! [`Incoming`]: crate::conversation::Incoming
//! [`Reply`]: crate::conversation::Reply

pub mod telegram;
pub mod whatsapp;

use crate::error::TransportError;

/// Turn a non-2xx response into [`TransportError::Api`].
pub(crate) async fn check_status(response: reqwest::Response) -> Result<(), TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(TransportError::Api {
        status: status.as_u16(),
        body,
    })
}
