//! Server-Sent Events (SSE) utilities
//!
//! Shared SSE implementations for OnAir services.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::events::RadioEvent;

/// Keep-alive interval for every OnAir SSE stream
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Create an SSE stream forwarding [`RadioEvent`]s from a broadcast receiver
///
/// The first message is a `ConnectionStatus` event so the UI can show the
/// link as up before any radio event arrives. Lagged receivers skip the
/// missed events and keep streaming; the stream ends when the sender side
/// is dropped.
///
/// # Arguments
/// * `service_name` - Name of the service for logging (e.g., "onair-bc")
/// * `rx` - Receiver subscribed to the service's event channel
pub fn create_event_sse_stream(
    service_name: &'static str,
    mut rx: broadcast::Receiver<RadioEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected to {} events", service_name);

    let stream = async_stream::stream! {
        yield Ok(Event::default()
            .event("ConnectionStatus")
            .data("connected"));

        loop {
            match rx.recv().await {
                Ok(radio_event) => {
                    match Event::default()
                        .event(radio_event.event_type())
                        .json_data(&radio_event)
                    {
                        Ok(event) => yield Ok(event),
                        Err(e) => warn!("SSE: failed to encode {}: {}", radio_event.event_type(), e),
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("SSE: {} client lagged, skipped {} events", service_name, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("SSE: {} event channel closed", service_name);
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("heartbeat"),
    )
}
