// Notification streaming - newline-delimited JSON over a chunked response
use crate::domain::notification::Notification;
use axum::body::Body;
use axum::http::{header, Response, StatusCode};
use axum::response::IntoResponse;
use bytes::{BufMut, Bytes, BytesMut};
use futures::stream::Stream;
use tokio::sync::broadcast::{self, error::RecvError};

fn encode_line(notification: &Notification) -> Result<Bytes, serde_json::Error> {
    let json = serde_json::to_vec(notification)?;
    let mut line = BytesMut::with_capacity(json.len() + 1);
    line.put_slice(&json);
    line.put_u8(b'\n');
    Ok(line.freeze())
}

/// `replay` first, then everything published on `rx` until the feed closes.
///
/// A subscriber that falls behind skips what it missed instead of ending.
pub fn notification_lines(
    replay: Vec<Notification>,
    mut rx: broadcast::Receiver<Notification>,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
    async_stream::stream! {
        for notification in &replay {
            yield encode_line(notification).map_err(std::io::Error::other);
        }
        loop {
            match rx.recv().await {
                Ok(notification) => {
                    yield encode_line(&notification).map_err(std::io::Error::other);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "notification subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}

pub fn notification_stream_response(
    replay: Vec<Notification>,
    rx: broadcast::Receiver<Notification>,
) -> Response<Body> {
    let body = Body::from_stream(notification_lines(replay, rx));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(body)
        .unwrap_or_else(|e| {
            tracing::error!("Response build error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        })
}
