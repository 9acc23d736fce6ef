//! Streamed file transfer with progress reporting
//!
//! This module downloads a URL into a local file. Without a progress sink
//! the body is copied in one piece; with a sink the transfer runs in
//! streaming mode: a preflight event announces the total size (which must
//! be known and finite), every chunk emits a cumulative event, and the
//! byte count is checked against the declared content length afterwards.

use std::path::Path;

use futures::StreamExt;
use reqwest::Client;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::app::progress::TransferProgress;
use crate::errors::{AppError, Result, TransferError};

/// Downloads a file to the specified path.
///
/// # Arguments
///
/// * `client` - Shared HTTP client
/// * `url` - The URL to download from
/// * `destination` - The path to save the file to
/// * `progress` - Optional sink for byte-level progress events
/// * `cancel` - Cancellation signal, observed per chunk
///
/// # Errors
///
/// Returns a transfer error if the HTTP request fails, the server responds
/// with a non-success status, streaming mode cannot determine the content
/// length, or the received byte count differs from the declared length.
/// Cancellation surfaces as [`AppError::Canceled`].
pub async fn download_file(
    client: &Client,
    url: &str,
    destination: &Path,
    progress: Option<mpsc::Sender<TransferProgress>>,
    cancel: &CancellationToken,
) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(AppError::Canceled);
    }

    let parsed_url = Url::parse(url).map_err(|e| TransferError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(TransferError::Io)?;
    }

    let response = client
        .get(parsed_url)
        .send()
        .await
        .map_err(TransferError::Http)?;

    if !response.status().is_success() {
        return Err(TransferError::ServerError {
            status: response.status().as_u16(),
        }
        .into());
    }

    match progress {
        None => {
            // No sink: copy the full body directly
            let bytes = response.bytes().await.map_err(TransferError::Http)?;
            tokio::fs::write(destination, &bytes)
                .await
                .map_err(TransferError::Io)?;
            tracing::debug!("Downloaded {} ({} bytes)", destination.display(), bytes.len());
            Ok(())
        }
        Some(sink) => stream_to_file(url, response, destination, sink, cancel).await,
    }
}

/// Streaming-mode body copy with progress events and length verification
async fn stream_to_file(
    url: &str,
    response: reqwest::Response,
    destination: &Path,
    sink: mpsc::Sender<TransferProgress>,
    cancel: &CancellationToken,
) -> Result<()> {
    let total = response
        .content_length()
        .filter(|len| *len > 0)
        .ok_or(TransferError::MissingContentLength)?;

    // A dropped receiver only means nobody is watching; the transfer
    // itself must not fail because of it.
    let _ = sink
        .send(TransferProgress {
            url: url.to_string(),
            preflight: true,
            bytes_received: 0,
            bytes_total: total,
            finished: false,
        })
        .await;

    let mut file = File::create(destination).await.map_err(TransferError::Io)?;
    let mut stream = response.bytes_stream();
    let mut received: u64 = 0;

    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => return Err(AppError::Canceled),
            next = stream.next() => match next {
                Some(chunk) => chunk.map_err(TransferError::Http)?,
                None => break,
            },
        };

        file.write_all(&chunk).await.map_err(TransferError::Io)?;
        received += chunk.len() as u64;

        let _ = sink
            .send(TransferProgress {
                url: url.to_string(),
                preflight: false,
                bytes_received: received,
                bytes_total: total,
                finished: received >= total,
            })
            .await;
    }

    if received != total {
        return Err(TransferError::LengthMismatch {
            received,
            expected: total,
        }
        .into());
    }

    file.flush().await.map_err(TransferError::Io)?;
    tracing::debug!("Downloaded {} ({} bytes)", destination.display(), received);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::tempdir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt as _};
    use tokio::net::TcpListener;

    use crate::app::client::ClientConfig;

    /// Serve one canned HTTP response on a local port and return its URL
    async fn serve_once(status_line: &str, headers: &str, body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let response_head = format!("{status_line}\r\n{headers}\r\n\r\n");

        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                // Drain the request head before answering
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(response_head.as_bytes()).await;
                let _ = socket.write_all(&body).await;
                let _ = socket.shutdown().await;
            }
        });

        format!("http://{addr}/files/1/2/test.zip")
    }

    fn test_client() -> Client {
        ClientConfig::default().build_http_client().unwrap()
    }

    #[tokio::test]
    async fn test_plain_download_writes_body() {
        let body = b"addon archive bytes".to_vec();
        let url = serve_once(
            "HTTP/1.1 200 OK",
            &format!("Content-Length: {}\r\nConnection: close", body.len()),
            body.clone(),
        )
        .await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("test.zip");
        let cancel = CancellationToken::new();

        download_file(&test_client(), &url, &dest, None, &cancel)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), body);
    }

    #[tokio::test]
    async fn test_streamed_download_emits_ordered_events() {
        let body = vec![7u8; 16 * 1024];
        let url = serve_once(
            "HTTP/1.1 200 OK",
            &format!("Content-Length: {}\r\nConnection: close", body.len()),
            body.clone(),
        )
        .await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("test.zip");
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(64);

        download_file(&test_client(), &url, &dest, Some(tx), &cancel)
            .await
            .unwrap();

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        // Preflight first, carrying the total
        assert!(events[0].preflight);
        assert_eq!(events[0].bytes_total, body.len() as u64);

        // Cumulative counts never decrease, final event is finished at total
        let mut last = 0;
        for event in &events[1..] {
            assert!(event.bytes_received >= last);
            last = event.bytes_received;
        }
        let final_event = events.last().unwrap();
        assert!(final_event.finished);
        assert_eq!(final_event.bytes_received, body.len() as u64);

        assert_eq!(std::fs::read(&dest).unwrap(), body);
    }

    #[tokio::test]
    async fn test_streamed_download_requires_content_length() {
        // Close-delimited body without a Content-Length header
        let url = serve_once("HTTP/1.1 200 OK", "Connection: close", b"data".to_vec()).await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("test.zip");
        let cancel = CancellationToken::new();
        let (tx, _rx) = mpsc::channel(64);

        let result = download_file(&test_client(), &url, &dest, Some(tx), &cancel).await;
        assert!(matches!(
            result,
            Err(AppError::Transfer(TransferError::MissingContentLength))
        ));
    }

    #[tokio::test]
    async fn test_streamed_download_detects_short_body() {
        // Header promises more bytes than the server delivers
        let url = serve_once(
            "HTTP/1.1 200 OK",
            "Content-Length: 1000\r\nConnection: close",
            b"short".to_vec(),
        )
        .await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("test.zip");
        let cancel = CancellationToken::new();
        let (tx, _rx) = mpsc::channel(64);

        let result = download_file(&test_client(), &url, &dest, Some(tx), &cancel).await;
        // Either reqwest flags the truncated body or the length check does
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_server_error_status() {
        let url = serve_once(
            "HTTP/1.1 404 Not Found",
            "Content-Length: 0\r\nConnection: close",
            Vec::new(),
        )
        .await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("test.zip");
        let cancel = CancellationToken::new();

        let result = download_file(&test_client(), &url, &dest, None, &cancel).await;
        assert!(matches!(
            result,
            Err(AppError::Transfer(TransferError::ServerError { status: 404 }))
        ));
    }

    #[tokio::test]
    async fn test_cancellation_before_request() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let dir = tempdir().unwrap();
        let dest = dir.path().join("test.zip");

        let result = download_file(
            &test_client(),
            "http://127.0.0.1:1/unreachable.zip",
            &dest,
            None,
            &cancel,
        )
        .await;
        assert!(matches!(result, Err(AppError::Canceled)));
    }

    #[tokio::test]
    async fn test_invalid_url_rejected() {
        let cancel = CancellationToken::new();
        let dir = tempdir().unwrap();
        let dest = dir.path().join("test.zip");

        let result = download_file(&test_client(), "not a url", &dest, None, &cancel).await;
        assert!(matches!(
            result,
            Err(AppError::Transfer(TransferError::InvalidUrl { .. }))
        ));
    }
}
