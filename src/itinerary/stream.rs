use bytes::Bytes;
use futures::{Stream, StreamExt};
use log::{debug, info, warn};
use std::fmt::Display;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::transcript::Transcript;
use crate::client::ProxyClient;

pub const APOLOGY_MESSAGE: &str =
    "Sorry, something went wrong while planning your trip. Please try again.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStatus {
    Completed,
    Failed(String),
    /// A newer prompt took over before this stream finished
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct StreamOutcome {
    /// Assistant entry the stream wrote into, if it got that far
    pub message_id: Option<Uuid>,
    pub text: String,
    pub status: StreamStatus,
}

/// Incremental UTF-8 decoding that tolerates code points split across chunks
#[derive(Debug, Default)]
struct Utf8Accumulator {
    text: String,
    pending: Vec<u8>,
}

impl Utf8Accumulator {
    fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(s) => {
                    self.text.push_str(s);
                    self.pending.clear();
                    return;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    self.text
                        .push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        Some(bad) => {
                            self.text.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + bad);
                        }
                        // Incomplete sequence at the end, wait for the next chunk
                        None => {
                            self.pending.drain(..valid);
                            return;
                        }
                    }
                }
            }
        }
    }

    fn finish(&mut self) {
        if !self.pending.is_empty() {
            self.text.push_str(&String::from_utf8_lossy(&self.pending));
            self.pending.clear();
        }
    }

    fn text(&self) -> &str {
        &self.text
    }
}

/// Sends prompts to the itinerary stream and mirrors the reply into a transcript.
///
/// Starting a new prompt cancels the read loop of the previous one, so an
/// abandoned stream never writes into the transcript after a newer prompt.
pub struct ItineraryStreamConsumer {
    client: ProxyClient,
    transcript: Arc<Mutex<Transcript>>,
    active: Mutex<Option<(u64, CancellationToken)>>,
    next_request: AtomicU64,
}

impl ItineraryStreamConsumer {
    pub fn new(client: ProxyClient, transcript: Arc<Mutex<Transcript>>) -> Self {
        Self {
            client,
            transcript,
            active: Mutex::new(None),
            next_request: AtomicU64::new(1),
        }
    }

    pub fn transcript(&self) -> Arc<Mutex<Transcript>> {
        self.transcript.clone()
    }

    /// Cancel whatever stream is currently being read
    pub async fn cancel_active(&self) {
        if let Some((request, token)) = self.active.lock().await.take() {
            debug!("Cancelling itinerary stream #{}", request);
            token.cancel();
        }
    }

    pub async fn stream_prompt<F>(&self, prompt: &str, mut on_update: F) -> StreamOutcome
    where
        F: FnMut(&Transcript) + Send,
    {
        let request = self.next_request.fetch_add(1, Ordering::SeqCst);
        let token = CancellationToken::new();
        if let Some((previous, previous_token)) =
            self.active.lock().await.replace((request, token.clone()))
        {
            debug!("Prompt #{} supersedes stream #{}", request, previous);
            previous_token.cancel();
        }

        {
            let mut transcript = self.transcript.lock().await;
            transcript.push_user(prompt);
            on_update(&transcript);
        }

        info!("Streaming itinerary for prompt #{}", request);
        let opened = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            response = self.client.stream_itinerary(prompt) => Some(response),
        };

        let outcome = match opened {
            None => StreamOutcome {
                message_id: None,
                text: String::new(),
                status: StreamStatus::Cancelled,
            },
            Some(Err(e)) => {
                warn!("Itinerary request failed: {}", e);
                let mut transcript = self.transcript.lock().await;
                transcript.push_assistant(APOLOGY_MESSAGE);
                on_update(&transcript);
                StreamOutcome {
                    message_id: None,
                    text: String::new(),
                    status: StreamStatus::Failed(e.to_string()),
                }
            }
            Some(Ok(response)) => {
                follow_stream(&self.transcript, response.bytes_stream(), &token, &mut on_update)
                    .await
            }
        };

        let mut active = self.active.lock().await;
        if matches!(active.as_ref(), Some((current, _)) if *current == request) {
            *active = None;
        }
        outcome
    }
}

/// Apply a byte stream to a fresh in-progress assistant entry, chunk by chunk
pub(crate) async fn follow_stream<S, E, F>(
    transcript: &Mutex<Transcript>,
    stream: S,
    token: &CancellationToken,
    on_update: &mut F,
) -> StreamOutcome
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
    F: FnMut(&Transcript) + Send,
{
    let mut stream = std::pin::pin!(stream);
    let message_id = {
        let mut transcript = transcript.lock().await;
        // A newer prompt cancels before it writes, so checking under the lock
        // keeps a superseded stream from opening an entry after it
        if token.is_cancelled() {
            return StreamOutcome {
                message_id: None,
                text: String::new(),
                status: StreamStatus::Cancelled,
            };
        }
        let id = transcript.begin_assistant();
        on_update(&transcript);
        id
    };

    let mut decoded = Utf8Accumulator::default();
    let status = loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => break StreamStatus::Cancelled,
            next = stream.next() => next,
        };

        match next {
            Some(Ok(chunk)) => {
                decoded.push(&chunk);
                let mut transcript = transcript.lock().await;
                if !transcript.update_in_progress(message_id, decoded.text()) {
                    break StreamStatus::Cancelled;
                }
                on_update(&transcript);
            }
            Some(Err(e)) => break StreamStatus::Failed(e.to_string()),
            None => {
                decoded.finish();
                let mut transcript = transcript.lock().await;
                transcript.update_in_progress(message_id, decoded.text());
                break StreamStatus::Completed;
            }
        }
    };

    let mut guard = transcript.lock().await;
    guard.finalize(message_id);
    if let StreamStatus::Failed(reason) = &status {
        warn!("Itinerary stream broke off: {}", reason);
        // Partial text stays, the apology is a separate entry
        guard.push_assistant(APOLOGY_MESSAGE);
    }
    on_update(&guard);

    StreamOutcome {
        message_id: Some(message_id),
        text: decoded.text,
        status,
    }
}
