use crate::error::GenerationError;
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::fmt::Display;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Bounded event buffer: a slow consumer backpressures the backend read
/// instead of letting fragments pile up in memory.
pub const EVENT_BUFFER: usize = 32;

/// One step of a generation stream. Every stream ends with exactly one
/// terminal event (`Done` for normal completion, `Error` for any failure) so
/// a consumer can always tell a finished answer from a truncated one.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationEvent {
    Fragment(String),
    Done,
    Error(String),
}

/// Streaming text-generation backend. Implementations deliver fragments as
/// they arrive; dropping the receiver cancels the stream and releases the
/// backend connection.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn stream_answer(&self, prompt: &str, model: &str) -> mpsc::Receiver<GenerationEvent>;
}

/// Grounding contract: the model must answer only from the supplied context.
/// The exact phrasing changes model behavior and is part of the contract,
/// not display copy.
pub fn build_prompt(context: &str, question: &str) -> String {
    format!("Answer based only on CONTEXT below:\n\nCONTEXT:\n{context}\n\nQUESTION:\n{question}")
}

/// Builds the grounding prompt and relays the backend's fragments to the
/// caller as they arrive.
pub struct GenerationOrchestrator<B>
where
    B: GenerationBackend,
{
    backend: B,
}

impl<B> GenerationOrchestrator<B>
where
    B: GenerationBackend,
{
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub async fn generate(
        &self,
        context: &str,
        question: &str,
        model: &str,
    ) -> mpsc::Receiver<GenerationEvent> {
        let prompt = build_prompt(context, question);
        self.backend.stream_answer(&prompt, model).await
    }
}

/// Ollama-compatible `/api/generate` backend emitting newline-delimited JSON
/// events of the shape `{response, done}`.
pub struct OllamaGenerator {
    endpoint: String,
    client: Client,
}

impl OllamaGenerator {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: Client::new(),
        }
    }
}

#[async_trait]
impl GenerationBackend for OllamaGenerator {
    async fn stream_answer(&self, prompt: &str, model: &str) -> mpsc::Receiver<GenerationEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let client = self.client.clone();
        let url = format!("{}/api/generate", self.endpoint);
        let body = json!({ "model": model, "prompt": prompt, "stream": true });
        let model = model.to_string();

        tokio::spawn(async move {
            let response = match client.post(url).json(&body).send().await {
                Ok(response) => response,
                Err(error) => {
                    let failed = GenerationError::Http(error);
                    let _ = tx.send(GenerationEvent::Error(failed.to_string())).await;
                    return;
                }
            };

            if !response.status().is_success() {
                let failed = GenerationError::Backend {
                    status: response.status(),
                };
                let _ = tx.send(GenerationEvent::Error(failed.to_string())).await;
                return;
            }

            debug!(model = %model, "generation stream open");
            relay_ndjson(response.bytes_stream(), &tx).await;
        });

        rx
    }
}

#[derive(Debug, Deserialize)]
struct GenerateLine {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    done: bool,
}

enum LineOutcome {
    Continue,
    Finished,
    ConsumerGone,
}

/// Reads a newline-delimited JSON body and forwards fragments to `tx`
/// immediately. Exactly one terminal event is sent: `Done` on a completion
/// frame, `Error` on transport failure or a stream that ends without one.
/// Malformed frames are skipped. A closed receiver aborts the read, which
/// drops the underlying connection.
async fn relay_ndjson<S, B, E>(mut byte_stream: S, tx: &mpsc::Sender<GenerationEvent>)
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
{
    let started = Instant::now();
    let mut first_fragment_at = None;
    let mut lines = LineBuffer::default();

    while let Some(chunk) = byte_stream.next().await {
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(error) => {
                let failed = GenerationError::Interrupted(error.to_string());
                let _ = tx.send(GenerationEvent::Error(failed.to_string())).await;
                return;
            }
        };

        for line in lines.split_complete(bytes.as_ref()) {
            match handle_line(&line, tx, &mut first_fragment_at, started).await {
                LineOutcome::Continue => {}
                LineOutcome::Finished | LineOutcome::ConsumerGone => return,
            }
        }
    }

    // the final frame may arrive without a trailing newline
    if let Some(line) = lines.take_remainder() {
        match handle_line(&line, tx, &mut first_fragment_at, started).await {
            LineOutcome::Continue => {}
            LineOutcome::Finished | LineOutcome::ConsumerGone => return,
        }
    }

    let failed =
        GenerationError::Interrupted("stream ended before completion signal".to_string());
    let _ = tx.send(GenerationEvent::Error(failed.to_string())).await;
}

async fn handle_line(
    line: &str,
    tx: &mpsc::Sender<GenerationEvent>,
    first_fragment_at: &mut Option<std::time::Duration>,
    started: Instant,
) -> LineOutcome {
    let parsed: GenerateLine = match serde_json::from_str(line) {
        Ok(parsed) => parsed,
        Err(error) => {
            // malformed frames are skipped; only transport failures are fatal
            warn!(%error, "skipping unparseable generation frame");
            return LineOutcome::Continue;
        }
    };

    if let Some(text) = parsed.response {
        if !text.is_empty() {
            if first_fragment_at.is_none() {
                let waited = started.elapsed();
                *first_fragment_at = Some(waited);
                debug!(
                    first_token_ms = waited.as_millis() as u64,
                    "first fragment received"
                );
            }

            if tx.send(GenerationEvent::Fragment(text)).await.is_err() {
                return LineOutcome::ConsumerGone;
            }
        }
    }

    if parsed.done {
        debug!(
            total_ms = started.elapsed().as_millis() as u64,
            "generation complete"
        );
        let _ = tx.send(GenerationEvent::Done).await;
        return LineOutcome::Finished;
    }

    LineOutcome::Continue
}

/// Reassembles newline-delimited frames from arbitrarily-split byte chunks.
#[derive(Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn split_complete(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(newline) = self.pending.iter().position(|byte| *byte == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1])
                .trim()
                .to_string();
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }

    fn take_remainder(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.pending).trim().to_string();
        self.pending.clear();
        if line.is_empty() {
            None
        } else {
            Some(line)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn ok_chunk(text: &str) -> Result<Vec<u8>, String> {
        Ok(text.as_bytes().to_vec())
    }

    async fn collect_events(
        chunks: Vec<Result<Vec<u8>, String>>,
    ) -> Vec<GenerationEvent> {
        let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);
        let relay = tokio::spawn(async move {
            relay_ndjson(stream::iter(chunks), &tx).await;
        });

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        relay.await.unwrap();
        events
    }

    #[tokio::test]
    async fn normal_stream_ends_with_done() {
        let events = collect_events(vec![
            ok_chunk("{\"response\":\"Seven \",\"done\":false}\n"),
            ok_chunk("{\"response\":\"days.\",\"done\":false}\n"),
            ok_chunk("{\"done\":true}\n"),
        ])
        .await;

        assert_eq!(
            events,
            vec![
                GenerationEvent::Fragment("Seven ".to_string()),
                GenerationEvent::Fragment("days.".to_string()),
                GenerationEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn frames_split_across_chunks_are_reassembled() {
        let events = collect_events(vec![
            ok_chunk("{\"response\":\"Sev"),
            ok_chunk("en\",\"done\":false}\n{\"done\":true}\n"),
        ])
        .await;

        assert_eq!(
            events,
            vec![
                GenerationEvent::Fragment("Seven".to_string()),
                GenerationEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn final_frame_without_newline_still_terminates() {
        let events = collect_events(vec![
            ok_chunk("{\"response\":\"answer\",\"done\":false}\n"),
            ok_chunk("{\"done\":true}"),
        ])
        .await;

        assert_eq!(
            events,
            vec![
                GenerationEvent::Fragment("answer".to_string()),
                GenerationEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn transport_failure_yields_single_terminal_error() {
        let events = collect_events(vec![
            ok_chunk("{\"response\":\"partial\",\"done\":false}\n"),
            Err("connection reset".to_string()),
        ])
        .await;

        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            GenerationEvent::Fragment("partial".to_string())
        );
        assert!(matches!(&events[1], GenerationEvent::Error(message)
            if message.contains("connection reset")));
    }

    #[tokio::test]
    async fn malformed_frames_are_skipped_not_fatal() {
        let events = collect_events(vec![
            ok_chunk("not json at all\n"),
            ok_chunk("{\"response\":\"kept\",\"done\":false}\n"),
            ok_chunk("{\"done\":true}\n"),
        ])
        .await;

        assert_eq!(
            events,
            vec![
                GenerationEvent::Fragment("kept".to_string()),
                GenerationEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn stream_ending_without_done_is_an_error() {
        let events = collect_events(vec![ok_chunk(
            "{\"response\":\"cut off\",\"done\":false}\n",
        )])
        .await;

        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], GenerationEvent::Error(message)
            if message.contains("before completion signal")));
    }

    #[tokio::test]
    async fn dropped_receiver_aborts_the_relay() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        // many frames, capacity one, nobody reading: the relay must return
        // instead of blocking on a full channel
        let chunks: Vec<Result<Vec<u8>, String>> = (0..64)
            .map(|index| ok_chunk(&format!("{{\"response\":\"f{index}\",\"done\":false}}\n")))
            .collect();

        relay_ndjson(stream::iter(chunks), &tx).await;
    }

    #[tokio::test]
    async fn orchestrator_feeds_grounding_prompt_to_backend() {
        use std::sync::Mutex;

        struct ScriptedBackend {
            prompts: Mutex<Vec<(String, String)>>,
        }

        #[async_trait]
        impl GenerationBackend for ScriptedBackend {
            async fn stream_answer(
                &self,
                prompt: &str,
                model: &str,
            ) -> mpsc::Receiver<GenerationEvent> {
                self.prompts
                    .lock()
                    .unwrap()
                    .push((prompt.to_string(), model.to_string()));
                let (tx, rx) = mpsc::channel(EVENT_BUFFER);
                tokio::spawn(async move {
                    let _ = tx
                        .send(GenerationEvent::Fragment("ok".to_string()))
                        .await;
                    let _ = tx.send(GenerationEvent::Done).await;
                });
                rx
            }
        }

        let orchestrator = GenerationOrchestrator::new(ScriptedBackend {
            prompts: Mutex::new(Vec::new()),
        });

        let mut events = orchestrator
            .generate("the refund window is 7 days", "what is it?", "llama3.2:1b")
            .await;

        let mut received = Vec::new();
        while let Some(event) = events.recv().await {
            received.push(event);
        }
        assert_eq!(
            received,
            vec![
                GenerationEvent::Fragment("ok".to_string()),
                GenerationEvent::Done,
            ]
        );

        let prompts = orchestrator.backend.prompts.lock().unwrap();
        let (prompt, model) = &prompts[0];
        assert_eq!(model, "llama3.2:1b");
        assert!(prompt.starts_with("Answer based only on CONTEXT below:"));
        assert!(prompt.contains("CONTEXT:\nthe refund window is 7 days"));
        assert!(prompt.contains("QUESTION:\nwhat is it?"));
    }

    #[test]
    fn prompt_preserves_grounding_phrase() {
        let prompt = build_prompt("ctx", "q");
        assert_eq!(
            prompt,
            "Answer based only on CONTEXT below:\n\nCONTEXT:\nctx\n\nQUESTION:\nq"
        );
    }
}
