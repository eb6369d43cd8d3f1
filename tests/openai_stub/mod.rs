use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use serde_json::Value;

pub const STUB_API_KEY: &str = "sk-test-stub";

/// Two questions: an MCQ whose answer is `B`, then a short-answer question.
/// Wrapped in the noise real models emit (reasoning block, code fence).
pub const QUIZ_OUTPUT: &str = r#"<think>The text is about plants.</think>
Here is your quiz:
```json
{
  "questions": [
    {
      "type": "mcq",
      "question": "Which organelle performs photosynthesis?",
      "options": ["A) Nucleus", "B) Chloroplast", "C) Ribosome", "D) Vacuole"],
      "correctAnswer": "B",
      "explanation": "Chloroplasts contain chlorophyll."
    },
    {
      "type": "saq",
      "question": "Name the gas plants release.",
      "correctAnswer": "Oxygen",
      "explanation": "Oxygen is a by-product of photosynthesis."
    }
  ]
}
```"#;

/// Trailing commas: decodes only after repair.
pub const ANALYSIS_OUTPUT: &str = r#"JSON: {"strengths": ["Knows plant cell structure",], "weaknesses": ["Gas exchange"], "recommendations": ["Review chapter 2"], "keyInsights": ["Good start",],}"#;

#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubBehavior {
    /// Quiz and analysis prompts both get valid (noisy) payloads.
    Valid,
    /// Quiz prompt works; analysis prompt gets prose with no JSON.
    ProseAnalysis,
    /// Quiz prompt gets prose with no JSON.
    ProseQuiz,
    /// Every request fails with this HTTP status.
    Status(u16),
}

pub struct OpenAiStub {
    pub base_url: String,
    requests: Arc<AtomicUsize>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl OpenAiStub {
    pub fn spawn(behavior: StubBehavior) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start openai stub server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}/v1");
        let requests = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&requests);

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };
                counter.fetch_add(1, Ordering::SeqCst);

                let path = request.url().to_string();
                if request.method() != &tiny_http::Method::Post || path != "/v1/chat/completions" {
                    let _ = request.respond(
                        tiny_http::Response::from_string("not found").with_status_code(404),
                    );
                    continue;
                }

                let authorized = request.headers().iter().any(|h| {
                    h.field.equiv("Authorization")
                        && h.value.as_str() == format!("Bearer {STUB_API_KEY}")
                });
                if !authorized {
                    let _ = request.respond(
                        tiny_http::Response::from_string(
                            r#"{"error":{"message":"Incorrect API key provided"}}"#,
                        )
                        .with_status_code(401),
                    );
                    continue;
                }

                if let StubBehavior::Status(code) = behavior {
                    let _ = request.respond(
                        tiny_http::Response::from_string(
                            r#"{"error":{"message":"stubbed failure"}}"#,
                        )
                        .with_status_code(code),
                    );
                    continue;
                }

                let mut body = String::new();
                if request.as_reader().read_to_string(&mut body).is_err() {
                    let _ = request.respond(
                        tiny_http::Response::from_string("invalid request body")
                            .with_status_code(400),
                    );
                    continue;
                }

                let parsed: Value = match serde_json::from_str(&body) {
                    Ok(value) => value,
                    Err(_) => {
                        let _ = request.respond(
                            tiny_http::Response::from_string("invalid json").with_status_code(400),
                        );
                        continue;
                    }
                };

                let Some(prompt) = parsed
                    .pointer("/messages/1/content")
                    .and_then(|v| v.as_str())
                else {
                    let _ = request.respond(
                        tiny_http::Response::from_string("missing user message")
                            .with_status_code(400),
                    );
                    continue;
                };

                let content = if prompt.contains("BEGIN_QUIZ_PERFORMANCE_JSON") {
                    match behavior {
                        StubBehavior::ProseAnalysis => "You did fine, keep studying!",
                        _ => ANALYSIS_OUTPUT,
                    }
                } else if prompt.contains("BEGIN_TEXTBOOK_CONTENT") {
                    match behavior {
                        StubBehavior::ProseQuiz => "Sorry, I can only chat about the weather.",
                        _ => QUIZ_OUTPUT,
                    }
                } else {
                    let _ = request.respond(
                        tiny_http::Response::from_string("unknown prompt mode")
                            .with_status_code(400),
                    );
                    continue;
                };

                let response_body = serde_json::json!({
                    "id": "chatcmpl_stub",
                    "object": "chat.completion",
                    "model": parsed.get("model").cloned().unwrap_or(Value::String("stub-model".to_owned())),
                    "choices": [
                        {
                            "index": 0,
                            "message": { "role": "assistant", "content": content },
                            "finish_reason": "stop"
                        }
                    ]
                });

                let header =
                    tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                        .expect("build header");
                let response = tiny_http::Response::from_string(response_body.to_string())
                    .with_status_code(200)
                    .with_header(header);
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            requests,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    #[allow(dead_code)]
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Drop for OpenAiStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
