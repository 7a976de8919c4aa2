//! End-to-end tests for the guard and budgeter.
//!
//! Payloads are persisted to a temporary directory. The summarizer is
//! either a scripted in-memory backend, unavailable, or a real
//! `ChatBackend` talking to a one-shot local HTTP server.

use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use trimwise::context::{ChatBackend, estimate_messages_tokens, is_history_digest};
use trimwise::prelude::*;

/// Scripted backend that records every user prompt it receives.
fn scripted(
    reply: Result<&'static str, &'static str>,
) -> (SummarizationService, Arc<Mutex<Vec<String>>>) {
    let prompts = Arc::new(Mutex::new(Vec::new()));
    let sink = prompts.clone();
    let backend = FnBackend::new(move |_system, user| {
        sink.lock().unwrap().push(user.to_string());
        reply.map(str::to_string).map_err(str::to_string)
    });
    (SummarizationService::with_backend(Arc::new(backend), 200_000), prompts)
}

fn disk_guard(dir: &std::path::Path, summarizer: SummarizationService) -> ResponseSizeGuard {
    ResponseSizeGuard::new(
        SizeThresholds::default(),
        summarizer,
        Arc::new(DiskBlobStore::new(dir)),
    )
}

fn saved_files(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| entries.map(|e| e.unwrap().path()).collect())
        .unwrap_or_default()
}

// ── ResponseSizeGuard ────────────────────────────────────────────────

#[tokio::test]
async fn results_under_threshold_are_identity() {
    let dir = tempfile::tempdir().unwrap();
    let guard = disk_guard(dir.path(), SummarizationService::unavailable());

    for len in [0, 1, 1_000, 49_999, 50_000] {
        let text = "q".repeat(len);
        let out = guard.process("search", text.clone()).await;
        assert!(out.is_pass_through(), "len {len}");
        assert_eq!(out.into_text(), text);
    }
    // JSON text is handed back as written: key order, big integers and
    // number spelling included.
    for text in [
        r#"{"b": 1, "a": 2}"#,
        r#"{"id": 123456789012345678901234567890}"#,
        "[1.10, 2e2]",
        "{\n  \"records\": [{\"Id\": \"001\"}],\n  \"done\": true\n}",
    ] {
        let out = guard.process("search", text).await;
        assert!(out.is_pass_through(), "{text}");
        assert_eq!(out.into_text(), text);
    }
    let value = json!({"records": [{"Id": "001"}], "done": true});
    assert_eq!(
        guard.process("search", value.clone()).await,
        GuardOutput::PassThrough(RawResult::from_value(value))
    );
    assert!(saved_files(dir.path()).is_empty());
}

#[tokio::test]
async fn six_hundred_thousand_chars_are_truncated_then_summarized() {
    let dir = tempfile::tempdir().unwrap();
    let (summarizer, prompts) = scripted(Ok("1,200 opportunities; top 100 listed"));
    let guard = disk_guard(dir.path(), summarizer);

    // 1,200 records of ~500 chars each.
    let records: Vec<Value> = (0..1_200)
        .map(|i| {
            json!({
                "Id": format!("006{i:05}"),
                "Name": format!("Deal {i}"),
                "Notes": "n".repeat(450),
            })
        })
        .collect();
    let payload = json!({"totalSize": 1_200, "records": records});
    assert!(payload.to_string().chars().count() > 500_000);

    let out = guard.process("crm_query", payload.clone()).await;
    let GuardOutput::TruncatedSummarized { digest, location } = &out else {
        panic!("expected truncated+summarized, got {}", out.kind());
    };
    assert!(digest.starts_with("1,200 opportunities"));
    assert!(digest.len() <= 50_000 + 200);

    // Summarizer saw the truncated form, not the full payload.
    let prompts = prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("... and 1100 more items"));
    assert!(prompts[0].chars().count() < 100_000);

    // Full payload is recoverable from disk.
    let saved = std::fs::read_to_string(location.as_deref().unwrap()).unwrap();
    assert_eq!(serde_json::from_str::<Value>(&saved).unwrap(), payload);
}

#[tokio::test]
async fn unavailable_summarizer_yields_excerpts_never_errors() {
    let dir = tempfile::tempdir().unwrap();
    let settings = SummarizerSettings::default(); // no API key
    let summarizer = SummarizationService::initialize(&settings);
    assert!(!summarizer.is_available());
    let guard = disk_guard(dir.path(), summarizer);

    let text: String = "0123456789".repeat(12_000);
    let out = guard.process("logs", text).await;
    let GuardOutput::Excerpt { text, location } = &out else {
        panic!("expected excerpt, got {}", out.kind());
    };
    assert!(text.starts_with("0123456789"));
    assert!(text.contains("...[TRUNCATED "));
    assert!(text.chars().count() <= 50_000);
    assert!(text.ends_with(&format!("[Full data: {}]", location.as_deref().unwrap())));

    let huge: Vec<Value> = (0..5_000)
        .map(|i| json!({"row": i, "cell": "c".repeat(200)}))
        .collect();
    let out = guard.process("sheet", Value::Array(huge)).await;
    assert!(matches!(out, GuardOutput::Truncated { .. }));
    let text = out.into_text();
    assert!(!text.is_empty());
    assert!(text.contains("TRUNCATED") || text.contains("[Response truncated."));
    assert_eq!(saved_files(dir.path()).len(), 2);
}

#[tokio::test]
async fn failed_call_falls_back_then_next_call_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let calls = Arc::new(Mutex::new(0));
    let counter = calls.clone();
    let backend = FnBackend::new(move |_, _| {
        let mut n = counter.lock().unwrap();
        *n += 1;
        if *n == 1 {
            Err("timeout".into())
        } else {
            Ok("digest".into())
        }
    });
    let guard = disk_guard(
        dir.path(),
        SummarizationService::with_backend(Arc::new(backend), 200_000),
    );

    let first = guard.process("t", "a".repeat(60_000)).await;
    assert_eq!(first.kind(), "excerpt");
    let second = guard.process("t", "b".repeat(60_000)).await;
    assert!(second.is_summarized());
    assert!(
        second
            .into_text()
            .contains("[Summarized from 60,000 chars. Full data saved to disk.]")
    );
}

#[tokio::test]
async fn tool_set_pipes_results_through_the_guard() {
    let dir = tempfile::tempdir().unwrap();
    let (summarizer, _) = scripted(Ok("500 rows, ids 0..499"));
    let tools = ToolSet::new(disk_guard(dir.path(), summarizer)).with(FnTool::new(
        ToolDef::new("export", "Export rows", json!({"type": "object"})),
        |_: Value| async move {
            let rows: Vec<Value> = (0..500)
                .map(|i| json!({"id": i, "blob": "x".repeat(150)}))
                .collect();
            Ok(Value::Array(rows))
        },
    ));

    let messages = tools
        .execute_calls(&[ToolCall::function("call_1", "export", "{}")])
        .await;
    assert_eq!(messages.len(), 1);
    assert!(messages[0].text().starts_with("500 rows"));
    assert_eq!(saved_files(dir.path()).len(), 1);
}

#[tokio::test]
async fn tool_set_keeps_small_json_strings_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let body = r#"{"zeta": 1.10, "alpha": 98765432109876543210}"#;
    let tools = ToolSet::new(disk_guard(dir.path(), SummarizationService::unavailable())).with(
        FnTool::new(
            ToolDef::new("lookup", "Look up a record", json!({"type": "object"})),
            move |_: Value| async move { Ok(body.to_string()) },
        ),
    );

    let messages = tools
        .execute_calls(&[ToolCall::function("call_1", "lookup", "{}")])
        .await;
    assert_eq!(messages[0].text(), body);
    assert!(saved_files(dir.path()).is_empty());
}

// ── ConversationBudgeter ─────────────────────────────────────────────

fn transcript(n: usize, chars_each: usize) -> Vec<Message> {
    (0..n)
        .map(|i| match i % 3 {
            0 => Message::user(format!("[{i}] {}", "u".repeat(chars_each))),
            1 => Message::assistant_text(format!("[{i}] {}", "a".repeat(chars_each))),
            _ => Message::tool_result(
                format!("call_{i}"),
                format!("[{i}] {}", "t".repeat(chars_each)),
            ),
        })
        .collect()
}

#[tokio::test]
async fn thirty_message_history_becomes_digest_plus_twenty() {
    // First 25 messages carry ~120k estimated tokens.
    let mut messages = transcript(25, 19_200);
    messages.extend(transcript(5, 100));
    assert!(estimate_messages_tokens(&messages[..25]) >= 120_000);

    let (summarizer, prompts) = scripted(Ok("User is reviewing Q3 pipeline."));
    let budgeter = ConversationBudgeter::new(ConversationBudget::default(), summarizer);
    let out = budgeter.compact(messages.clone()).await.into_messages();

    assert_eq!(out.len(), 21);
    assert!(is_history_digest(&out[0]));
    assert!(out[0].text().contains("User is reviewing Q3 pipeline."));
    assert_eq!(&out[1..], &messages[10..]);
    assert!(prompts.lock().unwrap()[0].contains("(10 messages)"));
}

#[tokio::test]
async fn short_history_is_returned_as_is() {
    let messages = transcript(5, 40);
    let (summarizer, prompts) = scripted(Ok("unused"));
    let budgeter = ConversationBudgeter::new(ConversationBudget::default(), summarizer);
    let out = budgeter.compact(messages.clone()).await;
    assert!(out.is_unchanged());
    assert_eq!(out.into_messages(), messages);
    assert!(prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn keeping_more_never_keeps_fewer_verbatim() {
    let messages = transcript(40, 16_000);
    let mut last_verbatim = 0;
    for keep in [1, 5, 10, 20, 39, 40, 60] {
        let (summarizer, _) = scripted(Ok("digest"));
        let budgeter = ConversationBudgeter::new(
            ConversationBudget::default().with_keep_recent(keep),
            summarizer,
        );
        let out = budgeter.compact(messages.clone()).await.into_messages();
        let verbatim = out.iter().filter(|m| !is_history_digest(m)).count();
        assert!(verbatim >= last_verbatim, "keep={keep}");
        last_verbatim = verbatim;
    }
    assert_eq!(last_verbatim, 40);
}

#[tokio::test]
async fn failed_history_summary_drops_older_turns() {
    let messages = transcript(30, 16_000);
    let (summarizer, _) = scripted(Err("HTTP 500"));
    let budgeter = ConversationBudgeter::new(ConversationBudget::default(), summarizer);
    let out = budgeter.compact(messages.clone()).await;
    assert!(out.is_lossy());
    assert_eq!(out.messages(), &messages[10..]);
}

// ── HTTP backend ─────────────────────────────────────────────────────

/// Serve exactly one HTTP response and return the request body.
async fn one_shot_server(
    status: &'static str,
    body: &'static str,
) -> (String, tokio::task::JoinHandle<String>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let request = loop {
            let n = socket.read(&mut chunk).await.unwrap();
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some((head, rest)) = text.split_once("\r\n\r\n") {
                let len = head
                    .lines()
                    .find_map(|l| {
                        let (k, v) = l.split_once(':')?;
                        k.eq_ignore_ascii_case("content-length")
                            .then(|| v.trim().parse::<usize>().ok())?
                    })
                    .unwrap_or(0);
                if rest.len() >= len || n == 0 {
                    break rest.to_string();
                }
            }
            if n == 0 {
                break String::new();
            }
        };
        let response = format!(
            "HTTP/1.1 {status}\r\n\
             Content-Type: application/json\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        request
    });
    (format!("http://{addr}/v1/chat/completions"), handle)
}

#[tokio::test]
async fn chat_backend_sends_prompts_and_reads_digest() {
    let (endpoint, server) = one_shot_server(
        "200 OK",
        r#"{"choices":[{"message":{"content":"42 records"},"finish_reason":"stop"}]}"#,
    )
    .await;
    let mut settings = SummarizerSettings::default().with_api_key("sk-test");
    settings.endpoint = endpoint;
    let backend = ChatBackend::from_settings(&settings).unwrap();
    let service = SummarizationService::with_backend(Arc::new(backend), settings.input_limit);

    let digest = service.summarize_tool_output("crm", "payload").await.unwrap();
    assert!(digest.starts_with("42 records"));

    let request: Value = serde_json::from_str(&server.await.unwrap()).unwrap();
    assert_eq!(request["model"], "openai/gpt-5");
    assert_eq!(request["temperature"], 0.0);
    assert_eq!(request["max_tokens"], 4096);
    assert_eq!(request["messages"][0]["role"], "system");
    assert!(
        request["messages"][1]["content"]
            .as_str()
            .unwrap()
            .starts_with("Summarize this crm response (7 chars):")
    );
}

#[tokio::test]
async fn chat_backend_http_errors_are_call_failures() {
    let (endpoint, _server) =
        one_shot_server("429 Too Many Requests", r#"{"error":{"message":"rate limited"}}"#).await;
    let mut settings = SummarizerSettings::default().with_api_key("sk-test");
    settings.endpoint = endpoint;
    let service = SummarizationService::initialize(&settings);
    assert!(service.is_available());

    let err = service.summarize_history(&[Message::user("hi")]).await.unwrap_err();
    assert!(matches!(err, SummarizeError::Call(ref e) if e.contains("429")));
}
