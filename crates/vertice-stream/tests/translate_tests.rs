use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use vertice_llm::provider::{StopReason, StreamChunk, Usage};
use vertice_stream::{render_sse, translate_stream, OpenResponsesEvent};

async fn collect(rx: mpsc::Receiver<StreamChunk>) -> Vec<OpenResponsesEvent> {
    translate_stream(rx, CancellationToken::new())
        .collect::<Vec<_>>()
        .await
}

#[tokio::test]
async fn happy_path_emits_well_formed_sequence() {
    let (tx, rx) = mpsc::channel(8);
    tx.send(StreamChunk::TextDelta("hello ".into())).await.unwrap();
    tx.send(StreamChunk::TextDelta("world".into())).await.unwrap();
    tx.send(StreamChunk::Done(StopReason::EndTurn)).await.unwrap();
    drop(tx);

    let events = collect(rx).await;
    let names: Vec<&str> = events.iter().map(|e| e.event_name()).collect();
    assert_eq!(
        names,
        vec![
            "response.created",
            "response.in_progress",
            "response.output_item.added",
            "response.content_part.added",
            "response.output_text.delta",
            "response.output_text.delta",
            "response.output_text.done",
            "response.output_item.done",
            "response.completed",
        ]
    );
}

#[tokio::test]
async fn sequence_numbers_are_strictly_monotonic_from_one() {
    let (tx, rx) = mpsc::channel(8);
    tx.send(StreamChunk::TextDelta("a".into())).await.unwrap();
    tx.send(StreamChunk::Done(StopReason::EndTurn)).await.unwrap();
    drop(tx);

    let events = collect(rx).await;
    let seqs: Vec<u64> = events.iter().map(|e| e.sequence_number()).collect();
    assert_eq!(seqs[0], 1);
    for pair in seqs.windows(2) {
        assert!(pair[1] > pair[0], "sequence numbers must strictly increase");
    }
}

#[tokio::test]
async fn exactly_one_terminal_event_and_it_is_last() {
    let (tx, rx) = mpsc::channel(8);
    tx.send(StreamChunk::TextDelta("a".into())).await.unwrap();
    tx.send(StreamChunk::Done(StopReason::EndTurn)).await.unwrap();
    drop(tx);

    let events = collect(rx).await;
    let terminal_count = events.iter().filter(|e| e.is_terminal()).count();
    assert_eq!(terminal_count, 1);
    assert!(events.last().unwrap().is_terminal());
}

#[tokio::test]
async fn provider_error_yields_single_failure_event() {
    let (tx, rx) = mpsc::channel(8);
    tx.send(StreamChunk::Error("upstream exploded".into()))
        .await
        .unwrap();
    drop(tx);

    let events = collect(rx).await;
    assert_eq!(events.len(), 3); // created, in_progress, failed
    match events.last().unwrap() {
        OpenResponsesEvent::ResponseFailed { error, .. } => {
            assert_eq!(error.code, "provider_error");
            assert_eq!(error.message, "upstream exploded");
        }
        other => panic!("expected response.failed, got {other:?}"),
    }
}

#[tokio::test]
async fn error_message_longer_than_200_chars_is_truncated() {
    let (tx, rx) = mpsc::channel(8);
    let long = "x".repeat(500);
    tx.send(StreamChunk::Error(long)).await.unwrap();
    drop(tx);

    let events = collect(rx).await;
    match events.last().unwrap() {
        OpenResponsesEvent::ResponseFailed { error, .. } => {
            assert_eq!(error.message.len(), 200);
        }
        other => panic!("expected response.failed, got {other:?}"),
    }
}

#[tokio::test]
async fn cancellation_produces_cancelled_failure() {
    let (_tx, rx) = mpsc::channel::<StreamChunk>(8);
    let token = CancellationToken::new();
    token.cancel();

    let events = translate_stream(rx, token).collect::<Vec<_>>().await;
    match events.last().unwrap() {
        OpenResponsesEvent::ResponseFailed { error, .. } => {
            assert_eq!(error.code, "cancelled");
        }
        other => panic!("expected response.failed, got {other:?}"),
    }
}

#[tokio::test]
async fn render_sse_appends_done_marker_once_after_terminal() {
    let (tx, rx) = mpsc::channel(8);
    tx.send(StreamChunk::TextDelta("hi".into())).await.unwrap();
    tx.send(StreamChunk::Done(StopReason::EndTurn)).await.unwrap();
    drop(tx);

    let frames: Vec<String> = render_sse(translate_stream(rx, CancellationToken::new()))
        .collect::<Vec<_>>()
        .await;

    assert_eq!(frames.last().unwrap(), "data: [DONE]\n\n");
    let done_count = frames.iter().filter(|f| f.as_str() == "data: [DONE]\n\n").count();
    assert_eq!(done_count, 1);
    assert!(frames[0].starts_with("event: response.created\ndata: "));
}

#[tokio::test]
async fn tool_call_emits_added_and_done_without_deltas() {
    let (tx, rx) = mpsc::channel(8);
    let call = vertice_core::ToolCall {
        id: "call_1".into(),
        tool_name: "search".into(),
        arguments: serde_json::json!({"query": "rust async streams"}),
    };
    tx.send(StreamChunk::ToolCall(call)).await.unwrap();
    tx.send(StreamChunk::Done(StopReason::ToolUse)).await.unwrap();
    drop(tx);

    let events = collect(rx).await;
    let names: Vec<&str> = events.iter().map(|e| e.event_name()).collect();
    assert_eq!(
        names,
        vec![
            "response.created",
            "response.in_progress",
            "response.output_item.added",
            "response.output_item.done",
            "response.completed",
        ]
    );
}

#[tokio::test]
async fn usage_surfaces_as_telemetry_extension_item_before_completion() {
    let (tx, rx) = mpsc::channel(8);
    tx.send(StreamChunk::TextDelta("done".into())).await.unwrap();
    tx.send(StreamChunk::Usage(Usage {
        input_tokens: 10,
        output_tokens: 5,
        ..Default::default()
    }))
    .await
    .unwrap();
    tx.send(StreamChunk::Done(StopReason::EndTurn)).await.unwrap();
    drop(tx);

    let events = collect(rx).await;
    let telemetry = events.iter().find(|e| {
        matches!(
            e,
            OpenResponsesEvent::OutputItemAdded {
                item: vertice_stream::OutputItem {
                    kind: vertice_stream::ItemKind::VerticeTelemetry { .. },
                    ..
                },
                ..
            }
        )
    });
    assert!(telemetry.is_some());
}
