use async_trait::async_trait;
use botiga_core::engine::simulator::Simulator;
use botiga_core::model::{Goal, RunStatus, Speaker};
use botiga_core::providers::llm::{ChatClient, ChatMessage, ChatOutcome, ToolSpec};
use botiga_core::storage::RunStore;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Plays back a fixed script of chat outcomes, one per model call.
struct ScriptedClient {
    label: String,
    outcomes: Mutex<VecDeque<anyhow::Result<ChatOutcome>>>,
    calls: Mutex<usize>,
}

impl ScriptedClient {
    fn new(label: &str, outcomes: Vec<anyhow::Result<ChatOutcome>>) -> Self {
        Self {
            label: label.to_string(),
            outcomes: Mutex::new(outcomes.into()),
            calls: Mutex::new(0),
        }
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl ChatClient for ScriptedClient {
    async fn chat(
        &self,
        _messages: &[ChatMessage],
        _tools: Option<&[ToolSpec]>,
    ) -> anyhow::Result<ChatOutcome> {
        *self.calls.lock().unwrap() += 1;
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow::anyhow!("script exhausted")))
    }

    async fn chat_structured(
        &self,
        _messages: &[ChatMessage],
        _schema: &serde_json::Value,
    ) -> anyhow::Result<serde_json::Value> {
        anyhow::bail!("not used by the simulator")
    }

    fn label(&self) -> &str {
        &self.label
    }
}

fn simulator(store: RunStore, max_turns: usize) -> Simulator {
    Simulator {
        store,
        max_turns,
        language: "Catalan".into(),
        parallel: 4,
    }
}

fn goal() -> Goal {
    Goal {
        id: "store-address".into(),
        text: "Find out the street address of the store.".into(),
    }
}

fn text(s: &str) -> anyhow::Result<ChatOutcome> {
    Ok(ChatOutcome::Text(s.to_string()))
}

fn finished() -> anyhow::Result<ChatOutcome> {
    Ok(ChatOutcome::ToolCall {
        name: "finishedGoal".into(),
        arguments: serde_json::json!({
            "finished": true,
            "information": "Carrer de l'Argenteria 23"
        }),
    })
}

#[tokio::test]
async fn tool_call_on_second_turn_stops_after_two_messages() {
    let dir = tempfile::tempdir().unwrap();
    let store = RunStore::open(dir.path()).unwrap();

    // Turn 1: buyer asks, store answers. Turn 2: buyer reports completion.
    let client = Arc::new(ScriptedClient::new(
        "m1",
        vec![
            text("On és la botiga?"),
            text("Som al Carrer de l'Argenteria, 23."),
            finished(),
        ],
    ));

    let row = simulator(store.clone(), 10)
        .run_pair(&goal(), client.clone())
        .await;
    assert_eq!(row.status, RunStatus::Completed);
    assert_eq!(client.calls(), 3);

    let runs = store.load_runs().unwrap();
    assert_eq!(runs.len(), 1);
    let run = &runs[0];
    assert_eq!(run.conversation.len(), 2);
    assert_eq!(run.conversation[0].from, Speaker::Buyer);
    assert_eq!(run.conversation[1].from, Speaker::Store);
    assert_eq!(run.model_name, "m1");
    assert!(run.end_time >= run.start_time);
}

#[tokio::test]
async fn conversation_is_bounded_by_max_turns_and_alternates() {
    let dir = tempfile::tempdir().unwrap();
    let store = RunStore::open(dir.path()).unwrap();

    // Buyer never calls the tool; the turn limit must stop the loop.
    let script: Vec<anyhow::Result<ChatOutcome>> =
        (0..6).map(|i| text(&format!("missatge {i}"))).collect();
    let client = Arc::new(ScriptedClient::new("m1", script));

    let row = simulator(store.clone(), 3).run_pair(&goal(), client).await;
    assert_eq!(row.status, RunStatus::Completed);

    let runs = store.load_runs().unwrap();
    let conversation = &runs[0].conversation;
    assert_eq!(conversation.len(), 6); // 2 * max_turns
    for (i, msg) in conversation.iter().enumerate() {
        let expected = if i % 2 == 0 {
            Speaker::Buyer
        } else {
            Speaker::Store
        };
        assert_eq!(msg.from, expected, "message {i} out of order");
    }
}

#[tokio::test]
async fn mid_loop_failure_keeps_partial_transcript_and_surfaces_failed_row() {
    let dir = tempfile::tempdir().unwrap();
    let store = RunStore::open(dir.path()).unwrap();

    let client = Arc::new(ScriptedClient::new(
        "m1",
        vec![text("Hola!"), Err(anyhow::anyhow!("provider timeout"))],
    ));

    let row = simulator(store.clone(), 10).run_pair(&goal(), client).await;
    assert_eq!(row.status, RunStatus::Failed);
    assert!(row.message.contains("provider timeout"));

    // Nothing in the judge's input; the partial lives under runs/failed/.
    assert!(store.load_runs().unwrap().is_empty());
    let failed: Vec<_> = std::fs::read_dir(store.failed_dir())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|x| x == "json"))
        .collect();
    assert_eq!(failed.len(), 1);
    let raw = std::fs::read_to_string(failed[0].path()).unwrap();
    let partial: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(partial["conversation"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn batch_runs_every_pair_and_reports_per_pair_rows() {
    let dir = tempfile::tempdir().unwrap();
    let store = RunStore::open(dir.path()).unwrap();

    let ok_client: Arc<dyn ChatClient> =
        Arc::new(ScriptedClient::new("good", vec![text("Hola"), text("Bon dia"), finished()]));
    let bad_client: Arc<dyn ChatClient> = Arc::new(ScriptedClient::new(
        "bad",
        vec![Err(anyhow::anyhow!("boom"))],
    ));

    let rows = simulator(store.clone(), 10)
        .run_batch(vec![(goal(), ok_client), (goal(), bad_client)])
        .await
        .unwrap();

    assert_eq!(rows.len(), 2);
    let completed = rows
        .iter()
        .filter(|r| r.status == RunStatus::Completed)
        .count();
    assert_eq!(completed, 1);
    assert_eq!(store.load_runs().unwrap().len(), 1);
}
