use crate::model::{BatchRow, ConversationMessage, Goal, RunStatus, SimulationRun, Speaker};
use crate::prompt::{self, Persona};
use crate::providers::llm::{ChatClient, ChatMessage, ChatOutcome};
use crate::storage::RunStore;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

/// Runs bounded buyer/store dialogues and persists the transcripts.
#[derive(Clone)]
pub struct Simulator {
    pub store: RunStore,
    pub max_turns: usize,
    pub language: String,
    pub parallel: usize,
}

impl Simulator {
    /// Fan out every (goal, model) pair as an independent task. Pairs race
    /// freely; each pair's dialogue is strictly sequential.
    pub async fn run_batch(
        &self,
        pairs: Vec<(Goal, Arc<dyn ChatClient>)>,
    ) -> anyhow::Result<Vec<BatchRow>> {
        let sem = Arc::new(Semaphore::new(self.parallel.max(1)));
        let mut handles = Vec::new();

        tracing::info!(
            pairs = pairs.len(),
            parallel = self.parallel,
            "starting simulation batch"
        );

        for (goal, client) in pairs {
            let permit = sem.clone().acquire_owned().await?;
            let this = self.clone();
            let h = tokio::spawn(async move {
                let _permit = permit;
                this.run_pair(&goal, client).await
            });
            handles.push(h);
        }

        let mut rows = Vec::new();
        for h in handles {
            let row = match h.await {
                Ok(row) => row,
                Err(e) => BatchRow {
                    id: "unknown".into(),
                    model: "unknown".into(),
                    goal: "unknown".into(),
                    status: RunStatus::Failed,
                    message: format!("join error: {}", e),
                    duration_ms: 0,
                },
            };
            rows.push(row);
        }
        Ok(rows)
    }

    /// Simulate one dialogue and persist the result. A mid-loop failure is
    /// surfaced as a failed row and the partial transcript is kept under
    /// `runs/failed/` for diagnosis instead of being dropped.
    pub async fn run_pair(&self, goal: &Goal, client: Arc<dyn ChatClient>) -> BatchRow {
        let id = uuid::Uuid::new_v4().to_string();
        let model = client.label().to_string();
        let started = Instant::now();
        let start_time = chrono::Utc::now().timestamp_millis();
        let mut conversation: Vec<ConversationMessage> = Vec::new();

        let outcome = self
            .dialogue_loop(goal, client.as_ref(), &mut conversation)
            .await;

        let end_time = chrono::Utc::now().timestamp_millis();
        let duration_ms = started.elapsed().as_millis() as u64;
        let run = SimulationRun {
            id: id.clone(),
            goal: goal.text.clone(),
            model_name: model.clone(),
            conversation,
            start_time,
            end_time,
        };

        let (status, message) = match outcome {
            Ok(()) => match self.store.save_run(&run) {
                Ok(()) => (RunStatus::Completed, "ok".to_string()),
                Err(e) => (RunStatus::Failed, format!("persist failed: {}", e)),
            },
            Err(e) => {
                tracing::warn!(
                    goal = %goal.id,
                    model = %model,
                    partial_messages = run.conversation.len(),
                    "simulation failed: {e:#}"
                );
                if let Err(save_err) = self.store.save_failed_run(&run) {
                    tracing::warn!("could not keep partial transcript: {save_err:#}");
                }
                (RunStatus::Failed, format!("{e:#}"))
            }
        };

        BatchRow {
            id,
            model,
            goal: goal.id.clone(),
            status,
            message,
            duration_ms,
        }
    }

    /// The fixed-length exchange: buyer turn, then store turn, up to
    /// `max_turns` times. The buyer calling `finishedGoal` ends the loop
    /// with nothing further appended in that turn.
    async fn dialogue_loop(
        &self,
        goal: &Goal,
        client: &dyn ChatClient,
        conversation: &mut Vec<ConversationMessage>,
    ) -> anyhow::Result<()> {
        let buyer_system = prompt::buyer_system_prompt(&goal.text, self.max_turns, &self.language);
        let store_system = prompt::store_system_prompt(&self.language);
        let tools = [prompt::finished_goal_tool()];

        for _turn in 0..self.max_turns {
            let mut buyer_messages = vec![ChatMessage::system(buyer_system.clone())];
            buyer_messages.extend(prompt::render_history(conversation, Persona::Buyer));

            let buyer_text = match client.chat(&buyer_messages, Some(&tools)).await? {
                ChatOutcome::ToolCall { name, arguments }
                    if name == prompt::FINISHED_GOAL_NAME =>
                {
                    tracing::info!(
                        goal = %goal.id,
                        finished = arguments.get("finished").and_then(|v| v.as_bool()),
                        "buyer reported completion"
                    );
                    break;
                }
                ChatOutcome::ToolCall { name, .. } => {
                    anyhow::bail!("buyer called unknown tool '{}'", name)
                }
                ChatOutcome::Text(text) => text,
            };
            conversation.push(ConversationMessage {
                from: Speaker::Buyer,
                message: buyer_text,
            });

            let mut store_messages = vec![ChatMessage::system(store_system.clone())];
            store_messages.extend(prompt::render_history(conversation, Persona::Store));

            let store_text = match client.chat(&store_messages, None).await? {
                ChatOutcome::Text(text) => text,
                ChatOutcome::ToolCall { name, .. } => {
                    anyhow::bail!("store persona called tool '{}'", name)
                }
            };
            conversation.push(ConversationMessage {
                from: Speaker::Store,
                message: store_text,
            });
        }
        Ok(())
    }
}
