use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchConfig {
    pub version: u32,
    pub language: String,
    pub max_turns: usize,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default)]
    pub simulate: SimulateSettings,
    pub judge: JudgeSettings,
    pub models: Vec<ModelEndpoint>,
    pub goals: Vec<Goal>,
}

impl BenchConfig {
    /// Resolve the judge's named endpoint against the model list.
    pub fn judge_endpoint(&self) -> Option<&ModelEndpoint> {
        self.models.iter().find(|m| m.name == self.judge.model)
    }

    /// Endpoints that take part in simulation (everything except the judge).
    pub fn simulation_endpoints(&self) -> Vec<&ModelEndpoint> {
        self.models
            .iter()
            .filter(|m| m.name != self.judge.model)
            .collect()
    }
}

fn default_data_dir() -> String {
    ".botiga".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulateSettings {
    #[serde(default = "default_sim_parallel")]
    pub parallel: usize,
}

impl Default for SimulateSettings {
    fn default() -> Self {
        Self {
            parallel: default_sim_parallel(),
        }
    }
}

fn default_sim_parallel() -> usize {
    32
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeSettings {
    /// Name of an entry under `models` used as the evaluator.
    pub model: String,
    #[serde(default = "default_judge_parallel")]
    pub parallel: usize,
    #[serde(default = "default_judge_retries")]
    pub max_retries: u32,
}

fn default_judge_parallel() -> usize {
    10
}

fn default_judge_retries() -> u32 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEndpoint {
    /// Benchmark label; persisted as `modelName` and used for grouping.
    pub name: String,
    /// Provider-side model identifier sent on the wire.
    pub model: String,
    pub base_url: String,
    pub api_key_env: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Buyer,
    Store,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub from: Speaker,
    pub message: String,
}

/// One completed simulated dialogue for a (goal, model) pair.
///
/// Field names match the persisted JSON contract of the original harness
/// (`modelName`, `startTime`/`endTime` in epoch milliseconds), so existing
/// analysis tooling can read the files unchanged. Only the model's string
/// label is persisted; live client handles are never durable state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationRun {
    pub id: String,
    pub goal: String,
    #[serde(rename = "modelName")]
    pub model_name: String,
    pub conversation: Vec<ConversationMessage>,
    #[serde(rename = "startTime")]
    pub start_time: i64,
    #[serde(rename = "endTime")]
    pub end_time: i64,
}

/// Reasoning plus a score on the 0.00-1.00 scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricScore {
    pub reasoning: String,
    pub score: f64,
}

/// A simulation run enriched with the four rubric metrics. Written once
/// per run, keyed by the run's id, and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgedRun {
    #[serde(flatten)]
    pub run: SimulationRun,
    pub quality: MetricScore,
    pub correctness: MetricScore,
    pub grammar: MetricScore,
    pub completeness: MetricScore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
}

/// Per-pair outcome of a simulate or judge batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRow {
    pub id: String,
    pub model: String,
    pub goal: String,
    pub status: RunStatus,
    pub message: String,
    pub duration_ms: u64,
}
