use crate::model::{BatchRow, JudgedRun, MetricScore, RunStatus, SimulationRun};
use crate::providers::llm::{ChatClient, ChatMessage};
use crate::storage::RunStore;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

pub const METRIC_NAMES: [&str; 4] = ["quality", "correctness", "grammar", "completeness"];

/// Scores one persisted run against the four-metric rubric with a single
/// evaluator model, with a bounded retry loop around each request.
#[derive(Clone)]
pub struct Judge {
    pub client: Arc<dyn ChatClient>,
    pub store: RunStore,
    pub language: String,
    pub parallel: usize,
    pub max_retries: u32,
    pub backoff: Duration,
}

/// Structured output expected from the evaluator model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RubricScores {
    pub quality: MetricScore,
    pub correctness: MetricScore,
    pub grammar: MetricScore,
    pub completeness: MetricScore,
}

impl RubricScores {
    /// JSON schema for the structured judge response. Scores are documented
    /// as 0.00-1.00 here and in the rubric text; the original harness said
    /// 0-10 in one place and 0-1 in another, and this implementation
    /// standardizes on 0.00-1.00.
    pub fn schema() -> serde_json::Value {
        let metric = |what: &str| {
            json!({
                "type": "object",
                "properties": {
                    "reasoning": {
                        "type": "string",
                        "description": format!("Brief justification of the {} score.", what)
                    },
                    "score": {
                        "type": "number",
                        "description": format!(
                            "The {} score, between 0.00 and 1.00 inclusive.", what
                        )
                    }
                },
                "required": ["reasoning", "score"]
            })
        };
        json!({
            "type": "object",
            "properties": {
                "quality": metric("quality"),
                "correctness": metric("correctness"),
                "grammar": metric("grammar"),
                "completeness": metric("completeness"),
            },
            "required": METRIC_NAMES,
        })
    }

    /// Reject scores the model produced outside the documented scale, and
    /// empty reasoning. Model output is not trusted verbatim.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, metric) in [
            ("quality", &self.quality),
            ("correctness", &self.correctness),
            ("grammar", &self.grammar),
            ("completeness", &self.completeness),
        ] {
            if metric.reasoning.trim().is_empty() {
                anyhow::bail!("judge returned empty reasoning for {}", name);
            }
            if !metric.score.is_finite() || !(0.0..=1.0).contains(&metric.score) {
                anyhow::bail!(
                    "judge returned out-of-scale {} score {} (expected 0.00-1.00)",
                    name,
                    metric.score
                );
            }
        }
        Ok(())
    }
}

pub fn rubric_instruction(language: &str) -> String {
    format!(
        "You are grading the transcript of a chat between a customer (\"buyer\") and \
         a shop assistant (\"store\"). The conversation was expected to be held \
         entirely in {language}.\n\n\
         Score the transcript on four independent metrics. Do not let one metric \
         influence another. Every score is a number between 0.00 and 1.00 inclusive.\n\n\
         - quality: how natural, coherent and appropriate the exchange is.\n\
         - correctness: whether the store's statements are internally consistent and \
         the buyer's requests are answered accurately.\n\
         - grammar: spelling, morphology and syntax of the {language} used. Text \
         written in another language must be penalized heavily here, regardless of \
         how good it is otherwise.\n\
         - completeness: whether the buyer's goal was fully addressed by the end of \
         the conversation.\n\n\
         For each metric give a brief reasoning and the score."
    )
}

impl Judge {
    /// Judge every completed run in the store. Bounded concurrency with
    /// submission-order admission; one run's failure leaves siblings alone.
    /// Already-judged ids are skipped unless `refresh` is set.
    pub async fn judge_all(&self, refresh: bool) -> anyhow::Result<Vec<BatchRow>> {
        let runs = self.store.load_runs()?;
        let pending: Vec<SimulationRun> = runs
            .into_iter()
            .filter(|r| refresh || !self.store.judgement_exists(&r.id))
            .collect();

        tracing::info!(
            pending = pending.len(),
            parallel = self.parallel,
            "starting judge batch"
        );

        let sem = Arc::new(Semaphore::new(self.parallel.max(1)));
        let mut handles = Vec::new();
        for run in pending {
            let permit = sem.clone().acquire_owned().await?;
            let this = self.clone();
            let h = tokio::spawn(async move {
                let _permit = permit;
                let started = Instant::now();
                let result = this.judge_run(&run).await;
                let (status, message) = match result {
                    Ok(_) => (RunStatus::Completed, "ok".to_string()),
                    Err(e) => (RunStatus::Failed, format!("{e:#}")),
                };
                BatchRow {
                    id: run.id,
                    model: run.model_name,
                    goal: run.goal,
                    status,
                    message,
                    duration_ms: started.elapsed().as_millis() as u64,
                }
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

    /// Score one run. Each attempt issues the identical request; failures
    /// (transport, malformed output, out-of-scale scores) are retried up to
    /// `max_retries` times with a fixed backoff. The judgement is persisted
    /// only on success; exhaustion surfaces the last error to the caller.
    pub async fn judge_run(&self, run: &SimulationRun) -> anyhow::Result<JudgedRun> {
        let max_attempts = self.max_retries as u64 + 1;
        let mut last_err = anyhow::anyhow!("judge made no attempts");

        for attempt in 1..=max_attempts {
            match self.request_scores(run).await {
                Ok(scores) => {
                    let judged = JudgedRun {
                        run: run.clone(),
                        quality: scores.quality,
                        correctness: scores.correctness,
                        grammar: scores.grammar,
                        completeness: scores.completeness,
                    };
                    self.store.save_judgement(&judged)?;
                    return Ok(judged);
                }
                Err(e) => {
                    tracing::warn!(
                        run_id = %run.id,
                        attempt,
                        max_attempts,
                        "judge attempt failed: {e:#}"
                    );
                    last_err = e;
                    if attempt < max_attempts {
                        tokio::time::sleep(self.backoff).await;
                    }
                }
            }
        }
        Err(last_err.context(format!(
            "judging run {} failed after {} attempts",
            run.id, max_attempts
        )))
    }

    async fn request_scores(&self, run: &SimulationRun) -> anyhow::Result<RubricScores> {
        let messages = [
            ChatMessage::system(rubric_instruction(&self.language)),
            ChatMessage::user(serde_json::to_string_pretty(&run.conversation)?),
        ];
        let value = self
            .client
            .chat_structured(&messages, &RubricScores::schema())
            .await?;
        let scores: RubricScores = serde_json::from_value(value)
            .map_err(|e| anyhow::anyhow!("judge output does not match rubric shape: {}", e))?;
        scores.validate()?;
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(score: f64) -> MetricScore {
        MetricScore {
            reasoning: "ok".into(),
            score,
        }
    }

    fn scores() -> RubricScores {
        RubricScores {
            quality: metric(0.8),
            correctness: metric(1.0),
            grammar: metric(0.0),
            completeness: metric(0.5),
        }
    }

    #[test]
    fn schema_requires_all_four_metrics() {
        let schema = RubricScores::schema();
        assert_eq!(
            schema["required"],
            serde_json::json!(["quality", "correctness", "grammar", "completeness"])
        );
        for name in METRIC_NAMES {
            assert_eq!(
                schema["properties"][name]["required"],
                serde_json::json!(["reasoning", "score"])
            );
            let desc = schema["properties"][name]["properties"]["score"]["description"]
                .as_str()
                .unwrap();
            assert!(desc.contains("0.00 and 1.00"));
        }
    }

    #[test]
    fn validate_accepts_scale_bounds() {
        assert!(scores().validate().is_ok());
    }

    #[test]
    fn validate_rejects_out_of_scale_scores() {
        let mut s = scores();
        s.grammar.score = 7.5; // a 0-10 style score must not slip through
        let err = s.validate().unwrap_err();
        assert!(err.to_string().contains("grammar"));

        let mut s = scores();
        s.quality.score = -0.1;
        assert!(s.validate().is_err());

        let mut s = scores();
        s.completeness.score = f64::NAN;
        assert!(s.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_reasoning() {
        let mut s = scores();
        s.correctness.reasoning = "  ".into();
        let err = s.validate().unwrap_err();
        assert!(err.to_string().contains("correctness"));
    }

    #[test]
    fn rubric_pins_scale_language_and_independence() {
        let rubric = rubric_instruction("Catalan");
        assert!(rubric.contains("0.00 and 1.00"));
        assert!(rubric.contains("Catalan"));
        // Wrong-language text is a grammar problem, not a quality one.
        assert!(rubric.contains("penalized heavily"));
        assert!(rubric.contains("independent"));
    }
}
