//! Tabular aggregation over judged runs: per-model metric averages,
//! latency, CSV tables and a JSON summary. Charting is out of scope.

use crate::judge::METRIC_NAMES;
use crate::model::JudgedRun;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// One judged run flattened to scalar columns.
#[derive(Debug, Clone, Serialize)]
pub struct FlatJudgement {
    pub id: String,
    pub model: String,
    pub goal: String,
    pub quality: f64,
    pub correctness: f64,
    pub grammar: f64,
    pub completeness: f64,
    pub overall: f64,
    pub conversation_turns: usize,
    pub conversation_tokens: usize,
    pub latency_seconds: Option<f64>,
    pub latency_seconds_per_message: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelAggregate {
    pub model: String,
    pub quality_avg: f64,
    pub correctness_avg: f64,
    pub grammar_avg: f64,
    pub completeness_avg: f64,
    pub overall_avg: f64,
    pub latency_seconds_avg: Option<f64>,
    pub latency_seconds_per_message_avg: Option<f64>,
    pub judgement_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricLeader {
    pub model: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LatencyLeader {
    pub model: String,
    pub seconds_per_message: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisSummary {
    pub top_model: String,
    pub top_model_overall_avg: f64,
    pub judgement_counts: BTreeMap<String, usize>,
    pub metric_leaders: BTreeMap<String, MetricLeader>,
    pub latency_leader: Option<LatencyLeader>,
}

pub fn flatten(judged: &[JudgedRun]) -> Vec<FlatJudgement> {
    judged
        .iter()
        .map(|j| {
            let scores = [
                j.quality.score,
                j.correctness.score,
                j.grammar.score,
                j.completeness.score,
            ];
            let overall = scores.iter().sum::<f64>() / scores.len() as f64;

            let turns = j.run.conversation.len();
            let tokens: usize = j
                .run
                .conversation
                .iter()
                .map(|m| m.message.split_whitespace().count())
                .sum();

            let latency_seconds = if j.run.end_time >= j.run.start_time {
                Some((j.run.end_time - j.run.start_time) as f64 / 1000.0)
            } else {
                None
            };
            let latency_seconds_per_message = match (latency_seconds, turns) {
                (Some(lat), t) if t > 0 => Some(lat / t as f64),
                _ => None,
            };

            FlatJudgement {
                id: j.run.id.clone(),
                model: j.run.model_name.clone(),
                goal: j.run.goal.clone(),
                quality: j.quality.score,
                correctness: j.correctness.score,
                grammar: j.grammar.score,
                completeness: j.completeness.score,
                overall,
                conversation_turns: turns,
                conversation_tokens: tokens,
                latency_seconds,
                latency_seconds_per_message,
            }
        })
        .collect()
}

/// Group by model and average every column; sorted by overall average,
/// best first.
pub fn aggregate_by_model(flat: &[FlatJudgement]) -> Vec<ModelAggregate> {
    let mut groups: BTreeMap<&str, Vec<&FlatJudgement>> = BTreeMap::new();
    for f in flat {
        groups.entry(&f.model).or_default().push(f);
    }

    let mut out: Vec<ModelAggregate> = groups
        .into_iter()
        .map(|(model, rows)| ModelAggregate {
            model: model.to_string(),
            quality_avg: mean(rows.iter().map(|r| r.quality)),
            correctness_avg: mean(rows.iter().map(|r| r.correctness)),
            grammar_avg: mean(rows.iter().map(|r| r.grammar)),
            completeness_avg: mean(rows.iter().map(|r| r.completeness)),
            overall_avg: mean(rows.iter().map(|r| r.overall)),
            latency_seconds_avg: mean_opt(rows.iter().map(|r| r.latency_seconds)),
            latency_seconds_per_message_avg: mean_opt(
                rows.iter().map(|r| r.latency_seconds_per_message),
            ),
            judgement_count: rows.len(),
        })
        .collect();

    out.sort_by(|a, b| {
        b.overall_avg
            .partial_cmp(&a.overall_avg)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    out
}

/// Drop models whose four metric averages sum to zero (nothing was ever
/// scored for them); it is an error if nothing survives.
pub fn filter_scored_models(per_model: Vec<ModelAggregate>) -> anyhow::Result<Vec<ModelAggregate>> {
    let filtered: Vec<ModelAggregate> = per_model
        .into_iter()
        .filter(|m| {
            m.quality_avg + m.correctness_avg + m.grammar_avg + m.completeness_avg > 0.0
        })
        .collect();
    if filtered.is_empty() {
        anyhow::bail!("all models were filtered out due to missing scores");
    }
    Ok(filtered)
}

pub fn build_summary(per_model: &[ModelAggregate]) -> anyhow::Result<AnalysisSummary> {
    let top = per_model
        .first()
        .ok_or_else(|| anyhow::anyhow!("no scored models to summarize"))?;

    let mut metric_leaders = BTreeMap::new();
    let pickers: [(&str, fn(&ModelAggregate) -> f64); 4] = [
        (METRIC_NAMES[0], |m| m.quality_avg),
        (METRIC_NAMES[1], |m| m.correctness_avg),
        (METRIC_NAMES[2], |m| m.grammar_avg),
        (METRIC_NAMES[3], |m| m.completeness_avg),
    ];
    for (name, pick) in pickers {
        if let Some(best) = per_model.iter().max_by(|a, b| {
            pick(a)
                .partial_cmp(&pick(b))
                .unwrap_or(std::cmp::Ordering::Equal)
        }) {
            metric_leaders.insert(
                name.to_string(),
                MetricLeader {
                    model: best.model.clone(),
                    score: pick(best),
                },
            );
        }
    }

    let latency_leader = per_model
        .iter()
        .filter_map(|m| {
            m.latency_seconds_per_message_avg
                .map(|lat| (m.model.clone(), lat))
        })
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(model, lat)| LatencyLeader {
            model,
            seconds_per_message: lat,
        });

    Ok(AnalysisSummary {
        top_model: top.model.clone(),
        top_model_overall_avg: top.overall_avg,
        judgement_counts: per_model
            .iter()
            .map(|m| (m.model.clone(), m.judgement_count))
            .collect(),
        metric_leaders,
        latency_leader,
    })
}

pub fn write_tables(
    out_dir: &Path,
    flat: &[FlatJudgement],
    per_model: &[ModelAggregate],
) -> anyhow::Result<()> {
    std::fs::create_dir_all(out_dir)?;

    let mut rows: Vec<&FlatJudgement> = flat.iter().collect();
    rows.sort_by(|a, b| (&a.model, &a.id).cmp(&(&b.model, &b.id)));

    let mut csv = String::from(
        "id,model,goal,quality,correctness,grammar,completeness,overall,\
         conversation_turns,conversation_tokens,latency_seconds,latency_seconds_per_message\n",
    );
    for r in rows {
        csv.push_str(&format!(
            "{},{},{},{},{},{},{},{},{},{},{},{}\n",
            csv_field(&r.id),
            csv_field(&r.model),
            csv_field(&r.goal),
            r.quality,
            r.correctness,
            r.grammar,
            r.completeness,
            r.overall,
            r.conversation_turns,
            r.conversation_tokens,
            opt_field(r.latency_seconds),
            opt_field(r.latency_seconds_per_message),
        ));
    }
    std::fs::write(out_dir.join("judgements_flat.csv"), csv)?;

    let mut csv = String::from(
        "model,quality_avg,correctness_avg,grammar_avg,completeness_avg,overall_avg,\
         latency_seconds_avg,latency_seconds_per_message_avg,judgement_count\n",
    );
    for m in per_model {
        csv.push_str(&format!(
            "{},{},{},{},{},{},{},{},{}\n",
            csv_field(&m.model),
            m.quality_avg,
            m.correctness_avg,
            m.grammar_avg,
            m.completeness_avg,
            m.overall_avg,
            opt_field(m.latency_seconds_avg),
            opt_field(m.latency_seconds_per_message_avg),
            m.judgement_count,
        ));
    }
    std::fs::write(out_dir.join("metrics_by_model.csv"), csv)?;
    Ok(())
}

pub fn write_summary(out_dir: &Path, summary: &AnalysisSummary) -> anyhow::Result<()> {
    std::fs::create_dir_all(out_dir)?;
    let json = serde_json::to_string_pretty(summary)?;
    std::fs::write(out_dir.join("summary.json"), json)?;
    Ok(())
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (mut sum, mut n) = (0.0, 0usize);
    for v in values {
        sum += v;
        n += 1;
    }
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

fn mean_opt(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let (mut sum, mut n) = (0.0, 0usize);
    for v in values.flatten() {
        sum += v;
        n += 1;
    }
    if n == 0 {
        None
    } else {
        Some(sum / n as f64)
    }
}

fn csv_field(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn opt_field(v: Option<f64>) -> String {
    v.map(|v| v.to_string()).unwrap_or_default()
}
