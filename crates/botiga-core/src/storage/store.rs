use crate::model::{JudgedRun, SimulationRun};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// File-backed store: one JSON object per identifier, write-once.
///
/// Layout under the root: `runs/` for completed simulations, `runs/failed/`
/// for partial transcripts kept as diagnostics, `judgements/` for judged
/// runs, `analysis/` for aggregate output.
#[derive(Clone)]
pub struct RunStore {
    root: PathBuf,
}

impl RunStore {
    pub fn open(root: &Path) -> anyhow::Result<Self> {
        let store = Self {
            root: root.to_path_buf(),
        };
        std::fs::create_dir_all(store.runs_dir())?;
        std::fs::create_dir_all(store.failed_dir())?;
        std::fs::create_dir_all(store.judgements_dir())?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.root.join("runs")
    }

    pub fn failed_dir(&self) -> PathBuf {
        self.root.join("runs").join("failed")
    }

    pub fn judgements_dir(&self) -> PathBuf {
        self.root.join("judgements")
    }

    pub fn analysis_dir(&self) -> PathBuf {
        self.root.join("analysis")
    }

    pub fn save_run(&self, run: &SimulationRun) -> anyhow::Result<()> {
        write_json(&self.runs_dir().join(format!("{}.json", run.id)), run)
    }

    /// Persist a partial transcript after a mid-loop failure so the attempt
    /// is never silently lost. Kept outside `runs/` so the judge does not
    /// pick it up.
    pub fn save_failed_run(&self, run: &SimulationRun) -> anyhow::Result<()> {
        write_json(&self.failed_dir().join(format!("{}.json", run.id)), run)
    }

    pub fn load_runs(&self) -> anyhow::Result<Vec<SimulationRun>> {
        read_dir_json(&self.runs_dir())
    }

    pub fn save_judgement(&self, judged: &JudgedRun) -> anyhow::Result<()> {
        write_json(
            &self.judgements_dir().join(format!("{}.json", judged.run.id)),
            judged,
        )
    }

    pub fn judgement_exists(&self, id: &str) -> bool {
        self.judgements_dir().join(format!("{}.json", id)).exists()
    }

    pub fn load_judgements(&self) -> anyhow::Result<Vec<JudgedRun>> {
        read_dir_json(&self.judgements_dir())
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)
        .map_err(|e| anyhow::anyhow!("failed to write {}: {}", path.display(), e))?;
    Ok(())
}

fn read_dir_json<T: DeserializeOwned>(dir: &Path) -> anyhow::Result<Vec<T>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {}", dir.display(), e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut out = Vec::with_capacity(paths.len());
    for path in paths {
        let raw = std::fs::read_to_string(&path)?;
        let value: T = serde_json::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("invalid record {}: {}", path.display(), e))?;
        out.push(value);
    }
    Ok(out)
}
