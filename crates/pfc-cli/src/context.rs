//! State shared by every analysis of one invocation.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use pfc_ntuple::{EventTable, InputNtuple, discover_inputs, friend_path, read_table};
use pfc_plot::PlotConfig;

use crate::cache::{Cache, fingerprint};
use crate::config::CalibConfig;

pub struct RunContext {
    pub config: CalibConfig,
    pub cache: Cache,
}

impl RunContext {
    pub fn new(config: CalibConfig, read_cache: bool) -> Self {
        let cache = Cache::new(config.output_dir.join("cache"), read_cache);
        Self { config, cache }
    }

    pub fn output_dir(&self) -> &Path {
        &self.config.output_dir
    }

    pub fn plot_config(&self) -> &PlotConfig {
        &self.config.plot
    }

    /// `<output>/plots_<analysis>`
    pub fn plot_dir(&self, analysis: &str) -> PathBuf {
        self.config.output_dir.join(format!("plots_{analysis}"))
    }

    pub fn friend_path(&self, ntuple: &InputNtuple) -> PathBuf {
        friend_path(&self.config.output_dir, &ntuple.name)
    }

    /// Input ntuples; an empty input directory is an error.
    pub fn inputs(&self) -> Result<Vec<InputNtuple>> {
        let dir = &self.config.input_dir;
        let inputs = discover_inputs(dir)
            .with_context(|| format!("failed to list input directory {}", dir.display()))?;
        if inputs.is_empty() {
            anyhow::bail!("no *.root or *.parquet ntuples in {}", dir.display());
        }
        Ok(inputs)
    }

    /// Cache fingerprint of an ntuple, including its friend table when used.
    pub fn fingerprint(&self, ntuple: &InputNtuple, with_friend: bool) -> String {
        if with_friend {
            fingerprint(&[&ntuple.path, &self.friend_path(ntuple)])
        } else {
            fingerprint(&[&ntuple.path])
        }
    }

    /// Read `columns` of an ntuple and join the `friend_columns` of its friend table.
    pub fn load(
        &self,
        ntuple: &InputNtuple,
        columns: &[&str],
        friend_columns: &[String],
    ) -> Result<EventTable> {
        let mut table = read_table(&ntuple.path, &self.config.tree, columns)
            .with_context(|| format!("failed to read {}", ntuple.path.display()))?;
        if !friend_columns.is_empty() {
            let path = self.friend_path(ntuple);
            let cols: Vec<&str> = friend_columns.iter().map(String::as_str).collect();
            let friend = read_table(&path, &self.config.tree, &cols).with_context(|| {
                format!("failed to read friend table {} (run `pfcalib eval` first)", path.display())
            })?;
            table
                .join_friend(friend)
                .with_context(|| format!("friend table {} does not match", path.display()))?;
        }
        tracing::info!(ntuple = %ntuple.name, rows = table.len(), "loaded");
        Ok(table)
    }

    /// Render-and-save helper; returns the written path.
    pub fn save_plot(
        &self,
        svg: pfc_plot::Result<String>,
        dir: &Path,
        stem: &str,
    ) -> Result<PathBuf> {
        let svg = svg.with_context(|| format!("failed to draw {stem}"))?;
        let path = pfc_plot::output::save(&svg, dir, stem, &self.config.plot)
            .with_context(|| format!("failed to save {stem}"))?;
        tracing::info!(plot = %path.display(), "saved");
        Ok(path)
    }
}
