//! Multi-output regression trees grown best-first on Newton gains.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Quantile cut candidates of one input.
#[derive(Debug, Clone)]
pub struct CutGrid {
    edges: Vec<f64>,
}

impl CutGrid {
    /// Up to `n_cuts - 1` distinct quantile edges of `values`.
    pub fn quantiles(values: &[f64], n_cuts: usize) -> Self {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        sorted.sort_by(f64::total_cmp);
        let mut edges = Vec::new();
        if sorted.len() > 1 && n_cuts > 1 {
            for k in 1..n_cuts {
                let idx = (k * sorted.len()) / n_cuts;
                let edge = sorted[idx.min(sorted.len() - 1)];
                if edge > sorted[0] && edges.last().is_none_or(|&last| edge > last) {
                    edges.push(edge);
                }
            }
        }
        Self { edges }
    }

    pub fn n_bins(&self) -> usize {
        self.edges.len() + 1
    }

    /// Bin `b` such that `v < edges[j]` exactly when `b <= j`.
    pub fn bin_of(&self, v: f64) -> usize {
        self.edges.partition_point(|&e| e <= v)
    }

    pub fn cut(&self, j: usize) -> f64 {
        self.edges[j]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Node {
    /// Events with `x[var] < cut` go to `left`.
    Split { var: usize, cut: f64, left: usize, right: usize },
    Leaf { response: Vec<f64> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    /// Response vector of the leaf `x` falls into.
    pub fn response(&self, x: &[f64]) -> &[f64] {
        let mut i = 0;
        loop {
            match &self.nodes[i] {
                Node::Split { var, cut, left, right } => {
                    i = if x[*var] < *cut { *left } else { *right };
                }
                Node::Leaf { response } => return response,
            }
        }
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| matches!(n, Node::Leaf { .. })).count()
    }
}

/// Sum of raw responses over trees, starting from per-output constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forest {
    pub initial: Vec<f64>,
    pub trees: Vec<Tree>,
}

impl Forest {
    pub fn new(initial: Vec<f64>) -> Self {
        Self { initial, trees: Vec::new() }
    }

    pub fn predict_raw(&self, x: &[f64]) -> Vec<f64> {
        let mut out = self.initial.clone();
        for tree in &self.trees {
            for (o, r) in out.iter_mut().zip(tree.response(x)) {
                *o += r;
            }
        }
        out
    }
}

/// Tree growth settings.
#[derive(Debug, Clone, Copy)]
pub struct GrowConfig {
    pub max_leaves: usize,
    pub min_events: usize,
    pub min_gain: f64,
    pub shrinkage: f64,
}

/// Per-event first and second derivatives of the loss, `n_out` per event.
pub struct Derivatives<'a> {
    pub n_out: usize,
    pub grad: &'a [f64],
    pub hess: &'a [f64],
}

#[derive(Debug, Clone)]
struct SplitChoice {
    gain: f64,
    var: usize,
    bin: usize,
}

struct OpenLeaf {
    node: usize,
    events: Vec<usize>,
    g: Vec<f64>,
    h: Vec<f64>,
    split: Option<SplitChoice>,
}

fn newton_score(g: &[f64], h: &[f64]) -> f64 {
    g.iter().zip(h).map(|(g, h)| if *h > 0.0 { g * g / h } else { 0.0 }).sum::<f64>()
}

fn sums(events: &[usize], d: &Derivatives<'_>) -> (Vec<f64>, Vec<f64>) {
    let mut g = vec![0.0; d.n_out];
    let mut h = vec![0.0; d.n_out];
    for &i in events {
        for k in 0..d.n_out {
            g[k] += d.grad[i * d.n_out + k];
            h[k] += d.hess[i * d.n_out + k];
        }
    }
    (g, h)
}

/// Binned inputs, shared by all trees of a training.
pub struct BinnedInputs {
    grids: Vec<CutGrid>,
    /// `bins[v][i]`: bin of input `v` for event `i`
    bins: Vec<Vec<u16>>,
}

impl BinnedInputs {
    pub fn new(features: &[Vec<f64>], n_cuts: usize) -> Self {
        let n_cuts = n_cuts.clamp(2, u16::MAX as usize);
        let grids: Vec<CutGrid> =
            features.par_iter().map(|f| CutGrid::quantiles(f, n_cuts)).collect();
        let bins = features
            .par_iter()
            .zip(&grids)
            .map(|(f, grid)| f.iter().map(|&v| grid.bin_of(v) as u16).collect())
            .collect();
        Self { grids, bins }
    }

    fn best_split(
        &self,
        events: &[usize],
        g_tot: &[f64],
        h_tot: &[f64],
        d: &Derivatives<'_>,
        cfg: &GrowConfig,
    ) -> Option<SplitChoice> {
        if events.len() < 2 * cfg.min_events {
            return None;
        }
        let parent = newton_score(g_tot, h_tot);
        let k_out = d.n_out;

        (0..self.grids.len())
            .into_par_iter()
            .filter_map(|var| {
                let nb = self.grids[var].n_bins();
                if nb < 2 {
                    return None;
                }
                let mut count = vec![0usize; nb];
                let mut g = vec![0.0; nb * k_out];
                let mut h = vec![0.0; nb * k_out];
                for &i in events {
                    let b = self.bins[var][i] as usize;
                    count[b] += 1;
                    for k in 0..k_out {
                        g[b * k_out + k] += d.grad[i * k_out + k];
                        h[b * k_out + k] += d.hess[i * k_out + k];
                    }
                }

                let mut best: Option<SplitChoice> = None;
                let mut n_left = 0;
                let mut g_left = vec![0.0; k_out];
                let mut h_left = vec![0.0; k_out];
                let mut g_right = vec![0.0; k_out];
                let mut h_right = vec![0.0; k_out];
                for b in 0..nb - 1 {
                    n_left += count[b];
                    for k in 0..k_out {
                        g_left[k] += g[b * k_out + k];
                        h_left[k] += h[b * k_out + k];
                        g_right[k] = g_tot[k] - g_left[k];
                        h_right[k] = h_tot[k] - h_left[k];
                    }
                    let n_right = events.len() - n_left;
                    if n_left < cfg.min_events || n_right < cfg.min_events {
                        continue;
                    }
                    let gain = 0.5
                        * (newton_score(&g_left, &h_left) + newton_score(&g_right, &h_right) - parent);
                    if gain >= cfg.min_gain && best.as_ref().is_none_or(|s| gain > s.gain) {
                        best = Some(SplitChoice { gain, var, bin: b });
                    }
                }
                best
            })
            .max_by(|a, b| a.gain.total_cmp(&b.gain).then(b.var.cmp(&a.var)))
    }

    /// Grow one tree, or `None` when the root has no acceptable split.
    pub fn grow(&self, d: &Derivatives<'_>, cfg: &GrowConfig) -> Option<Tree> {
        let n_events = d.grad.len() / d.n_out.max(1);
        let events: Vec<usize> = (0..n_events).collect();
        let (g, h) = sums(&events, d);
        let split = self.best_split(&events, &g, &h, d, cfg)?;

        let mut nodes = vec![Node::Leaf { response: Vec::new() }];
        let mut open = vec![OpenLeaf { node: 0, events, g, h, split: Some(split) }];

        while open.len() < cfg.max_leaves {
            let Some(pick) = open
                .iter()
                .enumerate()
                .filter_map(|(i, l)| l.split.as_ref().map(|s| (i, s.gain)))
                .max_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(i, _)| i)
            else {
                break;
            };
            let leaf = open.swap_remove(pick);
            let Some(split) = leaf.split else { break };

            let bins = &self.bins[split.var];
            let (left_ev, right_ev): (Vec<usize>, Vec<usize>) =
                leaf.events.iter().partition(|&&i| bins[i] as usize <= split.bin);

            let left = nodes.len();
            nodes.push(Node::Leaf { response: Vec::new() });
            nodes.push(Node::Leaf { response: Vec::new() });
            nodes[leaf.node] = Node::Split {
                var: split.var,
                cut: self.grids[split.var].cut(split.bin),
                left,
                right: left + 1,
            };

            for (node, ev) in [(left, left_ev), (left + 1, right_ev)] {
                let (g, h) = sums(&ev, d);
                let split = self.best_split(&ev, &g, &h, d, cfg);
                open.push(OpenLeaf { node, events: ev, g, h, split });
            }
        }

        for leaf in open {
            let response = leaf
                .g
                .iter()
                .zip(&leaf.h)
                .map(|(g, h)| if *h > 0.0 { -cfg.shrinkage * g / h } else { 0.0 })
                .collect();
            nodes[leaf.node] = Node::Leaf { response };
        }
        Some(Tree { nodes })
    }
}
