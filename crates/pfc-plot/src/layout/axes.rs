/// Axis limits with tick generation and data to pixel mapping.
#[derive(Debug, Clone)]
pub struct Axis {
    pub min: f64,
    pub max: f64,
    pub log: bool,
    pub label: String,
    pub tick_positions: Vec<f64>,
    pub tick_labels: Vec<String>,
    pub minor_ticks: Vec<f64>,
}

impl Axis {
    /// Linear axis over exactly `[min, max]` with "nice number" ticks inside.
    pub fn linear(min: f64, max: f64, target_ticks: usize) -> Self {
        let (min, max) = widen_degenerate(min, max);
        let step = nice_step((max - min) / (target_ticks.max(2) - 1) as f64);
        let eps = step * 1e-6;

        let mut ticks = Vec::new();
        let mut labels = Vec::new();
        let mut k = (min / step - 1e-9).ceil() as i64;
        loop {
            let v = k as f64 * step;
            if v > max + eps {
                break;
            }
            ticks.push(v);
            labels.push(format_tick(v, step));
            k += 1;
        }

        let minor_step = step / 5.0;
        let mut minor = Vec::new();
        let mut k = (min / minor_step - 1e-9).ceil() as i64;
        loop {
            let v = k as f64 * minor_step;
            if v > max + eps {
                break;
            }
            if k % 5 != 0 {
                minor.push(v);
            }
            k += 1;
        }

        Self {
            min,
            max,
            log: false,
            label: String::new(),
            tick_positions: ticks,
            tick_labels: labels,
            minor_ticks: minor,
        }
    }

    /// Linear axis padded outwards to tick boundaries.
    pub fn auto_linear(data_min: f64, data_max: f64, target_ticks: usize) -> Self {
        let (lo, hi) = widen_degenerate(data_min, data_max);
        let step = nice_step((hi - lo) / (target_ticks.max(2) - 1) as f64);
        Self::linear((lo / step).floor() * step, (hi / step).ceil() * step, target_ticks)
    }

    /// Logarithmic axis over exactly `[min, max]`, decade ticks inside.
    pub fn log(min: f64, max: f64) -> Self {
        let min = if min > 0.0 { min } else { max.max(1e-20) * 1e-4 };
        let max = max.max(min * 10.0);
        let lo_exp = min.log10().floor() as i32;
        let hi_exp = max.log10().ceil() as i32;

        let mut ticks = Vec::new();
        let mut labels = Vec::new();
        let mut minor = Vec::new();
        for exp in lo_exp..=hi_exp {
            let v = 10.0_f64.powi(exp);
            if v >= min * (1.0 - 1e-9) && v <= max * (1.0 + 1e-9) {
                ticks.push(v);
                labels.push(format!("10^{{{exp}}}"));
            }
            for m in 2..=9 {
                let mv = m as f64 * v;
                if mv > min && mv < max {
                    minor.push(mv);
                }
            }
        }

        Self {
            min,
            max,
            log: true,
            label: String::new(),
            tick_positions: ticks,
            tick_labels: labels,
            minor_ticks: minor,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn data_to_pixel(&self, value: f64, px_min: f64, px_max: f64) -> f64 {
        let frac = if self.log {
            let v = value.max(1e-300).ln();
            (v - self.min.ln()) / (self.max.ln() - self.min.ln())
        } else {
            (value - self.min) / (self.max - self.min)
        };
        px_min + frac * (px_max - px_min)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

fn widen_degenerate(min: f64, max: f64) -> (f64, f64) {
    if !(max - min).is_finite() || (max - min).abs() < 1e-15 {
        let pad = if min.abs() > 1e-12 { min.abs() * 0.1 } else { 1.0 };
        (min - pad, max + pad)
    } else if max < min {
        (max, min)
    } else {
        (min, max)
    }
}

fn nice_step(rough: f64) -> f64 {
    let exp = rough.abs().log10().floor();
    let frac = rough / 10.0_f64.powf(exp);
    let nice_frac = if frac <= 1.5 {
        1.0
    } else if frac <= 3.5 {
        2.0
    } else if frac <= 7.5 {
        5.0
    } else {
        10.0
    };
    nice_frac * 10.0_f64.powf(exp)
}

fn format_tick(value: f64, step: f64) -> String {
    let decimals = if step >= 1.0 { 0 } else { (-step.log10().floor()) as usize };
    // avoid "-0"
    let v = if value.abs() < step * 1e-6 { 0.0 } else { value };
    format!("{v:.decimals$}")
}
