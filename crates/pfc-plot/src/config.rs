use serde::Deserialize;

/// Plot styling shared by every analysis.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlotConfig {
    pub figure: FigureConfig,
    pub font: FontConfig,
    pub axes: AxesConfig,
    pub grid: GridConfig,
    pub experiment: ExperimentConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FigureConfig {
    pub width: f64,
    pub height: f64,
}

impl Default for FigureConfig {
    fn default() -> Self {
        // 700x700 pixel canvases at 72 dpi
        Self { width: 504.0, height: 504.0 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FontConfig {
    pub size: f64,
    pub label_size: f64,
    pub tick_size: f64,
}

impl Default for FontConfig {
    fn default() -> Self {
        Self { size: 10.0, label_size: 12.0, tick_size: 9.0 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AxesConfig {
    pub tick_length: f64,
    pub minor_tick_length: f64,
    pub show_top_ticks: bool,
    pub show_right_ticks: bool,
}

impl Default for AxesConfig {
    fn default() -> Self {
        Self { tick_length: 6.0, minor_tick_length: 3.0, show_top_ticks: true, show_right_ticks: true }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub show: bool,
    pub alpha: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self { show: true, alpha: 0.35 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub name: String,
    pub status: String,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self { name: "CMS".into(), status: "Simulation".into() }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Svg,
    Png,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Svg => "svg",
            OutputFormat::Png => "png",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub dpi: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { format: OutputFormat::Svg, dpi: 144 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: PlotConfig =
            serde_json::from_str(r#"{"output": {"format": "png"}, "experiment": {"status": ""}}"#)
                .unwrap();
        assert_eq!(cfg.output.format, OutputFormat::Png);
        assert_eq!(cfg.output.dpi, 144);
        assert_eq!(cfg.experiment.name, "CMS");
        assert!(cfg.experiment.status.is_empty());
        assert_eq!(cfg.output.format.extension(), "png");
    }
}
