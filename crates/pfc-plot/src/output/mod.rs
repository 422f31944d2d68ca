use std::path::{Path, PathBuf};

use crate::config::{OutputFormat, PlotConfig};

#[cfg(feature = "png")]
pub mod png;
pub mod svg;

/// Write `svg` to `dir/<stem>.<ext>` in the configured format.
///
/// Returns the written path. PNG output needs the `png` feature.
pub fn save(svg: &str, dir: &Path, stem: &str, config: &PlotConfig) -> crate::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let format = config.output.format;
    let path = dir.join(format!("{stem}.{}", format.extension()));
    match format {
        OutputFormat::Svg => svg::save_svg(svg, &path)?,
        #[cfg(feature = "png")]
        OutputFormat::Png => std::fs::write(&path, png::svg_to_png(svg, config.output.dpi)?)?,
        #[cfg(not(feature = "png"))]
        OutputFormat::Png => {
            return Err(crate::RenderError::Config(
                "PNG output requires building pfc-plot with the `png` feature".into(),
            ));
        }
    }
    tracing::debug!(path = %path.display(), "plot written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_dir(tag: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir()
            .join(format!("pfc_plot_{tag}_{}_{}", std::process::id(), nanos));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn save_svg_creates_directory() {
        let dir = tmp_dir("svg");
        let path = save("<svg/>", &dir.join("nested"), "p", &PlotConfig::default()).unwrap();
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("svg"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "<svg/>");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[cfg(not(feature = "png"))]
    #[test]
    fn png_without_feature_is_config_error() {
        let mut config = PlotConfig::default();
        config.output.format = OutputFormat::Png;
        let err = save("<svg/>", &tmp_dir("png"), "p", &config).unwrap_err();
        assert!(matches!(err, crate::RenderError::Config(_)));
    }
}
