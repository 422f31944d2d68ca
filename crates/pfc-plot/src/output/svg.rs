use std::path::Path;

pub fn save_svg(svg: &str, path: &Path) -> crate::Result<()> {
    std::fs::write(path, svg)?;
    Ok(())
}
