//! ImageMagick operations.

use std::path::Path;

use super::process::{command, run};
use super::{OperationError, Tools, ensure_parent};

/// Width and height of the first frame of an image.
pub async fn image_dimensions(tools: &Tools, path: &Path) -> Result<(u32, u32), OperationError> {
    let mut cmd = command(&tools.magick);
    cmd.arg("identify").args(["-format", "%w %h\n"]).arg(path);
    let stdout = run(&mut cmd).await?;
    parse_dimensions(&stdout).ok_or_else(|| OperationError::Parse {
        program: tools.magick.to_string_lossy().into_owned(),
        what: "image dimensions",
        output: stdout,
    })
}

fn parse_dimensions(stdout: &str) -> Option<(u32, u32)> {
    let mut numbers = stdout.split_whitespace().map(str::parse::<u32>);
    match (numbers.next(), numbers.next()) {
        (Some(Ok(w)), Some(Ok(h))) if w > 0 && h > 0 => Some((w, h)),
        _ => None,
    }
}

/// Liquid-rescale `input` to `rescale_percent` and scale it back to fit
/// `width`x`height`.
pub async fn distort_image(
    tools: &Tools,
    input: &Path,
    output: &Path,
    rescale_percent: f64,
    (width, height): (u32, u32),
) -> Result<(), OperationError> {
    ensure_parent(output).await?;

    let mut cmd = command(&tools.magick);
    cmd.arg(input)
        .args(["-liquid-rescale", &format!("{}%", rescale_percent.floor() as u32)])
        .args(["-resize", &format!("{}x{}", width, height)])
        .arg(output);
    run(&mut cmd).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimensions_use_first_frame() {
        assert_eq!(parse_dimensions("512 512\n"), Some((512, 512)));
        assert_eq!(parse_dimensions("640 480\n640 480\n"), Some((640, 480)));
        assert_eq!(parse_dimensions("640\n"), None);
        assert_eq!(parse_dimensions("0 480"), None);
        assert_eq!(parse_dimensions("wide tall"), None);
    }
}
