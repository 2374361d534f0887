use crate::utils::error::{PartsError, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

pub const DEFAULT_DPI: u32 = 300;

/// Resolution plotters writes SVG coordinates in.
const SVG_BASE_DPI: f64 = 96.0;

/// Output path without extension; `pdftoppm` appends `.png` itself.
pub fn png_stem(infile: &Path, outfile: Option<&Path>) -> PathBuf {
    outfile.unwrap_or(infile).with_extension("")
}

fn run(mut cmd: Command) -> Result<()> {
    let shown = format!("{:?}", cmd);
    tracing::debug!("Running {}", shown);

    let status = cmd.status()?;
    if !status.success() {
        return Err(PartsError::CommandFailed {
            command: shown,
            status: status.code().unwrap_or(-1),
        });
    }
    Ok(())
}

/// Rasterize a PDF or SVG file to PNG and return the PNG path.
pub fn convert_to_png(infile: &Path, outfile: Option<&Path>, dpi: u32) -> Result<PathBuf> {
    let stem = png_stem(infile, outfile);
    let png = stem.with_extension("png");
    let extension = infile
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "pdf" => {
            let mut cmd = Command::new("pdftoppm");
            cmd.args(["-cropbox", "-r", &dpi.to_string(), "-png", "-singlefile"])
                .arg(infile)
                .arg(&stem);
            run(cmd)?;
        }
        "svg" => {
            let zoom = dpi as f64 / SVG_BASE_DPI;
            let mut cmd = Command::new("rsvg-convert");
            cmd.args(["--format", "png", "--zoom", &format!("{:.4}", zoom), "--output"])
                .arg(&png)
                .arg(infile);
            run(cmd)?;
        }
        other => {
            return Err(PartsError::Plot {
                message: format!(
                    "cannot convert '{}' to PNG: unsupported extension '{}'",
                    infile.display(),
                    other
                ),
            })
        }
    }

    tracing::info!("Written {}", png.display());
    Ok(png)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_png_stem() {
        assert_eq!(
            png_stem(Path::new("plots/amp.pdf"), None),
            PathBuf::from("plots/amp")
        );
        assert_eq!(
            png_stem(Path::new("plots/amp.pdf"), Some(Path::new("out/x.png"))),
            PathBuf::from("out/x")
        );
    }

    #[test]
    fn test_unsupported_extension() {
        let err = convert_to_png(Path::new("plot.eps"), None, DEFAULT_DPI).unwrap_err();
        assert!(matches!(err, PartsError::Plot { .. }));
    }

    #[test]
    fn test_failed_command_reports_command_line() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "exit 4"]);
        match run(cmd).unwrap_err() {
            PartsError::CommandFailed { command, status } => {
                assert!(command.contains("exit 4"));
                assert_eq!(status, 4);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
