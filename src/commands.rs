//! Command lines for the encoder and for converting a finished recording

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::config::Outputs;
use crate::constants::encoder::*;
use crate::launcher::Launcher;
use crate::types::Rect;

/// Wrap `value` in single quotes for `sh`
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Lossless x11grab capture of `rect` (monitor-relative) into `<recording_dir>/temp.mkv`
pub fn encoder_command(
    encoder: &str,
    rect: Rect,
    monitor_origin: (i32, i32),
    fps: u32,
    display: &str,
    recording_dir: &Path,
) -> String {
    let output = recording_dir.join(RAW_RECORDING);
    format!(
        "{encoder} -f x11grab -s {}x{} -r {fps} -i {display}+{},{} -c:v ffvhuff -an -y {}",
        rect.width,
        rect.height,
        rect.x + monitor_origin.0,
        rect.y + monitor_origin.1,
        shell_quote(&output.to_string_lossy()),
    )
}

/// `ew-001.png` and friends
pub fn is_frame_file(name: &str) -> bool {
    name.strip_prefix(FRAME_PREFIX)
        .and_then(|rest| rest.strip_suffix(".png"))
        .is_some_and(|digits| digits.len() == 3 && digits.bytes().all(|b| b.is_ascii_digit()))
}

/// Delete extracted frames in `dir`, returning how many were removed
pub fn remove_frames(dir: &Path) -> Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir).context(format!("Failed to list {}", dir.display()))? {
        let entry = entry?;
        if entry.file_name().to_str().is_some_and(is_frame_file) {
            fs::remove_file(entry.path())
                .context(format!("Failed to remove {}", entry.path().display()))?;
            removed += 1;
        }
    }
    Ok(removed)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionStep {
    pub description: &'static str,
    pub command: String,
    /// File that must exist afterwards
    pub produces: Option<String>,
}

/// Ordered commands turning temp.mkv into the configured outputs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionPlan {
    pub steps: Vec<ConversionStep>,
    /// Frames are extracted, so stale ones are cleared first
    pub extracts_frames: bool,
    /// Frames are intermediate and removed at the end
    pub remove_frames: bool,
}

impl ConversionPlan {
    pub fn new(outputs: &Outputs, fps: u32, encoder: &str) -> Self {
        let movies_from_frames = !outputs.anims_from_temp && (outputs.webm || outputs.mp4);
        let extracts_frames = outputs.pngs || outputs.gif || movies_from_frames;
        let mut steps = Vec::new();

        if extracts_frames {
            steps.push(ConversionStep {
                description: "extract frames",
                command: format!("{encoder} -i {RAW_RECORDING} -r {fps} {FRAME_PATTERN}"),
                produces: None,
            });
        }
        if outputs.gif {
            let delay = (100 / fps.max(1)).max(1);
            steps.push(ConversionStep {
                description: "assemble animated gif",
                command: format!(
                    "{GIF_ASSEMBLER} -delay {delay} -loop 0 {FRAME_PREFIX}[0-9][0-9][0-9].png -layers Optimize {ANIM_BASENAME}.gif"
                ),
                produces: Some(format!("{ANIM_BASENAME}.gif")),
            });
        }

        let movie_input = if outputs.anims_from_temp {
            format!("-i {RAW_RECORDING}")
        } else {
            format!("-framerate {fps} -i {FRAME_PATTERN}")
        };
        if outputs.webm {
            steps.push(ConversionStep {
                description: "encode webm",
                command: format!("{encoder} {movie_input} -c:v libvpx -b:v 1M -an -y {ANIM_BASENAME}.webm"),
                produces: Some(format!("{ANIM_BASENAME}.webm")),
            });
        }
        if outputs.mp4 {
            steps.push(ConversionStep {
                description: "encode mp4",
                command: format!(
                    "{encoder} {movie_input} -c:v libx264 -pix_fmt yuv420p -an -y {ANIM_BASENAME}.mp4"
                ),
                produces: Some(format!("{ANIM_BASENAME}.mp4")),
            });
        }

        Self {
            steps,
            extracts_frames,
            remove_frames: extracts_frames && !outputs.pngs,
        }
    }

    /// Run every step in `dir`, which must hold the raw recording
    pub fn run(&self, dir: &Path, launcher: &mut dyn Launcher) -> Result<()> {
        let raw = dir.join(RAW_RECORDING);
        if !raw.is_file() {
            bail!("{} not found, so nothing can be generated from it", raw.display());
        }
        if self.extracts_frames {
            let stale = remove_frames(dir)?;
            if stale > 0 {
                info!(count = stale, "Removed frames from an earlier conversion");
            }
        }

        for step in &self.steps {
            info!(step = step.description, "Conversion step");
            launcher
                .run_to_completion(&step.command, dir)
                .context(format!("Conversion step '{}' failed", step.description))?;
            if let Some(produced) = &step.produces
                && !dir.join(produced).is_file()
            {
                warn!(file = %produced, step = step.description, "Conversion step did not produce its output");
            }
        }

        if self.remove_frames {
            let removed = remove_frames(dir)?;
            info!(count = removed, "Removed intermediate frames");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::tests::RecordingLauncher;
    use std::path::PathBuf;

    fn outputs(anims_from_temp: bool, gif: bool, pngs: bool, webm: bool, mp4: bool) -> Outputs {
        Outputs { anims_from_temp, gif, pngs, webm, mp4 }
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("regioncast-convert-{}-{}", std::process::id(), name));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_encoder_command_template() {
        let command = encoder_command(
            "/usr/bin/ffmpeg",
            Rect::new(10, 20, 640, 360),
            (1920, 0),
            8,
            ":0.0",
            Path::new("/home/me/regioncast"),
        );
        assert_eq!(
            command,
            "/usr/bin/ffmpeg -f x11grab -s 640x360 -r 8 -i :0.0+1930,20 -c:v ffvhuff -an -y '/home/me/regioncast/temp.mkv'"
        );
    }

    #[test]
    fn test_shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote("/plain/path"), "'/plain/path'");
    }

    #[test]
    fn test_is_frame_file() {
        assert!(is_frame_file("ew-001.png"));
        assert!(is_frame_file("ew-999.png"));
        assert!(!is_frame_file("ew-1000.png"));
        assert!(!is_frame_file("ew-01a.png"));
        assert!(!is_frame_file("anim.gif"));
        assert!(!is_frame_file("ew-001.jpg"));
    }

    #[test]
    fn test_default_outputs_make_gif_and_drop_frames() {
        let plan = ConversionPlan::new(&Outputs::default(), 8, "ffmpeg");
        let descriptions: Vec<_> = plan.steps.iter().map(|s| s.description).collect();
        assert_eq!(descriptions, ["extract frames", "assemble animated gif"]);
        assert_eq!(plan.steps[0].command, "ffmpeg -i temp.mkv -r 8 ew-%03d.png");
        assert_eq!(
            plan.steps[1].command,
            "convert -delay 12 -loop 0 ew-[0-9][0-9][0-9].png -layers Optimize anim.gif"
        );
        assert!(plan.remove_frames);
    }

    #[test]
    fn test_movies_from_temp_skip_frames() {
        let plan = ConversionPlan::new(&outputs(true, false, false, true, true), 10, "ffmpeg");
        assert!(!plan.extracts_frames);
        assert!(!plan.remove_frames);
        assert_eq!(plan.steps.len(), 2);
        assert!(plan.steps[0].command.starts_with("ffmpeg -i temp.mkv -c:v libvpx"));
        assert!(plan.steps[1].command.contains("-c:v libx264 -pix_fmt yuv420p"));
    }

    #[test]
    fn test_movies_from_frames_extract_first() {
        let plan = ConversionPlan::new(&outputs(false, false, false, false, true), 5, "ffmpeg");
        assert!(plan.extracts_frames);
        assert_eq!(plan.steps[0].description, "extract frames");
        assert_eq!(
            plan.steps[1].command,
            "ffmpeg -framerate 5 -i ew-%03d.png -c:v libx264 -pix_fmt yuv420p -an -y anim.mp4"
        );
    }

    #[test]
    fn test_pngs_requested_keeps_frames() {
        let plan = ConversionPlan::new(&outputs(true, false, true, false, false), 8, "ffmpeg");
        assert_eq!(plan.steps.len(), 1);
        assert!(plan.extracts_frames);
        assert!(!plan.remove_frames);
    }

    #[test]
    fn test_run_requires_raw_recording() {
        let dir = scratch_dir("missing");
        let mut launcher = RecordingLauncher::default();
        let plan = ConversionPlan::new(&Outputs::default(), 8, "ffmpeg");
        assert!(plan.run(&dir, &mut launcher).is_err());
        assert!(launcher.ran.is_empty());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_run_executes_steps_and_removes_frames() {
        let dir = scratch_dir("run");
        fs::write(dir.join("temp.mkv"), b"raw").unwrap();
        fs::write(dir.join("ew-001.png"), b"frame").unwrap();
        fs::write(dir.join("keep.txt"), b"other").unwrap();

        let mut launcher = RecordingLauncher::default();
        let plan = ConversionPlan::new(&Outputs::default(), 8, "ffmpeg");
        plan.run(&dir, &mut launcher).unwrap();

        assert_eq!(launcher.ran.len(), 2);
        assert!(!dir.join("ew-001.png").exists());
        assert!(dir.join("keep.txt").exists());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_run_stops_on_failed_step() {
        let dir = scratch_dir("fail");
        fs::write(dir.join("temp.mkv"), b"raw").unwrap();
        let mut launcher = RecordingLauncher { fail_runs: true, ..Default::default() };
        let plan = ConversionPlan::new(&Outputs::default(), 8, "ffmpeg");
        assert!(plan.run(&dir, &mut launcher).is_err());
        assert_eq!(launcher.ran.len(), 1);
        let _ = fs::remove_dir_all(dir);
    }
}
