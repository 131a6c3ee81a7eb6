//! Command builders for the conversion tool and FFmpeg.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use openvac_models::ConversionSettings;

use crate::error::{MediaError, MediaResult};

/// How the external conversion tool is launched.
///
/// The stock tool is a shell script, so the default is `bash openvac.sh`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolConfig {
    /// Program to execute
    pub program: PathBuf,
    /// Arguments placed before the conversion arguments (e.g. the script path)
    pub leading_args: Vec<OsString>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self::script("bash", "openvac.sh")
    }
}

impl ToolConfig {
    /// Run `program` directly.
    pub fn direct(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    /// Run `script` through an interpreter.
    pub fn script(interpreter: impl Into<PathBuf>, script: impl Into<OsString>) -> Self {
        Self {
            program: interpreter.into(),
            leading_args: vec![script.into()],
        }
    }

    /// Resolve the program against PATH.
    pub fn check(&self) -> MediaResult<PathBuf> {
        which::which(&self.program)
            .map_err(|_| MediaError::ToolNotFound(self.program.display().to_string()))
    }
}

/// Argument contract of the conversion tool.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    input: PathBuf,
    output_dir: PathBuf,
    settings: ConversionSettings,
    tiered: bool,
}

impl ToolCommand {
    /// Convert `input` into frame files under `output_dir`.
    pub fn new(
        input: impl AsRef<Path>,
        output_dir: impl AsRef<Path>,
        settings: ConversionSettings,
    ) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output_dir: output_dir.as_ref().to_path_buf(),
            settings,
            tiered: false,
        }
    }

    /// Request one subdirectory per quality tier.
    pub fn tiered(mut self, tiered: bool) -> Self {
        self.tiered = tiered;
        self
    }

    /// Build the conversion arguments (without the tool's leading args).
    pub fn build_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-i".into(),
            self.input.clone().into_os_string(),
            "-f".into(),
            self.settings.fps_arg().into(),
            "-a".into(),
            self.settings.aspect_arg().into(),
            "-t".into(),
            self.settings.threshold_arg().into(),
            "-m".into(),
            self.settings.motion_arg().into(),
            "-o".into(),
            self.output_dir.clone().into_os_string(),
        ];
        if self.tiered {
            args.push("-c".into());
        }
        args
    }

    /// Build a ready-to-spawn process with piped stdout and stderr.
    pub fn to_command(&self, tool: &ToolConfig) -> Command {
        let mut cmd = Command::new(&tool.program);
        cmd.args(&tool.leading_args)
            .args(self.build_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: PathBuf,
    output: PathBuf,
    input_args: Vec<String>,
    output_args: Vec<String>,
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            log_level: "error".to_string(),
        }
    }

    /// Add an input argument (before -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add an output argument (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Seek before decoding.
    pub fn seek(self, seconds: f64) -> Self {
        self.input_arg("-ss").input_arg(format!("{:.3}", seconds))
    }

    /// Limit output duration.
    pub fn duration(self, seconds: f64) -> Self {
        self.output_arg("-t").output_arg(format!("{:.3}", seconds))
    }

    /// Limit the number of video frames written.
    pub fn frames(self, count: u32) -> Self {
        self.output_arg("-vframes").output_arg(count.to_string())
    }

    /// Set the output frame rate.
    pub fn frame_rate(self, fps: f64) -> Self {
        self.output_arg("-r").output_arg(fps.to_string())
    }

    /// Drop audio streams.
    pub fn no_audio(self) -> Self {
        self.output_arg("-an")
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-v".to_string(),
            self.log_level.clone(),
        ];
        args.extend(self.input_args.iter().cloned());
        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());
        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());
        args
    }
}

/// Runner for short FFmpeg commands.
#[derive(Debug, Default)]
pub struct FfmpegRunner {
    timeout: Option<Duration>,
}

impl FfmpegRunner {
    /// Create a new runner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill the process if it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Run an FFmpeg command to completion.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        check_ffmpeg()?;

        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, child.wait_with_output()).await {
                Ok(output) => output?,
                Err(_) => {
                    // Dropping the future drops the child, which kills it.
                    warn!("FFmpeg timed out after {} seconds", timeout.as_secs());
                    return Err(MediaError::Timeout(timeout.as_secs()));
                }
            },
            None => child.wait_with_output().await?,
        };

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                (!stderr.is_empty()).then_some(stderr),
                output.status.code(),
            ))
        }
    }
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_arguments() {
        let settings = ConversionSettings::from_form(Some("12"), Some("2.5"), Some("8"), Some("1"));
        let args = ToolCommand::new("/w/input.mp4", "/w/frames", settings)
            .tiered(true)
            .build_args();

        let args: Vec<String> = args
            .into_iter()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert_eq!(
            args,
            vec![
                "-i", "/w/input.mp4", "-f", "12", "-a", "2.5", "-t", "8", "-m", "1", "-o",
                "/w/frames", "-c"
            ]
        );
    }

    #[test]
    fn test_tool_arguments_untiered() {
        let args = ToolCommand::new("in.mp4", "out", ConversionSettings::default()).build_args();
        assert!(!args.iter().any(|a| a == "-c"));
    }

    #[test]
    fn test_tool_config_defaults() {
        let tool = ToolConfig::default();
        assert_eq!(tool.program, PathBuf::from("bash"));
        assert_eq!(tool.leading_args, vec![OsString::from("openvac.sh")]);
        assert!(ToolConfig::direct("/definitely/not/here").check().is_err());
    }

    #[test]
    fn test_ffmpeg_clip_arguments() {
        let cmd = FfmpegCommand::new("input.mp4", "clip.mp4")
            .seek(9.6666)
            .duration(0.6667)
            .frames(10)
            .frame_rate(15.0)
            .no_audio();

        let args = cmd.build_args();
        let input_pos = args.iter().position(|a| a == "-i").unwrap();
        let seek_pos = args.iter().position(|a| a == "-ss").unwrap();
        assert!(seek_pos < input_pos);
        assert!(args.contains(&"9.667".to_string()));
        assert!(args.contains(&"0.667".to_string()));
        assert!(args.contains(&"-an".to_string()));
        assert_eq!(args.last().unwrap(), "clip.mp4");
    }
}
