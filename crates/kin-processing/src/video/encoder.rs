//! External encoder boundary.
//!
//! [`FfmpegEncoder`] shells out to `ffmpeg`/`ffprobe`. Every invocation runs
//! with a timeout and is killed if it expires or the awaiting future is dropped.

use crate::video::probe::{parse_diagnostic_dimensions, parse_ffprobe_json};
use async_trait::async_trait;
use kin_core::{Dimensions, EncoderConfig, MediaError, MediaResult};
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;

/// Keep only the end of encoder diagnostics; the useful error is at the bottom.
const STDERR_TAIL_BYTES: usize = 4096;

/// Operations the video transcoder needs from an external encoder.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Pixel dimensions of the first video stream of `input`.
    ///
    /// Returns [`MediaError::ProbeParseMiss`] when the encoder ran but reported
    /// no usable size.
    async fn probe_dimensions(&self, input: &Path) -> MediaResult<Dimensions>;

    /// Re-encode `input` into a web-compatible MP4 at `output`.
    async fn transcode(&self, input: &Path, output: &Path) -> MediaResult<()>;

    /// Write one `size`×`size` JPEG frame taken at `offset_secs` to `output`.
    ///
    /// A clip shorter than the offset may yield success with no file written.
    async fn extract_poster(
        &self,
        input: &Path,
        output: &Path,
        offset_secs: f64,
        size: u32,
    ) -> MediaResult<()>;
}

/// Reject executable paths containing shell metacharacters.
fn validate_binary_path(name: &str, path: &str) -> MediaResult<()> {
    let dangerous_chars = [';', '|', '&', '$', '`', '(', ')', '<', '>', '\n', '\r'];
    if path.is_empty() || path.chars().any(|c| dangerous_chars.contains(&c)) {
        return Err(MediaError::InvalidConfig(format!(
            "{} contains invalid characters: {:?}",
            name, path
        )));
    }
    Ok(())
}

fn stderr_tail(stderr: &[u8]) -> String {
    let start = stderr.len().saturating_sub(STDERR_TAIL_BYTES);
    String::from_utf8_lossy(&stderr[start..]).trim().to_string()
}

fn ensure_success(operation: &str, output: &Output) -> MediaResult<()> {
    if output.status.success() {
        return Ok(());
    }
    Err(MediaError::EncoderFailure {
        operation: operation.to_string(),
        status: output.status.code(),
        stderr: stderr_tail(&output.stderr),
    })
}

/// Run `program` to completion, capturing stdout and stderr.
///
/// The exit status is not inspected here. On timeout the child is killed.
async fn run_command(
    program: &str,
    args: &[String],
    operation: &str,
    timeout: Duration,
) -> MediaResult<Output> {
    let start = std::time::Instant::now();

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| MediaError::EncoderFailure {
            operation: operation.to_string(),
            status: None,
            stderr: format!("Failed to execute {}: {}", program, e),
        })?;

    // Dropping the in-flight future on timeout drops the child, which kills it.
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result?,
        Err(_) => {
            tracing::error!(
                program = %program,
                operation = %operation,
                timeout_secs = timeout.as_secs(),
                "Encoder timed out, process killed"
            );
            return Err(MediaError::EncoderTimeout {
                operation: operation.to_string(),
                timeout_secs: timeout.as_secs(),
            });
        }
    };

    tracing::debug!(
        program = %program,
        operation = %operation,
        status = ?output.status.code(),
        duration_ms = start.elapsed().as_secs_f64() * 1000.0,
        "Encoder process finished"
    );

    Ok(output)
}

#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    config: EncoderConfig,
}

impl FfmpegEncoder {
    pub fn new(config: EncoderConfig) -> MediaResult<Self> {
        validate_binary_path("FFMPEG_PATH", &config.ffmpeg_path)?;
        validate_binary_path("FFPROBE_PATH", &config.ffprobe_path)?;
        Ok(Self { config })
    }

    fn probe_args(input: &Path) -> Vec<String> {
        vec![
            "-v".to_string(),
            "error".to_string(),
            "-select_streams".to_string(),
            "v:0".to_string(),
            "-show_entries".to_string(),
            "stream=width,height".to_string(),
            "-of".to_string(),
            "json".to_string(),
            input.to_string_lossy().to_string(),
        ]
    }

    fn banner_args(input: &Path) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
        ]
    }

    pub fn transcode_args(&self, input: &Path, output: &Path) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-y".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            self.config.video_preset.clone(),
            "-crf".to_string(),
            self.config.video_crf.to_string(),
            // yuv420p needs even dimensions; odd sources lose one row or column.
            "-vf".to_string(),
            "scale=trunc(iw/2)*2:trunc(ih/2)*2".to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            self.config.audio_bitrate.clone(),
            "-movflags".to_string(),
            "+faststart".to_string(),
            output.to_string_lossy().to_string(),
        ]
    }

    pub fn poster_args(&self, input: &Path, output: &Path, offset_secs: f64, size: u32) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-y".to_string(),
            "-ss".to_string(),
            format!("{:.3}", offset_secs),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-frames:v".to_string(),
            "1".to_string(),
            "-vf".to_string(),
            format!(
                "scale={size}:{size}:force_original_aspect_ratio=increase,crop={size}:{size}",
                size = size
            ),
            output.to_string_lossy().to_string(),
        ]
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    #[tracing::instrument(skip(self), fields(
        process.executable.name = "ffprobe",
        process.executable.path = %self.config.ffprobe_path,
        ffmpeg.operation = "probe"
    ))]
    async fn probe_dimensions(&self, input: &Path) -> MediaResult<Dimensions> {
        let timeout = self.config.probe_timeout();

        match run_command(
            &self.config.ffprobe_path,
            &Self::probe_args(input),
            "probe",
            timeout,
        )
        .await
        {
            Ok(output) if output.status.success() => {
                if let Some(dimensions) = parse_ffprobe_json(&output.stdout) {
                    return Ok(dimensions);
                }
                tracing::debug!("ffprobe reported no video dimensions, trying ffmpeg banner");
            }
            Ok(output) => {
                tracing::debug!(
                    status = ?output.status.code(),
                    "ffprobe failed, trying ffmpeg banner"
                );
            }
            Err(e @ MediaError::EncoderTimeout { .. }) => return Err(e),
            Err(e) => {
                tracing::debug!(error = %e, "ffprobe unavailable, trying ffmpeg banner");
            }
        }

        // `ffmpeg -i` without an output always exits non-zero; only the banner matters.
        let output = run_command(
            &self.config.ffmpeg_path,
            &Self::banner_args(input),
            "probe",
            timeout,
        )
        .await?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        parse_diagnostic_dimensions(&stderr).ok_or_else(|| {
            MediaError::ProbeParseMiss(format!(
                "no video stream size found for {}",
                input.display()
            ))
        })
    }

    #[tracing::instrument(skip(self), fields(
        process.executable.name = "ffmpeg",
        process.executable.path = %self.config.ffmpeg_path,
        ffmpeg.operation = "transcode"
    ))]
    async fn transcode(&self, input: &Path, output: &Path) -> MediaResult<()> {
        let start = std::time::Instant::now();

        let result = run_command(
            &self.config.ffmpeg_path,
            &self.transcode_args(input, output),
            "transcode",
            self.config.encoder_timeout(),
        )
        .await?;
        ensure_success("transcode", &result)?;

        tracing::info!(
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            crf = self.config.video_crf,
            preset = %self.config.video_preset,
            "Video transcode completed"
        );
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(
        process.executable.name = "ffmpeg",
        process.executable.path = %self.config.ffmpeg_path,
        ffmpeg.operation = "poster"
    ))]
    async fn extract_poster(
        &self,
        input: &Path,
        output: &Path,
        offset_secs: f64,
        size: u32,
    ) -> MediaResult<()> {
        let result = run_command(
            &self.config.ffmpeg_path,
            &self.poster_args(input, output, offset_secs, size),
            "poster",
            self.config.encoder_timeout(),
        )
        .await?;
        ensure_success("poster", &result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn encoder() -> FfmpegEncoder {
        FfmpegEncoder::new(EncoderConfig::default()).unwrap()
    }

    #[test]
    fn test_rejects_shell_metacharacters_in_binary_path() {
        let config = EncoderConfig {
            ffmpeg_path: "ffmpeg; rm -rf /".to_string(),
            ..EncoderConfig::default()
        };
        assert!(matches!(
            FfmpegEncoder::new(config),
            Err(MediaError::InvalidConfig(_))
        ));

        let config = EncoderConfig {
            ffprobe_path: String::new(),
            ..EncoderConfig::default()
        };
        assert!(FfmpegEncoder::new(config).is_err());
    }

    #[test]
    fn test_transcode_args() {
        let args = encoder().transcode_args(
            &PathBuf::from("/tmp/in.mov"),
            &PathBuf::from("/media/3/2022/11/.x.tmp.mp4"),
        );
        let joined = args.join(" ");

        assert!(joined.contains("-i /tmp/in.mov"));
        assert!(joined.contains("-c:v libx264 -preset medium -crf 23"));
        assert!(joined.contains("-c:a aac -b:a 128k"));
        assert!(joined.contains("-movflags +faststart"));
        assert!(joined.contains("-vf scale=trunc(iw/2)*2:trunc(ih/2)*2 -pix_fmt yuv420p"));
        assert!(args.contains(&"-y".to_string()));
        assert_eq!(args.last().unwrap(), "/media/3/2022/11/.x.tmp.mp4");
    }

    #[test]
    fn test_poster_args() {
        let args = encoder().poster_args(
            &PathBuf::from("/media/v.mp4"),
            &PathBuf::from("/media/thumbs/v.jpg"),
            1.0,
            200,
        );
        let joined = args.join(" ");

        assert!(joined.contains("-ss 1.000 -i /media/v.mp4"));
        assert!(joined.contains("-frames:v 1"));
        assert!(joined.contains(
            "-vf scale=200:200:force_original_aspect_ratio=increase,crop=200:200"
        ));
        assert_eq!(args.last().unwrap(), "/media/thumbs/v.jpg");
    }

    #[test]
    fn test_stderr_tail_keeps_the_end() {
        let mut stderr = vec![b'a'; STDERR_TAIL_BYTES * 2];
        stderr.extend_from_slice(b"Conversion failed!");
        let tail = stderr_tail(&stderr);
        assert!(tail.ends_with("Conversion failed!"));
        assert!(tail.len() <= STDERR_TAIL_BYTES);
    }

    #[tokio::test]
    async fn test_missing_binary_is_an_encoder_failure() {
        let config = EncoderConfig {
            ffmpeg_path: "/nonexistent/bin/ffmpeg".to_string(),
            ..EncoderConfig::default()
        };
        let err = FfmpegEncoder::new(config)
            .unwrap()
            .transcode(Path::new("in.mov"), Path::new("out.mp4"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            MediaError::EncoderFailure { ref operation, status: None, .. } if operation == "transcode"
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_is_an_encoder_failure() {
        let config = EncoderConfig {
            ffmpeg_path: "false".to_string(),
            ..EncoderConfig::default()
        };
        let err = FfmpegEncoder::new(config)
            .unwrap()
            .transcode(Path::new("in.mov"), Path::new("out.mp4"))
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::EncoderFailure { status: Some(1), .. }));
    }

    /// Write an executable `sh` script standing in for ffmpeg or ffprobe.
    #[cfg(unix)]
    fn fake_binary(dir: &Path, name: &str, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().to_string()
    }

    #[cfg(unix)]
    fn probe_encoder(ffprobe_path: String, ffmpeg_path: String) -> FfmpegEncoder {
        FfmpegEncoder::new(EncoderConfig {
            ffprobe_path,
            ffmpeg_path,
            probe_timeout_secs: 5,
            ..EncoderConfig::default()
        })
        .unwrap()
    }

    #[cfg(unix)]
    const H264_BANNER: &str = "echo '  Stream #0:0(und): Video: h264 (avc1 / 0x31637661), yuv420p, 640x480, 1205 kb/s' >&2; exit 1";

    #[cfg(unix)]
    #[tokio::test]
    async fn test_probe_prefers_ffprobe_json() {
        let dir = tempfile::tempdir().unwrap();
        let ffprobe = fake_binary(
            dir.path(),
            "ffprobe",
            r#"echo '{"streams":[{"width":1280,"height":720}]}'"#,
        );
        let ffmpeg = fake_binary(dir.path(), "ffmpeg", H264_BANNER);

        let dims = probe_encoder(ffprobe, ffmpeg)
            .probe_dimensions(Path::new("in.mov"))
            .await
            .unwrap();
        assert_eq!(dims, Dimensions::new(1280, 720));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_probe_falls_back_to_banner_when_ffprobe_fails() {
        let dir = tempfile::tempdir().unwrap();
        let ffprobe = fake_binary(dir.path(), "ffprobe", "echo 'Invalid data' >&2; exit 1");
        let ffmpeg = fake_binary(dir.path(), "ffmpeg", H264_BANNER);

        let dims = probe_encoder(ffprobe, ffmpeg)
            .probe_dimensions(Path::new("in.mov"))
            .await
            .unwrap();
        assert_eq!(dims, Dimensions::new(640, 480));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_probe_falls_back_to_banner_without_json_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let ffprobe = fake_binary(dir.path(), "ffprobe", r#"echo '{"streams":[]}'"#);
        let ffmpeg = fake_binary(dir.path(), "ffmpeg", H264_BANNER);

        let dims = probe_encoder(ffprobe, ffmpeg)
            .probe_dimensions(Path::new("in.mov"))
            .await
            .unwrap();
        assert_eq!(dims, Dimensions::new(640, 480));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_probe_falls_back_to_banner_when_ffprobe_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = fake_binary(dir.path(), "ffmpeg", H264_BANNER);

        let dims = probe_encoder("/nonexistent/bin/ffprobe".to_string(), ffmpeg)
            .probe_dimensions(Path::new("in.mov"))
            .await
            .unwrap();
        assert_eq!(dims, Dimensions::new(640, 480));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_probe_banner_miss_is_parse_miss() {
        let dir = tempfile::tempdir().unwrap();
        let ffprobe = fake_binary(dir.path(), "ffprobe", "exit 1");
        let ffmpeg = fake_binary(
            dir.path(),
            "ffmpeg",
            "echo '  Stream #0:0(und): Audio: aac (LC) (mp4a / 0x6134706D), 44100 Hz' >&2; exit 1",
        );

        let err = probe_encoder(ffprobe, ffmpeg)
            .probe_dimensions(Path::new("in.mov"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::ProbeParseMiss(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_probe_timeout_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let ffprobe = fake_binary(dir.path(), "ffprobe", "exec sleep 30");
        let ffmpeg = fake_binary(dir.path(), "ffmpeg", H264_BANNER);

        let mut encoder = probe_encoder(ffprobe, ffmpeg);
        encoder.config.probe_timeout_secs = 1;

        let err = encoder
            .probe_dimensions(Path::new("in.mov"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::EncoderTimeout { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_process() {
        let err = run_command(
            "sleep",
            &["30".to_string()],
            "transcode",
            Duration::from_millis(200),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, MediaError::EncoderTimeout { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_command_captures_output() {
        let output = run_command(
            "sh",
            &["-c".to_string(), "echo out; echo err >&2; exit 3".to_string()],
            "probe",
            Duration::from_secs(10),
        )
        .await
        .unwrap();

        assert_eq!(output.status.code(), Some(3));
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "out");
        assert_eq!(stderr_tail(&output.stderr), "err");
    }
}
