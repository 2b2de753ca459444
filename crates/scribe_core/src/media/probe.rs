//! Duration and size probing.

use std::path::Path;
use std::sync::Arc;

use super::commands::{self, ProbeInfo};
use super::runner::{StageContext, ToolError, ToolRunner};
use super::{MediaError, MediaResult};
use crate::models::{MediaHandle, MediaKind};

/// Duration reported when neither ffprobe nor the ffmpeg banner can tell.
pub const DEFAULT_DURATION_SECS: u64 = 10;

/// Reports duration and size of media files.
///
/// Duration is an estimate: ffprobe first, then the ffmpeg banner, then
/// [`DEFAULT_DURATION_SECS`]. Only a missing file is an error.
pub struct MediaProbe {
    runner: Arc<dyn ToolRunner>,
}

impl MediaProbe {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self { runner }
    }

    pub async fn probe(&self, path: &Path, ctx: StageContext<'_>) -> MediaResult<MediaHandle> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) if m.is_file() => m,
            _ => return Err(MediaError::NotFound(path.to_path_buf())),
        };

        let mut kind = MediaKind::from_path(path);
        let info = self.structured(path, ctx).await?;
        if info.has_video {
            kind = MediaKind::Video;
        }

        let duration = match info.duration_secs.filter(|d| *d > 0.0) {
            Some(d) => Some(d),
            None => self.banner_duration(path, ctx).await?,
        };

        let duration_secs = match duration {
            Some(d) => (d as u64).max(1),
            None => {
                ctx.logger.warn(&format!(
                    "Could not determine duration of {}, assuming {}s",
                    path.display(),
                    DEFAULT_DURATION_SECS
                ));
                DEFAULT_DURATION_SECS
            }
        };

        tracing::debug!(
            path = %path.display(),
            size_bytes = metadata.len(),
            duration_secs,
            %kind,
            "Probed media"
        );
        Ok(MediaHandle::new(path, metadata.len(), duration_secs, kind))
    }

    async fn structured(&self, path: &Path, ctx: StageContext<'_>) -> MediaResult<ProbeInfo> {
        let invocation = commands::probe_format(path);
        ctx.logger.command(&invocation.command_line());
        match self.runner.run(&invocation, ctx.cancel).await {
            Ok(output) if output.success() => {
                Ok(commands::parse_ffprobe(&output.stdout).unwrap_or_default())
            }
            Ok(output) => {
                ctx.logger.debug(&format!("ffprobe exited with {:?}", output.exit_code));
                Ok(ProbeInfo::default())
            }
            Err(ToolError::Cancelled) => Err(MediaError::Cancelled),
            Err(e) => {
                ctx.logger.debug(&format!("ffprobe unavailable: {}", e));
                Ok(ProbeInfo::default())
            }
        }
    }

    async fn banner_duration(&self, path: &Path, ctx: StageContext<'_>) -> MediaResult<Option<f64>> {
        let invocation = commands::probe_banner(path);
        ctx.logger.command(&invocation.command_line());
        match self.runner.run(&invocation, ctx.cancel).await {
            Ok(output) => Ok(commands::parse_banner_duration(&output.stderr).filter(|d| *d > 0.0)),
            Err(ToolError::Cancelled) => Err(MediaError::Cancelled),
            Err(e) => {
                ctx.logger.debug(&format!("ffmpeg banner probe failed: {}", e));
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{LogConfig, RequestLogger};
    use crate::media::testing::FakeRunner;
    use crate::media::Tool;
    use tokio_util::sync::CancellationToken;

    fn logger() -> RequestLogger {
        RequestLogger::tracing_only("probe-test", LogConfig::default())
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let probe = MediaProbe::new(Arc::new(FakeRunner::new()));
        let cancel = CancellationToken::new();
        let log = logger();
        let err = probe
            .probe(Path::new("/definitely/not/here.mp3"), StageContext::new(&cancel, &log))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::NotFound(_)));
    }

    #[tokio::test]
    async fn uses_ffprobe_duration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("talk.mp3");
        std::fs::write(&path, vec![0u8; 2048]).unwrap();

        let runner = FakeRunner::new().with_stdout(
            Tool::Ffprobe,
            r#"{"streams":[{"codec_type":"audio"}],"format":{"duration":"125.9"}}"#,
        );
        let probe = MediaProbe::new(Arc::new(runner));
        let cancel = CancellationToken::new();
        let log = logger();
        let handle = probe.probe(&path, StageContext::new(&cancel, &log)).await.unwrap();

        assert_eq!(handle.duration_secs, 125);
        assert_eq!(handle.size_bytes, 2048);
        assert_eq!(handle.kind, MediaKind::Audio);
    }

    #[tokio::test]
    async fn falls_back_to_banner_then_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.bin");
        std::fs::write(&path, b"xx").unwrap();
        let cancel = CancellationToken::new();
        let log = logger();

        let banner = FakeRunner::new()
            .with_stdout(Tool::Ffprobe, "not json")
            .with_stderr("-i", "  Duration: 00:01:30.20, start: 0.000000\n");
        let handle = MediaProbe::new(Arc::new(banner))
            .probe(&path, StageContext::new(&cancel, &log))
            .await
            .unwrap();
        assert_eq!(handle.duration_secs, 90);

        let nothing = FakeRunner::new().failing_tool(Tool::Ffprobe);
        let handle = MediaProbe::new(Arc::new(nothing))
            .probe(&path, StageContext::new(&cancel, &log))
            .await
            .unwrap();
        assert_eq!(handle.duration_secs, DEFAULT_DURATION_SECS);
    }

    #[tokio::test]
    async fn video_stream_refines_kind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recording.dat");
        std::fs::write(&path, b"xx").unwrap();

        let runner = FakeRunner::new().with_stdout(
            Tool::Ffprobe,
            r#"{"streams":[{"codec_type":"video"},{"codec_type":"audio"}],"format":{"duration":"3.0"}}"#,
        );
        let cancel = CancellationToken::new();
        let log = logger();
        let handle = MediaProbe::new(Arc::new(runner))
            .probe(&path, StageContext::new(&cancel, &log))
            .await
            .unwrap();
        assert_eq!(handle.kind, MediaKind::Video);
    }
}
