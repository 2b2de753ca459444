//! Per-request resources.

use std::path::Path;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use super::errors::{TranscribeError, TranscribeResult};
use crate::logging::{LogConfig, RequestLogger};
use crate::media::StageContext;

/// Everything private to one transcription request.
///
/// The work directory is a [`TempDir`]; every intermediate file lives in
/// it and is removed when the context is dropped, whichever way the
/// request ends.
pub struct RequestContext {
    /// Request identifier used for the work directory and log file names.
    pub request_id: String,
    /// Cancels tool subprocesses, ASR calls and backoff sleeps.
    pub cancel: CancellationToken,
    /// Per-request logger.
    pub logger: RequestLogger,
    work_dir: TempDir,
}

impl RequestContext {
    /// Create the work directory under `temp_root` and the request logger.
    ///
    /// With `log_dir` set, the logger also writes `<log_dir>/<request_id>.log`.
    pub fn new(
        request_id: impl Into<String>,
        temp_root: &Path,
        log_dir: Option<&Path>,
        log_config: LogConfig,
        cancel: CancellationToken,
    ) -> TranscribeResult<Self> {
        let request_id = request_id.into();

        std::fs::create_dir_all(temp_root).map_err(|e| {
            TranscribeError::setup_failed(format!(
                "cannot create temp root {}: {}",
                temp_root.display(),
                e
            ))
        })?;
        let work_dir = tempfile::Builder::new()
            .prefix(&format!("scribe_{}_", request_id))
            .tempdir_in(temp_root)
            .map_err(|e| TranscribeError::setup_failed(format!("cannot create work dir: {}", e)))?;

        let logger = match log_dir {
            Some(dir) => RequestLogger::new(&request_id, dir, log_config).map_err(|e| {
                TranscribeError::setup_failed(format!("cannot create request log: {}", e))
            })?,
            None => RequestLogger::tracing_only(&request_id, log_config),
        };

        Ok(Self {
            request_id,
            cancel,
            logger,
            work_dir,
        })
    }

    /// Directory for this request's intermediate files.
    pub fn work_dir(&self) -> &Path {
        self.work_dir.path()
    }

    /// Borrowed view handed to media and chunking stages.
    pub fn stage(&self) -> StageContext<'_> {
        StageContext::new(&self.cancel, &self.logger)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_dir_is_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let ctx = RequestContext::new(
            "req1",
            root.path(),
            None,
            LogConfig::default(),
            CancellationToken::new(),
        )
        .unwrap();

        let work = ctx.work_dir().to_path_buf();
        assert!(work.starts_with(root.path()));
        assert!(work
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("scribe_req1_"));
        std::fs::write(work.join("extracted.wav"), b"pcm").unwrap();

        drop(ctx);
        assert!(!work.exists());
    }

    #[test]
    fn writes_request_log_when_dir_given() {
        let root = tempfile::tempdir().unwrap();
        let logs = root.path().join("logs");
        let ctx = RequestContext::new(
            "req2",
            &root.path().join("temp"),
            Some(&logs),
            LogConfig::default(),
            CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(ctx.logger.log_path(), Some(logs.join("req2.log").as_path()));
        assert!(!ctx.is_cancelled());
    }
}
