use crate::source::ReplaySource;
use gazetrack_core::{
    AnomalyDrain, CalibrationPhase, ConfigError, EyeSide, FrameError, GazeEngine, GazeSnapshot,
    GrayFrame, TrackerConfig,
};
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Calibration state of the engine after the last processed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationReport {
    pub phase: CalibrationPhase,
    pub left: Option<u8>,
    pub right: Option<u8>,
    pub frames: u64,
}

/// Messages sent from the CLI to the engine thread.
enum WorkerRequest {
    Refresh {
        path: PathBuf,
        reply: oneshot::Sender<Result<GazeSnapshot, WorkerError>>,
    },
    Calibration {
        reply: oneshot::Sender<CalibrationReport>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<WorkerRequest>,
}

impl EngineHandle {
    /// Load the frame at `path` and run it through the engine.
    pub async fn refresh(&self, path: PathBuf) -> Result<GazeSnapshot, WorkerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(WorkerRequest::Refresh {
                path,
                reply: reply_tx,
            })
            .await
            .map_err(|_| WorkerError::ChannelClosed)?;
        reply_rx.await.map_err(|_| WorkerError::ChannelClosed)?
    }

    pub async fn calibration(&self) -> Result<CalibrationReport, WorkerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(WorkerRequest::Calibration { reply: reply_tx })
            .await
            .map_err(|_| WorkerError::ChannelClosed)?;
        reply_rx.await.map_err(|_| WorkerError::ChannelClosed)
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The engine owns all per-session state; requests are served one at a
/// time in arrival order. Returns the request handle and a consumer
/// handle on the engine's anomaly log. The log disconnects once every
/// handle is dropped and the thread exits. Fails fast on an invalid config.
pub fn spawn_engine(
    config: &TrackerConfig,
    mut source: ReplaySource,
    queue_depth: usize,
) -> Result<(EngineHandle, AnomalyDrain), WorkerError> {
    let mut engine = GazeEngine::new(config)?;
    let anomalies = engine.anomalies();
    let (tx, mut rx) = mpsc::channel::<WorkerRequest>(queue_depth.max(1));

    std::thread::Builder::new()
        .name("gazetrack-engine".into())
        .spawn(move || {
            tracing::info!(sidecar_frames = source.len(), "engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    WorkerRequest::Refresh { path, reply } => {
                        let result = run_refresh(&mut engine, &mut source, &path);
                        let _ = reply.send(result);
                    }
                    WorkerRequest::Calibration { reply } => {
                        let _ = reply.send(report(&engine));
                    }
                }
            }
            tracing::info!(
                frames = engine.frames_processed(),
                dropped_anomalies = engine.dropped_anomalies(),
                "engine thread exiting"
            );
        })
        .expect("failed to spawn engine thread");

    Ok((EngineHandle { tx }, anomalies))
}

fn run_refresh(
    engine: &mut GazeEngine,
    source: &mut ReplaySource,
    path: &std::path::Path,
) -> Result<GazeSnapshot, WorkerError> {
    let frame = GrayFrame::load(path)?;
    tracing::debug!(
        path = %path.display(),
        width = frame.width,
        height = frame.height,
        "frame loaded"
    );

    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        source.cue(name);
    }
    Ok(engine.refresh_with(&frame, source).clone())
}

fn report(engine: &GazeEngine) -> CalibrationReport {
    let calibration = engine.calibration();
    CalibrationReport {
        phase: calibration.phase(),
        left: calibration.threshold(EyeSide::Left),
        right: calibration.threshold(EyeSide::Right),
        frames: engine.frames_processed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_FACE: &str = r#"[{"frame":"blank.png","landmarks":null}]"#;

    fn write_frame(dir: &std::path::Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        image::GrayImage::from_pixel(32, 24, image::Luma([128u8]))
            .save(&path)
            .unwrap();
        path
    }

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("gazetrack-{tag}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_refresh_no_face_frame() {
        let dir = temp_dir("worker-noface");
        let path = write_frame(&dir, "blank.png");
        let source = ReplaySource::from_json(NO_FACE).unwrap();
        let (handle, anomalies) = spawn_engine(&TrackerConfig::default(), source, 4).unwrap();

        let snapshot = handle.refresh(path.clone()).await.unwrap();
        assert!(!snapshot.pupils_located);
        assert_eq!(snapshot.label(), "Not Found");

        let report = handle.calibration().await.unwrap();
        assert_eq!(report.phase, CalibrationPhase::Uncalibrated);
        assert_eq!(report.frames, 1);
        assert_eq!(report.left, None);

        drop(handle);
        let records: Vec<_> = anomalies.iter().collect();
        std::fs::remove_dir_all(&dir).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind.classification(), "not found");
    }

    #[tokio::test]
    async fn test_unreadable_frame_reports_error() {
        let dir = temp_dir("worker-bad");
        let path = dir.join("broken.png");
        std::fs::write(&path, b"not an image").unwrap();
        let source = ReplaySource::from_json("[]").unwrap();
        let (handle, _anomalies) = spawn_engine(&TrackerConfig::default(), source, 4).unwrap();

        let result = handle.refresh(path).await;
        std::fs::remove_dir_all(&dir).unwrap();
        assert!(matches!(result, Err(WorkerError::Frame(_))));

        // The engine keeps serving after a bad frame.
        assert_eq!(handle.calibration().await.unwrap().frames, 0);
    }

    #[test]
    fn test_invalid_config_fails_fast() {
        let config = TrackerConfig {
            anomaly_capacity: Some(0),
            ..Default::default()
        };
        let source = ReplaySource::from_json("[]").unwrap();
        assert!(matches!(
            spawn_engine(&config, source, 4),
            Err(WorkerError::Config(_))
        ));
    }
}
