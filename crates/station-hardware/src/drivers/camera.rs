//! Simulated still camera.

use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use station_core::ImageCapture;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Camera that records capture requests and returns synthetic paths.
///
/// No image data is written; the returned path is where a real camera would
/// have saved the frame.
#[derive(Debug)]
pub struct SimulatedCamera {
    root: PathBuf,
    captures: Mutex<Vec<(String, String, PathBuf)>>,
    fail: AtomicBool,
}

impl SimulatedCamera {
    /// Camera saving under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            root: root.into(),
            captures: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        })
    }

    /// Make every capture fail.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Recorded captures as `(camera, label, path)`.
    pub fn captures(&self) -> Vec<(String, String, PathBuf)> {
        self.captures.lock().clone()
    }
}

#[async_trait]
impl ImageCapture for SimulatedCamera {
    async fn capture(&self, camera: &str, label: &str) -> Result<PathBuf> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("camera '{}' did not deliver a frame", camera);
        }
        let mut captures = self.captures.lock();
        let path = self
            .root
            .join(camera)
            .join(format!("{}_{:04}.png", label, captures.len() + 1));
        captures.push((camera.to_string(), label.to_string(), path.clone()));
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_capture_paths_are_numbered() {
        let camera = SimulatedCamera::new("/tmp/images");
        let first = camera.capture("top", "bond").await.unwrap();
        let second = camera.capture("top", "bond").await.unwrap();
        assert_eq!(first, PathBuf::from("/tmp/images/top/bond_0001.png"));
        assert_ne!(first, second);
        assert_eq!(camera.captures().len(), 2);

        camera.set_failing(true);
        assert!(camera.capture("top", "bond").await.is_err());
    }
}
