use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};

use crate::config::BrowserConfig;

use super::error::CdpError;

/// A chromium instance owned by one registration attempt. The profile lives
/// in a throwaway temp directory and the process is killed on teardown (and
/// on drop, should teardown never run).
pub struct ChromeProcess {
    child: Child,
    endpoint: String,
    _profile_dir: tempfile::TempDir,
}

impl ChromeProcess {
    pub async fn launch(config: &BrowserConfig) -> Result<Self, CdpError> {
        let chrome_path = match &config.chrome_path {
            Some(path) => PathBuf::from(path),
            None => find_chrome().ok_or(CdpError::ChromeNotFound)?,
        };

        let profile_dir = tempfile::tempdir()
            .map_err(|err| CdpError::LaunchFailed(format!("create profile dir: {err}")))?;

        let mut cmd = Command::new(&chrome_path);
        cmd.arg(format!("--remote-debugging-port={}", config.debug_port))
            .arg(format!("--user-data-dir={}", profile_dir.path().display()))
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-networking")
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        if config.headless {
            cmd.arg("--headless=new");
        }

        let child = cmd
            .spawn()
            .map_err(|err| CdpError::LaunchFailed(format!("{}: {err}", chrome_path.display())))?;

        tracing::debug!(pid = ?child.id(), path = %chrome_path.display(), "chromium launched");

        let endpoint = format!("http://127.0.0.1:{}", config.debug_port);
        let mut process = Self {
            child,
            endpoint,
            _profile_dir: profile_dir,
        };

        if let Err(err) = process.await_devtools().await {
            process.kill().await;
            return Err(err);
        }

        Ok(process)
    }

    /// Poll the devtools HTTP endpoint until it answers.
    async fn await_devtools(&self) -> Result<(), CdpError> {
        let version_url = format!("{}/json/version", self.endpoint);
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(200)).await;
            if reqwest::get(&version_url).await.is_ok() {
                return Ok(());
            }
        }
        Err(CdpError::LaunchFailed(
            "devtools endpoint did not come up within timeout".to_owned(),
        ))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn kill(&mut self) {
        if let Err(err) = self.child.kill().await {
            tracing::warn!(?err, "failed to kill chromium process");
        }
    }
}

fn find_chrome() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    let candidates = [
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
    ];

    #[cfg(target_os = "linux")]
    let candidates = [
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/snap/bin/chromium",
    ];

    #[cfg(target_os = "windows")]
    let candidates = [
        r"C:\Program Files\Google\Chrome\Application\chrome.exe",
        r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
    ];

    candidates
        .into_iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
}
