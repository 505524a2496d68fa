//! Download and install the runtime binary for the current platform.
//!
//! Archives land at a temporary path and are deleted after extraction; raw
//! binaries download straight to their final location. Success means the
//! binary exists on disk afterwards, not merely that no step errored.

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;

use crate::platform::{ArchiveKind, DownloadSpec};

/// On-disk layout of the managed runtime under the configured data dir.
#[derive(Debug, Clone)]
pub struct RuntimePaths {
    pub data_dir: PathBuf,
    pub bin_dir: PathBuf,
    pub models_dir: PathBuf,
    pub binary_path: PathBuf,
}

impl RuntimePaths {
    pub fn new(data_dir: PathBuf, binary_name: &str) -> Self {
        let bin_dir = data_dir.join("bin");
        Self {
            binary_path: bin_dir.join(binary_name),
            models_dir: data_dir.join("models"),
            bin_dir,
            data_dir,
        }
    }

    /// Whether the runtime binary is present on disk.
    pub fn is_installed(&self) -> bool {
        self.binary_path.exists()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("download failed: {0}")]
    Download(#[from] reqwest::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip extraction failed: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("tar extraction failed: {0}")]
    Tar(String),
    #[error("runtime binary missing after install at {0}")]
    BinaryMissing(PathBuf),
}

/// Fetches and places the runtime binary described by a [`DownloadSpec`].
pub struct Installer {
    spec: DownloadSpec,
    paths: RuntimePaths,
    client: reqwest::Client,
}

impl Installer {
    pub fn new(spec: DownloadSpec, paths: RuntimePaths) -> Self {
        Self {
            spec,
            paths,
            client: reqwest::Client::new(),
        }
    }

    /// Download, extract, and mark executable. Progress is reported as
    /// (message, percent) with percent -1 when the total size is unknown.
    pub async fn install(
        &self,
        on_progress: &mut (dyn FnMut(&str, i32) + Send),
    ) -> Result<(), InstallError> {
        tokio::fs::create_dir_all(&self.paths.bin_dir).await?;

        let dest = match self.spec.archive {
            ArchiveKind::RawBinary => self.paths.binary_path.clone(),
            ArchiveKind::Zip | ArchiveKind::TarGz => self
                .paths
                .data_dir
                .join(format!("runtime-download-{}.tmp", uuid::Uuid::new_v4())),
        };

        on_progress("Downloading runtime...", 0);
        self.download(&dest, on_progress).await?;

        match self.spec.archive {
            ArchiveKind::RawBinary => {}
            ArchiveKind::Zip => {
                on_progress("Extracting...", 100);
                extract_zip(&dest, &self.paths.bin_dir)?;
                let _ = tokio::fs::remove_file(&dest).await;
            }
            ArchiveKind::TarGz => {
                on_progress("Extracting...", 100);
                extract_tar_gz(&dest, &self.paths.bin_dir).await?;
                let _ = tokio::fs::remove_file(&dest).await;
            }
        }

        if let Err(e) = make_executable(&self.paths.binary_path) {
            log::debug!("chmod failed: {}", e);
        }

        if !self.paths.binary_path.exists() {
            return Err(InstallError::BinaryMissing(self.paths.binary_path.clone()));
        }
        log::info!("runtime installed at {}", self.paths.binary_path.display());
        Ok(())
    }

    async fn download(
        &self,
        dest: &Path,
        on_progress: &mut (dyn FnMut(&str, i32) + Send),
    ) -> Result<(), InstallError> {
        log::info!("downloading {}", self.spec.url);
        let res = self
            .client
            .get(&self.spec.url)
            .send()
            .await?
            .error_for_status()?;
        let total = res.content_length().filter(|&n| n > 0);

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = res.bytes_stream();
        let mut downloaded: u64 = 0;
        let mut last_pct: i32 = -1;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            match total {
                Some(total) => {
                    let pct = ((downloaded as f64 / total as f64) * 100.0).round() as i32;
                    if pct != last_pct {
                        last_pct = pct;
                        on_progress(&format!("Downloading runtime... {}%", pct), pct);
                    }
                }
                None => on_progress("Downloading runtime...", -1),
            }
        }
        file.flush().await?;
        Ok(())
    }
}

fn extract_zip(archive: &Path, dest: &Path) -> Result<(), InstallError> {
    let file = std::fs::File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)?;
    zip.extract(dest)?;
    Ok(())
}

/// Extraction via the system tar tool; arguments are passed as a list, no shell.
async fn extract_tar_gz(archive: &Path, dest: &Path) -> Result<(), InstallError> {
    let output = tokio::process::Command::new("tar")
        .arg("xzf")
        .arg(archive)
        .arg("-C")
        .arg(dest)
        .output()
        .await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(InstallError::Tar(format!(
            "exit {}: {}",
            output.status,
            stderr.trim()
        )));
    }
    Ok(())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_derive_from_data_dir() {
        let paths = RuntimePaths::new(PathBuf::from("/tmp/lectern/runtime"), "ollama");
        assert_eq!(paths.bin_dir, PathBuf::from("/tmp/lectern/runtime/bin"));
        assert_eq!(
            paths.models_dir,
            PathBuf::from("/tmp/lectern/runtime/models")
        );
        assert_eq!(
            paths.binary_path,
            PathBuf::from("/tmp/lectern/runtime/bin/ollama")
        );
        assert!(!paths.is_installed());
    }
}
