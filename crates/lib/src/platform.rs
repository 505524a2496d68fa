//! Per-OS download descriptors for the managed runtime binary.
//!
//! One lookup table, keyed by platform: where to fetch the pinned release,
//! how it is packaged, and what the executable is called once on disk.

const RUNTIME_VERSION: &str = "0.16.2";
const RELEASE_BASE: &str = "https://github.com/ollama/ollama/releases/download";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MacOs,
    Linux,
    Windows,
}

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("unsupported platform: {0}")]
    Unsupported(String),
}

impl Platform {
    /// Platform of the running build.
    pub fn current() -> Result<Platform, PlatformError> {
        if cfg!(target_os = "macos") {
            Ok(Platform::MacOs)
        } else if cfg!(target_os = "linux") {
            Ok(Platform::Linux)
        } else if cfg!(target_os = "windows") {
            Ok(Platform::Windows)
        } else {
            Err(PlatformError::Unsupported(std::env::consts::OS.to_string()))
        }
    }
}

/// Packaging of a downloaded release asset, which decides the extraction step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    /// The download is the executable itself.
    RawBinary,
    /// Extracted with a structured zip reader.
    Zip,
    /// Extracted by invoking the system tar tool.
    TarGz,
}

/// Everything the installer needs to fetch and place the runtime binary.
#[derive(Debug, Clone)]
pub struct DownloadSpec {
    pub url: String,
    pub archive: ArchiveKind,
    pub binary_name: &'static str,
}

/// Download descriptor for the pinned runtime release on `platform`.
pub fn resolve(platform: Platform) -> DownloadSpec {
    let asset = |name: &str| format!("{}/v{}/{}", RELEASE_BASE, RUNTIME_VERSION, name);
    match platform {
        Platform::Windows => DownloadSpec {
            url: asset("ollama-windows-amd64.zip"),
            archive: ArchiveKind::Zip,
            binary_name: "ollama.exe",
        },
        Platform::MacOs => DownloadSpec {
            url: asset("ollama-darwin"),
            archive: ArchiveKind::RawBinary,
            binary_name: "ollama",
        },
        Platform::Linux => DownloadSpec {
            url: asset("ollama-linux-amd64.tgz"),
            archive: ArchiveKind::TarGz,
            binary_name: "ollama",
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_resolves_to_zip() {
        let spec = resolve(Platform::Windows);
        assert_eq!(spec.archive, ArchiveKind::Zip);
        assert_eq!(spec.binary_name, "ollama.exe");
        assert!(spec.url.ends_with("ollama-windows-amd64.zip"));
    }

    #[test]
    fn macos_resolves_to_raw_binary() {
        let spec = resolve(Platform::MacOs);
        assert_eq!(spec.archive, ArchiveKind::RawBinary);
        assert_eq!(spec.binary_name, "ollama");
        assert!(spec.url.ends_with("ollama-darwin"));
    }

    #[test]
    fn linux_resolves_to_tarball() {
        let spec = resolve(Platform::Linux);
        assert_eq!(spec.archive, ArchiveKind::TarGz);
        assert!(spec.url.contains(RUNTIME_VERSION));
    }
}
