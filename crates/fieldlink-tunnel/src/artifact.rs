//! Tunnel client configuration artifact
//!
//! The supervisor never edits a real configuration. When none exists it
//! writes a commented template; a file still carrying the template marker
//! is treated as not configured.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{TunnelError, TunnelResult};

/// Line identifying an unedited template
pub const TEMPLATE_MARKER: &str = "# FIELDLINK-TEMPLATE";

const TEMPLATE: &str = "\
# fieldlink tunnel client configuration
#
# Replace this file with the client configuration issued by your network
# provider. The tunnel client is not started while the marker line below
# is present.
# FIELDLINK-TEMPLATE
client
dev tun
proto udp
# remote vpn.example.com 1194
resolv-retry infinite
nobind
persist-key
persist-tun
# ca ca.crt
# cert client.crt
# key client.key
";

/// Result of checking the artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactStatus {
    /// A usable configuration
    Ready(PathBuf),
    /// Only the template exists (possibly just written)
    Template { path: PathBuf, created: bool },
}

impl ArtifactStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

/// Check the artifact at `path`, writing the template when it is missing.
///
/// Unreadable files, non UTF-8 content and configurations without a
/// `remote` directive are reported as corrupt.
pub async fn ensure_artifact(path: &Path) -> TunnelResult<ArtifactStatus> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            write_template(path).await?;
            info!(path = %path.display(), "Tunnel configuration template written");
            return Ok(ArtifactStatus::Template {
                path: path.to_path_buf(),
                created: true,
            });
        }
        Err(e) => return Err(corrupt(path, e.to_string())),
    };

    let text = String::from_utf8(bytes).map_err(|_| corrupt(path, "not valid UTF-8"))?;

    if text.lines().any(|l| l.trim() == TEMPLATE_MARKER) {
        return Ok(ArtifactStatus::Template {
            path: path.to_path_buf(),
            created: false,
        });
    }

    if !text.lines().any(is_remote_directive) {
        return Err(corrupt(path, "no remote directive"));
    }

    Ok(ArtifactStatus::Ready(path.to_path_buf()))
}

fn is_remote_directive(line: &str) -> bool {
    let mut words = line.split_whitespace();
    words.next() == Some("remote") && words.next().is_some()
}

async fn write_template(path: &Path) -> TunnelResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, TEMPLATE).await.map_err(|e| {
        warn!(path = %path.display(), error = %e, "Cannot write tunnel configuration template");
        TunnelError::Io(e)
    })
}

fn corrupt(path: &Path, reason: impl Into<String>) -> TunnelError {
    TunnelError::CorruptConfig {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[tokio::test]
    async fn test_missing_artifact_writes_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vpn").join("client.ovpn");

        let status = ensure_artifact(&path).await.unwrap();
        assert_eq!(
            status,
            ArtifactStatus::Template {
                path: path.clone(),
                created: true
            }
        );
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains(TEMPLATE_MARKER));

        // Still the template on the next check
        let again = ensure_artifact(&path).await.unwrap();
        assert!(matches!(again, ArtifactStatus::Template { created: false, .. }));
        assert!(!again.is_ready());
    }

    #[tokio::test]
    async fn test_edited_artifact_is_ready() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.ovpn");
        std::fs::write(&path, "client\ndev tun\nremote vpn.example.com 1194\n").unwrap();

        assert_eq!(
            ensure_artifact(&path).await.unwrap(),
            ArtifactStatus::Ready(path.clone())
        );
    }

    #[tokio::test]
    async fn test_non_utf8_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.ovpn");
        std::fs::write(&path, [0xff, 0xfe, 0x00, 0x72]).unwrap();

        let err = ensure_artifact(&path).await.unwrap_err();
        assert!(matches!(err, TunnelError::CorruptConfig { .. }));
    }

    #[tokio::test]
    async fn test_directory_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let err = ensure_artifact(dir.path()).await.unwrap_err();
        assert!(matches!(err, TunnelError::CorruptConfig { .. }));
    }

    #[rstest]
    #[case("remote vpn.example.com 1194", true)]
    #[case("  remote 10.0.0.1", true)]
    #[case("# remote vpn.example.com 1194", false)]
    #[case("remote", false)]
    #[case("remote-cert-tls server", false)]
    fn test_remote_directive(#[case] line: &str, #[case] expected: bool) {
        assert_eq!(is_remote_directive(line), expected);
    }
}
