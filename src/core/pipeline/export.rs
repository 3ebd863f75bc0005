//! Final dump of the anonymized shadow database

use crate::adapters::tools::{check_dump_file, DumpTool};
use crate::domain::context::ResultExt;
use crate::domain::{ConnectionDescriptor, Result};
use std::path::Path;

/// Dumps `shadow` to `path` and returns the size of the dump
///
/// The parent directory is created when missing. The file is left in place on
/// failure so the partial output can be inspected.
pub async fn export_shadow(
    tool: &dyn DumpTool,
    shadow: &ConnectionDescriptor,
    path: &Path,
) -> Result<u64> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    tracing::info!(
        tool = tool.name(),
        shadow = %shadow.safe_display(),
        path = %path.display(),
        "Exporting shadow database"
    );
    tool.dump_to_file(shadow, path).await?;
    check_dump_file(path)?;

    let bytes = std::fs::metadata(path)
        .with_context(|| format!("Failed to stat {}", path.display()))?
        .len();
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CopyError, ShroudError};
    use async_trait::async_trait;

    struct Writes(&'static str);

    #[async_trait]
    impl DumpTool for Writes {
        fn name(&self) -> &str {
            "fake_dump"
        }

        async fn dump_to_file(&self, _: &ConnectionDescriptor, path: &Path) -> Result<()> {
            std::fs::write(path, self.0)?;
            Ok(())
        }
    }

    fn shadow() -> ConnectionDescriptor {
        ConnectionDescriptor::from_url("postgresql://app@localhost/shop_anonymous").unwrap()
    }

    #[tokio::test]
    async fn test_export_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/nested/dump.sql");

        let bytes = export_shadow(&Writes("SELECT 1;\n"), &shadow(), &path)
            .await
            .unwrap();
        assert_eq!(bytes, 10);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "SELECT 1;\n");
    }

    #[tokio::test]
    async fn test_empty_export_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.sql");

        let err = export_shadow(&Writes(""), &shadow(), &path).await.unwrap_err();
        assert!(matches!(err, ShroudError::Copy(CopyError::DumpFileEmpty(_))));
    }
}
