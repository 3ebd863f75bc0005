//! Dump/load copy strategy

use crate::adapters::tools::ToolKit;
use crate::domain::{ConnectionDescriptor, Result, ShroudError};

const DUMP_FILE_NAME: &str = "source.sql";

/// Dumps `source` into a private temporary directory and loads it into `shadow`
///
/// Returns the size of the intermediate dump in bytes. The directory is
/// removed on every exit path.
pub async fn dump_and_load(
    tools: &ToolKit,
    source: &ConnectionDescriptor,
    shadow: &ConnectionDescriptor,
) -> Result<u64> {
    let workdir = tempfile::Builder::new()
        .prefix("shroud-copy-")
        .tempdir()
        .map_err(|e| ShroudError::Io(format!("Failed to create temporary directory: {}", e)))?;
    let path = workdir.path().join(DUMP_FILE_NAME);

    tracing::info!(tool = tools.dump.name(), source = %source.safe_display(), "Dumping source database");
    tools.dump.dump_to_file(source, &path).await?;

    let bytes = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
    tracing::info!(
        tool = tools.load.name(),
        shadow = %shadow.safe_display(),
        bytes,
        "Loading dump into shadow database"
    );
    tools.load.load_from_file(shadow, &path).await?;

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::tools::{DumpTool, LoadTool};
    use crate::domain::CopyError;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};

    struct WritingDump(&'static str);

    #[async_trait]
    impl DumpTool for WritingDump {
        fn name(&self) -> &str {
            "fake_dump"
        }

        async fn dump_to_file(&self, _: &ConnectionDescriptor, path: &Path) -> Result<()> {
            std::fs::write(path, self.0)?;
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingLoad {
        seen: Arc<Mutex<Option<(PathBuf, String)>>>,
    }

    #[async_trait]
    impl LoadTool for RecordingLoad {
        fn name(&self) -> &str {
            "fake_load"
        }

        async fn load_from_file(&self, _: &ConnectionDescriptor, path: &Path) -> Result<()> {
            crate::adapters::tools::check_dump_file(path)?;
            let contents = std::fs::read_to_string(path)?;
            *self.seen.lock().unwrap() = Some((path.to_path_buf(), contents));
            Ok(())
        }
    }

    fn descriptors() -> (ConnectionDescriptor, ConnectionDescriptor) {
        let source = ConnectionDescriptor::from_url("postgresql://app@localhost/shop").unwrap();
        let shadow = source.shadow(None).unwrap();
        (source, shadow)
    }

    #[tokio::test]
    async fn test_dump_is_loaded_then_removed() {
        let seen = Arc::new(Mutex::new(None));
        let tools = ToolKit {
            dump: Box::new(WritingDump("CREATE TABLE t ();\n")),
            load: Box::new(RecordingLoad { seen: seen.clone() }),
        };
        let (source, shadow) = descriptors();

        let bytes = dump_and_load(&tools, &source, &shadow).await.unwrap();
        assert_eq!(bytes, 19);

        let (path, contents) = seen.lock().unwrap().clone().unwrap();
        assert_eq!(contents, "CREATE TABLE t ();\n");
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_empty_dump_fails_load() {
        let tools = ToolKit {
            dump: Box::new(WritingDump("")),
            load: Box::new(RecordingLoad::default()),
        };
        let (source, shadow) = descriptors();

        let err = dump_and_load(&tools, &source, &shadow).await.unwrap_err();
        assert!(matches!(err, ShroudError::Copy(CopyError::DumpFileEmpty(_))));
    }
}
