//! Job metadata file

use tracing::debug;

use crate::domain::model::JobMetadata;
use crate::error::IndexerResult;
use crate::output::layout::JobWorkspace;
use crate::output::writer::OutputWriter;

/// Write `metadata.json`, replacing any previous version
pub async fn write_metadata(workspace: &JobWorkspace, metadata: &JobMetadata) -> IndexerResult<()> {
    let path = workspace.metadata_path();
    let json = serde_json::to_vec_pretty(metadata)?;
    OutputWriter::new().write_atomic(&path, json).await?;
    debug!(file = %path.display(), title = %metadata.title, "Metadata written");
    Ok(())
}

/// Read `metadata.json` back, `None` when the job has none yet
pub async fn read_metadata(workspace: &JobWorkspace) -> IndexerResult<Option<JobMetadata>> {
    match OutputWriter::new().read_optional(&workspace.metadata_path()).await? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}
