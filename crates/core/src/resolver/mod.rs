use std::sync::Arc;

use crate::error::JobError;
use crate::service::ProcessorRegistry;
use crate::types::ProcessorDescriptor;

/// Looks up the newest registered instance of a processing capability.
pub struct ProcessorResolver {
    registry: Arc<dyn ProcessorRegistry>,
}

impl ProcessorResolver {
    pub fn new(registry: Arc<dyn ProcessorRegistry>) -> Self {
        ProcessorResolver { registry }
    }

    pub async fn resolve(&self, name: &str) -> Result<ProcessorDescriptor, JobError> {
        let descriptors = self.registry.list_processors(name).await?;
        let processor = select_latest(name, descriptors)
            .ok_or_else(|| JobError::UnknownProcessor(name.to_string()))?;
        tracing::info!("resolved media processor {processor}");
        Ok(processor)
    }
}

/// Picks the descriptor named `name` with the greatest version. On equal
/// versions the one listed last wins. Descriptors with an unparsable version
/// are skipped.
pub fn select_latest(
    name: &str,
    descriptors: impl IntoIterator<Item = ProcessorDescriptor>,
) -> Option<ProcessorDescriptor> {
    descriptors
        .into_iter()
        .filter(|descriptor| descriptor.name == name)
        .filter_map(|descriptor| match descriptor.parsed_version() {
            Ok(version) => Some((version, descriptor)),
            Err(err) => {
                tracing::warn!("skipping media processor {descriptor}: {err}");
                None
            }
        })
        // Iterator::max_by returns the last of equal elements.
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, descriptor)| descriptor)
}
