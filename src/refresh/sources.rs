//! Fetchers declared in configuration.
//!
//! Each source fetches one path through a named service client. The result
//! lands in that client's cache, where readers pick it up.

use crate::client::{RequestOptions, ServiceRegistry};
use crate::config::{PayloadFormat, SourceConfig};
use crate::refresh::orchestrator::RefreshOrchestrator;
use crate::refresh::stage::FetcherError;

/// Register every source whose service exists. Returns how many were registered.
pub fn register_sources(
    orchestrator: &RefreshOrchestrator,
    registry: &ServiceRegistry,
    sources: &[SourceConfig],
) -> usize {
    let mut registered = 0;

    for source in sources {
        let Some(client) = registry.client(&source.service) else {
            tracing::warn!(
                label = %source.label,
                service = %source.service,
                "Source references unknown service, skipping"
            );
            continue;
        };

        let path = source.path.clone();
        let format = source.format;
        orchestrator.register(source.tier, source.label.clone(), move || {
            let client = client.clone();
            let path = path.clone();
            async move {
                let result = match format {
                    PayloadFormat::Json => client
                        .get_json(&path, RequestOptions::new())
                        .await
                        .map(drop),
                    PayloadFormat::Text => client
                        .get_text(&path, RequestOptions::new())
                        .await
                        .map(drop),
                };
                result.map_err(FetcherError::from)
            }
        });
        registered += 1;
    }

    tracing::info!(registered, "Configured sources registered");
    registered
}
