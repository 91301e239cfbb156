//! Source factory
//!
//! Builds the configured source backends.

use crate::adapters::mongo::{MongoSource, MongoStore};
use crate::adapters::nightscout::NightscoutSource;
use crate::adapters::source::{DataSource, RecordSource};
use crate::config::ExporterConfig;
use crate::domain::Result;

/// Create every source configured in `config`
///
/// The local database source comes first when both are configured. Remote
/// sources are returned unauthorized; the pipeline authorizes them before
/// loading.
///
/// # Errors
///
/// Returns an error if a backend client cannot be constructed. Sources built
/// before the failure are closed first.
pub async fn create_sources(config: &ExporterConfig) -> Result<Vec<DataSource>> {
    let mut sources = Vec::with_capacity(config.source_count());

    if let Some(ref mongo) = config.mongo {
        tracing::info!(database = %mongo.database, "Creating MongoDB source");
        let store = MongoStore::connect(mongo).await?;
        sources.push(MongoSource::new(Box::new(store), mongo.user.clone()).into());
    }

    if let Some(ref nightscout) = config.nightscout {
        tracing::info!(base_url = %nightscout.base_url, "Creating Nightscout API source");
        match NightscoutSource::new(nightscout) {
            Ok(source) => sources.push(source.into()),
            Err(e) => {
                release_sources(&sources).await;
                return Err(e);
            }
        }
    }

    Ok(sources)
}

/// Close every source, logging close failures
pub async fn release_sources(sources: &[DataSource]) {
    for source in sources {
        if let Err(e) = source.close().await {
            tracing::warn!(source = source.name(), error = %e, "Failed to close source");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mongo::MemoryStore;

    #[tokio::test]
    async fn test_release_sources_closes_each_once() {
        let first = MemoryStore::new();
        let second = MemoryStore::new();
        let sources: Vec<DataSource> = vec![
            MongoSource::new(Box::new(first.clone()), None).into(),
            MongoSource::new(Box::new(second.clone()), Some("bob".to_string())).into(),
        ];

        release_sources(&sources).await;

        assert_eq!(first.close_count(), 1);
        assert_eq!(second.close_count(), 1);
    }
}
