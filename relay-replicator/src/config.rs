use relay_config::load_config;
use relay_config::shared::PipelineOptions;

use crate::error::{ReplicatorError, ReplicatorResult};

/// Loads and validates the pipeline options from `configuration/` and `APP_` variables.
pub fn load_replicator_config() -> ReplicatorResult<PipelineOptions> {
    let options = load_config::<PipelineOptions>().map_err(ReplicatorError::config)?;
    options.validate().map_err(ReplicatorError::config)?;

    Ok(options)
}
