use tally_framework::prelude::*;

/// Accepts every batch and drops it.
#[register_plugin(outputs, "discard")]
#[derive(Default, Configurable)]
pub struct Discard {}

#[async_trait]
impl Output for Discard {
    async fn write(&mut self, _metrics: &[Metric]) -> PluginResult<()> {
        Ok(())
    }
}
