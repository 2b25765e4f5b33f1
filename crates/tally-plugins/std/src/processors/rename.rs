use tally_framework::prelude::*;

/// Renames measurements, tags and fields.
#[register_plugin(processors, "rename")]
#[derive(Default, Configurable)]
pub struct Rename {
    pub replace: Vec<Replace>,
}

/// One rename rule. Exactly one of `measurement`, `tag` or `field` is set.
#[derive(Debug, Clone, Default, PartialEq, Configurable)]
pub struct Replace {
    pub measurement: String,
    pub tag: String,
    pub field: String,
    pub dest: String,
}

impl Replace {
    fn apply(&self, metric: &mut Metric) {
        if !self.measurement.is_empty() {
            if metric.name() == self.measurement {
                metric.set_name(self.dest.clone());
            }
        } else if !self.tag.is_empty() {
            if let Some(value) = metric.tags_mut().remove(&self.tag) {
                metric.tags_mut().insert(self.dest.clone(), value);
            }
        } else if let Some(value) = metric.fields_mut().remove(&self.field) {
            metric.fields_mut().insert(self.dest.clone(), value);
        }
    }
}

impl Processor for Rename {
    fn init(&mut self) -> PluginResult<()> {
        for (index, rule) in self.replace.iter().enumerate() {
            let targets = [&rule.measurement, &rule.tag, &rule.field]
                .iter()
                .filter(|target| !target.is_empty())
                .count();
            if targets != 1 {
                return Err(PluginError::config(format!(
                    "replace[{index}]: exactly one of measurement, tag or field must be set"
                )));
            }
            if rule.dest.is_empty() {
                return Err(PluginError::config(format!(
                    "replace[{index}]: dest must not be empty"
                )));
            }
        }
        Ok(())
    }

    fn apply(&mut self, mut metrics: Vec<Metric>) -> Vec<Metric> {
        for metric in &mut metrics {
            for rule in &self.replace {
                rule.apply(metric);
            }
        }
        metrics
    }
}
