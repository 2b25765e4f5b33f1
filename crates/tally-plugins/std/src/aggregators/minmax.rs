use tally_framework::prelude::*;

type SeriesKey = (String, BTreeMap<String, String>);

/// Emits `<field>_min` and `<field>_max` for every numeric field of every
/// series seen during a period.
#[register_plugin(aggregators, "minmax")]
#[derive(Default, Configurable)]
pub struct MinMax {
    series: BTreeMap<SeriesKey, BTreeMap<String, (f64, f64)>>,
}

impl Aggregator for MinMax {
    fn add(&mut self, metric: &Metric) {
        let key = (metric.name().to_string(), metric.tags().clone());
        let fields = self.series.entry(key).or_default();
        for (name, value) in metric.fields() {
            let Some(value) = value.as_f64() else {
                continue;
            };
            fields
                .entry(name.clone())
                .and_modify(|(min, max)| {
                    *min = min.min(value);
                    *max = max.max(value);
                })
                .or_insert((value, value));
        }
    }

    fn push(&mut self, acc: &mut Accumulator) {
        for ((name, tags), fields) in &self.series {
            let values = fields.iter().flat_map(|(field, (min, max))| {
                [(format!("{field}_min"), *min), (format!("{field}_max"), *max)]
            });
            acc.add_fields(name, values, tags.clone());
        }
    }

    fn reset(&mut self) {
        self.series.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use tally_core::derive_schema;
    use tokio_test::assert_ok;

    use super::*;

    fn sample(host: &str, load: f64) -> Metric {
        Metric::new(
            "system",
            BTreeMap::from([("host".to_string(), host.to_string())]),
            BTreeMap::from([
                ("load1".to_string(), FieldValue::Float(load)),
                ("uptime_format".to_string(), FieldValue::String("up".to_string())),
            ]),
            SystemTime::now(),
        )
    }

    #[test]
    fn tracks_extremes_per_series() {
        let mut agg = MinMax::default();
        for (host, load) in [("a", 1.5), ("a", 0.5), ("b", 3.0), ("a", 2.0)] {
            agg.add(&sample(host, load));
        }

        let mut acc = Accumulator::new();
        agg.push(&mut acc);
        let metrics = acc.into_metrics();
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[0].tags()["host"], "a");
        assert_eq!(metrics[0].fields()["load1_min"].as_f64(), Some(0.5));
        assert_eq!(metrics[0].fields()["load1_max"].as_f64(), Some(2.0));
        assert!(!metrics[0].fields().contains_key("uptime_format_min"));

        agg.reset();
        let mut acc = Accumulator::new();
        agg.push(&mut acc);
        assert!(acc.is_empty());
    }

    #[test]
    fn has_no_configurable_fields() {
        assert!(assert_ok!(derive_schema(&MinMax::default())).is_empty());
    }
}
