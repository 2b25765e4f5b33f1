use std::collections::BTreeMap;

use glob::Pattern;
use tally_core::Configurable;

use crate::error::FilterError;
use crate::metric::Metric;

/// Metric selection and modification rules shared by every plugin kind.
///
/// Selection (`namepass`, `namedrop`, `tagpass`, `tagdrop`) decides whether
/// a plugin sees a metric at all; modification (`fieldpass`, `fielddrop`,
/// `taginclude`, `tagexclude`) trims what it sees. All options take glob
/// patterns. [`Filter::compile`] must run before use; an uncompiled filter
/// passes everything.
#[derive(Debug, Clone, Default, Configurable)]
pub struct Filter {
    pub namepass: Vec<String>,
    pub namedrop: Vec<String>,
    pub fieldpass: Vec<String>,
    pub fielddrop: Vec<String>,
    pub tagpass: BTreeMap<String, Vec<String>>,
    pub tagdrop: BTreeMap<String, Vec<String>>,
    pub taginclude: Vec<String>,
    pub tagexclude: Vec<String>,
    compiled: Option<Compiled>,
}

#[derive(Debug, Clone, Default)]
struct Compiled {
    namepass: Vec<Pattern>,
    namedrop: Vec<Pattern>,
    fieldpass: Vec<Pattern>,
    fielddrop: Vec<Pattern>,
    tagpass: Vec<(String, Vec<Pattern>)>,
    tagdrop: Vec<(String, Vec<Pattern>)>,
    taginclude: Vec<Pattern>,
    tagexclude: Vec<Pattern>,
}

fn compile_list(option: &'static str, patterns: &[String]) -> Result<Vec<Pattern>, FilterError> {
    patterns
        .iter()
        .map(|pattern| {
            Pattern::new(pattern).map_err(|source| FilterError {
                option,
                pattern: pattern.clone(),
                source,
            })
        })
        .collect()
}

fn compile_tags(
    option: &'static str,
    rules: &BTreeMap<String, Vec<String>>,
) -> Result<Vec<(String, Vec<Pattern>)>, FilterError> {
    rules
        .iter()
        .map(|(key, patterns)| Ok((key.clone(), compile_list(option, patterns)?)))
        .collect()
}

fn any_match(patterns: &[Pattern], text: &str) -> bool {
    patterns.iter().any(|pattern| pattern.matches(text))
}

fn tags_match(rules: &[(String, Vec<Pattern>)], metric: &Metric) -> bool {
    rules.iter().any(|(key, patterns)| {
        metric
            .tags()
            .get(key)
            .is_some_and(|value| any_match(patterns, value))
    })
}

impl Filter {
    /// Compiles the glob patterns.
    pub fn compile(&mut self) -> Result<(), FilterError> {
        self.compiled = Some(Compiled {
            namepass: compile_list("namepass", &self.namepass)?,
            namedrop: compile_list("namedrop", &self.namedrop)?,
            fieldpass: compile_list("fieldpass", &self.fieldpass)?,
            fielddrop: compile_list("fielddrop", &self.fielddrop)?,
            tagpass: compile_tags("tagpass", &self.tagpass)?,
            tagdrop: compile_tags("tagdrop", &self.tagdrop)?,
            taginclude: compile_list("taginclude", &self.taginclude)?,
            tagexclude: compile_list("tagexclude", &self.tagexclude)?,
        });
        Ok(())
    }

    /// Returns `true` when any option is set.
    pub fn is_active(&self) -> bool {
        self.compiled.as_ref().is_some_and(|c| {
            !(c.namepass.is_empty()
                && c.namedrop.is_empty()
                && c.fieldpass.is_empty()
                && c.fielddrop.is_empty()
                && c.tagpass.is_empty()
                && c.tagdrop.is_empty()
                && c.taginclude.is_empty()
                && c.tagexclude.is_empty())
        })
    }

    /// Decides whether a plugin should see `metric`.
    pub fn select(&self, metric: &Metric) -> bool {
        let Some(c) = &self.compiled else {
            return true;
        };
        if !c.namepass.is_empty() && !any_match(&c.namepass, metric.name()) {
            return false;
        }
        if any_match(&c.namedrop, metric.name()) {
            return false;
        }
        if !c.tagpass.is_empty() && !tags_match(&c.tagpass, metric) {
            return false;
        }
        !tags_match(&c.tagdrop, metric)
    }

    /// Removes the fields and tags the filter excludes.
    pub fn modify(&self, metric: &mut Metric) {
        let Some(c) = &self.compiled else {
            return;
        };
        if !c.fieldpass.is_empty() {
            metric.fields_mut().retain(|key, _| any_match(&c.fieldpass, key));
        }
        if !c.fielddrop.is_empty() {
            metric.fields_mut().retain(|key, _| !any_match(&c.fielddrop, key));
        }
        if !c.taginclude.is_empty() {
            metric.tags_mut().retain(|key, _| any_match(&c.taginclude, key));
        }
        if !c.tagexclude.is_empty() {
            metric.tags_mut().retain(|key, _| !any_match(&c.tagexclude, key));
        }
    }

    /// Selects and modifies; `None` when the metric is dropped or left
    /// without fields.
    pub fn apply(&self, mut metric: Metric) -> Option<Metric> {
        if !self.select(&metric) {
            return None;
        }
        self.modify(&mut metric);
        (!metric.fields().is_empty()).then_some(metric)
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use serde_json::json;
    use tally_core::bind;

    use super::*;
    use crate::metric::FieldValue;

    fn metric(name: &str, tags: &[(&str, &str)], fields: &[&str]) -> Metric {
        Metric::new(
            name,
            tags.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            fields
                .iter()
                .map(|k| (k.to_string(), FieldValue::Integer(1)))
                .collect(),
            SystemTime::now(),
        )
    }

    fn filter(fields: serde_json::Value) -> Filter {
        let mut filter = Filter::default();
        bind(&mut filter, fields.as_object().unwrap()).unwrap();
        filter.compile().unwrap();
        filter
    }

    #[test]
    fn uncompiled_passes_everything() {
        let filter = Filter {
            namepass: vec!["mem".into()],
            ..Filter::default()
        };
        assert!(filter.select(&metric("cpu", &[], &["a"])));
        assert!(!filter.is_active());
    }

    #[test]
    fn name_rules() {
        let filter = filter(json!({"namepass": ["cpu*"], "namedrop": ["cpu_temp"]}));
        assert!(filter.is_active());
        assert!(filter.select(&metric("cpu", &[], &["a"])));
        assert!(!filter.select(&metric("cpu_temp", &[], &["a"])));
        assert!(!filter.select(&metric("mem", &[], &["a"])));
    }

    #[test]
    fn tag_rules() {
        let filter = filter(json!({"tagpass": {"cpu": ["cpu0", "cpu1"]}, "tagdrop": {"host": ["test*"]}}));
        assert!(filter.select(&metric("cpu", &[("cpu", "cpu1")], &["a"])));
        assert!(!filter.select(&metric("cpu", &[("cpu", "cpu7")], &["a"])));
        assert!(!filter.select(&metric("cpu", &[("cpu", "cpu0"), ("host", "test-1")], &["a"])));
    }

    #[test]
    fn modification_rules() {
        let filter = filter(json!({"fielddrop": ["time_*"], "tagexclude": ["host"]}));
        let kept = filter
            .apply(metric("cpu", &[("host", "a"), ("cpu", "0")], &["usage", "time_user"]))
            .unwrap();
        assert_eq!(kept.fields().keys().collect::<Vec<_>>(), vec!["usage"]);
        assert_eq!(kept.tags().keys().collect::<Vec<_>>(), vec!["cpu"]);

        assert!(filter.apply(metric("cpu", &[], &["time_idle"])).is_none());
    }

    #[test]
    fn invalid_pattern() {
        let mut filter = Filter {
            namepass: vec!["[".into()],
            ..Filter::default()
        };
        let err = filter.compile().unwrap_err();
        assert_eq!(err.option, "namepass");
    }
}
