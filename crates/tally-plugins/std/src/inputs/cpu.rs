use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, bail};
use tally_framework::prelude::*;

const STAT_PATH: &str = "/proc/stat";
/// Kernel clock ticks per second (`USER_HZ`).
const TICKS_PER_SEC: f64 = 100.0;

const COLUMNS: [&str; 10] = [
    "user",
    "nice",
    "system",
    "idle",
    "iowait",
    "irq",
    "softirq",
    "steal",
    "guest",
    "guest_nice",
];

/// Reports CPU time and utilisation from `/proc/stat`.
#[register_plugin(inputs, "cpu")]
#[derive(Configurable)]
pub struct Cpu {
    /// Report per-CPU statistics.
    pub percpu: bool,
    /// Report statistics summed over all CPUs.
    pub totalcpu: bool,
    /// Report cumulative CPU time in seconds.
    pub collect_cpu_time: bool,
    /// Also report `active`, i.e. everything but idle and iowait.
    pub report_active: bool,

    stat_path: String,
    previous: HashMap<String, CpuTimes>,
}

impl Default for Cpu {
    fn default() -> Self {
        Self {
            percpu: true,
            totalcpu: true,
            collect_cpu_time: false,
            report_active: false,
            stat_path: STAT_PATH.to_string(),
            previous: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct CpuTimes {
    /// Seconds per column, in `COLUMNS` order.
    secs: [f64; 10],
}

impl CpuTimes {
    fn total(&self) -> f64 {
        // guest time is already part of user and nice
        self.secs[..8].iter().sum()
    }

    fn active(&self) -> f64 {
        self.total() - self.secs[3] - self.secs[4]
    }
}

fn parse_stat(text: &str) -> anyhow::Result<Vec<(String, CpuTimes)>> {
    let mut cpus = Vec::new();
    for line in text.lines().filter(|line| line.starts_with("cpu")) {
        let mut parts = line.split_whitespace();
        let Some(label) = parts.next() else { continue };
        let name = if label == "cpu" {
            "cpu-total".to_string()
        } else {
            label.to_string()
        };

        let mut secs = [0.0; 10];
        for (slot, raw) in secs.iter_mut().zip(parts) {
            let ticks: u64 = raw
                .parse()
                .with_context(|| format!("invalid counter '{raw}' for {label}"))?;
            *slot = ticks as f64 / TICKS_PER_SEC;
        }
        cpus.push((name, CpuTimes { secs }));
    }
    if cpus.is_empty() {
        bail!("no cpu lines found");
    }
    Ok(cpus)
}

impl Cpu {
    fn wanted(&self, name: &str) -> bool {
        if name == "cpu-total" {
            self.totalcpu
        } else {
            self.percpu
        }
    }

    fn record(&mut self, acc: &mut Accumulator, name: &str, now: CpuTimes) {
        let tags = BTreeMap::from([("cpu".to_string(), name.to_string())]);

        if self.collect_cpu_time {
            let mut fields: Vec<(String, f64)> = COLUMNS
                .iter()
                .zip(now.secs)
                .map(|(column, secs)| (format!("time_{column}"), secs))
                .collect();
            if self.report_active {
                fields.push(("time_active".to_string(), now.active()));
            }
            acc.add_fields("cpu", fields, tags.clone());
        }

        let Some(last) = self.previous.insert(name.to_string(), now) else {
            return;
        };
        let elapsed = now.total() - last.total();
        if elapsed <= 0.0 {
            return;
        }
        let usage = |now: f64, last: f64| (100.0 * (now - last) / elapsed).clamp(0.0, 100.0);
        let mut fields: Vec<(String, f64)> = COLUMNS
            .iter()
            .enumerate()
            .map(|(i, column)| (format!("usage_{column}"), usage(now.secs[i], last.secs[i])))
            .collect();
        if self.report_active {
            fields.push((
                "usage_active".to_string(),
                usage(now.active(), last.active()),
            ));
        }
        acc.add_fields("cpu", fields, tags);
    }
}

#[async_trait]
impl Input for Cpu {
    fn init(&mut self) -> PluginResult<()> {
        if !self.percpu && !self.totalcpu {
            return Err(PluginError::config(
                "at least one of percpu and totalcpu must be enabled",
            ));
        }
        Ok(())
    }

    async fn gather(&mut self, acc: &mut Accumulator) -> PluginResult<()> {
        let text = tokio::fs::read_to_string(&self.stat_path).await?;
        let cpus = parse_stat(&text).map_err(PluginError::other)?;
        for (name, times) in cpus {
            if self.wanted(&name) {
                self.record(acc, &name, times);
            }
        }
        Ok(())
    }
}
