//! Metrics collection and reporting using metrics-rs.
//!
//! Library code only emits counters through the `metrics` facade. The CLI
//! installs [`CliRecorder`] to print them at exit.

use std::sync::Arc;

use metrics::{
    Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit,
    describe_counter,
};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// Register metric descriptions. Call once at startup.
pub fn init() {
    describe_counter!(
        "nvpm_instructions_decoded_total",
        Unit::Count,
        "Instructions decoded while scanning for field signatures"
    );
    describe_counter!(
        "nvpm_fields_resolved_total",
        Unit::Count,
        "Driver field offsets resolved"
    );
    describe_counter!(
        "nvpm_fields_missing_total",
        Unit::Count,
        "Driver field offsets that could not be located"
    );
    describe_counter!(
        "nvpm_apst_enabled_total",
        Unit::Count,
        "Controllers with APST enabled"
    );
    describe_counter!(
        "nvpm_feature_commands_failed_total",
        Unit::Count,
        "Admin feature commands that failed"
    );
}

#[derive(Default)]
struct CounterStorage {
    values: RwLock<FxHashMap<String, u64>>,
}

struct CliCounter {
    key: String,
    storage: Arc<CounterStorage>,
}

impl metrics::CounterFn for CliCounter {
    fn increment(&self, value: u64) {
        let mut values = self.storage.values.write();
        *values.entry(self.key.clone()).or_insert(0) += value;
    }

    fn absolute(&self, value: u64) {
        let mut values = self.storage.values.write();
        values.insert(self.key.clone(), value);
    }
}

/// Recorder keeping counters in memory for a summary at exit.
///
/// Gauges and histograms are not used and are discarded.
#[derive(Default)]
pub struct CliRecorder {
    counters: Arc<CounterStorage>,
}

impl CliRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install as the global recorder. `None` if one is already installed.
    pub fn install(self) -> Option<CliRecorderHandle> {
        let counters = Arc::clone(&self.counters);
        metrics::set_global_recorder(self).ok()?;
        Some(CliRecorderHandle { counters })
    }
}

fn key_to_string(key: &Key) -> String {
    let name = key.name();
    let labels = key.labels();
    if labels.len() == 0 {
        name.to_string()
    } else {
        let label_str: Vec<String> = labels
            .map(|l| format!("{}={}", l.key(), l.value()))
            .collect();
        format!("{}{{{}}}", name, label_str.join(","))
    }
}

impl Recorder for CliRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        Counter::from_arc(Arc::new(CliCounter {
            key: key_to_string(key),
            storage: Arc::clone(&self.counters),
        }))
    }

    fn register_gauge(&self, _key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        Gauge::noop()
    }

    fn register_histogram(&self, _key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        Histogram::noop()
    }
}

/// Access to counters recorded by an installed [`CliRecorder`].
pub struct CliRecorderHandle {
    counters: Arc<CounterStorage>,
}

impl CliRecorderHandle {
    pub fn get_counter(&self, key: &str) -> Option<u64> {
        self.counters.values.read().get(key).copied()
    }

    pub fn all_counters(&self) -> FxHashMap<String, u64> {
        self.counters.values.read().clone()
    }

    pub fn print_summary(&self) {
        let counters = self.counters.values.read();
        if counters.is_empty() {
            println!("No metrics collected.");
            return;
        }

        println!();
        println!("## Metrics Summary");
        println!();
        println!("### Counters");
        let mut entries: Vec<_> = counters.iter().collect();
        entries.sort();
        for (key, value) in entries {
            println!("  {key}: {value}");
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics::Label;

    #[test]
    fn test_key_to_string() {
        let key = Key::from_name("nvpm_fields_resolved_total");
        assert_eq!(key_to_string(&key), "nvpm_fields_resolved_total");

        let key = Key::from_parts(
            "nvpm_fields_missing_total",
            vec![Label::new("field", "request.result")],
        );
        assert_eq!(
            key_to_string(&key),
            "nvpm_fields_missing_total{field=request.result}"
        );
    }

    #[test]
    fn test_cli_counter_storage() {
        let recorder = CliRecorder::new();
        let counter = CliCounter {
            key: "nvpm_apst_enabled_total".to_string(),
            storage: Arc::clone(&recorder.counters),
        };
        metrics::CounterFn::increment(&counter, 2);
        metrics::CounterFn::increment(&counter, 1);
        assert_eq!(
            recorder.counters.values.read().get("nvpm_apst_enabled_total"),
            Some(&3)
        );
        metrics::CounterFn::absolute(&counter, 10);
        assert_eq!(
            recorder.counters.values.read().get("nvpm_apst_enabled_total"),
            Some(&10)
        );
    }

    #[test]
    fn test_local_recorder() {
        let recorder = CliRecorder::new();
        let handle = CliRecorderHandle {
            counters: Arc::clone(&recorder.counters),
        };
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!("nvpm_feature_commands_failed_total").increment(1);
        });
        assert_eq!(handle.get_counter("nvpm_feature_commands_failed_total"), Some(1));
        assert_eq!(handle.all_counters().len(), 1);
    }
}
