//! In-process metrics registries.
//!
//! Unlike a global recorder installed via
//! `metrics_exporter_prometheus::PrometheusBuilder::install_recorder`, this
//! registry is an explicit, owned struct threaded through the components
//! that report into it — a process-wide registry owned by the observability
//! component, passed explicitly rather than reached for as ambient state.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

/// A stable sorted label set, shared by all three metric kinds.
pub type Labels = Vec<(String, String)>;

fn canonical_key(name: &str, labels: &[(String, String)]) -> String {
    if labels.is_empty() {
        return name.to_string();
    }
    let mut sorted = labels.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    let pairs: Vec<String> = sorted
        .iter()
        .map(|(k, v)| format!("{k}=\"{}\"", escape(v)))
        .collect();
    format!("{name}{{{}}}", pairs.join(","))
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

/// The inverse of `canonical_key`'s label encoding: pulls the value for one
/// label key out of a `name{k1="v1",k2="v2"}` string. Values are assumed not
/// to contain a raw `"` followed by `,` or `}` — true for the label values
/// this registry actually carries (chain keys, reasons, channel names).
fn extract_label(key: &str, label_key: &str) -> Option<String> {
    let braces_start = key.find('{')?;
    let inner = &key[braces_start + 1..key.len() - 1];
    for pair in inner.split(',') {
        let (k, v) = pair.split_once('=')?;
        if k == label_key {
            let v = v.trim_matches('"');
            return Some(v.replace("\\\"", "\"").replace("\\n", "\n").replace("\\\\", "\\"));
        }
    }
    None
}

#[derive(Default)]
struct Histogram {
    count: u64,
    sum: f64,
}

#[derive(Default)]
pub struct Registry {
    counters: Mutex<BTreeMap<String, f64>>,
    gauges: Mutex<BTreeMap<String, f64>>,
    histograms: Mutex<BTreeMap<String, Histogram>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr_counter(&self, name: &str, labels: &[(String, String)], by: f64) {
        let key = canonical_key(name, labels);
        let mut counters = self.counters.lock().unwrap();
        *counters.entry(key).or_insert(0.0) += by;
    }

    pub fn set_gauge(&self, name: &str, labels: &[(String, String)], value: f64) {
        let key = canonical_key(name, labels);
        self.gauges.lock().unwrap().insert(key, value);
    }

    pub fn observe_histogram(&self, name: &str, labels: &[(String, String)], value: f64) {
        let key = canonical_key(name, labels);
        let mut histograms = self.histograms.lock().unwrap();
        let entry = histograms.entry(key).or_default();
        entry.count += 1;
        entry.sum += value;
    }

    /// Reads back every tracked series of `metric` whose canonical key
    /// carries `label_key`, keyed by that label's value — e.g.
    /// `gauges_by_label("indexer_lag_blocks", "chain_key")` recovers the
    /// per-chain lag gauges the indexer sets with `set_gauge`, for callers
    /// (the health snapshot, the alert exporter) that only have the
    /// registry, not the component that wrote the gauge.
    pub fn gauges_by_label(&self, metric: &str, label_key: &str) -> HashMap<String, i64> {
        let prefix = format!("{metric}{{");
        let mut out = HashMap::new();
        for (key, value) in self.gauges.lock().unwrap().iter() {
            if key == metric || key.starts_with(&prefix) {
                if let Some(label_value) = extract_label(key, label_key) {
                    out.insert(label_value, *value as i64);
                }
            }
        }
        out
    }

    /// Renders every tracked series as Prometheus 0.0.4 text exposition.
    pub fn render_prometheus(&self) -> String {
        let mut out = String::new();
        for (key, value) in self.counters.lock().unwrap().iter() {
            out.push_str(&format!("{key} {value}\n"));
        }
        for (key, value) in self.gauges.lock().unwrap().iter() {
            out.push_str(&format!("{key} {value}\n"));
        }
        for (key, hist) in self.histograms.lock().unwrap().iter() {
            out.push_str(&format!("{key}_count {}\n", hist.count));
            out.push_str(&format!("{key}_sum {}\n", hist.sum));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn canonical_key_sorts_labels_lexicographically() {
        let a = canonical_key("delivery_job_skip_total", &labels(&[("reason", "x"), ("channel", "whatsapp")]));
        let b = canonical_key("delivery_job_skip_total", &labels(&[("channel", "whatsapp"), ("reason", "x")]));
        assert_eq!(a, b);
        assert_eq!(a, r#"delivery_job_skip_total{channel="whatsapp",reason="x"}"#);
    }

    #[test]
    fn canonical_key_escapes_quotes_and_newlines() {
        let key = canonical_key("x", &labels(&[("k", "a\"b\nc")]));
        assert_eq!(key, r#"x{k="a\"b\nc"}"#);
    }

    #[test]
    fn counters_accumulate_across_calls() {
        let registry = Registry::new();
        registry.incr_counter("sent_total", &labels(&[]), 1.0);
        registry.incr_counter("sent_total", &labels(&[]), 2.0);
        assert!(registry.render_prometheus().contains("sent_total 3"));
    }

    #[test]
    fn gauges_overwrite_rather_than_accumulate() {
        let registry = Registry::new();
        registry.set_gauge("queue_depth", &labels(&[]), 5.0);
        registry.set_gauge("queue_depth", &labels(&[]), 2.0);
        assert!(registry.render_prometheus().contains("queue_depth 2"));
    }

    #[test]
    fn gauges_by_label_recovers_per_chain_values() {
        let registry = Registry::new();
        registry.set_gauge("indexer_lag_blocks", &labels(&[("chain_key", "base:0xvault")]), 12.0);
        registry.set_gauge("indexer_lag_blocks", &labels(&[("chain_key", "eth:0xother")]), 500.0);
        registry.set_gauge("indexer_latest_block", &labels(&[("chain_key", "base:0xvault")]), 99.0);
        let lag = registry.gauges_by_label("indexer_lag_blocks", "chain_key");
        assert_eq!(lag.len(), 2);
        assert_eq!(lag.get("base:0xvault"), Some(&12));
        assert_eq!(lag.get("eth:0xother"), Some(&500));
    }

    #[test]
    fn histogram_tracks_count_and_sum_only() {
        let registry = Registry::new();
        registry.observe_histogram("latency_ms", &labels(&[]), 10.0);
        registry.observe_histogram("latency_ms", &labels(&[]), 30.0);
        let rendered = registry.render_prometheus();
        assert!(rendered.contains("latency_ms_count 2"));
        assert!(rendered.contains("latency_ms_sum 40"));
    }
}
