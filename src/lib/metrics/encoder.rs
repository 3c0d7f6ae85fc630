//! Text exposition format, one sample per line:
//!
//! ```text
//! name{key="value",...} value timestamp000
//! ```
//!
//! The timestamp is in epoch seconds with `000` appended, as the collector
//! expects milliseconds.

/// Ordered label set. Keys are unique and keep their insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Labels(Vec<(String, String)>);

impl Labels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key`, replacing the value in place when it is already present.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, existing)) => *existing = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(|c: char| c.is_whitespace() || c == '{' || c == '}')
}

/// Render one sample, without a trailing newline.
///
/// Label values are written as they are, callers must not pass values with
/// quotes or line breaks.
pub fn encode(name: &str, value: f64, labels: &Labels, timestamp: i64) -> String {
    debug_assert!(is_valid_name(name), "Invalid metric name: {name:?}");

    let mut line = String::from(name);

    if !labels.is_empty() {
        let labels = labels
            .iter()
            .map(|(key, value)| format!("{key}=\"{value}\""))
            .collect::<Vec<String>>()
            .join(",");
        line.push('{');
        line.push_str(&labels);
        line.push('}');
    }

    // Debug keeps the shortest round-trip representation and the `.0` of whole numbers
    line.push_str(&format!(" {value:?} {timestamp}000"));
    line
}

/// Current time in the resolution samples are stamped with, epoch seconds.
pub fn timestamp_now() -> i64 {
    chrono::Utc::now().timestamp()
}
