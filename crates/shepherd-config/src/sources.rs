use std::collections::BTreeMap;

use crate::model::{Config, ConfigSource};

impl Config {
    /// Effective configuration as `key -> (value, source)`, sorted by key.
    #[must_use]
    pub fn effective_config(&self) -> BTreeMap<String, (String, String)> {
        let mut config = BTreeMap::new();
        let mut add = |key: &str, value: String| {
            let source = self
                .source_attribution
                .get(key)
                .unwrap_or(&ConfigSource::Defaults)
                .to_string();
            config.insert(key.to_string(), (value, source));
        };

        add(
            "runner.expected_exit_code",
            self.runner.expected_exit_code.to_string(),
        );
        add("runner.reader", self.runner.reader.to_string());
        add(
            "runner.idle_timeout_ms",
            self.runner.idle_timeout_ms.to_string(),
        );
        add(
            "runner.poll_interval_ms",
            self.runner.poll_interval_ms.to_string(),
        );
        add(
            "runner.timeout_secs",
            self.runner
                .timeout_secs
                .map_or_else(|| "none".to_string(), |secs| secs.to_string()),
        );
        add(
            "runner.destroy_on_shutdown",
            self.runner.destroy_on_shutdown.to_string(),
        );
        add("dumps.dir", self.dumps.dir.display().to_string());
        add("dumps.recent_lines", self.dumps.recent_lines.to_string());
        add("scripts.dir", self.scripts.dir.display().to_string());
        add("scripts.shell", self.scripts.shell.clone());

        config
    }
}
