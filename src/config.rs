// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Engine configuration

use serde::{Deserialize, Serialize};

/// Configuration for [`OgnlEngine`](crate::OgnlEngine)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Record an evaluation frame for every node visited
    pub trace_evaluations: bool,
    /// Keep the outermost frame of the last traced call on the context
    pub keep_last_evaluation: bool,
    /// Cache method resolutions by class, name and argument types
    pub enable_resolution_cache: bool,
    /// Entries held before the resolution cache is cleared
    pub max_resolution_cache_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            trace_evaluations: false,
            keep_last_evaluation: false,
            enable_resolution_cache: true,
            max_resolution_cache_size: 4096,
        }
    }
}

impl EngineConfig {
    pub fn with_trace_evaluations(mut self, enabled: bool) -> Self {
        self.trace_evaluations = enabled;
        self
    }

    pub fn with_keep_last_evaluation(mut self, keep: bool) -> Self {
        self.keep_last_evaluation = keep;
        self
    }

    pub fn with_resolution_cache(mut self, enabled: bool) -> Self {
        self.enable_resolution_cache = enabled;
        self
    }

    pub fn with_max_resolution_cache_size(mut self, size: usize) -> Self {
        self.max_resolution_cache_size = size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: EngineConfig = serde_json::from_value(json!({ "trace_evaluations": true })).unwrap();
        assert_eq!(config, EngineConfig::default().with_trace_evaluations(true));
    }
}
