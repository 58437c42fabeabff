use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Parallel upload limit applied when none (or zero) is configured
pub const DEFAULT_PARALLEL_UPLOADS_LIMIT: u32 = 1;

/// Options sent to the transfer service with `initManager`.
///
/// Keys this crate does not know about are kept in `extra` so the service
/// receives the caller's configuration as given.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_uploads_limit: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ManagerOptions {
    pub fn with_parallel_uploads_limit(mut self, limit: u32) -> Self {
        self.parallel_uploads_limit = Some(limit);
        self
    }

    /// Fill in defaults. Only the parallel limit has one.
    pub(crate) fn finalize(mut self) -> Self {
        if matches!(self.parallel_uploads_limit, None | Some(0)) {
            self.parallel_uploads_limit = Some(DEFAULT_PARALLEL_UPLOADS_LIMIT);
        }
        self
    }

    pub fn parallel_uploads_limit(&self) -> u32 {
        self.parallel_uploads_limit
            .filter(|limit| *limit > 0)
            .unwrap_or(DEFAULT_PARALLEL_UPLOADS_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::ManagerOptions;
    use serde_json::json;

    #[test]
    fn finalize_defaults_missing_and_zero_limits() {
        let options = ManagerOptions::default().finalize();
        assert_eq!(options.parallel_uploads_limit, Some(1));

        let options = ManagerOptions::default()
            .with_parallel_uploads_limit(0)
            .finalize();
        assert_eq!(options.parallel_uploads_limit, Some(1));

        let options = ManagerOptions::default()
            .with_parallel_uploads_limit(4)
            .finalize();
        assert_eq!(options.parallel_uploads_limit(), 4);
    }

    #[test]
    fn unknown_options_pass_through() {
        let options: ManagerOptions =
            serde_json::from_value(json!({ "parallelUploadsLimit": 3, "wifiOnly": true }))
                .unwrap();
        assert_eq!(options.parallel_uploads_limit, Some(3));
        assert_eq!(
            serde_json::to_value(options.finalize()).unwrap(),
            json!({ "parallelUploadsLimit": 3, "wifiOnly": true })
        );
    }
}
