use camino::Utf8PathBuf;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::services::DispatchError;

/// How the event threshold is derived from the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdType {
    /// Baseline tracked by an exponential filter (see `filter_parameter`)
    #[default]
    Adaptive,
    Fixed,
}

/// Which excursions from the baseline count as events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdDirection {
    Positive,
    #[default]
    Negative,
    Both,
}

/// Immutable parameter set for one analysis dispatch.
///
/// The request is owned by the caller and copied into the worker at launch.
/// Nothing in the dispatch path mutates it afterwards; out-of-process workers
/// receive it as a single JSON line on stdin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkRequest {
    /// Data files to analyze, in order
    pub files: Vec<Utf8PathBuf>,

    #[serde(default)]
    pub threshold_type: ThresholdType,

    /// Filter coefficient for the adaptive baseline, in (0, 1)
    #[serde(default = "default_filter_parameter")]
    pub filter_parameter: f64,

    #[serde(default)]
    pub threshold_direction: ThresholdDirection,

    /// Shortest event to report, in samples
    #[serde(default = "default_min_event_length")]
    pub min_event_length: f64,

    /// Longest event to report, in samples
    #[serde(default = "default_max_event_length")]
    pub max_event_length: f64,

    #[serde(default)]
    pub decimate: bool,

    /// Additional named parameters forwarded verbatim to the worker
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub extra: IndexMap<String, String>,
}

fn default_filter_parameter() -> f64 {
    0.93
}

fn default_min_event_length() -> f64 {
    10.0
}

fn default_max_event_length() -> f64 {
    1000.0
}

impl WorkRequest {
    /// Create a request for the given files with default detection parameters
    pub fn new<I, P>(files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Utf8PathBuf>,
    {
        Self {
            files: files.into_iter().map(Into::into).collect(),
            threshold_type: ThresholdType::default(),
            filter_parameter: default_filter_parameter(),
            threshold_direction: ThresholdDirection::default(),
            min_event_length: default_min_event_length(),
            max_event_length: default_max_event_length(),
            decimate: false,
            extra: IndexMap::new(),
        }
    }

    pub fn with_threshold(mut self, threshold_type: ThresholdType, filter_parameter: f64) -> Self {
        self.threshold_type = threshold_type;
        self.filter_parameter = filter_parameter;
        self
    }

    pub fn with_direction(mut self, direction: ThresholdDirection) -> Self {
        self.threshold_direction = direction;
        self
    }

    pub fn with_event_length(mut self, min: f64, max: f64) -> Self {
        self.min_event_length = min;
        self.max_event_length = max;
        self
    }

    pub fn with_decimation(mut self, decimate: bool) -> Self {
        self.decimate = decimate;
        self
    }

    /// Attach an extra named parameter for the worker
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }

    /// Check the request before it is handed to a launcher
    ///
    /// # Errors
    /// Returns [`DispatchError::InvalidRequest`] if there are no files, the event
    /// length window is empty or non-positive, or the filter parameter is outside (0, 1).
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.files.is_empty() {
            return Err(DispatchError::InvalidRequest(
                "no data files selected".to_string(),
            ));
        }

        if !(self.min_event_length > 0.0) || !(self.max_event_length > 0.0) {
            return Err(DispatchError::InvalidRequest(format!(
                "event lengths must be positive (min {}, max {})",
                self.min_event_length, self.max_event_length
            )));
        }

        if self.min_event_length > self.max_event_length {
            return Err(DispatchError::InvalidRequest(format!(
                "minimum event length {} exceeds maximum {}",
                self.min_event_length, self.max_event_length
            )));
        }

        if !(self.filter_parameter > 0.0 && self.filter_parameter < 1.0) {
            return Err(DispatchError::InvalidRequest(format!(
                "filter parameter {} must lie strictly between 0 and 1",
                self.filter_parameter
            )));
        }

        Ok(())
    }
}

/// Portion of a trace to open for display
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlotRange {
    #[default]
    All,
    /// Time window in seconds
    Window { start: f64, end: f64 },
}

/// Options for a one-shot load (opening a single file for display)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LoadOptions {
    #[serde(default)]
    pub plot_range: PlotRange,

    #[serde(default)]
    pub decimate: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_detection_presets() {
        let request = WorkRequest::new(["trace.log"]);
        assert_eq!(request.threshold_type, ThresholdType::Adaptive);
        assert_eq!(request.threshold_direction, ThresholdDirection::Negative);
        assert_eq!(request.filter_parameter, 0.93);
        assert_eq!(request.min_event_length, 10.0);
        assert_eq!(request.max_event_length, 1000.0);
        assert!(!request.decimate);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_file_list() {
        let request = WorkRequest::new(Vec::<Utf8PathBuf>::new());
        assert!(matches!(
            request.validate(),
            Err(DispatchError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_validate_rejects_inverted_window() {
        let request = WorkRequest::new(["a.log"]).with_event_length(500.0, 20.0);
        let err = request.validate().unwrap_err();
        assert!(err.to_string().contains("exceeds"));
    }

    #[test]
    fn test_validate_rejects_filter_out_of_range() {
        let request = WorkRequest::new(["a.log"]).with_threshold(ThresholdType::Adaptive, 1.0);
        assert!(request.validate().is_err());

        let request = WorkRequest::new(["a.log"]).with_threshold(ThresholdType::Fixed, f64::NAN);
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_extra_parameters_keep_insertion_order() {
        let request = WorkRequest::new(["a.log"])
            .with_parameter("zeta", "1")
            .with_parameter("alpha", "2");

        let keys: Vec<&str> = request.extra.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_request_json_fills_defaults() {
        let request: WorkRequest = serde_json::from_str(r#"{"files":["x.log"]}"#).unwrap();
        assert_eq!(request, WorkRequest::new(["x.log"]));
    }
}
