use serde::Deserialize;

/// Options for Trace to GeoJSON conversion.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertOptions {
    /// Include elevation as the 3rd coordinate value (default: true)
    #[serde(default = "default_true")]
    pub include_elevation: bool,

    /// Include timestamps in coordinateProperties.times (default: true)
    #[serde(default = "default_true")]
    pub include_time: bool,

    /// Attach the document metadata to the collection, and name/desc/ele to
    /// single-point track features (default: true)
    #[serde(default = "default_true")]
    pub include_metadata: bool,

    /// Join track segments into a single MultiLineString (default: false)
    #[serde(default)]
    pub join_track_segments: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            include_elevation: true,
            include_time: true,
            include_metadata: true,
            join_track_segments: false,
        }
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_use_defaults() {
        let opts: ConvertOptions = serde_json::from_str("{}").unwrap();
        assert!(opts.include_elevation);
        assert!(opts.include_time);
        assert!(opts.include_metadata);
        assert!(!opts.join_track_segments);
    }

    #[test]
    fn test_camel_case_fields() {
        let opts: ConvertOptions =
            serde_json::from_str(r#"{"includeElevation": false, "joinTrackSegments": true}"#)
                .unwrap();
        assert!(!opts.include_elevation);
        assert!(opts.join_track_segments);
        assert!(opts.include_time);
    }
}
