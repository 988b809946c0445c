pub mod converter;
pub mod error;
pub mod gpx_types;
pub mod iso8601;
pub mod options;
pub mod parser;

use wasm_bindgen::prelude::*;

pub use crate::error::ParseError;
pub use crate::gpx_types::{Author, Copyright, Link, Metadata, Trace, Track, TrackPoint, TrackSegment};
pub use crate::parser::{import_gpx_trace, parse_trace};

use crate::options::ConvertOptions;

/// Route `log` output to the browser console.
#[cfg(feature = "console_log")]
#[wasm_bindgen(js_name = initLogging)]
pub fn init_logging(level: Option<String>) -> Result<(), JsValue> {
    console_error_panic_hook::set_once();

    let level = match level.as_deref() {
        None => log::Level::Info,
        Some(s) => s
            .parse::<log::Level>()
            .map_err(|e| JsValue::from_str(&e.to_string()))?,
    };
    console_log::init_with_level(level).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Parse a GPX string into a trace, returned as a JS object.
#[wasm_bindgen(js_name = parseGpxTrace)]
pub fn parse_gpx_trace(gpx_string: &str, filename: &str) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();

    let trace = parse_trace(gpx_string, filename)?;
    serde_wasm_bindgen::to_value(&trace).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Convert the tracks of a GPX string to GeoJSON, returned as a JS object.
#[wasm_bindgen(js_name = gpxTraceToGeoJson)]
pub fn gpx_trace_to_geojson(gpx_string: &str, options: JsValue) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();

    let opts = parse_options(options)?;
    let trace = parse_trace(gpx_string, "")?;
    let fc = converter::to_feature_collection(&trace, &opts);
    serde_wasm_bindgen::to_value(&fc).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Convert the tracks of a GPX string to GeoJSON, returned as a JSON string.
#[wasm_bindgen(js_name = gpxTraceToGeoJsonString)]
pub fn gpx_trace_to_geojson_string(gpx_string: &str, options: JsValue) -> Result<String, JsValue> {
    console_error_panic_hook::set_once();

    let opts = parse_options(options)?;
    let trace = parse_trace(gpx_string, "")?;
    let fc = converter::to_feature_collection(&trace, &opts);
    serde_json::to_string(&fc).map_err(|e| JsValue::from_str(&e.to_string()))
}

fn parse_options(options: JsValue) -> Result<ConvertOptions, JsValue> {
    if options.is_undefined() || options.is_null() {
        Ok(ConvertOptions::default())
    } else {
        serde_wasm_bindgen::from_value(options).map_err(|e| JsValue::from_str(&e.to_string()))
    }
}
