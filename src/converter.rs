use chrono::SecondsFormat;
use geojson::{Feature, FeatureCollection, Geometry, Value};
use log::warn;
use serde_json::{Map, Value as JsonValue};

use crate::gpx_types::*;
use crate::options::ConvertOptions;

/// A track point that carries coordinates.
struct Plottable<'a> {
    lat: f64,
    lon: f64,
    point: &'a TrackPoint,
}

/// Convert a parsed trace to a GeoJSON FeatureCollection.
pub fn to_feature_collection(trace: &Trace, opts: &ConvertOptions) -> FeatureCollection {
    let features = trace
        .tracks
        .iter()
        .enumerate()
        .flat_map(|(index, trk)| track_to_features(index, trk, opts))
        .collect();

    let foreign_members = trace
        .metadata
        .as_ref()
        .filter(|_| opts.include_metadata)
        .and_then(|metadata| serde_json::to_value(metadata).ok())
        .map(|metadata| {
            let mut members = Map::new();
            members.insert("metadata".to_string(), metadata);
            members
        });

    FeatureCollection {
        bbox: None,
        features,
        foreign_members,
    }
}

fn track_to_features(index: usize, trk: &Track, opts: &ConvertOptions) -> Vec<Feature> {
    let mut skipped = 0;
    let segments: Vec<Vec<Plottable<'_>>> = trk
        .segments
        .iter()
        .map(|seg| {
            let plottable: Vec<Plottable<'_>> = seg
                .points
                .iter()
                .filter_map(|point| {
                    point
                        .coordinates()
                        .map(|(lat, lon)| Plottable { lat, lon, point })
                })
                .collect();
            skipped += seg.points.len() - plottable.len();
            plottable
        })
        .filter(|seg| !seg.is_empty())
        .collect();

    if skipped > 0 {
        warn!("track {index}: skipped {skipped} points without coordinates");
    }

    if segments.is_empty() {
        return Vec::new();
    }

    // Single point across all segments → Point Feature
    let total_points: usize = segments.iter().map(Vec::len).sum();
    if total_points == 1 {
        return vec![single_point_feature(index, &segments[0][0], opts)];
    }

    let lines: Vec<&[Plottable<'_>]> = segments
        .iter()
        .filter(|seg| seg.len() >= 2)
        .map(Vec::as_slice)
        .collect();

    if opts.join_track_segments || segments.len() == 1 {
        match lines.as_slice() {
            [] => Vec::new(),
            [line] if segments.len() == 1 => vec![line_feature(index, line, opts)],
            _ => vec![multi_line_feature(index, &lines, opts)],
        }
    } else {
        // Each segment as a separate Feature
        lines
            .iter()
            .map(|line| line_feature(index, line, opts))
            .collect()
    }
}

fn line_feature(index: usize, line: &[Plottable<'_>], opts: &ConvertOptions) -> Feature {
    let coords = line
        .iter()
        .map(|pt| point_coords(pt, opts.include_elevation))
        .collect();

    let mut props = track_props(index);
    if opts.include_time {
        let times: Vec<JsonValue> = line.iter().map(time_value).collect();
        if times.iter().any(|t| !t.is_null()) {
            insert_coordinate_times(&mut props, times);
        }
    }

    feature(Value::LineString(coords), props)
}

fn multi_line_feature(index: usize, lines: &[&[Plottable<'_>]], opts: &ConvertOptions) -> Feature {
    let coords = lines
        .iter()
        .map(|line| {
            line.iter()
                .map(|pt| point_coords(pt, opts.include_elevation))
                .collect()
        })
        .collect();

    let mut props = track_props(index);
    if opts.include_time {
        let all_times: Vec<Vec<JsonValue>> = lines
            .iter()
            .map(|line| line.iter().map(time_value).collect())
            .collect();
        if all_times.iter().flatten().any(|t| !t.is_null()) {
            insert_coordinate_times(
                &mut props,
                all_times.into_iter().map(JsonValue::Array).collect(),
            );
        }
    }

    feature(Value::MultiLineString(coords), props)
}

fn single_point_feature(index: usize, pt: &Plottable<'_>, opts: &ConvertOptions) -> Feature {
    let mut props = track_props(index);

    if opts.include_metadata {
        insert_optional(&mut props, "name", &pt.point.name);
        insert_optional(&mut props, "desc", &pt.point.description);
        if let Some(ele) = pt.point.ele.and_then(serde_json::Number::from_f64) {
            props.insert("ele".to_string(), JsonValue::Number(ele));
        }
    }
    if opts.include_time && pt.point.time.is_some() {
        props.insert("time".to_string(), time_value(pt));
    }

    feature(Value::Point(point_coords(pt, opts.include_elevation)), props)
}

fn feature(value: Value, props: Map<String, JsonValue>) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(value)),
        id: None,
        properties: Some(props),
        foreign_members: None,
    }
}

fn track_props(index: usize) -> Map<String, JsonValue> {
    let mut props = Map::new();
    props.insert(
        "gpxType".to_string(),
        JsonValue::String("track".to_string()),
    );
    props.insert("trackIndex".to_string(), JsonValue::Number(index.into()));
    props
}

/// Build [lon, lat] or [lon, lat, ele] coordinate array.
fn point_coords(pt: &Plottable<'_>, include_elevation: bool) -> Vec<f64> {
    match (include_elevation, pt.point.ele) {
        (true, Some(ele)) => vec![pt.lon, pt.lat, ele],
        _ => vec![pt.lon, pt.lat],
    }
}

fn time_value(pt: &Plottable<'_>) -> JsonValue {
    match &pt.point.time {
        Some(t) => JsonValue::String(t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        None => JsonValue::Null,
    }
}

fn insert_optional(props: &mut Map<String, JsonValue>, key: &str, value: &Option<String>) {
    if let Some(v) = value {
        props.insert(key.to_string(), JsonValue::String(v.clone()));
    }
}

fn insert_coordinate_times(props: &mut Map<String, JsonValue>, times: Vec<JsonValue>) {
    let mut coord_props = Map::new();
    coord_props.insert("times".to_string(), JsonValue::Array(times));
    props.insert(
        "coordinateProperties".to_string(),
        JsonValue::Object(coord_props),
    );
}
