use chrono::{DateTime, Utc};
use serde::Serialize;

/// One parsed GPX document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Trace {
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    pub tracks: Vec<Track>,
}

impl Trace {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            metadata: None,
            tracks: Vec::new(),
        }
    }

    /// All track points in document order, across every track and segment.
    pub fn points(&self) -> impl Iterator<Item = &TrackPoint> {
        self.tracks
            .iter()
            .flat_map(|trk| trk.segments.iter())
            .flat_map(|seg| seg.points.iter())
    }
}

/// Document-level `<metadata>` block.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<Author>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copyright: Option<Copyright>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<Link>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Author {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Copyright {
    /// Taken from the `author` attribute of `<copyright>`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
}

/// A GPX link element.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Link {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub link_type: Option<String>,
}

/// A GPX track (<trk>). Only segments holding at least one point are kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Track {
    pub segments: Vec<TrackSegment>,
}

/// A GPX track segment (<trkseg>).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackSegment {
    pub points: Vec<TrackPoint>,
}

/// A single `<trkpt>`. `lat` and `lon` are either both set or both unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackPoint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ele: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl TrackPoint {
    /// `(lat, lon)` when the point can be plotted.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}
