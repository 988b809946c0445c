use std::borrow::Cow;
use std::path::Path;

use chrono::{DateTime, Utc};
use encoding_rs::{Encoding, UTF_8};
use log::{debug, trace};
use quick_xml::escape::unescape;
use quick_xml::events::{BytesRef, BytesStart, Event};
use quick_xml::{NsReader, Reader};
use quick_xml::name::{Namespace, ResolveResult};

use crate::error::ParseError;
use crate::gpx_types::*;
use crate::iso8601::parse_date;

type Result<T> = std::result::Result<T, ParseError>;
type XmlReader<'a> = NsReader<&'a [u8]>;

/// The only namespace whose elements are recognised.
pub const GPX_NS: &str = "http://www.topografix.com/GPX/1/1";

/// An element whose start tag has just been read.
/// Unless `empty`, its content is still pending in the reader.
pub(crate) struct Node<'a> {
    start: BytesStart<'a>,
    in_gpx_ns: bool,
    empty: bool,
}

/// Local name of `node` if it lives in the GPX namespace.
fn gpx_name<'n>(node: &'n Node<'_>) -> Option<&'n [u8]> {
    if node.in_gpx_ns {
        Some(node.start.local_name().into_inner())
    } else {
        None
    }
}

/// True when `node` is `{GPX_NS}tag`.
pub(crate) fn match_node(node: &Node<'_>, tag: &str) -> bool {
    gpx_name(node) == Some(tag.as_bytes())
}

/// Import a GPX file from disk, decoding it as its BOM or XML declaration says.
pub fn import_gpx_trace(path: impl AsRef<Path>) -> Result<Trace> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let xml = decode_document(&bytes)?;
    parse_trace(&xml, &path.display().to_string())
}

/// Decode raw document bytes to UTF-8. A BOM wins over the declared
/// encoding; without either the document must be UTF-8.
fn decode_document(bytes: &[u8]) -> Result<Cow<'_, str>> {
    let (encoding, body) = match Encoding::for_bom(bytes) {
        Some((encoding, bom_len)) => (encoding, &bytes[bom_len..]),
        None => (declared_encoding(bytes)?.unwrap_or(UTF_8), bytes),
    };
    encoding
        .decode_without_bom_handling_and_without_replacement(body)
        .ok_or(ParseError::Encoding {
            encoding: encoding.name(),
        })
}

/// Encoding named by the `<?xml ... encoding="..."?>` declaration, if any.
fn declared_encoding(bytes: &[u8]) -> Result<Option<&'static Encoding>> {
    let mut reader = Reader::from_reader(bytes);
    let Event::Decl(decl) = reader.read_event()? else {
        return Ok(None);
    };
    let Some(label) = decl.encoding() else {
        return Ok(None);
    };
    let label = label?;
    // UTF-16 declared without a BOM is read as UTF-8.
    Encoding::for_label(&label)
        .map(|encoding| Some(encoding.output_encoding()))
        .ok_or_else(|| ParseError::UnknownEncoding {
            label: String::from_utf8_lossy(&label).into_owned(),
        })
}

/// Parse a GPX 1.1 document into a [`Trace`]. `filename` identifies the source.
pub fn parse_trace(xml: &str, filename: &str) -> Result<Trace> {
    let xml = xml.strip_prefix('\u{feff}').unwrap_or(xml);
    let mut reader = NsReader::from_str(xml);

    let root = read_root(&mut reader)?;
    if !match_node(&root, "gpx") {
        return Err(ParseError::NotGpx {
            found: format!("root element <{}>", qualified_name(&root)),
        });
    }

    let mut trace = Trace::new(filename);

    if !root.empty {
        while let Some(child) = next_child(&mut reader, "gpx")? {
            match gpx_name(&child) {
                Some(b"metadata") => trace.metadata = Some(parse_metadata(&mut reader, &child)?),
                Some(b"trk") => trace.tracks.push(parse_track(&mut reader, &child)?),
                _ => skip(&mut reader, &child)?,
            }
        }
    }

    read_epilogue(&mut reader)?;

    debug!(
        "parsed {}: {} tracks, {} segments, {} points",
        trace.filename,
        trace.tracks.len(),
        trace.tracks.iter().map(|t| t.segments.len()).sum::<usize>(),
        trace.points().count()
    );

    Ok(trace)
}

/// Parse a `<metadata>` element.
pub(crate) fn parse_metadata<'a>(reader: &mut XmlReader<'a>, node: &Node<'a>) -> Result<Metadata> {
    let mut metadata = Metadata::default();
    if node.empty {
        return Ok(metadata);
    }

    while let Some(child) = next_child(reader, "metadata")? {
        match gpx_name(&child) {
            Some(b"name") => metadata.name = read_text(reader, &child)?,
            // An empty description is kept as "" rather than dropped.
            Some(b"desc") => metadata.description = Some(read_text(reader, &child)?.unwrap_or_default()),
            Some(b"time") => metadata.time = Some(parse_time(read_text(reader, &child)?)?),
            Some(b"author") => metadata.author = Some(parse_author(reader, &child)?),
            Some(b"copyright") => metadata.copyright = Some(parse_copyright(reader, &child)?),
            Some(b"link") => metadata.link = Some(parse_link(reader, &child)?),
            Some(b"keywords") => metadata.keywords = read_text(reader, &child)?,
            _ => skip(reader, &child)?,
        }
    }

    Ok(metadata)
}

fn parse_author<'a>(reader: &mut XmlReader<'a>, node: &Node<'a>) -> Result<Author> {
    let mut author = Author::default();
    if node.empty {
        return Ok(author);
    }

    while let Some(child) = next_child(reader, "author")? {
        match gpx_name(&child) {
            Some(b"name") => author.name = read_text(reader, &child)?,
            Some(b"email") => author.email = read_text(reader, &child)?,
            Some(b"link") => author.link = read_text(reader, &child)?,
            _ => skip(reader, &child)?,
        }
    }

    Ok(author)
}

fn parse_copyright<'a>(reader: &mut XmlReader<'a>, node: &Node<'a>) -> Result<Copyright> {
    let mut copyright = Copyright {
        author: attribute(node, "author")?,
        ..Default::default()
    };
    if node.empty {
        return Ok(copyright);
    }

    while let Some(child) = next_child(reader, "copyright")? {
        match gpx_name(&child) {
            Some(b"year") => copyright.year = read_text(reader, &child)?,
            Some(b"license") => copyright.license = read_text(reader, &child)?,
            _ => skip(reader, &child)?,
        }
    }

    Ok(copyright)
}

/// Parse a <link> element.
fn parse_link<'a>(reader: &mut XmlReader<'a>, node: &Node<'a>) -> Result<Link> {
    let mut link = Link {
        href: attribute(node, "href")?,
        ..Default::default()
    };
    if node.empty {
        return Ok(link);
    }

    while let Some(child) = next_child(reader, "link")? {
        match gpx_name(&child) {
            Some(b"text") => link.text = read_text(reader, &child)?,
            Some(b"type") => link.link_type = read_text(reader, &child)?,
            _ => skip(reader, &child)?,
        }
    }

    Ok(link)
}

/// Parse a <trk> element, dropping segments without points.
pub(crate) fn parse_track<'a>(reader: &mut XmlReader<'a>, node: &Node<'a>) -> Result<Track> {
    let mut track = Track::default();
    if node.empty {
        return Ok(track);
    }

    while let Some(child) = next_child(reader, "trk")? {
        if match_node(&child, "trkseg") {
            let segment = parse_track_segment(reader, &child)?;
            if !segment.points.is_empty() {
                track.segments.push(segment);
            }
        } else {
            skip(reader, &child)?;
        }
    }

    Ok(track)
}

/// Parse a <trkseg> element.
pub(crate) fn parse_track_segment<'a>(
    reader: &mut XmlReader<'a>,
    node: &Node<'a>,
) -> Result<TrackSegment> {
    let mut segment = TrackSegment::default();
    if node.empty {
        return Ok(segment);
    }

    while let Some(child) = next_child(reader, "trkseg")? {
        if match_node(&child, "trkpt") {
            segment.points.push(parse_track_point(reader, &child)?);
        } else {
            skip(reader, &child)?;
        }
    }

    Ok(segment)
}

/// Parse a <trkpt> element and its children.
///
/// Coordinates are only set when both `lat` and `lon` are present, and then
/// both must be valid numbers.
pub(crate) fn parse_track_point<'a>(
    reader: &mut XmlReader<'a>,
    node: &Node<'a>,
) -> Result<TrackPoint> {
    let mut point = TrackPoint::default();

    if let (Some(lat), Some(lon)) = (attribute(node, "lat")?, attribute(node, "lon")?) {
        point.lat = Some(parse_coordinate("lat", lat)?);
        point.lon = Some(parse_coordinate("lon", lon)?);
    }

    if !node.empty {
        while let Some(child) = next_child(reader, "trkpt")? {
            match gpx_name(&child) {
                Some(b"ele") => point.ele = Some(parse_elevation(read_text(reader, &child)?)?),
                Some(b"desc") => point.description = read_text(reader, &child)?,
                Some(b"time") => point.time = Some(parse_time(read_text(reader, &child)?)?),
                Some(b"name") => point.name = read_text(reader, &child)?,
                _ => skip(reader, &child)?,
            }
        }
    }

    if point.coordinates().is_none() {
        trace!("track point without coordinates");
    }

    Ok(point)
}

fn parse_coordinate(attribute: &'static str, value: String) -> Result<f64> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|source| ParseError::InvalidCoordinate {
            attribute,
            value,
            source,
        })
}

fn parse_elevation(text: Option<String>) -> Result<f64> {
    let value = text.unwrap_or_default();
    value
        .trim()
        .parse::<f64>()
        .map_err(|source| ParseError::InvalidElevation { value, source })
}

fn parse_time(text: Option<String>) -> Result<DateTime<Utc>> {
    let value = text.unwrap_or_default();
    parse_date(&value).map_err(|source| ParseError::InvalidTime { value, source })
}

/// Read up to the document's first element.
fn read_root<'a>(reader: &mut XmlReader<'a>) -> Result<Node<'a>> {
    loop {
        let (ns, event) = reader.read_resolved_event()?;
        let in_gpx_ns = is_gpx_ns(&ns);
        match event {
            Event::Start(start) => return Ok(Node { start, in_gpx_ns, empty: false }),
            Event::Empty(start) => return Ok(Node { start, in_gpx_ns, empty: true }),
            Event::Eof => {
                return Err(ParseError::NotGpx {
                    found: "no root element".to_string(),
                });
            }
            other => check_outside_root(&other)?,
        }
    }
}

/// Consume what follows the root element; only comments, processing
/// instructions and whitespace may appear there.
fn read_epilogue(reader: &mut XmlReader<'_>) -> Result<()> {
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => {
                return Err(ParseError::TrailingElement {
                    name: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                });
            }
            Event::Eof => return Ok(()),
            other => check_outside_root(&other)?,
        }
    }
}

/// Only markup and whitespace may appear before or after the root element.
fn check_outside_root(event: &Event<'_>) -> Result<()> {
    match event {
        Event::Text(e) if !e.iter().all(|&b| matches!(b, b' ' | b'\t' | b'\r' | b'\n')) => {
            Err(ParseError::TextOutsideRoot)
        }
        Event::CData(_) | Event::GeneralRef(_) => Err(ParseError::TextOutsideRoot),
        _ => Ok(()),
    }
}

/// Next child element of the element named `parent`, or `None` once its end tag is reached.
fn next_child<'a>(reader: &mut XmlReader<'a>, parent: &'static str) -> Result<Option<Node<'a>>> {
    loop {
        let (ns, event) = reader.read_resolved_event()?;
        let in_gpx_ns = is_gpx_ns(&ns);
        match event {
            Event::Start(start) => return Ok(Some(Node { start, in_gpx_ns, empty: false })),
            Event::Empty(start) => return Ok(Some(Node { start, in_gpx_ns, empty: true })),
            Event::End(_) => return Ok(None),
            Event::Eof => return Err(ParseError::UnexpectedEof { element: parent }),
            Event::GeneralRef(e) => {
                resolve_reference(&e)?;
            }
            _ => {}
        }
    }
}

fn is_gpx_ns(ns: &ResolveResult<'_>) -> bool {
    matches!(ns, ResolveResult::Bound(Namespace(uri)) if *uri == GPX_NS.as_bytes())
}

/// Skip an element we do not handle, along with its whole subtree.
fn skip<'a>(reader: &mut XmlReader<'a>, node: &Node<'a>) -> Result<()> {
    trace!("skipping <{}>", qualified_name(node));
    if !node.empty {
        reader.read_to_end(node.start.name())?;
    }
    Ok(())
}

fn qualified_name(node: &Node<'_>) -> String {
    String::from_utf8_lossy(node.start.name().as_ref()).into_owned()
}

/// Value of the unprefixed attribute `name`; empty values count as missing.
fn attribute(node: &Node<'_>, name: &str) -> Result<Option<String>> {
    for attr_result in node.start.attributes() {
        let attr = attr_result?;
        if attr.key.as_ref() == name.as_bytes() {
            let raw = std::str::from_utf8(&attr.value).unwrap_or_default();
            let value = unescape(raw).map_err(quick_xml::Error::from)?;
            return Ok(Some(value.into_owned()).filter(|v| !v.is_empty()));
        }
    }
    Ok(None)
}

/// Read the text content of an element as an owned String.
/// Handles regular text, CDATA sections, and entity references (Event::GeneralRef).
/// Returns `None` when the element holds no text at all.
fn read_text<'a>(reader: &mut XmlReader<'a>, node: &Node<'a>) -> Result<Option<String>> {
    if node.empty {
        return Ok(None);
    }

    let mut text: Option<String> = None;

    loop {
        match reader.read_event()? {
            Event::Text(e) => {
                let raw = std::str::from_utf8(e.as_ref()).unwrap_or_default();
                text.get_or_insert_with(String::new).push_str(raw);
            }
            Event::CData(e) => {
                let s = std::str::from_utf8(e.as_ref()).unwrap_or_default();
                text.get_or_insert_with(String::new).push_str(s);
            }
            Event::GeneralRef(e) => {
                let ch = resolve_reference(&e)?;
                text.get_or_insert_with(String::new).push(ch);
            }
            Event::Start(e) => {
                reader.read_to_end(e.name())?;
            }
            Event::End(_) => break,
            Event::Eof => return Err(ParseError::UnexpectedEof { element: "text element" }),
            _ => {}
        }
    }

    Ok(text)
}

/// Resolve a character reference (&#60; &#x3C;) or one of the predefined
/// entities. Anything else is undeclared, since DTDs are not processed.
fn resolve_reference(e: &BytesRef<'_>) -> Result<char> {
    if let Ok(Some(ch)) = e.resolve_char_ref() {
        return Ok(ch);
    }
    let name = String::from_utf8_lossy(e.as_ref());
    match &*name {
        "amp" => Ok('&'),
        "lt" => Ok('<'),
        "gt" => Ok('>'),
        "quot" => Ok('"'),
        "apos" => Ok('\''),
        _ => Err(ParseError::UndefinedEntity {
            name: name.into_owned(),
        }),
    }
}
