use std::num::ParseFloatError;
use wasm_bindgen::JsValue;

/// The single error kind surfaced by GPX parsing. Each variant keeps its
/// underlying cause available through [`std::error::Error::source`].
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Not a GPX document: {found}")]
    NotGpx { found: String },

    #[error("Document ended inside <{element}>")]
    UnexpectedEof { element: &'static str },

    #[error("Unexpected element <{name}> after the root element")]
    TrailingElement { name: String },

    #[error("Character data outside the root element")]
    TextOutsideRoot,

    #[error("Undefined entity reference '&{name};'")]
    UndefinedEntity { name: String },

    #[error("Unsupported document encoding '{label}'")]
    UnknownEncoding { label: String },

    #[error("Document is not valid {encoding}")]
    Encoding { encoding: &'static str },

    #[error("Invalid value '{value}' for attribute '{attribute}' on <trkpt>")]
    InvalidCoordinate {
        attribute: &'static str,
        value: String,
        #[source]
        source: ParseFloatError,
    },

    #[error("Invalid elevation '{value}'")]
    InvalidElevation {
        value: String,
        #[source]
        source: ParseFloatError,
    },

    #[error("Invalid time '{value}'")]
    InvalidTime {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

impl From<quick_xml::events::attributes::AttrError> for ParseError {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        Self::Xml(e.into())
    }
}

impl From<ParseError> for JsValue {
    fn from(e: ParseError) -> Self {
        JsValue::from_str(&e.to_string())
    }
}
