use crate::util::parse_timestamp;
use bson::{oid::ObjectId, Bson, Document};
use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq)]
pub enum Error {
    #[error("native query is not valid JSON: {0}")]
    Json(String),
    #[error("native query must be a stage or an array of stages, got {0}")]
    NotAPipeline(String),
    #[error("invalid {constructor}(...) argument: {argument}")]
    BadConstructorArgument {
        constructor: &'static str,
        argument: String,
    },
}

/// Constructor forms recognized in native query text. Their call syntax is
/// not valid JSON, so each call is textually rewritten to a tagged array
/// before parsing and decoded back after.
const CONSTRUCTOR_NAMES: [&str; 5] = ["ISODate", "ObjectId", "Date", "NumberLong", "NumberInt"];

const ENCODED_PREFIX: &str = "___";

/// What the zero-arg `Date()` shell form prints.
const JS_DATE_FORMAT: &str = "%a %b %d %Y %H:%M:%S GMT%z";

lazy_static! {
    static ref CONSTRUCTOR_REWRITES: Vec<(Regex, String, Regex, String)> = CONSTRUCTOR_NAMES
        .iter()
        .map(|name| {
            (
                Regex::new(&format!(r"\b{name}\(\)")).unwrap(),
                format!("[\"{ENCODED_PREFIX}{name}\"]"),
                Regex::new(&format!(r"\b{name}\(([^)]*)\)")).unwrap(),
                format!("[\"{ENCODED_PREFIX}{name}\", ${{1}}]"),
            )
        })
        .collect();
}

/// Parses native query text into pipeline stages, letting embedded
/// constructor syntax survive the JSON parse: `N(args)` is encoded as
/// `["___N", args]`, parsed, then decoded bottom-up into the value the
/// constructor denotes.
pub fn parse_native_query(text: &str) -> Result<Vec<Document>> {
    let encoded = encode_fncalls(text);
    let json: serde_json::Value =
        serde_json::from_str(&encoded).map_err(|e| Error::Json(e.to_string()))?;
    match decode_fncalls(json_to_bson(json))? {
        Bson::Document(stage) => Ok(vec![stage]),
        Bson::Array(stages) => stages
            .into_iter()
            .map(|stage| match stage {
                Bson::Document(doc) => Ok(doc),
                other => Err(Error::NotAPipeline(other.to_string())),
            })
            .collect(),
        other => Err(Error::NotAPipeline(other.to_string())),
    }
}

fn encode_fncalls(text: &str) -> String {
    CONSTRUCTOR_REWRITES.iter().fold(
        text.to_string(),
        |acc, (zero_arg, zero_replacement, with_args, args_replacement)| {
            let acc = zero_arg.replace_all(&acc, zero_replacement.as_str()).into_owned();
            with_args
                .replace_all(&acc, args_replacement.as_str())
                .into_owned()
        },
    )
}

/// Key order is load-bearing for pipeline stages, which is why the JSON
/// value (parsed with order preserved) is converted by hand: integers land
/// as Int32 when they fit, like shell-written stages.
fn json_to_bson(value: serde_json::Value) -> Bson {
    use serde_json::Value;
    match value {
        Value::Null => Bson::Null,
        Value::Bool(b) => Bson::Boolean(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => match i32::try_from(i) {
                Ok(small) => Bson::Int32(small),
                Err(_) => Bson::Int64(i),
            },
            None => Bson::Double(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => Bson::String(s),
        Value::Array(items) => Bson::Array(items.into_iter().map(json_to_bson).collect()),
        Value::Object(map) => Bson::Document(
            map.into_iter()
                .map(|(key, value)| (key, json_to_bson(value)))
                .collect(),
        ),
    }
}

fn decode_fncalls(value: Bson) -> Result<Bson> {
    Ok(match value {
        Bson::Array(items) => {
            let items = items
                .into_iter()
                .map(decode_fncalls)
                .collect::<Result<Vec<_>>>()?;
            maybe_decode_fncall(items)?
        }
        Bson::Document(doc) => Bson::Document(
            doc.into_iter()
                .map(|(key, value)| Ok((key, decode_fncalls(value)?)))
                .collect::<Result<Document>>()?,
        ),
        other => other,
    })
}

fn maybe_decode_fncall(items: Vec<Bson>) -> Result<Bson> {
    let constructor = match items.first() {
        Some(Bson::String(head)) => head
            .strip_prefix(ENCODED_PREFIX)
            .and_then(|name| CONSTRUCTOR_NAMES.iter().find(|known| **known == name))
            .copied(),
        _ => None,
    };
    match constructor {
        Some(name) if items.len() <= 2 => decode_fncall(name, items.get(1)),
        _ => Ok(Bson::Array(items)),
    }
}

fn decode_fncall(constructor: &'static str, argument: Option<&Bson>) -> Result<Bson> {
    let bad = |argument: String| Error::BadConstructorArgument {
        constructor,
        argument,
    };
    Ok(match (constructor, argument) {
        ("ISODate", None) => Bson::DateTime(bson::DateTime::now()),
        ("ISODate", Some(Bson::String(s))) => {
            Bson::DateTime(parse_timestamp(s).ok_or_else(|| bad(s.clone()))?)
        }
        ("ObjectId", None) => Bson::ObjectId(ObjectId::new()),
        ("ObjectId", Some(Bson::String(s))) => {
            Bson::ObjectId(ObjectId::parse_str(s).map_err(|_| bad(s.clone()))?)
        }
        ("Date", None) => Bson::String(Utc::now().format(JS_DATE_FORMAT).to_string()),
        ("NumberLong", Some(Bson::String(s))) => {
            Bson::Int64(s.parse().map_err(|_| bad(s.clone()))?)
        }
        ("NumberLong", Some(&Bson::Int64(n))) => Bson::Int64(n),
        ("NumberLong", Some(&Bson::Int32(n))) => Bson::Int64(n.into()),
        ("NumberInt", Some(Bson::String(s))) => Bson::Int32(s.parse().map_err(|_| bad(s.clone()))?),
        ("NumberInt", Some(&Bson::Int32(n))) => Bson::Int32(n),
        ("NumberInt", Some(&Bson::Int64(n))) => {
            Bson::Int32(i32::try_from(n).map_err(|_| bad(n.to_string()))?)
        }
        (_, Some(other)) => return Err(bad(other.to_string())),
        (_, None) => return Err(bad("()".to_string())),
    })
}
