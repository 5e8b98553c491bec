use crate::{translator::unescape_name, util::parse_timestamp};
use bson::{Bson, Document};
use itertools::Itertools;
use std::collections::BTreeSet;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq)]
pub enum Error {
    #[error("unexpected columns in results: {0:?}")]
    UnexpectedColumns(Vec<String>),
    #[error("cannot parse {0:?} as a timestamp")]
    TimestampParse(String),
}

const DATE_KEY: &str = "___date";

/// Post-processes rows returned by the document store: escaped keys are
/// restored to their dotted source paths, `{___date: …}` envelopes become
/// real timestamps, and TQL-originated results are checked against the
/// projection list the compile produced.
pub fn process_results(
    rows: Vec<Document>,
    projections: &[String],
    tql: bool,
) -> Result<Vec<Document>> {
    let rows = rows
        .into_iter()
        .map(|row| rehydrate_document(unescape_keys(row)))
        .collect::<Result<Vec<_>>>()?;
    if tql {
        check_columns(&rows, projections)?;
    }
    Ok(rows)
}

fn unescape_keys(row: Document) -> Document {
    row.into_iter()
        .map(|(key, value)| (unescape_name(&key), value))
        .collect()
}

fn rehydrate_document(doc: Document) -> Result<Document> {
    doc.into_iter()
        .map(|(key, value)| Ok((key, rehydrate_dates(value)?)))
        .collect()
}

/// Any map whose single key is `___date` is an envelope carrying a date the
/// pipeline had to stringify; everything else is walked through unchanged.
fn rehydrate_dates(value: Bson) -> Result<Bson> {
    Ok(match value {
        Bson::Document(doc) => {
            if let Some(formatted) = date_envelope_payload(&doc) {
                let parsed = parse_timestamp(formatted)
                    .ok_or_else(|| Error::TimestampParse(formatted.to_string()))?;
                Bson::DateTime(parsed)
            } else {
                Bson::Document(rehydrate_document(doc)?)
            }
        }
        Bson::Array(items) => Bson::Array(
            items
                .into_iter()
                .map(rehydrate_dates)
                .collect::<Result<Vec<_>>>()?,
        ),
        other => other,
    })
}

fn date_envelope_payload(doc: &Document) -> Option<&str> {
    if doc.len() != 1 {
        return None;
    }
    match doc.get(DATE_KEY) {
        Some(Bson::String(s)) => Some(s),
        _ => None,
    }
}

/// Advisory-fatal check that the compile anticipated every column the store
/// returned. Firing after a successful execution means the translation was
/// wrong, so the failure is logged and raised rather than recovered.
fn check_columns(rows: &[Document], projections: &[String]) -> Result<()> {
    let mut expected: BTreeSet<String> =
        projections.iter().map(|name| unescape_name(name)).collect();
    // inclusion projections keep _id unless it is suppressed
    expected.insert("_id".to_string());
    let unexpected: Vec<String> = rows
        .iter()
        .flat_map(|row| row.keys())
        .filter(|key| !expected.contains(*key))
        .cloned()
        .sorted()
        .dedup()
        .collect();
    if unexpected.is_empty() {
        Ok(())
    } else {
        tracing::warn!(
            ?unexpected,
            "results contain columns the translation did not project"
        );
        Err(Error::UnexpectedColumns(unexpected))
    }
}
