//! Compiles TQL — a structured, tabular query language with filters,
//! aggregations, breakouts, ordering, projections, pagination, and temporal
//! bucketing — into MongoDB aggregation pipelines.
//!
//! Compilation is purely functional over the query and a [`fields::FieldResolver`];
//! executing the produced pipeline and feeding the rows back through
//! [`process_results`] is the caller's job.

pub mod fields;
pub mod native;
pub mod result;
pub mod results;
pub mod tql;
pub mod translator;
mod util;

pub use native::parse_native_query;
pub use results::process_results;
pub use translator::unescape_name;

use crate::{fields::FieldResolver, result::Result, translator::PipelineTranslator};
use bson::Document;
use serde::Serialize;

/// Everything needed to execute the pipeline translation of a query against
/// a document store.
#[derive(Debug, PartialEq, Serialize)]
pub struct Translation {
    /// Source collection, resolved from the query's table id.
    pub collection: String,
    /// Final column order of the pipeline's output, in escaped form.
    pub projections: Vec<String>,
    pub pipeline: Vec<Document>,
    /// True for structured TQL compiles, which are post-processed and
    /// column-checked; false for native query strings, which only pass
    /// through the constructor codec.
    pub tql: bool,
}

/// Returns the aggregation-pipeline translation of a structured TQL query.
pub fn translate_query(query: &tql::Query, resolver: &dyn FieldResolver) -> Result<Translation> {
    let collection = resolver
        .table(query.source_table)
        .ok_or(translator::Error::TableResolution(query.source_table))?;
    let translator = PipelineTranslator::new(query, resolver);
    let (projections, pipeline) = translator.translate()?;
    Ok(Translation {
        collection,
        projections,
        pipeline,
        tql: true,
    })
}

/// Wraps an already-written native pipeline for execution. The text is run
/// through the constructor codec and parsed into stages; no post-processing
/// or column checking applies downstream.
pub fn translate_native_query(text: &str, collection: impl Into<String>) -> Result<Translation> {
    let pipeline = parse_native_query(text)?;
    Ok(Translation {
        collection: collection.into(),
        projections: vec![],
        pipeline,
        tql: false,
    })
}
