use crate::{
    fields::{FieldId, FieldResolver, TableId},
    tql::{self, TemporalUnit},
};
use bson::{Bson, Document};
use thiserror::Error;

mod aggregations;
mod conditions;
mod datetime;
mod match_query;
mod names;
mod negation;
mod stages;

#[cfg(test)]
mod test;

pub use names::unescape_name;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq)]
pub enum Error {
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("unsupported temporal unit {0} in {1}")]
    UnsupportedUnit(TemporalUnit, &'static str),
    #[error("no field found with id {0}")]
    FieldResolution(FieldId),
    #[error("no table found with id {0}")]
    TableResolution(TableId),
    #[error("pipeline stage violates schema: {0}")]
    PipelineSchemaViolation(String),
}

/// Compiles one TQL query into pipeline stages.
///
/// The query and resolver are held for the duration of the compile so deeply
/// nested handlers can reach aggregation names and field records without any
/// process-global state; nothing here is mutated after construction, so a
/// translator is safe to share across threads when the resolver is.
pub struct PipelineTranslator<'a> {
    query: &'a tql::Query,
    resolver: &'a dyn FieldResolver,
    aggregation_names: Vec<String>,
}

impl<'a> PipelineTranslator<'a> {
    pub fn new(query: &'a tql::Query, resolver: &'a dyn FieldResolver) -> Self {
        let aggregation_names = assign_aggregation_names(&query.aggregations);
        Self {
            query,
            resolver,
            aggregation_names,
        }
    }

    /// The column name assigned to the aggregation at `index`.
    pub(crate) fn aggregation_name(&self, index: usize) -> Result<&str> {
        self.aggregation_names
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| Error::InvalidQuery(format!("no aggregation at index {index}")))
    }

    /// Runs the fixed handler order and verifies the emitted stages. Returns
    /// the final column order alongside the pipeline.
    pub fn translate(&self) -> Result<(Vec<String>, Vec<Document>)> {
        let ctx = self.build_pipeline()?;
        verify_pipeline(&ctx.pipeline)?;
        Ok((ctx.projections, ctx.pipeline))
    }
}

/// Stable column names for the query's aggregations: the explicit name when
/// one was given, otherwise the operator name, suffixed with the position
/// when the bare name is already taken. Identical across compiles of the
/// same query.
fn assign_aggregation_names(aggregations: &[tql::Aggregation]) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(aggregations.len());
    for (index, aggregation) in aggregations.iter().enumerate() {
        let name = match &aggregation.name {
            Some(name) => name.clone(),
            None => {
                let base = aggregation.kind.op_name();
                if names.iter().any(|taken| taken == base) {
                    format!("{base}_{index}")
                } else {
                    base.to_string()
                }
            }
        };
        names.push(name);
    }
    names
}

/// Internal sanity check on the emitted pipeline: every stage is a
/// single-key map whose operand has the right shape. A violation here is a
/// translator bug, never a user error.
fn verify_pipeline(pipeline: &[Document]) -> Result<()> {
    for stage in pipeline {
        if stage.len() != 1 {
            return Err(Error::PipelineSchemaViolation(format!(
                "stage must have exactly one key: {stage:?}"
            )));
        }
        if let Some((operator, operand)) = stage.iter().next() {
            match (operator.as_str(), operand) {
                ("$project" | "$match" | "$group" | "$addFields" | "$sort", Bson::Document(doc))
                    if !doc.is_empty() => {}
                ("$limit" | "$skip", Bson::Int32(n)) if *n > 0 => {}
                ("$limit" | "$skip", Bson::Int64(n)) if *n > 0 => {}
                _ => {
                    return Err(Error::PipelineSchemaViolation(format!(
                        "malformed stage: {stage:?}"
                    )))
                }
            }
        }
    }
    Ok(())
}
