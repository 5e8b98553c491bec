use crate::{
    tql::{Aggregation, AggregationKind},
    translator::{PipelineTranslator, Result},
};
use bson::{bson, Bson};

/// An aggregation split into the reducers `$group` accepts and the bindings
/// that must wait for a following `$addFields`. The engine rejects nested
/// post-aggregations inside `$group`, so anything built on top of a reducer
/// is deferred.
pub(crate) struct ExpandedAggregation {
    pub reductions: Vec<(String, Bson)>,
    pub post: Vec<(String, Bson)>,
}

impl ExpandedAggregation {
    fn reduction(name: String, reducer: Bson) -> Self {
        Self {
            reductions: vec![(name, reducer)],
            post: vec![],
        }
    }
}

impl PipelineTranslator<'_> {
    pub(crate) fn expand_aggregation(
        &self,
        index: usize,
        aggregation: &Aggregation,
    ) -> Result<ExpandedAggregation> {
        use AggregationKind::*;
        let name = self.aggregation_name(index)?.to_string();
        Ok(match &aggregation.kind {
            Count => ExpandedAggregation::reduction(name, bson!({"$sum": 1})),
            CountField(field) => {
                let rvalue = self.field_rvalue(field)?;
                ExpandedAggregation::reduction(
                    name,
                    bson!({"$sum": {"$cond": {"if": rvalue, "then": 1, "else": 0}}}),
                )
            }
            Avg(field) => {
                ExpandedAggregation::reduction(name, bson!({"$avg": self.field_rvalue(field)?}))
            }
            Sum(field) => {
                ExpandedAggregation::reduction(name, bson!({"$sum": self.field_rvalue(field)?}))
            }
            Min(field) => {
                ExpandedAggregation::reduction(name, bson!({"$min": self.field_rvalue(field)?}))
            }
            Max(field) => {
                ExpandedAggregation::reduction(name, bson!({"$max": self.field_rvalue(field)?}))
            }
            Distinct(field) => {
                let set = bson!({"$addToSet": self.field_rvalue(field)?});
                let size = bson!({"$size": format!("${name}")});
                ExpandedAggregation {
                    reductions: vec![(name.clone(), set)],
                    post: vec![(name, size)],
                }
            }
            SumWhere(field, predicate) => {
                let rvalue = self.field_rvalue(field)?;
                let condition = self.translate_condition(predicate)?;
                ExpandedAggregation::reduction(
                    name,
                    bson!({"$sum": {"$cond": {"if": condition, "then": rvalue, "else": 0}}}),
                )
            }
            CountWhere(predicate) => {
                let condition = self.translate_condition(predicate)?;
                ExpandedAggregation::reduction(
                    name,
                    bson!({"$sum": {"$cond": {"if": condition, "then": 1, "else": 0}}}),
                )
            }
            Share(predicate) => {
                let condition = self.translate_condition(predicate)?;
                let count_where_name = format!("{name}__count_where");
                let count_name = format!("{name}__count");
                let divide = bson!({"$divide": [
                    format!("${count_where_name}"),
                    format!("${count_name}"),
                ]});
                ExpandedAggregation {
                    reductions: vec![
                        (
                            count_where_name,
                            bson!({"$sum": {"$cond": {"if": condition, "then": 1, "else": 0}}}),
                        ),
                        (count_name, bson!({"$sum": 1})),
                    ],
                    post: vec![(name, divide)],
                }
            }
        })
    }
}
