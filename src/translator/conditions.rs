use crate::{
    tql::{FieldRef, Filter, Operand, StringMatch},
    translator::{negation, Error, PipelineTranslator, Result},
};
use bson::{bson, Bson};

/// Which string predicate to synthesize. The expression language has no
/// regex match, so these are built from code-point primitives instead.
#[derive(Clone, Copy)]
enum StringPredicate {
    Contains,
    StartsWith,
    EndsWith,
}

impl PipelineTranslator<'_> {
    /// Compiles a filter to the expression form legal inside `$cond`, for
    /// conditional aggregations. Shares the negation normalizer with the
    /// match translator but emits array-operand comparisons.
    pub(crate) fn translate_condition(&self, filter: &Filter) -> Result<Bson> {
        self.condition_expr(&negation::normalize(filter))
    }

    fn condition_expr(&self, filter: &Filter) -> Result<Bson> {
        use Filter::*;
        Ok(match filter {
            And(subfilters) => bson!({"$and": self.condition_exprs(subfilters)?}),
            Or(subfilters) => bson!({"$or": self.condition_exprs(subfilters)?}),
            Eq(field, value) => self.comparison_expr("$eq", field, value)?,
            Ne(field, value) => self.comparison_expr("$ne", field, value)?,
            Lt(field, value) => self.comparison_expr("$lt", field, value)?,
            Gt(field, value) => self.comparison_expr("$gt", field, value)?,
            Le(field, value) => self.comparison_expr("$lte", field, value)?,
            Ge(field, value) => self.comparison_expr("$gte", field, value)?,
            Between { field, min, max } => bson!({"$and": [
                self.comparison_expr("$gte", field, min)?,
                self.comparison_expr("$lte", field, max)?,
            ]}),
            IsNull(field) => bson!({"$eq": [self.field_rvalue(field)?, Bson::Null]}),
            NotNull(field) => bson!({"$ne": [self.field_rvalue(field)?, Bson::Null]}),
            Contains(matcher) => self.string_predicate(matcher, StringPredicate::Contains)?,
            StartsWith(matcher) => self.string_predicate(matcher, StringPredicate::StartsWith)?,
            EndsWith(matcher) => self.string_predicate(matcher, StringPredicate::EndsWith)?,
            Not(inner) => {
                let predicate = match inner.as_ref() {
                    Contains(matcher) => {
                        self.string_predicate(matcher, StringPredicate::Contains)?
                    }
                    StartsWith(matcher) => {
                        self.string_predicate(matcher, StringPredicate::StartsWith)?
                    }
                    EndsWith(matcher) => {
                        self.string_predicate(matcher, StringPredicate::EndsWith)?
                    }
                    other => {
                        return Err(Error::InvalidQuery(format!(
                            "negation survived normalization: {other:?}"
                        )))
                    }
                };
                bson!({"$not": [predicate]})
            }
        })
    }

    fn condition_exprs(&self, filters: &[Filter]) -> Result<Vec<Bson>> {
        filters
            .iter()
            .map(|filter| self.condition_expr(filter))
            .collect()
    }

    fn comparison_expr(&self, operator: &str, field: &FieldRef, value: &Operand) -> Result<Bson> {
        Ok(bson!({operator: [self.field_rvalue(field)?, self.operand_rvalue(value)?]}))
    }

    fn string_predicate(&self, matcher: &StringMatch, kind: StringPredicate) -> Result<Bson> {
        let mut source = Bson::String(self.field_rvalue(&matcher.field)?);
        let mut needle = Bson::String(self.string_needle(matcher)?);
        if !matcher.case_sensitive {
            source = bson!({"$toLower": source});
            needle = bson!({"$toLower": needle});
        }
        Ok(match kind {
            StringPredicate::Contains => bson!({"$ne": [{"$indexOfCP": [source, needle]}, -1]}),
            StringPredicate::StartsWith => bson!({"$eq": [{"$indexOfCP": [source, needle]}, 0]}),
            // compare the needle-sized tail of the source
            StringPredicate::EndsWith => bson!({"$eq": [
                {"$substrCP": [
                    source.clone(),
                    {"$subtract": [{"$strLenCP": source}, {"$strLenCP": needle.clone()}]},
                    {"$strLenCP": needle.clone()},
                ]},
                needle,
            ]}),
        })
    }
}
