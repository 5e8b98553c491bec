use crate::{
    tql::{Filter, Literal, Operand, StringMatch},
    translator::{negation, Error, PipelineTranslator, Result},
};
use bson::{doc, Bson, Document};

impl PipelineTranslator<'_> {
    /// Compiles a filter to the document form used by `$match`. Negation is
    /// pushed inward first; what survives normalization is only `$not` in
    /// value position against a regex, the one place the match language
    /// allows it.
    pub(crate) fn translate_filter(&self, filter: &Filter) -> Result<Document> {
        self.match_document(&negation::normalize(filter))
    }

    fn match_document(&self, filter: &Filter) -> Result<Document> {
        use Filter::*;
        Ok(match filter {
            And(subfilters) => doc! {"$and": self.match_subdocuments(subfilters)?},
            Or(subfilters) => doc! {"$or": self.match_subdocuments(subfilters)?},
            Eq(field, value) => doc! {self.lvalue(field)?: self.operand_rvalue(value)?},
            Ne(field, value) => doc! {self.lvalue(field)?: {"$ne": self.operand_rvalue(value)?}},
            Lt(field, value) => doc! {self.lvalue(field)?: {"$lt": self.operand_rvalue(value)?}},
            Gt(field, value) => doc! {self.lvalue(field)?: {"$gt": self.operand_rvalue(value)?}},
            Le(field, value) => doc! {self.lvalue(field)?: {"$lte": self.operand_rvalue(value)?}},
            Ge(field, value) => doc! {self.lvalue(field)?: {"$gte": self.operand_rvalue(value)?}},
            Between { field, min, max } => doc! {
                self.lvalue(field)?: {
                    "$gte": self.operand_rvalue(min)?,
                    "$lte": self.operand_rvalue(max)?,
                }
            },
            IsNull(field) => doc! {self.lvalue(field)?: Bson::Null},
            NotNull(field) => doc! {self.lvalue(field)?: {"$ne": Bson::Null}},
            Contains(matcher) => self.match_regex_document(matcher, false, false, false)?,
            StartsWith(matcher) => self.match_regex_document(matcher, true, false, false)?,
            EndsWith(matcher) => self.match_regex_document(matcher, false, true, false)?,
            Not(inner) => match inner.as_ref() {
                Contains(matcher) => self.match_regex_document(matcher, false, false, true)?,
                StartsWith(matcher) => self.match_regex_document(matcher, true, false, true)?,
                EndsWith(matcher) => self.match_regex_document(matcher, false, true, true)?,
                other => {
                    return Err(Error::InvalidQuery(format!(
                        "negation survived normalization: {other:?}"
                    )))
                }
            },
        })
    }

    fn match_subdocuments(&self, filters: &[Filter]) -> Result<Vec<Document>> {
        filters
            .iter()
            .map(|filter| self.match_document(filter))
            .collect()
    }

    fn match_regex_document(
        &self,
        matcher: &StringMatch,
        anchor_start: bool,
        anchor_end: bool,
        negated: bool,
    ) -> Result<Document> {
        let field = self.lvalue(&matcher.field)?;
        let regex = self.match_regex(matcher, anchor_start, anchor_end)?;
        Ok(if negated {
            doc! {field: {"$not": regex}}
        } else {
            doc! {field: regex}
        })
    }

    /// The regex value for a string match: quoted needle, inline `(?i)` when
    /// case-insensitive, anchors selecting contains / starts-with /
    /// ends-with.
    fn match_regex(
        &self,
        matcher: &StringMatch,
        anchor_start: bool,
        anchor_end: bool,
    ) -> Result<Bson> {
        let needle = self.string_needle(matcher)?;
        let mut pattern = String::new();
        if !matcher.case_sensitive {
            pattern.push_str("(?i)");
        }
        if anchor_start {
            pattern.push('^');
        }
        pattern.push_str(&regex::escape(&needle));
        if anchor_end {
            pattern.push('$');
        }
        Ok(Bson::RegularExpression(bson::Regex {
            pattern,
            options: String::new(),
        }))
    }

    pub(crate) fn string_needle(&self, matcher: &StringMatch) -> Result<String> {
        match &matcher.needle {
            Operand::Literal(Literal::String(s)) => Ok(s.clone()),
            other => Err(Error::InvalidQuery(format!(
                "string match needs a string literal, got {other:?}"
            ))),
        }
    }
}
