use crate::tql::Filter;

/// Rewrites a filter into negation normal form. The match language refuses
/// `$not` as a top-level operator, so negation is pushed through the
/// connectives and absorbed into complemented comparisons; the only `not`
/// that survives wraps a string match, which the emitters express as `$not`
/// in value position against a regex.
pub(crate) fn normalize(filter: &Filter) -> Filter {
    match filter {
        Filter::And(subfilters) => Filter::And(subfilters.iter().map(normalize).collect()),
        Filter::Or(subfilters) => Filter::Or(subfilters.iter().map(normalize).collect()),
        Filter::Not(inner) => negate(inner),
        other => other.clone(),
    }
}

fn negate(filter: &Filter) -> Filter {
    use Filter::*;
    match filter {
        Not(inner) => normalize(inner),
        And(subfilters) => Or(subfilters.iter().map(negate).collect()),
        Or(subfilters) => And(subfilters.iter().map(negate).collect()),
        Eq(field, value) => Ne(field.clone(), value.clone()),
        Ne(field, value) => Eq(field.clone(), value.clone()),
        Lt(field, value) => Ge(field.clone(), value.clone()),
        Gt(field, value) => Le(field.clone(), value.clone()),
        Le(field, value) => Gt(field.clone(), value.clone()),
        Ge(field, value) => Lt(field.clone(), value.clone()),
        Between { field, min, max } => Or(vec![
            Lt(field.clone(), min.clone()),
            Gt(field.clone(), max.clone()),
        ]),
        IsNull(field) => NotNull(field.clone()),
        NotNull(field) => IsNull(field.clone()),
        matcher @ (Contains(_) | StartsWith(_) | EndsWith(_)) => Not(Box::new(matcher.clone())),
    }
}
