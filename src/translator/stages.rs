use crate::{
    tql::{
        Aggregation, AggregationKind, FieldRef, Filter, Operand, OrderBy, OrderTarget, Query,
    },
    translator::{Error, PipelineTranslator, Result},
};
use bson::{doc, Bson, Document};
use itertools::Itertools;

/// Key of the synthetic document breakout fields are gathered under before
/// `$group`.
const GROUP_KEY: &str = "___group";

pub(crate) struct PipelineContext {
    pub projections: Vec<String>,
    pub pipeline: Vec<Document>,
}

impl PipelineTranslator<'_> {
    /// Folds the query through the handlers in their fixed order. Each
    /// handler reads its slice of the query and either appends stages or
    /// leaves the pipeline unchanged; `projections` always names the
    /// terminal column order.
    pub(crate) fn build_pipeline(&self) -> Result<PipelineContext> {
        let mut ctx = PipelineContext {
            projections: vec![],
            pipeline: vec![],
        };
        self.add_initial_projection(&mut ctx)?;
        self.handle_filter(&mut ctx)?;
        self.handle_breakout_and_aggregation(&mut ctx)?;
        self.handle_order_by(&mut ctx)?;
        self.handle_fields(&mut ctx)?;
        self.handle_limit(&mut ctx)?;
        self.handle_page(&mut ctx)?;
        Ok(ctx)
    }

    /// Projects every referenced field exactly once, up front. All later
    /// stages then address flat escaped names only, which sidesteps the
    /// no-dots-in-group-keys restriction and computes each datetime bucket a
    /// single time.
    fn add_initial_projection(&self, ctx: &mut PipelineContext) -> Result<()> {
        let fields = collect_query_fields(self.query);
        if fields.is_empty() {
            return Ok(());
        }
        let mut projection = Document::new();
        for field in &fields {
            let lvalue = self.lvalue(field)?;
            projection.insert(lvalue.clone(), self.initial_rvalue(field)?);
            ctx.projections.push(lvalue);
        }
        ctx.pipeline.push(doc! {"$project": projection});
        Ok(())
    }

    fn handle_filter(&self, ctx: &mut PipelineContext) -> Result<()> {
        if let Some(filter) = &self.query.filter {
            let condition = self.translate_filter(filter)?;
            ctx.pipeline.push(doc! {"$match": condition});
        }
        Ok(())
    }

    fn handle_breakout_and_aggregation(&self, ctx: &mut PipelineContext) -> Result<()> {
        let breakout = &self.query.breakout;
        let aggregations = &self.query.aggregations;
        if breakout.is_empty() && aggregations.is_empty() {
            return Ok(());
        }

        // Gather breakout columns into a synthetic grouping document. The
        // columns the reducers read must ride along explicitly or the
        // inclusion projection would drop them.
        let mut pre_projection = Document::new();
        if !breakout.is_empty() {
            let mut group_doc = Document::new();
            for field in breakout {
                group_doc.insert(self.lvalue(field)?, self.field_rvalue(field)?);
            }
            pre_projection.insert(GROUP_KEY, group_doc);
        }
        let mut reducer_fields = vec![];
        for aggregation in aggregations {
            collect_aggregation_fields(aggregation, &mut reducer_fields);
        }
        for field in reducer_fields.iter().unique() {
            pre_projection.insert(self.lvalue(field)?, self.field_rvalue(field)?);
        }
        if !pre_projection.is_empty() {
            ctx.pipeline.push(doc! {"$project": pre_projection});
        }

        let group_id = if breakout.is_empty() {
            Bson::Null
        } else {
            Bson::String(format!("${GROUP_KEY}"))
        };
        let mut group = doc! {"_id": group_id};
        let mut post = Document::new();
        for (index, aggregation) in aggregations.iter().enumerate() {
            let expanded = self.expand_aggregation(index, aggregation)?;
            for (name, reducer) in expanded.reductions {
                group.insert(name, reducer);
            }
            for (name, binding) in expanded.post {
                post.insert(name, binding);
            }
        }
        ctx.pipeline.push(doc! {"$group": group});
        if !post.is_empty() {
            ctx.pipeline.push(doc! {"$addFields": post});
        }
        ctx.pipeline.push(doc! {"$sort": {"_id": 1}});

        // Project back to the columns the caller expects; reducer
        // intermediates from expansion are dropped here.
        let mut final_projection = doc! {"_id": false};
        let mut projections = vec![];
        for field in breakout {
            let lvalue = self.lvalue(field)?;
            final_projection.insert(lvalue.clone(), Bson::String(format!("$_id.{lvalue}")));
            projections.push(lvalue);
        }
        for index in 0..aggregations.len() {
            let name = self.aggregation_name(index)?.to_string();
            final_projection.insert(name.clone(), Bson::Boolean(true));
            projections.push(name);
        }
        ctx.pipeline.push(doc! {"$project": final_projection});
        ctx.projections = projections;
        Ok(())
    }

    fn handle_order_by(&self, ctx: &mut PipelineContext) -> Result<()> {
        if self.query.order_by.is_empty() {
            return Ok(());
        }
        let mut sort = Document::new();
        for order in &self.query.order_by {
            let (target, direction) = match order {
                OrderBy::Asc(target) => (target, 1),
                OrderBy::Desc(target) => (target, -1),
            };
            let key = match target {
                OrderTarget::Field(field) => self.lvalue(field)?,
                OrderTarget::Aggregation(index) => self.aggregation_name(*index)?.to_string(),
            };
            sort.insert(key, direction);
        }
        ctx.pipeline.push(doc! {"$sort": sort});
        Ok(())
    }

    /// An explicit field list overrides whatever column order the earlier
    /// stages left behind.
    fn handle_fields(&self, ctx: &mut PipelineContext) -> Result<()> {
        if self.query.fields.is_empty() {
            return Ok(());
        }
        let mut projection = doc! {"_id": false};
        let mut projections = vec![];
        for field in &self.query.fields {
            let lvalue = self.lvalue(field)?;
            projection.insert(lvalue.clone(), Bson::String(format!("${lvalue}")));
            projections.push(lvalue);
        }
        ctx.projections = projections;
        ctx.pipeline.push(doc! {"$project": projection});
        Ok(())
    }

    fn handle_limit(&self, ctx: &mut PipelineContext) -> Result<()> {
        if let Some(limit) = self.query.limit {
            if limit <= 0 {
                return Err(Error::InvalidQuery(format!(
                    "limit must be positive, got {limit}"
                )));
            }
            ctx.pipeline.push(doc! {"$limit": limit});
        }
        Ok(())
    }

    fn handle_page(&self, ctx: &mut PipelineContext) -> Result<()> {
        if let Some(page) = self.query.page {
            if page.page <= 0 || page.items <= 0 {
                return Err(Error::InvalidQuery(format!(
                    "page and items must be positive, got {page:?}"
                )));
            }
            let offset = page.items * (page.page - 1);
            if offset != 0 {
                ctx.pipeline.push(doc! {"$skip": offset});
            }
            ctx.pipeline.push(doc! {"$limit": page.items});
        }
        Ok(())
    }
}

/// Every field-id and datetime-field clause reachable in the query, in
/// first-appearance order. Field literals name columns that already exist in
/// source documents, so they are not re-projected.
fn collect_query_fields(query: &Query) -> Vec<FieldRef> {
    let mut out = vec![];
    for field in &query.breakout {
        push_field(&mut out, field);
    }
    for field in &query.fields {
        push_field(&mut out, field);
    }
    if let Some(filter) = &query.filter {
        collect_filter_fields(filter, &mut out);
    }
    for aggregation in &query.aggregations {
        collect_aggregation_fields(aggregation, &mut out);
    }
    for order in &query.order_by {
        let (OrderBy::Asc(target) | OrderBy::Desc(target)) = order;
        if let OrderTarget::Field(field) = target {
            push_field(&mut out, field);
        }
    }
    out.into_iter().unique().collect()
}

fn push_field(out: &mut Vec<FieldRef>, field: &FieldRef) {
    if matches!(field, FieldRef::FieldLiteral(_)) {
        return;
    }
    out.push(field.clone());
}

fn collect_filter_fields(filter: &Filter, out: &mut Vec<FieldRef>) {
    use Filter::*;
    match filter {
        And(subfilters) | Or(subfilters) => {
            for subfilter in subfilters {
                collect_filter_fields(subfilter, out);
            }
        }
        Not(inner) => collect_filter_fields(inner, out),
        Eq(field, value)
        | Ne(field, value)
        | Lt(field, value)
        | Gt(field, value)
        | Le(field, value)
        | Ge(field, value) => {
            push_field(out, field);
            collect_operand_fields(value, out);
        }
        Between { field, min, max } => {
            push_field(out, field);
            collect_operand_fields(min, out);
            collect_operand_fields(max, out);
        }
        Contains(matcher) | StartsWith(matcher) | EndsWith(matcher) => {
            push_field(out, &matcher.field);
            collect_operand_fields(&matcher.needle, out);
        }
        IsNull(field) | NotNull(field) => push_field(out, field),
    }
}

fn collect_operand_fields(operand: &Operand, out: &mut Vec<FieldRef>) {
    if let Operand::Field(field) = operand {
        push_field(out, field);
    }
}

fn collect_aggregation_fields(aggregation: &Aggregation, out: &mut Vec<FieldRef>) {
    use AggregationKind::*;
    match &aggregation.kind {
        Count => {}
        CountField(field) | Avg(field) | Distinct(field) | Sum(field) | Min(field)
        | Max(field) => push_field(out, field),
        SumWhere(field, predicate) => {
            push_field(out, field);
            collect_filter_fields(predicate, out);
        }
        CountWhere(predicate) | Share(predicate) => collect_filter_fields(predicate, out),
    }
}
