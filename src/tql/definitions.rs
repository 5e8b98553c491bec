use crate::fields::{FieldId, TableId};
use bson::Bson;
use std::fmt;

/// A structured TQL query against a single source table. Every section is
/// optional except the source table; the translator turns each populated
/// section into one or more pipeline stages.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub source_table: TableId,
    pub filter: Option<Filter>,
    pub aggregations: Vec<Aggregation>,
    pub breakout: Vec<FieldRef>,
    pub fields: Vec<FieldRef>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<i64>,
    pub page: Option<Page>,
}

impl Query {
    pub fn new(source_table: TableId) -> Self {
        Self {
            source_table,
            filter: None,
            aggregations: vec![],
            breakout: vec![],
            fields: vec![],
            order_by: vec![],
            limit: None,
            page: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldRef {
    FieldId(FieldId),
    FieldLiteral(String),
    DatetimeField {
        field: Box<FieldRef>,
        unit: TemporalUnit,
    },
}

impl FieldRef {
    pub fn bucketed(self, unit: TemporalUnit) -> FieldRef {
        FieldRef::DatetimeField {
            field: Box::new(self),
            unit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemporalUnit {
    Default,
    Minute,
    MinuteOfHour,
    Hour,
    HourOfDay,
    Day,
    DayOfWeek,
    DayOfMonth,
    DayOfYear,
    Week,
    WeekOfYear,
    Month,
    MonthOfYear,
    Quarter,
    QuarterOfYear,
    Year,
}

impl TemporalUnit {
    pub fn as_str(self) -> &'static str {
        use TemporalUnit::*;
        match self {
            Default => "default",
            Minute => "minute",
            MinuteOfHour => "minute-of-hour",
            Hour => "hour",
            HourOfDay => "hour-of-day",
            Day => "day",
            DayOfWeek => "day-of-week",
            DayOfMonth => "day-of-month",
            DayOfYear => "day-of-year",
            Week => "week",
            WeekOfYear => "week-of-year",
            Month => "month",
            MonthOfYear => "month-of-year",
            Quarter => "quarter",
            QuarterOfYear => "quarter-of-year",
            Year => "year",
        }
    }
}

impl fmt::Display for TemporalUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    String(String),
    DateTime(bson::DateTime),
}

impl From<Literal> for Bson {
    fn from(lit: Literal) -> Bson {
        match lit {
            Literal::Null => Bson::Null,
            Literal::Boolean(b) => Bson::Boolean(b),
            Literal::Integer(i) => Bson::Int64(i),
            Literal::Double(d) => Bson::Double(d),
            Literal::String(s) => Bson::String(s),
            Literal::DateTime(d) => Bson::DateTime(d),
        }
    }
}

/// The value side of a comparison: a projected field, a literal, or a
/// datetime that is bucketed at compile time so it can be compared against a
/// bucketed field.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Field(FieldRef),
    Literal(Literal),
    AbsoluteDatetime {
        ts: bson::DateTime,
        unit: TemporalUnit,
    },
    RelativeDatetime {
        amount: i64,
        unit: TemporalUnit,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Eq(FieldRef, Operand),
    Ne(FieldRef, Operand),
    Lt(FieldRef, Operand),
    Gt(FieldRef, Operand),
    Le(FieldRef, Operand),
    Ge(FieldRef, Operand),
    Between {
        field: FieldRef,
        min: Operand,
        max: Operand,
    },
    Contains(StringMatch),
    StartsWith(StringMatch),
    EndsWith(StringMatch),
    IsNull(FieldRef),
    NotNull(FieldRef),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StringMatch {
    pub field: FieldRef,
    pub needle: Operand,
    pub case_sensitive: bool,
}

impl StringMatch {
    /// Matches are case-sensitive unless the option is set otherwise.
    pub fn new(field: FieldRef, needle: Operand) -> Self {
        Self {
            field,
            needle,
            case_sensitive: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub kind: AggregationKind,
    /// Explicit name carried by the query; unnamed aggregations get a stable
    /// generated name during translation.
    pub name: Option<String>,
}

impl From<AggregationKind> for Aggregation {
    fn from(kind: AggregationKind) -> Self {
        Aggregation { kind, name: None }
    }
}

impl Aggregation {
    pub fn named(kind: AggregationKind, name: impl Into<String>) -> Self {
        Aggregation {
            kind,
            name: Some(name.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AggregationKind {
    Count,
    CountField(FieldRef),
    Avg(FieldRef),
    Distinct(FieldRef),
    Sum(FieldRef),
    Min(FieldRef),
    Max(FieldRef),
    SumWhere(FieldRef, Filter),
    CountWhere(Filter),
    Share(Filter),
}

impl AggregationKind {
    pub fn op_name(&self) -> &'static str {
        use AggregationKind::*;
        match self {
            Count | CountField(_) => "count",
            Avg(_) => "avg",
            Distinct(_) => "distinct",
            Sum(_) => "sum",
            Min(_) => "min",
            Max(_) => "max",
            SumWhere(..) => "sum-where",
            CountWhere(_) => "count-where",
            Share(_) => "share",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderBy {
    Asc(OrderTarget),
    Desc(OrderTarget),
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderTarget {
    Field(FieldRef),
    /// References the query's aggregation at the given index.
    Aggregation(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub items: i64,
}
