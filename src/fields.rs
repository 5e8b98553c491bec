use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(pub u32);

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Field type taxonomy. `isa` is the reflexive-transitive subtype relation
/// over the parent links below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Integer,
    Float,
    Boolean,
    DateTime,
    Date,
    Time,
    UnixTimestampSeconds,
    UnixTimestampMilliseconds,
    Identifier,
    PrimaryKey,
    ForeignKey,
}

impl FieldType {
    fn parent(self) -> Option<FieldType> {
        use FieldType::*;
        match self {
            Date | Time | UnixTimestampSeconds | UnixTimestampMilliseconds => Some(DateTime),
            PrimaryKey | ForeignKey => Some(Identifier),
            _ => None,
        }
    }

    pub fn isa(self, ancestor: FieldType) -> bool {
        self == ancestor || self.parent().is_some_and(|p| p.isa(ancestor))
    }

    /// Time is a DateTime subtype but carries no calendar date, so it cannot
    /// be bucketed by calendar units.
    pub fn is_bucketable(self) -> bool {
        self.isa(FieldType::DateTime) && self != FieldType::Time
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldRecord {
    pub id: FieldId,
    pub name: String,
    pub parent_id: Option<FieldId>,
    pub base_type: FieldType,
    pub special_type: Option<FieldType>,
}

/// Synchronous lookup from field and table ids to metadata records.
///
/// The translator only ever reads through this interface, so a resolver
/// shared between threads must merely be safe for concurrent reads. Records
/// are treated as immutable for the duration of one compile.
pub trait FieldResolver {
    fn field(&self, id: FieldId) -> Option<FieldRecord>;
    fn table(&self, id: TableId) -> Option<String>;
}
