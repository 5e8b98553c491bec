use crate::{
    fields::{FieldId, FieldRecord, FieldResolver, FieldType, TableId},
    tql::{FieldRef, Literal, Operand},
};
use chrono::{TimeZone, Utc};
use std::collections::BTreeMap;

mod stages;

/// Field catalog shared by the translator tests.
pub(crate) struct TestResolver {
    fields: BTreeMap<FieldId, FieldRecord>,
    tables: BTreeMap<TableId, String>,
}

impl TestResolver {
    pub(crate) fn new() -> Self {
        let mut resolver = Self {
            fields: BTreeMap::new(),
            tables: BTreeMap::new(),
        };
        resolver.tables.insert(TableId(1), "venues".to_string());
        resolver.add_field(1, "price", None, FieldType::Integer, None);
        resolver.add_field(2, "name", None, FieldType::Text, None);
        resolver.add_field(3, "created_at", None, FieldType::DateTime, None);
        resolver.add_field(
            4,
            "last_login",
            None,
            FieldType::Integer,
            Some(FieldType::UnixTimestampMilliseconds),
        );
        resolver.add_field(5, "source", None, FieldType::Text, None);
        resolver.add_field(
            6,
            "joined_at",
            None,
            FieldType::Integer,
            Some(FieldType::UnixTimestampSeconds),
        );
        resolver.add_field(7, "username", Some(FieldId(5)), FieldType::Text, None);
        resolver.add_field(8, "lunch_at", None, FieldType::Time, None);
        resolver
    }

    fn add_field(
        &mut self,
        id: u32,
        name: &str,
        parent_id: Option<FieldId>,
        base_type: FieldType,
        special_type: Option<FieldType>,
    ) {
        self.fields.insert(
            FieldId(id),
            FieldRecord {
                id: FieldId(id),
                name: name.to_string(),
                parent_id,
                base_type,
                special_type,
            },
        );
    }
}

impl FieldResolver for TestResolver {
    fn field(&self, id: FieldId) -> Option<FieldRecord> {
        self.fields.get(&id).cloned()
    }

    fn table(&self, id: TableId) -> Option<String> {
        self.tables.get(&id).cloned()
    }
}

pub(crate) fn field(id: u32) -> FieldRef {
    FieldRef::FieldId(FieldId(id))
}

pub(crate) fn int(value: i64) -> Operand {
    Operand::Literal(Literal::Integer(value))
}

pub(crate) fn string(value: &str) -> Operand {
    Operand::Literal(Literal::String(value.to_string()))
}

pub(crate) fn ts(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> bson::DateTime {
    bson::DateTime::from_chrono(Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap())
}
