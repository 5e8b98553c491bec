use crate::{
    fields::{FieldId, FieldRecord, FieldType},
    tql::{FieldRef, Operand, TemporalUnit},
    translator::{datetime, Error, PipelineTranslator, Result},
};
use bson::Bson;

/// Joins the segments of a nested source path in escaped names; group keys
/// may not contain `.`.
pub(crate) const PATH_SEPARATOR: &str = "___";

/// Separates an escaped name from the temporal unit it was bucketed by.
pub(crate) const UNIT_SEPARATOR: &str = "~~~";

/// Strips any `~~~unit` bucket suffix and restores `___` separators to the
/// dotted source path. Inverse of lvalue escaping for any path that contains
/// neither separator.
pub fn unescape_name(name: &str) -> String {
    let base = match name.find(UNIT_SEPARATOR) {
        Some(idx) => &name[..idx],
        None => name,
    };
    base.replace(PATH_SEPARATOR, ".")
}

impl PipelineTranslator<'_> {
    pub(crate) fn resolve_field(&self, id: FieldId) -> Result<FieldRecord> {
        self.resolver.field(id).ok_or(Error::FieldResolution(id))
    }

    /// Source-document path of a field: ancestor names, root first.
    pub(crate) fn field_path(&self, id: FieldId) -> Result<Vec<String>> {
        let mut names = vec![];
        let mut current = Some(id);
        while let Some(id) = current {
            let record = self.resolve_field(id)?;
            names.push(record.name);
            current = record.parent_id;
        }
        names.reverse();
        Ok(names)
    }

    /// The escaped, non-blank identifier a clause is projected under.
    pub(crate) fn lvalue(&self, field: &FieldRef) -> Result<String> {
        match field {
            FieldRef::FieldId(id) => Ok(self.field_path(*id)?.join(PATH_SEPARATOR)),
            FieldRef::FieldLiteral(name) => {
                if name.trim().is_empty() {
                    return Err(Error::InvalidQuery("blank field literal".to_string()));
                }
                Ok(name.clone())
            }
            FieldRef::DatetimeField { field, unit } => {
                Ok(format!("{}{}{}", self.lvalue(field)?, UNIT_SEPARATOR, unit))
            }
        }
    }

    /// Reference to an already-projected column, for use in any stage after
    /// the initial projection.
    pub(crate) fn field_rvalue(&self, field: &FieldRef) -> Result<String> {
        Ok(format!("${}", self.lvalue(field)?))
    }

    /// The defining expression of a column in the first projection stage,
    /// phrased against raw source documents.
    pub(crate) fn initial_rvalue(&self, field: &FieldRef) -> Result<Bson> {
        match field {
            FieldRef::FieldId(id) => {
                Ok(Bson::String(format!("${}", self.field_path(*id)?.join("."))))
            }
            FieldRef::FieldLiteral(name) => Ok(Bson::String(format!("${name}"))),
            FieldRef::DatetimeField { field, unit } => {
                let record = match field.as_ref() {
                    FieldRef::FieldId(id) => Some(self.resolve_field(*id)?),
                    _ => None,
                };
                if let Some(record) = &record {
                    let datetime_but_not_bucketable = record.base_type.isa(FieldType::DateTime)
                        && !record.base_type.is_bucketable();
                    if datetime_but_not_bucketable && *unit != TemporalUnit::Default {
                        return Err(Error::InvalidQuery(format!(
                            "time field {} cannot be bucketed by {unit}",
                            record.name
                        )));
                    }
                }
                let source = self.initial_rvalue(field)?;
                let special_type = record.as_ref().and_then(|record| record.special_type);
                Ok(datetime::bucketed_column_expr(source, special_type, *unit))
            }
        }
    }

    /// Value-position rendering of an operand: a reference for fields, a
    /// BSON literal otherwise. Datetimes are bucketed at compile time so
    /// they compare against bucketed columns.
    pub(crate) fn operand_rvalue(&self, operand: &Operand) -> Result<Bson> {
        match operand {
            Operand::Field(field) => Ok(Bson::String(self.field_rvalue(field)?)),
            Operand::Literal(literal) => Ok(literal.clone().into()),
            Operand::AbsoluteDatetime { ts, unit } => Ok(datetime::bucket_timestamp(*ts, *unit)),
            Operand::RelativeDatetime { amount, unit } => {
                let ts = datetime::current_timestamp_offset(*amount, *unit)?;
                Ok(datetime::bucket_timestamp(ts, *unit))
            }
        }
    }
}
