use crate::{
    fields::FieldType,
    tql::TemporalUnit,
    translator::{Error, Result},
};
use bson::{bson, Bson};
use chrono::{DateTime, Datelike, Duration, Months, Timelike, Utc};
use std::fmt::Display;

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Wraps a source expression in a `$let` binding and applies the bucketing
/// expression for `unit` to the bound column. Binding once keeps the (often
/// deeply nested) source expression from being re-evaluated in every leaf of
/// the unit arithmetic.
pub(crate) fn bucketed_column_expr(
    source: Bson,
    special_type: Option<FieldType>,
    unit: TemporalUnit,
) -> Bson {
    bson!({
        "$let": {
            "vars": {"column": coerce_to_date(source, special_type)},
            "in": unit_expr(unit),
        }
    })
}

/// Mongo date arithmetic adds numbers as milliseconds, so UNIX-seconds
/// columns are scaled before the epoch shift.
fn coerce_to_date(source: Bson, special_type: Option<FieldType>) -> Bson {
    let epoch = Bson::DateTime(bson::DateTime::from_millis(0));
    match special_type {
        Some(t) if t.isa(FieldType::UnixTimestampMilliseconds) => {
            bson!({"$add": [epoch, source]})
        }
        Some(t) if t.isa(FieldType::UnixTimestampSeconds) => {
            bson!({"$add": [epoch, {"$multiply": [source, 1000]}]})
        }
        _ => source,
    }
}

fn stringify(format: &str, date: Bson) -> Bson {
    bson!({"___date": {"$dateToString": {"format": format, "date": date}}})
}

/// The document store has no first-class date bucketing, so each unit is a
/// stage-operator tree over the `$let`-bound column. String-formatted units
/// travel as `{___date: …}` envelopes and are rehydrated after execution.
fn unit_expr(unit: TemporalUnit) -> Bson {
    use TemporalUnit::*;
    match unit {
        Default => bson!("$$column"),
        Minute => stringify("%Y-%m-%dT%H:%M:00", bson!("$$column")),
        MinuteOfHour => bson!({"$minute": "$$column"}),
        Hour => stringify("%Y-%m-%dT%H:00:00", bson!("$$column")),
        HourOfDay => bson!({"$hour": "$$column"}),
        Day => stringify("%Y-%m-%d", bson!("$$column")),
        DayOfWeek => bson!({"$dayOfWeek": "$$column"}),
        DayOfMonth => bson!({"$dayOfMonth": "$$column"}),
        DayOfYear => bson!({"$dayOfYear": "$$column"}),
        // roll back to the preceding Sunday before formatting
        Week => stringify(
            "%Y-%m-%d",
            bson!({"$subtract": [
                "$$column",
                {"$multiply": [{"$subtract": [{"$dayOfWeek": "$$column"}, 1]}, MILLIS_PER_DAY]}
            ]}),
        ),
        WeekOfYear => bson!({"$add": [{"$week": "$$column"}, 1]}),
        Month => stringify("%Y-%m", bson!("$$column")),
        MonthOfYear => bson!({"$month": "$$column"}),
        // quarters are 91-day blocks offset so the mod lands inside the
        // quarter's first month
        Quarter => stringify(
            "%Y-%m",
            bson!({"$subtract": [
                "$$column",
                {"$multiply": [{"$subtract": [{"$mod": [{"$dayOfYear": "$$column"}, 91]}, 3]}, MILLIS_PER_DAY]}
            ]}),
        ),
        QuarterOfYear => bson!({
            "$divide": [
                {"$subtract": [
                    {"$add": [{"$month": "$$column"}, 2]},
                    {"$mod": [{"$add": [{"$month": "$$column"}, 2]}, 3]}
                ]},
                3
            ]
        }),
        Year => bson!({"$year": "$$column"}),
    }
}

/// Applies `unit` to a host timestamp at compile time, mirroring what
/// `unit_expr` computes inside the pipeline. The symmetry is what lets a
/// bucketed field compare equal to an absolute datetime literal.
pub(crate) fn bucket_timestamp(ts: bson::DateTime, unit: TemporalUnit) -> Bson {
    use TemporalUnit::*;
    let t = ts.to_chrono();
    match unit {
        Default => Bson::DateTime(ts),
        Minute => date_envelope(t.format("%Y-%m-%dT%H:%M:00")),
        MinuteOfHour => Bson::Int32(t.minute() as i32),
        Hour => date_envelope(t.format("%Y-%m-%dT%H:00:00")),
        HourOfDay => Bson::Int32(t.hour() as i32),
        Day => date_envelope(t.format("%Y-%m-%d")),
        // $dayOfWeek is Sunday-based and one-indexed
        DayOfWeek => Bson::Int32(t.weekday().num_days_from_sunday() as i32 + 1),
        DayOfMonth => Bson::Int32(t.day() as i32),
        DayOfYear => Bson::Int32(t.ordinal() as i32),
        Week => {
            let sunday = t - Duration::days(t.weekday().num_days_from_sunday() as i64);
            date_envelope(sunday.format("%Y-%m-%d"))
        }
        WeekOfYear => {
            // %U is the Sunday-based zero-indexed week, matching $week
            let week: i32 = t.format("%U").to_string().parse().unwrap_or_default();
            Bson::Int32(week + 1)
        }
        Month => date_envelope(t.format("%Y-%m")),
        MonthOfYear => Bson::Int32(t.month() as i32),
        Quarter => {
            let start = t - Duration::days((t.ordinal() as i64 % 91) - 3);
            date_envelope(start.format("%Y-%m"))
        }
        QuarterOfYear => {
            let shifted = t.month() as i32 + 2;
            Bson::Int32((shifted - shifted % 3) / 3)
        }
        Year => Bson::Int32(t.year()),
    }
}

fn date_envelope(formatted: impl Display) -> Bson {
    bson!({"___date": formatted.to_string()})
}

/// A relative datetime is the current moment shifted by `amount` whole
/// units, then bucketed like an absolute one.
pub(crate) fn current_timestamp_offset(amount: i64, unit: TemporalUnit) -> Result<bson::DateTime> {
    timestamp_offset(Utc::now(), amount, unit)
}

pub(crate) fn timestamp_offset(
    base: DateTime<Utc>,
    amount: i64,
    unit: TemporalUnit,
) -> Result<bson::DateTime> {
    use TemporalUnit::*;
    let shifted = match unit {
        Minute => Some(base + Duration::minutes(amount)),
        Hour => Some(base + Duration::hours(amount)),
        Day => Some(base + Duration::days(amount)),
        Week => Some(base + Duration::weeks(amount)),
        Month => shift_months(base, amount),
        Quarter => shift_months(base, amount * 3),
        Year => shift_months(base, amount * 12),
        // bucket extractions have no duration
        _ => None,
    };
    shifted
        .map(bson::DateTime::from_chrono)
        .ok_or(Error::UnsupportedUnit(unit, "relative datetime"))
}

fn shift_months(base: DateTime<Utc>, months: i64) -> Option<DateTime<Utc>> {
    let magnitude = u32::try_from(months.unsigned_abs()).ok()?;
    if months >= 0 {
        base.checked_add_months(Months::new(magnitude))
    } else {
        base.checked_sub_months(Months::new(magnitude))
    }
}
