//! Date and date-time handlers.
//!
//! Values are written in a canonical format; reads that do not match it fall
//! back to the lenient parser so hand-written or legacy rows still load.

use chrono::{FixedOffset, NaiveTime, TimeZone};
use metable_types::time::{self, is_date_shaped};
use metable_types::MetaValue;
use tracing::warn;

use crate::error::{CodecError, CodecResult};
use crate::handler::{type_ids, TypeHandler};

/// Handler for calendar dates (`Y-m-d`).
///
/// Claims [`MetaValue::Date`] and strings shaped `YYYY-MM-DD`. Deserialized
/// values are plain dates, i.e. truncated to the start of the day.
#[derive(Debug, Default, Clone, Copy)]
pub struct DateHandler;

impl TypeHandler for DateHandler {
    fn type_id(&self) -> &str {
        type_ids::DATE
    }

    fn can_handle(&self, value: &MetaValue) -> bool {
        match value {
            MetaValue::Date(_) => true,
            MetaValue::Str(s) => is_date_shaped(s) && time::parse_canonical_date(s).is_some(),
            _ => false,
        }
    }

    fn serialize(&self, value: &MetaValue) -> CodecResult<String> {
        let date = match value {
            MetaValue::Date(d) => *d,
            MetaValue::DateTime(dt) => dt.date_naive(),
            MetaValue::Str(s) => time::parse_lenient_date(s, time::now())
                .ok_or_else(|| CodecError::malformed(self.type_id(), format!("unparseable date {s:?}")))?,
            other => return Err(CodecError::unsupported(self.type_id(), other)),
        };
        Ok(time::format_date(&date))
    }

    fn deserialize(&self, raw: Option<&str>) -> CodecResult<MetaValue> {
        let Some(raw) = raw else {
            return Ok(MetaValue::Null);
        };
        if let Some(date) = time::parse_canonical_date(raw) {
            return Ok(MetaValue::Date(date));
        }
        warn!(raw, "stored date is not canonical, parsing leniently");
        time::parse_lenient_date(raw, time::now())
            .map(MetaValue::Date)
            .ok_or_else(|| CodecError::malformed(self.type_id(), format!("unparseable date {raw:?}")))
    }
}

/// Handler for date-times, stored with microsecond and UTC-offset precision.
#[derive(Debug, Default, Clone, Copy)]
pub struct DateTimeHandler;

impl TypeHandler for DateTimeHandler {
    fn type_id(&self) -> &str {
        type_ids::DATETIME
    }

    fn can_handle(&self, value: &MetaValue) -> bool {
        matches!(value, MetaValue::DateTime(_))
    }

    fn serialize(&self, value: &MetaValue) -> CodecResult<String> {
        let dt = match value {
            MetaValue::DateTime(dt) => *dt,
            MetaValue::Date(d) => {
                let utc = FixedOffset::east_opt(0).ok_or_else(|| {
                    CodecError::malformed(self.type_id(), "invalid UTC offset")
                })?;
                utc.from_utc_datetime(&d.and_time(NaiveTime::MIN))
            }
            MetaValue::Str(s) => time::parse_lenient(s, time::now()).ok_or_else(|| {
                CodecError::malformed(self.type_id(), format!("unparseable date-time {s:?}"))
            })?,
            other => return Err(CodecError::unsupported(self.type_id(), other)),
        };
        Ok(time::format_datetime(&dt))
    }

    fn deserialize(&self, raw: Option<&str>) -> CodecResult<MetaValue> {
        let Some(raw) = raw else {
            return Ok(MetaValue::Null);
        };
        if let Some(dt) = time::parse_canonical_datetime(raw) {
            return Ok(MetaValue::DateTime(dt));
        }
        warn!(raw, "stored date-time is not canonical, parsing leniently");
        time::parse_lenient(raw, time::now())
            .map(MetaValue::DateTime)
            .ok_or_else(|| {
                CodecError::malformed(self.type_id(), format!("unparseable date-time {raw:?}"))
            })
    }
}
