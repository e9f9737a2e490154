use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveTime, Timelike, Utc};
use common::{ItemId, SaleEventId};
use serde::{Deserialize, Serialize};

use super::required;
use crate::error::{EngineError, Result};

/// When a flash sale accepts admissions. Both bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SaleWindow {
    /// A single absolute interval.
    Between {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// The same wall-clock interval every day, in a fixed UTC offset.
    /// An `end` earlier than `start` wraps past midnight.
    Daily {
        start: NaiveTime,
        end: NaiveTime,
        utc_offset_minutes: i32,
    },
}

fn time_of_day(time: NaiveTime) -> String {
    if time.second() == 0 {
        time.format("%H:%M").to_string()
    } else {
        time.format("%H:%M:%S").to_string()
    }
}

/// Converts an offset in minutes, rejecting anything outside a day.
fn fixed_offset(utc_offset_minutes: i32) -> Option<FixedOffset> {
    utc_offset_minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
}

impl SaleWindow {
    /// Rejects windows that could not be stored and read back: an absolute
    /// window ending before it starts, or a daily offset of a day or more.
    pub fn validate(&self) -> Result<()> {
        match *self {
            SaleWindow::Between { start, end } if end < start => Err(EngineError::Validation(
                "sale window ends before it starts".to_string(),
            )),
            SaleWindow::Daily {
                utc_offset_minutes, ..
            } if fixed_offset(utc_offset_minutes).is_none() => {
                Err(EngineError::Validation(format!(
                    "UTC offset of {utc_offset_minutes} minutes is out of range"
                )))
            }
            _ => Ok(()),
        }
    }

    /// Returns true if `now` falls inside the window.
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        match *self {
            SaleWindow::Between { start, end } => start <= now && now <= end,
            SaleWindow::Daily {
                start,
                end,
                utc_offset_minutes,
            } => {
                let Some(offset) = fixed_offset(utc_offset_minutes) else {
                    return false;
                };
                let local = now.with_timezone(&offset).time();
                if start <= end {
                    start <= local && local <= end
                } else {
                    local >= start || local <= end
                }
            }
        }
    }

    fn to_fields(self) -> Vec<(String, String)> {
        match self {
            SaleWindow::Between { start, end } => vec![
                ("start".to_string(), start.to_rfc3339()),
                ("end".to_string(), end.to_rfc3339()),
            ],
            SaleWindow::Daily {
                start,
                end,
                utc_offset_minutes,
            } => {
                let sign = if utc_offset_minutes < 0 { '-' } else { '+' };
                let minutes = utc_offset_minutes.unsigned_abs();
                vec![
                    ("start".to_string(), time_of_day(start)),
                    ("end".to_string(), time_of_day(end)),
                    (
                        "utc_offset".to_string(),
                        format!("{sign}{:02}:{:02}", minutes / 60, minutes % 60),
                    ),
                ]
            }
        }
    }

    fn from_fields(key: &str, fields: &BTreeMap<String, String>) -> Result<Self> {
        let start = required(key, fields, "start")?.trim();
        let end = required(key, fields, "end")?.trim();

        if let (Ok(start), Ok(end)) = (
            DateTime::parse_from_rfc3339(start),
            DateTime::parse_from_rfc3339(end),
        ) {
            return Ok(SaleWindow::Between {
                start: start.with_timezone(&Utc),
                end: end.with_timezone(&Utc),
            });
        }

        let time = |raw: &str| {
            NaiveTime::parse_from_str(raw, "%H:%M")
                .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
                .map_err(|_| EngineError::corrupt(key, format!("`{raw}` is not a time of day")))
        };
        let utc_offset_minutes = match fields.get("utc_offset") {
            None => 0,
            Some(raw) => raw
                .trim()
                .parse::<FixedOffset>()
                .map(|offset| offset.local_minus_utc() / 60)
                .map_err(|_| EngineError::corrupt(key, format!("`{raw}` is not a UTC offset")))?,
        };

        Ok(SaleWindow::Daily {
            start: time(start)?,
            end: time(end)?,
            utc_offset_minutes,
        })
    }
}

/// Configuration of one flash-sale event. Read-only to the admission path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashSaleConfig {
    pub event_id: SaleEventId,
    pub item_id: ItemId,
    pub window: SaleWindow,
    pub quota: u32,
}

impl FlashSaleConfig {
    /// Encodes the configuration as hash fields.
    pub fn to_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            ("product_id".to_string(), self.item_id.to_string()),
            ("quota".to_string(), self.quota.to_string()),
        ];
        fields.extend(self.window.to_fields());
        fields
    }

    /// Decodes the configuration stored at `key`.
    pub fn from_fields(
        event_id: SaleEventId,
        key: &str,
        fields: &BTreeMap<String, String>,
    ) -> Result<Self> {
        let item_id = ItemId::parse(required(key, fields, "product_id")?)
            .map_err(|e| EngineError::corrupt(key, e.to_string()))?;
        let raw_quota = required(key, fields, "quota")?;
        let quota = raw_quota
            .trim()
            .parse::<u32>()
            .map_err(|_| EngineError::corrupt(key, format!("quota `{raw_quota}` is not a count")))?;

        Ok(Self {
            event_id,
            item_id,
            window: SaleWindow::from_fields(key, fields)?,
            quota,
        })
    }
}
