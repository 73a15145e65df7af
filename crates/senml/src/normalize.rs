use std::collections::HashMap;

use crate::record::Record;

/// Times below 2^28 are relative to "now" (RFC 8428 section 4.5.3).
pub const RELATIVE_TIME_THRESHOLD: f64 = 268_435_456.0;

/// Base fields in effect at a given point of the pack.
#[derive(Default)]
struct Base {
    name: Option<String>,
    time: Option<f64>,
    unit: Option<String>,
    value: Option<f64>,
    sum: Option<f64>,
}

impl Base {
    fn absorb(&mut self, record: &Record) {
        if let Some(name) = &record.base_name {
            self.name = Some(name.clone());
        }
        if let Some(time) = record.base_time {
            self.time = Some(time);
        }
        if let Some(unit) = &record.base_unit {
            self.unit = Some(unit.clone());
        }
        if let Some(value) = record.base_value {
            self.value = Some(value);
        }
        if let Some(sum) = record.base_sum {
            self.sum = Some(sum);
        }
    }
}

/// Resolve raw records into self-contained records.
///
/// Base fields apply to the record declaring them and every later record
/// until overridden. A record carrying only a sum takes the previous resolved
/// value of the same name plus that sum as its value. Output has the same
/// length and order as the input, and relative times stay relative.
pub fn normalize(records: &[Record]) -> Vec<Record> {
    resolve(records, None)
}

/// Like [`normalize`], but relative or missing times are anchored to `now`
/// (seconds since the Unix epoch).
pub fn normalize_at(records: &[Record], now: f64) -> Vec<Record> {
    resolve(records, Some(now))
}

fn resolve(records: &[Record], anchor: Option<f64>) -> Vec<Record> {
    let mut base = Base::default();
    let mut last_values: HashMap<String, f64> = HashMap::new();

    records
        .iter()
        .map(|record| {
            base.absorb(record);

            let name = match (&base.name, &record.name) {
                (None, None) => None,
                (prefix, suffix) => Some(format!(
                    "{}{}",
                    prefix.as_deref().unwrap_or_default(),
                    suffix.as_deref().unwrap_or_default()
                )),
            };

            let time = match (base.time, record.time) {
                (None, None) => None,
                (offset, time) => Some(offset.unwrap_or(0.0) + time.unwrap_or(0.0)),
            };
            let time = match anchor {
                Some(now) => Some(anchor_time(time, now)),
                None => time,
            };

            let sum = record.sum.map(|s| base.sum.unwrap_or(0.0) + s);

            let key = name.clone().unwrap_or_default();
            let value = match (record.value, record.sum) {
                (Some(v), _) => Some(base.value.unwrap_or(0.0) + v),
                (None, Some(delta)) if record.value_kind().is_none() => {
                    Some(last_values.get(&key).copied().unwrap_or(0.0) + delta)
                }
                _ => None,
            };
            if let Some(v) = value {
                last_values.insert(key, v);
            }

            Record {
                name,
                unit: record.unit.clone().or_else(|| base.unit.clone()),
                value,
                string_value: record.string_value.clone(),
                bool_value: record.bool_value,
                data_value: record.data_value.clone(),
                sum,
                time,
                update_time: record.update_time,
                link: record.link.clone(),
                ..Default::default()
            }
        })
        .collect()
}

fn anchor_time(time: Option<f64>, now: f64) -> f64 {
    match time {
        Some(t) if t >= RELATIVE_TIME_THRESHOLD => t,
        Some(t) => now + t,
        None => now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str, value: f64) -> Record {
        Record {
            name: Some(name.to_string()),
            value: Some(value),
            ..Default::default()
        }
    }

    #[test]
    fn test_base_fields_are_stripped() {
        let records = vec![Record {
            base_name: Some("dev/".to_string()),
            base_time: Some(1_700_000_000.0),
            base_unit: Some("Cel".to_string()),
            base_version: Some(10),
            name: Some("temp".to_string()),
            value: Some(21.0),
            ..Default::default()
        }];

        let resolved = normalize(&records);

        assert_eq!(resolved.len(), 1);
        assert!(!resolved[0].has_base_fields());
        assert_eq!(resolved[0].name.as_deref(), Some("dev/temp"));
        assert_eq!(resolved[0].unit.as_deref(), Some("Cel"));
        assert_eq!(resolved[0].time, Some(1_700_000_000.0));
    }

    #[test]
    fn test_explicit_unit_wins_over_base_unit() {
        let records = vec![
            Record {
                base_unit: Some("Cel".to_string()),
                unit: Some("%RH".to_string()),
                ..named("hum", 40.0)
            },
            named("temp", 20.0),
        ];

        let resolved = normalize(&records);

        assert_eq!(resolved[0].unit.as_deref(), Some("%RH"));
        assert_eq!(resolved[1].unit.as_deref(), Some("Cel"));
    }

    #[test]
    fn test_base_value_is_added() {
        let records = vec![Record {
            base_value: Some(100.0),
            ..named("level", 5.0)
        }];

        assert_eq!(normalize(&records)[0].value, Some(105.0));
    }

    #[test]
    fn test_base_sum_is_added() {
        let records = vec![Record {
            base_sum: Some(10.0),
            name: Some("energy".to_string()),
            value: Some(1.0),
            sum: Some(2.0),
            ..Default::default()
        }];

        let resolved = normalize(&records);
        assert_eq!(resolved[0].sum, Some(12.0));
        assert_eq!(resolved[0].value, Some(1.0));
    }

    #[test]
    fn test_sum_without_predecessor_starts_from_zero() {
        let records = vec![Record {
            name: Some("energy".to_string()),
            sum: Some(4.5),
            ..Default::default()
        }];

        assert_eq!(normalize(&records)[0].value, Some(4.5));
    }

    #[test]
    fn test_sum_only_uses_same_name() {
        let records = vec![
            named("a", 10.0),
            named("b", 100.0),
            Record {
                name: Some("a".to_string()),
                sum: Some(1.0),
                ..Default::default()
            },
        ];

        assert_eq!(normalize(&records)[2].value, Some(11.0));
    }

    #[test]
    fn test_sum_with_string_value_is_not_a_delta() {
        let records = vec![
            named("state", 1.0),
            Record {
                name: Some("state".to_string()),
                string_value: Some("on".to_string()),
                sum: Some(1.0),
                ..Default::default()
            },
        ];

        let resolved = normalize(&records);
        assert_eq!(resolved[1].value, None);
        assert_eq!(resolved[1].string_value.as_deref(), Some("on"));
    }

    #[test]
    fn test_pure_normalize_keeps_relative_time() {
        let records = vec![Record {
            time: Some(-5.0),
            ..named("temp", 1.0)
        }];

        assert_eq!(normalize(&records)[0].time, Some(-5.0));
    }

    #[test]
    fn test_normalize_at_anchors_relative_times() {
        let now = 1_700_000_000.0;
        let records = vec![
            Record {
                time: Some(-5.0),
                ..named("a", 1.0)
            },
            named("b", 2.0),
            Record {
                time: Some(1_600_000_000.0),
                ..named("c", 3.0)
            },
        ];

        let resolved = normalize_at(&records, now);

        assert_eq!(resolved[0].time, Some(now - 5.0));
        assert_eq!(resolved[1].time, Some(now));
        assert_eq!(resolved[2].time, Some(1_600_000_000.0));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let records = vec![
            Record {
                base_name: Some("dev/".to_string()),
                base_time: Some(1_700_000_000.0),
                base_value: Some(1.0),
                ..named("a", 1.0)
            },
            Record {
                name: Some("a".to_string()),
                sum: Some(2.0),
                time: Some(10.0),
                ..Default::default()
            },
            Record {
                name: Some("b".to_string()),
                string_value: Some("ok".to_string()),
                ..Default::default()
            },
        ];

        let once = normalize(&records);
        let twice = normalize(&once);

        assert_eq!(once, twice);
    }
}
