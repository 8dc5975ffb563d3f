use crate::sampling::value::ValueSum;
use crate::sampling::{FieldValue, ValueKind};
use derive_more::Display;
use std::sync::{Arc, Mutex};

/// The aggregation applied to the observations of an instance series.
#[derive(Debug, Display, Copy, Clone, PartialEq, Eq)]
pub enum AggregationMode {
    /// Keep every observed sample in call order.
    /// The series grows unbounded, one entry per sample; memory growth awareness lies with the caller.
    #[display("detailed")]
    Detailed,
    /// Keep a running `[count, min, max, mean]` reduction.
    /// The mean is materialized lazily when the series is read.
    #[display("mean")]
    Mean,
    /// Keep a running `[count, first, last]` reduction.
    #[display("first-last")]
    FirstLast,
}

/// The accumulated observations for one (counter, instance) pair.
/// A series is internally synchronized, reads and writes on the same series are mutually
/// exclusive while distinct series can be touched concurrently.
#[derive(Debug, Clone)]
pub struct InstanceSeries {
    inner: Arc<InnerInstanceSeries>,
}

impl InstanceSeries {
    /// Create a new empty series for the given instance identity.
    /// The instance identity is [None] for single-instance counter classes.
    ///
    /// # Panics
    ///
    /// It panics when mean aggregation is requested for text values.
    pub fn new(
        mode: AggregationMode,
        kind: ValueKind,
        instance: Option<String>,
        field: impl Into<String>,
    ) -> Self {
        if mode == AggregationMode::Mean && kind == ValueKind::Text {
            panic!("mean aggregation is not supported for text values");
        }

        Self {
            inner: Arc::new(InnerInstanceSeries {
                mode,
                kind,
                instance,
                field: field.into(),
                data: Mutex::new(SeriesData::default()),
            }),
        }
    }

    /// Get the aggregation mode of this series.
    pub fn mode(&self) -> AggregationMode {
        self.inner.mode
    }

    /// Get the value kind of this series.
    pub fn kind(&self) -> ValueKind {
        self.inner.kind
    }

    /// Get the instance identity tracked by this series.
    pub fn instance(&self) -> Option<&str> {
        self.inner.instance.as_deref()
    }

    /// Get the counter field name of this series.
    pub fn field(&self) -> &str {
        self.inner.field.as_str()
    }

    /// Append a new observation to the series.
    ///
    /// # Panics
    ///
    /// It panics when the observation kind differs from the series kind.
    pub fn push(&self, value: FieldValue) {
        if value.kind() != self.inner.kind {
            panic!(
                "series \"{}\" expected {} values, got {} instead",
                self.inner.field,
                self.inner.kind,
                value.kind()
            );
        }

        if let Ok(mut data) = self.inner.data.lock() {
            match self.inner.mode {
                AggregationMode::Detailed => data.values.push(value),
                AggregationMode::Mean => Self::push_mean(&mut data, self.inner.kind, value),
                AggregationMode::FirstLast => {
                    Self::push_first_last(&mut data, self.inner.kind, value)
                }
            }
        }
    }

    /// Get a snapshot of the accumulated values of this series.
    /// For mean aggregation, the mean slot is materialized from the running sum before the
    /// snapshot is taken.
    pub fn values(&self) -> Vec<FieldValue> {
        self.inner
            .data
            .lock()
            .map(|mut data| {
                if self.inner.mode == AggregationMode::Mean && data.count > 0 {
                    data.values[3] = data.sum.mean(data.count, self.inner.kind);
                }
                data.values.clone()
            })
            .unwrap_or_default()
    }

    /// Check if this series tracks the given instance identity.
    /// An absent or empty tracked identity matches only an absent queried identity,
    /// otherwise the identities are compared case-insensitively.
    pub fn matches(&self, instance: Option<&str>) -> bool {
        let tracked = self.inner.instance.as_deref().filter(|e| !e.is_empty());
        let queried = instance.filter(|e| !e.is_empty());

        match (tracked, queried) {
            (None, None) => true,
            (Some(mine), Some(other)) => mine.eq_ignore_ascii_case(other),
            _ => false,
        }
    }

    /// Reset the accumulated data of this series, preserving the aggregation mode.
    pub fn clear(&self) {
        if let Ok(mut data) = self.inner.data.lock() {
            data.values.clear();
            data.count = 0;
            data.sum.reset();
        }
    }

    fn push_mean(data: &mut SeriesData, kind: ValueKind, value: FieldValue) {
        data.count += 1;
        data.sum.accumulate(&value);

        if data.values.is_empty() {
            data.values = vec![
                FieldValue::of_count(kind, 1),
                value.clone(),
                value,
                FieldValue::zero(kind),
            ];
        } else {
            data.values[0] = FieldValue::of_count(kind, data.count);
            if value < data.values[1] {
                data.values[1] = value.clone();
            }
            if value > data.values[2] {
                data.values[2] = value;
            }
        }
    }

    fn push_first_last(data: &mut SeriesData, kind: ValueKind, value: FieldValue) {
        data.count += 1;

        if data.values.is_empty() {
            data.values = vec![FieldValue::of_count(kind, 1), value.clone(), value];
        } else {
            data.values[0] = FieldValue::of_count(kind, data.count);
            data.values[2] = value;
        }
    }
}

#[derive(Debug)]
struct InnerInstanceSeries {
    mode: AggregationMode,
    kind: ValueKind,
    instance: Option<String>,
    field: String,
    data: Mutex<SeriesData>,
}

#[derive(Debug, Default)]
struct SeriesData {
    values: Vec<FieldValue>,
    count: u64,
    sum: ValueSum,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detailed_push_order() {
        let series = InstanceSeries::new(
            AggregationMode::Detailed,
            ValueKind::Int64,
            Some("0".to_string()),
            "PercentProcessorTime",
        );

        series.push(FieldValue::Int64(10));
        series.push(FieldValue::Int64(5));
        series.push(FieldValue::Int64(25));

        assert_eq!(
            vec![
                FieldValue::Int64(10),
                FieldValue::Int64(5),
                FieldValue::Int64(25)
            ],
            series.values(),
            "expected every sample in call order"
        );
    }

    #[test]
    fn test_mean_slots() {
        let series = InstanceSeries::new(
            AggregationMode::Mean,
            ValueKind::Int32,
            Some("eth0".to_string()),
            "Status",
        );

        series.push(FieldValue::Int32(5));
        series.push(FieldValue::Int32(1));
        series.push(FieldValue::Int32(9));

        let result = series.values();

        assert_eq!(FieldValue::Int32(3), result[0], "expected the sample count");
        assert_eq!(FieldValue::Int32(1), result[1], "expected the minimum");
        assert_eq!(FieldValue::Int32(9), result[2], "expected the maximum");
        assert_eq!(FieldValue::Int32(5), result[3], "expected the mean");
    }

    #[test]
    fn test_mean_is_materialized_on_read() {
        let series = InstanceSeries::new(
            AggregationMode::Mean,
            ValueKind::Int64,
            None,
            "AvailableBytes",
        );

        series.push(FieldValue::Int64(100));
        let result = series.values();
        assert_eq!(FieldValue::Int64(100), result[3]);

        series.push(FieldValue::Int64(300));
        let result = series.values();
        assert_eq!(
            FieldValue::Int64(200),
            result[3],
            "expected the mean to be recomputed on read"
        );
    }

    #[test]
    fn test_first_last_slots() {
        let series = InstanceSeries::new(
            AggregationMode::FirstLast,
            ValueKind::Int32,
            Some("chrome".to_string()),
            "ThreadCount",
        );

        series.push(FieldValue::Int32(1));
        series.push(FieldValue::Int32(2));
        series.push(FieldValue::Int32(3));
        series.push(FieldValue::Int32(4));

        assert_eq!(
            vec![
                FieldValue::Int32(4),
                FieldValue::Int32(1),
                FieldValue::Int32(4)
            ],
            series.values(),
            "expected [count, first, last]"
        );
    }

    #[test]
    fn test_clear_behaves_as_fresh() {
        for mode in [
            AggregationMode::Detailed,
            AggregationMode::Mean,
            AggregationMode::FirstLast,
        ] {
            let series = InstanceSeries::new(mode, ValueKind::Int32, None, "Processes");
            let fresh = InstanceSeries::new(mode, ValueKind::Int32, None, "Processes");

            series.push(FieldValue::Int32(11));
            series.push(FieldValue::Int32(22));
            series.clear();

            series.push(FieldValue::Int32(7));
            fresh.push(FieldValue::Int32(7));

            assert_eq!(
                fresh.values(),
                series.values(),
                "expected a cleared {} series to behave as a fresh one",
                mode
            );
        }
    }

    #[test]
    fn test_matches() {
        let series = InstanceSeries::new(
            AggregationMode::Detailed,
            ValueKind::Int64,
            Some("_Total".to_string()),
            "PercentProcessorTime",
        );
        let single = InstanceSeries::new(
            AggregationMode::Detailed,
            ValueKind::Int64,
            None,
            "AvailableBytes",
        );

        assert!(series.matches(Some("_total")), "expected a case-insensitive match");
        assert!(!series.matches(Some("_Totals")));
        assert!(!series.matches(None));
        assert!(single.matches(None), "expected absent to match absent");
        assert!(!single.matches(Some("_Total")));
    }

    #[test]
    fn test_matches_empty_identity() {
        let series = InstanceSeries::new(
            AggregationMode::Detailed,
            ValueKind::Int64,
            Some(String::new()),
            "AvailableBytes",
        );

        assert!(
            series.matches(None),
            "expected an empty identity to behave as absent"
        );
        assert!(!series.matches(Some("eth0")));
    }

    #[test]
    fn test_text_first_last() {
        let series = InstanceSeries::new(
            AggregationMode::FirstLast,
            ValueKind::Text,
            Some("eth0".to_string()),
            "Name",
        );

        series.push(FieldValue::Text("eth0".to_string()));
        series.push(FieldValue::Text("eth0:1".to_string()));

        assert_eq!(
            vec![
                FieldValue::Text("2".to_string()),
                FieldValue::Text("eth0".to_string()),
                FieldValue::Text("eth0:1".to_string())
            ],
            series.values()
        );
    }

    #[test]
    #[should_panic]
    fn test_mean_text_panics() {
        InstanceSeries::new(AggregationMode::Mean, ValueKind::Text, None, "Name");
    }

    #[test]
    #[should_panic]
    fn test_push_kind_mismatch_panics() {
        let series =
            InstanceSeries::new(AggregationMode::Detailed, ValueKind::Int32, None, "Threads");

        series.push(FieldValue::Int64(1));
    }
}
