use crate::utils::error::{EtlError, Result};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 包含頭尾兩天的日期區間
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// `days` 天長、結束於 `end` 的區間；起點超出日期範圍時回傳 `None`
    pub fn ending_at(end: NaiveDate, days: u32) -> Option<Self> {
        let span = Duration::days(i64::from(days.max(1)) - 1);
        let start = end.checked_sub_signed(span)?;
        Some(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    pub fn contains_opt(&self, date: Option<NaiveDate>) -> bool {
        date.is_some_and(|d| self.contains(d))
    }

    pub fn len_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn spans_multiple_days(&self) -> bool {
        self.start < self.end
    }

    /// 緊接在本區間之前、長度相同的區間
    pub fn preceding(&self) -> Option<Self> {
        let end = self.start.checked_sub_signed(Duration::days(1))?;
        let start = end.checked_sub_signed(Duration::days(self.len_days() - 1))?;
        Some(Self { start, end })
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let start = self.start;
        (0..self.len_days()).map(move |offset| start + Duration::days(offset))
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportingPeriods {
    pub current: DateRange,
    pub benchmark: DateRange,
}

impl ReportingPeriods {
    /// Resolves the current and benchmark windows.
    ///
    /// Explicit ranges win; otherwise the current window is `window_days`
    /// long and ends at `anchor`, and the benchmark is the window right
    /// before it. Windows reaching past the earliest representable date are
    /// a validation error.
    pub fn resolve(
        anchor: NaiveDate,
        window_days: u32,
        current: Option<DateRange>,
        benchmark: Option<DateRange>,
    ) -> Result<Self> {
        let current = match current {
            Some(range) => range,
            None => DateRange::ending_at(anchor, window_days).ok_or_else(|| {
                EtlError::ValidationError {
                    message: format!(
                        "A {}-day window ending at {} starts before the earliest supported date",
                        window_days, anchor
                    ),
                }
            })?,
        };
        let benchmark = match benchmark {
            Some(range) => range,
            None => current.preceding().ok_or_else(|| EtlError::ValidationError {
                message: format!("No benchmark window fits before {}", current),
            })?,
        };
        Ok(Self { current, benchmark })
    }
}

/// 同一組指標在本期與對照期的值
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison<T> {
    pub current: T,
    pub benchmark: T,
}

impl<T> Comparison<T> {
    pub fn compute<F>(periods: &ReportingPeriods, mut f: F) -> Self
    where
        F: FnMut(&DateRange) -> T,
    {
        Self {
            current: f(&periods.current),
            benchmark: f(&periods.benchmark),
        }
    }
}

/// 一個可比較的數值指標，`None` 表示分母為零或資料不足
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Kpi {
    pub name: &'static str,
    pub value: Option<f64>,
}

impl Kpi {
    pub fn new(name: &'static str, value: f64) -> Self {
        Self {
            name,
            value: Some(value),
        }
    }

    pub fn optional(name: &'static str, value: Option<f64>) -> Self {
        Self { name, value }
    }
}

pub trait KpiSet {
    fn section(&self) -> &'static str;
    fn kpis(&self) -> Vec<Kpi>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiDelta {
    pub section: &'static str,
    pub metric: &'static str,
    pub current: Option<f64>,
    pub benchmark: Option<f64>,
    pub delta: Option<f64>,
}

impl<T: KpiSet> Comparison<T> {
    pub fn deltas(&self) -> Vec<KpiDelta> {
        let benchmark = self.benchmark.kpis();
        self.current
            .kpis()
            .into_iter()
            .map(|kpi| {
                let previous = benchmark
                    .iter()
                    .find(|b| b.name == kpi.name)
                    .and_then(|b| b.value);
                KpiDelta {
                    section: self.current.section(),
                    metric: kpi.name,
                    current: kpi.value,
                    benchmark: previous,
                    delta: kpi.value.zip(previous).map(|(c, b)| c - b),
                }
            })
            .collect()
    }
}

/// 分母為零時回傳 `None`
pub fn ratio(numerator: f64, denominator: f64) -> Option<f64> {
    (denominator != 0.0).then(|| numerator / denominator)
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
