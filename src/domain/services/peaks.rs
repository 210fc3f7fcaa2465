use crate::domain::model::{AdsetDay, SaleRecord};
use crate::domain::period::{ratio, DateRange};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 名稱加上日期區間，例如一次促銷活動
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakWindow {
    pub name: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl PeakWindow {
    pub fn range(&self) -> Option<DateRange> {
        DateRange::new(self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeakDay {
    pub date: NaiveDate,
    pub revenue: f64,
    pub ad_spend: f64,
    pub profit: f64,
    pub return_on_spend: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeakReport {
    pub name: String,
    pub range: DateRange,
    pub revenue: f64,
    pub ad_spend: f64,
    pub profit: f64,
    pub return_on_spend: Option<f64>,
    pub best_day: Option<PeakDay>,
    pub worst_day: Option<PeakDay>,
    pub days: Vec<PeakDay>,
}

/// Daily revenue of a sales window against the ad spend of the same days.
///
/// Sales are selected by order date and grouped by approval date; only days
/// with revenue are listed.
pub fn analyze_peak(
    name: &str,
    sales: &[SaleRecord],
    ads: &[AdsetDay],
    range: &DateRange,
) -> PeakReport {
    let mut revenue_by_day: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for sale in sales
        .iter()
        .filter(|s| s.is_valid_producer() && range.contains(s.order_date))
    {
        if let Some(approved) = sale.approved_date {
            *revenue_by_day.entry(approved).or_insert(0.0) += sale.commission_value;
        }
    }

    let mut spend_by_day: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for ad in ads.iter().filter(|a| range.contains(a.date)) {
        *spend_by_day.entry(ad.date).or_insert(0.0) += ad.spend;
    }

    let days: Vec<PeakDay> = revenue_by_day
        .into_iter()
        .map(|(date, revenue)| {
            let ad_spend = spend_by_day.get(&date).copied().unwrap_or(0.0);
            let profit = revenue - ad_spend;
            PeakDay {
                date,
                revenue,
                ad_spend,
                profit,
                return_on_spend: ratio(profit, ad_spend),
            }
        })
        .collect();

    let revenue: f64 = days.iter().map(|d| d.revenue).sum();
    let ad_spend: f64 = days.iter().map(|d| d.ad_spend).sum();
    let profit = revenue - ad_spend;

    PeakReport {
        name: name.to_string(),
        range: *range,
        revenue,
        ad_spend,
        profit,
        return_on_spend: ratio(profit, ad_spend),
        best_day: days.iter().max_by(|a, b| a.profit.total_cmp(&b.profit)).cloned(),
        worst_day: days.iter().min_by(|a, b| a.profit.total_cmp(&b.profit)).cloned(),
        days,
    }
}
