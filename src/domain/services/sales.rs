use crate::domain::model::{AdsetDay, SaleRecord};
use crate::domain::period::{ratio, DateRange, Kpi, KpiSet};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SalesOptions {
    pub sales_team_marker: String,
    pub email_marker: String,
}

impl Default for SalesOptions {
    fn default() -> Self {
        Self {
            sales_team_marker: "venda".to_string(),
            email_marker: "email".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SalesMetrics {
    pub billing: f64,
    pub valid_sales: usize,
    pub refunds: usize,
    pub average_ticket: Option<f64>,
    pub affiliate_sales: usize,
    pub affiliate_revenue: f64,
    pub sales_team_sales: usize,
    pub sales_team_revenue: f64,
    pub email_revenue: f64,
    pub ad_spend: f64,
    pub profit: f64,
    pub roas: Option<f64>,
}

impl KpiSet for SalesMetrics {
    fn section(&self) -> &'static str {
        "sales"
    }

    fn kpis(&self) -> Vec<Kpi> {
        vec![
            Kpi::new("billing", self.billing),
            Kpi::new("valid_sales", self.valid_sales as f64),
            Kpi::new("refunds", self.refunds as f64),
            Kpi::optional("average_ticket", self.average_ticket),
            Kpi::new("affiliate_sales", self.affiliate_sales as f64),
            Kpi::new("affiliate_revenue", self.affiliate_revenue),
            Kpi::new("sales_team_sales", self.sales_team_sales as f64),
            Kpi::new("sales_team_revenue", self.sales_team_revenue),
            Kpi::new("email_revenue", self.email_revenue),
            Kpi::new("ad_spend", self.ad_spend),
            Kpi::new("profit", self.profit),
            Kpi::optional("roas", self.roas),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductBreakdown {
    pub product_name: String,
    pub sales: usize,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SckBreakdown {
    pub sck: String,
    pub sales: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySales {
    pub date: NaiveDate,
    pub revenue: f64,
    pub sales: usize,
}

/// Sales shown for a period: ordered inside it and approved, complete or refunded.
pub fn sales_in_period<'a>(sales: &'a [SaleRecord], range: &DateRange) -> Vec<&'a SaleRecord> {
    sales
        .iter()
        .filter(|s| s.is_reportable() && range.contains(s.order_date))
        .collect()
}

pub fn compute_sales_metrics(
    sales: &[SaleRecord],
    ads: &[AdsetDay],
    range: &DateRange,
    options: &SalesOptions,
) -> SalesMetrics {
    let period = sales_in_period(sales, range);
    let valid: Vec<&SaleRecord> = period.iter().copied().filter(|s| s.is_valid()).collect();
    let valid_producer: Vec<&SaleRecord> =
        valid.iter().copied().filter(|s| s.is_producer()).collect();

    let billing: f64 = valid_producer.iter().map(|s| s.commission_value).sum();
    let valid_sales = distinct_transactions(valid_producer.iter().copied());

    // 退款以核准日落在區間內為準
    let refunds = distinct_transactions(
        period
            .iter()
            .copied()
            .filter(|s| s.is_refunded() && range.contains_opt(s.approved_date)),
    );

    let affiliate_rows: Vec<&SaleRecord> = valid
        .iter()
        .copied()
        .filter(|s| s.source == crate::domain::model::SaleSource::Affiliate)
        .collect();
    let affiliate_transactions: HashSet<&str> =
        affiliate_rows.iter().map(|s| s.transaction.as_str()).collect();
    let affiliate_revenue: f64 = valid_producer
        .iter()
        .filter(|s| affiliate_transactions.contains(s.transaction.as_str()))
        .map(|s| s.commission_value)
        .sum();

    let sales_team: Vec<&SaleRecord> = valid_producer
        .iter()
        .copied()
        .filter(|s| s.sck_prefix_contains(&options.sales_team_marker))
        .collect();

    let email_revenue: f64 = valid_producer
        .iter()
        .filter(|s| {
            s.sck_prefix_contains(&options.email_marker) || s.src().contains(&options.email_marker)
        })
        .map(|s| s.commission_value)
        .sum();

    let ad_spend: f64 = ads
        .iter()
        .filter(|a| range.contains(a.date))
        .map(|a| a.spend)
        .sum();

    SalesMetrics {
        billing,
        valid_sales,
        refunds,
        average_ticket: ratio(billing, valid_sales as f64),
        affiliate_sales: affiliate_rows.len(),
        affiliate_revenue,
        sales_team_sales: sales_team.len(),
        sales_team_revenue: sales_team.iter().map(|s| s.commission_value).sum(),
        email_revenue,
        ad_spend,
        profit: billing - ad_spend,
        roas: ratio(billing, ad_spend),
    }
}

/// Non-refunded producer rows per product, highest revenue first.
pub fn product_breakdown(sales: &[SaleRecord], range: &DateRange) -> Vec<ProductBreakdown> {
    let mut products: BTreeMap<&str, (usize, f64)> = BTreeMap::new();
    for sale in sales_in_period(sales, range)
        .into_iter()
        .filter(|s| !s.is_refunded() && s.is_producer())
    {
        let entry = products.entry(sale.product_name.as_str()).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += sale.commission_value;
    }

    let mut breakdown: Vec<ProductBreakdown> = products
        .into_iter()
        .map(|(name, (count, revenue))| ProductBreakdown {
            product_name: name.to_string(),
            sales: count,
            revenue,
        })
        .collect();
    breakdown.sort_by(|a, b| b.revenue.total_cmp(&a.revenue));
    breakdown
}

pub fn sck_breakdown(sales: &[SaleRecord], range: &DateRange) -> Vec<SckBreakdown> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for sale in sales_in_period(sales, range)
        .into_iter()
        .filter(|s| !s.is_refunded() && s.is_producer())
    {
        *counts.entry(sale.sck()).or_insert(0) += 1;
    }

    let mut breakdown: Vec<SckBreakdown> = counts
        .into_iter()
        .map(|(sck, sales)| SckBreakdown {
            sck: sck.to_string(),
            sales,
        })
        .collect();
    breakdown.sort_by(|a, b| b.sales.cmp(&a.sales));
    breakdown
}

/// Valid producer revenue per approval day over the whole history.
pub fn daily_history(sales: &[SaleRecord]) -> Vec<DailySales> {
    let mut days: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
    for sale in sales.iter().filter(|s| s.is_valid_producer()) {
        if let Some(approved) = sale.approved_date {
            let entry = days.entry(approved).or_insert((0.0, 0));
            entry.0 += sale.commission_value;
            entry.1 += 1;
        }
    }
    days.into_iter()
        .map(|(date, (revenue, count))| DailySales {
            date,
            revenue,
            sales: count,
        })
        .collect()
}

fn distinct_transactions<'a>(sales: impl Iterator<Item = &'a SaleRecord>) -> usize {
    sales
        .map(|s| s.transaction.as_str())
        .collect::<HashSet<_>>()
        .len()
}
