use crate::domain::model::{normalize_email, Lead, SaleRecord};
use crate::domain::period::{ratio, DateRange, Kpi, KpiSet};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunnelOptions {
    /// 屬於免費漏斗的 SCK
    pub scks: Vec<String>,
}

impl Default for FunnelOptions {
    fn default() -> Self {
        Self {
            scks: vec![
                "basico".to_string(),
                "basico-expirou".to_string(),
                "seja-pro".to_string(),
            ],
        }
    }
}

impl FunnelOptions {
    fn is_funnel_sale(&self, sale: &SaleRecord) -> bool {
        sale.is_valid_producer() && self.scks.iter().any(|sck| sck == sale.sck())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FunnelMetrics {
    pub revenue: f64,
    pub sales: usize,
    pub leads: usize,
    pub conversion_rate: Option<f64>,
    pub average_conversion_days: Option<f64>,
}

impl KpiSet for FunnelMetrics {
    fn section(&self) -> &'static str {
        "funnel"
    }

    fn kpis(&self) -> Vec<Kpi> {
        vec![
            Kpi::new("revenue", self.revenue),
            Kpi::new("sales", self.sales as f64),
            Kpi::new("leads", self.leads as f64),
            Kpi::optional("conversion_rate", self.conversion_rate),
            Kpi::optional("average_conversion_days", self.average_conversion_days),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeadHistory {
    pub date: NaiveDate,
    pub leads: usize,
    pub purchases: usize,
}

/// One lead with the purchases made on or after its signup day.
#[derive(Debug, Clone)]
pub struct LeadConversion<'a> {
    pub email: String,
    pub lead_date: NaiveDate,
    pub purchases: Vec<&'a SaleRecord>,
}

impl LeadConversion<'_> {
    fn conversion_days(&self, sale: &SaleRecord) -> Option<i64> {
        sale.approved_date
            .map(|approved| (approved - self.lead_date).num_days())
    }
}

/// Joins leads to sales by normalised email.
///
/// Every signup row is kept, repeated emails included. A purchase is linked
/// to the latest signup on or before its approval day, so it is never counted
/// twice; purchases approved before the first signup (or never approved) are
/// not linked. Leads without purchases stay.
pub fn join_leads<'a>(leads: &[Lead], sales: &'a [SaleRecord]) -> Vec<LeadConversion<'a>> {
    let mut conversions: Vec<LeadConversion<'a>> = leads
        .iter()
        .filter_map(|lead| {
            let email = lead.normalized_email();
            (!email.is_empty()).then(|| LeadConversion {
                email,
                lead_date: lead.date,
                purchases: Vec::new(),
            })
        })
        .collect();
    conversions.sort_by(|a, b| a.email.cmp(&b.email).then(a.lead_date.cmp(&b.lead_date)));

    // email -> 依日期排序的 (註冊日, 索引)
    let mut signups: HashMap<String, Vec<(NaiveDate, usize)>> = HashMap::new();
    for (index, conversion) in conversions.iter().enumerate() {
        signups
            .entry(conversion.email.clone())
            .or_default()
            .push((conversion.lead_date, index));
    }

    for sale in sales {
        let Some(approved) = sale.approved_date else {
            continue;
        };
        let credited = signups.get(&sale.normalized_email()).and_then(|rows| {
            rows.iter()
                .take_while(|(signup, _)| *signup <= approved)
                .last()
                .map(|(_, index)| *index)
        });
        if let Some(index) = credited {
            conversions[index].purchases.push(sale);
        }
    }

    conversions
}

pub fn compute_funnel_metrics(
    conversions: &[LeadConversion<'_>],
    range: &DateRange,
    options: &FunnelOptions,
) -> FunnelMetrics {
    let in_period: Vec<&LeadConversion> = conversions
        .iter()
        .filter(|c| range.contains(c.lead_date))
        .collect();

    let funnel_sales: Vec<&SaleRecord> = in_period
        .iter()
        .flat_map(|c| c.purchases.iter().copied())
        .filter(|s| options.is_funnel_sale(s))
        .collect();

    let conversion_days: Vec<i64> = in_period
        .iter()
        .flat_map(|c| {
            c.purchases
                .iter()
                .filter(|s| s.is_valid_producer())
                .filter_map(move |s| c.conversion_days(s))
        })
        .collect();

    let leads = in_period
        .iter()
        .map(|c| c.email.as_str())
        .collect::<HashSet<_>>()
        .len();
    let sales = funnel_sales.len();

    FunnelMetrics {
        revenue: funnel_sales.iter().map(|s| s.commission_value).sum(),
        sales,
        leads,
        conversion_rate: ratio(sales as f64, leads as f64).map(|r| r * 100.0),
        average_conversion_days: ratio(
            conversion_days.iter().sum::<i64>() as f64,
            conversion_days.len() as f64,
        ),
    }
}

pub fn total_leads(leads: &[Lead]) -> usize {
    leads
        .iter()
        .map(|l| normalize_email(&l.email))
        .filter(|email| !email.is_empty())
        .collect::<HashSet<_>>()
        .len()
}

/// Leads per signup day against the funnel purchases they led to.
pub fn lead_history(conversions: &[LeadConversion<'_>], options: &FunnelOptions) -> Vec<LeadHistory> {
    let mut days: BTreeMap<NaiveDate, (usize, usize)> = BTreeMap::new();
    for conversion in conversions {
        let entry = days.entry(conversion.lead_date).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += conversion
            .purchases
            .iter()
            .filter(|s| options.is_funnel_sale(s))
            .count();
    }
    days.into_iter()
        .map(|(date, (leads, purchases))| LeadHistory {
            date,
            leads,
            purchases,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{SaleSource, SaleStatus};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn lead(day: u32, email: &str) -> Lead {
        Lead {
            date: date(day),
            email: email.to_string(),
        }
    }

    fn sale(email: &str, approved: u32, sck: &str, value: f64) -> SaleRecord {
        SaleRecord {
            transaction: format!("T-{}-{}", email, approved),
            status: SaleStatus::Approved,
            source: SaleSource::Producer,
            commission_value: value,
            order_date: date(approved),
            approved_date: Some(date(approved)),
            sck: Some(sck.to_string()),
            src: None,
            email: email.to_string(),
            product_name: "Pro".to_string(),
        }
    }

    fn fixture() -> (Vec<Lead>, Vec<SaleRecord>) {
        let leads = vec![
            lead(2, "ana@example.com"),
            lead(4, " ANA@example.com"),
            lead(3, "bob@example.com"),
            lead(3, "carla@example.com"),
            lead(5, "dan@example.com"),
        ];
        let sales = vec![
            sale("ana@example.com", 6, "basico", 100.0),
            sale("bob@example.com", 1, "seja-pro", 300.0),
            sale("carla@example.com", 5, "bio", 50.0),
            sale("dan@example.com", 5, "seja-pro", 200.0),
        ];
        (leads, sales)
    }

    #[test]
    fn test_join_keeps_leads_without_purchase() {
        let (leads, sales) = fixture();
        let conversions = join_leads(&leads, &sales);

        assert_eq!(conversions.len(), 5);
        let ana: Vec<&LeadConversion> = conversions
            .iter()
            .filter(|c| c.email == "ana@example.com")
            .collect();
        assert_eq!(ana.len(), 2);
        assert_eq!(ana[0].lead_date, date(2));
        assert!(ana[0].purchases.is_empty());
        assert_eq!(ana[1].lead_date, date(4));
        assert_eq!(ana[1].purchases.len(), 1);
        let bob = conversions.iter().find(|c| c.email == "bob@example.com").unwrap();
        assert!(bob.purchases.is_empty());
    }

    #[test]
    fn test_funnel_metrics() {
        let (leads, sales) = fixture();
        let conversions = join_leads(&leads, &sales);
        let range = DateRange::new(date(1), date(7)).unwrap();

        let metrics = compute_funnel_metrics(&conversions, &range, &FunnelOptions::default());
        assert_eq!(metrics.leads, 4);
        assert_eq!(metrics.sales, 2);
        assert_eq!(metrics.revenue, 300.0);
        assert_eq!(metrics.conversion_rate, Some(50.0));
        // ana 從第二次註冊起算 2 天、carla 2 天、dan 0 天
        assert_eq!(metrics.average_conversion_days, Some(4.0 / 3.0));
        assert_eq!(total_leads(&leads), 4);
    }

    #[test]
    fn test_empty_period() {
        let (leads, sales) = fixture();
        let conversions = join_leads(&leads, &sales);
        let range = DateRange::new(date(20), date(27)).unwrap();

        let metrics = compute_funnel_metrics(&conversions, &range, &FunnelOptions::default());
        assert_eq!(metrics.leads, 0);
        assert_eq!(metrics.conversion_rate, None);
        assert_eq!(metrics.average_conversion_days, None);
    }

    #[test]
    fn test_lead_history() {
        let (leads, sales) = fixture();
        let conversions = join_leads(&leads, &sales);
        let history = lead_history(&conversions, &FunnelOptions::default());

        assert_eq!(history.len(), 4);
        assert_eq!(history[0].date, date(2));
        assert_eq!(history[0].purchases, 0);
        assert_eq!(history[1].leads, 2);
        assert_eq!(history[1].purchases, 0);
        assert_eq!(history[2].date, date(4));
        assert_eq!(history[2].purchases, 1);
        assert_eq!(history[3].purchases, 1);
    }

    #[test]
    fn test_resignup_counts_in_its_own_period() {
        let leads = vec![lead(2, "eva@example.com"), lead(20, "eva@example.com")];
        let sales = vec![
            sale("eva@example.com", 3, "basico", 100.0),
            sale("eva@example.com", 22, "seja-pro", 300.0),
        ];
        let conversions = join_leads(&leads, &sales);
        assert_eq!(conversions.len(), 2);
        assert!(conversions.iter().all(|c| c.purchases.len() == 1));

        let options = FunnelOptions::default();
        let first = DateRange::new(date(1), date(7)).unwrap();
        let second = DateRange::new(date(15), date(21)).unwrap();
        let whole = DateRange::new(date(1), date(31)).unwrap();

        let metrics = compute_funnel_metrics(&conversions, &first, &options);
        assert_eq!((metrics.leads, metrics.sales, metrics.revenue), (1, 1, 100.0));
        let metrics = compute_funnel_metrics(&conversions, &second, &options);
        assert_eq!((metrics.leads, metrics.sales, metrics.revenue), (1, 1, 300.0));
        assert_eq!(metrics.average_conversion_days, Some(2.0));
        let metrics = compute_funnel_metrics(&conversions, &whole, &options);
        assert_eq!((metrics.leads, metrics.sales), (1, 2));
        assert_eq!(metrics.conversion_rate, Some(200.0));
    }
}
