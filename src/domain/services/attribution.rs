//! Multi-touch revenue attribution.
//!
//! Every purchase transaction is credited to the channels its buyer touched:
//! the transaction's producer commission is split evenly between the buyers
//! whose journey carries it, and each buyer's share evenly between that
//! buyer's distinct channels.

use crate::domain::channel::Channel;
use crate::domain::model::{SaleRecord, SessionEvent};
use crate::domain::period::{ratio, DateRange, Kpi, KpiSet};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributionOptions {
    /// 只保留當天有訂單的事件
    pub restrict_to_order_dates: bool,
    /// SCK 前綴含此字串的交易視為業務團隊成交
    pub sales_team_marker: String,
}

impl Default for AttributionOptions {
    fn default() -> Self {
        Self {
            restrict_to_order_dates: true,
            sales_team_marker: "venda".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Journey {
    pub user_id: String,
    /// Distinct channels in first-touch order.
    pub channels: Vec<Channel>,
    pub transactions: Vec<String>,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelRevenue {
    pub channel: Channel,
    pub revenue: f64,
    pub share: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributionReport {
    pub range: DateRange,
    pub channels: Vec<ChannelRevenue>,
    pub journeys: Vec<Journey>,
    pub identified_revenue: f64,
    pub target_revenue: f64,
    pub unattributed_revenue: f64,
    pub coverage: Option<f64>,
    pub attributed_transactions: usize,
}

impl AttributionReport {
    pub fn revenue_for(&self, channel: Channel) -> f64 {
        self.channels
            .iter()
            .find(|c| c.channel == channel)
            .map_or(0.0, |c| c.revenue)
    }
}

impl KpiSet for AttributionReport {
    fn section(&self) -> &'static str {
        "attribution"
    }

    fn kpis(&self) -> Vec<Kpi> {
        let mut kpis = vec![
            Kpi::new("identified_revenue", self.identified_revenue),
            Kpi::new("target_revenue", self.target_revenue),
            Kpi::new("unattributed_revenue", self.unattributed_revenue),
            Kpi::optional("coverage", self.coverage),
            Kpi::new("attributed_transactions", self.attributed_transactions as f64),
        ];
        kpis.extend(
            self.channels
                .iter()
                .map(|c| Kpi::new(channel_kpi_name(c.channel), c.revenue)),
        );
        kpis
    }
}

fn channel_kpi_name(channel: Channel) -> &'static str {
    match channel {
        Channel::FacebookInstagram => "revenue_facebook_instagram",
        Channel::Google => "revenue_google",
        Channel::Direct => "revenue_direct",
        Channel::YouTube => "revenue_youtube",
        Channel::ActiveCampaign => "revenue_active_campaign",
        Channel::Others => "revenue_others",
        Channel::Bing => "revenue_bing",
        Channel::Whatsapp => "revenue_whatsapp",
        Channel::Blog => "revenue_blog",
        Channel::TikTok => "revenue_tiktok",
        Channel::LinkedIn => "revenue_linkedin",
        Channel::Hub => "revenue_hub",
        Channel::SalesTeam => "revenue_sales_team",
    }
}

/// One sanitised analytics touch.
#[derive(Debug, Clone)]
struct Touch<'a> {
    event: &'a SessionEvent,
    channel: Channel,
}

/// Attributes the producer revenue of `range` to marketing channels.
pub fn attribute_revenue(
    events: &[SessionEvent],
    sales: &[SaleRecord],
    range: &DateRange,
    options: &AttributionOptions,
) -> AttributionReport {
    let period_sales: Vec<&SaleRecord> = sales
        .iter()
        .filter(|s| s.is_reportable() && range.contains(s.order_date))
        .collect();
    let period_events: Vec<&SessionEvent> =
        events.iter().filter(|e| range.contains(e.event_date)).collect();

    let touches = sanitize_touches(&period_events, sales, options);
    let mut journeys = build_journeys(&touches);
    let revenue = transaction_revenue(&period_sales);

    let by_channel = split_revenue(&mut journeys, &revenue);

    let identified_revenue: f64 = by_channel.values().sum();
    let target_revenue: f64 = revenue.values().sum();
    let attributed_transactions = journeys
        .iter()
        .flat_map(|j| j.transactions.iter())
        .filter(|t| revenue.contains_key(t.as_str()))
        .collect::<HashSet<_>>()
        .len();

    tracing::debug!(
        "Attribution {}: {} touches, {} journeys, {} transactions credited",
        range,
        touches.len(),
        journeys.len(),
        attributed_transactions
    );

    let channels = by_channel
        .into_iter()
        .map(|(channel, amount)| ChannelRevenue {
            channel,
            revenue: amount,
            share: ratio(amount, identified_revenue),
        })
        .collect();

    AttributionReport {
        range: *range,
        channels,
        journeys,
        identified_revenue,
        target_revenue,
        unattributed_revenue: (target_revenue - identified_revenue).max(0.0),
        coverage: ratio(identified_revenue, target_revenue),
        attributed_transactions,
    }
}

/// Classifies every event, drops days without orders when asked to, and
/// re-labels all-direct sessions that closed a sales-team transaction.
///
/// Order days and sales-team transactions come from the whole export, so a
/// session inside the window still matches an order recorded outside it.
fn sanitize_touches<'a>(
    events: &[&'a SessionEvent],
    sales: &[SaleRecord],
    options: &AttributionOptions,
) -> Vec<Touch<'a>> {
    let order_dates: HashSet<NaiveDate> = sales.iter().map(|s| s.order_date).collect();
    let sales_team_transactions: HashSet<&str> = sales
        .iter()
        .filter(|s| s.sck_prefix_contains(&options.sales_team_marker))
        .map(|s| s.transaction.as_str())
        .collect();

    let mut touches: Vec<Touch<'a>> = events
        .iter()
        .filter(|e| !options.restrict_to_order_dates || order_dates.contains(&e.event_date))
        .map(|e| Touch {
            event: *e,
            channel: e.channel(),
        })
        .collect();

    let mut sessions: HashMap<&str, (bool, bool)> = HashMap::new();
    for touch in &touches {
        let entry = sessions
            .entry(touch.event.ga_session_id.as_str())
            .or_insert((true, false));
        entry.0 &= touch.channel == Channel::Direct;
        entry.1 |= touch
            .event
            .transaction()
            .is_some_and(|t| sales_team_transactions.contains(t));
    }

    for touch in &mut touches {
        if let Some((all_direct, sales_team)) = sessions.get(touch.event.ga_session_id.as_str()) {
            if *all_direct && *sales_team {
                touch.channel = Channel::SalesTeam;
            }
        }
    }

    // 同一天內保留原始順序
    touches.sort_by_key(|t| t.event.event_date);
    touches
}

fn build_journeys(touches: &[Touch<'_>]) -> Vec<Journey> {
    let purchasing_sessions: HashSet<&str> = touches
        .iter()
        .filter(|t| t.event.is_purchase())
        .map(|t| t.event.ga_session_id.as_str())
        .collect();

    let buyers: HashSet<&str> = touches
        .iter()
        .filter(|t| purchasing_sessions.contains(t.event.ga_session_id.as_str()))
        .map(|t| t.event.user_inferred_id.as_str())
        .filter(|user| !user.is_empty())
        .collect();

    let mut journeys: BTreeMap<&str, Journey> = BTreeMap::new();
    for touch in touches {
        let user = touch.event.user_inferred_id.as_str();
        if !buyers.contains(user) {
            continue;
        }
        let journey = journeys.entry(user).or_insert_with(|| Journey {
            user_id: user.to_string(),
            channels: Vec::new(),
            transactions: Vec::new(),
            revenue: 0.0,
        });
        if !journey.channels.contains(&touch.channel) {
            journey.channels.push(touch.channel);
        }
        if let Some(transaction) = touch.event.transaction() {
            if !journey.transactions.iter().any(|t| t == transaction) {
                journey.transactions.push(transaction.to_string());
            }
        }
    }

    journeys.into_values().collect()
}

/// Producer commission of valid sales, per transaction.
pub fn transaction_revenue<'a>(sales: &[&'a SaleRecord]) -> HashMap<&'a str, f64> {
    let mut revenue: HashMap<&str, f64> = HashMap::new();
    for sale in sales.iter().filter(|s| s.is_valid_producer()) {
        *revenue.entry(sale.transaction.as_str()).or_insert(0.0) += sale.commission_value;
    }
    revenue
}

fn split_revenue(
    journeys: &mut [Journey],
    revenue: &HashMap<&str, f64>,
) -> BTreeMap<Channel, f64> {
    let mut holders: HashMap<String, usize> = HashMap::new();
    for journey in journeys.iter() {
        for transaction in &journey.transactions {
            *holders.entry(transaction.clone()).or_insert(0) += 1;
        }
    }

    let mut by_channel: BTreeMap<Channel, f64> =
        Channel::ALL.iter().map(|c| (*c, 0.0)).collect();

    for journey in journeys.iter_mut() {
        journey.revenue = journey
            .transactions
            .iter()
            .filter_map(|t| {
                let amount = revenue.get(t.as_str())?;
                let holders = holders.get(t).copied().unwrap_or(1).max(1);
                Some(amount / holders as f64)
            })
            .sum();

        if journey.revenue == 0.0 {
            continue;
        }

        if journey.channels.is_empty() {
            journey.channels.push(Channel::Others);
        }
        let per_channel = journey.revenue / journey.channels.len() as f64;
        for channel in &journey.channels {
            *by_channel.entry(*channel).or_insert(0.0) += per_channel;
        }
    }

    by_channel
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{SaleSource, SaleStatus};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, d).unwrap()
    }

    fn range() -> DateRange {
        DateRange::new(date(1), date(29)).unwrap()
    }

    fn event(
        day: u32,
        name: &str,
        session: &str,
        user: &str,
        source: &str,
        tx: Option<&str>,
    ) -> SessionEvent {
        let default_channel = if source == "Others" { "Direct" } else { "Organic" };
        SessionEvent {
            event_date: date(day),
            event_name: name.to_string(),
            ga_session_id: session.to_string(),
            user_inferred_id: user.to_string(),
            transaction_id: tx.map(str::to_string),
            utm_source_std: source.to_string(),
            default_channel: default_channel.to_string(),
            utm_campaign: String::new(),
            utm_content: String::new(),
            path: None,
            event_page_location: String::new(),
        }
    }

    fn sale(tx: &str, day: u32, value: f64, source: SaleSource, sck: Option<&str>) -> SaleRecord {
        SaleRecord {
            transaction: tx.to_string(),
            status: SaleStatus::Approved,
            source,
            commission_value: value,
            order_date: date(day),
            approved_date: Some(date(day)),
            sck: sck.map(str::to_string),
            src: None,
            email: String::new(),
            product_name: "Course".to_string(),
        }
    }

    #[test]
    fn test_single_buyer_splits_evenly_across_channels() {
        let events = vec![
            event(10, "session_start", "s1", "u1", "Google", None),
            event(12, "session_start", "s2", "u1", "Facebook + Instagram", None),
            event(12, "purchase", "s2", "u1", "Facebook + Instagram", Some("T1")),
        ];
        let sales = vec![
            sale("T1", 10, 100.0, SaleSource::Producer, None),
            sale("T1", 12, 30.0, SaleSource::Affiliate, None),
            sale("T0", 12, 1.0, SaleSource::Producer, None),
        ];

        let report = attribute_revenue(&events, &sales, &range(), &AttributionOptions::default());

        assert_eq!(report.revenue_for(Channel::Google), 50.0);
        assert_eq!(report.revenue_for(Channel::FacebookInstagram), 50.0);
        assert_eq!(report.identified_revenue, 100.0);
        assert_eq!(report.target_revenue, 101.0);
        assert_eq!(report.unattributed_revenue, 1.0);
        assert_eq!(report.attributed_transactions, 1);
        assert_eq!(report.journeys.len(), 1);
        assert_eq!(
            report.journeys[0].channels,
            vec![Channel::Google, Channel::FacebookInstagram]
        );
    }

    #[test]
    fn test_every_channel_is_reported_in_canonical_order() {
        let report = attribute_revenue(&[], &[], &range(), &AttributionOptions::default());
        let channels: Vec<Channel> = report.channels.iter().map(|c| c.channel).collect();
        assert_eq!(channels, Channel::ALL.to_vec());
        assert_eq!(report.identified_revenue, 0.0);
        assert_eq!(report.coverage, None);
    }

    #[test]
    fn test_shared_transaction_is_divided_between_buyers() {
        let events = vec![
            event(5, "purchase", "s1", "u1", "Google", Some("T1")),
            event(5, "purchase", "s2", "u2", "YouTube", Some("T1")),
        ];
        let sales = vec![sale("T1", 5, 90.0, SaleSource::Producer, None)];

        let report = attribute_revenue(&events, &sales, &range(), &AttributionOptions::default());

        assert_eq!(report.revenue_for(Channel::Google), 45.0);
        assert_eq!(report.revenue_for(Channel::YouTube), 45.0);
        assert_eq!(report.identified_revenue, 90.0);
    }

    #[test]
    fn test_non_buyers_and_unknown_transactions_earn_nothing() {
        let events = vec![
            event(5, "session_start", "s1", "browser", "Bing", None),
            event(5, "purchase", "s2", "u2", "Blog", Some("UNKNOWN")),
        ];
        let sales = vec![sale("T1", 5, 90.0, SaleSource::Producer, None)];

        let report = attribute_revenue(&events, &sales, &range(), &AttributionOptions::default());

        assert_eq!(report.identified_revenue, 0.0);
        assert_eq!(report.journeys.len(), 1);
        assert_eq!(report.journeys[0].user_id, "u2");
        assert_eq!(report.coverage, Some(0.0));
    }

    #[test]
    fn test_direct_session_with_sales_team_sck_becomes_sales_team() {
        let events = vec![
            event(7, "session_start", "s1", "u1", "Others", None),
            event(7, "purchase", "s1", "u1", "Direct", Some("T9")),
        ];
        let sales = vec![sale("T9", 7, 200.0, SaleSource::Producer, Some("venda_maria"))];

        let report = attribute_revenue(&events, &sales, &range(), &AttributionOptions::default());

        assert_eq!(report.revenue_for(Channel::SalesTeam), 200.0);
        assert_eq!(report.revenue_for(Channel::Direct), 0.0);
    }

    #[test]
    fn test_direct_session_without_sales_team_sck_stays_direct() {
        let events = vec![event(7, "purchase", "s1", "u1", "Others", Some("T9"))];
        let sales = vec![sale("T9", 7, 200.0, SaleSource::Producer, Some("bio_instagram"))];

        let report = attribute_revenue(&events, &sales, &range(), &AttributionOptions::default());

        assert_eq!(report.revenue_for(Channel::Direct), 200.0);
    }

    #[test]
    fn test_sales_team_relabel_uses_orders_outside_the_window() {
        // 訂單在 1 月底成立，付款 session 落在 2 月
        let events = vec![
            event(2, "session_start", "s1", "u1", "Others", None),
            event(2, "purchase", "s1", "u1", "Direct", Some("T9")),
            event(2, "purchase", "s2", "u2", "Google", Some("T10")),
        ];
        let mut january = sale("T9", 1, 200.0, SaleSource::Producer, Some("venda_joao"));
        january.order_date = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let sales = vec![january, sale("T10", 2, 50.0, SaleSource::Producer, None)];

        let report = attribute_revenue(&events, &sales, &range(), &AttributionOptions::default());

        assert_eq!(
            report.journeys.iter().find(|j| j.user_id == "u1").map(|j| j.channels.clone()),
            Some(vec![Channel::SalesTeam])
        );
        assert_eq!(report.revenue_for(Channel::Direct), 0.0);
        assert_eq!(report.revenue_for(Channel::Google), 50.0);
    }

    #[test]
    fn test_every_channel_has_a_kpi() {
        let events = vec![event(5, "purchase", "s1", "u1", "Tik Tok", Some("T1"))];
        let sales = vec![sale("T1", 5, 60.0, SaleSource::Producer, None)];
        let report = attribute_revenue(&events, &sales, &range(), &AttributionOptions::default());

        let kpis = report.kpis();
        let channel_kpis: Vec<&Kpi> = kpis.iter().filter(|k| k.name.starts_with("revenue_")).collect();
        assert_eq!(channel_kpis.len(), Channel::ALL.len());
        let names: HashSet<&str> = channel_kpis.iter().map(|k| k.name).collect();
        assert_eq!(names.len(), Channel::ALL.len());
        assert!(kpis
            .iter()
            .any(|k| k.name == "revenue_tiktok" && k.value == Some(60.0)));
        assert!(names.contains("revenue_hub"));
    }

    #[test]
    fn test_events_on_days_without_orders_are_dropped() {
        let events = vec![
            event(3, "session_start", "s0", "u1", "Google", None),
            event(7, "purchase", "s1", "u1", "YouTube", Some("T1")),
        ];
        let sales = vec![sale("T1", 7, 80.0, SaleSource::Producer, None)];

        let strict = attribute_revenue(&events, &sales, &range(), &AttributionOptions::default());
        assert_eq!(strict.revenue_for(Channel::YouTube), 80.0);
        assert_eq!(strict.revenue_for(Channel::Google), 0.0);

        let options = AttributionOptions {
            restrict_to_order_dates: false,
            ..AttributionOptions::default()
        };
        let relaxed = attribute_revenue(&events, &sales, &range(), &options);
        assert_eq!(relaxed.revenue_for(Channel::YouTube), 40.0);
        assert_eq!(relaxed.revenue_for(Channel::Google), 40.0);
    }

    #[test]
    fn test_identified_never_exceeds_target() {
        let events = vec![
            event(5, "purchase", "s1", "u1", "Google", Some("T1")),
            event(6, "purchase", "s2", "u1", "Hub", Some("T2")),
            event(6, "purchase", "s3", "u2", "Whatsapp", Some("T2")),
        ];
        let sales = vec![
            sale("T1", 5, 10.0, SaleSource::Producer, None),
            sale("T2", 6, 33.0, SaleSource::Producer, None),
            sale("T3", 6, 7.0, SaleSource::Producer, None),
        ];

        let report = attribute_revenue(&events, &sales, &range(), &AttributionOptions::default());

        assert!((report.identified_revenue - 43.0).abs() < 1e-9);
        assert!(report.identified_revenue <= report.target_revenue + 1e-9);
        let summed: f64 = report.journeys.iter().map(|j| j.revenue).sum();
        assert!((summed - report.identified_revenue).abs() < 1e-9);
    }
}
