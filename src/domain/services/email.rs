use crate::domain::channel::Channel;
use crate::domain::model::{EmailCampaignStat, EmailContact, SaleRecord, SessionEvent, NO_AUTOMATION};
use crate::domain::period::{DateRange, Kpi, KpiSet};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailOptions {
    pub email_marker: String,
    pub cart_abandonment_marker: String,
    /// 帶有這些 tag 的聯絡人不算新名單
    pub excluded_tags: Vec<u32>,
}

impl Default for EmailOptions {
    fn default() -> Self {
        Self {
            email_marker: "email".to_string(),
            cart_abandonment_marker: "email-abandono-carrinho".to_string(),
            excluded_tags: vec![172, 214, 246, 252, 258, 264, 270, 276],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EmailMetrics {
    pub open_rate: Option<f64>,
    pub ctr: Option<f64>,
    pub automations: usize,
    pub sends: f64,
    pub unique_clicks: Option<f64>,
    pub unique_opens: Option<f64>,
    pub replies: Option<f64>,
    pub hard_bounces: Option<f64>,
    pub unsubscribes: Option<f64>,
    pub email_sessions: Option<usize>,
    pub email_revenue: f64,
    pub email_sales: usize,
    pub cart_abandonment_sales: usize,
    pub new_leads: Option<usize>,
}

impl KpiSet for EmailMetrics {
    fn section(&self) -> &'static str {
        "email"
    }

    fn kpis(&self) -> Vec<Kpi> {
        vec![
            Kpi::optional("open_rate", self.open_rate),
            Kpi::optional("ctr", self.ctr),
            Kpi::new("automations", self.automations as f64),
            Kpi::new("sends", self.sends),
            Kpi::optional("unique_clicks", self.unique_clicks),
            Kpi::optional("unique_opens", self.unique_opens),
            Kpi::optional("replies", self.replies),
            Kpi::optional("hard_bounces", self.hard_bounces),
            Kpi::optional("unsubscribes", self.unsubscribes),
            Kpi::optional("email_sessions", self.email_sessions.map(|n| n as f64)),
            Kpi::new("email_revenue", self.email_revenue),
            Kpi::new("email_sales", self.email_sales as f64),
            Kpi::new("cart_abandonment_sales", self.cart_abandonment_sales as f64),
            Kpi::optional("new_leads", self.new_leads.map(|n| n as f64)),
        ]
    }
}

/// Inputs of the email page; sessions and contacts are optional.
pub struct EmailInputs<'a> {
    pub campaigns: &'a [EmailCampaignStat],
    pub sales: &'a [SaleRecord],
    pub sessions: Option<&'a [SessionEvent]>,
    pub contacts: Option<&'a [EmailContact]>,
}

#[derive(Default)]
struct CampaignTotals {
    sends: f64,
    clicks: f64,
    opens: f64,
    replies: f64,
    hard_bounces: f64,
    unsubscribes: f64,
}

pub fn compute_email_metrics(
    inputs: &EmailInputs<'_>,
    range: &DateRange,
    options: &EmailOptions,
) -> EmailMetrics {
    let campaigns: Vec<&EmailCampaignStat> = inputs
        .campaigns
        .iter()
        .filter(|c| range.contains(c.last_date))
        .collect();

    // 以 (automation, headline) 分組後再取平均
    let mut groups: BTreeMap<(&str, &str), CampaignTotals> = BTreeMap::new();
    for campaign in &campaigns {
        let totals = groups
            .entry((campaign.automation(), campaign.headline.as_str()))
            .or_default();
        totals.sends += campaign.send_amt;
        totals.clicks += campaign.uniquelinkclicks;
        totals.opens += campaign.uniqueopens;
        totals.replies += campaign.replies;
        totals.hard_bounces += campaign.hardbounces;
        totals.unsubscribes += campaign.unsubscribes;
    }
    let totals: Vec<&CampaignTotals> = groups.values().collect();
    let with_sends: Vec<&CampaignTotals> =
        totals.iter().copied().filter(|t| t.sends > 0.0).collect();

    let automations: HashSet<&str> = campaigns
        .iter()
        .map(|c| c.automation())
        .filter(|name| *name != NO_AUTOMATION)
        .collect();

    // 以核准日認列，下單日可能落在區間之前
    let valid: Vec<&SaleRecord> = inputs
        .sales
        .iter()
        .filter(|s| s.is_valid() && range.contains_opt(s.approved_date))
        .collect();
    let tagged: Vec<&SaleRecord> = valid
        .iter()
        .copied()
        .filter(|s| s.tracking_contains(&options.email_marker))
        .collect();

    EmailMetrics {
        open_rate: mean(with_sends.iter().map(|t| t.opens / t.sends)),
        ctr: mean(with_sends.iter().map(|t| t.clicks / t.sends)),
        automations: automations.len(),
        sends: campaigns.iter().map(|c| c.send_amt).sum(),
        unique_clicks: mean(totals.iter().map(|t| t.clicks)),
        unique_opens: mean(totals.iter().map(|t| t.opens)),
        replies: mean(totals.iter().map(|t| t.replies)),
        hard_bounces: mean(totals.iter().map(|t| t.hard_bounces)),
        unsubscribes: mean(totals.iter().map(|t| t.unsubscribes)),
        email_sessions: inputs.sessions.map(|events| email_sessions(events, range)),
        email_revenue: tagged
            .iter()
            .filter(|s| s.is_producer())
            .map(|s| s.commission_value)
            .sum(),
        email_sales: distinct(tagged.iter().copied()),
        cart_abandonment_sales: distinct(
            valid
                .iter()
                .copied()
                .filter(|s| s.sck().contains(&options.cart_abandonment_marker)),
        ),
        new_leads: inputs
            .contacts
            .map(|contacts| new_leads(contacts, range, &options.excluded_tags)),
    }
}

/// Email sales, new leads and email sessions of one day or month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailActivity {
    /// `YYYY-MM-DD` for a day, `YYYY-MM` for a month
    pub label: String,
    pub sales: usize,
    pub new_leads: Option<usize>,
    pub sessions: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EmailHistory {
    pub daily: Vec<EmailActivity>,
    pub monthly: Vec<EmailActivity>,
}

#[derive(Default)]
struct ActivityBucket<'a> {
    transactions: HashSet<&'a str>,
    contacts: HashSet<u64>,
    sessions: usize,
}

impl<'a> ActivityBucket<'a> {
    fn merge(&mut self, other: &ActivityBucket<'a>) {
        self.transactions.extend(other.transactions.iter().copied());
        self.contacts.extend(other.contacts.iter().copied());
        self.sessions += other.sessions;
    }

    fn to_activity(&self, label: String, inputs: &EmailInputs<'_>) -> EmailActivity {
        EmailActivity {
            label,
            sales: self.transactions.len(),
            new_leads: inputs.contacts.map(|_| self.contacts.len()),
            sessions: inputs.sessions.map(|_| self.sessions),
        }
    }
}

/// Day-by-day activity over `current`, plus month-by-month activity from
/// January of the year `current` ends in up to its last month.
///
/// Sales are bucketed on their approval day.
pub fn email_history(
    inputs: &EmailInputs<'_>,
    current: &DateRange,
    options: &EmailOptions,
) -> EmailHistory {
    let year_start = current.end.with_ordinal(1).unwrap_or(current.start);
    let span = DateRange {
        start: current.start.min(year_start),
        end: current.end,
    };

    let mut days: BTreeMap<NaiveDate, ActivityBucket> = BTreeMap::new();
    for sale in inputs
        .sales
        .iter()
        .filter(|s| s.is_valid() && s.tracking_contains(&options.email_marker))
    {
        if let Some(approved) = sale.approved_date.filter(|d| span.contains(*d)) {
            days.entry(approved)
                .or_default()
                .transactions
                .insert(sale.transaction.as_str());
        }
    }
    for contact in inputs.contacts.unwrap_or_default().iter().filter(|c| {
        span.contains(c.cdate) && !c.tags.iter().any(|tag| options.excluded_tags.contains(tag))
    }) {
        days.entry(contact.cdate).or_default().contacts.insert(contact.id);
    }
    for event in inputs
        .sessions
        .unwrap_or_default()
        .iter()
        .filter(|e| span.contains(e.event_date) && is_email_session(e))
    {
        days.entry(event.event_date).or_default().sessions += 1;
    }

    let empty = ActivityBucket::default();
    let daily = current
        .days()
        .map(|day| {
            days.get(&day)
                .unwrap_or(&empty)
                .to_activity(day.to_string(), inputs)
        })
        .collect();

    let mut months: BTreeMap<u32, ActivityBucket> =
        (1..=current.end.month()).map(|m| (m, ActivityBucket::default())).collect();
    for (day, bucket) in days.iter().filter(|(day, _)| **day >= year_start) {
        if let Some(month) = months.get_mut(&day.month()) {
            month.merge(bucket);
        }
    }
    let year = current.end.year();
    let monthly = months
        .iter()
        .map(|(month, bucket)| bucket.to_activity(format!("{}-{:02}", year, month), inputs))
        .collect();

    EmailHistory { daily, monthly }
}

/// Distinct contact ids over the whole export.
pub fn total_contacts(contacts: &[EmailContact]) -> usize {
    contacts.iter().map(|c| c.id).collect::<HashSet<_>>().len()
}

fn is_email_session(event: &SessionEvent) -> bool {
    event.is_session_start() && Channel::from_label(&event.utm_source_std) == Channel::ActiveCampaign
}

pub fn email_sessions(events: &[SessionEvent], range: &DateRange) -> usize {
    events
        .iter()
        .filter(|e| range.contains(e.event_date) && is_email_session(e))
        .count()
}

/// Distinct contacts created in the period without any excluded tag.
pub fn new_leads(contacts: &[EmailContact], range: &DateRange, excluded_tags: &[u32]) -> usize {
    contacts
        .iter()
        .filter(|c| range.contains(c.cdate))
        .filter(|c| !c.tags.iter().any(|tag| excluded_tags.contains(tag)))
        .map(|c| c.id)
        .collect::<HashSet<_>>()
        .len()
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

fn distinct<'a>(sales: impl Iterator<Item = &'a SaleRecord>) -> usize {
    sales
        .map(|s| s.transaction.as_str())
        .collect::<HashSet<_>>()
        .len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{SaleSource, SaleStatus};
    use chrono::NaiveDate;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn campaign(automation: Option<&str>, headline: &str, sends: f64, opens: f64, clicks: f64) -> EmailCampaignStat {
        EmailCampaignStat {
            automation_name: automation.map(str::to_string),
            headline: headline.to_string(),
            send_amt: sends,
            uniquelinkclicks: clicks,
            uniqueopens: opens,
            replies: 1.0,
            hardbounces: 0.0,
            unsubscribes: 2.0,
            last_date: date(3),
        }
    }

    fn sale(tx: &str, source: SaleSource, value: f64, sck: &str) -> SaleRecord {
        SaleRecord {
            transaction: tx.to_string(),
            status: SaleStatus::Approved,
            source,
            commission_value: value,
            order_date: date(3),
            approved_date: Some(date(3)),
            sck: Some(sck.to_string()),
            src: None,
            email: String::new(),
            product_name: "Course".to_string(),
        }
    }

    fn contact(id: u64, day: u32, tags: Vec<u32>) -> EmailContact {
        EmailContact {
            id,
            cdate: date(day),
            tags,
        }
    }

    fn range() -> DateRange {
        DateRange::new(date(1), date(7)).unwrap()
    }

    #[test]
    fn test_campaign_metrics() {
        let campaigns = vec![
            campaign(Some("Boas-vindas"), "Day 1", 100.0, 50.0, 10.0),
            campaign(Some("Boas-vindas"), "Day 1", 100.0, 30.0, 10.0),
            campaign(None, "Newsletter", 400.0, 100.0, 40.0),
            campaign(None, "Draft", 0.0, 0.0, 0.0),
        ];
        let inputs = EmailInputs {
            campaigns: &campaigns,
            sales: &[],
            sessions: None,
            contacts: None,
        };
        let metrics = compute_email_metrics(&inputs, &range(), &EmailOptions::default());

        assert_eq!(metrics.automations, 1);
        assert_eq!(metrics.sends, 600.0);
        assert_eq!(metrics.open_rate, Some((0.4 + 0.25) / 2.0));
        assert_eq!(metrics.ctr, Some(0.1));
        assert_eq!(metrics.unique_clicks, Some(20.0));
        assert_eq!(metrics.email_sessions, None);
        assert_eq!(metrics.new_leads, None);
    }

    #[test]
    fn test_email_sales_and_leads() {
        let sales = vec![
            sale("T1", SaleSource::Producer, 100.0, "email-abandono-carrinho"),
            sale("T1", SaleSource::Affiliate, 20.0, "email-abandono-carrinho"),
            sale("T2", SaleSource::Producer, 50.0, "email-upgrade"),
            sale("T3", SaleSource::Producer, 70.0, "bio"),
        ];
        let contacts = vec![
            contact(1, 2, vec![]),
            contact(1, 2, vec![9]),
            contact(2, 3, vec![172]),
            contact(3, 20, vec![]),
        ];
        let no_events: Vec<SessionEvent> = Vec::new();
        let inputs = EmailInputs {
            campaigns: &[],
            sales: &sales,
            sessions: Some(no_events.as_slice()),
            contacts: Some(contacts.as_slice()),
        };
        let metrics = compute_email_metrics(&inputs, &range(), &EmailOptions::default());

        assert_eq!(metrics.email_revenue, 150.0);
        assert_eq!(metrics.email_sales, 2);
        assert_eq!(metrics.cart_abandonment_sales, 1);
        assert_eq!(metrics.email_sessions, Some(0));
        assert_eq!(metrics.new_leads, Some(1));
        assert_eq!(metrics.open_rate, None);
    }

    #[test]
    fn test_email_sales_follow_approval_day() {
        let mut late_approval = sale("T7", SaleSource::Producer, 90.0, "email-x");
        late_approval.order_date = NaiveDate::from_ymd_opt(2024, 2, 28).unwrap();
        late_approval.approved_date = Some(date(3));
        let mut approved_later = sale("T8", SaleSource::Producer, 40.0, "email-x");
        approved_later.approved_date = Some(date(9));
        let sales = vec![late_approval, approved_later];

        let inputs = EmailInputs {
            campaigns: &[],
            sales: &sales,
            sessions: None,
            contacts: None,
        };
        let metrics = compute_email_metrics(&inputs, &range(), &EmailOptions::default());

        assert_eq!(metrics.email_sales, 1);
        assert_eq!(metrics.email_revenue, 90.0);
    }

    fn session(day: u32, name: &str, source: &str) -> SessionEvent {
        SessionEvent {
            event_date: date(day),
            event_name: name.to_string(),
            ga_session_id: format!("s{}", day),
            user_inferred_id: String::new(),
            transaction_id: None,
            utm_source_std: source.to_string(),
            default_channel: "Email".to_string(),
            utm_campaign: String::new(),
            utm_content: String::new(),
            path: None,
            event_page_location: String::new(),
        }
    }

    #[test]
    fn test_daily_and_monthly_history() {
        let mut february = sale("T0", SaleSource::Producer, 10.0, "email-x");
        february.approved_date = NaiveDate::from_ymd_opt(2024, 2, 10);
        let sales = vec![
            february,
            sale("T1", SaleSource::Producer, 10.0, "email-x"),
            sale("T1", SaleSource::Affiliate, 5.0, "email-x"),
            sale("T2", SaleSource::Producer, 10.0, "bio"),
        ];
        let contacts = vec![
            contact(1, 2, vec![]),
            contact(2, 2, vec![172]),
            contact(3, 5, vec![]),
        ];
        let events = vec![
            session(3, "session_start", "Active Campaign"),
            session(3, "page_view", "Active Campaign"),
            session(4, "session_start", "Google"),
        ];
        let inputs = EmailInputs {
            campaigns: &[],
            sales: &sales,
            sessions: Some(events.as_slice()),
            contacts: Some(contacts.as_slice()),
        };

        let history = email_history(&inputs, &range(), &EmailOptions::default());

        assert_eq!(history.daily.len(), 7);
        assert_eq!(history.daily[0].label, "2024-03-01");
        assert_eq!(history.daily[1].new_leads, Some(1));
        assert_eq!(history.daily[2].sales, 1);
        assert_eq!(history.daily[2].sessions, Some(1));
        assert_eq!(history.daily[3].sessions, Some(0));

        let labels: Vec<&str> = history.monthly.iter().map(|m| m.label.as_str()).collect();
        assert_eq!(labels, vec!["2024-01", "2024-02", "2024-03"]);
        assert_eq!(history.monthly[0].sales, 0);
        assert_eq!(history.monthly[1].sales, 1);
        assert_eq!(history.monthly[2].sales, 1);
        assert_eq!(history.monthly[2].new_leads, Some(2));

        assert_eq!(total_contacts(&contacts), 3);
    }

    #[test]
    fn test_history_without_optional_inputs() {
        let inputs = EmailInputs {
            campaigns: &[],
            sales: &[],
            sessions: None,
            contacts: None,
        };
        let history = email_history(&inputs, &range(), &EmailOptions::default());
        assert!(history.daily.iter().all(|d| d.new_leads.is_none() && d.sessions.is_none()));
        assert_eq!(history.monthly.len(), 3);
    }
}
