use crate::domain::channel::Channel;
use crate::domain::model::SessionEvent;
use crate::domain::period::{ratio, DateRange, Kpi, KpiSet, ReportingPeriods};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 購買 session 沒有其他頁面時使用的路徑
pub const DIRECT_PATH: &str = "direct";
/// 低於門檻的路徑合併後的名稱
pub const OTHER_PATHS: &str = "(other)";
/// 空白的 UTM 值
pub const NOT_SET: &str = "(not set)";
pub const PAID_SOCIAL: &str = "Paid Social";
pub const PAID_SEARCH: &str = "Paid Search";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficOptions {
    /// 結帳頁網址包含的字串，這些頁面不列入頁面歸因
    pub checkout_marker: String,
    pub min_path_share: f64,
}

impl Default for TrafficOptions {
    fn default() -> Self {
        Self {
            checkout_marker: "hotmart".to_string(),
            min_path_share: 0.01,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrafficMetrics {
    pub sessions: usize,
    pub page_views: usize,
    pub purchases: usize,
}

impl KpiSet for TrafficMetrics {
    fn section(&self) -> &'static str {
        "traffic"
    }

    fn kpis(&self) -> Vec<Kpi> {
        vec![
            Kpi::new("sessions", self.sessions as f64),
            Kpi::new("page_views", self.page_views as f64),
            Kpi::new("purchases", self.purchases as f64),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageAttribution {
    pub path: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathShare {
    pub path: String,
    pub sessions: usize,
    pub share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelSessions {
    pub channel: Channel,
    pub default_channel: Option<String>,
    pub sessions: usize,
}

pub fn events_in_period<'a>(events: &'a [SessionEvent], range: &DateRange) -> Vec<&'a SessionEvent> {
    events.iter().filter(|e| range.contains(e.event_date)).collect()
}

pub fn compute_traffic_metrics(events: &[SessionEvent], range: &DateRange) -> TrafficMetrics {
    let period = events_in_period(events, range);
    TrafficMetrics {
        sessions: period.iter().filter(|e| e.is_session_start()).count(),
        page_views: period.iter().filter(|e| e.is_page_view()).count(),
        purchases: period.iter().filter(|e| e.is_purchase()).count(),
    }
}

/// Credits each purchasing session to the pages viewed in it.
///
/// Every page-view occurrence outside checkout earns
/// `purchases in session / listed pages`; a session without such pages
/// credits [`DIRECT_PATH`].
pub fn page_attribution(
    events: &[SessionEvent],
    range: &DateRange,
    options: &TrafficOptions,
) -> Vec<PageAttribution> {
    // 每個 session 的事件只分組一次
    let mut sessions: BTreeMap<&str, Vec<&SessionEvent>> = BTreeMap::new();
    for event in events_in_period(events, range) {
        sessions.entry(event.ga_session_id.as_str()).or_default().push(event);
    }

    let mut points: BTreeMap<String, f64> = BTreeMap::new();
    for in_session in sessions.values() {
        let purchases = in_session.iter().filter(|e| e.is_purchase()).count();
        if purchases == 0 {
            continue;
        }

        let mut pages: Vec<String> = in_session
            .iter()
            .filter(|e| {
                e.is_page_view() && !e.event_page_location.contains(&options.checkout_marker)
            })
            .map(|e| e.page_path())
            .collect();
        if pages.is_empty() {
            pages.push(DIRECT_PATH.to_string());
        }

        let share = purchases as f64 / pages.len() as f64;
        for page in pages {
            *points.entry(page).or_insert(0.0) += share;
        }
    }

    let mut attribution: Vec<PageAttribution> = points
        .into_iter()
        .map(|(path, value)| PageAttribution { path, value })
        .collect();
    attribution.sort_by(|a, b| b.value.total_cmp(&a.value));
    attribution
}

/// Session starts per landing path; paths under `min_path_share` are folded
/// into [`OTHER_PATHS`].
pub fn sessions_by_path(
    events: &[SessionEvent],
    range: &DateRange,
    options: &TrafficOptions,
) -> Vec<PathShare> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for event in events_in_period(events, range)
        .into_iter()
        .filter(|e| e.is_session_start())
    {
        *counts.entry(event.page_path()).or_insert(0) += 1;
    }
    let total: usize = counts.values().sum();

    let mut shares = Vec::new();
    let mut folded = 0;
    for (path, sessions) in counts {
        let share = ratio(sessions as f64, total as f64).unwrap_or(0.0);
        if share < options.min_path_share {
            folded += sessions;
        } else {
            shares.push(PathShare {
                path,
                sessions,
                share,
            });
        }
    }
    shares.sort_by(|a, b| b.sessions.cmp(&a.sessions));
    if folded > 0 {
        shares.push(PathShare {
            path: OTHER_PATHS.to_string(),
            sessions: folded,
            share: ratio(folded as f64, total as f64).unwrap_or(0.0),
        });
    }
    shares
}

/// Session starts per channel, or per channel and analytics default channel
/// when `with_default_channel` is set.
pub fn sessions_by_channel(
    events: &[SessionEvent],
    range: &DateRange,
    with_default_channel: bool,
) -> Vec<ChannelSessions> {
    let mut counts: BTreeMap<(Channel, Option<String>), usize> = BTreeMap::new();
    for event in events_in_period(events, range)
        .into_iter()
        .filter(|e| e.is_session_start())
    {
        let default_channel = with_default_channel.then(|| event.default_channel.clone());
        *counts.entry((event.channel(), default_channel)).or_insert(0) += 1;
    }

    let mut sessions: Vec<ChannelSessions> = counts
        .into_iter()
        .map(|((channel, default_channel), sessions)| ChannelSessions {
            channel,
            default_channel,
            sessions,
        })
        .collect();
    sessions.sort_by(|a, b| b.sessions.cmp(&a.sessions));
    sessions
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelSessions {
    pub label: String,
    pub sessions: usize,
}

/// Session starts of the main paid platforms, broken down by default
/// channel and by the UTM field that identifies the creative or campaign.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlatformBreakdown {
    pub facebook_by_default_channel: Vec<LabelSessions>,
    pub facebook_paid_by_content: Vec<LabelSessions>,
    /// 每個付費素材平均帶來的 session
    pub facebook_paid_content_mean: Option<f64>,
    pub google_by_default_channel: Vec<LabelSessions>,
    pub google_paid_by_campaign: Vec<LabelSessions>,
    pub youtube_by_content: Vec<LabelSessions>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathSource {
    pub path: String,
    pub source: String,
    pub default_channel: String,
    pub content: String,
    pub sessions: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelDay {
    pub period: &'static str,
    pub default_channel: String,
    pub date: NaiveDate,
    pub sessions: usize,
}

fn session_starts<'a>(events: &'a [SessionEvent], range: &DateRange) -> Vec<&'a SessionEvent> {
    events
        .iter()
        .filter(|e| range.contains(e.event_date) && e.is_session_start())
        .collect()
}

fn label_or_not_set(value: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        NOT_SET.to_string()
    } else {
        value.to_string()
    }
}

fn has_default_channel(event: &SessionEvent, name: &str) -> bool {
    event.default_channel.trim().eq_ignore_ascii_case(name)
}

/// Counts per label, most sessions first.
fn count_by<'a>(
    events: impl Iterator<Item = &'a SessionEvent>,
    label: impl Fn(&SessionEvent) -> &str,
) -> Vec<LabelSessions> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for event in events {
        *counts.entry(label_or_not_set(label(event))).or_insert(0) += 1;
    }
    let mut rows: Vec<LabelSessions> = counts
        .into_iter()
        .map(|(label, sessions)| LabelSessions { label, sessions })
        .collect();
    rows.sort_by(|a, b| b.sessions.cmp(&a.sessions));
    rows
}

pub fn platform_breakdown(events: &[SessionEvent], range: &DateRange) -> PlatformBreakdown {
    let starts = session_starts(events, range);
    let from = |channel: Channel| {
        starts
            .iter()
            .copied()
            .filter(move |e| e.channel() == channel)
    };
    let facebook_paid_by_content = count_by(
        from(Channel::FacebookInstagram).filter(|e| has_default_channel(e, PAID_SOCIAL)),
        |e| e.utm_content.as_str(),
    );
    let facebook_paid_content_mean = ratio(
        facebook_paid_by_content.iter().map(|r| r.sessions).sum::<usize>() as f64,
        facebook_paid_by_content.len() as f64,
    );

    PlatformBreakdown {
        facebook_by_default_channel: count_by(from(Channel::FacebookInstagram), |e| {
            e.default_channel.as_str()
        }),
        facebook_paid_by_content,
        facebook_paid_content_mean,
        google_by_default_channel: count_by(from(Channel::Google), |e| e.default_channel.as_str()),
        google_paid_by_campaign: count_by(
            from(Channel::Google).filter(|e| has_default_channel(e, PAID_SEARCH)),
            |e| e.utm_campaign.as_str(),
        ),
        youtube_by_content: count_by(from(Channel::YouTube), |e| e.utm_content.as_str()),
    }
}

/// Session starts per landing path split by source, default channel and
/// UTM content; paths in alphabetical order, biggest sources first.
pub fn path_sources(events: &[SessionEvent], range: &DateRange) -> Vec<PathSource> {
    let mut counts: BTreeMap<(String, String, String, String), usize> = BTreeMap::new();
    for event in session_starts(events, range) {
        let key = (
            event.page_path(),
            label_or_not_set(&event.utm_source_std),
            label_or_not_set(&event.default_channel),
            label_or_not_set(&event.utm_content),
        );
        *counts.entry(key).or_insert(0) += 1;
    }

    let mut rows: Vec<PathSource> = counts
        .into_iter()
        .map(|((path, source, default_channel, content), sessions)| PathSource {
            path,
            source,
            default_channel,
            content,
            sessions,
        })
        .collect();
    rows.sort_by(|a, b| a.path.cmp(&b.path).then(b.sessions.cmp(&a.sessions)));
    rows
}

/// Daily session starts per analytics default channel for both windows.
pub fn daily_sessions_by_default_channel(
    events: &[SessionEvent],
    periods: &ReportingPeriods,
) -> Vec<ChannelDay> {
    let mut rows = Vec::new();
    for (period, range) in [("current", &periods.current), ("benchmark", &periods.benchmark)] {
        let mut counts: BTreeMap<(String, NaiveDate), usize> = BTreeMap::new();
        for event in session_starts(events, range) {
            let key = (label_or_not_set(&event.default_channel), event.event_date);
            *counts.entry(key).or_insert(0) += 1;
        }
        rows.extend(
            counts
                .into_iter()
                .map(|((default_channel, date), sessions)| ChannelDay {
                    period,
                    default_channel,
                    date,
                    sessions,
                }),
        );
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(name: &str, session: &str, location: &str, source: &str) -> SessionEvent {
        SessionEvent {
            event_date: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
            event_name: name.to_string(),
            ga_session_id: session.to_string(),
            user_inferred_id: format!("user-{}", session),
            transaction_id: None,
            utm_source_std: source.to_string(),
            default_channel: "Organic Search".to_string(),
            utm_campaign: String::new(),
            utm_content: String::new(),
            path: None,
            event_page_location: location.to_string(),
        }
    }

    fn range() -> DateRange {
        let day = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        DateRange::new(day, day).unwrap()
    }

    fn fixture() -> Vec<SessionEvent> {
        vec![
            event("session_start", "s1", "https://site.example/curso/", "Google"),
            event("page_view", "s1", "https://site.example/curso/", "Google"),
            event("page_view", "s1", "https://site.example/precos/", "Google"),
            event("page_view", "s1", "https://pay.hotmart.com/checkout", "Google"),
            event("purchase", "s1", "https://pay.hotmart.com/checkout", "Google"),
            event("session_start", "s2", "https://pay.hotmart.com/checkout", "Others"),
            event("purchase", "s2", "https://pay.hotmart.com/checkout", "Others"),
            event("purchase", "s2", "https://pay.hotmart.com/checkout", "Others"),
            event("session_start", "s3", "https://site.example/curso/", "Google"),
            event("page_view", "s3", "https://site.example/curso/", "Google"),
        ]
    }

    #[test]
    fn test_traffic_metrics() {
        let metrics = compute_traffic_metrics(&fixture(), &range());
        assert_eq!(metrics.sessions, 3);
        assert_eq!(metrics.page_views, 4);
        assert_eq!(metrics.purchases, 3);
    }

    #[test]
    fn test_page_attribution_skips_checkout() {
        let pages = page_attribution(&fixture(), &range(), &TrafficOptions::default());
        assert_eq!(pages[0].path, DIRECT_PATH);
        assert_eq!(pages[0].value, 2.0);
        let curso = pages.iter().find(|p| p.path == "/curso/").unwrap();
        assert_eq!(curso.value, 0.5);
        let total: f64 = pages.iter().map(|p| p.value).sum();
        assert_eq!(total, 3.0);
    }

    #[test]
    fn test_page_attribution_groups_interleaved_sessions() {
        let mut events = Vec::new();
        for n in 0..50 {
            let session = format!("p{}", n % 5);
            events.push(event("page_view", &session, "https://site.example/curso/", "Google"));
            if n < 5 {
                events.push(event("purchase", &session, "https://pay.hotmart.com/x", "Google"));
            }
        }
        events.push(event("page_view", "browse", "https://site.example/blog/", "Google"));

        let pages = page_attribution(&events, &range(), &TrafficOptions::default());
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].path, "/curso/");
        assert!((pages[0].value - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_sessions_by_path_folds_small_paths() {
        let options = TrafficOptions {
            min_path_share: 0.5,
            ..TrafficOptions::default()
        };
        let shares = sessions_by_path(&fixture(), &range(), &options);
        assert_eq!(shares[0].path, "/curso/");
        assert_eq!(shares[0].sessions, 2);
        assert_eq!(shares[1].path, OTHER_PATHS);
        assert_eq!(shares[1].sessions, 1);
    }

    fn paid(day: u32, source: &str, default_channel: &str, campaign: &str, content: &str) -> SessionEvent {
        let mut e = event("session_start", &format!("p{}{}", day, content), "https://site.example/curso/", source);
        e.event_date = NaiveDate::from_ymd_opt(2024, 3, day).unwrap();
        e.default_channel = default_channel.to_string();
        e.utm_campaign = campaign.to_string();
        e.utm_content = content.to_string();
        e
    }

    #[test]
    fn test_platform_breakdown() {
        let events = vec![
            paid(4, "Facebook + Instagram", "Paid Social", "launch", "video1"),
            paid(4, "Facebook + Instagram", "Paid Social", "launch", "video1"),
            paid(4, "Facebook + Instagram", "Paid Social", "launch", "carousel"),
            paid(4, "Facebook + Instagram", "Organic Social", "", ""),
            paid(4, "Google", "Paid Search", "brand", ""),
            paid(4, "Google", "Organic Search", "", ""),
            paid(4, "YouTube", "Organic Video", "", "aula-1"),
            paid(4, "YouTube", "Organic Video", "", ""),
            paid(5, "YouTube", "Organic Video", "", "aula-2"),
        ];

        let breakdown = platform_breakdown(&events, &range());

        assert_eq!(breakdown.facebook_by_default_channel[0].label, "Paid Social");
        assert_eq!(breakdown.facebook_by_default_channel[0].sessions, 3);
        assert_eq!(breakdown.facebook_paid_by_content.len(), 2);
        assert_eq!(breakdown.facebook_paid_by_content[0].label, "video1");
        assert_eq!(breakdown.facebook_paid_content_mean, Some(1.5));
        assert_eq!(breakdown.google_by_default_channel.len(), 2);
        assert_eq!(breakdown.google_paid_by_campaign.len(), 1);
        assert_eq!(breakdown.google_paid_by_campaign[0].label, "brand");
        let youtube: Vec<&str> = breakdown.youtube_by_content.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(youtube, vec![NOT_SET, "aula-1"]);

        let empty = platform_breakdown(&[], &range());
        assert_eq!(empty.facebook_paid_content_mean, None);
    }

    #[test]
    fn test_path_sources_and_daily_channels() {
        let events = vec![
            paid(4, "Facebook + Instagram", "Paid Social", "launch", "video1"),
            paid(4, "Facebook + Instagram", "Paid Social", "launch", "video1"),
            paid(4, "Google", "Organic Search", "", ""),
            paid(1, "Google", "Organic Search", "", ""),
        ];

        let sources = path_sources(&events, &range());
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].path, "/curso/");
        assert_eq!(sources[0].source, "Facebook + Instagram");
        assert_eq!(sources[0].content, "video1");
        assert_eq!(sources[0].sessions, 2);
        assert_eq!(sources[1].content, NOT_SET);

        let periods = ReportingPeriods::resolve(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(), 3, None, None)
            .unwrap();
        let days = daily_sessions_by_default_channel(&events, &periods);
        let current: Vec<&ChannelDay> = days.iter().filter(|d| d.period == "current").collect();
        assert_eq!(current.len(), 2);
        assert_eq!(current[1].default_channel, "Paid Social");
        assert_eq!(current[1].sessions, 2);
        let benchmark: Vec<&ChannelDay> = days.iter().filter(|d| d.period == "benchmark").collect();
        assert_eq!(benchmark.len(), 1);
        assert_eq!(benchmark[0].date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }

    #[test]
    fn test_sessions_by_channel() {
        let sessions = sessions_by_channel(&fixture(), &range(), false);
        assert_eq!(sessions[0].channel, Channel::Google);
        assert_eq!(sessions[0].sessions, 2);
        assert_eq!(sessions[0].default_channel, None);

        let detailed = sessions_by_channel(&fixture(), &range(), true);
        assert!(detailed
            .iter()
            .all(|s| s.default_channel.as_deref() == Some("Organic Search")));
    }
}
