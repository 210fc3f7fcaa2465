use crate::domain::model::{AdsetAnnotation, AdsetDay};
use crate::domain::period::{ratio, DateRange, Kpi, KpiSet};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdsOptions {
    /// 只保留活動名稱包含此字串的資料（不分大小寫）
    pub campaign_filter: Option<String>,
    /// 每個 adset 平均花費的比例，低於此值的 adset 會被標記
    pub cutoff_ratio: f64,
    /// 多天區間時只保留有超過一天資料的 adset
    pub only_active: bool,
    /// 最佳與最差 adset 的排序依據
    pub ranking_metric: AdsetMetric,
    pub top_n: usize,
}

impl Default for AdsOptions {
    fn default() -> Self {
        Self {
            campaign_filter: None,
            cutoff_ratio: 0.2,
            only_active: false,
            ranking_metric: AdsetMetric::default(),
            top_n: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdsetMetric {
    Spend,
    Cpa,
    #[default]
    Profit,
    Engagement,
    Roas,
    Cptv,
}

impl AdsetMetric {
    /// 成本類指標越低越好
    pub fn lower_is_better(&self) -> bool {
        matches!(self, AdsetMetric::Cpa | AdsetMetric::Cptv)
    }

    pub fn value(&self, adset: &AdsetSummary) -> Option<f64> {
        match self {
            AdsetMetric::Spend => Some(adset.spend),
            AdsetMetric::Cpa => adset.cpa,
            AdsetMetric::Profit => Some(adset.profit),
            AdsetMetric::Engagement => Some(adset.engagement),
            AdsetMetric::Roas => adset.roas,
            AdsetMetric::Cptv => adset.cptv,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AdsOverview {
    pub adsets: usize,
    pub reach: f64,
    pub frequency: Option<f64>,
    pub cpc: Option<f64>,
    pub true_visit_rate: Option<f64>,
    pub cptv: Option<f64>,
    pub cpm: Option<f64>,
    pub landing_page_views: f64,
    pub cost_per_reaction: Option<f64>,
    pub cost_per_comment: Option<f64>,
    pub cost_per_share: Option<f64>,
    pub investment: f64,
    pub revenue: f64,
    pub roas: Option<f64>,
    pub profit: f64,
    pub purchases: f64,
    pub spend_cutoff: Option<f64>,
}

impl KpiSet for AdsOverview {
    fn section(&self) -> &'static str {
        "ads"
    }

    fn kpis(&self) -> Vec<Kpi> {
        vec![
            Kpi::new("reach", self.reach),
            Kpi::optional("frequency", self.frequency),
            Kpi::optional("cpc", self.cpc),
            Kpi::optional("true_visit_rate", self.true_visit_rate),
            Kpi::optional("cptv", self.cptv),
            Kpi::optional("cpm", self.cpm),
            Kpi::new("landing_page_views", self.landing_page_views),
            Kpi::optional("cost_per_reaction", self.cost_per_reaction),
            Kpi::optional("cost_per_comment", self.cost_per_comment),
            Kpi::optional("cost_per_share", self.cost_per_share),
            Kpi::new("investment", self.investment),
            Kpi::new("revenue", self.revenue),
            Kpi::optional("roas", self.roas),
            Kpi::new("profit", self.profit),
            Kpi::new("purchases", self.purchases),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdsetSummary {
    pub name: String,
    pub spend: f64,
    pub purchases: f64,
    pub profit: f64,
    pub engagement: f64,
    pub action_value: f64,
    pub landing_page_views: f64,
    pub spend_share: Option<f64>,
    pub cpa: Option<f64>,
    pub roas: Option<f64>,
    pub cptv: Option<f64>,
    pub below_cutoff: bool,
    pub active: bool,
}

/// Rows of the period that pass the campaign filter and, when enabled,
/// belong to adsets active for more than one day.
pub fn filter_adsets<'a>(
    ads: &'a [AdsetDay],
    range: &DateRange,
    options: &AdsOptions,
) -> Vec<&'a AdsetDay> {
    let needle = options.campaign_filter.as_deref().map(str::to_lowercase);
    let rows: Vec<&AdsetDay> = ads
        .iter()
        .filter(|a| range.contains(a.date))
        .filter(|a| {
            needle
                .as_deref()
                .map_or(true, |n| a.campaign_name.to_lowercase().contains(n))
        })
        .collect();

    if !options.only_active {
        return rows;
    }
    let days = days_per_adset(&rows);
    rows.into_iter()
        .filter(|a| is_active(range, days.get(a.name.as_str()).copied().unwrap_or(0)))
        .collect()
}

pub fn compute_overview(rows: &[&AdsetDay], options: &AdsOptions) -> AdsOverview {
    let sum = |f: fn(&AdsetDay) -> f64| rows.iter().map(|a| f(a)).sum::<f64>();

    let spend = sum(|a| a.spend);
    let impressions = sum(|a| a.impressions);
    let reach = sum(|a| a.reach);
    let clicks = sum(|a| a.inline_link_clicks);
    let landing_page_views = sum(|a| a.n_landing_page_view);
    let revenue = sum(|a| a.action_value_purchase);
    let adsets = days_per_adset(rows).len();

    AdsOverview {
        adsets,
        reach,
        frequency: ratio(impressions, reach),
        cpc: ratio(spend, clicks),
        true_visit_rate: ratio(landing_page_views, clicks),
        cptv: ratio(spend, landing_page_views),
        cpm: ratio(spend, impressions / 1000.0),
        landing_page_views,
        cost_per_reaction: ratio(spend, sum(|a| a.n_post_reaction)),
        cost_per_comment: ratio(spend, sum(|a| a.n_comments)),
        cost_per_share: ratio(spend, sum(|a| a.n_shares)),
        investment: spend,
        revenue,
        roas: ratio(revenue, spend),
        profit: revenue - spend,
        purchases: sum(|a| a.n_purchase),
        spend_cutoff: ratio(spend, adsets as f64).map(|mean| mean * options.cutoff_ratio),
    }
}

/// Per-adset totals, highest spend first.
pub fn summarize_adsets(
    rows: &[&AdsetDay],
    range: &DateRange,
    options: &AdsOptions,
) -> Vec<AdsetSummary> {
    let days = days_per_adset(rows);
    let total_spend: f64 = rows.iter().map(|a| a.spend).sum();
    let cutoff = compute_overview(rows, options).spend_cutoff;

    let mut grouped: BTreeMap<&str, AdsetSummary> = BTreeMap::new();
    for row in rows {
        let summary = grouped
            .entry(row.name.as_str())
            .or_insert_with(|| AdsetSummary {
                name: row.name.clone(),
                spend: 0.0,
                purchases: 0.0,
                profit: 0.0,
                engagement: 0.0,
                action_value: 0.0,
                landing_page_views: 0.0,
                spend_share: None,
                cpa: None,
                roas: None,
                cptv: None,
                below_cutoff: false,
                active: false,
            });
        summary.spend += row.spend;
        summary.purchases += row.n_purchase;
        summary.profit += row.profit();
        summary.engagement += row.n_post_engagement;
        summary.action_value += row.action_value_purchase;
        summary.landing_page_views += row.n_landing_page_view;
    }

    let mut summaries: Vec<AdsetSummary> = grouped
        .into_values()
        .map(|mut s| {
            s.spend_share = ratio(s.spend, total_spend).map(|r| r * 100.0);
            s.cpa = ratio(s.spend, s.purchases);
            s.roas = ratio(s.action_value, s.spend);
            s.cptv = ratio(s.spend, s.landing_page_views);
            s.below_cutoff = cutoff.is_some_and(|c| s.spend < c);
            s.active = is_active(range, days.get(s.name.as_str()).copied().unwrap_or(0));
            s
        })
        .collect();
    summaries.sort_by(|a, b| b.spend.total_cmp(&a.spend));
    summaries
}

/// Sums shared by annotation groups and daily rows.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Totals {
    spend: f64,
    purchases: f64,
    profit: f64,
    engagement: f64,
    action_value: f64,
    landing_page_views: f64,
}

impl Totals {
    fn add(&mut self, row: &AdsetDay) {
        self.spend += row.spend;
        self.purchases += row.n_purchase;
        self.profit += row.profit();
        self.engagement += row.n_post_engagement;
        self.action_value += row.action_value_purchase;
        self.landing_page_views += row.n_landing_page_view;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationDimension {
    BigIdea,
    AwarenessLevel,
    Author,
}

impl AnnotationDimension {
    pub const ALL: [AnnotationDimension; 3] = [
        AnnotationDimension::BigIdea,
        AnnotationDimension::AwarenessLevel,
        AnnotationDimension::Author,
    ];

    fn of<'a>(&self, annotation: &'a AdsetAnnotation) -> Option<&'a str> {
        match self {
            AnnotationDimension::BigIdea => annotation.big_idea.as_deref(),
            AnnotationDimension::AwarenessLevel => annotation.awareness_level.as_deref(),
            AnnotationDimension::Author => annotation.author.as_deref(),
        }
    }
}

/// Period totals of the adsets sharing one annotation value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotationGroup {
    pub dimension: AnnotationDimension,
    pub value: String,
    pub adsets: usize,
    pub spend: f64,
    pub purchases: f64,
    pub profit: f64,
    pub engagement: f64,
    pub action_value: f64,
    pub landing_page_views: f64,
    /// 佔同一維度已標註花費的百分比
    pub spend_share: Option<f64>,
    pub cpa: Option<f64>,
    pub roas: Option<f64>,
    pub cptv: Option<f64>,
}

/// Groups the rows by each annotation dimension. Adsets without an
/// annotation for a dimension are left out of that dimension.
pub fn group_by_annotation(
    rows: &[&AdsetDay],
    annotations: &[AdsetAnnotation],
) -> Vec<AnnotationGroup> {
    let by_name: HashMap<&str, &AdsetAnnotation> =
        annotations.iter().map(|a| (a.name.as_str(), a)).collect();

    let mut groups = Vec::new();
    for dimension in AnnotationDimension::ALL {
        let mut grouped: BTreeMap<&str, (Totals, HashSet<&str>)> = BTreeMap::new();
        for row in rows {
            let value = by_name
                .get(row.name.as_str())
                .and_then(|annotation| dimension.of(annotation));
            if let Some(value) = value {
                let (totals, names) = grouped.entry(value).or_default();
                totals.add(row);
                names.insert(row.name.as_str());
            }
        }

        let annotated_spend: f64 = grouped.values().map(|(t, _)| t.spend).sum();
        groups.extend(grouped.into_iter().map(|(value, (t, names))| AnnotationGroup {
            dimension,
            value: value.to_string(),
            adsets: names.len(),
            spend: t.spend,
            purchases: t.purchases,
            profit: t.profit,
            engagement: t.engagement,
            action_value: t.action_value,
            landing_page_views: t.landing_page_views,
            spend_share: ratio(t.spend, annotated_spend).map(|r| r * 100.0),
            cpa: ratio(t.spend, t.purchases),
            roas: ratio(t.action_value, t.spend),
            cptv: ratio(t.spend, t.landing_page_views),
        }));
    }
    groups
}

/// What an average adset did in the period.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AdsetAverages {
    pub spend: Option<f64>,
    pub purchases: Option<f64>,
    pub cpa: Option<f64>,
    pub profit: Option<f64>,
    pub engagement: Option<f64>,
    pub roas: Option<f64>,
    pub cptv: Option<f64>,
}

pub fn adset_averages(rows: &[&AdsetDay]) -> AdsetAverages {
    let mut totals = Totals::default();
    for row in rows {
        totals.add(row);
    }
    let adsets = days_per_adset(rows).len() as f64;

    AdsetAverages {
        spend: ratio(totals.spend, adsets),
        purchases: ratio(totals.purchases, adsets),
        cpa: ratio(totals.spend, totals.purchases),
        profit: ratio(totals.profit, adsets),
        engagement: ratio(totals.engagement, adsets),
        roas: ratio(totals.action_value, totals.spend),
        cptv: ratio(totals.spend, totals.landing_page_views),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdsetDaySummary {
    pub date: NaiveDate,
    pub name: String,
    pub spend: f64,
    pub purchases: f64,
    pub profit: f64,
    pub engagement: f64,
    pub action_value: f64,
    pub landing_page_views: f64,
    pub cpa: Option<f64>,
    pub roas: Option<f64>,
    pub cptv: Option<f64>,
}

/// Day-by-day totals per adset, ordered by adset then date.
pub fn daily_adset_evolution(rows: &[&AdsetDay]) -> Vec<AdsetDaySummary> {
    let mut grouped: BTreeMap<(&str, NaiveDate), Totals> = BTreeMap::new();
    for row in rows {
        grouped.entry((row.name.as_str(), row.date)).or_default().add(row);
    }

    grouped
        .into_iter()
        .map(|((name, date), t)| AdsetDaySummary {
            date,
            name: name.to_string(),
            spend: t.spend,
            purchases: t.purchases,
            profit: t.profit,
            engagement: t.engagement,
            action_value: t.action_value,
            landing_page_views: t.landing_page_views,
            cpa: ratio(t.spend, t.purchases),
            roas: ratio(t.action_value, t.spend),
            cptv: ratio(t.spend, t.landing_page_views),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedAdset {
    pub name: String,
    pub value: f64,
    pub spend: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdsetRanking {
    pub metric: AdsetMetric,
    /// 最佳者在前
    pub best: Vec<RankedAdset>,
    /// 最差者在前
    pub worst: Vec<RankedAdset>,
}

/// Best and worst `top_n` adsets by one metric. Adsets without a value for
/// the metric (no purchases for CPA, for example) are not ranked.
pub fn rank_adsets(summaries: &[AdsetSummary], metric: AdsetMetric, top_n: usize) -> AdsetRanking {
    let mut ranked: Vec<RankedAdset> = summaries
        .iter()
        .filter_map(|s| {
            metric.value(s).map(|value| RankedAdset {
                name: s.name.clone(),
                value,
                spend: s.spend,
            })
        })
        .collect();
    ranked.sort_by(|a, b| {
        let order = if metric.lower_is_better() {
            a.value.total_cmp(&b.value)
        } else {
            b.value.total_cmp(&a.value)
        };
        order.then_with(|| a.name.cmp(&b.name))
    });

    let best = ranked.iter().take(top_n).cloned().collect();
    let worst = ranked.iter().rev().take(top_n).cloned().collect();
    AdsetRanking {
        metric,
        best,
        worst,
    }
}

fn days_per_adset<'a>(rows: &[&'a AdsetDay]) -> BTreeMap<&'a str, usize> {
    let mut days: BTreeMap<&str, usize> = BTreeMap::new();
    for row in rows {
        *days.entry(row.name.as_str()).or_insert(0) += 1;
    }
    days
}

fn is_active(range: &DateRange, days: usize) -> bool {
    !range.spans_multiple_days() || days > 1
}
