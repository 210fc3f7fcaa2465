use crate::domain::model::Dataset;
use crate::domain::period::{Comparison, KpiDelta, ReportingPeriods};
use crate::domain::services::ads::{
    adset_averages, compute_overview, daily_adset_evolution, filter_adsets, group_by_annotation,
    rank_adsets, summarize_adsets, AdsOptions, AdsOverview, AdsetAverages, AdsetDaySummary,
    AdsetRanking, AdsetSummary, AnnotationGroup,
};
use crate::domain::services::attribution::{attribute_revenue, AttributionOptions, AttributionReport};
use crate::domain::services::email::{
    compute_email_metrics, email_history, total_contacts, EmailHistory, EmailInputs, EmailMetrics,
    EmailOptions,
};
use crate::domain::services::funnel::{
    compute_funnel_metrics, join_leads, lead_history, total_leads, FunnelMetrics, FunnelOptions,
    LeadHistory,
};
use crate::domain::services::peaks::{analyze_peak, PeakReport, PeakWindow};
use crate::domain::services::sales::{
    compute_sales_metrics, daily_history, product_breakdown, sck_breakdown, DailySales,
    ProductBreakdown, SalesMetrics, SalesOptions, SckBreakdown,
};
use crate::domain::services::traffic::{
    compute_traffic_metrics, daily_sessions_by_default_channel, page_attribution, path_sources,
    platform_breakdown, sessions_by_channel, sessions_by_path, ChannelDay, ChannelSessions,
    PageAttribution, PathShare, PathSource, PlatformBreakdown, TrafficMetrics, TrafficOptions,
};
use crate::utils::error::{EtlError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// 未設定任何高峰區間時使用本期，名稱固定為 `current`
pub const CURRENT_PEAK: &str = "current";

/// Tunables of every dashboard section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportOptions {
    pub attribution: AttributionOptions,
    pub sales: SalesOptions,
    pub traffic: TrafficOptions,
    pub email: EmailOptions,
    pub funnel: FunnelOptions,
    pub ads: AdsOptions,
    pub peaks: Vec<PeakWindow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrafficSection {
    pub metrics: Comparison<TrafficMetrics>,
    pub page_attribution: Vec<PageAttribution>,
    pub sessions_by_path: Vec<PathShare>,
    pub sessions_by_channel: Vec<ChannelSessions>,
    pub sessions_by_default_channel: Vec<ChannelSessions>,
    pub platforms: PlatformBreakdown,
    pub path_sources: Vec<PathSource>,
    pub daily_by_default_channel: Vec<ChannelDay>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmailSection {
    pub metrics: Comparison<EmailMetrics>,
    /// 沒有聯絡人資料時為 `None`
    pub total_contacts: Option<usize>,
    pub history: EmailHistory,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunnelSection {
    pub metrics: Comparison<FunnelMetrics>,
    pub total_leads: usize,
    pub history: Vec<LeadHistory>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdsSection {
    pub overview: Comparison<AdsOverview>,
    pub adsets: Vec<AdsetSummary>,
    pub averages: AdsetAverages,
    pub ranking: AdsetRanking,
    pub daily: Vec<AdsetDaySummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Vec<AnnotationGroup>>,
}

/// Everything the dashboard pages show for one run.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardReport {
    pub title: String,
    pub periods: ReportingPeriods,
    pub sales: Comparison<SalesMetrics>,
    pub products: Vec<ProductBreakdown>,
    pub sales_by_sck: Vec<SckBreakdown>,
    pub daily_sales: Vec<DailySales>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribution: Option<Comparison<AttributionReport>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traffic: Option<TrafficSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<EmailSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub funnel: Option<FunnelSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ads: Option<AdsSection>,
    pub peaks: Vec<PeakReport>,
    pub kpi_deltas: Vec<KpiDelta>,
}

pub fn build_report(
    title: &str,
    dataset: &Dataset,
    periods: &ReportingPeriods,
    options: &ReportOptions,
) -> Result<DashboardReport> {
    info!(
        "📊 Building report for {} (benchmark {})",
        periods.current, periods.benchmark
    );

    let ads = dataset.ads.as_deref().unwrap_or_default();

    let sales = Comparison::compute(periods, |range| {
        compute_sales_metrics(&dataset.sales, ads, range, &options.sales)
    });
    if sales.current.valid_sales == 0 {
        warn!("⚠️ No valid sales in the current period {}", periods.current);
    }

    let attribution = dataset.sessions.as_deref().map(|events| {
        Comparison::compute(periods, |range| {
            attribute_revenue(events, &dataset.sales, range, &options.attribution)
        })
    });

    let traffic = dataset.sessions.as_deref().map(|events| TrafficSection {
        metrics: Comparison::compute(periods, |range| compute_traffic_metrics(events, range)),
        page_attribution: page_attribution(events, &periods.current, &options.traffic),
        sessions_by_path: sessions_by_path(events, &periods.current, &options.traffic),
        sessions_by_channel: sessions_by_channel(events, &periods.current, false),
        sessions_by_default_channel: sessions_by_channel(events, &periods.current, true),
        platforms: platform_breakdown(events, &periods.current),
        path_sources: path_sources(events, &periods.current),
        daily_by_default_channel: daily_sessions_by_default_channel(events, periods),
    });

    let email = dataset.email_campaigns.as_deref().map(|campaigns| {
        let inputs = EmailInputs {
            campaigns,
            sales: &dataset.sales,
            sessions: dataset.sessions.as_deref(),
            contacts: dataset.contacts.as_deref(),
        };
        EmailSection {
            metrics: Comparison::compute(periods, |range| {
                compute_email_metrics(&inputs, range, &options.email)
            }),
            total_contacts: inputs.contacts.map(total_contacts),
            history: email_history(&inputs, &periods.current, &options.email),
        }
    });

    let funnel = dataset.leads.as_deref().map(|leads| {
        let conversions = join_leads(leads, &dataset.sales);
        FunnelSection {
            metrics: Comparison::compute(periods, |range| {
                compute_funnel_metrics(&conversions, range, &options.funnel)
            }),
            total_leads: total_leads(leads),
            history: lead_history(&conversions, &options.funnel),
        }
    });

    let ads_section = dataset.ads.as_deref().map(|ads| {
        let overview = Comparison::compute(periods, |range| {
            let rows = filter_adsets(ads, range, &options.ads);
            compute_overview(&rows, &options.ads)
        });
        let current_rows = filter_adsets(ads, &periods.current, &options.ads);
        let adsets = summarize_adsets(&current_rows, &periods.current, &options.ads);
        AdsSection {
            overview,
            averages: adset_averages(&current_rows),
            ranking: rank_adsets(&adsets, options.ads.ranking_metric, options.ads.top_n),
            daily: daily_adset_evolution(&current_rows),
            annotations: dataset
                .ad_annotations
                .as_deref()
                .map(|annotations| group_by_annotation(&current_rows, annotations)),
            adsets,
        }
    });

    let peaks = analyze_peaks(dataset, periods, &options.peaks)?;

    let mut kpi_deltas = sales.deltas();
    if let Some(attribution) = &attribution {
        kpi_deltas.extend(attribution.deltas());
    }
    if let Some(traffic) = &traffic {
        kpi_deltas.extend(traffic.metrics.deltas());
    }
    if let Some(email) = &email {
        kpi_deltas.extend(email.metrics.deltas());
    }
    if let Some(funnel) = &funnel {
        kpi_deltas.extend(funnel.metrics.deltas());
    }
    if let Some(ads) = &ads_section {
        kpi_deltas.extend(ads.overview.deltas());
    }
    debug!("Computed {} KPI deltas", kpi_deltas.len());

    Ok(DashboardReport {
        title: title.to_string(),
        periods: *periods,
        products: product_breakdown(&dataset.sales, &periods.current),
        sales_by_sck: sck_breakdown(&dataset.sales, &periods.current),
        daily_sales: daily_history(&dataset.sales),
        sales,
        attribution,
        traffic,
        email,
        funnel,
        ads: ads_section,
        peaks,
        kpi_deltas,
    })
}

fn analyze_peaks(
    dataset: &Dataset,
    periods: &ReportingPeriods,
    windows: &[PeakWindow],
) -> Result<Vec<PeakReport>> {
    let ads = dataset.ads.as_deref().unwrap_or_default();
    if windows.is_empty() {
        return Ok(vec![analyze_peak(
            CURRENT_PEAK,
            &dataset.sales,
            ads,
            &periods.current,
        )]);
    }

    windows
        .iter()
        .map(|window| {
            let range = window.range().ok_or_else(|| EtlError::ValidationError {
                message: format!(
                    "Peak window '{}' ends before it starts ({} > {})",
                    window.name, window.start, window.end
                ),
            })?;
            Ok(analyze_peak(&window.name, &dataset.sales, ads, &range))
        })
        .collect()
}
