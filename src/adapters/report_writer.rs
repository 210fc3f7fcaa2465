use crate::domain::model::OutputTable;
use crate::domain::period::round_to;
use crate::domain::services::attribution::AttributionReport;
use crate::domain::services::email::EmailActivity;
use crate::domain::services::traffic::{LabelSessions, PlatformBreakdown};
use crate::domain::services::report::DashboardReport;
use crate::utils::error::{EtlError, Result};
use serde::Serialize;
use std::io::Write;
use zip::write::{SimpleFileOptions, ZipWriter};

pub const REPORT_JSON: &str = "report.json";

#[derive(Serialize)]
struct ChannelRow<'a> {
    period: &'a str,
    channel: &'a str,
    revenue: f64,
    share: Option<f64>,
}

#[derive(Serialize)]
struct JourneyRow<'a> {
    user_id: &'a str,
    channels: String,
    transactions: String,
    revenue: f64,
}

#[derive(Serialize)]
struct PeakRow<'a> {
    peak: &'a str,
    date: String,
    revenue: f64,
    ad_spend: f64,
    profit: f64,
    return_on_spend: Option<f64>,
}

#[derive(Serialize)]
struct ActivityRow<'a> {
    granularity: &'a str,
    label: &'a str,
    sales: usize,
    new_leads: Option<usize>,
    sessions: Option<usize>,
}

#[derive(Serialize)]
struct PlatformRow<'a> {
    platform: &'a str,
    breakdown: &'a str,
    label: &'a str,
    sessions: usize,
}

#[derive(Serialize)]
struct RankingRow<'a> {
    side: &'a str,
    position: usize,
    name: &'a str,
    value: f64,
    spend: f64,
}

/// 將報表轉成 CSV 表格；缺少資料集的區塊不輸出
pub fn render_tables(report: &DashboardReport) -> Result<Vec<OutputTable>> {
    let mut tables = Vec::new();

    if let Some(attribution) = &report.attribution {
        let mut rows = channel_rows("current", &attribution.current);
        rows.extend(channel_rows("benchmark", &attribution.benchmark));
        tables.push(table("attribution_by_channel.csv", &rows)?);

        let journeys: Vec<JourneyRow> = attribution
            .current
            .journeys
            .iter()
            .map(|j| JourneyRow {
                user_id: &j.user_id,
                channels: j
                    .channels
                    .iter()
                    .map(|c| c.label())
                    .collect::<Vec<_>>()
                    .join(" > "),
                transactions: j.transactions.join(";"),
                revenue: round_to(j.revenue, 2),
            })
            .collect();
        tables.push(table("journeys.csv", &journeys)?);
    }

    tables.push(table("kpi_deltas.csv", &report.kpi_deltas)?);
    tables.push(table("products.csv", &report.products)?);
    tables.push(table("sales_by_sck.csv", &report.sales_by_sck)?);

    if let Some(ads) = &report.ads {
        tables.push(table("adsets.csv", &ads.adsets)?);
        tables.push(table("adset_daily.csv", &ads.daily)?);

        let ranking: Vec<RankingRow> = [("best", &ads.ranking.best), ("worst", &ads.ranking.worst)]
            .into_iter()
            .flat_map(|(side, adsets)| {
                adsets.iter().enumerate().map(move |(i, a)| RankingRow {
                    side,
                    position: i + 1,
                    name: &a.name,
                    value: round_to(a.value, 2),
                    spend: round_to(a.spend, 2),
                })
            })
            .collect();
        tables.push(table("adset_ranking.csv", &ranking)?);

        if let Some(groups) = &ads.annotations {
            tables.push(table("ad_annotations.csv", groups)?);
        }
    }
    if let Some(traffic) = &report.traffic {
        tables.push(table("page_attribution.csv", &traffic.page_attribution)?);
        tables.push(table("path_sources.csv", &traffic.path_sources)?);
        tables.push(table("channel_daily.csv", &traffic.daily_by_default_channel)?);
        tables.push(table("platform_sessions.csv", &platform_rows(&traffic.platforms))?);
    }
    if let Some(email) = &report.email {
        let mut rows = activity_rows("daily", &email.history.daily);
        rows.extend(activity_rows("monthly", &email.history.monthly));
        tables.push(table("email_history.csv", &rows)?);
    }

    let peaks: Vec<PeakRow> = report
        .peaks
        .iter()
        .flat_map(|peak| {
            peak.days.iter().map(move |day| PeakRow {
                peak: &peak.name,
                date: day.date.to_string(),
                revenue: day.revenue,
                ad_spend: day.ad_spend,
                profit: day.profit,
                return_on_spend: day.return_on_spend,
            })
        })
        .collect();
    tables.push(table("peaks.csv", &peaks)?);

    Ok(tables)
}

pub fn render_json(report: &DashboardReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// Packs the tables and the JSON report into one ZIP archive.
pub fn bundle_zip(tables: &[OutputTable], json_output: &str) -> Result<Vec<u8>> {
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));

    for output in tables {
        zip.start_file(output.file_name.as_str(), options)?;
        zip.write_all(output.content.as_bytes())?;
    }

    zip.start_file(REPORT_JSON, options)?;
    zip.write_all(json_output.as_bytes())?;

    // 完成並取回底層 Vec<u8>
    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}

fn channel_rows<'a>(period: &'a str, report: &'a AttributionReport) -> Vec<ChannelRow<'a>> {
    report
        .channels
        .iter()
        .map(|c| ChannelRow {
            period,
            channel: c.channel.label(),
            revenue: round_to(c.revenue, 2),
            share: c.share.map(|s| round_to(s, 4)),
        })
        .collect()
}

fn activity_rows<'a>(granularity: &'a str, history: &'a [EmailActivity]) -> Vec<ActivityRow<'a>> {
    history
        .iter()
        .map(|a| ActivityRow {
            granularity,
            label: &a.label,
            sales: a.sales,
            new_leads: a.new_leads,
            sessions: a.sessions,
        })
        .collect()
}

fn platform_rows(platforms: &PlatformBreakdown) -> Vec<PlatformRow<'_>> {
    let breakdowns: [(&str, &str, &[LabelSessions]); 5] = [
        ("facebook", "default_channel", &platforms.facebook_by_default_channel),
        ("facebook", "paid_content", &platforms.facebook_paid_by_content),
        ("google", "default_channel", &platforms.google_by_default_channel),
        ("google", "paid_campaign", &platforms.google_paid_by_campaign),
        ("youtube", "content", &platforms.youtube_by_content),
    ];
    breakdowns
        .into_iter()
        .flat_map(|(platform, breakdown, rows)| {
            rows.iter().map(move |r| PlatformRow {
                platform,
                breakdown,
                label: &r.label,
                sessions: r.sessions,
            })
        })
        .collect()
}

fn table<T: Serialize>(file_name: &str, rows: &[T]) -> Result<OutputTable> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| EtlError::processing(format!("Failed to finish {}: {}", file_name, e)))?;
    let content = String::from_utf8(bytes)
        .map_err(|e| EtlError::processing(format!("{} is not valid UTF-8: {}", file_name, e)))?;

    Ok(OutputTable {
        file_name: file_name.to_string(),
        content,
    })
}
