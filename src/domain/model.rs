use crate::domain::channel::{sck_prefix, Channel};
use crate::domain::services::report::DashboardReport;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// 缺少 SCK / SRC 時使用的標籤
pub const UNKNOWN_TRACKING: &str = "unknown";
/// 沒有自動化流程的 email 活動
pub const NO_AUTOMATION: &str = "No automation";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SaleStatus {
    Approved,
    Complete,
    Refunded,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SaleSource {
    Producer,
    Affiliate,
    #[serde(other)]
    Other,
}

/// One row of the payment platform export. A transaction may span several
/// rows (one per commission receiver).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SaleRecord {
    pub transaction: String,
    pub status: SaleStatus,
    pub source: SaleSource,
    #[serde(rename = "commission.value", deserialize_with = "de::number")]
    pub commission_value: f64,
    #[serde(deserialize_with = "de::date")]
    pub order_date: NaiveDate,
    #[serde(default, deserialize_with = "de::optional_date")]
    pub approved_date: Option<NaiveDate>,
    #[serde(
        rename = "tracking.source_sck",
        default,
        deserialize_with = "de::optional_text"
    )]
    pub sck: Option<String>,
    #[serde(
        rename = "tracking.source",
        default,
        deserialize_with = "de::optional_text"
    )]
    pub src: Option<String>,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub product_name: String,
}

impl SaleRecord {
    /// APPROVED 或 COMPLETE
    pub fn is_valid(&self) -> bool {
        matches!(self.status, SaleStatus::Approved | SaleStatus::Complete)
    }

    pub fn is_producer(&self) -> bool {
        self.source == SaleSource::Producer
    }

    pub fn is_valid_producer(&self) -> bool {
        self.is_valid() && self.is_producer()
    }

    pub fn is_refunded(&self) -> bool {
        self.status == SaleStatus::Refunded
    }

    /// Statuses shown on the dashboards; cancelled and pending orders are ignored.
    pub fn is_reportable(&self) -> bool {
        self.is_valid() || self.is_refunded()
    }

    pub fn sck(&self) -> &str {
        self.sck.as_deref().unwrap_or(UNKNOWN_TRACKING)
    }

    pub fn src(&self) -> &str {
        self.src.as_deref().unwrap_or(UNKNOWN_TRACKING)
    }

    pub fn sck_prefix_contains(&self, marker: &str) -> bool {
        sck_prefix(self.sck()).contains(marker)
    }

    pub fn tracking_contains(&self, marker: &str) -> bool {
        self.sck().contains(marker) || self.src().contains(marker)
    }

    pub fn normalized_email(&self) -> String {
        normalize_email(&self.email)
    }
}

/// One analytics event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SessionEvent {
    #[serde(deserialize_with = "de::date")]
    pub event_date: NaiveDate,
    pub event_name: String,
    pub ga_session_id: String,
    #[serde(default)]
    pub user_inferred_id: String,
    #[serde(default, deserialize_with = "de::optional_text")]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub utm_source_std: String,
    #[serde(default)]
    pub default_channel: String,
    #[serde(default)]
    pub utm_campaign: String,
    #[serde(default)]
    pub utm_content: String,
    #[serde(rename = "Path", alias = "path", default, deserialize_with = "de::optional_text")]
    pub path: Option<String>,
    #[serde(default)]
    pub event_page_location: String,
}

impl SessionEvent {
    pub const SESSION_START: &'static str = "session_start";
    pub const PAGE_VIEW: &'static str = "page_view";
    pub const PURCHASE: &'static str = "purchase";

    pub fn is_session_start(&self) -> bool {
        self.event_name == Self::SESSION_START
    }

    pub fn is_page_view(&self) -> bool {
        self.event_name == Self::PAGE_VIEW
    }

    pub fn is_purchase(&self) -> bool {
        self.event_name == Self::PURCHASE
    }

    /// 過濾掉 `(not set)`、`N/A` 等佔位值
    pub fn transaction(&self) -> Option<&str> {
        self.transaction_id
            .as_deref()
            .filter(|id| !matches!(*id, "(not set)" | "N/A" | "n/a"))
    }

    pub fn channel(&self) -> Channel {
        Channel::classify(&self.utm_source_std, &self.default_channel)
    }

    /// Landing path, falling back to the path of `event_page_location`.
    pub fn page_path(&self) -> String {
        if let Some(path) = &self.path {
            return path.clone();
        }
        match url::Url::parse(&self.event_page_location) {
            Ok(location) => location.path().to_string(),
            Err(_) if self.event_page_location.is_empty() => "(not set)".to_string(),
            Err(_) => self.event_page_location.clone(),
        }
    }
}

/// Daily statistics of one ad set.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AdsetDay {
    #[serde(deserialize_with = "de::date")]
    pub date: NaiveDate,
    #[serde(default)]
    pub campaign_name: String,
    #[serde(alias = "adset_name")]
    pub name: String,
    #[serde(default, deserialize_with = "de::number")]
    pub spend: f64,
    #[serde(default, deserialize_with = "de::number")]
    pub impressions: f64,
    #[serde(default, deserialize_with = "de::number")]
    pub reach: f64,
    #[serde(default, deserialize_with = "de::number")]
    pub inline_link_clicks: f64,
    #[serde(default, deserialize_with = "de::number")]
    pub n_landing_page_view: f64,
    #[serde(default, deserialize_with = "de::number")]
    pub n_purchase: f64,
    #[serde(default, deserialize_with = "de::number")]
    pub action_value_purchase: f64,
    #[serde(default, deserialize_with = "de::number")]
    pub n_post_engagement: f64,
    #[serde(default, deserialize_with = "de::number")]
    pub n_post_reaction: f64,
    #[serde(default, deserialize_with = "de::number")]
    pub n_comments: f64,
    #[serde(default, deserialize_with = "de::number")]
    pub n_shares: f64,
}

impl AdsetDay {
    pub fn profit(&self) -> f64 {
        self.action_value_purchase - self.spend
    }
}

/// 人工標註的 ad set 創意屬性，空白欄位視為未標註
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AdsetAnnotation {
    #[serde(alias = "adset_name")]
    pub name: String,
    #[serde(default, deserialize_with = "de::optional_text")]
    pub big_idea: Option<String>,
    #[serde(default, deserialize_with = "de::optional_text")]
    pub awareness_level: Option<String>,
    #[serde(default, alias = "Author", deserialize_with = "de::optional_text")]
    pub author: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EmailCampaignStat {
    #[serde(default, deserialize_with = "de::optional_text")]
    pub automation_name: Option<String>,
    #[serde(default)]
    pub headline: String,
    #[serde(default, deserialize_with = "de::number")]
    pub send_amt: f64,
    #[serde(default, deserialize_with = "de::number")]
    pub uniquelinkclicks: f64,
    #[serde(default, deserialize_with = "de::number")]
    pub uniqueopens: f64,
    #[serde(default, deserialize_with = "de::number")]
    pub replies: f64,
    #[serde(default, deserialize_with = "de::number")]
    pub hardbounces: f64,
    #[serde(default, deserialize_with = "de::number")]
    pub unsubscribes: f64,
    #[serde(deserialize_with = "de::date")]
    pub last_date: NaiveDate,
}

impl EmailCampaignStat {
    pub fn automation(&self) -> &str {
        self.automation_name.as_deref().unwrap_or(NO_AUTOMATION)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EmailContact {
    pub id: u64,
    #[serde(deserialize_with = "de::date")]
    pub cdate: NaiveDate,
    #[serde(default, deserialize_with = "de::tag_list")]
    pub tags: Vec<u32>,
}

/// 免費漏斗的報名名單
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Lead {
    #[serde(alias = "Data", deserialize_with = "de::date")]
    pub date: NaiveDate,
    #[serde(alias = "Email")]
    pub email: String,
}

impl Lead {
    pub fn normalized_email(&self) -> String {
        normalize_email(&self.email)
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// 輸入資料集種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetKind {
    Sales,
    Sessions,
    Ads,
    AdAnnotations,
    EmailCampaigns,
    Contacts,
    Leads,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 7] = [
        DatasetKind::Sales,
        DatasetKind::Sessions,
        DatasetKind::Ads,
        DatasetKind::AdAnnotations,
        DatasetKind::EmailCampaigns,
        DatasetKind::Contacts,
        DatasetKind::Leads,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DatasetKind::Sales => "sales",
            DatasetKind::Sessions => "sessions",
            DatasetKind::Ads => "ads",
            DatasetKind::AdAnnotations => "ad_annotations",
            DatasetKind::EmailCampaigns => "email_campaigns",
            DatasetKind::Contacts => "contacts",
            DatasetKind::Leads => "leads",
        }
    }
}

impl std::fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// All inputs of one run. Only sales are mandatory.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub sales: Vec<SaleRecord>,
    pub sessions: Option<Vec<SessionEvent>>,
    pub ads: Option<Vec<AdsetDay>>,
    pub ad_annotations: Option<Vec<AdsetAnnotation>>,
    pub email_campaigns: Option<Vec<EmailCampaignStat>>,
    pub contacts: Option<Vec<EmailContact>>,
    pub leads: Option<Vec<Lead>>,
}

impl Dataset {
    pub fn record_count(&self) -> usize {
        self.sales.len()
            + self.sessions.as_ref().map_or(0, Vec::len)
            + self.ads.as_ref().map_or(0, Vec::len)
            + self.ad_annotations.as_ref().map_or(0, Vec::len)
            + self.email_campaigns.as_ref().map_or(0, Vec::len)
            + self.contacts.as_ref().map_or(0, Vec::len)
            + self.leads.as_ref().map_or(0, Vec::len)
    }

    /// 預設報表區間的錨點：最後一筆訂單日，沒有訂單時用最後一筆事件日
    pub fn anchor_date(&self) -> Option<NaiveDate> {
        self.sales.iter().map(|s| s.order_date).max().or_else(|| {
            self.sessions
                .as_ref()
                .and_then(|events| events.iter().map(|e| e.event_date).max())
        })
    }
}

/// A rendered CSV table ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTable {
    pub file_name: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct TransformResult {
    pub report: DashboardReport,
    pub tables: Vec<OutputTable>,
    pub json_output: String,
}

/// Parses the date formats seen in the exports, keeping only the calendar day.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
        .or_else(|| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
        .or_else(|| {
            chrono::DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.date_naive())
        })
        .or_else(|| NaiveDate::parse_from_str(raw, "%Y%m%d").ok())
}

pub(crate) mod de {
    use super::parse_date;
    use chrono::NaiveDate;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    pub fn date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_date(&raw).ok_or_else(|| D::Error::custom(format!("unrecognised date '{}'", raw)))
    }

    pub fn optional_date<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveDate>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) if !raw.trim().is_empty() => parse_date(&raw)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("unrecognised date '{}'", raw))),
            _ => Ok(None),
        }
    }

    /// 空值視為 0
    pub fn number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) if !raw.trim().is_empty() => raw
                .trim()
                .parse::<f64>()
                .map_err(|_| D::Error::custom(format!("invalid number '{}'", raw))),
            _ => Ok(0.0),
        }
    }

    pub fn optional_text<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<String>, D::Error> {
        Ok(Option::<String>::deserialize(deserializer)?
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()))
    }

    pub fn tag_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u32>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        raw.split(';')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(|tag| {
                tag.parse::<u32>()
                    .map_err(|_| D::Error::custom(format!("invalid tag id '{}'", tag)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read<T: for<'de> Deserialize<'de>>(data: &str) -> Vec<T> {
        csv::Reader::from_reader(data.as_bytes())
            .deserialize()
            .collect::<std::result::Result<Vec<T>, _>>()
            .unwrap()
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 2, 15).unwrap();
        assert_eq!(parse_date("2024-02-15"), Some(expected));
        assert_eq!(parse_date("2024-02-15 13:45:00"), Some(expected));
        assert_eq!(parse_date("2024-02-15T13:45:00"), Some(expected));
        assert_eq!(parse_date("2024-02-15T13:45:00-03:00"), Some(expected));
        assert_eq!(parse_date("20240215"), Some(expected));
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("15/02/2024"), None);
    }

    #[test]
    fn test_sale_record_from_export_headers() {
        let data = "\
transaction,status,source,commission.value,order_date,approved_date,tracking.source_sck,tracking.source,email,product_name
HP01,APPROVED,PRODUCER,97.5,2024-02-15,2024-02-15 10:00:00,venda_ana,,Ana@Example.com ,Course
HP02,CANCELED,AFFILIATE,,2024-02-16,,,email,bob@example.com,Course
";
        let sales: Vec<SaleRecord> = read(data);
        assert_eq!(sales.len(), 2);
        assert!(sales[0].is_valid_producer());
        assert_eq!(sales[0].sck(), "venda_ana");
        assert_eq!(sales[0].src(), UNKNOWN_TRACKING);
        assert!(sales[0].sck_prefix_contains("venda"));
        assert_eq!(sales[0].normalized_email(), "ana@example.com");

        assert_eq!(sales[1].status, SaleStatus::Other);
        assert_eq!(sales[1].source, SaleSource::Affiliate);
        assert_eq!(sales[1].commission_value, 0.0);
        assert_eq!(sales[1].approved_date, None);
        assert!(!sales[1].is_reportable());
        assert!(sales[1].tracking_contains("email"));
    }

    #[test]
    fn test_session_event_placeholders_and_paths() {
        let data = "\
event_date,event_name,ga_session_id,user_inferred_id,transaction_id,utm_source_std,default_channel,utm_campaign,utm_content,event_page_location
20240215,page_view,s1,u1,(not set),Others,Direct,,,https://site.example/curso/?utm=x
20240215,purchase,s1,u1,HP01,Google,Paid Search,,,
";
        let events: Vec<SessionEvent> = read(data);
        assert_eq!(events[0].transaction(), None);
        assert_eq!(events[0].channel(), Channel::Direct);
        assert_eq!(events[0].page_path(), "/curso/");
        assert_eq!(events[1].transaction(), Some("HP01"));
        assert!(events[1].is_purchase());
        assert_eq!(events[1].page_path(), "(not set)");
    }

    #[test]
    fn test_contacts_and_leads() {
        let contacts: Vec<EmailContact> = read("id,cdate,tags\n7,2024-02-01,172; 9\n8,2024-02-02,\n");
        assert_eq!(contacts[0].tags, vec![172, 9]);
        assert!(contacts[1].tags.is_empty());

        let leads: Vec<Lead> = read("Data,Email\n2024-02-01, Lead@Example.com\n");
        assert_eq!(leads[0].normalized_email(), "lead@example.com");
    }

    #[test]
    fn test_adset_annotations() {
        let annotations: Vec<AdsetAnnotation> =
            read("adset_name,big_idea,awareness_level,Author\nInteresses,Prova social,Consciente, \n");
        assert_eq!(annotations[0].name, "Interesses");
        assert_eq!(annotations[0].big_idea.as_deref(), Some("Prova social"));
        assert_eq!(annotations[0].author, None);

        let partial: Vec<AdsetAnnotation> = read("name,big_idea\nLookalike,Autoridade\n");
        assert_eq!(partial[0].awareness_level, None);
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let data = "date,name,spend\n2024-02-01,adset,abc\n";
        let result: std::result::Result<Vec<AdsetDay>, _> = csv::Reader::from_reader(data.as_bytes())
            .deserialize()
            .collect();
        assert!(result.is_err());
    }
}
