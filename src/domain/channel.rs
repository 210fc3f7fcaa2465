use serde::{Serialize, Serializer};
use std::fmt;

/// 行銷來源（對應分析事件中的 `utm_source_std`）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    FacebookInstagram,
    Google,
    Direct,
    YouTube,
    ActiveCampaign,
    Others,
    Bing,
    Whatsapp,
    Blog,
    TikTok,
    LinkedIn,
    Hub,
    SalesTeam,
}

impl Channel {
    /// Report order.
    pub const ALL: [Channel; 13] = [
        Channel::FacebookInstagram,
        Channel::Google,
        Channel::Direct,
        Channel::YouTube,
        Channel::ActiveCampaign,
        Channel::Others,
        Channel::Bing,
        Channel::Whatsapp,
        Channel::Blog,
        Channel::TikTok,
        Channel::LinkedIn,
        Channel::Hub,
        Channel::SalesTeam,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Channel::FacebookInstagram => "Facebook + Instagram",
            Channel::Google => "Google",
            Channel::Direct => "Direct",
            Channel::YouTube => "YouTube",
            Channel::ActiveCampaign => "Active Campaign",
            Channel::Others => "Others",
            Channel::Bing => "Bing",
            Channel::Whatsapp => "Whatsapp",
            Channel::Blog => "Blog",
            Channel::TikTok => "Tik Tok",
            Channel::LinkedIn => "LinkedIn",
            Channel::Hub => "Hub",
            Channel::SalesTeam => "Vendas",
        }
    }

    /// 不分大小寫比對標籤，無法辨識的一律歸類為 `Others`
    pub fn from_label(label: &str) -> Channel {
        let label = label.trim();
        Channel::ALL
            .iter()
            .copied()
            .find(|channel| channel.label().eq_ignore_ascii_case(label))
            .unwrap_or(Channel::Others)
    }

    /// Classifies one touch, folding `Others` into `Direct` when the
    /// analytics default channel says the visit was direct.
    pub fn classify(source: &str, default_channel: &str) -> Channel {
        match Channel::from_label(source) {
            Channel::Others if default_channel.trim().eq_ignore_ascii_case("direct") => {
                Channel::Direct
            }
            channel => channel,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for Channel {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// SCK 的前綴（第一個 `_` 之前）
pub fn sck_prefix(sck: &str) -> &str {
    sck.split('_').next().unwrap_or(sck)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_label_is_case_insensitive() {
        assert_eq!(Channel::from_label("Linkedin"), Channel::LinkedIn);
        assert_eq!(Channel::from_label(" facebook + instagram "), Channel::FacebookInstagram);
        assert_eq!(Channel::from_label("Vendas"), Channel::SalesTeam);
        assert_eq!(Channel::from_label("Pinterest"), Channel::Others);
        assert_eq!(Channel::from_label(""), Channel::Others);
    }

    #[test]
    fn test_classify_folds_direct_others() {
        assert_eq!(Channel::classify("Others", "Direct"), Channel::Direct);
        assert_eq!(Channel::classify("Others", "Referral"), Channel::Others);
        assert_eq!(Channel::classify("Google", "Direct"), Channel::Google);
    }

    #[test]
    fn test_sck_prefix() {
        assert_eq!(sck_prefix("venda_joao_whatsapp"), "venda");
        assert_eq!(sck_prefix("email-upgrade"), "email-upgrade");
        assert_eq!(sck_prefix(""), "");
    }

    #[test]
    fn test_labels_round_trip_for_every_channel() {
        for channel in Channel::ALL {
            assert_eq!(Channel::from_label(channel.label()), channel);
        }
    }
}
