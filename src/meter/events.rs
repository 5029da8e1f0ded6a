//! Marketing analytics events.
//!
//! Events are plain name + property bags; they only leave the page through
//! [`AnalyticsGate::capture`](crate::policy::gate::AnalyticsGate::capture),
//! which drops them unless the target integration is running.

use serde::Serialize;
use serde_json::{json, Map, Value};

/// One analytics event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsEvent {
    /// Event name, e.g. `marketing_cta_click`.
    pub name: String,
    /// Event properties.
    pub properties: Map<String, Value>,
}

impl AnalyticsEvent {
    /// Event with no properties.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Map::new(),
        }
    }

    /// Add a property.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    /// Property value by key.
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}

/// Screen-size bucket attached to interaction events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Viewport {
    /// Narrower than 768px.
    Mobile,
    /// 768px to 1023px.
    Tablet,
    /// 1024px and wider, and the default when no window exists.
    Desktop,
}

impl Viewport {
    /// Bucket a window width in CSS pixels.
    pub fn from_width(width: u32) -> Self {
        match width {
            0..=767 => Viewport::Mobile,
            768..=1023 => Viewport::Tablet,
            _ => Viewport::Desktop,
        }
    }

    /// Property value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Viewport::Mobile => "mobile",
            Viewport::Tablet => "tablet",
            Viewport::Desktop => "desktop",
        }
    }
}

/// Which call-to-action was clicked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtaType {
    /// Header "Launch App".
    LaunchAppHeader,
    /// Homepage hero "Launch App".
    LaunchAppHero,
    /// Footer "Launch app".
    LaunchAppFooter,
    /// FAQ page bottom "Launch app".
    LaunchAppFaq,
    /// Features page bottom CTA.
    LaunchAppFeatures,
    /// SKY token card upgrade.
    TokenUpgradeSky,
    /// USDS token card upgrade.
    TokenUpgradeUsds,
    /// Feature card: upgrade widget.
    FeatureUpgrade,
    /// Feature card: trade widget.
    FeatureTrade,
    /// Feature card: rewards widget.
    FeatureRewards,
    /// Feature card: savings widget.
    FeatureSavings,
    /// Feature card: staking widget.
    FeatureStake,
    /// Feature card: expert widget.
    FeatureExpert,
    /// Feature card: SkyLink widget.
    FeatureSkylink,
}

impl CtaType {
    /// Property value.
    pub fn as_str(&self) -> &'static str {
        match self {
            CtaType::LaunchAppHeader => "launch_app_header",
            CtaType::LaunchAppHero => "launch_app_hero",
            CtaType::LaunchAppFooter => "launch_app_footer",
            CtaType::LaunchAppFaq => "launch_app_faq",
            CtaType::LaunchAppFeatures => "launch_app_features",
            CtaType::TokenUpgradeSky => "token_upgrade_sky",
            CtaType::TokenUpgradeUsds => "token_upgrade_usds",
            CtaType::FeatureUpgrade => "feature_upgrade",
            CtaType::FeatureTrade => "feature_trade",
            CtaType::FeatureRewards => "feature_rewards",
            CtaType::FeatureSavings => "feature_savings",
            CtaType::FeatureStake => "feature_stake",
            CtaType::FeatureExpert => "feature_expert",
            CtaType::FeatureSkylink => "feature_skylink",
        }
    }

    /// CTA for a feature card id (`upgrade`, `trade`, ...).
    pub fn for_feature(feature_id: &str) -> Option<Self> {
        Some(match feature_id {
            "upgrade" => CtaType::FeatureUpgrade,
            "trade" => CtaType::FeatureTrade,
            "rewards" => CtaType::FeatureRewards,
            "savings" => CtaType::FeatureSavings,
            "stake" => CtaType::FeatureStake,
            "expert" => CtaType::FeatureExpert,
            "skylink" => CtaType::FeatureSkylink,
            _ => return None,
        })
    }
}

/// Segment for outbound links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkCategory {
    /// Social platforms.
    Social,
    /// Developer documentation.
    Docs,
    /// Voting and forum.
    Governance,
    /// Other ecosystem projects.
    Ecosystem,
    /// Brand assets and media kit.
    Media,
    /// Anything else.
    Other,
}

impl LinkCategory {
    /// Property value.
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkCategory::Social => "social",
            LinkCategory::Docs => "docs",
            LinkCategory::Governance => "governance",
            LinkCategory::Ecosystem => "ecosystem",
            LinkCategory::Media => "media",
            LinkCategory::Other => "other",
        }
    }
}

const SOCIAL: &[&str] = &["twitter.com", "x.com", "discord", "telegram", "youtube", "github.com"];
const GOVERNANCE: &[&str] = &["vote.sky.money", "forum.sky.money"];
const DOCS: &[&str] = &["developers.sky.money", "/docs"];
const MEDIA: &[&str] = &["notion.so", "notion.site", "brand"];
const ECOSYSTEM: &[&str] = &["spark.fi", "info.sky.money"];

/// Guess a link's category from its URL. First matching group wins.
pub fn infer_link_category(url: &str) -> Option<LinkCategory> {
    let url = url.to_lowercase();
    [
        (SOCIAL, LinkCategory::Social),
        (GOVERNANCE, LinkCategory::Governance),
        (DOCS, LinkCategory::Docs),
        (MEDIA, LinkCategory::Media),
        (ECOSYSTEM, LinkCategory::Ecosystem),
    ]
    .into_iter()
    .find(|(patterns, _)| patterns.iter().any(|p| url.contains(p)))
    .map(|(_, category)| category)
}

/// Outcome of the VPN / region check, as tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VpnCheckResult {
    /// Access allowed.
    Allowed,
    /// Blocked: VPN detected.
    VpnBlocked,
    /// Blocked: restricted region.
    RegionBlocked,
    /// The check itself failed.
    Error,
}

impl VpnCheckResult {
    /// Property value.
    pub fn as_str(&self) -> &'static str {
        match self {
            VpnCheckResult::Allowed => "allowed",
            VpnCheckResult::VpnBlocked => "vpn_blocked",
            VpnCheckResult::RegionBlocked => "region_blocked",
            VpnCheckResult::Error => "error",
        }
    }
}

/// Why the blocked page was shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// VPN detected.
    VpnDetected,
    /// The check failed and the policy fails closed.
    NetworkError,
    /// Restricted region.
    RestrictedRegion,
}

impl BlockReason {
    /// Property value.
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockReason::VpnDetected => "vpn_detected",
            BlockReason::NetworkError => "network_error",
            BlockReason::RestrictedRegion => "restricted_region",
        }
    }
}

/// `marketing_cta_click`.
pub fn cta_click(
    cta: CtaType,
    location: &str,
    destination_url: &str,
    widget: Option<&str>,
    viewport: Viewport,
) -> AnalyticsEvent {
    AnalyticsEvent::new("marketing_cta_click")
        .with("cta_type", cta.as_str())
        .with("cta_location", location)
        .with("destination_url", destination_url)
        .with("widget_param", widget.map_or(Value::Null, Value::from))
        .with("viewport", viewport.as_str())
}

/// `marketing_external_link_click`; the category is inferred when not given.
pub fn external_link_click(
    link_url: &str,
    category: Option<LinkCategory>,
    source_page: &str,
    viewport: Viewport,
) -> AnalyticsEvent {
    let category = category
        .or_else(|| infer_link_category(link_url))
        .unwrap_or(LinkCategory::Other);
    AnalyticsEvent::new("marketing_external_link_click")
        .with("link_url", link_url)
        .with("link_category", category.as_str())
        .with("source_page", source_page)
        .with("viewport", viewport.as_str())
}

/// `marketing_external_link_modal_shown`: the leave-site confirmation opened.
pub fn external_link_modal_shown(target_url: &str, source_page: &str) -> AnalyticsEvent {
    AnalyticsEvent::new("marketing_external_link_modal_shown")
        .with("target_url", target_url)
        .with("source_page", source_page)
}

/// `marketing_external_link_confirmed`: the visitor chose to leave.
pub fn external_link_confirmed(target_url: &str, source_page: &str) -> AnalyticsEvent {
    AnalyticsEvent::new("marketing_external_link_confirmed")
        .with("target_url", target_url)
        .with("source_page", source_page)
}

/// `marketing_section_view`.
pub fn section_view(section_name: &str, page_path: &str, viewport: Viewport) -> AnalyticsEvent {
    AnalyticsEvent::new("marketing_section_view")
        .with("section_name", section_name)
        .with("page_path", page_path)
        .with("viewport", viewport.as_str())
}

/// `marketing_faq_item_expand`.
pub fn faq_item_expand(faq_category: &str, faq_question_id: &str, page_path: &str) -> AnalyticsEvent {
    AnalyticsEvent::new("marketing_faq_item_expand")
        .with("faq_category", faq_category)
        .with("faq_question_id", faq_question_id)
        .with("page_path", page_path)
}

/// `marketing_scroll_depth`. Depth is one of 25, 50, 75, 100.
pub fn scroll_depth(depth_percent: u8, page_path: &str, viewport: Viewport) -> Option<AnalyticsEvent> {
    if !matches!(depth_percent, 25 | 50 | 75 | 100) {
        return None;
    }
    Some(
        AnalyticsEvent::new("marketing_scroll_depth")
            .with("depth_percent", depth_percent)
            .with("page_path", page_path)
            .with("viewport", viewport.as_str()),
    )
}

/// `marketing_faq_search`. The query itself is never recorded.
pub fn faq_search(results_count: usize, page_path: &str) -> AnalyticsEvent {
    AnalyticsEvent::new("marketing_faq_search")
        .with("results_count", results_count)
        .with("has_results", results_count > 0)
        .with("page_path", page_path)
}

/// `marketing_vpn_check_completed`.
pub fn vpn_check_completed(
    is_vpn: Option<bool>,
    is_restricted_region: Option<bool>,
    country_code: Option<&str>,
    result: VpnCheckResult,
) -> AnalyticsEvent {
    AnalyticsEvent::new("marketing_vpn_check_completed")
        .with("is_vpn", json!(is_vpn))
        .with("is_restricted_region", json!(is_restricted_region))
        .with("country_code", json!(country_code))
        .with("result", result.as_str())
}

/// `marketing_vpn_blocked_page_view`.
pub fn vpn_blocked_page_view(reason: BlockReason, country_code: Option<&str>) -> AnalyticsEvent {
    AnalyticsEvent::new("marketing_vpn_blocked_page_view")
        .with("block_reason", reason.as_str())
        .with("country_code", json!(country_code))
}
