use serde::Serialize;

/// Coarse device class stored with every page view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeviceType {
    Desktop,
    Mobile,
    Tablet,
    Tv,
}

impl DeviceType {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceType::Desktop => "Desktop",
            DeviceType::Mobile => "Mobile",
            DeviceType::Tablet => "Tablet",
            DeviceType::Tv => "TV",
        }
    }
}

/// What a user-agent parser could tell about a client. `None` fields could
/// not be resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentInfo {
    pub is_bot: bool,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub device: Option<DeviceType>,
}

impl AgentInfo {
    /// Number of fields the parser left unresolved.
    pub fn unresolved_fields(&self) -> u32 {
        u32::from(self.browser.is_none())
            + u32::from(self.os.is_none())
            + u32::from(self.device.is_none())
    }
}

pub trait UserAgentParser: Send + Sync + 'static {
    fn parse(&self, raw: &str) -> AgentInfo;
}

const WOOTHEE_UNKNOWN: &str = "UNKNOWN";

/// `woothee`-backed parser.
#[derive(Debug, Default, Clone, Copy)]
pub struct WootheeParser;

impl UserAgentParser for WootheeParser {
    fn parse(&self, raw: &str) -> AgentInfo {
        let raw = raw.trim();
        if raw.is_empty() {
            return AgentInfo::default();
        }

        let Some(result) = woothee::parser::Parser::new().parse(raw) else {
            return AgentInfo::default();
        };

        if result.category == "crawler" {
            return AgentInfo {
                is_bot: true,
                browser: known(result.name),
                ..AgentInfo::default()
            };
        }

        let os = known(&result.os);
        let device = match result.category {
            "pc" => Some(DeviceType::Desktop),
            // woothee files tablets under smartphone; only the OS tells them apart.
            "smartphone" | "mobilephone" if os.as_deref() == Some("iPad") => {
                Some(DeviceType::Tablet)
            }
            "smartphone" | "mobilephone" => Some(DeviceType::Mobile),
            "appliance" => Some(DeviceType::Tv),
            _ => None,
        };

        AgentInfo {
            is_bot: false,
            browser: known(result.name),
            os,
            device,
        }
    }
}

fn known(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() || value == WOOTHEE_UNKNOWN {
        None
    } else {
        Some(value.to_string())
    }
}
