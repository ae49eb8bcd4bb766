use anyhow::Context as _;

/// Target site and credentials for one publish pipeline.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    /// Site root, e.g. `https://www.example.com` (no trailing slash).
    pub base_url: String,
    /// Service account for the REST API (application password).
    pub api_user: String,
    pub api_password: String,
    /// Interactive password for the wp-admin login form.
    pub login_password: String,
    /// Page that lists every previous issue.
    pub archive_page_id: u64,
    /// Page that embeds the current issue.
    pub viewer_page_id: u64,
    /// Flipbook id used for the viewer shortcode when the registrar skips
    /// creation and no fresh id was read from the admin form.
    pub fallback_flipbook_id: u64,
}

#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Chromium executable override; autodetected when unset.
    pub chrome_path: Option<String>,
    pub debug_port: u16,
    pub headless: bool,
    /// Total registrar attempts (whole-attempt restarts), minimum 1.
    pub attempts: u32,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub site: SiteConfig,
    pub browser: BrowserConfig,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let site = SiteConfig {
            base_url: required("PRESSFLIP_SITE_URL")?
                .trim_end_matches('/')
                .to_owned(),
            api_user: required("PRESSFLIP_API_USER")?,
            api_password: required("PRESSFLIP_API_PASSWORD")?,
            login_password: required("PRESSFLIP_LOGIN_PASSWORD")?,
            archive_page_id: required_parsed("PRESSFLIP_ARCHIVE_PAGE_ID")?,
            viewer_page_id: required_parsed("PRESSFLIP_VIEWER_PAGE_ID")?,
            fallback_flipbook_id: required_parsed("PRESSFLIP_FALLBACK_FLIPBOOK_ID")?,
        };

        let browser = BrowserConfig {
            chrome_path: optional("PRESSFLIP_CHROME"),
            debug_port: optional("PRESSFLIP_DEBUG_PORT")
                .map(|v| v.parse::<u16>().context("parse PRESSFLIP_DEBUG_PORT"))
                .transpose()?
                .unwrap_or(9222),
            headless: optional("PRESSFLIP_HEADFUL").is_none(),
            attempts: optional("PRESSFLIP_FLIPBOOK_ATTEMPTS")
                .map(|v| v.parse::<u32>().context("parse PRESSFLIP_FLIPBOOK_ATTEMPTS"))
                .transpose()?
                .unwrap_or(3)
                .max(1),
        };

        Ok(Self { site, browser })
    }
}

fn required(name: &str) -> anyhow::Result<String> {
    match optional(name) {
        Some(value) => Ok(value),
        None => anyhow::bail!("{name} is not set"),
    }
}

fn required_parsed(name: &str) -> anyhow::Result<u64> {
    required(name)?
        .parse::<u64>()
        .with_context(|| format!("parse {name}"))
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}
