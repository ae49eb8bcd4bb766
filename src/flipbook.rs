use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use serde_json::Value;

use crate::cdp::session::js_string;
use crate::cdp::{ChromeProcess, Connection, PageSession};
use crate::config::BrowserConfig;
use crate::report::StepOutcome;

/// Delay before typing into a freshly loaded admin page; the form scripts
/// are slow to wire up and drop keystrokes that arrive too early.
const WARM_UP: Duration = Duration::from_millis(1500);
/// Delay between filling the creation form and submitting it.
const FORM_SETTLE: Duration = Duration::from_millis(1500);
const NAV_TIMEOUT: Duration = Duration::from_secs(30);
const CONFIRM_TIMEOUT: Duration = Duration::from_secs(30);

const LIST_PATH: &str = "/wp-admin/admin.php?page=real3d_flipbook_admin";
const CREATE_PATH: &str = "/wp-admin/admin.php?page=real3d_flipbook_admin&action=add_new#pages";

/// What the registrar did, and the remote-assigned flipbook id when a new
/// entry was created. A skipped registration has no id; the caller falls
/// back to its configured one.
#[derive(Debug, Clone, Copy)]
pub struct Registration {
    pub outcome: StepOutcome,
    pub flipbook_id: Option<u64>,
}

/// The one pipeline step that needs a browser: make sure a flipbook with
/// the given title exists, creating it through the admin UI if not.
#[async_trait]
pub trait Registrar: Send + Sync {
    async fn register(&self, title: &str, pdf_url: &str) -> anyhow::Result<Registration>;
}

/// One authenticated pass over the admin UI. Implementations must tolerate
/// `close` being the only call that always happens.
#[async_trait]
pub trait AdminSession: Send {
    async fn login(&mut self, username: &str, password: &str) -> anyhow::Result<()>;
    async fn flipbook_exists(&mut self, title: &str) -> anyhow::Result<bool>;
    /// Create a flipbook for the PDF and return the remote-assigned id.
    async fn create_flipbook(&mut self, pdf_url: &str) -> anyhow::Result<u64>;
    async fn close(&mut self);
}

#[async_trait]
pub trait AdminBrowser: Send + Sync {
    async fn launch(&self) -> anyhow::Result<Box<dyn AdminSession>>;
}

/// Drives the admin UI state machine with whole-attempt restarts: any
/// failure after launch tears the session down and starts over from a fresh
/// browser, because half-driven UI state cannot be trusted to resume.
pub struct FlipbookRegistrar {
    browser: Box<dyn AdminBrowser>,
    username: String,
    password: String,
    attempts: u32,
}

impl FlipbookRegistrar {
    pub fn new(
        browser: Box<dyn AdminBrowser>,
        username: impl Into<String>,
        password: impl Into<String>,
        attempts: u32,
    ) -> Self {
        Self {
            browser,
            username: username.into(),
            password: password.into(),
            attempts: attempts.max(1),
        }
    }
}

#[async_trait]
impl Registrar for FlipbookRegistrar {
    async fn register(&self, title: &str, pdf_url: &str) -> anyhow::Result<Registration> {
        let mut last_err = anyhow::anyhow!("no attempt was made");

        for attempt in 1..=self.attempts {
            let mut session = match self.browser.launch().await {
                Ok(session) => session,
                Err(err) => {
                    tracing::warn!(attempt, err = format!("{err:#}"), "browser launch failed");
                    last_err = err;
                    continue;
                }
            };

            let result = run_attempt(
                session.as_mut(),
                &self.username,
                &self.password,
                title,
                pdf_url,
            )
            .await;
            session.close().await;

            match result {
                Ok(registration) => return Ok(registration),
                Err(err) => {
                    tracing::warn!(attempt, err = format!("{err:#}"), "registration attempt failed");
                    last_err = err;
                }
            }
        }

        Err(last_err.context(format!(
            "flipbook registration failed after {} attempts",
            self.attempts
        )))
    }
}

async fn run_attempt(
    session: &mut dyn AdminSession,
    username: &str,
    password: &str,
    title: &str,
    pdf_url: &str,
) -> anyhow::Result<Registration> {
    session.login(username, password).await.context("admin login")?;

    if session
        .flipbook_exists(title)
        .await
        .context("scan flipbook list")?
    {
        tracing::info!(title, "flipbook already exists; skipping creation");
        return Ok(Registration {
            outcome: StepOutcome::AlreadyExists,
            flipbook_id: None,
        });
    }

    let flipbook_id = session
        .create_flipbook(pdf_url)
        .await
        .context("create flipbook")?;
    tracing::info!(title, flipbook_id, "flipbook created");

    Ok(Registration {
        outcome: StepOutcome::Performed,
        flipbook_id: Some(flipbook_id),
    })
}

/// Production driver: a throwaway chromium per launch, one page session.
pub struct CdpBrowser {
    base_url: String,
    config: BrowserConfig,
}

impl CdpBrowser {
    pub fn new(base_url: impl Into<String>, config: BrowserConfig) -> Self {
        Self {
            base_url: base_url.into(),
            config,
        }
    }
}

#[async_trait]
impl AdminBrowser for CdpBrowser {
    async fn launch(&self) -> anyhow::Result<Box<dyn AdminSession>> {
        let mut chrome = ChromeProcess::launch(&self.config)
            .await
            .context("launch chromium")?;

        let conn = match Connection::connect(chrome.endpoint()).await {
            Ok(conn) => conn,
            Err(err) => {
                chrome.kill().await;
                return Err(anyhow::Error::new(err).context("connect devtools"));
            }
        };

        let page = match conn.open_page().await {
            Ok(page) => page,
            Err(err) => {
                conn.close().await;
                chrome.kill().await;
                return Err(anyhow::Error::new(err).context("open admin page"));
            }
        };

        Ok(Box::new(CdpAdminSession {
            base_url: self.base_url.clone(),
            chrome,
            conn,
            page,
        }))
    }
}

struct CdpAdminSession {
    base_url: String,
    chrome: ChromeProcess,
    conn: Connection,
    page: PageSession,
}

#[async_trait]
impl AdminSession for CdpAdminSession {
    async fn login(&mut self, username: &str, password: &str) -> anyhow::Result<()> {
        self.page
            .navigate(&format!("{}/wp-login.php", self.base_url))
            .await?;
        tokio::time::sleep(WARM_UP).await;

        self.page.type_into("#user_login", username).await?;
        self.page.type_into("#user_pass", password).await?;
        self.page.click("#wp-submit").await?;
        self.page.wait_for_navigation(NAV_TIMEOUT).await?;

        tracing::debug!("logged in to the admin surface");
        Ok(())
    }

    async fn flipbook_exists(&mut self, title: &str) -> anyhow::Result<bool> {
        self.page
            .navigate(&format!("{}{LIST_PATH}", self.base_url))
            .await?;

        // The list UI is the only place flipbooks can be enumerated; there
        // is no API for it. Row text is matched by title substring.
        let probe = format!(
            "Array.from(document.querySelectorAll('#the-list tr'))\
             .some((row) => row.textContent.includes({}))",
            js_string(title)
        );
        Ok(self.page.evaluate(&probe).await? == Value::Bool(true))
    }

    async fn create_flipbook(&mut self, pdf_url: &str) -> anyhow::Result<u64> {
        self.page
            .navigate(&format!("{}{CREATE_PATH}", self.base_url))
            .await?;

        // The remote system assigns the id; it is only visible as the
        // prefilled value of the title-wrapper input.
        let raw_title = self.page.input_value("#titlewrap input").await?;
        tokio::time::sleep(FORM_SETTLE).await;

        let digits: String = raw_title.chars().filter(char::is_ascii_digit).collect();
        if digits.is_empty() {
            anyhow::bail!("creation form exposed no flipbook id (title input was {raw_title:?})");
        }
        let flipbook_id = digits.parse::<u64>().context("parse flipbook id")?;

        self.page
            .type_into(r#"input[name="pdfUrl"]"#, pdf_url)
            .await?;
        tokio::time::sleep(FORM_SETTLE).await;

        self.page
            .click(r#"input[name="btbsubmit"][value="Publish"]"#)
            .await?;
        self.page
            .wait_for_selector(".notice-info", CONFIRM_TIMEOUT)
            .await?;

        Ok(flipbook_id)
    }

    async fn close(&mut self) {
        self.conn.close().await;
        self.chrome.kill().await;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use super::*;

    enum Plan {
        LaunchError,
        LoginError,
        Exists,
        Created(u64),
        CreateError,
    }

    struct FakeBrowser {
        plans: Mutex<VecDeque<Plan>>,
        launches: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
    }

    struct FakeSession {
        plan: Plan,
        closes: Arc<AtomicUsize>,
        closed: bool,
    }

    #[async_trait]
    impl AdminBrowser for FakeBrowser {
        async fn launch(&self) -> anyhow::Result<Box<dyn AdminSession>> {
            let plan = self
                .plans
                .lock()
                .pop_front()
                .unwrap_or(Plan::CreateError);
            if matches!(plan, Plan::LaunchError) {
                anyhow::bail!("browser refused to start");
            }
            self.launches.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeSession {
                plan,
                closes: Arc::clone(&self.closes),
                closed: false,
            }))
        }
    }

    #[async_trait]
    impl AdminSession for FakeSession {
        async fn login(&mut self, _username: &str, _password: &str) -> anyhow::Result<()> {
            match self.plan {
                Plan::LoginError => anyhow::bail!("login form never settled"),
                _ => Ok(()),
            }
        }

        async fn flipbook_exists(&mut self, _title: &str) -> anyhow::Result<bool> {
            Ok(matches!(self.plan, Plan::Exists))
        }

        async fn create_flipbook(&mut self, _pdf_url: &str) -> anyhow::Result<u64> {
            match self.plan {
                Plan::Created(id) => Ok(id),
                _ => anyhow::bail!("confirmation notice never appeared"),
            }
        }

        async fn close(&mut self) {
            assert!(!self.closed, "session closed twice");
            self.closed = true;
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn registrar(plans: Vec<Plan>, attempts: u32) -> (FlipbookRegistrar, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let launches = Arc::new(AtomicUsize::new(0));
        let closes = Arc::new(AtomicUsize::new(0));
        let browser = FakeBrowser {
            plans: Mutex::new(plans.into()),
            launches: Arc::clone(&launches),
            closes: Arc::clone(&closes),
        };
        let registrar = FlipbookRegistrar::new(Box::new(browser), "svc", "secret", attempts);
        (registrar, launches, closes)
    }

    #[tokio::test]
    async fn budget_counts_total_attempts() {
        // Two transient failures, then a would-be success: a budget of two
        // attempts must exhaust before reaching it.
        let (registrar, launches, closes) =
            registrar(vec![Plan::LoginError, Plan::LoginError, Plan::Created(67)], 2);

        let err = registrar
            .register("Issue 148", "https://cdn.example.com/148.pdf")
            .await
            .expect_err("budget should exhaust");
        assert!(format!("{err:#}").contains("after 2 attempts"));
        assert_eq!(launches.load(Ordering::SeqCst), 2);
        assert_eq!(closes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn third_attempt_succeeds_within_budget_of_three() {
        let (registrar, launches, closes) =
            registrar(vec![Plan::LoginError, Plan::LoginError, Plan::Created(67)], 3);

        let registration = registrar
            .register("Issue 148", "https://cdn.example.com/148.pdf")
            .await
            .expect("third attempt succeeds");
        assert_eq!(registration.outcome, StepOutcome::Performed);
        assert_eq!(registration.flipbook_id, Some(67));
        assert_eq!(launches.load(Ordering::SeqCst), 3);
        assert_eq!(closes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn existing_title_skips_creation_and_closes_once() {
        let (registrar, launches, closes) = registrar(vec![Plan::Exists], 3);

        let registration = registrar
            .register("Issue 147", "https://cdn.example.com/147.pdf")
            .await
            .expect("skip is a success");
        assert_eq!(registration.outcome, StepOutcome::AlreadyExists);
        assert_eq!(registration.flipbook_id, None);
        assert_eq!(launches.load(Ordering::SeqCst), 1);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn launch_failure_consumes_an_attempt_with_nothing_to_close() {
        let (registrar, launches, closes) =
            registrar(vec![Plan::LaunchError, Plan::Created(5)], 2);

        let registration = registrar
            .register("Issue 148", "https://cdn.example.com/148.pdf")
            .await
            .expect("second attempt succeeds");
        assert_eq!(registration.flipbook_id, Some(5));
        // Only the successful launch acquired a session, and only it closes.
        assert_eq!(launches.load(Ordering::SeqCst), 1);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_budget_surfaces_the_failing_step() {
        let (registrar, _launches, closes) = registrar(vec![Plan::CreateError], 1);

        let err = registrar
            .register("Issue 148", "https://cdn.example.com/148.pdf")
            .await
            .expect_err("single attempt fails");
        assert!(format!("{err:#}").contains("create flipbook"));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
