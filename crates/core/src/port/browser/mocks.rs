// Scripted in-memory browser for tests
//
// Pages are static fixtures keyed by URL. A small auth model sits on top:
// URLs under the protected prefix redirect to the login URL until the
// auth cookie is present, and each submit on the login page consumes the
// next scripted `SubmitOutcome`.

use super::*;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Static content served for one URL
#[derive(Debug, Clone, Default)]
pub struct FakePageFixture {
    pub title: String,
    pub body_text: String,
    pub selectors: BTreeSet<String>,
    pub texts: BTreeMap<String, String>,
    pub attributes: BTreeMap<(String, String), String>,
}

impl FakePageFixture {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_body(mut self, text: impl Into<String>) -> Self {
        self.body_text = text.into();
        self
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selectors.insert(selector.into());
        self
    }

    pub fn with_text(mut self, selector: impl Into<String>, text: impl Into<String>) -> Self {
        let selector = selector.into();
        self.selectors.insert(selector.clone());
        self.texts.insert(selector, text.into());
        self
    }

    pub fn with_attribute(
        mut self,
        selector: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        let selector = selector.into();
        self.selectors.insert(selector.clone());
        self.attributes.insert((selector, name.into()), value.into());
        self
    }
}

/// What happens when the login form is submitted
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// Credentials accepted: auth cookie set, page lands on `url`
    Accept { url: String },
    /// Credentials not accepted: page shows the fixture at `url`
    Show { url: String },
}

#[derive(Debug, Clone)]
struct AuthModel {
    login_url: String,
    protected_prefix: String,
    cookie_name: String,
    cookie_domain: String,
}

#[derive(Default)]
struct FakeState {
    fixtures: HashMap<String, FakePageFixture>,
    failing_urls: HashSet<String>,
    panic_urls: HashSet<String>,
    navigation_delay: Duration,
    auth: Option<AuthModel>,
    submit_outcomes: VecDeque<SubmitOutcome>,
    submit_selector: Option<String>,
    submissions: usize,
    cookies: Vec<SessionCookie>,
    storage: HashMap<String, BTreeMap<String, String>>,
    navigations: Vec<String>,
    scripts: Vec<String>,
}

impl FakeState {
    fn logged_in(&self) -> bool {
        match &self.auth {
            Some(auth) => self.cookies.iter().any(|c| c.name == auth.cookie_name),
            None => false,
        }
    }

    /// Where a navigation to `url` actually lands
    fn resolve(&self, url: &str) -> String {
        if let Some(auth) = &self.auth {
            if url.starts_with(&auth.protected_prefix) && !self.logged_in() {
                return auth.login_url.clone();
            }
        }
        url.to_string()
    }

    fn submit(&mut self) -> Option<String> {
        self.submissions += 1;
        match self.submit_outcomes.pop_front()? {
            SubmitOutcome::Accept { url } => {
                if let Some(auth) = &self.auth {
                    let cookie = SessionCookie::new(
                        auth.cookie_name.clone(),
                        format!("token-{}", self.submissions),
                        auth.cookie_domain.clone(),
                    );
                    self.cookies.retain(|c| c.name != cookie.name);
                    self.cookies.push(cookie);
                }
                Some(url)
            }
            SubmitOutcome::Show { url } => Some(url),
        }
    }
}

/// In-memory browser implementing `BrowserLauncher`
#[derive(Clone, Default)]
pub struct FakeBrowser {
    state: Arc<Mutex<FakeState>>,
    counters: Arc<Counters>,
    fail_launch: Arc<AtomicBool>,
}

#[derive(Default)]
struct Counters {
    contexts_opened: AtomicUsize,
    contexts_closed: AtomicUsize,
    pages_opened: AtomicUsize,
    pages_closed: AtomicUsize,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fixture(&self, url: impl Into<String>, fixture: FakePageFixture) {
        self.state.lock().unwrap().fixtures.insert(url.into(), fixture);
    }

    /// Mutate a fixture in place, e.g. to clear a CAPTCHA after solving
    pub fn update_fixture(&self, url: &str, f: impl FnOnce(&mut FakePageFixture)) {
        let mut state = self.state.lock().unwrap();
        let fixture = state.fixtures.entry(url.to_string()).or_default();
        f(fixture);
    }

    /// Navigations to `url` hang until the caller's timeout elapses
    pub fn fail_url(&self, url: impl Into<String>) {
        self.state.lock().unwrap().failing_urls.insert(url.into());
    }

    /// Navigations to `url` panic
    pub fn panic_on(&self, url: impl Into<String>) {
        self.state.lock().unwrap().panic_urls.insert(url.into());
    }

    pub fn set_navigation_delay(&self, delay: Duration) {
        self.state.lock().unwrap().navigation_delay = delay;
    }

    pub fn set_launch_failure(&self, fail: bool) {
        self.fail_launch.store(fail, Ordering::SeqCst);
    }

    /// Enable the redirect-to-login model
    pub fn require_login(
        &self,
        login_url: impl Into<String>,
        protected_prefix: impl Into<String>,
        cookie_name: impl Into<String>,
    ) {
        let login_url = login_url.into();
        let cookie_domain = url::Url::parse(&login_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default();
        self.state.lock().unwrap().auth = Some(AuthModel {
            login_url,
            protected_prefix: protected_prefix.into(),
            cookie_name: cookie_name.into(),
            cookie_domain,
        });
    }

    /// Clicking this selector (or pressing Enter) submits the login form
    pub fn set_submit_selector(&self, selector: impl Into<String>) {
        self.state.lock().unwrap().submit_selector = Some(selector.into());
    }

    pub fn push_submit_outcome(&self, outcome: SubmitOutcome) {
        self.state.lock().unwrap().submit_outcomes.push_back(outcome);
    }

    pub fn submissions(&self) -> usize {
        self.state.lock().unwrap().submissions
    }

    pub fn is_logged_in(&self) -> bool {
        self.state.lock().unwrap().logged_in()
    }

    pub fn cookies(&self) -> Vec<SessionCookie> {
        self.state.lock().unwrap().cookies.clone()
    }

    /// Requested URLs, in order
    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().unwrap().navigations.clone()
    }

    pub fn navigation_count(&self, url: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .navigations
            .iter()
            .filter(|u| *u == url)
            .count()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.state.lock().unwrap().scripts.clone()
    }

    pub fn contexts_opened(&self) -> usize {
        self.counters.contexts_opened.load(Ordering::SeqCst)
    }

    pub fn contexts_closed(&self) -> usize {
        self.counters.contexts_closed.load(Ordering::SeqCst)
    }

    pub fn pages_opened(&self) -> usize {
        self.counters.pages_opened.load(Ordering::SeqCst)
    }

    pub fn pages_closed(&self) -> usize {
        self.counters.pages_closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserLauncher for FakeBrowser {
    async fn launch(&self) -> BrowserResult<Arc<dyn BrowserContext>> {
        if self.fail_launch.load(Ordering::SeqCst) {
            return Err(BrowserError::LaunchFailed("no browser binary".to_string()));
        }
        self.counters.contexts_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeContext {
            browser: self.clone(),
            pages: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }))
    }
}

struct FakeContext {
    browser: FakeBrowser,
    pages: Mutex<Vec<Arc<FakePage>>>,
    closed: AtomicBool,
}

#[async_trait]
impl BrowserContext for FakeContext {
    async fn new_page(&self) -> BrowserResult<Arc<dyn BrowserPage>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrowserError::Closed);
        }
        self.browser.counters.pages_opened.fetch_add(1, Ordering::SeqCst);
        let page = Arc::new(FakePage {
            browser: self.browser.clone(),
            url: Mutex::new("about:blank".to_string()),
            values: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        });
        self.pages.lock().unwrap().push(page.clone());
        Ok(page)
    }

    async fn cookies(&self) -> BrowserResult<Vec<SessionCookie>> {
        Ok(self.browser.cookies())
    }

    async fn add_cookies(&self, cookies: &[SessionCookie]) -> BrowserResult<()> {
        let mut state = self.browser.state.lock().unwrap();
        for cookie in cookies {
            state.cookies.retain(|c| c.name != cookie.name);
            state.cookies.push(cookie.clone());
        }
        Ok(())
    }

    async fn close(&self) -> BrowserResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let pages: Vec<_> = self.pages.lock().unwrap().drain(..).collect();
        for page in pages {
            page.mark_closed();
        }
        self.browser.counters.contexts_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakePage {
    browser: FakeBrowser,
    url: Mutex<String>,
    values: Mutex<HashMap<String, String>>,
    closed: AtomicBool,
}

impl FakePage {
    fn mark_closed(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.browser.counters.pages_closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn ensure_open(&self) -> BrowserResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrowserError::Closed);
        }
        Ok(())
    }

    fn fixture(&self) -> BrowserResult<FakePageFixture> {
        self.ensure_open()?;
        let url = self.url.lock().unwrap().clone();
        Ok(self
            .browser
            .state
            .lock()
            .unwrap()
            .fixtures
            .get(&url)
            .cloned()
            .unwrap_or_default())
    }

    fn require(&self, selector: &str) -> BrowserResult<()> {
        if self.fixture()?.selectors.contains(selector) {
            Ok(())
        } else {
            Err(BrowserError::ElementNotFound(selector.to_string()))
        }
    }

    fn land_on(&self, url: String) {
        self.values.lock().unwrap().clear();
        *self.url.lock().unwrap() = url;
    }

    fn submit_if_form(&self, selector: &str) {
        let landing = {
            let mut state = self.browser.state.lock().unwrap();
            let is_submit = state.submit_selector.as_deref() == Some(selector)
                || state.submit_selector.is_none();
            if !is_submit {
                return;
            }
            state.submit()
        };
        if let Some(url) = landing {
            self.land_on(url);
        }
    }

    fn origin(&self) -> String {
        let url = self.url.lock().unwrap().clone();
        url::Url::parse(&url)
            .map(|u| u.origin().ascii_serialization())
            .unwrap_or(url)
    }
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn goto(&self, url: &str, timeout: Duration) -> BrowserResult<()> {
        self.ensure_open()?;
        let (delay, hangs, panics, landing) = {
            let mut state = self.browser.state.lock().unwrap();
            state.navigations.push(url.to_string());
            (
                state.navigation_delay,
                state.failing_urls.contains(url),
                state.panic_urls.contains(url),
                state.resolve(url),
            )
        };
        if panics {
            panic!("renderer crashed while loading {}", url);
        }
        if hangs {
            tokio::time::sleep(timeout).await;
            return Err(BrowserError::timeout(format!("navigation to {}", url), timeout));
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay.min(timeout)).await;
            if delay > timeout {
                return Err(BrowserError::timeout(format!("navigation to {}", url), timeout));
            }
        }
        self.land_on(landing);
        Ok(())
    }

    async fn current_url(&self) -> BrowserResult<String> {
        self.ensure_open()?;
        Ok(self.url.lock().unwrap().clone())
    }

    async fn title(&self) -> BrowserResult<String> {
        Ok(self.fixture()?.title)
    }

    async fn body_text(&self) -> BrowserResult<String> {
        Ok(self.fixture()?.body_text)
    }

    async fn exists(&self, selector: &str) -> BrowserResult<bool> {
        Ok(self.fixture()?.selectors.contains(selector))
    }

    async fn text_of(&self, selector: &str) -> BrowserResult<Option<String>> {
        let fixture = self.fixture()?;
        if !fixture.selectors.contains(selector) {
            return Ok(None);
        }
        Ok(Some(fixture.texts.get(selector).cloned().unwrap_or_default()))
    }

    async fn attribute(&self, selector: &str, name: &str) -> BrowserResult<Option<String>> {
        let fixture = self.fixture()?;
        Ok(fixture
            .attributes
            .get(&(selector.to_string(), name.to_string()))
            .cloned())
    }

    async fn fill(&self, selector: &str, value: &str) -> BrowserResult<()> {
        self.require(selector)?;
        self.values
            .lock()
            .unwrap()
            .insert(selector.to_string(), value.to_string());
        Ok(())
    }

    async fn input_value(&self, selector: &str) -> BrowserResult<Option<String>> {
        self.require(selector)?;
        Ok(Some(
            self.values
                .lock()
                .unwrap()
                .get(selector)
                .cloned()
                .unwrap_or_default(),
        ))
    }

    async fn click(&self, selector: &str) -> BrowserResult<()> {
        self.require(selector)?;
        self.submit_if_form(selector);
        Ok(())
    }

    async fn press_enter(&self, selector: &str) -> BrowserResult<()> {
        self.require(selector)?;
        let submit = self.browser.state.lock().unwrap().submit_selector.clone();
        match submit {
            Some(submit) => self.submit_if_form(&submit),
            None => self.submit_if_form(selector),
        }
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> BrowserResult<serde_json::Value> {
        self.ensure_open()?;
        self.browser
            .state
            .lock()
            .unwrap()
            .scripts
            .push(script.to_string());
        Ok(serde_json::Value::Null)
    }

    async fn local_storage(&self) -> BrowserResult<OriginStorage> {
        self.ensure_open()?;
        let origin = self.origin();
        let entries = self
            .browser
            .state
            .lock()
            .unwrap()
            .storage
            .get(&origin)
            .cloned()
            .unwrap_or_default();
        Ok(OriginStorage { origin, entries })
    }

    async fn set_local_storage(&self, storage: &OriginStorage) -> BrowserResult<()> {
        self.ensure_open()?;
        self.browser
            .state
            .lock()
            .unwrap()
            .storage
            .insert(storage.origin.clone(), storage.entries.clone());
        Ok(())
    }

    async fn close(&self) -> BrowserResult<()> {
        self.mark_closed();
        Ok(())
    }
}
