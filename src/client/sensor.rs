//! The sensor: identity cookies, page lifecycle and event assembly.

use super::callbacks::CallbackRegistry;
use super::config::ClientConfig;
use super::environment::{EnvironmentProbe, StaticEnvironment};
use super::links::{watch_links, Document, LinkAction, LinkWatch};
use super::transport::{ClientError, Transport};
use crate::event::request::parse_leading_int;
use crate::event::{EventRequest, EventType};
use crate::identity::{self, ttl_from_hours, CookieJar, USER_TTL_HOURS, VISIT_TTL_HOURS};
use chrono::{DateTime, Local, Utc};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Event identity supplied by the page outside the sensor call.
///
/// Lets a generic page template decide what its automatic events are called.
#[derive(Debug, Clone, Default)]
pub struct InitOverride {
    /// Replaces the name of the next event, then clears
    pub event_name: Option<String>,
    /// Replaces the description of the next event, then clears
    pub event_desc: Option<String>,
    /// Class attached to every event from this page
    pub event_class: Option<String>,
    /// When the page started; load times are measured from here
    pub event_time: Option<DateTime<Utc>>,
}

/// Per-window state: the page's init override and its timing mark.
#[derive(Debug, Default)]
pub struct PageContext {
    init: Mutex<InitOverride>,
}

impl PageContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_init(init: InitOverride) -> Self {
        Self {
            init: Mutex::new(init),
        }
    }

    /// Name and describe the next event sent from this page.
    pub fn set_override(&self, name: impl Into<String>, desc: Option<String>) {
        let mut init = self.lock();
        init.event_name = Some(name.into());
        init.event_desc = desc;
    }

    pub fn set_class(&self, class: impl Into<String>) {
        self.lock().event_class = Some(class.into());
    }

    /// Mark the moment the page started loading.
    pub fn mark_start(&self, at: DateTime<Utc>) {
        self.lock().event_time = Some(at);
    }

    pub fn snapshot(&self) -> InitOverride {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, InitOverride> {
        self.init.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Form fields a page can embed to tie a submission to the visitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormFields {
    pub site_id: String,
    pub visit_id: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Default)]
struct PageState {
    url: String,
    referrer: String,
    campaign: String,
}

/// The sensor for one page.
///
/// Built with its collaborators injected: the cookie jar identity lives in,
/// the transport events leave through, the callback registry acknowledgments
/// are dispatched to, and the probe for browser details.
pub struct SensorClient {
    config: ClientConfig,
    jar: Arc<dyn CookieJar>,
    transport: Arc<dyn Transport>,
    callbacks: Arc<CallbackRegistry>,
    probe: Arc<dyn EnvironmentProbe>,
    page: Arc<PageContext>,
    state: Mutex<PageState>,
    error: Mutex<String>,
}

impl SensorClient {
    pub fn new(
        config: ClientConfig,
        jar: Arc<dyn CookieJar>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            config,
            jar,
            transport,
            callbacks: Arc::new(CallbackRegistry::new()),
            probe: Arc::new(StaticEnvironment::default()),
            page: Arc::new(PageContext::new()),
            state: Mutex::new(PageState::default()),
            error: Mutex::new(String::new()),
        }
    }

    pub fn with_callbacks(mut self, callbacks: Arc<CallbackRegistry>) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn EnvironmentProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_page(mut self, page: Arc<PageContext>) -> Self {
        self.page = page;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn callbacks(&self) -> &Arc<CallbackRegistry> {
        &self.callbacks
    }

    pub fn page(&self) -> &Arc<PageContext> {
        &self.page
    }

    /// The last configuration error, empty if none occurred.
    pub fn last_error(&self) -> String {
        self.error.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_error(&self, message: impl Into<String>) {
        *self.error.lock().unwrap_or_else(|e| e.into_inner()) = message.into();
    }

    fn state(&self) -> std::sync::MutexGuard<'_, PageState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Read an id cookie (name without prefix), creating it when absent.
    pub fn get_or_create_id(
        &self,
        name: &str,
        ttl_hours: Option<f64>,
        fallback: Option<&str>,
    ) -> String {
        identity::get_or_create_id(
            self.jar.as_ref(),
            &self.config.cookie_name(name),
            ttl_hours.map(ttl_from_hours),
            fallback,
        )
    }

    /// Whether the next event starts a visit for the configured site.
    pub fn is_new_visit(&self) -> bool {
        match &self.config.site {
            Some(site) => identity::is_new_visit(
                self.jar.as_ref(),
                &self.config.cookie_name(&visit_cookie(&site.site)),
            ),
            None => true,
        }
    }

    /// The campaign in `url` (`campaign=...`), or the one remembered from
    /// earlier in the session.
    pub fn campaign(&self, url: &str) -> String {
        let cookie = self.config.cookie_name("campaign");
        match campaign_from_url(url) {
            Some(campaign) => {
                self.jar.set(&cookie, &campaign, None);
                campaign
            }
            None => self.jar.get(&cookie).unwrap_or_default(),
        }
    }

    /// Record an event from the sensor's own page.
    pub fn record_event(
        &self,
        event_type: EventType,
        name: &str,
        desc: Option<&str>,
    ) -> Result<EventRequest, ClientError> {
        let page = self.page.clone();
        self.record_event_in(&page, event_type, name, desc)
    }

    /// Record an event on behalf of a specific window.
    ///
    /// Returns the request handed to the transport.
    pub fn record_event_in(
        &self,
        page: &PageContext,
        event_type: EventType,
        name: &str,
        desc: Option<&str>,
    ) -> Result<EventRequest, ClientError> {
        let Some(site) = self.config.site.clone() else {
            self.set_error("Sensor site id not set");
            return Err(ClientError::SiteNotConfigured);
        };

        let now = Utc::now();
        let (name, desc, class, load_time_ms) = {
            let mut init = page.lock();
            let (name, desc) = match init.event_name.take().filter(|n| !n.is_empty()) {
                Some(name) => (name, init.event_desc.take().unwrap_or_default()),
                None => (name.to_string(), desc.unwrap_or_default().to_string()),
            };
            let load_time_ms = init
                .event_time
                .map(|start| (now - start).num_milliseconds())
                .unwrap_or(0);
            // the next event measures from this one
            init.event_time = Some(now);
            (
                name,
                desc,
                init.event_class.clone().unwrap_or_default(),
                load_time_ms,
            )
        };

        // must be read before the visit cookie is refreshed below
        let new_visit = self.is_new_visit();
        let visit_id = self.get_or_create_id(&visit_cookie(&site.site), Some(VISIT_TTL_HOURS), None);
        let user_id = self.get_or_create_id(
            &format!("site{}_user_id", site.site),
            Some(USER_TTL_HOURS),
            Some(&visit_id),
        );

        let refer_cookie = self.config.cookie_name("refer_id");
        let refer_id = self
            .jar
            .get(&refer_cookie)
            .map(|v| parse_leading_int(&v))
            .unwrap_or(0);
        if event_type == EventType::Page {
            self.jar.remove(&refer_cookie);
        }

        let (campaign, referrer) = {
            let state = self.state();
            (state.campaign.clone(), state.referrer.clone())
        };

        let mut request = EventRequest {
            site: Some(site),
            event_type: Some(event_type),
            name,
            desc,
            class,
            load_time_ms,
            visit_id: Some(visit_id),
            user_id: Some(user_id),
            campaign,
            referrer,
            refer_id,
            new_visit,
            ..Default::default()
        };

        if new_visit {
            request.resolution = self.probe.screen_resolution();
            request.color_bits = self.probe.color_depth();
            request.java = Some(self.probe.java_version());
            request.flash = Some(self.flash_version());
            request.javascript = Some("yes".to_string());
            request.clock_time = Local::now().format("%H:%M:%S").to_string();
        }

        let url = self.config.event_url(&request.to_query_string());
        debug!("Sending {} event", event_type);

        let callbacks = self.callbacks.clone();
        self.transport.send(
            url,
            Box::new(move |ack| {
                callbacks.dispatch(&ack);
            }),
        );

        Ok(request)
    }

    /// Flash version, probed once and then remembered in a cookie.
    fn flash_version(&self) -> String {
        let cookie = self.config.cookie_name("flash_version");
        if let Some(flash) = self.jar.get(&cookie) {
            return flash;
        }
        let flash = self.probe.flash_version();
        self.jar.set(&cookie, &flash, None);
        flash
    }

    /// Page finished loading: send the `page` event and instrument links.
    ///
    /// Links are instrumented even when the event cannot be sent.
    pub fn on_page_load(&self, document: &Document) -> LinkWatch {
        let campaign = self.campaign(&document.url);
        {
            let mut state = self.state();
            state.url = document.url.clone();
            state.referrer = document.referrer.clone();
            state.campaign = campaign;
        }

        if let Err(e) = self.record_event(EventType::Page, &document.url, Some(&document.title)) {
            debug!("Page event not sent: {}", e);
        }
        self.instrument_links(document)
    }

    /// Page is going away: send the `exit` event.
    pub fn on_page_unload(&self) {
        let url = self.state().url.clone();
        if let Err(e) = self.record_event(EventType::Exit, &url, None) {
            debug!("Exit event not sent: {}", e);
        }
    }

    /// Decide what each link on the page does when pressed.
    pub fn instrument_links(&self, document: &Document) -> LinkWatch {
        watch_links(document, &self.config.download_extensions)
    }

    /// A link was pressed: send a `file` event for downloads, otherwise
    /// remember its position for the next page.
    pub fn on_link_mousedown(&self, watch: &LinkWatch, index: usize) -> Result<(), ClientError> {
        match watch.action(index) {
            Some(LinkAction::Download { href, text }) => {
                self.record_event(EventType::File, href, Some(text))?;
            }
            Some(LinkAction::Attribute { refer_id }) => {
                self.jar.set(
                    &self.config.cookie_name("refer_id"),
                    &refer_id.to_string(),
                    None,
                );
            }
            Some(LinkAction::Untouched) | None => {}
        }
        Ok(())
    }

    /// Send custom data as a `user` event named `key=[value],...`.
    pub fn send_data(&self, data: &[(&str, &str)]) -> Result<EventRequest, ClientError> {
        let name: String = data
            .iter()
            .map(|(key, value)| format!("{key}=[{value}],"))
            .collect();
        self.record_event(EventType::User, &name, None)
    }

    /// Site and current identity for embedding in a form.
    pub fn form_fields(&self) -> Result<FormFields, ClientError> {
        let Some(site) = &self.config.site else {
            self.set_error("Sensor site id not set");
            return Err(ClientError::SiteNotConfigured);
        };
        Ok(FormFields {
            site_id: site.site.clone(),
            visit_id: self
                .jar
                .get(&self.config.cookie_name(&visit_cookie(&site.site))),
            user_id: self
                .jar
                .get(&self.config.cookie_name(&format!("site{}_user_id", site.site))),
        })
    }
}

fn visit_cookie(site: &str) -> String {
    format!("site{site}_visit_id")
}

fn campaign_from_url(url: &str) -> Option<String> {
    let start = url.find("campaign=")? + "campaign=".len();
    let value: String = url[start..]
        .chars()
        .take_while(|c| *c != '&' && *c != '#')
        .collect();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
