//! A scripted stand-in for the registry site. It keeps a small view state
//! machine, renders plausible markup for each view, answers the injected
//! scripts by identity and records every call made against it.

use std::{
    path::{Path, PathBuf},
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::{json, Value};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
    time::Instant,
};

use crate::services::{scripts, Browser, BrowserError};

pub const SITE: &str = "https://ccfs.sos.wa.gov/#/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Blank,
    Search,
    Results,
    Detail,
    Filing,
    Modal,
}

#[derive(Debug, Clone)]
pub struct FakeEntity {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct FakeFiling {
    pub number: String,
    pub kind: String,
}

struct Site {
    view: View,
    history: Vec<View>,
    pages: Vec<Vec<FakeEntity>>,
    page: usize,
    detail: Option<FakeEntity>,
    challenge: u32,
    search_failures: u32,
    empty_reads: u32,
    placeholder_reads: u32,
    scope_call: bool,
    detail_renders: bool,
    model: bool,
    hide_next: bool,
    hide_back: bool,
    bare_info_tab: bool,
    name_binds: bool,
    turn_delay: Option<Duration>,
    pending_turn: Option<(Instant, usize)>,
    frozen_pager: bool,
    filings: Vec<FakeFiling>,
    document: Option<Vec<u8>>,
    downloads: u32,
    download_dir: Option<PathBuf>,
    page_source_fails: bool,
    session_lost: bool,
    typed: String,
    calls: Vec<String>,
}

pub struct FakeRegistry {
    site: Mutex<Site>,
}

impl Site {
    fn navigate(&mut self, to: View) {
        self.history.push(self.view);
        self.view = to;
    }

    /// Lands a delayed page turn once its time has come.
    fn settle(&mut self) {
        if let Some((at, target)) = self.pending_turn {
            if Instant::now() >= at {
                self.page = target;
                self.pending_turn = None;
            }
        }
    }

    fn turn_to(&mut self, target: usize) {
        if self.frozen_pager {
            return;
        }
        if matches!(self.pending_turn, Some((_, queued)) if queued == target) {
            return;
        }
        match self.turn_delay {
            Some(delay) => self.pending_turn = Some((Instant::now() + delay, target)),
            None => self.page = target,
        }
    }

    fn current_rows(&self) -> &[FakeEntity] {
        self.pages
            .get(self.page.saturating_sub(1))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn url(&self) -> String {
        let route = match self.view {
            View::Blank => return "about:blank".to_string(),
            View::Search => "AdvancedSearch",
            View::Results => "BusinessSearch",
            View::Detail | View::Filing | View::Modal => "BusinessInformation",
        };
        format!("{}{}", SITE, route)
    }

    fn pager_text(&self) -> String {
        let total: usize = self.pages.iter().map(Vec::len).sum();
        if total == 0 {
            return String::new();
        }
        let before: usize = self.pages[..self.page - 1].iter().map(Vec::len).sum();
        let on_page = self.current_rows().len();
        format!(
            "<span>Page {} of {}, records {} to {} of {}</span>",
            self.page,
            self.pages.len(),
            before + 1,
            before + on_page,
            total
        )
    }

    fn results_html(&self, empty: bool, placeholder: bool) -> String {
        let rows: String = if empty {
            String::new()
        } else {
            self.current_rows()
                .iter()
                .map(|e| {
                    format!(
                        r#"<tr ng-repeat="business in businessList"><td><a class="btn-link" ng-click="showBusineInfo({}, business)">{}</a></td><td>UBI-{}</td></tr>"#,
                        e.id, e.name, e.id
                    )
                })
                .collect()
        };
        let pager = if placeholder {
            "<span>Page 0 of 0, records 0 to 0 of 0</span>".to_string()
        } else {
            self.pager_text()
        };
        let mut anchors = String::new();
        if !self.hide_next && self.page < self.pages.len() {
            anchors.push_str(r#"<li><a ng-click="search(pagePlus(1))">›</a></li>"#);
        }
        for n in 1..=self.pages.len() {
            anchors.push_str(&format!(r#"<li><a ng-click="search({})">{}</a></li>"#, n, n));
        }

        format!(
            r#"<div class="div_header">Business Search Results</div>
<button id="btnReturnToSearch">Return to Search</button>
<table class="table table-striped table-responsive"><thead><tr><th>Business Name</th><th>UBI</th></tr></thead>
<tbody ng-show="businessList.length  &gt; 0">{}</tbody></table>
{}<ul class="pagination pagination-sm">{}</ul>"#,
            rows, pager, anchors
        )
    }

    fn detail_html(&self) -> String {
        let name = self.detail.as_ref().map(|e| e.name.as_str()).unwrap_or("");
        let back = if self.hide_back {
            ""
        } else {
            r#"<button class="btn-back" ng-click="navBusinessSearch()">Back</button>"#
        };
        format!(
            r#"<h2>Business Information</h2>
<div id="divBusinessInformation">
  <div class="row">
    <div class="col-md-3"><span>Business Name:</span></div>
    <div class="col-md-3"><strong data-ng-bind="businessInfo.BusinessName">{}</strong></div>
    <div class="col-md-3"><span>Business Status:</span></div>
    <div class="col-md-3"><strong>ACTIVE</strong></div>
  </div>
</div>
{}<input type="button" id="btnFilingHistory" value="Filing History">"#,
            name, back
        )
    }

    fn filing_html(&self) -> String {
        let rows: String = self
            .filings
            .iter()
            .map(|f| {
                format!(
                    r#"<tr><td>{}</td><td>01/01/2024 10:00 AM</td><td>01/01/2024</td><td>{}</td><td><a ng-click="viewDocuments()"><i class="fa fa-file-text-o"></i></a></td></tr>"#,
                    f.number, f.kind
                )
            })
            .collect();
        let info = if self.bare_info_tab {
            r#"<ul class="nav nav-tabs"><li><a href="">BUSINESS INFORMATION</a></li></ul>"#
        } else {
            r#"<button ng-click="navBusinessInformation()">Business Information</button>"#
        };
        let back = if self.hide_back {
            ""
        } else {
            r#"<button class="btn-back" ng-click="navBusinessSearch()">Back</button>"#
        };
        format!(
            r#"{}{}
<table class="table table-striped"><thead><tr><th>Filing Number</th><th>Filing Date Time</th><th>Effective Date</th><th>Filing Type</th><th>Action</th></tr></thead>
<tbody>{}</tbody></table>"#,
            info, back, rows
        )
    }

    fn modal_html(&self) -> String {
        format!(
            r#"{}<div class="modal-backdrop"></div>
<div class="modal-dialog"><button class="close" data-dismiss="modal">x</button>
<table><tbody><tr><td>ANNUAL REPORT - FULFILLED</td><td><i class="fa fa-file-text-o"></i></td></tr></tbody></table></div>"#,
            self.filing_html()
        )
    }

    fn render(&self, challenge: bool, empty: bool, placeholder: bool) -> String {
        let body = match self.view {
            View::Blank => String::new(),
            View::Search => r#"<input id="txtOrgname"><select id="ddlSelection"><option value="3">Starts With</option></select><button id="btnSearch">Search</button>"#.to_string(),
            View::Results => self.results_html(empty, placeholder),
            View::Detail => self.detail_html(),
            View::Filing => self.filing_html(),
            View::Modal => self.modal_html(),
        };
        if challenge {
            format!(
                r#"<html><head><title>Just a moment...</title></head><body><div class="cf-turnstile"></div>{}</body></html>"#,
                body
            )
        } else {
            format!("<html><head><title>CCFS</title></head><body>{}</body></html>", body)
        }
    }

    fn peek(&self) -> String {
        self.render(self.challenge > 0, false, false)
    }

    fn is_present(&self, selector: &str) -> bool {
        let Ok(parsed) = Selector::parse(selector) else {
            return false;
        };
        let document = Html::parse_document(&self.peek());
        let found = document.select(&parsed).next().is_some();
        found
    }

    fn script_name(script: &str) -> &'static str {
        let known = [
            (scripts::NAVIGATOR_USER_AGENT, "user_agent"),
            (scripts::OPEN_DETAIL, "open_detail"),
            (scripts::CLICK_RESULT_ROW, "click_row"),
            (scripts::CLICK_BUSINESS_INFORMATION, "info_label"),
            (scripts::DETAIL_NAME, "detail_name"),
            (scripts::NEXT_PAGE, "next_page"),
            (scripts::GOTO_PAGE_NUMBER, "goto_page"),
            (scripts::OPEN_DOCUMENT_MODAL, "open_modal"),
            (scripts::SELECT_DOCUMENT, "select_document"),
            (scripts::CLOSE_MODAL, "close_modal"),
            (scripts::CLEAR_MODAL_BACKDROP, "clear_backdrop"),
            (scripts::CLEAR_INPUT, "clear_input"),
            (scripts::MODEL_BUSINESS_LIST, "model_list"),
        ];
        known
            .iter()
            .find(|(body, _)| *body == script)
            .map(|(_, name)| *name)
            .unwrap_or("unknown")
    }

    fn open_entity(&mut self, entity: Option<FakeEntity>) {
        if let Some(entity) = entity {
            if self.detail_renders {
                self.detail = Some(entity);
                self.navigate(View::Detail);
            }
        }
    }

    fn run_script(&mut self, name: &str, args: &[Value]) -> Value {
        let arg_str = args
            .first()
            .map(|a| a.as_str().map(str::to_string).unwrap_or_else(|| a.to_string()))
            .unwrap_or_default();
        let arg_index = args.first().and_then(Value::as_u64).unwrap_or(0) as usize;

        match name {
            "user_agent" => json!("FakeAgent/1.0"),
            "open_detail" => {
                if self.view != View::Results {
                    return json!("NO_TABLE");
                }
                if !self.scope_call {
                    return json!("NO_FN");
                }
                let entity = self.current_rows().iter().find(|e| e.id == arg_str).cloned();
                self.open_entity(entity);
                json!("OK")
            }
            "click_row" => {
                if self.view != View::Results {
                    return json!(false);
                }
                let entity = self.current_rows().get(arg_index).cloned();
                let found = entity.is_some();
                self.open_entity(entity);
                json!(found)
            }
            "detail_name" => match (self.view, &self.detail) {
                (View::Detail, Some(e)) if self.name_binds => json!(e.name),
                _ => json!(""),
            },
            "info_label" => {
                if self.view == View::Filing {
                    self.navigate(View::Detail);
                    json!(true)
                } else {
                    json!(false)
                }
            }
            "next_page" => {
                if self.view == View::Results && !self.hide_next && self.page < self.pages.len() {
                    self.turn_to(self.page + 1);
                    json!(true)
                } else {
                    json!(false)
                }
            }
            "goto_page" => {
                let target: usize = arg_str.parse().unwrap_or(0);
                if self.view == View::Results && target >= 1 && target <= self.pages.len() {
                    self.turn_to(target);
                    json!(true)
                } else {
                    json!(false)
                }
            }
            "open_modal" => {
                if self.view == View::Filing && arg_index < self.filings.len() {
                    self.view = View::Modal;
                    json!(true)
                } else {
                    json!(false)
                }
            }
            "select_document" => {
                let (Some(bytes), Some(dir), View::Modal) =
                    (&self.document, &self.download_dir, self.view)
                else {
                    return json!(false);
                };
                self.downloads += 1;
                let path = dir.join(format!("Document_{}.pdf", self.downloads));
                std::fs::write(path, bytes).unwrap();
                json!(true)
            }
            "close_modal" => {
                if self.view == View::Modal {
                    self.view = View::Filing;
                    json!(true)
                } else {
                    json!(false)
                }
            }
            "clear_backdrop" => json!(0),
            "clear_input" => {
                self.typed.clear();
                json!(true)
            }
            _ => Value::Null,
        }
    }
}

impl FakeRegistry {
    /// Pages of `(id, name)` results. The session starts on the search form.
    pub fn with_pages(pages: Vec<Vec<(&str, &str)>>) -> Self {
        let pages = pages
            .into_iter()
            .map(|page| {
                page.into_iter()
                    .map(|(id, name)| FakeEntity {
                        id: id.to_string(),
                        name: name.to_string(),
                    })
                    .collect()
            })
            .collect();

        FakeRegistry {
            site: Mutex::new(Site {
                view: View::Search,
                history: vec![],
                pages,
                page: 1,
                detail: None,
                challenge: 0,
                search_failures: 0,
                empty_reads: 0,
                placeholder_reads: 0,
                scope_call: true,
                detail_renders: true,
                model: true,
                hide_next: false,
                hide_back: false,
                bare_info_tab: false,
                name_binds: true,
                turn_delay: None,
                pending_turn: None,
                frozen_pager: false,
                filings: vec![],
                document: None,
                downloads: 0,
                download_dir: None,
                page_source_fails: false,
                session_lost: false,
                typed: String::new(),
                calls: vec![],
            }),
        }
    }

    fn with_site<T>(&self, f: impl FnOnce(&mut Site) -> T) -> T {
        let mut site = self.site.lock().unwrap();
        f(&mut site)
    }

    fn enter(&self, call: String) -> Result<(), BrowserError> {
        self.with_site(|site| {
            site.settle();
            site.calls.push(call);
            if site.session_lost {
                Err(BrowserError::SessionLost("invalid session id".to_string()))
            } else {
                Ok(())
            }
        })
    }

    pub fn set_view(&self, view: View) {
        self.with_site(|site| site.view = view);
    }

    /// Shows a challenge for the next `reads` page-source reads. `u32::MAX` never clears.
    pub fn set_challenge(&self, reads: u32) {
        self.with_site(|site| site.challenge = reads);
    }

    pub fn fail_search_clicks(&self, times: u32) {
        self.with_site(|site| site.search_failures = times);
    }

    /// The grid renders zero rows for the next `reads` page-source reads.
    pub fn empty_results_for(&self, reads: u32) {
        self.with_site(|site| site.empty_reads = reads);
    }

    pub fn placeholder_pager_for(&self, reads: u32) {
        self.with_site(|site| site.placeholder_reads = reads);
    }

    pub fn without_scope_call(&self) {
        self.with_site(|site| site.scope_call = false);
    }

    pub fn without_detail_render(&self) {
        self.with_site(|site| site.detail_renders = false);
    }

    pub fn without_model(&self) {
        self.with_site(|site| site.model = false);
    }

    pub fn hide_next_control(&self) {
        self.with_site(|site| site.hide_next = true);
    }

    pub fn hide_back_button(&self) {
        self.with_site(|site| site.hide_back = true);
    }

    /// The filing tab offers only an unbound "BUSINESS INFORMATION" label.
    pub fn bare_info_tab(&self) {
        self.with_site(|site| site.bare_info_tab = true);
    }

    /// The detail view renders but its name binding stays empty.
    pub fn unbound_name(&self) {
        self.with_site(|site| site.name_binds = false);
    }

    /// Pager controls take `delay` to land their page change.
    pub fn late_page_turn(&self, delay: Duration) {
        self.with_site(|site| site.turn_delay = Some(delay));
    }

    /// Pager controls accept clicks but the page never changes.
    pub fn freeze_pager(&self) {
        self.with_site(|site| site.frozen_pager = true);
    }

    pub fn with_filings(&self, filings: &[(&str, &str)]) {
        self.with_site(|site| {
            site.filings = filings
                .iter()
                .map(|(number, kind)| FakeFiling {
                    number: number.to_string(),
                    kind: kind.to_string(),
                })
                .collect()
        });
    }

    /// Bytes the native download writes into the configured directory.
    pub fn with_document(&self, bytes: Vec<u8>) {
        self.with_site(|site| site.document = Some(bytes));
    }

    pub fn fail_page_source(&self, fail: bool) {
        self.with_site(|site| site.page_source_fails = fail);
    }

    pub fn lose_session(&self) {
        self.with_site(|site| site.session_lost = true);
    }

    pub fn open_detail_for(&self, id: &str, name: &str) {
        self.with_site(|site| {
            site.detail = Some(FakeEntity {
                id: id.to_string(),
                name: name.to_string(),
            });
            site.navigate(View::Detail);
        });
    }

    pub fn view(&self) -> View {
        self.with_site(|site| site.view)
    }

    pub fn page(&self) -> usize {
        self.with_site(|site| site.page)
    }

    pub fn typed(&self) -> String {
        self.with_site(|site| site.typed.clone())
    }

    pub fn calls(&self) -> Vec<String> {
        self.with_site(|site| site.calls.clone())
    }

    pub fn count(&self, call: &str) -> usize {
        self.with_site(|site| site.calls.iter().filter(|c| c.as_str() == call).count())
    }
}

#[async_trait]
impl Browser for FakeRegistry {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        self.enter(format!("goto:{}", url))?;
        self.with_site(|site| {
            let to = if url.contains("AdvancedSearch") {
                View::Search
            } else {
                View::Blank
            };
            site.navigate(to);
        });
        Ok(())
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        self.enter("current_url".to_string())?;
        Ok(self.with_site(|site| site.url()))
    }

    async fn page_source(&self) -> Result<String, BrowserError> {
        self.enter("page_source".to_string())?;
        self.with_site(|site| {
            if site.page_source_fails {
                return Err(BrowserError::Script("page source unavailable".to_string()));
            }
            let challenge = site.challenge > 0;
            if challenge && site.challenge != u32::MAX {
                site.challenge -= 1;
            }
            let results = site.view == View::Results;
            let empty = results && site.empty_reads > 0;
            if empty {
                site.empty_reads -= 1;
            }
            let placeholder = results && site.placeholder_reads > 0;
            if placeholder {
                site.placeholder_reads -= 1;
            }
            Ok(site.render(challenge, empty, placeholder))
        })
    }

    async fn is_present(&self, selector: &str) -> Result<bool, BrowserError> {
        self.enter(format!("is_present:{}", selector))?;
        Ok(self.with_site(|site| site.is_present(selector)))
    }

    async fn is_visible(&self, selector: &str) -> Result<bool, BrowserError> {
        self.enter(format!("is_visible:{}", selector))?;
        Ok(self.with_site(|site| site.is_present(selector)))
    }

    async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        self.enter(format!("click:{}", selector))?;
        self.with_site(|site| {
            if !site.is_present(selector) {
                return Err(BrowserError::NoSuchElement(selector.to_string()));
            }
            match (selector, site.view) {
                ("#btnSearch", View::Search) => {
                    if site.search_failures > 0 {
                        site.search_failures -= 1;
                        return Err(BrowserError::NoSuchElement(selector.to_string()));
                    }
                    site.page = 1;
                    site.navigate(View::Results);
                }
                ("#btnReturnToSearch", View::Results) => site.navigate(View::Search),
                ("button.btn-back", View::Detail | View::Filing) => site.navigate(View::Results),
                ("#btnFilingHistory", View::Detail) => site.navigate(View::Filing),
                (s, View::Filing) if s.contains("BusinessInformation") => {
                    site.navigate(View::Detail)
                }
                _ => {}
            }
            Ok(())
        })
    }

    async fn clear(&self, selector: &str) -> Result<(), BrowserError> {
        self.enter(format!("clear:{}", selector))?;
        self.with_site(|site| {
            if !site.is_present(selector) {
                return Err(BrowserError::NoSuchElement(selector.to_string()));
            }
            site.typed.clear();
            Ok(())
        })
    }

    async fn send_keys(&self, selector: &str, text: &str) -> Result<(), BrowserError> {
        self.enter(format!("send_keys:{}", selector))?;
        self.with_site(|site| {
            if !site.is_present(selector) {
                return Err(BrowserError::NoSuchElement(selector.to_string()));
            }
            site.typed.push_str(text);
            Ok(())
        })
    }

    async fn select_by_value(&self, selector: &str, value: &str) -> Result<(), BrowserError> {
        self.enter(format!("select:{}={}", selector, value))?;
        self.with_site(|site| {
            if site.is_present(selector) {
                Ok(())
            } else {
                Err(BrowserError::NoSuchElement(selector.to_string()))
            }
        })
    }

    async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value, BrowserError> {
        let name = Site::script_name(script);
        self.enter(format!("script:{}", name))?;
        Ok(self.with_site(|site| site.run_script(name, &args)))
    }

    async fn execute_async(
        &self,
        script: &str,
        _args: Vec<Value>,
    ) -> Result<Value, BrowserError> {
        let name = Site::script_name(script);
        self.enter(format!("script:{}", name))?;
        Ok(self.with_site(|site| {
            if name != "model_list" {
                return Value::Null;
            }
            if site.view != View::Results || !site.model {
                return json!(r#"{"ok":false,"error":"scope with businessList not found"}"#);
            }
            let data: Vec<Value> = site
                .current_rows()
                .iter()
                .map(|e| json!({"BusinessID": e.id, "BusinessName": e.name, "UBINumber": format!("UBI-{}", e.id)}))
                .collect();
            json!(json!({"ok": true, "data": data}).to_string())
        }))
    }

    async fn accept_alert(&self) -> Result<bool, BrowserError> {
        self.enter("accept_alert".to_string())?;
        Ok(false)
    }

    async fn history_back(&self) -> Result<(), BrowserError> {
        self.enter("history_back".to_string())?;
        self.with_site(|site| {
            site.view = site.history.pop().unwrap_or(View::Blank);
        });
        Ok(())
    }

    async fn set_download_dir(&self, dir: &Path) -> Result<(), BrowserError> {
        self.enter("set_download_dir".to_string())?;
        self.with_site(|site| site.download_dir = Some(dir.to_path_buf()));
        Ok(())
    }

    async fn cookies(&self) -> Result<Vec<(String, String)>, BrowserError> {
        self.enter("cookies".to_string())?;
        Ok(vec![("ASP.NET_SessionId".to_string(), "fake".to_string())])
    }
}

/// A local endpoint that answers every proxied request with 200.
pub async fn live_proxy() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut buf = vec![0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .await;
        }
    });
    format!("http://{}", address)
}

/// An address nothing listens on.
pub async fn dead_proxy() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", address)
}
