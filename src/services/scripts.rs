//! Scripts injected into the registry SPA. Each one is read-only or performs
//! exactly one UI action.

pub const NAVIGATOR_USER_AGENT: &str = "return navigator.userAgent;";

/// Async: resolves the Angular scope owning `businessList` and reports
/// `{ok, data}` or `{ok: false, error}` as a JSON string.
pub const MODEL_BUSINESS_LIST: &str = r#"
var callback = arguments[arguments.length - 1];
try {
    if (typeof angular === "undefined") {
        callback(JSON.stringify({ ok: false, error: "angular global not found" }));
        return;
    }
    var el = document.querySelector("tbody[ng-show*='businessList']");
    if (!el) {
        callback(JSON.stringify({ ok: false, error: "businessList body not found" }));
        return;
    }
    var found = null;
    for (var i = 0; i < 6 && el; i++) {
        var scope = angular.element(el).scope() || angular.element(el).isolateScope();
        if (scope && scope.businessList) {
            found = scope;
            break;
        }
        el = el.parentElement;
    }
    if (!found) {
        callback(JSON.stringify({ ok: false, error: "scope with businessList not found" }));
        return;
    }
    var list = [];
    for (var j = 0; j < found.businessList.length; j++) {
        list.push(found.businessList[j]);
    }
    callback(JSON.stringify({ ok: true, data: list }));
} catch (e) {
    callback(JSON.stringify({ ok: false, error: String(e) }));
}
"#;

/// Calls the grid scope's detail handler. Returns `OK`, `NO_TABLE`,
/// `NO_SCOPE`, `NO_FN` or `EX: <message>`.
pub const OPEN_DETAIL: &str = r#"
var bid = arguments[0];
try {
    var tbl = document.querySelector("table.table-striped");
    if (!tbl) return "NO_TABLE";
    var ngEl = angular.element(tbl);
    var scope = ngEl.scope() || ngEl.isolateScope();
    if (!scope) return "NO_SCOPE";
    var fn = scope.showBusineInfo || scope.showBusinessInfo || scope.ShowBusineInfo;
    if (typeof fn !== "function") return "NO_FN";
    fn.call(scope, bid);
    return "OK";
} catch (e) {
    return "EX: " + e;
}
"#;

/// Clicks the link (or first cell) of the 0-based grid row.
pub const CLICK_RESULT_ROW: &str = r#"
var idx = arguments[0];
var tbl = document.querySelector("table.table-striped");
if (!tbl) return false;
var rows = tbl.querySelectorAll("tbody tr");
if (idx < 0 || idx >= rows.length) return false;
var target = rows[idx].querySelector("a") || rows[idx].querySelector("td:nth-child(1)");
if (!target) return false;
target.click();
return true;
"#;

pub const DETAIL_NAME: &str = r##"
var el = document.querySelector(
    "#divBusinessInformation strong[data-ng-bind*='BusinessName'], " +
    "#divBusinessInformation span[data-ng-bind*='BusinessName'], " +
    "#divBusinessInformation h4[data-ng-bind*='BusinessName']");
return el ? (el.textContent || "").trim() : "";
"##;

/// Clicks the first visible element labelled "Business Information", for
/// filing views whose tab carries no Angular binding.
pub const CLICK_BUSINESS_INFORMATION: &str = r#"
var nodes = document.querySelectorAll("a, button, li, span, input[type='button']");
for (var i = 0; i < nodes.length; i++) {
    var el = nodes[i];
    var label = (el.value || el.textContent || "").trim().toUpperCase();
    if (label !== "BUSINESS INFORMATION") continue;
    if (el.offsetParent === null) continue;
    el.click();
    return true;
}
return false;
"#;

/// Clicks the pager anchor bound to `pagePlus(1)`. Returns whether one existed.
pub const NEXT_PAGE: &str = r#"
var anchors = document.querySelectorAll("ul.pagination.pagination-sm a");
for (var i = 0; i < anchors.length; i++) {
    var ng = anchors[i].getAttribute("ng-click") || "";
    if (ng.indexOf("pagePlus(1)") !== -1) {
        anchors[i].click();
        return true;
    }
}
return false;
"#;

/// Clicks the pager anchor whose label equals the page number.
pub const GOTO_PAGE_NUMBER: &str = r#"
var target = arguments[0].toString();
var anchors = document.querySelectorAll("ul.pagination.pagination-sm a");
for (var i = 0; i < anchors.length; i++) {
    if ((anchors[i].textContent || "").trim() === target) {
        anchors[i].click();
        return true;
    }
}
return false;
"#;

/// Opens the document overlay from the action cell of filing row `idx`.
pub const OPEN_DOCUMENT_MODAL: &str = r#"
var idx = arguments[0];
var tables = document.querySelectorAll("table.table-striped");
var target = null;
for (var t = 0; t < tables.length; t++) {
    var hdr = tables[t].querySelector("thead");
    if (!hdr) continue;
    var text = (hdr.textContent || "").toUpperCase();
    if (text.indexOf("FILING NUMBER") !== -1 && text.indexOf("FILING TYPE") !== -1) {
        target = tables[t];
        break;
    }
}
if (!target) return false;
var rows = target.querySelectorAll("tbody tr");
if (idx >= rows.length) return false;
var cells = rows[idx].querySelectorAll("td");
if (!cells.length) return false;
var clickable = cells[cells.length - 1].querySelector("a, button, i, span[ng-click], i.fa, .fa-file-text-o");
if (!clickable) return false;
clickable.click();
return true;
"#;

/// Triggers the native download of the first fulfilled document in the overlay.
pub const SELECT_DOCUMENT: &str = r#"
var modal = document.querySelector(".modal-dialog") || document.querySelector(".searchresult");
if (!modal) return false;
var rows = modal.querySelectorAll("tbody tr");
for (var i = 0; i < rows.length; i++) {
    var text = (rows[i].textContent || "").toUpperCase();
    if (text.indexOf("FULFILLED") === -1 && text.indexOf("BUSINESS") === -1) continue;
    var icon = rows[i].querySelector("i.fa-file-text-o, .fa-file-text-o");
    if (!icon) continue;
    icon.click();
    return true;
}
return false;
"#;

pub const CLOSE_MODAL: &str = r#"
var modal = document.querySelector(".modal-dialog");
if (!modal) return false;
var btn = modal.querySelector("button.close, .btn-default, .btn[data-dismiss='modal']");
if (!btn) return false;
btn.click();
return true;
"#;

/// Leftover backdrops swallow every later click, so they are removed outright.
pub const CLEAR_MODAL_BACKDROP: &str = r#"
var backs = document.querySelectorAll(".modal-backdrop");
for (var i = 0; i < backs.length; i++) {
    backs[i].parentNode.removeChild(backs[i]);
}
if (document.body) {
    document.body.classList.remove("modal-open");
    document.body.style.removeProperty("padding-right");
}
return backs.length;
"#;

/// Fallback for inputs whose native clear throws.
pub const CLEAR_INPUT: &str = r#"
var el = document.querySelector(arguments[0]);
if (!el) return false;
el.value = "";
el.dispatchEvent(new Event("input", { bubbles: true }));
return true;
"#;
