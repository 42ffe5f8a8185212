//! JavaScript snippets injected into the page. Each returns a small string
//! payload so driver backends only need to marshal one value type.

/// Readiness probe, run on every poll round. Returns:
/// - `null` when the document has no body yet (no signal)
/// - `error:` plus the current href on a browser error page
/// - the document ready state once it is interactive or complete
/// - `timeout` while still loading
pub const READY_PROBE: &str = r#"
if (!document.body) { return null; }
var href = window.location.href;
if (href.indexOf('chrome-error://') === 0 || href.indexOf('about:neterror') === 0) {
    return 'error:' + href;
}
var state = document.readyState;
if (state === 'complete' || state === 'interactive') {
    return state;
}
return 'timeout';
"#;

/// Smooth scroll to a fraction of the page height, emulating a reader
/// working down the document.
pub fn scroll_script(step: u32, total: u32) -> String {
    format!(
        "window.scrollTo({{top: document.body.scrollHeight * {step} / {total}, behavior: 'smooth'}}); return 'ok';"
    )
}

/// Feature probe, run once the document is ready. Returns the ready state
/// and up to 200 absolute http(s) link targets, space separated.
pub const FEATURE_PROBE: &str = r#"
var urls = [];
var anchors = document.querySelectorAll('a[href]');
for (var i = 0; i < anchors.length && urls.length < 200; i++) {
    var href = anchors[i].href;
    if (href && (href.indexOf('http://') === 0 || href.indexOf('https://') === 0)) {
        urls.push(href);
    }
}
return document.readyState + '|' + urls.join(' ');
"#;
