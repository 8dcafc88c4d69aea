//! Page scripts and their output parsing for agent-browser
//!
//! Candidate collection and page-state extraction run as injected scripts
//! through `agent-browser eval`; the structs here mirror what the scripts
//! return.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::core::text::STOPWORDS;
use crate::core::{Candidate, PathSegment, PilotError, Result};
use crate::selector::ranker::{looks_generated, STABLE_ATTRIBUTES};
use crate::selector::synthesizer::is_utility_class;

/// Response envelope of `agent-browser --json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Whether the operation succeeded
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Ancestor step as reported by the query script
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSegment {
    pub tag: String,
    #[serde(default = "one")]
    pub nth_of_type: usize,
    #[serde(default)]
    pub classes: Vec<String>,
}

fn one() -> usize {
    1
}

/// Element as reported by the query script
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawElement {
    pub tag: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub id: Option<String>,
    /// No other element in the document shares the id
    #[serde(default)]
    pub id_unique: bool,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub path: Vec<RawSegment>,
    #[serde(default)]
    pub has_box: bool,
    #[serde(default)]
    pub in_viewport: bool,
}

impl RawElement {
    pub fn into_candidate(self) -> Candidate {
        let attributes = self
            .attributes
            .into_iter()
            .filter(|(name, value)| STABLE_ATTRIBUTES.contains(&name.as_str()) && !value.trim().is_empty())
            .collect();

        let id = self.id.filter(|id| !id.trim().is_empty());
        let id_generated = match &id {
            Some(id) => !self.id_unique || looks_generated(id),
            None => false,
        };

        let structural_path = self
            .path
            .into_iter()
            .map(|segment| PathSegment {
                tag: segment.tag.to_lowercase(),
                nth_of_type: segment.nth_of_type.max(1),
                class: segment
                    .classes
                    .into_iter()
                    .find(|c| !is_utility_class(c) && c.len() < 30),
            })
            .collect();

        Candidate {
            tag: self.tag.to_lowercase(),
            role: self.role.filter(|r| !r.is_empty()),
            attributes,
            id,
            id_generated,
            structural_path,
            text: crate::core::text::clean_text(&self.text),
            has_bbox: self.has_box,
            in_viewport: self.in_viewport,
        }
    }
}

/// Page facts that are not in `get url` / `get title`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageState {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub input_focused: bool,
    #[serde(default)]
    pub scroll_y: i64,
    #[serde(default)]
    pub page_height: i64,
}

/// Parse what `agent-browser eval` printed for a script returning `JSON.stringify(...)`
///
/// The CLI may print the string as-is or JSON-quoted, or wrap it in the
/// `--json` envelope; all three are accepted.
pub fn parse_eval_output<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let raw = raw.trim();
    // Envelope first: its fields would otherwise default into any all-optional `T`
    if let Ok(envelope) = serde_json::from_str::<Envelope>(raw) {
        if let Some(data) = envelope.data {
            let result = data.get("result").cloned().unwrap_or(data);
            if let Some(inner) = result.as_str() {
                return Ok(serde_json::from_str::<T>(inner)?);
            }
            return Ok(serde_json::from_value::<T>(result)?);
        }
        if let Some(error) = envelope.error {
            return Err(PilotError::browser_transient(error));
        }
    }
    if let Ok(value) = serde_json::from_str::<T>(raw) {
        return Ok(value);
    }
    if let Ok(inner) = serde_json::from_str::<String>(raw) {
        if let Ok(value) = serde_json::from_str::<T>(&inner) {
            return Ok(value);
        }
    }
    Err(PilotError::browser_transient(format!(
        "unexpected script output: {}",
        crate::core::text::truncate_chars(raw, 120, "...")
    )))
}

/// Script listing interactive elements that may match `query`
pub fn query_script(query: &str, limit: usize) -> String {
    let query = serde_json::to_string(query).unwrap_or_else(|_| "\"\"".to_string());
    let stopwords = serde_json::to_string(&STOPWORDS).unwrap_or_else(|_| "[]".to_string());
    QUERY_SCRIPT
        .replace("__QUERY__", &query)
        .replace("__STOPWORDS__", &stopwords)
        .replace("__LIMIT__", &limit.to_string())
}

const QUERY_SCRIPT: &str = r#"(() => {
  const query = __QUERY__.toLowerCase().trim();
  const limit = __LIMIT__;
  const stopwords = new Set(__STOPWORDS__);
  const words = query.split(/[^\p{L}\p{N}]+/u).filter(w => w.length > 2 && !stopwords.has(w));
  const stable = ['data-testid', 'data-qa', 'data-test', 'aria-label', 'name', 'placeholder', 'title', 'type'];
  const selector = 'a, button, input, select, textarea, summary, [role=button], [role=link], [role=tab], [role=menuitem], [role=checkbox], [onclick], [contenteditable=true]';
  const visible = el => {
    const s = getComputedStyle(el);
    return s.display !== 'none' && s.visibility !== 'hidden' && s.opacity !== '0';
  };
  const label = el => (el.innerText || el.value || el.getAttribute('aria-label') || el.getAttribute('placeholder') || el.getAttribute('title') || '').trim().slice(0, 200);
  const matches = (el, text) => {
    if (!query) return true;
    const hay = [text, ...stable.map(a => el.getAttribute(a) || ''), el.id || ''].join(' ').toLowerCase();
    return hay.includes(query) || words.some(w => hay.includes(w));
  };
  const path = el => {
    const out = [];
    let node = el;
    while (node && node.nodeType === 1 && node !== document.body && out.length < 6) {
      let nth = 1;
      for (let sib = node.previousElementSibling; sib; sib = sib.previousElementSibling) {
        if (sib.tagName === node.tagName) nth++;
      }
      out.unshift({ tag: node.tagName.toLowerCase(), nthOfType: nth, classes: Array.from(node.classList) });
      node = node.parentElement;
    }
    return out;
  };
  const results = [];
  for (const el of document.querySelectorAll(selector)) {
    if (results.length >= limit) break;
    if (!visible(el)) continue;
    const text = label(el);
    if (!matches(el, text)) continue;
    const r = el.getBoundingClientRect();
    const attributes = {};
    for (const a of stable) { const v = el.getAttribute(a); if (v) attributes[a] = v; }
    const id = el.id || null;
    results.push({
      tag: el.tagName.toLowerCase(),
      role: el.getAttribute('role'),
      text,
      id,
      idUnique: id ? document.querySelectorAll('#' + CSS.escape(id)).length === 1 : false,
      attributes,
      path: path(el),
      hasBox: r.width > 0 && r.height > 0,
      inViewport: r.bottom > 0 && r.right > 0 && r.top < innerHeight && r.left < innerWidth,
    });
  }
  return JSON.stringify(results);
})()"#;

/// Script returning visible text, focus and scroll position
pub const PAGE_STATE_SCRIPT: &str = r#"(() => {
  const walker = document.createTreeWalker(document.body, NodeFilter.SHOW_TEXT, {
    acceptNode: node => {
      const parent = node.parentElement;
      if (!parent) return NodeFilter.FILTER_REJECT;
      const tag = parent.tagName.toLowerCase();
      if (['script', 'style', 'noscript'].includes(tag)) return NodeFilter.FILTER_REJECT;
      const s = getComputedStyle(parent);
      if (s.display === 'none' || s.visibility === 'hidden') return NodeFilter.FILTER_REJECT;
      return NodeFilter.FILTER_ACCEPT;
    }
  });
  const parts = [];
  let total = 0;
  while (walker.nextNode() && total < 20000) {
    const t = walker.currentNode.textContent.trim();
    if (t) { parts.push(t); total += t.length; }
  }
  const active = document.activeElement;
  return JSON.stringify({
    text: parts.join(' '),
    inputFocused: !!active && ['INPUT', 'TEXTAREA', 'SELECT'].includes(active.tagName),
    scrollY: Math.round(window.scrollY),
    pageHeight: Math.round(document.body.scrollHeight),
  });
})()"#;

/// Whole labels of controls that only close an overlay
///
/// Nothing that accepts, agrees or confirms: those change page state the
/// policy classifier never sees.
pub const DISMISS_LABELS: [&str; 10] = [
    "close",
    "dismiss",
    "cancel",
    "no thanks",
    "not now",
    "close dialog",
    "close modal",
    "x",
    "×",
    "✕",
];

/// Script clicking the dismiss control of every visible dialog or popup
pub fn close_popups_script() -> String {
    let labels = serde_json::to_string(&DISMISS_LABELS).unwrap_or_else(|_| "[]".to_string());
    CLOSE_POPUPS_SCRIPT.replace("__LABELS__", &labels)
}

const CLOSE_POPUPS_SCRIPT: &str = r#"(() => {
  const labels = new Set(__LABELS__);
  const norm = s => (s || '').toLowerCase().replace(/\s+/g, ' ').trim();
  let clicked = 0;
  const scopes = document.querySelectorAll('[role=dialog], [aria-modal=true], .modal, .popup, .overlay, [class*=cookie], [id*=cookie]');
  for (const scope of scopes) {
    const s = getComputedStyle(scope);
    if (s.display === 'none' || s.visibility === 'hidden') continue;
    for (const el of scope.querySelectorAll('button, a, [role=button]')) {
      if (labels.has(norm(el.innerText)) || labels.has(norm(el.getAttribute('aria-label')))) { el.click(); clicked++; break; }
    }
  }
  return JSON.stringify(clicked);
})()"#;

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"[
        {"tag":"BUTTON","role":null,"text":"  Delete\n account ","id":":r5:","idUnique":true,
         "attributes":{"type":"submit","class":"x"},
         "path":[{"tag":"main","nthOfType":1,"classes":[]},{"tag":"button","nthOfType":2,"classes":["css-1abc","danger"]}],
         "hasBox":true,"inViewport":false},
        {"tag":"input","text":"","id":"search","idUnique":true,"attributes":{"name":"q","placeholder":"Search"},
         "path":[],"hasBox":true,"inViewport":true}
    ]"#;

    #[test]
    fn test_parse_candidates() {
        let raw: Vec<RawElement> = parse_eval_output(SAMPLE).unwrap();
        let candidates: Vec<Candidate> = raw.into_iter().map(RawElement::into_candidate).collect();

        let button = &candidates[0];
        assert_eq!(button.tag, "button");
        assert_eq!(button.text, "Delete account");
        assert!(button.id_generated);
        assert!(button.attributes.is_empty());
        assert_eq!(button.structural_path[1].class.as_deref(), Some("danger"));
        assert!(!button.in_viewport);

        let input = &candidates[1];
        assert!(!input.id_generated);
        assert_eq!(input.attributes.get("name").map(String::as_str), Some("q"));
        assert!(!input.attributes.contains_key("placeholder"));
    }

    #[test]
    fn test_parse_quoted_output() {
        let quoted = serde_json::to_string(SAMPLE).unwrap();
        let raw: Vec<RawElement> = parse_eval_output(&quoted).unwrap();
        assert_eq!(raw.len(), 2);
    }

    #[test]
    fn test_parse_envelope_output() {
        let out = r#"{"success":true,"data":{"result":"{\"text\":\"Hello\",\"inputFocused\":true,\"scrollY\":40,\"pageHeight\":900}"}}"#;
        let state: PageState = parse_eval_output(out).unwrap();
        assert_eq!(state.text, "Hello");
        assert!(state.input_focused);
        assert_eq!(state.scroll_y, 40);
    }

    #[test]
    fn test_parse_garbage_is_transient() {
        let err = parse_eval_output::<PageState>("Error: page closed").unwrap_err();
        assert!(err.is_recoverable_by_ladder());
    }

    #[test]
    fn test_query_script_embeds_escaped_query() {
        let script = query_script("the \"Buy\" button", 7);
        assert!(script.contains(r#"const query = "the \"Buy\" button".toLowerCase()"#));
        assert!(script.contains("const limit = 7;"));
        assert!(script.contains(r#"new Set(["the","and","#));
    }

    #[test]
    fn test_popup_script_only_dismisses() {
        let script = close_popups_script();
        assert!(script.contains(r#"new Set(["close","dismiss","cancel","#));
        assert!(!script.contains("accept"));
        assert!(!script.contains("got it"));
        assert!(!script.contains("__LABELS__"));
        // Whole-label match, so "Close account" is never clicked
        assert!(script.contains("labels.has(norm(el.innerText))"));
    }
}
