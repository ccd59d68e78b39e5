//! Page port: the slice of the live DOM the primitives act on.

use std::fmt;

use parking_lot::Mutex;

use crate::errors::ActionError;

/// Handle to one element matched by a selector.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ElementRef {
    pub selector: String,
    pub index: usize,
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.selector, self.index)
    }
}

/// Synthetic DOM events fired by the primitives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DomEvent {
    MouseDown,
    MouseUp,
    Click,
    Input,
    Change,
}

impl DomEvent {
    /// Sequence a real pointer click produces.
    pub const CLICK_SEQUENCE: [DomEvent; 3] = [DomEvent::MouseDown, DomEvent::MouseUp, DomEvent::Click];

    pub fn name(self) -> &'static str {
        match self {
            DomEvent::MouseDown => "mousedown",
            DomEvent::MouseUp => "mouseup",
            DomEvent::Click => "click",
            DomEvent::Input => "input",
            DomEvent::Change => "change",
        }
    }
}

/// Live page as seen from the content context.
///
/// `navigate` only *starts* a navigation: in a browser the
/// calling script is torn down right after, so callers must treat the
/// command as unfinished.
pub trait Page: Send + Sync {
    fn current_url(&self) -> String;
    fn title(&self) -> Option<String>;
    fn query_selector_all(&self, selector: &str) -> Vec<ElementRef>;
    fn dispatch_event(&self, element: &ElementRef, event: DomEvent) -> Result<(), ActionError>;
    fn set_value(&self, element: &ElementRef, value: &str) -> Result<(), ActionError>;
    fn value(&self, element: &ElementRef) -> Option<String>;
    fn navigate(&self, url: &str) -> Result<(), ActionError>;
}

/// Element of an [`InMemoryPage`] document.
#[derive(Clone, Debug)]
pub struct ElementNode {
    pub selector: String,
    pub value: String,
    /// Writes are silently dropped, like a disabled input.
    pub read_only: bool,
    /// Every event dispatch on this element fails.
    pub broken: bool,
}

impl ElementNode {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            value: String::new(),
            read_only: false,
            broken: false,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn broken(mut self) -> Self {
        self.broken = true;
        self
    }
}

#[derive(Debug, Default)]
struct DocumentState {
    url: String,
    title: Option<String>,
    elements: Vec<ElementNode>,
    pending_navigation: Option<String>,
    dispatched: Vec<(ElementRef, DomEvent)>,
}

impl DocumentState {
    fn node(&self, element: &ElementRef) -> Option<&ElementNode> {
        self.elements
            .iter()
            .filter(|node| node.selector == element.selector)
            .nth(element.index)
    }

    fn node_mut(&mut self, element: &ElementRef) -> Option<&mut ElementNode> {
        self.elements
            .iter_mut()
            .filter(|node| node.selector == element.selector)
            .nth(element.index)
    }
}

/// Headless document used by the CLI simulation and by tests.
///
/// Selectors match by exact string. A started navigation stays pending
/// until [`InMemoryPage::finish_navigation`] loads the target URL.
#[derive(Debug, Default)]
pub struct InMemoryPage {
    state: Mutex<DocumentState>,
}

impl InMemoryPage {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(DocumentState {
                url: url.into(),
                ..DocumentState::default()
            }),
        }
    }

    pub fn with_title(self, title: impl Into<String>) -> Self {
        self.state.lock().title = Some(title.into());
        self
    }

    pub fn with_element(self, element: ElementNode) -> Self {
        self.state.lock().elements.push(element);
        self
    }

    pub fn pending_navigation(&self) -> Option<String> {
        self.state.lock().pending_navigation.clone()
    }

    /// Complete the pending navigation, replacing the document.
    pub fn finish_navigation(&self, elements: Vec<ElementNode>) -> Option<String> {
        let mut state = self.state.lock();
        let target = state.pending_navigation.take()?;
        state.url = target.clone();
        state.elements = elements;
        state.dispatched.clear();
        Some(target)
    }

    pub fn dispatched_events(&self) -> Vec<(ElementRef, DomEvent)> {
        self.state.lock().dispatched.clone()
    }
}

impl Page for InMemoryPage {
    fn current_url(&self) -> String {
        self.state.lock().url.clone()
    }

    fn title(&self) -> Option<String> {
        self.state.lock().title.clone()
    }

    fn query_selector_all(&self, selector: &str) -> Vec<ElementRef> {
        let state = self.state.lock();
        state
            .elements
            .iter()
            .filter(|node| node.selector == selector)
            .enumerate()
            .map(|(index, _)| ElementRef {
                selector: selector.to_string(),
                index,
            })
            .collect()
    }

    fn dispatch_event(&self, element: &ElementRef, event: DomEvent) -> Result<(), ActionError> {
        let mut state = self.state.lock();
        let node = state
            .node(element)
            .ok_or_else(|| ActionError::ElementNotFound(element.to_string()))?;
        if node.broken {
            return Err(ActionError::DispatchFailed(format!(
                "{} on {}",
                event.name(),
                element
            )));
        }
        state.dispatched.push((element.clone(), event));
        Ok(())
    }

    fn set_value(&self, element: &ElementRef, value: &str) -> Result<(), ActionError> {
        let mut state = self.state.lock();
        let node = state
            .node_mut(element)
            .ok_or_else(|| ActionError::ElementNotFound(element.to_string()))?;
        if !node.read_only {
            node.value = value.to_string();
        }
        Ok(())
    }

    fn value(&self, element: &ElementRef) -> Option<String> {
        self.state.lock().node(element).map(|node| node.value.clone())
    }

    fn navigate(&self, url: &str) -> Result<(), ActionError> {
        if url.is_empty() {
            return Err(ActionError::Navigation("URL cannot be empty".to_string()));
        }
        self.state.lock().pending_navigation = Some(url.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectors_resolve_each_matching_element() {
        let page = InMemoryPage::new("https://example.test/")
            .with_element(ElementNode::new(".unit"))
            .with_element(ElementNode::new("#other"))
            .with_element(ElementNode::new(".unit"));

        let matches = page.query_selector_all(".unit");
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[1].index, 1);
        assert!(page.query_selector_all(".missing").is_empty());
    }

    #[test]
    fn navigation_stays_pending_until_finished() {
        let page = InMemoryPage::new("https://example.test/a");
        page.navigate("https://example.test/b").unwrap();
        assert_eq!(page.current_url(), "https://example.test/a");

        let landed = page.finish_navigation(vec![ElementNode::new("#x")]);
        assert_eq!(landed.as_deref(), Some("https://example.test/b"));
        assert_eq!(page.current_url(), "https://example.test/b");
        assert_eq!(page.query_selector_all("#x").len(), 1);
        assert!(page.pending_navigation().is_none());
    }

    #[test]
    fn read_only_elements_keep_their_value() {
        let mut node = ElementNode::new("#locked").read_only();
        node.value = "5".into();
        let page = InMemoryPage::new("https://example.test/").with_element(node);
        let el = &page.query_selector_all("#locked")[0];
        page.set_value(el, "10").unwrap();
        assert_eq!(page.value(el).as_deref(), Some("5"));
    }
}
