// Element handles - identity of the UI element a user interacted with
//
// The UI layer owns elements through `ElementRef` (an `Arc`). Caches keep only
// a `WeakElement`, so a disposed element never stays alive because of us.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};

static NEXT_ELEMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(u64);

impl ElementId {
    fn next() -> Self {
        Self(NEXT_ELEMENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "el#{}", self.0)
    }
}

#[derive(Debug)]
struct ElementNode {
    id: ElementId,
    tag: String,
    attributes: BTreeMap<String, String>,
    signature: String,
}

/// Strong handle to an interacted element
#[derive(Debug, Clone)]
pub struct ElementRef {
    node: Arc<ElementNode>,
}

impl ElementRef {
    /// Create a new element with a fresh identity
    pub fn new<I, K, V>(tag: &str, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let tag = tag.to_ascii_lowercase();
        let attributes: BTreeMap<String, String> = attributes
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let signature = structural_signature(&tag, &attributes);

        Self {
            node: Arc::new(ElementNode {
                id: ElementId::next(),
                tag,
                attributes,
                signature,
            }),
        }
    }

    /// Create an element whose structural signature is supplied by the caller
    pub fn with_signature<I, K, V>(tag: &str, attributes: I, signature: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut element = Self::new(tag, attributes);
        // Freshly built, so we are the only owner
        if let Some(node) = Arc::get_mut(&mut element.node) {
            node.signature = signature.into();
        }
        element
    }

    pub fn id(&self) -> ElementId {
        self.node.id
    }

    pub fn tag(&self) -> &str {
        &self.node.tag
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.node.attributes.get(name).map(String::as_str)
    }

    /// Structural signature shared by elements of the same shape.
    ///
    /// Used to remember which strategy won for this kind of element.
    pub fn signature(&self) -> &str {
        &self.node.signature
    }

    pub fn downgrade(&self) -> WeakElement {
        WeakElement {
            id: self.node.id,
            node: Arc::downgrade(&self.node),
        }
    }
}

impl PartialEq for ElementRef {
    fn eq(&self, other: &Self) -> bool {
        self.node.id == other.node.id
    }
}

impl Eq for ElementRef {}

/// Weak handle that does not extend the element's lifetime
#[derive(Debug, Clone)]
pub struct WeakElement {
    id: ElementId,
    node: Weak<ElementNode>,
}

impl WeakElement {
    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn is_alive(&self) -> bool {
        self.node.strong_count() > 0
    }

    pub fn upgrade(&self) -> Option<ElementRef> {
        self.node.upgrade().map(|node| ElementRef { node })
    }
}

fn structural_signature(tag: &str, attributes: &BTreeMap<String, String>) -> String {
    let testid = attributes
        .get("data-testid")
        .map(String::as_str)
        .unwrap_or("");
    let role = attributes.get("role").map(String::as_str).unwrap_or("");
    format!("{}|{}|{}", tag, testid, role)
}
