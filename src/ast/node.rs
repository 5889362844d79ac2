/// The render tree handed to an external serializer.
///
/// Nodes are only produced by `;Node::Element(...)` / `;Node::Text(...)`
/// construct expressions (or by builtins that explicitly build them). The
/// tree says nothing about escaping or formatting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element { tag: String, children: Vec<Node> },
    Text { value: String },
}

impl Node {
    pub fn element(tag: impl Into<String>, children: Vec<Node>) -> Self {
        Node::Element {
            tag: tag.into(),
            children,
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Node::Text {
            value: value.into(),
        }
    }

    pub fn variant(&self) -> Variant {
        match self {
            Node::Element { .. } => Variant::Element,
            Node::Text { .. } => Variant::Text,
        }
    }

    pub fn tag(&self) -> Option<&str> {
        match self {
            Node::Element { tag, .. } => Some(tag),
            Node::Text { .. } => None,
        }
    }

    /// Children of an element; a text node has none.
    pub fn children(&self) -> &[Node] {
        match self {
            Node::Element { children, .. } => children,
            Node::Text { .. } => &[],
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Node::Text { value } => Some(value),
            Node::Element { .. } => None,
        }
    }

    /// Concatenation of every text node under this one, in document order.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            Node::Text { value } => out.push_str(value),
            Node::Element { children, .. } => {
                for child in children {
                    child.collect_text(out);
                }
            }
        }
    }
}

/// The closed set of constructible render-tree variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    Element,
    Text,
}

impl Variant {
    /// The only qualifier accepted in `;Qualifier::Variant(...)`.
    pub const QUALIFIER: &'static str = "Node";

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Element" => Some(Variant::Element),
            "Text" => Some(Variant::Text),
            _ => None,
        }
    }

    /// Resolve a construct path (`Element`, `Node::Element`). Any other
    /// qualifier is rejected.
    pub fn resolve(qualifier: Option<&str>, name: &str) -> Option<Self> {
        match qualifier {
            None => Self::from_name(name),
            Some(q) if q == Self::QUALIFIER => Self::from_name(name),
            Some(_) => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Variant::Element => "Element",
            Variant::Text => "Text",
        }
    }

    /// Field names in declaration order. All are required.
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            Variant::Element => &["tag", "children"],
            Variant::Text => &["value"],
        }
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields().contains(&name)
    }
}
