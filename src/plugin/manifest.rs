//! Owned, mutable XML tree for a plugin's `plugin.xml`.
//!
//! Nodes live in a slotmap so that a [`NodeId`] stays valid while siblings
//! are detached. Every document gets a process-unique [`DocumentId`]; callers
//! keep both to make sure a node reference is only ever used against the
//! document that produced it.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;
use slotmap::{SlotMap, new_key_type};

use crate::error::{HookError, Result};
use crate::fsio::write_atomic;

new_key_type! {
    pub struct NodeId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentId(u64);

static NEXT_DOCUMENT: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    children: Vec<NodeId>,
}

impl Element {
    fn new(name: String, attributes: Vec<(String, String)>) -> Self {
        Self {
            name,
            attributes,
            children: Vec::new(),
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
enum Node {
    Element(Element),
    Text(String),
    CData(String),
    Comment(String),
    Instruction(String),
    DocType(String),
}

#[derive(Debug)]
pub struct ManifestDocument {
    id: DocumentId,
    nodes: SlotMap<NodeId, Node>,
    decl: Option<BytesDecl<'static>>,
    top_level: Vec<NodeId>,
    root: NodeId,
}

impl ManifestDocument {
    pub fn parse(xml: &str) -> std::result::Result<Self, String> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut buf = Vec::new();
        let mut nodes: SlotMap<NodeId, Node> = SlotMap::with_key();
        let mut decl = None;
        let mut top_level = Vec::new();
        let mut open: Vec<NodeId> = Vec::new();

        loop {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|err| format!("at byte {}: {err}", reader.buffer_position()))?;

            let node = match event {
                Event::Decl(d) => {
                    decl = Some(d.into_owned());
                    None
                }
                Event::Start(e) => {
                    let id = nodes.insert(Node::Element(element_from(&e)?));
                    attach(&mut nodes, &mut top_level, &open, id);
                    open.push(id);
                    None
                }
                Event::Empty(e) => Some(Node::Element(element_from(&e)?)),
                Event::End(_) => {
                    if open.pop().is_none() {
                        return Err(format!(
                            "unexpected closing tag at byte {}",
                            reader.buffer_position()
                        ));
                    }
                    None
                }
                Event::Text(t) => {
                    // kept escaped so entities and quotes are written back as found
                    t.unescape().map_err(|err| err.to_string())?;
                    let raw = lossy(&t.into_inner());
                    (!raw.is_empty()).then_some(Node::Text(raw))
                }
                Event::CData(c) => Some(Node::CData(lossy(&c.into_inner()))),
                Event::Comment(t) => Some(Node::Comment(lossy(&t.into_inner()))),
                Event::PI(t) => Some(Node::Instruction(lossy(&t.into_inner()))),
                Event::DocType(t) => Some(Node::DocType(lossy(&t.into_inner()))),
                Event::Eof => break,
            };

            if let Some(node) = node {
                let id = nodes.insert(node);
                attach(&mut nodes, &mut top_level, &open, id);
            }

            buf.clear();
        }

        if let Some(unclosed) = open.last().and_then(|id| match &nodes[*id] {
            Node::Element(el) => Some(el.name.clone()),
            _ => None,
        }) {
            return Err(format!("unclosed element <{unclosed}>"));
        }

        let root = top_level
            .iter()
            .copied()
            .find(|id| matches!(nodes[*id], Node::Element(_)))
            .ok_or_else(|| "no root element".to_string())?;

        Ok(Self {
            id: DocumentId(NEXT_DOCUMENT.fetch_add(1, Ordering::Relaxed)),
            nodes,
            decl,
            top_level,
            root,
        })
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match self.nodes.get(id) {
            Some(Node::Element(el)) => Some(el),
            _ => None,
        }
    }

    pub fn is_element(&self, id: NodeId, name: &str) -> bool {
        self.element(id).is_some_and(|el| el.name == name)
    }

    pub fn attribute(&self, id: NodeId, key: &str) -> Option<&str> {
        self.element(id).and_then(|el| el.attribute(key))
    }

    /// Direct element children of `id`, in document order.
    pub fn child_elements(&self, id: NodeId) -> Vec<NodeId> {
        self.element(id)
            .map(|el| {
                el.children
                    .iter()
                    .copied()
                    .filter(|child| self.element(*child).is_some())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Element descendants of `id` (not including `id`), pre-order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.child_elements(id).into_iter().rev().collect();

        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.child_elements(next).into_iter().rev());
        }

        out
    }

    /// Remove `child` (and its subtree) from `parent`. Returns false when
    /// `child` is not a direct child of `parent`.
    pub fn detach(&mut self, parent: NodeId, child: NodeId) -> bool {
        let Some(Node::Element(el)) = self.nodes.get_mut(parent) else {
            return false;
        };
        let Some(pos) = el.children.iter().position(|c| *c == child) else {
            return false;
        };
        el.children.remove(pos);

        let mut doomed = vec![child];
        while let Some(id) = doomed.pop() {
            if let Some(Node::Element(el)) = self.nodes.remove(id) {
                doomed.extend(el.children);
            }
        }

        true
    }

    /// Parent element of `id`, found by walking from the root.
    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        std::iter::once(self.root)
            .chain(self.descendants(self.root))
            .find(|candidate| {
                self.element(*candidate)
                    .is_some_and(|el| el.children.contains(&id))
            })
    }

    pub fn to_xml_string(&self, indent: usize) -> std::result::Result<String, String> {
        let mut writer = if indent == 0 {
            Writer::new(Vec::new())
        } else {
            Writer::new_with_indent(Vec::new(), b' ', indent)
        };

        if let Some(decl) = &self.decl {
            writer
                .write_event(Event::Decl(decl.clone()))
                .map_err(|err| err.to_string())?;
        }

        for id in &self.top_level {
            self.write_node(&mut writer, *id)
                .map_err(|err| err.to_string())?;
        }

        let mut out = String::from_utf8(writer.into_inner()).map_err(|err| err.to_string())?;
        out.push('\n');
        Ok(out)
    }

    /// Serialize and replace the file at `path` atomically.
    pub fn save(&self, path: &Path, indent: usize) -> Result<()> {
        let xml = self
            .to_xml_string(indent)
            .map_err(|message| HookError::MalformedManifest {
                path: path.to_path_buf(),
                message,
            })?;
        write_atomic(path, xml.as_bytes())
    }

    fn write_node(
        &self,
        writer: &mut Writer<Vec<u8>>,
        id: NodeId,
    ) -> std::result::Result<(), quick_xml::Error> {
        let Some(node) = self.nodes.get(id) else {
            return Ok(());
        };

        match node {
            Node::Element(el) => {
                let mut start = BytesStart::new(el.name.as_str());
                for (key, value) in &el.attributes {
                    start.push_attribute((key.as_str(), value.as_str()));
                }

                if el.children.is_empty() {
                    writer.write_event(Event::Empty(start))?;
                } else {
                    writer.write_event(Event::Start(start))?;
                    for child in &el.children {
                        self.write_node(writer, *child)?;
                    }
                    writer.write_event(Event::End(BytesEnd::new(el.name.as_str())))?;
                }
            }
            Node::Text(text) => {
                writer.write_event(Event::Text(BytesText::from_escaped(text.as_str())))?
            }
            Node::CData(text) => writer.write_event(Event::CData(BytesCData::new(text.as_str())))?,
            Node::Comment(text) => {
                writer.write_event(Event::Comment(BytesText::from_escaped(text.as_str())))?
            }
            Node::Instruction(text) => {
                writer.write_event(Event::PI(BytesText::from_escaped(text.as_str())))?
            }
            Node::DocType(text) => {
                writer.write_event(Event::DocType(BytesText::from_escaped(text.as_str())))?
            }
        }

        Ok(())
    }
}

fn element_from(start: &BytesStart<'_>) -> std::result::Result<Element, String> {
    let name = lossy(start.name().as_ref());
    let mut attributes = Vec::new();

    for attr in start.attributes() {
        let attr = attr.map_err(|err| format!("<{name}>: {err}"))?;
        let key = lossy(attr.key.as_ref());
        let value = attr
            .unescape_value()
            .map_err(|err| format!("<{name} {key}>: {err}"))?
            .into_owned();
        attributes.push((key, value));
    }

    Ok(Element::new(name, attributes))
}

fn attach(
    nodes: &mut SlotMap<NodeId, Node>,
    top_level: &mut Vec<NodeId>,
    open: &[NodeId],
    id: NodeId,
) {
    match open.last().and_then(|parent| nodes.get_mut(*parent)) {
        Some(Node::Element(parent)) => parent.children.push(id),
        _ => top_level.push(id),
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<plugin xmlns="http://apache.org/cordova/ns/plugins/1.0"
        xmlns:android="http://schemas.android.com/apk/res/android"
        id="cordova-plugin-camera" version="4.1.0">
    <!-- camera plugin -->
    <name>Camera</name>
    <description>Take &amp; pick photos</description>
    <platform name="android">
        <config-file target="AndroidManifest.xml" parent="/*">
            <uses-permission android:name="android.permission.CAMERA" />
            <uses-permission android:name="android.permission.READ_EXTERNAL_STORAGE" />
        </config-file>
        <source-file src="src/android/CameraLauncher.java" target-dir="src/org/apache/cordova/camera" />
    </platform>
</plugin>
"#;

    fn names(doc: &ManifestDocument, ids: &[NodeId]) -> Vec<String> {
        ids.iter()
            .map(|id| doc.element(*id).unwrap().name.clone())
            .collect()
    }

    #[test]
    fn parses_elements_and_attributes() {
        let doc = ManifestDocument::parse(SAMPLE).unwrap();
        let root = doc.root();

        assert!(doc.is_element(root, "plugin"));
        assert_eq!(doc.attribute(root, "id"), Some("cordova-plugin-camera"));
        assert_eq!(
            names(&doc, &doc.child_elements(root)),
            vec!["name", "description", "platform"]
        );

        let perms: Vec<&str> = doc
            .descendants(root)
            .into_iter()
            .filter(|id| doc.is_element(*id, "uses-permission"))
            .filter_map(|id| doc.attribute(id, "android:name"))
            .collect();
        assert_eq!(
            perms,
            vec![
                "android.permission.CAMERA",
                "android.permission.READ_EXTERNAL_STORAGE"
            ]
        );
    }

    #[test]
    fn descendants_are_preorder() {
        let doc = ManifestDocument::parse("<a><b><c/></b><d/></a>").unwrap();
        assert_eq!(names(&doc, &doc.descendants(doc.root())), vec!["b", "c", "d"]);
    }

    #[test]
    fn serialization_round_trips_structure() {
        let doc = ManifestDocument::parse(SAMPLE).unwrap();
        let written = doc.to_xml_string(4).unwrap();
        let reparsed = ManifestDocument::parse(&written).unwrap();

        assert_eq!(reparsed.to_xml_string(4).unwrap(), written);
        assert!(written.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(written.contains("<!-- camera plugin -->"));
        assert!(written.contains("Take &amp; pick photos"));
        assert!(written.contains(r#"android:name="android.permission.CAMERA""#));
        assert!(written.ends_with("</plugin>\n"));
    }

    #[test]
    fn text_escaping_is_written_back_verbatim() {
        let xml = r#"<plugin><name>It's "quick" &amp; &lt;easy&gt; &#169;</name></plugin>"#;
        let doc = ManifestDocument::parse(xml).unwrap();

        assert_eq!(doc.to_xml_string(0).unwrap(), format!("{xml}\n"));
    }

    #[test]
    fn indentation_follows_request() {
        let doc = ManifestDocument::parse("<a><b><c/></b></a>").unwrap();
        assert_eq!(
            doc.to_xml_string(4).unwrap(),
            "<a>\n    <b>\n        <c/>\n    </b>\n</a>\n"
        );
        assert_eq!(doc.to_xml_string(2).unwrap(), "<a>\n  <b>\n    <c/>\n  </b>\n</a>\n");
    }

    #[test]
    fn detach_removes_subtree() {
        let mut doc = ManifestDocument::parse("<a><b><c/></b><d/></a>").unwrap();
        let root = doc.root();
        let b = doc.child_elements(root)[0];
        let c = doc.child_elements(b)[0];

        assert!(!doc.detach(root, c));
        assert!(doc.detach(root, b));
        assert!(doc.element(c).is_none());
        assert_eq!(names(&doc, &doc.child_elements(root)), vec!["d"]);
        assert_eq!(doc.to_xml_string(0).unwrap(), "<a><d/></a>\n");
    }

    #[test]
    fn parent_lookup() {
        let doc = ManifestDocument::parse("<a><b><c/></b></a>").unwrap();
        let b = doc.child_elements(doc.root())[0];
        let c = doc.child_elements(b)[0];

        assert_eq!(doc.parent_of(c), Some(b));
        assert_eq!(doc.parent_of(doc.root()), None);
    }

    #[test]
    fn documents_get_distinct_ids() {
        let a = ManifestDocument::parse("<a/>").unwrap();
        let b = ManifestDocument::parse("<a/>").unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn rejects_malformed_markup() {
        assert!(ManifestDocument::parse("<plugin><platform></plugin>").is_err());
        assert!(ManifestDocument::parse("<plugin>").is_err());
        assert!(ManifestDocument::parse("").is_err());
        assert!(ManifestDocument::parse("<!-- only a comment -->").is_err());
    }
}
