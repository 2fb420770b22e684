//! A small RDF/XML reader for install manifests.
//!
//! The document is flattened into `(subject, predicate, object)` triples.
//! Predicates are full URIs (namespace + local name). Nested descriptions
//! without an `about` get generated blank-node subjects.

use roxmltree::{Document, Node};
use tracing::trace;

use super::ManifestError;

pub const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const EM_NS: &str = "http://www.mozilla.org/2004/em-rdf#";

/// Subject of the add-on's own description.
pub const INSTALL_ROOT: &str = "urn:mozilla:install-manifest";

/// Full predicate URI of an `em:` name.
pub fn em(local: &str) -> String {
    format!("{}{}", EM_NS, local)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RdfObject {
    Literal(String),
    /// A resource URI or blank-node id.
    Node(String),
}

impl RdfObject {
    pub fn as_str(&self) -> &str {
        match self {
            RdfObject::Literal(s) | RdfObject::Node(s) => s,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: RdfObject,
    /// 1-based line of the element or attribute.
    pub line: usize,
}

#[derive(Debug, Clone, Default)]
pub struct RdfParser {
    triples: Vec<Triple>,
    blank_nodes: usize,
}

impl RdfParser {
    pub fn parse(source: &str) -> Result<Self, ManifestError> {
        let doc = Document::parse(source)?;
        let mut parser = Self::default();
        let root = doc.root_element();
        for child in root.children().filter(|n| is_description(*n)) {
            let subject = parser.subject_of(child);
            parser.read_description(&doc, child, &subject);
        }
        trace!(triples = parser.triples.len(), "parsed rdf");
        Ok(parser)
    }

    pub fn triples(&self) -> &[Triple] {
        &self.triples
    }

    pub fn has_subject(&self, subject: &str) -> bool {
        self.triples.iter().any(|t| t.subject == subject)
    }

    /// Every object of `predicate` on `subject`, in document order.
    pub fn get_objects(&self, subject: &str, predicate: &str) -> Vec<&RdfObject> {
        self.matching(subject, predicate).map(|t| &t.object).collect()
    }

    pub fn get_object(&self, subject: &str, predicate: &str) -> Option<&RdfObject> {
        self.matching(subject, predicate).map(|t| &t.object).next()
    }

    /// The first object's text, trimmed.
    pub fn literal(&self, subject: &str, predicate: &str) -> Option<&str> {
        self.get_object(subject, predicate).map(|o| o.as_str().trim())
    }

    /// Triples with `subject`, in document order.
    pub fn predicates<'s: 'q, 'q>(&'s self, subject: &'q str) -> impl Iterator<Item = &'s Triple> + 'q {
        self.triples.iter().filter(move |t| t.subject == subject)
    }

    fn matching<'s: 'q, 'q>(
        &'s self,
        subject: &'q str,
        predicate: &'q str,
    ) -> impl Iterator<Item = &'s Triple> + 'q {
        self.triples
            .iter()
            .filter(move |t| t.subject == subject && t.predicate == predicate)
    }

    fn subject_of(&mut self, node: Node<'_, '_>) -> String {
        let about = node
            .attributes()
            .find(|a| a.name() == "about" && matches!(a.namespace(), None | Some(RDF_NS)))
            .map(|a| a.value().to_string());
        about.unwrap_or_else(|| {
            self.blank_nodes += 1;
            format!("_:b{}", self.blank_nodes)
        })
    }

    fn read_description(&mut self, doc: &Document<'_>, node: Node<'_, '_>, subject: &str) {
        let line = line_of(doc, node);
        for attr in node.attributes() {
            let Some(ns) = attr.namespace() else {
                continue;
            };
            if ns == RDF_NS {
                continue;
            }
            self.triples.push(Triple {
                subject: subject.to_string(),
                predicate: format!("{}{}", ns, attr.name()),
                object: RdfObject::Literal(attr.value().to_string()),
                line,
            });
        }

        for child in node.children().filter(|n| n.is_element()) {
            let predicate = predicate_uri(child);
            let line = line_of(doc, child);
            let resource = child
                .attributes()
                .find(|a| a.name() == "resource")
                .map(|a| a.value().to_string());
            if let Some(resource) = resource {
                self.push(subject, predicate, RdfObject::Node(resource), line);
                continue;
            }

            let nested: Vec<Node<'_, '_>> = child.children().filter(|n| is_description(*n)).collect();
            if nested.is_empty() {
                let text: String = child
                    .descendants()
                    .filter(|n| n.is_text())
                    .filter_map(|n| n.text())
                    .collect();
                self.push(subject, predicate, RdfObject::Literal(text.trim().to_string()), line);
                continue;
            }
            for description in nested {
                let object = self.subject_of(description);
                self.push(subject, predicate.clone(), RdfObject::Node(object.clone()), line);
                self.read_description(doc, description, &object);
            }
        }
    }

    fn push(&mut self, subject: &str, predicate: String, object: RdfObject, line: usize) {
        self.triples.push(Triple {
            subject: subject.to_string(),
            predicate,
            object,
            line,
        });
    }
}

fn is_description(node: Node<'_, '_>) -> bool {
    node.is_element() && node.tag_name().name() == "Description"
}

fn predicate_uri(node: Node<'_, '_>) -> String {
    let tag = node.tag_name();
    format!("{}{}", tag.namespace().unwrap_or(""), tag.name())
}

fn line_of(doc: &Document<'_>, node: Node<'_, '_>) -> usize {
    doc.text_pos_at(node.range().start).row as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"<?xml version="1.0"?>
<RDF xmlns="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
     xmlns:em="http://www.mozilla.org/2004/em-rdf#">
  <Description about="urn:mozilla:install-manifest" em:type="2">
    <em:id>addon@example.com</em:id>
    <em:version>1.0</em:version>
    <em:targetApplication>
      <Description>
        <em:id>{ec8030f7-c20a-464f-9b0e-13a3a9e97384}</em:id>
        <em:minVersion>38.0</em:minVersion>
        <em:maxVersion>45.*</em:maxVersion>
      </Description>
    </em:targetApplication>
    <em:homepageURL resource="http://example.com/"/>
  </Description>
</RDF>"#;

    #[test]
    fn test_child_and_attribute_literals() {
        let rdf = RdfParser::parse(MANIFEST).unwrap();
        assert_eq!(rdf.literal(INSTALL_ROOT, &em("id")), Some("addon@example.com"));
        assert_eq!(rdf.literal(INSTALL_ROOT, &em("type")), Some("2"));
        assert_eq!(
            rdf.get_object(INSTALL_ROOT, &em("homepageURL")),
            Some(&RdfObject::Node("http://example.com/".to_string()))
        );
    }

    #[test]
    fn test_nested_description_is_a_blank_node() {
        let rdf = RdfParser::parse(MANIFEST).unwrap();
        let Some(RdfObject::Node(app)) = rdf.get_object(INSTALL_ROOT, &em("targetApplication")) else {
            panic!("targetApplication should be a node");
        };
        assert!(app.starts_with("_:"));
        assert_eq!(rdf.literal(app, &em("minVersion")), Some("38.0"));
        // the nested em:id does not leak onto the root
        assert_eq!(rdf.get_objects(INSTALL_ROOT, &em("id")).len(), 1);
    }

    #[test]
    fn test_results_outlive_query_keys() {
        let rdf = RdfParser::parse(MANIFEST).unwrap();
        let id = rdf.get_object(INSTALL_ROOT, &em("id"));
        let versions = rdf.get_objects(INSTALL_ROOT, &format!("{}version", EM_NS));
        let first = {
            let subject = INSTALL_ROOT.to_string();
            let triple = rdf.predicates(&subject).next();
            triple
        };
        assert_eq!(id.map(RdfObject::as_str), Some("addon@example.com"));
        assert_eq!(versions, vec![&RdfObject::Literal("1.0".to_string())]);
        assert!(first.is_some());
    }

    #[test]
    fn test_lines_are_recorded() {
        let rdf = RdfParser::parse(MANIFEST).unwrap();
        let version = rdf
            .predicates(INSTALL_ROOT)
            .find(|t| t.predicate == em("version"))
            .unwrap();
        assert_eq!(version.line, 6);
    }

    #[test]
    fn test_malformed_xml() {
        assert!(matches!(RdfParser::parse("<RDF><Description>"), Err(ManifestError::Xml(_))));
    }
}
