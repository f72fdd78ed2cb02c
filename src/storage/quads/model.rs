use std::fmt;

/// IRI of the graph that receives plain triples.
pub const DEFAULT_GRAPH_IRI: &str = "urn:x-arq:DefaultGraphNode";

/// Position of a term inside a quad.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dim {
    /// Graph name.
    Graph,
    /// Subject.
    Subject,
    /// Predicate.
    Predicate,
    /// Object.
    Object,
}

impl Dim {
    /// Every position in tuple order.
    pub const ALL: [Dim; 4] = [Dim::Graph, Dim::Subject, Dim::Predicate, Dim::Object];

    /// Position in the packed id tuple.
    pub fn index(self) -> usize {
        match self {
            Dim::Graph => 0,
            Dim::Subject => 1,
            Dim::Predicate => 2,
            Dim::Object => 3,
        }
    }

    /// Short name used on tracing events.
    pub fn name(self) -> &'static str {
        match self {
            Dim::Graph => "g",
            Dim::Subject => "s",
            Dim::Predicate => "p",
            Dim::Object => "o",
        }
    }
}

/// Literal term.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Literal {
    lexical: String,
    language: Option<String>,
    datatype: Option<String>,
}

impl Literal {
    /// Lexical form.
    pub fn lexical(&self) -> &str {
        &self.lexical
    }

    /// Language tag, if any.
    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    /// Datatype IRI, if any.
    pub fn datatype(&self) -> Option<&str> {
        self.datatype.as_deref()
    }
}

/// One RDF term.
///
/// `Display` renders N-Triples syntax, which doubles as the dictionary key:
/// IRIs, blank nodes and literals never render alike.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Node {
    /// IRI reference.
    Iri(String),
    /// Blank node label.
    Blank(String),
    /// Literal value.
    Literal(Literal),
}

impl Node {
    /// IRI term.
    pub fn iri(iri: impl Into<String>) -> Self {
        Node::Iri(iri.into())
    }

    /// Blank node term.
    pub fn blank(label: impl Into<String>) -> Self {
        Node::Blank(label.into())
    }

    /// Plain literal.
    pub fn literal(lexical: impl Into<String>) -> Self {
        Node::Literal(Literal {
            lexical: lexical.into(),
            language: None,
            datatype: None,
        })
    }

    /// Language-tagged literal.
    pub fn lang_literal(lexical: impl Into<String>, language: impl Into<String>) -> Self {
        Node::Literal(Literal {
            lexical: lexical.into(),
            language: Some(language.into()),
            datatype: None,
        })
    }

    /// Literal with a datatype IRI.
    pub fn typed_literal(lexical: impl Into<String>, datatype: impl Into<String>) -> Self {
        Node::Literal(Literal {
            lexical: lexical.into(),
            language: None,
            datatype: Some(datatype.into()),
        })
    }

    /// Whether this is an IRI.
    pub fn is_iri(&self) -> bool {
        matches!(self, Node::Iri(_))
    }

    /// Whether this is a blank node.
    pub fn is_blank(&self) -> bool {
        matches!(self, Node::Blank(_))
    }

    /// Whether this is a literal.
    pub fn is_literal(&self) -> bool {
        matches!(self, Node::Literal(_))
    }
}

fn write_escaped(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    for ch in text.chars() {
        match ch {
            '\\' => f.write_str("\\\\")?,
            '"' => f.write_str("\\\"")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '>' => f.write_str("\\u003E")?,
            other => write!(f, "{other}")?,
        }
    }
    Ok(())
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Iri(iri) => {
                f.write_str("<")?;
                write_escaped(f, iri)?;
                f.write_str(">")
            }
            Node::Blank(label) => write!(f, "_:{label}"),
            Node::Literal(lit) => {
                f.write_str("\"")?;
                write_escaped(f, &lit.lexical)?;
                f.write_str("\"")?;
                if let Some(lang) = &lit.language {
                    write!(f, "@{lang}")?;
                } else if let Some(datatype) = &lit.datatype {
                    f.write_str("^^<")?;
                    write_escaped(f, datatype)?;
                    f.write_str(">")?;
                }
                Ok(())
            }
        }
    }
}

/// Subject, predicate and object without a graph.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Triple {
    /// Subject term.
    pub subject: Node,
    /// Predicate term.
    pub predicate: Node,
    /// Object term.
    pub object: Node,
}

impl Triple {
    /// Triple of the given terms.
    pub fn new(subject: Node, predicate: Node, object: Node) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }
}

/// A triple placed in a named graph.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Quad {
    /// Graph term.
    pub graph: Node,
    /// Subject term.
    pub subject: Node,
    /// Predicate term.
    pub predicate: Node,
    /// Object term.
    pub object: Node,
}

impl Quad {
    /// Quad of the given terms.
    pub fn new(graph: Node, subject: Node, predicate: Node, object: Node) -> Self {
        Self {
            graph,
            subject,
            predicate,
            object,
        }
    }

    /// Places `triple` into `graph`.
    pub fn from_triple(triple: Triple, graph: Node) -> Self {
        Self {
            graph,
            subject: triple.subject,
            predicate: triple.predicate,
            object: triple.object,
        }
    }

    /// Drops the graph.
    pub fn as_triple(&self) -> Triple {
        Triple::new(
            self.subject.clone(),
            self.predicate.clone(),
            self.object.clone(),
        )
    }

    /// Term at `dim`.
    pub fn get(&self, dim: Dim) -> &Node {
        match dim {
            Dim::Graph => &self.graph,
            Dim::Subject => &self.subject,
            Dim::Predicate => &self.predicate,
            Dim::Object => &self.object,
        }
    }
}

impl fmt::Display for Quad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} .",
            self.subject, self.predicate, self.object, self.graph
        )
    }
}

/// Quad pattern; `None` positions match anything.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct QuadPattern {
    terms: [Option<Node>; 4],
}

impl QuadPattern {
    /// Matches every quad.
    pub fn any() -> Self {
        Self::default()
    }

    /// Pattern binding each `Some` position.
    pub fn new(
        graph: Option<Node>,
        subject: Option<Node>,
        predicate: Option<Node>,
        object: Option<Node>,
    ) -> Self {
        Self {
            terms: [graph, subject, predicate, object],
        }
    }

    /// Binds the graph.
    pub fn graph(self, node: Node) -> Self {
        self.with(Dim::Graph, node)
    }

    /// Binds the subject.
    pub fn subject(self, node: Node) -> Self {
        self.with(Dim::Subject, node)
    }

    /// Binds the predicate.
    pub fn predicate(self, node: Node) -> Self {
        self.with(Dim::Predicate, node)
    }

    /// Binds the object.
    pub fn object(self, node: Node) -> Self {
        self.with(Dim::Object, node)
    }

    /// Binds position `dim` to `node`.
    pub fn with(mut self, dim: Dim, node: Node) -> Self {
        self.terms[dim.index()] = Some(node);
        self
    }

    /// Bound term at `dim`.
    pub fn get(&self, dim: Dim) -> Option<&Node> {
        self.terms[dim.index()].as_ref()
    }

    /// Number of bound positions.
    pub fn bound(&self) -> usize {
        self.terms.iter().filter(|term| term.is_some()).count()
    }

    /// Whether `quad` agrees with every bound position.
    pub fn matches(&self, quad: &Quad) -> bool {
        Dim::ALL
            .iter()
            .all(|dim| self.get(*dim).map_or(true, |node| node == quad.get(*dim)))
    }
}

impl From<&Quad> for QuadPattern {
    fn from(quad: &Quad) -> Self {
        Self {
            terms: [
                Some(quad.graph.clone()),
                Some(quad.subject.clone()),
                Some(quad.predicate.clone()),
                Some(quad.object.clone()),
            ],
        }
    }
}
