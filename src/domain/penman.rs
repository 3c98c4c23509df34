//! Hand-rolled PENMAN tokenizer, decoder, and canonical encoder.
//!
//! No published crate for PENMAN graph serialization is part of this
//! dependency stack; the source this was modeled on parses PENMAN with
//! regular expressions rather than a dedicated library, so this module
//! follows the same choice with a small recursive-descent parser instead.

use std::fmt;

/// A single `(source, role, target)` edge. `:instance` triples bind a
/// variable to its concept; every other role connects a source variable to
/// either another variable or a constant/string target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Triple {
    pub source: String,
    pub role: String,
    pub target: String,
}

impl Triple {
    pub fn is_instance(&self) -> bool {
        self.role == "instance"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Graph {
    pub top: String,
    pub triples: Vec<Triple>,
}

impl Graph {
    pub fn instance_triples(&self) -> impl Iterator<Item = &Triple> {
        self.triples.iter().filter(|t| t.is_instance())
    }

    pub fn non_instance_triples(&self) -> impl Iterator<Item = &Triple> {
        self.triples.iter().filter(|t| !t.is_instance())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    pub message: String,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for DecodeError {}

fn err(message: impl Into<String>) -> DecodeError {
    DecodeError {
        message: message.into(),
    }
}

/// Checks that parentheses are balanced: depth never goes negative and ends
/// at zero. Run ahead of the full decode as a cheap fast-reject.
pub fn parens_balanced(text: &str) -> bool {
    let mut depth: i64 = 0;
    for ch in text.chars() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    LParen,
    RParen,
    Slash,
    Role(String),
    Symbol(String),
    Str(String),
}

fn tokenize(text: &str) -> Result<Vec<Token>, DecodeError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            c if c.is_whitespace() => {
                i += 1;
            }
            '"' => {
                let mut j = i + 1;
                let mut buf = String::new();
                let mut closed = false;
                while j < chars.len() {
                    if chars[j] == '"' {
                        closed = true;
                        j += 1;
                        break;
                    }
                    buf.push(chars[j]);
                    j += 1;
                }
                if !closed {
                    return Err(err("unterminated string literal"));
                }
                tokens.push(Token::Str(buf));
                i = j;
            }
            ':' => {
                let mut j = i + 1;
                while j < chars.len() && is_symbol_char(chars[j]) {
                    j += 1;
                }
                if j == i + 1 {
                    return Err(err("empty role name"));
                }
                tokens.push(Token::Role(chars[i + 1..j].iter().collect()));
                i = j;
            }
            _ => {
                let mut j = i;
                while j < chars.len() && is_symbol_char(chars[j]) {
                    j += 1;
                }
                if j == i {
                    return Err(err(format!("unexpected character '{c}'")));
                }
                tokens.push(Token::Symbol(chars[i..j].iter().collect()));
                i = j;
            }
        }
    }
    Ok(tokens)
}

fn is_symbol_char(c: char) -> bool {
    !c.is_whitespace() && c != '(' && c != ')' && c != '"'
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    triples: Vec<Triple>,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn parse_node(&mut self) -> Result<String, DecodeError> {
        match self.advance() {
            Some(Token::LParen) => {}
            other => return Err(err(format!("expected '(', found {other:?}"))),
        }
        let var = match self.advance() {
            Some(Token::Symbol(s)) => s,
            other => return Err(err(format!("expected variable, found {other:?}"))),
        };
        match self.advance() {
            Some(Token::Slash) => {}
            other => return Err(err(format!("expected '/', found {other:?}"))),
        }
        let concept = match self.advance() {
            Some(Token::Symbol(s)) => s,
            Some(Token::Str(s)) => s,
            other => return Err(err(format!("expected concept, found {other:?}"))),
        };
        self.triples.push(Triple {
            source: var.clone(),
            role: "instance".to_string(),
            target: concept,
        });

        loop {
            match self.peek() {
                Some(Token::RParen) => {
                    self.advance();
                    break;
                }
                Some(Token::Role(_)) => {
                    let role = match self.advance() {
                        Some(Token::Role(r)) => r,
                        _ => unreachable!(),
                    };
                    let target = match self.peek() {
                        Some(Token::LParen) => self.parse_node()?,
                        Some(Token::Symbol(_)) | Some(Token::Str(_)) => match self.advance() {
                            Some(Token::Symbol(s)) => s,
                            Some(Token::Str(s)) => s,
                            _ => unreachable!(),
                        },
                        other => {
                            return Err(err(format!("expected role target, found {other:?}")))
                        }
                    };
                    self.triples.push(Triple {
                        source: var.clone(),
                        role,
                        target,
                    });
                }
                other => return Err(err(format!("expected role or ')', found {other:?}"))),
            }
        }

        Ok(var)
    }
}

/// Decodes PENMAN text into a [`Graph`]. Whitespace and newlines are
/// insignificant; a single node or a tree of nested nodes is accepted.
pub fn decode(text: &str) -> Result<Graph, DecodeError> {
    let tokens = tokenize(text)?;
    if tokens.is_empty() {
        return Err(err("no tokens to parse"));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        triples: Vec::new(),
    };
    let top = parser.parse_node()?;
    if parser.pos != parser.tokens.len() {
        return Err(err("trailing tokens after top-level node"));
    }
    Ok(Graph {
        top,
        triples: parser.triples,
    })
}

fn needs_quoting(s: &str) -> bool {
    s.is_empty() || s.chars().any(|c| c.is_whitespace() || c == '(' || c == ')')
}

fn render_atom(s: &str) -> String {
    if needs_quoting(s) {
        format!("\"{s}\"")
    } else {
        s.to_string()
    }
}

/// Re-encodes a graph into single-line canonical PENMAN text. The first
/// (source, role) occurrence that targets a variable is where that
/// variable's node is rendered in full; later occurrences (reentrancy)
/// render as a bare variable reference.
pub fn encode(graph: &Graph) -> String {
    use std::collections::{HashMap, HashSet};

    let mut instances: HashMap<&str, &str> = HashMap::new();
    for t in graph.instance_triples() {
        instances.entry(t.source.as_str()).or_insert(t.target.as_str());
    }

    let edges: Vec<&Triple> = graph.non_instance_triples().collect();
    let mut rendered: HashSet<&str> = HashSet::new();

    fn render<'a>(
        var: &'a str,
        instances: &HashMap<&'a str, &'a str>,
        edges: &[&'a Triple],
        rendered: &mut HashSet<&'a str>,
    ) -> String {
        if rendered.contains(var) {
            return var.to_string();
        }
        let Some(concept) = instances.get(var) else {
            return var.to_string();
        };
        rendered.insert(var);
        let mut out = format!("({} / {}", var, concept);
        for edge in edges.iter().filter(|e| e.source == var) {
            let value = render_value(&edge.target, instances, edges, rendered);
            out.push_str(&format!(" :{} {}", edge.role, value));
        }
        out.push(')');
        out
    }

    fn render_value<'a>(
        target: &'a str,
        instances: &HashMap<&'a str, &'a str>,
        edges: &[&'a Triple],
        rendered: &mut HashSet<&'a str>,
    ) -> String {
        if instances.contains_key(target) && !rendered.contains(target) {
            render(target, instances, edges, rendered)
        } else if instances.contains_key(target) {
            target.to_string()
        } else {
            render_atom(target)
        }
    }

    render(&graph.top, &instances, &edges, &mut rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parens_balanced_rejects_negative_depth() {
        assert!(!parens_balanced(")("));
        assert!(!parens_balanced("(()"));
        assert!(parens_balanced("(a (b))"));
    }

    #[test]
    fn decodes_simple_graph() {
        let graph = decode("(b / buy-01 :ARG0 (p / person))").unwrap();
        assert_eq!(graph.top, "b");
        assert_eq!(graph.triples.len(), 3);
        assert!(graph
            .triples
            .iter()
            .any(|t| t.role == "instance" && t.source == "b" && t.target == "buy-01"));
    }

    #[test]
    fn decodes_reentrant_reference() {
        let graph =
            decode("(w / want-01 :ARG0 (b / boy) :ARG1 (g / go-01 :ARG0 b))").unwrap();
        let arg0_of_go = graph
            .triples
            .iter()
            .find(|t| t.source == "g" && t.role == "ARG0")
            .unwrap();
        assert_eq!(arg0_of_go.target, "b");
    }

    #[test]
    fn decode_fails_on_dangling_paren() {
        assert!(decode("(b / buy-01").is_err());
    }

    #[test]
    fn encode_round_trips_simple_graph() {
        let graph = decode("(b / buy-01 :ARG0 (p / person))").unwrap();
        let canonical = encode(&graph);
        let reparsed = decode(&canonical).unwrap();
        assert_eq!(graph, reparsed);
    }

    #[test]
    fn encode_is_idempotent_on_canonical_form() {
        let graph = decode("(b / buy-01 :ARG0 (p / person) :ARG1 (c / car))").unwrap();
        let once = encode(&graph);
        let twice = encode(&decode(&once).unwrap());
        assert_eq!(once, twice);
    }

    #[test]
    fn encode_renders_reentrancy_as_bare_variable_on_second_use() {
        let graph =
            decode("(w / want-01 :ARG0 (b / boy) :ARG1 (g / go-01 :ARG0 b))").unwrap();
        let canonical = encode(&graph);
        assert_eq!(canonical, "(w / want-01 :ARG0 (b / boy) :ARG1 (g / go-01 :ARG0 b))");
    }
}
