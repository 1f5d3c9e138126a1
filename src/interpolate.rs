//! A minimal, logic-light textual templating pass.
//!
//! Used to turn layout templates into view templates (`<% %>` syntax) and to render template
//! sources nobody compiled (`{{ }}` syntax, `{{{ }}}` for raw insertion).

use crate::error::{Error, Result};
use serde_json::Value;

/// Tag delimiters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    /// `<% … %>`; insertions are verbatim.
    Layout,
    /// `{{ … }}` escaped, `{{{ … }}}` raw.
    Markup,
}

impl Syntax {
    fn open(self) -> &'static str {
        match self {
            Syntax::Layout => "<%",
            Syntax::Markup => "{{",
        }
    }

    fn close(self) -> &'static str {
        match self {
            Syntax::Layout => "%>",
            Syntax::Markup => "}}",
        }
    }
}

#[derive(Debug, PartialEq)]
enum Node<'a> {
    Text(&'a str),
    Insert { path: &'a str, escape: bool },
    Each { path: &'a str, body: Vec<Node<'a>> },
    If {
        path: &'a str,
        then: Vec<Node<'a>>,
        otherwise: Vec<Node<'a>>,
    },
}

/// Renders `source` against `data`.
pub fn interpolate(source: &str, data: &Value, syntax: Syntax) -> Result<String> {
    let nodes = parse(source, syntax)?;
    let mut out = String::with_capacity(source.len());
    let scope = Scope {
        root: data,
        current: data,
        key: None,
        index: None,
    };
    write_nodes(&nodes, &scope, &mut out);
    Ok(out)
}

enum Tag<'a> {
    Insert(&'a str, bool),
    Open(&'a str, &'a str),
    Else,
    Close(&'a str),
}

fn classify(tag: &str, raw: bool, syntax: Syntax) -> Tag<'_> {
    let tag = tag.trim();
    if raw {
        return Tag::Insert(tag, false);
    }
    if let Some(rest) = tag.strip_prefix('#') {
        let mut parts = rest.splitn(2, char::is_whitespace);
        let keyword = parts.next().unwrap_or("");
        let path = parts.next().unwrap_or("").trim();
        return Tag::Open(keyword, path);
    }
    if let Some(keyword) = tag.strip_prefix('/') {
        return Tag::Close(keyword.trim());
    }
    if tag == "else" {
        return Tag::Else;
    }
    let path = tag.strip_prefix('=').map(str::trim).unwrap_or(tag);
    Tag::Insert(path, syntax == Syntax::Markup)
}

fn parse(source: &str, syntax: Syntax) -> Result<Vec<Node<'_>>> {
    // one frame per open section: (keyword, path, body, else-body, seen else)
    let mut stack: Vec<(&str, &str, Vec<Node>, Vec<Node>, bool)> = Vec::new();
    let mut top: Vec<Node> = Vec::new();
    let mut rest = source;

    fn push<'a>(
        stack: &mut Vec<(&'a str, &'a str, Vec<Node<'a>>, Vec<Node<'a>>, bool)>,
        top: &mut Vec<Node<'a>>,
        node: Node<'a>,
    ) {
        match stack.last_mut() {
            Some((_, _, _, otherwise, true)) => otherwise.push(node),
            Some((_, _, body, _, false)) => body.push(node),
            None => top.push(node),
        }
    }

    while let Some(start) = rest.find(syntax.open()) {
        if start > 0 {
            push(&mut stack, &mut top, Node::Text(&rest[..start]));
        }
        let after_open = &rest[start + syntax.open().len()..];
        let raw = syntax == Syntax::Markup && after_open.starts_with('{');
        let (inner_start, close) = if raw { (1, "}}}") } else { (0, syntax.close()) };
        let end = after_open[inner_start..]
            .find(close)
            .ok_or_else(|| Error::format("template", "unterminated tag"))?;
        let tag = &after_open[inner_start..inner_start + end];
        rest = &after_open[inner_start + end + close.len()..];

        match classify(tag, raw, syntax) {
            Tag::Insert(path, escape) => push(&mut stack, &mut top, Node::Insert { path, escape }),
            Tag::Open(keyword @ ("each" | "if"), path) => {
                stack.push((keyword, path, Vec::new(), Vec::new(), false));
            }
            Tag::Open(keyword, _) => {
                return Err(Error::format("template", format!("unknown section #{}", keyword)));
            }
            Tag::Else => match stack.last_mut() {
                Some(("if", _, _, _, seen_else)) if !*seen_else => *seen_else = true,
                _ => return Err(Error::format("template", "else outside of #if")),
            },
            Tag::Close(keyword) => {
                let (open, path, body, otherwise, _) = stack
                    .pop()
                    .ok_or_else(|| Error::format("template", format!("unmatched /{}", keyword)))?;
                if open != keyword {
                    return Err(Error::format(
                        "template",
                        format!("#{} closed by /{}", open, keyword),
                    ));
                }
                let node = if open == "each" {
                    Node::Each { path, body }
                } else {
                    Node::If {
                        path,
                        then: body,
                        otherwise,
                    }
                };
                push(&mut stack, &mut top, node);
            }
        }
    }

    if let Some((open, ..)) = stack.last() {
        return Err(Error::format("template", format!("unclosed #{}", open)));
    }
    if !rest.is_empty() {
        top.push(Node::Text(rest));
    }
    Ok(top)
}

struct Scope<'a> {
    root: &'a Value,
    current: &'a Value,
    key: Option<String>,
    index: Option<usize>,
}

impl<'a> Scope<'a> {
    fn lookup(&self, path: &str) -> Option<Value> {
        match path {
            "this" | "." => return Some(self.current.clone()),
            "@key" => return self.key.clone().map(Value::String),
            "@index" => return self.index.map(Value::from),
            _ => {}
        }
        let path = path.strip_prefix("this.").unwrap_or(path);
        walk(self.current, path)
            .or_else(|| walk(self.root, path))
            .cloned()
    }
}

fn walk<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    path.split('.').try_fold(value, |value, segment| match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn truthy(value: &Option<Value>) -> bool {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Number(n)) => n.as_f64() != Some(0.),
        Some(Value::Object(_)) | Some(Value::Bool(true)) => true,
    }
}

fn write_nodes(nodes: &[Node], scope: &Scope, out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Insert { path, escape } => match scope.lookup(path) {
                None | Some(Value::Null) => {}
                Some(Value::String(s)) => write_text(&s, *escape, out),
                Some(other) => write_text(&other.to_string(), *escape, out),
            },
            Node::If {
                path,
                then,
                otherwise,
            } => {
                if truthy(&scope.lookup(path)) {
                    write_nodes(then, scope, out);
                } else {
                    write_nodes(otherwise, scope, out);
                }
            }
            Node::Each { path, body } => match scope.lookup(path) {
                Some(Value::Array(items)) => {
                    for (index, item) in items.iter().enumerate() {
                        let inner = Scope {
                            root: scope.root,
                            current: item,
                            key: None,
                            index: Some(index),
                        };
                        write_nodes(body, &inner, out);
                    }
                }
                Some(Value::Object(map)) => {
                    for (index, (key, item)) in map.iter().enumerate() {
                        let inner = Scope {
                            root: scope.root,
                            current: item,
                            key: Some(key.clone()),
                            index: Some(index),
                        };
                        write_nodes(body, &inner, out);
                    }
                }
                _ => {}
            },
        }
    }
}

fn write_text(text: &str, escape: bool, out: &mut String) {
    if !escape {
        out.push_str(text);
        return;
    }
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
}
