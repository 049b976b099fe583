//! Embedded-expression templates
//!
//! Templates mix literal text with `{{ expr }}` substitutions and
//! `{{if expr}} ... {{elif expr}} ... {{else}} ... {{endif}}` blocks.
//! Expressions are evaluated against a [`Scope`], which supplies root names
//! and lazily resolved namespaces. Evaluation never performs I/O; the only
//! callable names are the builtins in [`builtins`].

pub mod builtins;
pub mod eval;
pub mod expr;
pub mod value;

pub use eval::{evaluate, Binding, Scope};
pub use expr::{parse as parse_expression, Expr};
pub use value::{str_is_truthy, Value};

use crate::error::{InterpolationError, InterpolationResult};

/// Byte spans of every `{{ ... }}` tag, braces included
///
/// A `}}` inside a quoted string does not close the tag. An opening `{{`
/// with no closing braces is left as text.
fn tag_spans(source: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut from = 0;
    while let Some(found) = source[from..].find("{{") {
        let start = from + found;
        match closing_braces(source, start + 2) {
            Some(close) => {
                spans.push((start, close + 2));
                from = close + 2;
            }
            None => break,
        }
    }
    spans
}

fn closing_braces(source: &str, from: usize) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut quote = None;
    let mut i = from;
    while i < bytes.len() {
        match (quote, bytes[i]) {
            (Some(_), b'\\') => i += 1,
            (Some(q), b) if b == q => quote = None,
            (Some(_), _) => {}
            (None, b @ (b'"' | b'\'')) => quote = Some(b),
            (None, b'}') if bytes.get(i + 1) == Some(&b'}') => return Some(i),
            (None, _) => {}
        }
        i += 1;
    }
    // Unbalanced quotes: close at the first braces so the lexer can report it
    source[from..].find("}}").map(|found| from + found)
}

/// A parsed template
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    source: String,
    nodes: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Expr(Expr),
    If {
        branches: Vec<(Expr, Vec<Node>)>,
        otherwise: Vec<Node>,
    },
}

/// One `{{ ... }}` occurrence, after standalone-line trimming
#[derive(Debug)]
enum Tag {
    Expr(Expr),
    If(Expr),
    Elif(Expr),
    Else,
    EndIf,
}

impl Template {
    /// Parse a template source
    pub fn parse(source: &str) -> InterpolationResult<Self> {
        let mut tokens: Vec<(usize, Result<String, Tag>)> = Vec::new();
        let mut last = 0;

        for (tag_start, tag_end) in tag_spans(source) {
            let tag = parse_tag(&source[tag_start + 2..tag_end - 2], tag_start + 2)?;

            let (mut start, mut end) = (tag_start, tag_end);
            if !matches!(tag, Tag::Expr(_)) {
                if let Some((line_start, line_end)) = standalone_line(source, start, end) {
                    if line_start >= last {
                        start = line_start;
                        end = line_end;
                    }
                }
            }

            if start > last {
                tokens.push((last, Ok(source[last..start].to_string())));
            }
            tokens.push((tag_start, Err(tag)));
            last = end;
        }
        if last < source.len() {
            tokens.push((last, Ok(source[last..].to_string())));
        }

        let mut iter = tokens.into_iter().peekable();
        let nodes = parse_nodes(&mut iter, false)?;
        if let Some((offset, _)) = iter.next() {
            return Err(InterpolationError::InvalidSyntax {
                offset,
                message: "unexpected block tag".to_string(),
            });
        }

        Ok(Template {
            source: source.to_string(),
            nodes,
        })
    }

    /// The original template text
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether the template contains any tags at all
    pub fn is_literal(&self) -> bool {
        self.nodes.iter().all(|n| matches!(n, Node::Text(_)))
    }

    /// Render the template against a scope
    pub fn render(&self, scope: &dyn Scope) -> InterpolationResult<String> {
        let mut out = String::new();
        render_nodes(&self.nodes, scope, &mut out)?;
        Ok(out)
    }
}

/// Parse and render in one step
pub fn render(source: &str, scope: &dyn Scope) -> InterpolationResult<String> {
    Template::parse(source)?.render(scope)
}

/// Render a template and read the result as a boolean
pub fn render_condition(source: &str, scope: &dyn Scope) -> InterpolationResult<bool> {
    render(source, scope).map(|s| str_is_truthy(&s))
}

// Offsets point at the offending character; an expression that ends too
// early is reported at the closing `}}`.
fn parse_tag(inner: &str, offset: usize) -> InterpolationResult<Tag> {
    let body = inner.trim_start();
    let lead = inner.len() - body.len();
    let shift = |err: InterpolationError| match err {
        InterpolationError::InvalidSyntax { offset: o, message } => {
            InterpolationError::InvalidSyntax {
                offset: offset + lead + o,
                message,
            }
        }
        other => other,
    };

    let keyword_expr = |keyword: &str| -> Option<&str> {
        body.strip_prefix(keyword)
            .filter(|rest| rest.starts_with(char::is_whitespace))
    };

    if let Some(rest) = keyword_expr("if") {
        let lead_rest = body.len() - rest.len();
        return expr::parse(rest)
            .map(Tag::If)
            .map_err(|e| shift(offset_by(e, lead_rest)));
    }
    if let Some(rest) = keyword_expr("elif") {
        let lead_rest = body.len() - rest.len();
        return expr::parse(rest)
            .map(Tag::Elif)
            .map_err(|e| shift(offset_by(e, lead_rest)));
    }
    match body.trim_end() {
        "else" => Ok(Tag::Else),
        "endif" => Ok(Tag::EndIf),
        keyword @ ("if" | "elif") => Err(shift(InterpolationError::InvalidSyntax {
            offset: 0,
            message: format!("'{}' requires a condition", keyword),
        })),
        _ => expr::parse(body).map(Tag::Expr).map_err(shift),
    }
}

fn offset_by(err: InterpolationError, by: usize) -> InterpolationError {
    match err {
        InterpolationError::InvalidSyntax { offset, message } => {
            InterpolationError::InvalidSyntax {
                offset: offset + by,
                message,
            }
        }
        other => other,
    }
}

/// If the tag at `start..end` is the only thing on its line, return the
/// span of the whole line including its newline.
fn standalone_line(source: &str, start: usize, end: usize) -> Option<(usize, usize)> {
    let line_start = source[..start].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let line_end = source[end..]
        .find('\n')
        .map(|i| end + i + 1)
        .unwrap_or(source.len());

    let before = &source[line_start..start];
    let after = &source[end..line_end];
    if before.trim().is_empty() && after.trim().is_empty() {
        Some((line_start, line_end))
    } else {
        None
    }
}

type TokenIter = std::iter::Peekable<std::vec::IntoIter<(usize, Result<String, Tag>)>>;

fn parse_nodes(iter: &mut TokenIter, in_block: bool) -> InterpolationResult<Vec<Node>> {
    let mut nodes = Vec::new();

    while let Some((offset, token)) = iter.peek() {
        let offset = *offset;
        match token {
            Ok(_) | Err(Tag::Expr(_)) => {}
            Err(Tag::Elif(_)) | Err(Tag::Else) | Err(Tag::EndIf) => {
                if in_block {
                    return Ok(nodes);
                }
                return Err(InterpolationError::InvalidSyntax {
                    offset,
                    message: "block tag without matching {{if}}".to_string(),
                });
            }
            Err(Tag::If(_)) => {}
        }

        let Some((offset, token)) = iter.next() else {
            break;
        };
        match token {
            Ok(text) => nodes.push(Node::Text(text)),
            Err(Tag::Expr(expr)) => nodes.push(Node::Expr(expr)),
            Err(Tag::If(condition)) => nodes.push(parse_if(iter, condition, offset)?),
            Err(_) => unreachable!("block terminators are handled before consuming"),
        }
    }

    Ok(nodes)
}

fn parse_if(iter: &mut TokenIter, condition: Expr, offset: usize) -> InterpolationResult<Node> {
    let mut branches = vec![(condition, parse_nodes(iter, true)?)];
    let mut otherwise = Vec::new();

    loop {
        match iter.next() {
            Some((_, Err(Tag::Elif(condition)))) => {
                let body = parse_nodes(iter, true)?;
                branches.push((condition, body));
            }
            Some((else_offset, Err(Tag::Else))) => {
                otherwise = parse_nodes(iter, true)?;
                match iter.next() {
                    Some((_, Err(Tag::EndIf))) => break,
                    _ => {
                        return Err(InterpolationError::InvalidSyntax {
                            offset: else_offset,
                            message: "{{else}} must be followed by {{endif}}".to_string(),
                        })
                    }
                }
            }
            Some((_, Err(Tag::EndIf))) => break,
            _ => {
                return Err(InterpolationError::InvalidSyntax {
                    offset,
                    message: "{{if}} without matching {{endif}}".to_string(),
                })
            }
        }
    }

    Ok(Node::If {
        branches,
        otherwise,
    })
}

fn render_nodes(nodes: &[Node], scope: &dyn Scope, out: &mut String) -> InterpolationResult<()> {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Expr(expr) => out.push_str(&evaluate(expr, scope)?.to_string()),
            Node::If {
                branches,
                otherwise,
            } => {
                let mut taken = false;
                for (condition, body) in branches {
                    if evaluate(condition, scope)?.is_truthy() {
                        render_nodes(body, scope, out)?;
                        taken = true;
                        break;
                    }
                }
                if !taken {
                    render_nodes(otherwise, scope, out)?;
                }
            }
        }
    }
    Ok(())
}
