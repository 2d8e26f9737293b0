use std::collections::HashMap;

use serde_json::{Map, Number, Value};
use thiserror::Error;

const MAX_DEPTH: usize = 64;

/// A top-level field of the executed operation with its arguments resolved
/// against the request variables
#[derive(Debug, Clone, PartialEq)]
pub struct RootField {
    pub name: String,
    pub arguments: Map<String, Value>,
}

impl RootField {
    pub fn argument_str(&self, name: &str) -> Option<&str> {
        self.arguments.get(name)?.as_str()
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DocumentError {
    #[error("Syntax error at {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("Operation '{0}' is not defined in the document")]
    UnknownOperation(String),

    #[error("Document defines several operations but no operationName")]
    AmbiguousOperation,

    #[error("Document defines no operation")]
    NoOperation,

    #[error("Unknown fragment '{0}'")]
    UnknownFragment(String),

    #[error("Fragment '{0}' spreads itself")]
    FragmentCycle(String),
}

fn syntax(offset: usize, message: impl Into<String>) -> DocumentError {
    DocumentError::Syntax {
        offset,
        message: message.into(),
    }
}

/// Root fields of the operation a request executes. Fragment spreads and
/// inline fragments at the root are expanded; `$name` arguments take the
/// value of the matching variable, or null when it is absent.
pub fn root_fields(source: &str, operation_name: Option<&str>, variables: &Value) -> Result<Vec<RootField>, DocumentError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: source.chars().count(),
        variables,
    };
    let (operations, fragments) = parser.document()?;

    let operation = match operation_name.filter(|n| !n.is_empty()) {
        Some(name) => match operations.iter().find(|op| op.name.as_deref() == Some(name)) {
            Some(op) => op,
            // A lone anonymous operation runs whatever name the client sent
            None => match operations.as_slice() {
                [only] if only.name.is_none() => only,
                _ => return Err(DocumentError::UnknownOperation(name.to_string())),
            },
        },
        None => match operations.as_slice() {
            [only] => only,
            [] => return Err(DocumentError::NoOperation),
            _ => return Err(DocumentError::AmbiguousOperation),
        },
    };

    let mut fields = Vec::new();
    expand(&operation.selections, &fragments, &mut Vec::new(), &mut fields)?;
    Ok(fields)
}

fn expand(
    selections: &[Selection],
    fragments: &HashMap<String, Vec<Selection>>,
    path: &mut Vec<String>,
    out: &mut Vec<RootField>,
) -> Result<(), DocumentError> {
    for selection in selections {
        match selection {
            Selection::Field { name, arguments } => out.push(RootField {
                name: name.clone(),
                arguments: arguments.clone(),
            }),
            Selection::Inline(inner) => expand(inner, fragments, path, out)?,
            Selection::Spread(name) => {
                if path.contains(name) {
                    return Err(DocumentError::FragmentCycle(name.clone()));
                }
                let inner = fragments
                    .get(name)
                    .ok_or_else(|| DocumentError::UnknownFragment(name.clone()))?;
                path.push(name.clone());
                expand(inner, fragments, path, out)?;
                path.pop();
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Punct(char),
    Spread,
    Name(String),
    Number(String),
    Str(String),
}

fn tokenize(source: &str) -> Result<Vec<(usize, Token)>, DocumentError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let start = i;
        match chars[i] {
            '\u{feff}' | ',' => i += 1,
            c if c.is_whitespace() => i += 1,
            '#' => {
                while i < chars.len() && chars[i] != '\n' && chars[i] != '\r' {
                    i += 1;
                }
            }
            '.' => {
                if !chars[i..].starts_with(&['.', '.', '.']) {
                    return Err(syntax(start, "expected '...'"));
                }
                tokens.push((start, Token::Spread));
                i += 3;
            }
            c @ ('!' | '$' | '&' | '(' | ')' | ':' | '=' | '@' | '[' | ']' | '{' | '|' | '}') => {
                tokens.push((start, Token::Punct(c)));
                i += 1;
            }
            '"' => {
                let (value, next) = read_string(&chars, start)?;
                tokens.push((start, Token::Str(value)));
                i = next;
            }
            c if c == '-' || c.is_ascii_digit() => {
                let next = read_number(&chars, start)?;
                tokens.push((start, Token::Number(chars[start..next].iter().collect())));
                i = next;
            }
            c if c == '_' || c.is_ascii_alphabetic() => {
                while i < chars.len() && (chars[i] == '_' || chars[i].is_ascii_alphanumeric()) {
                    i += 1;
                }
                tokens.push((start, Token::Name(chars[start..i].iter().collect())));
            }
            other => return Err(syntax(start, format!("unexpected character '{}'", other))),
        }
    }
    Ok(tokens)
}

/// String or block string starting at `start`; returns the value and the
/// index after the closing quote
fn read_string(chars: &[char], start: usize) -> Result<(String, usize), DocumentError> {
    let mut value = String::new();

    if chars[start..].starts_with(&['"', '"', '"']) {
        let mut i = start + 3;
        loop {
            if chars[i..].starts_with(&['"', '"', '"']) {
                return Ok((value, i + 3));
            }
            if chars[i..].starts_with(&['\\', '"', '"', '"']) {
                value.push_str("\"\"\"");
                i += 4;
                continue;
            }
            match chars.get(i).copied() {
                Some(c) => value.push(c),
                None => return Err(syntax(start, "unterminated block string")),
            }
            i += 1;
        }
    }

    let mut i = start + 1;
    loop {
        match chars.get(i).copied() {
            None | Some('\n') | Some('\r') => return Err(syntax(start, "unterminated string")),
            Some('"') => return Ok((value, i + 1)),
            Some('\\') => {
                let escaped = match chars.get(i + 1).copied() {
                    Some('"') => '"',
                    Some('\\') => '\\',
                    Some('/') => '/',
                    Some('b') => '\u{8}',
                    Some('f') => '\u{c}',
                    Some('n') => '\n',
                    Some('r') => '\r',
                    Some('t') => '\t',
                    Some('u') => {
                        let hex: String = chars.get(i + 2..i + 6).unwrap_or_default().iter().collect();
                        let c = u32::from_str_radix(&hex, 16)
                            .ok()
                            .and_then(char::from_u32)
                            .ok_or_else(|| syntax(i, "invalid unicode escape"))?;
                        value.push(c);
                        i += 6;
                        continue;
                    }
                    _ => return Err(syntax(i, "invalid escape")),
                };
                value.push(escaped);
                i += 2;
            }
            Some(c) => {
                value.push(c);
                i += 1;
            }
        }
    }
}

/// Index after the number literal starting at `start`
fn read_number(chars: &[char], start: usize) -> Result<usize, DocumentError> {
    let digits = |i: &mut usize| {
        let from = *i;
        while chars.get(*i).is_some_and(char::is_ascii_digit) {
            *i += 1;
        }
        *i > from
    };

    let mut i = start;
    if chars[i] == '-' {
        i += 1;
    }
    if !digits(&mut i) {
        return Err(syntax(start, "malformed number"));
    }
    if chars.get(i) == Some(&'.') {
        i += 1;
        if !digits(&mut i) {
            return Err(syntax(start, "malformed number"));
        }
    }
    if matches!(chars.get(i).copied(), Some('e') | Some('E')) {
        i += 1;
        if matches!(chars.get(i).copied(), Some('+') | Some('-')) {
            i += 1;
        }
        if !digits(&mut i) {
            return Err(syntax(start, "malformed number"));
        }
    }
    Ok(i)
}

fn number(text: &str) -> Option<Value> {
    if let Ok(int) = text.parse::<i64>() {
        return Some(Value::from(int));
    }
    text.parse::<f64>().ok().and_then(Number::from_f64).map(Value::Number)
}

enum Selection {
    Field { name: String, arguments: Map<String, Value> },
    Spread(String),
    Inline(Vec<Selection>),
}

struct Operation {
    name: Option<String>,
    selections: Vec<Selection>,
}

type Fragments = HashMap<String, Vec<Selection>>;

struct Parser<'a> {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    end: usize,
    variables: &'a Value,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, token)| token)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.peek().cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, message: impl Into<String>) -> DocumentError {
        let offset = self.tokens.get(self.pos).map_or(self.end, |(offset, _)| *offset);
        syntax(offset, message)
    }

    fn at(&self, c: char) -> bool {
        self.peek() == Some(&Token::Punct(c))
    }

    fn eat(&mut self, c: char) -> bool {
        let found = self.at(c);
        if found {
            self.pos += 1;
        }
        found
    }

    fn expect(&mut self, c: char) -> Result<(), DocumentError> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", c)))
        }
    }

    fn name(&mut self) -> Result<String, DocumentError> {
        match self.peek() {
            Some(Token::Name(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error("expected a name")),
        }
    }

    fn document(&mut self) -> Result<(Vec<Operation>, Fragments), DocumentError> {
        let mut operations = Vec::new();
        let mut fragments = HashMap::new();

        while let Some(token) = self.peek().cloned() {
            match token {
                Token::Punct('{') => {
                    let selections = self.selection_set(0)?;
                    operations.push(Operation { name: None, selections });
                }
                Token::Name(keyword) if keyword == "fragment" => {
                    self.pos += 1;
                    let name = self.name()?;
                    if self.name()? != "on" {
                        return Err(self.error("expected 'on'"));
                    }
                    self.name()?;
                    self.directives()?;
                    let selections = self.selection_set(0)?;
                    fragments.insert(name, selections);
                }
                Token::Name(keyword) if matches!(keyword.as_str(), "query" | "mutation" | "subscription") => {
                    self.pos += 1;
                    let name = match self.peek() {
                        Some(Token::Name(_)) => Some(self.name()?),
                        _ => None,
                    };
                    if self.at('(') {
                        self.skip_variable_definitions()?;
                    }
                    self.directives()?;
                    let selections = self.selection_set(0)?;
                    operations.push(Operation { name, selections });
                }
                _ => return Err(self.error("expected an operation or fragment definition")),
            }
        }
        Ok((operations, fragments))
    }

    fn skip_variable_definitions(&mut self) -> Result<(), DocumentError> {
        self.expect('(')?;
        let mut depth = 1;
        while depth > 0 {
            match self.next() {
                Some(Token::Punct('(')) => depth += 1,
                Some(Token::Punct(')')) => depth -= 1,
                Some(_) => {}
                None => return Err(self.error("unterminated variable definitions")),
            }
        }
        Ok(())
    }

    fn directives(&mut self) -> Result<(), DocumentError> {
        while self.eat('@') {
            self.name()?;
            if self.at('(') {
                self.arguments()?;
            }
        }
        Ok(())
    }

    fn selection_set(&mut self, depth: usize) -> Result<Vec<Selection>, DocumentError> {
        if depth > MAX_DEPTH {
            return Err(self.error("selections nested too deeply"));
        }
        self.expect('{')?;

        let mut selections = Vec::new();
        while !self.eat('}') {
            match self.peek().cloned() {
                Some(Token::Spread) => {
                    self.pos += 1;
                    match self.peek().cloned() {
                        Some(Token::Name(name)) if name != "on" => {
                            self.pos += 1;
                            self.directives()?;
                            selections.push(Selection::Spread(name));
                        }
                        Some(Token::Name(_)) => {
                            self.pos += 1;
                            self.name()?;
                            self.directives()?;
                            selections.push(Selection::Inline(self.selection_set(depth + 1)?));
                        }
                        _ => {
                            self.directives()?;
                            selections.push(Selection::Inline(self.selection_set(depth + 1)?));
                        }
                    }
                }
                Some(Token::Name(_)) => {
                    let mut name = self.name()?;
                    if self.eat(':') {
                        name = self.name()?;
                    }
                    let arguments = if self.at('(') { self.arguments()? } else { Map::new() };
                    self.directives()?;
                    if self.at('{') {
                        self.selection_set(depth + 1)?;
                    }
                    selections.push(Selection::Field { name, arguments });
                }
                Some(_) => return Err(self.error("expected a field")),
                None => return Err(self.error("unterminated selection set")),
            }
        }
        Ok(selections)
    }

    fn arguments(&mut self) -> Result<Map<String, Value>, DocumentError> {
        self.expect('(')?;
        let mut arguments = Map::new();
        while !self.eat(')') {
            let name = self.name()?;
            self.expect(':')?;
            let value = self.value(0)?;
            arguments.insert(name, value);
        }
        Ok(arguments)
    }

    fn value(&mut self, depth: usize) -> Result<Value, DocumentError> {
        if depth > MAX_DEPTH {
            return Err(self.error("value nested too deeply"));
        }
        let at = self.error("expected a value");
        match self.next() {
            Some(Token::Punct('$')) => {
                let name = self.name()?;
                Ok(self.variables.get(&name).cloned().unwrap_or(Value::Null))
            }
            Some(Token::Number(text)) => number(&text).ok_or(at),
            Some(Token::Str(s)) => Ok(Value::String(s)),
            Some(Token::Name(name)) => Ok(match name.as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                "null" => Value::Null,
                _ => Value::String(name.clone()),
            }),
            Some(Token::Punct('[')) => {
                let mut items = Vec::new();
                while !self.eat(']') {
                    items.push(self.value(depth + 1)?);
                }
                Ok(Value::Array(items))
            }
            Some(Token::Punct('{')) => {
                let mut fields = Map::new();
                while !self.eat('}') {
                    let key = self.name()?;
                    self.expect(':')?;
                    let value = self.value(depth + 1)?;
                    fields.insert(key, value);
                }
                Ok(Value::Object(fields))
            }
            _ => Err(at),
        }
    }
}
