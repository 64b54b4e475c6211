use crate::error::{DbError, DbResult};
use crate::sql::ast::{CompOp, CondAttr, Condition, SelectAttr, Statement};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Literal(String),
    Symbol(String),
}

impl Token {
    fn text(&self) -> &str {
        match self {
            Token::Word(s) | Token::Literal(s) | Token::Symbol(s) => s,
        }
    }

    fn is_keyword(&self, kw: &str) -> bool {
        matches!(self, Token::Word(s) if s.eq_ignore_ascii_case(kw))
    }
}

fn err(msg: impl Into<String>) -> DbError {
    DbError::ParseError(msg.into())
}

/// Split a statement into words, quoted literals and operator symbols.
/// Quotes may be single or double; `<>`, `<=` and `>=` are one token.
fn tokenize(input: &str) -> DbResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\r' | '\n' => {
                chars.next();
            }
            '\'' | '"' => {
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some(q) if q == c => break,
                        Some(ch) => s.push(ch),
                        None => return Err(err("unterminated string literal")),
                    }
                }
                tokens.push(Token::Literal(s));
            }
            '<' | '>' => {
                chars.next();
                let mut s = String::from(c);
                if let Some(&next) = chars.peek() {
                    if next == '=' || (c == '<' && next == '>') {
                        s.push(next);
                        chars.next();
                    }
                }
                tokens.push(Token::Symbol(s));
            }
            '=' | '(' | ')' | '*' | ';' => {
                chars.next();
                tokens.push(Token::Symbol(c.to_string()));
            }
            _ if c.is_alphanumeric() || c == '_' || c == '-' || c == '.' || c == '/' => {
                let mut s = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' || ch == '-' || ch == '.' || ch == '/' {
                        s.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Word(s));
            }
            _ => return Err(err(format!("unexpected character '{}'", c))),
        }
    }

    // A trailing semicolon is allowed and ignored.
    if tokens.last() == Some(&Token::Symbol(";".into())) {
        tokens.pop();
    }
    Ok(tokens)
}

fn parse_select(tokens: &[Token]) -> DbResult<Statement> {
    // SELECT <attr> FROM <table> [WHERE cond [AND cond]*]
    let from = tokens
        .iter()
        .position(|t| t.is_keyword("FROM"))
        .ok_or_else(|| err("SELECT requires FROM"))?;

    let attr_text: String = tokens[1..from]
        .iter()
        .map(|t| t.text().to_ascii_lowercase())
        .collect();
    let attr = match attr_text.as_str() {
        "key" => SelectAttr::Key,
        "value" => SelectAttr::Value,
        "*" => SelectAttr::All,
        "count(*)" => SelectAttr::Count,
        _ => return Err(err(format!("unknown attribute '{}'", attr_text))),
    };

    let table = match tokens.get(from + 1) {
        Some(Token::Word(name)) => name.clone(),
        _ => return Err(err("missing table name after FROM")),
    };

    let mut conds = Vec::new();
    let mut pos = from + 2;
    if pos < tokens.len() {
        if !tokens[pos].is_keyword("WHERE") {
            return Err(err("expected WHERE after table name"));
        }
        pos += 1;
        loop {
            if tokens.len() < pos + 3 {
                return Err(err("incomplete condition"));
            }
            let attr = match &tokens[pos] {
                t if t.is_keyword("key") => CondAttr::Key,
                t if t.is_keyword("value") => CondAttr::Value,
                t => return Err(err(format!("unknown attribute '{}'", t.text()))),
            };
            let op = match tokens[pos + 1].text() {
                "=" => CompOp::Eq,
                "<>" => CompOp::Ne,
                "<" => CompOp::Lt,
                ">" => CompOp::Gt,
                "<=" => CompOp::Le,
                ">=" => CompOp::Ge,
                other => return Err(err(format!("unknown operator '{}'", other))),
            };
            let value = match &tokens[pos + 2] {
                Token::Word(s) | Token::Literal(s) => s.clone(),
                t => return Err(err(format!("bad literal '{}'", t.text()))),
            };
            if attr == CondAttr::Key && value.parse::<i32>().is_err() {
                return Err(err(format!("key literal '{}' is not an integer", value)));
            }
            conds.push(Condition { attr, op, value });
            pos += 3;

            if pos == tokens.len() {
                break;
            }
            if !tokens[pos].is_keyword("AND") {
                return Err(err("conditions must be joined with AND"));
            }
            pos += 1;
        }
    }

    Ok(Statement::Select { attr, table, conds })
}

fn parse_load(tokens: &[Token]) -> DbResult<Statement> {
    // LOAD <table> FROM '<file>' [WITH INDEX]
    let table = match tokens.get(1) {
        Some(Token::Word(name)) => name.clone(),
        _ => return Err(err("missing table name after LOAD")),
    };
    if !tokens.get(2).is_some_and(|t| t.is_keyword("FROM")) {
        return Err(err("LOAD requires FROM"));
    }
    let file = match tokens.get(3) {
        Some(Token::Word(f)) | Some(Token::Literal(f)) => f.clone(),
        _ => return Err(err("missing load file name")),
    };
    let with_index = match &tokens[4..] {
        [] => false,
        [a, b] if a.is_keyword("WITH") && b.is_keyword("INDEX") => true,
        _ => return Err(err("usage: LOAD <table> FROM '<file>' [WITH INDEX]")),
    };
    Ok(Statement::Load { table, file, with_index })
}

pub fn parse_statement(input: &str) -> DbResult<Statement> {
    let tokens = tokenize(input)?;
    let first = tokens.first().ok_or_else(|| err("empty input"))?;

    if first.is_keyword("SELECT") {
        parse_select(&tokens)
    } else if first.is_keyword("LOAD") {
        parse_load(&tokens)
    } else if first.is_keyword("QUIT") || first.is_keyword("EXIT") {
        Ok(Statement::Quit)
    } else {
        Err(err(format!("unrecognized command '{}'", first.text())))
    }
}
