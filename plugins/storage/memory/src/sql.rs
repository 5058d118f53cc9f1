//! Parser for the statement dialect the record store emits.
//!
//! Only these shapes are understood:
//!
//! - `CREATE TABLE [IF NOT EXISTS] t (c TYPE [NOT NULL] [PRIMARY KEY], ...)`
//! - `ALTER TABLE t ADD COLUMN c TYPE`
//! - `ALTER TABLE t DROP COLUMN c`
//! - `INSERT INTO t (c, ...) VALUES (?, ...)`
//! - `DELETE FROM t [LIMIT n]`
//! - `TRUNCATE TABLE t`
//!
//! A trailing `;` is optional. Keywords are case-insensitive, identifiers
//! are case-sensitive.

use wirestore_api::{ColumnType, StoreError, is_reserved_word};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
    pub not_null: bool,
    pub primary_key: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Statement {
    CreateTable {
        table: String,
        if_not_exists: bool,
        columns: Vec<ColumnDef>,
    },
    AddColumn {
        table: String,
        column: ColumnDef,
    },
    DropColumn {
        table: String,
        column: String,
    },
    Insert {
        table: String,
        columns: Vec<String>,
        placeholders: usize,
    },
    Delete {
        table: String,
        limit: Option<u64>,
    },
    Truncate {
        table: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Number(u64),
    LParen,
    RParen,
    Comma,
    Placeholder,
}

fn tokenize(sql: &str) -> Result<Vec<Token>, StoreError> {
    let mut tokens = Vec::new();
    let mut chars = sql.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '?' => {
                chars.next();
                tokens.push(Token::Placeholder);
            }
            ';' => {
                chars.next();
                if chars.any(|c| !c.is_whitespace()) {
                    return Err(StoreError::format("multiple statements are not supported"));
                }
            }
            c if c.is_ascii_digit() => {
                let mut n: u64 = 0;
                while let Some(&d) = chars.peek() {
                    let Some(digit) = d.to_digit(10) else { break };
                    n = n
                        .checked_mul(10)
                        .and_then(|n| n.checked_add(u64::from(digit)))
                        .ok_or_else(|| StoreError::format("numeric literal overflow"))?;
                    chars.next();
                }
                tokens.push(Token::Number(n));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut word = String::new();
                while let Some(&w) = chars.peek() {
                    if w.is_ascii_alphanumeric() || w == '_' {
                        word.push(w);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Word(word));
            }
            other => {
                return Err(StoreError::format(format!(
                    "unexpected character '{other}' in statement"
                )));
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w.eq_ignore_ascii_case(kw))
    }

    fn keyword(&mut self, kw: &str) -> Result<(), StoreError> {
        match self.next() {
            Some(Token::Word(w)) if w.eq_ignore_ascii_case(kw) => Ok(()),
            other => Err(StoreError::format(format!("expected {kw}, found {other:?}"))),
        }
    }

    fn ident(&mut self) -> Result<String, StoreError> {
        match self.next() {
            Some(Token::Word(w)) => Ok(w),
            other => Err(StoreError::format(format!("expected identifier, found {other:?}"))),
        }
    }

    /// A table or column name. Reserved words are rejected as a real
    /// engine would reject them unquoted.
    fn name(&mut self) -> Result<String, StoreError> {
        let name = self.ident()?;
        if is_reserved_word(&name) {
            return Err(StoreError::format(format!(
                "reserved word '{name}' used as an identifier"
            )));
        }
        Ok(name)
    }

    fn expect(&mut self, token: Token) -> Result<(), StoreError> {
        match self.next() {
            Some(t) if t == token => Ok(()),
            other => Err(StoreError::format(format!("expected {token:?}, found {other:?}"))),
        }
    }

    fn number(&mut self) -> Result<u64, StoreError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(n),
            other => Err(StoreError::format(format!("expected number, found {other:?}"))),
        }
    }

    fn finish(&self) -> Result<(), StoreError> {
        match self.peek() {
            None => Ok(()),
            Some(t) => Err(StoreError::format(format!("unexpected trailing token {t:?}"))),
        }
    }

    fn column_type(&mut self) -> Result<ColumnType, StoreError> {
        let name = self.ident()?;
        let column_type = ColumnType::parse(&name)
            .ok_or_else(|| StoreError::format(format!("unknown column type '{name}'")))?;
        if self.peek() == Some(&Token::LParen) {
            self.next();
            self.number()?;
            self.expect(Token::RParen)?;
        }
        Ok(column_type)
    }

    fn column_def(&mut self) -> Result<ColumnDef, StoreError> {
        let name = self.name()?;
        let column_type = self.column_type()?;
        let mut not_null = false;
        let mut primary_key = false;
        loop {
            if self.peek_keyword("NOT") {
                self.next();
                self.keyword("NULL")?;
                not_null = true;
            } else if self.peek_keyword("PRIMARY") {
                self.next();
                self.keyword("KEY")?;
                primary_key = true;
            } else {
                break;
            }
        }
        Ok(ColumnDef {
            name,
            column_type,
            not_null,
            primary_key,
        })
    }

    fn statement(&mut self) -> Result<Statement, StoreError> {
        let verb = self.ident()?.to_ascii_uppercase();
        let stmt = match verb.as_str() {
            "CREATE" => {
                self.keyword("TABLE")?;
                let mut if_not_exists = false;
                if self.peek_keyword("IF") {
                    self.next();
                    self.keyword("NOT")?;
                    self.keyword("EXISTS")?;
                    if_not_exists = true;
                }
                let table = self.name()?;
                self.expect(Token::LParen)?;
                let mut columns = vec![self.column_def()?];
                while self.peek() == Some(&Token::Comma) {
                    self.next();
                    columns.push(self.column_def()?);
                }
                self.expect(Token::RParen)?;
                Statement::CreateTable {
                    table,
                    if_not_exists,
                    columns,
                }
            }
            "ALTER" => {
                self.keyword("TABLE")?;
                let table = self.name()?;
                let action = self.ident()?.to_ascii_uppercase();
                self.keyword("COLUMN")?;
                match action.as_str() {
                    "ADD" => Statement::AddColumn {
                        table,
                        column: self.column_def()?,
                    },
                    "DROP" => Statement::DropColumn {
                        table,
                        column: self.name()?,
                    },
                    other => {
                        return Err(StoreError::format(format!(
                            "unsupported ALTER TABLE action '{other}'"
                        )));
                    }
                }
            }
            "INSERT" => {
                self.keyword("INTO")?;
                let table = self.name()?;
                self.expect(Token::LParen)?;
                let mut columns = vec![self.name()?];
                while self.peek() == Some(&Token::Comma) {
                    self.next();
                    columns.push(self.name()?);
                }
                self.expect(Token::RParen)?;
                self.keyword("VALUES")?;
                self.expect(Token::LParen)?;
                self.expect(Token::Placeholder)?;
                let mut placeholders = 1;
                while self.peek() == Some(&Token::Comma) {
                    self.next();
                    self.expect(Token::Placeholder)?;
                    placeholders += 1;
                }
                self.expect(Token::RParen)?;
                Statement::Insert {
                    table,
                    columns,
                    placeholders,
                }
            }
            "DELETE" => {
                self.keyword("FROM")?;
                let table = self.name()?;
                let limit = if self.peek_keyword("LIMIT") {
                    self.next();
                    Some(self.number()?)
                } else {
                    None
                };
                Statement::Delete { table, limit }
            }
            "TRUNCATE" => {
                self.keyword("TABLE")?;
                Statement::Truncate {
                    table: self.name()?,
                }
            }
            other => {
                return Err(StoreError::format(format!("unsupported statement '{other}'")));
            }
        };
        self.finish()?;
        Ok(stmt)
    }
}

pub(crate) fn parse(sql: &str) -> Result<Statement, StoreError> {
    let tokens = tokenize(sql)?;
    Parser { tokens, pos: 0 }.statement()
}

/// Upper-cased leading keyword, used to match injected faults.
pub(crate) fn verb(sql: &str) -> String {
    sql.split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase()
}
