//! Lightweight structural checks on rendered Cypher text.
//!
//! These do not parse Cypher. They catch the failure class that broken
//! quoting produces (unterminated strings, unbalanced brackets) before a
//! statement is submitted, and detect mutating clauses for read-mode guards.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} at offset {offset}")]
pub struct SyntaxDiagnostic {
    pub offset: usize,
    pub message: String,
}

impl SyntaxDiagnostic {
    fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

const MUTATING_CLAUSES: &[&str] = &["CREATE", "MERGE", "DELETE", "DETACH", "SET", "REMOVE", "DROP"];

/// Full check for a path statement: `MATCH` prefix, `;` suffix, balanced
/// brackets, and terminated strings.
pub fn check_syntax(statement: &str) -> Result<(), SyntaxDiagnostic> {
    let trimmed = statement.trim();
    if !trimmed
        .get(..5)
        .is_some_and(|head| head.eq_ignore_ascii_case("MATCH"))
    {
        return Err(SyntaxDiagnostic::new(0, "statement must start with MATCH"));
    }
    if !trimmed.ends_with(';') {
        return Err(SyntaxDiagnostic::new(
            trimmed.len(),
            "statement must end with ';'",
        ));
    }
    check_balanced(statement)
}

/// Brackets balance outside string literals and every literal terminates.
pub fn check_balanced(text: &str) -> Result<(), SyntaxDiagnostic> {
    let mut stack: Vec<(usize, char)> = Vec::new();
    for token in Scanner::new(text) {
        match token {
            Token::Open(offset, c) => stack.push((offset, c)),
            Token::Close(offset, c) => match stack.pop() {
                Some((_, open)) if closes(open) == c => {}
                Some((at, open)) => {
                    return Err(SyntaxDiagnostic::new(
                        offset,
                        format!("'{c}' does not close '{open}' opened at offset {at}"),
                    ))
                }
                None => return Err(SyntaxDiagnostic::new(offset, format!("unmatched '{c}'"))),
            },
            Token::Unterminated(offset, quote) => {
                return Err(SyntaxDiagnostic::new(
                    offset,
                    format!("unterminated {quote} literal"),
                ))
            }
            Token::Word(..) => {}
        }
    }
    match stack.pop() {
        Some((offset, c)) => Err(SyntaxDiagnostic::new(offset, format!("unclosed '{c}'"))),
        None => Ok(()),
    }
}

/// The first mutating clause keyword outside string literals, if any.
///
/// Map keys, labels, relationship types, and property accesses are skipped.
pub fn mutating_clause(text: &str) -> Option<&'static str> {
    Scanner::new(text).find_map(|token| match token {
        Token::Word(word, true) => MUTATING_CLAUSES
            .iter()
            .find(|clause| clause.eq_ignore_ascii_case(word))
            .copied(),
        _ => None,
    })
}

fn closes(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

enum Token<'a> {
    Open(usize, char),
    Close(usize, char),
    /// A bare word and whether it sits where a clause keyword could.
    Word(&'a str, bool),
    Unterminated(usize, char),
}

/// Yields brackets and bare words, skipping string and backtick literals.
struct Scanner<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn skip_literal(&mut self, start: usize, quote: char) -> bool {
        let mut escaped = false;
        for (i, c) in self.text[start + 1..].char_indices() {
            if escaped {
                escaped = false;
            } else if c == '\\' && quote != '`' {
                escaped = true;
            } else if c == quote {
                self.pos = start + 1 + i + c.len_utf8();
                return true;
            }
        }
        self.pos = self.text.len();
        false
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        while let Some(c) = self.text[self.pos..].chars().next() {
            let start = self.pos;
            match c {
                '"' | '\'' | '`' => {
                    if !self.skip_literal(start, c) {
                        return Some(Token::Unterminated(start, c));
                    }
                }
                '(' | '[' | '{' => {
                    self.pos += 1;
                    return Some(Token::Open(start, c));
                }
                ')' | ']' | '}' => {
                    self.pos += 1;
                    return Some(Token::Close(start, c));
                }
                c if c.is_alphabetic() || c == '_' => {
                    let text = self.text;
                    let rest = &text[start..];
                    let len = rest
                        .find(|ch: char| !(ch.is_alphanumeric() || ch == '_'))
                        .unwrap_or(rest.len());
                    self.pos = start + len;
                    let before = text[..start].trim_end();
                    let keyword_position = !text[self.pos..].trim_start().starts_with(':')
                        && !before.ends_with(':')
                        && !before.ends_with('.');
                    return Some(Token::Word(&rest[..len], keyword_position));
                }
                c => self.pos += c.len_utf8(),
            }
        }
        None
    }
}
