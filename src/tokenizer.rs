//! SQL Tokenizer — component A.
//!
//! Splits raw SQL text into a flat token stream, preserving byte offsets and
//! comment contents. This is not a general SQL grammar: it recognizes just
//! enough structure (words, punctuation, quoted identifiers, numbers,
//! whitespace, line/block comments, and `$n` parameters) for the Reference
//! Extractor, Schema Rewriter, and Test-Directive Parser to operate on
//! (spec.md §4.A, Non-goals in §1).

/// A single lexical token with its byte span in the original source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// An unquoted identifier or keyword, original-case text.
    Word(String),
    /// A double-quoted identifier; text is the content *between* the quotes,
    /// case preserved, with `""` already unescaped to `"`.
    Quoted(String),
    /// A single punctuation character (`.`, `,`, `(`, `)`, `;`, `*`, operators, …).
    Punct(char),
    /// A numeric literal, stored verbatim.
    Number(String),
    /// Contiguous whitespace.
    Whitespace,
    /// A `-- ...` comment; text excludes the leading `--` and trailing newline.
    LineComment(String),
    /// A `/* ... */` comment; text excludes the delimiters.
    BlockComment(String),
    /// A single-quoted string literal; text is the content between quotes
    /// with `''` already unescaped to `'`.
    StringLiteral(String),
    /// A `$n` positional parameter, n stored as text.
    Param(String),
}

impl Token {
    pub fn text<'a>(&self, src: &'a str) -> &'a str {
        &src[self.start..self.end]
    }

    pub fn as_word(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Word(w) => Some(w),
            _ => None,
        }
    }

    /// True for tokens the Reference Extractor and Schema Rewriter must
    /// skip over transparently: comments never carry SQL semantics.
    pub fn is_comment(&self) -> bool {
        matches!(self.kind, TokenKind::LineComment(_) | TokenKind::BlockComment(_))
    }
}

/// Split `src` into individual statements at top-level `;` boundaries,
/// trimmed and with empty statements dropped. Semicolons inside comments,
/// quoted identifiers, or string literals never split — the tokenizer
/// already swallows those whole (spec.md §4.A). Used to send an
/// incremental task's DELETE-then-INSERT script as separate prepared
/// statements (spec.md §4.G, scenario S6), since a single parameterized
/// `execute` rejects a query string with more than one command.
pub fn split_statements(src: &str) -> Vec<&str> {
    let tokens = tokenize(src);
    let mut statements = Vec::new();
    let mut start = 0usize;

    for tok in &tokens {
        if matches!(tok.kind, TokenKind::Punct(';')) {
            let stmt = src[start..tok.start].trim();
            if !stmt.is_empty() {
                statements.push(stmt);
            }
            start = tok.end;
        }
    }

    let tail = src[start..].trim();
    if !tail.is_empty() {
        statements.push(tail);
    }

    statements
}

/// Tokenize `src` into a flat sequence of [`Token`]s.
///
/// Unquoted identifiers are returned with their original case; callers that
/// need case-insensitive keyword matching should uppercase on the way in
/// (see [`Token::as_word`] combined with `str::eq_ignore_ascii_case`).
pub fn tokenize(src: &str) -> Vec<Token> {
    let bytes = src.as_bytes();
    let len = bytes.len();
    let mut tokens = Vec::new();
    let mut i = 0usize;

    while i < len {
        let c = bytes[i] as char;

        if c.is_whitespace() {
            let start = i;
            while i < len && (bytes[i] as char).is_whitespace() {
                i += 1;
            }
            tokens.push(Token {
                kind: TokenKind::Whitespace,
                start,
                end: i,
            });
            continue;
        }

        // Line comment: `-- ...` up to (not including) the newline.
        if c == '-' && i + 1 < len && bytes[i + 1] as char == '-' {
            let start = i;
            i += 2;
            let text_start = i;
            while i < len && bytes[i] as char != '\n' {
                i += 1;
            }
            tokens.push(Token {
                kind: TokenKind::LineComment(src[text_start..i].to_string()),
                start,
                end: i,
            });
            continue;
        }

        // Block comment: `/* ... */`, not nested.
        if c == '/' && i + 1 < len && bytes[i + 1] as char == '*' {
            let start = i;
            i += 2;
            let text_start = i;
            let mut text_end = len;
            while i + 1 < len {
                if bytes[i] as char == '*' && bytes[i + 1] as char == '/' {
                    text_end = i;
                    i += 2;
                    break;
                }
                i += 1;
            }
            if text_end == len && i >= len {
                i = len;
            }
            tokens.push(Token {
                kind: TokenKind::BlockComment(src[text_start..text_end].to_string()),
                start,
                end: i,
            });
            continue;
        }

        // Double-quoted identifier, `""` is an escaped quote.
        if c == '"' {
            let start = i;
            i += 1;
            let mut content = String::new();
            loop {
                if i >= len {
                    break;
                }
                if bytes[i] as char == '"' {
                    if i + 1 < len && bytes[i + 1] as char == '"' {
                        content.push('"');
                        i += 2;
                        continue;
                    }
                    i += 1;
                    break;
                }
                let ch = src[i..].chars().next().unwrap_or('\u{FFFD}');
                content.push(ch);
                i += ch.len_utf8();
            }
            tokens.push(Token {
                kind: TokenKind::Quoted(content),
                start,
                end: i,
            });
            continue;
        }

        // Single-quoted string literal, `''` is an escaped quote.
        if c == '\'' {
            let start = i;
            i += 1;
            let mut content = String::new();
            loop {
                if i >= len {
                    break;
                }
                if bytes[i] as char == '\'' {
                    if i + 1 < len && bytes[i + 1] as char == '\'' {
                        content.push('\'');
                        i += 2;
                        continue;
                    }
                    i += 1;
                    break;
                }
                let ch = src[i..].chars().next().unwrap_or('\u{FFFD}');
                content.push(ch);
                i += ch.len_utf8();
            }
            tokens.push(Token {
                kind: TokenKind::StringLiteral(content),
                start,
                end: i,
            });
            continue;
        }

        // `$n` positional parameter.
        if c == '$' && i + 1 < len && (bytes[i + 1] as char).is_ascii_digit() {
            let start = i;
            i += 1;
            let digits_start = i;
            while i < len && (bytes[i] as char).is_ascii_digit() {
                i += 1;
            }
            tokens.push(Token {
                kind: TokenKind::Param(src[digits_start..i].to_string()),
                start,
                end: i,
            });
            continue;
        }

        // Number.
        if c.is_ascii_digit() {
            let start = i;
            while i < len
                && ((bytes[i] as char).is_ascii_digit() || bytes[i] as char == '.')
            {
                i += 1;
            }
            tokens.push(Token {
                kind: TokenKind::Number(src[start..i].to_string()),
                start,
                end: i,
            });
            continue;
        }

        // Word: identifier or keyword.
        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < len {
                let ch = bytes[i] as char;
                if ch.is_alphanumeric() || ch == '_' {
                    i += 1;
                } else {
                    break;
                }
            }
            tokens.push(Token {
                kind: TokenKind::Word(src[start..i].to_string()),
                start,
                end: i,
            });
            continue;
        }

        // Anything else is single-character punctuation.
        let start = i;
        i += c.len_utf8();
        tokens.push(Token {
            kind: TokenKind::Punct(c),
            start,
            end: i,
        });
    }

    tokens
}
