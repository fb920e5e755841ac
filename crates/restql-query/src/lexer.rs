//! Tokenizer shared by the select, filter and order grammars.
//!
//! Splits on a configurable set of single-character separators plus
//! multi-character separators matched longest-first. Double-quoted strings
//! become single tokens with `"` and `\` unescaped; anything else inside
//! quotes passes through verbatim, commas and parentheses included. Every
//! token carries its byte offset for diagnostics.

/// A scanned token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub offset: usize,
    /// Quoted tokens never match separators or keywords.
    pub quoted: bool,
}

impl Token {
    /// Bare (unquoted) text match, used for keyword/separator checks.
    pub fn is(&self, text: &str) -> bool {
        !self.quoted && self.text == text
    }
}

#[derive(Debug)]
pub struct Lexer {
    tokens: Vec<Token>,
    cur: usize,
}

impl Lexer {
    /// Scan `input` with the given single-char separators and
    /// multi-char separators (longest first).
    ///
    /// `i` always sits on a char boundary: it advances by whole characters
    /// or by the byte length of a matched separator.
    pub fn scan(input: &str, singles: &str, longs: &[&str]) -> Self {
        let mut tokens = Vec::new();
        let mut normal = String::new();
        let mut normal_start = 0;
        let mut i = 0;

        let flush = |tokens: &mut Vec<Token>, normal: &mut String, start: usize| {
            if !normal.is_empty() {
                tokens.push(Token {
                    text: std::mem::take(normal),
                    offset: start,
                    quoted: false,
                });
            }
        };

        'outer: while i < input.len() {
            for lsep in longs {
                if input[i..].starts_with(lsep) {
                    flush(&mut tokens, &mut normal, normal_start);
                    tokens.push(Token {
                        text: (*lsep).to_string(),
                        offset: i,
                        quoted: false,
                    });
                    i += lsep.len();
                    normal_start = i;
                    continue 'outer;
                }
            }
            let Some(c) = input[i..].chars().next() else {
                break;
            };
            if c == '"' {
                flush(&mut tokens, &mut normal, normal_start);
                let quote_start = i;
                i += 1;
                let mut quoted = String::new();
                let mut escaped = false;
                let mut closed = false;
                while let Some(qc) = input[i..].chars().next() {
                    i += qc.len_utf8();
                    if escaped {
                        quoted.push(qc);
                        escaped = false;
                    } else if qc == '\\' {
                        escaped = true;
                    } else if qc == '"' {
                        closed = true;
                        break;
                    } else {
                        quoted.push(qc);
                    }
                }
                tokens.push(Token {
                    text: quoted,
                    offset: quote_start,
                    quoted: true,
                });
                // Unterminated quote: keep what we have and stop.
                if !closed {
                    break;
                }
                normal_start = i;
                continue 'outer;
            }
            if singles.contains(c) {
                flush(&mut tokens, &mut normal, normal_start);
                tokens.push(Token {
                    text: c.to_string(),
                    offset: i,
                    quoted: false,
                });
                i += c.len_utf8();
                normal_start = i;
            } else {
                if normal.is_empty() {
                    normal_start = i;
                }
                normal.push(c);
                i += c.len_utf8();
            }
        }
        flush(&mut tokens, &mut normal, normal_start);
        Self { tokens, cur: 0 }
    }

    pub fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.cur).cloned();
        if t.is_some() {
            self.cur += 1;
        }
        t
    }

    pub fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cur)
    }

    /// Offset just past the last token, for end-of-input diagnostics.
    pub fn end_offset(&self) -> usize {
        self.tokens
            .last()
            .map_or(0, |t| t.offset + t.text.len())
    }

    pub fn is_eof(&self) -> bool {
        self.cur >= self.tokens.len()
    }
}
