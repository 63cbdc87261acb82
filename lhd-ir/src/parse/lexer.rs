//! Token scanner for the assembly form.

use lhd_types::{ApInt, Logic, TimeValue};

use crate::{Diagnostic, DiagnosticSink, SourceRange};

/// The token classes of the assembly grammar.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// `@name` with escapes resolved.
    Global(String),
    /// `%name` with escapes resolved.
    Local(String),
    /// A keyword or bare word, type names included.
    Ident(String),
    /// `i<w>'<base><digits>` integer literal.
    IntLit(ApInt),
    /// `l<w>'<chars>` logic literal.
    LogicLit(Logic),
    /// Decimal time literal with unit and optional delta suffix.
    TimeLit(TimeValue),
    /// Bare decimal number, used for indices and array lengths.
    Num(u64),
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `,`
    Comma,
    /// `:`
    Colon,
    /// `=`
    Eq,
    /// `*`, the pointer type postfix.
    Star,
    /// `$`, the signal type postfix.
    Dollar,
    /// End of input.
    Eof,
}

/// A token with its source range and line.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The token class and payload.
    pub kind: TokenKind,
    /// The byte range the token was scanned from.
    pub range: SourceRange,
    /// 1-based source line, used to keep instruction operands on one
    /// line.
    pub line: u32,
}

/// Scanner over one source buffer.
pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: u32,
}

impl<'a> Lexer<'a> {
    /// A lexer at the start of the source.
    pub fn new(source: &'a str) -> Self {
        Lexer {
            src: source.as_bytes(),
            pos: 0,
            line: 1,
        }
    }

    /// Scan the whole buffer. Invalid characters are reported and
    /// skipped.
    pub fn run(mut self, sink: &mut dyn DiagnosticSink) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token(sink);
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return tokens;
            }
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            match c {
                b' ' | b'\t' | b'\r' | b'\n' => {
                    self.bump();
                }
                b'#' | b';' => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => return,
            }
        }
    }

    fn is_name_char(c: u8) -> bool {
        c.is_ascii_alphanumeric() || c == b'_' || c == b'.'
    }

    /// Scan a name after a sigil, resolving `\uHH` escapes.
    fn scan_name(&mut self, sink: &mut dyn DiagnosticSink) -> String {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if Self::is_name_char(c) {
                name.push(c as char);
                self.bump();
            } else if c == b'\\' && self.peek_at(1) == Some(b'u') {
                let start = self.pos;
                self.bump();
                self.bump();
                let hi = self.bump();
                let lo = self.bump();
                match (hi, lo) {
                    (Some(hi), Some(lo))
                        if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit() =>
                    {
                        let byte = (hex_val(hi) << 4) | hex_val(lo);
                        name.push(byte as char);
                    }
                    _ => {
                        sink.report(
                            Diagnostic::error("malformed \\uHH escape in name")
                                .with_range(SourceRange::new(start, self.pos)),
                        );
                    }
                }
            } else {
                break;
            }
        }
        name
    }

    fn scan_digits(&mut self, pred: fn(u8) -> bool) -> String {
        let mut digits = String::new();
        while let Some(c) = self.peek() {
            if pred(c) || c == b'_' {
                if c != b'_' {
                    digits.push(c as char);
                }
                self.bump();
            } else {
                break;
            }
        }
        digits
    }

    fn next_token(&mut self, sink: &mut dyn DiagnosticSink) -> Token {
        self.skip_trivia();
        let start = self.pos;
        let line = self.line;
        let mk = |kind, start, end, line| Token {
            kind,
            range: SourceRange::new(start, end),
            line,
        };
        let c = match self.peek() {
            Some(c) => c,
            None => return mk(TokenKind::Eof, start, start, line),
        };
        let kind = match c {
            b'(' => {
                self.bump();
                TokenKind::LParen
            }
            b')' => {
                self.bump();
                TokenKind::RParen
            }
            b'{' => {
                self.bump();
                TokenKind::LBrace
            }
            b'}' => {
                self.bump();
                TokenKind::RBrace
            }
            b'[' => {
                self.bump();
                TokenKind::LBracket
            }
            b']' => {
                self.bump();
                TokenKind::RBracket
            }
            b',' => {
                self.bump();
                TokenKind::Comma
            }
            b':' => {
                self.bump();
                TokenKind::Colon
            }
            b'=' => {
                self.bump();
                TokenKind::Eq
            }
            b'*' => {
                self.bump();
                TokenKind::Star
            }
            b'$' => {
                self.bump();
                TokenKind::Dollar
            }
            b'@' => {
                self.bump();
                TokenKind::Global(self.scan_name(sink))
            }
            b'%' => {
                self.bump();
                TokenKind::Local(self.scan_name(sink))
            }
            b'0'..=b'9' => self.scan_number(sink, start, line),
            c if c.is_ascii_alphabetic() || c == b'_' => self.scan_word(sink),
            other => {
                self.bump();
                sink.report(
                    Diagnostic::error(format!(
                        "unexpected character {:?} in assembly",
                        other as char
                    ))
                    .with_range(SourceRange::new(start, self.pos)),
                );
                return self.next_token(sink);
            }
        };
        mk(kind, start, self.pos, line)
    }

    /// A bare number or a time literal such as `5ns` or `0ps+2d`.
    fn scan_number(
        &mut self,
        sink: &mut dyn DiagnosticSink,
        start: usize,
        _line: u32,
    ) -> TokenKind {
        let digits = self.scan_digits(|c| c.is_ascii_digit());
        let amount: u64 = digits.parse().unwrap_or_else(|_| {
            sink.report(
                Diagnostic::error("integer literal does not fit 64 bits")
                    .with_range(SourceRange::new(start, self.pos)),
            );
            0
        });
        // A unit suffix turns the number into a time literal.
        let mut unit = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphabetic() {
                unit.push(c as char);
                self.bump();
            } else {
                break;
            }
        }
        if unit.is_empty() {
            return TokenKind::Num(amount);
        }
        let Some(mut time) = TimeValue::from_unit(amount, &unit) else {
            sink.report(
                Diagnostic::error(format!("unknown time unit {unit:?}"))
                    .with_range(SourceRange::new(start, self.pos)),
            );
            return TokenKind::Num(amount);
        };
        if self.peek() == Some(b'+') {
            self.bump();
            let delta_digits = self.scan_digits(|c| c.is_ascii_digit());
            if self.peek() == Some(b'd') {
                self.bump();
                time.delta = delta_digits.parse().unwrap_or(0);
            } else {
                sink.report(
                    Diagnostic::error("expected delta suffix after '+' in time literal")
                        .with_range(SourceRange::new(start, self.pos)),
                );
            }
        }
        TokenKind::TimeLit(time)
    }

    /// A keyword, a type name, or an `i…'`/`l…'` literal.
    fn scan_word(&mut self, sink: &mut dyn DiagnosticSink) -> TokenKind {
        let start = self.pos;
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if Self::is_name_char(c) {
                word.push(c as char);
                self.bump();
            } else {
                break;
            }
        }
        let width = word[1..].parse::<u32>().ok().filter(|w| *w >= 1);
        if let (Some(first), Some(width), Some(b'\'')) =
            (word.bytes().next(), width, self.peek())
        {
            match first {
                b'i' => {
                    self.bump();
                    return self.scan_int_literal(sink, start, width);
                }
                b'l' => {
                    self.bump();
                    let digits = self.scan_digits(|c| {
                        matches!(
                            c.to_ascii_uppercase(),
                            b'0' | b'1' | b'-' | b'U' | b'X' | b'Z' | b'W' | b'L' | b'H'
                        )
                    });
                    return match Logic::parse(&digits) {
                        Ok(v) if v.width() == width => TokenKind::LogicLit(v),
                        _ => {
                            sink.report(
                                Diagnostic::error("malformed logic literal")
                                    .with_range(SourceRange::new(start, self.pos)),
                            );
                            TokenKind::LogicLit(Logic::new(width, lhd_types::LogicBit::U))
                        }
                    };
                }
                _ => {}
            }
        }
        TokenKind::Ident(word)
    }

    fn scan_int_literal(
        &mut self,
        sink: &mut dyn DiagnosticSink,
        start: usize,
        width: u32,
    ) -> TokenKind {
        let radix = match self.bump() {
            Some(b'b') => 2,
            Some(b'd') => 10,
            Some(b'h') => 16,
            _ => {
                sink.report(
                    Diagnostic::error("integer literal base must be b, d or h")
                        .with_range(SourceRange::new(start, self.pos)),
                );
                10
            }
        };
        let digits = self.scan_digits(|c| c.is_ascii_hexdigit());
        match ApInt::from_str_radix(width, &digits, radix) {
            Ok(v) => TokenKind::IntLit(v),
            Err(_) => {
                sink.report(
                    Diagnostic::error("malformed integer literal")
                        .with_range(SourceRange::new(start, self.pos)),
                );
                TokenKind::IntLit(ApInt::zero(width))
            }
        }
    }
}

fn hex_val(c: u8) -> u8 {
    match c {
        b'0'..=b'9' => c - b'0',
        b'a'..=b'f' => c - b'a' + 10,
        b'A'..=b'F' => c - b'A' + 10,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IgnoreDiagnostics;

    fn lex(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .run(&mut IgnoreDiagnostics)
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn scans_names_and_punctuation() {
        let toks = lex("func @max (i32 %a) {");
        assert_eq!(
            toks,
            vec![
                TokenKind::Ident("func".into()),
                TokenKind::Global("max".into()),
                TokenKind::LParen,
                TokenKind::Ident("i32".into()),
                TokenKind::Local("a".into()),
                TokenKind::RParen,
                TokenKind::LBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn scans_literals() {
        let toks = lex("i8'd42 l4'10XZ 5ns 0ps+2d 7");
        assert_eq!(
            toks,
            vec![
                TokenKind::IntLit(ApInt::from_u64(8, 42)),
                TokenKind::LogicLit(Logic::parse("10XZ").unwrap()),
                TokenKind::TimeLit(TimeValue::ps(5_000)),
                TokenKind::TimeLit(TimeValue { ps: 0, delta: 2 }),
                TokenKind::Num(7),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn hex_and_binary_bases() {
        let toks = lex("i16'hbeef i4'b1010");
        assert_eq!(
            toks,
            vec![
                TokenKind::IntLit(ApInt::from_u64(16, 0xbeef)),
                TokenKind::IntLit(ApInt::from_u64(4, 0b1010)),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn comments_extend_to_end_of_line() {
        let toks = lex("add # trailing words\n; a full line\nsub");
        assert_eq!(
            toks,
            vec![
                TokenKind::Ident("add".into()),
                TokenKind::Ident("sub".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn name_escapes() {
        let toks = lex("@a\\u2db");
        assert_eq!(toks[0], TokenKind::Global("a-b".into()));
    }

    #[test]
    fn type_postfixes_are_separate_tokens() {
        let toks = lex("i8$ i8*");
        assert_eq!(
            toks,
            vec![
                TokenKind::Ident("i8".into()),
                TokenKind::Dollar,
                TokenKind::Ident("i8".into()),
                TokenKind::Star,
                TokenKind::Eof,
            ]
        );
    }
}
