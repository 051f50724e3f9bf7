use crate::{
    error::{LexError, LexErrorKind},
    token::{Keyword, Op, Token, TokenKind},
};

/// Tokenizes a source string into a stream of [`Token`]s.
///
/// `next` collapses whitespace, comments, and newlines internally, exactly
/// as `spec.md` §6 requires of the lexer/parser interface: callers only ever
/// see meaningful tokens (or errors). A lexical error does not stop
/// tokenizing; `next` records it and resumes scanning at the following
/// character, matching the "recorded... driver prints and skips;
/// compilation continues at the next token" behavior from `spec.md` §7.
pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: u32,
    col: u32,
}

impl<'a> Lexer<'a> {
    /// Build a lexer over `source`.
    pub fn new(source: &'a str) -> Self {
        Self {
            src: source.as_bytes(),
            pos: 0,
            line: 1,
            col: 1,
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
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n') => {
                    self.bump();
                }
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    while !matches!(self.peek(), None | Some(b'\n')) {
                        self.bump();
                    }
                }
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    self.bump();
                    self.bump();
                    while self.peek().is_some() && !(self.peek() == Some(b'*') && self.peek_at(1) == Some(b'/')) {
                        self.bump();
                    }
                    self.bump();
                    self.bump();
                }
                _ => break,
            }
        }
    }

    /// Produce the next token, skipping whitespace/comments first.
    ///
    /// Returns `Ok(None)` once end-of-input has been reached and an `Eof`
    /// token has already been handed back; every call before that returns
    /// `Some(...)`.
    pub fn next(&mut self) -> Option<Result<Token, LexError>> {
        self.skip_trivia();
        let (line, col) = (self.line, self.col);
        let c = match self.peek() {
            Some(c) => c,
            None => return None,
        };

        let result = if c.is_ascii_alphabetic() || c == b'_' {
            Ok(self.lex_identifier_or_keyword())
        } else if c.is_ascii_digit() {
            self.lex_number()
        } else if c == b'"' {
            self.lex_string()
        } else if c == b'\'' {
            self.lex_char()
        } else {
            self.lex_operator()
        };

        Some(result.map(|kind| Token { kind, line, col }).map_err(|kind| {
            LexError {
                kind,
                line,
                col,
                span: (c as char).to_string(),
            }
        }))
    }

    fn lex_identifier_or_keyword(&mut self) -> TokenKind {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == b'_') {
            self.bump();
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap();
        match Keyword::from_str(text) {
            Some(kw) => TokenKind::Keyword(kw),
            None => TokenKind::Identifier(text.to_owned()),
        }
    }

    fn lex_number(&mut self) -> Result<TokenKind, LexErrorKind> {
        let start = self.pos;
        if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'x') | Some(b'X')) {
            self.bump();
            self.bump();
            let digits_start = self.pos;
            while matches!(self.peek(), Some(c) if c.is_ascii_hexdigit()) {
                self.bump();
            }
            if self.pos == digits_start {
                return Err(LexErrorKind::InvalidDigit);
            }
            let text = std::str::from_utf8(&self.src[digits_start..self.pos]).unwrap();
            let value = i64::from_str_radix(text, 16).map_err(|_| LexErrorKind::InvalidDigit)?;
            return Ok(TokenKind::IntLiteral(value));
        }

        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.bump();
        }

        let mut is_float = false;
        if self.peek() == Some(b'.') && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
            is_float = true;
            self.bump();
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.bump();
            }
        }
        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            is_float = true;
            self.bump();
            if matches!(self.peek(), Some(b'+') | Some(b'-')) {
                self.bump();
            }
            let exp_start = self.pos;
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.bump();
            }
            if self.pos == exp_start {
                return Err(LexErrorKind::InvalidDigit);
            }
        }

        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap();
        if is_float {
            text.parse::<f64>()
                .map(TokenKind::FloatLiteral)
                .map_err(|_| LexErrorKind::InvalidDigit)
        } else {
            text.parse::<i64>()
                .map(TokenKind::IntLiteral)
                .map_err(|_| LexErrorKind::InvalidDigit)
        }
    }

    /// Read a backslash escape, on the assumption the leading `\` has
    /// already been consumed. `on_error` is the kind to report for a
    /// malformed escape — `InvalidString` from within `"..."`,
    /// `InvalidChar` from within `'...'`, matching the original's split
    /// between `ParseChar` (`ErrorInvalidChar`) and string parsing.
    fn read_escape(&mut self, on_error: LexErrorKind) -> Result<u8, LexErrorKind> {
        match self.bump() {
            Some(b'n') => Ok(b'\n'),
            Some(b'r') => Ok(b'\r'),
            Some(b't') => Ok(b'\t'),
            Some(b'v') => Ok(0x0b),
            Some(b'b') => Ok(0x08),
            Some(b'f') => Ok(0x0c),
            Some(b'\\') => Ok(b'\\'),
            Some(b'\'') => Ok(b'\''),
            Some(b'"') => Ok(b'"'),
            Some(b'x') => {
                let hi = self.bump().and_then(|c| (c as char).to_digit(16));
                let lo = self.bump().and_then(|c| (c as char).to_digit(16));
                match (hi, lo) {
                    (Some(hi), Some(lo)) => Ok(((hi << 4) | lo) as u8),
                    _ => Err(on_error),
                }
            }
            _ => Err(on_error),
        }
    }

    fn lex_string(&mut self) -> Result<TokenKind, LexErrorKind> {
        self.bump(); // opening quote
        let mut bytes = Vec::new();
        loop {
            match self.peek() {
                None | Some(b'\n') => return Err(LexErrorKind::InvalidString),
                Some(b'"') => {
                    self.bump();
                    break;
                }
                Some(b'\\') => {
                    self.bump();
                    bytes.push(self.read_escape(LexErrorKind::InvalidString)?);
                }
                Some(c) => {
                    self.bump();
                    bytes.push(c);
                }
            }
        }
        String::from_utf8(bytes)
            .map(TokenKind::StringLiteral)
            .map_err(|_| LexErrorKind::InvalidString)
    }

    /// Per the original `Lexer::ParseChar`, every way a `'...'` literal can
    /// be malformed — empty, unterminated, or a bad escape — is
    /// `ErrorInvalidChar`, not the string-literal error kind.
    fn lex_char(&mut self) -> Result<TokenKind, LexErrorKind> {
        self.bump(); // opening quote
        let value = match self.peek() {
            None => return Err(LexErrorKind::InvalidChar),
            Some(b'\\') => {
                self.bump();
                self.read_escape(LexErrorKind::InvalidChar)? as i64
            }
            Some(c) => {
                self.bump();
                c as i64
            }
        };
        if self.peek() != Some(b'\'') {
            return Err(LexErrorKind::InvalidChar);
        }
        self.bump();
        Ok(TokenKind::CharLiteral(value))
    }

    fn lex_operator(&mut self) -> Result<TokenKind, LexErrorKind> {
        macro_rules! two {
            ($second:expr, $op3:expr, $op2:expr) => {{
                self.bump();
                if self.peek() == Some($second) {
                    self.bump();
                    $op3
                } else {
                    $op2
                }
            }};
        }

        let c = self.bump().expect("caller checked peek().is_some()");
        let op = match c {
            b'=' => two!(b'=', Op::Eq, Op::Assign),
            b'+' => {
                if self.peek() == Some(b'+') {
                    self.bump();
                    Op::Inc
                } else if self.peek() == Some(b'=') {
                    self.bump();
                    Op::AddAssign
                } else {
                    Op::Add
                }
            }
            b'-' => {
                if self.peek() == Some(b'-') {
                    self.bump();
                    Op::Dec
                } else if self.peek() == Some(b'=') {
                    self.bump();
                    Op::SubAssign
                } else {
                    Op::Sub
                }
            }
            b'*' => two!(b'=', Op::MulAssign, Op::Mul),
            b'/' => two!(b'=', Op::DivAssign, Op::Div),
            b'%' => two!(b'=', Op::PercentAssign, Op::Percent),
            b'^' => two!(b'=', Op::CaretAssign, Op::Caret),
            b'~' => Op::Tilde,
            b'?' => Op::Question,
            b'(' => Op::LParen,
            b')' => Op::RParen,
            b'{' => Op::LBrace,
            b'}' => Op::RBrace,
            b'[' => Op::LBracket,
            b']' => Op::RBracket,
            b',' => Op::Comma,
            b';' => Op::Semi,
            b':' => Op::Colon,
            b'&' => {
                if self.peek() == Some(b'&') {
                    self.bump();
                    Op::AndAnd
                } else if self.peek() == Some(b'=') {
                    self.bump();
                    Op::AmpAssign
                } else {
                    Op::Amp
                }
            }
            b'|' => {
                if self.peek() == Some(b'|') {
                    self.bump();
                    Op::OrOr
                } else if self.peek() == Some(b'=') {
                    self.bump();
                    Op::PipeAssign
                } else {
                    Op::Pipe
                }
            }
            b'!' => {
                if self.peek() == Some(b'=') {
                    self.bump();
                    Op::Ne
                } else {
                    Op::Not
                }
            }
            b'<' => {
                if self.peek() == Some(b'<') {
                    self.bump();
                    if self.peek() == Some(b'=') {
                        self.bump();
                        Op::ShlAssign
                    } else {
                        Op::Shl
                    }
                } else if self.peek() == Some(b'=') {
                    self.bump();
                    Op::Le
                } else {
                    Op::Lt
                }
            }
            b'>' => {
                if self.peek() == Some(b'>') {
                    self.bump();
                    if self.peek() == Some(b'=') {
                        self.bump();
                        Op::ShrAssign
                    } else {
                        Op::Shr
                    }
                } else if self.peek() == Some(b'=') {
                    self.bump();
                    Op::Ge
                } else {
                    Op::Gt
                }
            }
            _ => return Err(LexErrorKind::InvalidOperator),
        };
        Ok(TokenKind::Op(op))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenize(src: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(src);
        let mut out = Vec::new();
        while let Some(result) = lexer.next() {
            out.push(result.expect("no lex errors in this fixture").kind);
        }
        out
    }

    #[test]
    fn skips_whitespace_and_line_comments() {
        let toks = tokenize("  int x; // trailing\n");
        assert_eq!(
            toks,
            vec![
                TokenKind::Keyword(Keyword::Int),
                TokenKind::Identifier("x".into()),
                TokenKind::Op(Op::Semi),
            ]
        );
    }

    #[test]
    fn skips_block_comments() {
        let toks = tokenize("1 /* skip\nme */ + 2");
        assert_eq!(
            toks,
            vec![
                TokenKind::IntLiteral(1),
                TokenKind::Op(Op::Add),
                TokenKind::IntLiteral(2),
            ]
        );
    }

    #[test]
    fn greedy_multi_char_operators() {
        let toks = tokenize("a<<=1 b>>c d<=e f>=g h&&i j||k ++l --m");
        assert!(toks.contains(&TokenKind::Op(Op::ShlAssign)));
        assert!(toks.contains(&TokenKind::Op(Op::Shr)));
        assert!(toks.contains(&TokenKind::Op(Op::Le)));
        assert!(toks.contains(&TokenKind::Op(Op::Ge)));
        assert!(toks.contains(&TokenKind::Op(Op::AndAnd)));
        assert!(toks.contains(&TokenKind::Op(Op::OrOr)));
        assert!(toks.contains(&TokenKind::Op(Op::Inc)));
        assert!(toks.contains(&TokenKind::Op(Op::Dec)));
    }

    #[test]
    fn char_literal_escapes() {
        let toks = tokenize(r"'\n' '\x41' 'a'");
        assert_eq!(
            toks,
            vec![
                TokenKind::CharLiteral(b'\n' as i64),
                TokenKind::CharLiteral(0x41),
                TokenKind::CharLiteral(b'a' as i64),
            ]
        );
    }

    #[test]
    fn string_literal_escapes() {
        let toks = tokenize(r#""hi\n\"there\"""#);
        assert_eq!(
            toks,
            vec![TokenKind::StringLiteral("hi\n\"there\"".into())]
        );
    }

    #[test]
    fn hex_and_float_literals() {
        let toks = tokenize("0x1F 3.5 2e3");
        assert_eq!(
            toks,
            vec![
                TokenKind::IntLiteral(0x1f),
                TokenKind::FloatLiteral(3.5),
                TokenKind::FloatLiteral(2000.0),
            ]
        );
    }

    #[test]
    fn invalid_char_is_reported_and_skipped() {
        let mut lexer = Lexer::new("1 @ 2");
        let first = lexer.next().unwrap().unwrap();
        assert_eq!(first.kind, TokenKind::IntLiteral(1));
        let err = lexer.next().unwrap().unwrap_err();
        assert_eq!(err.kind, LexErrorKind::InvalidOperator);
        let third = lexer.next().unwrap().unwrap();
        assert_eq!(third.kind, TokenKind::IntLiteral(2));
    }

    #[test]
    fn malformed_char_literal_reports_invalid_char_not_invalid_string() {
        for src in ["'ab'", "'", "'\\x'", "'\\q'"] {
            let mut lexer = Lexer::new(src);
            let err = lexer.next().unwrap().unwrap_err();
            assert_eq!(err.kind, LexErrorKind::InvalidChar, "{src}");
        }
    }

    #[test]
    fn tracks_line_and_column() {
        let mut lexer = Lexer::new("a\nbb");
        let a = lexer.next().unwrap().unwrap();
        assert_eq!((a.line, a.col), (1, 1));
        let bb = lexer.next().unwrap().unwrap();
        assert_eq!((bb.line, bb.col), (2, 1));
    }
}
