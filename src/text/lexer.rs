//! The text-format tokenizer.
//!
//! An explicit iterator over a source buffer: each call to `next` skips
//! whitespace and comments, then produces one token. Atoms are read
//! through to the next delimiter before classification, which enforces
//! the rule that tokens must be delimited; an atom that fits no grammar
//! becomes [`Token::Reserved`] and is rejected downstream.

use super::float::{FloatLiteral, FloatLiteralKind};
use crate::Error;
use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{Num, ToPrimitive, Zero};

/// A source position, for diagnostics.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Span {
    /// 1-based line.
    pub line: u32,
    /// 1-based column.
    pub column: u32,
}

impl Span {
    pub(crate) fn start() -> Span {
        Span { line: 1, column: 1 }
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A single token of the text format.
#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    /// `(`
    LeftParen,
    /// `)`
    RightParen,
    /// A lowercase word such as `module` or `i32.add`.
    Keyword(String),
    /// `$name`, with the sigil stripped.
    Identifier(String),
    /// A string literal, decoded to raw bytes.
    String(Vec<u8>),
    /// An integer written with an explicit sign.
    SignedInteger(BigInt),
    /// An integer written without a sign.
    UnsignedInteger(BigUint),
    /// A float literal, including `inf` and NaN forms.
    Float(FloatLiteral),
    /// A well-delimited atom that fits no other production.
    Reserved(String),
}

/// A token plus where it came from.
#[derive(Clone, Debug, PartialEq)]
pub struct LocatedToken {
    /// The token.
    pub token: Token,
    /// Its starting position.
    pub span: Span,
}

fn is_id_char(byte: u8) -> bool {
    matches!(byte,
        b'0'..=b'9'
        | b'a'..=b'z'
        | b'A'..=b'Z'
        | b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'/'
        | b':' | b'<' | b'=' | b'>' | b'?' | b'@' | b'\\' | b'^' | b'_' | b'`' | b'|' | b'~')
}

/// The tokenizer. Iterate it to drain the source.
pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
    span: Span,
}

impl<'a> Lexer<'a> {
    /// Creates a lexer over the given source text.
    pub fn new(source: &'a str) -> Lexer<'a> {
        Lexer {
            input: source.as_bytes(),
            pos: 0,
            span: Span::start(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.input.get(self.pos + ahead).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        if byte == b'\n' {
            self.span.line += 1;
            self.span.column = 1;
        } else {
            self.span.column += 1;
        }
        Some(byte)
    }

    fn error(&self, span: Span, message: &str) -> Error {
        Error::TextFormat(format!("{}: {}", span, message))
    }

    fn skip_trivia(&mut self) -> Result<(), Error> {
        loop {
            match self.peek() {
                Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n') => {
                    self.bump();
                }
                Some(b';') if self.peek_at(1) == Some(b';') => {
                    while let Some(byte) = self.peek() {
                        if byte == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some(b'(') if self.peek_at(1) == Some(b';') => {
                    let open_span = self.span;
                    self.bump();
                    self.bump();
                    let mut depth = 1u32;
                    loop {
                        match (self.peek(), self.peek_at(1)) {
                            (Some(b'('), Some(b';')) => {
                                self.bump();
                                self.bump();
                                depth += 1;
                            }
                            (Some(b';'), Some(b')')) => {
                                self.bump();
                                self.bump();
                                depth -= 1;
                                if depth == 0 {
                                    break;
                                }
                            }
                            (Some(_), _) => {
                                self.bump();
                            }
                            (None, _) => {
                                return Err(self.error(open_span, "unterminated block comment"))
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn read_string(&mut self, start: Span) -> Result<Vec<u8>, Error> {
        // Opening quote already consumed.
        let mut bytes = Vec::new();
        loop {
            let byte = self
                .bump()
                .ok_or_else(|| self.error(start, "unterminated string literal"))?;
            match byte {
                b'"' => return Ok(bytes),
                b'\\' => {
                    let escape_span = self.span;
                    let escape = self
                        .bump()
                        .ok_or_else(|| self.error(start, "unterminated string literal"))?;
                    match escape {
                        b'n' => bytes.push(b'\n'),
                        b'r' => bytes.push(b'\r'),
                        b't' => bytes.push(b'\t'),
                        b'\\' => bytes.push(b'\\'),
                        b'\'' => bytes.push(b'\''),
                        b'"' => bytes.push(b'"'),
                        b'u' => {
                            if self.bump() != Some(b'{') {
                                return Err(
                                    self.error(escape_span, "expected `{` after `\\u` escape")
                                );
                            }
                            let mut digits = String::new();
                            loop {
                                match self.bump() {
                                    Some(b'}') => break,
                                    Some(d) if d.is_ascii_hexdigit() || d == b'_' => {
                                        if d != b'_' {
                                            digits.push(d as char)
                                        }
                                    }
                                    _ => {
                                        return Err(self.error(
                                            escape_span,
                                            "malformed `\\u{…}` escape",
                                        ))
                                    }
                                }
                            }
                            let value = u32::from_str_radix(&digits, 16).map_err(|_| {
                                self.error(escape_span, "malformed `\\u{…}` escape")
                            })?;
                            // Lone surrogate halves do not denote a code
                            // point; they must combine into one, which the
                            // escaped form cannot express.
                            let scalar = char::from_u32(value).ok_or_else(|| {
                                self.error(escape_span, "escape is not a Unicode scalar value")
                            })?;
                            let mut buf = [0u8; 4];
                            bytes.extend_from_slice(scalar.encode_utf8(&mut buf).as_bytes());
                        }
                        high if high.is_ascii_hexdigit() => {
                            let low = self
                                .bump()
                                .filter(u8::is_ascii_hexdigit)
                                .ok_or_else(|| {
                                    self.error(escape_span, "expected two hex digits in escape")
                                })?;
                            let hex = [high, low];
                            let hex = std::str::from_utf8(&hex).expect("two ASCII digits");
                            bytes.push(
                                u8::from_str_radix(hex, 16).expect("two hex digits parsed"),
                            );
                        }
                        _ => return Err(self.error(escape_span, "unknown string escape")),
                    }
                }
                0x00..=0x1f | 0x7f => {
                    return Err(self.error(
                        start,
                        "control characters must be escaped inside string literals",
                    ))
                }
                other => bytes.push(other),
            }
        }
    }

    fn read_atom(&mut self) -> String {
        let start = self.pos;
        while let Some(byte) = self.peek() {
            match byte {
                b' ' | b'\t' | b'\r' | b'\n' | b'(' | b')' | b'"' => break,
                _ => {
                    self.bump();
                }
            }
        }
        String::from_utf8_lossy(&self.input[start..self.pos]).into_owned()
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<LocatedToken, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Err(error) = self.skip_trivia() {
            return Some(Err(error));
        }
        let span = self.span;
        let byte = self.peek()?;
        let token = match byte {
            b'(' => {
                self.bump();
                Ok(Token::LeftParen)
            }
            b')' => {
                self.bump();
                Ok(Token::RightParen)
            }
            b'"' => {
                self.bump();
                self.read_string(span).map(Token::String)
            }
            _ => {
                let atom = self.read_atom();
                if atom.is_empty() {
                    // A byte that is neither a delimiter nor an atom
                    // character, e.g. a stray control character.
                    self.bump();
                    Err(self.error(span, "unexpected character"))
                } else {
                    Ok(classify_atom(atom))
                }
            }
        };
        Some(token.map(|token| LocatedToken { token, span }))
    }
}

fn classify_atom(atom: String) -> Token {
    if let Some(token) = parse_number(&atom) {
        return token;
    }
    let bytes = atom.as_bytes();
    if bytes[0] == b'$' {
        if bytes.len() > 1 && bytes[1..].iter().all(|b| is_id_char(*b)) {
            return Token::Identifier(atom[1..].to_string());
        }
        return Token::Reserved(atom);
    }
    if bytes[0].is_ascii_lowercase() && bytes.iter().all(|b| is_id_char(*b)) {
        return Token::Keyword(atom);
    }
    Token::Reserved(atom)
}

/// Parses digits with `_` separators; separators must sit between digits.
fn parse_digits(text: &str, radix: u32) -> Option<BigUint> {
    if text.is_empty() {
        return None;
    }
    let mut clean = String::with_capacity(text.len());
    let mut previous_was_digit = false;
    for ch in text.chars() {
        if ch == '_' {
            if !previous_was_digit {
                return None;
            }
            previous_was_digit = false;
        } else if ch.is_digit(radix) {
            clean.push(ch);
            previous_was_digit = true;
        } else {
            return None;
        }
    }
    if !previous_was_digit {
        // Trailing separator.
        return None;
    }
    BigUint::from_str_radix(&clean, radix).ok()
}

/// Splits `whole.frac`, tolerating a missing fractional part.
fn split_point(text: &str) -> (&str, Option<&str>) {
    match text.find('.') {
        Some(index) => (&text[..index], Some(&text[index + 1..])),
        None => (text, None),
    }
}

fn parse_number(atom: &str) -> Option<Token> {
    let (negative, explicit_sign, body) = match atom.as_bytes().first()? {
        b'+' => (false, true, &atom[1..]),
        b'-' => (true, true, &atom[1..]),
        _ => (false, false, atom),
    };

    if body == "inf" {
        return Some(Token::Float(FloatLiteral::new(
            negative,
            FloatLiteralKind::Infinity,
        )));
    }
    if body == "nan" {
        return Some(Token::Float(FloatLiteral::canonical_nan(negative)));
    }
    if let Some(payload_text) = body.strip_prefix("nan:0x") {
        let payload = parse_digits(payload_text, 16)?;
        let payload = payload.to_u64()?;
        return Some(Token::Float(FloatLiteral::nan_with_payload(
            negative, payload,
        )));
    }

    if let Some(hex_body) = body.strip_prefix("0x") {
        return parse_radix_number(hex_body, 16, negative, explicit_sign);
    }
    parse_radix_number(body, 10, negative, explicit_sign)
}

fn parse_radix_number(
    body: &str,
    radix: u32,
    negative: bool,
    explicit_sign: bool,
) -> Option<Token> {
    let exponent_letters: &[char] = if radix == 16 { &['p', 'P'] } else { &['e', 'E'] };

    let (mantissa_text, exponent_text) = match body.find(exponent_letters) {
        Some(index) => (&body[..index], Some(&body[index + 1..])),
        None => (body, None),
    };

    let (whole_text, frac_text) = split_point(mantissa_text);
    let is_float = frac_text.is_some() || exponent_text.is_some();

    if !is_float {
        let magnitude = parse_digits(whole_text, radix)?;
        return Some(if explicit_sign {
            let sign = if negative { Sign::Minus } else { Sign::Plus };
            let magnitude = if magnitude.is_zero() {
                BigInt::zero()
            } else {
                BigInt::from_biguint(sign, magnitude)
            };
            Token::SignedInteger(magnitude)
        } else {
            Token::UnsignedInteger(magnitude)
        });
    }

    // Fold the fraction into the significand, adjusting the exponent.
    let whole = parse_digits(whole_text, radix)?;
    let (significand, frac_len) = match frac_text {
        None | Some("") => (whole, 0usize),
        Some(frac) => {
            let frac_digits = parse_digits(frac, radix)?;
            let frac_len = frac.chars().filter(|c| *c != '_').count();
            let scale = BigUint::from(radix).pow(frac_len as u32);
            (whole * scale + frac_digits, frac_len)
        }
    };

    let exponent = match exponent_text {
        None => BigInt::zero(),
        Some(text) => {
            let (exp_negative, digits) = match text.as_bytes().first() {
                Some(b'+') => (false, &text[1..]),
                Some(b'-') => (true, &text[1..]),
                _ => (false, text),
            };
            // The exponent is decimal even for hex literals.
            let magnitude = parse_digits(digits, 10)?;
            let magnitude = BigInt::from(magnitude);
            if exp_negative {
                -magnitude
            } else {
                magnitude
            }
        }
    };

    // Hex floats scale by powers of two (one fractional digit is four
    // bits); decimal floats scale by powers of ten.
    let (base, exponent) = if radix == 16 {
        (2u8, exponent - 4 * BigInt::from(frac_len))
    } else {
        (10u8, exponent - BigInt::from(frac_len))
    };

    Some(Token::Float(FloatLiteral::new(
        negative,
        FloatLiteralKind::Number {
            significand,
            base,
            exponent,
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<Token> {
        Lexer::new(source)
            .map(|result| result.expect("lexing should succeed").token)
            .collect()
    }

    fn lex_one(source: &str) -> Token {
        let mut tokens = lex(source);
        assert_eq!(tokens.len(), 1, "expected exactly one token");
        tokens.remove(0)
    }

    #[test]
    fn parens_keywords_identifiers() {
        assert_eq!(
            lex("(module $main)"),
            vec![
                Token::LeftParen,
                Token::Keyword("module".into()),
                Token::Identifier("main".into()),
                Token::RightParen,
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            lex(";; line\n(; block (; nested ;) still ;) nop"),
            vec![Token::Keyword("nop".into())]
        );
    }

    #[test]
    fn integers() {
        assert_eq!(lex_one("42"), Token::UnsignedInteger(BigUint::from(42u32)));
        assert_eq!(lex_one("+42"), Token::SignedInteger(BigInt::from(42)));
        assert_eq!(lex_one("-42"), Token::SignedInteger(BigInt::from(-42)));
        assert_eq!(
            lex_one("0xdead_beef"),
            Token::UnsignedInteger(BigUint::from(0xdead_beefu32))
        );
        assert_eq!(
            lex_one("1_000_000"),
            Token::UnsignedInteger(BigUint::from(1_000_000u32))
        );
    }

    #[test]
    fn misplaced_separators_are_reserved() {
        assert!(matches!(lex_one("_1"), Token::Reserved(_)));
        assert!(matches!(lex_one("1_"), Token::Reserved(_)));
        assert!(matches!(lex_one("1__2"), Token::Reserved(_)));
        assert!(matches!(lex_one("0x"), Token::Reserved(_)));
    }

    #[test]
    fn floats() {
        match lex_one("1.5") {
            Token::Float(literal) => {
                assert_eq!(literal.to_f64_bits().unwrap(), 1.5f64.to_bits());
            }
            other => panic!("unexpected token {:?}", other),
        }
        match lex_one("-0x1.8p3") {
            Token::Float(literal) => {
                assert!(literal.is_negative());
                assert_eq!(literal.to_f64_bits().unwrap(), (-12.0f64).to_bits());
            }
            other => panic!("unexpected token {:?}", other),
        }
        match lex_one("1e3") {
            Token::Float(literal) => {
                assert_eq!(literal.to_f64_bits().unwrap(), 1000.0f64.to_bits());
            }
            other => panic!("unexpected token {:?}", other),
        }
    }

    #[test]
    fn nan_forms() {
        match lex_one("nan") {
            Token::Float(literal) => {
                assert_eq!(literal.to_f64_bits().unwrap(), 0x7ff8_0000_0000_0000)
            }
            other => panic!("unexpected token {:?}", other),
        }
        match lex_one("-nan:0x4000000000000") {
            Token::Float(literal) => {
                assert_eq!(literal.to_f64_bits().unwrap(), 0xfff4_0000_0000_0000)
            }
            other => panic!("unexpected token {:?}", other),
        }
        match lex_one("inf") {
            Token::Float(literal) => {
                assert_eq!(literal.to_f64_bits().unwrap(), f64::INFINITY.to_bits())
            }
            other => panic!("unexpected token {:?}", other),
        }
    }

    #[test]
    fn strings() {
        assert_eq!(lex_one(r#""hello""#), Token::String(b"hello".to_vec()));
        assert_eq!(
            lex_one(r#""a\n\t\\\"b""#),
            Token::String(b"a\n\t\\\"b".to_vec())
        );
        assert_eq!(lex_one(r#""\00\ff""#), Token::String(vec![0x00, 0xff]));
        assert_eq!(
            lex_one(r#""\u{1F600}""#),
            Token::String("\u{1F600}".as_bytes().to_vec())
        );
    }

    #[test]
    fn string_errors() {
        assert!(Lexer::new("\"abc").next().unwrap().is_err());
        assert!(Lexer::new("\"\u{7}\"").next().unwrap().is_err());
        assert!(Lexer::new(r#""\u{d800}""#).next().unwrap().is_err());
        assert!(Lexer::new(r#""\q""#).next().unwrap().is_err());
    }

    #[test]
    fn undelimited_tokens_become_reserved() {
        assert!(matches!(lex_one("0$x"), Token::Reserved(_)));
        assert!(matches!(lex_one("1.5x"), Token::Reserved(_)));
    }

    #[test]
    fn spans_track_lines() {
        let mut lexer = Lexer::new("nop\n  nop");
        let first = lexer.next().unwrap().unwrap();
        let second = lexer.next().unwrap().unwrap();
        assert_eq!((first.span.line, first.span.column), (1, 1));
        assert_eq!((second.span.line, second.span.column), (2, 3));
    }
}
