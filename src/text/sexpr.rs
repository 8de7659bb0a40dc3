//! S-expression trees built from the token stream.

use super::lexer::{Lexer, LocatedToken, Span, Token};
use crate::Error;

/// A parsed S-expression: a single token or a parenthesized list.
#[derive(Clone, Debug, PartialEq)]
pub enum SExpr {
    /// A non-paren token.
    Atom(LocatedToken),
    /// `( … )` with the span of the opening paren.
    List(Vec<SExpr>, Span),
}

impl SExpr {
    /// The source position of this expression.
    pub fn span(&self) -> Span {
        match self {
            SExpr::Atom(token) => token.span,
            SExpr::List(_, span) => *span,
        }
    }

    /// The keyword if this is a keyword atom.
    pub fn as_keyword(&self) -> Option<&str> {
        match self {
            SExpr::Atom(LocatedToken {
                token: Token::Keyword(keyword),
                ..
            }) => Some(keyword),
            _ => None,
        }
    }

    /// The list elements if this is a list.
    pub fn as_list(&self) -> Option<&[SExpr]> {
        match self {
            SExpr::List(items, _) => Some(items),
            _ => None,
        }
    }

    /// The list elements if this is a list whose head is the given
    /// keyword.
    pub fn as_list_of(&self, keyword: &str) -> Option<&[SExpr]> {
        let items = self.as_list()?;
        if items.first()?.as_keyword()? == keyword {
            Some(&items[1..])
        } else {
            None
        }
    }

    /// Whether this is a list whose head is the given keyword.
    pub fn is_list_of(&self, keyword: &str) -> bool {
        self.as_list_of(keyword).is_some()
    }

    /// The token if this is an atom.
    pub fn as_token(&self) -> Option<&Token> {
        match self {
            SExpr::Atom(token) => Some(&token.token),
            _ => None,
        }
    }
}

/// Parses a whole source document into its top-level expressions.
pub fn parse_document(source: &str) -> Result<Vec<SExpr>, Error> {
    let mut lexer = Lexer::new(source);
    let mut stack: Vec<(Vec<SExpr>, Span)> = Vec::new();
    let mut top_level = Vec::new();

    while let Some(result) = lexer.next() {
        let located = result?;
        match located.token {
            Token::LeftParen => stack.push((Vec::new(), located.span)),
            Token::RightParen => {
                let (items, span) = stack.pop().ok_or_else(|| {
                    Error::TextFormat(format!("{}: unmatched closing paren", located.span))
                })?;
                let list = SExpr::List(items, span);
                match stack.last_mut() {
                    Some((parent, _)) => parent.push(list),
                    None => top_level.push(list),
                }
            }
            _ => {
                let atom = SExpr::Atom(located);
                match stack.last_mut() {
                    Some((parent, _)) => parent.push(atom),
                    None => top_level.push(atom),
                }
            }
        }
    }

    if let Some((_, span)) = stack.last() {
        return Err(Error::TextFormat(format!("{}: unclosed paren", span)));
    }
    Ok(top_level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nesting() {
        let document = parse_document("(module (func $f (result i32) i32.const 7))").unwrap();
        assert_eq!(document.len(), 1);
        let module = document[0].as_list_of("module").unwrap();
        assert_eq!(module.len(), 1);
        let func = module[0].as_list_of("func").unwrap();
        assert_eq!(func.len(), 4);
    }

    #[test]
    fn unbalanced_parens_rejected() {
        assert!(parse_document("(module").is_err());
        assert!(parse_document("module)").is_err());
    }
}
