//! Command-line tokenizer.
//!
//! The kernel consumes already-split command words; this is the thin
//! collaborator that does the splitting. Words, the pipe and background
//! markers, and the two redirection operators — nothing more.

use logos::Logos;

use crate::parser::ParseError;

#[derive(Logos, Debug, Clone, PartialEq, Eq)]
#[logos(skip r"[ \t]+")]
pub enum Token {
    #[token("|")]
    Pipe,

    #[token("&")]
    Background,

    #[token("<")]
    RedirectIn,

    #[token(">")]
    RedirectOut,

    /// A bare or double-quoted word.
    #[regex(r#"[^|&<>"\s]+"#, |lex| lex.slice().to_string())]
    #[regex(r#""[^"]*""#, |lex| {
        let s = lex.slice();
        s[1..s.len() - 1].to_string()
    })]
    Word(String),
}

pub fn tokenize(line: &str) -> Result<Vec<Token>, ParseError> {
    Token::lexer(line)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| ParseError::UnexpectedCharacter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_words_and_markers() {
        let tokens = tokenize("yes | head -n 1 &").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Word("yes".into()),
                Token::Pipe,
                Token::Word("head".into()),
                Token::Word("-n".into()),
                Token::Word("1".into()),
                Token::Background,
            ]
        );
    }

    #[test]
    fn redirections_are_markers_not_words() {
        let tokens = tokenize("sort < in.txt > out.txt").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Word("sort".into()),
                Token::RedirectIn,
                Token::Word("in.txt".into()),
                Token::RedirectOut,
                Token::Word("out.txt".into()),
            ]
        );
    }

    #[test]
    fn double_quotes_group_a_word() {
        let tokens = tokenize(r#"echo "hello world""#).unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Word("echo".into()),
                Token::Word("hello world".into()),
            ]
        );
    }

    #[test]
    fn unterminated_quote_is_an_error() {
        assert_eq!(
            tokenize(r#"echo "oops"#),
            Err(ParseError::UnexpectedCharacter)
        );
    }

    #[test]
    fn empty_line_has_no_tokens() {
        assert!(tokenize("   ").unwrap().is_empty());
    }
}
