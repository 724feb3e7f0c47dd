//! Handle Lox's lexical analysis.
//!
//! Contains the [Scanner] which implements an [Iterator] that yields [Lexeme]s, each of which
//! represents a [Token].
//!
//! # Example
//!
//! ```
//! use rlox::scanner::{Scanner, Lexeme, Token};
//! let scanner = Scanner::new("print 1 + 2;");
//! let tokens: Vec<_> = scanner
//!     .map(|lexeme| lexeme.token())
//!     .take_while(|&token| token != Token::Eof) // scanner will yield Eof forever...
//!     .collect();
//!
//! use Token::*;
//! assert_eq!(
//!     vec![Print, Number, Plus, Number, Semicolon],
//!     tokens
//! );
//! ```
//!
//! # Note on terminology
//!
//! I did NOT use the terminology in Crafting Interpreters.  Frankly, the terminology surrounding
//! the nouns in field of lexical analysis confuses me, so I'm just using some terms that make
//! sense and avoid using "type" as an identifier.  Thus, when Crafting Interpreters says:
//!
//! - Token, in this code it's a [Lexeme].
//! - TokenType, in this code it's a [Token].
//! - lexme, in this code it's [Lexeme::text()].

/// A lexeme: one contiguous span from some Lox source code.
///
/// Valid only while the source buffer it borrows from is alive.
#[derive(Clone, Debug)]
pub struct Lexeme<'a> {
    /// The [Token] of this lexeme.
    token: Token,
    /// The actual text from the source code. For string literals, this
    /// includes the surrounding quotes.
    text: &'a str,
    /// The line where this lexeme came from.
    line: usize,
}

/// What _type_ of [Lexeme] you have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[rustfmt::skip]
pub enum Token {
    // Single-character tokens.
    LeftParen, RightParen,
    LeftBrace, RightBrace,
    LeftBracket, RightBracket,
    Dot, Minus, Plus,
    Semicolon, Star, Slash,
    Bang,
    // One or two character tokens
    Equal, EqualEqual,
    Greater, GreaterEqual,
    Less, LessEqual,
    // `&` and `|` are the short-circuit logical operators, not bitwise ops.
    And, Or,
    // Literals
    Identifier, StrLiteral, Number,
    // Keywords
    If, Else, True, False,
    For, While, Null, Var, Print,

    // Others
    Error, Eof
}

/// Scans Lox source code and iteratively yields [Lexeme]s.
///
/// The scanner is stateful, and therefore, can only be used to do one pass over the source code
/// string. Once the whole source code has been scanned, the scanner will forever yield
/// [Token::Eof].
#[derive(Debug)]
pub struct Scanner<'a> {
    start: &'a str,
    current: &'a str,
    line: usize,
}

impl<'a> Scanner<'a> {
    /// Start scanning the given string of source code.
    pub fn new(source: &'a str) -> Self {
        Scanner {
            start: source,
            current: source,
            line: 1,
        }
    }

    /// Yield the next [Lexeme] from the string. Once the scanner has reached the end-of-file, this
    /// function will always return an end-of-file lexeme.
    pub fn scan_token(&mut self) -> Lexeme<'a> {
        self.skip_whitespace_and_comments();
        self.start = self.current;

        if self.is_at_end() {
            return self.make_lexeme(Token::Eof);
        }

        match self.advance() {
            c if is_id_start(c) => self.identifier(),
            '.' if self.peek().is_ascii_digit() => self.number(),
            c if c.is_ascii_digit() => self.number(),
            '(' => self.make_lexeme(Token::LeftParen),
            ')' => self.make_lexeme(Token::RightParen),
            '{' => self.make_lexeme(Token::LeftBrace),
            '}' => self.make_lexeme(Token::RightBrace),
            '[' => self.make_lexeme(Token::LeftBracket),
            ']' => self.make_lexeme(Token::RightBracket),
            ';' => self.make_lexeme(Token::Semicolon),
            '.' => self.make_lexeme(Token::Dot),
            '-' => self.make_lexeme(Token::Minus),
            '+' => self.make_lexeme(Token::Plus),
            '/' => self.make_lexeme(Token::Slash),
            '*' => self.make_lexeme(Token::Star),
            '!' => self.make_lexeme(Token::Bang),
            '&' => self.make_lexeme(Token::And),
            '|' => self.make_lexeme(Token::Or),
            '=' => {
                let followed_by_equal = self.match_and_advance('=');
                self.make_lexeme(if followed_by_equal {
                    Token::EqualEqual
                } else {
                    Token::Equal
                })
            }
            '<' => {
                let followed_by_equal = self.match_and_advance('=');
                self.make_lexeme(if followed_by_equal {
                    Token::LessEqual
                } else {
                    Token::Less
                })
            }
            '>' => {
                let followed_by_equal = self.match_and_advance('=');
                self.make_lexeme(if followed_by_equal {
                    Token::GreaterEqual
                } else {
                    Token::Greater
                })
            }
            '"' => self.string(),
            _ => self.error_token("Unexpected character"),
        }
    }

    /// Returns `true` if we've reached the end of the source code.
    pub fn is_at_end(&self) -> bool {
        self.current.is_empty()
    }

    pub fn make_sentinel(&self, message: &'static str) -> Lexeme<'a> {
        Lexeme {
            token: Token::Error,
            text: message,
            line: 0,
        }
    }

    /// Advances self.current, s.t., self.start < self.current are a reference to the same str.
    /// Returns the next valid char.
    ///
    /// # Panics
    ///
    /// If this is called at the end of string.
    fn advance(&mut self) -> char {
        let c = match self.current.chars().next() {
            Some(c) => c,
            None => panic!("called advance() at end of file"),
        };

        let len = c.len_utf8();
        self.current = &self.current[len..];
        assert!(self.current.len() < self.start.len());

        c
    }

    /// Peek at the first char in self.current.
    fn peek(&self) -> char {
        self.current.chars().next().unwrap_or('\0')
    }

    /// Peek at the second char in self.current.
    fn peek_next(&self) -> char {
        let mut chars = self.current.chars();
        chars.next();
        chars.next().unwrap_or('\0')
    }

    /// Matches the expected character. If the next character matches, returns true and advances
    /// self.current. Otherwise, return false and does not update anything.
    fn match_and_advance(&mut self, expected: char) -> bool {
        if self.is_at_end() {
            return false;
        }

        let next_char = self.peek();
        if next_char != expected {
            return false;
        }

        self.current = &self.current[next_char.len_utf8()..];
        true
    }

    /// Skips whitespace, `//` line comments, and `/* */` block comments.
    ///
    /// An unterminated block comment silently runs to end-of-file rather than
    /// producing an [Token::Error] — this mirrors the original implementation,
    /// which never checks for the closing `*/` before hitting end-of-file.
    fn skip_whitespace_and_comments(&mut self) {
        loop {
            let c = self.peek();
            match c {
                ' ' | '\r' | '\t' => {
                    self.advance();
                }
                '\n' => {
                    self.line += 1;
                    self.advance();
                }
                '/' => {
                    if self.peek_next() == '/' {
                        while self.peek() != '\n' && !self.is_at_end() {
                            self.advance();
                        }
                    } else if self.peek_next() == '*' {
                        self.advance(); // consume '/'
                        self.advance(); // consume '*'
                        while !(self.peek() == '*' && self.peek_next() == '/') && !self.is_at_end()
                        {
                            if self.peek() == '\n' {
                                self.line += 1;
                            }
                            self.advance();
                        }
                        if !self.is_at_end() {
                            self.advance(); // consume '*'
                            self.advance(); // consume '/'
                        }
                    } else {
                        return;
                    }
                }
                _ => return,
            };
        }
    }

    /// Scan an identifier or keyword.
    fn identifier(&mut self) -> Lexeme<'a> {
        while is_id_continue(self.peek()) {
            self.advance();
        }

        self.make_lexeme(self.identifier_type())
    }

    /// Scan a string literal. Expects the opening quote to have been consumed.
    ///
    /// An unterminated string (no closing quote before end-of-file) silently
    /// produces a [Token::StrLiteral] spanning to end-of-file rather than an
    /// [Token::Error] — the downstream compiler then fails on the next token
    /// it expects. See spec §9.
    fn string(&mut self) -> Lexeme<'a> {
        while self.peek() != '"' && !self.is_at_end() {
            if self.peek() == '\n' {
                self.line += 1;
            }
            self.advance();
        }

        if !self.is_at_end() {
            self.advance(); // consume closing quote
        }

        self.make_lexeme(Token::StrLiteral)
    }

    /// Scan a number literal: `digit+ ('.' digit+)? 'f'?` or `'.' digit+ 'f'?`.
    /// The first digit (or leading `.`) has already been consumed.
    fn number(&mut self) -> Lexeme<'a> {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            self.advance(); // consume '.'
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        if self.peek() == 'f' {
            self.advance();
        }

        self.make_lexeme(Token::Number)
    }

    /// Check if the identifier is a keyword, or a normal identifier.
    fn identifier_type(&self) -> Token {
        let mut chars = self.start.chars();

        match chars.next().unwrap_or('\0') {
            'i' => self.check_keyword("if", Token::If),
            'e' => self.check_keyword("else", Token::Else),
            't' => self.check_keyword("true", Token::True),
            'n' => self.check_keyword("null", Token::Null),
            'f' => match chars.next().unwrap_or('\0') {
                'a' => self.check_keyword("false", Token::False),
                'o' => self.check_keyword("for", Token::For),
                _ => Token::Identifier,
            },
            'w' => self.check_keyword("while", Token::While),
            'v' => self.check_keyword("var", Token::Var),
            'p' => self.check_keyword("print", Token::Print),
            _ => Token::Identifier,
        }
    }

    /// Confirms that the current lexeme is a keyword or identifier.
    fn check_keyword(&self, keyword_text: &'static str, keyword: Token) -> Token {
        let token_length = self.start.len() - self.current.len();
        let lexeme = &self.start[..token_length];

        if lexeme == keyword_text {
            keyword
        } else {
            Token::Identifier
        }
    }

    /// Returns a lexeme with [Token::Error] as its token.
    fn error_token(&self, message: &'a str) -> Lexeme<'a> {
        assert_ne!(self.start, self.current);
        Lexeme {
            token: Token::Error,
            text: message,
            line: self.line,
        }
    }

    /// Returns a [Lexeme] from the span between self.start and self.current with the given
    /// [Token].
    fn make_lexeme(&self, token: Token) -> Lexeme<'a> {
        assert!(self.current.len() <= self.start.len());
        let extent = self.start.len() - self.current.len();
        let text = &self.start[..extent];

        Lexeme {
            token,
            text,
            line: self.line,
        }
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Lexeme<'a>;

    fn next(&mut self) -> Option<Lexeme<'a>> {
        Some(self.scan_token())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        // This iterator is infinite.
        (usize::MAX, None)
    }
}

impl<'a> Lexeme<'a> {
    /// Return the line where this lexeme was found.
    pub fn line(&self) -> usize {
        self.line
    }

    /// Return the literal text of this lexeme. For string literals, this always includes the
    /// surrounding quotes.
    pub fn text(&self) -> &'a str {
        self.text
    }

    /// Return the [Token] of this lexeme.
    pub fn token(&self) -> Token {
        self.token
    }
}

///////////////////////////////////////////// Helpers /////////////////////////////////////////////

/// Returns true if this char can start an identifier or keyword.
fn is_id_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

/// Returns true if this char can be used after the first character of an identifier or keyword.
fn is_id_continue(c: char) -> bool {
    is_id_start(c) || c.is_ascii_digit()
}

////////////////////////////////////////////// Tests //////////////////////////////////////////////

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn scanning_single_character_tokens() {
        use Token::*;

        let source = "(){}[].;!";
        let tokens: Vec<_> = Scanner::new(source)
            .map(|lexeme| lexeme.token())
            .take_while(|&t| t != Eof)
            .collect();

        assert_eq!(
            vec![
                LeftParen, RightParen, LeftBrace, RightBrace, LeftBracket, RightBracket, Dot,
                Semicolon, Bang
            ],
            tokens
        );
    }

    #[test]
    fn scanning_every_keyword() {
        use Token::*;

        let source_code = "if (ifree) {
            print printer;
        } else {
            for (former) {
                nill = null;
            }
            truede = true or false;
        }
        var varied;
        while (whileLoop) {
            0;
        }";

        #[rustfmt::skip]
        let expected_tokens = vec![
            If, LeftParen, Identifier, RightParen, LeftBrace,
                Print, Identifier, Semicolon,
            RightBrace, Else, LeftBrace,
                For, LeftParen, Identifier, RightParen, LeftBrace,
                    Identifier, Equal, Null, Semicolon,
                RightBrace,
                Identifier, Equal, True, Identifier, False, Semicolon,
            RightBrace,
            Var, Identifier, Semicolon,
            While, LeftParen, Identifier, RightParen, LeftBrace,
                Number, Semicolon,
            RightBrace,
        ];

        let actual_tokens: Vec<_> = Scanner::new(source_code)
            .map(|lexeme| lexeme.token())
            .take_while(|&token| token != Eof)
            .collect();
        assert_eq!(actual_tokens, expected_tokens);
    }

    #[test]
    fn logical_and_or_are_single_characters() {
        use Token::*;
        let tokens: Vec<_> = Scanner::new("a & b | c")
            .map(|lexeme| lexeme.token())
            .take_while(|&t| t != Eof)
            .collect();
        assert_eq!(vec![Identifier, And, Identifier, Or, Identifier], tokens);
    }

    #[test]
    fn numbers_with_trailing_f_and_leading_dot() {
        let tokens: Vec<Lexeme> = Scanner::new("1 1.5 1f 1.5f .5")
            .take_while(|lexeme| lexeme.token() != Token::Eof)
            .collect();
        assert!(tokens.iter().all(|lexeme| lexeme.token() == Token::Number));
        assert_eq!(
            vec!["1", "1.5", "1f", "1.5f", ".5"],
            tokens.iter().map(|lexeme| lexeme.text()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn unterminated_string_does_not_error() {
        let mut scanner = Scanner::new("\"unterminated");
        let lexeme = scanner.scan_token();
        assert_eq!(Token::StrLiteral, lexeme.token());
        assert_eq!("\"unterminated", lexeme.text());
    }

    #[test]
    fn block_comment_tracks_newlines() {
        let source = "/* line one\nline two\nline three */ x";
        let mut scanner = Scanner::new(source);
        let lexeme = scanner.scan_token();
        assert_eq!(Token::Identifier, lexeme.token());
        assert_eq!(3, lexeme.line());
    }

    #[test]
    fn line_counter_advances_across_code_and_comments() {
        let source = "1;\n// a comment\n2;\n/* block\nspans */3;";
        let lines: Vec<_> = Scanner::new(source)
            .take_while(|lexeme| lexeme.token() != Token::Eof)
            .map(|lexeme| lexeme.line())
            .collect();
        assert_eq!(vec![1, 1, 3, 3, 5, 5], lines);
    }

    #[test]
    fn consumed_bytes_account_for_the_whole_source() {
        let source = "var x = 1 + 2; // trailing comment\n";
        let mut scanner = Scanner::new(source);
        let mut consumed = 0;
        loop {
            let before = scanner.current.len();
            let lexeme = scanner.scan_token();
            let after = scanner.current.len();
            consumed += before - after;
            if lexeme.token() == Token::Eof {
                break;
            }
        }
        assert_eq!(source.len(), consumed);
    }
}
