//! Token scanner used for diagnostics
//!
//! The engine parser does not report node positions, so the checker scans
//! the source once to reject unrecognised tokens up front and to locate the
//! tokens it reports errors against.

use std::collections::HashMap;

use super::diagnostic::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Ident,
    Number,
    Str,
    Punct,
}

#[derive(Debug, Clone)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub location: Location,
}

/// Tokens of one source text plus any lexical errors
#[derive(Debug, Default)]
pub(crate) struct Lexed {
    pub tokens: Vec<Token>,
    pub errors: Vec<(Location, String)>,
    pub end: Location,
}

const TWO_CHAR_OPS: [&str; 6] = ["==", "!=", "<=", ">=", "&&", "||"];
const ONE_CHAR_OPS: &str = "+-*/%<>!?:.,()[]{}";
const STRING_PREFIXES: [&str; 12] = [
    "r", "R", "b", "B", "rb", "rB", "Rb", "RB", "br", "bR", "Br", "BR",
];

struct Scanner {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl Scanner {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn peek(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).copied()
    }

    fn location(&self) -> Location {
        Location {
            offset: self.pos,
            line: self.line,
            column: self.column,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn text_from(&self, start: usize) -> String {
        self.chars[start..self.pos].iter().collect()
    }

    fn eat_while(&mut self, pred: impl Fn(char) -> bool) {
        while matches!(self.peek(0), Some(c) if pred(c)) {
            self.bump();
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Scan the whole source, continuing past errors
pub(crate) fn tokenize(source: &str) -> Lexed {
    let mut sc = Scanner::new(source);
    let mut lexed = Lexed::default();

    while let Some(c) = sc.peek(0) {
        let start = sc.pos;
        let location = sc.location();

        if c.is_whitespace() {
            sc.bump();
            continue;
        }

        if c == '/' && sc.peek(1) == Some('/') {
            sc.eat_while(|c| c != '\n');
            continue;
        }

        if is_ident_start(c) {
            sc.eat_while(is_ident_char);
            let word = sc.text_from(start);
            if STRING_PREFIXES.contains(&word.as_str()) && matches!(sc.peek(0), Some('"' | '\'')) {
                let raw = word.contains(['r', 'R']);
                scan_string(&mut sc, &mut lexed, start, location, raw);
            } else {
                lexed.tokens.push(Token {
                    kind: TokenKind::Ident,
                    text: word,
                    location,
                });
            }
            continue;
        }

        let follows_operand = lexed.tokens.last().map_or(false, |t| {
            matches!(t.kind, TokenKind::Ident | TokenKind::Number | TokenKind::Str)
                || t.text == ")"
                || t.text == "]"
        });
        if c.is_ascii_digit()
            || (c == '.' && !follows_operand && matches!(sc.peek(1), Some(d) if d.is_ascii_digit()))
        {
            scan_number(&mut sc);
            lexed.tokens.push(Token {
                kind: TokenKind::Number,
                text: sc.text_from(start),
                location,
            });
            continue;
        }

        if c == '"' || c == '\'' {
            scan_string(&mut sc, &mut lexed, start, location, false);
            continue;
        }

        if let Some(next) = sc.peek(1) {
            let pair: String = [c, next].iter().collect();
            if TWO_CHAR_OPS.contains(&pair.as_str()) {
                sc.bump();
                sc.bump();
                lexed.tokens.push(Token {
                    kind: TokenKind::Punct,
                    text: pair,
                    location,
                });
                continue;
            }
        }

        if ONE_CHAR_OPS.contains(c) {
            sc.bump();
            lexed.tokens.push(Token {
                kind: TokenKind::Punct,
                text: c.to_string(),
                location,
            });
            continue;
        }

        // A lone '=', '&' or '|' fails while looking for its second character,
        // so the offending text includes that character.
        sc.bump();
        if matches!(c, '=' | '&' | '|') {
            sc.bump();
        }
        lexed.errors.push((
            location,
            format!("Syntax error: token recognition error at: '{}'", sc.text_from(start)),
        ));
    }

    lexed.end = sc.location();
    lexed
}

fn scan_number(sc: &mut Scanner) {
    if sc.peek(0) == Some('0') && matches!(sc.peek(1), Some('x' | 'X')) {
        sc.bump();
        sc.bump();
        sc.eat_while(|c| c.is_ascii_hexdigit());
        if matches!(sc.peek(0), Some('u' | 'U')) {
            sc.bump();
        }
        return;
    }

    sc.eat_while(|c| c.is_ascii_digit());
    let mut is_float = false;
    if sc.peek(0) == Some('.') && matches!(sc.peek(1), Some(d) if d.is_ascii_digit()) {
        is_float = true;
        sc.bump();
        sc.eat_while(|c| c.is_ascii_digit());
    }
    if matches!(sc.peek(0), Some('e' | 'E')) {
        let sign = usize::from(matches!(sc.peek(1), Some('+' | '-')));
        if matches!(sc.peek(1 + sign), Some(d) if d.is_ascii_digit()) {
            is_float = true;
            for _ in 0..=sign {
                sc.bump();
            }
            sc.eat_while(|c| c.is_ascii_digit());
        }
    }
    if !is_float && matches!(sc.peek(0), Some('u' | 'U')) {
        sc.bump();
    }
}

fn scan_string(sc: &mut Scanner, lexed: &mut Lexed, start: usize, location: Location, raw: bool) {
    let Some(quote) = sc.bump() else {
        return;
    };
    let triple = sc.peek(0) == Some(quote) && sc.peek(1) == Some(quote);
    if triple {
        sc.bump();
        sc.bump();
    }

    loop {
        match sc.peek(0) {
            None => break,
            Some('\n') if !triple => break,
            Some('\\') if !raw => {
                sc.bump();
                sc.bump();
            }
            Some(c) if c == quote => {
                if !triple {
                    sc.bump();
                    lexed.tokens.push(Token {
                        kind: TokenKind::Str,
                        text: sc.text_from(start),
                        location,
                    });
                    return;
                }
                if sc.peek(1) == Some(quote) && sc.peek(2) == Some(quote) {
                    sc.bump();
                    sc.bump();
                    sc.bump();
                    lexed.tokens.push(Token {
                        kind: TokenKind::Str,
                        text: sc.text_from(start),
                        location,
                    });
                    return;
                }
                sc.bump();
            }
            Some(_) => {
                sc.bump();
            }
        }
    }

    lexed.errors.push((
        location,
        format!("Syntax error: token recognition error at: '{}'", sc.text_from(start)),
    ));
}

/// Check delimiter pairing and nesting depth over a token stream
pub(crate) fn check_delimiters(lexed: &Lexed, max_depth: usize) -> Vec<(Location, String)> {
    let mut errors = Vec::new();
    let mut open: Vec<(&str, Location)> = Vec::new();
    let mut depth_reported = false;

    for token in lexed.tokens.iter().filter(|t| t.kind == TokenKind::Punct) {
        match token.text.as_str() {
            "(" | "[" | "{" => {
                open.push((token.text.as_str(), token.location));
                if open.len() > max_depth && !depth_reported {
                    depth_reported = true;
                    errors.push((
                        token.location,
                        format!("Syntax error: expression nesting exceeds limit of {}", max_depth),
                    ));
                }
            }
            close @ (")" | "]" | "}") => match open.pop() {
                Some((opener, _)) if closing_for(opener) == close => {}
                Some((opener, _)) => errors.push((
                    token.location,
                    format!(
                        "Syntax error: mismatched input '{}' expecting '{}'",
                        close,
                        closing_for(opener)
                    ),
                )),
                None => errors.push((
                    token.location,
                    format!("Syntax error: mismatched input '{}' expecting <EOF>", close),
                )),
            },
            _ => {}
        }
    }

    if let Some((opener, _)) = open.last() {
        errors.push((
            lexed.end,
            format!("Syntax error: missing '{}' at '<EOF>'", closing_for(opener)),
        ));
    }
    errors
}

fn closing_for(opener: &str) -> &'static str {
    match opener {
        "(" => ")",
        "[" => "]",
        _ => "}",
    }
}

/// Hands out token locations in source order
///
/// Each distinct token text keeps its own cursor; the checker walks the tree
/// left to right, so the n-th request for a text maps to its n-th
/// occurrence.
pub(crate) struct Spans<'t> {
    tokens: &'t [Token],
    cursors: HashMap<String, usize>,
    last: Location,
}

impl<'t> Spans<'t> {
    pub(crate) fn new(tokens: &'t [Token]) -> Self {
        Self {
            tokens,
            cursors: HashMap::new(),
            last: Location::START,
        }
    }

    fn find(&self, text: &str, from: usize, call: bool) -> Option<usize> {
        (from..self.tokens.len()).find(|&i| {
            let tok = &self.tokens[i];
            matches!(tok.kind, TokenKind::Ident | TokenKind::Punct)
                && tok.text == text
                && (!call || self.tokens.get(i + 1).map_or(false, |n| n.text == "("))
        })
    }

    /// Location of the next occurrence of `text`
    pub(crate) fn next(&mut self, text: &str) -> Location {
        let from = self.cursors.get(text).copied().unwrap_or(0);
        if let Some(idx) = self.find(text, from, false) {
            self.cursors.insert(text.to_string(), idx + 1);
            self.last = self.tokens[idx].location;
        }
        self.last
    }

    /// Location of the `(` opening the next call of `name`
    pub(crate) fn next_call(&mut self, name: &str) -> Location {
        let from = self.cursors.get(name).copied().unwrap_or(0);
        if let Some(idx) = self.find(name, from, true) {
            self.cursors.insert(name.to_string(), idx + 1);
            self.last = self.tokens[idx + 1].location;
        }
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(source: &str) -> Vec<String> {
        tokenize(source).tokens.into_iter().map(|t| t.text).collect()
    }

    #[test]
    fn test_tokenize_operators_and_literals() {
        assert_eq!(
            texts("this.v1 >= 1.5e3 && 'a\\'b' != b\"x\""),
            vec!["this", ".", "v1", ">=", "1.5e3", "&&", "'a\\'b'", "!=", "b\"x\""]
        );
        assert_eq!(texts("0x1Fu + 3u"), vec!["0x1Fu", "+", "3u"]);
        assert_eq!(texts("a.b[0].c"), vec!["a", ".", "b", "[", "0", "]", ".", "c"]);
    }

    #[test]
    fn test_locations() {
        let lexed = tokenize("ret(v)\n  && x");
        let x = lexed.tokens.last().unwrap();
        assert_eq!(x.text, "x");
        assert_eq!((x.location.line, x.location.column), (2, 6));
    }

    #[test]
    fn test_lone_equals_includes_next_char() {
        let lexed = tokenize("dummy === 1");
        assert_eq!(lexed.errors.len(), 1);
        let (loc, msg) = &lexed.errors[0];
        assert_eq!(loc.column, 9);
        assert_eq!(msg, "Syntax error: token recognition error at: '= '");
    }

    #[test]
    fn test_unknown_character() {
        let lexed = tokenize("a @ b");
        assert_eq!(lexed.errors[0].1, "Syntax error: token recognition error at: '@'");
        assert_eq!(texts("a @ b"), vec!["a", "b"]);
    }

    #[test]
    fn test_unterminated_string() {
        let lexed = tokenize("x == 'abc");
        assert_eq!(lexed.errors[0].1, "Syntax error: token recognition error at: ''abc'");
    }

    #[test]
    fn test_triple_quoted_string() {
        assert_eq!(texts("'''a'b''' + r'\\d'"), vec!["'''a'b'''", "+", "r'\\d'"]);
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(texts("a // trailing\n+ b"), vec!["a", "+", "b"]);
    }

    #[test]
    fn test_delimiters() {
        assert!(check_delimiters(&tokenize("f([1, {2: 3}])"), 10).is_empty());

        let errs = check_delimiters(&tokenize("(1 + 2))"), 10);
        assert_eq!(errs[0].1, "Syntax error: mismatched input ')' expecting <EOF>");

        let errs = check_delimiters(&tokenize("f(1"), 10);
        assert_eq!(errs[0].1, "Syntax error: missing ')' at '<EOF>'");
        assert_eq!(errs[0].0.column, 4);

        let errs = check_delimiters(&tokenize("((((1))))"), 3);
        assert_eq!(errs.len(), 1);
    }

    #[test]
    fn test_spans_follow_source_order() {
        let lexed = tokenize("x.x + x(x)");
        let mut spans = Spans::new(&lexed.tokens);
        assert_eq!(spans.next("x").column, 1);
        assert_eq!(spans.next("x").column, 3);
        assert_eq!(spans.next_call("x").column, 8);
        assert_eq!(spans.next("x").column, 9);
        assert_eq!(spans.next("+").column, 5);
    }
}
