//! PGN lexer and game splitter

use super::{PgnError, PgnGame, RESULT_TOKENS};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Tag(String, String),
    San(String),
    Result(String),
}

/// Mainline moves and result of a bare movetext string
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Movetext {
    pub moves: Vec<String>,
    pub result: Option<String>,
}

/// Characters that terminate a symbol token
const DELIMITERS: &[char] = &['{', '}', '(', ')', '[', ']', ';', '$'];

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    depth: usize,
}

impl Lexer {
    fn new(text: &str) -> Self {
        Self {
            chars: text.trim_start_matches('\u{feff}').chars().collect(),
            pos: 0,
            line: 1,
            depth: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn at_line_start(&self) -> bool {
        self.pos == 0 || self.chars.get(self.pos - 1) == Some(&'\n')
    }

    fn skip_line(&mut self) {
        while let Some(c) = self.bump() {
            if c == '\n' {
                break;
            }
        }
    }

    fn skip_inline_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c == ' ' || c == '\t') {
            self.bump();
        }
    }

    /// Next mainline token; comments, NAGs, move numbers and variations are consumed
    fn next_token(&mut self) -> Result<Option<(usize, Token)>, PgnError> {
        loop {
            let c = match self.peek() {
                Some(c) => c,
                None => {
                    if self.depth > 0 {
                        return Err(PgnError::UnbalancedVariation { line: self.line });
                    }
                    return Ok(None);
                }
            };

            if c.is_whitespace() {
                self.bump();
                continue;
            }

            let line = self.line;
            match c {
                '%' if self.at_line_start() => self.skip_line(),
                ';' => self.skip_line(),
                '{' => {
                    self.bump();
                    loop {
                        match self.bump() {
                            None => return Err(PgnError::UnterminatedComment { line }),
                            Some('}') => break,
                            Some(_) => {}
                        }
                    }
                }
                '(' => {
                    self.bump();
                    self.depth += 1;
                }
                ')' => {
                    self.bump();
                    if self.depth == 0 {
                        return Err(PgnError::UnbalancedVariation { line });
                    }
                    self.depth -= 1;
                }
                '$' => {
                    self.bump();
                    while matches!(self.peek(), Some(d) if d.is_ascii_digit()) {
                        self.bump();
                    }
                }
                '[' => {
                    if self.depth > 0 {
                        return Err(PgnError::UnexpectedToken {
                            line,
                            token: "[".to_string(),
                        });
                    }
                    let (name, value) = self.read_tag(line)?;
                    return Ok(Some((line, Token::Tag(name, value))));
                }
                _ => {
                    let symbol = self.read_symbol();
                    if symbol.is_empty() {
                        self.bump();
                        return Err(PgnError::UnexpectedToken {
                            line,
                            token: c.to_string(),
                        });
                    }
                    if self.depth > 0 {
                        continue;
                    }
                    if let Some(token) = classify_symbol(&symbol, line)? {
                        return Ok(Some((line, token)));
                    }
                }
            }
        }
    }

    fn read_symbol(&mut self) -> String {
        let mut symbol = String::new();
        while let Some(c) = self.peek() {
            if c.is_whitespace() || DELIMITERS.contains(&c) {
                break;
            }
            symbol.push(c);
            self.bump();
        }
        symbol
    }

    fn read_tag(&mut self, line: usize) -> Result<(String, String), PgnError> {
        let malformed = |reason: &str| PgnError::MalformedTag {
            line,
            reason: reason.to_string(),
        };

        self.bump(); // '['
        self.skip_inline_whitespace();

        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                name.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if name.is_empty() {
            return Err(malformed("missing tag name"));
        }

        self.skip_inline_whitespace();
        if self.bump() != Some('"') {
            return Err(malformed("missing quoted value"));
        }

        let mut value = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => return Err(malformed("unterminated value")),
                Some('\\') => match self.bump() {
                    Some(escaped) if escaped != '\n' => value.push(escaped),
                    _ => return Err(malformed("unterminated value")),
                },
                Some('"') => break,
                Some(c) => value.push(c),
            }
        }

        self.skip_inline_whitespace();
        if self.bump() != Some(']') {
            return Err(malformed("missing closing bracket"));
        }

        Ok((name, value))
    }
}

/// Turn a symbol into a result, a SAN move, or nothing (move number)
fn classify_symbol(symbol: &str, line: usize) -> Result<Option<Token>, PgnError> {
    if RESULT_TOKENS.contains(&symbol) {
        return Ok(Some(Token::Result(symbol.to_string())));
    }

    // Move numbers: "12." "12..." and glued forms like "12.e4"
    let mut body = symbol;
    let after_digits = symbol.trim_start_matches(|c: char| c.is_ascii_digit());
    if after_digits.len() < symbol.len() && after_digits.starts_with('.') {
        body = after_digits.trim_start_matches('.');
        if body.is_empty() {
            return Ok(None);
        }
    } else if symbol.chars().all(|c| c == '.') {
        return Ok(None);
    }

    normalize_san(body)
        .map(|san| Some(Token::San(san)))
        .ok_or_else(|| PgnError::UnexpectedToken {
            line,
            token: symbol.to_string(),
        })
}

/// Strip annotation glyphs, normalize zero-castling; `None` if not SAN-shaped
fn normalize_san(raw: &str) -> Option<String> {
    let trimmed = raw.trim_end_matches(['!', '?']);
    let body = trimmed.trim_end_matches(['+', '#']);
    let suffix = &trimmed[body.len()..];

    let body = match body {
        "0-0" => "O-O",
        "0-0-0" => "O-O-O",
        other => other,
    };

    let first = body.chars().next()?;
    if !"KQRBNOabcdefgh".contains(first) {
        return None;
    }
    if !body
        .chars()
        .all(|c| "KQRBNabcdefgh12345678x=O-".contains(c))
    {
        return None;
    }

    Some(format!("{}{}", body, suffix))
}

/// Parse a PGN document holding one or more games
pub fn parse_games(text: &str) -> Result<Vec<PgnGame>, PgnError> {
    let mut lexer = Lexer::new(text);
    let mut games = Vec::new();
    let mut current = PgnGame::default();
    let mut in_movetext = false;

    while let Some((_, token)) = lexer.next_token()? {
        match token {
            Token::Tag(name, value) => {
                if in_movetext {
                    games.push(std::mem::take(&mut current));
                    in_movetext = false;
                }
                current.tags.push((name, value));
            }
            Token::San(san) => {
                in_movetext = true;
                current.moves.push(san);
            }
            Token::Result(result) => {
                if current.tags.is_empty() && current.moves.is_empty() {
                    continue;
                }
                current.result = Some(result);
                games.push(std::mem::take(&mut current));
                in_movetext = false;
            }
        }
    }

    if !current.tags.is_empty() || !current.moves.is_empty() {
        games.push(current);
    }

    if games.is_empty() {
        return Err(PgnError::Empty);
    }
    Ok(games)
}

/// Parse bare movetext (no tag section), e.g. the Lichess `moves` field
pub fn parse_movetext(text: &str) -> Result<Movetext, PgnError> {
    let mut lexer = Lexer::new(text);
    let mut movetext = Movetext::default();

    while let Some((line, token)) = lexer.next_token()? {
        match token {
            Token::San(san) => movetext.moves.push(san),
            Token::Result(result) => {
                movetext.result = Some(result);
                break;
            }
            Token::Tag(name, _) => {
                return Err(PgnError::UnexpectedToken {
                    line,
                    token: format!("[{}", name),
                })
            }
        }
    }

    Ok(movetext)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHESSCOM_PGN: &str = r#"[Event "Live Chess"]
[Site "Chess.com"]
[Date "2024.05.01"]
[White "alice"]
[Black "bob"]
[Result "1-0"]
[ECO "C50"]
[TimeControl "600"]
[Link "https://www.chess.com/game/live/108866"]

1. e4 {[%clk 0:09:58.5]} 1... e5 {[%clk 0:09:57.1]} 2. Bc4 Nc6 3. Qh5 Nf6?? 4. Qxf7# 1-0
"#;

    #[test]
    fn test_parse_single_game_with_clock_comments() {
        let games = parse_games(CHESSCOM_PGN).unwrap();
        assert_eq!(games.len(), 1);
        let game = &games[0];
        assert_eq!(game.tag("White"), Some("alice"));
        assert_eq!(game.tag("Link"), Some("https://www.chess.com/game/live/108866"));
        assert_eq!(game.moves, vec!["e4", "e5", "Bc4", "Nc6", "Qh5", "Nf6", "Qxf7#"]);
        assert_eq!(game.result.as_deref(), Some("1-0"));
    }

    #[test]
    fn test_parse_multiple_games() {
        let text = "[Event \"A\"]\n\n1. d4 d5 1/2-1/2\n\n[Event \"B\"]\n[Result \"*\"]\n\n1. c4 *\n";
        let games = parse_games(text).unwrap();
        assert_eq!(games.len(), 2);
        assert_eq!(games[0].tag("Event"), Some("A"));
        assert_eq!(games[0].result.as_deref(), Some("1/2-1/2"));
        assert_eq!(games[1].moves, vec!["c4"]);
    }

    #[test]
    fn test_variations_nags_and_line_comments_skipped() {
        let text = "1. e4 $1 e5 (1... c5 2. Nf3 (2. c3) d6) 2. Nf3 ; a comment\n2... Nc6 0-1";
        let mt = parse_movetext(text).unwrap();
        assert_eq!(mt.moves, vec!["e4", "e5", "Nf3", "Nc6"]);
        assert_eq!(mt.result.as_deref(), Some("0-1"));
    }

    #[test]
    fn test_escaped_tag_values() {
        let games = parse_games("[Event \"The \\\"Big\\\" One\"]\n1. e4 *").unwrap();
        assert_eq!(games[0].tag("Event"), Some("The \"Big\" One"));
    }

    #[test]
    fn test_zero_castling_normalized_and_glued_numbers() {
        let mt = parse_movetext("1.e4 e5 2.Nf3 Nc6 3.Bc4 Bc5 4.0-0+ Nf6").unwrap();
        assert_eq!(mt.moves[6], "O-O+");
        assert_eq!(mt.moves.len(), 8);
        assert_eq!(mt.result, None);
    }

    #[test]
    fn test_known_tag_ignores_placeholders() {
        let games = parse_games("[Date \"????.??.??\"]\n[Round \"-\"]\n1. e4 *").unwrap();
        assert_eq!(games[0].known_tag("Date"), None);
        assert_eq!(games[0].known_tag("Round"), Some("-"));
    }

    #[test]
    fn test_unterminated_comment_reports_line() {
        let err = parse_movetext("1. e4\n{ never closed").unwrap_err();
        assert_eq!(err, PgnError::UnterminatedComment { line: 2 });
    }

    #[test]
    fn test_unbalanced_variation() {
        assert!(matches!(
            parse_movetext("1. e4 ) e5"),
            Err(PgnError::UnbalancedVariation { .. })
        ));
        assert!(matches!(
            parse_movetext("1. e4 (1. d4"),
            Err(PgnError::UnbalancedVariation { .. })
        ));
    }

    #[test]
    fn test_malformed_tag() {
        assert!(matches!(
            parse_games("[Event Live]\n1. e4 *"),
            Err(PgnError::MalformedTag { line: 1, .. })
        ));
    }

    #[test]
    fn test_garbage_token_rejected() {
        assert!(matches!(
            parse_movetext("1. e4 hello"),
            Err(PgnError::UnexpectedToken { .. })
        ));
    }

    #[test]
    fn test_empty_document() {
        assert_eq!(parse_games("  \n\n").unwrap_err(), PgnError::Empty);
    }
}
