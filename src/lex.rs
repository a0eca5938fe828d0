//! Análisis léxico.
//!
//! # Tokenization
//! Esta es la primera fase del compilador. Descompone un [`InputStream`]
//! (flujo de caracteres) en unidades léxicas denominadas tokens. Los espacios
//! en blanco y los comentarios se descartan durante esta operación. Cada
//! token emitido lleva su lexema original y la posición donde comienza,
//! de la cual se toma el número de línea que usan tanto la traza como
//! los diagnósticos.
//!
//! # Contenido de un token
//! A diferencia de fases posteriores, la salida de este lexer es textual:
//! todo token conserva su lexema exacto, incluso operadores y palabras
//! clave. Los literales de cadena incluyen sus comillas y no se interpretan
//! secuencias de escape. Los literales enteros no se evalúan, ya que los
//! signos son operadores unarios del parser.
//!
//! # Reglas importantes del lenguaje
//! - El lenguaje distingue mayúsculas de minúsculas.
//! - Los comentarios `//` terminan con la línea; los comentarios `/* */`
//!   pueden cruzar líneas y un comentario sin cerrar termina en silencio
//!   al final de la entrada.
//! - `&` y `|` aislados se emiten como [`TokenKind::And`] y
//!   [`TokenKind::Or`] con lexema de un solo carácter. Es el parser quien
//!   reporta el error correspondiente al consumirlos.
//!
//! # Errores
//! El único error posible es de E/S. Caracteres que no pertenecen al
//! alfabeto del lenguaje se descartan sin reportar nada.

use crate::{
    error::{Diagnostics, ErrorCode},
    source::{self, InputStream, Located, Position},
};

use std::{
    fmt::{self, Display},
    io::{self, BufRead, Write},
    str::FromStr,
};

use thiserror::Error;
use tracing::{debug, trace};

/// Error de escaneo.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LexerError {
    /// Error de E/S originado por el [`InputStream`].
    #[error("I/O error")]
    Input(#[from] io::Error),
}

/// Categoría de un token.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Ident,
    IntConst,
    StrConst,

    Const,
    Int,
    Static,
    Break,
    Continue,
    If,
    Else,
    For,
    Return,
    Void,
    Main,
    Printf,

    /// `!`
    Not,

    /// `&&`, o bien `&` en caso de error.
    And,

    /// `||`, o bien `|` en caso de error.
    Or,

    /// `+`
    Plus,

    /// `-`
    Minus,

    /// `*`
    Mult,

    /// `/`
    Div,

    /// `%`
    Mod,

    /// `<`
    Lss,

    /// `<=`
    Leq,

    /// `>`
    Gre,

    /// `>=`
    Geq,

    /// `==`
    Eql,

    /// `!=`
    Neq,

    /// `=`
    Assign,

    /// `;`
    Semicolon,

    /// `,`
    Comma,

    /// `(`
    OpenParen,

    /// `)`
    CloseParen,

    /// `[`
    OpenSquare,

    /// `]`
    CloseSquare,

    /// `{`
    OpenCurly,

    /// `}`
    CloseCurly,
}

impl TokenKind {
    /// Código de categoría con el que se imprime el token.
    pub fn code(self) -> &'static str {
        use TokenKind::*;

        match self {
            Ident       => "IDENFR",
            IntConst    => "INTCON",
            StrConst    => "STRCON",
            Const       => "CONSTTK",
            Int         => "INTTK",
            Static      => "STATICTK",
            Break       => "BREAKTK",
            Continue    => "CONTINUETK",
            If          => "IFTK",
            Else        => "ELSETK",
            For         => "FORTK",
            Return      => "RETURNTK",
            Void        => "VOIDTK",
            Main        => "MAINTK",
            Printf      => "PRINTFTK",
            Not         => "NOT",
            And         => "AND",
            Or          => "OR",
            Plus        => "PLUS",
            Minus       => "MINU",
            Mult        => "MULT",
            Div         => "DIV",
            Mod         => "MOD",
            Lss         => "LSS",
            Leq         => "LEQ",
            Gre         => "GRE",
            Geq         => "GEQ",
            Eql         => "EQL",
            Neq         => "NEQ",
            Assign      => "ASSIGN",
            Semicolon   => "SEMICN",
            Comma       => "COMMA",
            OpenParen   => "LPARENT",
            CloseParen  => "RPARENT",
            OpenSquare  => "LBRACK",
            CloseSquare => "RBRACK",
            OpenCurly   => "LBRACE",
            CloseCurly  => "RBRACE",
        }
    }
}

impl Display for TokenKind {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(self.code())
    }
}

/// Tabla de lexemas fijos: palabras clave, operadores y puntuación.
const KEYWORDS: &[(&str, TokenKind)] = {
    use TokenKind::*;

    &[
        ("const",    Const),
        ("int",      Int),
        ("static",   Static),
        ("break",    Break),
        ("continue", Continue),
        ("if",       If),
        ("else",     Else),
        ("for",      For),
        ("return",   Return),
        ("void",     Void),
        ("main",     Main),
        ("printf",   Printf),
        ("!",        Not),
        ("&&",       And),
        ("||",       Or),
        ("+",        Plus),
        ("-",        Minus),
        ("*",        Mult),
        ("/",        Div),
        ("%",        Mod),
        ("<",        Lss),
        ("<=",       Leq),
        (">",        Gre),
        (">=",       Geq),
        ("==",       Eql),
        ("!=",       Neq),
        ("=",        Assign),
        (";",        Semicolon),
        (",",        Comma),
        ("(",        OpenParen),
        (")",        CloseParen),
        ("[",        OpenSquare),
        ("]",        CloseSquare),
        ("{",        OpenCurly),
        ("}",        CloseCurly),
    ]
};

impl FromStr for TokenKind {
    type Err = ();

    /// Busca un lexema en la tabla de palabras clave y operadores.
    fn from_str(string: &str) -> Result<Self, Self::Err> {
        KEYWORDS
            .iter()
            .find(|&&(lexeme, _)| lexeme == string)
            .map(|&(_, kind)| kind)
            .ok_or(())
    }
}

/// Objeto resultante del análisis léxico.
///
/// Un token es inmutable una vez producido. Las copias que guarda el
/// árbol sintáctico son independientes del vector de tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    kind: TokenKind,
    lexeme: String,
    position: Position,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, position: Position) -> Self {
        Token {
            kind,
            lexeme: lexeme.into(),
            position,
        }
    }

    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    pub fn lexeme(&self) -> &str {
        &self.lexeme
    }

    pub fn position(&self) -> Position {
        self.position
    }

    /// Número de línea donde comienza el token.
    pub fn line(&self) -> u32 {
        self.position.line()
    }

    /// Determina si se trata de un `&` o `|` aislado.
    pub fn is_malformed(&self) -> bool {
        matches!(self.kind, TokenKind::And | TokenKind::Or) && self.lexeme.len() == 1
    }
}

impl Display for Token {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{} {}", self.kind, self.lexeme)
    }
}

/// Máquina de estados para análisis léxico.
///
/// Un lexer puede encontrarse en uno de diversos estados. La
/// salida del lexer, así como su siguiente estado, se define
/// a partir de tanto su estado actual como el siguiente carácter
/// encontrado en el flujo de entrada.
pub struct Lexer<S: Iterator> {
    source: std::iter::Peekable<S>,
    state: State,
    start: Position,
    lexeme: String,
}

/// Posibles estados del lexer.
enum State {
    /// Estado que ocurre antes de encontrar el inicio de un token.
    Start,

    /// Ocurrió un error de E/S; el lexer ya no produce más tokens.
    Error,

    /// Estado de completitud; siempre emite un token de la categoría
    /// incluida con el lexema acumulado y pasa a [`State::Start`].
    Complete(TokenKind),

    /// Se encontró `/`.
    ///
    /// Puede tratarse de una división o del inicio de un comentario.
    Slash,

    /// Comentario de línea.
    ///
    /// Este estado vuelve a [`State::Start`] al encontrar `'\n'`.
    LineComment,

    /// Interior de un comentario de bloque.
    BlockComment,

    /// Interior de un comentario de bloque, inmediatamente tras un `*`.
    BlockCommentStar,

    /// Constante entera.
    ///
    /// Este estado incluirá dígitos en el lexema mientras que
    /// el siguiente carácter sea un dígito.
    Integer,

    /// Término que puede ser un identificador o una palabra clave.
    Word,

    /// Literal de cadena, después de la comilla de apertura.
    Text,

    /// Primer carácter de un operador que podría tener dos caracteres.
    Operator(char),
}

impl<S: InputStream> Lexer<S> {
    /// Crea un lexer en estado inicial a partir de un flujo.
    pub fn new(source: S) -> Self {
        Lexer {
            source: source.peekable(),
            state: State::Start,
            start: Position::default(),
            lexeme: String::new(),
        }
    }

    /// Reduce la entrada completa a una secuencia de tokens.
    ///
    /// Solo un error de E/S puede impedirlo, en cuyo caso se descartan
    /// los tokens obtenidos hasta el momento.
    pub fn tokenize(self) -> Result<Vec<Token>, Located<LexerError>> {
        self.collect()
    }

    /// Intenta construir un siguiente token.
    fn lex(&mut self) -> Result<Option<Token>, LexerError> {
        use {State::*, TokenKind::*};

        if let Error = self.state {
            return Ok(None);
        }

        let kind = loop {
            // Se espera un siguiente carácter, fallando si hay error de E/S
            let next = match self.source.peek() {
                None => None,
                Some(Ok((c, position))) => Some((*c, *position)),
                Some(Err(_)) => match self.source.next() {
                    Some(Err(error)) => break Err(error.into()),
                    _ => unreachable!(),
                },
            };

            let next_char = next.map(|(c, _)| c);

            // El inicio del token se mueve junto al cursor siempre
            // que no se haya encontrado una frontera de token
            if let (Start, Some((_, position))) = (&self.state, next) {
                self.start = position;
                self.lexeme.clear();
            }

            // Switch table principal, determina cambios de estado
            // y de salida del lexer a partir de combinaciones del
            // estado actual y el siguiente carácter
            match (&self.state, next_char) {
                (Error, _) => unreachable!(),

                // Fin de la entrada y espacios en blanco, incluyendo
                // los finales de línea
                (Start, None) => return Ok(None),
                (Start, Some(c)) if c.is_whitespace() => (),

                (Start, Some('/')) => self.state = Slash,
                (Start, Some('"')) => self.state = Text,
                (Start, Some(c)) if is_word_start(c) => self.state = Word,
                (Start, Some(c)) if c.is_ascii_digit() => self.state = Integer,
                (Start, Some(c @ ('=' | '!' | '<' | '>' | '&' | '|'))) => {
                    self.state = Operator(c)
                }

                (Start, Some(c)) => match single(c) {
                    Some(kind) => self.state = Complete(kind),
                    None => debug!(position = %self.start, character = ?c, "skipping unknown character"),
                },

                // Emisión retardada de tokens cualesquiera
                (Complete(kind), _) => break Ok(*kind),

                // `//` y `/*` inician comentarios, cualquier otra cosa es `/`
                (Slash, Some('/')) => self.state = LineComment,
                (Slash, Some('*')) => self.state = BlockComment,
                (Slash, _) => break Ok(Div),

                (LineComment, Some('\n')) => self.state = Start,
                (LineComment, Some(_)) => (),
                (LineComment, None) => return Ok(None),

                // `*/` debe aparecer dentro de una misma línea
                (BlockComment, Some('*')) => self.state = BlockCommentStar,
                (BlockComment, Some(_)) => (),
                (BlockCommentStar, Some('/')) => self.state = Start,
                (BlockCommentStar, Some('*')) => (),
                (BlockCommentStar, Some(_)) => self.state = BlockComment,
                (BlockComment | BlockCommentStar, None) => return Ok(None),

                (Integer, Some(c)) if c.is_ascii_digit() => (),
                (Integer, _) => break Ok(IntConst),

                (Word, Some(c)) if is_word_char(c) => (),
                (Word, _) => match TokenKind::from_str(&self.lexeme) {
                    Ok(keyword) => break Ok(keyword),
                    Err(()) => break Ok(Ident),
                },

                // Una cadena sin cerrar termina con la línea
                (Text, Some('"')) => self.state = Complete(StrConst),
                (Text, Some('\n') | None) => break Ok(StrConst),
                (Text, Some(_)) => (),

                (Operator(first), Some(second)) if is_pair(*first, second) => {
                    let pair = [*first, second].iter().collect::<String>();
                    match TokenKind::from_str(&pair) {
                        Ok(kind) => self.state = Complete(kind),
                        Err(()) => unreachable!(),
                    }
                }

                (Operator(first), _) => match single(*first) {
                    Some(kind) => break Ok(kind),
                    None => unreachable!(),
                },
            }

            // Si no hubo `break`, aquí se consume el carácter que
            // se observó con lookahead anteriormente
            if let Some(Ok((c, _))) = self.source.next() {
                if self.in_token() {
                    self.lexeme.push(c);
                }
            }
        };

        kind.map(|kind| Some(Token::new(kind, std::mem::take(&mut self.lexeme), self.start)))
    }

    /// Determina si el carácter recién consumido forma parte del lexema.
    fn in_token(&self) -> bool {
        use State::*;

        matches!(
            self.state,
            Complete(_) | Slash | Integer | Word | Text | Operator(_)
        )
    }
}

impl<S: InputStream> Iterator for Lexer<S> {
    type Item = Result<Token, Located<LexerError>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.lex() {
            Ok(None) => None,
            Ok(Some(token)) => {
                self.state = State::Start;

                trace!(line = token.line(), token = %token, "token");
                Some(Ok(token))
            }

            Err(error) => {
                self.state = State::Error;
                Some(Err(Located::at(error, self.start)))
            }
        }
    }
}

/// Analiza léxicamente un lector completo.
pub fn tokenize<R: BufRead>(reader: R) -> Result<Vec<Token>, Located<LexerError>> {
    Lexer::new(source::consume(reader)).tokenize()
}

/// Escribe el listado de tokens de `lexer.txt`.
///
/// Si `diagnostics` está presente, el listado se comporta como un lexer
/// independiente: cada `&` o `|` aislado se reporta como error y se omite
/// del listado. De lo contrario todo token se lista tal cual y los errores
/// quedan a cargo del parser.
pub fn write_listing<W: Write>(
    tokens: &[Token],
    diagnostics: Option<&mut Diagnostics>,
    output: &mut W,
) -> io::Result<()> {
    match diagnostics {
        None => {
            for token in tokens {
                emit!(output, "{}", token)?;
            }
        }

        Some(diagnostics) => {
            for token in tokens {
                if token.is_malformed() {
                    diagnostics.report(token.line(), ErrorCode::IllegalSymbol);
                } else {
                    emit!(output, "{}", token)?;
                }
            }
        }
    }

    Ok(())
}

/// Determina si un carácter puede iniciar un término.
fn is_word_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

/// Determina si un carácter puede pertenecer a un término.
fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Determina si dos caracteres forman un operador doble.
fn is_pair(first: char, second: char) -> bool {
    matches!(
        (first, second),
        ('=' | '!' | '<' | '>', '=') | ('&', '&') | ('|', '|')
    )
}

/// Operadores y puntuación de un solo carácter.
///
/// `&` y `|` no pertenecen a la tabla de palabras clave, pero se emiten
/// como sus contrapartes dobles para que el parser reporte el error.
fn single(c: char) -> Option<TokenKind> {
    match c {
        '&' => Some(TokenKind::And),
        '|' => Some(TokenKind::Or),
        _ => {
            let mut buffer = [0; 4];
            TokenKind::from_str(c.encode_utf8(&mut buffer)).ok()
        }
    }
}
