//! Recolección de diagnósticos.
//!
//! Los errores del programa fuente que el front end sabe reconocer no
//! detienen la compilación. En vez de propagarse como `Err`, se acumulan
//! en un [`Diagnostics`] compartido secuencialmente por el lexer y el
//! parser, y al final se ordenan por línea y se escriben a `error.txt`.

use std::{
    fmt::{self, Display},
    io::{self, Write},
};

/// Clase de error reportable en el código fuente.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// `&` o `|` aislados donde se esperaba `&&` o `||`.
    IllegalSymbol,

    /// Falta `;`.
    MissingSemicolon,

    /// Falta `)`.
    MissingRightParen,

    /// Falta `]`.
    MissingRightBracket,
}

impl ErrorCode {
    /// Letra con la que se identifica el error en la salida.
    pub fn letter(self) -> char {
        use ErrorCode::*;

        match self {
            IllegalSymbol => 'a',
            MissingSemicolon => 'i',
            MissingRightParen => 'j',
            MissingRightBracket => 'k',
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}", self.letter())
    }
}

/// Un error reportado en una línea del código fuente.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    line: u32,
    code: ErrorCode,
}

impl Diagnostic {
    pub fn new(line: u32, code: ErrorCode) -> Self {
        Diagnostic { line, code }
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }
}

impl Display for Diagnostic {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{} {}", self.line, self.code)
    }
}

/// Colector pasivo de diagnósticos, en orden de inserción.
#[derive(Debug, Default)]
pub struct Diagnostics {
    errors: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Agrega un diagnóstico al final.
    pub fn report(&mut self, line: u32, code: ErrorCode) {
        self.errors.push(Diagnostic::new(line, code));
    }

    /// Determina si se ha reportado al menos un diagnóstico.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.errors.iter()
    }

    /// Ordena por número de línea.
    ///
    /// El ordenamiento es estable: diagnósticos de una misma línea
    /// conservan su orden de inserción.
    pub fn sort_by_line(&mut self) {
        self.errors.sort_by_key(Diagnostic::line);
    }

    /// Escribe un diagnóstico por línea, de la forma `"<línea> <código>"`.
    pub fn write<W: Write>(&self, output: &mut W) -> io::Result<()> {
        for error in &self.errors {
            emit!(output, "{}", error)?;
        }

        Ok(())
    }
}

impl Display for Diagnostics {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        for error in &self.errors {
            writeln!(fmt, "{}", error)?;
        }

        Ok(())
    }
}
