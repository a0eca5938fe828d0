//! Rastreo de ubicaciones originales en código fuente.
//!
//! El código fuente se consume línea por línea. Cada carácter emitido
//! lleva consigo la posición línea-columna en la que se encontró, lo
//! cual permite etiquetar tokens con su número de línea y ubicar errores
//! fatales en el punto exacto donde ocurrieron.

use std::{
    error::Error,
    fmt::{self, Display, Formatter},
    io::{self, BufRead},
    iter,
};

/// Ancho de los divisores de tabulador.
const TAB_STOP: u32 = 4;

/// Un flujo de entrada, carácter por carácter.
///
/// Cada línea del flujo termina con un `'\n'` sintético, incluso la
/// última, de manera que el fin de línea siempre es observable.
pub trait InputStream: Iterator<Item = Result<(char, Position), io::Error>> {}

impl<I> InputStream for I where I: Iterator<Item = Result<(char, Position), io::Error>> {}

/// Un objeto cualquiera con una posición original asociada.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located<T> {
    position: Position,
    value: T,
}

impl<T> Located<T> {
    /// Obtiene el valor.
    pub fn val(&self) -> &T {
        &self.value
    }

    /// Obtiene la posición.
    pub fn position(&self) -> Position {
        self.position
    }

    /// Descompone y toma ownership de las dos partes.
    pub fn split(self) -> (Position, T) {
        (self.position, self.value)
    }

    /// Construye a partir de un valor y una posición.
    pub fn at(value: T, position: Position) -> Self {
        Located { value, position }
    }
}

impl<T: Display> Display for Located<T> {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{} (at {})", self.value, self.position)
    }
}

impl<T: Error + 'static> Error for Located<T> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.value.source()
    }
}

/// Una posición línea-columna en un archivo.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct Position {
    line: u32,
    column: u32,
}

impl Position {
    /// Construye una posición arbitraria. Ambos componentes inician en 1.
    pub fn new(line: u32, column: u32) -> Self {
        Position { line, column }
    }

    /// Obtiene el número de línea.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Obtiene el número de columna.
    pub fn column(&self) -> u32 {
        self.column
    }

    /// Incrementa el número de columna.
    pub fn advance(self) -> Position {
        Position {
            line: self.line,
            column: self.column + 1,
        }
    }

    /// Incrementa el número de línea y retorna a la columna 1.
    pub fn newline(self) -> Position {
        Position {
            line: self.line + 1,
            column: 1,
        }
    }

    /// Ajusta la posición a la siguiente columna de tabulador.
    pub fn tab(self) -> Position {
        let column = 1 + ((self.column - 1) / TAB_STOP + 1) * TAB_STOP;
        Position {
            line: self.line,
            column,
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Position { line: 1, column: 1 }
    }
}

impl Display for Position {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.line, self.column)
    }
}

/// Transforma un flujo de entrada estándar en uno que itera por carácter.
///
/// Esta función existe debido a que `std` no ofrece algún mecanismo
/// no trivial para realizar la misma operación. Las líneas se leen de
/// forma perezosa, por lo que un error de E/S aparece en el flujo justo
/// en el punto donde habría comenzado la línea que no se pudo leer.
pub fn consume<R: BufRead>(reader: R) -> impl InputStream {
    reader
        .lines()
        .enumerate()
        .flat_map(|(line_index, line)| {
            Fallible::new(line.map(move |line| {
                let mut here = Position {
                    line: line_index as u32 + 1,
                    column: 1,
                };

                line.chars()
                    .collect::<Vec<_>>()
                    .into_iter()
                    .chain(iter::once('\n'))
                    .map(move |c| {
                        let position = here;
                        here = match c {
                            '\n' => here.newline(),
                            '\t' => here.tab(),
                            _ => here.advance(),
                        };

                        (c, position)
                    })
            }))
        })
        .fuse()
}

/// Un iterador que emite un solo error o encapsula las salidas de
/// otro iterador en `Ok`, pero nunca ambas.
struct Fallible<I, E>(Result<I, iter::Once<E>>);

impl<I, E> Fallible<I, E> {
    /// Crea un iterador a partir de un `Result`.
    pub fn new(result: Result<I, E>) -> Self {
        Fallible(result.map_err(iter::once))
    }
}

impl<I: Iterator, E> Iterator for Fallible<I, E> {
    type Item = Result<I::Item, E>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.0 {
            Ok(ok) => ok.next().map(Ok),
            Err(error) => error.next().map(Err),
        }
    }
}
