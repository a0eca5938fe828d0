//! Front end para un lenguaje de enseñanza estilo SysY.
//!
//! # Fases
//! Cada programa deriva de un único archivo de código fuente. Este
//! archivo se lee línea por línea por medio de [`source`] y se somete a
//! análisis léxico en [`lex`], de lo cual se obtiene un vector de tokens.
//! El vector de tokens se deriva en un árbol sintáctico por medio de
//! análisis sintáctico descendente en [`parse`], el cual escribe una
//! traza de la derivación conforme avanza.
//!
//! # Errores
//! Ciertos errores del programa fuente no detienen el análisis. Estos se
//! acumulan en [`error::Diagnostics`] y se escriben ordenados por línea
//! al final. Los errores de E/S y las discrepancias sintácticas que el
//! parser no sabe recuperar se propagan como `Err` y sí son fatales.

#[macro_use]
mod macros;

pub mod error;
pub mod lex;
pub mod parse;
pub mod source;
