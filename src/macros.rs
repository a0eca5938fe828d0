/// Escribe una línea completa en un archivo de salida.
///
/// Tanto la traza sintáctica como el listado de tokens y el archivo de
/// errores se componen de una entrada por línea.
macro_rules! emit {
    ($output:expr, $($format:tt)*) => {
        writeln!($output, $($format)*)
    };
}
