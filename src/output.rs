//! Escritura de los archivos generados.
//!
//! Un par de salida consiste en la implementación del servidor
//! (`.c`) y su encabezado (`.h`). Ambos se sobrescriben completamente
//! en cada ejecución; solo se abren una vez que la generación ya no
//! puede fallar por motivos semánticos.

use std::{
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    time::UNIX_EPOCH,
};

use bitflags::bitflags;
use thiserror::Error;

bitflags! {
    /// Opciones a aplicar durante la emisión.
    pub struct EmitOptions: u32 {
        /// Encabezar ambos archivos con un comentario que indica el
        /// archivo de origen y su marca de tiempo.
        const PROVENANCE = 0x01;

        /// Emitir cuerpos esqueleto para los stubs de cliente.
        const CLIENT_STUBS = 0x02;
    }
}

/// Un error al escribir las salidas.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("I/O error")]
    Io(#[from] io::Error),

    /// La ruta del encabezado no tiene nombre de archivo que incluir.
    #[error("Header path has no file name: {0}")]
    NoFileName(PathBuf),
}

/// Origen de un par de archivos generados.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Provenance {
    input: String,
    modified: Option<u64>,
}

impl Provenance {
    pub fn new<S: Into<String>>(input: S, modified: Option<u64>) -> Self {
        Provenance {
            input: input.into(),
            modified,
        }
    }

    /// Obtiene nombre y tiempo de modificación de un archivo de entrada.
    ///
    /// El tiempo se expresa en segundos desde la época Unix. Si el
    /// sistema de archivos no lo reporta, queda como desconocido.
    pub fn of<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        let modified = fs::metadata(path)?
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|elapsed| elapsed.as_secs());

        Ok(Provenance::new(path.display().to_string(), modified))
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn modified(&self) -> Option<u64> {
        self.modified
    }
}

/// Archivos de salida abiertos para escritura.
pub struct Outputs {
    source: BufWriter<File>,
    header: BufWriter<File>,
    header_name: String,
}

impl Outputs {
    /// Crea o trunca ambos archivos.
    pub fn create<S, H>(source: &S, header: &H) -> Result<Self, OutputError>
    where
        S: AsRef<Path>,
        H: AsRef<Path>,
    {
        let header = header.as_ref();
        let header_name = match header.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => return Err(OutputError::NoFileName(header.to_path_buf())),
        };

        Ok(Outputs {
            source: BufWriter::new(File::create(source)?),
            header: BufWriter::new(File::create(header)?),
            header_name,
        })
    }

    /// Nombre con el que la implementación incluye al encabezado.
    pub fn header_name(&self) -> &str {
        &self.header_name
    }

    /// Flujos de implementación y encabezado, en ese orden.
    pub fn streams(&mut self) -> (&mut BufWriter<File>, &mut BufWriter<File>) {
        (&mut self.source, &mut self.header)
    }

    /// Vacía los buffers pendientes.
    pub fn finish(mut self) -> Result<(), OutputError> {
        self.source.flush()?;
        self.header.flush()?;

        Ok(())
    }
}
