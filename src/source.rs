//! Rastreo de ubicaciones originales en código fuente.
//!
//! Los distintos objetos internos que el compilador construye
//! deben llevar cuenta de posiciones o rangos de ubicaciones en
//! el archivo IDL original, lo cual permite determinar un punto
//! exacto o aproximado en donde ocurre un error.

use std::{
    fmt::{self, Debug, Display, Formatter},
    ops::Range,
    rc::Rc,
};

/// Ancho de los divisores de tabulador.
const TAB_STOP: u32 = 4;

/// Un objeto cualquiera con una posición original asociada.
#[derive(Debug, Clone)]
pub struct Located<T> {
    location: Location,
    value: T,
}

impl<T> Located<T> {
    /// Obtiene el valor.
    pub fn val(&self) -> &T {
        &self.value
    }

    /// Obtiene la ubicación.
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Descarta la ubicación y toma ownership del valor.
    pub fn into_inner(self) -> T {
        self.value
    }

    /// Descompone y toma ownership de las dos partes.
    pub fn split(self) -> (Location, T) {
        (self.location, self.value)
    }

    /// Construye a partir de un valor y una ubicación.
    pub fn at(value: T, location: Location) -> Self {
        Located { value, location }
    }

    /// Transforma el valor con la misma ubicación.
    pub fn map<U, F>(self, map: F) -> Located<U>
    where
        F: FnOnce(T) -> U,
    {
        Located {
            value: map(self.value),
            location: self.location,
        }
    }
}

impl<T> AsRef<T> for Located<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}

/// Una ubicación está conformada por un origen y un rango de posiciones.
#[derive(Clone)]
pub struct Location {
    from: Rc<Source>,
    position: Range<Position>,
}

impl Location {
    /// Unifica un rango de ubicaciones. Se asume el mismo origen.
    pub fn span(from: Location, to: &Location) -> Self {
        Location {
            from: from.from,
            position: from.position.start..to.position.end,
        }
    }

    /// Obtiene la posición de inicio.
    pub fn start(&self) -> Position {
        self.position.start
    }

    /// Obtiene la posición de fin.
    pub fn end(&self) -> Position {
        self.position.end
    }

    /// Obtiene el origen de esta ubicación.
    pub fn source(&self) -> &Source {
        &self.from
    }
}

impl Display for Location {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:", self.from.name)?;

        let Range { start, end } = self.position;
        if end.line == start.line && end.column <= start.column + 1 {
            // Solo se señala una columna en específico
            write!(formatter, "{}", start)
        } else {
            write!(formatter, "[{}-{}]", start, end.back())
        }
    }
}

impl Debug for Location {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        <Self as Display>::fmt(self, formatter)
    }
}

/// Una posición línea-columna en un archivo, junto a su desplazamiento
/// en bytes desde el inicio del mismo.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Position {
    line: u32,
    column: u32,
    offset: usize,
}

impl Position {
    /// Obtiene el número de línea.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Obtiene el número de columna.
    pub fn column(&self) -> u32 {
        self.column
    }

    /// Obtiene el desplazamiento en bytes.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Avanza sobre un carácter sin salto de línea.
    fn advance(self, c: char) -> Position {
        Position {
            line: self.line,
            column: self.column + 1,
            offset: self.offset + c.len_utf8(),
        }
    }

    /// Decrementa el número de columna.
    fn back(self) -> Position {
        Position {
            column: self.column.saturating_sub(1).max(1),
            ..self
        }
    }

    /// Incrementa el número de línea y retorna a la columna 1.
    fn newline(self) -> Position {
        Position {
            line: self.line + 1,
            column: 1,
            offset: self.offset + 1,
        }
    }

    /// Ajusta la posición a la siguiente columna de tabulador.
    fn tab(self) -> Position {
        let column = 1 + ((self.column - 1) / TAB_STOP + 1) * TAB_STOP;
        Position {
            line: self.line,
            column,
            offset: self.offset + 1,
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Position {
            line: 1,
            column: 1,
            offset: 0,
        }
    }
}

impl Display for Position {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.line, self.column)
    }
}

/// Nombre de origen y contenido por líneas.
pub struct Source {
    name: String,
    lines: Vec<String>,
}

impl Source {
    /// Nombre con el que se reporta este origen.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoca a `callback` con el contenido de una línea (base 1).
    ///
    /// Líneas inexistentes se observan como vacías.
    pub fn with_line<F, R>(&self, line: u32, callback: F) -> R
    where
        F: FnOnce(&str) -> R,
    {
        let index = (line as usize).saturating_sub(1);
        callback(self.lines.get(index).map(String::as_str).unwrap_or(""))
    }
}

/// Transforma un texto completo en un flujo que itera por carácter.
///
/// La ubicación que se encuentra en la tupla de retorno es la
/// posición que le corresponderá al primer caracter en la salida.
/// Cada carácter emitido incluye a la ubicación del siguiente.
pub fn consume<S>(text: &str, name: S) -> (Location, impl Iterator<Item = (char, Location)>)
where
    S: Into<String>,
{
    let source = Rc::new(Source {
        name: name.into(),
        lines: text.lines().map(String::from).collect(),
    });

    let first = Position::default();
    let start = Location {
        from: Rc::clone(&source),
        position: first..first.advance(' '),
    };

    let chars: Vec<char> = text.chars().collect();
    let mut here = first;

    let stream = chars.into_iter().map(move |c| {
        let next = match c {
            '\n' => here.newline(),
            '\t' => here.tab(),
            _ => here.advance(c),
        };

        here = next;
        let location = Location {
            from: Rc::clone(&source),
            position: next..next.advance(' '),
        };

        (c, location)
    });

    (start, stream)
}
