//! Análisis semántico.
//!
//! Interpreta el árbol crudo de [`crate::parse`] y construye el modelo
//! tipado: interfaces ([`ObjType`]), métodos ([`Method`]) y argumentos
//! ([`Arg`]). La clasificación de cada argumento (dirección, ancho,
//! paso por referencia, objeto de capacidad o datos variables) queda
//! fijada aquí como variantes explícitas; ninguna fase posterior vuelve
//! a inspeccionar palabras del IDL.
//!
//! Un campo de argumento tiene la forma `[dir] [obj] [tipo] [*]nombre`.
//! Las palabras se consumen de izquierda a derecha y la última siempre
//! es el nombre.

use thiserror::Error;

use std::{
    collections::HashSet,
    fmt::{self, Display},
    rc::Rc,
};

use crate::{
    lex::Word,
    parse::{self, Field},
    source::Located,
};

/// Tipo que indica ausencia de valor de retorno.
const VOID: &str = "void";

/// Tipo reservado para cadenas terminadas en nulo.
const STR: &str = "str";

/// Nombres de locales que el despachador generado ya utiliza.
const RESERVED: &[&str] = &["self", "msg", "ops", "dropped", "rc", "answer"];

/// Sufijos de las locales auxiliares de un argumento de datos variables.
pub const BULK_HELPERS: &[&str] = &["slice", "len", "cap", "obj"];

/// Un identificador de C válido.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(Rc<str>);

impl Identifier {
    /// Valida una palabra como identificador.
    pub fn new(word: &str) -> Option<Self> {
        let mut chars = word.chars();
        let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

        valid.then(|| Identifier(Rc::from(word)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for Identifier {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(&self.0)
    }
}

/// Sentido en el que viaja un argumento.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
    InOut,
}

impl Direction {
    pub fn is_input(self) -> bool {
        matches!(self, Direction::In | Direction::InOut)
    }

    pub fn is_output(self) -> bool {
        matches!(self, Direction::Out | Direction::InOut)
    }
}

/// Cantidad de slots que ocupa un escalar transportado en línea.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Width {
    Narrow,
    Wide,
}

/// Forma en la que el handler recibe un escalar de entrada.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Passing {
    Value,
    Reference,
}

/// Contenido de un argumento de longitud variable.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    /// Bytes sin tipo, delimitados por longitud.
    Bytes,

    /// Cadena terminada en nulo (`str`).
    CString,
}

/// Clasificación de un argumento.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Class {
    /// Valor o registro de tamaño fijo.
    Scalar {
        ty: Identifier,
        width: Width,
        passing: Passing,
    },

    /// Referencia de capacidad a otra interfaz.
    Object { ty: Identifier },

    /// Datos de longitud variable.
    Bulk(Payload),
}

#[derive(Clone, Debug)]
pub struct Arg {
    pub name: Located<Identifier>,
    pub direction: Direction,
    pub class: Class,
}

#[derive(Clone, Debug)]
pub struct Method {
    pub name: Located<Identifier>,
    pub retval: Option<Identifier>,
    pub args: Vec<Arg>,
}

#[derive(Clone, Debug)]
pub struct ObjType {
    pub name: Located<Identifier>,
    pub methods: Vec<Method>,
}

/// Resultado del análisis semántico.
#[derive(Debug)]
pub struct Model {
    pub interfaces: Vec<ObjType>,
    pub notices: Vec<Located<Notice>>,
}

pub type Semantic<T> = Result<T, Located<SemanticError>>;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SemanticError {
    #[error("`{0}` is not a valid identifier")]
    BadIdentifier(Word),

    #[error("`{0}` is reserved for generated code")]
    Reserved(Identifier),

    #[error("Interface `{0}` is defined more than once")]
    DuplicateInterface(Identifier),

    #[error("Method `{0}` is defined more than once")]
    DuplicateMethod(Identifier),

    #[error("Statement is missing a method name")]
    MissingMethodName,

    #[error("Return type of method `{0}` is empty")]
    EmptyReturnType(Identifier),

    #[error("Argument {position} of method `{method}` is empty")]
    EmptyArgument { method: Identifier, position: usize },

    #[error("Unexpected `{0}`")]
    UnexpectedWord(Word),

    #[error("Argument `{0}` is declared more than once")]
    DuplicateArgument(Identifier),

    #[error("Argument name clashes with helper variable `{0}` of another argument")]
    HelperClash(String),

    #[error("Capability argument `{0}` must name an interface type")]
    MissingObjectType(Identifier),

    #[error("Wide modifier on `{0}` only applies to scalar arguments")]
    WideNonScalar(Identifier),
}

/// Hallazgos no fatales.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Notice {
    #[error("Ignoring block `{name}` of unknown kind `{kind}`")]
    IgnoredBlock { kind: Word, name: Word },

    #[error("Interface `{0}` declares no methods, no code will be generated for it")]
    EmptyInterface(Identifier),
}

impl parse::Idl {
    /// Construye el modelo tipado.
    ///
    /// Se reportan todos los errores encontrados en todas las interfaces,
    /// pero basta con uno para que no se produzca un modelo.
    pub fn resolve(&self) -> Result<Model, Vec<Located<SemanticError>>> {
        let mut errors = Vec::new();
        let mut notices = Vec::new();
        let mut interfaces: Vec<ObjType> = Vec::new();

        for block in self.blocks() {
            if block.kind().val().as_ref() != "obj" {
                let notice = Notice::IgnoredBlock {
                    kind: block.kind().val().clone(),
                    name: block.name().val().clone(),
                };

                notices.push(Located::at(notice, block.kind().location().clone()));
                continue;
            }

            let name = match identifier(block.name()) {
                Ok(name) => name,
                Err(error) => {
                    errors.push(error);
                    continue;
                }
            };

            let clashes = |other: &ObjType| other.name.val() == name.val();
            if interfaces.iter().any(clashes) {
                let error = SemanticError::DuplicateInterface(name.val().clone());
                errors.push(Located::at(error, name.location().clone()));
                continue;
            }

            let mut methods: Vec<Method> = Vec::new();
            for statement in block.statements() {
                match method(statement.fields()) {
                    Ok(method) if methods.iter().any(|m| m.name.val() == method.name.val()) => {
                        let (location, name) = method.name.split();
                        errors.push(Located::at(SemanticError::DuplicateMethod(name), location));
                    }

                    Ok(method) => methods.push(method),
                    Err(error) => errors.push(error),
                }
            }

            if methods.is_empty() {
                let notice = Notice::EmptyInterface(name.val().clone());
                notices.push(Located::at(notice, name.location().clone()));
            }

            interfaces.push(ObjType { name, methods });
        }

        if errors.is_empty() {
            Ok(Model {
                interfaces,
                notices,
            })
        } else {
            Err(errors)
        }
    }
}

/// Interpreta una sentencia: nombre, tipo de retorno y argumentos.
fn method(fields: &[Field]) -> Semantic<Method> {
    // El parser nunca produce sentencias sin campos
    let (first, rest) = match fields.split_first() {
        Some(split) => split,
        None => unreachable!(),
    };

    let name = match first.words() {
        [] => {
            let error = SemanticError::MissingMethodName;
            return Err(Located::at(error, first.location().clone()));
        }

        [name, tail @ ..] => {
            no_trailing(tail)?;
            let name = identifier(name)?;
            reserved_prefix(&name)?;

            name
        }
    };

    let retval = match rest.first() {
        None => None,
        Some(field) => match field.words() {
            [] => {
                let error = SemanticError::EmptyReturnType(name.val().clone());
                return Err(Located::at(error, field.location().clone()));
            }

            [word, tail @ ..] => {
                no_trailing(tail)?;
                match word.val().as_ref() {
                    VOID => None,
                    _ => Some(identifier(word)?.into_inner()),
                }
            }
        },
    };

    let mut claims = Claims::default();
    let mut args = Vec::new();

    for (index, field) in rest.iter().skip(1).enumerate() {
        let arg = arg(&name, index + 1, field)?;
        claims.claim(&arg)?;

        args.push(arg);
    }

    Ok(Method { name, retval, args })
}

/// Interpreta un campo `[dir] [obj] [tipo] [*]nombre`.
fn arg(method: &Located<Identifier>, position: usize, field: &Field) -> Semantic<Arg> {
    use {Direction::*, Width::*};

    let (last, modifiers) = match field.words().split_last() {
        Some(split) => split,
        None => {
            let error = SemanticError::EmptyArgument {
                method: method.val().clone(),
                position,
            };

            return Err(Located::at(error, field.location().clone()));
        }
    };

    let (passing, bare) = match last.val().as_ref().strip_prefix('*') {
        Some(bare) => (Passing::Reference, bare),
        None => (Passing::Value, last.val().as_ref()),
    };

    let name = identifier(&Located::at(Word::new(bare), last.location().clone()))?;
    reserved_prefix(&name)?;
    if RESERVED.contains(&name.val().as_ref()) {
        return Err(name.map(SemanticError::Reserved));
    }

    let mut modifiers = modifiers.iter().peekable();

    let (direction, width) = match modifiers.peek().map(|word| word.val().as_ref()) {
        Some("in") => (In, Narrow),
        Some("out") => (Out, Narrow),
        Some("inout") => (InOut, Narrow),
        Some("in64") => (In, Wide),
        Some("out64") => (Out, Wide),
        Some("inout64") => (InOut, Wide),
        _ => (In, Narrow),
    };

    modifiers.next_if(|word| is_modifier(word.val().as_ref()));

    let object = modifiers
        .next_if(|word| word.val().as_ref() == "obj")
        .is_some();
    let ty = modifiers.next();

    if let Some(unexpected) = modifiers.next() {
        return Err(unexpected.clone().map(SemanticError::UnexpectedWord));
    }

    let class = match (object, ty) {
        (true, Some(ty)) if ty.val().as_ref() != STR => Class::Object {
            ty: identifier(ty)?.into_inner(),
        },

        (true, _) => return Err(name.map(SemanticError::MissingObjectType)),

        (false, None) => Class::Bulk(Payload::Bytes),
        (false, Some(ty)) if ty.val().as_ref() == STR => Class::Bulk(Payload::CString),

        (false, Some(ty)) => Class::Scalar {
            ty: identifier(ty)?.into_inner(),
            width,
            passing,
        },
    };

    if width == Wide && !matches!(class, Class::Scalar { .. }) {
        return Err(name.map(SemanticError::WideNonScalar));
    }

    Ok(Arg {
        name,
        direction,
        class,
    })
}

/// Nombres de C ya ocupados dentro de un método.
#[derive(Default)]
struct Claims {
    names: HashSet<String>,
    helpers: HashSet<String>,
}

impl Claims {
    /// Registra los nombres que introduce un argumento, fallando si
    /// alguno ya fue reclamado por otro argumento del mismo método.
    fn claim(&mut self, arg: &Arg) -> Semantic<()> {
        let name = arg.name.val();
        let fail = |error| Err(Located::at(error, arg.name.location().clone()));

        if self.names.contains(name.as_str()) {
            return fail(SemanticError::DuplicateArgument(name.clone()));
        } else if self.helpers.contains(name.as_str()) {
            return fail(SemanticError::HelperClash(name.to_string()));
        }

        self.names.insert(name.to_string());

        if let Class::Bulk(_) = arg.class {
            for suffix in BULK_HELPERS {
                let helper = format!("{}_{}", name, suffix);
                if self.names.contains(&helper) || !self.helpers.insert(helper.clone()) {
                    return fail(SemanticError::HelperClash(helper));
                }
            }
        }

        Ok(())
    }
}

fn is_modifier(word: &str) -> bool {
    matches!(word, "in" | "out" | "inout" | "in64" | "out64" | "inout64")
}

fn identifier(word: &Located<Word>) -> Semantic<Located<Identifier>> {
    match Identifier::new(word.val().as_ref()) {
        Some(id) => Ok(Located::at(id, word.location().clone())),
        None => Err(word.clone().map(SemanticError::BadIdentifier)),
    }
}

/// Los identificadores con prefijo `_` pertenecen al código generado.
fn reserved_prefix(id: &Located<Identifier>) -> Semantic<()> {
    if id.val().as_ref().starts_with('_') {
        Err(id.clone().map(SemanticError::Reserved))
    } else {
        Ok(())
    }
}

fn no_trailing(words: &[Located<Word>]) -> Semantic<()> {
    match words.first() {
        Some(word) => Err(word.clone().map(SemanticError::UnexpectedWord)),
        None => Ok(()),
    }
}
