//! Análisis sintáctico.
//!
//! La gramática del IDL es plana y no admite anidamiento:
//!
//! ```text
//! idl       := block*
//! block     := WORD WORD '{' statement (';' statement)* '}'
//! statement := field (',' field)*
//! field     := WORD*
//! ```
//!
//! El resultado es un árbol crudo: bloques, sentencias y campos
//! formados por palabras, sin interpretar todavía su significado.
//! Las sentencias vacías (por ejemplo `;;`) se descartan, pero los
//! campos vacíos se preservan para que [`crate::semantic`] los
//! reporte con contexto.

use std::iter::Peekable;
use thiserror::Error;

use crate::{
    lex::{Token, Word},
    source::{Located, Location},
};

#[derive(Debug)]
pub struct Idl(Vec<Block>);

impl Idl {
    pub fn blocks(&self) -> &[Block] {
        &self.0
    }
}

/// `kind name { ... }`
#[derive(Debug)]
pub struct Block {
    kind: Located<Word>,
    name: Located<Word>,
    statements: Vec<Statement>,
}

impl Block {
    pub fn kind(&self) -> &Located<Word> {
        &self.kind
    }

    pub fn name(&self) -> &Located<Word> {
        &self.name
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }
}

/// Una sentencia separada por `;`.
#[derive(Debug)]
pub struct Statement(Vec<Field>);

impl Statement {
    pub fn fields(&self) -> &[Field] {
        &self.0
    }
}

/// Un campo separado por `,`.
///
/// La ubicación de un campo vacío es la del delimitador que lo cierra.
#[derive(Debug)]
pub struct Field {
    words: Vec<Located<Word>>,
    location: Location,
}

impl Field {
    pub fn words(&self) -> &[Located<Word>] {
        &self.words
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ParserError {
    #[error("Expected a block kind such as `obj`, found {0} instead")]
    ExpectedBlock(Token),

    #[error("Block header is missing a name")]
    MissingBlockName,

    #[error("Expected a block name, found {0} instead")]
    ExpectedBlockName(Token),

    #[error("Expected token {0}, found {1} instead")]
    UnexpectedToken(Token, Token),

    #[error("Expected token {0}, none was found instead")]
    MissingToken(Token),

    #[error("Nested blocks are not supported")]
    NestedBlock,

    #[error("Unbalanced braces: block `{0}` is never closed")]
    UnclosedBlock(Word),
}

type Parse<T> = Result<T, Located<ParserError>>;

/// Construye el árbol crudo a partir de un flujo de tokens.
///
/// `start` se utiliza para ubicar errores cuando aún no se ha
/// observado ningún token.
pub fn parse<'a, I>(start: Location, tokens: I) -> Parse<Idl>
where
    I: IntoIterator<Item = &'a Located<Token>>,
{
    let mut parser = Parser {
        tokens: tokens.into_iter().peekable(),
        last_known: start,
    };

    parser.program()
}

struct Parser<I: Iterator> {
    tokens: Peekable<I>,
    last_known: Location,
}

impl<'a, I: Iterator<Item = &'a Located<Token>>> Parser<I> {
    fn program(&mut self) -> Parse<Idl> {
        let mut blocks = Vec::new();
        while self.tokens.peek().is_some() {
            blocks.push(self.block()?);
        }

        Ok(Idl(blocks))
    }

    fn block(&mut self) -> Parse<Block> {
        let kind = match self.next_token() {
            Some((location, Token::Word(word))) => Located::at(word, location),
            Some((_, found)) => return self.fail(ParserError::ExpectedBlock(found)),
            None => unreachable!(),
        };

        let name = match self.next_token() {
            Some((location, Token::Word(word))) => Located::at(word, location),
            Some((_, Token::OpenCurly)) | None => return self.fail(ParserError::MissingBlockName),
            Some((_, found)) => return self.fail(ParserError::ExpectedBlockName(found)),
        };

        self.expect(Token::OpenCurly)?;
        let open = self.last_known.clone();

        let mut statements = Vec::new();
        loop {
            if let Some(statement) = self.statement() {
                statements.push(statement);
            }

            match self.next_token() {
                Some((_, Token::Semicolon)) => continue,
                Some((_, Token::CloseCurly)) => break,
                Some((_, Token::OpenCurly)) => return self.fail(ParserError::NestedBlock),
                Some(_) => unreachable!(),
                None => {
                    let error = ParserError::UnclosedBlock(name.val().clone());
                    return Err(Located::at(error, open));
                }
            }
        }

        Ok(Block {
            kind,
            name,
            statements,
        })
    }

    /// Consume campos hasta encontrar un delimitador de sentencia,
    /// el cual no se consume.
    fn statement(&mut self) -> Option<Statement> {
        let mut fields = Vec::new();
        let mut words = Vec::new();

        loop {
            match self.tokens.peek().map(|token| token.val()) {
                Some(Token::Word(_)) => {
                    if let Some((location, Token::Word(word))) = self.next_token() {
                        words.push(Located::at(word, location));
                    }
                }

                Some(Token::Comma) => {
                    let field = self.field(std::mem::take(&mut words));
                    fields.push(field);
                    self.next_token();
                }

                _ => break,
            }
        }

        let last = self.field(words);
        if fields.is_empty() && last.is_empty() {
            return None;
        }

        fields.push(last);
        Some(Statement(fields))
    }

    fn field(&mut self, words: Vec<Located<Word>>) -> Field {
        let location = match (words.first(), words.last()) {
            (Some(first), Some(last)) => {
                Location::span(first.location().clone(), last.location())
            }

            _ => match self.tokens.peek() {
                Some(delimiter) => delimiter.location().clone(),
                None => self.last_known.clone(),
            },
        };

        Field { words, location }
    }

    fn expect(&mut self, token: Token) -> Parse<()> {
        match self.next_token() {
            Some((_, found)) if found == token => Ok(()),
            Some((_, found)) => self.fail(ParserError::UnexpectedToken(token, found)),
            None => self.fail(ParserError::MissingToken(token)),
        }
    }

    fn next_token(&mut self) -> Option<(Location, Token)> {
        let token = self.tokens.next()?;
        self.last_known = token.location().clone();

        Some(token.clone().split())
    }

    fn fail<T>(&self, error: ParserError) -> Parse<T> {
        Err(Located::at(error, self.last_known.clone()))
    }
}
