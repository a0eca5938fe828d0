//! Análisis sintáctico.
//!
//! # Derivación
//! El parser es descendente recursivo y predictivo: cada producción de la
//! gramática corresponde a un método, y la decisión entre alternativas se
//! toma mirando a lo sumo tres tokens hacia adelante sin retroceder jamás.
//!
//! # Traza
//! Conforme avanza, el parser escribe una traza de la derivación. Cada
//! token consumido produce una línea `"<CATEGORÍA> <lexema>"` y cada
//! no terminal produce una línea `"<Nombre>"` en su punto de reducción.
//! `BlockItem`, `Decl` y `BType` nunca se escriben. Las familias de
//! expresiones binarias se reducen por la izquierda: su no terminal se
//! escribe tras el primer operando y de nuevo tras cada par operador-operando.
//!
//! # Errores
//! Cuatro clases de error se recuperan en la misma pasada, sin consumir
//! tokens: falta de `;`, `)` o `]`, y `&` o `|` aislados. Se reportan en
//! la línea del último token consumido y el parser continúa como si el
//! terminal faltante hubiera estado presente. Cualquier otra discrepancia
//! es fatal y se retorna como [`ParserError`].

use std::{
    fmt::{self, Display},
    io::{self, Write},
};

use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    error::{Diagnostics, ErrorCode},
    lex::{Token, TokenKind},
    source::{Located, Position},
};

/// Símbolos no terminales de la gramática.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Symbol {
    CompUnit,
    Decl,
    ConstDecl,
    BType,
    ConstDef,
    ConstInitVal,
    VarDecl,
    VarDef,
    InitVal,
    FuncDef,
    FuncType,
    FuncFParams,
    FuncFParam,
    Block,
    BlockItem,
    Stmt,
    ForStmt,
    Exp,
    Cond,
    LVal,
    PrimaryExp,
    Number,
    UnaryExp,
    UnaryOp,
    FuncRParams,
    MulExp,
    AddExp,
    RelExp,
    EqExp,
    LAndExp,
    LOrExp,
    ConstExp,
    MainFuncDef,
}

impl Symbol {
    pub fn name(self) -> &'static str {
        use Symbol::*;

        match self {
            CompUnit     => "CompUnit",
            Decl         => "Decl",
            ConstDecl    => "ConstDecl",
            BType        => "BType",
            ConstDef     => "ConstDef",
            ConstInitVal => "ConstInitVal",
            VarDecl      => "VarDecl",
            VarDef       => "VarDef",
            InitVal      => "InitVal",
            FuncDef      => "FuncDef",
            FuncType     => "FuncType",
            FuncFParams  => "FuncFParams",
            FuncFParam   => "FuncFParam",
            Block        => "Block",
            BlockItem    => "BlockItem",
            Stmt         => "Stmt",
            ForStmt      => "ForStmt",
            Exp          => "Exp",
            Cond         => "Cond",
            LVal         => "LVal",
            PrimaryExp   => "PrimaryExp",
            Number       => "Number",
            UnaryExp     => "UnaryExp",
            UnaryOp      => "UnaryOp",
            FuncRParams  => "FuncRParams",
            MulExp       => "MulExp",
            AddExp       => "AddExp",
            RelExp       => "RelExp",
            EqExp        => "EqExp",
            LAndExp      => "LAndExp",
            LOrExp       => "LOrExp",
            ConstExp     => "ConstExp",
            MainFuncDef  => "MainFuncDef",
        }
    }

    /// Símbolos que se construyen pero no aparecen en la traza.
    pub fn is_suppressed(self) -> bool {
        matches!(self, Symbol::BlockItem | Symbol::Decl | Symbol::BType)
    }
}

impl Display for Symbol {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(self.name())
    }
}

/// Nodo del árbol sintáctico.
///
/// Cada nodo es dueño de sus hijos. Los terminales guardan una copia
/// del token, por lo que el árbol puede sobrevivir al vector de tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntaxNode {
    Terminal(Token),
    NonTerminal {
        symbol: Symbol,
        children: Vec<SyntaxNode>,
    },
}

impl SyntaxNode {
    /// Obtiene el símbolo de un no terminal.
    pub fn symbol(&self) -> Option<Symbol> {
        match self {
            SyntaxNode::Terminal(_) => None,
            SyntaxNode::NonTerminal { symbol, .. } => Some(*symbol),
        }
    }

    pub fn children(&self) -> &[SyntaxNode] {
        match self {
            SyntaxNode::Terminal(_) => &[],
            SyntaxNode::NonTerminal { children, .. } => children,
        }
    }

    /// Línea del primer token que cubre este nodo.
    pub fn line(&self) -> Option<u32> {
        match self {
            SyntaxNode::Terminal(token) => Some(token.line()),
            SyntaxNode::NonTerminal { children, .. } => children.iter().find_map(SyntaxNode::line),
        }
    }

    /// Cuenta los nodos de un símbolo dado en todo el subárbol.
    pub fn count(&self, symbol: Symbol) -> usize {
        let own = (self.symbol() == Some(symbol)) as usize;
        own + self
            .children()
            .iter()
            .map(|child| child.count(symbol))
            .sum::<usize>()
    }

    /// Tokens cubiertos por el subárbol, en orden.
    pub fn tokens(&self) -> Vec<&Token> {
        let mut tokens = Vec::new();
        self.collect_tokens(&mut tokens);
        tokens
    }

    fn collect_tokens<'a>(&'a self, tokens: &mut Vec<&'a Token>) {
        match self {
            SyntaxNode::Terminal(token) => tokens.push(token),
            SyntaxNode::NonTerminal { children, .. } => {
                for child in children {
                    child.collect_tokens(tokens);
                }
            }
        }
    }
}

/// Destino de la traza de derivación.
struct Trace<W> {
    output: W,
}

impl<W: Write> Trace<W> {
    fn new(output: W) -> Self {
        Trace { output }
    }

    /// Registra el consumo de un terminal.
    fn terminal(&mut self, token: &Token) -> io::Result<()> {
        emit!(self.output, "{}", token)
    }

    /// Registra la reducción de un no terminal, salvo que esté suprimido.
    fn reduce(&mut self, symbol: Symbol) -> io::Result<()> {
        if symbol.is_suppressed() {
            return Ok(());
        }

        emit!(self.output, "<{}>", symbol)
    }
}

/// Error fatal de análisis sintáctico.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ParserError {
    /// No se pudo escribir la traza.
    #[error("I/O error while writing the trace")]
    Output(#[from] io::Error),

    #[error("Expected token {0}, found `{1}` instead")]
    UnexpectedToken(TokenKind, Token),

    #[error("Expected token {0}, none was found instead")]
    MissingToken(TokenKind),
}

type Parse<T> = Result<T, Located<ParserError>>;

/// Analiza sintácticamente un vector completo de tokens.
///
/// La traza se escribe en `output` conforme se deriva el programa, por
/// lo que ante un error fatal `output` contiene la traza parcial. Los
/// errores recuperables se agregan a `diagnostics`. Se retorna la raíz
/// `CompUnit` del árbol.
pub fn parse<W: Write>(
    tokens: &[Token],
    diagnostics: &mut Diagnostics,
    output: W,
) -> Result<SyntaxNode, Located<ParserError>> {
    let mut parser = Parser {
        tokens,
        cursor: 0,
        diagnostics,
        trace: Trace::new(output),
    };

    let root = parser.comp_unit()?;
    if parser.cursor < tokens.len() {
        warn!(
            remaining = tokens.len() - parser.cursor,
            line = tokens[parser.cursor].line(),
            "trailing tokens after main function"
        );
    }

    Ok(root)
}

struct Parser<'a, W> {
    tokens: &'a [Token],
    cursor: usize,
    diagnostics: &'a mut Diagnostics,
    trace: Trace<W>,
}

/// Operadores de las familias binarias, por nivel de precedencia.
const MUL_OPS: &[TokenKind] = &[TokenKind::Mult, TokenKind::Div, TokenKind::Mod];
const ADD_OPS: &[TokenKind] = &[TokenKind::Plus, TokenKind::Minus];
const REL_OPS: &[TokenKind] = &[TokenKind::Lss, TokenKind::Gre, TokenKind::Leq, TokenKind::Geq];
const EQ_OPS: &[TokenKind] = &[TokenKind::Eql, TokenKind::Neq];
const AND_OPS: &[TokenKind] = &[TokenKind::And];
const OR_OPS: &[TokenKind] = &[TokenKind::Or];

impl<'a, W: Write> Parser<'a, W> {
    fn comp_unit(&mut self) -> Parse<SyntaxNode> {
        use TokenKind::*;

        let mut children = Vec::new();

        // `int x ...` es declaración, `int f(` es definición de función;
        // `int main(` no es ninguna de las dos porque `main` no es IDENFR
        while self.at(Const)
            || self.at(Static)
            || (self.at(Int) && self.ahead(1) == Some(Ident) && self.ahead(2) != Some(OpenParen))
        {
            children.push(self.decl()?);
        }

        while self.at(Void)
            || (self.at(Int) && self.ahead(1) == Some(Ident) && self.ahead(2) == Some(OpenParen))
        {
            children.push(self.func_def()?);
        }

        children.push(self.main_func_def()?);
        self.reduce(Symbol::CompUnit, children)
    }

    fn decl(&mut self) -> Parse<SyntaxNode> {
        let child = if self.at(TokenKind::Const) {
            self.const_decl()?
        } else {
            self.var_decl()?
        };

        self.reduce(Symbol::Decl, vec![child])
    }

    fn const_decl(&mut self) -> Parse<SyntaxNode> {
        let mut children = vec![self.expect(TokenKind::Const)?, self.b_type()?];
        self.comma_separated(&mut children, Self::const_def)?;
        self.recover(&mut children, TokenKind::Semicolon, ErrorCode::MissingSemicolon)?;

        self.reduce(Symbol::ConstDecl, children)
    }

    fn b_type(&mut self) -> Parse<SyntaxNode> {
        let int = self.expect(TokenKind::Int)?;
        self.reduce(Symbol::BType, vec![int])
    }

    fn const_def(&mut self) -> Parse<SyntaxNode> {
        let mut children = vec![self.expect(TokenKind::Ident)?];
        self.dimension(&mut children, Self::const_exp)?;

        children.push(self.expect(TokenKind::Assign)?);
        children.push(self.const_init_val()?);

        self.reduce(Symbol::ConstDef, children)
    }

    fn const_init_val(&mut self) -> Parse<SyntaxNode> {
        let children = self.initializer(Self::const_exp)?;
        self.reduce(Symbol::ConstInitVal, children)
    }

    fn var_decl(&mut self) -> Parse<SyntaxNode> {
        let mut children = Vec::new();
        if self.at(TokenKind::Static) {
            children.push(self.expect(TokenKind::Static)?);
        }

        children.push(self.b_type()?);
        self.comma_separated(&mut children, Self::var_def)?;
        self.recover(&mut children, TokenKind::Semicolon, ErrorCode::MissingSemicolon)?;

        self.reduce(Symbol::VarDecl, children)
    }

    fn var_def(&mut self) -> Parse<SyntaxNode> {
        let mut children = vec![self.expect(TokenKind::Ident)?];
        self.dimension(&mut children, Self::const_exp)?;

        if self.at(TokenKind::Assign) {
            children.push(self.expect(TokenKind::Assign)?);
            children.push(self.init_val()?);
        }

        self.reduce(Symbol::VarDef, children)
    }

    fn init_val(&mut self) -> Parse<SyntaxNode> {
        let children = self.initializer(Self::exp)?;
        self.reduce(Symbol::InitVal, children)
    }

    fn func_def(&mut self) -> Parse<SyntaxNode> {
        let mut children = vec![
            self.func_type()?,
            self.expect(TokenKind::Ident)?,
            self.expect(TokenKind::OpenParen)?,
        ];

        if self.at(TokenKind::Int) {
            children.push(self.func_f_params()?);
        }

        self.recover(&mut children, TokenKind::CloseParen, ErrorCode::MissingRightParen)?;
        children.push(self.block()?);

        self.reduce(Symbol::FuncDef, children)
    }

    fn func_type(&mut self) -> Parse<SyntaxNode> {
        let keyword = if self.at(TokenKind::Int) {
            self.expect(TokenKind::Int)?
        } else {
            self.expect(TokenKind::Void)?
        };

        self.reduce(Symbol::FuncType, vec![keyword])
    }

    fn func_f_params(&mut self) -> Parse<SyntaxNode> {
        let mut children = Vec::new();
        self.comma_separated(&mut children, Self::func_f_param)?;

        self.reduce(Symbol::FuncFParams, children)
    }

    fn func_f_param(&mut self) -> Parse<SyntaxNode> {
        let mut children = vec![self.b_type()?, self.expect(TokenKind::Ident)?];
        if self.at(TokenKind::OpenSquare) {
            children.push(self.expect(TokenKind::OpenSquare)?);
            self.recover(&mut children, TokenKind::CloseSquare, ErrorCode::MissingRightBracket)?;
        }

        self.reduce(Symbol::FuncFParam, children)
    }

    fn block(&mut self) -> Parse<SyntaxNode> {
        let mut children = vec![self.expect(TokenKind::OpenCurly)?];
        while let Some(token) = self.peek().filter(|token| token.kind() != TokenKind::CloseCurly) {
            let start = self.cursor;
            children.push(self.block_item()?);

            // Un token que no inicia ninguna sentencia no se consume jamás
            if self.cursor == start {
                return self.fail(ParserError::UnexpectedToken(TokenKind::CloseCurly, token.clone()));
            }
        }

        children.push(self.expect(TokenKind::CloseCurly)?);
        self.reduce(Symbol::Block, children)
    }

    fn block_item(&mut self) -> Parse<SyntaxNode> {
        use TokenKind::*;

        let child = match self.ahead(0) {
            Some(Const | Int | Static) => self.decl()?,
            _ => self.stmt()?,
        };

        self.reduce(Symbol::BlockItem, vec![child])
    }

    fn stmt(&mut self) -> Parse<SyntaxNode> {
        use TokenKind::*;

        let mut children = Vec::new();
        match self.ahead(0) {
            Some(If) => {
                children.push(self.expect(If)?);
                children.push(self.expect(OpenParen)?);
                children.push(self.cond()?);
                self.recover(&mut children, CloseParen, ErrorCode::MissingRightParen)?;
                children.push(self.stmt()?);

                if self.at(Else) {
                    children.push(self.expect(Else)?);
                    children.push(self.stmt()?);
                }
            }

            Some(For) => {
                children.push(self.expect(For)?);
                children.push(self.expect(OpenParen)?);
                if self.at(Ident) {
                    children.push(self.for_stmt()?);
                }

                children.push(self.expect(Semicolon)?);
                if self.peek().is_some() && !self.at(Semicolon) {
                    children.push(self.cond()?);
                }

                children.push(self.expect(Semicolon)?);
                if self.at(Ident) {
                    children.push(self.for_stmt()?);
                }

                self.recover(&mut children, CloseParen, ErrorCode::MissingRightParen)?;
                children.push(self.stmt()?);
            }

            Some(kind @ (Break | Continue)) => {
                children.push(self.expect(kind)?);
                self.recover(&mut children, Semicolon, ErrorCode::MissingSemicolon)?;
            }

            Some(Return) => {
                children.push(self.expect(Return)?);
                if self.starts_exp() {
                    children.push(self.exp()?);
                }

                self.recover(&mut children, Semicolon, ErrorCode::MissingSemicolon)?;
            }

            Some(Printf) => {
                children.push(self.expect(Printf)?);
                children.push(self.expect(OpenParen)?);
                children.push(self.expect(StrConst)?);
                self.comma_tail(&mut children, Self::exp)?;

                self.recover(&mut children, CloseParen, ErrorCode::MissingRightParen)?;
                self.recover(&mut children, Semicolon, ErrorCode::MissingSemicolon)?;
            }

            Some(OpenCurly) => children.push(self.block()?),

            // Un identificador seguido de `[` o `=` inicia una asignación
            Some(Ident) if matches!(self.ahead(1), Some(OpenSquare | Assign)) => {
                children.push(self.l_val()?);
                children.push(self.expect(Assign)?);
                children.push(self.exp()?);
                self.recover(&mut children, Semicolon, ErrorCode::MissingSemicolon)?;
            }

            _ => {
                if self.starts_exp() {
                    children.push(self.exp()?);
                }

                self.recover(&mut children, Semicolon, ErrorCode::MissingSemicolon)?;
            }
        }

        self.reduce(Symbol::Stmt, children)
    }

    fn for_stmt(&mut self) -> Parse<SyntaxNode> {
        let mut children = Vec::new();
        loop {
            children.push(self.l_val()?);
            children.push(self.expect(TokenKind::Assign)?);
            children.push(self.exp()?);

            if !self.at(TokenKind::Comma) {
                break;
            }

            children.push(self.expect(TokenKind::Comma)?);
        }

        self.reduce(Symbol::ForStmt, children)
    }

    fn exp(&mut self) -> Parse<SyntaxNode> {
        let add_exp = self.add_exp()?;
        self.reduce(Symbol::Exp, vec![add_exp])
    }

    fn cond(&mut self) -> Parse<SyntaxNode> {
        let l_or_exp = self.l_or_exp()?;
        self.reduce(Symbol::Cond, vec![l_or_exp])
    }

    fn const_exp(&mut self) -> Parse<SyntaxNode> {
        let add_exp = self.add_exp()?;
        self.reduce(Symbol::ConstExp, vec![add_exp])
    }

    fn l_val(&mut self) -> Parse<SyntaxNode> {
        let mut children = vec![self.expect(TokenKind::Ident)?];
        self.dimension(&mut children, Self::exp)?;

        self.reduce(Symbol::LVal, children)
    }

    fn primary_exp(&mut self) -> Parse<SyntaxNode> {
        let mut children = Vec::new();
        match self.ahead(0) {
            Some(TokenKind::OpenParen) => {
                children.push(self.expect(TokenKind::OpenParen)?);
                children.push(self.exp()?);
                self.recover(&mut children, TokenKind::CloseParen, ErrorCode::MissingRightParen)?;
            }

            Some(TokenKind::Ident) => children.push(self.l_val()?),
            _ => children.push(self.number()?),
        }

        self.reduce(Symbol::PrimaryExp, children)
    }

    fn number(&mut self) -> Parse<SyntaxNode> {
        let int_const = self.expect(TokenKind::IntConst)?;
        self.reduce(Symbol::Number, vec![int_const])
    }

    fn unary_exp(&mut self) -> Parse<SyntaxNode> {
        use TokenKind::*;

        let mut children = Vec::new();
        match (self.ahead(0), self.ahead(1)) {
            (Some(Plus | Minus | Not), _) => {
                children.push(self.unary_op()?);
                children.push(self.unary_exp()?);
            }

            // Llamada a función
            (Some(Ident), Some(OpenParen)) => {
                children.push(self.expect(Ident)?);
                children.push(self.expect(OpenParen)?);
                if self.starts_exp() {
                    children.push(self.func_r_params()?);
                }

                self.recover(&mut children, CloseParen, ErrorCode::MissingRightParen)?;
            }

            _ => children.push(self.primary_exp()?),
        }

        self.reduce(Symbol::UnaryExp, children)
    }

    fn unary_op(&mut self) -> Parse<SyntaxNode> {
        let operator = match self.ahead(0) {
            Some(kind @ (TokenKind::Plus | TokenKind::Minus)) => self.expect(kind)?,
            _ => self.expect(TokenKind::Not)?,
        };

        self.reduce(Symbol::UnaryOp, vec![operator])
    }

    fn func_r_params(&mut self) -> Parse<SyntaxNode> {
        let mut children = Vec::new();
        self.comma_separated(&mut children, Self::exp)?;

        self.reduce(Symbol::FuncRParams, children)
    }

    fn mul_exp(&mut self) -> Parse<SyntaxNode> {
        self.binary(Symbol::MulExp, MUL_OPS, Self::unary_exp)
    }

    fn add_exp(&mut self) -> Parse<SyntaxNode> {
        self.binary(Symbol::AddExp, ADD_OPS, Self::mul_exp)
    }

    fn rel_exp(&mut self) -> Parse<SyntaxNode> {
        self.binary(Symbol::RelExp, REL_OPS, Self::add_exp)
    }

    fn eq_exp(&mut self) -> Parse<SyntaxNode> {
        self.binary(Symbol::EqExp, EQ_OPS, Self::rel_exp)
    }

    fn l_and_exp(&mut self) -> Parse<SyntaxNode> {
        self.binary(Symbol::LAndExp, AND_OPS, Self::eq_exp)
    }

    fn l_or_exp(&mut self) -> Parse<SyntaxNode> {
        self.binary(Symbol::LOrExp, OR_OPS, Self::l_and_exp)
    }

    fn main_func_def(&mut self) -> Parse<SyntaxNode> {
        use TokenKind::*;

        let mut children = vec![
            self.expect(Int)?,
            self.expect(Main)?,
            self.expect(OpenParen)?,
        ];

        self.recover(&mut children, CloseParen, ErrorCode::MissingRightParen)?;
        children.push(self.block()?);

        self.reduce(Symbol::MainFuncDef, children)
    }

    /// Familia de expresiones binarias asociativas por la izquierda.
    ///
    /// Cada operando adicional envuelve al nodo acumulado en un nuevo
    /// nodo del mismo símbolo, y cada envoltura produce una línea de traza.
    fn binary<F>(&mut self, symbol: Symbol, operators: &[TokenKind], mut operand: F) -> Parse<SyntaxNode>
    where
        F: FnMut(&mut Self) -> Parse<SyntaxNode>,
    {
        let first = operand(self)?;
        let mut node = self.reduce(symbol, vec![first])?;

        while let Some(kind) = self.ahead(0).filter(|kind| operators.contains(kind)) {
            let operator = self.next(kind)?;
            if operator.is_malformed() {
                debug!(line = operator.line(), lexeme = operator.lexeme(), "lone logical operator");
                self.diagnostics.report(operator.line(), ErrorCode::IllegalSymbol);
            }

            let rhs = operand(self)?;
            node = self.reduce(symbol, vec![node, SyntaxNode::Terminal(operator), rhs])?;
        }

        Ok(node)
    }

    /// Inicializador de la forma `X | '{' [X {',' X}] '}'`.
    fn initializer<F>(&mut self, mut element: F) -> Parse<Vec<SyntaxNode>>
    where
        F: FnMut(&mut Self) -> Parse<SyntaxNode>,
    {
        if !self.at(TokenKind::OpenCurly) {
            return Ok(vec![element(self)?]);
        }

        let mut children = vec![self.expect(TokenKind::OpenCurly)?];
        if !self.at(TokenKind::CloseCurly) {
            self.comma_separated(&mut children, element)?;
        }

        children.push(self.expect(TokenKind::CloseCurly)?);
        Ok(children)
    }

    /// Índice opcional de la forma `'[' X ']'`, con `]` recuperable.
    fn dimension<F>(&mut self, children: &mut Vec<SyntaxNode>, index: F) -> Parse<()>
    where
        F: FnOnce(&mut Self) -> Parse<SyntaxNode>,
    {
        if self.at(TokenKind::OpenSquare) {
            children.push(self.expect(TokenKind::OpenSquare)?);
            children.push(index(self)?);
            self.recover(children, TokenKind::CloseSquare, ErrorCode::MissingRightBracket)?;
        }

        Ok(())
    }

    /// Secuencia de la forma `X {',' X}`.
    fn comma_separated<F>(&mut self, children: &mut Vec<SyntaxNode>, mut rule: F) -> Parse<()>
    where
        F: FnMut(&mut Self) -> Parse<SyntaxNode>,
    {
        children.push(rule(self)?);
        self.comma_tail(children, rule)
    }

    /// Repetición de la forma `{',' X}`.
    fn comma_tail<F>(&mut self, children: &mut Vec<SyntaxNode>, mut rule: F) -> Parse<()>
    where
        F: FnMut(&mut Self) -> Parse<SyntaxNode>,
    {
        while self.at(TokenKind::Comma) {
            children.push(self.expect(TokenKind::Comma)?);
            children.push(rule(self)?);
        }

        Ok(())
    }

    /// Consume un terminal que puede faltar.
    ///
    /// Si el siguiente token no es `kind`, no se consume nada y se reporta
    /// `code` en la línea del último token consumido.
    fn recover(&mut self, children: &mut Vec<SyntaxNode>, kind: TokenKind, code: ErrorCode) -> Parse<()> {
        if self.at(kind) {
            children.push(self.expect(kind)?);
        } else {
            let line = self.last_line();
            debug!(line, code = %code, expected = %kind, "recovered from missing token");

            self.diagnostics.report(line, code);
        }

        Ok(())
    }

    /// Consume un terminal obligatorio.
    fn expect(&mut self, kind: TokenKind) -> Parse<SyntaxNode> {
        match self.peek() {
            Some(token) if token.kind() == kind => Ok(SyntaxNode::Terminal(self.next(kind)?)),
            Some(token) => self.fail(ParserError::UnexpectedToken(kind, token.clone())),
            None => self.fail(ParserError::MissingToken(kind)),
        }
    }

    /// Consume el siguiente token, sea cual sea, y lo escribe en la traza.
    ///
    /// `expected` solo se usa para describir el error si ya no hay tokens.
    fn next(&mut self, expected: TokenKind) -> Parse<Token> {
        let token = match self.peek() {
            Some(token) => token.clone(),
            None => return self.fail(ParserError::MissingToken(expected)),
        };

        self.cursor += 1;
        self.trace
            .terminal(&token)
            .map_err(|error| self.locate(error.into()))?;

        Ok(token)
    }

    /// Escribe la reducción de `symbol` y construye su nodo.
    fn reduce(&mut self, symbol: Symbol, children: Vec<SyntaxNode>) -> Parse<SyntaxNode> {
        self.trace
            .reduce(symbol)
            .map_err(|error| self.locate(error.into()))?;

        Ok(SyntaxNode::NonTerminal { symbol, children })
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.cursor)
    }

    /// Categoría del token `offset` posiciones adelante del cursor.
    fn ahead(&self, offset: usize) -> Option<TokenKind> {
        self.tokens.get(self.cursor + offset).map(Token::kind)
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.ahead(0) == Some(kind)
    }

    /// Determina si el siguiente token puede iniciar una expresión.
    fn starts_exp(&self) -> bool {
        use TokenKind::*;

        matches!(
            self.ahead(0),
            Some(Plus | Minus | Not | Ident | OpenParen | IntConst)
        )
    }

    /// Línea del último token consumido, o 0 si aún no se consume ninguno.
    fn last_line(&self) -> u32 {
        self.cursor
            .checked_sub(1)
            .and_then(|last| self.tokens.get(last))
            .map_or(0, Token::line)
    }

    /// Posición a la que se atribuye un error fatal.
    fn position(&self) -> Position {
        self.peek()
            .or_else(|| self.tokens.last())
            .map_or_else(Position::default, Token::position)
    }

    fn locate(&self, error: ParserError) -> Located<ParserError> {
        Located::at(error, self.position())
    }

    fn fail<T>(&self, error: ParserError) -> Parse<T> {
        Err(self.locate(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lex;

    struct Outcome {
        trace: Vec<String>,
        diagnostics: String,
        tree: Result<SyntaxNode, Located<ParserError>>,
    }

    fn run(text: &str) -> Outcome {
        let tokens = lex::tokenize(text.as_bytes()).unwrap();
        let mut diagnostics = Diagnostics::default();
        let mut output = Vec::new();

        let tree = parse(&tokens, &mut diagnostics, &mut output);
        diagnostics.sort_by_line();

        Outcome {
            trace: String::from_utf8(output)
                .unwrap()
                .lines()
                .map(str::to_owned)
                .collect(),
            diagnostics: diagnostics.to_string(),
            tree,
        }
    }

    /// Primer nodo de `symbol` en preorden.
    fn find(tree: &SyntaxNode, symbol: Symbol) -> &SyntaxNode {
        let mut stack = vec![tree];
        while let Some(node) = stack.pop() {
            if node.symbol() == Some(symbol) {
                return node;
            }

            stack.extend(node.children().iter().rev());
        }

        panic!("no {} node in tree", symbol);
    }

    fn count(trace: &[String], line: &str) -> usize {
        trace.iter().filter(|entry| *entry == line).count()
    }

    /// Envuelve una sentencia en `main`.
    fn in_main(body: &str) -> String {
        format!("int main(){{\n{}\n}}", body)
    }

    #[test]
    fn minimal_program_trace() {
        let outcome = run("int main(){return 0;}");
        assert_eq!(
            outcome.trace,
            [
                "INTTK int",
                "MAINTK main",
                "LPARENT (",
                "RPARENT )",
                "LBRACE {",
                "RETURNTK return",
                "INTCON 0",
                "<Number>",
                "<PrimaryExp>",
                "<UnaryExp>",
                "<MulExp>",
                "<AddExp>",
                "<Exp>",
                "SEMICN ;",
                "<Stmt>",
                "RBRACE }",
                "<Block>",
                "<MainFuncDef>",
                "<CompUnit>",
            ]
        );

        assert_eq!(outcome.diagnostics, "");
        assert!(outcome.tree.is_ok());
    }

    #[test]
    fn suppressed_symbols_are_built_but_not_traced() {
        let outcome = run("int g;\nint main(){const int c = 1; return c;}");
        let tree = outcome.tree.unwrap();

        assert_eq!(tree.count(Symbol::Decl), 2);
        assert_eq!(tree.count(Symbol::BType), 2);
        assert_eq!(tree.count(Symbol::BlockItem), 2);

        for hidden in ["<Decl>", "<BType>", "<BlockItem>"] {
            assert_eq!(count(&outcome.trace, hidden), 0);
        }
    }

    #[test]
    fn left_associative_reductions() {
        let outcome = run(&in_main("x = a + b * c - d;"));
        let tree = outcome.tree.unwrap();

        // a, b * c, d
        assert_eq!(count(&outcome.trace, "<AddExp>"), 3);
        // a, b, b * c, d
        assert_eq!(count(&outcome.trace, "<MulExp>"), 4);
        assert_eq!(tree.count(Symbol::AddExp), 3);
        assert_eq!(tree.count(Symbol::MulExp), 4);
    }

    #[test]
    fn binary_nodes_nest_to_the_left() {
        let outcome = run(&in_main("return 1 - 2 - 3;"));
        let tree = outcome.tree.unwrap();

        let outer = find(&tree, Symbol::AddExp);
        assert_eq!(outer.children().len(), 3);
        assert_eq!(outer.children()[0].symbol(), Some(Symbol::AddExp));
        assert_eq!(outer.children()[2].symbol(), Some(Symbol::MulExp));

        let lexemes: Vec<_> = outer.tokens().iter().map(|t| t.lexeme().to_owned()).collect();
        assert_eq!(lexemes, ["1", "-", "2", "-", "3"]);
    }

    #[test]
    fn condition_chain() {
        let outcome = run("int main(){if(1<2)return 1;}");
        let trace = &outcome.trace;

        assert_eq!(count(trace, "<Cond>"), 1);
        assert_eq!(count(trace, "<LOrExp>"), 1);
        assert_eq!(count(trace, "<LAndExp>"), 1);
        assert_eq!(count(trace, "<EqExp>"), 1);
        assert_eq!(count(trace, "<RelExp>"), 2);
        assert_eq!(count(trace, "<Stmt>"), 2);
        assert_eq!(outcome.diagnostics, "");
    }

    #[test]
    fn missing_semicolon() {
        let outcome = run("int main(){return 0}");
        assert_eq!(outcome.diagnostics, "1 i\n");
        assert!(outcome.tree.is_ok());
    }

    #[test]
    fn missing_semicolon_reports_previous_line() {
        let outcome = run("int main(){\n  int a = 1\n  a = 2;\n  return a\n}");
        assert_eq!(outcome.diagnostics, "2 i\n4 i\n");
    }

    #[test]
    fn missing_semicolons_in_every_context() {
        let body = "const int a = 1\nint b\nb = 2\nb\n;\nfor(;;){break\ncontinue\n}\nprintf(\"x\")\nreturn\n";
        let outcome = run(&in_main(body));

        assert!(outcome.tree.is_ok());
        // `b` en la línea 5 termina con el `;` de la línea 6
        assert_eq!(
            outcome.diagnostics,
            "2 i\n3 i\n4 i\n7 i\n8 i\n10 i\n11 i\n"
        );
    }

    #[test]
    fn missing_right_parens() {
        let text = "int f(int a {\n  return g(a;\n}\nint main({\n  if (1 < 2 return (3;\n  printf(\"%d\", 1;\n  for (;; return 0;\n}";
        let outcome = run(text);

        assert!(outcome.tree.is_ok());
        assert_eq!(outcome.diagnostics, "1 j\n2 j\n4 j\n5 j\n5 j\n6 j\n7 j\n");
    }

    #[test]
    fn missing_right_brackets() {
        let text = "const int c[2 = {1, 2};\nint v[3 = {1,2,3};\nint f(int p[) { return p[0; }\nint main(){ v[1 = 2; return 0; }";
        let outcome = run(text);

        assert!(outcome.tree.is_ok());
        assert_eq!(outcome.diagnostics, "1 k\n2 k\n3 k\n3 k\n4 k\n");
    }

    #[test]
    fn missing_bracket_continues_into_initializer() {
        let outcome = run("int x[3 = {1,2,3};\nint main(){return 0;}");
        assert_eq!(outcome.diagnostics, "1 k\n");
        assert_eq!(count(&outcome.trace, "<InitVal>"), 1);
        assert_eq!(count(&outcome.trace, "<VarDef>"), 1);
    }

    #[test]
    fn lone_logical_operators() {
        let outcome = run(&in_main("if (a & b) ;\nif (a | b) ;\nif (a && b || c) ;"));

        assert_eq!(outcome.diagnostics, "2 a\n3 a\n");
        assert!(outcome.trace.contains(&"AND &".to_owned()));
        assert!(outcome.trace.contains(&"OR |".to_owned()));
        assert_eq!(count(&outcome.trace, "<LAndExp>"), 2 + 2 + 3);
    }

    #[test]
    fn const_declaration_list() {
        let outcome = run("const int N=10,M=20;\nint main(){return 0;}");
        assert_eq!(count(&outcome.trace, "<ConstDef>"), 2);
        assert_eq!(count(&outcome.trace, "<ConstDecl>"), 1);
        assert_eq!(count(&outcome.trace, "<CompUnit>"), 1);
        assert_eq!(outcome.diagnostics, "");
    }

    #[test]
    fn functions_and_calls() {
        let text = "void p(){}\nint add(int a, int b[]){return a + b[0];}\nint main(){p(); return add(1, -2);}";
        let outcome = run(text);
        let tree = outcome.tree.unwrap();

        assert_eq!(tree.count(Symbol::FuncDef), 2);
        assert_eq!(tree.count(Symbol::FuncFParam), 2);
        assert_eq!(tree.count(Symbol::FuncRParams), 1);
        assert_eq!(count(&outcome.trace, "<FuncType>"), 2);
        assert_eq!(count(&outcome.trace, "<UnaryOp>"), 1);
        assert_eq!(outcome.diagnostics, "");
    }

    #[test]
    fn static_declarations_and_initializers() {
        let text = "static int a[2] = {};\nint main(){static int b = 1, c[2] = {b, b + 1}; return 0;}";
        let outcome = run(text);

        assert!(outcome.tree.is_ok());
        assert_eq!(count(&outcome.trace, "STATICTK static"), 2);
        assert_eq!(count(&outcome.trace, "<InitVal>"), 3);
        assert_eq!(count(&outcome.trace, "<VarDecl>"), 2);
    }

    #[test]
    fn for_statement_with_every_clause() {
        let outcome = run(&in_main("for (i = 0, j = 1; i < 10; i = i + 1) { continue; }"));
        let tree = outcome.tree.unwrap();

        assert_eq!(tree.count(Symbol::ForStmt), 2);
        assert_eq!(count(&outcome.trace, "<ForStmt>"), 2);
        assert_eq!(count(&outcome.trace, "<Cond>"), 1);
    }

    #[test]
    fn dangling_else_binds_to_nearest_if() {
        let outcome = run(&in_main("if (a) if (b) x = 1; else x = 2;"));
        let tree = outcome.tree.unwrap();

        // if externo, if interno, dos asignaciones
        assert_eq!(tree.count(Symbol::Stmt), 4);

        let outer = find(&tree, Symbol::Stmt);
        assert_eq!(outer.children().len(), 5);

        let inner = &outer.children()[4];
        assert_eq!(inner.children().len(), 7);
    }

    #[test]
    fn expression_statements() {
        let outcome = run(&in_main(";\nf();\n(a);\n-a;"));
        assert!(outcome.tree.is_ok());
        assert_eq!(count(&outcome.trace, "<Stmt>"), 4);
        assert_eq!(outcome.diagnostics, "");
    }

    #[test]
    fn every_token_is_traced_once_in_order() {
        let text = "int g = 1;\nint main(){int a[2]; a[0] = g * (2 + 3); printf(\"%d\", a[0]); return 0;}";
        let tokens = lex::tokenize(text.as_bytes()).unwrap();
        let outcome = run(text);

        let terminals: Vec<_> = outcome
            .trace
            .iter()
            .filter(|line| !line.starts_with('<'))
            .cloned()
            .collect();

        let expected: Vec<_> = tokens.iter().map(Token::to_string).collect();
        assert_eq!(terminals, expected);

        let tree = outcome.tree.unwrap();
        assert_eq!(tree.tokens().len(), tokens.len());
        assert_eq!(tree.line(), Some(1));
    }

    #[test]
    fn cursor_only_moves_forward() {
        let text = "x = 1; if (x) return x; else ; printf(\"a\");";
        let tokens = lex::tokenize(text.as_bytes()).unwrap();
        let mut diagnostics = Diagnostics::default();
        let mut parser = Parser {
            tokens: &tokens,
            cursor: 0,
            diagnostics: &mut diagnostics,
            trace: Trace::new(std::io::sink()),
        };

        let mut cursors = vec![parser.cursor];
        while parser.peek().is_some() {
            parser.stmt().unwrap();
            cursors.push(parser.cursor);
        }

        assert_eq!(cursors.len(), 4);
        assert!(cursors.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(parser.cursor, tokens.len());
    }

    #[test]
    fn missing_main_is_fatal() {
        let outcome = run("int x;");
        let error = outcome.tree.unwrap_err();

        assert!(matches!(error.val(), ParserError::MissingToken(TokenKind::Int)));
        assert_eq!(
            outcome.trace,
            ["INTTK int", "IDENFR x", "<VarDef>", "SEMICN ;", "<VarDecl>"]
        );
    }

    #[test]
    fn unexpected_token_is_fatal_and_located() {
        let outcome = run("int main(){\n for x }");
        let (position, error) = outcome.tree.unwrap_err().split();

        assert!(matches!(
            error,
            ParserError::UnexpectedToken(TokenKind::OpenParen, ref found) if found.lexeme() == "x"
        ));
        assert_eq!(position.line(), 2);
    }

    #[test]
    fn stray_token_in_block_is_fatal() {
        let outcome = run("int main(){\n  )\n}");
        let (position, error) = outcome.tree.unwrap_err().split();

        assert!(matches!(error, ParserError::UnexpectedToken(TokenKind::CloseCurly, _)));
        assert_eq!(position.line(), 2);
    }

    #[test]
    fn trailing_tokens_are_left_unconsumed() {
        let outcome = run("int main(){return 0;} int");
        assert!(outcome.tree.is_ok());
        assert_eq!(outcome.trace.last().map(String::as_str), Some("<CompUnit>"));
    }
}
