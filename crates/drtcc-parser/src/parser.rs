use drtcc_ast::{Ast, BaseType, Interner, NodeId, NodePayload, NodeTag, Operator, Symbol};
use drtcc_lexer::{Keyword, LexError, Lexer, Op, Token, TokenKind};

use crate::error::{ParseError, ParseErrorKind};

/// Everything a successful parse hands back to the code generator.
pub struct ParseOutput {
    /// The AST arena.
    pub ast: Ast,
    /// The identifier/string interner shared by every [`Symbol`] in `ast`.
    pub interner: Interner,
    /// The root node (always an `Root` tag).
    pub root: NodeId,
    /// Lexical errors encountered along the way. Per `spec.md` §7 band 1,
    /// these are non-fatal: the lexer resumed at the next token, so parsing
    /// may have completed despite them. A non-empty list is still cause for
    /// the driver to report failure.
    pub lex_errors: Vec<LexError>,
}

/// Parse a complete source unit.
pub fn parse(source: &str) -> Result<ParseOutput, ParseError> {
    let mut parser = Parser::new(source);
    let root = parser.program()?;
    Ok(ParseOutput {
        ast: parser.ast,
        interner: parser.interner,
        root,
        lex_errors: parser.lex_errors,
    })
}

type PResult<T> = Result<T, ParseError>;

struct Parser<'a> {
    lexer: Lexer<'a>,
    ast: Ast,
    interner: Interner,
    cur: Token,
    lex_errors: Vec<LexError>,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        let mut parser = Self {
            lexer: Lexer::new(source),
            ast: Ast::new(),
            interner: Interner::new(),
            cur: Token {
                kind: TokenKind::Eof,
                line: 1,
                col: 1,
            },
            lex_errors: Vec::new(),
        };
        parser.advance();
        parser
    }

    /// Equivalent of the original `Parser::Next`: skip to the next
    /// meaningful token, recording (not raising) every lexical error along
    /// the way.
    fn advance(&mut self) {
        loop {
            match self.lexer.next() {
                None => {
                    self.cur = Token {
                        kind: TokenKind::Eof,
                        line: self.cur.line,
                        col: self.cur.col,
                    };
                    return;
                }
                Some(Ok(tok)) => {
                    self.cur = tok;
                    return;
                }
                Some(Err(err)) => self.lex_errors.push(err),
            }
        }
    }

    fn err(&self, kind: ParseErrorKind) -> ParseError {
        ParseError {
            kind,
            line: self.cur.line,
            col: self.cur.col,
        }
    }

    fn token_desc(&self) -> String {
        match &self.cur.kind {
            TokenKind::Keyword(kw) => format!("keyword `{kw:?}`"),
            TokenKind::Identifier(name) => format!("identifier `{name}`"),
            TokenKind::IntLiteral(v) => format!("integer `{v}`"),
            TokenKind::FloatLiteral(v) => format!("float `{v}`"),
            TokenKind::CharLiteral(v) => format!("char `{v}`"),
            TokenKind::StringLiteral(s) => format!("string \"{s}\""),
            TokenKind::Op(op) => format!("`{op:?}`"),
            TokenKind::Eof => "end of input".to_owned(),
        }
    }

    fn is_op(&self, op: Op) -> bool {
        matches!(&self.cur.kind, TokenKind::Op(o) if *o == op)
    }

    fn is_keyword(&self, kw: Keyword) -> bool {
        matches!(&self.cur.kind, TokenKind::Keyword(k) if *k == kw)
    }

    fn eat_op(&mut self, op: Op) -> PResult<()> {
        if self.is_op(op) {
            self.advance();
            Ok(())
        } else {
            let expected = format!("`{op:?}`");
            let found = self.token_desc();
            Err(self.err(ParseErrorKind::Unexpected { expected, found }))
        }
    }

    fn eat_keyword(&mut self, kw: Keyword) -> PResult<()> {
        if self.is_keyword(kw) {
            self.advance();
            Ok(())
        } else {
            let expected = format!("keyword `{kw:?}`");
            let found = self.token_desc();
            Err(self.err(ParseErrorKind::Unexpected { expected, found }))
        }
    }

    fn expect_identifier(&mut self) -> PResult<Symbol> {
        match self.cur.kind.clone() {
            TokenKind::Identifier(name) => {
                let sym = self.interner.intern(&name);
                self.advance();
                Ok(sym)
            }
            _ => {
                let found = self.token_desc();
                Err(self.err(ParseErrorKind::Unexpected {
                    expected: "an identifier".to_owned(),
                    found,
                }))
            }
        }
    }

    /// The identifier half of a `type [*...] id` declarator, once the base
    /// type and pointer stars are already behind us — a missing name here
    /// means the declaration doesn't match that shape at all, not merely
    /// that one token was unexpected.
    fn expect_declarator_identifier(&mut self, what: &str) -> PResult<Symbol> {
        self.expect_identifier()
            .map_err(|_| self.err(ParseErrorKind::BadDeclaration(what.to_owned())))
    }

    fn alloc_leaf(&mut self, tag: NodeTag, payload: NodePayload) -> NodeId {
        self.ast.alloc(tag, payload)
    }

    fn push(&mut self, parent: NodeId, child: NodeId) {
        self.ast.push_child(parent, child);
    }

    // ---- top level -------------------------------------------------

    fn program(&mut self) -> PResult<NodeId> {
        let root = self.alloc_leaf(NodeTag::Root, NodePayload::None);
        while !matches!(self.cur.kind, TokenKind::Eof) {
            let decl = self.global_declaration()?;
            self.push(root, decl);
        }
        Ok(root)
    }

    /// One of: `enum [name] { ... };`, a run of global variable
    /// declarators, or a function definition.
    fn global_declaration(&mut self) -> PResult<NodeId> {
        if self.is_keyword(Keyword::Enum) {
            return self.enum_declaration();
        }

        let base = self.parse_base_type()?;
        let ptr = self.parse_pointer_depth();
        let name = self.expect_declarator_identifier("top-level")?;

        if self.is_op(Op::LParen) {
            return self.function_definition(base, ptr, name);
        }

        let root_list = self.alloc_leaf(NodeTag::Block, NodePayload::None);
        self.append_var_decl(root_list, NodeTag::VarGlobal, base, ptr, name);
        while self.is_op(Op::Comma) {
            self.advance();
            let ptr = self.parse_pointer_depth();
            let name = self.expect_declarator_identifier("global variable")?;
            self.append_var_decl(root_list, NodeTag::VarGlobal, base, ptr, name);
        }
        self.eat_op(Op::Semi)?;
        Ok(root_list)
    }

    fn append_var_decl(
        &mut self,
        parent: NodeId,
        tag: NodeTag,
        base: BaseType,
        ptr: u8,
        name: Symbol,
    ) {
        let var = self.alloc_leaf(tag, NodePayload::None);
        let type_node = self.alloc_leaf(NodeTag::Type, NodePayload::TypeSpec { base, ptr });
        let id_node = self.alloc_leaf(NodeTag::Id, NodePayload::Ident(name));
        self.push(var, type_node);
        self.push(var, id_node);
        self.push(parent, var);
    }

    fn enum_declaration(&mut self) -> PResult<NodeId> {
        self.eat_keyword(Keyword::Enum)?;
        if !self.is_op(Op::LBrace) {
            // Optional tag name; the language has no separate enum
            // namespace, so it's parsed and discarded.
            self.expect_identifier()?;
        }
        let node = self.alloc_leaf(NodeTag::Enum, NodePayload::None);
        if self.is_op(Op::LBrace) {
            self.advance();
            let mut next_value: i64 = 0;
            while !self.is_op(Op::RBrace) {
                let name = match self.cur.kind.clone() {
                    TokenKind::Identifier(text) => {
                        let sym = self.interner.intern(&text);
                        self.advance();
                        sym
                    }
                    _ => return Err(self.err(ParseErrorKind::BadEnum("member name".into()))),
                };
                if self.is_op(Op::Assign) {
                    self.advance();
                    next_value = match self.cur.kind {
                        TokenKind::IntLiteral(v) => v,
                        _ => return Err(self.err(ParseErrorKind::BadEnum("initializer".into()))),
                    };
                    self.advance();
                }
                let unit = self.alloc_leaf(NodeTag::EnumUnit, NodePayload::None);
                let id_node = self.alloc_leaf(NodeTag::Id, NodePayload::Ident(name));
                let val_node = self.alloc_leaf(NodeTag::Int, NodePayload::Int(next_value));
                self.push(unit, id_node);
                self.push(unit, val_node);
                self.push(node, unit);
                next_value += 1;
                if self.is_op(Op::Comma) {
                    self.advance();
                }
            }
            self.eat_op(Op::RBrace)?;
        }
        self.eat_op(Op::Semi)?;
        Ok(node)
    }

    fn parse_base_type(&mut self) -> PResult<BaseType> {
        let mut unsigned = false;
        if self.is_keyword(Keyword::Unsigned) {
            unsigned = true;
            self.advance();
        } else if self.is_keyword(Keyword::Signed) {
            self.advance();
        }

        let base = match &self.cur.kind {
            TokenKind::Keyword(Keyword::Void) => BaseType::Void,
            TokenKind::Keyword(Keyword::Char) => {
                if unsigned {
                    BaseType::Uchar
                } else {
                    BaseType::Char
                }
            }
            TokenKind::Keyword(Keyword::Short) => {
                if unsigned {
                    BaseType::Ushort
                } else {
                    BaseType::Short
                }
            }
            TokenKind::Keyword(Keyword::Int) => {
                if unsigned {
                    BaseType::Uint
                } else {
                    BaseType::Int
                }
            }
            TokenKind::Keyword(Keyword::Long) => {
                if unsigned {
                    BaseType::Ulong
                } else {
                    BaseType::Long
                }
            }
            TokenKind::Keyword(Keyword::Float) => BaseType::Float,
            TokenKind::Keyword(Keyword::Double) => BaseType::Double,
            _ => {
                // `spec.md` §6 defaults a bare `unsigned` to `unsigned int`,
                // and otherwise a missing base type is an error the caller
                // position makes obvious (e.g. a bad declarator).
                if unsigned {
                    return Ok(BaseType::Uint);
                }
                let found = self.token_desc();
                return Err(self.err(ParseErrorKind::Unexpected {
                    expected: "a type".to_owned(),
                    found,
                }));
            }
        };
        self.advance();
        Ok(base)
    }

    fn parse_pointer_depth(&mut self) -> u8 {
        let mut depth = 0u8;
        while self.is_op(Op::Mul) {
            self.advance();
            depth += 1;
        }
        depth
    }

    fn function_definition(&mut self, base: BaseType, ptr: u8, name: Symbol) -> PResult<NodeId> {
        let func = self.alloc_leaf(NodeTag::Func, NodePayload::None);
        let type_node = self.alloc_leaf(NodeTag::Type, NodePayload::TypeSpec { base, ptr });
        let id_node = self.alloc_leaf(NodeTag::Id, NodePayload::Ident(name));
        self.push(func, type_node);
        self.push(func, id_node);

        self.eat_op(Op::LParen)?;
        let params = self.alloc_leaf(NodeTag::Param, NodePayload::None);
        while !self.is_op(Op::RParen) {
            let pbase = self.parse_base_type()?;
            let pptr = self.parse_pointer_depth();
            let pname = self.expect_declarator_identifier("function parameter")?;
            self.append_var_decl(params, NodeTag::VarParam, pbase, pptr, pname);
            if self.is_op(Op::Comma) {
                self.advance();
            }
        }
        self.eat_op(Op::RParen)?;
        self.push(func, params);

        self.eat_op(Op::LBrace)?;
        let block = self.function_body()?;
        self.push(func, block);

        Ok(func)
    }

    /// Local declarations, the `ENT`-insertion marker, then statements,
    /// ending at (and consuming) the closing brace.
    fn function_body(&mut self) -> PResult<NodeId> {
        let block = self.alloc_leaf(NodeTag::Block, NodePayload::None);

        while self.is_base_type_start() {
            let base = self.parse_base_type()?;
            loop {
                let ptr = self.parse_pointer_depth();
                let name = self.expect_declarator_identifier("local variable")?;
                self.append_var_decl(block, NodeTag::VarLocal, base, ptr, name);
                if self.is_op(Op::Comma) {
                    self.advance();
                    continue;
                }
                break;
            }
            self.eat_op(Op::Semi)?;
        }

        let marker = self.alloc_leaf(NodeTag::Empty, NodePayload::Int(1));
        self.push(block, marker);

        while !self.is_op(Op::RBrace) {
            let stmt = self.statement()?;
            self.push(block, stmt);
        }
        self.eat_op(Op::RBrace)?;
        Ok(block)
    }

    fn is_base_type_start(&self) -> bool {
        matches!(
            self.cur.kind,
            TokenKind::Keyword(
                Keyword::Void
                    | Keyword::Char
                    | Keyword::Short
                    | Keyword::Int
                    | Keyword::Long
                    | Keyword::Float
                    | Keyword::Double
                    | Keyword::Unsigned
                    | Keyword::Signed
            )
        )
    }

    // ---- statements -------------------------------------------------

    /// Reserved words for constructs the accepted subset rejects outright
    /// (`spec.md` §6): none of these are real [`Keyword`]s, since the
    /// lexer only tokenizes the accepted subset's keywords, so they'd
    /// otherwise be swallowed as ordinary identifiers.
    const UNSUPPORTED_WORDS: &'static [&'static str] =
        &["for", "switch", "goto", "struct", "union", "do"];

    fn statement(&mut self) -> PResult<NodeId> {
        if let TokenKind::Identifier(name) = &self.cur.kind {
            if Self::UNSUPPORTED_WORDS.contains(&name.as_str()) {
                return Err(self.err(ParseErrorKind::Unsupported(name.clone())));
            }
        }

        let node = if self.is_keyword(Keyword::If) {
            self.advance();
            self.eat_op(Op::LParen)?;
            let cond = self.expression()?;
            self.eat_op(Op::RParen)?;
            let then_branch = self.statement()?;
            let node = self.alloc_leaf(NodeTag::If, NodePayload::None);
            self.push(node, cond);
            self.push(node, then_branch);
            if self.is_keyword(Keyword::Else) {
                self.advance();
                let else_branch = self.statement()?;
                self.push(node, else_branch);
            }
            node
        } else if self.is_keyword(Keyword::While) {
            self.advance();
            self.eat_op(Op::LParen)?;
            let cond = self.expression()?;
            self.eat_op(Op::RParen)?;
            let body = self.statement()?;
            let node = self.alloc_leaf(NodeTag::While, NodePayload::None);
            self.push(node, cond);
            self.push(node, body);
            node
        } else if self.is_op(Op::LBrace) {
            self.advance();
            let node = self.alloc_leaf(NodeTag::Block, NodePayload::None);
            while !self.is_op(Op::RBrace) {
                let stmt = self.statement()?;
                self.push(node, stmt);
            }
            self.eat_op(Op::RBrace)?;
            return Ok(node);
        } else if self.is_keyword(Keyword::Return) {
            self.advance();
            let node = self.alloc_leaf(NodeTag::Return, NodePayload::None);
            if !self.is_op(Op::Semi) {
                let expr = self.expression()?;
                self.push(node, expr);
            }
            self.eat_op(Op::Semi)?;
            node
        } else if self.is_op(Op::Semi) {
            self.advance();
            self.alloc_leaf(NodeTag::Empty, NodePayload::None)
        } else {
            let expr = self.expression()?;
            self.eat_op(Op::Semi)?;
            let node = self.alloc_leaf(NodeTag::Exp, NodePayload::None);
            self.push(node, expr);
            node
        };

        // Per the original Parser::Statement: every statement except a
        // nested block is wrapped in a Stmt marker node.
        let tag = self.ast.node(node).tag;
        if matches!(tag, NodeTag::Block) {
            Ok(node)
        } else {
            let wrapper = self.alloc_leaf(NodeTag::Stmt, NodePayload::None);
            self.push(wrapper, node);
            Ok(wrapper)
        }
    }

    // ---- expressions --------------------------------------------------
    // Standard C precedence, lowest to tightest: assignment, ternary,
    // logical-or, logical-and, bitwise-or, bitwise-xor, bitwise-and,
    // equality, relational, shift, additive, multiplicative, unary,
    // postfix, primary.

    fn expression(&mut self) -> PResult<NodeId> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> PResult<NodeId> {
        let lhs = self.parse_conditional()?;
        let op = match &self.cur.kind {
            TokenKind::Op(Op::Assign) => Operator::Assign,
            TokenKind::Op(Op::AddAssign) => Operator::AddAssign,
            TokenKind::Op(Op::SubAssign) => Operator::SubAssign,
            TokenKind::Op(Op::MulAssign) => Operator::MulAssign,
            TokenKind::Op(Op::DivAssign) => Operator::DivAssign,
            TokenKind::Op(Op::PercentAssign) => Operator::ModAssign,
            TokenKind::Op(Op::AmpAssign) => Operator::AndAssign,
            TokenKind::Op(Op::PipeAssign) => Operator::OrAssign,
            TokenKind::Op(Op::CaretAssign) => Operator::XorAssign,
            TokenKind::Op(Op::ShlAssign) => Operator::ShlAssign,
            TokenKind::Op(Op::ShrAssign) => Operator::ShrAssign,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_assignment()?;
        Ok(self.bin_op(op, lhs, rhs))
    }

    fn parse_conditional(&mut self) -> PResult<NodeId> {
        let cond = self.parse_logical_or()?;
        if self.is_op(Op::Question) {
            self.advance();
            let then_branch = self.parse_assignment()?;
            if !self.is_op(Op::Colon) {
                return Err(self.err(ParseErrorKind::MissingColon));
            }
            self.advance();
            let else_branch = self.parse_conditional()?;
            let node = self.alloc_leaf(
                NodeTag::TriOp,
                NodePayload::Op {
                    op: Operator::Query,
                    postfix: false,
                },
            );
            self.push(node, cond);
            self.push(node, then_branch);
            self.push(node, else_branch);
            Ok(node)
        } else {
            Ok(cond)
        }
    }

    fn bin_op(&mut self, op: Operator, lhs: NodeId, rhs: NodeId) -> NodeId {
        let node = self.alloc_leaf(NodeTag::BinOp, NodePayload::Op { op, postfix: false });
        self.push(node, lhs);
        self.push(node, rhs);
        node
    }

    /// Generates one left-associative binary precedence level: `next` parses
    /// the tighter-binding level, `ops` maps the lexer operator matched at
    /// this level to its AST [`Operator`].
    fn binary_level(
        &mut self,
        next: fn(&mut Self) -> PResult<NodeId>,
        ops: &[(Op, Operator)],
    ) -> PResult<NodeId> {
        let mut lhs = next(self)?;
        loop {
            let matched = match &self.cur.kind {
                TokenKind::Op(o) => ops.iter().find(|(op, _)| op == o).map(|(_, ast_op)| *ast_op),
                _ => None,
            };
            let Some(ast_op) = matched else { break };
            self.advance();
            let rhs = next(self)?;
            lhs = self.bin_op(ast_op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_logical_or(&mut self) -> PResult<NodeId> {
        self.binary_level(Self::parse_logical_and, &[(Op::OrOr, Operator::LogicalOr)])
    }

    fn parse_logical_and(&mut self) -> PResult<NodeId> {
        self.binary_level(Self::parse_bit_or, &[(Op::AndAnd, Operator::LogicalAnd)])
    }

    fn parse_bit_or(&mut self) -> PResult<NodeId> {
        self.binary_level(Self::parse_bit_xor, &[(Op::Pipe, Operator::BitOr)])
    }

    fn parse_bit_xor(&mut self) -> PResult<NodeId> {
        self.binary_level(Self::parse_bit_and, &[(Op::Caret, Operator::BitXor)])
    }

    fn parse_bit_and(&mut self) -> PResult<NodeId> {
        self.binary_level(Self::parse_equality, &[(Op::Amp, Operator::BitAnd)])
    }

    fn parse_equality(&mut self) -> PResult<NodeId> {
        self.binary_level(
            Self::parse_relational,
            &[(Op::Eq, Operator::Eq), (Op::Ne, Operator::Ne)],
        )
    }

    fn parse_relational(&mut self) -> PResult<NodeId> {
        self.binary_level(
            Self::parse_shift,
            &[
                (Op::Lt, Operator::Lt),
                (Op::Le, Operator::Le),
                (Op::Gt, Operator::Gt),
                (Op::Ge, Operator::Ge),
            ],
        )
    }

    fn parse_shift(&mut self) -> PResult<NodeId> {
        self.binary_level(
            Self::parse_additive,
            &[(Op::Shl, Operator::Shl), (Op::Shr, Operator::Shr)],
        )
    }

    fn parse_additive(&mut self) -> PResult<NodeId> {
        self.binary_level(
            Self::parse_multiplicative,
            &[(Op::Add, Operator::Add), (Op::Sub, Operator::Sub)],
        )
    }

    fn parse_multiplicative(&mut self) -> PResult<NodeId> {
        self.binary_level(
            Self::parse_unary,
            &[
                (Op::Mul, Operator::Mul),
                (Op::Div, Operator::Div),
                (Op::Percent, Operator::Mod),
            ],
        )
    }

    fn parse_unary(&mut self) -> PResult<NodeId> {
        let (op, negate_literal) = match &self.cur.kind {
            TokenKind::Op(Op::Mul) => (Some(Operator::Mul), false),
            TokenKind::Op(Op::Amp) => (Some(Operator::BitAnd), false),
            TokenKind::Op(Op::Not) => (Some(Operator::LogicalNot), false),
            TokenKind::Op(Op::Tilde) => (Some(Operator::BitNot), false),
            TokenKind::Op(Op::Add) => (Some(Operator::Add), false),
            TokenKind::Op(Op::Sub) => (Some(Operator::Sub), true),
            TokenKind::Op(Op::Inc) => (Some(Operator::Inc), false),
            TokenKind::Op(Op::Dec) => (Some(Operator::Dec), false),
            _ => (None, false),
        };

        if let Some(op) = op {
            self.advance();
            if negate_literal {
                if let Some(node) = self.try_negated_literal()? {
                    return Ok(node);
                }
            }
            let operand = self.parse_unary()?;
            let node = self.alloc_leaf(NodeTag::SinOp, NodePayload::Op { op, postfix: false });
            self.push(node, operand);
            return Ok(node);
        }

        if self.is_keyword(Keyword::Sizeof) {
            return self.parse_sizeof();
        }

        self.parse_postfix()
    }

    /// `- <literal>` folds directly into a negative literal, matching the
    /// original lowering rather than emitting a general `SinOp(Sub)`.
    fn try_negated_literal(&mut self) -> PResult<Option<NodeId>> {
        let node = match self.cur.kind.clone() {
            TokenKind::IntLiteral(v) => {
                let n = self.alloc_leaf(NodeTag::Int, NodePayload::Int(-v));
                self.advance();
                n
            }
            TokenKind::FloatLiteral(v) => {
                let n = self.alloc_leaf(NodeTag::Double, NodePayload::Float(-v));
                self.advance();
                n
            }
            TokenKind::CharLiteral(v) => {
                let n = self.alloc_leaf(NodeTag::Char, NodePayload::Int(-v));
                self.advance();
                n
            }
            _ => return Ok(None),
        };
        Ok(Some(node))
    }

    fn parse_sizeof(&mut self) -> PResult<NodeId> {
        self.eat_keyword(Keyword::Sizeof)?;
        self.eat_op(Op::LParen)?;
        let base = self.parse_base_type()?;
        let mut ptr = self.parse_pointer_depth();
        // `sizeof` only cares about whether the result is a pointer, so
        // every level collapses to the same word-sized answer.
        if ptr > 1 {
            ptr = 1;
        }
        self.eat_op(Op::RParen)?;
        let size = if ptr > 0 {
            drtcc_asm::WORD_SIZE as i64
        } else {
            base.size() as i64
        };
        Ok(self.alloc_leaf(NodeTag::Int, NodePayload::Int(size)))
    }

    fn parse_postfix(&mut self) -> PResult<NodeId> {
        let mut node = self.parse_primary()?;
        loop {
            if self.is_op(Op::LBracket) {
                self.advance();
                let index = self.expression()?;
                self.eat_op(Op::RBracket)?;
                node = self.bin_op(Operator::Index, node, index);
            } else if self.is_op(Op::Inc) {
                self.advance();
                let wrapped = self.alloc_leaf(
                    NodeTag::SinOp,
                    NodePayload::Op {
                        op: Operator::Inc,
                        postfix: true,
                    },
                );
                self.push(wrapped, node);
                node = wrapped;
            } else if self.is_op(Op::Dec) {
                self.advance();
                let wrapped = self.alloc_leaf(
                    NodeTag::SinOp,
                    NodePayload::Op {
                        op: Operator::Dec,
                        postfix: true,
                    },
                );
                self.push(wrapped, node);
                node = wrapped;
            } else {
                break;
            }
        }
        Ok(node)
    }

    fn is_type_keyword(&self) -> bool {
        matches!(
            self.cur.kind,
            TokenKind::Keyword(
                Keyword::Void
                    | Keyword::Char
                    | Keyword::Short
                    | Keyword::Int
                    | Keyword::Long
                    | Keyword::Float
                    | Keyword::Double
                    | Keyword::Unsigned
                    | Keyword::Signed
            )
        )
    }

    fn parse_primary(&mut self) -> PResult<NodeId> {
        match self.cur.kind.clone() {
            TokenKind::IntLiteral(v) => {
                self.advance();
                Ok(self.alloc_leaf(NodeTag::Int, NodePayload::Int(v)))
            }
            TokenKind::FloatLiteral(v) => {
                self.advance();
                Ok(self.alloc_leaf(NodeTag::Double, NodePayload::Float(v)))
            }
            TokenKind::CharLiteral(v) => {
                self.advance();
                Ok(self.alloc_leaf(NodeTag::Char, NodePayload::Int(v)))
            }
            TokenKind::StringLiteral(first) => {
                let mut text = first;
                self.advance();
                // Adjacent string literals concatenate, per spec.md §6.
                while let TokenKind::StringLiteral(more) = self.cur.kind.clone() {
                    text.push_str(&more);
                    self.advance();
                }
                let sym = self.interner.intern(&text);
                Ok(self.alloc_leaf(NodeTag::String, NodePayload::Ident(sym)))
            }
            TokenKind::Identifier(name) => {
                let sym = self.interner.intern(&name);
                self.advance();
                if self.is_op(Op::LParen) {
                    self.advance();
                    let node = self.alloc_leaf(NodeTag::Invoke, NodePayload::Ident(sym));
                    while !self.is_op(Op::RParen) {
                        let arg = self.expression()?;
                        let wrapped = self.alloc_leaf(NodeTag::ExpParam, NodePayload::None);
                        self.push(wrapped, arg);
                        self.push(node, wrapped);
                        if self.is_op(Op::Comma) {
                            self.advance();
                        }
                    }
                    self.eat_op(Op::RParen)?;
                    Ok(node)
                } else {
                    Ok(self.alloc_leaf(NodeTag::Id, NodePayload::Ident(sym)))
                }
            }
            TokenKind::Op(Op::LParen) => {
                self.advance();
                if self.is_type_keyword() {
                    let base = self.parse_base_type()?;
                    let ptr = self.parse_pointer_depth();
                    self.eat_op(Op::RParen)?;
                    let node =
                        self.alloc_leaf(NodeTag::Cast, NodePayload::TypeSpec { base, ptr });
                    let operand = self.parse_unary()?;
                    self.push(node, operand);
                    Ok(node)
                } else {
                    let inner = self.expression()?;
                    self.eat_op(Op::RParen)?;
                    Ok(inner)
                }
            }
            TokenKind::Eof => Err(self.err(ParseErrorKind::UnexpectedEof)),
            _ => Err(self.err(ParseErrorKind::BadExpression)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn child_tag(ast: &Ast, node: NodeId, idx: usize) -> NodeTag {
        ast.node(ast.node(node).children[idx]).tag
    }

    #[test]
    fn parses_return_of_arithmetic() {
        let out = parse("int main(){ return 1+2*3; }").expect("parses");
        assert!(out.lex_errors.is_empty());
        let root_children = &out.ast.node(out.root).children;
        assert_eq!(root_children.len(), 1);
        assert_eq!(out.ast.node(root_children[0]).tag, NodeTag::Func);
    }

    #[test]
    fn function_has_void_star_star_param() {
        let out = parse("int f(char **argv){ return 0; }").expect("parses");
        let func = out.ast.node(out.root).children[0];
        let params_node = out.ast.node(func).children[2];
        assert_eq!(out.ast.node(params_node).children.len(), 1);
    }

    #[test]
    fn enum_values_increment_and_reset_on_initializer() {
        let out = parse("enum { A=1, B, C=10, D }; int main(){ return 0; }").expect("parses");
        let enum_node = out.ast.node(out.root).children[0];
        let values: Vec<i64> = out
            .ast
            .node(enum_node)
            .children
            .iter()
            .map(|&unit| {
                let int_node = out.ast.node(unit).children[1];
                match out.ast.node(int_node).payload {
                    NodePayload::Int(v) => v,
                    _ => unreachable!(),
                }
            })
            .collect();
        assert_eq!(values, vec![1, 2, 10, 11]);
    }

    #[test]
    fn if_without_else_has_two_children() {
        let out = parse("int main(){ if (1) return 1; return 0; }").expect("parses");
        let func = out.ast.node(out.root).children[0];
        let block = out.ast.node(func).children[3];
        // children[0] is the Empty ENT marker, children[1] the Stmt-wrapped if.
        let if_stmt = out.ast.node(block).children[1];
        let if_node = out.ast.node(if_stmt).children[0];
        assert_eq!(out.ast.node(if_node).tag, NodeTag::If);
        assert_eq!(out.ast.node(if_node).children.len(), 2);
    }

    #[test]
    fn rejects_unsupported_for_loop() {
        let err = parse("int main(){ for(;;) return 0; }").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::Unsupported("for".into()));
    }

    #[test]
    fn adjacent_string_literals_concatenate() {
        let out = parse(r#"int main(){ char *s; s = "a" "b"; return 0; }"#).expect("parses");
        let func = out.ast.node(out.root).children[0];
        let block = out.ast.node(func).children[3];
        // children: VarLocal(s), Empty marker, Stmt(exp: assign)
        assert_eq!(child_tag(&out.ast, block, 0), NodeTag::VarLocal);
    }
}
